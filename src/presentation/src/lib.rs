pub mod abort;
pub mod cli;
pub mod confirmation;
pub mod renderer;
pub mod zsh;

pub use abort::spawn_abort_listener;
pub use cli::Cli;
pub use confirmation::TerminalConfirmation;
pub use renderer::{format_plan, OutputTarget, Renderer};
pub use zsh::ZSH_INIT_SCRIPT;
