pub mod config;
pub mod history;
pub mod openai_client;
pub mod prompts;
pub mod shell_executor;
pub mod tools;

pub use config::{Config, HistoryConfig, SystemContext};
pub use openai_client::OpenAiClient;
pub use prompts::Prompts;
pub use shell_executor::{OutputMode, ShellExecutor};
pub use tools::{InspectionTool, ToolRegistry};
