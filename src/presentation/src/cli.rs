use crate::renderer::OutputTarget;
use clap::Parser;
use domain::entities::command::CommandsResponse;

#[derive(Parser, Debug, Clone)]
#[command(name = "shai")]
#[command(version, about = "Turn natural-language requests into shell commands")]
pub struct Cli {
    /// What you want done, in plain words
    #[arg(required_unless_present = "zsh_init", trailing_var_arg = true)]
    pub prompt: Vec<String>,

    /// Run the generated commands without asking
    #[arg(short, long)]
    pub yes: bool,

    /// Print the generated command line instead of running it
    #[arg(long, conflicts_with = "yes")]
    pub print: bool,

    /// Model name, overriding MODEL
    #[arg(long)]
    pub model: Option<String>,

    /// Maximum recovery attempts after a failing command
    #[arg(long, value_name = "N")]
    pub max_recovery: Option<usize>,

    /// Do not send recent shell history to the model
    #[arg(long)]
    pub no_history: bool,

    /// Print the zsh integration script and exit
    #[arg(long)]
    pub zsh_init: bool,

    /// Debug logging on stderr
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn prompt_text(&self) -> String {
        self.prompt.join(" ").trim().to_string()
    }

    pub fn output_target(&self) -> OutputTarget {
        if self.print {
            OutputTarget::Stderr
        } else {
            OutputTarget::Stdout
        }
    }

    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "warn"
        }
    }
}

/// Single command line for `--print`: commands joined with `&&`.
pub fn command_line(response: &CommandsResponse) -> Option<String> {
    if response.is_empty() {
        return None;
    }
    Some(
        response
            .commands
            .iter()
            .map(|c| c.cmd.trim())
            .collect::<Vec<_>>()
            .join(" && "),
    )
}
