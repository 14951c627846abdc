use colored::Colorize;
use domain::entities::command::{CommandStatus, DisplayCommand};
use domain::events::EngineEvent;
use std::io::{self, Write};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

/// Where rendered output goes. `Stderr` keeps stdout free for `--print`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputTarget {
    Stdout,
    Stderr,
}

/// Turns engine events into terminal text.
#[derive(Debug)]
pub struct Renderer {
    target: OutputTarget,
    /// Print proposed command lists; off when the confirmation prompt shows them.
    show_plan: bool,
    streaming: bool,
}

impl Renderer {
    pub fn new(target: OutputTarget, show_plan: bool) -> Self {
        Self {
            target,
            show_plan,
            streaming: false,
        }
    }

    /// Text for one event; empty when the event has no visible form.
    pub fn render(&mut self, event: &EngineEvent) -> String {
        match event {
            EngineEvent::ToolInvoked { name, arguments } => {
                format!("{}\n", format!("🔧 Tool: {}({})", name, arguments).dimmed())
            }
            EngineEvent::ToolFailed { name, error } => {
                format!("{} {}: {}\n", "✗".red(), name.red(), error)
            }
            EngineEvent::ExplanationChunk(chunk) => {
                let prefix = if self.streaming {
                    String::new()
                } else {
                    format!("\n{} ", "💬".bold())
                };
                self.streaming = true;
                format!("{}{}", prefix, chunk)
            }
            EngineEvent::ExplanationComplete(text) => {
                if std::mem::take(&mut self.streaming) {
                    "\n".to_string()
                } else if text.trim().is_empty() {
                    String::new()
                } else {
                    format!("\n{} {}\n", "💬".bold(), text.trim())
                }
            }
            EngineEvent::CommandsProposed(commands) if self.show_plan => {
                format!("\n{}", format_plan(commands))
            }
            EngineEvent::CommandsProposed(_) => String::new(),
            EngineEvent::StatusChanged { cmd, status, .. } => {
                format!("{} {}\n", status_label(*status), format!("$ {}", cmd).bold())
            }
            EngineEvent::CommandOutput { stdout, stderr, .. } => {
                let mut text = stdout.clone();
                if !stderr.is_empty() {
                    text.push_str(&stderr.dimmed().to_string());
                }
                if !text.ends_with('\n') {
                    text.push('\n');
                }
                text
            }
            EngineEvent::RecoveryStarted {
                attempt,
                max_attempts,
                error,
            } => format!(
                "\n{} {}\n{}\n",
                "❌ Error:".red().bold(),
                error,
                format!("Attempting recovery ({}/{})", attempt, max_attempts).yellow()
            ),
            EngineEvent::DirectoryChanged(path) => {
                format!("{} {}\n", "📁".bold(), path.display().to_string().cyan())
            }
            EngineEvent::GenerationFailed(error) => format!(
                "\n{} Failed to generate commands: {}\n",
                "❌ Error:".red().bold(),
                error
            ),
            EngineEvent::Flush(_) => String::new(),
        }
    }

    fn write(&self, text: &str) -> io::Result<()> {
        match self.target {
            OutputTarget::Stdout => {
                let mut out = io::stdout().lock();
                out.write_all(text.as_bytes())?;
                out.flush()
            }
            OutputTarget::Stderr => {
                let mut out = io::stderr().lock();
                out.write_all(text.as_bytes())?;
                out.flush()
            }
        }
    }

    /// Render events until every sender is dropped.
    pub fn spawn(mut self, mut events: UnboundedReceiver<EngineEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let EngineEvent::Flush(token) = &event {
                    token.complete();
                    continue;
                }
                let text = self.render(&event);
                if text.is_empty() {
                    continue;
                }
                if let Err(e) = self.write(&text) {
                    tracing::debug!(error = %e, "renderer output closed");
                    break;
                }
            }
        })
    }
}

/// Numbered command list with explanations; dangerous commands flagged.
pub fn format_plan(commands: &[DisplayCommand]) -> String {
    let mut text = String::new();
    for (index, item) in commands.iter().enumerate() {
        let command = &item.command;
        text.push_str(&format!("{}\n", format!("# {}", command.explanation).yellow()));
        let line = format!("{}. $ {}", index + 1, command.cmd);
        if command.dangerous {
            text.push_str(&format!("{} {}\n", line.red().bold(), "⚠ dangerous".red()));
        } else {
            text.push_str(&format!("{}\n", line.green().bold()));
        }
    }
    text
}

fn status_label(status: CommandStatus) -> String {
    let label = format!("[{}]", status);
    match status {
        CommandStatus::Pending => label.yellow().to_string(),
        CommandStatus::Running => label.blue().to_string(),
        CommandStatus::Success => label.green().to_string(),
        CommandStatus::Error => label.red().to_string(),
        CommandStatus::Aborted => label.magenta().to_string(),
    }
}
