use async_trait::async_trait;
use domain::entities::command::DisplayCommand;
use domain::events::EventSink;
use domain::services::ConfirmationGate;
use shared::confirmation::ask_confirmation;
use shared::{Error, Result};
use std::io;

use crate::renderer::format_plan;

const PROMPT: &str = "🤔 Run these command(s)?";

/// Shows the command list and asks for a single-key yes/no on the terminal.
/// Any dangerous command flips the default to "no".
#[derive(Debug, Clone, Default)]
pub struct TerminalConfirmation {
    /// Drained before the prompt so pending output lands above it.
    events: EventSink,
}

impl TerminalConfirmation {
    pub fn new(events: EventSink) -> Self {
        Self { events }
    }

    pub fn default_answer(commands: &[DisplayCommand]) -> bool {
        !commands.iter().any(|c| c.command.dangerous)
    }
}

#[async_trait]
impl ConfirmationGate for TerminalConfirmation {
    async fn confirm(&self, commands: &[DisplayCommand]) -> Result<bool> {
        self.events.flush().await;
        let plan = format_plan(commands);
        let default_yes = Self::default_answer(commands);

        let answer = tokio::task::spawn_blocking(move || {
            println!("\n{}", plan);
            ask_confirmation(PROMPT, default_yes)
        })
        .await
        .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::Other, e)))??;

        Ok(answer)
    }
}
