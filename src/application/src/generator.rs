use crate::conversation::Conversation;
use domain::entities::command::CommandsResponse;
use domain::events::{EngineEvent, EventSink};
use domain::models::Message;
use domain::services::{LanguageModel, OutputSchema};
use futures::StreamExt;
use shared::{Error, Result};
use std::sync::Arc;

pub const COMMANDS_SCHEMA_NAME: &str = "commands_response";

/// Output of one dual-channel generation.
#[derive(Debug)]
pub struct Generation {
    pub explanation: String,
    /// Command-path result; callers fall back to an empty list on a schema error.
    pub commands: Result<CommandsResponse>,
}

/// Produces the streamed explanation and the structured command list.
#[derive(Clone)]
pub struct Generator {
    model: Arc<dyn LanguageModel>,
    events: EventSink,
}

impl Generator {
    pub fn new(model: Arc<dyn LanguageModel>, events: EventSink) -> Self {
        Self { model, events }
    }

    /// Run the explanation stream and the command request concurrently on
    /// the same snapshot, then append both results.
    pub async fn generate(
        &self,
        conversation: &mut Conversation,
        explain_prompt: &str,
        command_prompt: &str,
    ) -> Result<Generation> {
        let snapshot = conversation.snapshot();
        let explain_messages = with_instruction(&snapshot, explain_prompt);
        let command_messages = with_instruction(&snapshot, command_prompt);

        let (explanation, commands) = tokio::join!(
            self.stream_explanation(&explain_messages),
            self.request_commands(&command_messages)
        );
        let explanation = explanation?;

        self.events
            .emit(EngineEvent::ExplanationComplete(explanation.clone()));
        conversation.push(Message::assistant(explanation.clone()));
        if let Ok(accepted) = &commands {
            conversation.push(Message::assistant(serde_json::to_string(accepted)?));
        }

        Ok(Generation {
            explanation,
            commands,
        })
    }

    /// Command path alone, used during recovery.
    pub async fn commands(
        &self,
        conversation: &mut Conversation,
        command_prompt: &str,
    ) -> Result<CommandsResponse> {
        let messages = with_instruction(conversation.messages(), command_prompt);
        let accepted = self.request_commands(&messages).await?;
        conversation.push(Message::assistant(serde_json::to_string(&accepted)?));
        Ok(accepted)
    }

    async fn stream_explanation(&self, messages: &[Message]) -> Result<String> {
        let mut stream = self.model.stream_text(messages).await?;
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            self.events.emit(EngineEvent::ExplanationChunk(chunk.clone()));
            text.push_str(&chunk);
        }
        Ok(text)
    }

    async fn request_commands(&self, messages: &[Message]) -> Result<CommandsResponse> {
        let schema = OutputSchema {
            name: COMMANDS_SCHEMA_NAME.to_string(),
            schema: CommandsResponse::json_schema(),
        };
        let payload = self.model.structured(messages, &schema).await?;
        let accepted = CommandsResponse::from_value(payload).map_err(Error::SchemaValidation)?;
        tracing::debug!(commands = accepted.commands.len(), "command list accepted");
        Ok(accepted)
    }
}

fn with_instruction(messages: &[Message], instruction: &str) -> Vec<Message> {
    let mut request = messages.to_vec();
    request.push(Message::user(instruction));
    request
}
