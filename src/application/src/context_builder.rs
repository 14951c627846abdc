use crate::conversation::Conversation;
use domain::events::{EngineEvent, EventSink};
use domain::models::Message;
use domain::services::{LanguageModel, ToolDispatcher};
use shared::{AbortSignal, Error, Result};
use std::path::Path;
use std::sync::Arc;

/// Result of one context build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextOutcome {
    /// Latest free text returned by the model.
    pub explanation: String,
    /// `false` when the build stopped early (abort or round cap).
    pub terminal: bool,
}

/// Drives the tool-calling loop that gathers context before generation.
#[derive(Clone)]
pub struct ContextBuilder {
    model: Arc<dyn LanguageModel>,
    tools: Arc<dyn ToolDispatcher>,
    events: EventSink,
    abort: AbortSignal,
    max_rounds: Option<usize>,
}

impl ContextBuilder {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        tools: Arc<dyn ToolDispatcher>,
        events: EventSink,
        abort: AbortSignal,
    ) -> Self {
        Self {
            model,
            tools,
            events,
            abort,
            max_rounds: None,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: Option<usize>) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Append `message` (and `supplementary`, once) and call the model with
    /// the declared tools until it stops requesting them.
    pub async fn build(
        &self,
        conversation: &mut Conversation,
        message: &str,
        supplementary: Option<&str>,
        working_dir: &Path,
    ) -> Result<ContextOutcome> {
        conversation.push(Message::user(message));
        if let Some(instruction) = supplementary {
            conversation.push(Message::system(instruction));
        }

        let definitions = self.tools.definitions();
        let mut explanation = String::new();
        let mut rounds = 0usize;

        loop {
            if self.abort.is_raised() {
                tracing::debug!(rounds, "context build stopped by abort");
                return Ok(ContextOutcome {
                    explanation,
                    terminal: false,
                });
            }
            if self.max_rounds.is_some_and(|max| rounds >= max) {
                tracing::debug!(rounds, "context build reached the round cap");
                return Ok(ContextOutcome {
                    explanation,
                    terminal: false,
                });
            }
            rounds += 1;

            tracing::debug!(round = rounds, messages = conversation.len(), "context round");
            let reply = self.model.respond(conversation.messages(), &definitions).await?;
            explanation = reply.content.clone();
            let calls = reply.tool_calls;
            conversation.push(Message::assistant_with_tools(reply.content, calls.clone()));

            if calls.is_empty() {
                return Ok(ContextOutcome {
                    explanation,
                    terminal: true,
                });
            }

            let mut first_failure = None;
            for call in &calls {
                self.events.emit(EngineEvent::ToolInvoked {
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                });

                let result = match call.parse_arguments() {
                    Ok(arguments) => self.tools.dispatch(&call.name, &arguments, working_dir).await,
                    Err(message) => Err(Error::ToolArguments {
                        tool: call.name.clone(),
                        message,
                    }),
                };

                let text = match result {
                    Ok(text) => text,
                    Err(err) => {
                        tracing::debug!(tool = %call.name, error = %err, "tool failed");
                        self.events.emit(EngineEvent::ToolFailed {
                            name: call.name.clone(),
                            error: err.to_string(),
                        });
                        let text = format!("Error running tool '{}': {}", call.name, err);
                        if first_failure.is_none() {
                            first_failure = Some(as_dispatch_failure(&call.name, err));
                        }
                        text
                    }
                };
                conversation.push(Message::tool_result(call, text));
            }

            if let Some(err) = first_failure {
                return Err(err);
            }
        }
    }
}

fn as_dispatch_failure(tool: &str, err: Error) -> Error {
    match err {
        Error::ToolArguments { tool, message } => Error::ToolDispatch { tool, message },
        err if err.is_tool_failure() => err,
        other => Error::ToolDispatch {
            tool: tool.to_string(),
            message: other.to_string(),
        },
    }
}
