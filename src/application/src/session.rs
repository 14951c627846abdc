use crate::context_builder::ContextBuilder;
use crate::conversation::Conversation;
use crate::execution_engine::{ExecutionEngine, ExecutionOutcome, RecoveryPrompts};
use crate::generator::Generator;
use domain::entities::command::CommandsResponse;
use domain::events::{EngineEvent, EventSink};
use domain::models::Message;
use domain::services::{CommandRunner, ConfirmationGate, LanguageModel, ToolDispatcher};
use infrastructure::history::history_context;
use infrastructure::Prompts;
use shared::{AbortSignal, Error, Result};
use std::sync::Arc;

/// External capabilities a session runs against.
pub struct Collaborators {
    pub model: Arc<dyn LanguageModel>,
    pub tools: Arc<dyn ToolDispatcher>,
    pub runner: Box<dyn CommandRunner>,
    pub gate: Arc<dyn ConfirmationGate>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub max_tool_rounds: Option<usize>,
    pub max_recovery_attempts: usize,
    /// Host facts appended to the initial system prompt.
    pub host_context: Option<String>,
    /// Recent shell commands, oldest first.
    pub history: Vec<String>,
}

/// One invocation: owns the conversation and the executor state.
pub struct Session {
    conversation: Conversation,
    context: ContextBuilder,
    generator: Generator,
    engine: ExecutionEngine,
    prompts: Prompts,
    events: EventSink,
    abort: AbortSignal,
}

impl Session {
    pub fn new(
        collaborators: Collaborators,
        prompts: Prompts,
        options: SessionOptions,
        events: EventSink,
        abort: AbortSignal,
    ) -> Self {
        let Collaborators {
            model,
            tools,
            runner,
            gate,
        } = collaborators;

        let context = ContextBuilder::new(model.clone(), tools, events.clone(), abort.clone())
            .with_max_rounds(options.max_tool_rounds);
        let generator = Generator::new(model, events.clone());
        let engine = ExecutionEngine::new(
            context.clone(),
            generator.clone(),
            runner,
            gate,
            RecoveryPrompts {
                error: prompts.error.clone(),
                error_command: prompts.error_command.clone(),
            },
            events.clone(),
            abort.clone(),
            options.max_recovery_attempts,
        );

        let mut conversation = Conversation::new();
        let initial = match &options.host_context {
            Some(host) => format!("{}\n\n{}", prompts.initial, host),
            None => prompts.initial.clone(),
        };
        conversation.push(Message::system(initial));
        if let Some(history) = history_context(&options.history) {
            conversation.push(Message::system(history));
        }

        Self {
            conversation,
            context,
            generator,
            engine,
            prompts,
            events,
            abort,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Build context for `prompt` and generate the explanation and command
    /// list. `None` when the user aborted while context was being built.
    pub async fn plan(&mut self, prompt: &str) -> Result<Option<CommandsResponse>> {
        tracing::debug!(prompt, "planning");
        let context = self
            .context
            .build(
                &mut self.conversation,
                prompt,
                None,
                self.engine.working_directory(),
            )
            .await?;
        if !context.terminal && self.abort.is_raised() {
            return Ok(None);
        }

        let generation = self
            .generator
            .generate(
                &mut self.conversation,
                &self.prompts.explain,
                &self.prompts.command,
            )
            .await?;

        // A rejected payload means "nothing to run"; provider failures are fatal.
        let commands = match generation.commands {
            Ok(commands) => commands,
            Err(err @ Error::SchemaValidation(_)) => {
                tracing::warn!(error = %err, "command generation failed");
                self.events
                    .emit(EngineEvent::GenerationFailed(err.to_string()));
                CommandsResponse::empty()
            }
            Err(err) => return Err(err),
        };
        Ok(Some(commands))
    }

    /// Plan `prompt`, then execute the commands under confirmation.
    pub async fn run(&mut self, prompt: &str) -> Result<ExecutionOutcome> {
        let Some(commands) = self.plan(prompt).await? else {
            return Ok(ExecutionOutcome::Aborted);
        };
        let outcome = self.engine.execute(&mut self.conversation, commands).await?;
        tracing::debug!(%outcome, "session finished");
        Ok(outcome)
    }
}
