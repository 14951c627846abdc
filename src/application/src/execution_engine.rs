use crate::context_builder::ContextBuilder;
use crate::conversation::Conversation;
use crate::generator::Generator;
use domain::entities::command::{CommandStatus, CommandsResponse, DisplayCommand};
use domain::events::{EngineEvent, EventSink};
use domain::services::{CommandRunner, ConfirmationGate};
use shared::{AbortSignal, Error, Result};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// How an execution run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Every command succeeded.
    Completed,
    /// The command list was empty; nothing ran.
    NothingToRun,
    Aborted,
    /// Recovery produced no commands or failed to generate them.
    RecoveryStopped,
    /// The recovery attempt limit was reached.
    RecoveryExhausted,
    /// The user declined a command list.
    Declined,
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ExecutionOutcome::Completed => "completed",
            ExecutionOutcome::NothingToRun => "nothing to run",
            ExecutionOutcome::Aborted => "aborted",
            ExecutionOutcome::RecoveryStopped => "recovery stopped",
            ExecutionOutcome::RecoveryExhausted => "recovery attempts exhausted",
            ExecutionOutcome::Declined => "declined",
        };
        f.write_str(text)
    }
}

enum ListResult {
    Completed,
    Aborted,
    Failed { index: usize, error: Error },
}

/// Recovery prompt texts.
#[derive(Debug, Clone)]
pub struct RecoveryPrompts {
    pub error: String,
    pub error_command: String,
}

/// Runs command lists, feeding failures back to the model for replacement
/// plans until success, abort or the recovery limit.
pub struct ExecutionEngine {
    context: ContextBuilder,
    generator: Generator,
    runner: Box<dyn CommandRunner>,
    gate: Arc<dyn ConfirmationGate>,
    prompts: RecoveryPrompts,
    events: EventSink,
    abort: AbortSignal,
    max_recovery_attempts: usize,
}

impl ExecutionEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: ContextBuilder,
        generator: Generator,
        runner: Box<dyn CommandRunner>,
        gate: Arc<dyn ConfirmationGate>,
        prompts: RecoveryPrompts,
        events: EventSink,
        abort: AbortSignal,
        max_recovery_attempts: usize,
    ) -> Self {
        Self {
            context,
            generator,
            runner,
            gate,
            prompts,
            events,
            abort,
            max_recovery_attempts,
        }
    }

    pub fn working_directory(&self) -> &Path {
        self.runner.working_directory()
    }

    pub async fn execute(
        &mut self,
        conversation: &mut Conversation,
        response: CommandsResponse,
    ) -> Result<ExecutionOutcome> {
        let mut plan = response;
        let mut attempts = 0usize;
        let mut failures: Vec<String> = Vec::new();

        loop {
            if plan.is_empty() {
                return Ok(if attempts == 0 {
                    ExecutionOutcome::NothingToRun
                } else {
                    ExecutionOutcome::RecoveryStopped
                });
            }

            let mut commands = plan.into_display();
            self.events
                .emit(EngineEvent::CommandsProposed(commands.clone()));
            if !self.gate.confirm(&commands).await? {
                tracing::info!("command list declined");
                return Ok(ExecutionOutcome::Declined);
            }

            let (index, error) = match self.run_list(&mut commands).await? {
                ListResult::Completed => return Ok(ExecutionOutcome::Completed),
                ListResult::Aborted => return Ok(ExecutionOutcome::Aborted),
                ListResult::Failed { index, error } => (index, error),
            };

            if self.abort.is_raised() {
                return Ok(ExecutionOutcome::Aborted);
            }
            if attempts >= self.max_recovery_attempts {
                tracing::warn!(attempts, "recovery limit reached");
                return Ok(ExecutionOutcome::RecoveryExhausted);
            }
            attempts += 1;

            let description = describe_failure(&commands[index].command.cmd, &error, &failures);
            failures.push(format!("'{}': {}", commands[index].command.cmd, error));
            tracing::warn!(attempt = attempts, error = %error, "entering recovery");
            self.events.emit(EngineEvent::RecoveryStarted {
                attempt: attempts,
                max_attempts: self.max_recovery_attempts,
                error: error.to_string(),
            });

            plan = match self.recover(conversation, &description).await {
                Ok(Some(replacement)) => replacement,
                Ok(None) => return Ok(ExecutionOutcome::Aborted),
                Err(err) => {
                    tracing::warn!(error = %err, "recovery planning failed");
                    self.events
                        .emit(EngineEvent::GenerationFailed(err.to_string()));
                    return Ok(ExecutionOutcome::RecoveryStopped);
                }
            };
        }
    }

    /// Context round with the error prompt, then the command path alone.
    /// `None` means the context build was aborted.
    async fn recover(
        &self,
        conversation: &mut Conversation,
        description: &str,
    ) -> Result<Option<CommandsResponse>> {
        let context = self
            .context
            .build(
                conversation,
                description,
                Some(&self.prompts.error),
                self.runner.working_directory(),
            )
            .await?;
        if !context.terminal && self.abort.is_raised() {
            return Ok(None);
        }
        if !context.explanation.is_empty() {
            self.events
                .emit(EngineEvent::ExplanationComplete(context.explanation));
        }

        let replacement = self
            .generator
            .commands(conversation, &self.prompts.error_command)
            .await?;
        Ok(Some(replacement))
    }

    async fn run_list(&mut self, commands: &mut [DisplayCommand]) -> Result<ListResult> {
        for index in 0..commands.len() {
            if self.abort.is_raised() {
                self.abort_from(commands, index);
                return Ok(ListResult::Aborted);
            }

            self.transition(commands, index, CommandStatus::Running);
            let cmd = commands[index].command.cmd.clone();

            match self.runner.run(&cmd).await {
                Ok(output) => {
                    if let Some(directory) = output.directory_change {
                        self.events.emit(EngineEvent::DirectoryChanged(directory));
                    }
                    if !output.stdout.is_empty() || !output.stderr.is_empty() {
                        self.events.emit(EngineEvent::CommandOutput {
                            index,
                            stdout: output.stdout,
                            stderr: output.stderr,
                        });
                    }
                    if self.abort.is_raised() {
                        self.abort_from(commands, index);
                        return Ok(ListResult::Aborted);
                    }
                    self.transition(commands, index, CommandStatus::Success);
                }
                Err(error) => {
                    if self.abort.is_raised() {
                        self.abort_from(commands, index);
                        return Ok(ListResult::Aborted);
                    }
                    self.transition(commands, index, CommandStatus::Error);
                    if !error.is_recoverable() {
                        return Err(error);
                    }
                    return Ok(ListResult::Failed { index, error });
                }
            }
        }
        Ok(ListResult::Completed)
    }

    /// Mark `commands[from..]` aborted.
    fn abort_from(&self, commands: &mut [DisplayCommand], from: usize) {
        for index in from..commands.len() {
            self.transition(commands, index, CommandStatus::Aborted);
        }
    }

    fn transition(&self, commands: &mut [DisplayCommand], index: usize, status: CommandStatus) {
        let command = &mut commands[index];
        command.status = status;
        tracing::info!(index, cmd = %command.command.cmd, %status, "command status");
        self.events.emit(EngineEvent::StatusChanged {
            index,
            cmd: command.command.cmd.clone(),
            status,
        });
    }
}

fn describe_failure(cmd: &str, error: &Error, previous: &[String]) -> String {
    let mut description = format!("Error executing command '{}': {}", cmd, error);
    if !previous.is_empty() {
        description.push_str("\nEarlier failed attempts:");
        for failure in previous {
            description.push_str("\n- ");
            description.push_str(failure);
        }
    }
    description
}
