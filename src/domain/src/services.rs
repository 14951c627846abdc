//! Collaborator traits the orchestration engine is written against

use crate::entities::command::DisplayCommand;
use crate::models::{Message, ModelReply, ToolDefinition};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::{Map, Value};
use shared::Result;
use std::path::{Path, PathBuf};

/// Lazy, finite sequence of explanation fragments.
pub type TextStream = BoxStream<'static, Result<String>>;

/// Named JSON schema a structured response must validate against.
#[derive(Debug, Clone)]
pub struct OutputSchema {
    pub name: String,
    pub schema: Value,
}

/// Language-model capability
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// One tool-enabled call: free text and zero or more tool calls.
    async fn respond(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<ModelReply>;

    /// Streamed free-text response.
    async fn stream_text(&self, messages: &[Message]) -> Result<TextStream>;

    /// Schema-constrained response. Returns the raw structured payload;
    /// a missing payload is an error.
    async fn structured(&self, messages: &[Message], schema: &OutputSchema) -> Result<Value>;
}

/// Read-only inspection tools the model may call while building context.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Run tool `name` in `working_dir`. Unknown names yield a sentinel text.
    async fn dispatch(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
        working_dir: &Path,
    ) -> Result<String>;
}

/// Result of one successfully executed command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Set when the command was a directory change.
    pub directory_change: Option<PathBuf>,
}

/// Runs shell command text against a tracked working directory.
#[async_trait]
pub trait CommandRunner: Send {
    async fn run(&mut self, command: &str) -> Result<CommandOutput>;

    fn working_directory(&self) -> &Path;
}

/// Yes/no gate shown before a command list is executed.
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    async fn confirm(&self, commands: &[DisplayCommand]) -> Result<bool>;
}

/// Gate that approves everything, used for `--yes`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait]
impl ConfirmationGate for AutoApprove {
    async fn confirm(&self, _commands: &[DisplayCommand]) -> Result<bool> {
        Ok(true)
    }
}
