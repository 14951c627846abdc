//! Scripted collaborators for unit tests.

use async_trait::async_trait;
use domain::models::{Message, ModelReply, ToolCall, ToolDefinition};
use domain::services::{
    CommandOutput, CommandRunner, LanguageModel, OutputSchema, TextStream, ToolDispatcher,
};
use futures::stream;
use serde_json::{Map, Value};
use shared::{Error, Result};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub fn reply(content: &str, tool_calls: Vec<ToolCall>) -> ModelReply {
    ModelReply {
        content: content.to_string(),
        tool_calls,
    }
}

pub fn tool_call(id: &str, name: &str, arguments: &str) -> ToolCall {
    ToolCall::new(id, name, arguments)
}

/// Model that replays queued replies and records what it was sent.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<ModelReply>>,
    structured: Mutex<VecDeque<Result<Value>>>,
    chunks: Vec<String>,
    respond_calls: Mutex<usize>,
    structured_requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<ModelReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    pub fn with_chunks(mut self, chunks: &[&str]) -> Self {
        self.chunks = chunks.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_structured(self, payloads: Vec<Result<Value>>) -> Self {
        *self.structured.lock().unwrap() = payloads.into();
        self
    }

    pub fn respond_calls(&self) -> usize {
        *self.respond_calls.lock().unwrap()
    }

    pub fn structured_requests(&self) -> Vec<Vec<Message>> {
        self.structured_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn respond(&self, _messages: &[Message], _tools: &[ToolDefinition]) -> Result<ModelReply> {
        *self.respond_calls.lock().unwrap() += 1;
        Ok(self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| reply("", vec![])))
    }

    async fn stream_text(&self, _messages: &[Message]) -> Result<TextStream> {
        let chunks: Vec<Result<String>> = self.chunks.iter().cloned().map(Ok).collect();
        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn structured(&self, messages: &[Message], _schema: &OutputSchema) -> Result<Value> {
        self.structured_requests.lock().unwrap().push(messages.to_vec());
        self.structured
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::SchemaValidation("no payload".into())))
    }
}

/// Tool dispatcher that echoes the tool name; `fail` always fails.
#[derive(Default)]
pub struct EchoTools;

#[async_trait]
impl ToolDispatcher for EchoTools {
    fn definitions(&self) -> Vec<ToolDefinition> {
        Vec::new()
    }

    async fn dispatch(&self, name: &str, _arguments: &Map<String, Value>, _working_dir: &Path) -> Result<String> {
        if name == "fail" {
            return Err(Error::ToolDispatch {
                tool: name.to_string(),
                message: "boom".into(),
            });
        }
        Ok(format!("output of {}", name))
    }
}

/// Runner whose commands fail when they contain `fail`. Commands containing
/// `crash` return an error that recovery does not handle.
pub struct FakeRunner {
    pub ran: Vec<String>,
    working_directory: PathBuf,
}

impl Default for FakeRunner {
    fn default() -> Self {
        Self {
            ran: Vec::new(),
            working_directory: PathBuf::from("/work"),
        }
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&mut self, command: &str) -> Result<CommandOutput> {
        self.ran.push(command.to_string());
        if command.contains("crash") {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "terminal went away",
            )));
        }
        if command.contains("fail") {
            return Err(Error::Execution {
                command: command.to_string(),
                message: "exited with exit status: 1".into(),
            });
        }
        Ok(CommandOutput {
            stdout: format!("{}\n", command),
            ..CommandOutput::default()
        })
    }

    fn working_directory(&self) -> &Path {
        &self.working_directory
    }
}
