//! Scripted collaborators shared by the scenario tests.

use application::{Collaborators, Session, SessionOptions};
use async_trait::async_trait;
use domain::events::{EngineEvent, EventSink};
use domain::models::{Message, ModelReply, ToolCall, ToolDefinition};
use domain::services::{
    CommandOutput, CommandRunner, ConfirmationGate, LanguageModel, OutputSchema, TextStream,
    ToolDispatcher,
};
use domain::DisplayCommand;
use futures::stream;
use infrastructure::Prompts;
use serde_json::{Map, Value};
use shared::{AbortSignal, Error, Result};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedReceiver;

pub fn reply(content: &str, tool_calls: Vec<ToolCall>) -> ModelReply {
    ModelReply {
        content: content.to_string(),
        tool_calls,
    }
}

pub fn call(id: &str, name: &str, arguments: &str) -> ToolCall {
    ToolCall::new(id, name, arguments)
}

pub fn commands_payload(cmds: &[(&str, bool)]) -> Value {
    let commands: Vec<Value> = cmds
        .iter()
        .map(|(cmd, dangerous)| {
            serde_json::json!({"cmd": cmd, "explanation": format!("run {}", cmd), "dangerous": dangerous})
        })
        .collect();
    serde_json::json!({ "commands": commands })
}

/// Model replaying queued tool-round replies, explanation chunks and
/// structured payloads. Exhausted queues yield a terminal empty reply and a
/// schema error respectively.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<ModelReply>>,
    chunks: Mutex<VecDeque<Vec<String>>>,
    payloads: Mutex<VecDeque<Result<Value>>>,
    respond_requests: Mutex<Vec<Vec<Message>>>,
    structured_calls: Mutex<usize>,
    abort_at_request: Option<(usize, AbortSignal)>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replies(self, replies: Vec<ModelReply>) -> Self {
        *self.replies.lock().unwrap() = replies.into();
        self
    }

    pub fn explanation(self, chunks: &[&str]) -> Self {
        self.chunks
            .lock()
            .unwrap()
            .push_back(chunks.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn payload(self, payload: Result<Value>) -> Self {
        self.payloads.lock().unwrap().push_back(payload);
        self
    }

    /// Raise `signal` while answering the `nth` (1-based) tool-round request.
    pub fn abort_at_request(mut self, nth: usize, signal: AbortSignal) -> Self {
        self.abort_at_request = Some((nth, signal));
        self
    }

    pub fn respond_requests(&self) -> Vec<Vec<Message>> {
        self.respond_requests.lock().unwrap().clone()
    }

    pub fn structured_calls(&self) -> usize {
        *self.structured_calls.lock().unwrap()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn respond(&self, messages: &[Message], _tools: &[ToolDefinition]) -> Result<ModelReply> {
        let count = {
            let mut requests = self.respond_requests.lock().unwrap();
            requests.push(messages.to_vec());
            requests.len()
        };
        if let Some((nth, signal)) = &self.abort_at_request {
            if *nth == count {
                signal.raise();
            }
        }
        Ok(self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| reply("", vec![])))
    }

    async fn stream_text(&self, _messages: &[Message]) -> Result<TextStream> {
        let chunks = self.chunks.lock().unwrap().pop_front().unwrap_or_default();
        Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok))))
    }

    async fn structured(&self, _messages: &[Message], _schema: &OutputSchema) -> Result<Value> {
        *self.structured_calls.lock().unwrap() += 1;
        self.payloads
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::SchemaValidation("no payload scripted".into())))
    }
}

/// Dispatcher that answers with `<name> output`; names starting with
/// `broken` fail.
#[derive(Default)]
pub struct StubTools {
    pub dispatched: Mutex<Vec<String>>,
}

#[async_trait]
impl ToolDispatcher for StubTools {
    fn definitions(&self) -> Vec<ToolDefinition> {
        Vec::new()
    }

    async fn dispatch(&self, name: &str, _arguments: &Map<String, Value>, _working_dir: &Path) -> Result<String> {
        self.dispatched.lock().unwrap().push(name.to_string());
        if name.starts_with("broken") {
            return Err(Error::ToolDispatch {
                tool: name.to_string(),
                message: "exited with status 2".into(),
            });
        }
        Ok(format!("{} output", name))
    }
}

/// Runner that fails listed commands and can raise an abort when a given
/// command starts.
pub struct ScriptedRunner {
    ran: Arc<Mutex<Vec<String>>>,
    failing: Vec<String>,
    abort_on: Option<(String, AbortSignal)>,
    working_directory: PathBuf,
}

impl ScriptedRunner {
    pub fn recording() -> (Self, Arc<Mutex<Vec<String>>>) {
        let ran = Arc::new(Mutex::new(Vec::new()));
        let runner = Self {
            ran: ran.clone(),
            failing: Vec::new(),
            abort_on: None,
            working_directory: PathBuf::from("/work"),
        };
        (runner, ran)
    }

    pub fn failing(mut self, commands: &[&str]) -> Self {
        self.failing = commands.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn abort_on(mut self, command: &str, signal: AbortSignal) -> Self {
        self.abort_on = Some((command.to_string(), signal));
        self
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&mut self, command: &str) -> Result<CommandOutput> {
        self.ran.lock().unwrap().push(command.to_string());
        if let Some((trigger, signal)) = &self.abort_on {
            if trigger == command {
                signal.raise();
            }
        }
        if self.failing.iter().any(|c| c == command) {
            return Err(Error::Execution {
                command: command.to_string(),
                message: "exited with exit status: 1: No such file or directory".into(),
            });
        }
        Ok(CommandOutput::default())
    }

    fn working_directory(&self) -> &Path {
        &self.working_directory
    }
}

/// Gate that gives queued answers, then a fixed one, and records every list
/// it was shown.
pub struct RecordingGate {
    answers: Mutex<VecDeque<bool>>,
    fallback: bool,
    pub shown: Mutex<Vec<Vec<DisplayCommand>>>,
}

impl RecordingGate {
    pub fn approving() -> Self {
        Self::answering(&[], true)
    }

    pub fn declining() -> Self {
        Self::answering(&[], false)
    }

    pub fn answering(answers: &[bool], fallback: bool) -> Self {
        Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            fallback,
            shown: Mutex::new(Vec::new()),
        }
    }

    pub fn times_shown(&self) -> usize {
        self.shown.lock().unwrap().len()
    }
}

#[async_trait]
impl ConfirmationGate for RecordingGate {
    async fn confirm(&self, commands: &[DisplayCommand]) -> Result<bool> {
        self.shown.lock().unwrap().push(commands.to_vec());
        Ok(self.answers.lock().unwrap().pop_front().unwrap_or(self.fallback))
    }
}

/// Session wired to fakes, with its event receiver.
pub fn session(
    model: Arc<dyn LanguageModel>,
    tools: Arc<dyn ToolDispatcher>,
    runner: Box<dyn CommandRunner>,
    gate: Arc<dyn ConfirmationGate>,
    abort: AbortSignal,
) -> (Session, UnboundedReceiver<EngineEvent>) {
    let (events, receiver) = EventSink::channel();
    let session = Session::new(
        Collaborators {
            model,
            tools,
            runner,
            gate,
        },
        Prompts::default(),
        SessionOptions {
            max_recovery_attempts: 3,
            ..SessionOptions::default()
        },
        events,
        abort,
    );
    (session, receiver)
}

/// Every event still queued; call after the session is dropped.
pub fn drain(receiver: &mut UnboundedReceiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}
