//! Update events emitted by the engine for the display layer.

use crate::entities::command::{CommandStatus, DisplayCommand};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

/// Event types emitted while building context, generating and executing.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A tool is about to be dispatched.
    ToolInvoked { name: String, arguments: String },
    /// A dispatched tool failed; the round ends with an error.
    ToolFailed { name: String, error: String },
    /// Fragment of the streamed explanation, in emission order.
    ExplanationChunk(String),
    /// Explanation finished (streamed, or the context builder's final text).
    ExplanationComplete(String),
    /// A command list was accepted for execution.
    CommandsProposed(Vec<DisplayCommand>),
    /// Status transition of the command at `index` in the current list.
    StatusChanged {
        index: usize,
        cmd: String,
        status: CommandStatus,
    },
    /// Captured output of a finished command.
    CommandOutput {
        index: usize,
        stdout: String,
        stderr: String,
    },
    /// A command failed and the failure is being fed back to the model.
    RecoveryStarted {
        attempt: usize,
        max_attempts: usize,
        error: String,
    },
    DirectoryChanged(PathBuf),
    /// Command generation failed; the run continues with no commands.
    GenerationFailed(String),
    /// Everything emitted before this event has been written out.
    Flush(FlushToken),
}

/// Acknowledgement handle carried by [`EngineEvent::Flush`].
#[derive(Clone)]
pub struct FlushToken(Arc<Mutex<Option<oneshot::Sender<()>>>>);

impl FlushToken {
    fn new() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self(Arc::new(Mutex::new(Some(tx)))), rx)
    }

    /// Wake the emitter waiting on this flush. Later calls do nothing.
    pub fn complete(&self) {
        let sender = match self.0.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(sender) = sender {
            let _ = sender.send(());
        }
    }
}

impl fmt::Debug for FlushToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FlushToken")
    }
}

impl PartialEq for FlushToken {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Non-blocking event producer. Sending never waits for the renderer and a
/// closed or absent receiver is ignored.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<mpsc::UnboundedSender<EngineEvent>>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { sender: Some(tx) }, rx)
    }

    /// A sink that drops every event.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: EngineEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }

    /// Wait until the consumer has handled every event emitted so far.
    /// Returns at once for a disabled sink, and as soon as the receiver is
    /// dropped.
    pub async fn flush(&self) {
        let Some(sender) = &self.sender else {
            return;
        };
        let (token, done) = FlushToken::new();
        if sender.send(EngineEvent::Flush(token)).is_ok() {
            let _ = done.await;
        }
    }
}
