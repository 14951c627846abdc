//! Data model and collaborator traits for the shai orchestration engine.

pub mod entities;
pub mod events;
pub mod models;
pub mod services;

pub use entities::command::{Command, CommandStatus, CommandsResponse, DisplayCommand};
pub use events::{EngineEvent, EventSink, FlushToken};
pub use models::{Message, ModelReply, Role, ToolCall, ToolDefinition};
