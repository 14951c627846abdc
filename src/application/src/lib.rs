pub mod context_builder;
pub mod conversation;
pub mod execution_engine;
pub mod generator;
pub mod session;

#[cfg(test)]
mod testing;

pub use context_builder::{ContextBuilder, ContextOutcome};
pub use conversation::Conversation;
pub use execution_engine::{ExecutionEngine, ExecutionOutcome, RecoveryPrompts};
pub use generator::{Generation, Generator};
pub use session::{Collaborators, Session, SessionOptions};
