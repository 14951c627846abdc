pub mod abort;
pub mod confirmation;
pub mod error;

pub use abort::AbortSignal;
pub use error::{Error, Result};
