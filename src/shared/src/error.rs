use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A recognised tool was invoked but its external procedure failed.
    #[error("Tool '{tool}' failed: {message}")]
    ToolDispatch { tool: String, message: String },

    /// Tool arguments did not satisfy the declared parameter schema.
    #[error("Invalid arguments for tool '{tool}': {message}")]
    ToolArguments { tool: String, message: String },

    #[error("Model call failed: {0}")]
    ModelCall(String),

    #[error("Structured response rejected: {0}")]
    SchemaValidation(String),

    #[error("Unsupported command: {0}")]
    UnsupportedCommand(String),

    #[error("Failed to change directory to '{target}': {message}")]
    DirectoryChange { target: String, message: String },

    #[error("Command '{command}' failed: {message}")]
    Execution { command: String, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Errors raised by the shell executor. These feed the recovery loop
    /// instead of ending the program.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedCommand(_) | Error::DirectoryChange { .. } | Error::Execution { .. }
        )
    }

    /// Errors that end a context-building round after its tool results are recorded.
    pub fn is_tool_failure(&self) -> bool {
        matches!(self, Error::ToolDispatch { .. } | Error::ToolArguments { .. })
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Configuration(format!("TOML deserialization error: {}", err))
    }
}
