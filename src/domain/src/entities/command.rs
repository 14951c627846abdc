use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// A shell command proposed by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Command {
    pub cmd: String,
    pub explanation: String,
    #[serde(default)]
    pub dangerous: bool,
}

/// Ordered list of commands; an empty list means "nothing to run".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandsResponse {
    pub commands: Vec<Command>,
}

impl CommandsResponse {
    pub fn new(commands: Vec<Command>) -> Self {
        Self { commands }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Parse and validate a structured payload. Blank command text is
    /// rejected along with anything serde refuses.
    pub fn from_value(value: Value) -> Result<Self, String> {
        let response: Self = serde_json::from_value(value).map_err(|e| e.to_string())?;
        if let Some(position) = response.commands.iter().position(|c| c.cmd.trim().is_empty()) {
            return Err(format!("command #{} has an empty 'cmd'", position + 1));
        }
        Ok(response)
    }

    /// JSON schema the structured-output request is constrained to.
    pub fn json_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "commands": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "cmd": {
                                "type": "string",
                                "description": "The shell command to run"
                            },
                            "explanation": {
                                "type": "string",
                                "description": "Why this command is needed"
                            },
                            "dangerous": {
                                "type": "boolean",
                                "description": "True if the command deletes, overwrites or otherwise changes state irreversibly"
                            }
                        },
                        "required": ["cmd", "explanation", "dangerous"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["commands"],
            "additionalProperties": false
        })
    }

    pub fn into_display(self) -> Vec<DisplayCommand> {
        self.commands.into_iter().map(DisplayCommand::new).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    Running,
    Success,
    Error,
    Aborted,
}

impl CommandStatus {
    /// `success`, `error` and `aborted` are final for a command.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Aborted)
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandStatus::Pending => write!(f, "pending"),
            CommandStatus::Running => write!(f, "running"),
            CommandStatus::Success => write!(f, "success"),
            CommandStatus::Error => write!(f, "error"),
            CommandStatus::Aborted => write!(f, "aborted"),
        }
    }
}

/// A command together with its execution status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayCommand {
    pub command: Command,
    pub status: CommandStatus,
}

impl DisplayCommand {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            status: CommandStatus::Pending,
        }
    }
}
