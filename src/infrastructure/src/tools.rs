use async_trait::async_trait;
use domain::models::{ParameterProperty, ToolDefinition, ToolParameters};
use domain::services::ToolDispatcher;
use serde_json::{json, Map, Value};
use shared::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

const TRUNCATION_MARKER: &str = "\n[output truncated]";

/// The fixed set of read-only inspection tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InspectionTool {
    ListDirectory,
    ManPage,
    TldrPage,
    FileHead,
    FileStat,
    SearchFiles,
}

/// External program invocation a tool maps onto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: &'static str,
    pub args: Vec<String>,
    pub envs: Vec<(&'static str, &'static str)>,
}

impl InspectionTool {
    pub const ALL: [InspectionTool; 6] = [
        InspectionTool::ListDirectory,
        InspectionTool::ManPage,
        InspectionTool::TldrPage,
        InspectionTool::FileHead,
        InspectionTool::FileStat,
        InspectionTool::SearchFiles,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            InspectionTool::ListDirectory => "get_ls_output",
            InspectionTool::ManPage => "get_man_page",
            InspectionTool::TldrPage => "get_tldr_page",
            InspectionTool::FileHead => "read_file_head",
            InspectionTool::FileStat => "stat_file",
            InspectionTool::SearchFiles => "search_files",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            InspectionTool::ListDirectory => "Get the contents of a directory using 'ls -la'.",
            InspectionTool::ManPage => "Get the man page for a given command.",
            InspectionTool::TldrPage => "Get the TLDR page for a command.",
            InspectionTool::FileHead => {
                "Read the first lines of a file to help determine its structure."
            }
            InspectionTool::FileStat => "Get metadata about a file or directory.",
            InspectionTool::SearchFiles => "Find files with names matching a pattern.",
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        let mut properties = BTreeMap::new();
        let required: Vec<&str> = match self {
            InspectionTool::ListDirectory => {
                properties.insert(
                    "path".to_string(),
                    ParameterProperty::string(
                        "Path to the directory. Defaults to the current directory.",
                    )
                    .with_default(json!(".")),
                );
                vec![]
            }
            InspectionTool::ManPage | InspectionTool::TldrPage => {
                properties.insert(
                    "command".to_string(),
                    ParameterProperty::string("Name of the command"),
                );
                vec!["command"]
            }
            InspectionTool::FileHead => {
                properties.insert("path".to_string(), ParameterProperty::string("Path to the file"));
                properties.insert(
                    "num_lines".to_string(),
                    ParameterProperty::integer("Number of lines to read from the top (default 20)")
                        .with_default(json!(20)),
                );
                vec!["path"]
            }
            InspectionTool::FileStat => {
                properties.insert(
                    "path".to_string(),
                    ParameterProperty::string("Path to the file or directory"),
                );
                vec!["path"]
            }
            InspectionTool::SearchFiles => {
                properties.insert(
                    "pattern".to_string(),
                    ParameterProperty::string("Pattern to search (e.g., *.log)"),
                );
                properties.insert(
                    "path".to_string(),
                    ParameterProperty::string("Where to start searching").with_default(json!(".")),
                );
                vec!["pattern"]
            }
        };

        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: ToolParameters {
                param_type: "object".to_string(),
                properties,
                required: required.into_iter().map(String::from).collect(),
            },
        }
    }

    /// Build the program invocation for already-validated arguments.
    pub fn invocation(&self, args: &Map<String, Value>) -> Result<Invocation> {
        let invocation = match self {
            InspectionTool::ListDirectory => Invocation {
                program: "ls",
                args: vec!["-la".into(), operand(string_arg(args, "path", "."))],
                envs: vec![],
            },
            InspectionTool::ManPage => Invocation {
                program: "man",
                args: vec![self.command_name(args)?],
                envs: vec![("MANPAGER", "cat"), ("MANWIDTH", "100")],
            },
            InspectionTool::TldrPage => Invocation {
                program: "tldr",
                args: vec![self.command_name(args)?],
                envs: vec![],
            },
            InspectionTool::FileHead => {
                let lines = args
                    .get("num_lines")
                    .and_then(Value::as_u64)
                    .unwrap_or(20)
                    .max(1);
                Invocation {
                    program: "head",
                    args: vec![format!("-n{}", lines), operand(string_arg(args, "path", ""))],
                    envs: vec![],
                }
            }
            InspectionTool::FileStat => Invocation {
                program: "stat",
                args: vec![operand(string_arg(args, "path", ""))],
                envs: vec![],
            },
            InspectionTool::SearchFiles => Invocation {
                program: "find",
                args: vec![
                    operand(string_arg(args, "path", ".")),
                    "-name".into(),
                    string_arg(args, "pattern", "*").to_string(),
                ],
                envs: vec![],
            },
        };
        Ok(invocation)
    }

    fn command_name(&self, args: &Map<String, Value>) -> Result<String> {
        let name = string_arg(args, "command", "").trim();
        if name.is_empty() || name.starts_with('-') {
            return Err(Error::ToolArguments {
                tool: self.name().to_string(),
                message: format!("'{}' is not a command name", name),
            });
        }
        Ok(name.to_string())
    }
}

fn string_arg<'a>(args: &'a Map<String, Value>, key: &str, default: &'a str) -> &'a str {
    args.get(key).and_then(Value::as_str).unwrap_or(default)
}

/// Keep a path operand from being read as an option.
fn operand(value: &str) -> String {
    if value.starts_with('-') {
        format!("./{}", value)
    } else {
        value.to_string()
    }
}

/// Cut `text` to at most `limit` bytes on a character boundary.
pub fn truncate_output(mut text: String, limit: usize) -> String {
    if text.len() <= limit {
        return text;
    }
    let mut cut = limit;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text.push_str(TRUNCATION_MARKER);
    text
}

/// Tool registry for the inspection tools offered to the model
pub struct ToolRegistry {
    tools: HashMap<String, InspectionTool>,
    max_output_bytes: usize,
}

impl ToolRegistry {
    pub fn new(max_output_bytes: usize) -> Self {
        let tools = InspectionTool::ALL
            .iter()
            .map(|tool| (tool.name().to_string(), *tool))
            .collect();
        Self {
            tools,
            max_output_bytes,
        }
    }

    pub fn get(&self, name: &str) -> Option<InspectionTool> {
        self.tools.get(name).copied()
    }

    pub fn unknown_tool_text(name: &str) -> String {
        format!("[unknown tool: {}]", name)
    }

    async fn invoke(&self, tool: InspectionTool, invocation: Invocation, working_dir: &Path) -> Result<String> {
        let dispatch_error = |message: String| Error::ToolDispatch {
            tool: tool.name().to_string(),
            message,
        };

        let output = Command::new(invocation.program)
            .args(&invocation.args)
            .envs(invocation.envs.iter().copied())
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| dispatch_error(format!("cannot run '{}': {}", invocation.program, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() && stdout.trim().is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("'{}' exited with {}", invocation.program, output.status)
            } else {
                stderr
            };
            return Err(dispatch_error(message));
        }

        Ok(truncate_output(stdout, self.max_output_bytes))
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new(16 * 1024)
    }
}

#[async_trait]
impl ToolDispatcher for ToolRegistry {
    fn definitions(&self) -> Vec<ToolDefinition> {
        InspectionTool::ALL.iter().map(InspectionTool::definition).collect()
    }

    async fn dispatch(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
        working_dir: &Path,
    ) -> Result<String> {
        let Some(tool) = self.get(name) else {
            tracing::debug!(tool = name, "unknown tool requested");
            return Ok(Self::unknown_tool_text(name));
        };

        tool.definition()
            .validate(arguments)
            .map_err(|message| Error::ToolArguments {
                tool: name.to_string(),
                message,
            })?;

        let invocation = tool.invocation(arguments)?;
        tracing::debug!(tool = name, program = invocation.program, args = ?invocation.args, "dispatching tool");
        self.invoke(tool, invocation, working_dir).await
    }
}
