use shared::{Error, Result};
use std::fs;
use std::path::Path;

const INITIAL_PROMPT: &str = r#"You are shai, a command-line assistant that turns requests into shell commands.
Before answering, gather the context you need with the available tools: list directories,
read the head of files, stat paths, search for files, and consult man or tldr pages for
unfamiliar flags. Only call tools that help answer the request. Never guess file names
that you could look up. When you have enough context, reply with a short plan in plain
text and stop calling tools."#;

const EXPLAIN_PROMPT: &str = r#"Explain, in two or three short sentences, what you are about to do to fulfil the
request and why. Mention anything destructive. Do not output the commands themselves
as a code block."#;

const COMMAND_PROMPT: &str = r#"Produce the shell commands that fulfil the request, in execution order. Each command
must be a single line that runs non-interactively in the user's shell. Give a short
explanation for each one and set "dangerous" to true for anything that deletes,
overwrites, or changes system state. Directory changes must be their own "cd" command.
Do not use export, alias, unalias, source or the "." builtin. Return an empty list if
nothing needs to run."#;

const ERROR_PROMPT: &str = r#"The previous command failed. Investigate the error with the available tools, work out
the cause, and describe how you will fix it."#;

const ERROR_COMMAND_PROMPT: &str = r#"Produce the commands that recover from the failure and complete the original request.
They replace every command that has not run yet, so include all remaining steps.
Return an empty list if the request cannot be completed."#;

/// Prompt texts used by the orchestration engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompts {
    pub initial: String,
    pub explain: String,
    pub command: String,
    pub error: String,
    pub error_command: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            initial: INITIAL_PROMPT.to_string(),
            explain: EXPLAIN_PROMPT.to_string(),
            command: COMMAND_PROMPT.to_string(),
            error: ERROR_PROMPT.to_string(),
            error_command: ERROR_COMMAND_PROMPT.to_string(),
        }
    }
}

impl Prompts {
    /// Built-in prompts, each replaced by `<name>_prompt.txt` from `dir`
    /// when that file exists.
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let mut prompts = Self::default();
        let Some(dir) = dir else {
            return Ok(prompts);
        };

        for (file, slot) in [
            ("initial_prompt.txt", &mut prompts.initial),
            ("explain_prompt.txt", &mut prompts.explain),
            ("command_prompt.txt", &mut prompts.command),
            ("error_prompt.txt", &mut prompts.error),
            ("error_command_prompt.txt", &mut prompts.error_command),
        ] {
            let path = dir.join(file);
            if !path.exists() {
                continue;
            }
            let text = fs::read_to_string(&path).map_err(|e| {
                Error::Configuration(format!("cannot read prompt {}: {}", path.display(), e))
            })?;
            *slot = text.trim().to_string();
        }

        Ok(prompts)
    }
}
