use async_trait::async_trait;
use domain::events::EventSink;
use domain::services::{CommandOutput, CommandRunner};
use once_cell::sync::Lazy;
use regex::Regex;
use shared::{Error, Result};
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

const STDERR_TAIL_LINES: usize = 20;
const MAX_TAIL_LINE_BYTES: usize = 1024;
/// Per-stream cap on output kept in [`OutputMode::Capture`].
const MAX_CAPTURED_BYTES: usize = 64 * 1024;
const CAPTURE_TRUNCATED: &str = "\n[output truncated]\n";

static UNSUPPORTED_BUILTIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:(?:export|alias|unalias|source)\b|\.(?:\s|$))")
        .expect("builtin deny pattern is valid")
});

/// Where a command's output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// stdout is the terminal; stderr is copied to the terminal as it arrives.
    #[default]
    Terminal,
    /// Both streams are collected (bounded) and returned for display.
    Capture,
}

/// Runs commands through `$SHELL -c` against a tracked working directory.
///
/// The process working directory is never changed; `cd` only moves the
/// tracked directory that later commands and tools run in.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    working_directory: PathBuf,
    previous_directory: Option<PathBuf>,
    shell: String,
    output: OutputMode,
    events: EventSink,
}

impl ShellExecutor {
    pub fn new(working_directory: PathBuf, shell: impl Into<String>) -> Self {
        Self {
            working_directory,
            previous_directory: None,
            shell: shell.into(),
            output: OutputMode::default(),
            events: EventSink::disabled(),
        }
    }

    /// Start in the process's current directory.
    pub fn from_current_dir(shell: impl Into<String>) -> Result<Self> {
        Ok(Self::new(std::env::current_dir()?, shell))
    }

    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    /// Flush `events` before a command takes over the terminal.
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn is_unsupported(command: &str) -> bool {
        UNSUPPORTED_BUILTIN.is_match(command)
    }

    fn change_directory(&mut self, target: Option<&str>) -> Result<PathBuf> {
        let requested = target.unwrap_or("~");
        let fail = |message: String| Error::DirectoryChange {
            target: requested.to_string(),
            message,
        };

        let candidate = if requested == "-" {
            self.previous_directory
                .clone()
                .ok_or_else(|| fail("no previous directory".to_string()))?
        } else {
            let expanded = shellexpand::full(requested).map_err(|e| fail(e.to_string()))?;
            if expanded.starts_with('~') {
                return Err(fail("home directory is unknown".to_string()));
            }
            let path = PathBuf::from(expanded.as_ref());
            if path.is_absolute() {
                path
            } else {
                self.working_directory.join(path)
            }
        };

        let resolved = candidate
            .canonicalize()
            .map_err(|e| fail(e.to_string()))?;
        if !resolved.is_dir() {
            return Err(fail("not a directory".to_string()));
        }

        let previous = std::mem::replace(&mut self.working_directory, resolved.clone());
        self.previous_directory = Some(previous);
        tracing::debug!(directory = %resolved.display(), "working directory changed");
        Ok(resolved)
    }

    async fn spawn(&self, command: &str) -> Result<CommandOutput> {
        let exec_error = |message: String| Error::Execution {
            command: command.to_string(),
            message,
        };
        let stdout = match self.output {
            OutputMode::Terminal => {
                self.events.flush().await;
                Stdio::inherit()
            }
            OutputMode::Capture => Stdio::piped(),
        };

        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .current_dir(&self.working_directory)
            .stdin(Stdio::inherit())
            .stdout(stdout)
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| exec_error(format!("failed to start {}: {}", self.shell, e)))?;

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let capture = self.output == OutputMode::Capture;

        let (status, stdout, stderr) = tokio::join!(
            child.wait(),
            async {
                match stdout_pipe {
                    Some(pipe) => collect_bounded(pipe).await,
                    None => Ok(String::new()),
                }
            },
            async {
                match stderr_pipe {
                    Some(pipe) => drain_stderr(pipe, !capture).await,
                    None => Ok((String::new(), StderrTail::default())),
                }
            }
        );
        let status = status.map_err(|e| exec_error(format!("failed to wait: {}", e)))?;
        let stdout = stdout.map_err(|e| exec_error(format!("cannot read output: {}", e)))?;
        let (stderr, tail) = stderr.map_err(|e| exec_error(format!("cannot read output: {}", e)))?;

        if !status.success() {
            let tail = tail.into_text();
            let message = if tail.is_empty() {
                format!("exited with {}", status)
            } else {
                format!("exited with {}: {}", status, tail)
            };
            return Err(exec_error(message));
        }

        Ok(CommandOutput {
            stdout,
            stderr,
            directory_change: None,
        })
    }
}

/// Last non-blank lines of a stream, each cut to [`MAX_TAIL_LINE_BYTES`].
#[derive(Debug, Default)]
struct StderrTail {
    lines: VecDeque<String>,
    partial: Vec<u8>,
}

impl StderrTail {
    fn push(&mut self, bytes: &[u8]) {
        for piece in bytes.split_inclusive(|b| *b == b'\n') {
            let (text, complete) = match piece.strip_suffix(b"\n") {
                Some(text) => (text, true),
                None => (piece, false),
            };
            let room = MAX_TAIL_LINE_BYTES.saturating_sub(self.partial.len());
            self.partial.extend_from_slice(&text[..text.len().min(room)]);
            if complete {
                self.finish_line();
            }
        }
    }

    fn finish_line(&mut self) {
        let bytes = std::mem::take(&mut self.partial);
        let line = String::from_utf8_lossy(&bytes).trim_end().to_string();
        if line.trim().is_empty() {
            return;
        }
        if self.lines.len() == STDERR_TAIL_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    fn into_text(mut self) -> String {
        self.finish_line();
        Vec::from(self.lines).join("\n").trim().to_string()
    }
}

/// Read `reader` to the end, keeping at most [`MAX_CAPTURED_BYTES`].
async fn collect_bounded<R: AsyncRead + Unpin>(mut reader: R) -> io::Result<String> {
    let mut kept = Vec::new();
    let mut truncated = false;
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let room = MAX_CAPTURED_BYTES - kept.len();
        if n > room {
            truncated = true;
        }
        kept.extend_from_slice(&buf[..n.min(room)]);
    }
    let mut text = String::from_utf8_lossy(&kept).into_owned();
    if truncated {
        text.push_str(CAPTURE_TRUNCATED);
    }
    Ok(text)
}

/// Drain stderr into a tail ring. With `echo` every byte is copied to the
/// terminal as it arrives and nothing else is kept; otherwise the stream is
/// also collected up to [`MAX_CAPTURED_BYTES`].
async fn drain_stderr<R: AsyncRead + Unpin>(
    mut reader: R,
    echo: bool,
) -> io::Result<(String, StderrTail)> {
    let mut tail = StderrTail::default();
    let mut kept = Vec::new();
    let mut truncated = false;
    let mut terminal = tokio::io::stderr();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let chunk = &buf[..n];
        tail.push(chunk);
        if echo {
            // A closed terminal must not stop the child from being drained.
            if terminal.write_all(chunk).await.is_ok() {
                let _ = terminal.flush().await;
            }
        } else {
            let room = MAX_CAPTURED_BYTES - kept.len();
            truncated |= n > room;
            kept.extend_from_slice(&chunk[..n.min(room)]);
        }
    }
    let mut text = String::from_utf8_lossy(&kept).into_owned();
    if truncated {
        text.push_str(CAPTURE_TRUNCATED);
    }
    Ok((text, tail))
}

/// Target of a standalone `cd`, `None` for anything else.
/// The inner `None` means bare `cd`. `-L`, `-P` and `--` are accepted and
/// ignored since the tracked directory is always resolved physically.
pub fn parse_cd(command: &str) -> Option<Result<Option<String>>> {
    let trimmed = command.trim();
    if ["&&", "||", ";", "|"].iter().any(|op| trimmed.contains(op)) {
        return None;
    }
    let words = match shell_words::split(trimmed) {
        Ok(words) => words,
        Err(_) => return None,
    };
    if words.first().map(String::as_str) != Some("cd") {
        return None;
    }

    let mut operands = &words[1..];
    while let Some(option) = operands.first() {
        match option.as_str() {
            "-L" | "-P" => operands = &operands[1..],
            "--" => {
                operands = &operands[1..];
                break;
            }
            _ => break,
        }
    }
    match operands {
        [] => Some(Ok(None)),
        [target] => Some(Ok(Some(target.clone()))),
        _ => Some(Err(Error::DirectoryChange {
            target: operands.join(" "),
            message: "too many arguments".to_string(),
        })),
    }
}

#[async_trait]
impl CommandRunner for ShellExecutor {
    async fn run(&mut self, command: &str) -> Result<CommandOutput> {
        if Self::is_unsupported(command) {
            return Err(Error::UnsupportedCommand(command.trim().to_string()));
        }

        if let Some(target) = parse_cd(command) {
            let directory = self.change_directory(target?.as_deref())?;
            return Ok(CommandOutput {
                directory_change: Some(directory),
                ..CommandOutput::default()
            });
        }

        self.spawn(command).await
    }

    fn working_directory(&self) -> &Path {
        &self.working_directory
    }
}
