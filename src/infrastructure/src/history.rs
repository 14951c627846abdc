use crate::config::HistoryConfig;
use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const NOISE_COMMANDS: [&str; 6] = ["cd", "ls", "pwd", "clear", "exit", "shai"];
const MIN_COMMAND_LEN: usize = 3;

/// `$HISTFILE`, else `~/.zsh_history`.
pub fn history_path() -> Option<PathBuf> {
    if let Ok(path) = env::var("HISTFILE") {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(shellexpand::tilde(&path).into_owned()));
        }
    }
    env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".zsh_history"))
}

/// Strip the zsh extended-history prefix `: <ts>:<elapsed>;`.
pub fn parse_history_line(line: &str) -> &str {
    let line = line.trim();
    if line.starts_with(':') {
        if let Some((_, command)) = line.split_once(';') {
            return command.trim();
        }
    }
    line
}

fn is_noise(command: &str) -> bool {
    if command.len() < MIN_COMMAND_LEN {
        return true;
    }
    let first = command.split_whitespace().next().unwrap_or("");
    NOISE_COMMANDS.contains(&first)
}

/// Recent meaningful commands, oldest first, most recent occurrence kept.
pub fn recent_commands(content: &str, lines: usize, max_results: usize) -> Vec<String> {
    let all: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    let window = &all[all.len().saturating_sub(lines)..];

    let mut seen = HashSet::new();
    let mut newest_first: Vec<String> = Vec::new();
    for raw in window.iter().rev() {
        let command = parse_history_line(raw);
        if command.is_empty() || is_noise(command) {
            continue;
        }
        if seen.insert(command.to_string()) {
            newest_first.push(command.to_string());
        }
        if newest_first.len() == max_results {
            break;
        }
    }

    newest_first.reverse();
    newest_first
}

/// Read recent commands from `path`; an unreadable file yields nothing.
pub fn load_recent_commands(path: &Path, config: &HistoryConfig) -> Vec<String> {
    if config.disabled {
        return Vec::new();
    }
    match fs::read(path) {
        Ok(bytes) => recent_commands(&String::from_utf8_lossy(&bytes), config.lines, config.max_results),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "shell history unavailable");
            Vec::new()
        }
    }
}

/// System message text listing recent commands, `None` when empty.
pub fn history_context(commands: &[String]) -> Option<String> {
    if commands.is_empty() {
        return None;
    }
    let listing = commands
        .iter()
        .map(|c| format!("- {}", c))
        .collect::<Vec<_>>()
        .join("\n");
    Some(format!(
        "Recent commands from the user's shell history, oldest first:\n{}",
        listing
    ))
}
