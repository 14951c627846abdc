use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use shared::{Error, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Shell history context settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub disabled: bool,
    /// Non-blank history lines read from the end of the file.
    pub lines: usize,
    /// Commands kept after filtering.
    pub max_results: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            lines: 50,
            max_results: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    /// Longest silence tolerated while waiting on the provider.
    pub request_timeout_secs: u64,
    /// Upper bound on consecutive recovery attempts in one run.
    pub max_recovery_attempts: usize,
    /// Upper bound on tool rounds per context build; `None` is unbounded.
    pub max_tool_rounds: Option<usize>,
    pub max_tool_output_bytes: usize,
    pub shell: String,
    /// Collect command output for display instead of handing commands the terminal.
    pub capture_output: bool,
    pub prompts_dir: Option<PathBuf>,
    pub history: HistoryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout_secs: 120,
            max_recovery_attempts: 3,
            max_tool_rounds: None,
            max_tool_output_bytes: 16 * 1024,
            shell: "/bin/sh".to_string(),
            capture_output: false,
            prompts_dir: None,
            history: HistoryConfig::default(),
        }
    }
}

impl Config {
    /// Load `.env`, then the TOML config file if one exists, then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::load_from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    /// `$SHAI_CONFIG`, else `~/.config/shai/config.toml`.
    pub fn config_path() -> Option<PathBuf> {
        if let Ok(path) = env::var("SHAI_CONFIG") {
            return Some(PathBuf::from(shellexpand::tilde(&path).into_owned()));
        }
        env::var("HOME")
            .ok()
            .map(|home| PathBuf::from(home).join(".config/shai/config.toml"))
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply environment-style overrides. Unparseable numbers are ignored and
    /// leave the previous value in place.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("API_KEY").or_else(|| non_empty("OPENAI_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(url) = non_empty("BASE_URL") {
            self.base_url = url;
        }
        if let Some(model) = non_empty("MODEL") {
            self.model = model;
        }
        if let Some(shell) = non_empty("SHELL") {
            self.shell = shell;
        }
        if let Some(dir) = non_empty("SHAI_PROMPTS_DIR") {
            self.prompts_dir = Some(PathBuf::from(shellexpand::tilde(&dir).into_owned()));
        }

        parse_into(non_empty("SHAI_REQUEST_TIMEOUT"), &mut self.request_timeout_secs);
        parse_into(non_empty("SHAI_MAX_RECOVERY"), &mut self.max_recovery_attempts);
        parse_into(non_empty("SHAI_MAX_TOOL_OUTPUT"), &mut self.max_tool_output_bytes);
        parse_into(non_empty("SHAI_HISTORY_LINES"), &mut self.history.lines);
        if let Some(rounds) = non_empty("SHAI_MAX_TOOL_ROUNDS").and_then(|v| v.parse().ok()) {
            self.max_tool_rounds = Some(rounds);
        }
        if let Some(flag) = non_empty("SHAI_HISTORY_DISABLE") {
            self.history.disabled = parse_flag(&flag);
        }
        if let Some(flag) = non_empty("SHAI_CAPTURE_OUTPUT") {
            self.capture_output = parse_flag(&flag);
        }
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            Error::Configuration("API_KEY must be provided (environment, .env or config file)".into())
        })
    }
}

fn parse_into<T: FromStr>(value: Option<String>, target: &mut T) {
    if let Some(parsed) = value.and_then(|v| v.trim().parse().ok()) {
        *target = parsed;
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Host facts given to the model with the initial prompt.
#[derive(Clone, Debug, PartialEq)]
pub struct SystemContext {
    pub os_type: String,
    pub architecture: String,
    pub shell: String,
    pub user: String,
    pub current_dir: String,
}

impl SystemContext {
    pub fn gather() -> Self {
        let shell_path = env::var("SHELL").ok();
        Self {
            os_type: os_display_name(env::consts::OS),
            architecture: env::consts::ARCH.to_string(),
            shell: shell_name(shell_path.as_deref()),
            user: env::var("USER").unwrap_or_else(|_| "unknown".to_string()),
            current_dir: env::current_dir()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| ".".to_string()),
        }
    }

    pub fn to_context_string(&self) -> String {
        format!(
            "You are running on {} ({}) using {}. User: {}. Working directory: {}.",
            self.os_type, self.architecture, self.shell, self.user, self.current_dir
        )
    }
}

fn os_display_name(os: &str) -> String {
    match os {
        "macos" | "darwin" => "macOS".to_string(),
        other => other.to_string(),
    }
}

/// Basename of the shell path, `zsh` when unknown.
fn shell_name(path: Option<&str>) -> String {
    path.and_then(|p| p.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .unwrap_or("zsh")
        .to_string()
}
