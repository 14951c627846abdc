use colored::Colorize;
use crossterm::event::{read, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use dialoguer::console::Term;
use std::io;

/// Restores cooked mode even when reading a key fails.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// Answer selected by a single key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAnswer {
    Yes,
    No,
    Default,
    Ignored,
}

/// Map a key press onto a yes/no answer. Ctrl-C and Esc count as "no".
pub fn classify_key(key: &KeyEvent) -> KeyAnswer {
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => KeyAnswer::No,
        KeyCode::Char('y') | KeyCode::Char('Y') => KeyAnswer::Yes,
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => KeyAnswer::No,
        KeyCode::Enter => KeyAnswer::Default,
        _ => KeyAnswer::Ignored,
    }
}

/// Single-keypress confirmation prompt: y/Y, n/N, or Enter for the default.
pub fn ask_confirmation(prompt: &str, default_yes: bool) -> io::Result<bool> {
    let term = Term::stdout();
    let default_hint = if default_yes { "[Y/n]" } else { "[y/N]" };
    term.write_str(&format!("{prompt} {default_hint} "))?;
    term.flush()?;

    let result = {
        let _raw = RawModeGuard::enable()?;
        loop {
            if let Event::Key(key) = read()? {
                match classify_key(&key) {
                    KeyAnswer::Yes => break true,
                    KeyAnswer::No => break false,
                    KeyAnswer::Default => break default_yes,
                    KeyAnswer::Ignored => continue,
                }
            }
        }
    };

    // Echo selection with color for clarity.
    let selection = if result { "y".green() } else { "n".red() };
    term.write_line(&selection.to_string())?;

    Ok(result)
}
