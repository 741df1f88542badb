//! Operator prompts.
//!
//! The [`Prompt`] trait is the only way drivers read input. Helpers on top
//! of it implement defaults, yes/no questions and bounded retries.

use std::io::{self, BufRead, Write};

use swarmstack_core::validators::validate_password;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PromptError {
    /// Standard input reached end of file.
    #[error("input closed")]
    Closed,

    #[error("no valid {what} after {attempts} attempts")]
    AttemptsExhausted { what: String, attempts: u32 },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub trait Prompt {
    /// Show `message` and read one line, without the line terminator.
    fn line(&mut self, message: &str) -> Result<String, PromptError>;

    /// Like [`Prompt::line`] but without echoing the input.
    fn secret(&mut self, message: &str) -> Result<String, PromptError>;
}

/// Reads from the process's stdin.
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn line(&mut self, message: &str) -> Result<String, PromptError> {
        print!("{message}");
        io::stdout().flush()?;
        read_stdin_line()
    }

    fn secret(&mut self, message: &str) -> Result<String, PromptError> {
        print!("{message}");
        io::stdout().flush()?;
        let guard = EchoGuard::disable();
        let result = read_stdin_line();
        if guard.is_active() {
            println!();
        }
        result
    }
}

fn read_stdin_line() -> Result<String, PromptError> {
    let mut buf = String::new();
    if io::stdin().lock().read_line(&mut buf)? == 0 {
        return Err(PromptError::Closed);
    }
    Ok(buf.trim_end_matches(['\r', '\n']).to_string())
}

/// Turns terminal echo off until dropped. Inert when stdin is not a tty.
struct EchoGuard {
    original: Option<libc::termios>,
}

impl EchoGuard {
    fn disable() -> Self {
        // SAFETY: termios is plain data; the calls only read and write the
        // struct we pass and the attributes of fd 0.
        unsafe {
            if libc::isatty(libc::STDIN_FILENO) != 1 {
                return Self { original: None };
            }
            let mut term: libc::termios = std::mem::zeroed();
            if libc::tcgetattr(libc::STDIN_FILENO, &mut term) != 0 {
                return Self { original: None };
            }
            let original = term;
            term.c_lflag &= !libc::ECHO;
            if libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &term) != 0 {
                return Self { original: None };
            }
            Self {
                original: Some(original),
            }
        }
    }

    fn is_active(&self) -> bool {
        self.original.is_some()
    }
}

impl Drop for EchoGuard {
    fn drop(&mut self) {
        if let Some(original) = self.original {
            // SAFETY: restores attributes previously read from the same fd.
            unsafe {
                libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &original);
            }
        }
    }
}

/// Yes/no question; an empty answer picks `default`.
pub fn confirm(prompt: &mut dyn Prompt, question: &str, default: bool) -> Result<bool, PromptError> {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    let answer = prompt.line(&format!("{question} {hint}: "))?;
    Ok(match answer.trim().to_lowercase().as_str() {
        "" => default,
        "y" | "yes" => true,
        _ => false,
    })
}

/// Free-form answer; an empty answer picks `default`.
pub fn ask_with_default(
    prompt: &mut dyn Prompt,
    label: &str,
    default: &str,
) -> Result<String, PromptError> {
    let answer = prompt.line(&format!("{label} [{default}]: "))?;
    let answer = answer.trim();
    Ok(if answer.is_empty() {
        default.to_string()
    } else {
        answer.to_string()
    })
}

/// Ask until `is_valid` accepts the answer, at most `max_attempts` times.
///
/// An empty answer picks `default` when there is one. When the attempts run
/// out the default is used if present, otherwise the question is abandoned
/// with [`PromptError::AttemptsExhausted`].
pub fn ask_valid(
    prompt: &mut dyn Prompt,
    label: &str,
    default: Option<&str>,
    max_attempts: u32,
    is_valid: impl Fn(&str) -> bool,
) -> Result<String, PromptError> {
    let message = match default {
        Some(d) => format!("{label} [{d}]: "),
        None => format!("{label}: "),
    };

    for attempt in 1..=max_attempts {
        let answer = prompt.line(&message)?;
        let answer = answer.trim();

        if answer.is_empty() {
            if let Some(d) = default {
                return Ok(d.to_string());
            }
        } else if is_valid(answer) {
            return Ok(answer.to_string());
        }

        let left = max_attempts - attempt;
        if left > 0 {
            println!("✗ Invalid {label}. {left} attempt(s) left.");
        }
    }

    match default {
        Some(d) => {
            println!("⚠ Using default {label}: {d}");
            Ok(d.to_string())
        }
        None => Err(PromptError::AttemptsExhausted {
            what: label.to_string(),
            attempts: max_attempts,
        }),
    }
}

/// Ask for a password that passes the strength rules, entered twice.
pub fn ask_secure_password(
    prompt: &mut dyn Prompt,
    label: &str,
    max_attempts: u32,
) -> Result<String, PromptError> {
    for attempt in 1..=max_attempts {
        let password = prompt.secret(&format!("{label}: "))?;
        let issues = validate_password(&password);
        if !issues.is_empty() {
            println!("✗ Password rejected:");
            for issue in &issues {
                println!("  - {issue}");
            }
        } else if prompt.secret("Repeat password: ")? == password {
            return Ok(password);
        } else {
            println!("✗ Passwords do not match.");
        }

        let left = max_attempts - attempt;
        if left > 0 {
            println!("  {left} attempt(s) left.");
        }
    }

    Err(PromptError::AttemptsExhausted {
        what: label.to_string(),
        attempts: max_attempts,
    })
}

/// Wait for ENTER.
pub fn pause(prompt: &mut dyn Prompt) -> Result<(), PromptError> {
    prompt.line("\nPress ENTER to continue...")?;
    Ok(())
}

/// Typed confirmation for destructive actions: the exact phrase must be entered.
pub fn confirm_phrase(prompt: &mut dyn Prompt, phrase: &str) -> Result<bool, PromptError> {
    let answer = prompt.line(&format!("Type '{phrase}' to confirm: "))?;
    Ok(answer.trim() == phrase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedPrompt;

    #[test]
    fn test_confirm_defaults_and_answers() {
        let mut prompt = ScriptedPrompt::new(["", "y", "no", "YES"]);
        assert!(!confirm(&mut prompt, "Reinstall?", false).unwrap());
        assert!(confirm(&mut prompt, "Reinstall?", false).unwrap());
        assert!(!confirm(&mut prompt, "Reinstall?", true).unwrap());
        assert!(confirm(&mut prompt, "Reinstall?", false).unwrap());
    }

    #[test]
    fn test_ask_with_default() {
        let mut prompt = ScriptedPrompt::new(["", "  Acme  "]);
        assert_eq!(ask_with_default(&mut prompt, "Company", "My Company").unwrap(), "My Company");
        assert_eq!(ask_with_default(&mut prompt, "Company", "My Company").unwrap(), "Acme");
    }

    #[test]
    fn test_ask_valid_retries_then_accepts() {
        let mut prompt = ScriptedPrompt::new(["not a port", "99999", "587"]);
        let port = ask_valid(&mut prompt, "SMTP port", None, 3, |p| {
            swarmstack_core::validators::validate_port(p)
        })
        .unwrap();
        assert_eq!(port, "587");
        assert!(prompt.is_exhausted());
    }

    #[test]
    fn test_ask_valid_falls_back_to_default() {
        let mut prompt = ScriptedPrompt::new(["x", "y", "z"]);
        let domain = ask_valid(&mut prompt, "domain", Some("chatwoot.localhost"), 3, |_| false)
            .unwrap();
        assert_eq!(domain, "chatwoot.localhost");
    }

    #[test]
    fn test_ask_valid_without_default_gives_up() {
        let mut prompt = ScriptedPrompt::new(["x", "y", "z", "never read"]);
        let err = ask_valid(&mut prompt, "email", None, 3, |_| false).unwrap_err();
        assert!(matches!(err, PromptError::AttemptsExhausted { attempts: 3, .. }));
        assert!(!prompt.is_exhausted());
    }

    #[test]
    fn test_ask_valid_on_closed_input() {
        let mut prompt = ScriptedPrompt::new(Vec::<&str>::new());
        assert!(matches!(
            ask_valid(&mut prompt, "email", None, 3, |_| true),
            Err(PromptError::Closed)
        ));
    }

    #[test]
    fn test_secure_password_requires_strength_and_match() {
        let mut prompt = ScriptedPrompt::new([
            "weak",
            "Str0ng!Passw0rd",
            "Str0ng!Passw0rX",
            "Str0ng!Passw0rd",
            "Str0ng!Passw0rd",
        ]);
        let password = ask_secure_password(&mut prompt, "Admin password", 3).unwrap();
        assert_eq!(password, "Str0ng!Passw0rd");
    }

    #[test]
    fn test_confirm_phrase_is_exact() {
        let mut prompt = ScriptedPrompt::new(["delete everything", "DELETE EVERYTHING"]);
        assert!(!confirm_phrase(&mut prompt, "DELETE EVERYTHING").unwrap());
        assert!(confirm_phrase(&mut prompt, "DELETE EVERYTHING").unwrap());
    }
}
