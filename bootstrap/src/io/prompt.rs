//! Yes/no confirmation from the user.
//!
//! The resolver only ever asks one question (whether to clean a dirty tool
//! checkout), but it must be scriptable in tests, so it sits behind
//! [`Confirm`].

use std::io::{BufRead, IsTerminal, Write};

use anyhow::{Context, Result};

/// Abstraction over interactive confirmation.
pub trait Confirm {
    /// Whether a human can answer right now.
    fn is_interactive(&self) -> bool;

    /// Ask `question`; `true` only for an explicit yes.
    fn confirm(&self, question: &str) -> Result<bool>;
}

/// Asks on stderr and reads the answer from stdin.
///
/// Interactive only when stdout is a terminal, so piping the launcher's output
/// never blocks on a hidden question.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn is_interactive(&self) -> bool {
        std::io::stdout().is_terminal()
    }

    fn confirm(&self, question: &str) -> Result<bool> {
        let mut stderr = std::io::stderr();
        write!(stderr, "{question} [y/N] ").context("write prompt")?;
        stderr.flush().context("flush prompt")?;
        let mut answer = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut answer)
            .context("read answer")?;
        Ok(is_yes(&answer))
    }
}

/// Never interactive; for non-terminal callers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoConfirm;

impl Confirm for NoConfirm {
    fn is_interactive(&self) -> bool {
        false
    }

    fn confirm(&self, _question: &str) -> Result<bool> {
        Ok(false)
    }
}

fn is_yes(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("y")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_y_is_yes() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" Y "));
        assert!(!is_yes(""));
        assert!(!is_yes("yes"));
        assert!(!is_yes("n"));
    }

    #[test]
    fn no_confirm_declines() {
        assert!(!NoConfirm.is_interactive());
        assert!(!NoConfirm.confirm("clean?").expect("answer"));
    }
}
