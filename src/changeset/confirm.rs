//! Operator confirmation gate.
//!
//! The update workflow blocks on an explicit yes/no decision between
//! describing and executing a staged change. The gate is a trait so the
//! lifecycle runs headlessly in tests with a scripted implementation.

use std::io::{BufRead, Write};
use std::sync::Mutex;

/// Operator decision at the confirmation gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Yes,
    No,
}

/// Yes/no confirmation source.
pub trait Confirm: Send + Sync {
    /// Block until a decision is reached for the given prompt.
    fn confirm(&self, prompt: &str) -> Decision;
}

/// Scripted gate that always proceeds.
#[derive(Debug, Default)]
pub struct AlwaysYes;

impl Confirm for AlwaysYes {
    fn confirm(&self, _prompt: &str) -> Decision {
        Decision::Yes
    }
}

/// Scripted gate that always declines.
#[derive(Debug, Default)]
pub struct AlwaysNo;

impl Confirm for AlwaysNo {
    fn confirm(&self, _prompt: &str) -> Decision {
        Decision::No
    }
}

/// Interactive gate over arbitrary reader/writer pairs.
///
/// Accepts case-insensitive `y`/`n`; anything else, including empty input,
/// re-prompts with a warning. No default is applied. End of input is
/// treated as a decline so a closed stdin can never execute a change.
pub struct TerminalConfirm<R, W> {
    input: Mutex<R>,
    output: Mutex<W>,
}

impl<R: BufRead + Send, W: Write + Send> TerminalConfirm<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input: Mutex::new(input), output: Mutex::new(output) }
    }
}

impl<R: BufRead + Send, W: Write + Send> Confirm for TerminalConfirm<R, W> {
    fn confirm(&self, prompt: &str) -> Decision {
        let mut input = self.input.lock().expect("confirm input lock poisoned");
        let mut output = self.output.lock().expect("confirm output lock poisoned");
        loop {
            let _ = write!(output, "{prompt} [Y/N]: ");
            let _ = output.flush();

            let mut line = String::new();
            match input.read_line(&mut line) {
                Ok(0) | Err(_) => {
                    let _ = writeln!(output, "no input available, not proceeding");
                    return Decision::No;
                }
                Ok(_) => {}
            }

            match line.trim().to_lowercase().as_str() {
                "y" => return Decision::Yes,
                "n" => return Decision::No,
                _ => {
                    let _ = writeln!(output, r#"invalid response, please type "Y" or "N""#);
                }
            }
        }
    }
}
