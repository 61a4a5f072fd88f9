// Operator actions delivered to a running build

use std::io::{self, BufRead};
use std::sync::mpsc::{self, Receiver};
use std::thread;

/// What the operator asked for while a build was running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorAction {
    /// Stop the build and finalize the task as skipped
    Skip,
    /// Skip the current task, then stop the worker
    Quit,
    /// Restart the attempt without using up the retry budget
    Retry,
}

impl OperatorAction {
    /// `s` skips, `q` quits, anything else (including an empty line) retries
    pub fn parse(input: &str) -> Self {
        match input.trim().to_ascii_lowercase().as_str() {
            "s" | "skip" => OperatorAction::Skip,
            "q" | "quit" => OperatorAction::Quit,
            _ => OperatorAction::Retry,
        }
    }
}

/// Read operator actions from stdin on a background thread
///
/// The thread exits when stdin closes or the receiver is dropped.
pub fn spawn_stdin_reader() -> io::Result<Receiver<OperatorAction>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("operator-input".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                let action = OperatorAction::parse(&line);
                log::info!("operator requested {:?}", action);
                if tx.send(action).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_actions() {
        assert_eq!(OperatorAction::parse("s"), OperatorAction::Skip);
        assert_eq!(OperatorAction::parse(" Q \n"), OperatorAction::Quit);
        assert_eq!(OperatorAction::parse(""), OperatorAction::Retry);
        assert_eq!(OperatorAction::parse("r"), OperatorAction::Retry);
    }
}
