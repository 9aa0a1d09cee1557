//! Thin helpers around external commands.

use std::process::{Command, Output};

use crate::error::{Error, Result};

/// Run a prepared command to completion, capturing its output.
///
/// A non-zero exit status is an error carrying the command's stderr text.
pub fn run(mut command: Command) -> Result<Output> {
    let program = command.get_program().to_string_lossy().into_owned();
    let output = command
        .output()
        .map_err(|e| Error::Command(format!("failed to launch {program}: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Command(format!(
            "{program} exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(output)
}

/// Best-effort check that `program` can be launched at all.
pub fn command_exists(program: &str) -> bool {
    Command::new(program).arg("--version").output().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn run_succeeds_for_zero_exit() {
        assert!(run(Command::new("true")).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn run_fails_for_non_zero_exit() {
        assert!(matches!(run(Command::new("false")), Err(Error::Command(_))));
    }

    #[test]
    fn run_fails_for_missing_program() {
        let result = run(Command::new("devca-no-such-command"));
        assert!(matches!(result, Err(Error::Command(_))));
    }

    #[test]
    fn command_exists_is_false_for_missing_program() {
        assert!(!command_exists("devca-no-such-command"));
    }
}
