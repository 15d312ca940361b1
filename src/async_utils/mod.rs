//! Asynchronous utilities for use with Tokio.
//!
//! Running blocking page work off the executor, checking external commands,
//! and async file I/O all live here.

use std::pin::Pin;

use crate::prelude::*;

pub mod blocking_iter_streams;
pub mod io;

/// A type alias for a boxed future. This is used to make it easier to work with
/// with complex futures.
pub type BoxedFuture<Output> = Pin<Box<dyn Future<Output = Output> + Send>>;

/// Report any command failures, and include any error output.
///
/// Output is logged at debug level. If `is_error_line` is given, a command
/// that exits successfully but prints a matching line on standard error is
/// also treated as a failure.
pub fn check_for_command_failure(
    command_name: &str,
    output: &std::process::Output,
    is_error_line: Option<&dyn Fn(&str) -> bool>,
) -> Result<()> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stdout.trim().is_empty() {
        debug!(command_name, output = %stdout, "Standard output from command");
    }
    if !stderr.trim().is_empty() {
        debug!(command_name, output = %stderr, "Standard error from command");
    }

    if output.status.success() {
        if let Some(is_error_line) = is_error_line
            && stderr.lines().any(is_error_line)
        {
            return Err(anyhow!(
                "{} printed error output:\n{}",
                command_name,
                stderr,
            ));
        }
        Ok(())
    } else if let Some(exit_code) = output.status.code() {
        Err(anyhow!(
            "{} failed with exit code {} and error output:\n{}",
            command_name,
            exit_code,
            stderr,
        ))
    } else {
        Err(anyhow!(
            "{} failed with error output:\n{}",
            command_name,
            stderr,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::{os::unix::process::ExitStatusExt as _, process::Output};

    use super::*;

    fn output(code: i32, stderr: &str) -> Output {
        Output {
            status: std::process::ExitStatus::from_raw(code << 8),
            stdout: vec![],
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    #[test]
    fn exit_codes_are_failures() {
        let err = check_for_command_failure("tool", &output(2, "boom"), None).unwrap_err();
        assert!(err.to_string().contains("exit code 2"));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn error_lines_fail_successful_commands() {
        let is_error = |line: &str| line.starts_with("Error");
        assert!(check_for_command_failure("tool", &output(0, "Error: bad"), Some(&is_error)).is_err());
        assert!(check_for_command_failure("tool", &output(0, "note: fine"), Some(&is_error)).is_ok());
        assert!(check_for_command_failure("tool", &output(0, "Error: ignored"), None).is_ok());
    }
}
