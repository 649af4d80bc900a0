//! External command execution with captured output.
//!
//! Used for steps outside the lifecycle state machine (file copies,
//! directory sync) where only success or failure matters.

use std::ffi::OsStr;
use std::process::Command;

use sandroot_common::error::{Result, SandrootError};

/// Runs `program` with `args` and waits for it to exit.
///
/// Combined stdout and stderr are logged at debug level and, on failure,
/// carried in the returned error.
///
/// # Errors
///
/// Returns `SandrootError::Command` if the program cannot be started or
/// exits with a non-zero status.
pub fn run_cmd<I, S>(program: &str, args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<_> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
    let rendered = args
        .iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");

    let output = Command::new(program)
        .args(&args)
        .output()
        .map_err(|e| SandrootError::Command {
            program: program.to_owned(),
            status: "not started".into(),
            output: e.to_string(),
        })?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    if !combined.is_empty() {
        tracing::debug!(program, output = %combined.trim_end(), "command output");
    }

    if !output.status.success() {
        tracing::error!(program, args = %rendered, status = %output.status, "command failed");
        return Err(SandrootError::Command {
            program: program.to_owned(),
            status: output.status.to_string(),
            output: combined.trim_end().to_owned(),
        });
    }

    tracing::debug!(program, args = %rendered, "command succeeded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_command_returns_ok() {
        run_cmd("true", std::iter::empty::<&str>()).expect("true should succeed");
    }

    #[test]
    fn failing_command_reports_status_and_output() {
        let err = run_cmd("sh", ["-c", "echo oops >&2; exit 3"]).expect_err("should fail");
        match err {
            SandrootError::Command { program, status, output } => {
                assert_eq!(program, "sh");
                assert!(status.contains('3'));
                assert_eq!(output, "oops");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_program_is_an_error() {
        let err = run_cmd("/bin/sandroot-no-such-program", ["x"]).expect_err("should fail");
        assert!(matches!(err, SandrootError::Command { .. }));
    }
}
