//! Subprocess execution with a hard deadline.
//!
//! Every external lookup goes through [`run_command`], which turns the usual
//! ways a command can go wrong (missing binary, hang, non-zero exit) into a
//! typed [`SourceError`] instead of an exception-style failure.

use std::process::Stdio;
use std::time::Duration;

use backup_core::error::SourceError;
use tokio::process::Command;
use tracing::debug;

/// Run `program args...` and return its trimmed stdout.
///
/// The child is killed if it outlives `timeout`. A non-zero exit reports
/// stderr, or stdout when stderr is empty.
pub async fn run_command<S: AsRef<str>>(
    program: &str,
    args: &[S],
    timeout: Duration,
) -> Result<String, SourceError> {
    let mut cmd = Command::new(program);
    cmd.args(args.iter().map(|a| a.as_ref()))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(program, timeout_secs = timeout.as_secs(), "running command");

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Err(_) => {
            return Err(SourceError::Timeout {
                secs: timeout.as_secs(),
            })
        }
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SourceError::NotFound(program.to_string()))
        }
        Ok(Err(e)) => {
            return Err(SourceError::Spawn {
                program: program.to_string(),
                reason: e.to_string(),
            })
        }
        Ok(Ok(output)) => output,
    };

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if output.status.success() {
        return Ok(stdout);
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    Err(SourceError::CommandFailed {
        code: output.status.code().unwrap_or(-1),
        stderr: if stderr.is_empty() { stdout } else { stderr },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHORT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_success_returns_trimmed_stdout() {
        let out = run_command("sh", &["-c", "printf '  hello\\n\\n'"], SHORT)
            .await
            .unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn test_non_zero_exit_reports_stderr() {
        let err = run_command("sh", &["-c", "echo boom >&2; exit 3"], SHORT)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SourceError::CommandFailed {
                code: 3,
                stderr: "boom".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_non_zero_exit_falls_back_to_stdout() {
        let err = run_command("sh", &["-c", "echo only-out; exit 1"], SHORT)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::CommandFailed { stderr, .. } if stderr == "only-out"));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let args: [&str; 0] = [];
        let err = run_command("definitely-not-a-real-binary-xyz", &args, SHORT)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SourceError::NotFound("definitely-not-a-real-binary-xyz".to_string())
        );
    }

    #[tokio::test]
    async fn test_timeout() {
        let err = run_command("sleep", &["5"], Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Timeout { .. }));
    }
}
