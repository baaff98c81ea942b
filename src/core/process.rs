//! Process execution seam
//!
//! Everything that launches yt-dlp goes through [`ProcessRunner`], so the
//! download pipeline can be driven by the real tool in production and by
//! `testing::ScriptedRunner` in tests.

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::process::Stdio;
use tokio::io::AsyncRead;
use tokio::process::Command;

use crate::core::error::AppError;

/// Readable end of a child's stdout/stderr pipe
pub type ProcessStream = Box<dyn AsyncRead + Send + Unpin>;

/// Resolves to the child's exit code once it has terminated.
///
/// `None` means the process was killed by a signal.
pub struct ExitHandle(BoxFuture<'static, std::io::Result<Option<i32>>>);

impl ExitHandle {
    pub fn new<F>(fut: F) -> Self
    where
        F: std::future::Future<Output = std::io::Result<Option<i32>>> + Send + 'static,
    {
        Self(fut.boxed())
    }

    pub async fn wait(self) -> std::io::Result<Option<i32>> {
        self.0.await
    }
}

/// A running child process with both output pipes captured
pub struct SpawnedProcess {
    pub stdout: ProcessStream,
    pub stderr: ProcessStream,
    pub exit: ExitHandle,
}

/// Result of a run-to-completion invocation
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Capability to launch external programs
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Starts `program` with stdout and stderr redirected to pipes
    async fn spawn(&self, program: &str, args: &[String]) -> Result<SpawnedProcess, AppError>;

    /// Runs `program` to completion and collects its output
    async fn output(&self, program: &str, args: &[String]) -> Result<ProcessOutput, AppError>;
}

/// [`ProcessRunner`] backed by `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn spawn(&self, program: &str, args: &[String]) -> Result<SpawnedProcess, AppError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // An abandoned ExitHandle must not leave the download running.
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::Download(format!("Failed to start '{}': {}", program, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Download("child stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::Download("child stderr was not captured".to_string()))?;

        Ok(SpawnedProcess {
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
            exit: ExitHandle::new(async move { child.wait().await.map(|status| status.code()) }),
        })
    }

    async fn output(&self, program: &str, args: &[String]) -> Result<ProcessOutput, AppError> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| AppError::Download(format!("Failed to execute '{}': {}", program, e)))?;

        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_output_collects_both_streams() {
        let out = TokioProcessRunner
            .output("sh", &sh("printf 'hello'; printf 'oops' >&2; exit 3"))
            .await
            .unwrap();
        assert_eq!(out.code, Some(3));
        assert!(!out.success());
        assert_eq!(out.stdout_lossy(), "hello");
        assert_eq!(out.stderr_lossy(), "oops");
    }

    #[tokio::test]
    async fn test_spawn_pipes_and_exit_code() {
        let SpawnedProcess {
            mut stdout,
            mut stderr,
            exit,
        } = TokioProcessRunner
            .spawn("sh", &sh("printf 'out'; printf 'err' >&2"))
            .await
            .unwrap();

        let mut out = String::new();
        let mut err = String::new();
        stdout.read_to_string(&mut out).await.unwrap();
        stderr.read_to_string(&mut err).await.unwrap();

        assert_eq!(out, "out");
        assert_eq!(err, "err");
        assert_eq!(exit.wait().await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_is_an_error() {
        let result = TokioProcessRunner
            .spawn("definitely-not-a-real-binary-tubevault", &[])
            .await;
        assert!(matches!(result, Err(AppError::Download(_))));
    }
}
