//! Run the external source-separation tool as a subprocess.
//!
//! The tool is launched as `<program> <args...> <source path>` and streams its
//! output to the log while it runs. Only a clean zero exit counts as success.

use crate::config::ToolConfig;
use crate::error::{PipelineError, Result};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

/// Wrapper around the separation tool.
#[derive(Debug, Clone)]
pub struct Separator {
    program: String,
    args: Vec<String>,
    working_dir: PathBuf,
}

impl Separator {
    pub fn new(program: impl Into<String>, args: Vec<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: working_dir.into(),
        }
    }

    pub fn from_config(config: &ToolConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone(), config.working_dir.clone())
    }

    /// Separate `source` into stems, blocking until the tool has fully exited.
    ///
    /// The source path is made absolute first because the tool runs in its own
    /// working directory.
    pub async fn separate(&self, source: &Path) -> Result<()> {
        let source = tokio::fs::canonicalize(source)
            .await
            .map_err(|e| PipelineError::io(source, e))?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(&source)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::info!(
            "Launching {} {} {}",
            self.program,
            self.args.join(" "),
            source.display()
        );

        let mut child = cmd.spawn().map_err(|source| PipelineError::Launch {
            program: self.program.clone(),
            source,
        })?;

        let stdout = child.stdout.take().map(|out| tokio::spawn(forward_lines(out, OutputStream::Stdout)));
        let stderr = child.stderr.take().map(|err| tokio::spawn(forward_lines(err, OutputStream::Stderr)));

        let status = child.wait().await.map_err(|source| PipelineError::Launch {
            program: self.program.clone(),
            source,
        })?;

        for handle in [stdout, stderr].into_iter().flatten() {
            if let Err(e) = handle.await {
                tracing::warn!("Output forwarder for {} ended abnormally: {}", self.program, e);
            }
        }

        check_status(status)
    }
}

/// Classify an exit status.
fn check_status(status: ExitStatus) -> Result<()> {
    if status.success() {
        tracing::info!("Separation tool exited cleanly");
        return Ok(());
    }

    let err = PipelineError::ToolExecution {
        code: status.code(),
        signal: exit_signal(&status),
    };
    tracing::error!("{}", err);
    Err(err)
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

#[derive(Debug, Clone, Copy)]
enum OutputStream {
    Stdout,
    Stderr,
}

/// Log every line of a child's output stream until EOF.
///
/// Reads raw bytes so that non-UTF-8 output never stops the pipe from being
/// drained.
async fn forward_lines<R>(reader: R, stream: OutputStream)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end();
                if line.is_empty() {
                    continue;
                }
                match stream {
                    OutputStream::Stdout => tracing::info!(stream = "stdout", "{}", line),
                    OutputStream::Stderr => tracing::debug!(stream = "stderr", "{}", line),
                }
            }
            Err(e) => {
                tracing::warn!(?stream, "Failed to read tool output: {}", e);
                break;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh(script: &str, working_dir: &Path) -> Separator {
        Separator::new("sh", vec!["-c".to_string(), script.to_string()], working_dir)
    }

    fn staged_source(dir: &Path) -> PathBuf {
        let path = dir.join("source file");
        std::fs::write(&path, b"audio").unwrap();
        path
    }

    #[tokio::test]
    async fn test_separate_passes_absolute_source_path() {
        let temp_dir = TempDir::new().unwrap();
        let source = staged_source(temp_dir.path());

        // `sh -c script arg` binds the appended source path to $0
        sh("printf '%s' \"$0\" > seen_path; echo done", temp_dir.path())
            .separate(&source)
            .await
            .unwrap();

        let seen = std::fs::read_to_string(temp_dir.path().join("seen_path")).unwrap();
        assert_eq!(PathBuf::from(seen), std::fs::canonicalize(&source).unwrap());
    }

    #[tokio::test]
    async fn test_separate_non_zero_exit_carries_code() {
        let temp_dir = TempDir::new().unwrap();
        let source = staged_source(temp_dir.path());

        let err = sh("echo failing >&2; exit 1", temp_dir.path())
            .separate(&source)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::ToolExecution { code: Some(1), .. }));
        assert_eq!(err.exit_code(), Some(1));
    }

    #[tokio::test]
    async fn test_separate_killed_by_signal() {
        let temp_dir = TempDir::new().unwrap();
        let source = staged_source(temp_dir.path());

        let err = sh("kill -9 $$", temp_dir.path()).separate(&source).await.unwrap_err();

        assert!(matches!(err, PipelineError::ToolExecution { code: None, signal: Some(9) }));
    }

    #[tokio::test]
    async fn test_separate_missing_executable_is_launch_error() {
        let temp_dir = TempDir::new().unwrap();
        let source = staged_source(temp_dir.path());

        let err = Separator::new("definitely-not-a-separation-tool", vec![], temp_dir.path())
            .separate(&source)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Launch { .. }));
    }

    #[tokio::test]
    async fn test_separate_missing_source_is_io_error() {
        let temp_dir = TempDir::new().unwrap();

        let err = sh("exit 0", temp_dir.path())
            .separate(&temp_dir.path().join("absent"))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Io { .. }));
    }

    #[tokio::test]
    async fn test_separate_drains_large_output() {
        let temp_dir = TempDir::new().unwrap();
        let source = staged_source(temp_dir.path());

        // Far more than a pipe buffer on both streams
        sh(
            "i=0; while [ $i -lt 5000 ]; do echo \"line $i of progress output\"; echo \"err $i\" >&2; i=$((i+1)); done",
            temp_dir.path(),
        )
        .separate(&source)
        .await
        .unwrap();
    }
}
