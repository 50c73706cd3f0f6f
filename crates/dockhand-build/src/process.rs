//! Cancellable subprocess execution.

use std::process::Stdio;

use dockhand_core::{DockhandError, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Captured output of a finished process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Program name, for error messages.
    pub program: String,

    /// Exit code; -1 when terminated by a signal.
    pub code: i32,

    pub stdout: String,

    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// `ProcessFailed` unless the exit code is zero.
    pub fn into_result(self) -> Result<ProcessOutput> {
        if self.success() {
            Ok(self)
        } else {
            Err(DockhandError::ProcessFailed {
                program: self.program,
                code: self.code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

fn program_name(command: &Command) -> String {
    command.as_std().get_program().to_string_lossy().into_owned()
}

/// Run `command` to completion, optionally writing `stdin` first.
///
/// The child is killed when `cancel` fires.
pub async fn run(
    command: &mut Command,
    stdin: Option<&str>,
    cancel: &CancellationToken,
) -> Result<ProcessOutput> {
    let program = program_name(command);
    command
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn()?;
    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input.as_bytes()).await?;
        // Dropping the handle closes the pipe.
        drop(pipe);
    }

    let output = tokio::select! {
        _ = cancel.cancelled() => {
            tracing::debug!(program = %program, "cancelled; killing child");
            return Err(DockhandError::Cancelled);
        }
        output = child.wait_with_output() => output?,
    };

    Ok(ProcessOutput {
        program,
        code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

/// Run `command`, handing each stderr line to `on_line` as it arrives.
///
/// Stderr is also buffered in full and returned in the output.
pub async fn run_streaming<F>(
    command: &mut Command,
    cancel: &CancellationToken,
    mut on_line: F,
) -> Result<ProcessOutput>
where
    F: FnMut(&str),
{
    let program = program_name(command);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn()?;
    let stdout_task = child.stdout.take().map(|mut out| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = out.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).to_string()
        })
    });
    let mut lines = child.stderr.take().map(BufReader::new);
    let mut raw = Vec::new();

    let mut stderr = String::new();
    let status = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(program = %program, "cancelled; killing child");
                let _ = child.kill().await;
                return Err(DockhandError::Cancelled);
            }
            line = next_line(&mut lines, &mut raw) => match line? {
                Some(line) => {
                    on_line(&line);
                    stderr.push_str(&line);
                    stderr.push('\n');
                }
                None => break child.wait().await?,
            },
        }
    };

    let stdout = match stdout_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };

    Ok(ProcessOutput {
        program,
        code: status.code().unwrap_or(-1),
        stdout,
        stderr,
    })
}

/// Next line with invalid UTF-8 replaced; builders echo arbitrary bytes.
async fn next_line<R>(
    reader: &mut Option<BufReader<R>>,
    buf: &mut Vec<u8>,
) -> std::io::Result<Option<String>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(None);
    };
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

/// Last `max_lines` non-empty lines of `text`.
pub fn tail(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}
