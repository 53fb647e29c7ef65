use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;

use crate::error::PluginRunError;
use crate::types::{PluginLine, PluginRequest};

/// How long to wait for the stderr reader to drain after the child exits.
const STDERR_DRAIN: Duration = Duration::from_millis(500);

/// Only the last this-many bytes of a plugin's stderr are kept.
pub(crate) const STDERR_TAIL: usize = 8 * 1024;

// ─── PluginProcess ────────────────────────────────────────────────────────

/// A running plugin subprocess.
///
/// The request is written as one JSON line on stdin, then stdin is closed.
/// Output is read as JSONL from stdout. Stderr is captured in a background
/// task and surfaced when the process exits unsuccessfully.
pub(crate) struct PluginProcess {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stdin: Option<ChildStdin>,
    stderr_buf: Arc<Mutex<String>>,
    stderr_task: Option<JoinHandle<()>>,
}

impl PluginProcess {
    pub(crate) fn spawn(mut cmd: Command) -> Result<Self, PluginRunError> {
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let program = cmd.as_std().get_program().to_string_lossy().into_owned();
        let mut child = cmd
            .spawn()
            .map_err(|source| PluginRunError::Spawn { program, source })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PluginRunError::Process("stdout not captured".into()))?;
        let stdin = child.stdin.take();

        let stderr_buf = Arc::new(Mutex::new(String::new()));
        let stderr_task = child.stderr.take().map(|stderr| {
            let buf = Arc::clone(&stderr_buf);
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr);
                let mut line = Vec::new();
                while let Ok(n) = reader.read_until(b'\n', &mut line).await {
                    if n == 0 {
                        break;
                    }
                    if let Ok(mut b) = buf.lock() {
                        let text = String::from_utf8_lossy(&line);
                        push_tail(&mut b, text.trim_end_matches(['\n', '\r']));
                    }
                    line.clear();
                }
            })
        });

        Ok(Self {
            child,
            stdout: BufReader::new(stdout),
            stdin,
            stderr_buf,
            stderr_task,
        })
    }

    /// Write the request line and close stdin.
    ///
    /// A plugin that exits without reading its input closes the pipe under
    /// us; that is not an error on our side.
    pub(crate) async fn send_request(
        &mut self,
        request: &PluginRequest<'_>,
    ) -> Result<(), PluginRunError> {
        let Some(mut stdin) = self.stdin.take() else {
            return Err(PluginRunError::Process("stdin already closed".into()));
        };

        let mut buf = serde_json::to_vec(request)
            .map_err(|e| PluginRunError::Process(format!("failed to serialize request: {e}")))?;
        buf.push(b'\n');

        let written = async {
            stdin.write_all(&buf).await?;
            stdin.flush().await
        }
        .await;
        match written {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
            Err(e) => Err(PluginRunError::Io(e)),
        }
    }

    /// Read the next non-empty stdout line and deserialize it.
    ///
    /// Returns `Ok(None)` on EOF. A line that is not UTF-8 is malformed
    /// output, not an I/O failure.
    pub(crate) async fn next_line(&mut self) -> Result<Option<(String, PluginLine)>, PluginRunError> {
        let mut bytes = Vec::new();
        loop {
            bytes.clear();
            if self.stdout.read_until(b'\n', &mut bytes).await? == 0 {
                return Ok(None);
            }
            let line = match std::str::from_utf8(&bytes) {
                Ok(line) => line,
                Err(_) => {
                    return Err(PluginRunError::InvalidUtf8 {
                        line: String::from_utf8_lossy(&bytes).trim().to_owned(),
                    })
                }
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return match serde_json::from_str::<PluginLine>(trimmed) {
                Ok(parsed) => Ok(Some((trimmed.to_owned(), parsed))),
                Err(source) => Err(PluginRunError::Parse {
                    line: trimmed.to_owned(),
                    source,
                }),
            };
        }
    }

    /// Wait for the child to exit.
    pub(crate) async fn wait(&mut self) -> Result<ExitStatus, PluginRunError> {
        let status = self.child.wait().await?;
        if let Some(task) = self.stderr_task.take() {
            let _ = tokio::time::timeout(STDERR_DRAIN, task).await;
        }
        Ok(status)
    }

    pub(crate) fn stderr(&self) -> String {
        self.stderr_buf
            .lock()
            .map(|b| b.clone())
            .unwrap_or_default()
    }

    /// Kill the subprocess (best-effort; errors are ignored).
    pub(crate) async fn kill(&mut self) {
        let _ = self.child.kill().await;
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

/// Append `line` to the captured stderr, dropping the oldest bytes once the
/// buffer exceeds [`STDERR_TAIL`].
pub(crate) fn push_tail(buf: &mut String, line: &str) {
    if !buf.is_empty() {
        buf.push('\n');
    }
    buf.push_str(line);
    if buf.len() > STDERR_TAIL {
        let mut cut = buf.len() - STDERR_TAIL;
        while !buf.is_char_boundary(cut) {
            cut += 1;
        }
        buf.drain(..cut);
    }
}
