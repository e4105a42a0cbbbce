//! Child process spawning and merged output capture
//!
//! On Unix the child's stdout and stderr share the write end of one pipe, so
//! lines reach the supervisor in the order the child wrote them. A single
//! reader task forwards raw byte lines into a bounded channel that closes
//! once every holder of the write end has exited.
//!
//! Elsewhere stdout and stderr are read by one task each; lines from the two
//! pipes may interleave out of order.

use super::launch::Invocation;
use crate::{Error, Result};
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A running traversal tool process and its merged output stream
#[derive(Debug)]
pub struct ChildProcess {
    pub(crate) child: Child,
    pub(crate) lines: mpsc::Receiver<Vec<u8>>,
    readers: Vec<JoinHandle<()>>,
}

impl ChildProcess {
    /// Spawn `invocation` with stdout and stderr captured
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns `Error::Spawn` if the process cannot be started
    #[cfg(unix)]
    pub fn spawn(invocation: &Invocation, capacity: usize) -> Result<Self> {
        use std::os::fd::OwnedFd;
        use tokio::net::unix::pipe;

        let pipe_error = |e: std::io::Error| Error::Spawn(format!("Failed to create output pipe: {}", e));

        let (read_end, write_end) = std::io::pipe().map_err(pipe_error)?;
        let stderr_end = write_end.try_clone().map_err(pipe_error)?;
        let output = pipe::Receiver::from_owned_fd(OwnedFd::from(read_end)).map_err(pipe_error)?;

        // The command owns both write ends and closes them once it is
        // dropped, so EOF only depends on the child and its descendants
        let child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(write_end)
            .stderr(stderr_end)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Spawn(format!("Failed to start {}: {}", invocation.program, e)))?;

        debug!("Spawned {} (pid {:?})", invocation.program, child.id());

        let (tx, lines) = mpsc::channel(capacity.max(1));
        let readers = vec![spawn_reader(output, tx)];

        Ok(Self {
            child,
            lines,
            readers,
        })
    }

    /// Spawn `invocation` with stdout and stderr captured
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns `Error::Spawn` if the process cannot be started
    #[cfg(not(unix))]
    pub fn spawn(invocation: &Invocation, capacity: usize) -> Result<Self> {
        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Spawn(format!("Failed to start {}: {}", invocation.program, e)))?;

        debug!("Spawned {} (pid {:?})", invocation.program, child.id());

        let (tx, lines) = mpsc::channel(capacity.max(1));
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, tx));
        }

        Ok(Self {
            child,
            lines,
            readers,
        })
    }

    /// OS process id, if the child has not been reaped
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Next raw output line; `None` once the output is closed
    pub async fn next_line(&mut self) -> Option<Vec<u8>> {
        self.lines.recv().await
    }

    /// Non-blocking liveness check
    ///
    /// Returns the exit status if the child has exited.
    pub fn try_exit_status(&mut self) -> Result<Option<ExitStatus>> {
        self.child
            .try_wait()
            .map_err(|e| Error::Supervisor(format!("Failed to poll child process: {}", e)))
    }

    /// Wait for the child to exit
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        self.child
            .wait()
            .await
            .map_err(|e| Error::Supervisor(format!("Failed to read exit status: {}", e)))
    }

    /// Kill the child and reap it
    pub async fn terminate(&mut self) -> Result<ExitStatus> {
        if let Err(e) = self.child.start_kill() {
            // Already exited; wait() still yields its status
            debug!("Kill not delivered: {}", e);
        }
        self.wait().await
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        for reader in &self.readers {
            reader.abort();
        }
    }
}

fn spawn_reader<R>(pipe: R, tx: mpsc::Sender<Vec<u8>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(pipe);
        loop {
            let mut line = Vec::new();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to read child output: {}", e);
                    break;
                }
            }
        }
    })
}

/// Exit code as reported to operators
///
/// On Unix a signal-terminated child yields the negated signal number.
pub fn exit_code(status: ExitStatus) -> Option<i32> {
    if let Some(code) = status.code() {
        return Some(code);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Some(-signal);
        }
    }

    None
}

/// Decode bytes as UTF-8, dropping invalid sequences
pub fn decode_lossy(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_lossy_drops_invalid_bytes() {
        assert_eq!(decode_lossy(b"WAN > 1.2.3.4:80"), "WAN > 1.2.3.4:80");
        assert_eq!(decode_lossy(b"ab\xffcd\xc3"), "abcd");
        assert_eq!(decode_lossy("打洞".as_bytes()), "打洞");
    }
}
