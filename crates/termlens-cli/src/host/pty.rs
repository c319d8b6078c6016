//! Live command host using portable-pty.
//!
//! The command runs in a pseudo terminal; a background thread forwards its
//! output over a tokio channel so the watch loop can feed it to the screen
//! model without blocking the runtime.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Buffer size for reading from the PTY.
const READ_BUFFER_SIZE: usize = 4096;

/// Terminal size in columns and rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermSize {
    pub cols: u16,
    pub rows: u16,
}

impl Default for TermSize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

impl From<TermSize> for PtySize {
    fn from(size: TermSize) -> Self {
        PtySize {
            rows: size.rows,
            cols: size.cols,
            pixel_width: 0,
            pixel_height: 0,
        }
    }
}

/// A command running in a PTY, with its output on a channel.
pub struct PtyHost {
    output_rx: mpsc::Receiver<Vec<u8>>,
    shutdown: Arc<AtomicBool>,
    // Held so the PTY stays open while the child runs.
    _master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    size: TermSize,
}

impl PtyHost {
    /// Spawn `command` in a new PTY of the given size.
    pub fn spawn(command: &[String], size: TermSize) -> Result<Self> {
        let Some((program, args)) = command.split_first() else {
            anyhow::bail!("Command cannot be empty");
        };

        let pair = native_pty_system()
            .openpty(size.into())
            .context("Failed to open PTY")?;

        let mut cmd = CommandBuilder::new(program);
        cmd.args(args);
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .with_context(|| format!("Failed to spawn '{}'", program))?;
        let reader = pair
            .master
            .try_clone_reader()
            .context("Failed to clone PTY reader")?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let (output_tx, output_rx) = mpsc::channel(64);
        let reader_shutdown = Arc::clone(&shutdown);
        std::thread::spawn(move || reader_loop(reader, output_tx, reader_shutdown));

        debug!("Spawned '{}' in a {}x{} PTY", program, size.cols, size.rows);
        Ok(Self {
            output_rx,
            shutdown,
            _master: pair.master,
            child,
            size,
        })
    }

    pub fn size(&self) -> TermSize {
        self.size
    }

    /// Next chunk of output, or None once the PTY has closed.
    pub async fn read(&mut self) -> Option<Vec<u8>> {
        self.output_rx.recv().await
    }

    /// Whether the child has exited. Errors count as still running.
    pub fn has_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }

    /// Kill the child and stop forwarding output.
    pub fn shutdown(&mut self) {
        if let Err(e) = self.child.kill() {
            debug!("Failed to kill child (may have already exited): {}", e);
        }
        if let Err(e) = self.child.try_wait() {
            debug!("Failed to collect child exit status: {}", e);
        }
        self.shutdown.store(true, Ordering::SeqCst);
        self.output_rx.close();
    }
}

impl Drop for PtyHost {
    fn drop(&mut self) {
        if !self.shutdown.load(Ordering::SeqCst) {
            self.shutdown();
        }
    }
}

fn reader_loop(
    mut reader: Box<dyn Read + Send>,
    output_tx: mpsc::Sender<Vec<u8>>,
    shutdown: Arc<AtomicBool>,
) {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        if shutdown.load(Ordering::SeqCst) {
            debug!("PTY reader shutdown");
            break;
        }

        match reader.read(&mut buf) {
            Ok(0) => {
                debug!("PTY reader EOF");
                break;
            }
            Ok(n) => {
                if output_tx.blocking_send(buf[..n].to_vec()).is_err() {
                    debug!("PTY output channel closed");
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(std::time::Duration::from_millis(10));
            }
            Err(e) => {
                // EIO is how Linux reports a closed PTY.
                warn!("PTY read error: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_empty_command_is_rejected() {
        assert!(PtyHost::spawn(&[], TermSize::default()).is_err());
    }

    #[tokio::test]
    async fn test_echo_output_reaches_channel() {
        let mut host = PtyHost::spawn(
            &["echo".to_string(), "hello termlens".to_string()],
            TermSize::default(),
        )
        .expect("Failed to spawn echo");

        let mut output = Vec::new();
        let _ = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(chunk) = host.read().await {
                output.extend_from_slice(&chunk);
                if String::from_utf8_lossy(&output).contains("hello termlens") {
                    break;
                }
            }
        })
        .await;

        let text = String::from_utf8_lossy(&output);
        assert!(text.contains("hello termlens"), "got: {:?}", text);
    }

    #[tokio::test]
    async fn test_shutdown_kills_long_running_child() {
        let mut host = PtyHost::spawn(&["sleep".to_string(), "30".to_string()], TermSize::default())
            .expect("Failed to spawn sleep");
        assert!(!host.has_exited());

        host.shutdown();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(host.has_exited());
    }
}
