//! Hosts that feed a [`LineBuffer`] for `watch`.
//!
//! A host owns the content: after every update it replaces the buffer lines
//! and the caller invalidates derived coordinates.

pub mod file;
pub mod pty;
pub mod terminal;

use std::time::Duration;

use termlens_core::source::LineBuffer;
use tracing::{debug, warn};

use crate::host::file::FileHost;
use crate::host::pty::PtyHost;
use crate::host::terminal::ScreenModel;

/// Maximum output chunks folded into one update.
const MAX_CHUNKS_PER_UPDATE: usize = 64;

pub enum LiveHost {
    /// File re-read every `interval`.
    File { host: FileHost, interval: Duration },
    /// Command in a PTY rendered by a terminal emulator. `dirty` is set
    /// while the screen holds output not yet copied into the buffer.
    Command {
        pty: PtyHost,
        screen: ScreenModel,
        dirty: bool,
    },
}

impl LiveHost {
    pub fn file(host: FileHost, interval: Duration) -> Self {
        Self::File { host, interval }
    }

    pub fn command(pty: PtyHost) -> Self {
        let screen = ScreenModel::new(pty.size());
        Self::Command {
            pty,
            screen,
            dirty: false,
        }
    }

    /// Wait for new content and write it into `buffer`.
    ///
    /// Returns false once the host is gone (the command exited). Cancel
    /// safe, so it can sit in a `select!`: output fed to the screen before a
    /// cancellation is published by the next call.
    pub async fn next_update(&mut self, buffer: &LineBuffer) -> bool {
        match self {
            Self::File { host, interval } => loop {
                match host.refresh() {
                    Ok(Some(text)) => {
                        buffer.set_text(text);
                        return true;
                    }
                    Ok(None) => {}
                    Err(e) => warn!("{:#}", e),
                }
                tokio::time::sleep(*interval).await;
            },
            Self::Command { pty, screen, dirty } => {
                if !*dirty {
                    let Some(chunk) = pty.read().await else {
                        debug!("Command output closed");
                        return false;
                    };
                    screen.feed(&chunk);
                    *dirty = true;
                }

                // Fold in whatever else is already waiting.
                for _ in 0..MAX_CHUNKS_PER_UPDATE {
                    match tokio::time::timeout(Duration::from_millis(5), pty.read()).await {
                        Ok(Some(chunk)) => screen.feed(&chunk),
                        _ => break,
                    }
                }

                buffer.set_lines(screen.formatted_lines());
                *dirty = false;
                true
            }
        }
    }

    /// Stop the command, if any.
    pub fn shutdown(&mut self) {
        if let Self::Command { pty, .. } = self {
            if !pty.has_exited() {
                debug!("Stopping watched command");
            }
            pty.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_host_updates_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("screen.txt");
        std::fs::write(&path, "a\nb\n").unwrap();

        let buffer = LineBuffer::default();
        let mut host = LiveHost::file(FileHost::new(&path), Duration::from_millis(10));
        assert!(host.next_update(&buffer).await);
        assert_eq!(buffer.lines(), vec!["a", "b"]);

        std::fs::write(&path, "c\n").unwrap();
        let updated =
            tokio::time::timeout(Duration::from_secs(5), host.next_update(&buffer)).await;
        assert_eq!(updated.ok(), Some(true));
        assert_eq!(buffer.lines(), vec!["c"]);
    }

    #[tokio::test]
    async fn test_command_host_renders_output() {
        let pty = PtyHost::spawn(
            &["printf".to_string(), "ready\\r\\n".to_string()],
            pty::TermSize { cols: 40, rows: 5 },
        )
        .expect("Failed to spawn printf");
        let mut host = LiveHost::command(pty);
        let buffer = LineBuffer::default();

        let result = tokio::time::timeout(Duration::from_secs(5), async {
            while host.next_update(&buffer).await {
                if buffer.lines().iter().any(|l| l.contains("ready")) {
                    return true;
                }
            }
            false
        })
        .await;
        assert_eq!(result.ok(), Some(true));
    }

    #[tokio::test]
    async fn test_command_host_publishes_output_left_by_cancelled_update() {
        let pty = PtyHost::spawn(
            &["sleep".to_string(), "30".to_string()],
            pty::TermSize { cols: 40, rows: 5 },
        )
        .expect("Failed to spawn sleep");
        let mut host = LiveHost::command(pty);

        // As if an earlier update was dropped between feed and publish.
        if let LiveHost::Command { screen, dirty, .. } = &mut host {
            screen.feed(b"final line\r\n");
            *dirty = true;
        }

        let buffer = LineBuffer::default();
        let updated =
            tokio::time::timeout(Duration::from_secs(2), host.next_update(&buffer)).await;
        assert_eq!(updated.ok(), Some(true));
        let lines = buffer.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("final line"));

        host.shutdown();
    }
}
