//! File host: a text file (or stdin) as the terminal buffer.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

/// Read the whole input. `-` reads stdin.
pub fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// A file re-read on demand, reporting only real changes.
pub struct FileHost {
    path: PathBuf,
    last: Option<String>,
}

impl FileHost {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last: None,
        }
    }

    /// Re-read the file. Returns the new text if it differs from the
    /// previous read; the first read always counts as new.
    pub fn refresh(&mut self) -> Result<Option<&str>> {
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        if self.last.as_deref() == Some(text.as_str()) {
            return Ok(None);
        }
        debug!("{} changed ({} bytes)", self.path.display(), text.len());
        self.last = Some(text);
        Ok(self.last.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_input_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "one\ntwo\n").unwrap();
        assert_eq!(read_input(file.path()).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn test_read_input_missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.txt");
        let err = read_input(&missing).unwrap_err();
        assert!(format!("{err}").contains("nope.txt"));
    }

    #[test]
    fn test_refresh_reports_only_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("screen.txt");
        std::fs::write(&path, "status: idle\n").unwrap();

        let mut host = FileHost::new(&path);
        assert_eq!(host.refresh().unwrap(), Some("status: idle\n"));
        assert_eq!(host.refresh().unwrap(), None);

        std::fs::write(&path, "status: busy\n").unwrap();
        assert_eq!(host.refresh().unwrap(), Some("status: busy\n"));
    }
}
