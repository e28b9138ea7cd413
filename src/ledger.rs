use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Append-only record of thread titles that must not be picked again.
///
/// One trimmed title per line, UTF-8, newline terminated.
#[derive(Debug)]
pub struct UsedThreadLedger {
    path: PathBuf,
    titles: HashSet<String>,
}

impl UsedThreadLedger {
    /// Read every recorded title; a missing file is an empty ledger.
    pub fn open(path: &Path) -> Result<Self> {
        let titles = match std::fs::read_to_string(path) {
            Ok(content) => content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read ledger: {}", path.display()))
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            titles,
        })
    }

    /// Re-read the file, picking up titles appended by other runs.
    pub fn reload(&mut self) -> Result<()> {
        *self = Self::open(&self.path)?;
        Ok(())
    }

    pub fn contains(&self, title: &str) -> bool {
        self.titles.contains(title.trim())
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a title. Already recorded titles are not written twice.
    pub fn record(&mut self, title: &str) -> io::Result<()> {
        let title = title.trim();
        if title.is_empty() || self.titles.contains(title) {
            return Ok(());
        }
        // Titles are single lines in the ledger.
        let line = title.replace(['\r', '\n'], " ");

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)?;

        debug!(title = %line, "Recorded thread in ledger");
        self.titles.insert(line);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = UsedThreadLedger::open(&dir.path().join("none.txt")).unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_record_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("used.txt");
        let mut ledger = UsedThreadLedger::open(&path).unwrap();

        ledger.record("  First title  ").unwrap();
        ledger.record("First title").unwrap();
        ledger.record("Second\ntitle").unwrap();

        assert!(ledger.contains("First title"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "First title\nSecond title\n");

        let reopened = UsedThreadLedger::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert!(reopened.contains(" Second title"));
    }

    #[test]
    fn test_reload_sees_other_writers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("used.txt");
        let mut ledger = UsedThreadLedger::open(&path).unwrap();
        std::fs::write(&path, "Written elsewhere\n").unwrap();

        assert!(!ledger.contains("Written elsewhere"));
        ledger.reload().unwrap();
        assert!(ledger.contains("Written elsewhere"));
    }
}
