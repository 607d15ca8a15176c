//! Persistent command history, one file per server address.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

const HISTORY_DIR: &str = ".repl-tunnel";

/// Commands sent to one address, newest first.
#[derive(Debug, Default)]
pub struct History {
    path: Option<PathBuf>,
    entries: Vec<String>,
}

impl History {
    /// History kept only in memory.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// `~/.repl-tunnel/<name>`, or in-memory when there is no home directory.
    pub fn for_name(name: &str) -> io::Result<Self> {
        match dirs::home_dir() {
            Some(home) => Self::open(home.join(HISTORY_DIR).join(name)),
            None => Ok(Self::in_memory()),
        }
    }

    /// Load the history at `path`, creating its directory if needed.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let mut entries: Vec<String> = match fs::read_to_string(&path) {
            Ok(text) => text
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e),
        };
        entries.reverse();
        debug!("Loaded {} history entries from {}", entries.len(), path.display());

        Ok(Self {
            path: Some(path),
            entries,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Entries, newest first.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a sent command and append it to the file.
    pub fn push(&mut self, cmd: &str) -> io::Result<()> {
        let cmd = cmd.trim();
        if cmd.is_empty() || cmd.contains('\n') {
            return Ok(());
        }
        self.entries.insert(0, cmd.to_string());

        if let Some(path) = &self.path {
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            writeln!(file, "{}", cmd)?;
        }
        Ok(())
    }
}
