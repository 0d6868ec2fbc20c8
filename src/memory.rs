//! Persisted assistant memory
//!
//! A bounded, deduplicated list of short fact lines. Sessions read it once when they
//! start and append at most one fact per turn.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{Error, Result};

/// Storage for remembered facts
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Load every stored fact as a newline-separated blob (empty if nothing is stored)
    async fn load(&self) -> Result<String>;

    /// Remember a fact
    ///
    /// Whitespace-only facts are ignored; a fact already present (trimmed match) is not
    /// stored twice.
    async fn save(&self, fact: &str) -> Result<()>;
}

/// Memory store backed by a plain text file, one fact per line
pub struct FileMemoryStore {
    path: PathBuf,
    limit: usize,
    write_lock: Mutex<()>,
}

impl FileMemoryStore {
    /// Create a store at `path` keeping at most `limit` facts
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, limit: usize) -> Self {
        Self {
            path: path.into(),
            limit: limit.max(1),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_existing(&self) -> Result<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(Error::Memory(format!(
                "failed to read {}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn write_atomic(&self, content: &str) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Memory(format!("failed to create {}: {e}", parent.display())))?;
        }

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| Error::Memory(format!("failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| Error::Memory(format!("failed to replace {}: {e}", self.path.display())))
    }
}

#[async_trait]
impl MemoryStore for FileMemoryStore {
    async fn load(&self) -> Result<String> {
        self.read_existing().await
    }

    async fn save(&self, fact: &str) -> Result<()> {
        let fact = fact.trim();
        if fact.is_empty() {
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;
        let existing = self.read_existing().await?;
        let lines = append_fact(&existing, fact, self.limit);

        self.write_atomic(&lines.join("\n")).await?;
        tracing::debug!(fact, stored = lines.len(), "memory saved");
        Ok(())
    }
}

/// Append `fact` to the stored lines unless present, keeping the last `limit` lines
fn append_fact(existing: &str, fact: &str, limit: usize) -> Vec<String> {
    let mut lines: Vec<String> = existing
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(ToString::to_string)
        .collect();

    if !lines.iter().any(|l| l == fact) {
        lines.push(fact.to_string());
    }

    if lines.len() > limit {
        lines.drain(..lines.len() - limit);
    }

    lines
}
