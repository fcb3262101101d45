//! Durable named counters
//!
//! Each counter is a small text file holding one decimal integer, so the
//! state can be inspected and repaired by hand on the device.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum CounterError {
    #[error("failed to persist counter {name}: {source}")]
    PersistenceWriteFailed {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Directory of named counters
#[derive(Debug, Clone)]
pub struct PersistentCounter {
    dir: PathBuf,
}

impl PersistentCounter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.txt"))
    }

    /// Stored value, or `default` when the file is missing or not a number
    pub fn load(&self, name: &str, default: u64) -> u64 {
        let path = self.path(name);
        match fs::read_to_string(&path) {
            Ok(content) => match content.trim().parse() {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(name, content = content.trim(), error = %e, "corrupt counter, using default");
                    default
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => default,
            Err(e) => {
                tracing::warn!(name, error = %e, "unreadable counter, using default");
                default
            }
        }
    }

    /// Best-effort write; failures are logged and otherwise ignored
    pub fn save(&self, name: &str, value: u64) {
        if let Err(e) = self.try_save(name, value) {
            tracing::warn!(error = %e, value, "counter update lost");
        }
    }

    /// Write through a temporary file so a crash never leaves half a number
    pub fn try_save(&self, name: &str, value: u64) -> Result<(), CounterError> {
        let failed = |source| CounterError::PersistenceWriteFailed {
            name: name.to_string(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(failed)?;
        let staging = self.dir.join(format!(".{name}.txt.tmp"));
        fs::write(&staging, value.to_string()).map_err(failed)?;
        fs::rename(&staging, self.path(name)).map_err(failed)?;

        tracing::trace!(name, value, "counter saved");
        Ok(())
    }
}
