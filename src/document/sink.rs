//! Per-unit output persistence.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::PipelineError;

/// Stores one successful response, keyed by unit identifier.
pub trait UnitSink: Send + Sync {
    /// Called once before any unit is dispatched.
    fn prepare(&self) -> Result<(), PipelineError> {
        Ok(())
    }

    fn persist(&self, id: &str, text: &str) -> Result<(), PipelineError>;
}

/// `<root>/<id>` with empty, `.` and `..` segments dropped.
pub(crate) fn output_path(root: &Path, id: &str) -> PathBuf {
    id.split('/')
        .filter(|part| !part.is_empty() && *part != "." && *part != "..")
        .fold(root.to_path_buf(), |path, part| path.join(part))
}

/// Writes `<root>/<id>`, creating parent directories as needed.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a unit's output lands at.
    pub fn path_for(&self, id: &str) -> PathBuf {
        output_path(&self.root, id)
    }
}

impl UnitSink for DirectorySink {
    fn prepare(&self) -> Result<(), PipelineError> {
        fs::create_dir_all(&self.root).map_err(|e| PipelineError::Persistence {
            id: self.root.display().to_string(),
            message: e.to_string(),
        })
    }

    fn persist(&self, id: &str, text: &str) -> Result<(), PipelineError> {
        let path = self.path_for(id);
        let failure = |e: std::io::Error| PipelineError::Persistence {
            id: id.to_string(),
            message: format!("{}: {}", path.display(), e),
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(failure)?;
        }
        fs::write(&path, text).map_err(failure)?;
        debug!(unit = %id, path = %path.display(), bytes = text.len(), "Persisted unit output");
        Ok(())
    }
}

/// Keeps outputs in memory, in persist order.
#[derive(Debug, Default)]
pub struct MemorySink {
    written: Mutex<Vec<(String, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written(&self) -> Vec<(String, String)> {
        self.written.lock().clone()
    }

    pub fn get(&self, id: &str) -> Option<String> {
        self.written
            .lock()
            .iter()
            .rev()
            .find(|(k, _)| k == id)
            .map(|(_, v)| v.clone())
    }
}

impl UnitSink for MemorySink {
    fn persist(&self, id: &str, text: &str) -> Result<(), PipelineError> {
        self.written.lock().push((id.to_string(), text.to_string()));
        Ok(())
    }
}
