//! Dependency Graph Store
//!
//! Maps a compilation session (one top-level compile request) to every
//! template file it pulled in through `include`, `extend` or `component`,
//! together with the deepest nesting level at which the file was reached.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TemplateError};

pub type Dependencies = BTreeMap<PathBuf, u32>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyGraph {
    sessions: BTreeMap<String, Dependencies>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `path` under `session`. A path seen again keeps the larger depth.
    pub fn add_dependency(&mut self, session: &str, path: impl Into<PathBuf>, depth: u32) {
        let entry = self
            .sessions
            .entry(session.to_string())
            .or_default()
            .entry(path.into())
            .or_insert(depth);
        *entry = (*entry).max(depth);
    }

    /// Merge a batch of paths into `session`, raising depths but never lowering them.
    pub fn prepend_dependency(&mut self, session: &str, dependencies: &Dependencies) {
        for (path, depth) in dependencies {
            self.add_dependency(session, path.clone(), *depth);
        }
    }

    /// Start tracking `session` even if it never records a dependency.
    pub fn open_session(&mut self, session: &str) {
        self.sessions.entry(session.to_string()).or_default();
    }

    pub fn get_dependency(&self, session: &str) -> Dependencies {
        self.sessions.get(session).cloned().unwrap_or_default()
    }

    pub fn contains(&self, session: &str) -> bool {
        self.sessions.contains_key(session)
    }

    pub fn remove(&mut self, session: &str) -> Option<Dependencies> {
        self.sessions.remove(session)
    }

    pub fn clear(&mut self) {
        self.sessions.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Load a persisted graph. A missing file is an empty graph; a corrupt one
    /// is discarded with a warning.
    pub fn load(path: &Path) -> Self {
        let data = match fs::read_to_string(path) {
            Ok(d) => d,
            Err(_) => return Self::default(),
        };

        match serde_json::from_str(&data) {
            Ok(graph) => graph,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "dependency graph is corrupt, starting empty"
                );
                fs::remove_file(path).ok();
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        crate::cache::write_atomic(path, data.as_bytes())
            .map_err(|e| TemplateError::io(path, e))
    }
}
