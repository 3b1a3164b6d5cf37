//! Template Finder
//!
//! Resolves a logical template name to a file on disk by walking the search
//! roots and candidate extensions in declaration order.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::DEFAULT_EXTENSIONS;
use crate::error::{Result, TemplateError};

#[derive(Debug, Clone)]
pub struct Finder {
    paths: Vec<PathBuf>,
    extensions: Vec<String>,
}

impl Default for Finder {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Finder {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }

    pub fn with_extensions(paths: Vec<PathBuf>, extensions: Vec<String>) -> Self {
        Self { paths, extensions }
    }

    /// Resolve `name` to the first existing `root + name + extension`.
    ///
    /// Roots are the outer loop, extensions the inner one, so an earlier root
    /// always wins over a more specific extension in a later root.
    pub fn find(&self, name: &str) -> Result<PathBuf> {
        for root in &self.paths {
            for extension in &self.extensions {
                let candidate = root.join(format!("{}{}", name, extension));
                if candidate.is_file() {
                    tracing::trace!(name, path = %candidate.display(), "resolved template");
                    return Ok(candidate);
                }
            }
        }

        Err(TemplateError::TemplateNotFound {
            name: name.to_string(),
        })
    }

    pub fn exists(&self, name: &str) -> bool {
        self.find(name).is_ok()
    }

    pub fn add_path(&mut self, path: impl Into<PathBuf>) {
        self.paths.push(path.into());
    }

    pub fn add_extension(&mut self, extension: impl Into<String>) {
        self.extensions.push(extension.into());
    }

    pub fn set_paths(&mut self, paths: Vec<PathBuf>) {
        self.paths = paths;
    }

    pub fn set_extensions(&mut self, extensions: Vec<String>) {
        self.extensions = extensions;
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// List every template under the search roots, as logical names relative
    /// to their root with the matched extension stripped.
    pub fn discover(&self) -> Vec<String> {
        let mut names = Vec::new();

        for root in &self.paths {
            for entry in WalkDir::new(root).follow_links(true).into_iter().flatten() {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                if let Some(name) = self.logical_name(root, path) {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
        }

        names.sort();
        names
    }

    fn logical_name(&self, root: &Path, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(root).ok()?;
        let relative = relative.to_string_lossy().replace('\\', "/");

        self.extensions
            .iter()
            .filter(|ext| !ext.is_empty())
            .find_map(|ext| relative.strip_suffix(ext.as_str()).map(|s| s.to_string()))
    }
}
