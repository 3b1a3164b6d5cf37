//! Templator configuration.
//!
//! ```toml
//! view_paths = ["resources/views"]
//! extensions = [".template.html", ".html", ""]
//! cache_path = "storage/views"
//! component_namespace = "components/"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TemplateError};

pub const DEFAULT_EXTENSIONS: [&str; 3] = [".template.html", ".html", ""];
pub const DEFAULT_CACHE_PATH: &str = ".templator/cache";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TemplatorConfig {
    /// Search roots, highest priority first.
    pub view_paths: Vec<PathBuf>,
    /// Candidate suffixes, tried in order for every root.
    pub extensions: Vec<String>,
    pub cache_path: PathBuf,
    /// Prefix tried before the bare name when resolving a component.
    pub component_namespace: Option<String>,
    /// Write the dependency graph next to the cache after every compile.
    pub persist_dependencies: bool,
}

impl Default for TemplatorConfig {
    fn default() -> Self {
        Self {
            view_paths: Vec::new(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            component_namespace: None,
            persist_dependencies: true,
        }
    }
}

impl TemplatorConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let source = fs::read_to_string(path).map_err(|e| TemplateError::io(path, e))?;
        Self::from_toml_str(&source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TemplatorConfig::default();
        assert_eq!(config.extensions, vec![".template.html", ".html", ""]);
        assert_eq!(config.cache_path, PathBuf::from(".templator/cache"));
        assert!(config.persist_dependencies);
        assert!(config.view_paths.is_empty());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = TemplatorConfig::from_toml_str(
            r#"
            view_paths = ["views", "shared/views"]
            component_namespace = "components/"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.view_paths,
            vec![PathBuf::from("views"), PathBuf::from("shared/views")]
        );
        assert_eq!(config.component_namespace.as_deref(), Some("components/"));
        assert_eq!(config.extensions.len(), 3);
    }

    #[test]
    fn test_invalid_toml() {
        let err = TemplatorConfig::from_toml_str("view_paths = 12").unwrap_err();
        assert!(matches!(err, TemplateError::Config(_)));
    }
}
