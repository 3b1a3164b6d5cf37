//! Error types for template compilation and rendering.
//!
//! Every failure in the compiler, the cache layer and the rendering runtime is
//! reported through [`TemplateError`]. Nothing is recovered internally: a
//! malformed construct is an error, never a silently-wrong render.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TemplateError>;

#[derive(Error, Debug)]
pub enum TemplateError {
    /// A logical template name did not resolve under any search root.
    ///
    /// Raised by the finder and by `include`, `extend` and `component`.
    #[error("Template file not found: {name}")]
    TemplateNotFound {
        /// The logical name as written by the caller
        name: String,
    },

    /// A layout `yield` declares both an inline default and a block body.
    #[error("yield cannot have both a default value and content: '{name}'")]
    YieldConflict { name: String },

    /// A section (or component param) has no matching `yield` in the target.
    #[error("Section '{section}' has no matching yield in '{template}'")]
    YieldMissing { section: String, template: String },

    /// The target requires a yield that the caller never supplied.
    #[error("Slot with extends '{template}' required '{slot}'")]
    SlotRequired { slot: String, template: String },

    #[error("Directive '{name}' is not registered")]
    DirectiveNotRegistered { name: String },

    #[error("Cannot register directive '{name}': name is reserved")]
    DirectiveReserved { name: String },

    /// An `if`/`foreach`/`component` opener without closer, or the reverse.
    #[error("Unbalanced block '{construct}': {detail}")]
    UnbalancedBlock { construct: String, detail: String },

    /// An include/extend/component chain that reaches a file already on the stack.
    #[error("Circular template reference through {}", path.display())]
    CircularReference { path: PathBuf },

    /// Malformed tag or view-script statement.
    #[error("Syntax error: {message}")]
    Syntax { message: String },

    /// Evaluation failure while executing a compiled artifact.
    #[error("Render error: {message}")]
    Render { message: String },

    /// A registered directive returned an error.
    #[error("Directive '{name}' failed: {message}")]
    Directive { name: String, message: String },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),
}

impl TemplateError {
    pub(crate) fn syntax(message: impl Into<String>) -> Self {
        TemplateError::Syntax {
            message: message.into(),
        }
    }

    pub(crate) fn render(message: impl Into<String>) -> Self {
        TemplateError::Render {
            message: message.into(),
        }
    }

    pub(crate) fn unbalanced(construct: &str, detail: impl Into<String>) -> Self {
        TemplateError::UnbalancedBlock {
            construct: construct.to_string(),
            detail: detail.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TemplateError::Io {
            path: path.into(),
            source,
        }
    }
}
