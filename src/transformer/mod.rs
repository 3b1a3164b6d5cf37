//! Directive Transformers
//!
//! Each stage is an independent text rewrite over the whole template. The
//! stages never see the orchestrator: everything they need (file resolution,
//! dependency recording, protected literal text) comes through
//! [`CompileContext`].
//!
//! Stage order matters. Comment stripping and raw protection run first so no
//! later stage can see commented-out or raw text; `include`, `extend` and
//! `component` then assemble one flat template; the remaining stages rewrite
//! statement and echo tags into view-script code blocks; raw text is restored
//! last.

use std::fs;
use std::path::{Path, PathBuf};

use crate::dependency::DependencyGraph;
use crate::error::{Result, TemplateError};
use crate::finder::Finder;
use crate::scan::{scan_tags, Tag};

pub mod comment;
pub mod component;
pub mod control;
pub mod directive;
pub mod echo;
pub mod include;
pub mod json;
pub mod layout;
pub mod raw;
pub mod set;
pub mod use_stmt;

pub use raw::ProtectedText;

pub trait Transformer {
    fn name(&self) -> &'static str;

    fn transform(&self, template: &str, ctx: &mut CompileContext<'_>) -> Result<String>;
}

/// State shared by every stage while one template is compiled.
pub struct CompileContext<'a> {
    finder: &'a Finder,
    component_namespace: Option<&'a str>,
    dependencies: &'a mut DependencyGraph,
    session: Option<&'a str>,
    depth: u32,
    stack: Vec<PathBuf>,
    pub protected: ProtectedText,
}

impl<'a> CompileContext<'a> {
    pub fn new(
        finder: &'a Finder,
        dependencies: &'a mut DependencyGraph,
        session: Option<&'a str>,
    ) -> Self {
        Self {
            finder,
            component_namespace: None,
            dependencies,
            session,
            depth: 0,
            stack: Vec::new(),
            protected: ProtectedText::default(),
        }
    }

    pub fn with_component_namespace(mut self, namespace: Option<&'a str>) -> Self {
        self.component_namespace = namespace;
        self
    }

    /// Mark `path` as the file being compiled, so references back to it are
    /// reported as cycles.
    pub fn with_root(mut self, path: PathBuf) -> Self {
        self.stack.push(path);
        self
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        self.finder.find(name)
    }

    /// Resolve a component name, trying the configured namespace first.
    pub fn resolve_component(&self, name: &str) -> Result<PathBuf> {
        if let Some(namespace) = self.component_namespace {
            if let Ok(path) = self.finder.find(&format!("{}{}", namespace, name)) {
                return Ok(path);
            }
        }
        self.finder.find(name)
    }

    /// Read a referenced template, record it as a dependency one level below
    /// the current depth, and run the front stages (comments, raw blocks) on it.
    pub fn load(&mut self, path: &Path) -> Result<String> {
        if self.stack.iter().any(|p| p == path) {
            return Err(TemplateError::CircularReference {
                path: path.to_path_buf(),
            });
        }

        let source = fs::read_to_string(path).map_err(|e| TemplateError::io(path, e))?;

        if let Some(session) = self.session {
            self.dependencies
                .add_dependency(session, path.to_path_buf(), self.depth + 1);
        }
        tracing::trace!(path = %path.display(), depth = self.depth + 1, "loaded dependency");

        let stripped = comment::CommentTransformer.transform(&source, self)?;
        raw::RawProtectTransformer.transform(&stripped, self)
    }

    /// Run `f` one level deeper with `path` on the reference stack.
    pub fn enter<T>(&mut self, path: PathBuf, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.stack.push(path);
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        self.stack.pop();
        result
    }
}

/// Rebuild `template`, replacing each tag for which `f` returns a replacement.
pub(crate) fn rewrite_tags<F>(template: &str, mut f: F) -> Result<String>
where
    F: FnMut(&Tag<'_>) -> Result<Option<String>>,
{
    let mut output = String::with_capacity(template.len());
    let mut last = 0;

    for tag in scan_tags(template) {
        if let Some(replacement) = f(&tag)? {
            output.push_str(&template[last..tag.start]);
            output.push_str(&replacement);
            last = tag.end;
        }
    }

    output.push_str(&template[last..]);
    Ok(output)
}

/// The single string-literal argument of `tag`, e.g. `include('nav')`.
pub(crate) fn literal_argument(tag: &Tag<'_>) -> Result<String> {
    let args = tag.args.filter(|_| tag.is_call()).ok_or_else(|| {
        TemplateError::syntax(format!("'{}' expects a quoted name in parentheses", tag.name))
    })?;
    crate::scan::parse_string_literal(args).ok_or_else(|| {
        TemplateError::syntax(format!("'{}' expects a quoted name, got {}", tag.name, args))
    })
}

pub(crate) fn code_block(statement: &str) -> String {
    format!("{{@ {} @}}", statement)
}

/// The ordered stage list the orchestrator runs.
pub struct Pipeline {
    stages: Vec<Box<dyn Transformer>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::standard()
    }
}

impl Pipeline {
    pub fn standard() -> Self {
        Self {
            stages: vec![
                Box::new(comment::CommentTransformer),
                Box::new(raw::RawProtectTransformer),
                Box::new(include::IncludeTransformer),
                Box::new(layout::LayoutTransformer),
                Box::new(component::ComponentTransformer),
                Box::new(control::ControlFlowTransformer),
                Box::new(set::SetTransformer),
                Box::new(use_stmt::UseTransformer),
                Box::new(echo::EchoTransformer),
                Box::new(json::JsonTransformer),
                Box::new(directive::DirectiveTransformer),
                Box::new(raw::RawRestoreTransformer),
            ],
        }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn run(&self, source: &str, ctx: &mut CompileContext<'_>) -> Result<String> {
        let mut template = source.to_string();
        for stage in &self.stages {
            template = stage.transform(&template, ctx)?;
            tracing::trace!(stage = stage.name(), len = template.len(), "stage complete");
        }
        Ok(template)
    }
}
