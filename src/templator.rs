//! Compilation Orchestrator
//!
//! Ties the pieces together: the [`Finder`] resolves names, the transformer
//! [`Pipeline`] compiles sources, the [`ViewCache`] stores artifacts, the
//! [`DependencyGraph`] decides when a stored artifact is stale, and the
//! [`Runtime`] renders artifacts against a data context.
//!
//! A compile of logical name `n` records its dependencies under a session
//! keyed by the resolved source path of `n`, so the freshness check for `n`
//! can compare the cache entry against every file the compile touched.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::cache::ViewCache;
use crate::config::TemplatorConfig;
use crate::dependency::{Dependencies, DependencyGraph};
use crate::error::{Result, TemplateError};
use crate::finder::Finder;
use crate::registry::DirectiveRegistry;
use crate::runtime::Runtime;
use crate::transformer::{CompileContext, Pipeline};

/// File inside the cache directory holding the persisted dependency graph.
pub const DEPENDENCY_FILE: &str = "dependencies.json";

#[derive(Debug)]
pub struct Templator {
    finder: Finder,
    cache: ViewCache,
    pipeline: Pipeline,
    dependencies: DependencyGraph,
    directives: DirectiveRegistry,
    component_namespace: Option<String>,
    persist_dependencies: bool,
}

impl Templator {
    /// An orchestrator with an in-memory dependency graph and its own
    /// directive registry.
    pub fn new(finder: Finder, cache: ViewCache) -> Self {
        Self {
            finder,
            cache,
            pipeline: Pipeline::standard(),
            dependencies: DependencyGraph::new(),
            directives: DirectiveRegistry::new(),
            component_namespace: None,
            persist_dependencies: false,
        }
    }

    pub fn from_config(config: &TemplatorConfig) -> Self {
        let finder = Finder::with_extensions(config.view_paths.clone(), config.extensions.clone());
        let cache = ViewCache::new(config.cache_path.clone());
        let dependencies = if config.persist_dependencies {
            DependencyGraph::load(&config.cache_path.join(DEPENDENCY_FILE))
        } else {
            DependencyGraph::new()
        };

        Self {
            dependencies,
            component_namespace: config.component_namespace.clone(),
            persist_dependencies: config.persist_dependencies,
            ..Self::new(finder, cache)
        }
    }

    /// Use `directives` instead of the private registry. Clones of one
    /// registry share their registrations.
    pub fn with_directives(mut self, directives: DirectiveRegistry) -> Self {
        self.directives = directives;
        self
    }

    pub fn with_component_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.component_namespace = Some(namespace.into());
        self
    }

    pub fn directives(&self) -> &DirectiveRegistry {
        &self.directives
    }

    pub fn finder(&self) -> &Finder {
        &self.finder
    }

    pub fn finder_mut(&mut self) -> &mut Finder {
        &mut self.finder
    }

    pub fn cache(&self) -> &ViewCache {
        &self.cache
    }

    pub fn dependencies(&self) -> &DependencyGraph {
        &self.dependencies
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // COMPILATION
    // ═══════════════════════════════════════════════════════════════════════════════

    /// Run the full pipeline over `source`. With a `session`, every template
    /// the source pulls in is recorded under that key.
    pub fn templates(&mut self, source: &str, session: Option<&str>) -> Result<String> {
        self.run_pipeline(source, session, None)
    }

    /// Compile the template `name` and store the artifact in the cache.
    pub fn compile(&mut self, name: &str) -> Result<String> {
        let path = self.finder.find(name)?;
        let session = session_key(&path);
        let source = fs::read_to_string(&path).map_err(|e| TemplateError::io(&path, e))?;

        self.dependencies.remove(&session);
        let compiled = self.run_pipeline(&source, Some(&session), Some(path.clone()))?;
        self.dependencies.open_session(&session);

        let cache_path = self.cache.set(name, &compiled)?;
        self.persist()?;

        tracing::debug!(
            name,
            source = %path.display(),
            cache = %cache_path.display(),
            dependencies = self.dependencies.get_dependency(&session).len(),
            "compiled template"
        );
        Ok(compiled)
    }

    fn run_pipeline(
        &mut self,
        source: &str,
        session: Option<&str>,
        root: Option<PathBuf>,
    ) -> Result<String> {
        let mut ctx = CompileContext::new(&self.finder, &mut self.dependencies, session)
            .with_component_namespace(self.component_namespace.as_deref());
        if let Some(root) = root {
            ctx = ctx.with_root(root);
        }
        self.pipeline.run(source, &mut ctx)
    }

    /// Cache location of the artifact for `name`, compiled or not.
    pub fn compiled_path(&self, name: &str) -> PathBuf {
        self.cache.path_for(name)
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // RENDERING
    // ═══════════════════════════════════════════════════════════════════════════════

    /// Render `name` against `data`, which must serialise to a map (or unit).
    ///
    /// With `use_cache`, a stored artifact is reused as long as neither the
    /// source nor any recorded dependency changed after it was written.
    pub fn render<T>(&mut self, name: &str, data: &T, use_cache: bool) -> Result<String>
    where
        T: Serialize + ?Sized,
    {
        let context = data_context(data)?;
        let artifact = self.artifact(name, use_cache)?;
        Runtime::new(&self.directives).render(&artifact, context)
    }

    fn artifact(&mut self, name: &str, use_cache: bool) -> Result<String> {
        if use_cache {
            let path = self.finder.find(name)?;
            let session = session_key(&path);
            if self.dependencies.contains(&session)
                && self
                    .cache
                    .is_fresh(name, &path, &self.dependencies.get_dependency(&session))
            {
                if let Some(artifact) = self.cache.get(name) {
                    tracing::debug!(name, "view cache hit");
                    return Ok(artifact);
                }
            }
            tracing::debug!(name, "view cache miss");
        }
        self.compile(name)
    }

    pub fn view_exist(&self, name: &str) -> bool {
        self.finder.exists(name)
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // DEPENDENCIES
    // ═══════════════════════════════════════════════════════════════════════════════

    pub fn get_dependency(&self, session: &str) -> Dependencies {
        self.dependencies.get_dependency(session)
    }

    pub fn add_dependency(&mut self, session: &str, path: impl Into<PathBuf>, depth: u32) {
        self.dependencies.add_dependency(session, path, depth);
    }

    pub fn prepend_dependency(&mut self, session: &str, dependencies: &Dependencies) {
        self.dependencies.prepend_dependency(session, dependencies);
    }

    /// Delete every cached artifact and forget all recorded dependencies.
    pub fn clear_cache(&mut self) -> Result<usize> {
        let removed = self.cache.clear()?;
        self.dependencies.clear();
        self.persist()?;
        Ok(removed)
    }

    fn persist(&self) -> Result<()> {
        if !self.persist_dependencies {
            return Ok(());
        }
        self.dependencies
            .save(&self.cache.cache_dir().join(DEPENDENCY_FILE))
    }
}

fn session_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn data_context<T>(data: &T) -> Result<Map<String, Value>>
where
    T: Serialize + ?Sized,
{
    match serde_json::to_value(data)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(TemplateError::render(format!(
            "data context must serialize to a map, got {}",
            match other {
                Value::Array(_) => "an array",
                Value::String(_) => "a string",
                Value::Number(_) => "a number",
                _ => "a boolean",
            }
        ))),
    }
}
