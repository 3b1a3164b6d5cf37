//! # Templator
//!
//! A directive-based template compiler with a compiled-view cache and a
//! dependency graph for cache invalidation.
//!
//! ## Template Syntax
//!
//! | Tag | Meaning |
//! |---|---|
//! | `{# ... #}` | comment, removed |
//! | `{{ expr }}` / `{!! expr !!}` | escaped / raw output |
//! | `{% if %}` `{% elseif %}` `{% else %}` `{% endif %}` | conditionals |
//! | `{% foreach ($xs as $k => $v) %}` `{% endforeach %}` | loops, with `{% break %}` / `{% continue %}` |
//! | `{% include('name') %}` | inline another template in the caller's scope |
//! | `{% extend('layout') %}` `{% section %}` `{% sections %}` `{% yield %}` | inheritance |
//! | `{% component('name', p: 'v') %}...{% endcomponent %}` | components with params and a default slot |
//! | `{% set $v = expr %}` `{% use('NS\Path as A') %}` `{% json(expr) %}` | statements |
//! | `{% raw %}...{% endraw %}` | verbatim passthrough |
//! | `{% name(args) %}` | custom directive from the [`DirectiveRegistry`] |
//!
//! ## Pipeline
//!
//! 1. **Compile**: [`Templator::templates`] rewrites a source through the
//!    transformer [`Pipeline`](transformer::Pipeline) into an artifact of
//!    literal text and `{@ ... @}` code blocks.
//! 2. **Cache**: [`Templator::compile`] stores the artifact in the
//!    [`ViewCache`] and records every file it consulted in the
//!    [`DependencyGraph`].
//! 3. **Render**: [`Templator::render`] reuses a fresh artifact or recompiles,
//!    then executes it with the [`Runtime`].
//!
//! ## Invariants
//!
//! 1. **Idempotence**: compiled artifacts contain no template tag syntax, so
//!    running the pipeline over an artifact returns it unchanged.
//! 2. **Escaping**: `{{ }}`, inline sections, `sections` batches and component
//!    params are HTML-escaped; only `{!! !!}` and raw blocks are verbatim.
//! 3. **No partial output**: a failed render returns an error and nothing else.

pub mod cache;
pub mod config;
pub mod dependency;
pub mod error;
pub mod escape;
pub mod finder;
pub mod registry;
pub mod runtime;
pub mod scan;
pub mod templator;
pub mod transformer;

#[cfg(test)]
mod templator_tests;

pub use cache::ViewCache;
pub use config::TemplatorConfig;
pub use dependency::{Dependencies, DependencyGraph};
pub use error::{Result, TemplateError};
pub use finder::Finder;
pub use registry::DirectiveRegistry;
pub use runtime::Runtime;
pub use templator::Templator;
