use super::{component, literal_argument, rewrite_tags, CompileContext, Transformer};
use crate::error::Result;

/// Inlines `{% include('name') %}` targets into the including template.
///
/// The included text joins the caller's template before any statement or
/// echo tag is compiled, so it executes in the caller's variable scope.
/// Nested includes are expanded recursively, each one level deeper.
pub struct IncludeTransformer;

impl Transformer for IncludeTransformer {
    fn name(&self) -> &'static str {
        "include"
    }

    fn transform(&self, template: &str, ctx: &mut CompileContext<'_>) -> Result<String> {
        expand(template, ctx)
    }
}

pub(crate) fn expand(template: &str, ctx: &mut CompileContext<'_>) -> Result<String> {
    rewrite_tags(template, |tag| {
        if tag.name != "include" {
            return Ok(None);
        }

        let name = literal_argument(tag)?;
        let path = ctx.resolve(&name)?;
        let content = ctx.load(&path)?;
        tracing::debug!(include = %name, depth = ctx.depth() + 1, "inlining include");

        let expanded = ctx.enter(path, |ctx| {
            let expanded = expand(&content, ctx)?;
            component::resolve_components(&expanded, ctx)
        })?;
        Ok(Some(expanded))
    })
}
