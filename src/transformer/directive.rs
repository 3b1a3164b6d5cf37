use super::{code_block, rewrite_tags, CompileContext, Transformer};
use crate::error::{Result, TemplateError};
use crate::registry::is_reserved;

/// Routes any remaining `{% name(args) %}` through the directive registry.
///
/// This is the last tag stage: a statement tag still present here is either
/// a custom directive call or a construct nothing else could place, which is
/// an error rather than something to drop.
pub struct DirectiveTransformer;

impl Transformer for DirectiveTransformer {
    fn name(&self) -> &'static str {
        "directive"
    }

    fn transform(&self, template: &str, _ctx: &mut CompileContext<'_>) -> Result<String> {
        rewrite_tags(template, |tag| {
            if tag.name.is_empty() {
                return Err(TemplateError::syntax(format!(
                    "empty or malformed tag {{% {} %}}",
                    tag.rest
                )));
            }
            if is_reserved(tag.name) {
                return Err(TemplateError::syntax(format!(
                    "unexpected {{% {} %}} here",
                    tag.name
                )));
            }

            let args = match tag.args {
                Some(args) if tag.is_call() => args.trim(),
                _ => {
                    return Err(TemplateError::syntax(format!(
                        "unknown directive {{% {} %}}; custom directives are called as {{% {}(...) %}}",
                        tag.name, tag.name
                    )))
                }
            };

            let statement = if args.is_empty() {
                format!("echo directive('{}');", tag.name)
            } else {
                format!("echo directive('{}', {});", tag.name, args)
            };
            Ok(Some(code_block(&statement)))
        })
    }
}
