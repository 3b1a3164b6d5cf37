use lazy_static::lazy_static;
use regex::Regex;

use super::{code_block, literal_argument, rewrite_tags, CompileContext, Transformer};
use crate::error::{Result, TemplateError};

lazy_static! {
    static ref IMPORT_RE: Regex =
        Regex::new(r"^\\?[A-Za-z_][A-Za-z0-9_\\]*(?:\s+as\s+[A-Za-z_][A-Za-z0-9_]*)?$").unwrap();
}

/// `{% use('Namespace\Path as Alias') %}` becomes an import statement in place.
pub struct UseTransformer;

impl Transformer for UseTransformer {
    fn name(&self) -> &'static str {
        "use"
    }

    fn transform(&self, template: &str, _ctx: &mut CompileContext<'_>) -> Result<String> {
        rewrite_tags(template, |tag| {
            if tag.name != "use" {
                return Ok(None);
            }
            let import = literal_argument(tag)?;
            let import = import.trim();
            if !IMPORT_RE.is_match(import) {
                return Err(TemplateError::syntax(format!("invalid use path: {}", import)));
            }
            Ok(Some(code_block(&format!("use {};", import))))
        })
    }
}
