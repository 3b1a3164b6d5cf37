use lazy_static::lazy_static;
use regex::Regex;

use super::{code_block, rewrite_tags, CompileContext, Transformer};
use crate::error::{Result, TemplateError};

lazy_static! {
    static ref ASSIGNMENT_RE: Regex =
        Regex::new(r"(?s)^(\$[A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.+)$").unwrap();
}

/// `{% set $name = expr %}` becomes an assignment. The right-hand side is
/// moved into code as written, never evaluated here.
pub struct SetTransformer;

impl Transformer for SetTransformer {
    fn name(&self) -> &'static str {
        "set"
    }

    fn transform(&self, template: &str, _ctx: &mut CompileContext<'_>) -> Result<String> {
        rewrite_tags(template, |tag| {
            if tag.name != "set" {
                return Ok(None);
            }
            let caps = ASSIGNMENT_RE.captures(tag.rest).ok_or_else(|| {
                TemplateError::syntax(format!("set expects '$name = value', got {}", tag.rest))
            })?;
            let statement = format!("{} = {};", &caps[1], caps[2].trim());
            Ok(Some(code_block(&statement)))
        })
    }
}
