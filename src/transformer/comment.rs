use lazy_static::lazy_static;
use regex::Regex;

use super::{CompileContext, Transformer};
use crate::error::Result;

lazy_static! {
    static ref COMMENT_RE: Regex = Regex::new(r"(?s)\{#.*?#\}").unwrap();
}

/// Removes `{# ... #}` comments.
pub struct CommentTransformer;

impl Transformer for CommentTransformer {
    fn name(&self) -> &'static str {
        "comment"
    }

    fn transform(&self, template: &str, _ctx: &mut CompileContext<'_>) -> Result<String> {
        Ok(COMMENT_RE.replace_all(template, "").into_owned())
    }
}
