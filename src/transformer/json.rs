use super::{code_block, rewrite_tags, CompileContext, Transformer};
use crate::error::{Result, TemplateError};
use crate::scan::split_arguments;

pub const JSON_HEX_TAG: i64 = 1;
pub const JSON_HEX_AMP: i64 = 2;
pub const JSON_HEX_APOS: i64 = 4;
pub const JSON_HEX_QUOT: i64 = 8;
pub const JSON_UNESCAPED_SLASHES: i64 = 64;
pub const JSON_PRETTY_PRINT: i64 = 128;
pub const JSON_THROW_ON_ERROR: i64 = 4_194_304;

/// Flags every `{% json %}` output carries, whatever the caller passes.
pub const JSON_SAFE_FLAGS: i64 =
    JSON_HEX_TAG | JSON_HEX_APOS | JSON_HEX_AMP | JSON_HEX_QUOT | JSON_THROW_ON_ERROR;
pub const JSON_DEFAULT_DEPTH: i64 = 512;

/// `{% json(expr[, options[, depth]]) %}` becomes a JSON-encoding echo.
pub struct JsonTransformer;

impl Transformer for JsonTransformer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn transform(&self, template: &str, _ctx: &mut CompileContext<'_>) -> Result<String> {
        rewrite_tags(template, |tag| {
            if tag.name != "json" {
                return Ok(None);
            }
            let args = tag
                .args
                .filter(|_| tag.is_call())
                .map(split_arguments)
                .unwrap_or_default();

            let default_depth = JSON_DEFAULT_DEPTH.to_string();
            let (value, options, depth) = match args.as_slice() {
                [value] => (*value, "0", default_depth.as_str()),
                [value, options] => (*value, *options, default_depth.as_str()),
                [value, options, depth] => (*value, *options, *depth),
                _ => {
                    return Err(TemplateError::syntax(
                        "json expects (value[, options[, depth]])",
                    ))
                }
            };
            if value.is_empty() || options.is_empty() || depth.is_empty() {
                return Err(TemplateError::syntax("json arguments cannot be empty"));
            }

            let statement = format!(
                "echo json_encode({}, {} | {}, {});",
                value, JSON_SAFE_FLAGS, options, depth
            );
            Ok(Some(code_block(&statement)))
        })
    }
}
