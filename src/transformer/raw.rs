//! Raw-block protection.
//!
//! `{% raw %}...{% endraw %}` spans are swapped for placeholders before any
//! other stage runs and swapped back, untouched, after the last one. The same
//! store carries other literal output that must not be reinterpreted, such as
//! inline section values and component params.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use super::{code_block, CompileContext, Transformer};
use crate::error::{Result, TemplateError};
use crate::escape::quote_literal;
use crate::scan::find_outside_quotes;

/// Delimits placeholder tokens. Source text never carries it past the
/// protect stage: a literal occurrence is protected like any other text.
const SENTINEL: char = '\u{1}';

lazy_static! {
    static ref RAW_OPEN_RE: Regex = Regex::new(r"^\{%\s*raw\s*%\}").unwrap();
    static ref RAW_CLOSE_RE: Regex = Regex::new(r"\{%\s*endraw\s*%\}").unwrap();
    static ref STRAY_RAW_TAG_RE: Regex = Regex::new(r"\{%\s*(?:raw|endraw)\s*%\}").unwrap();
    static ref PLACEHOLDER_RE: Regex = Regex::new(r"\x01TEMPLATOR_RAW_(\d+)\x01").unwrap();
}

/// Literal output held out of the pipeline, addressed by placeholder.
#[derive(Debug, Default)]
pub struct ProtectedText {
    entries: Vec<String>,
}

impl ProtectedText {
    /// Store `text` and return the placeholder standing in for it.
    pub fn protect(&mut self, text: impl Into<String>) -> String {
        let placeholder = format!("{}TEMPLATOR_RAW_{}{}", SENTINEL, self.entries.len(), SENTINEL);
        self.entries.push(text.into());
        placeholder
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace every placeholder with an echo of its stored literal.
    pub fn restore(&self, template: &str) -> String {
        PLACEHOLDER_RE
            .replace_all(template, |caps: &Captures| match self.entry(&caps[1]) {
                Some(text) if text.is_empty() => String::new(),
                Some(text) => code_block(&format!("echo {};", quote_literal(&self.expand(text)))),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    /// Plain text of `text` with nested placeholders put back.
    fn expand(&self, text: &str) -> String {
        PLACEHOLDER_RE
            .replace_all(text, |caps: &Captures| match self.entry(&caps[1]) {
                Some(inner) => self.expand(inner),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    fn entry(&self, index: &str) -> Option<&String> {
        index
            .parse::<usize>()
            .ok()
            .and_then(|index| self.entries.get(index))
    }
}

/// Protects raw blocks and any text that could later be mistaken for a
/// code block or a placeholder: a `{@` that does not open a complete
/// `{@ ... @}` block, and the placeholder sentinel itself.
pub struct RawProtectTransformer;

impl Transformer for RawProtectTransformer {
    fn name(&self) -> &'static str {
        "raw-protect"
    }

    fn transform(&self, template: &str, ctx: &mut CompileContext<'_>) -> Result<String> {
        let before = ctx.protected.len();
        let mut output = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(at) = rest.find(|c: char| c == '{' || c == SENTINEL) {
            output.push_str(&rest[..at]);
            let tail = &rest[at..];

            let consumed = if let Some(open) = RAW_OPEN_RE.find(tail) {
                let body = &tail[open.end()..];
                let close = RAW_CLOSE_RE.find(body).ok_or_else(|| {
                    TemplateError::unbalanced("raw", "every {% raw %} needs a matching {% endraw %}")
                })?;
                output.push_str(&ctx.protected.protect(&body[..close.start()]));
                open.end() + close.end()
            } else if let Some(len) = code_block_len(tail) {
                output.push_str(&tail[..len]);
                len
            } else if tail.starts_with("{@") {
                output.push_str(&ctx.protected.protect("{@"));
                2
            } else if tail.starts_with(SENTINEL) {
                output.push_str(&ctx.protected.protect(SENTINEL.to_string()));
                SENTINEL.len_utf8()
            } else {
                output.push('{');
                1
            };
            rest = &tail[consumed..];
        }
        output.push_str(rest);

        if STRAY_RAW_TAG_RE.is_match(&output) {
            return Err(TemplateError::unbalanced(
                "raw",
                "every {% raw %} needs a matching {% endraw %}",
            ));
        }

        if ctx.protected.len() > before {
            tracing::debug!(count = ctx.protected.len() - before, "protected literal text");
        }
        Ok(output)
    }
}

/// Length of a complete `{@ ... @}` block at the start of `text`, as found
/// in compiled output.
fn code_block_len(text: &str) -> Option<usize> {
    if !text.starts_with("{@ ") {
        return None;
    }
    let close = find_outside_quotes(text, 3, "@}")?;
    (!text[3..close].contains("{@")).then_some(close + 2)
}

pub struct RawRestoreTransformer;

impl Transformer for RawRestoreTransformer {
    fn name(&self) -> &'static str {
        "raw-restore"
    }

    fn transform(&self, template: &str, ctx: &mut CompileContext<'_>) -> Result<String> {
        Ok(ctx.protected.restore(template))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protect_and_restore() {
        let mut store = ProtectedText::default();
        let placeholder = store.protect("{{ $x }}");
        assert_eq!(placeholder, "\u{1}TEMPLATOR_RAW_0\u{1}");

        let restored = store.restore(&format!("<p>{}</p>", placeholder));
        assert_eq!(restored, r#"<p>{@ echo "\x7b\x7b $x }}"; @}</p>"#);
    }

    #[test]
    fn test_unknown_placeholder_is_kept() {
        let store = ProtectedText::default();
        assert_eq!(
            store.restore("\u{1}TEMPLATOR_RAW_7\u{1}"),
            "\u{1}TEMPLATOR_RAW_7\u{1}"
        );
    }

    #[test]
    fn test_nested_placeholder_restores_as_text() {
        let mut store = ProtectedText::default();
        let inner = store.protect("{@");
        let outer = store.protect(format!("a {} b", inner));
        assert_eq!(store.restore(&outer), r#"{@ echo "a \x7b\x40 b"; @}"#);
    }

    #[test]
    fn test_code_block_len() {
        assert_eq!(code_block_len("{@ echo $x; @} tail"), Some(14));
        assert_eq!(code_block_len(r#"{@ echo "@}"; @}"#), Some(16));
        assert_eq!(code_block_len("{@admin}"), None);
        assert_eq!(code_block_len("{@ never closed"), None);
    }
}
