use super::{code_block, CompileContext, Transformer};
use crate::error::Result;
use crate::scan::find_outside_quotes;

/// `{{ expr }}` becomes an escaped echo, `{!! expr !!}` a raw one.
///
/// Each opener pairs with the nearest closer of its own kind. An opener
/// followed by another opener of the same kind before any closer is left as
/// literal text, so a stray `{{` never swallows the markup after it.
pub struct EchoTransformer;

impl Transformer for EchoTransformer {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn transform(&self, template: &str, _ctx: &mut CompileContext<'_>) -> Result<String> {
        let raw = rewrite_echoes(template, "{!!", "!!}", |expr| format!("echo {};", expr));
        Ok(rewrite_echoes(&raw, "{{", "}}", |expr| {
            format!("echo escape({});", expr)
        }))
    }
}

fn rewrite_echoes<F>(template: &str, open: &str, close: &str, statement: F) -> String
where
    F: Fn(&str) -> String,
{
    let mut output = String::with_capacity(template.len());
    let mut last = 0;
    let mut cursor = 0;

    while let Some(found) = template[cursor..].find(open) {
        let start = cursor + found;
        let inner_start = start + open.len();
        let rest = &template[inner_start..];

        // A closer inside a string literal belongs to the expression.
        let Some(close_at) = find_outside_quotes(rest, 0, close) else {
            cursor = inner_start;
            continue;
        };
        if rest[..close_at].contains(open) || rest[..close_at].contains("{%") {
            cursor = inner_start;
            continue;
        }

        let expr = rest[..close_at].trim();
        let end = inner_start + close_at + close.len();
        if expr.is_empty() {
            cursor = end;
            continue;
        }

        output.push_str(&template[last..start]);
        output.push_str(&code_block(&statement(expr)));
        last = end;
        cursor = end;
    }

    output.push_str(&template[last..]);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn escaped(template: &str) -> String {
        rewrite_echoes(template, "{{", "}}", |expr| format!("echo escape({});", expr))
    }

    #[test]
    fn test_unmatched_opener_stays_literal() {
        assert_eq!(
            escaped("a {{ b <p>}</p> {{ $c }}"),
            "a {{ b <p>}</p> {@ echo escape($c); @}"
        );
    }

    #[test]
    fn test_unclosed_opener() {
        assert_eq!(escaped("{{ $a"), "{{ $a");
    }

    #[test]
    fn test_empty_echo_is_left_alone() {
        assert_eq!(escaped("{{ }}"), "{{ }}");
    }

    #[test]
    fn test_closer_inside_string_literal() {
        assert_eq!(escaped("{{ '}}' }}"), "{@ echo escape('}}'); @}");
        assert_eq!(
            escaped("<b>{{ $a ?? \"!!}\" }}</b>"),
            "<b>{@ echo escape($a ?? \"!!}\"); @}</b>"
        );
    }

    #[test]
    fn test_unclosed_quote_does_not_hide_later_echo() {
        assert_eq!(
            escaped("{{ it's <p> {{ $c }}"),
            "{{ it's <p> {@ echo escape($c); @}"
        );
    }

    #[test]
    fn test_adjacent_echoes() {
        assert_eq!(
            escaped("{{$a}}{{ $b }}"),
            "{@ echo escape($a); @}{@ echo escape($b); @}"
        );
    }
}
