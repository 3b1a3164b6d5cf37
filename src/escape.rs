/// HTML-entity encode `&`, `<`, `>`, `"` and `'`.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\"', "&quot;")
        .replace('\'', "&#039;")
}

/// Encode literal output as a double-quoted view-script string.
///
/// `{`, `@` and control characters other than whitespace are hex-escaped
/// as well, so the result never contains a template tag opener, a
/// code-block terminator or a placeholder delimiter.
pub fn quote_literal(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '{' => quoted.push_str("\\x7b"),
            '@' => quoted.push_str("\\x40"),
            c if c.is_ascii_control() && !matches!(c, '\n' | '\r' | '\t') => {
                quoted.push_str(&format!("\\x{:02x}", c as u32))
            }
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<script>alert('x') & \"y\"</script>"),
            "&lt;script&gt;alert(&#039;x&#039;) &amp; &quot;y&quot;&lt;/script&gt;"
        );
    }

    #[test]
    fn test_quote_literal_hides_tags() {
        let quoted = quote_literal("{{ $name }} @} \"q\" \\");
        assert_eq!(quoted, r#""\x7b\x7b $name }} \x40} \"q\" \\""#);
        assert!(!quoted.contains("{{"));
        assert!(!quoted.contains("@}"));
        assert_eq!(quote_literal("a\u{1}b\n"), "\"a\\x01b\n\"");
    }
}
