//! Statement-tag scanner.
//!
//! Builds the `{% ... %}` token list the block-structured transformers work
//! from, plus the small string helpers they share (argument splitting,
//! literal parsing, paren stripping). All scanning is quote-aware so a `%}`
//! or `,` inside a string literal never ends a tag or an argument.

/// One `{% ... %}` occurrence in a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag<'a> {
    /// Byte offset of `{%`.
    pub start: usize,
    /// Byte offset just past `%}`.
    pub end: usize,
    /// Leading identifier, e.g. `if`, `component`, `sum`.
    pub name: &'a str,
    /// Text between the outer parens directly after the name, if any.
    pub args: Option<&'a str>,
    /// Everything after the name, trimmed.
    pub rest: &'a str,
}

impl Tag<'_> {
    /// True when the parenthesised arguments are the whole remainder of the tag.
    pub fn is_call(&self) -> bool {
        self.args
            .is_some_and(|args| self.rest.len() == args.len() + 2 && self.rest.starts_with('('))
    }
}

/// Scan every statement tag in `source`, left to right.
pub fn scan_tags(source: &str) -> Vec<Tag<'_>> {
    let mut tags = Vec::new();
    let mut offset = 0;

    while let Some(found) = source[offset..].find("{%") {
        let start = offset + found;
        let inner_start = start + 2;
        let Some(inner_end) = find_outside_quotes(source, inner_start, "%}") else {
            break;
        };

        let inner = source[inner_start..inner_end].trim();
        let name_len = inner
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(inner.len());
        let name = &inner[..name_len];
        let rest = inner[name_len..].trim();
        let args = if rest.starts_with('(') {
            find_balanced_paren(rest, 0).map(|close| &rest[1..close])
        } else {
            None
        };

        tags.push(Tag {
            start,
            end: inner_end + 2,
            name,
            args,
            rest,
        });
        offset = inner_end + 2;
    }

    tags
}

/// Find `needle` at or after `from`, skipping quoted strings.
pub fn find_outside_quotes(source: &str, from: usize, needle: &str) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut in_string: Option<u8> = None;
    let mut i = from;

    while i < bytes.len() {
        let c = bytes[i];
        if let Some(quote) = in_string {
            if c == b'\\' {
                i += 2;
                continue;
            }
            if c == quote {
                in_string = None;
            }
        } else if c == b'"' || c == b'\'' {
            in_string = Some(c);
        } else if bytes[i..].starts_with(needle.as_bytes()) {
            return Some(i);
        }
        i += 1;
    }

    None
}

/// Index of the `)` that closes the `(` at `start_index`.
pub fn find_balanced_paren(code: &str, start_index: usize) -> Option<usize> {
    let bytes = code.as_bytes();
    if bytes.get(start_index)? != &b'(' {
        return None;
    }
    let mut depth = 0;
    let mut in_string: Option<u8> = None;
    let mut i = start_index;

    while i < bytes.len() {
        let c = bytes[i];
        if let Some(quote) = in_string {
            if c == b'\\' {
                i += 2;
                continue;
            }
            if c == quote {
                in_string = None;
            }
        } else if c == b'"' || c == b'\'' {
            in_string = Some(c);
        } else if c == b'(' {
            depth += 1;
        } else if c == b')' {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
        i += 1;
    }

    None
}

/// Split a call's argument text on top-level commas.
pub fn split_arguments(args: &str) -> Vec<&str> {
    let bytes = args.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_string: Option<u8> = None;
    let mut last = 0;
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if let Some(quote) = in_string {
            if c == b'\\' {
                i += 2;
                continue;
            }
            if c == quote {
                in_string = None;
            }
        } else {
            match c {
                b'"' | b'\'' => in_string = Some(c),
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => depth -= 1,
                b',' if depth == 0 => {
                    parts.push(args[last..i].trim());
                    last = i + 1;
                }
                _ => {}
            }
        }
        i += 1;
    }

    let tail = args[last..].trim();
    if !tail.is_empty() || !parts.is_empty() {
        parts.push(tail);
    }
    parts
}

/// Parse a single- or double-quoted literal, unescaping `\\`, `\'`, `\"`,
/// `\n`, `\t` and `\r`.
pub fn parse_string_literal(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.len() < 2 {
        return None;
    }
    let quote = trimmed.chars().next()?;
    if (quote != '"' && quote != '\'') || !trimmed.ends_with(quote) {
        return None;
    }

    let inner = &trimmed[1..trimmed.len() - 1];
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('r') => result.push('\r'),
                Some('t') => result.push('\t'),
                Some(other @ ('\\' | '"' | '\'')) => result.push(other),
                Some(other) => {
                    result.push('\\');
                    result.push(other);
                }
                None => result.push('\\'),
            }
        } else if c == quote {
            // An unescaped quote means this was more than one literal.
            return None;
        } else {
            result.push(c);
        }
    }

    Some(result)
}

/// Drop one pair of parens when they wrap the whole expression.
pub fn strip_outer_parens(expr: &str) -> &str {
    let trimmed = expr.trim();
    if trimmed.starts_with('(') && find_balanced_paren(trimmed, 0) == Some(trimmed.len() - 1) {
        trimmed[1..trimmed.len() - 1].trim()
    } else {
        trimmed
    }
}
