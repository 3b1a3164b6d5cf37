//! Tokenizer for view-script code blocks.

use crate::error::{Result, TemplateError};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Variable(String),
    /// Bare word; may contain `\` for namespaced paths.
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Colon,
    Question,
    Coalesce,
    Arrow,
    FatArrow,
    Dot,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Assign,
    Eq,
    NotEq,
    Identical,
    NotIdentical,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
    Pipe,
}

pub fn tokenize(code: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = code.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c == '$' {
            let start = i + 1;
            let mut end = start;
            while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
                end += 1;
            }
            if end == start {
                return Err(TemplateError::syntax("'$' must be followed by a variable name"));
            }
            tokens.push(Token::Variable(chars[start..end].iter().collect()));
            i = end;
            continue;
        }

        if c.is_alphabetic() || c == '_' || c == '\\' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '\\')
            {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '_') {
                i += 1;
            }
            let is_float = i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit();
            if is_float {
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let text: String = chars[start..i].iter().filter(|c| **c != '_').collect();
            let token = if is_float {
                text.parse().map(Token::Float).ok()
            } else {
                text.parse().map(Token::Int).ok()
            };
            tokens.push(
                token.ok_or_else(|| TemplateError::syntax(format!("invalid number {}", text)))?,
            );
            continue;
        }

        if c == '\'' || c == '"' {
            let (text, next) = read_string(&chars, i)?;
            tokens.push(Token::Str(text));
            i = next;
            continue;
        }

        let next = chars.get(i + 1).copied();
        let after = chars.get(i + 2).copied();
        let (token, width) = match (c, next, after) {
            ('=', Some('='), Some('=')) => (Token::Identical, 3),
            ('!', Some('='), Some('=')) => (Token::NotIdentical, 3),
            ('=', Some('='), _) => (Token::Eq, 2),
            ('!', Some('='), _) => (Token::NotEq, 2),
            ('<', Some('>'), _) => (Token::NotEq, 2),
            ('=', Some('>'), _) => (Token::FatArrow, 2),
            ('-', Some('>'), _) => (Token::Arrow, 2),
            ('?', Some('?'), _) => (Token::Coalesce, 2),
            ('<', Some('='), _) => (Token::Le, 2),
            ('>', Some('='), _) => (Token::Ge, 2),
            ('&', Some('&'), _) => (Token::And, 2),
            ('|', Some('|'), _) => (Token::Or, 2),
            ('=', _, _) => (Token::Assign, 1),
            ('!', _, _) => (Token::Bang, 1),
            ('<', _, _) => (Token::Lt, 1),
            ('>', _, _) => (Token::Gt, 1),
            ('|', _, _) => (Token::Pipe, 1),
            ('(', _, _) => (Token::LParen, 1),
            (')', _, _) => (Token::RParen, 1),
            ('[', _, _) => (Token::LBracket, 1),
            (']', _, _) => (Token::RBracket, 1),
            (',', _, _) => (Token::Comma, 1),
            (';', _, _) => (Token::Semicolon, 1),
            (':', _, _) => (Token::Colon, 1),
            ('?', _, _) => (Token::Question, 1),
            ('.', _, _) => (Token::Dot, 1),
            ('+', _, _) => (Token::Plus, 1),
            ('-', _, _) => (Token::Minus, 1),
            ('*', _, _) => (Token::Star, 1),
            ('/', _, _) => (Token::Slash, 1),
            ('%', _, _) => (Token::Percent, 1),
            _ => {
                return Err(TemplateError::syntax(format!(
                    "unexpected character '{}' in code",
                    c
                )))
            }
        };
        tokens.push(token);
        i += width;
    }

    Ok(tokens)
}

/// Read a quoted string starting at `start`. Single quotes only unescape
/// `\'` and `\\`; double quotes also understand `\n`, `\r`, `\t`, `\$` and
/// `\xHH`.
fn read_string(chars: &[char], start: usize) -> Result<(String, usize)> {
    let quote = chars[start];
    let mut text = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        let c = chars[i];
        if c == quote {
            return Ok((text, i + 1));
        }
        if c != '\\' || i + 1 >= chars.len() {
            text.push(c);
            i += 1;
            continue;
        }

        let escaped = chars[i + 1];
        match (quote, escaped) {
            (_, '\\') => text.push('\\'),
            (q, e) if q == e => text.push(e),
            ('"', 'n') => text.push('\n'),
            ('"', 'r') => text.push('\r'),
            ('"', 't') => text.push('\t'),
            ('"', '$') => text.push('$'),
            ('"', 'x') => {
                let hex: String = chars.iter().skip(i + 2).take(2).collect();
                match u8::from_str_radix(&hex, 16) {
                    Ok(byte) if hex.len() == 2 => {
                        text.push(char::from(byte));
                        i += 4;
                        continue;
                    }
                    _ => {
                        text.push('\\');
                        text.push('x');
                    }
                }
            }
            (_, other) => {
                text.push('\\');
                text.push(other);
            }
        }
        i += 2;
    }

    Err(TemplateError::syntax("unterminated string literal"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens() {
        let tokens = tokenize("$user->name ?? 'guest'").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Variable("user".into()),
                Token::Arrow,
                Token::Ident("name".into()),
                Token::Coalesce,
                Token::Str("guest".into()),
            ]
        );
    }

    #[test]
    fn test_numbers_and_operators() {
        let tokens = tokenize("1.5 + 2 === 3 != 4").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Float(1.5),
                Token::Plus,
                Token::Int(2),
                Token::Identical,
                Token::Int(3),
                Token::NotEq,
                Token::Int(4),
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        let tokens = tokenize(r#"'it\'s' "a\x7bb\n""#).unwrap();
        assert_eq!(
            tokens,
            vec![Token::Str("it's".into()), Token::Str("a{b\n".into())]
        );
    }

    #[test]
    fn test_namespaced_ident() {
        let tokens = tokenize(r"use App\Helpers\Str as S;").unwrap();
        assert_eq!(tokens[1], Token::Ident(r"App\Helpers\Str".into()));
    }

    #[test]
    fn test_unterminated_string() {
        assert!(tokenize("'open").is_err());
    }
}
