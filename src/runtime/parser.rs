//! Compiled-artifact parser.
//!
//! An artifact is literal text interleaved with `{@ ... @}` code blocks. The
//! statements of every block are parsed in order and folded into a tree with a
//! block stack, so `if`/`foreach` bodies may span any number of code blocks
//! and the literal text between them.

use serde_json::Value;

use super::lexer::{tokenize, Token};
use crate::error::{Result, TemplateError};
use crate::scan::find_outside_quotes;
use crate::transformer::json::{
    JSON_DEFAULT_DEPTH, JSON_HEX_AMP, JSON_HEX_APOS, JSON_HEX_QUOT, JSON_HEX_TAG,
    JSON_PRETTY_PRINT, JSON_THROW_ON_ERROR, JSON_UNESCAPED_SLASHES,
};

// ═══════════════════════════════════════════════════════════════════════════════
// AST
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Concat,
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
    BitOr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Variable(String),
    Array(Vec<(Option<Expr>, Expr)>),
    Index(Box<Expr>, Box<Expr>),
    Property(Box<Expr>, String),
    Method(Box<Expr>, String, Vec<Expr>),
    Call(String, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Coalesce(Box<Expr>, Box<Expr>),
    /// `cond ? then : otherwise`; `then` is `None` for `cond ?: otherwise`.
    Ternary(Box<Expr>, Option<Box<Expr>>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Echo(Expr),
    If {
        branches: Vec<(Expr, Vec<Node>)>,
        otherwise: Option<Vec<Node>>,
    },
    Foreach {
        source: Expr,
        key: Option<String>,
        value: String,
        body: Vec<Node>,
    },
    Break,
    Continue,
    Assign(String, Expr),
    Use {
        path: String,
        alias: String,
    },
    Expr(Expr),
}

// ═══════════════════════════════════════════════════════════════════════════════
// ARTIFACT
// ═══════════════════════════════════════════════════════════════════════════════

enum Frame {
    Root,
    If {
        branches: Vec<(Expr, Vec<Node>)>,
        condition: Option<Expr>,
    },
    Foreach {
        source: Expr,
        key: Option<String>,
        value: String,
    },
}

struct TreeBuilder {
    stack: Vec<(Frame, Vec<Node>)>,
}

impl TreeBuilder {
    fn new() -> Self {
        Self {
            stack: vec![(Frame::Root, Vec::new())],
        }
    }

    fn push(&mut self, node: Node) {
        if let Some((_, nodes)) = self.stack.last_mut() {
            nodes.push(node);
        }
    }

    fn open(&mut self, frame: Frame) {
        self.stack.push((frame, Vec::new()));
    }

    fn in_foreach(&self) -> bool {
        self.stack
            .iter()
            .any(|(frame, _)| matches!(frame, Frame::Foreach { .. }))
    }

    /// `elseif` (with a condition) or `else` (without).
    fn branch(&mut self, next: Option<Expr>) -> Result<()> {
        let keyword = if next.is_some() { "elseif" } else { "else" };
        match self.stack.last_mut() {
            Some((Frame::If { branches, condition }, nodes)) => {
                let current = condition.take().ok_or_else(|| {
                    TemplateError::syntax(format!("{} after else", keyword))
                })?;
                branches.push((current, std::mem::take(nodes)));
                *condition = next;
                Ok(())
            }
            _ => Err(TemplateError::unbalanced(
                keyword,
                format!("{} outside of an if block", keyword),
            )),
        }
    }

    fn close(&mut self, keyword: &str) -> Result<()> {
        let node = match (keyword, self.stack.pop()) {
            ("endif", Some((Frame::If { mut branches, condition }, nodes))) => {
                let otherwise = match condition {
                    Some(condition) => {
                        branches.push((condition, nodes));
                        None
                    }
                    None => Some(nodes),
                };
                Node::If {
                    branches,
                    otherwise,
                }
            }
            ("endforeach", Some((Frame::Foreach { source, key, value }, body))) => Node::Foreach {
                source,
                key,
                value,
                body,
            },
            (_, frame) => {
                if let Some(frame) = frame {
                    self.stack.push(frame);
                }
                return Err(TemplateError::unbalanced(
                    keyword,
                    format!("{} without a matching opener", keyword),
                ));
            }
        };
        self.push(node);
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<Node>> {
        match self.stack.len() {
            1 => Ok(self.stack.pop().map(|(_, nodes)| nodes).unwrap_or_default()),
            _ => {
                let construct = match self.stack.last() {
                    Some((Frame::Foreach { .. }, _)) => "foreach",
                    _ => "if",
                };
                Err(TemplateError::unbalanced(
                    construct,
                    format!("{} block is never closed", construct),
                ))
            }
        }
    }
}

/// Parse a compiled artifact into its statement tree.
pub fn parse_artifact(artifact: &str) -> Result<Vec<Node>> {
    let mut builder = TreeBuilder::new();
    let mut cursor = 0;

    while let Some(found) = artifact[cursor..].find("{@") {
        let start = cursor + found;
        if start > cursor {
            builder.push(Node::Text(artifact[cursor..start].to_string()));
        }
        let code_start = start + 2;
        let code_end = find_outside_quotes(artifact, code_start, "@}")
            .ok_or_else(|| TemplateError::syntax("unterminated {@ code block"))?;

        let tokens = tokenize(&artifact[code_start..code_end])?;
        StatementParser::new(tokens).parse_into(&mut builder)?;
        cursor = code_end + 2;
    }

    if cursor < artifact.len() {
        builder.push(Node::Text(artifact[cursor..].to_string()));
    }
    builder.finish()
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATEMENTS
// ═══════════════════════════════════════════════════════════════════════════════

struct StatementParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl StatementParser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn parse_into(mut self, builder: &mut TreeBuilder) -> Result<()> {
        while self.pos < self.tokens.len() {
            if self.eat(&Token::Semicolon) {
                continue;
            }
            self.statement(builder)?;
        }
        Ok(())
    }

    fn statement(&mut self, builder: &mut TreeBuilder) -> Result<()> {
        let keyword = match self.peek() {
            Some(Token::Ident(word)) => word.to_ascii_lowercase(),
            Some(Token::Variable(_)) if self.peek_at(1) == Some(&Token::Assign) => {
                let name = self.variable()?;
                self.expect(&Token::Assign)?;
                let value = self.expression()?;
                self.end_statement()?;
                builder.push(Node::Assign(name, value));
                return Ok(());
            }
            _ => String::new(),
        };

        match keyword.as_str() {
            "echo" => {
                self.pos += 1;
                let expr = self.expression()?;
                self.end_statement()?;
                builder.push(Node::Echo(expr));
            }
            "if" | "elseif" => {
                self.pos += 1;
                let condition = self.parenthesized()?;
                self.expect(&Token::Colon)?;
                if keyword == "if" {
                    builder.open(Frame::If {
                        branches: Vec::new(),
                        condition: Some(condition),
                    });
                } else {
                    builder.branch(Some(condition))?;
                }
            }
            "else" => {
                self.pos += 1;
                self.expect(&Token::Colon)?;
                builder.branch(None)?;
            }
            "endif" | "endforeach" => {
                self.pos += 1;
                self.end_statement()?;
                builder.close(&keyword)?;
            }
            "foreach" => {
                self.pos += 1;
                self.expect(&Token::LParen)?;
                let source = self.expression()?;
                self.expect_keyword("as")?;
                let first = self.variable()?;
                let (key, value) = if self.eat(&Token::FatArrow) {
                    (Some(first), self.variable()?)
                } else {
                    (None, first)
                };
                self.expect(&Token::RParen)?;
                self.expect(&Token::Colon)?;
                builder.open(Frame::Foreach { source, key, value });
            }
            "break" | "continue" => {
                self.pos += 1;
                self.end_statement()?;
                if !builder.in_foreach() {
                    return Err(TemplateError::syntax(format!(
                        "'{}' outside of a foreach",
                        keyword
                    )));
                }
                builder.push(if keyword == "break" {
                    Node::Break
                } else {
                    Node::Continue
                });
            }
            "use" => {
                self.pos += 1;
                let path = self.identifier()?;
                let alias = if self.eat_keyword("as") {
                    self.identifier()?
                } else {
                    path.rsplit('\\').next().unwrap_or(&path).to_string()
                };
                self.end_statement()?;
                builder.push(Node::Use {
                    path: path.trim_start_matches('\\').to_string(),
                    alias,
                });
            }
            _ => {
                let expr = self.expression()?;
                self.end_statement()?;
                builder.push(Node::Expr(expr));
            }
        }
        Ok(())
    }

    fn end_statement(&mut self) -> Result<()> {
        if self.pos >= self.tokens.len() || self.eat(&Token::Semicolon) {
            return Ok(());
        }
        Err(self.unexpected("';'"))
    }

    fn parenthesized(&mut self) -> Result<Expr> {
        self.expect(&Token::LParen)?;
        let expr = self.expression()?;
        self.expect(&Token::RParen)?;
        Ok(expr)
    }

    fn variable(&mut self) -> Result<String> {
        match self.advance() {
            Some(Token::Variable(name)) => Ok(name),
            found => Err(mismatch("a variable", found.as_ref())),
        }
    }

    fn identifier(&mut self) -> Result<String> {
        match self.advance() {
            Some(Token::Ident(name)) => Ok(name),
            found => Err(mismatch("a name", found.as_ref())),
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", keyword)))
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        match self.peek() {
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case(keyword) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EXPRESSIONS
    // ═══════════════════════════════════════════════════════════════════════════

    fn expression(&mut self) -> Result<Expr> {
        self.expression_bp(0)
    }

    /// Pratt loop. Binding powers, loosest first: ternary, `??`, `||`, `&&`,
    /// `|`, equality, comparison, additive/concat, multiplicative.
    fn expression_bp(&mut self, min_bp: u8) -> Result<Expr> {
        let mut lhs = self.unary()?;

        loop {
            let Some(token) = self.peek() else { break };

            if *token == Token::Question {
                if min_bp > 1 {
                    break;
                }
                self.pos += 1;
                let then = if self.eat(&Token::Colon) {
                    None
                } else {
                    let then = self.expression_bp(0)?;
                    self.expect(&Token::Colon)?;
                    Some(Box::new(then))
                };
                let otherwise = self.expression_bp(1)?;
                lhs = Expr::Ternary(Box::new(lhs), then, Box::new(otherwise));
                continue;
            }

            if *token == Token::Coalesce {
                if min_bp > 2 {
                    break;
                }
                self.pos += 1;
                let rhs = self.expression_bp(2)?;
                lhs = Expr::Coalesce(Box::new(lhs), Box::new(rhs));
                continue;
            }

            let Some((op, bp)) = binary_operator(token) else {
                break;
            };
            if bp < min_bp {
                break;
            }
            self.pos += 1;
            let rhs = self.expression_bp(bp + 1)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }

        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.eat(&Token::Bang) {
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(self.unary()?)));
        }
        if self.eat(&Token::Minus) {
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.unary()?)));
        }
        if self.eat(&Token::Plus) {
            return self.unary();
        }
        let primary = self.primary()?;
        self.postfix(primary)
    }

    fn postfix(&mut self, mut expr: Expr) -> Result<Expr> {
        loop {
            if self.eat(&Token::LBracket) {
                let index = self.expression()?;
                self.expect(&Token::RBracket)?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.eat(&Token::Arrow) {
                let name = self.identifier()?;
                if self.eat(&Token::LParen) {
                    let args = self.arguments()?;
                    expr = Expr::Method(Box::new(expr), name.to_ascii_lowercase(), args);
                } else {
                    expr = Expr::Property(Box::new(expr), name);
                }
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::Variable(name)) => Ok(Expr::Variable(name)),
            Some(Token::Int(i)) => Ok(Expr::Literal(Value::from(i))),
            Some(Token::Float(f)) => Ok(Expr::Literal(super::value::float(f))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::LParen) => {
                let expr = self.expression()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Some(Token::LBracket) => self.array_literal(),
            Some(Token::Ident(name)) => {
                if self.eat(&Token::LParen) {
                    let args = self.arguments()?;
                    let name = name.trim_start_matches('\\').to_string();
                    return Ok(Expr::Call(name, args));
                }
                constant(&name).map(Expr::Literal).ok_or_else(|| {
                    TemplateError::syntax(format!("undefined constant '{}'", name))
                })
            }
            found => Err(mismatch("an expression", found.as_ref())),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        while !self.eat(&Token::RParen) {
            if !args.is_empty() {
                self.expect(&Token::Comma)?;
                if self.eat(&Token::RParen) {
                    break;
                }
            }
            args.push(self.expression()?);
        }
        Ok(args)
    }

    fn array_literal(&mut self) -> Result<Expr> {
        let mut items = Vec::new();
        while !self.eat(&Token::RBracket) {
            if !items.is_empty() {
                self.expect(&Token::Comma)?;
                if self.eat(&Token::RBracket) {
                    break;
                }
            }
            let first = self.expression()?;
            if self.eat(&Token::FatArrow) {
                items.push((Some(first), self.expression()?));
            } else {
                items.push((None, first));
            }
        }
        Ok(Expr::Array(items))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TOKEN CURSOR
    // ═══════════════════════════════════════════════════════════════════════════

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("{:?}", token)))
        }
    }

    fn unexpected(&self, wanted: &str) -> TemplateError {
        mismatch(wanted, self.peek())
    }
}

fn mismatch(wanted: &str, found: Option<&Token>) -> TemplateError {
    match found {
        Some(found) => TemplateError::syntax(format!("expected {}, found {:?}", wanted, found)),
        None => TemplateError::syntax(format!("expected {}, found end of code block", wanted)),
    }
}

fn binary_operator(token: &Token) -> Option<(BinaryOp, u8)> {
    Some(match token {
        Token::Or => (BinaryOp::Or, 3),
        Token::And => (BinaryOp::And, 4),
        Token::Ident(word) if word.eq_ignore_ascii_case("or") => (BinaryOp::Or, 3),
        Token::Ident(word) if word.eq_ignore_ascii_case("and") => (BinaryOp::And, 4),
        Token::Pipe => (BinaryOp::BitOr, 5),
        Token::Eq => (BinaryOp::Eq, 6),
        Token::NotEq => (BinaryOp::NotEq, 6),
        Token::Identical => (BinaryOp::Identical, 6),
        Token::NotIdentical => (BinaryOp::NotIdentical, 6),
        Token::Lt => (BinaryOp::Lt, 7),
        Token::Gt => (BinaryOp::Gt, 7),
        Token::Le => (BinaryOp::Le, 7),
        Token::Ge => (BinaryOp::Ge, 7),
        Token::Plus => (BinaryOp::Add, 8),
        Token::Minus => (BinaryOp::Sub, 8),
        Token::Dot => (BinaryOp::Concat, 8),
        Token::Star => (BinaryOp::Mul, 9),
        Token::Slash => (BinaryOp::Div, 9),
        Token::Percent => (BinaryOp::Rem, 9),
        _ => return None,
    })
}

fn constant(name: &str) -> Option<Value> {
    let value = match name.to_ascii_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        _ => {
            let flag = match name {
                "JSON_HEX_TAG" => JSON_HEX_TAG,
                "JSON_HEX_AMP" => JSON_HEX_AMP,
                "JSON_HEX_APOS" => JSON_HEX_APOS,
                "JSON_HEX_QUOT" => JSON_HEX_QUOT,
                "JSON_UNESCAPED_SLASHES" => JSON_UNESCAPED_SLASHES,
                "JSON_PRETTY_PRINT" => JSON_PRETTY_PRINT,
                "JSON_THROW_ON_ERROR" => JSON_THROW_ON_ERROR,
                "JSON_DEFAULT_DEPTH" => JSON_DEFAULT_DEPTH,
                _ => return None,
            };
            Value::from(flag)
        }
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn expr(code: &str) -> Expr {
        let nodes = parse_artifact(&format!("{{@ {}; @}}", code)).unwrap();
        match nodes.into_iter().next() {
            Some(Node::Expr(expr)) => expr,
            other => panic!("expected an expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            expr("1 + 2 * 3"),
            Expr::Binary(
                BinaryOp::Add,
                Box::new(Expr::Literal(json!(1))),
                Box::new(Expr::Binary(
                    BinaryOp::Mul,
                    Box::new(Expr::Literal(json!(2))),
                    Box::new(Expr::Literal(json!(3))),
                )),
            )
        );
    }

    #[test]
    fn test_coalesce_binds_looser_than_comparison() {
        assert!(matches!(expr("$a ?? $b == 1"), Expr::Coalesce(_, _)));
        assert!(matches!(expr("$a ? 1 : 2"), Expr::Ternary(_, Some(_), _)));
        assert!(matches!(expr("$a ?: 2"), Expr::Ternary(_, None, _)));
    }

    #[test]
    fn test_postfix_chain() {
        assert_eq!(
            expr("$user->tags[0]->upper()"),
            Expr::Method(
                Box::new(Expr::Index(
                    Box::new(Expr::Property(
                        Box::new(Expr::Variable("user".into())),
                        "tags".into()
                    )),
                    Box::new(Expr::Literal(json!(0))),
                )),
                "upper".into(),
                vec![],
            )
        );
    }

    #[test]
    fn test_blocks_span_code_blocks() {
        let nodes =
            parse_artifact("{@ foreach ($items as $k => $v): @}<li>{@ echo $v; @}</li>{@ endforeach; @}")
                .unwrap();
        match &nodes[..] {
            [Node::Foreach { key, value, body, .. }] => {
                assert_eq!(key.as_deref(), Some("k"));
                assert_eq!(value, "v");
                assert_eq!(body.len(), 3);
            }
            other => panic!("unexpected tree {:?}", other),
        }
    }

    #[test]
    fn test_if_branches() {
        let nodes = parse_artifact(
            "{@ if ($a): @}A{@ elseif ($b): @}B{@ else: @}C{@ endif; @}",
        )
        .unwrap();
        match &nodes[..] {
            [Node::If { branches, otherwise }] => {
                assert_eq!(branches.len(), 2);
                assert_eq!(otherwise.as_ref().map(Vec::len), Some(1));
            }
            other => panic!("unexpected tree {:?}", other),
        }
    }

    #[test]
    fn test_unbalanced_blocks() {
        assert!(matches!(
            parse_artifact("{@ if (1): @}x"),
            Err(TemplateError::UnbalancedBlock { .. })
        ));
        assert!(matches!(
            parse_artifact("{@ endforeach; @}"),
            Err(TemplateError::UnbalancedBlock { .. })
        ));
        assert!(matches!(
            parse_artifact("{@ foreach ($a as $b): @}{@ endif; @}"),
            Err(TemplateError::UnbalancedBlock { .. })
        ));
    }

    #[test]
    fn test_break_outside_foreach() {
        assert!(matches!(
            parse_artifact("{@ if (1): break; endif; @}"),
            Err(TemplateError::Syntax { .. })
        ));
    }

    #[test]
    fn test_use_alias_defaults_to_last_segment() {
        let nodes = parse_artifact(r"{@ use App\View\Helpers; use App\Str as S; @}").unwrap();
        assert_eq!(
            nodes,
            vec![
                Node::Use {
                    path: r"App\View\Helpers".into(),
                    alias: "Helpers".into()
                },
                Node::Use {
                    path: r"App\Str".into(),
                    alias: "S".into()
                },
            ]
        );
    }

    #[test]
    fn test_json_constants() {
        assert_eq!(expr("JSON_PRETTY_PRINT"), Expr::Literal(json!(128)));
        assert!(parse_artifact("{@ echo UNKNOWN_THING; @}").is_err());
    }
}
