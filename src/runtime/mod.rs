//! Rendering Runtime
//!
//! Executes a compiled artifact against a data context. Every top-level key
//! of the context becomes a variable, and the whole context stays reachable
//! as `$__`. Variables assigned by the template (`set`, `foreach`) live in a
//! scope owned by one render call, so nothing leaks between renders.
//!
//! Output goes through an [`OutputBuffer`]: a render that fails part way
//! returns the error and none of the text produced before it.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::{Result, TemplateError};
use crate::registry::DirectiveRegistry;

mod buffer;
mod builtins;
mod lexer;
mod parser;
mod value;

pub use buffer::OutputBuffer;
pub use builtins::json_encode;
pub use parser::{parse_artifact, BinaryOp, Expr, Node, UnaryOp};

use builtins::{bit_or, call_function, call_method, is_empty, is_function, is_set};
use value::{arithmetic, compare, is_truthy, loose_eq, negate, strict_eq, to_output, type_name, Arith};

/// Name of the variable holding the untouched data context.
pub const DATA_VARIABLE: &str = "__";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Normal,
    Break,
    Continue,
}

struct Scope {
    variables: HashMap<String, Value>,
    imports: HashMap<String, String>,
}

impl Scope {
    fn new(data: Map<String, Value>) -> Self {
        let mut variables: HashMap<String, Value> = data
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        variables.insert(DATA_VARIABLE.to_string(), Value::Object(data));
        Self {
            variables,
            imports: HashMap::new(),
        }
    }
}

pub struct Runtime<'r> {
    directives: &'r DirectiveRegistry,
}

impl<'r> Runtime<'r> {
    pub fn new(directives: &'r DirectiveRegistry) -> Self {
        Self { directives }
    }

    pub fn parse(&self, artifact: &str) -> Result<Vec<Node>> {
        parse_artifact(artifact)
    }

    pub fn render(&self, artifact: &str, data: Map<String, Value>) -> Result<String> {
        let nodes = parse_artifact(artifact)?;
        self.execute(&nodes, data)
    }

    pub fn execute(&self, nodes: &[Node], data: Map<String, Value>) -> Result<String> {
        let mut scope = Scope::new(data);
        let mut out = OutputBuffer::new();
        self.run(nodes, &mut scope, &mut out)?;
        Ok(out.finish())
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // STATEMENTS
    // ═══════════════════════════════════════════════════════════════════════════════

    fn run(&self, nodes: &[Node], scope: &mut Scope, out: &mut OutputBuffer) -> Result<Flow> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Echo(expr) => {
                    let value = self.eval(expr, scope)?;
                    out.push_str(&to_output(&value)?);
                }
                Node::If {
                    branches,
                    otherwise,
                } => {
                    let mut taken = otherwise.as_deref();
                    for (condition, body) in branches {
                        if is_truthy(&self.eval(condition, scope)?) {
                            taken = Some(body.as_slice());
                            break;
                        }
                    }
                    if let Some(body) = taken {
                        let flow = self.run(body, scope, out)?;
                        if flow != Flow::Normal {
                            return Ok(flow);
                        }
                    }
                }
                Node::Foreach {
                    source,
                    key,
                    value,
                    body,
                } => self.foreach(source, key.as_deref(), value, body, scope, out)?,
                Node::Break => return Ok(Flow::Break),
                Node::Continue => return Ok(Flow::Continue),
                Node::Assign(name, expr) => {
                    let value = self.eval(expr, scope)?;
                    scope.variables.insert(name.clone(), value);
                }
                Node::Use { path, alias } => {
                    scope.imports.insert(alias.clone(), path.clone());
                }
                Node::Expr(expr) => {
                    self.eval(expr, scope)?;
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn foreach(
        &self,
        source: &Expr,
        key: Option<&str>,
        value: &str,
        body: &[Node],
        scope: &mut Scope,
        out: &mut OutputBuffer,
    ) -> Result<()> {
        let entries: Vec<(Value, Value)> = match self.eval(source, scope)? {
            Value::Null => Vec::new(),
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (Value::from(i), item))
                .collect(),
            Value::Object(map) => map
                .into_iter()
                .map(|(k, item)| (Value::String(k), item))
                .collect(),
            other => {
                return Err(TemplateError::render(format!(
                    "foreach expects an array, got {}",
                    type_name(&other)
                )))
            }
        };

        for (k, item) in entries {
            if let Some(key) = key {
                scope.variables.insert(key.to_string(), k);
            }
            scope.variables.insert(value.to_string(), item);
            if self.run(body, scope, out)? == Flow::Break {
                break;
            }
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // EXPRESSIONS
    // ═══════════════════════════════════════════════════════════════════════════════

    fn eval(&self, expr: &Expr, scope: &Scope) -> Result<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Variable(_) | Expr::Index(..) | Expr::Property(..) => {
                // Strict lookups report the failure themselves.
                Ok(self.lookup(expr, scope, true)?.unwrap_or(Value::Null))
            }
            Expr::Array(items) => self.array(items, scope),
            Expr::Method(target, method, args) => {
                let target = self.eval(target, scope)?;
                let args = self.eval_all(args, scope)?;
                call_method(&target, method, &args)
            }
            Expr::Call(name, args) => self.call(name, args, scope),
            Expr::Unary(UnaryOp::Not, operand) => {
                Ok(Value::Bool(!is_truthy(&self.eval(operand, scope)?)))
            }
            Expr::Unary(UnaryOp::Neg, operand) => negate(&self.eval(operand, scope)?),
            Expr::Binary(op, left, right) => self.binary(*op, left, right, scope),
            Expr::Coalesce(left, right) => match self.lookup(left, scope, false)? {
                Some(value) if !value.is_null() => Ok(value),
                _ => self.eval(right, scope),
            },
            Expr::Ternary(condition, then, otherwise) => {
                let condition = self.eval(condition, scope)?;
                if !is_truthy(&condition) {
                    return self.eval(otherwise, scope);
                }
                match then {
                    Some(then) => self.eval(then, scope),
                    None => Ok(condition),
                }
            }
        }
    }

    fn eval_all(&self, exprs: &[Expr], scope: &Scope) -> Result<Vec<Value>> {
        exprs.iter().map(|e| self.eval(e, scope)).collect()
    }

    /// Resolve a variable, index or property chain. A missing link is an
    /// error when `strict`, and `None` otherwise.
    fn lookup(&self, expr: &Expr, scope: &Scope, strict: bool) -> Result<Option<Value>> {
        let found = match expr {
            Expr::Variable(name) => match scope.variables.get(name) {
                Some(value) => Some(value.clone()),
                None if strict => {
                    return Err(TemplateError::render(format!("undefined variable ${}", name)))
                }
                None => None,
            },
            Expr::Index(base, index) => {
                let Some(base) = self.lookup(base, scope, strict)? else {
                    return Ok(None);
                };
                let index = self.eval(index, scope)?;
                match index_value(&base, &index) {
                    Some(value) => Some(value),
                    None if strict => {
                        return Err(TemplateError::render(format!(
                            "undefined index [{}] on {}",
                            to_output(&index)?,
                            type_name(&base)
                        )))
                    }
                    None => None,
                }
            }
            Expr::Property(base, name) => {
                let Some(base) = self.lookup(base, scope, strict)? else {
                    return Ok(None);
                };
                match base.as_object().and_then(|map| map.get(name)) {
                    Some(value) => Some(value.clone()),
                    None if strict => {
                        return Err(TemplateError::render(format!(
                            "undefined property ->{} on {}",
                            name,
                            type_name(&base)
                        )))
                    }
                    None => None,
                }
            }
            other => Some(self.eval(other, scope)?),
        };
        Ok(found)
    }

    fn array(&self, items: &[(Option<Expr>, Expr)], scope: &Scope) -> Result<Value> {
        if items.iter().all(|(key, _)| key.is_none()) {
            let values = items
                .iter()
                .map(|(_, value)| self.eval(value, scope))
                .collect::<Result<Vec<_>>>()?;
            return Ok(Value::Array(values));
        }

        let mut map = Map::new();
        let mut next_index: i64 = 0;
        for (key, value) in items {
            let key = match key {
                Some(key) => to_output(&self.eval(key, scope)?)?,
                None => next_index.to_string(),
            };
            if let Ok(i) = key.parse::<i64>() {
                next_index = next_index.max(i.saturating_add(1));
            }
            map.insert(key, self.eval(value, scope)?);
        }
        Ok(Value::Object(map))
    }

    fn binary(&self, op: BinaryOp, left: &Expr, right: &Expr, scope: &Scope) -> Result<Value> {
        let lhs = self.eval(left, scope)?;
        match op {
            BinaryOp::And if !is_truthy(&lhs) => return Ok(Value::Bool(false)),
            BinaryOp::Or if is_truthy(&lhs) => return Ok(Value::Bool(true)),
            _ => {}
        }
        let rhs = self.eval(right, scope)?;

        let value = match op {
            BinaryOp::And | BinaryOp::Or => Value::Bool(is_truthy(&rhs)),
            BinaryOp::Add => arithmetic(Arith::Add, &lhs, &rhs)?,
            BinaryOp::Sub => arithmetic(Arith::Sub, &lhs, &rhs)?,
            BinaryOp::Mul => arithmetic(Arith::Mul, &lhs, &rhs)?,
            BinaryOp::Div => arithmetic(Arith::Div, &lhs, &rhs)?,
            BinaryOp::Rem => arithmetic(Arith::Rem, &lhs, &rhs)?,
            BinaryOp::Concat => {
                let mut text = to_output(&lhs)?;
                text.push_str(&to_output(&rhs)?);
                Value::String(text)
            }
            BinaryOp::Eq => Value::Bool(loose_eq(&lhs, &rhs)),
            BinaryOp::NotEq => Value::Bool(!loose_eq(&lhs, &rhs)),
            BinaryOp::Identical => Value::Bool(strict_eq(&lhs, &rhs)),
            BinaryOp::NotIdentical => Value::Bool(!strict_eq(&lhs, &rhs)),
            BinaryOp::Lt => Value::Bool(compare(&lhs, &rhs)?.is_lt()),
            BinaryOp::Gt => Value::Bool(compare(&lhs, &rhs)?.is_gt()),
            BinaryOp::Le => Value::Bool(compare(&lhs, &rhs)?.is_le()),
            BinaryOp::Ge => Value::Bool(compare(&lhs, &rhs)?.is_ge()),
            BinaryOp::BitOr => bit_or(&lhs, &rhs)?,
        };
        Ok(value)
    }

    fn call(&self, name: &str, args: &[Expr], scope: &Scope) -> Result<Value> {
        match name {
            "isset" => {
                for arg in args {
                    if !is_set(self.lookup(arg, scope, false)?.as_ref()) {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(!args.is_empty()))
            }
            "empty" => {
                let arg = args
                    .first()
                    .ok_or_else(|| TemplateError::render("empty() expects an argument"))?;
                Ok(Value::Bool(is_empty(self.lookup(arg, scope, false)?.as_ref())))
            }
            "directive" => {
                let values = self.eval_all(args, scope)?;
                let Some((directive, rest)) = values.split_first() else {
                    return Err(TemplateError::render("directive() expects a name"));
                };
                self.directives.call(&to_output(directive)?, rest)
            }
            _ if is_function(name) => call_function(name, &self.eval_all(args, scope)?),
            _ => {
                let values = self.eval_all(args, scope)?;
                let target = match scope.imports.get(name) {
                    Some(path) => self.imported_directive(path),
                    None => name,
                };
                tracing::trace!(function = name, directive = target, "calling registered function");
                self.directives.call(target, &values)
            }
        }
    }

    /// An imported name calls the directive registered under its full path,
    /// or failing that under its last segment.
    fn imported_directive<'p>(&self, path: &'p str) -> &'p str {
        if self.directives.has(path) {
            return path;
        }
        path.rsplit('\\').next().unwrap_or(path)
    }
}

fn index_value(base: &Value, index: &Value) -> Option<Value> {
    match base {
        Value::Array(items) => {
            let i = match index {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.parse::<u64>().ok(),
                _ => None,
            }?;
            items.get(usize::try_from(i).ok()?).cloned()
        }
        Value::Object(map) => map.get(&to_output(index).ok()?).cloned(),
        Value::String(s) => {
            let i = index.as_u64()?;
            s.chars()
                .nth(usize::try_from(i).ok()?)
                .map(|c| Value::String(c.to_string()))
        }
        _ => None,
    }
}
