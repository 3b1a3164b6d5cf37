//! Built-in view-script functions and value methods.
//!
//! `isset`, `empty` and `directive` need the unevaluated arguments or the
//! registry and live in the interpreter; everything here works on already
//! evaluated values.

use std::io;

use serde::Serialize;
use serde_json::ser::{CharEscape, CompactFormatter, Formatter, PrettyFormatter};
use serde_json::Value;

use super::value::{float, is_truthy, loose_eq, to_int, to_number, to_output, type_name, Num};
use crate::error::{Result, TemplateError};
use crate::escape::escape_html;
use crate::transformer::json::{
    JSON_DEFAULT_DEPTH, JSON_HEX_AMP, JSON_HEX_APOS, JSON_HEX_QUOT, JSON_HEX_TAG,
    JSON_PRETTY_PRINT, JSON_UNESCAPED_SLASHES,
};

/// Names answered by [`call_function`].
pub const FUNCTIONS: &[&str] = &[
    "escape",
    "json_encode",
    "count",
    "upper",
    "lower",
    "trim",
    "join",
    "implode",
    "range",
    "round",
    "strlen",
];

pub fn is_function(name: &str) -> bool {
    FUNCTIONS.contains(&name)
}

pub fn call_function(name: &str, args: &[Value]) -> Result<Value> {
    match name {
        "escape" => Ok(Value::String(escape_html(&to_output(arg(name, args, 0)?)?))),
        "json_encode" => {
            let flags = args.get(1).map(to_int).transpose()?.unwrap_or(0);
            let depth = args
                .get(2)
                .map(to_int)
                .transpose()?
                .unwrap_or(JSON_DEFAULT_DEPTH);
            json_encode(arg(name, args, 0)?, flags, depth).map(Value::String)
        }
        "count" => count(arg(name, args, 0)?).map(Value::from),
        "upper" => text(name, args, |s| s.to_uppercase()),
        "lower" => text(name, args, |s| s.to_lowercase()),
        "trim" => text(name, args, |s| s.trim().to_string()),
        "join" | "implode" => {
            let first = arg(name, args, 0)?;
            let (separator, items) = match (first, args.get(1)) {
                (Value::Array(_), Some(separator)) => (to_output(separator)?, first),
                (separator, Some(items)) if items.is_array() => (to_output(separator)?, items),
                (Value::Array(_), None) => (String::new(), first),
                (other, _) => {
                    return Err(TemplateError::render(format!(
                        "{}() expects an array, got {}",
                        name,
                        type_name(other)
                    )))
                }
            };
            join(items, &separator).map(Value::String)
        }
        "range" => range(
            to_int(arg(name, args, 0)?)?,
            to_int(arg(name, args, 1)?)?,
            args.get(2).map(to_int).transpose()?.unwrap_or(1),
        ),
        "round" => {
            let precision = args.get(1).map(to_int).transpose()?.unwrap_or(0);
            let factor = 10f64.powi(precision.clamp(-15, 15) as i32);
            let x = to_number(arg(name, args, 0)?)?.as_f64();
            Ok(float((x * factor).round() / factor))
        }
        "strlen" => Ok(Value::from(to_output(arg(name, args, 0)?)?.len())),
        _ => Err(TemplateError::render(format!("unknown function {}()", name))),
    }
}

pub fn call_method(target: &Value, method: &str, args: &[Value]) -> Result<Value> {
    match (method, target) {
        ("count" | "length", Value::String(s)) => Ok(Value::from(s.chars().count())),
        ("count" | "length", other) => count(other).map(Value::from),
        ("upper", _) => Ok(Value::String(to_output(target)?.to_uppercase())),
        ("lower", _) => Ok(Value::String(to_output(target)?.to_lowercase())),
        ("trim", _) => Ok(Value::String(to_output(target)?.trim().to_string())),
        ("keys", Value::Object(map)) => Ok(map.keys().cloned().map(Value::String).collect()),
        ("keys", Value::Array(items)) => Ok((0..items.len()).map(Value::from).collect()),
        ("values", Value::Object(map)) => Ok(map.values().cloned().collect()),
        ("values", Value::Array(items)) => Ok(Value::Array(items.clone())),
        ("first", Value::Array(items)) => Ok(items.first().cloned().unwrap_or(Value::Null)),
        ("first", Value::Object(map)) => Ok(map.values().next().cloned().unwrap_or(Value::Null)),
        ("last", Value::Array(items)) => Ok(items.last().cloned().unwrap_or(Value::Null)),
        ("last", Value::Object(map)) => {
            Ok(map.values().next_back().cloned().unwrap_or(Value::Null))
        }
        ("join", Value::Array(_)) => {
            let separator = args.first().map(to_output).transpose()?.unwrap_or_default();
            join(target, &separator).map(Value::String)
        }
        ("contains", _) => {
            let needle = args.first().ok_or_else(|| {
                TemplateError::render("contains() expects an argument")
            })?;
            let found = match target {
                Value::Array(items) => items.iter().any(|item| loose_eq(item, needle)),
                Value::Object(map) => map.contains_key(&to_output(needle)?),
                Value::String(s) => s.contains(to_output(needle)?.as_str()),
                _ => false,
            };
            Ok(Value::Bool(found))
        }
        _ => Err(TemplateError::render(format!(
            "{} has no method {}()",
            type_name(target),
            method
        ))),
    }
}

fn arg<'a>(function: &str, args: &'a [Value], index: usize) -> Result<&'a Value> {
    args.get(index).ok_or_else(|| {
        TemplateError::render(format!(
            "{}() expects at least {} argument(s)",
            function,
            index + 1
        ))
    })
}

fn text(function: &str, args: &[Value], f: impl Fn(&str) -> String) -> Result<Value> {
    Ok(Value::String(f(&to_output(arg(function, args, 0)?)?)))
}

fn count(value: &Value) -> Result<usize> {
    match value {
        Value::Null => Ok(0),
        Value::Array(items) => Ok(items.len()),
        Value::Object(map) => Ok(map.len()),
        other => Err(TemplateError::render(format!(
            "count() expects an array, got {}",
            type_name(other)
        ))),
    }
}

fn join(items: &Value, separator: &str) -> Result<String> {
    let parts = match items {
        Value::Array(items) => items.iter().map(to_output).collect::<Result<Vec<_>>>()?,
        Value::Object(map) => map.values().map(to_output).collect::<Result<Vec<_>>>()?,
        _ => Vec::new(),
    };
    Ok(parts.join(separator))
}

fn range(start: i64, end: i64, step: i64) -> Result<Value> {
    if step == 0 {
        return Err(TemplateError::render("range() step cannot be zero"));
    }
    let step = step.unsigned_abs();
    let len = (start.abs_diff(end) / step).checked_add(1);
    if len.map_or(true, |len| len > 1_000_000) {
        return Err(TemplateError::render("range() would produce too many elements"));
    }

    let values: Vec<Value> = if start <= end {
        (start..=end).step_by(step as usize).map(Value::from).collect()
    } else {
        (end..=start)
            .rev()
            .step_by(step as usize)
            .map(Value::from)
            .collect()
    };
    Ok(Value::Array(values))
}

// ═══════════════════════════════════════════════════════════════════════════════
// JSON
// ═══════════════════════════════════════════════════════════════════════════════

/// Encode `value` honouring the `JSON_*` flag bits.
///
/// `JSON_HEX_*` replace the matching characters with `\u00XX` escapes,
/// `/` is written as `\/` unless `JSON_UNESCAPED_SLASHES` is set and
/// `JSON_PRETTY_PRINT` indents with four spaces. Non-ASCII text is written
/// as-is. Nesting deeper than `depth` is an error.
pub fn json_encode(value: &Value, flags: i64, depth: i64) -> Result<String> {
    if depth <= 0 {
        return Err(TemplateError::render("json_encode() depth must be greater than zero"));
    }
    if nesting(value) > depth as usize {
        return Err(TemplateError::render(format!(
            "json_encode(): maximum depth of {} exceeded",
            depth
        )));
    }

    if flags & JSON_PRETTY_PRINT != 0 {
        write_json(value, FlagFormatter::new(PrettyFormatter::with_indent(b"    "), flags))
    } else {
        write_json(value, FlagFormatter::new(CompactFormatter, flags))
    }
}

/// Number of nested arrays/objects down the deepest path.
fn nesting(value: &Value) -> usize {
    match value {
        Value::Array(items) => 1 + items.iter().map(nesting).max().unwrap_or(0),
        Value::Object(map) => 1 + map.values().map(nesting).max().unwrap_or(0),
        _ => 0,
    }
}

fn write_json<F: Formatter>(value: &Value, formatter: F) -> Result<String> {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    String::from_utf8(out).map_err(|e| TemplateError::render(e.to_string()))
}

/// Layout from `inner`; string contents escaped according to the flags.
struct FlagFormatter<F> {
    inner: F,
    flags: i64,
}

impl<F> FlagFormatter<F> {
    fn new(inner: F, flags: i64) -> Self {
        Self { inner, flags }
    }

    fn escape(&self, c: char) -> Option<&'static str> {
        let on = |flag: i64| self.flags & flag != 0;
        match c {
            '<' if on(JSON_HEX_TAG) => Some("\\u003C"),
            '>' if on(JSON_HEX_TAG) => Some("\\u003E"),
            '&' if on(JSON_HEX_AMP) => Some("\\u0026"),
            '\'' if on(JSON_HEX_APOS) => Some("\\u0027"),
            '/' if !on(JSON_UNESCAPED_SLASHES) => Some("\\/"),
            _ => None,
        }
    }
}

impl<F: Formatter> Formatter for FlagFormatter<F> {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut last = 0;
        for (i, c) in fragment.char_indices() {
            if let Some(escaped) = self.escape(c) {
                writer.write_all(fragment[last..i].as_bytes())?;
                writer.write_all(escaped.as_bytes())?;
                last = i + c.len_utf8();
            }
        }
        writer.write_all(fragment[last..].as_bytes())
    }

    fn write_char_escape<W>(&mut self, writer: &mut W, char_escape: CharEscape) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if matches!(char_escape, CharEscape::Quote) && self.flags & JSON_HEX_QUOT != 0 {
            return writer.write_all(b"\\u0022");
        }
        self.inner.write_char_escape(writer, char_escape)
    }

    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_array(writer)
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_array(writer)
    }

    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.inner.begin_array_value(writer, first)
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_array_value(writer)
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_object(writer)
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_object(writer)
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.inner.begin_object_key(writer, first)
    }

    fn end_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_object_key(writer)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_object_value(writer)
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_object_value(writer)
    }
}

/// Whether a value counts as set for `isset`: defined and not null.
pub fn is_set(value: Option<&Value>) -> bool {
    value.is_some_and(|v| !v.is_null())
}

/// `empty`: undefined or falsy.
pub fn is_empty(value: Option<&Value>) -> bool {
    !value.is_some_and(is_truthy)
}

/// Numeric `|` used to combine JSON flags.
pub fn bit_or(left: &Value, right: &Value) -> Result<Value> {
    match (to_number(left)?, to_number(right)?) {
        (Num::Int(a), Num::Int(b)) => Ok(Value::from(a | b)),
        (a, b) => Ok(Value::from(a.as_f64() as i64 | b.as_f64() as i64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformer::json::JSON_SAFE_FLAGS;
    use serde_json::json;

    #[test]
    fn test_json_safe_flags() {
        let encoded = json_encode(&json!({"html": "<a href='x'>&\"</a>"}), JSON_SAFE_FLAGS, 512).unwrap();
        assert_eq!(
            encoded,
            r#"{"html":"\u003Ca href=\u0027x\u0027\u003E\u0026\u0022\u003C\/a\u003E"}"#
        );
        let plain = json_encode(&json!("a/b"), JSON_UNESCAPED_SLASHES, 512).unwrap();
        assert_eq!(plain, r#""a/b""#);
    }

    #[test]
    fn test_json_pretty_print() {
        let encoded = json_encode(&json!({"a": [1, 2], "b": {}}), JSON_PRETTY_PRINT, 512).unwrap();
        assert_eq!(encoded, "{\n    \"a\": [\n        1,\n        2\n    ],\n    \"b\": {}\n}");
    }

    #[test]
    fn test_json_depth() {
        let value = json!([[1]]);
        assert!(json_encode(&value, 0, 2).is_ok());
        assert!(json_encode(&value, 0, 1).is_err());
    }

    #[test]
    fn test_text_functions() {
        assert_eq!(call_function("upper", &[json!("abc")]).unwrap(), json!("ABC"));
        assert_eq!(
            call_function("escape", &[json!("<b>")]).unwrap(),
            json!("&lt;b&gt;")
        );
        assert_eq!(
            call_function("implode", &[json!(", "), json!(["a", "b"])]).unwrap(),
            json!("a, b")
        );
    }

    #[test]
    fn test_numeric_functions() {
        assert_eq!(call_function("range", &[json!(1), json!(3)]).unwrap(), json!([1, 2, 3]));
        assert_eq!(call_function("range", &[json!(3), json!(1)]).unwrap(), json!([3, 2, 1]));
        assert_eq!(call_function("round", &[json!(2.456), json!(1)]).unwrap(), json!(2.5));
    }

    #[test]
    fn test_range_over_full_integer_span() {
        let err = call_function("range", &[json!(i64::MIN), json!(i64::MAX), json!(1)]).unwrap_err();
        assert!(err.to_string().contains("too many elements"));
        assert!(!is_function("number_format"));
    }

    #[test]
    fn test_json_unicode_and_controls() {
        assert_eq!(
            json_encode(&json!("é\n\u{1}\"\\"), 0, 512).unwrap(),
            r#""é\n\u0001\"\\""#
        );
        assert_eq!(json_encode(&json!([1.5, null, true]), 0, 512).unwrap(), "[1.5,null,true]");
    }

    #[test]
    fn test_methods() {
        let items = json!(["x", "y"]);
        assert_eq!(call_method(&items, "count", &[]).unwrap(), json!(2));
        assert_eq!(call_method(&items, "last", &[]).unwrap(), json!("y"));
        assert_eq!(call_method(&items, "join", &[json!("-")]).unwrap(), json!("x-y"));
        assert_eq!(call_method(&items, "contains", &[json!("y")]).unwrap(), json!(true));
        assert_eq!(call_method(&json!("héllo"), "length", &[]).unwrap(), json!(5));
        assert!(call_method(&json!(1), "keys", &[]).is_err());
    }
}
