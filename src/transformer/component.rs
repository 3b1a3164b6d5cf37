//! Components: `{% component('name', param: 'value') %}body{% endcomponent %}`.
//!
//! Invocations are resolved innermost first. The component template's yields
//! receive the params (escaped, as literal text) and the body, which fills
//! the default slot `yield('content')`.

use super::layout::{fill_yields, protect_escaped, Sections};
use super::{include, CompileContext, Transformer};
use crate::error::{Result, TemplateError};
use crate::scan::{find_outside_quotes, parse_string_literal, scan_tags, split_arguments, Tag};

pub const DEFAULT_SLOT: &str = "content";

pub struct ComponentTransformer;

impl Transformer for ComponentTransformer {
    fn name(&self) -> &'static str {
        "component"
    }

    fn transform(&self, template: &str, ctx: &mut CompileContext<'_>) -> Result<String> {
        resolve_components(template, ctx)
    }
}

pub(crate) fn resolve_components(template: &str, ctx: &mut CompileContext<'_>) -> Result<String> {
    let mut template = template.to_string();

    loop {
        let tags = scan_tags(&template);
        let Some((open, close)) = innermost_pair(&tags)? else {
            return Ok(template);
        };

        let (name, params) = parse_invocation(&tags[open])?;
        let body = template[tags[open].end..tags[close].start].to_string();
        let (start, end) = (tags[open].start, tags[close].end);

        let rendered = render_component(&name, params, &body, ctx)?;
        template.replace_range(start..end, &rendered);
    }
}

/// The first `endcomponent` and the opener it closes, which is necessarily
/// the innermost invocation.
fn innermost_pair(tags: &[Tag<'_>]) -> Result<Option<(usize, usize)>> {
    let mut openers = Vec::new();

    for (i, tag) in tags.iter().enumerate() {
        match tag.name {
            "component" => openers.push(i),
            "endcomponent" => {
                let open = openers.pop().ok_or_else(|| {
                    TemplateError::unbalanced(
                        "component",
                        "{% endcomponent %} without an opening component",
                    )
                })?;
                return Ok(Some((open, i)));
            }
            _ => {}
        }
    }

    match openers.last() {
        Some(&open) => Err(TemplateError::unbalanced(
            "component",
            format!("missing {{% endcomponent %}} for {{% component{} %}}", tags[open].rest),
        )),
        None => Ok(None),
    }
}

fn parse_invocation(tag: &Tag<'_>) -> Result<(String, Vec<(String, String)>)> {
    let args = tag
        .args
        .filter(|_| tag.is_call())
        .map(split_arguments)
        .unwrap_or_default();
    let Some((first, rest)) = args.split_first() else {
        return Err(TemplateError::syntax("component expects a quoted name"));
    };

    let name = parse_string_literal(first).ok_or_else(|| {
        TemplateError::syntax(format!("component expects a quoted name, got {}", first))
    })?;
    let params = rest
        .iter()
        .map(|param| parse_param(param))
        .collect::<Result<Vec<_>>>()?;

    Ok((name, params))
}

/// `key: 'text'`, `key: 42` or `key: true`.
fn parse_param(param: &str) -> Result<(String, String)> {
    let colon = find_outside_quotes(param, 0, ":")
        .ok_or_else(|| TemplateError::syntax(format!("invalid component param: {}", param)))?;
    let key = param[..colon].trim();
    let raw = param[colon + 1..].trim();

    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(TemplateError::syntax(format!(
            "invalid component param name: {}",
            key
        )));
    }

    let value = if let Some(text) = parse_string_literal(raw) {
        text
    } else if raw == "true" || raw == "false" || raw.parse::<f64>().is_ok() {
        raw.to_string()
    } else {
        return Err(TemplateError::syntax(format!(
            "component param '{}' must be a string, number or boolean literal",
            key
        )));
    };

    Ok((key.to_string(), value))
}

fn render_component(
    name: &str,
    params: Vec<(String, String)>,
    body: &str,
    ctx: &mut CompileContext<'_>,
) -> Result<String> {
    let path = ctx.resolve_component(name)?;
    let source = ctx.load(&path)?;
    tracing::debug!(component = name, params = params.len(), "rendering component");

    let mut sections = Sections::new();
    for (key, value) in params {
        let protected = protect_escaped(ctx, &value);
        sections.insert(key, protected);
    }
    let body = body.trim();
    if !body.is_empty() {
        sections.insert(DEFAULT_SLOT.to_string(), body.to_string());
    }

    ctx.enter(path, |ctx| {
        let expanded = include::expand(&source, ctx)?;
        let expanded = resolve_components(&expanded, ctx)?;
        fill_yields(&expanded, &sections, name, ctx)
    })
}
