//! Template inheritance: `extend`, `section`, `sections` and `yield`.
//!
//! A template that extends a layout contributes only its sections. The
//! layout's yields are replaced by those sections, by their own defaults, or
//! the compile fails. A yield that carries an inline default accepts no other
//! content: neither a block body nor a supplied section. The filled layout is
//! checked again for `extend`, so a layout may itself extend another layout.

use std::collections::{BTreeMap, BTreeSet};

use super::{component, include, literal_argument, CompileContext, Transformer};
use crate::error::{Result, TemplateError};
use crate::escape::escape_html;
use crate::scan::{parse_string_literal, scan_tags, split_arguments, Tag};

pub struct LayoutTransformer;

impl Transformer for LayoutTransformer {
    fn name(&self) -> &'static str {
        "extend"
    }

    fn transform(&self, template: &str, ctx: &mut CompileContext<'_>) -> Result<String> {
        let tags = scan_tags(template);
        let mut extends = tags.iter().filter(|t| t.name == "extend");
        let Some(extend) = extends.next() else {
            return Ok(template.to_string());
        };
        if extends.next().is_some() {
            return Err(TemplateError::syntax("a template can extend only one layout"));
        }

        let layout_name = literal_argument(extend)?;
        let sections = collect_sections(template, &tags, ctx)?;
        let path = ctx.resolve(&layout_name)?;
        let layout = ctx.load(&path)?;
        tracing::debug!(
            layout = %layout_name,
            sections = sections.len(),
            depth = ctx.depth() + 1,
            "extending layout"
        );

        ctx.enter(path, |ctx| {
            let layout = include::expand(&layout, ctx)?;
            // Components the layout itself uses sit one level below it;
            // the ones in the child's sections stay at the child's level.
            let layout = component::resolve_components(&layout, ctx)?;
            let filled = fill_yields(&layout, &sections, &layout_name, ctx)?;
            self.transform(&filled, ctx)
        })
    }
}

/// Section content keyed by name. Block sections keep their template text;
/// inline values arrive already escaped and protected.
pub(crate) type Sections = BTreeMap<String, String>;

fn collect_sections(
    template: &str,
    tags: &[Tag<'_>],
    ctx: &mut CompileContext<'_>,
) -> Result<Sections> {
    let mut sections = Sections::new();
    let mut i = 0;

    while i < tags.len() {
        let tag = &tags[i];
        match tag.name {
            "section" => {
                let args = call_arguments(tag)?;
                match args.as_slice() {
                    [name] => {
                        let name = quoted(name, "section")?;
                        let close = find_closer(tags, i, "section", "endsection")?;
                        let body = template[tag.end..tags[close].start].trim();
                        sections.insert(name, body.to_string());
                        i = close;
                    }
                    [name, value] => {
                        let name = quoted(name, "section")?;
                        let value = quoted(value, "section")?;
                        sections.insert(name, protect_escaped(ctx, value.trim()));
                    }
                    _ => {
                        return Err(TemplateError::syntax(
                            "section expects a name and an optional value",
                        ))
                    }
                }
            }
            "sections" => {
                let close = find_closer(tags, i, "sections", "endsections")?;
                for line in template[tag.end..tags[close].start].lines() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let (name, value) = line
                        .split_once(':')
                        .map(|(name, value)| (name.trim(), value.trim()))
                        .filter(|(name, _)| !name.is_empty())
                        .ok_or_else(|| {
                            TemplateError::syntax(format!(
                                "sections expects 'name : value' lines, got '{}'",
                                line.trim()
                            ))
                        })?;
                    sections.insert(name.to_string(), protect_escaped(ctx, value));
                }
                i = close;
            }
            "endsection" | "endsections" => {
                return Err(TemplateError::unbalanced(
                    tag.name,
                    format!("{{% {} %}} without an opening tag", tag.name),
                ));
            }
            _ => {}
        }
        i += 1;
    }

    Ok(sections)
}

/// Replace every yield in `layout` and check the supplied sections all landed.
pub(crate) fn fill_yields(
    layout: &str,
    sections: &Sections,
    template_name: &str,
    ctx: &mut CompileContext<'_>,
) -> Result<String> {
    let tags = scan_tags(layout);
    let mut output = String::with_capacity(layout.len());
    let mut yielded = BTreeSet::new();
    let mut last = 0;
    let mut i = 0;

    while i < tags.len() {
        let tag = &tags[i];
        match tag.name {
            "yield" => {
                let args = call_arguments(tag)?;
                let (name, default) = match args.as_slice() {
                    [name] => (quoted(name, "yield")?, None),
                    [name, default] => (quoted(name, "yield")?, Some(quoted(default, "yield")?)),
                    _ => {
                        return Err(TemplateError::syntax(
                            "yield expects a name and an optional default",
                        ))
                    }
                };

                // Block form when the next yield-related tag closes this one.
                let closer = tags[i + 1..]
                    .iter()
                    .position(|t| t.name == "yield" || t.name == "endyield")
                    .map(|offset| i + 1 + offset)
                    .filter(|&j| tags[j].name == "endyield");

                let end = closer.map_or(tag.end, |j| tags[j].end);
                let body = closer.map(|j| &layout[tag.end..tags[j].start]);

                let supplied = sections.contains_key(&name);
                if default.is_some() && (body.is_some() || supplied) {
                    return Err(TemplateError::YieldConflict { name });
                }

                let replacement = match (sections.get(&name), default, body) {
                    (Some(content), _, _) => content.clone(),
                    (None, Some(default), _) => protect_escaped(ctx, &default),
                    (None, None, Some(body)) => body.trim().to_string(),
                    (None, None, None) => {
                        return Err(TemplateError::SlotRequired {
                            slot: name,
                            template: template_name.to_string(),
                        })
                    }
                };

                output.push_str(&layout[last..tag.start]);
                output.push_str(&replacement);
                last = end;
                yielded.insert(name);
                i = closer.unwrap_or(i);
            }
            "endyield" => {
                return Err(TemplateError::unbalanced(
                    "yield",
                    "{% endyield %} without an opening yield",
                ));
            }
            _ => {}
        }
        i += 1;
    }
    output.push_str(&layout[last..]);

    if let Some(missing) = sections.keys().find(|name| !yielded.contains(*name)) {
        return Err(TemplateError::YieldMissing {
            section: missing.clone(),
            template: template_name.to_string(),
        });
    }

    Ok(output)
}

pub(crate) fn protect_escaped(ctx: &mut CompileContext<'_>, value: &str) -> String {
    ctx.protected.protect(escape_html(value))
}

fn call_arguments<'t>(tag: &Tag<'t>) -> Result<Vec<&'t str>> {
    match tag.args {
        Some(args) if tag.is_call() => Ok(split_arguments(args)),
        _ => Err(TemplateError::syntax(format!(
            "'{}' expects arguments in parentheses",
            tag.name
        ))),
    }
}

fn quoted(arg: &str, construct: &str) -> Result<String> {
    parse_string_literal(arg).ok_or_else(|| {
        TemplateError::syntax(format!("{} expects quoted arguments, got {}", construct, arg))
    })
}

fn find_closer(tags: &[Tag<'_>], open: usize, opener: &str, closer: &str) -> Result<usize> {
    for (j, tag) in tags.iter().enumerate().skip(open + 1) {
        if tag.name == closer {
            return Ok(j);
        }
        if tag.name == opener {
            break;
        }
    }
    Err(TemplateError::unbalanced(
        opener,
        format!("missing {{% {} %}}", closer),
    ))
}
