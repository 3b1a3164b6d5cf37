//! `if` / `elseif` / `else` / `foreach` / `break` / `continue`.
//!
//! Tags are paired with a stack while walking the tag list once, so every
//! closer is matched against the opener it actually belongs to at any depth.

use super::{code_block, CompileContext, Transformer};
use crate::error::{Result, TemplateError};
use crate::scan::{scan_tags, strip_outer_parens, Tag};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    If { has_else: bool },
    Foreach,
}

impl Block {
    fn closer(&self) -> &'static str {
        match self {
            Block::If { .. } => "endif",
            Block::Foreach => "endforeach",
        }
    }
}

pub struct ControlFlowTransformer;

impl Transformer for ControlFlowTransformer {
    fn name(&self) -> &'static str {
        "control-flow"
    }

    fn transform(&self, template: &str, _ctx: &mut CompileContext<'_>) -> Result<String> {
        let mut output = String::with_capacity(template.len());
        let mut stack: Vec<(Block, String)> = Vec::new();
        let mut last = 0;

        for tag in scan_tags(template) {
            let statement = match tag.name {
                "if" => {
                    let condition = condition(&tag)?;
                    stack.push((Block::If { has_else: false }, opener_text(&tag)));
                    format!("if ({}):", condition)
                }
                "elseif" => {
                    let condition = condition(&tag)?;
                    match stack.last() {
                        Some((Block::If { has_else: false }, _)) => {}
                        Some((Block::If { has_else: true }, _)) => {
                            return Err(TemplateError::syntax("{% elseif %} after {% else %}"))
                        }
                        top => return Err(orphan("elseif", top)),
                    }
                    format!("elseif ({}):", condition)
                }
                "else" => {
                    match stack.last() {
                        Some((Block::If { has_else: false }, _)) => {}
                        Some((Block::If { has_else: true }, _)) => {
                            return Err(TemplateError::syntax("duplicate {% else %} in one if block"))
                        }
                        top => return Err(orphan("else", top)),
                    }
                    if let Some((Block::If { has_else }, _)) = stack.last_mut() {
                        *has_else = true;
                    }
                    "else:".to_string()
                }
                "endif" | "endforeach" => {
                    match stack.pop() {
                        Some((block, _)) if block.closer() == tag.name => {}
                        Some((block, opened)) => {
                            return Err(TemplateError::unbalanced(
                                tag.name,
                                format!(
                                    "expected {{% {} %}} to close {}, found {{% {} %}}",
                                    block.closer(),
                                    opened,
                                    tag.name
                                ),
                            ))
                        }
                        None => {
                            return Err(TemplateError::unbalanced(
                                tag.name,
                                format!("{{% {} %}} without an opening tag", tag.name),
                            ))
                        }
                    }
                    format!("{};", tag.name)
                }
                "foreach" => {
                    let expression = strip_outer_parens(tag.rest);
                    if !expression.contains(" as ") {
                        return Err(TemplateError::syntax(format!(
                            "foreach expects 'expr as $value', got {}",
                            tag.rest
                        )));
                    }
                    stack.push((Block::Foreach, opener_text(&tag)));
                    format!("foreach ({}):", expression)
                }
                "break" | "continue" => {
                    if !stack.iter().any(|(block, _)| *block == Block::Foreach) {
                        return Err(TemplateError::syntax(format!(
                            "{{% {} %}} outside of a foreach",
                            tag.name
                        )));
                    }
                    format!("{};", tag.name)
                }
                _ => continue,
            };

            output.push_str(&template[last..tag.start]);
            output.push_str(&code_block(&statement));
            last = tag.end;
        }

        if let Some((block, opened)) = stack.pop() {
            return Err(TemplateError::unbalanced(
                match block {
                    Block::If { .. } => "if",
                    Block::Foreach => "foreach",
                },
                format!("missing {{% {} %}} for {}", block.closer(), opened),
            ));
        }

        output.push_str(&template[last..]);
        Ok(output)
    }
}

fn condition(tag: &Tag<'_>) -> Result<String> {
    let condition = strip_outer_parens(tag.rest);
    if condition.is_empty() {
        return Err(TemplateError::syntax(format!(
            "{{% {} %}} requires a condition",
            tag.name
        )));
    }
    Ok(condition.to_string())
}

fn opener_text(tag: &Tag<'_>) -> String {
    format!("{{% {} {} %}}", tag.name, tag.rest)
}

fn orphan(name: &str, top: Option<&(Block, String)>) -> TemplateError {
    let detail = match top {
        Some((_, opened)) => format!("{{% {} %}} inside {}", name, opened),
        None => format!("{{% {} %}} outside of an if block", name),
    };
    TemplateError::unbalanced(name, detail)
}
