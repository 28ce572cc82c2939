//! Jinja2-style templates rendered through Handlebars.
//!
//! Supported: `{{ var }}`, `{{ a.b }}`, `{{ var | default(x) }}`,
//! `{% if %}`/`{% elif %}`/`{% else %}`/`{% endif %}` with `==`, `!=` and
//! `not`, and `{% for x in xs %}`/`{% endfor %}`.

use handlebars::{handlebars_helper, no_escape, Handlebars};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template rendering failed: {message}")]
    RenderingFailed { message: String },

    #[error("Unbalanced template blocks: {block_type}")]
    UnbalancedBlocks { block_type: String },

    #[error("Unsupported Jinja2 feature: {feature}")]
    Unsupported { feature: String },

    #[error("Invalid template syntax: {syntax}")]
    InvalidSyntax { syntax: String },
}

impl From<handlebars::RenderError> for TemplateError {
    fn from(error: handlebars::RenderError) -> Self {
        TemplateError::RenderingFailed {
            message: error.to_string(),
        }
    }
}

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{%-?\s*(.*?)\s*-?%\}").unwrap());
static DEFAULT_FILTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([\w.]+)\s*\|\s*default\(\s*(.*?)\s*\)\s*\}\}").unwrap()
});
static COMPARISON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([\w.]+)\s*(==|!=)\s*(.+)$").unwrap());
static FOR_LOOP: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\w+)\s+in\s+([\w.]+)$").unwrap());

const UNSUPPORTED: [&str; 7] = [
    "set", "include", "extends", "block", "macro", "raw", "filter",
];

handlebars_helper!(default_value: |value: Json, fallback: Json| {
    match value {
        Value::Null => fallback.clone(),
        Value::String(s) if s.is_empty() => fallback.clone(),
        other => other.clone(),
    }
});

#[derive(Debug)]
enum Block {
    If { depth: usize },
    For,
}

pub struct TemplateRenderer {
    handlebars: Handlebars<'static>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        handlebars.register_escape_fn(no_escape);
        handlebars.register_helper("default", Box::new(default_value));
        Self { handlebars }
    }

    pub fn render(&self, template: &str, variables: &Value) -> Result<String, TemplateError> {
        let converted = convert_to_handlebars(template)?;
        Ok(self.handlebars.render_template(&converted, variables)?)
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Rewrite Jinja2 syntax into an equivalent Handlebars template.
pub fn convert_to_handlebars(template: &str) -> Result<String, TemplateError> {
    let template = DEFAULT_FILTER
        .replace_all(template, |caps: &Captures| {
            format!("{{{{default {} {}}}}}", &caps[1], literal(&caps[2]))
        })
        .into_owned();

    let mut out = String::with_capacity(template.len());
    let mut stack: Vec<Block> = Vec::new();
    let mut last = 0;

    for caps in TAG.captures_iter(&template) {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        out.push_str(&template[last..whole.start]);
        last = whole.end;

        let body = caps[1].trim();
        let (keyword, rest) = body
            .split_once(char::is_whitespace)
            .map(|(k, r)| (k, r.trim()))
            .unwrap_or((body, ""));

        match keyword {
            "if" => {
                stack.push(Block::If { depth: 1 });
                out.push_str(&format!("{{{{#if {}}}}}", condition(rest)?));
            }
            "elif" => match stack.last_mut() {
                Some(Block::If { depth }) => {
                    *depth += 1;
                    out.push_str(&format!("{{{{else}}}}{{{{#if {}}}}}", condition(rest)?));
                }
                _ => {
                    return Err(TemplateError::UnbalancedBlocks {
                        block_type: "elif without if".to_string(),
                    })
                }
            },
            "else" => {
                if stack.is_empty() {
                    return Err(TemplateError::UnbalancedBlocks {
                        block_type: "else without if".to_string(),
                    });
                }
                out.push_str("{{else}}");
            }
            "endif" => match stack.pop() {
                Some(Block::If { depth }) => out.push_str(&"{{/if}}".repeat(depth)),
                _ => {
                    return Err(TemplateError::UnbalancedBlocks {
                        block_type: "unmatched endif".to_string(),
                    })
                }
            },
            "for" => {
                let caps = FOR_LOOP
                    .captures(rest)
                    .ok_or_else(|| TemplateError::InvalidSyntax {
                        syntax: body.to_string(),
                    })?;
                stack.push(Block::For);
                out.push_str(&format!("{{{{#each {} as |{}|}}}}", &caps[2], &caps[1]));
            }
            "endfor" => match stack.pop() {
                Some(Block::For) => out.push_str("{{/each}}"),
                _ => {
                    return Err(TemplateError::UnbalancedBlocks {
                        block_type: "unmatched endfor".to_string(),
                    })
                }
            },
            other if UNSUPPORTED.contains(&other) => {
                return Err(TemplateError::Unsupported {
                    feature: other.to_string(),
                })
            }
            _ => {
                return Err(TemplateError::InvalidSyntax {
                    syntax: body.to_string(),
                })
            }
        }
    }
    out.push_str(&template[last..]);

    if let Some(open) = stack.last() {
        let block_type = match open {
            Block::If { .. } => "if (missing endif)",
            Block::For => "for (missing endfor)",
        };
        return Err(TemplateError::UnbalancedBlocks {
            block_type: block_type.to_string(),
        });
    }

    Ok(out)
}

fn condition(expr: &str) -> Result<String, TemplateError> {
    if expr.is_empty() {
        return Err(TemplateError::InvalidSyntax {
            syntax: "empty condition".to_string(),
        });
    }
    if let Some(inner) = expr.strip_prefix("not ") {
        return Ok(format!("(not {})", condition(inner.trim())?));
    }
    if let Some(caps) = COMPARISON.captures(expr) {
        let helper = if &caps[2] == "==" { "eq" } else { "ne" };
        return Ok(format!("({helper} {} {})", &caps[1], literal(&caps[3])));
    }
    Ok(expr.to_string())
}

/// Single-quoted Jinja strings become double-quoted Handlebars literals.
fn literal(raw: &str) -> String {
    let raw = raw.trim();
    match raw.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')) {
        Some(inner) => format!("\"{inner}\""),
        None => raw.to_string(),
    }
}
