//! Host pattern parsing with Ansible's term semantics.

use regex::Regex;

use crate::error::InventoryError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternOp {
    Union,
    Intersect,
    Exclude,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternTerm {
    pub op: PatternOp,
    pub selector: String,
}

/// How a single selector is compared against host and group names.
#[derive(Debug, Clone)]
pub enum Selector {
    All,
    Exact(String),
    Regex(Regex),
}

impl PatternTerm {
    pub fn selector(&self) -> Result<Selector, InventoryError> {
        let raw = self.selector.as_str();
        if raw == "all" || raw == "*" {
            return Ok(Selector::All);
        }

        if let Some(expr) = raw.strip_prefix('~') {
            let regex = Regex::new(expr).map_err(|e| InventoryError::InvalidPattern {
                pattern: raw.to_string(),
                reason: e.to_string(),
            })?;
            return Ok(Selector::Regex(regex));
        }

        if raw.contains(['*', '?']) {
            let regex = Regex::new(&glob_to_regex(raw)).map_err(|e| {
                InventoryError::InvalidPattern {
                    pattern: raw.to_string(),
                    reason: e.to_string(),
                }
            })?;
            return Ok(Selector::Regex(regex));
        }

        Ok(Selector::Exact(raw.to_string()))
    }
}

impl Selector {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Selector::All => true,
            Selector::Exact(exact) => exact == name,
            Selector::Regex(regex) => regex.is_match(name),
        }
    }
}

/// Split a pattern into terms. Commas win over colons when both appear.
pub fn split_pattern(pattern: &str) -> Vec<String> {
    let pattern = pattern.trim();
    let parts: Vec<&str> = if pattern.contains(',') {
        pattern.split(',').collect()
    } else {
        pattern.split(':').collect()
    };

    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

/// Parse and order terms: unions first, then intersections, then exclusions.
/// A pattern with no union term starts from `all`.
pub fn parse_pattern(pattern: &str) -> Vec<PatternTerm> {
    let mut unions = Vec::new();
    let mut intersections = Vec::new();
    let mut exclusions = Vec::new();

    for raw in split_pattern(pattern) {
        if let Some(rest) = raw.strip_prefix('&') {
            intersections.push(PatternTerm {
                op: PatternOp::Intersect,
                selector: rest.trim().to_string(),
            });
        } else if let Some(rest) = raw.strip_prefix('!') {
            exclusions.push(PatternTerm {
                op: PatternOp::Exclude,
                selector: rest.trim().to_string(),
            });
        } else {
            unions.push(PatternTerm {
                op: PatternOp::Union,
                selector: raw,
            });
        }
    }

    if unions.is_empty() && !(intersections.is_empty() && exclusions.is_empty()) {
        unions.push(PatternTerm {
            op: PatternOp::Union,
            selector: "all".to_string(),
        });
    }

    unions
        .into_iter()
        .chain(intersections)
        .chain(exclusions)
        .collect()
}

/// Label for `scope` narrowed by `filter`. A multi-term filter is
/// parenthesized since its terms combine before the intersection.
pub fn scoped_pattern(scope: &str, filter: &str) -> String {
    if split_pattern(filter).len() > 1 {
        format!("{scope}:&({})", filter.trim())
    } else {
        format!("{scope}:&{}", filter.trim())
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::from("^");
    for c in glob.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}
