//! `#{...}` template interpolation over a layered context.
//!
//! Expressions are restricted to dotted/indexed property paths:
//! `segment ("." segment | "[" index "]")*`. Anything outside that grammar
//! is rejected rather than evaluated. Interpolation is pure and
//! deterministic: the same input and context always produce the same
//! output, and inputs without placeholders pass through unchanged.

use std::collections::BTreeMap;

use devstack_common::error::{DevstackError, Result};

/// Placeholder opener.
const OPEN: &str = "#{";

/// Manifest-level values visible to templates under the `manifest` namespace.
#[derive(Debug, Clone, Default)]
pub struct ManifestView {
    /// Manifest directory basename.
    pub dir: String,
    /// Project name derived from the manifest directory.
    pub project_name: String,
}

/// Network view of a system, visible under the `net` namespace.
#[derive(Debug, Clone, Default)]
pub struct NetView {
    /// Hostname or IP the dependent observes.
    pub host: Option<String>,
    /// Bound port per internal port (`net.port.<internal>`).
    pub port: BTreeMap<u16, u16>,
}

/// Layered evaluation context for template expressions.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    /// `manifest.*` namespace.
    pub manifest: ManifestView,
    /// `envs.*` namespace: flat key/value environment map.
    pub envs: BTreeMap<String, String>,
    /// `net.*` namespace: the observed network identity.
    pub net: NetView,
    /// Top-level variables for flat contexts (mount folders and the like).
    pub vars: BTreeMap<String, String>,
}

impl TemplateContext {
    /// Looks a parsed property path up in the context.
    fn lookup(&self, segments: &[String]) -> Option<String> {
        let head = segments.first()?;
        match (head.as_str(), segments.len()) {
            ("manifest", 2) => match segments[1].as_str() {
                "dir" => Some(self.manifest.dir.clone()),
                "project_name" => Some(self.manifest.project_name.clone()),
                _ => None,
            },
            ("envs", 2) => self.envs.get(&segments[1]).cloned(),
            ("net", 2) if segments[1] == "host" => self.net.host.clone(),
            ("net", 3) if segments[1] == "port" => segments[2]
                .parse::<u16>()
                .ok()
                .and_then(|p| self.net.port.get(&p))
                .map(u16::to_string),
            (key, 1) => self.vars.get(key).cloned(),
            _ => None,
        }
    }
}

/// Parses a constrained property-path expression into its segments.
///
/// Returns `None` for anything outside the grammar; there is no general
/// expression evaluation here by design.
fn parse_path(expr: &str) -> Option<Vec<String>> {
    let mut segments = Vec::new();
    let mut chars = expr.chars().peekable();

    loop {
        let mut segment = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                segment.push(c);
                let _ = chars.next();
            } else {
                break;
            }
        }
        if segment.is_empty() {
            return None;
        }
        segments.push(segment);

        match chars.next() {
            None => return Some(segments),
            Some('.') => {}
            Some('[') => {
                let mut index = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(c) if c.is_ascii_alphanumeric() || c == '_' => index.push(c),
                        _ => return None,
                    }
                }
                if index.is_empty() {
                    return None;
                }
                segments.push(index);
                match chars.next() {
                    None => return Some(segments),
                    Some('.') => {}
                    _ => return None,
                }
            }
            Some(_) => return None,
        }
    }
}

fn unresolved(expression: &str, value: &str) -> DevstackError {
    DevstackError::TemplateResolution {
        expression: expression.to_string(),
        value: value.to_string(),
    }
}

/// Expands every `#{expression}` placeholder in `input` against `ctx`.
///
/// Substitution is all or nothing: a failing placeholder never leaves
/// partial output behind, and there is no empty-string fallback.
///
/// # Errors
///
/// Returns `TemplateResolution` if a placeholder is unterminated, outside
/// the path grammar, or absent from the context.
pub fn interpolate(input: &str, ctx: &TemplateContext) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after = &rest[start + OPEN.len()..];
        let end = after.find('}').ok_or_else(|| unresolved(after, input))?;
        let expr = &after[..end];
        let segments = parse_path(expr).ok_or_else(|| unresolved(expr, input))?;
        let value = ctx.lookup(&segments).ok_or_else(|| unresolved(expr, input))?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Expands every string value of `map`, leaving keys untouched.
///
/// # Errors
///
/// Returns `TemplateResolution` on the first value that fails to expand.
pub fn interpolate_map(
    map: &BTreeMap<String, String>,
    ctx: &TemplateContext,
) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for (key, value) in map {
        let _ = out.insert(key.clone(), interpolate(value, ctx)?);
    }
    Ok(out)
}

/// Recursively expands every string leaf of a JSON-shaped tree.
///
/// Arrays and objects are walked in order; non-string leaves pass through
/// unchanged.
///
/// # Errors
///
/// Returns `TemplateResolution` on the first leaf that fails to expand.
pub fn interpolate_tree(
    value: &serde_json::Value,
    ctx: &TemplateContext,
) -> Result<serde_json::Value> {
    use serde_json::Value;

    Ok(match value {
        Value::String(s) => Value::String(interpolate(s, ctx)?),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| interpolate_tree(item, ctx))
                .collect::<Result<_>>()?,
        ),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                let _ = out.insert(key.clone(), interpolate_tree(item, ctx)?);
            }
            Value::Object(out)
        }
        other => other.clone(),
    })
}
