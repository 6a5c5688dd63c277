//! CV-006: Interpolation parsing.
//!
//! Splits `"prefix-${var.env}-suffix"` into literal text and traversals.
//! `$${` escapes a literal `${`. Traversals are dot-separated segments and are
//! resolved later by the binder.

use std::fmt;

/// A dotted reference such as `aws_s3_bucket.logs.arn`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Traversal {
    pub segments: Vec<String>,
}

impl fmt::Display for Traversal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

/// A piece of a template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    Literal(String),
    Traversal(Traversal),
}

/// Split a string into literal and traversal parts. Adjacent literal text is
/// merged, and empty literals are never produced.
pub fn parse_template(template: &str) -> Result<Vec<TemplatePart>, String> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut rest = template;

    while let Some(open) = rest.find("${") {
        if open > 0 && rest[..open].ends_with('$') {
            literal.push_str(&rest[..open - 1]);
            literal.push_str("${");
            rest = &rest[open + 2..];
            continue;
        }
        literal.push_str(&rest[..open]);
        let close = rest[open..]
            .find('}')
            .ok_or_else(|| format!("unclosed interpolation in \"{}\"", template))?;
        let expr = rest[open + 2..open + close].trim();
        let traversal = parse_traversal(expr)?;

        if !literal.is_empty() {
            parts.push(TemplatePart::Literal(std::mem::take(&mut literal)));
        }
        parts.push(TemplatePart::Traversal(traversal));
        rest = &rest[open + close + 1..];
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        parts.push(TemplatePart::Literal(literal));
    }
    Ok(parts)
}

/// Parse `a.b.c` into a traversal.
pub fn parse_traversal(expr: &str) -> Result<Traversal, String> {
    if expr.is_empty() {
        return Err("empty interpolation".to_string());
    }
    let segments: Vec<String> = expr.split('.').map(|s| s.trim().to_string()).collect();
    for seg in &segments {
        if seg.is_empty() {
            return Err(format!("empty segment in reference '{}'", expr));
        }
        if !seg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(format!("invalid reference '{}'", expr));
        }
    }
    Ok(Traversal { segments })
}
