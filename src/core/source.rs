//! CV-002: Source positions and comment recovery.
//!
//! YAML deserialization drops comments and line numbers, so declarations are
//! located again in the raw file text. A declaration's position is the line
//! of its key inside its top-level section; its comments are the contiguous
//! `#` lines directly above the key plus a `#` comment on the key's line.

use super::types::Section;
use crate::il::{Comments, Location};
use std::path::PathBuf;

/// A module file as read from disk.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Absolute or loader-relative path
    pub path: PathBuf,
    /// Name used in locations (relative to the conversion root when possible)
    pub name: String,
    /// Raw file contents
    pub text: String,
}

impl SourceFile {
    pub fn new(path: PathBuf, name: String, text: String) -> Self {
        Self { path, name, text }
    }

    /// Locate a declaration and recover its comments.
    ///
    /// Fails when the key cannot be found in block-style YAML under its
    /// section; the caller decides whether that is fatal.
    pub fn locate(&self, section: Section, key: &str) -> Result<(Location, Option<Comments>), String> {
        let lines: Vec<&str> = self.text.lines().collect();

        let section_idx = lines
            .iter()
            .position(|l| top_level_key(l) == Some(section.key()))
            .ok_or_else(|| format!("section '{}' not found in {}", section, self.name))?;

        if !rest_after_key(lines[section_idx]).trim().is_empty()
            && !rest_after_key(lines[section_idx]).trim_start().starts_with('#')
        {
            return Err(format!(
                "section '{}' in {} is not in block style",
                section, self.name
            ));
        }

        let mut child_indent: Option<usize> = None;
        for (idx, line) in lines.iter().enumerate().skip(section_idx + 1) {
            if is_blank_or_comment(line) {
                continue;
            }
            let indent = indentation(line);
            if indent == 0 {
                break;
            }
            let expected = *child_indent.get_or_insert(indent);
            if indent != expected {
                continue;
            }
            if parse_key(line.trim_start()) != Some(key) {
                continue;
            }

            let location = Location::new(&self.name, idx + 1);
            let leading = leading_comments(&lines, idx);
            let trailing: Vec<String> = trailing_comment(rest_after_key(line))
                .into_iter()
                .collect();
            let comments = if leading.is_empty() && trailing.is_empty() {
                None
            } else {
                Some(Comments { leading, trailing })
            };
            return Ok((location, comments));
        }

        Err(format!(
            "'{}' not found under section '{}' in {}",
            key, section, self.name
        ))
    }
}

fn indentation(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn is_blank_or_comment(line: &str) -> bool {
    let t = line.trim();
    t.is_empty() || t.starts_with('#')
}

/// Key of an unindented `key:` line.
fn top_level_key(line: &str) -> Option<&str> {
    if indentation(line) != 0 {
        return None;
    }
    parse_key(line)
}

/// Parse the mapping key at the start of `line` (already trimmed on the left).
/// Handles plain, single-quoted and double-quoted keys.
fn parse_key(line: &str) -> Option<&str> {
    let (key, rest) = match line.chars().next()? {
        q @ ('"' | '\'') => {
            let end = line[1..].find(q)? + 1;
            (&line[1..end], &line[end + 1..])
        }
        _ => {
            let end = line.find(':')?;
            (line[..end].trim_end(), &line[end..])
        }
    };
    let rest = rest.trim_start();
    if !rest.starts_with(':') {
        return None;
    }
    let after = &rest[1..];
    if !after.is_empty() && !after.starts_with(char::is_whitespace) {
        return None;
    }
    Some(key)
}

/// Text following the `key:` separator of a line.
fn rest_after_key(line: &str) -> &str {
    let t = line.trim_start();
    let start = match t.chars().next() {
        Some(q @ ('"' | '\'')) => t[1..].find(q).map(|e| e + 2).unwrap_or(0),
        _ => 0,
    };
    match t[start..].find(':') {
        Some(colon) => &t[start + colon + 1..],
        None => "",
    }
}

/// Contiguous `#` lines directly above `idx`, in source order.
fn leading_comments(lines: &[&str], idx: usize) -> Vec<String> {
    let mut collected = Vec::new();
    for line in lines[..idx].iter().rev() {
        match line.trim_start().strip_prefix('#') {
            Some(text) => collected.push(text.trim_end().to_string()),
            None => break,
        }
    }
    collected.reverse();
    collected
}

/// A `#` comment at the end of a line, ignoring `#` inside quoted scalars.
fn trailing_comment(rest: &str) -> Option<String> {
    let mut quote: Option<char> = None;
    let mut prev_space = true;
    for (i, c) in rest.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '#' && prev_space => {
                return Some(rest[i + 1..].trim_end().to_string());
            }
            None => {}
        }
        prev_space = c.is_whitespace();
    }
    None
}
