//! Pattern matching for statement actions, resources and string conditions
//!
//! Patterns are sanitized before compilation: every character outside
//! `[A-Za-z0-9_\-*?: ./]` is dropped. In glob mode:
//! - `*` - Matches any sequence, including `:` and `/` (e.g., `lrn:app:*`)
//! - `?` - Matches any single character
//! - `/*` - Collapses to `*`, so `lrn:app:files/*` also matches `lrn:app:files`
//!
//! Every other character, `.` included, matches itself. Exact mode compares
//! the sanitized text literally. Compiled globs are shared through
//! [`GlobCache`].

use super::cache::GlobCache;
use crate::error::{AuthzError, Result};
use regex::Regex;

/// Compiled pattern
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Literal comparison against the sanitized text
    Exact(String),
    /// Anchored glob
    Glob(Regex),
}

impl Pattern {
    /// Compile a glob pattern
    ///
    /// # Examples
    /// ```
    /// use lrn_authz::iam::Pattern;
    ///
    /// let pattern = Pattern::glob("lrn:app:*").unwrap();
    /// assert!(pattern.is_match("lrn:app:orders:::42"));
    /// assert!(!pattern.is_match("lrn:other:orders"));
    /// ```
    pub fn glob(raw: &str) -> Result<Self> {
        let sanitized = sanitize(raw);
        GlobCache::global()
            .get_or_compile(&sanitized, || Regex::new(&glob_to_regex(&sanitized)))
            .map(Pattern::Glob)
            .map_err(|e| AuthzError::InvalidPattern {
                pattern: raw.to_string(),
                reason: e.to_string(),
            })
    }

    /// Build an exact pattern
    pub fn exact(raw: &str) -> Self {
        Pattern::Exact(sanitize(raw))
    }

    /// Check if text matches this pattern
    pub fn is_match(&self, text: &str) -> bool {
        match self {
            Pattern::Exact(expected) => expected == text,
            Pattern::Glob(regex) => regex.is_match(text),
        }
    }
}

/// Compiled set of alternatives; matches when any member matches
#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

impl PatternSet {
    /// Compile every entry as a glob
    pub fn globs<S: AsRef<str>>(raw: &[S]) -> Result<Self> {
        let patterns = raw
            .iter()
            .map(|p| Pattern::glob(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(PatternSet { patterns })
    }

    /// Build exact patterns from every entry
    pub fn exact<S: AsRef<str>>(raw: &[S]) -> Self {
        PatternSet {
            patterns: raw.iter().map(|p| Pattern::exact(p.as_ref())).collect(),
        }
    }

    /// True if any pattern matches
    pub fn any_match(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(text))
    }
}

/// Drop characters that have no meaning in a statement pattern
fn sanitize(raw: &str) -> String {
    raw.chars()
        .filter(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '*' | '?' | ':' | ' ' | '.' | '/')
        })
        .collect()
}

fn glob_to_regex(pattern: &str) -> String {
    let mut source = String::with_capacity(pattern.len() * 2 + 2);
    source.push('^');

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '/' if chars.peek() == Some(&'*') => {}
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => {
                let mut buf = [0u8; 4];
                source.push_str(&regex::escape(other.encode_utf8(&mut buf)));
            }
        }
    }

    source.push('$');
    source
}
