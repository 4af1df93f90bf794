//! Resource pattern matching.
//!
//! A plain pattern is a segment-aware prefix: `/a` covers `/a` and anything
//! below it but not `/ab`. Patterns containing `*` are globs where `*` stays
//! inside one segment and `**` spans segments; a glob only has to match a
//! leading run of whole segments.
//!
//! Matching always runs on the canonical form of a request path, the same
//! form a file server resolves, so encoded or padded spellings of a path
//! cannot slip past a pattern.

use regex::Regex;
use std::{collections::HashMap, sync::RwLock};
use tracing::debug;

const CACHE_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum ResourcePattern {
    Prefix(String),
    Glob { source: String, regex: Regex },
}

impl ResourcePattern {
    /// Compile a pattern.
    ///
    /// # Errors
    /// Returns an error if a glob cannot be compiled.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        if !pattern.contains('*') {
            return Ok(Self::Prefix(pattern.to_string()));
        }

        let mut expr = String::from("^");
        let mut rest = pattern;
        while let Some(index) = rest.find('*') {
            expr.push_str(&regex::escape(&rest[..index]));
            rest = &rest[index..];
            if rest.starts_with("**") {
                expr.push_str(".*");
                rest = &rest[2..];
            } else {
                expr.push_str("[^/]*");
                rest = &rest[1..];
            }
        }
        expr.push_str(&regex::escape(rest));
        if !pattern.ends_with('/') {
            expr.push_str("(?:/|$)");
        }

        Ok(Self::Glob {
            source: pattern.to_string(),
            regex: Regex::new(&expr)?,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Prefix(source) | Self::Glob { source, .. } => source,
        }
    }

    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Prefix(prefix) => prefix_matches(prefix, path),
            Self::Glob { regex, .. } => regex.is_match(path),
        }
    }
}

fn prefix_matches(prefix: &str, path: &str) -> bool {
    if prefix.is_empty() || prefix == "/" {
        return true;
    }
    let Some(rest) = path.strip_prefix(prefix) else {
        return false;
    };
    rest.is_empty() || prefix.ends_with('/') || rest.starts_with('/')
}

/// Compiled claim patterns keyed by their source text, shared by every
/// request. Patterns that fail to compile are remembered as non-matching.
#[derive(Debug, Default)]
pub struct PatternCache {
    compiled: RwLock<HashMap<String, Option<ResourcePattern>>>,
}

impl PatternCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `path` falls under any of `patterns`.
    #[must_use]
    pub fn matches_any<S: AsRef<str>>(&self, patterns: &[S], path: &str) -> bool {
        patterns
            .iter()
            .any(|pattern| self.matches(pattern.as_ref(), path))
    }

    fn matches(&self, source: &str, path: &str) -> bool {
        if let Ok(compiled) = self.compiled.read() {
            if let Some(entry) = compiled.get(source) {
                return entry.as_ref().is_some_and(|pattern| pattern.matches(path));
            }
        }

        let entry = match ResourcePattern::new(source) {
            Ok(pattern) => Some(pattern),
            Err(err) => {
                debug!(pattern = source, "ignoring invalid resource pattern: {err}");
                None
            }
        };
        let matched = entry.as_ref().is_some_and(|pattern| pattern.matches(path));

        if let Ok(mut compiled) = self.compiled.write() {
            if compiled.len() >= CACHE_CAPACITY {
                compiled.clear();
            }
            compiled.insert(source.to_string(), entry);
        }
        matched
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.compiled.read().map_or(0, |compiled| compiled.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Canonical form of a raw request path: percent-decoded, with empty and
/// `.` segments removed. A trailing slash is kept.
///
/// Returns `None` for a `..` segment or a path that does not decode to
/// UTF-8.
#[must_use]
pub fn canonicalize(raw: &str) -> Option<String> {
    let decoded = urlencoding::decode(raw).ok()?;

    let mut canonical = String::with_capacity(decoded.len() + 1);
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => return None,
            segment => {
                canonical.push('/');
                canonical.push_str(segment);
            }
        }
    }
    if canonical.is_empty() || decoded.ends_with('/') {
        canonical.push('/');
    }
    Some(canonical)
}

/// Join the base path and an endpoint name, e.g. `/auth` + `login` is
/// `/auth/login`.
#[must_use]
pub fn endpoint(base: &str, name: &str) -> String {
    let base = base.trim_end_matches('/');
    format!("{base}/{}", name.trim_start_matches('/'))
}
