//! File-name matching with `glob:` and `regex:` patterns.

use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;
use std::fmt;
use std::path::Path;

use crate::error::TaskError;

enum Kind {
    Glob(GlobMatcher),
    Regex(Regex),
}

/// Matches the final segment of a path against a `syntax:pattern` string.
///
/// Supported syntaxes are `glob` (`*`, `?`, `[...]`, `{a,b}`) and `regex` (whole-name match).
/// The syntax name is case-insensitive.
pub struct NameMatcher {
    source: String,
    kind: Kind,
}

impl NameMatcher {
    pub fn new(syntax_and_pattern: &str) -> Result<Self, TaskError> {
        let (syntax, pattern) = syntax_and_pattern
            .split_once(':')
            .ok_or_else(|| TaskError::MissingSyntax(syntax_and_pattern.to_string()))?;
        let invalid = |message: String| TaskError::InvalidPattern {
            pattern: syntax_and_pattern.to_string(),
            message,
        };

        let kind = if syntax.eq_ignore_ascii_case("glob") {
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|e| invalid(e.to_string()))?;
            Kind::Glob(glob.compile_matcher())
        } else if syntax.eq_ignore_ascii_case("regex") {
            let regex =
                Regex::new(&format!("^(?:{pattern})$")).map_err(|e| invalid(e.to_string()))?;
            Kind::Regex(regex)
        } else {
            return Err(TaskError::UnsupportedSyntax(syntax.to_string()));
        };

        Ok(Self {
            source: syntax_and_pattern.to_string(),
            kind,
        })
    }

    /// True when the file name of `path` matches. Paths without a file name never match.
    pub fn matches(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        match &self.kind {
            Kind::Glob(glob) => glob.is_match(name),
            Kind::Regex(regex) => name.to_str().is_some_and(|n| regex.is_match(n)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for NameMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NameMatcher").field(&self.source).finish()
    }
}
