//! Glob-based exclusion of project paths

use crate::Result;
use regex::Regex;

/// A single compiled exclusion pattern
#[derive(Debug, Clone)]
struct CompiledPattern {
    source: String,
    regex: Regex,
    /// Patterns without a `/` are tested against every path segment
    per_segment: bool,
}

/// Decides whether a project-relative path may be included in context.
///
/// Patterns support `**`, `*`, `?` and `{a,b}` alternation. Patterns are
/// compiled once, when the filter is built.
#[derive(Debug, Clone)]
pub struct ExclusionFilter {
    patterns: Vec<CompiledPattern>,
}

impl ExclusionFilter {
    /// Compile a filter from glob patterns
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut compiled = Vec::with_capacity(patterns.len());

        for pattern in patterns {
            let source = pattern.as_ref();
            let trimmed = source.trim().trim_start_matches('/').trim_end_matches('/');
            if trimmed.is_empty() {
                continue;
            }

            let regex = Regex::new(&glob_to_regex(trimmed))?;
            compiled.push(CompiledPattern {
                source: source.to_string(),
                regex,
                per_segment: !trimmed.contains('/'),
            });
        }

        Ok(Self { patterns: compiled })
    }

    /// Whether `relative_path` (forward-slash, project-relative) is excluded
    pub fn is_excluded(&self, relative_path: &str) -> bool {
        self.matching_pattern(relative_path).is_some()
    }

    /// The first pattern that excludes `relative_path`, if any
    pub fn matching_pattern(&self, relative_path: &str) -> Option<&str> {
        let path = relative_path.trim_start_matches("./").trim_start_matches('/');

        self.patterns
            .iter()
            .find(|p| {
                if p.per_segment {
                    path.split('/').any(|segment| p.regex.is_match(segment))
                } else {
                    p.regex.is_match(path)
                }
            })
            .map(|p| p.source.as_str())
    }

    /// Number of active patterns
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Translate a glob into an anchored regular expression
fn glob_to_regex(glob: &str) -> String {
    let chars: Vec<char> = glob.chars().collect();
    let mut regex = String::from("^");
    let mut brace_depth = 0usize;
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    regex.push_str("(?:.*/)?");
                    i += 2;
                } else {
                    regex.push_str(".*");
                    i += 1;
                }
            }
            '*' => regex.push_str("[^/]*"),
            '?' => regex.push_str("[^/]"),
            '{' => {
                brace_depth += 1;
                regex.push_str("(?:");
            }
            '}' if brace_depth > 0 => {
                brace_depth -= 1;
                regex.push(')');
            }
            ',' if brace_depth > 0 => regex.push('|'),
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }

    // An unclosed brace leaves an open group, which Regex::new rejects
    regex.push('$');
    regex
}
