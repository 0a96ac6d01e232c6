//! Request matching logic.
//!
//! Compiles intercept request matchers once and evaluates them against
//! outbound request descriptors.

use crate::config::{PathMatcher, QueryMatcher, RequestMatcher};
use crate::error::{HarnessError, HarnessResult};
use crate::network::RequestDescriptor;
use regex::Regex;
use std::collections::HashMap;

/// Context captured during matching (for template variables).
#[derive(Debug, Clone, Default)]
pub struct MatchContext {
    /// Query parameters
    pub query_params: HashMap<String, String>,
    /// Regex capture groups
    pub captures: HashMap<String, String>,
}

/// A compiled request matcher.
#[derive(Debug)]
pub struct RouteMatcher {
    methods: Vec<String>,
    path: Option<CompiledPathMatcher>,
    url: Option<Regex>,
    query: Vec<(String, CompiledQueryMatcher)>,
}

#[derive(Debug)]
enum CompiledPathMatcher {
    Exact(String),
    Prefix(String),
    Regex(Regex),
    Glob(globset::GlobMatcher),
}

#[derive(Debug)]
enum CompiledQueryMatcher {
    Exact(String),
    Pattern(Regex),
    Present,
    Absent,
}

fn invalid(pattern: &str, reason: impl ToString) -> HarnessError {
    HarnessError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    }
}

impl RouteMatcher {
    /// Compile a request matcher definition.
    pub fn compile(matcher: &RequestMatcher) -> HarnessResult<Self> {
        let path = match &matcher.pathname {
            None => None,
            Some(PathMatcher::Exact { value }) => Some(CompiledPathMatcher::Exact(value.clone())),
            Some(PathMatcher::Prefix { value }) => {
                Some(CompiledPathMatcher::Prefix(value.clone()))
            }
            Some(PathMatcher::Regex { pattern }) => Some(CompiledPathMatcher::Regex(
                Regex::new(pattern).map_err(|e| invalid(pattern, e))?,
            )),
            Some(PathMatcher::Glob { pattern }) => {
                let glob = globset::Glob::new(pattern).map_err(|e| invalid(pattern, e))?;
                Some(CompiledPathMatcher::Glob(glob.compile_matcher()))
            }
        };

        let url = match &matcher.url {
            Some(glob) => Some(glob_to_regex(glob).map_err(|e| invalid(glob, e))?),
            None => None,
        };

        let mut query = Vec::with_capacity(matcher.query.len());
        for (name, qm) in &matcher.query {
            let compiled = match qm {
                QueryMatcher::Exact { value } => CompiledQueryMatcher::Exact(value.clone()),
                QueryMatcher::Glob { pattern } => CompiledQueryMatcher::Pattern(
                    glob_to_regex(pattern).map_err(|e| invalid(pattern, e))?,
                ),
                QueryMatcher::Regex { pattern } => CompiledQueryMatcher::Pattern(
                    Regex::new(pattern).map_err(|e| invalid(pattern, e))?,
                ),
                QueryMatcher::Present => CompiledQueryMatcher::Present,
                QueryMatcher::Absent => CompiledQueryMatcher::Absent,
            };
            query.push((name.clone(), compiled));
        }

        Ok(Self {
            methods: matcher.method.iter().map(|m| m.to_uppercase()).collect(),
            path,
            url,
            query,
        })
    }

    /// Check a request, returning the captured context on a match.
    pub fn matches(&self, request: &RequestDescriptor) -> Option<MatchContext> {
        let mut context = MatchContext::default();

        // Check method
        if !self.methods.is_empty() {
            let method_upper = request.method().to_uppercase();
            if !self.methods.iter().any(|m| *m == method_upper) {
                return None;
            }
        }

        // Check pathname
        if let Some(path_matcher) = &self.path {
            if !matches_path(path_matcher, request.pathname(), &mut context) {
                return None;
            }
        }

        // Check full URL
        if let Some(url) = &self.url {
            if !url.is_match(request.url()) {
                return None;
            }
        }

        let query_params = request.query_params();

        for (name, qm) in &self.query {
            let value = query_params.get(name);
            let ok = match qm {
                CompiledQueryMatcher::Exact(expected) => value == Some(expected),
                CompiledQueryMatcher::Pattern(regex) => {
                    value.map(|v| regex.is_match(v)).unwrap_or(false)
                }
                CompiledQueryMatcher::Present => value.is_some(),
                CompiledQueryMatcher::Absent => value.is_none(),
            };
            if !ok {
                return None;
            }
        }

        context.query_params = query_params;
        Some(context)
    }
}

fn matches_path(matcher: &CompiledPathMatcher, path: &str, context: &mut MatchContext) -> bool {
    match matcher {
        CompiledPathMatcher::Exact(value) => path == value,
        CompiledPathMatcher::Prefix(value) => path.starts_with(value),
        CompiledPathMatcher::Regex(regex) => {
            if let Some(captures) = regex.captures(path) {
                for (i, cap) in captures.iter().enumerate().skip(1) {
                    if let Some(m) = cap {
                        context.captures.insert(format!("{}", i), m.as_str().to_string());
                    }
                }
                for name in regex.capture_names().flatten() {
                    if let Some(m) = captures.name(name) {
                        context.captures.insert(name.to_string(), m.as_str().to_string());
                    }
                }
                true
            } else {
                false
            }
        }
        CompiledPathMatcher::Glob(glob) => glob.is_match(path),
    }
}

/// Translate a URL glob into an anchored regex.
///
/// `**` matches anything, `*` matches anything but `/`, every other
/// character (including `?`) is literal.
pub fn glob_to_regex(glob: &str) -> Result<Regex, regex::Error> {
    let mut pattern = String::with_capacity(glob.len() * 2 + 2);
    pattern.push('^');
    let mut chars = glob.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '*' {
            if chars.peek() == Some(&'*') {
                chars.next();
                pattern.push_str(".*");
            } else {
                pattern.push_str("[^/]*");
            }
        } else {
            pattern.push_str(&regex::escape(ch.encode_utf8(&mut [0u8; 4])));
        }
    }
    pattern.push('$');
    Regex::new(&pattern)
}
