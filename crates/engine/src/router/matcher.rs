//! Route expression matching.
//!
//! A [`Pattern`] decides whether a request path satisfies a filter or handler rule:
//!
//! - [`Pattern::Any`]: no expression, matches every request
//! - [`Pattern::Literal`]: a plain path such as `/static`
//! - [`Pattern::Params`]: a path with `:name` segments such as `/home/:id`
//! - [`Pattern::Regex`]: a regular expression tested against the raw path and query
//! - [`Pattern::List`]: several patterns, the first one that matches wins
//!
//! Matching returns `Option<PathParams>`: `None` means "no match", `Some` with an empty
//! map means "matched without parameters".

use crate::request::PathParams;
use regex::Regex;

const PARAM_MARKER: char = ':';

/// How a literal expression is compared with the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Filters: the literal may occur anywhere in the path.
    Filter,
    /// Handlers: the literal must start the path (after an optional `/`) and end on a
    /// segment boundary.
    Handler,
}

#[derive(Debug, Clone)]
pub enum Pattern {
    Any,
    Literal(String),
    Params(ParamPattern),
    Regex(Regex),
    List(Vec<Pattern>),
}

/// A parameterized path, split into segments once at registration.
#[derive(Debug, Clone)]
pub struct ParamPattern {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Param(String),
}

impl Pattern {
    /// Builds a literal or parameterized pattern depending on the presence of `:name` segments.
    pub fn path(expression: impl Into<String>) -> Self {
        let expression = expression.into();
        if expression.split('/').any(|segment| segment.starts_with(PARAM_MARKER)) {
            Pattern::Params(ParamPattern::new(&expression))
        } else {
            Pattern::Literal(expression)
        }
    }

    pub fn regex(expression: &str) -> Result<Self, regex::Error> {
        Regex::new(expression).map(Pattern::Regex)
    }

    pub fn list<I, P>(patterns: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Pattern>,
    {
        Pattern::List(patterns.into_iter().map(Into::into).collect())
    }

    /// Matches `path` (path and query, as received) against this pattern.
    pub fn matches(&self, path: &str, mode: MatchMode) -> Option<PathParams> {
        match self {
            Pattern::Any => Some(PathParams::empty()),
            Pattern::Literal(literal) => match_literal(literal, path, mode).then(PathParams::empty),
            Pattern::Params(pattern) => pattern.matches(path),
            Pattern::Regex(regex) => match_regex(regex, path),
            Pattern::List(patterns) => patterns.iter().find_map(|pattern| pattern.matches(path, mode)),
        }
    }
}

impl From<&str> for Pattern {
    fn from(value: &str) -> Self {
        Pattern::path(value)
    }
}

impl From<String> for Pattern {
    fn from(value: String) -> Self {
        Pattern::path(value)
    }
}

impl From<Regex> for Pattern {
    fn from(value: Regex) -> Self {
        Pattern::Regex(value)
    }
}

impl<P: Into<Pattern>> From<Vec<P>> for Pattern {
    fn from(value: Vec<P>) -> Self {
        Pattern::list(value)
    }
}

fn match_literal(literal: &str, path: &str, mode: MatchMode) -> bool {
    match mode {
        MatchMode::Filter => path.contains(literal),
        MatchMode::Handler => {
            let Some(index) = path.find(literal) else {
                return false;
            };
            if index > 1 {
                return false;
            }
            matches!(path[index + literal.len()..].chars().next(), None | Some('/' | '?'))
        }
    }
}

fn match_regex(regex: &Regex, path: &str) -> Option<PathParams> {
    let captures = regex.captures(path)?;
    let mut params = PathParams::empty();
    for name in regex.capture_names().flatten() {
        if let Some(value) = captures.name(name) {
            params.insert(name, decode(value.as_str()));
        }
    }
    Some(params)
}

impl ParamPattern {
    fn new(expression: &str) -> Self {
        let segments = expression
            .split('/')
            .map(|segment| match segment.strip_prefix(PARAM_MARKER) {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(segment.to_string()),
            })
            .collect();
        Self { segments }
    }

    fn matches(&self, path: &str) -> Option<PathParams> {
        let path = strip_query(path);
        let mut params = PathParams::empty();
        let mut request_segments = path.split('/');

        for segment in &self.segments {
            let value = request_segments.next()?;
            match segment {
                Segment::Literal(literal) if literal == value => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => params.insert(name, decode(value)),
            }
        }

        // the request has more segments than the expression
        if request_segments.next().is_some() {
            return None;
        }

        Some(params)
    }
}

/// Removes the query string, if any.
pub(crate) fn strip_query(path: &str) -> &str {
    path.split_once('?').map_or(path, |(path, _)| path)
}

fn decode(value: &str) -> String {
    urlencoding::decode(value).map_or_else(|_| value.to_string(), |decoded| decoded.into_owned())
}
