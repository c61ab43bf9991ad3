//! Route rules shared by the filter and handler registries.

pub mod matcher;

use crate::request::{PathParams, RequestContext};
use matcher::{MatchMode, Pattern};
use std::sync::Arc;
use tracing::warn;

/// Predicate evaluated before a rule's pipeline runs, `false` rejects the request with 403.
pub type Precheck = Arc<dyn Fn(&RequestContext) -> bool + Send + Sync>;

/// How the request body is decoded for a rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PostMode {
    #[default]
    None,
    Json,
    QueryString,
}

#[derive(Clone, Default)]
pub struct RuleOptions {
    requires_session: bool,
    requires_upload: bool,
    post_mode: PostMode,
    precheck: Option<Precheck>,
}

impl std::fmt::Debug for RuleOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleOptions")
            .field("requires_session", &self.requires_session)
            .field("requires_upload", &self.requires_upload)
            .field("post_mode", &self.post_mode)
            .field("precheck", &self.precheck.is_some())
            .finish()
    }
}

impl RuleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(mut self) -> Self {
        self.requires_session = true;
        self
    }

    pub fn upload(mut self) -> Self {
        self.requires_upload = true;
        self
    }

    pub fn post(mut self, mode: PostMode) -> Self {
        self.post_mode = mode;
        self
    }

    pub fn json(self) -> Self {
        self.post(PostMode::Json)
    }

    pub fn query_string(self) -> Self {
        self.post(PostMode::QueryString)
    }

    /// Attaches the pre-check predicate. It can be attached once, later calls are ignored.
    pub fn precheck<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&RequestContext) -> bool + Send + Sync + 'static,
    {
        if self.precheck.is_some() {
            warn!("pre-check already attached, ignoring");
        } else {
            self.precheck = Some(Arc::new(predicate));
        }
        self
    }

    pub fn requires_session(&self) -> bool {
        self.requires_session
    }

    pub fn requires_upload(&self) -> bool {
        self.requires_upload
    }

    pub fn post_mode(&self) -> PostMode {
        self.post_mode
    }

    pub(crate) fn check(&self, req: &RequestContext) -> bool {
        self.precheck.as_ref().is_none_or(|predicate| predicate(req))
    }
}

/// A pattern, the handler it routes to and the flags driving the parsing pipeline.
pub struct Rule<H> {
    pattern: Pattern,
    handler: H,
    options: RuleOptions,
}

impl<H> std::fmt::Debug for Rule<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule").field("pattern", &self.pattern).field("options", &self.options).finish_non_exhaustive()
    }
}

impl<H> Rule<H> {
    pub fn new(pattern: Pattern, handler: H, options: RuleOptions) -> Self {
        Self { pattern, handler, options }
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn options(&self) -> &RuleOptions {
        &self.options
    }

    #[inline]
    pub fn matches(&self, path: &str, mode: MatchMode) -> Option<PathParams> {
        self.pattern.matches(path, mode)
    }
}
