//! Request-scoped state.
//!
//! A [`RequestContext`] is created for every inbound request and accumulates what the
//! parsing pipeline extracts from it: cookies, path parameters, the parsed body, uploaded
//! files and the active session. It is dropped when the response has been produced.

use crate::body::OptionReqBody;
use crate::router::matcher::strip_query;
use crate::session::Session;
use crate::upload::UploadedFile;
use http::request::Parts;
use http::{HeaderMap, Method, Uri, Version};
use serde_json::Value;
use std::collections::HashMap;

pub struct RequestContext {
    parts: Parts,
    body: OptionReqBody,
    path_params: PathParams,
    cookies: HashMap<String, String>,
    parsed_body: Option<Value>,
    files: Vec<UploadedFile>,
    session: Option<ActiveSession>,
}

/// The session attached to a request, together with the id it is stored under.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub(crate) id: String,
    pub(crate) session: Session,
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", self.method())
            .field("uri", self.uri())
            .field("path_params", &self.path_params)
            .field("cookies", &self.cookies)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl RequestContext {
    pub fn new(parts: Parts, body: OptionReqBody) -> Self {
        Self {
            parts,
            body,
            path_params: PathParams::empty(),
            cookies: HashMap::new(),
            parsed_body: None,
            files: Vec::new(),
            session: None,
        }
    }

    /// Returns the HTTP method of the request
    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    /// Returns the URI of the request
    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    /// Returns the HTTP version of the request
    pub fn version(&self) -> Version {
        self.parts.version
    }

    /// Returns the HTTP headers of the request
    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    pub fn extensions(&self) -> &http::Extensions {
        &self.parts.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut http::Extensions {
        &mut self.parts.extensions
    }

    /// The raw path including the query string, as matched by route patterns.
    pub fn path_and_query(&self) -> &str {
        self.parts.uri.path_and_query().map_or_else(|| self.parts.uri.path(), |pq| pq.as_str())
    }

    /// The path without the query string.
    pub fn path(&self) -> &str {
        strip_query(self.path_and_query())
    }

    pub fn body(&self) -> &OptionReqBody {
        &self.body
    }

    pub fn path_params(&self) -> &PathParams {
        &self.path_params
    }

    /// Shortcut for `path_params().get(name)`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name)
    }

    pub(crate) fn merge_params(&mut self, params: PathParams) {
        self.path_params.merge(params);
    }

    pub fn cookies(&self) -> &HashMap<String, String> {
        &self.cookies
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub(crate) fn set_cookies(&mut self, cookies: HashMap<String, String>) {
        self.cookies = cookies;
    }

    /// The body decoded by the pipeline (JSON document, form fields or multipart fields).
    pub fn parsed_body(&self) -> Option<&Value> {
        self.parsed_body.as_ref()
    }

    /// Reads a top-level field of the parsed body as a string.
    pub fn body_field(&self, name: &str) -> Option<&str> {
        self.parsed_body.as_ref()?.get(name)?.as_str()
    }

    pub(crate) fn has_parsed_body(&self) -> bool {
        self.parsed_body.is_some()
    }

    pub(crate) fn set_parsed_body(&mut self, value: Value) {
        self.parsed_body = Some(value);
    }

    pub fn files(&self) -> &[UploadedFile] {
        &self.files
    }

    pub(crate) fn set_files(&mut self, files: Vec<UploadedFile>) {
        self.files = files;
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref().map(|active| &active.session)
    }

    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut().map(|active| &mut active.session)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|active| active.id.as_str())
    }

    pub(crate) fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub(crate) fn attach_session(&mut self, id: String, session: Session) {
        self.session = Some(ActiveSession { id, session });
    }

    pub(crate) fn take_session(&mut self) -> Option<ActiveSession> {
        self.session.take()
    }
}

/// Named parameters extracted from the request path.
///
/// Parameters from several matched rules are merged into one map; when two rules
/// capture the same name the later match overwrites the earlier value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    inner: HashMap<String, String>,
}

impl PathParams {
    #[inline]
    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn get(&self, key: impl AsRef<str>) -> Option<&str> {
        self.inner.get(key.as_ref()).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub(crate) fn insert(&mut self, key: impl Into<String>, value: String) {
        self.inner.insert(key.into(), value);
    }

    pub(crate) fn merge(&mut self, other: PathParams) {
        self.inner.extend(other.inner);
    }
}
