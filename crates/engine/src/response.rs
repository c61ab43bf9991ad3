//! Response building.
//!
//! Handlers write into a [`ResponseContext`] instead of producing a response value. The engine
//! owns the context for the whole request and turns it into an `http::Response` once the filter
//! chain has finished and the session has been persisted.

use crate::body::ResponseBody;
use crate::cookies::{CookieOptions, set_cookie_line};
use crate::template::TemplateCache;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, LOCATION, SET_COOKIE};
use http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

pub struct ResponseContext {
    status: StatusCode,
    headers: HeaderMap,
    body: ResponseBody,
    sent: bool,
    request_path: String,
    templates: Arc<TemplateCache>,
}

impl std::fmt::Debug for ResponseContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseContext")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("sent", &self.sent)
            .finish_non_exhaustive()
    }
}

impl ResponseContext {
    pub(crate) fn new(request_path: impl Into<String>, templates: Arc<TemplateCache>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: ResponseBody::empty(),
            sent: false,
            request_path: request_path.into(),
            templates,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// `true` once a body has been sent or a redirect issued.
    pub fn is_sent(&self) -> bool {
        self.sent
    }

    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    /// Sets a header, invalid names or values are logged and ignored.
    pub fn header<K, V>(&mut self, name: K, value: V) -> &mut Self
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: std::fmt::Display,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: std::fmt::Display,
    {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            (Err(e), _) => warn!(cause = %e, "invalid header name"),
            (_, Err(e)) => warn!(cause = %e, "invalid header value"),
        }
        self
    }

    /// Sends `body`, as HTML unless a content type was already set.
    pub fn send(&mut self, body: impl Into<ResponseBody>) {
        self.default_content_type(mime::TEXT_HTML_UTF_8.as_ref());
        self.body = body.into();
        self.sent = true;
    }

    /// Sends `body` as HTML, replacing any content type set before.
    pub fn send_html(&mut self, body: impl Into<ResponseBody>) {
        self.headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
        self.body = body.into();
        self.sent = true;
    }

    pub fn send_text(&mut self, body: impl Into<ResponseBody>) {
        self.headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        self.body = body.into();
        self.sent = true;
    }

    pub fn send_json(&mut self, value: &Value) {
        self.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = ResponseBody::from(value.to_string());
        self.sent = true;
    }

    /// Sends an arbitrary body (for example a file stream) without touching the content type.
    pub fn send_body(&mut self, body: ResponseBody) {
        self.body = body;
        self.sent = true;
    }

    /// Ends the response with a status and no body.
    pub fn end(&mut self, status: StatusCode) {
        self.status = status;
        self.body = ResponseBody::empty();
        self.sent = true;
    }

    pub fn redirect(&mut self, location: &str) {
        self.redirect_with(StatusCode::FOUND, location);
    }

    pub fn redirect_with(&mut self, status: StatusCode, location: &str) {
        match HeaderValue::from_str(location) {
            Ok(value) => {
                self.headers.insert(LOCATION, value);
                self.end(status);
            }
            Err(e) => {
                warn!(location, cause = %e, "invalid redirect location");
                self.end(StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
    }

    /// Adds a `Set-Cookie` line. `None` as value expires the cookie.
    pub fn set_cookie(&mut self, name: &str, value: Option<&str>, options: &CookieOptions) {
        let line = set_cookie_line(name, value, options);
        match HeaderValue::try_from(line) {
            Ok(value) => {
                self.headers.append(SET_COOKIE, value);
            }
            Err(e) => warn!(cookie = name, cause = %e, "invalid cookie"),
        }
    }

    pub fn clear_cookie(&mut self, name: &str, options: &CookieOptions) {
        self.set_cookie(name, None, options);
    }

    /// Renders template `name` with `model` and sends the result as HTML.
    pub async fn render(&mut self, name: &str, model: &Value) {
        let templates = Arc::clone(&self.templates);
        let output = templates.render(name, model).await;
        self.send(output);
    }

    /// Renders the template named after the request path.
    pub async fn render_path(&mut self, model: &Value) {
        let name = self.request_path.trim_start_matches('/').to_string();
        self.render(&name, model).await;
    }

    pub fn templates(&self) -> &Arc<TemplateCache> {
        &self.templates
    }

    fn default_content_type(&mut self, content_type: &'static str) {
        if !self.headers.contains_key(CONTENT_TYPE) {
            self.headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
    }

    pub(crate) fn into_response(self) -> Response<ResponseBody> {
        let mut response = Response::new(self.body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Wraps an error message into a minimal HTML page.
pub(crate) fn html_error_page(status: StatusCode, message: &str) -> Bytes {
    let title = status.canonical_reason().unwrap_or("Error");
    Bytes::from(format!(
        "<!DOCTYPE html><html><head><title>{title}</title></head><body><h1>{title}</h1><pre>{}</pre></body></html>",
        escape_html(message)
    ))
}

pub(crate) fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::{ResponseContext, escape_html, html_error_page};
    use crate::cookies::CookieOptions;
    use crate::template::TemplateCache;
    use http::StatusCode;
    use http::header::{CONTENT_TYPE, LOCATION, SET_COOKIE};
    use http_body_util::BodyExt;
    use std::sync::Arc;

    fn context() -> ResponseContext {
        ResponseContext::new("/", Arc::new(TemplateCache::new(".", ".", true)))
    }

    #[tokio::test]
    async fn send_defaults_to_html() {
        let mut resp = context();
        resp.send("<p>hi</p>");
        assert!(resp.is_sent());

        let response = resp.into_response();
        assert_eq!(response.headers()[CONTENT_TYPE], "text/html; charset=utf-8");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, "<p>hi</p>");
    }

    #[test]
    fn explicit_content_type_is_kept() {
        let mut resp = context();
        resp.header("content-type", "text/css").send("a{}");
        assert_eq!(resp.headers()[CONTENT_TYPE], "text/css");
    }

    #[test]
    fn redirect_sets_location() {
        let mut resp = context();
        resp.redirect("/login");
        let response = resp.into_response();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[LOCATION], "/login");
    }

    #[test]
    fn cookies_are_appended() {
        let mut resp = context();
        resp.set_cookie("a", Some("1"), &CookieOptions::default());
        resp.clear_cookie("b", &CookieOptions::default());
        assert_eq!(resp.headers().get_all(SET_COOKIE).iter().count(), 2);
    }

    #[test]
    fn invalid_header_is_ignored() {
        let mut resp = context();
        resp.header("bad header", "x");
        assert!(resp.headers().is_empty());
    }

    #[test]
    fn error_page_is_escaped() {
        assert_eq!(escape_html("<a href=\"x\">"), "&lt;a href=&quot;x&quot;&gt;");
        let page = html_error_page(StatusCode::INTERNAL_SERVER_ERROR, "<boom>");
        let page = std::str::from_utf8(&page).unwrap();
        assert!(page.contains("Internal Server Error"));
        assert!(page.contains("&lt;boom&gt;"));
    }
}
