//! Cookie wire format.
//!
//! Request side: every `Cookie` header is split on `;` and then on the first `=`, names and
//! values are trimmed. Malformed pairs are skipped.
//!
//! Response side: one `Set-Cookie` line per cookie with optional `Expires`, `Path`, `Domain`,
//! `Secure` and `HttpOnly` attributes. Setting no value expires the cookie immediately.

use cookie::Cookie;
use http::HeaderMap;
use std::collections::HashMap;
use std::time::SystemTime;
use time::OffsetDateTime;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieOptions {
    pub expires: Option<SystemTime>,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub secure: bool,
    pub http_only: bool,
}

impl CookieOptions {
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn expires(mut self, expires: SystemTime) -> Self {
        self.expires = Some(expires);
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }
}

/// Collects all request cookies into a name to value map.
pub fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .get_all(http::header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .map(|cookie| (cookie.name().to_string(), cookie.value().to_string()))
        .collect()
}

/// Renders a `Set-Cookie` header value. `None` as value produces a removal cookie.
pub fn set_cookie_line(name: &str, value: Option<&str>, options: &CookieOptions) -> String {
    let mut builder = Cookie::build((name.to_string(), value.unwrap_or_default().to_string()))
        .secure(options.secure)
        .http_only(options.http_only);

    if let Some(path) = &options.path {
        builder = builder.path(path.clone());
    }
    if let Some(domain) = &options.domain {
        builder = builder.domain(domain.clone());
    }
    if let Some(expires) = options.expires {
        builder = builder.expires(OffsetDateTime::from(expires));
    }

    let mut cookie = builder.build();
    if value.is_none() {
        cookie.make_removal();
    }
    cookie.to_string()
}
