//! Static file fallback.
//!
//! Requests no handler claimed are resolved against the home directory:
//!
//! - a file is streamed with `Last-Modified`; with caching enabled an `If-Modified-Since`
//!   not older than the modification time (compared in whole seconds) answers 304
//! - a directory serves its default page, redirecting first to add a missing trailing
//!   slash; without a default page it is listed when listing is enabled, 403 otherwise
//! - anything else answers 404 with the configured template or a plain text body

use crate::config::ServerConfig;
use crate::body::ResponseBody;
use crate::error::EngineError;
use crate::request::RequestContext;
use crate::response::{ResponseContext, escape_html};
use async_trait::async_trait;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, IF_MODIFIED_SINCE, LAST_MODIFIED};
use http::{HeaderMap, StatusCode};
use mime::Mime;
use serde_json::json;
use std::ffi::OsStr;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

const NOT_FOUND_BODY: &str = "File not found!";

/// Renders the HTML listing of a directory.
#[async_trait]
pub trait DirectoryLister: Send + Sync {
    async fn list(&self, dir: &Path, request_path: &str) -> Result<String, EngineError>;
}

/// Plain `<ul>` listing, directories first, names sorted.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlLister;

#[async_trait]
impl DirectoryLister for HtmlLister {
    async fn list(&self, dir: &Path, request_path: &str) -> Result<String, EngineError> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
            names.push((!is_dir, entry.file_name().to_string_lossy().into_owned()));
        }
        names.sort();

        let base = if request_path.ends_with('/') { request_path.to_string() } else { format!("{request_path}/") };
        let title = escape_html(&base);
        let mut html = format!("<!DOCTYPE html><html><head><title>Index of {title}</title></head><body><h1>Index of {title}</h1><ul>");
        if base != "/" {
            html.push_str("<li><a href=\"../\">../</a></li>");
        }
        for (is_file, name) in names {
            let suffix = if is_file { "" } else { "/" };
            html.push_str(&format!(
                "<li><a href=\"{}{}{suffix}\">{}{suffix}</a></li>",
                escape_html(&base),
                urlencoding::encode(&name),
                escape_html(&name)
            ));
        }
        html.push_str("</ul></body></html>");
        Ok(html)
    }
}

pub(crate) struct StaticFiles {
    home: PathBuf,
    cache: bool,
    list_dir: bool,
    default_page: Option<String>,
    not_found: Option<String>,
    lister: Arc<dyn DirectoryLister>,
}

impl StaticFiles {
    pub(crate) fn new(config: &ServerConfig, lister: Arc<dyn DirectoryLister>) -> Self {
        Self {
            home: config.home.clone(),
            cache: config.cache,
            list_dir: config.list_dir,
            default_page: config.default_page.clone().filter(|page| !page.is_empty()),
            not_found: config.not_found.clone(),
            lister,
        }
    }

    pub(crate) async fn serve(&self, req: &RequestContext, resp: &mut ResponseContext) {
        let Some(relative) = sanitize(req.path()) else {
            debug!(path = %req.path(), "rejected static path");
            return self.not_found(req.path(), resp).await;
        };

        let path = self.home.join(relative);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => self.serve_dir(&path, req, resp).await,
            Ok(meta) => self.serve_file(&path, &meta, req, resp).await,
            Err(e) => {
                debug!(path = %path.display(), cause = %e, "static file not found");
                self.not_found(req.path(), resp).await;
            }
        }
    }

    /// Serves a fixed file, relative paths resolve against the home directory.
    pub(crate) async fn serve_path(&self, path: &Path, req: &RequestContext, resp: &mut ResponseContext) {
        let path = if path.is_absolute() { path.to_path_buf() } else { self.home.join(path) };
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => self.serve_file(&path, &meta, req, resp).await,
            _ => {
                warn!(path = %path.display(), "file handler target is not a file");
                self.not_found(req.path(), resp).await;
            }
        }
    }

    async fn serve_dir(&self, dir: &Path, req: &RequestContext, resp: &mut ResponseContext) {
        if let Some(page) = &self.default_page {
            let index = dir.join(page);
            if let Ok(meta) = tokio::fs::metadata(&index).await
                && meta.is_file()
            {
                let path = req.path();
                if !path.ends_with('/') {
                    let location = match req.uri().query() {
                        Some(query) => format!("{path}/?{query}"),
                        None => format!("{path}/"),
                    };
                    resp.redirect_with(StatusCode::MOVED_PERMANENTLY, &location);
                    return;
                }
                return self.serve_file(&index, &meta, req, resp).await;
            }
        }

        if !self.list_dir {
            resp.status(StatusCode::FORBIDDEN).send_text("Forbidden");
            return;
        }

        match self.lister.list(dir, req.path()).await {
            Ok(html) => resp.send(html),
            Err(e) => {
                warn!(dir = %dir.display(), cause = %e, "failed to list directory");
                self.not_found(req.path(), resp).await;
            }
        }
    }

    async fn serve_file(&self, path: &Path, meta: &Metadata, req: &RequestContext, resp: &mut ResponseContext) {
        let modified = meta.modified().ok();

        if self.cache
            && let Some(modified) = modified
            && let Some(since) = if_modified_since(req.headers())
            && unix_secs(since) >= unix_secs(modified)
        {
            resp.end(StatusCode::NOT_MODIFIED);
            return;
        }

        let file = match tokio::fs::File::open(path).await {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %path.display(), cause = %e, "failed to open static file");
                return self.not_found(req.path(), resp).await;
            }
        };

        resp.header(CONTENT_TYPE, content_type(path).as_ref()).header(CONTENT_LENGTH, meta.len());
        if let Some(modified) = modified {
            resp.header(LAST_MODIFIED, httpdate::fmt_http_date(modified));
        }
        resp.send_body(ResponseBody::file(file));
    }

    async fn not_found(&self, path: &str, resp: &mut ResponseContext) {
        resp.status(StatusCode::NOT_FOUND);
        match &self.not_found {
            Some(template) => resp.render(template, &json!({ "path": path })).await,
            None => resp.send_text(NOT_FOUND_BODY),
        }
    }
}

/// Percent-decodes the request path into a relative path, `None` when it tries to escape.
fn sanitize(request_path: &str) -> Option<PathBuf> {
    let decoded = urlencoding::decode(request_path).ok()?;
    let mut relative = PathBuf::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => return None,
            segment if segment.contains(['\\', '\0']) => return None,
            segment => relative.push(segment),
        }
    }
    Some(relative)
}

fn if_modified_since(headers: &HeaderMap) -> Option<SystemTime> {
    let value = headers.get(IF_MODIFIED_SINCE)?.to_str().ok()?;
    httpdate::parse_http_date(value).ok()
}

fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs())
}

/// Content type by file extension, `application/octet-stream` when unknown.
pub fn content_type(path: &Path) -> Mime {
    let extension = path.extension().and_then(OsStr::to_str).map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("html" | "htm") => mime::TEXT_HTML_UTF_8,
        Some("css") => mime::TEXT_CSS_UTF_8,
        Some("js" | "mjs") => mime::APPLICATION_JAVASCRIPT_UTF_8,
        Some("json") => mime::APPLICATION_JSON,
        Some("txt") => mime::TEXT_PLAIN_UTF_8,
        Some("csv") => mime::TEXT_CSV_UTF_8,
        Some("xml") => mime::TEXT_XML,
        Some("png") => mime::IMAGE_PNG,
        Some("jpg" | "jpeg") => mime::IMAGE_JPEG,
        Some("gif") => mime::IMAGE_GIF,
        Some("bmp") => mime::IMAGE_BMP,
        Some("svg") => mime::IMAGE_SVG,
        Some("woff") => mime::FONT_WOFF,
        Some("woff2") => mime::FONT_WOFF2,
        Some("pdf") => mime::APPLICATION_PDF,
        Some("ico") => "image/x-icon".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM),
        Some("wasm") => "application/wasm".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM),
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}

#[cfg(test)]
mod tests {
    use super::{DirectoryLister, HtmlLister, content_type, sanitize};
    use std::path::{Path, PathBuf};

    #[test]
    fn sanitize_rejects_parent_segments() {
        assert_eq!(sanitize("/a/./b/"), Some(PathBuf::from("a/b")));
        assert_eq!(sanitize("/my%20file.txt"), Some(PathBuf::from("my file.txt")));
        assert_eq!(sanitize("/"), Some(PathBuf::new()));
        assert!(sanitize("/a/../../etc/passwd").is_none());
        assert!(sanitize("/%2e%2e/secret").is_none());
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type(Path::new("index.HTML")), mime::TEXT_HTML_UTF_8);
        assert_eq!(content_type(Path::new("app.js")), mime::APPLICATION_JAVASCRIPT_UTF_8);
        assert_eq!(content_type(Path::new("favicon.ico")).as_ref(), "image/x-icon");
        assert_eq!(content_type(Path::new("archive.tar.gz")), mime::APPLICATION_OCTET_STREAM);
        assert_eq!(content_type(Path::new("Makefile")), mime::APPLICATION_OCTET_STREAM);
    }

    #[tokio::test]
    async fn lists_directories_first() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("zdir")).unwrap();
        std::fs::write(tmp.path().join("a <b>.txt"), "").unwrap();

        let html = HtmlLister.list(tmp.path(), "/files").await.unwrap();
        let dir = html.find("zdir/").unwrap();
        let file = html.find("a &lt;b&gt;.txt").unwrap();
        assert!(dir < file);
        assert!(html.contains("href=\"/files/a%20%3Cb%3E.txt\""));
        assert!(html.contains("href=\"../\""));
    }
}
