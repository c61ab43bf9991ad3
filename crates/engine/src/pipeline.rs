//! Per-rule request preparation and guarded invocation.
//!
//! For every matched function rule the stages run strictly in this order, each skipped when
//! its precondition is already satisfied by an earlier rule of the same request:
//!
//! 1. pre-check, a `false` predicate answers 403
//! 2. cookies, always
//! 3. form/upload decoding, for upload rules without a parsed body; failure answers 400
//! 4. body decoding, for rules with a post mode and no parsed body; failure yields `{}`
//! 5. session hydration, for session rules without a session
//!
//! Invocation is then guarded: an `Err` or a panic is logged and answered with 500. A filter
//! failing after the chain it continued has already sent a response keeps that response.

use crate::chain::Next;
use crate::cookies::parse_cookies;
use crate::error::HandlerResult;
use crate::handler::{FilterHandler, RequestHandler};
use crate::request::RequestContext;
use crate::response::{ResponseContext, html_error_page};
use crate::router::{PostMode, RuleOptions};
use crate::session::SessionManager;
use crate::upload::{FormDecoder, pairs_to_map};
use futures::FutureExt;
use http::StatusCode;
use serde_json::{Value, json};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, warn};

pub(crate) struct Pipeline {
    show_error: bool,
    upload_dir: PathBuf,
    sessions: Arc<SessionManager>,
    form_decoder: Arc<dyn FormDecoder>,
}

impl Pipeline {
    pub(crate) fn new(
        show_error: bool,
        upload_dir: PathBuf,
        sessions: Arc<SessionManager>,
        form_decoder: Arc<dyn FormDecoder>,
    ) -> Self {
        Self { show_error, upload_dir, sessions, form_decoder }
    }

    /// Runs the preparation stages, `false` when the request was answered and must stop here.
    pub(crate) async fn prepare(&self, options: &RuleOptions, req: &mut RequestContext, resp: &mut ResponseContext) -> bool {
        if !options.check(req) {
            debug!(path = %req.path(), "pre-check rejected request");
            resp.status(StatusCode::FORBIDDEN).send_text("Forbidden");
            return false;
        }

        let cookies = parse_cookies(req.headers());
        req.set_cookies(cookies);

        if options.requires_upload() && !req.has_parsed_body() {
            match self.form_decoder.decode(req.headers(), req.body(), &self.upload_dir).await {
                Ok(form) => {
                    req.set_parsed_body(Value::Object(form.fields));
                    req.set_files(form.files);
                }
                Err(e) => {
                    warn!(path = %req.path(), cause = %e, "failed to decode form");
                    resp.status(StatusCode::BAD_REQUEST).send_text("Bad Request");
                    return false;
                }
            }
        }

        if options.post_mode() != PostMode::None && !req.has_parsed_body() {
            let parsed = parse_body(options.post_mode(), req).await;
            req.set_parsed_body(parsed);
        }

        if options.requires_session() && !req.has_session() {
            self.sessions.hydrate(req, resp).await;
        }

        true
    }

    pub(crate) async fn run_handler(&self, handler: &dyn RequestHandler, req: &mut RequestContext, resp: &mut ResponseContext) {
        let path = req.path().to_string();
        let outcome = guarded(handler.invoke(req, resp)).await;
        self.settle(&path, outcome, resp, false);
    }

    pub(crate) async fn run_filter(
        &self,
        filter: &dyn FilterHandler,
        req: &mut RequestContext,
        resp: &mut ResponseContext,
        next: Next<'_>,
    ) {
        let path = req.path().to_string();
        let outcome = guarded(filter.invoke(req, resp, next)).await;
        self.settle(&path, outcome, resp, true);
    }

    /// Turns a failed invocation into a 500. With `keep_sent`, a response already completed
    /// (for example by the handler a filter continued to) is left untouched and only logged.
    fn settle(
        &self,
        path: &str,
        outcome: Result<HandlerResult, Box<dyn Any + Send>>,
        resp: &mut ResponseContext,
        keep_sent: bool,
    ) {
        let message = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => {
                error!(path, cause = %e, "handler failed");
                e.to_string()
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(path, panic = %message, "handler panicked");
                message
            }
        };

        if keep_sent && resp.is_sent() {
            warn!(path, status = %resp.status_code(), "filter failed after the response was sent, keeping it");
            return;
        }

        if self.show_error {
            resp.status(StatusCode::INTERNAL_SERVER_ERROR)
                .send_html(html_error_page(StatusCode::INTERNAL_SERVER_ERROR, &message));
        } else {
            resp.end(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }
}

async fn guarded<F>(fut: F) -> Result<HandlerResult, Box<dyn Any + Send>>
where
    F: Future<Output = HandlerResult>,
{
    AssertUnwindSafe(fut).catch_unwind().await
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}

/// Buffers and decodes the body, anything undecodable becomes an empty object.
async fn parse_body(mode: PostMode, req: &RequestContext) -> Value {
    let bytes = match req.body().collect().await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path = %req.path(), cause = %e, "failed to read body");
            return json!({});
        }
    };

    let parsed = match mode {
        PostMode::Json => serde_json::from_slice(&bytes).map_err(|e| e.to_string()),
        PostMode::QueryString => serde_urlencoded::from_bytes::<Vec<(String, String)>>(&bytes)
            .map(|pairs| Value::Object(pairs_to_map(pairs)))
            .map_err(|e| e.to_string()),
        PostMode::None => return json!({}),
    };

    parsed.unwrap_or_else(|cause| {
        debug!(path = %req.path(), cause = %cause, "lenient body decode");
        json!({})
    })
}
