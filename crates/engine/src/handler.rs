use crate::chain::Next;
use crate::error::HandlerResult;
use crate::request::RequestContext;
use crate::response::ResponseContext;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::path::PathBuf;
use std::sync::Arc;

/// Endpoint bound to a handler rule.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn invoke(&self, req: &mut RequestContext, resp: &mut ResponseContext) -> HandlerResult;
}

/// Filter bound to a filter rule.
///
/// The chain only continues when the filter runs `next`; returning without doing so
/// halts the chain and the response is whatever the filter wrote.
#[async_trait]
pub trait FilterHandler: Send + Sync {
    async fn invoke(&self, req: &mut RequestContext, resp: &mut ResponseContext, next: Next<'_>) -> HandlerResult;
}

/// What a handler rule routes to, resolved once at registration.
#[derive(Clone)]
pub enum Handler {
    Function(Arc<dyn RequestHandler>),
    /// Sent as an HTML body.
    Content(String),
    /// Served as a static file, relative paths resolve against the home directory.
    File(PathBuf),
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Handler::Function(_) => f.write_str("Handler::Function"),
            Handler::Content(content) => f.debug_tuple("Handler::Content").field(&content.len()).finish(),
            Handler::File(path) => f.debug_tuple("Handler::File").field(path).finish(),
        }
    }
}

impl Handler {
    pub fn content(content: impl Into<String>) -> Self {
        Handler::Content(content.into())
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Handler::File(path.into())
    }
}

impl<H: RequestHandler + 'static> From<H> for Handler {
    fn from(handler: H) -> Self {
        Handler::Function(Arc::new(handler))
    }
}

/// a closure holder implementing [`RequestHandler`]
pub struct FnHandler<F> {
    f: F,
}

/// Wraps a closure returning a boxed future into a [`RequestHandler`].
///
/// ```ignore
/// handler_fn(|req, resp| Box::pin(async move {
///     resp.send(format!("id: {}", req.param("id").unwrap_or_default()));
///     Ok(())
/// }))
/// ```
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: for<'a> Fn(&'a mut RequestContext, &'a mut ResponseContext) -> BoxFuture<'a, HandlerResult> + Send + Sync,
{
    FnHandler { f }
}

#[async_trait]
impl<F> RequestHandler for FnHandler<F>
where
    F: for<'a> Fn(&'a mut RequestContext, &'a mut ResponseContext) -> BoxFuture<'a, HandlerResult> + Send + Sync,
{
    async fn invoke(&self, req: &mut RequestContext, resp: &mut ResponseContext) -> HandlerResult {
        (self.f)(req, resp).await
    }
}

/// a closure holder implementing [`FilterHandler`]
pub struct FnFilter<F> {
    f: F,
}

pub fn filter_fn<F>(f: F) -> FnFilter<F>
where
    F: for<'a> Fn(&'a mut RequestContext, &'a mut ResponseContext, Next<'a>) -> BoxFuture<'a, HandlerResult> + Send + Sync,
{
    FnFilter { f }
}

#[async_trait]
impl<F> FilterHandler for FnFilter<F>
where
    F: for<'a> Fn(&'a mut RequestContext, &'a mut ResponseContext, Next<'a>) -> BoxFuture<'a, HandlerResult> + Send + Sync,
{
    async fn invoke(&self, req: &mut RequestContext, resp: &mut ResponseContext, next: Next<'_>) -> HandlerResult {
        (self.f)(req, resp, next).await
    }
}

impl<F> std::fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnHandler")
    }
}

impl<F> std::fmt::Debug for FnFilter<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnFilter")
    }
}
