use crate::body::{OptionReqBody, ResponseBody};
use crate::chain::{FilterChain, FilterRule};
use crate::config::ServerConfig;
use crate::date::DateService;
use crate::dispatch::{Dispatcher, HandlerRule};
use crate::error::BoxError;
use crate::handler::{FilterHandler, Handler};
use crate::pipeline::Pipeline;
use crate::request::RequestContext;
use crate::response::ResponseContext;
use crate::router::matcher::Pattern;
use crate::router::{Rule, RuleOptions};
use crate::session::{SessionManager, SessionStore};
use crate::static_files::{DirectoryLister, HtmlLister, StaticFiles};
use crate::template::{TemplateCache, TemplateEngine};
use crate::upload::{FormDecoder, UrlEncodedFormDecoder};
use bytes::Bytes;
use http::header::DATE;
use http::{Request, Response, StatusCode};
use http_body::Body as HttpBody;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// One server instance: registries, session manager and template cache.
///
/// Cloning is cheap, all clones share the same state.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

struct Inner {
    config: Arc<ServerConfig>,
    chain: FilterChain,
    sessions: Arc<SessionManager>,
    templates: Arc<TemplateCache>,
    request_timeout: Duration,
    date: DateService,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").field("config", &self.inner.config).finish_non_exhaustive()
    }
}

impl Engine {
    pub fn builder(config: ServerConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.inner.sessions
    }

    pub fn templates(&self) -> &Arc<TemplateCache> {
        &self.inner.templates
    }

    /// Processes one request: filter chain, handler dispatch or static fallback, then
    /// session persistence. Bounded by the configured request timeout, which answers 503.
    pub async fn handle<B>(&self, request: Request<B>) -> Response<ResponseBody>
    where
        B: HttpBody<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = request.into_parts();
        let mut req = RequestContext::new(parts, OptionReqBody::new(body));
        let mut resp = ResponseContext::new(req.path(), Arc::clone(&self.inner.templates));

        let processed = tokio::time::timeout(self.inner.request_timeout, async {
            self.inner.chain.start(&mut req, &mut resp).await;
            self.inner.sessions.persist(&mut req).await;
        })
        .await;

        let mut response = match processed {
            Ok(()) => resp.into_response(),
            Err(_) => {
                warn!(method = %req.method(), path = %req.path(), timeout = ?self.inner.request_timeout, "request timed out");
                let mut response = Response::new(ResponseBody::empty());
                *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
                response
            }
        };

        if let Some(date) = self.inner.date.http_date() {
            response.headers_mut().insert(DATE, date);
        }
        debug!(method = %req.method(), path = %req.path(), version = ?req.version(), status = %response.status(), "request processed");
        response
    }
}

/// Collects rules and collaborators; registries are frozen by [`EngineBuilder::build`].
pub struct EngineBuilder {
    config: ServerConfig,
    filters: Vec<FilterRule>,
    upload_filters: usize,
    handlers: Vec<HandlerRule>,
    store: Option<Box<dyn SessionStore>>,
    template_engine: Option<Box<dyn TemplateEngine>>,
    form_decoder: Arc<dyn FormDecoder>,
    lister: Arc<dyn DirectoryLister>,
}

impl std::fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("filters", &self.filters.len())
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

impl EngineBuilder {
    fn new(config: ServerConfig) -> Self {
        Self {
            config,
            filters: Vec::new(),
            upload_filters: 0,
            handlers: Vec::new(),
            store: None,
            template_engine: None,
            form_decoder: Arc::new(UrlEncodedFormDecoder),
            lister: Arc::new(HtmlLister),
        }
    }

    /// Appends a filter. Upload filters go after the upload filters already registered and
    /// before every ordinary filter.
    pub fn filter<P, F>(mut self, pattern: P, filter: F, options: RuleOptions) -> Self
    where
        P: Into<Pattern>,
        F: FilterHandler + 'static,
    {
        let upload = options.requires_upload();
        let rule: FilterRule = Rule::new(pattern.into(), Arc::new(filter), options);
        if upload {
            self.filters.insert(self.upload_filters, rule);
            self.upload_filters += 1;
        } else {
            self.filters.push(rule);
        }
        self
    }

    pub fn handler<P, H>(mut self, pattern: P, handler: H, options: RuleOptions) -> Self
    where
        P: Into<Pattern>,
        H: Into<Handler>,
    {
        self.handlers.push(Rule::new(pattern.into(), handler.into(), options));
        self
    }

    /// Replaces the store chosen from the configuration.
    pub fn session_store(mut self, store: impl SessionStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    pub fn template_engine(mut self, engine: impl TemplateEngine + 'static) -> Self {
        self.template_engine = Some(Box::new(engine));
        self
    }

    pub fn form_decoder(mut self, decoder: impl FormDecoder + 'static) -> Self {
        self.form_decoder = Arc::new(decoder);
        self
    }

    pub fn directory_lister(mut self, lister: impl DirectoryLister + 'static) -> Self {
        self.lister = Arc::new(lister);
        self
    }

    pub fn build(self) -> Engine {
        let config = Arc::new(self.config);

        let sessions = Arc::new(match self.store {
            Some(store) => SessionManager::with_store(&config, store),
            None => SessionManager::from_config(&config),
        });

        let templates = Arc::new(TemplateCache::from_config(&config));
        if let Some(engine) = self.template_engine {
            templates.set_engine(engine);
        }

        let pipeline = Pipeline::new(config.show_error, config.upload_dir(), Arc::clone(&sessions), self.form_decoder);
        let dispatcher = Dispatcher::new(self.handlers, StaticFiles::new(&config, self.lister));
        let chain = FilterChain::new(self.filters, pipeline, dispatcher);

        Engine {
            inner: Arc::new(Inner {
                request_timeout: config.request_timeout(),
                config,
                chain,
                sessions,
                templates,
                date: DateService::new(),
            }),
        }
    }
}
