//! Template cache with include resolution.
//!
//! Template names are paths: a name starting with `/` resolves against the server root,
//! any other name against the home directory. When caching is enabled the raw text of each
//! template is read once and kept until [`TemplateCache::clear`] or restart, otherwise it is
//! read again on every render.
//!
//! Before compilation every `{{> name }}` marker is replaced by the resolved text of the named
//! template. Resolution is recursive: included templates are scanned for markers as well, up
//! to [`MAX_INCLUDE_DEPTH`] levels. A cycle or a deeper chain resolves to an empty string.

mod engine;

pub use engine::{CompiledTemplate, PlaceholderEngine, TemplateEngine};

use crate::config::ServerConfig;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Value, json};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, warn};

pub const MAX_INCLUDE_DEPTH: usize = 8;

static INCLUDE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{>\s*([^\s}]+)\s*\}\}").expect("include pattern is valid"));

pub struct TemplateCache {
    root: PathBuf,
    home: PathBuf,
    enabled: bool,
    cache: DashMap<String, Arc<str>>,
    engine: ArcSwap<Box<dyn TemplateEngine>>,
    default_model: ArcSwap<Value>,
}

impl std::fmt::Debug for TemplateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateCache")
            .field("root", &self.root)
            .field("home", &self.home)
            .field("enabled", &self.enabled)
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl TemplateCache {
    pub fn new(root: impl Into<PathBuf>, home: impl Into<PathBuf>, enabled: bool) -> Self {
        let engine: Box<dyn TemplateEngine> = Box::new(PlaceholderEngine);
        Self {
            root: root.into(),
            home: home.into(),
            enabled,
            cache: DashMap::new(),
            engine: ArcSwap::from_pointee(engine),
            default_model: ArcSwap::from_pointee(json!({})),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(&config.root, &config.home, config.template_cache)
    }

    /// Replaces the compile function for the rest of the process lifetime.
    pub fn set_engine(&self, engine: impl TemplateEngine + 'static) {
        let engine: Box<dyn TemplateEngine> = Box::new(engine);
        self.engine.store(Arc::new(engine));
    }

    /// Replaces the process-wide default model. Keys given to a render call take precedence.
    pub fn set_model(&self, model: Value) {
        self.default_model.store(Arc::new(model));
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Number of cached templates.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Renders template `name`, compile or apply failures yield a JSON error object.
    pub async fn render(&self, name: &str, model: &Value) -> String {
        let text = self.resolve(name).await;
        let model = self.merged_model(model);
        let engine = self.engine.load_full();

        match engine.compile(&text).and_then(|compiled| compiled.render(&model)) {
            Ok(output) => output,
            Err(e) => {
                error!(template = name, cause = %e, "failed to render template");
                json!({ "error": e.to_string(), "template": name }).to_string()
            }
        }
    }

    /// Renders the template named after a request path, without query and leading separator.
    pub async fn render_path(&self, request_path: &str, model: &Value) -> String {
        let path = crate::router::matcher::strip_query(request_path);
        self.render(path.trim_start_matches('/'), model).await
    }

    /// Raw text of `name` with every include substituted.
    pub async fn resolve(&self, name: &str) -> String {
        let mut stack = Vec::new();
        self.expand(name, &mut stack).await
    }

    fn expand<'a>(&'a self, name: &'a str, stack: &'a mut Vec<String>) -> BoxFuture<'a, String> {
        Box::pin(async move {
            if stack.iter().any(|parent| parent == name) {
                warn!(template = name, chain = ?stack, "include cycle");
                return String::new();
            }
            if stack.len() > MAX_INCLUDE_DEPTH {
                warn!(template = name, depth = stack.len(), "include chain too deep");
                return String::new();
            }

            let source = self.source(name).await;
            let includes: Vec<(usize, usize, String)> = INCLUDE
                .captures_iter(&source)
                .filter_map(|captures| {
                    let whole = captures.get(0)?;
                    Some((whole.start(), whole.end(), captures.get(1)?.as_str().to_string()))
                })
                .collect();

            if includes.is_empty() {
                return source.to_string();
            }

            stack.push(name.to_string());
            let mut output = String::with_capacity(source.len());
            let mut last = 0;
            for (start, end, included) in includes {
                output.push_str(&source[last..start]);
                output.push_str(&self.expand(&included, stack).await);
                last = end;
            }
            output.push_str(&source[last..]);
            stack.pop();

            output
        })
    }

    /// Raw text of `name`, from the cache when enabled. A missing template is an empty string.
    pub async fn source(&self, name: &str) -> Arc<str> {
        if self.enabled
            && let Some(cached) = self.cache.get(name)
        {
            return Arc::clone(cached.value());
        }

        let Some(path) = self.path_of(name) else {
            warn!(template = name, "rejected template name");
            return Arc::from("");
        };

        match tokio::fs::read_to_string(&path).await {
            Ok(text) => {
                debug!(template = name, path = %path.display(), "read template");
                let text: Arc<str> = Arc::from(text);
                if self.enabled {
                    self.cache.insert(name.to_string(), Arc::clone(&text));
                }
                text
            }
            Err(e) => {
                warn!(template = name, path = %path.display(), cause = %e, "template not found");
                Arc::from("")
            }
        }
    }

    fn path_of(&self, name: &str) -> Option<PathBuf> {
        let (base, relative) = match name.strip_prefix('/') {
            Some(relative) => (&self.root, relative),
            None => (&self.home, name),
        };
        let relative = Path::new(relative);
        if relative.components().any(|c| !matches!(c, Component::Normal(_) | Component::CurDir)) {
            return None;
        }
        Some(base.join(relative))
    }

    fn merged_model(&self, model: &Value) -> Value {
        let defaults = self.default_model.load();
        match (defaults.as_ref(), model) {
            (Value::Object(defaults), Value::Object(model)) => {
                let mut merged = defaults.clone();
                merged.extend(model.iter().map(|(k, v)| (k.clone(), v.clone())));
                Value::Object(merged)
            }
            (_, model) => model.clone(),
        }
    }
}
