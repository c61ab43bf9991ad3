//! An embeddable HTTP request-processing engine.
//!
//! A request runs through an ordered filter chain, is dispatched to the first matching
//! handler and otherwise falls back to static files. Along the way a per-rule pipeline parses
//! cookies, forms and bodies and hydrates the session; responses are written through a
//! [`ResponseContext`] and may render cached templates.
//!
//! ```ignore
//! let engine = Engine::builder(ServerConfig::load("site.toml")?)
//!     .handler("/home/:id", handler_fn(|req, resp| Box::pin(async move {
//!         resp.send(req.param("id").unwrap_or_default().to_string());
//!         Ok(())
//!     })), RuleOptions::new())
//!     .build();
//! Server::builder().engine(engine).build()?.start().await?;
//! ```

mod body;
mod chain;
mod config;
mod cookies;
mod date;
mod dispatch;
mod engine;
mod error;
mod handler;
mod pipeline;
mod request;
mod response;
mod server;
mod static_files;
mod upload;

pub mod router;
pub mod session;
pub mod template;

pub use body::{OptionReqBody, RequestBody, ResponseBody};
pub use chain::Next;
pub use config::ServerConfig;
pub use cookies::{CookieOptions, parse_cookies, set_cookie_line};
pub use engine::{Engine, EngineBuilder};
pub use error::{BoxError, ConfigError, EngineError, HandlerResult};
pub use handler::{FilterHandler, FnFilter, FnHandler, Handler, RequestHandler, filter_fn, handler_fn};
pub use request::{ActiveSession, PathParams, RequestContext};
pub use response::ResponseContext;
pub use router::matcher::{MatchMode, Pattern};
pub use router::{PostMode, RuleOptions};
pub use server::{Server, ServerBuildError, ServerBuilder};
pub use static_files::{DirectoryLister, HtmlLister, content_type};
pub use upload::{FormData, FormDecoder, UploadedFile, UrlEncodedFormDecoder};
