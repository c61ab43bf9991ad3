use crate::engine::Engine;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

pub struct ServerBuilder {
    engine: Option<Engine>,
    address: Option<Vec<SocketAddr>>,
}

impl std::fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBuilder").field("address", &self.address).finish_non_exhaustive()
    }
}

impl ServerBuilder {
    fn new() -> Self {
        Self { engine: None, address: None }
    }

    pub fn address<A: ToSocketAddrs>(mut self, address: A) -> Self {
        match address.to_socket_addrs() {
            Ok(addresses) => self.address = Some(addresses.collect()),
            Err(e) => error!(cause = %e, "invalid server address"),
        }
        self
    }

    /// Sets the engine and, unless already set, the address from its `host` and `port`.
    pub fn engine(mut self, engine: Engine) -> Self {
        if self.address.is_none() {
            let config = engine.config();
            self = self.address((config.host.as_str(), config.port));
        }
        self.engine = Some(engine);
        self
    }

    pub fn build(self) -> Result<Server, ServerBuildError> {
        let engine = self.engine.ok_or(ServerBuildError::MissingEngine)?;
        let address = self.address.filter(|a| !a.is_empty()).ok_or(ServerBuildError::MissingAddress)?;
        Ok(Server { engine, address })
    }
}

#[derive(Debug)]
pub struct Server {
    engine: Engine,
    address: Vec<SocketAddr>,
}

#[derive(Error, Debug)]
pub enum ServerBuildError {
    #[error("engine must be set")]
    MissingEngine,
    #[error("address must be set")]
    MissingAddress,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Accepts connections until the listener fails to bind. Each connection is served on its
    /// own task; a failing connection never stops the accept loop.
    pub async fn start(self) -> io::Result<()> {
        let level = if self.engine.config().debug { Level::DEBUG } else { Level::INFO };
        let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
        if tracing::subscriber::set_global_default(subscriber).is_err() {
            debug!("global subscriber already installed");
        }

        if self.engine.config().https_enabled() {
            warn!("https settings are ignored, terminate TLS in front of this server");
        }

        info!("start listening at {:?}", self.address);
        let tcp_listener = match TcpListener::bind(self.address.as_slice()).await {
            Ok(tcp_listener) => tcp_listener,
            Err(e) => {
                error!(cause = %e, "bind server error");
                return Err(e);
            }
        };

        loop {
            let (tcp_stream, remote_addr) = match tcp_listener.accept().await {
                Ok(stream_and_addr) => stream_and_addr,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            };

            let engine = self.engine.clone();
            tokio::spawn(async move {
                let service = service_fn(move |request| {
                    let engine = engine.clone();
                    async move { Ok::<_, Infallible>(engine.handle(request).await) }
                });

                match http1::Builder::new().serve_connection(TokioIo::new(tcp_stream), service).await {
                    Ok(()) => debug!(%remote_addr, "connection closed"),
                    Err(e) => warn!(%remote_addr, cause = %e, "connection error"),
                }
            });
        }
    }
}
