use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use hyper_util::service::TowerToHyperService;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{DialError, Result};

/// How long open connections get to finish once shutdown is requested.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// An HTTP listener that is bound up front and served later.
///
/// Binding happens before any task is spawned so that `DialService::start`
/// can fail fast, and so the bound (possibly ephemeral) port is known before
/// the routers that advertise it are built.
pub struct HttpWorker {
    name: &'static str,
    listener: TcpListener,
    drain_timeout: Duration,
}

impl HttpWorker {
    pub async fn bind(name: &'static str, addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| DialError::bind(name, addr, e))?;
        Ok(Self {
            name,
            listener,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        })
    }

    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| DialError::Network(format!("{} has no local address: {}", self.name, e)))
    }

    pub fn port(&self) -> Result<u16> {
        Ok(self.local_addr()?.port())
    }

    /// Serves `router` until `shutdown` fires. Open connections then get the
    /// drain timeout to finish and are aborted after it, so the returned task
    /// always ends. The listener is closed when it does.
    pub fn spawn(self, router: Router, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let Self {
                name,
                listener,
                drain_timeout,
            } = self;

            if let Ok(addr) = listener.local_addr() {
                info!("{} listening on http://{}", name, addr);
            }

            let mut connections = JoinSet::new();
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            debug!("{}: connection from {}", name, peer);
                            connections.spawn(serve_connection(stream, router.clone(), shutdown.clone()));
                        }
                        Err(e) => warn!("{}: accept failed: {}", name, e),
                    },
                    Some(_) = connections.join_next(), if !connections.is_empty() => {}
                }
            }
            drop(listener);

            let drained = tokio::time::timeout(drain_timeout, async {
                while connections.join_next().await.is_some() {}
            })
            .await;

            if drained.is_err() {
                warn!("{}: aborting {} connections that did not close", name, connections.len());
                connections.abort_all();
                while connections.join_next().await.is_some() {}
            }

            info!("{} stopped", name);
        })
    }
}

async fn serve_connection(stream: TcpStream, router: Router, shutdown: CancellationToken) {
    let builder = Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection(TokioIo::new(stream), TowerToHyperService::new(router));
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => {
            if let Err(e) = result {
                debug!("Connection ended with error: {}", e);
            }
            return;
        }
        _ = shutdown.cancelled() => {}
    }

    // Let an in-flight response finish, then close
    conn.as_mut().graceful_shutdown();
    if let Err(e) = conn.await {
        debug!("Connection ended with error during shutdown: {}", e);
    }
}
