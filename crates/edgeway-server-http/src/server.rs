//! HTTP/1.1 server with upgrade support and bounded shutdown

use crate::dispatch::Dispatcher;
use crate::fallback::FallbackPage;
use crate::status::StatusRecorder;
use crate::tunnel::Tunnel;
use edgeway_router::{Route, RoutingTable};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// HTTP server errors
#[derive(Debug, Error)]
pub enum HttpServerError {
    #[error("Failed to bind to {address}: {reason}")]
    BindError { address: SocketAddr, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub bind_addr: SocketAddr,
    /// Host that always gets the fallback page
    pub menu_host: Option<String>,
}

/// HTTP server serving one task per connection
pub struct HttpServer {
    listener: TcpListener,
    dispatcher: Dispatcher,
    shutdown: CancellationToken,
    force: CancellationToken,
    tracker: TaskTracker,
}

impl HttpServer {
    /// Bind the listener; connections are not accepted until [`run`](Self::run)
    pub async fn bind(
        config: HttpServerConfig,
        routes: Arc<RoutingTable<Route>>,
        fallback: Arc<dyn FallbackPage>,
    ) -> Result<Self, HttpServerError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|e| HttpServerError::BindError {
                address: config.bind_addr,
                reason: e.to_string(),
            })?;

        info!("HTTP server listening on {}", listener.local_addr()?);

        let shutdown = CancellationToken::new();
        let force = CancellationToken::new();
        let tracker = TaskTracker::new();

        let tunnel = Tunnel::new(tracker.clone(), force.clone());
        let mut dispatcher = Dispatcher::new(routes, fallback, tunnel);
        if let Some(menu_host) = &config.menu_host {
            info!("Menu available at http://{}", menu_host);
            dispatcher = dispatcher.with_menu_host(menu_host);
        }

        Ok(Self {
            listener,
            dispatcher,
            shutdown,
            force,
            tracker,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, HttpServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until shutdown is requested
    pub async fn run(&self) -> Result<(), HttpServerError> {
        loop {
            let (stream, peer) = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
            };

            debug!("Accepted HTTP connection from {}", peer);

            let dispatcher = self.dispatcher.clone();
            let shutdown = self.shutdown.clone();
            let force = self.force.clone();

            self.tracker.spawn(async move {
                serve_connection(stream, peer, dispatcher, shutdown, force).await;
            });
        }

        info!("HTTP server stopped accepting connections");
        Ok(())
    }

    /// Stop accepting, let in-flight requests and tunnels finish for up to
    /// `deadline`, then force-close whatever is left
    ///
    /// Returns `true` when everything finished within the deadline.
    pub async fn shutdown(&self, deadline: Duration) -> bool {
        info!("Shutting down HTTP server...");
        self.shutdown.cancel();
        self.tracker.close();

        let drained = tokio::time::timeout(deadline, self.tracker.wait())
            .await
            .is_ok();
        if !drained {
            warn!(
                pending = self.tracker.len(),
                "HTTP shutdown deadline reached, closing remaining connections"
            );
            self.force.cancel();
            self.tracker.wait().await;
        }
        drained
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    dispatcher: Dispatcher,
    shutdown: CancellationToken,
    force: CancellationToken,
) {
    let service = StatusRecorder::new(
        service_fn(move |request| {
            let dispatcher = dispatcher.clone();
            async move { Ok::<_, Infallible>(dispatcher.handle(request, peer).await) }
        }),
        peer,
    );

    let connection = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .with_upgrades();
    tokio::pin!(connection);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        _ = shutdown.cancelled() => {
            connection.as_mut().graceful_shutdown();
            tokio::select! {
                result = connection.as_mut() => result,
                _ = force.cancelled() => {
                    debug!("Force closing connection from {}", peer);
                    return;
                }
            }
        }
    };

    if let Err(e) = result {
        debug!("HTTP connection error from {}: {}", peer, e);
    }
}
