//! WebSocket tunnel between a client and a route destination
//!
//! The destination is dialed first; only when that succeeds is the client's
//! upgrade accepted. Two relay tasks then copy data and close frames, one
//! per direction; ping/pong stay on the leg they arrived on. The first task
//! to stop ends the session and both connections are dropped.

use crate::proxy::join_path;
use crate::{empty, text_response, Body};
use edgeway_router::Route;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use http::header::{self, HeaderMap, HeaderValue};
use http::{Request, Response, StatusCode, Uri};
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{Connector, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use url::Url;

/// Inbound headers that belong to the client's own handshake
const HANDSHAKE_HEADERS: [&str; 6] = [
    "connection",
    "upgrade",
    "sec-websocket-key",
    "sec-websocket-version",
    "sec-websocket-extensions",
    "host",
];

/// Tunnel errors
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("Missing Sec-WebSocket-Key header")]
    MissingKey,

    #[error("Invalid tunnel URL: {0}")]
    InvalidUrl(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

/// Time the opposite leg gets to finish a close handshake
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Whether the request asks for a WebSocket upgrade
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    let connection_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));

    let upgrade_websocket = headers
        .get(header::UPGRADE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim().eq_ignore_ascii_case("websocket"));

    connection_upgrade && upgrade_websocket
}

/// `ws`/`wss` URL for the destination leg of a tunnel
pub fn tunnel_url(destination: &Url, request: &Uri) -> Result<String, TunnelError> {
    let scheme = match destination.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => return Err(TunnelError::InvalidUrl(format!("unsupported scheme {other}"))),
    };
    let host = destination
        .host_str()
        .ok_or_else(|| TunnelError::InvalidUrl(destination.to_string()))?;

    let mut url = format!("{scheme}://{host}");
    if let Some(port) = destination.port() {
        url.push_str(&format!(":{port}"));
    }
    url.push_str(&join_path(destination.path(), request.path()));
    if let Some(query) = request.query() {
        url.push('?');
        url.push_str(query);
    }
    Ok(url)
}

/// Which relay stopped first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToDestination,
    DestinationToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToDestination => write!(f, "client->destination"),
            Direction::DestinationToClient => write!(f, "destination->client"),
        }
    }
}

/// Why a relay stopped
#[derive(Debug)]
pub enum RelayEnd {
    /// A close frame was relayed or the source ended
    Closed,
    ReadFailed(WsError),
    WriteFailed(WsError),
}

/// How a tunnel session ended
#[derive(Debug)]
pub enum SessionEnd {
    Relay { direction: Direction, end: RelayEnd, messages: u64 },
    Shutdown,
}

/// Opens WebSocket tunnels for proxy routes
#[derive(Clone)]
pub struct Tunnel {
    tls: Arc<rustls::ClientConfig>,
    tracker: TaskTracker,
    force: CancellationToken,
}

impl Tunnel {
    /// Sessions are spawned on `tracker` and torn down when `force` fires
    pub fn new(tracker: TaskTracker, force: CancellationToken) -> Self {
        Self {
            tls: crate::tls::client_config(),
            tracker,
            force,
        }
    }

    /// Dial the destination, then answer the client's upgrade
    ///
    /// A failed dial answers `502 Bad Gateway` without upgrading.
    pub async fn open(
        &self,
        mut request: Request<Incoming>,
        route: &Route,
        destination: &Url,
    ) -> Response<Body> {
        let accept_key = match accept_key(request.headers()) {
            Ok(key) => key,
            Err(e) => {
                warn!(host = %route.host, error = %e, "rejecting upgrade");
                return text_response(StatusCode::BAD_REQUEST, "Missing Sec-WebSocket-Key");
            }
        };

        let url = match tunnel_url(destination, request.uri()) {
            Ok(url) => url,
            Err(e) => {
                error!(host = %route.host, error = %e, "cannot build tunnel URL");
                return text_response(StatusCode::BAD_GATEWAY, "Bad Gateway");
            }
        };

        let (upstream, protocol) = match self.dial(&url, request.headers()).await {
            Ok(dialed) => dialed,
            Err(e) => {
                error!(host = %route.host, url = %url, error = %e, "failed to connect to tunnel destination");
                return text_response(StatusCode::BAD_GATEWAY, "Bad Gateway");
            }
        };

        info!(host = %route.host, url = %url, "tunnel destination connected");

        let on_upgrade = hyper::upgrade::on(&mut request);
        let host = route.host.clone();
        let force = self.force.clone();

        self.tracker.spawn(async move {
            let client = match on_upgrade.await {
                Ok(upgraded) => {
                    WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None)
                        .await
                }
                Err(e) => {
                    warn!(host = %host, error = %e, "client upgrade failed, closing destination");
                    let mut upstream = upstream;
                    let _ = upstream.close(None).await;
                    return;
                }
            };

            let start = Instant::now();
            info!(host = %host, url = %url, "tunnel opened");
            let end = relay(client, upstream, force).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            match end {
                SessionEnd::Relay {
                    direction,
                    end: RelayEnd::Closed,
                    messages,
                } => info!(host = %host, %direction, messages, duration_ms, "tunnel closed"),
                SessionEnd::Relay {
                    direction,
                    end: RelayEnd::ReadFailed(e) | RelayEnd::WriteFailed(e),
                    messages,
                } => warn!(host = %host, %direction, messages, duration_ms, error = %e, "tunnel error"),
                SessionEnd::Shutdown => info!(host = %host, duration_ms, "tunnel closed by shutdown"),
            }
        });

        switching_protocols(&accept_key, protocol)
    }

    async fn dial(
        &self,
        url: &str,
        inbound: &HeaderMap,
    ) -> Result<
        (
            WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
            Option<HeaderValue>,
        ),
        TunnelError,
    > {
        let mut outbound = url.into_client_request()?;
        for (name, value) in inbound {
            if HANDSHAKE_HEADERS.contains(&name.as_str()) {
                continue;
            }
            outbound.headers_mut().append(name.clone(), value.clone());
        }

        let (stream, response) = tokio_tungstenite::connect_async_tls_with_config(
            outbound,
            None,
            false,
            Some(Connector::Rustls(self.tls.clone())),
        )
        .await?;

        let protocol = response
            .headers()
            .get(header::SEC_WEBSOCKET_PROTOCOL)
            .cloned();
        Ok((stream, protocol))
    }
}

/// `Sec-WebSocket-Accept` value for the client's handshake
fn accept_key(headers: &HeaderMap) -> Result<String, TunnelError> {
    headers
        .get(header::SEC_WEBSOCKET_KEY)
        .map(|key| derive_accept_key(key.as_bytes()))
        .ok_or(TunnelError::MissingKey)
}

fn switching_protocols(accept_key: &str, protocol: Option<HeaderValue>) -> Response<Body> {
    let mut response = Response::new(empty());
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;

    let headers = response.headers_mut();
    headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
    match HeaderValue::from_str(accept_key) {
        Ok(value) => {
            headers.insert(header::SEC_WEBSOCKET_ACCEPT, value);
        }
        Err(e) => debug!("invalid accept key: {}", e),
    }
    if let Some(protocol) = protocol {
        headers.insert(header::SEC_WEBSOCKET_PROTOCOL, protocol);
    }
    response
}

/// Relay messages between two WebSocket legs until one side stops
///
/// A failure on either leg aborts both relay tasks at once, which drops (and
/// so closes) both connections. After a close the opposite relay gets
/// a short grace period to deliver the peer's close frame before the teardown.
pub async fn relay<C, D>(client: C, destination: D, force: CancellationToken) -> SessionEnd
where
    C: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Send + 'static,
    D: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Send + 'static,
{
    let (client_sink, client_source) = client.split();
    let (destination_sink, destination_source) = destination.split();
    let (done_tx, mut done_rx) = mpsc::channel(2);

    let upstream = tokio::spawn(pump(
        client_source,
        destination_sink,
        Direction::ClientToDestination,
        done_tx.clone(),
    ));
    let downstream = tokio::spawn(pump(
        destination_source,
        client_sink,
        Direction::DestinationToClient,
        done_tx,
    ));

    let end = tokio::select! {
        ended = done_rx.recv() => match ended {
            Some((direction, end, messages)) => SessionEnd::Relay { direction, end, messages },
            None => SessionEnd::Shutdown,
        },
        _ = force.cancelled() => SessionEnd::Shutdown,
    };

    if matches!(end, SessionEnd::Relay { end: RelayEnd::Closed, .. }) {
        tokio::select! {
            _ = tokio::time::timeout(CLOSE_GRACE, done_rx.recv()) => {}
            _ = force.cancelled() => {}
        }
    }

    upstream.abort();
    downstream.abort();
    let _ = upstream.await;
    let _ = downstream.await;
    end
}

async fn pump<S, K>(
    mut source: S,
    mut sink: K,
    direction: Direction,
    done: mpsc::Sender<(Direction, RelayEnd, u64)>,
) where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
    K: Sink<Message, Error = WsError> + Unpin,
{
    let mut messages = 0u64;
    let mut closing = false;
    let end = loop {
        match source.next().await {
            // answered by the leg itself
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(message)) => {
                let is_close = message.is_close();
                match sink.send(message).await {
                    Ok(()) => messages += 1,
                    // the receiving leg is already closing
                    Err(_) if is_close => break RelayEnd::Closed,
                    Err(e) => break RelayEnd::WriteFailed(e),
                }
                // keep reading so the source's close reply is flushed
                closing |= is_close;
            }
            Some(Err(_)) if closing => break RelayEnd::Closed,
            Some(Err(e)) => break RelayEnd::ReadFailed(e),
            None => break RelayEnd::Closed,
        }
    };
    let _ = done.send((direction, end, messages)).await;
}
