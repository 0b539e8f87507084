//! Single-destination reverse proxy
//!
//! Requests and responses are streamed through a pooled hyper client; HTTPS
//! destinations go through rustls. Hop-by-hop headers never cross the proxy.

use crate::{text_response, Body};
use edgeway_router::Route;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::uri::{PathAndQuery, Uri};
use http::{Request, Response, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

/// Headers that only apply to a single connection
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Reverse proxy errors
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Invalid upstream URI: {0}")]
    InvalidUri(#[from] http::uri::InvalidUri),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),

    #[error("Upstream request failed: {0}")]
    RequestFailed(#[from] hyper_util::client::legacy::Error),
}

/// Forwards requests to route destinations
#[derive(Clone)]
pub struct ReverseProxy {
    client: Client<HttpsConnector<HttpConnector>, Incoming>,
}

impl ReverseProxy {
    pub fn new() -> Self {
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config((*crate::tls::client_config()).clone())
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .build(connector);

        Self { client }
    }

    /// Forward `request` to `destination`; failures become `502 Bad Gateway`
    pub async fn forward(
        &self,
        request: Request<Incoming>,
        route: &Route,
        destination: &Url,
        peer: SocketAddr,
    ) -> Response<Body> {
        let start = Instant::now();
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        match self.try_forward(request, destination, peer).await {
            Ok(response) => {
                debug!(
                    host = %route.host,
                    target = %destination,
                    method = %method,
                    path = %path,
                    status = response.status().as_u16(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "upstream responded"
                );
                response
            }
            Err(e) => {
                error!(
                    host = %route.host,
                    target = %destination,
                    method = %method,
                    path = %path,
                    error = %e,
                    "proxy request failed"
                );
                text_response(StatusCode::BAD_GATEWAY, "Bad Gateway")
            }
        }
    }

    async fn try_forward(
        &self,
        request: Request<Incoming>,
        destination: &Url,
        peer: SocketAddr,
    ) -> Result<Response<Body>, ProxyError> {
        let (mut parts, body) = request.into_parts();

        let original_host = parts.headers.get(header::HOST).cloned();
        parts.uri = upstream_uri(destination, &parts.uri)?;
        strip_hop_by_hop(&mut parts.headers);

        if let Some(authority) = parts.uri.authority() {
            parts
                .headers
                .insert(header::HOST, HeaderValue::from_str(authority.as_str())?);
        }
        append_forwarded(&mut parts.headers, peer, original_host);
        parts.version = http::Version::HTTP_11;

        let response = self
            .client
            .request(Request::from_parts(parts, body))
            .await?;

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, body.boxed()))
    }
}

impl Default for ReverseProxy {
    fn default() -> Self {
        Self::new()
    }
}

/// Destination scheme and authority, destination path joined with the request path
pub fn upstream_uri(destination: &Url, request: &Uri) -> Result<Uri, ProxyError> {
    let path = join_path(destination.path(), request.path());
    let path_and_query = match request.query() {
        Some(query) => format!("{path}?{query}"),
        None => path,
    };

    let host = destination.host_str().unwrap_or_default();
    let authority = match destination.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    let uri = format!(
        "{}://{}{}",
        destination.scheme(),
        authority,
        PathAndQuery::try_from(path_and_query.as_str())?
    );
    Ok(uri.parse()?)
}

/// Join two URL paths with exactly one slash between them
pub fn join_path(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

/// Drop hop-by-hop headers, including any named in `Connection`
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn append_forwarded(headers: &mut HeaderMap, peer: SocketAddr, original_host: Option<HeaderValue>) {
    let client_ip = peer.ip().to_string();
    let forwarded_for = match headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        Some(existing) => format!("{existing}, {client_ip}"),
        None => client_ip,
    };
    if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
        headers.insert("x-forwarded-for", value);
    }
    if let Some(host) = original_host {
        headers.insert("x-forwarded-host", host);
    }
    headers.insert("x-forwarded-proto", HeaderValue::from_static("http"));
}
