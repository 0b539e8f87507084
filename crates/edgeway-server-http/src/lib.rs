//! HTTP front end of the edge router
//!
//! Every request is dispatched on its `Host`:
//! - the menu host, a direct IP, or an unknown host gets the fallback page
//! - redirect routes answer `302 Found`
//! - proxy routes are forwarded, or tunnelled when the request is a
//!   WebSocket upgrade

pub mod dispatch;
pub mod fallback;
pub mod proxy;
pub mod server;
pub mod status;
pub mod tls;
pub mod tunnel;

pub use dispatch::{Dispatch, Dispatcher};
pub use fallback::{FallbackPage, MenuPage, ServiceInfo};
pub use proxy::{ProxyError, ReverseProxy};
pub use server::{HttpServer, HttpServerConfig, HttpServerError};
pub use status::StatusRecorder;
pub use tunnel::{Tunnel, TunnelError};

use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};

/// Response body shared by locally generated and proxied responses
pub type Body = BoxBody<Bytes, hyper::Error>;

pub(crate) fn full(body: impl Into<Bytes>) -> Body {
    Full::new(body.into())
        .map_err(|never| match never {})
        .boxed()
}

pub(crate) fn empty() -> Body {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}

/// Plain-text response with the given status
pub(crate) fn text_response(status: http::StatusCode, message: &'static str) -> http::Response<Body> {
    let mut response = http::Response::new(full(message));
    *response.status_mut() = status;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
