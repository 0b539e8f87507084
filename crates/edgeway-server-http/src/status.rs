//! Response status capture for request logging

use hyper::service::Service;
use hyper::{Request, Response};
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Instant;
use tracing::{error, info};

/// Wraps a service and logs the status and duration of every response
#[derive(Debug, Clone)]
pub struct StatusRecorder<S> {
    inner: S,
    peer: SocketAddr,
}

impl<S> StatusRecorder<S> {
    pub fn new(inner: S, peer: SocketAddr) -> Self {
        Self { inner, peer }
    }
}

impl<S, B, ResBody> Service<Request<B>> for StatusRecorder<S>
where
    S: Service<Request<B>, Response = Response<ResBody>>,
    S::Error: std::fmt::Display,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, request: Request<B>) -> Self::Future {
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let host = request
            .headers()
            .get(http::header::HOST)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let peer = self.peer;
        let start = Instant::now();

        let future = self.inner.call(request);

        Box::pin(async move {
            let result = future.await;
            let duration_ms = start.elapsed().as_millis() as u64;
            match &result {
                Ok(response) => info!(
                    method = %method,
                    host = %host,
                    path = %path,
                    peer = %peer,
                    status = response.status().as_u16(),
                    duration_ms,
                    "request completed"
                ),
                Err(e) => error!(
                    method = %method,
                    host = %host,
                    path = %path,
                    peer = %peer,
                    duration_ms,
                    error = %e,
                    "request failed"
                ),
            }
            result
        })
    }
}
