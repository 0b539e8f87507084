//! Host-based request dispatch

use crate::fallback::FallbackPage;
use crate::proxy::ReverseProxy;
use crate::tunnel::{is_websocket_upgrade, Tunnel};
use crate::{text_response, Body};
use edgeway_router::{is_direct_ip, normalize_host, normalize_name, Destination, Route, RoutingTable};
use http::header::{self, HeaderValue};
use http::{Request, Response, StatusCode};
use hyper::body::Incoming;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// What to do with one request
#[derive(Debug, PartialEq, Eq)]
pub enum Dispatch<'a> {
    /// Menu host or direct IP access
    Menu,
    /// No route for the host
    Unrouted,
    /// `302 Found` to this location
    Redirect(String),
    /// Forward through the reverse proxy
    Proxy(&'a Route, &'a Url),
    /// Open a WebSocket tunnel
    Tunnel(&'a Route, &'a Url),
}

/// Routes each request to the fallback page, a redirect, the proxy or a tunnel
#[derive(Clone)]
pub struct Dispatcher {
    routes: Arc<RoutingTable<Route>>,
    menu_host: Option<String>,
    fallback: Arc<dyn FallbackPage>,
    proxy: ReverseProxy,
    tunnel: Tunnel,
}

impl Dispatcher {
    pub fn new(
        routes: Arc<RoutingTable<Route>>,
        fallback: Arc<dyn FallbackPage>,
        tunnel: Tunnel,
    ) -> Self {
        Self {
            routes,
            menu_host: None,
            fallback,
            proxy: ReverseProxy::new(),
            tunnel,
        }
    }

    /// Host that always gets the fallback page
    pub fn with_menu_host(mut self, host: impl AsRef<str>) -> Self {
        let host = normalize_name(host.as_ref());
        self.menu_host = (!host.is_empty()).then_some(host);
        self
    }

    /// Decide how `request` is handled
    pub fn decide<B>(&self, request: &Request<B>) -> Dispatch<'_> {
        let authority = request_host(request);
        let host = normalize_host(&authority);

        if self.menu_host.as_deref() == Some(host.as_str()) || is_direct_ip(&authority) {
            return Dispatch::Menu;
        }

        let Some(route) = self.routes.resolve(&host) else {
            return Dispatch::Unrouted;
        };

        match &route.destination {
            Destination::Redirect(target) => {
                let uri = request.uri();
                let mut location = format!("{}{}", target, uri.path());
                if let Some(query) = uri.query().filter(|q| !q.is_empty()) {
                    location.push('?');
                    location.push_str(query);
                }
                Dispatch::Redirect(location)
            }
            Destination::Proxy(url) if is_websocket_upgrade(request.headers()) => {
                Dispatch::Tunnel(route, url)
            }
            Destination::Proxy(url) => Dispatch::Proxy(route, url),
        }
    }

    /// Handle one request from `peer`
    pub async fn handle(&self, request: Request<Incoming>, peer: SocketAddr) -> Response<Body> {
        debug!(
            method = %request.method(),
            host = %request_host(&request),
            path = %request.uri().path(),
            peer = %peer,
            "request received"
        );

        match self.decide(&request) {
            Dispatch::Menu => {
                debug!(host = %request_host(&request), "serving menu");
                self.fallback.render(request.uri().path()).await
            }
            Dispatch::Unrouted => {
                info!(
                    host = %request_host(&request),
                    routes = self.routes.len(),
                    "no route found, falling back to menu"
                );
                self.fallback.render(request.uri().path()).await
            }
            Dispatch::Redirect(location) => {
                info!(host = %request_host(&request), location = %location, "redirecting");
                redirect(&location)
            }
            Dispatch::Proxy(route, url) => {
                info!(host = %route.host, target = %url, "proxying request");
                self.proxy.forward(request, route, url, peer).await
            }
            Dispatch::Tunnel(route, url) => {
                info!(host = %route.host, target = %url, "opening tunnel");
                self.tunnel.open(request, route, url).await
            }
        }
    }
}

/// `Host` header, or the URI authority for absolute-form requests
fn request_host<B>(request: &Request<B>) -> String {
    request
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|a| a.to_string()))
        .unwrap_or_default()
}

fn redirect(location: &str) -> Response<Body> {
    match HeaderValue::from_str(location) {
        Ok(value) => {
            let mut response = Response::new(crate::empty());
            *response.status_mut() = StatusCode::FOUND;
            response.headers_mut().insert(header::LOCATION, value);
            response
        }
        Err(e) => {
            warn!(location = %location, error = %e, "invalid redirect location");
            text_response(StatusCode::BAD_GATEWAY, "Bad Gateway")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::MenuPage;
    use edgeway_router::RouteKind;
    use tokio_util::sync::CancellationToken;
    use tokio_util::task::TaskTracker;

    fn dispatcher() -> Dispatcher {
        let mut builder = RoutingTable::builder();
        for (host, kind, target) in [
            ("app.lan", RouteKind::Proxy, "http://10.0.0.5:3000"),
            ("*.lan", RouteKind::Proxy, "http://10.0.0.9"),
            ("r.example", RouteKind::Redirect, "https://real.example"),
        ] {
            builder.push(host, Route::new(host, kind, target));
        }
        let routes = Arc::new(builder.build().0);
        let fallback = Arc::new(MenuPage::new("./menu.html", &routes));
        let tunnel = Tunnel::new(TaskTracker::new(), CancellationToken::new());

        Dispatcher::new(routes, fallback, tunnel).with_menu_host("Menu.LAN")
    }

    fn request(host: &str, uri: &str) -> Request<()> {
        Request::builder()
            .uri(uri)
            .header(header::HOST, host)
            .body(())
            .unwrap()
    }

    #[tokio::test]
    async fn test_menu_host_and_direct_ip() {
        let dispatcher = dispatcher();

        assert_eq!(dispatcher.decide(&request("menu.lan", "/")), Dispatch::Menu);
        assert_eq!(dispatcher.decide(&request("MENU.lan:80", "/")), Dispatch::Menu);
        assert_eq!(dispatcher.decide(&request("192.168.1.1", "/")), Dispatch::Menu);
        assert_eq!(dispatcher.decide(&request("192.168.1.1:8080", "/")), Dispatch::Menu);
        assert_eq!(dispatcher.decide(&request("[::1]:80", "/")), Dispatch::Menu);

        let no_host = Request::builder().uri("/").body(()).unwrap();
        assert_eq!(dispatcher.decide(&no_host), Dispatch::Menu);
    }

    #[tokio::test]
    async fn test_unrouted_host() {
        let dispatcher = dispatcher();
        assert_eq!(
            dispatcher.decide(&request("unknown.example", "/")),
            Dispatch::Unrouted
        );
    }

    #[tokio::test]
    async fn test_redirect_location() {
        let dispatcher = dispatcher();

        assert_eq!(
            dispatcher.decide(&request("r.example", "/a?x=1")),
            Dispatch::Redirect("https://real.example/a?x=1".to_string())
        );
        assert_eq!(
            dispatcher.decide(&request("r.example", "/a")),
            Dispatch::Redirect("https://real.example/a".to_string())
        );
    }

    #[tokio::test]
    async fn test_proxy_and_tunnel() {
        let dispatcher = dispatcher();

        match dispatcher.decide(&request("app.lan:8080", "/")) {
            Dispatch::Proxy(route, url) => {
                assert_eq!(route.host, "app.lan");
                assert_eq!(url.as_str(), "http://10.0.0.5:3000/");
            }
            other => panic!("unexpected dispatch {other:?}"),
        }

        // exact beats wildcard, wildcard catches the rest
        match dispatcher.decide(&request("tv.lan", "/")) {
            Dispatch::Proxy(route, _) => assert_eq!(route.host, "*.lan"),
            other => panic!("unexpected dispatch {other:?}"),
        }

        let upgrade = Request::builder()
            .uri("/socket")
            .header(header::HOST, "app.lan")
            .header(header::CONNECTION, "Upgrade")
            .header(header::UPGRADE, "websocket")
            .body(())
            .unwrap();
        assert!(matches!(dispatcher.decide(&upgrade), Dispatch::Tunnel(route, _) if route.host == "app.lan"));
    }

    #[test]
    fn test_redirect_response() {
        let response = redirect("https://real.example/a?x=1");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://real.example/a?x=1"
        );
    }
}
