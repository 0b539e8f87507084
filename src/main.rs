//! Edge router for a local network
//!
//! Answers DNS for locally mapped names and routes HTTP traffic by `Host`
//! to proxied services, redirects, or the menu page.

mod logging;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use edgeway_config::{dns_table, http_table, Config, ConfigSource};
use edgeway_dns::{DnsHandler, DnsServer, UdpUpstream};
use edgeway_router::{Route, RouteKind, RoutingTable, SkippedRoute};
use edgeway_server_http::{HttpServer, HttpServerConfig, MenuPage};
use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;
use tracing::{error, info, warn};

/// Local DNS responder and HTTP edge router
#[derive(Parser, Debug)]
#[command(name = "edgeway")]
#[command(about = "Route local hostnames over DNS and HTTP", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    server_args: ServerArgs,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Run the DNS responder and the HTTP router (default)
    Serve,
    /// Run only the DNS responder
    Dns,
    /// Run only the HTTP router
    Http,
    /// Load the configuration and print the compiled routing tables
    Check,
}

#[derive(Args, Debug)]
struct ServerArgs {
    /// Configuration file path or http(s) URL
    #[arg(long, short, env = "CONFIG_URL", default_value = "config.yaml", global = true)]
    config: String,

    /// HTTP listen address (overrides `listen`)
    #[arg(long, global = true)]
    listen: Option<String>,

    /// DNS listen address (overrides `dns.listen`)
    #[arg(long, global = true)]
    dns_listen: Option<String>,

    /// Upstream resolver (overrides `dns.upstream`)
    #[arg(long, global = true)]
    upstream: Option<String>,

    /// Log level (trace, debug, info, warn, error); overrides `telemetry.level`
    #[arg(long, global = true)]
    log_level: Option<String>,
}

impl ServerArgs {
    fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(listen) = &self.listen {
            config.listen = listen.clone();
        }
        if let Some(listen) = &self.dns_listen {
            config.dns.listen = listen.clone();
        }
        if let Some(upstream) = &self.upstream {
            config.dns.upstream = upstream.clone();
        }
        config.validate().context("invalid command line override")?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // one rustls provider for every TLS client in the process
    edgeway_server_http::tls::ensure_crypto_provider();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Serve);
    let args = cli.server_args;

    let mut config = load_config(&args).await?;

    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.telemetry.level.clone());
    logging::init_logging(&config.telemetry, &level)?;

    if command == Commands::Check {
        check(&config);
        return Ok(());
    }

    serve(command, config).await
}

/// Load the configuration and apply command line overrides, logging to
/// stderr until the configured subscriber is installed
async fn load_config(args: &ServerArgs) -> Result<Config> {
    let level = args.log_level.as_deref().unwrap_or("info");
    let bootstrap = logging::bootstrap_subscriber(level, std::io::stderr);

    let source = ConfigSource::parse(&args.config);
    let mut config = edgeway_config::load(&source)
        .with_subscriber(bootstrap)
        .await
        .with_context(|| format!("failed to load configuration from {source}"))?;
    args.apply(&mut config)?;
    Ok(config)
}

async fn serve(command: Commands, config: Config) -> Result<()> {
    let (routes, _) = http_table(&config);
    let (domains, _) = dns_table(&config.dns);

    match command {
        Commands::Dns if domains.is_empty() => bail!("no valid DNS domains configured"),
        Commands::Serve if routes.is_empty() && domains.is_empty() => {
            bail!("no valid routes or DNS domains configured")
        }
        _ => {}
    }

    let run_dns = matches!(command, Commands::Serve | Commands::Dns);
    let run_http = matches!(command, Commands::Serve | Commands::Http);
    let mut handles: Vec<JoinHandle<Result<()>>> = Vec::new();

    let dns = if run_dns {
        let upstream = Arc::new(UdpUpstream::new(
            config.dns.upstream_addr()?,
            config.dns.timeout(),
        ));
        let handler = DnsHandler::new(Arc::new(domains), upstream).with_ttl(config.dns.ttl);
        let server = Arc::new(
            DnsServer::bind(config.dns.listen_addr()?, handler)
                .await
                .context("failed to start DNS server")?,
        );
        info!(
            upstream = %config.dns.upstream,
            "DNS server ready"
        );

        let running = server.clone();
        handles.push(tokio::spawn(async move { running.run().await.map_err(anyhow::Error::from) }));
        Some(server)
    } else {
        None
    };

    let http = if run_http {
        let routes = Arc::new(routes);
        let fallback = Arc::new(MenuPage::new(config.menu_page.clone(), &routes));
        let server_config = HttpServerConfig {
            bind_addr: config.listen_addr()?,
            menu_host: config.menu.clone(),
        };
        let server = Arc::new(
            HttpServer::bind(server_config, routes, fallback)
                .await
                .context("failed to start HTTP server")?,
        );

        let running = server.clone();
        handles.push(tokio::spawn(async move { running.run().await.map_err(anyhow::Error::from) }));
        Some(server)
    } else {
        None
    };

    info!("Edge router started, press Ctrl+C to stop");
    shutdown_signal().await;
    info!("Shutdown signal received, stopping servers...");

    let deadline = config.shutdown_timeout();
    let (dns_drained, http_drained) = tokio::join!(
        async {
            match &dns {
                Some(server) => server.shutdown(deadline).await,
                None => true,
            }
        },
        async {
            match &http {
                Some(server) => server.shutdown(deadline).await,
                None => true,
            }
        },
    );
    if !(dns_drained && http_drained) {
        warn!("Some in-flight work was cut off at the shutdown deadline");
    }

    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Server stopped with error: {:#}", e),
            Err(e) => error!("Server task failed: {}", e),
        }
    }

    info!("Edge router stopped");
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Error listening for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Error listening for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn check(config: &Config) {
    let (routes, skipped_routes) = http_table(config);
    let (domains, skipped_domains) = dns_table(&config.dns);

    println!("HTTP listen: {}", config.listen);
    println!("DNS listen:  {} (upstream {})", config.dns.listen, config.dns.upstream);
    if let Some(menu) = &config.menu {
        println!("Menu host:   {}", menu);
    }

    print_routes(&routes);

    println!("\nDomains ({}):", domains.len());
    for (pattern, address) in domains.iter() {
        println!("  {:<30} A {}", pattern, address);
    }

    print_skipped("Skipped routes", &skipped_routes);
    print_skipped("Skipped domains", &skipped_domains);
}

fn print_routes(routes: &RoutingTable<Route>) {
    println!("\nRoutes ({}):", routes.len());
    for (host, route) in routes.iter() {
        let kind = match route.kind() {
            RouteKind::Proxy => "proxy",
            RouteKind::Redirect => "redirect",
        };
        println!("  {:<30} {:<8} {}", host, kind, route.target());
    }
}

fn print_skipped(title: &str, skipped: &[SkippedRoute]) {
    if skipped.is_empty() {
        return;
    }
    println!("\n{} ({}):", title, skipped.len());
    for entry in skipped {
        println!("  {}", entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_serve() {
        let cli = Cli::parse_from(["edgeway", "--config", "edge.yaml"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.server_args.config, "edge.yaml");
    }

    #[test]
    fn test_subcommand_with_overrides() {
        let cli = Cli::parse_from([
            "edgeway",
            "dns",
            "--dns-listen",
            "127.0.0.1:5353",
            "--upstream",
            "9.9.9.9:53",
        ]);
        assert_eq!(cli.command, Some(Commands::Dns));

        let mut config = Config::default();
        cli.server_args.apply(&mut config).unwrap();
        assert_eq!(config.dns.listen, "127.0.0.1:5353");
        assert_eq!(config.dns.upstream, "9.9.9.9:53");
        assert_eq!(config.listen, "0.0.0.0:80");
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let cli = Cli::parse_from(["edgeway", "--upstream", "nowhere"]);
        let mut config = Config::default();
        assert!(cli.server_args.apply(&mut config).is_err());
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_config_loading_is_logged_before_telemetry_setup() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = logging::bootstrap_subscriber("info", move || writer.clone());

        let source = ConfigSource::parse("/nonexistent/edgeway.yaml");
        let result = edgeway_config::load(&source).with_subscriber(subscriber).await;
        assert!(result.is_err());

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Loading configuration"), "output: {output}");
    }

    #[tokio::test]
    async fn test_serve_refuses_empty_tables() {
        let err = serve(Commands::Serve, Config::default()).await.unwrap_err();
        assert!(err.to_string().contains("no valid routes"));

        let err = serve(Commands::Dns, Config::default()).await.unwrap_err();
        assert!(err.to_string().contains("no valid DNS domains"));
    }
}
