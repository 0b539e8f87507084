use edgeway_config::{load, ConfigError, ConfigSource};
use std::io::Write;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const CONFIG: &str = r#"
listen: "127.0.0.1:8080"
menu: menu.lan
routes:
  - host: app.lan
    target: http://10.0.0.5:3000
dns:
  domains:
    "*.lan": "192.168.1.10"
"#;

/// Serve one canned HTTP response and return the base URL
async fn serve_once(status: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        let _ = stream.read(&mut buf).await;
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.ok();
    });

    format!("http://{addr}/edge.yml")
}

#[tokio::test]
async fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();

    let source = ConfigSource::Path(file.path().to_path_buf());
    let config = load(&source).await.unwrap();

    assert_eq!(config.listen, "127.0.0.1:8080");
    assert_eq!(config.routes.len(), 1);
    assert_eq!(config.dns.domains.len(), 1);
}

#[tokio::test]
async fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let source = ConfigSource::Path(dir.path().join("missing.yml"));

    let err = load(&source).await.unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[tokio::test]
async fn test_load_from_url() {
    let url = serve_once("200 OK", CONFIG).await;

    let config = load(&ConfigSource::parse(&url)).await.unwrap();
    assert_eq!(config.menu.as_deref(), Some("menu.lan"));
}

#[tokio::test]
async fn test_load_from_url_non_ok_status() {
    let url = serve_once("404 Not Found", "").await;

    let err = load(&ConfigSource::parse(&url)).await.unwrap_err();
    match err {
        ConfigError::Fetch { reason, .. } => assert!(reason.contains("404")),
        other => panic!("unexpected error: {other}"),
    }
}
