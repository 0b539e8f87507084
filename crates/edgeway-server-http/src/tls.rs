//! Client TLS settings for HTTPS and WSS destinations

use rustls::{ClientConfig, RootCertStore};
use std::sync::{Arc, Once};

static CRYPTO_PROVIDER_INIT: Once = Once::new();

/// Install the ring provider unless the process already chose one
pub fn ensure_crypto_provider() {
    CRYPTO_PROVIDER_INIT.call_once(|| {
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            tracing::debug!("Rustls crypto provider already installed");
        }
    });
}

/// Client configuration trusting the webpki root set
pub fn client_config() -> Arc<ClientConfig> {
    ensure_crypto_provider();

    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Arc::new(config)
}
