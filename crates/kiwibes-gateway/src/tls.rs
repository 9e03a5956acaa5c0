//! HTTPS certificate loading (SPEC_FULL §6): Kiwibes serves the REST API
//! over TLS only, using a cert/key pair the operator places in the home
//! directory. `axum-server`'s rustls integration handles the actual
//! handshake; this module only resolves `BootError::HttpsCertsFail`.

use std::path::Path;

use axum_server::tls_rustls::RustlsConfig;
use kiwibes_domain::BootError;

pub async fn load(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, BootError> {
    RustlsConfig::from_pem_file(cert_path, key_path)
        .await
        .map_err(|e| BootError::HttpsCertsFail(e.to_string()))
}
