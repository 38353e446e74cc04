use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ring::digest::{digest, SHA256};
use std::path::Path;
use tracing::info;
use wtransport::Identity;

// Dev certificate paths
const DEV_CERT_FILE: &str = "certs/cert.pem";
const DEV_KEY_FILE: &str = "certs/key.pem";

/// Certificate identity for the WebTransport endpoint
pub struct TlsConfig {
    pub identity: Identity,
    /// Base64 SHA-256 of the leaf certificate, for browsers pinning a dev cert
    pub cert_hash: String,
}

impl TlsConfig {
    /// Load from explicit PEM paths, or from `certs/` when none are configured
    pub async fn load(cert_path: Option<&str>, key_path: Option<&str>) -> Result<Self> {
        if let (Some(cert), Some(key)) = (cert_path, key_path) {
            info!("Loading TLS certificate from {}", cert);
            return Self::load_from_paths(cert, key).await;
        }

        if Path::new(DEV_CERT_FILE).exists() && Path::new(DEV_KEY_FILE).exists() {
            info!("Loading dev certificate from certs/");
            Self::load_from_paths(DEV_CERT_FILE, DEV_KEY_FILE).await
        } else {
            Err(anyhow!(
                "TLS certificate not found.\n\n\
                For development: place cert.pem and key.pem under certs/.\n\
                For production: set TLS_CERT_PATH and TLS_KEY_PATH."
            ))
        }
    }

    async fn load_from_paths(cert_path: &str, key_path: &str) -> Result<Self> {
        let identity = Identity::load_pemfiles(cert_path, key_path)
            .await
            .context("Failed to load certificate from PEM files")?;

        let cert_hash = identity
            .certificate_chain()
            .as_slice()
            .first()
            .map(|cert| cert_hash_of(cert.der()))
            .unwrap_or_default();
        info!("Certificate hash: {}", cert_hash);
        info!(
            "Chrome flag: --ignore-certificate-errors-spki-list={}",
            cert_hash
        );

        Ok(Self {
            identity,
            cert_hash,
        })
    }

    pub fn cert_hash(&self) -> &str {
        &self.cert_hash
    }
}

/// Base64 SHA-256 digest of a DER certificate
pub fn cert_hash_of(der: &[u8]) -> String {
    STANDARD.encode(digest(&SHA256, der).as_ref())
}
