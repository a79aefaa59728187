//! Client-side TLS: trust anchors, optional client identity, server name.

use crate::connection::TlsClientConfig;
use crate::error::ClientError;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::RootCertStore;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsConnector;

/// TLS versions offered to the server. Anything older than 1.2 is refused.
static PROTOCOL_VERSIONS: &[&rustls::SupportedProtocolVersion] =
    &[&rustls::version::TLS13, &rustls::version::TLS12];

/// Creates a verifying TLS connector and the server name it must match.
pub fn create_tls_connector(
    config: &TlsClientConfig,
    server_name: &str,
) -> Result<(TlsConnector, ServerName<'static>), ClientError> {
    let expected = ServerName::try_from(server_name.to_string())
        .map_err(|_| ClientError::TlsConfig(format!("invalid server name: {}", server_name)))?;

    let builder = rustls::ClientConfig::builder_with_protocol_versions(PROTOCOL_VERSIONS)
        .with_root_certificates(trust_anchors(config.ca_cert_path.as_deref())?);

    let tls = match (&config.client_cert_path, &config.client_key_path) {
        (None, None) => builder.with_no_client_auth(),
        (Some(cert), Some(key)) => builder
            .with_client_auth_cert(read_certs(cert)?, read_key(key)?)
            .map_err(|e| ClientError::TlsConfig(format!("client identity rejected: {}", e)))?,
        _ => {
            return Err(ClientError::TlsConfig(
                "client certificate and key must be configured together".into(),
            ))
        }
    };

    Ok((TlsConnector::from(Arc::new(tls)), expected))
}

/// Roots from a PEM bundle, or the Mozilla set when none is given.
fn trust_anchors(ca_bundle: Option<&Path>) -> Result<RootCertStore, ClientError> {
    let mut roots = RootCertStore::empty();
    let Some(path) = ca_bundle else {
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        return Ok(roots);
    };

    let (added, ignored) = roots.add_parsable_certificates(read_certs(path)?);
    if ignored > 0 {
        tracing::warn!("Skipped {} unusable CA certificate(s) in {}", ignored, path.display());
    }
    if added == 0 {
        return Err(ClientError::TlsConfig(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(roots)
}

fn pem_file(path: &Path) -> Result<BufReader<File>, ClientError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| ClientError::TlsConfig(format!("cannot open {}: {}", path.display(), e)))
}

fn read_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ClientError> {
    rustls_pemfile::certs(&mut pem_file(path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ClientError::TlsConfig(format!("bad PEM in {}: {}", path.display(), e)))
}

fn read_key(path: &Path) -> Result<PrivateKeyDer<'static>, ClientError> {
    rustls_pemfile::private_key(&mut pem_file(path)?)
        .map_err(|e| ClientError::TlsConfig(format!("bad PEM in {}: {}", path.display(), e)))?
        .ok_or_else(|| {
            ClientError::TlsConfig(format!("no private key found in {}", path.display()))
        })
}
