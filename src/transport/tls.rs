//! TLS client setup
//!
//! Builds a [`TlsConnector`] trusting either the bundled webpki roots or the
//! CA certificates of a PEM file.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio_rustls::rustls::pki_types::pem::PemObject;
use tokio_rustls::rustls::pki_types::CertificateDer;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

/// Error type for TLS configuration
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Certificate error: {0}")]
    Certificate(String),
    #[error("Invalid server name: {0}")]
    InvalidServerName(String),
}

/// Load certificates from a PEM file
fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let reader = BufReader::new(File::open(path)?);
    let certs: Vec<CertificateDer<'static>> = CertificateDer::pem_reader_iter(reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::Certificate(format!("Failed to parse certificates: {}", e)))?;

    if certs.is_empty() {
        return Err(TlsError::Certificate(format!(
            "No certificates found in {}",
            path.display()
        )));
    }

    Ok(certs)
}

/// Create a client connector; `ca_cert` replaces the default roots
pub fn client_connector(ca_cert: Option<&Path>) -> Result<TlsConnector, TlsError> {
    let mut root_store = RootCertStore::empty();

    match ca_cert {
        Some(path) => {
            for cert in load_certs(path)? {
                root_store.add(cert).map_err(|e| {
                    TlsError::Certificate(format!("Failed to add CA certificate: {}", e))
                })?;
            }
        }
        None => root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    }

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_roots() {
        assert!(client_connector(None).is_ok());
    }

    #[test]
    fn test_missing_ca_file() {
        let err = client_connector(Some(Path::new("/nonexistent/ca.pem"))).err().expect("expected error");
        assert!(matches!(err, TlsError::Io(_)));
    }

    #[test]
    fn test_ca_file_without_certificates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not a certificate").unwrap();

        let err = client_connector(Some(file.path())).err().expect("expected error");
        assert!(err.to_string().contains("No certificates found"));
    }
}
