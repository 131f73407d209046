//! Hardened TLS client configuration for the introspection transport
//!
//! - TLS 1.3 AEAD suites, plus a single ECDHE-ECDSA GCM suite for TLS 1.2
//! - trust anchored in an explicit CA bundle, not the platform store
//! - hostname verification (always on in rustls)
//! - certificate revocation checked against CRLs for the whole chain; a
//!   certificate whose status cannot be determined is rejected, and so is a
//!   CRL past its next-update time

use rustls::client::WebPkiServerVerifier;
use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::CertificateRevocationListDer;
use rustls::{ClientConfig, RootCertStore, SupportedCipherSuite};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no trust anchors found in {0}")]
    EmptyTrustStore(PathBuf),

    #[error("revocation checking requires at least one CRL")]
    NoRevocationLists,

    #[error("tls configuration error: {0}")]
    Rustls(#[from] rustls::Error),

    #[error("failed to build certificate verifier: {0}")]
    Verifier(#[from] rustls::client::VerifierBuilderError),
}

/// Allowed suites, in preference order
pub fn allowed_cipher_suites() -> Vec<SupportedCipherSuite> {
    vec![
        ring::cipher_suite::TLS13_AES_128_GCM_SHA256,
        ring::cipher_suite::TLS13_AES_256_GCM_SHA384,
        ring::cipher_suite::TLS13_CHACHA20_POLY1305_SHA256,
        ring::cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
    ]
}

/// The ring provider restricted to [`allowed_cipher_suites`]
pub fn restricted_provider() -> CryptoProvider {
    CryptoProvider {
        cipher_suites: allowed_cipher_suites(),
        ..ring::default_provider()
    }
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn load_roots(ca_file: &Path) -> Result<RootCertStore, TlsError> {
    let mut roots = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut open(ca_file)?) {
        let cert = cert.map_err(|source| TlsError::Io {
            path: ca_file.to_path_buf(),
            source,
        })?;
        roots.add(cert)?;
    }

    if roots.is_empty() {
        return Err(TlsError::EmptyTrustStore(ca_file.to_path_buf()));
    }
    Ok(roots)
}

fn load_crls(crl_files: &[PathBuf]) -> Result<Vec<CertificateRevocationListDer<'static>>, TlsError> {
    let mut crls = Vec::new();
    for path in crl_files {
        for crl in rustls_pemfile::crls(&mut open(path)?) {
            crls.push(crl.map_err(|source| TlsError::Io {
                path: path.clone(),
                source,
            })?);
        }
    }

    if crls.is_empty() {
        return Err(TlsError::NoRevocationLists);
    }
    Ok(crls)
}

/// Build the client configuration used for introspection calls
pub fn hardened_client_config(
    ca_file: &Path,
    crl_files: &[PathBuf],
) -> Result<ClientConfig, TlsError> {
    if crl_files.is_empty() {
        return Err(TlsError::NoRevocationLists);
    }

    let provider = Arc::new(restricted_provider());
    let roots = load_roots(ca_file)?;
    let crls = load_crls(crl_files)?;

    // Unknown revocation status is denied by default
    let verifier = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider.clone())
        .with_crls(crls)
        .enforce_revocation_expiration()
        .build()?;

    let config = ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])?
        .with_webpki_verifier(verifier)
        .with_no_client_auth();

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cipher_suite_allowlist() {
        let names: Vec<String> = allowed_cipher_suites()
            .iter()
            .map(|s| format!("{:?}", s.suite()))
            .collect();
        assert_eq!(
            names,
            vec![
                "TLS13_AES_128_GCM_SHA256",
                "TLS13_AES_256_GCM_SHA384",
                "TLS13_CHACHA20_POLY1305_SHA256",
                "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
            ]
        );
    }

    #[test]
    fn test_only_aead_suites_for_tls12() {
        let tls12: Vec<_> = restricted_provider()
            .cipher_suites
            .into_iter()
            .filter(|s| matches!(s, SupportedCipherSuite::Tls12(_)))
            .collect();
        assert_eq!(tls12.len(), 1);
    }

    #[test]
    fn test_missing_crls_fail_closed() {
        let err = hardened_client_config(Path::new("/nonexistent/ca.pem"), &[]).unwrap_err();
        assert!(matches!(err, TlsError::NoRevocationLists));
    }

    #[test]
    fn test_missing_ca_file_is_io_error() {
        let err = hardened_client_config(
            Path::new("/nonexistent/ca.pem"),
            &[PathBuf::from("/nonexistent/ca.crl")],
        )
        .unwrap_err();
        assert!(matches!(err, TlsError::Io { .. }));
    }
}
