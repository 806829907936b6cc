//! TLS negotiation for both sides of the relay (spec §4.5.1).
//!
//! Grounded on `original_source/parley.py::handle_client`'s TLS branch for
//! the exact option semantics, and on
//! `other_examples/ecc5d43b_Hilmernator-mTLS-Sidecar-Proxy__mtls-proxy-src-proxy.rs.rs`'s
//! `tls::build_server_config`/`build_client_config` split for idiomatic
//! `rustls`/`tokio_rustls` construction — that repo is the closest
//! TLS-terminate-on-both-sides shape anywhere in the retrieval pack.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, RootCertStore, ServerConfig, SignatureScheme};
use tokio_rustls::{TlsAcceptor, TlsConnector};

use relay_core::config::{InboundTlsConfig, OutboundTlsConfig, SslVersion};
use relay_core::error::ConfigError;

/// Build the `TlsAcceptor` that terminates inbound (client-facing) TLS
/// (spec §4.5.1 "Inbound (TLS as server)").
pub fn build_inbound_acceptor(cfg: &InboundTlsConfig) -> Result<TlsAcceptor, ConfigError> {
    let certs = load_certs(&cfg.certfile)?;
    let key = load_private_key(&cfg.keyfile)?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ConfigError::InvalidPem {
            path: cfg.certfile.clone(),
            reason: e.to_string(),
        })?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Build the `TlsConnector` that originates outbound (upstream-facing)
/// TLS (spec §4.5.1 "Outbound (TLS as client)"), honoring optional mTLS,
/// an explicit cipher suite list, a pinned protocol version, and a
/// certificate-verification bypass.
pub fn build_outbound_connector(cfg: &OutboundTlsConfig) -> Result<TlsConnector, ConfigError> {
    let provider = Arc::new(select_provider(cfg.cipher.as_deref()));
    let versions = protocol_versions(cfg.ssl_version)?;

    let builder = ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(versions)
        .map_err(|e| ConfigError::InvalidPem {
            path: Path::new("<tls-version-negotiation>").to_path_buf(),
            reason: e.to_string(),
        })?;

    let builder = if cfg.no_verify {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier))
    } else {
        let mut roots = RootCertStore::empty();
        for cert in rustls_native_certs::load_native_certs().certs {
            // Malformed entries in the platform trust store are skipped
            // rather than failing the whole load.
            let _ = roots.add(cert);
        }
        builder.with_root_certificates(roots)
    };

    let config = match &cfg.client_cert {
        Some((certfile, keyfile)) => {
            let certs = load_certs(certfile)?;
            let key = load_private_key(keyfile)?;
            builder
                .with_client_auth_cert(certs, key)
                .map_err(|e| ConfigError::InvalidPem {
                    path: certfile.clone(),
                    reason: e.to_string(),
                })?
        }
        None => builder.with_no_client_auth(),
    };

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Resolve a `server_name` for the outbound handshake's SNI extension.
pub fn server_name(host: &str) -> Result<ServerName<'static>, ConfigError> {
    ServerName::try_from(host.to_string()).map_err(|_| ConfigError::InvalidPem {
        path: Path::new(host).to_path_buf(),
        reason: "not a valid DNS name or IP address for TLS SNI".to_string(),
    })
}

/// Restrict the crypto provider's cipher suite list to the caller's
/// `--cipher` selection (a colon-separated list of substrings matched
/// case-insensitively against the suite name), mirroring the Python's
/// `context.set_ciphers(cipher)`. `None` leaves the default suite set.
fn select_provider(cipher: Option<&str>) -> CryptoProvider {
    let mut provider = ring::default_provider();
    if let Some(spec) = cipher {
        let wanted: Vec<String> = spec.split(':').map(|s| s.to_uppercase()).collect();
        provider.cipher_suites.retain(|suite| {
            let name = format!("{:?}", suite.suite()).to_uppercase();
            wanted.iter().any(|w| name.contains(w.as_str()))
        });
    }
    provider
}

/// SPEC_FULL §9's resolved reading of the Open Question: pin the
/// selected version as the *only* enabled version. `rustls` does not
/// implement TLS 1.0/1.1 at all (both are removed as insecure), so
/// those two selections are a `ConfigError` here rather than a silent
/// downgrade.
fn protocol_versions(
    selected: Option<SslVersion>,
) -> Result<&'static [&'static rustls::SupportedProtocolVersion], ConfigError> {
    match selected {
        None => Ok(rustls::ALL_VERSIONS),
        Some(SslVersion::Tls1_2) => Ok(&[&rustls::version::TLS12]),
        Some(SslVersion::Tls1_0) | Some(SslVersion::Tls1_1) => Err(ConfigError::InvalidPem {
            path: Path::new("<ssl_version>").to_path_buf(),
            reason: "TLS 1.0/1.1 are not implemented by the rustls backend".to_string(),
        }),
    }
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ConfigError> {
    let file = File::open(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ConfigError::InvalidPem {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, ConfigError> {
    let file = File::open(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| ConfigError::InvalidPem {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
        .ok_or_else(|| ConfigError::InvalidPem {
            path: path.to_path_buf(),
            reason: "no private key found in file".to_string(),
        })
}

/// `ssl.CERT_NONE` in Rust: accepts any server certificate presented.
/// Only reachable via `--no_verify`, spec §6/§9.
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tls1_0_and_1_1_are_rejected_as_unimplemented() {
        assert!(protocol_versions(Some(SslVersion::Tls1_0)).is_err());
        assert!(protocol_versions(Some(SslVersion::Tls1_1)).is_err());
    }

    #[test]
    fn tls1_2_pins_a_single_version() {
        let versions = protocol_versions(Some(SslVersion::Tls1_2)).unwrap();
        assert_eq!(versions.len(), 1);
    }

    #[test]
    fn unset_version_enables_all_supported_versions() {
        let versions = protocol_versions(None).unwrap();
        assert_eq!(versions, rustls::ALL_VERSIONS);
    }

    #[test]
    fn cipher_filter_narrows_the_provider_suite_list() {
        let full = select_provider(None);
        let narrowed = select_provider(Some("AES_128_GCM"));
        assert!(narrowed.cipher_suites.len() <= full.cipher_suites.len());
    }
}
