//! TLS client configuration.

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::sync::Arc;
use tokio_rustls::TlsConnector;

/// How the server certificate is checked during the TLS handshake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TlsVerification {
    /// Chain to a webpki root and match the host name.
    #[default]
    Full,
    /// Require a certificate but trust any chain and name.
    ///
    /// Handshake signatures are still verified. Use only for relays with
    /// self-signed certificates on trusted networks.
    PeerCertificateOnly,
}

/// Creates a TLS connector for the given verification policy.
#[must_use]
pub fn create_tls_connector(verification: TlsVerification) -> TlsConnector {
    let root_store = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let mut config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    if verification == TlsVerification::PeerCertificateOnly {
        tracing::warn!("TLS chain and host name verification disabled");
        let provider = Arc::clone(config.crypto_provider());
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(AnyChainVerifier { provider }));
    }

    TlsConnector::from(Arc::new(config))
}

#[derive(Debug)]
struct AnyChainVerifier {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AnyChainVerifier {
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
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_full_verification() {
        assert_eq!(TlsVerification::default(), TlsVerification::Full);
    }

    #[test]
    fn test_create_tls_connector() {
        let _full = create_tls_connector(TlsVerification::Full);
        let _relaxed = create_tls_connector(TlsVerification::PeerCertificateOnly);
    }

    #[test]
    fn test_relaxed_verifier_keeps_provider_schemes() {
        let config = ClientConfig::builder()
            .with_root_certificates(RootCertStore::empty())
            .with_no_client_auth();
        let verifier = AnyChainVerifier {
            provider: Arc::clone(config.crypto_provider()),
        };
        assert!(!verifier.supported_verify_schemes().is_empty());
    }
}
