//! Certificate fingerprints and fingerprint-pinned TLS.
//!
//! A fingerprint is the SHA-1 digest of the DER end-entity certificate,
//! rendered as upper-case colon-separated hex. [`FingerprintVerifier`]
//! either accepts any certificate (used only to read the live fingerprint)
//! or pins the handshake to one fingerprint. Handshake signatures are
//! verified with the ring provider in both modes.

use std::sync::Arc;
use std::time::Duration;

use cpmgmt_core::{Fingerprint, TransportError};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, ring, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, SignatureScheme};
use sha1::{Digest, Sha1};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

/// Fingerprint of a DER-encoded certificate.
#[must_use]
pub fn certificate_fingerprint(der: &[u8]) -> Fingerprint {
    Fingerprint::from_digest(&Sha1::digest(der))
}

/// Server certificate verifier keyed on certificate fingerprints instead of
/// a CA chain.
#[derive(Debug)]
pub struct FingerprintVerifier {
    expected: Option<Fingerprint>,
    provider: Arc<CryptoProvider>,
}

impl FingerprintVerifier {
    /// Verifier accepting any certificate. Only for reading the live
    /// fingerprint; never send credentials over such a channel.
    #[must_use]
    pub fn accept_any() -> Arc<Self> {
        Arc::new(Self {
            expected: None,
            provider: Arc::new(ring::default_provider()),
        })
    }

    /// Verifier accepting only a certificate whose fingerprint equals
    /// `expected`.
    #[must_use]
    pub fn pinned(expected: Fingerprint) -> Arc<Self> {
        Arc::new(Self {
            expected: Some(expected),
            provider: Arc::new(ring::default_provider()),
        })
    }

    /// Client configuration using `verifier` for server authentication.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Client`] when the provider offers no usable
    /// protocol version.
    pub fn client_config(verifier: Arc<Self>) -> Result<ClientConfig, TransportError> {
        let provider = Arc::clone(&verifier.provider);
        Ok(ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|err| TransportError::Client {
                message: err.to_string(),
            })?
            .dangerous()
            .with_custom_certificate_verifier(verifier)
            .with_no_client_auth())
    }
}

impl ServerCertVerifier for FingerprintVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let Some(expected) = &self.expected else {
            return Ok(ServerCertVerified::assertion());
        };
        let presented = certificate_fingerprint(end_entity.as_ref());
        if presented == *expected {
            Ok(ServerCertVerified::assertion())
        } else {
            warn!(presented = %presented, expected = %expected, "rejecting server certificate");
            Err(rustls::Error::InvalidCertificate(
                CertificateError::ApplicationVerificationFailure,
            ))
        }
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

/// Complete a TLS handshake with `host:port` under `verifier` and return
/// the fingerprint of the certificate the server presented.
///
/// # Errors
///
/// Returns [`TransportError::Request`] when the connection or handshake
/// fails or times out, and [`TransportError::NoCertificate`] when the
/// server sent no certificate.
pub async fn handshake(
    host: &str,
    port: u16,
    verifier: Arc<FingerprintVerifier>,
    timeout: Duration,
) -> Result<Fingerprint, TransportError> {
    let endpoint = format!("{host}:{port}");
    let request_error = |message: String| TransportError::Request {
        endpoint: endpoint.clone(),
        message,
    };

    let config = FingerprintVerifier::client_config(verifier)?;
    let server_name =
        ServerName::try_from(host.to_string()).map_err(|err| request_error(err.to_string()))?;
    let connect = async {
        let stream = TcpStream::connect((host, port)).await?;
        TlsConnector::from(Arc::new(config))
            .connect(server_name, stream)
            .await
    };
    let stream = tokio::time::timeout(timeout, connect)
        .await
        .map_err(|_| request_error(format!("TLS handshake timed out after {timeout:?}")))?
        .map_err(|err| request_error(err.to_string()))?;

    let (_, connection) = stream.get_ref();
    let certificate = connection
        .peer_certificates()
        .and_then(<[_]>::first)
        .ok_or_else(|| TransportError::NoCertificate {
            endpoint: endpoint.clone(),
        })?;
    let fingerprint = certificate_fingerprint(certificate.as_ref());
    debug!(endpoint = %endpoint, fingerprint = %fingerprint, "completed TLS handshake");
    Ok(fingerprint)
}

/// Read the fingerprint `host:port` presents, without trusting it.
///
/// # Errors
///
/// See [`handshake`].
pub async fn probe_fingerprint(
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<Fingerprint, TransportError> {
    handshake(host, port, FingerprintVerifier::accept_any(), timeout).await
}
