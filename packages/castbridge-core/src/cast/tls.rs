//! TLS connector for Cast receivers.
//!
//! Receivers present self-signed device certificates, so the connection is
//! encrypted but the peer certificate is not verified.

use std::io;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use tokio::net::TcpStream;
use tokio_rustls::rustls::{
    self,
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    ClientConfig, DigitallySignedStruct, SignatureScheme,
};

use super::error::{TransportError, TransportResult};
use super::transport::{BoxedStream, Connector};

/// Accepts any server certificate.
#[derive(Debug)]
struct ReceiverCertVerifier {
    schemes: Vec<SignatureScheme>,
}

impl ServerCertVerifier for ReceiverCertVerifier {
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
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.schemes.clone()
    }
}

/// Connects to receivers over TCP + TLS.
#[derive(Clone)]
pub struct TlsConnector {
    connector: tokio_rustls::TlsConnector,
}

impl TlsConnector {
    pub fn new() -> TransportResult<Self> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let schemes = provider
            .signature_verification_algorithms
            .supported_schemes();
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| TransportError::Tls(e.to_string()))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(ReceiverCertVerifier { schemes }))
            .with_no_client_auth();

        Ok(Self {
            connector: tokio_rustls::TlsConnector::from(Arc::new(config)),
        })
    }
}

fn server_name(host: &str) -> io::Result<ServerName<'static>> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ServerName::from(ip));
    }
    ServerName::try_from(host.to_string())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

#[async_trait]
impl Connector for TlsConnector {
    async fn connect(&self, host: &str, port: u16) -> io::Result<BoxedStream> {
        let tcp = TcpStream::connect((host, port)).await?;
        tcp.set_nodelay(true)?;
        let stream = self.connector.connect(server_name(host)?, tcp).await?;
        log::debug!("[Transport] TLS established with {}:{}", host, port);
        Ok(Box::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_client_config() {
        assert!(TlsConnector::new().is_ok());
    }

    #[test]
    fn server_names_accept_ips_and_hostnames() {
        assert!(matches!(
            server_name("192.168.1.20").unwrap(),
            ServerName::IpAddress(_)
        ));
        assert!(matches!(
            server_name("chromecast.local").unwrap(),
            ServerName::DnsName(_)
        ));
    }
}
