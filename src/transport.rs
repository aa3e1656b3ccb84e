use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::ring::default_provider;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::{client::TlsStream, TlsConnector};
use tracing::{debug, info};

use crate::types::{ProtocolError, ALPN_HTTP11};
use crate::utils::with_timeout_result;

/// Byte stream a session runs over.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

#[derive(Debug)]
pub struct NoCertificateVerification;

impl ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA1,
            rustls::SignatureScheme::ECDSA_SHA1_Legacy,
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
            rustls::SignatureScheme::ED448,
        ]
    }
}

pub enum TransportStream {
    Tcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl TransportStream {
    /// Protocol selected through ALPN. Plain TCP and TLS without a selection
    /// both report `None`.
    pub fn negotiated_protocol(&self) -> Option<String> {
        match self {
            TransportStream::Tcp(_) => None,
            TransportStream::Tls(tls) => tls
                .get_ref()
                .1
                .alpn_protocol()
                .map(|proto| String::from_utf8_lossy(proto).into_owned()),
        }
    }
}

impl AsyncRead for TransportStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TransportStream::Tcp(tcp) => Pin::new(tcp).poll_read(cx, buf),
            TransportStream::Tls(tls) => Pin::new(tls.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for TransportStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            TransportStream::Tcp(tcp) => Pin::new(tcp).poll_write(cx, buf),
            TransportStream::Tls(tls) => Pin::new(tls.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TransportStream::Tcp(tcp) => Pin::new(tcp).poll_flush(cx),
            TransportStream::Tls(tls) => Pin::new(tls.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TransportStream::Tcp(tcp) => Pin::new(tcp).poll_shutdown(cx),
            TransportStream::Tls(tls) => Pin::new(tls.as_mut()).poll_shutdown(cx),
        }
    }
}

fn build_alpn_list(protocols: &[String]) -> Vec<Vec<u8>> {
    if protocols.is_empty() {
        vec![ALPN_HTTP11.as_bytes().to_vec()]
    } else {
        protocols.iter().map(|p| p.as_bytes().to_vec()).collect()
    }
}

fn server_name_from_str(name: &str) -> io::Result<ServerName<'static>> {
    ServerName::try_from(name.to_string()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Invalid server name: {}", name),
        )
    })
}

fn build_tls_connector(protocols: &[String], verify_certificates: bool) -> TlsConnector {
    let mut config = if verify_certificates {
        let mut root_store = RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth()
    } else {
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoCertificateVerification))
            .with_no_client_auth()
    };

    config.alpn_protocols = build_alpn_list(protocols);

    TlsConnector::from(Arc::new(config))
}

async fn connect_tcp(
    host: &str,
    port: u16,
    timeout: Option<Duration>,
) -> Result<TcpStream, ProtocolError> {
    let stream = with_timeout_result(timeout, async {
        Ok(TcpStream::connect((host, port)).await?)
    })
    .await?;
    stream.set_nodelay(true)?;
    debug!(
        local = ?stream.local_addr().ok(),
        peer = ?stream.peer_addr().ok(),
        "TCP connected"
    );
    Ok(stream)
}

pub async fn create_tcp_stream(
    host: &str,
    port: u16,
    timeout: Option<Duration>,
) -> Result<TransportStream, ProtocolError> {
    let stream = connect_tcp(host, port, timeout).await?;
    Ok(TransportStream::Tcp(stream))
}

pub async fn create_tls_stream(
    host: &str,
    port: u16,
    timeout: Option<Duration>,
    alpn_protocols: &[String],
    verify_certificates: bool,
) -> Result<TransportStream, ProtocolError> {
    // Ensure a crypto provider is installed (required for rustls >=0.23).
    let _ = default_provider().install_default();
    let tcp_stream = connect_tcp(host, port, timeout).await?;

    let connector = build_tls_connector(alpn_protocols, verify_certificates);
    let server_name = server_name_from_str(host)?;

    let tls_stream = with_timeout_result(timeout, async {
        Ok(connector.connect(server_name, tcp_stream).await?)
    })
    .await?;

    let (_, connection) = tls_stream.get_ref();
    info!(
        host,
        certificates = connection.peer_certificates().map_or(0, |certs| certs.len()),
        alpn = ?connection.alpn_protocol().map(String::from_utf8_lossy),
        "TLS handshake complete"
    );

    Ok(TransportStream::Tls(Box::new(tls_stream)))
}
