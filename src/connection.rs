use async_trait::async_trait;
use tracing::debug;

use crate::transport::{create_tcp_stream, create_tls_stream, Transport};
use crate::types::{ClientConfig, ProtocolError, ALPN_HTTP11, ALPN_SPDY2};
use crate::utils::with_timeout_result;

/// An established byte stream plus the protocol to speak on it.
pub struct Connected {
    pub io: Box<dyn Transport>,
    pub protocol: String,
}

impl Connected {
    pub fn new(io: impl Transport, protocol: impl Into<String>) -> Self {
        Self {
            io: Box::new(io),
            protocol: protocol.into(),
        }
    }

    pub fn is_spdy(&self) -> bool {
        self.protocol == ALPN_SPDY2
    }
}

impl std::fmt::Debug for Connected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connected")
            .field("protocol", &self.protocol)
            .finish_non_exhaustive()
    }
}

/// Opens connections to origins. Implementations decide how bytes reach the
/// peer; sessions only see the resulting stream.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        scheme: &str,
        host: &str,
        port: u16,
    ) -> Result<Connected, ProtocolError>;
}

/// Dials TCP for `http` and TLS with ALPN for `https`.
///
/// A plain connection speaks SPDY directly. Over TLS the peer's ALPN choice
/// wins, and no choice at all means HTTP/1.1.
#[derive(Debug, Clone, Default)]
pub struct TransportConnector {
    config: ClientConfig,
}

impl TransportConnector {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for TransportConnector {
    async fn connect(
        &self,
        scheme: &str,
        host: &str,
        port: u16,
    ) -> Result<Connected, ProtocolError> {
        let connect_timeout = self.config.timeouts.connect;
        let dial = async {
            match scheme {
                "http" => create_tcp_stream(host, port, connect_timeout)
                    .await
                    .map(|stream| Connected::new(stream, ALPN_SPDY2))
                    .map_err(|e| ProtocolError::ConnectionFailed(format!("{}:{}: {}", host, port, e))),
                "https" => {
                    let stream = create_tls_stream(
                        host,
                        port,
                        connect_timeout,
                        &self.config.alpn_protocols,
                        self.config.verify_certificates,
                    )
                    .await
                    .map_err(|e| ProtocolError::ConnectionFailed(format!("{}:{}: {}", host, port, e)))?;
                    let protocol = stream
                        .negotiated_protocol()
                        .filter(|proto| !proto.is_empty())
                        .unwrap_or_else(|| ALPN_HTTP11.to_string());
                    Ok(Connected::new(stream, protocol))
                }
                other => Err(ProtocolError::InvalidTarget(format!(
                    "Unsupported scheme: {}",
                    other
                ))),
            }
        };

        let connected = with_timeout_result(connect_timeout, dial).await?;
        debug!(scheme, host, port, protocol = %connected.protocol, "connected");

        if connected.protocol != ALPN_SPDY2 && connected.protocol != ALPN_HTTP11 {
            return Err(ProtocolError::NegotiationFailed(format!(
                "peer selected unsupported protocol '{}'",
                connected.protocol
            )));
        }
        Ok(connected)
    }
}
