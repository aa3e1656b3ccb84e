use std::time::Duration;

use crate::utils::USER_AGENT;

#[derive(Debug, Clone, PartialEq)]
pub struct ClientTimeouts {
    pub connect: Option<Duration>,
    pub read: Option<Duration>,
    pub write: Option<Duration>,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            connect: Some(Duration::from_secs(10)),
            read: Some(Duration::from_secs(30)),
            write: Some(Duration::from_secs(30)),
        }
    }
}

impl ClientTimeouts {
    pub fn disabled() -> Self {
        Self {
            connect: None,
            read: None,
            write: None,
        }
    }
}

pub const ALPN_SPDY2: &str = "spdy/2";
pub const ALPN_HTTP11: &str = "http/1.1";

/// Per-client settings shared by every session the client opens.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeouts: ClientTimeouts,
    /// Bound of the outgoing frame queue feeding the send task.
    pub send_queue_capacity: usize,
    /// Bound of the decoded frame queue between the receive and dispatch tasks.
    pub receive_queue_capacity: usize,
    /// Protocols offered during TLS negotiation, most preferred first.
    pub alpn_protocols: Vec<String>,
    pub verify_certificates: bool,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeouts: ClientTimeouts::default(),
            send_queue_capacity: 100,
            receive_queue_capacity: 100,
            alpn_protocols: vec![ALPN_SPDY2.to_string(), ALPN_HTTP11.to_string()],
            verify_certificates: false,
            user_agent: USER_AGENT.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn timeouts(mut self, timeouts: ClientTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn verify_certificates(mut self, verify: bool) -> Self {
        self.verify_certificates = verify;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.send_queue_capacity = capacity.max(1);
        self.receive_queue_capacity = capacity.max(1);
        self
    }
}
