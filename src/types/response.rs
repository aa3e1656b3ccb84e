use bytes::Bytes;
use serde_json::Value;

use super::Header;

#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    /// Reason phrase following the status code, e.g. `OK`.
    pub status_text: String,
    pub protocol: String,
    pub headers: Vec<Header>,
    pub body: Bytes,
    /// Values of `content-encoding`, as received.
    pub content_encoding: Vec<String>,
}

impl Response {
    pub fn new(status: u16, protocol: impl Into<String>) -> Self {
        Self {
            status,
            status_text: String::new(),
            protocol: protocol.into(),
            headers: Vec::new(),
            body: Bytes::new(),
            content_encoding: Vec::new(),
        }
    }

    /// First value of the header `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.is(name))
            .and_then(|h| h.value.as_deref())
    }

    /// Every value of the header `name`, in arrival order.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|h| h.is(name))
            .map(|h| h.value_str())
            .collect()
    }

    pub fn status_line(&self) -> String {
        if self.status_text.is_empty() {
            format!("{} {}", self.protocol, self.status)
        } else {
            format!("{} {} {}", self.protocol, self.status, self.status_text)
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    pub fn json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.status_line())?;
        for header in &self.headers {
            writeln!(f, "{}", header)?;
        }
        writeln!(f)?;
        write!(f, "{}", self.text())
    }
}
