use crate::types::{Header, ProtocolError, Target};
use bytes::Bytes;
use flate2::read::{MultiGzDecoder, ZlibDecoder};
use std::future::Future;
use std::io::Read;
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

pub const USER_AGENT: &str = concat!("ripspdy/", env!("CARGO_PKG_VERSION"));
pub const CRLF: &str = "\r\n";
pub const HTTP_VERSION_1_1: &str = "HTTP/1.1";
pub const HOST_HEADER: &str = "host";
pub const CONTENT_LENGTH_HEADER: &str = "content-length";
pub const CONTENT_ENCODING_HEADER: &str = "content-encoding";
pub const TRANSFER_ENCODING_HEADER: &str = "transfer-encoding";
pub const USER_AGENT_HEADER: &str = "user-agent";
pub const CHUNKED_ENCODING: &str = "chunked";
/// Largest response body accepted from a peer.
pub const MAX_BODY_SIZE: usize = 64 * 1024 * 1024;

// Common header names as constants to avoid allocations
pub const CONTENT_TYPE_HEADER: &str = "content-type";
pub const APPLICATION_JSON: &str = "application/json";

pub fn ensure_user_agent(headers: &mut Vec<Header>, user_agent: &str) {
    if !headers.iter().any(|h| h.is(USER_AGENT_HEADER)) {
        headers.push(Header::new(USER_AGENT_HEADER, user_agent));
    }
}

pub fn parse_target(target: &str) -> Result<Target, ProtocolError> {
    let url = Url::parse(target)
        .map_err(|e| ProtocolError::InvalidTarget(format!("{} ({})", target, e)))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ProtocolError::InvalidTarget(format!(
                "Unsupported scheme '{}' in '{}'",
                other, target
            )))
        }
    }

    if url.host_str().is_none() {
        return Err(ProtocolError::InvalidTarget(format!(
            "Target '{}' is missing a host",
            target
        )));
    }

    if url.port_or_known_default().is_none() {
        return Err(ProtocolError::InvalidTarget(format!(
            "Target '{}' has no known port",
            target
        )));
    }

    Ok(Target::new(url))
}

pub fn convert_escape_sequences(input: &str) -> String {
    input
        .replace("\\\\", "\\")
        .replace("\\r", "\r")
        .replace("\\n", "\n")
        .replace("\\t", "\t")
}

/// Parses `Name: value`. A line without a colon yields a valueless header;
/// an empty name is rejected.
pub fn parse_header(header: &str) -> Option<Header> {
    match header.split_once(':') {
        Some((name, value)) => {
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some(Header::new(name, convert_escape_sequences(value.trim_start())))
        }
        None if !header.trim().is_empty() => Some(Header::new_valueless(header.trim())),
        None => None,
    }
}

pub fn parse_headers<I, S>(headers: I) -> Result<Vec<Header>, ProtocolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    headers
        .into_iter()
        .map(|header| {
            let text = header.as_ref();
            parse_header(text).ok_or_else(|| {
                ProtocolError::MalformedHeaders(format!("Invalid header '{}'", text))
            })
        })
        .collect()
}

pub fn header_value<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.is(name))
        .and_then(|h| h.value.as_deref())
}

pub async fn with_timeout_result<F, T>(
    duration: Option<Duration>,
    future: F,
) -> Result<T, ProtocolError>
where
    F: Future<Output = Result<T, ProtocolError>>,
{
    if let Some(dur) = duration {
        match timeout(dur, future).await {
            Ok(result) => result,
            Err(_) => Err(ProtocolError::Timeout),
        }
    } else {
        future.await
    }
}

/// Undoes `content-encoding` on a complete body, last applied coding first.
/// `identity` and unknown codings are passed through untouched.
pub fn decode_content(encodings: &[String], body: Bytes) -> Result<Bytes, ProtocolError> {
    if body.is_empty() {
        return Ok(body);
    }

    let mut body = body;
    for encoding in encodings.iter().rev() {
        let mut decoded = Vec::with_capacity(body.len() * 2);
        match encoding.as_str() {
            // A gzip body may arrive as one member per DATA frame; the
            // multi-member decoder reads them back to back.
            "gzip" | "x-gzip" => MultiGzDecoder::new(&body[..])
                .read_to_end(&mut decoded)
                .map_err(|e| ProtocolError::InvalidResponse(format!("gzip body: {}", e)))?,
            "deflate" => ZlibDecoder::new(&body[..])
                .read_to_end(&mut decoded)
                .map_err(|e| ProtocolError::InvalidResponse(format!("deflate body: {}", e)))?,
            _ => continue,
        };
        body = Bytes::from(decoded);
    }
    Ok(body)
}

/// Splits a `content-encoding` value into lower-case codings.
pub fn parse_content_encoding(value: &str) -> Vec<String> {
    value
        .split(|c| c == ',' || c == '\0')
        .map(|coding| coding.trim().to_ascii_lowercase())
        .filter(|coding| !coding.is_empty())
        .collect()
}
