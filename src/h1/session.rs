use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::transport::Transport;
use crate::types::{
    ClientTimeouts, Header, ProtocolError, Request, Response, ResponseHandler, Session,
    ALPN_HTTP11,
};
use crate::utils::{
    decode_content, header_value, parse_content_encoding, parse_header, with_timeout_result,
    CHUNKED_ENCODING, CONTENT_ENCODING_HEADER, CONTENT_LENGTH_HEADER, CRLF, HOST_HEADER,
    HTTP_VERSION_1_1, MAX_BODY_SIZE, TRANSFER_ENCODING_HEADER,
};

/// Fallback used when the peer does not select SPDY: carries exactly one
/// HTTP/1.1 exchange over the connection, then reports itself closed.
pub struct HttpSession {
    io: Mutex<Option<Box<dyn Transport>>>,
    timeouts: ClientTimeouts,
    used: AtomicBool,
}

impl HttpSession {
    pub fn new(io: Box<dyn Transport>, timeouts: ClientTimeouts) -> Self {
        Self {
            io: Mutex::new(Some(io)),
            timeouts,
            used: AtomicBool::new(false),
        }
    }

    /// Writes `request` and reads the full response.
    pub async fn exchange<S>(
        stream: &mut S,
        request: &Request,
        timeouts: &ClientTimeouts,
    ) -> Result<Response, ProtocolError>
    where
        S: Transport + ?Sized,
    {
        write_request(stream, request, timeouts).await?;
        let mut reader = BufReader::new(stream);
        read_response(&mut reader, &request.method, timeouts).await
    }
}

#[async_trait]
impl Session for HttpSession {
    fn protocol(&self) -> &str {
        ALPN_HTTP11
    }

    async fn serve(&self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn request(
        &self,
        request: Request,
        handler: ResponseHandler,
    ) -> Result<u32, ProtocolError> {
        let io = self.io.lock().await.take();
        let Some(mut io) = io else {
            return Err(ProtocolError::SessionClosed(
                "HTTP/1.1 session already used".to_string(),
            ));
        };
        self.used.store(true, Ordering::SeqCst);

        let timeouts = request.timeouts(&self.timeouts);
        debug!(method = %request.method, url = %request.target, "HTTP/1.1 request");
        tokio::spawn(async move {
            let result = Self::exchange(io.as_mut(), &request, &timeouts).await;
            if let Ok(response) = &result {
                info!(status = response.status, body = response.body.len(), "HTTP/1.1 response");
            }
            let _ = io.shutdown().await;
            handler(0, result);
        });
        Ok(0)
    }

    fn is_closed(&self) -> bool {
        self.used.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.used.store(true, Ordering::SeqCst);
        if let Some(mut io) = self.io.lock().await.take() {
            let _ = io.shutdown().await;
        }
    }
}

async fn write_request<W>(
    stream: &mut W,
    request: &Request,
    timeouts: &ClientTimeouts,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut req = Vec::new();
    req.extend_from_slice(
        format!(
            "{} {} {}{}",
            request.method,
            request.target.path_query(),
            HTTP_VERSION_1_1,
            CRLF
        )
        .as_bytes(),
    );

    let mut headers = request.headers.clone();
    if !headers.iter().any(|h| h.is(HOST_HEADER)) {
        headers.insert(0, Header::new(HOST_HEADER, request.host()));
    }
    let body_len = request.body.as_ref().map_or(0, |b| b.len());
    if body_len > 0 && !headers.iter().any(|h| h.is(CONTENT_LENGTH_HEADER)) {
        headers.push(Header::new(CONTENT_LENGTH_HEADER, body_len.to_string()));
    }
    if !headers.iter().any(|h| h.is("connection")) {
        headers.push(Header::new("connection", "close"));
    }

    for header in &headers {
        req.extend_from_slice(format!("{}{}", header, CRLF).as_bytes());
    }
    req.extend_from_slice(CRLF.as_bytes());
    if let Some(body) = request.body.as_ref() {
        req.extend_from_slice(body);
    }

    with_timeout_result(timeouts.write, async {
        stream.write_all(&req).await?;
        stream.flush().await?;
        Ok(())
    })
    .await
}

async fn read_line<R>(
    reader: &mut R,
    line: &mut String,
    timeouts: &ClientTimeouts,
) -> Result<usize, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    with_timeout_result(timeouts.read, async {
        match reader.read_line(line).await {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                // Servers routinely drop TLS without close_notify.
                if let Some(inner) = e.get_ref() {
                    if inner
                        .to_string()
                        .contains("peer closed connection without sending TLS close_notify")
                    {
                        return Ok(0);
                    }
                }
                Err(ProtocolError::Io(e))
            }
        }
    })
    .await
}

pub async fn read_response<R>(
    reader: &mut R,
    method: &str,
    timeouts: &ClientTimeouts,
) -> Result<Response, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let mut status_line = String::new();
        if read_line(reader, &mut status_line, timeouts).await? == 0 {
            return Err(ProtocolError::ConnectionFailed(
                "Connection closed by server before receiving response".to_string(),
            ));
        }
        if status_line.trim().is_empty() {
            continue;
        }

        let (status, protocol, status_text) = parse_status_line(&status_line)?;
        let headers = read_header_block(reader, timeouts).await?;

        // Interim responses are followed by the real one.
        if (100..200).contains(&status) && status != 101 {
            debug!(status, "skipping interim response");
            continue;
        }

        let body = if response_has_body(method, status) {
            read_body(reader, &headers, timeouts).await?
        } else {
            Bytes::new()
        };

        let mut response = Response::new(status, protocol);
        response.status_text = status_text;
        if let Some(encoding) = header_value(&headers, CONTENT_ENCODING_HEADER) {
            response.content_encoding = parse_content_encoding(encoding);
        }
        response.body = decode_content(&response.content_encoding, body)?;
        response.headers = headers;
        return Ok(response);
    }
}

async fn read_header_block<R>(
    reader: &mut R,
    timeouts: &ClientTimeouts,
) -> Result<Vec<Header>, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        if read_line(reader, &mut line, timeouts).await? == 0 {
            break;
        }
        if line.trim().is_empty() {
            break;
        }
        match parse_header(line.trim()) {
            Some(header) => headers.push(header),
            None => warn!(line = %line.trim(), "ignoring malformed header line"),
        }
    }
    Ok(headers)
}

async fn read_body<R>(
    reader: &mut R,
    headers: &[Header],
    timeouts: &ClientTimeouts,
) -> Result<Bytes, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let is_chunked = header_value(headers, TRANSFER_ENCODING_HEADER)
        .map_or(false, |v| v.to_ascii_lowercase().contains(CHUNKED_ENCODING));
    if is_chunked {
        return read_chunked_body(reader, timeouts).await;
    }

    let content_length = header_value(headers, CONTENT_LENGTH_HEADER)
        .and_then(|v| v.trim().parse::<usize>().ok());

    let mut body = Vec::new();
    match content_length {
        Some(length) => {
            check_body_size(0, length)?;
            body.resize(length, 0);
            with_timeout_result(timeouts.read, async {
                reader.read_exact(&mut body).await?;
                Ok(())
            })
            .await?;
        }
        None => {
            with_timeout_result(timeouts.read, async {
                loop {
                    let mut buffer = [0u8; 8192];
                    match reader.read(&mut buffer).await {
                        Ok(0) => break,
                        Ok(n) => {
                            check_body_size(body.len(), n)?;
                            body.extend_from_slice(&buffer[..n]);
                        }
                        Err(e)
                            if e.get_ref().map_or(false, |inner| {
                                inner.to_string().contains("close_notify")
                            }) =>
                        {
                            break
                        }
                        Err(e) => return Err(ProtocolError::Io(e)),
                    }
                }
                Ok(())
            })
            .await?;
        }
    }
    Ok(Bytes::from(body))
}

async fn read_chunked_body<R>(reader: &mut R, timeouts: &ClientTimeouts) -> Result<Bytes, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let mut body = Vec::new();
    loop {
        let mut size_line = String::new();
        read_line(reader, &mut size_line, timeouts).await?;
        let size_str = size_line.trim().split(';').next().unwrap_or("").trim();
        let chunk_size = usize::from_str_radix(size_str, 16)
            .map_err(|_| ProtocolError::InvalidResponse("Invalid chunk size".to_string()))?;

        if chunk_size == 0 {
            // Trailers are read and discarded.
            loop {
                let mut line = String::new();
                if read_line(reader, &mut line, timeouts).await? == 0 || line.trim().is_empty() {
                    break;
                }
            }
            break;
        }

        check_body_size(body.len(), chunk_size)?;
        let mut chunk = vec![0u8; chunk_size];
        let mut crlf = [0u8; 2];
        with_timeout_result(timeouts.read, async {
            reader.read_exact(&mut chunk).await?;
            reader.read_exact(&mut crlf).await?;
            Ok(())
        })
        .await?;
        body.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(body))
}

fn check_body_size(have: usize, incoming: usize) -> Result<(), ProtocolError> {
    if incoming > MAX_BODY_SIZE.saturating_sub(have) {
        return Err(ProtocolError::InvalidResponse(format!(
            "response body exceeds {} bytes",
            MAX_BODY_SIZE
        )));
    }
    Ok(())
}

fn response_has_body(method: &str, status: u16) -> bool {
    if method.eq_ignore_ascii_case("HEAD") || (100..200).contains(&status) {
        return false;
    }
    !matches!(status, 204 | 304)
}

/// Splits `HTTP/1.1 200 OK` into code, protocol and reason phrase.
pub fn parse_status_line(status_line: &str) -> Result<(u16, String, String), ProtocolError> {
    let mut parts = status_line.trim().splitn(3, ' ');
    let protocol = parts.next().unwrap_or_default();
    let code = parts.next().unwrap_or_default();
    if !protocol.starts_with("HTTP/") || code.is_empty() {
        return Err(ProtocolError::InvalidResponse(format!(
            "Invalid status line '{}'",
            status_line.trim()
        )));
    }
    let status = code
        .parse::<u16>()
        .map_err(|_| ProtocolError::InvalidResponse("Invalid status code".to_string()))?;
    let reason = parts.next().unwrap_or_default().trim().to_string();
    Ok((status, protocol.to_string(), reason))
}
