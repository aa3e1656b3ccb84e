use bytes::{Bytes, BytesMut};
use tracing::{debug, info, trace, warn};

use super::compression::check_header_block;
use super::consts::*;
use crate::types::{
    DataFrame, Frame, Header, HeaderBlock, ProtocolError, Request, Response, ResponseHandler,
    SynReplyFrame, SynStreamFrame,
};
use crate::utils::{decode_content, parse_content_encoding, CONTENT_ENCODING_HEADER};

/// Connection-specific headers that have no meaning inside a SPDY stream.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Created,
    AwaitingReply,
    AwaitingBody,
    Complete,
    Error,
}

impl StreamPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamPhase::Complete | StreamPhase::Error)
    }
}

/// One request/response exchange inside a session.
///
/// The handler is called once: with the response when the last frame of the
/// reply arrives, or with the error that ended the stream.
pub struct Stream {
    id: u32,
    phase: StreamPhase,
    method: String,
    response: Option<Response>,
    body: BytesMut,
    data_frames: usize,
    handler: Option<ResponseHandler>,
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("method", &self.method)
            .field("body_len", &self.body.len())
            .field("data_frames", &self.data_frames)
            .finish()
    }
}

impl Stream {
    pub fn new(id: u32, handler: ResponseHandler) -> Self {
        Self {
            id,
            phase: StreamPhase::Created,
            method: String::new(),
            response: None,
            body: BytesMut::new(),
            data_frames: 0,
            handler: Some(handler),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Turns `request` into the frames opening this stream: a SYN_STREAM,
    /// followed by DATA frames when the request has a body. The last frame
    /// carries FIN.
    pub fn syn(&mut self, request: &Request) -> Result<Vec<Frame>, ProtocolError> {
        if self.phase != StreamPhase::Created {
            return Err(ProtocolError::ProtocolStateError(format!(
                "stream {} already opened ({:?})",
                self.id, self.phase
            )));
        }

        let mut syn = SynStreamFrame::new(self.id);
        syn.headers = request_headers(request);
        // Rejected here, nothing for this stream reaches the send queue.
        check_header_block(&syn.headers)?;

        let body = request.body.clone().filter(|body| !body.is_empty());
        let mut frames = Vec::with_capacity(2);
        match body {
            None => {
                syn.flags = FLAG_FIN;
                frames.push(Frame::SynStream(syn));
            }
            Some(body) => {
                frames.push(Frame::SynStream(syn));
                let mut offset = 0;
                while offset < body.len() {
                    let end = (offset + MAX_FRAME_LENGTH).min(body.len());
                    frames.push(Frame::Data(DataFrame::new(
                        self.id,
                        body.slice(offset..end),
                        end == body.len(),
                    )));
                    offset = end;
                }
            }
        }

        debug!(
            stream_id = self.id,
            method = %request.method,
            url = %request.target,
            frames = frames.len(),
            "opening stream"
        );
        self.method = request.method.clone();
        self.phase = StreamPhase::AwaitingReply;
        Ok(frames)
    }

    /// Builds the response head from a SYN_REPLY. With FIN set the response
    /// is delivered straight away with an empty body.
    pub fn reply_to_response(&mut self, reply: &SynReplyFrame) -> Result<(), ProtocolError> {
        if self.phase != StreamPhase::AwaitingReply {
            let err = ProtocolError::ProtocolStateError(format!(
                "SYN_REPLY for stream {} in phase {:?}",
                self.id, self.phase
            ));
            self.fail(err.clone());
            return Err(err);
        }

        trace!(stream_id = self.id, headers = ?reply.headers, "SYN_REPLY header block");
        let response = match response_from_headers(&reply.headers) {
            Ok(response) => response,
            Err(err) => {
                self.fail(err.clone());
                return Err(err);
            }
        };
        self.response = Some(response);

        if reply.flags & FLAG_FIN != 0 {
            self.complete();
        } else {
            self.phase = StreamPhase::AwaitingBody;
        }
        Ok(())
    }

    /// Appends a DATA payload to the body; FIN completes the response.
    pub fn data_to_response(&mut self, data: &DataFrame) -> Result<(), ProtocolError> {
        match self.phase {
            StreamPhase::AwaitingBody => {}
            StreamPhase::Created | StreamPhase::AwaitingReply => {
                let err = ProtocolError::ProtocolStateError(format!(
                    "DATA for stream {} before SYN_REPLY",
                    self.id
                ));
                self.fail(err.clone());
                return Err(err);
            }
            StreamPhase::Complete | StreamPhase::Error => {
                return Err(ProtocolError::ProtocolStateError(format!(
                    "DATA for finished stream {}",
                    self.id
                )));
            }
        }

        self.body.extend_from_slice(&data.data);
        self.data_frames += 1;
        debug!(
            stream_id = self.id,
            frames = self.data_frames,
            len = data.data.len(),
            fin = data.flags & FLAG_FIN != 0,
            "DATA"
        );

        if data.flags & FLAG_FIN != 0 {
            self.complete();
        }
        Ok(())
    }

    /// Ends the stream with `err` unless it has already finished.
    pub fn fail(&mut self, err: ProtocolError) {
        if self.phase.is_terminal() {
            return;
        }
        warn!(stream_id = self.id, error = %err, "stream failed");
        self.phase = StreamPhase::Error;
        self.deliver(Err(err));
    }

    fn complete(&mut self) {
        let Some(mut response) = self.response.take() else {
            self.fail(ProtocolError::ProtocolStateError(format!(
                "stream {} completed without a reply",
                self.id
            )));
            return;
        };

        let body = std::mem::take(&mut self.body).freeze();
        let body = if response_has_body(&self.method, response.status) {
            body
        } else {
            Bytes::new()
        };

        match decode_content(&response.content_encoding, body) {
            Ok(body) => response.body = body,
            Err(err) => {
                self.fail(err);
                return;
            }
        }

        info!(
            stream_id = self.id,
            status = response.status,
            body = response.body.len(),
            "response complete"
        );
        self.phase = StreamPhase::Complete;
        self.deliver(Ok(response));
    }

    fn deliver(&mut self, result: Result<Response, ProtocolError>) {
        if let Some(handler) = self.handler.take() {
            handler(self.id, result);
        }
    }
}

/// Header block of the SYN_STREAM opening `request`. Request headers are
/// lower-cased with repeated names NUL-joined; the synthetic `method`,
/// `scheme`, `host`, `url` and `version` entries are always present.
pub fn request_headers(request: &Request) -> HeaderBlock {
    let mut headers = HeaderBlock::new();
    let mut host = None;

    for header in &request.headers {
        let name = header.name.to_ascii_lowercase();
        if HOP_BY_HOP_HEADERS.contains(&name.as_str()) {
            debug!(header = %name, "dropping connection header");
            continue;
        }
        if name == HEADER_HOST {
            host = header.value.clone();
            continue;
        }
        let value = header.value_str();
        headers
            .entry(name)
            .and_modify(|existing: &mut String| {
                existing.push(VALUE_SEPARATOR);
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }

    headers.insert(HEADER_VERSION.to_string(), request.version.clone());
    headers.insert(HEADER_METHOD.to_string(), request.method.clone());
    headers.insert(
        HEADER_SCHEME.to_string(),
        request.target.scheme().to_string(),
    );
    headers.insert(
        HEADER_HOST.to_string(),
        host.unwrap_or_else(|| request.host()),
    );
    headers.insert(HEADER_URL.to_string(), request.target.request_uri());
    headers
}

/// Builds a response head from a SYN_REPLY header block. `status` and
/// `version` are required; multi-valued entries become repeated headers.
pub fn response_from_headers(block: &HeaderBlock) -> Result<Response, ProtocolError> {
    let status_value = block
        .get(HEADER_STATUS)
        .ok_or_else(|| ProtocolError::MalformedHeaders("reply has no status".to_string()))?;
    let version = block
        .get(HEADER_VERSION)
        .ok_or_else(|| ProtocolError::MalformedHeaders("reply has no version".to_string()))?;

    let status_value = first_value(status_value).trim();
    let code = status_value
        .get(..3)
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| {
            ProtocolError::MalformedHeaders(format!("invalid status '{}'", status_value))
        })?;

    let mut response = Response::new(code, first_value(version).trim());
    response.status_text = status_value[3..].trim().to_string();

    for (name, values) in block {
        for value in values.split(VALUE_SEPARATOR) {
            response.headers.push(Header::new(name.as_str(), value));
        }
    }

    if let Some(encoding) = block.get(CONTENT_ENCODING_HEADER) {
        response.content_encoding = parse_content_encoding(encoding);
    }

    Ok(response)
}

fn first_value(value: &str) -> &str {
    value.split(VALUE_SEPARATOR).next().unwrap_or(value)
}

fn response_has_body(method: &str, status: u16) -> bool {
    if method.eq_ignore_ascii_case("HEAD") || (100..200).contains(&status) {
        return false;
    }
    !matches!(status, 204 | 304)
}
