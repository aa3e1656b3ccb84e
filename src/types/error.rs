#[derive(Debug)]
pub enum ProtocolError {
    ConnectionFailed(String),
    NegotiationFailed(String),
    RequestFailed(String),
    InvalidResponse(String),
    Timeout,
    Io(std::io::Error),

    // SPDY framing errors (session-fatal)
    FramingError(String),
    UnsupportedFrameType(u16),
    CompressionError(String),

    // SPDY errors scoped to a single frame or stream (recoverable)
    UnsupportedControlFrame(String),
    StreamNotFound(u32),
    ProtocolStateError(String),
    StreamReset { stream_id: u32, status: u32 },

    // Session lifecycle
    GoAway { last_good_stream_id: u32 },
    SessionClosed(String),
    Cancelled,

    // Header handling errors
    HeaderEncodingError(String),
    MalformedHeaders(String),

    // Method and target errors
    InvalidMethod(String),
    InvalidTarget(String),
}

impl ProtocolError {
    /// Whether an error raised while reading or decoding a frame leaves the
    /// session unusable. Unsupported frames have had their payload consumed
    /// and can be skipped; anything else may have desynchronised the byte
    /// stream or the header decompressor.
    pub fn is_session_fatal(&self) -> bool {
        !matches!(
            self,
            ProtocolError::UnsupportedFrameType(_)
                | ProtocolError::UnsupportedControlFrame(_)
                | ProtocolError::StreamNotFound(_)
                | ProtocolError::ProtocolStateError(_)
                | ProtocolError::StreamReset { .. }
                | ProtocolError::Cancelled
        )
    }
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::ConnectionFailed(msg) => write!(f, "Connection failed: {}", msg),
            ProtocolError::NegotiationFailed(msg) => {
                write!(f, "Protocol negotiation failed: {}", msg)
            }
            ProtocolError::RequestFailed(msg) => write!(f, "Request failed: {}", msg),
            ProtocolError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            ProtocolError::Timeout => write!(f, "Request timeout"),
            ProtocolError::Io(err) => write!(f, "IO error: {}", err),

            ProtocolError::FramingError(msg) => write!(f, "SPDY framing error: {}", msg),
            ProtocolError::UnsupportedFrameType(frame_type) => {
                write!(f, "SPDY unsupported frame type: {}", frame_type)
            }
            ProtocolError::CompressionError(msg) => {
                write!(f, "SPDY header compression error: {}", msg)
            }

            ProtocolError::UnsupportedControlFrame(name) => {
                write!(f, "SPDY control frame not supported: {}", name)
            }
            ProtocolError::StreamNotFound(id) => write!(f, "SPDY stream {} not found", id),
            ProtocolError::ProtocolStateError(msg) => {
                write!(f, "SPDY stream state error: {}", msg)
            }
            ProtocolError::StreamReset { stream_id, status } => write!(
                f,
                "SPDY stream {} reset by peer with status {}",
                stream_id, status
            ),

            ProtocolError::GoAway {
                last_good_stream_id,
            } => write!(
                f,
                "SPDY session going away (last good stream {})",
                last_good_stream_id
            ),
            ProtocolError::SessionClosed(reason) => write!(f, "SPDY session closed: {}", reason),
            ProtocolError::Cancelled => write!(f, "Request cancelled"),

            ProtocolError::HeaderEncodingError(msg) => write!(f, "Header encoding error: {}", msg),
            ProtocolError::MalformedHeaders(msg) => write!(f, "Malformed headers: {}", msg),

            ProtocolError::InvalidMethod(msg) => write!(f, "Invalid method: {}", msg),
            ProtocolError::InvalidTarget(msg) => write!(f, "Invalid target: {}", msg),
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProtocolError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        ProtocolError::Io(err)
    }
}

// Errors are delivered to every stream of a failed session, so they need a
// cheap duplicate. `io::Error` is not `Clone`; its kind and message survive.
impl Clone for ProtocolError {
    fn clone(&self) -> Self {
        match self {
            ProtocolError::ConnectionFailed(msg) => ProtocolError::ConnectionFailed(msg.clone()),
            ProtocolError::NegotiationFailed(msg) => ProtocolError::NegotiationFailed(msg.clone()),
            ProtocolError::RequestFailed(msg) => ProtocolError::RequestFailed(msg.clone()),
            ProtocolError::InvalidResponse(msg) => ProtocolError::InvalidResponse(msg.clone()),
            ProtocolError::Timeout => ProtocolError::Timeout,
            ProtocolError::Io(err) => {
                ProtocolError::Io(std::io::Error::new(err.kind(), err.to_string()))
            }
            ProtocolError::FramingError(msg) => ProtocolError::FramingError(msg.clone()),
            ProtocolError::UnsupportedFrameType(t) => ProtocolError::UnsupportedFrameType(*t),
            ProtocolError::CompressionError(msg) => ProtocolError::CompressionError(msg.clone()),
            ProtocolError::UnsupportedControlFrame(name) => {
                ProtocolError::UnsupportedControlFrame(name.clone())
            }
            ProtocolError::StreamNotFound(id) => ProtocolError::StreamNotFound(*id),
            ProtocolError::ProtocolStateError(msg) => {
                ProtocolError::ProtocolStateError(msg.clone())
            }
            ProtocolError::StreamReset { stream_id, status } => ProtocolError::StreamReset {
                stream_id: *stream_id,
                status: *status,
            },
            ProtocolError::GoAway {
                last_good_stream_id,
            } => ProtocolError::GoAway {
                last_good_stream_id: *last_good_stream_id,
            },
            ProtocolError::SessionClosed(reason) => ProtocolError::SessionClosed(reason.clone()),
            ProtocolError::Cancelled => ProtocolError::Cancelled,
            ProtocolError::HeaderEncodingError(msg) => {
                ProtocolError::HeaderEncodingError(msg.clone())
            }
            ProtocolError::MalformedHeaders(msg) => ProtocolError::MalformedHeaders(msg.clone()),
            ProtocolError::InvalidMethod(msg) => ProtocolError::InvalidMethod(msg.clone()),
            ProtocolError::InvalidTarget(msg) => ProtocolError::InvalidTarget(msg.clone()),
        }
    }
}
