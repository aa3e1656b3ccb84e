use async_trait::async_trait;

use super::error::ProtocolError;
use super::{Request, Response};

/// Completion callback for one request. Invoked exactly once with the stream
/// id the request was sent on (0 for HTTP/1.1) and the outcome.
pub type ResponseHandler = Box<dyn FnOnce(u32, Result<Response, ProtocolError>) + Send + 'static>;

/// A connection to one origin able to carry requests, whatever protocol was
/// negotiated for it.
#[async_trait]
pub trait Session: Send + Sync {
    /// Protocol spoken on the connection, e.g. `spdy/2` or `http/1.1`.
    fn protocol(&self) -> &str;

    /// Starts the background activity driving the connection. Calling it
    /// again is a no-op.
    async fn serve(&self) -> Result<(), ProtocolError>;

    /// Submits `request` and returns its stream id without waiting for the
    /// response; `handler` receives the outcome.
    async fn request(
        &self,
        request: Request,
        handler: ResponseHandler,
    ) -> Result<u32, ProtocolError>;

    /// Abandons an in-flight request; its handler receives `Cancelled`.
    /// Frames the peer still sends for it are dropped. Returns whether the
    /// request was still live.
    fn cancel(&self, _stream_id: u32) -> bool {
        false
    }

    /// Whether new requests can still be submitted.
    fn is_available(&self) -> bool {
        !self.is_closed()
    }

    fn is_closed(&self) -> bool;

    async fn close(&self);
}
