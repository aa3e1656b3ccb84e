use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::connection::{Connector, TransportConnector};
use crate::registry::SessionRegistry;
use crate::types::{ClientConfig, ProtocolError, Request, Response, ResponseHandler};
use crate::utils::{ensure_user_agent, with_timeout_result};

/// Entry point for issuing requests. Requests to the same origin share one
/// session through the registry.
#[derive(Clone)]
pub struct Client {
    registry: Arc<SessionRegistry>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        let connector = Arc::new(TransportConnector::new(config.clone()));
        Self::with_connector(connector, config)
    }

    pub fn with_connector(connector: Arc<dyn Connector>, config: ClientConfig) -> Self {
        Self::with_registry(Arc::new(SessionRegistry::new(connector, config)))
    }

    pub fn with_registry(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ClientConfig {
        self.registry.config()
    }

    /// Submits `request` on the origin's session and returns the stream id
    /// (0 over HTTP/1.1). `handler` receives the response.
    ///
    /// When this returns an error the handler is dropped without being called.
    pub async fn request(
        &self,
        mut request: Request,
        handler: ResponseHandler,
    ) -> Result<u32, ProtocolError> {
        ensure_user_agent(&mut request.headers, &self.config().user_agent);
        let session = self.registry.session(&request.target).await?;
        session.request(request, handler).await
    }

    /// Sends `request` and waits for the complete response. The read timeout
    /// bounds the wait; on expiry the stream is cancelled.
    pub async fn send(&self, mut request: Request) -> Result<Response, ProtocolError> {
        ensure_user_agent(&mut request.headers, &self.config().user_agent);
        let deadline = request.timeouts(&self.config().timeouts).read;
        let session = self.registry.session(&request.target).await?;

        let (tx, rx) = oneshot::channel();
        let stream_id = session
            .request(
                request,
                Box::new(move |_, result| {
                    let _ = tx.send(result);
                }),
            )
            .await?;
        debug!(stream_id, "waiting for response");

        let outcome = with_timeout_result(deadline, async {
            rx.await.map_err(|_| {
                ProtocolError::RequestFailed("response handler dropped without a result".to_string())
            })?
        })
        .await;

        if let Err(ProtocolError::Timeout) = &outcome {
            warn!(stream_id, "response timed out");
            session.cancel(stream_id);
        }
        outcome
    }

    pub async fn close(&self) {
        self.registry.close_all().await;
    }
}
