use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

use crate::connection::{Connected, Connector};
use crate::h1::HttpSession;
use crate::spdy::SpdySession;
use crate::types::{ClientConfig, ProtocolError, Session, Target};

/// Session for one origin. The slot stays locked while its connection is
/// being dialled, so concurrent first requests share one session.
type Slot = Arc<AsyncMutex<Option<Arc<dyn Session>>>>;

/// Live sessions keyed by `host:port`.
///
/// A session is opened on the first request to an origin and reused until it
/// closes or the peer sends GOAWAY; the next lookup then replaces it. Dialling
/// one origin never holds up lookups for another.
pub struct SessionRegistry {
    connector: Arc<dyn Connector>,
    config: ClientConfig,
    slots: Mutex<HashMap<String, Slot>>,
}

impl SessionRegistry {
    pub fn new(connector: Arc<dyn Connector>, config: ClientConfig) -> Self {
        Self {
            connector,
            config,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn slot(&self, key: &str) -> Slot {
        self.slots
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(None)))
            .clone()
    }

    /// Returns the usable session for `target`'s origin, connecting when
    /// there is none.
    pub async fn session(&self, target: &Target) -> Result<Arc<dyn Session>, ProtocolError> {
        let key = target
            .host_port()
            .ok_or_else(|| ProtocolError::InvalidTarget(format!("{} has no host", target)))?;
        let host = target.host().unwrap_or_default();
        let port = target
            .port()
            .ok_or_else(|| ProtocolError::InvalidTarget(format!("{} has no port", target)))?;

        let slot = self.slot(&key);
        let mut current = slot.lock().await;
        if let Some(session) = current.as_ref() {
            if session.is_available() {
                debug!(origin = %key, protocol = session.protocol(), "reusing session");
                return Ok(session.clone());
            }
            debug!(origin = %key, "replacing unusable session");
            *current = None;
        }

        let connected = self
            .connector
            .connect(target.scheme(), host, port)
            .await?;
        let session = self.open(connected)?;
        session.serve().await?;
        info!(origin = %key, protocol = session.protocol(), "new session");

        *current = Some(session.clone());
        Ok(session)
    }

    fn open(&self, connected: Connected) -> Result<Arc<dyn Session>, ProtocolError> {
        if connected.is_spdy() {
            Ok(Arc::new(SpdySession::new(connected.io, self.config.clone())?))
        } else {
            Ok(Arc::new(HttpSession::new(
                connected.io,
                self.config.timeouts.clone(),
            )))
        }
    }

    pub async fn get(&self, host_port: &str) -> Option<Arc<dyn Session>> {
        let slot = self.slots.lock().get(host_port).cloned()?;
        let session = slot.lock().await.clone();
        session
    }

    pub async fn remove(&self, host_port: &str) -> Option<Arc<dyn Session>> {
        let slot = self.slots.lock().remove(host_port)?;
        let session = slot.lock().await.take();
        session
    }

    /// Number of origins holding a session.
    pub async fn len(&self) -> usize {
        let slots: Vec<Slot> = self.slots.lock().values().cloned().collect();
        let mut count = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                count += 1;
            }
        }
        count
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Closes and forgets every session.
    pub async fn close_all(&self) {
        let slots: Vec<(String, Slot)> = self.slots.lock().drain().collect();
        for (origin, slot) in slots {
            let session = slot.lock().await.take();
            if let Some(session) = session {
                debug!(origin = %origin, "closing session");
                session.close().await;
            }
        }
    }
}
