use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tracing::{debug, error, info, warn};

use super::compression::{HeaderCompressor, HeaderDecompressor};
use super::consts::{SPDY_VERSION, STREAM_ID_MASK};
use super::framing::{read_frame, write_frame};
use super::stream::Stream;
use crate::transport::Transport;
use crate::types::{
    ClientConfig, Frame, GoawayFrame, ProtocolError, Request, ResponseHandler, RstStreamFrame,
    Session, Setting, ALPN_SPDY2,
};

/// Hands out client stream ids: 1, 3, 5, ...
#[derive(Debug, Default)]
pub struct StreamIds {
    last_out_id: u32,
}

impl StreamIds {
    pub fn next_id(&mut self) -> Result<u32, ProtocolError> {
        let next = if self.last_out_id == 0 {
            1
        } else {
            self.last_out_id + 2
        };
        if next > STREAM_ID_MASK {
            return Err(ProtocolError::SessionClosed(
                "stream ids exhausted".to_string(),
            ));
        }
        self.last_out_id = next;
        Ok(next)
    }

    pub fn last(&self) -> u32 {
        self.last_out_id
    }

    /// Hands `id` back when nothing was sent for it, so the next stream
    /// reuses it.
    pub fn release(&mut self, id: u32) {
        if id == self.last_out_id {
            self.last_out_id = id.saturating_sub(2);
        }
    }
}

/// Everything the background tasks need until the session is served.
struct Pending {
    io: Box<dyn Transport>,
    outgoing: mpsc::Receiver<Frame>,
    compressor: HeaderCompressor,
}

struct Shared {
    config: ClientConfig,
    streams: Mutex<HashMap<u32, Stream>>,
    settings: Mutex<Vec<Setting>>,
    goaway: Mutex<Option<u32>>,
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
}

/// A SPDY/2 session over one connection.
///
/// `serve` starts three tasks. The send task owns the write half and the
/// header compressor, the receive task owns the read half and the header
/// decompressor, and the dispatch task routes decoded frames to streams.
/// Callers only ever touch the outgoing queue and the stream map.
pub struct SpdySession {
    shared: Arc<Shared>,
    ids: AsyncMutex<StreamIds>,
    outgoing: mpsc::Sender<Frame>,
    pending: Mutex<Option<Pending>>,
}

impl SpdySession {
    pub fn new(io: Box<dyn Transport>, config: ClientConfig) -> Result<Self, ProtocolError> {
        let (outgoing, outgoing_rx) = mpsc::channel(config.send_queue_capacity.max(1));
        let (shutdown, _) = watch::channel(false);
        let compressor = HeaderCompressor::new()?;

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                streams: Mutex::new(HashMap::new()),
                settings: Mutex::new(Vec::new()),
                goaway: Mutex::new(None),
                closed: AtomicBool::new(false),
                shutdown,
            }),
            ids: AsyncMutex::new(StreamIds::default()),
            outgoing,
            pending: Mutex::new(Some(Pending {
                io,
                outgoing: outgoing_rx,
                compressor,
            })),
        })
    }

    pub fn version(&self) -> u16 {
        SPDY_VERSION
    }

    /// Settings from the most recent SETTINGS frame.
    pub fn settings(&self) -> Vec<Setting> {
        self.shared.settings.lock().clone()
    }

    /// Last good stream id announced by a GOAWAY, if one arrived.
    pub fn goaway(&self) -> Option<u32> {
        *self.shared.goaway.lock()
    }

    pub fn active_streams(&self) -> usize {
        self.shared.streams.lock().len()
    }

    pub async fn last_stream_id(&self) -> u32 {
        self.ids.lock().await.last()
    }

    fn check_open(&self) -> Result<(), ProtocolError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(ProtocolError::SessionClosed(
                "session is closed".to_string(),
            ));
        }
        if let Some(last_good_stream_id) = self.goaway() {
            return Err(ProtocolError::GoAway {
                last_good_stream_id,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Session for SpdySession {
    fn protocol(&self) -> &str {
        ALPN_SPDY2
    }

    async fn serve(&self) -> Result<(), ProtocolError> {
        if self.is_closed() {
            return Err(ProtocolError::SessionClosed(
                "session is closed".to_string(),
            ));
        }
        let Some(pending) = self.pending.lock().take() else {
            return Ok(());
        };

        let (reader, writer) = tokio::io::split(pending.io);
        let (incoming_tx, incoming_rx) =
            mpsc::channel(self.shared.config.receive_queue_capacity.max(1));

        tokio::spawn(send_loop(
            self.shared.clone(),
            writer,
            pending.outgoing,
            pending.compressor,
        ));
        tokio::spawn(receive_loop(self.shared.clone(), reader, incoming_tx));
        tokio::spawn(dispatch_loop(self.shared.clone(), incoming_rx));

        info!("SPDY session is serving");
        Ok(())
    }

    async fn request(
        &self,
        request: Request,
        handler: ResponseHandler,
    ) -> Result<u32, ProtocolError> {
        self.check_open()?;
        debug!(method = %request.method, url = %request.target, "request");

        // Held until the frames are queued so SYN_STREAMs leave in id order.
        let mut ids = self.ids.lock().await;
        let stream_id = ids.next_id()?;
        let mut stream = Stream::new(stream_id, handler);
        let frames = match stream.syn(&request) {
            Ok(frames) => frames,
            Err(err) => {
                ids.release(stream_id);
                return Err(err);
            }
        };

        {
            let mut streams = self.shared.streams.lock();
            self.check_open()?;
            streams.insert(stream_id, stream);
        }

        for frame in frames {
            if self.outgoing.send(frame).await.is_err() {
                // Teardown already failed the stream if it got to it first.
                let orphan = self.shared.streams.lock().remove(&stream_id);
                return match orphan {
                    Some(_) => Err(ProtocolError::SessionClosed(
                        "send queue closed".to_string(),
                    )),
                    None => Ok(stream_id),
                };
            }
        }
        drop(ids);

        Ok(stream_id)
    }

    fn cancel(&self, stream_id: u32) -> bool {
        let stream = self.shared.streams.lock().remove(&stream_id);
        match stream {
            Some(mut stream) => {
                info!(stream_id, "stream cancelled");
                stream.fail(ProtocolError::Cancelled);
                true
            }
            None => false,
        }
    }

    fn is_available(&self) -> bool {
        self.check_open().is_ok()
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.shared
            .teardown(ProtocolError::SessionClosed("closed by client".to_string()));
    }
}

impl Drop for SpdySession {
    fn drop(&mut self) {
        self.shared
            .teardown(ProtocolError::SessionClosed("session dropped".to_string()));
    }
}

impl Shared {
    /// Marks the session closed, stops the tasks and fails every live stream
    /// with `reason`. Only the first call has an effect.
    fn teardown(&self, reason: ProtocolError) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.send_replace(true);

        let streams: Vec<Stream> = self.streams.lock().drain().map(|(_, s)| s).collect();
        match &reason {
            ProtocolError::SessionClosed(_) => {
                info!(reason = %reason, streams = streams.len(), "session closed")
            }
            _ => error!(error = %reason, streams = streams.len(), "session torn down"),
        }
        for mut stream in streams {
            stream.fail(reason.clone());
        }
    }

    /// Runs `op` on the stream outside the map lock, so handlers may call
    /// back into the session, then puts it back unless it finished.
    fn with_stream<F>(&self, stream_id: u32, op: F)
    where
        F: FnOnce(&mut Stream) -> Result<(), ProtocolError>,
    {
        let removed = self.streams.lock().remove(&stream_id);
        let Some(mut stream) = removed else {
            warn!(
                stream_id,
                error = %ProtocolError::StreamNotFound(stream_id),
                "dropping frame"
            );
            return;
        };

        if let Err(err) = op(&mut stream) {
            warn!(stream_id, error = %err, "dropping frame");
        }
        if stream.is_finished() {
            return;
        }

        let mut streams = self.streams.lock();
        if self.closed.load(Ordering::SeqCst) {
            drop(streams);
            stream.fail(ProtocolError::SessionClosed(
                "session closed".to_string(),
            ));
        } else {
            streams.insert(stream_id, stream);
        }
    }

    fn dispatch(&self, frame: Frame) {
        debug!(frame = frame.name(), stream_id = ?frame.stream_id(), "dispatch");
        match frame {
            Frame::SynReply(reply) => {
                self.with_stream(reply.stream_id, |stream| stream.reply_to_response(&reply))
            }
            Frame::Data(data) => {
                self.with_stream(data.stream_id, |stream| stream.data_to_response(&data))
            }
            Frame::Settings(settings) => {
                debug!(entries = settings.settings.len(), "replacing settings");
                *self.settings.lock() = settings.settings;
            }
            Frame::Goaway(goaway) => self.on_goaway(goaway),
            Frame::RstStream(rst) => self.on_rst_stream(rst),
            Frame::SynStream(syn) => {
                warn!(
                    stream_id = syn.stream_id,
                    associated_id = syn.associated_id,
                    error = %ProtocolError::UnsupportedControlFrame("server push".to_string()),
                    "ignoring server-initiated stream"
                );
            }
            Frame::Headers(headers) => {
                debug!(
                    stream_id = headers.stream_id,
                    error = %ProtocolError::UnsupportedControlFrame("HEADERS".to_string()),
                    "ignoring frame"
                );
            }
            Frame::Ping(ping) => debug!(id = ping.id, "ignoring PING"),
            Frame::Noop => debug!("ignoring NOOP"),
        }
    }

    fn on_goaway(&self, goaway: GoawayFrame) {
        let last_good_stream_id = goaway.last_good_stream_id;
        info!(last_good_stream_id, "peer is going away");
        *self.goaway.lock() = Some(last_good_stream_id);

        let refused: Vec<Stream> = {
            let mut streams = self.streams.lock();
            let ids: Vec<u32> = streams
                .keys()
                .copied()
                .filter(|id| *id > last_good_stream_id)
                .collect();
            ids.iter().filter_map(|id| streams.remove(id)).collect()
        };
        for mut stream in refused {
            stream.fail(ProtocolError::GoAway {
                last_good_stream_id,
            });
        }
    }

    fn on_rst_stream(&self, rst: RstStreamFrame) {
        let stream = self.streams.lock().remove(&rst.stream_id);
        match stream {
            Some(mut stream) => stream.fail(ProtocolError::StreamReset {
                stream_id: rst.stream_id,
                status: rst.status,
            }),
            None => warn!(stream_id = rst.stream_id, "RST_STREAM for unknown stream"),
        }
    }
}

async fn send_loop(
    shared: Arc<Shared>,
    mut writer: WriteHalf<Box<dyn Transport>>,
    mut outgoing: mpsc::Receiver<Frame>,
    mut compressor: HeaderCompressor,
) {
    let mut shutdown = shared.shutdown.subscribe();
    let write_timeout = shared.config.timeouts.write;

    while !*shutdown.borrow() {
        let frame = tokio::select! {
            _ = shutdown.changed() => break,
            frame = outgoing.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        match write_frame(&mut writer, &frame, &mut compressor, write_timeout).await {
            Ok(()) => {}
            // Rejected before reaching the compressor: only this stream is lost.
            Err(err @ ProtocolError::HeaderEncodingError(_)) => match frame.stream_id() {
                Some(stream_id) => {
                    let stream = shared.streams.lock().remove(&stream_id);
                    if let Some(mut stream) = stream {
                        stream.fail(err);
                    }
                }
                None => warn!(error = %err, "dropping outgoing frame"),
            },
            Err(err) => {
                shared.teardown(err);
                break;
            }
        }
    }

    let _ = writer.shutdown().await;
    debug!("send loop finished");
}

async fn receive_loop(
    shared: Arc<Shared>,
    mut reader: ReadHalf<Box<dyn Transport>>,
    incoming: mpsc::Sender<Result<Frame, ProtocolError>>,
) {
    let mut shutdown = shared.shutdown.subscribe();
    let mut decompressor = HeaderDecompressor::new();
    let read_timeout = shared.config.timeouts.read;

    while !*shutdown.borrow() {
        let result = tokio::select! {
            _ = shutdown.changed() => break,
            result = read_frame(&mut reader, &mut decompressor, read_timeout) => result,
        };

        let fatal = match result {
            Ok(frame) => {
                if incoming.send(Ok(frame)).await.is_err() {
                    break;
                }
                continue;
            }
            Err(err) if !err.is_session_fatal() => {
                warn!(error = %err, "skipping frame");
                continue;
            }
            Err(ProtocolError::Io(err)) if err.kind() == ErrorKind::UnexpectedEof => {
                ProtocolError::SessionClosed("connection closed by peer".to_string())
            }
            Err(err) => err,
        };

        // Frames already queued are dispatched before the session goes down.
        if let Err(mpsc::error::SendError(Err(fatal))) = incoming.send(Err(fatal)).await {
            shared.teardown(fatal);
        }
        break;
    }
    debug!("receive loop finished");
}

async fn dispatch_loop(
    shared: Arc<Shared>,
    mut incoming: mpsc::Receiver<Result<Frame, ProtocolError>>,
) {
    while let Some(item) = incoming.recv().await {
        match item {
            Ok(frame) => shared.dispatch(frame),
            Err(err) => {
                shared.teardown(err);
                break;
            }
        }
    }
    debug!("dispatch loop finished");
}
