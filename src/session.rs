//! SPDY/3 session: frame demultiplexing over one byte channel.
//!
//! [`Session::new`] splits an established full-duplex transport into a
//! framed reader and writer. The returned [`Connection`] is the read loop:
//! exactly one task drives it, dispatching each inbound frame to per-stream
//! state and spawning the accept handler for remote-initiated streams. All
//! outbound frames funnel through a single async mutex so payloads are never
//! interleaved on the wire, and the reader never waits on that mutex
//! itself: PING echoes and reader-initiated RST_STREAMs go through
//! short-lived tasks.
//!
//! Stream ids allocated by [`Session::open`] are interlocked with the
//! emission of their SYN_STREAM, so the peer observes strictly increasing
//! ids.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
};

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::{
    codec::{FramedRead, FramedWrite},
    sync::CancellationToken,
};

use crate::{
    codec::{FrameDecoder, FrameEncoder},
    error::Error,
    frame::{
        ControlFlags, DEFAULT_INITIAL_WINDOW, Frame, RstStatus, SETTINGS_INITIAL_WINDOW_SIZE,
        Setting,
    },
    header::Headers,
    stream::{Stream, StreamInner},
};

type BoxRead = Box<dyn AsyncRead + Send + Unpin>;
type BoxWrite = Box<dyn AsyncWrite + Send + Unpin>;

/// Which side of the connection this endpoint is.
///
/// Servers accept odd stream ids and allocate even ones; clients the
/// reverse.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

struct Shared {
    last_recv_id: u32,
    initial_window: i32,
    closing: bool,
}

pub(crate) struct SessionCore {
    role: Role,
    streams: RwLock<HashMap<u32, Arc<StreamInner>>>,
    writer: tokio::sync::Mutex<FramedWrite<BoxWrite, FrameEncoder>>,
    next_id: tokio::sync::Mutex<u32>,
    shared: Mutex<Shared>,
    done: CancellationToken,
}

impl SessionCore {
    /// Write one frame under the session write lock, flushing to the wire.
    pub(crate) async fn write_frame(&self, frame: Frame) -> Result<(), Error> {
        let mut writer = self.writer.lock().await;
        writer.send(frame).await?;
        Ok(())
    }

    pub(crate) fn remove_stream(&self, id: u32) {
        self.streams.write().unwrap().remove(&id);
    }

    fn lookup(&self, id: u32) -> Option<Arc<StreamInner>> {
        self.streams.read().unwrap().get(&id).cloned()
    }

    /// Emit RST_STREAM from a task of its own so the read loop never waits
    /// on the write path.
    fn spawn_reset(this: &Arc<Self>, id: u32, status: RstStatus) {
        let core = Arc::clone(this);
        tokio::spawn(async move {
            let frame = Frame::RstStream {
                stream_id: id,
                status,
            };
            if let Err(e) = core.write_frame(frame).await {
                log::debug!("spdy: rst_stream {id}: {e}");
            }
        });
    }

    fn dispatch<H, Fut>(this: &Arc<Self>, frame: Frame, handler: &H)
    where
        H: Fn(Stream) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        match frame {
            Frame::SynStream {
                stream_id,
                flags,
                headers,
                ..
            } => Self::handle_syn_stream(this, stream_id, flags, headers, handler),
            Frame::SynReply {
                stream_id,
                flags,
                headers,
            } => Self::handle_syn_reply(this, stream_id, flags, headers),
            Frame::RstStream { stream_id, status } => this.handle_rst_stream(stream_id, status),
            Frame::Settings { entries } => this.handle_settings(&entries),
            Frame::Ping { id } => {
                let core = Arc::clone(this);
                tokio::spawn(async move {
                    if let Err(e) = core.write_frame(Frame::Ping { id }).await {
                        log::debug!("spdy: ping echo: {e}");
                    }
                });
            }
            Frame::WindowUpdate { stream_id, delta } => {
                Self::handle_window_update(this, stream_id, delta);
            }
            Frame::Data {
                stream_id,
                fin,
                data,
            } => Self::handle_data(this, stream_id, fin, &data),
            other => {
                log::debug!("spdy: ignoring unhandled {} frame", other.name());
            }
        }
    }

    fn handle_syn_stream<H, Fut>(
        this: &Arc<Self>,
        id: u32,
        flags: ControlFlags,
        headers: Headers,
        handler: &H,
    ) where
        H: Fn(Stream) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let from_server = id % 2 == 0;
        let initial_window = {
            let mut shared = this.shared.lock().unwrap();
            if (this.role == Role::Server) == from_server || id <= shared.last_recv_id {
                drop(shared);
                Self::spawn_reset(this, id, RstStatus::ProtocolError);
                return;
            }
            shared.last_recv_id = id;
            if shared.closing {
                return;
            }
            shared.initial_window
        };
        let inner = StreamInner::accepted(id, Arc::downgrade(this), initial_window, headers);
        this.streams
            .write()
            .unwrap()
            .insert(id, Arc::clone(&inner));
        if flags.contains(ControlFlags::UNIDIRECTIONAL) {
            inner.wclose(Error::Closed);
        }
        if flags.contains(ControlFlags::FIN) {
            inner.rclose(None);
        }
        tokio::spawn(handler(Stream::from_inner(inner)));
    }

    fn handle_syn_reply(this: &Arc<Self>, id: u32, flags: ControlFlags, headers: Headers) {
        let Some(stream) = this.lookup(id) else {
            Self::spawn_reset(this, id, RstStatus::InvalidStream);
            return;
        };
        if stream.deliver_reply(headers).is_err() {
            Self::spawn_reset(this, id, RstStatus::InvalidStream);
            return;
        }
        if flags.contains(ControlFlags::FIN) {
            stream.rclose(None);
        }
    }

    fn handle_rst_stream(&self, id: u32, status: RstStatus) {
        if let Some(stream) = self.lookup(id) {
            stream.abort_reply();
            stream.rclose(Some(Error::Reset(status)));
            stream.wclose(Error::Reset(status));
        }
    }

    fn handle_settings(&self, entries: &[Setting]) {
        let mut shared = self.shared.lock().unwrap();
        for entry in entries {
            if entry.id == SETTINGS_INITIAL_WINDOW_SIZE && entry.value < 1 << 31 {
                // Applies to streams created from here on, not live ones.
                shared.initial_window = entry.value as i32;
            }
        }
    }

    fn handle_window_update(this: &Arc<Self>, id: u32, delta: u32) {
        // Updates for unknown ids are allowed after a local FIN; drop them.
        let Some(stream) = this.lookup(id) else {
            return;
        };
        if matches!(
            stream.release_window(delta as i32),
            Err(Error::BadIncrement)
        ) {
            Self::spawn_reset(this, id, RstStatus::FlowControlError);
            stream.abort_reply();
            stream.rclose(Some(Error::FlowControl));
            stream.wclose(Error::FlowControl);
        }
    }

    fn handle_data(this: &Arc<Self>, id: u32, fin: bool, data: &[u8]) {
        let Some(stream) = this.lookup(id) else {
            Self::spawn_reset(this, id, RstStatus::InvalidStream);
            return;
        };
        if stream.is_rclosed() {
            Self::spawn_reset(this, id, RstStatus::StreamAlreadyClosed);
            return;
        }
        let overflow = stream.recv_data(data).is_err();
        if fin {
            stream.rclose(None);
        }
        if overflow {
            Self::spawn_reset(this, id, RstStatus::FlowControlError);
            stream.abort_reply();
            stream.rclose(Some(Error::FlowControl));
            stream.wclose(Error::FlowControl);
        }
    }

    /// Tear down every live stream and wake all of their waiters.
    fn teardown(&self) {
        self.shared.lock().unwrap().closing = true;
        let streams: Vec<_> = self
            .streams
            .write()
            .unwrap()
            .drain()
            .map(|(_, stream)| stream)
            .collect();
        for stream in streams {
            stream.abort_reply();
            stream.rclose(Some(Error::Closed));
            stream.wclose(Error::Closed);
        }
        self.done.cancel();
    }
}

/// Handle to a running session.
#[derive(Clone)]
pub struct Session {
    core: Arc<SessionCore>,
}

impl Session {
    /// Wrap an established full-duplex byte channel.
    ///
    /// Returns the session handle and the [`Connection`] read loop, which
    /// must be driven (usually on its own task) for any progress to happen.
    pub fn new<T>(io: T, role: Role) -> (Self, Connection)
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(io);
        let reader = FramedRead::new(Box::new(read_half) as BoxRead, FrameDecoder::new());
        let writer = FramedWrite::new(Box::new(write_half) as BoxWrite, FrameEncoder::new());
        let core = Arc::new(SessionCore {
            role,
            streams: RwLock::new(HashMap::new()),
            writer: tokio::sync::Mutex::new(writer),
            next_id: tokio::sync::Mutex::new(match role {
                Role::Client => 1,
                Role::Server => 2,
            }),
            shared: Mutex::new(Shared {
                last_recv_id: 0,
                initial_window: DEFAULT_INITIAL_WINDOW,
                closing: false,
            }),
            done: CancellationToken::new(),
        });
        let session = Self {
            core: Arc::clone(&core),
        };
        (session, Connection { reader, core })
    }

    /// Open a new stream, sending SYN_STREAM with `headers`.
    ///
    /// `ControlFlags::FIN` half-closes the writing side immediately;
    /// `ControlFlags::UNIDIRECTIONAL` declares that this side will not read,
    /// making [`Stream::header`] resolve to `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] once the session is shutting down, or the
    /// transport error if SYN_STREAM could not be written (the stream is
    /// then fully closed).
    pub async fn open(&self, headers: Headers, flags: ControlFlags) -> Result<Stream, Error> {
        let core = &self.core;
        if core.shared.lock().unwrap().closing {
            return Err(Error::Closed);
        }
        // Hold the id allocation lock across the SYN_STREAM write so ids
        // reach the peer in increasing order.
        let mut next_id = core.next_id.lock().await;
        let id = *next_id;
        *next_id += 2;
        let initial_window = core.shared.lock().unwrap().initial_window;
        let inner = StreamInner::initiated(
            id,
            Arc::downgrade(core),
            initial_window,
            flags.contains(ControlFlags::UNIDIRECTIONAL),
        );
        core.streams
            .write()
            .unwrap()
            .insert(id, Arc::clone(&inner));
        let result = core
            .write_frame(Frame::SynStream {
                stream_id: id,
                associated_id: 0,
                priority: 0,
                flags,
                headers,
            })
            .await;
        drop(next_id);
        match result {
            Ok(()) => {
                if flags.contains(ControlFlags::FIN) {
                    inner.wclose(Error::Closed);
                }
                Ok(Stream::from_inner(inner))
            }
            Err(e) => {
                inner.abort_reply();
                inner.rclose(Some(e.clone()));
                inner.wclose(e.clone());
                core.remove_stream(id);
                Err(e)
            }
        }
    }

    /// Whether the session has been torn down.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.core.done.is_cancelled() }

    /// Wait for session teardown.
    pub async fn closed(&self) { self.core.done.cancelled().await; }
}

/// The session's read loop.
pub struct Connection {
    reader: FramedRead<BoxRead, FrameDecoder>,
    core: Arc<SessionCore>,
}

impl Connection {
    /// Read and dispatch frames until the transport closes.
    ///
    /// `handler` runs on a task of its own for every accepted inbound
    /// stream. On exit every live stream is closed, waking all parked
    /// readers, writers, and header waiters.
    ///
    /// # Errors
    ///
    /// Returns the transport or codec error that ended the session; a clean
    /// EOF from the peer reads as success.
    pub async fn run<H, Fut>(mut self, handler: H) -> Result<(), Error>
    where
        H: Fn(Stream) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let result = loop {
            match self.reader.next().await {
                Some(Ok(frame)) => {
                    SessionCore::dispatch(&self.core, frame, &handler);
                }
                Some(Err(e)) => break Err(Error::from(e)),
                None => break Ok(()),
            }
        };
        self.core.teardown();
        result
    }
}
