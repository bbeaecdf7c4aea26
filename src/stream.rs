//! One logical SPDY stream.
//!
//! A [`Stream`] is a cheaply cloneable handle over shared state: the receive
//! pipe fed by the session's reader task, the send window replenished by
//! WINDOW_UPDATE frames, the half-close flags for each direction, and the
//! single-slot rendezvous that delivers SYN_REPLY headers to the initiator.
//!
//! Half-closes are one-way and idempotent. Once both directions are closed
//! the session drops the stream from its table.

use std::sync::{Arc, Mutex, Weak};

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::{
    error::Error,
    frame::{ControlFlags, Frame, RstStatus},
    header::Headers,
    pipe::Pipe,
    session::SessionCore,
    window::Window,
};

/// Fixed capacity of the per-stream receive buffer.
pub(crate) const RECV_BUFFER_CAPACITY: usize = 64 * 1024;

enum ReplySlot {
    /// Initiating side, SYN_REPLY not yet received.
    Waiting(oneshot::Receiver<Option<Headers>>),
    /// Headers known: captured at creation on the accepting side, or the
    /// rendezvous outcome on the initiating side.
    Ready(Option<Headers>),
}

struct HalfClose {
    writable: bool,
    rclosed: bool,
    wclosed: bool,
    werr: Option<Error>,
}

pub(crate) struct StreamInner {
    id: u32,
    session: Weak<SessionCore>,
    pipe: Pipe,
    window: Window,
    state: Mutex<HalfClose>,
    reply_tx: Mutex<Option<oneshot::Sender<Option<Headers>>>>,
    reply_slot: tokio::sync::Mutex<ReplySlot>,
}

impl StreamInner {
    /// Build the state for a remote-initiated stream carrying `headers`.
    pub(crate) fn accepted(
        id: u32,
        session: Weak<SessionCore>,
        send_window: i32,
        headers: Headers,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            session,
            pipe: Pipe::new(RECV_BUFFER_CAPACITY),
            window: Window::new(send_window),
            state: Mutex::new(HalfClose {
                writable: false,
                rclosed: false,
                wclosed: false,
                werr: None,
            }),
            reply_tx: Mutex::new(None),
            reply_slot: tokio::sync::Mutex::new(ReplySlot::Ready(Some(headers))),
        })
    }

    /// Build the state for a locally initiated stream.
    ///
    /// Bidirectional opens get a reply rendezvous; unidirectional opens
    /// resolve `header()` to `None` up front and close the local reader.
    pub(crate) fn initiated(
        id: u32,
        session: Weak<SessionCore>,
        send_window: i32,
        unidirectional: bool,
    ) -> Arc<Self> {
        let (reply_tx, reply_slot) = if unidirectional {
            (None, ReplySlot::Ready(None))
        } else {
            let (tx, rx) = oneshot::channel();
            (Some(tx), ReplySlot::Waiting(rx))
        };
        let inner = Arc::new(Self {
            id,
            session,
            pipe: Pipe::new(RECV_BUFFER_CAPACITY),
            window: Window::new(send_window),
            state: Mutex::new(HalfClose {
                writable: true,
                rclosed: false,
                wclosed: false,
                werr: None,
            }),
            reply_tx: Mutex::new(reply_tx),
            reply_slot: tokio::sync::Mutex::new(reply_slot),
        });
        if unidirectional {
            inner.rclose(Some(Error::Closed));
        }
        inner
    }

    fn core(&self) -> Result<Arc<SessionCore>, Error> {
        self.session.upgrade().ok_or(Error::Closed)
    }

    /// Hand SYN_REPLY headers to a parked `header()` call.
    ///
    /// Fails when the rendezvous was already consumed, which the session
    /// treats as a duplicate SYN_REPLY.
    pub(crate) fn deliver_reply(&self, headers: Headers) -> Result<(), Error> {
        match self.reply_tx.lock().unwrap().take() {
            Some(tx) => {
                let _ = tx.send(Some(headers));
                Ok(())
            }
            None => Err(Error::AlreadyReplied),
        }
    }

    /// Resolve a pending reply rendezvous with `None`, if any.
    pub(crate) fn abort_reply(&self) {
        if let Some(tx) = self.reply_tx.lock().unwrap().take() {
            let _ = tx.send(None);
        }
    }

    /// Half-close the reading direction. `None` is an orderly remote FIN.
    pub(crate) fn rclose(&self, reason: Option<Error>) {
        {
            let mut state = self.state.lock().unwrap();
            if state.rclosed {
                return;
            }
            state.rclosed = true;
        }
        self.pipe.close(reason);
        self.remove_if_done();
    }

    /// Half-close the writing direction with `reason`.
    pub(crate) fn wclose(&self, reason: Error) {
        {
            let mut state = self.state.lock().unwrap();
            if state.wclosed {
                return;
            }
            state.wclosed = true;
            state.werr = Some(reason.clone());
        }
        self.window.close(reason);
        self.remove_if_done();
    }

    pub(crate) fn is_rclosed(&self) -> bool { self.state.lock().unwrap().rclosed }

    pub(crate) fn both_closed(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.rclosed && state.wclosed
    }

    /// Feed inbound DATA into the receive pipe. Never waits.
    pub(crate) fn recv_data(&self, data: &[u8]) -> Result<usize, Error> { self.pipe.write(data) }

    /// Apply a WINDOW_UPDATE credit grant.
    pub(crate) fn release_window(&self, delta: i32) -> Result<(), Error> {
        self.window.release(delta)
    }

    fn remove_if_done(&self) {
        if self.both_closed() {
            if let Some(core) = self.session.upgrade() {
                core.remove_stream(self.id);
            }
        }
    }
}

/// Handle to one stream of a session.
#[derive(Clone)]
pub struct Stream {
    inner: Arc<StreamInner>,
}

impl Stream {
    pub(crate) fn from_inner(inner: Arc<StreamInner>) -> Self { Self { inner } }

    /// Stream identifier.
    #[must_use]
    pub fn id(&self) -> u32 { self.inner.id }

    /// The peer's header block.
    ///
    /// On an accepted stream this returns the SYN_STREAM headers
    /// immediately. On an initiated stream it waits for SYN_REPLY and
    /// returns `None` if the stream was opened unidirectional, reset, or the
    /// session went away before a reply arrived.
    pub async fn header(&self) -> Option<Headers> {
        let mut slot = self.inner.reply_slot.lock().await;
        match std::mem::replace(&mut *slot, ReplySlot::Ready(None)) {
            ReplySlot::Ready(headers) => {
                *slot = ReplySlot::Ready(headers.clone());
                headers
            }
            ReplySlot::Waiting(rx) => {
                let headers = rx.await.unwrap_or(None);
                *slot = ReplySlot::Ready(headers.clone());
                headers
            }
        }
    }

    /// Send SYN_REPLY with `headers`, making the stream writable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyReplied`] on a second call, or the transport
    /// error if the frame could not be written.
    pub async fn reply(&self, headers: Headers, flags: ControlFlags) -> Result<(), Error> {
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.writable {
                return Err(Error::AlreadyReplied);
            }
            if state.wclosed {
                return Err(state.werr.clone().unwrap_or(Error::Closed));
            }
            state.writable = true;
        }
        let core = self.inner.core()?;
        core.write_frame(Frame::SynReply {
            stream_id: self.inner.id,
            flags,
            headers,
        })
        .await?;
        if flags.contains(ControlFlags::FIN) {
            self.inner.wclose(Error::Closed);
        }
        Ok(())
    }

    /// Read the contents of DATA frames received on this stream.
    ///
    /// Returns `Ok(0)` at end of stream. Each successful read grants the
    /// peer a matching WINDOW_UPDATE.
    ///
    /// # Errors
    ///
    /// Returns the close reason once the buffered data is drained:
    /// [`Error::Reset`] after an RST_STREAM, [`Error::Closed`] after session
    /// teardown.
    pub async fn read(&self, p: &mut [u8]) -> Result<usize, Error> {
        let n = self.inner.pipe.read(p).await?;
        if n > 0 {
            if let Ok(core) = self.inner.core() {
                let update = Frame::WindowUpdate {
                    stream_id: self.inner.id,
                    delta: n as u32,
                };
                if let Err(e) = core.write_frame(update).await {
                    log::debug!("spdy: stream {}: window update failed: {e}", self.inner.id);
                }
            }
        }
        Ok(n)
    }

    /// Write `p` as the contents of one or more DATA frames.
    ///
    /// Waits for send-window credit and emits one frame per grant, so a
    /// single call is never interleaved with other streams' data mid-frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotWritable`] before `reply` on an accepted stream,
    /// the window's close reason if it closes mid-transfer (after telling
    /// the peer via RST_STREAM `INTERNAL_ERROR`), or the transport error.
    pub async fn write(&self, p: &[u8]) -> Result<usize, Error> {
        {
            let state = self.inner.state.lock().unwrap();
            if !state.writable {
                return Err(Error::NotWritable);
            }
            if state.wclosed {
                return Err(state.werr.clone().unwrap_or(Error::Closed));
            }
        }
        let core = self.inner.core()?;
        let mut sent = 0;
        while sent < p.len() {
            let grant = match self.inner.window.acquire(p.len() - sent).await {
                Ok(grant) => grant,
                Err(e) => {
                    let rst = Frame::RstStream {
                        stream_id: self.inner.id,
                        status: RstStatus::InternalError,
                    };
                    let _ = core.write_frame(rst).await;
                    return Err(e);
                }
            };
            core.write_frame(Frame::Data {
                stream_id: self.inner.id,
                fin: false,
                data: Bytes::copy_from_slice(&p[sent..sent + grant]),
            })
            .await?;
            sent += grant;
        }
        Ok(sent)
    }

    /// Send an empty DATA frame with FIN, half-closing the writing side.
    ///
    /// To close both sides, use [`reset`](Self::reset).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotWritable`] before `reply`, or the close reason if
    /// the writing side is already shut.
    pub async fn close(&self) -> Result<(), Error> {
        {
            let state = self.inner.state.lock().unwrap();
            if !state.writable {
                return Err(Error::NotWritable);
            }
            if state.wclosed {
                return Err(state.werr.clone().unwrap_or(Error::Closed));
            }
        }
        let core = self.inner.core()?;
        core.write_frame(Frame::Data {
            stream_id: self.inner.id,
            fin: true,
            data: Bytes::new(),
        })
        .await?;
        self.inner.wclose(Error::Closed);
        Ok(())
    }

    /// Send RST_STREAM with `status` and tear down both directions.
    ///
    /// Resetting a stream that was already reset is a no-op; an orderly
    /// closed stream still emits the frame so the peer learns of the abort.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the frame could not be written.
    pub async fn reset(&self, status: RstStatus) -> Result<(), Error> {
        {
            let state = self.inner.state.lock().unwrap();
            if state.rclosed
                && state.wclosed
                && matches!(state.werr, Some(Error::Reset(_)))
            {
                return Ok(());
            }
        }
        let core = self.inner.core()?;
        core.write_frame(Frame::RstStream {
            stream_id: self.inner.id,
            status,
        })
        .await?;
        self.inner.abort_reply();
        self.inner.rclose(Some(Error::Reset(status)));
        self.inner.wclose(Error::Reset(status));
        Ok(())
    }
}
