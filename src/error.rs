//! Canonical error types for the crate.
//!
//! A single [`Error`] surface covers session lifecycle, stream state, and
//! flow-control failures. Close reasons are stored inside pipes and send
//! windows and handed back to every parked waiter, so the type is cheaply
//! cloneable; transport errors are shared behind an `Arc`.

use std::sync::Arc;

use thiserror::Error;

use crate::{frame::RstStatus, http::HttpError};

/// Top-level error type exposed by `spdywire`.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error {
    /// The stream or session has been closed.
    #[error("closed")]
    Closed,
    /// `reply` was called on a stream that already sent SYN_REPLY.
    #[error("already replied")]
    AlreadyReplied,
    /// A write was attempted before the stream became writable.
    #[error("not writable; must reply first")]
    NotWritable,
    /// The stream was torn down by an RST_STREAM.
    #[error("stream was reset: {0}")]
    Reset(RstStatus),
    /// The peer violated flow control on this stream.
    #[error("flow control violated")]
    FlowControl,
    /// A window credit grant was non-positive or wrapped the window.
    #[error("bad window increment")]
    BadIncrement,
    /// Inbound data did not fit the fixed receive buffer.
    #[error("write on full buffer")]
    BufferFull,
    /// An error in the underlying transport or frame codec.
    #[error("transport error: {0}")]
    Io(#[source] Arc<std::io::Error>),
    /// An HTTP translation error from the adapter layer.
    #[error(transparent)]
    Http(#[from] HttpError),
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self { Self::Io(Arc::new(error)) }
}

/// Canonical result alias used by `spdywire` public APIs.
pub type Result<T> = std::result::Result<T, Error>;
