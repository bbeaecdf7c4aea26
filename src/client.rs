//! Initiator-side glue: one request/response exchange per stream.
//!
//! A [`Client`] wraps a client-role session over an established byte
//! channel (TLS setup and protocol negotiation happen elsewhere). Each
//! [`request`](Client::request) opens a stream with the translated header
//! block, streams the body from a task of its own, then waits for the
//! SYN_REPLY rendezvous. Streams pushed by the server are refused with
//! RST_STREAM `REFUSED_STREAM` before user code ever sees them.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    error::Error,
    frame::RstStatus,
    http::{Body, Request, Response, parse_response, request_headers},
    session::{Role, Session},
};

/// A SPDY client connection.
pub struct Client {
    session: Session,
}

impl Client {
    /// Take over `io` as a client-role session, spawning its read loop.
    pub fn new<T>(io: T) -> Self
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (session, connection) = Session::new(io, Role::Client);
        tokio::spawn(async move {
            let result = connection
                .run(|stream| async move {
                    // Server push is not supported.
                    if let Err(e) = stream.reset(RstStatus::RefusedStream).await {
                        log::debug!("spdy: refusing pushed stream: {e}");
                    }
                })
                .await;
            if let Err(e) = result {
                log::warn!("spdy: session ended: {e}");
            }
        });
        Self { session }
    }

    /// The underlying session handle.
    #[must_use]
    pub fn session(&self) -> &Session { &self.session }

    /// Perform one request over a fresh stream.
    ///
    /// The initiating frame carries FIN exactly when the request has no
    /// body; otherwise the body is copied onto the stream and the writing
    /// side closed behind it.
    ///
    /// # Errors
    ///
    /// Fails on request translation errors, on session teardown before the
    /// reply arrives, or when the reply violates the response header rules
    /// (the stream is then reset with `PROTOCOL_ERROR`).
    pub async fn request(&self, req: Request) -> Result<(Response, Body), Error> {
        let (headers, flags) = request_headers(&req)?;
        let stream = self.session.open(headers, flags).await?;

        if let Some(body) = req.body.clone() {
            let writer = stream.clone();
            tokio::spawn(async move {
                if let Err(e) = writer.write(&body).await {
                    log::debug!("spdy: request body write: {e}");
                    return;
                }
                if let Err(e) = writer.close().await {
                    log::debug!("spdy: request body close: {e}");
                }
            });
        }

        let Some(reply) = stream.header().await else {
            return Err(Error::Closed);
        };
        match parse_response(&reply, &req.method) {
            Ok(resp) => {
                let body = Body::new(stream, resp.body_length);
                Ok((resp, body))
            }
            Err(e) => {
                let _ = stream.reset(RstStatus::ProtocolError).await;
                Err(e.into())
            }
        }
    }
}
