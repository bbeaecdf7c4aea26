//! Accept-side glue between streams and an HTTP handler.
//!
//! [`serve`] runs a server-role session on an established byte channel.
//! Each accepted stream is translated into a [`Request`]; translation
//! failures answer with a `400` reply and RST_STREAM `REFUSED_STREAM`.
//! Successful requests reach the [`Handler`] with a body reader and a
//! [`ResponseWriter`] whose SYN_REPLY is deferred until the first body
//! write, so handlers that never write still produce a well-formed
//! FIN-carrying reply.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    error::Error,
    frame::{ControlFlags, RstStatus},
    header::{HDR_STATUS, HDR_VERSION, Headers},
    http::{self, Body, Request, response_status_line},
    session::{Role, Session},
    stream::Stream,
};

/// Application entry point for accepted requests.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, req: Request, body: Body, w: &mut ResponseWriter);
}

/// Serve SPDY requests arriving on `io` until the peer goes away.
///
/// # Errors
///
/// Returns the transport or codec error that ended the session; a clean
/// EOF reads as success.
pub async fn serve<T, H>(io: T, handler: H) -> Result<(), Error>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
    H: Handler,
{
    let handler = Arc::new(handler);
    let (_session, connection) = Session::new(io, Role::Server);
    connection
        .run(move |stream| {
            let handler = Arc::clone(&handler);
            async move { serve_stream(stream, &*handler).await }
        })
        .await
}

async fn serve_stream<H: Handler>(stream: Stream, handler: &H) {
    // Accepted streams carry their SYN_STREAM headers from creation.
    let Some(header) = stream.header().await else {
        return;
    };
    let req = match http::parse_request(&header) {
        Ok(req) => req,
        Err(e) => {
            log::warn!("spdy: read request failed: {e}");
            let mut h = Headers::new();
            h.set(HDR_STATUS, response_status_line(400));
            h.set(HDR_VERSION, "HTTP/1.1");
            if let Err(e) = stream.reply(h, ControlFlags::FIN).await {
                log::debug!("spdy: 400 reply failed: {e}");
            }
            let _ = stream.reset(RstStatus::RefusedStream).await;
            return;
        }
    };
    let body = Body::new(stream.clone(), req.content_length);
    let mut w = ResponseWriter::new(stream);
    handler.handle(req, body, &mut w).await;
    if let Err(e) = w.finish().await {
        log::debug!("spdy: finishing response: {e}");
    }
}

/// Writes one response over an accepted stream.
pub struct ResponseWriter {
    stream: Stream,
    headers: Headers,
    wrote_header: bool,
}

impl ResponseWriter {
    fn new(stream: Stream) -> Self {
        Self {
            stream,
            headers: Headers::new(),
            wrote_header: false,
        }
    }

    /// Response headers to be sent with the reply.
    ///
    /// Mutations after the reply has gone out have no effect.
    pub fn headers_mut(&mut self) -> &mut Headers { &mut self.headers }

    /// Send the reply with `status` and no FIN, permitting body writes.
    ///
    /// # Errors
    ///
    /// Returns the transport error if SYN_REPLY could not be written.
    pub async fn write_head(&mut self, status: u16) -> Result<(), Error> {
        self.send_head(status, false).await
    }

    /// Write body bytes, sending a `200` reply first if none was sent.
    ///
    /// # Errors
    ///
    /// Propagates reply and stream write failures.
    pub async fn write(&mut self, p: &[u8]) -> Result<usize, Error> {
        if !self.wrote_header {
            self.send_head(200, false).await?;
        }
        self.stream.write(p).await
    }

    /// Complete the response.
    ///
    /// A handler that never wrote gets its reply sent now with FIN set;
    /// otherwise the stream is half-closed with an empty FIN frame.
    async fn finish(&mut self) -> Result<(), Error> {
        if !self.wrote_header {
            return self.send_head(200, true).await;
        }
        self.stream.close().await
    }

    async fn send_head(&mut self, status: u16, fin: bool) -> Result<(), Error> {
        if self.wrote_header {
            log::warn!("spdy: multiple write_head calls");
            return Ok(());
        }
        self.wrote_header = true;

        if let Some(conn) = self.headers.get("Connection") {
            if conn != "close" {
                log::warn!("spdy: invalid Connection header set");
            }
        }
        let mut h = http::copy_visible(&self.headers);
        for field in http::BAD_RESP_HEADER_FIELDS {
            h.remove(field);
        }
        if status != 304 && !h.contains("Content-Type") {
            h.set("Content-Type", "text/plain");
        }
        h.set(HDR_STATUS, response_status_line(status));
        h.set(HDR_VERSION, "HTTP/1.1");

        let flags = if fin {
            ControlFlags::FIN
        } else {
            ControlFlags::NONE
        };
        match self.stream.reply(h, flags).await {
            Ok(()) => Ok(()),
            Err(e) => {
                log::warn!("spdy: reply failed: {e}");
                let _ = self.stream.reset(RstStatus::InternalError).await;
                Err(e)
            }
        }
    }
}
