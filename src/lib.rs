//! Asynchronous SPDY/3 framing and stream multiplexing.
//!
//! This crate demultiplexes a single full-duplex byte channel into
//! independent, flow-controlled streams per the SPDY/3 draft. A
//! [`Session`] owns the framed transport and a table of live streams;
//! exactly one task drives its [`Connection`] read loop while any number
//! of tasks read, write, and open streams concurrently. The `http` module
//! and the [`server`]/[`client`] glue translate streams into plain
//! request/response exchanges.
//!
//! Transport setup (TCP, TLS, protocol negotiation) is the caller's
//! business: everything here starts from an established
//! `AsyncRead + AsyncWrite` channel.
//!
//! # Examples
//!
//! Serving SPDY requests on an accepted connection:
//!
//! ```no_run
//! use async_trait::async_trait;
//! use spdywire::{
//!     Handler, ResponseWriter, serve,
//!     http::{Body, Request},
//! };
//!
//! struct Hello;
//!
//! #[async_trait]
//! impl Handler for Hello {
//!     async fn handle(&self, _req: Request, _body: Body, w: &mut ResponseWriter) {
//!         let _ = w.write(b"hello").await;
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> spdywire::Result<()> {
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:4040").await?;
//!     let (conn, _addr) = listener.accept().await?;
//!     serve(conn, Hello).await
//! }
//! ```

mod buffer;
pub mod client;
pub mod codec;
pub mod error;
pub mod frame;
pub mod header;
pub mod http;
mod pipe;
pub mod server;
pub mod session;
pub mod stream;
mod window;

pub use client::Client;
pub use error::{Error, Result};
pub use frame::{ControlFlags, Frame, RstStatus};
pub use header::Headers;
pub use server::{Handler, ResponseWriter, serve};
pub use session::{Connection, Role, Session};
pub use stream::Stream;
