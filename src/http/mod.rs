//! HTTP ↔ SPDY header translation.
//!
//! SPDY/3 carries requests and responses as colon-prefixed meta-headers
//! (`:method`, `:path`, `:scheme`, `:host`, `:version`, `:status`) beside
//! the ordinary fields. This module maps between that representation and
//! plain request/response values, enforces the fields SPDY prohibits, and
//! infers body lengths per RFC 2616 §4.4. Colon keys never leak into the
//! translated header maps.

mod request;
mod response;

pub use request::{Request, parse_request, request_headers};
pub use response::{Response, parse_response, response_status_line};

use thiserror::Error;

use crate::{error::Error as SessionError, header::Headers, stream::Stream};

/// Fields SPDY/3 prohibits in response header blocks.
pub(crate) const BAD_RESP_HEADER_FIELDS: &[&str] =
    &["Connection", "Keep-Alive", "Proxy-Connection", "Transfer-Encoding"];

/// Fields SPDY/3 prohibits in request header blocks.
pub(crate) const BAD_REQ_HEADER_FIELDS: &[&str] = &[
    "Connection",
    "Host",
    "Keep-Alive",
    "Proxy-Connection",
    "Transfer-Encoding",
];

/// Errors from header translation and body-length inference.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum HttpError {
    #[error("missing path")]
    MissingPath,
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("invalid header field {0:?}")]
    InvalidHeader(String),
    #[error("malformed HTTP status code {0:?}")]
    BadStatus(String),
    #[error("bad http version: {0}")]
    BadVersion(String),
    #[error("bad Content-Length {0:?}")]
    BadContentLength(String),
    #[error("request declares {0} body bytes but carries no body")]
    MissingBody(i64),
}

/// Copy `src` into a fresh map, dropping colon meta-headers.
pub(crate) fn copy_visible(src: &Headers) -> Headers {
    let mut dst = Headers::new();
    for (key, values) in src.iter() {
        if key.starts_with(':') {
            continue;
        }
        for value in values {
            dst.add(key, value);
        }
    }
    dst
}

/// Parse a Content-Length value; empty means unknown (`-1`).
pub(crate) fn parse_content_length(raw: &str) -> Result<i64, HttpError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(-1);
    }
    match raw.parse::<i64>() {
        Ok(n) if n >= 0 => Ok(n),
        _ => Err(HttpError::BadContentLength(raw.to_owned())),
    }
}

/// Split `HTTP/x.y` into its numeric parts.
pub(crate) fn parse_http_version(version: &str) -> Result<(u32, u32), HttpError> {
    let bad = || HttpError::BadVersion(version.to_owned());
    let rest = version.strip_prefix("HTTP/").ok_or_else(bad)?;
    let (major, minor) = rest.split_once('.').ok_or_else(bad)?;
    Ok((
        major.parse().map_err(|_| bad())?,
        minor.parse().map_err(|_| bad())?,
    ))
}

/// Message body carried by a stream.
///
/// A declared Content-Length bounds the read; without one the body runs to
/// the stream's end of data.
pub struct Body {
    stream: Stream,
    remaining: Option<u64>,
}

impl Body {
    pub(crate) fn new(stream: Stream, length: i64) -> Self {
        Self {
            stream,
            remaining: u64::try_from(length).ok(),
        }
    }

    /// Read body bytes, `Ok(0)` at the end.
    ///
    /// # Errors
    ///
    /// Propagates the stream's close reason (reset, session teardown).
    pub async fn read(&mut self, p: &mut [u8]) -> Result<usize, SessionError> {
        let limit = match self.remaining {
            Some(0) => return Ok(0),
            Some(remaining) => p.len().min(usize::try_from(remaining).unwrap_or(usize::MAX)),
            None => p.len(),
        };
        let n = self.stream.read(&mut p[..limit]).await?;
        if let Some(remaining) = &mut self.remaining {
            *remaining = if n == 0 { 0 } else { *remaining - n as u64 };
        }
        Ok(n)
    }

    /// Drain the body into a vector.
    ///
    /// # Errors
    ///
    /// Propagates the stream's close reason.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>, SessionError> {
        let mut out = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = self.read(&mut chunk).await?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&chunk[..n]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visible_copy_drops_colon_keys() {
        let mut h = Headers::new();
        h.set(":status", "200 OK");
        h.set(":version", "HTTP/1.1");
        h.add("Content-Type", "text/plain");
        let visible = copy_visible(&h);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible.get("Content-Type"), Some("text/plain"));
        assert!(!visible.contains(":status"));
    }

    #[test]
    fn content_length_parsing() {
        assert_eq!(parse_content_length(""), Ok(-1));
        assert_eq!(parse_content_length(" 42 "), Ok(42));
        assert!(parse_content_length("-1").is_err());
        assert!(parse_content_length("abc").is_err());
    }

    #[test]
    fn http_version_parsing() {
        assert_eq!(parse_http_version("HTTP/1.1"), Ok((1, 1)));
        assert_eq!(parse_http_version("HTTP/1.0"), Ok((1, 0)));
        assert!(parse_http_version("SPDY/3").is_err());
        assert!(parse_http_version("HTTP/x").is_err());
    }
}
