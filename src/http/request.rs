//! Request translation.

use bytes::Bytes;

use super::{BAD_REQ_HEADER_FIELDS, HttpError, copy_visible, parse_content_length,
            parse_http_version};
use crate::{
    frame::ControlFlags,
    header::{HDR_HOST, HDR_METHOD, HDR_PATH, HDR_SCHEME, HDR_VERSION, Headers},
};

/// User-Agent inserted when the caller supplies none.
const DEFAULT_USER_AGENT: &str = concat!("spdywire/", env!("CARGO_PKG_VERSION"));

/// A plain HTTP request.
///
/// `path` is the full request-URI including any query string; an opaque
/// URI form (authority-prefixed) is carried verbatim. `content_length`
/// follows the usual convention: `-1` unknown, otherwise the declared
/// byte count.
#[derive(Clone, Debug)]
pub struct Request {
    pub method: String,
    pub scheme: String,
    pub host: String,
    pub path: String,
    pub version: String,
    pub headers: Headers,
    pub body: Option<Bytes>,
    pub content_length: i64,
}

impl Default for Request {
    fn default() -> Self {
        Self {
            method: "GET".to_owned(),
            scheme: "http".to_owned(),
            host: String::new(),
            path: "/".to_owned(),
            version: "HTTP/1.1".to_owned(),
            headers: Headers::new(),
            body: None,
            content_length: 0,
        }
    }
}

impl Request {
    /// GET request for `path` on `host`.
    #[must_use]
    pub fn get(host: &str, path: &str) -> Self {
        Self {
            host: host.to_owned(),
            path: path.to_owned(),
            ..Self::default()
        }
    }

    /// POST request carrying `body`.
    #[must_use]
    pub fn post(host: &str, path: &str, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self {
            method: "POST".to_owned(),
            host: host.to_owned(),
            path: path.to_owned(),
            content_length: body.len() as i64,
            body: Some(body),
            ..Self::default()
        }
    }
}

/// Build the SYN_STREAM header block for an outgoing request.
///
/// Prohibited hop-by-hop fields and caller-supplied colon keys are
/// stripped; the SPDY meta-headers, a default `User-Agent`, and
/// `Content-Length` are inserted. The returned flags carry FIN exactly
/// when the request has no body.
///
/// # Errors
///
/// Returns [`HttpError::MissingBody`] when a positive `content_length` is
/// declared without a body to send.
pub fn request_headers(req: &Request) -> Result<(Headers, ControlFlags), HttpError> {
    let mut h = copy_visible(&req.headers);
    for field in BAD_REQ_HEADER_FIELDS {
        h.remove(field);
    }

    let method = if req.method.is_empty() { "GET" } else { &req.method };
    h.set(HDR_METHOD, method);
    h.set(HDR_PATH, if req.path.is_empty() { "/" } else { &req.path });
    h.set(
        HDR_SCHEME,
        if req.scheme.is_empty() { "http" } else { &req.scheme },
    );
    h.set(HDR_HOST, &req.host);
    h.set(
        HDR_VERSION,
        if req.version.is_empty() {
            "HTTP/1.1"
        } else {
            &req.version
        },
    );
    if !h.contains("User-Agent") {
        h.set("User-Agent", DEFAULT_USER_AGENT);
    }

    match (&req.body, req.content_length) {
        (Some(body), _) => h.set("Content-Length", body.len().to_string()),
        (None, n) if n > 0 => return Err(HttpError::MissingBody(n)),
        (None, _) if method == "POST" => h.set("Content-Length", "0"),
        (None, _) => {}
    }

    let flags = if req.body.is_none() {
        ControlFlags::FIN
    } else {
        ControlFlags::NONE
    };
    Ok((h, flags))
}

/// Rebuild a request from an inbound SYN_STREAM header block.
///
/// The returned headers are the visible fields only: colon meta-headers
/// and `Host` are gone, and an absent `Content-Length` on a non-GET
/// request reads as unknown length.
///
/// # Errors
///
/// Fails on a missing or non-absolute `:path`, an unparsable `:version`,
/// or a malformed `Content-Length`.
pub fn parse_request(h: &Headers) -> Result<Request, HttpError> {
    let path = h.get(HDR_PATH).unwrap_or_default();
    if path.is_empty() {
        return Err(HttpError::MissingPath);
    }
    if !path.starts_with('/') {
        return Err(HttpError::InvalidPath(path.to_owned()));
    }
    let version = h.get(HDR_VERSION).unwrap_or_default().to_owned();
    parse_http_version(&version)?;

    let mut headers = copy_visible(h);
    headers.remove("Host");
    let method = h.get(HDR_METHOD).unwrap_or_default().to_owned();

    let declared = headers.get("Content-Length").unwrap_or_default().to_owned();
    let content_length = match parse_content_length(&declared)? {
        -1 => {
            headers.remove("Content-Length");
            // A GET with no declared length is assumed bodiless.
            if method == "GET" { 0 } else { -1 }
        }
        n => n,
    };

    Ok(Request {
        method,
        scheme: h.get(HDR_SCHEME).unwrap_or_default().to_owned(),
        host: h.get(HDR_HOST).unwrap_or_default().to_owned(),
        path: path.to_owned(),
        version,
        headers,
        body: None,
        content_length,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_translation_sets_meta_headers_and_fin() {
        let req = Request::get("example.com", "/");
        let (h, flags) = request_headers(&req).unwrap();
        assert_eq!(h.get(":method"), Some("GET"));
        assert_eq!(h.get(":path"), Some("/"));
        assert_eq!(h.get(":scheme"), Some("http"));
        assert_eq!(h.get(":host"), Some("example.com"));
        assert_eq!(h.get(":version"), Some("HTTP/1.1"));
        assert!(h.contains("User-Agent"));
        assert_eq!(flags, ControlFlags::FIN);
    }

    #[test]
    fn prohibited_and_colon_keys_are_stripped() {
        let mut req = Request::get("example.com", "/x");
        req.headers.set("Connection", "close");
        req.headers.set("Host", "evil.example.com");
        req.headers.set("Transfer-Encoding", "chunked");
        req.headers.set(":fake", "1");
        req.headers.set("Accept", "*/*");
        let (h, _) = request_headers(&req).unwrap();
        assert!(!h.contains("Connection"));
        assert!(!h.contains("Host"));
        assert!(!h.contains("Transfer-Encoding"));
        assert!(!h.contains(":fake"));
        assert_eq!(h.get("Accept"), Some("*/*"));
    }

    #[test]
    fn post_body_sets_length_and_clears_fin() {
        let req = Request::post("example.com", "/submit", &b"abcdef"[..]);
        let (h, flags) = request_headers(&req).unwrap();
        assert_eq!(h.get("Content-Length"), Some("6"));
        assert_eq!(flags, ControlFlags::NONE);
    }

    #[test]
    fn bodyless_post_declares_zero_length() {
        let mut req = Request::get("example.com", "/");
        req.method = "POST".to_owned();
        let (h, flags) = request_headers(&req).unwrap();
        assert_eq!(h.get("Content-Length"), Some("0"));
        assert_eq!(flags, ControlFlags::FIN);
    }

    #[test]
    fn declared_length_without_body_fails() {
        let mut req = Request::get("example.com", "/");
        req.content_length = 5;
        assert_eq!(request_headers(&req), Err(HttpError::MissingBody(5)));
    }

    #[test]
    fn opaque_path_passes_through() {
        let req = Request::get("example.com", "mailto:user@example.com");
        let (h, _) = request_headers(&req).unwrap();
        assert_eq!(h.get(":path"), Some("mailto:user@example.com"));
    }

    fn syn_headers(path: &str) -> Headers {
        let mut h = Headers::new();
        h.set(":method", "GET");
        h.set(":path", path);
        h.set(":scheme", "http");
        h.set(":host", "example.com");
        h.set(":version", "HTTP/1.1");
        h.set("User-Agent", "test");
        h
    }

    #[test]
    fn parse_request_round_trip() {
        let req = parse_request(&syn_headers("/index.html?q=1")).unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/index.html?q=1");
        assert_eq!(req.host, "example.com");
        assert_eq!(req.content_length, 0);
        assert!(!req.headers.contains(":method"));
        assert!(!req.headers.contains("Host"));
    }

    #[test]
    fn parse_request_rejects_relative_path() {
        let err = parse_request(&syn_headers("../../../../etc/passwd")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid path: ../../../../etc/passwd"
        );
    }

    #[test]
    fn parse_request_rejects_missing_path() {
        let mut h = syn_headers("/");
        h.remove(":path");
        assert!(matches!(parse_request(&h), Err(HttpError::MissingPath)));
    }

    #[test]
    fn parse_request_rejects_bad_version() {
        let mut h = syn_headers("/");
        h.set(":version", "SPDY/9");
        assert!(matches!(parse_request(&h), Err(HttpError::BadVersion(_))));
    }

    #[test]
    fn non_get_without_length_is_unknown() {
        let mut h = syn_headers("/");
        h.set(":method", "PUT");
        let req = parse_request(&h).unwrap();
        assert_eq!(req.content_length, -1);
    }
}
