//! Response translation and body-length inference.

use super::{BAD_RESP_HEADER_FIELDS, HttpError, copy_visible, parse_content_length,
            parse_http_version};
use crate::header::{HDR_STATUS, HDR_VERSION, Headers};

/// A plain HTTP response, parsed from a SYN_REPLY header block.
///
/// `content_length` is the declared value (`-1` when absent);
/// `body_length` is the expected body size per RFC 2616 §4.4, which differs
/// for HEAD responses and bodiless status codes.
#[derive(Clone, Debug)]
pub struct Response {
    pub status: u16,
    pub status_text: String,
    pub version: String,
    pub headers: Headers,
    pub content_length: i64,
    pub body_length: i64,
}

/// Parse an inbound SYN_REPLY header block for a request issued with
/// `method`.
///
/// # Errors
///
/// Fails when a prohibited hop-by-hop field appears, or when `:status` or
/// `:version` do not parse.
pub fn parse_response(h: &Headers, method: &str) -> Result<Response, HttpError> {
    for field in BAD_RESP_HEADER_FIELDS {
        if h.contains(field) {
            return Err(HttpError::InvalidHeader((*field).to_owned()));
        }
    }

    let status_line = h.get(HDR_STATUS).unwrap_or_default();
    let code_part = status_line.split(' ').next().unwrap_or_default();
    let status: u16 = code_part
        .parse()
        .map_err(|_| HttpError::BadStatus(status_line.to_owned()))?;
    let status_text = status_line
        .split_once(' ')
        .map(|(_, reason)| reason.to_owned())
        .unwrap_or_default();

    let version = h.get(HDR_VERSION).unwrap_or_default().to_owned();
    parse_http_version(&version)?;

    let headers = copy_visible(h);
    let content_length = parse_content_length(headers.get("Content-Length").unwrap_or_default())?;
    let body_length = expected_body_length(status, method, content_length)?;

    Ok(Response {
        status,
        status_text,
        version,
        headers,
        content_length,
        body_length,
    })
}

/// Expected response body length per RFC 2616 §4.4.
///
/// HEAD responses and 1xx/204/304 statuses carry no body regardless of any
/// declared length; otherwise the declared Content-Length wins and its
/// absence means the body runs to end of stream.
fn expected_body_length(status: u16, method: &str, declared: i64) -> Result<i64, HttpError> {
    if method == "HEAD" {
        return Ok(0);
    }
    if status / 100 == 1 || status == 204 || status == 304 {
        return Ok(0);
    }
    Ok(declared)
}

/// Render `status` as the `:status` line value, e.g. `200 OK`.
#[must_use]
pub fn response_status_line(status: u16) -> String {
    match status_text(status) {
        Some(text) => format!("{status} {text}"),
        None => format!("{status} status code {status}"),
    }
}

fn status_text(status: u16) -> Option<&'static str> {
    Some(match status {
        100 => "Continue",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        203 => "Non-Authoritative Information",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        411 => "Length Required",
        413 => "Request Entity Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply_headers(status: &str) -> Headers {
        let mut h = Headers::new();
        h.set(":status", status);
        h.set(":version", "HTTP/1.1");
        h.set("Content-Type", "text/plain");
        h
    }

    #[test]
    fn parses_status_and_reason() {
        let resp = parse_response(&reply_headers("200 OK"), "GET").unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.status_text, "OK");
        assert_eq!(resp.version, "HTTP/1.1");
        assert!(!resp.headers.contains(":status"));
    }

    #[test]
    fn status_without_reason_parses() {
        let resp = parse_response(&reply_headers("404"), "GET").unwrap();
        assert_eq!(resp.status, 404);
        assert_eq!(resp.status_text, "");
    }

    #[test]
    fn malformed_status_is_rejected() {
        let err = parse_response(&reply_headers("abc"), "GET").unwrap_err();
        assert!(matches!(err, HttpError::BadStatus(_)));
    }

    #[test]
    fn prohibited_fields_are_rejected() {
        for field in ["Connection", "Keep-Alive", "Proxy-Connection", "Transfer-Encoding"] {
            let mut h = reply_headers("200 OK");
            h.set(field, "x");
            let err = parse_response(&h, "GET").unwrap_err();
            assert_eq!(err.to_string(), format!("invalid header field {field:?}"));
        }
    }

    #[test]
    fn declared_length_bounds_body() {
        let mut h = reply_headers("200 OK");
        h.set("Content-Length", "12");
        let resp = parse_response(&h, "GET").unwrap();
        assert_eq!(resp.content_length, 12);
        assert_eq!(resp.body_length, 12);
    }

    #[test]
    fn missing_length_reads_to_eof() {
        let resp = parse_response(&reply_headers("200 OK"), "GET").unwrap();
        assert_eq!(resp.content_length, -1);
        assert_eq!(resp.body_length, -1);
    }

    #[test]
    fn head_keeps_declared_length_but_expects_no_body() {
        let mut h = reply_headers("200 OK");
        h.set("Content-Length", "42");
        let resp = parse_response(&h, "HEAD").unwrap();
        assert_eq!(resp.content_length, 42);
        assert_eq!(resp.body_length, 0);
    }

    #[test]
    fn bodiless_statuses_expect_no_body() {
        for status in ["100 Continue", "204 No Content", "304 Not Modified"] {
            let resp = parse_response(&reply_headers(status), "GET").unwrap();
            assert_eq!(resp.body_length, 0, "status {status}");
        }
    }

    #[test]
    fn status_line_rendering() {
        assert_eq!(response_status_line(200), "200 OK");
        assert_eq!(response_status_line(418), "418 status code 418");
    }
}
