//! End-to-end HTTP exchanges over in-memory sessions.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use spdywire::{
    Client, ControlFlags, Frame, Handler, Headers, ResponseWriter, RstStatus,
    codec::{FrameDecoder, FrameEncoder},
    error::Error,
    http::{Body, HttpError, Request},
    serve,
};
use tokio::{
    io::{DuplexStream, duplex},
    time::timeout,
};
use tokio_util::codec::{FramedRead, FramedWrite};

struct EchoHandler;

#[async_trait]
impl Handler for EchoHandler {
    async fn handle(&self, req: Request, mut body: Body, w: &mut ResponseWriter) {
        assert!(!req.headers.contains("Host"));
        assert!(req.headers.iter().all(|(k, _)| !k.starts_with(':')));
        let data = body.read_to_end().await.expect("request body");
        if data.is_empty() {
            return;
        }
        w.write(&data).await.expect("response body");
    }
}

fn start_pair() -> (Client, tokio::task::JoinHandle<Result<(), Error>>) {
    let (client_io, server_io) = duplex(64 * 1024);
    let server = tokio::spawn(serve(server_io, EchoHandler));
    (Client::new(client_io), server)
}

#[tokio::test]
async fn get_with_empty_body() {
    let (client, _server) = start_pair();
    let (resp, mut body) = timeout(
        Duration::from_secs(5),
        client.request(Request::get("example.com", "/")),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(resp.status, 200);
    assert_eq!(resp.status_text, "OK");
    assert_eq!(resp.version, "HTTP/1.1");
    assert_eq!(resp.headers.get("Content-Type"), Some("text/plain"));
    assert!(resp.headers.iter().all(|(k, _)| !k.starts_with(':')));
    assert_eq!(body.read_to_end().await.unwrap(), b"");
}

#[tokio::test]
async fn post_body_is_echoed() {
    let (client, _server) = start_pair();
    let (resp, mut body) = timeout(
        Duration::from_secs(5),
        client.request(Request::post("example.com", "/echo", &b"abcdef"[..])),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(resp.status, 200);
    assert_eq!(body.read_to_end().await.unwrap(), b"abcdef");
}

#[tokio::test]
async fn concurrent_requests_multiplex_one_connection() {
    let (client, _server) = start_pair();
    let client = std::sync::Arc::new(client);
    let mut tasks = Vec::new();
    for i in 0..8u32 {
        let client = std::sync::Arc::clone(&client);
        tasks.push(tokio::spawn(async move {
            let payload = format!("payload-{i}").repeat(64);
            let req = Request::post("example.com", "/echo", payload.clone().into_bytes());
            let (_resp, mut body) = client.request(req).await.unwrap();
            assert_eq!(body.read_to_end().await.unwrap(), payload.as_bytes());
        }));
    }
    for task in tasks {
        timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }
}

type RawReader = FramedRead<tokio::io::ReadHalf<DuplexStream>, FrameDecoder>;
type RawWriter = FramedWrite<tokio::io::WriteHalf<DuplexStream>, FrameEncoder>;

fn raw_peer(io: DuplexStream) -> (RawReader, RawWriter) {
    let (r, w) = tokio::io::split(io);
    (
        FramedRead::new(r, FrameDecoder::new()),
        FramedWrite::new(w, FrameEncoder::new()),
    )
}

async fn recv(reader: &mut RawReader) -> Frame {
    timeout(Duration::from_secs(5), reader.next())
        .await
        .expect("timed out waiting for frame")
        .expect("peer closed unexpectedly")
        .expect("frame decode failed")
}

#[tokio::test]
async fn syn_stream_carries_request_meta_headers() {
    let (client_io, server_io) = duplex(64 * 1024);
    let client = Client::new(client_io);
    let (mut reader, _writer) = raw_peer(server_io);

    let request_task = tokio::spawn(async move {
        let _ = client.request(Request::get("example.com", "/search?q=1")).await;
    });

    let Frame::SynStream { flags, headers, .. } = recv(&mut reader).await else {
        panic!("expected SYN_STREAM");
    };
    assert_eq!(flags, ControlFlags::FIN);
    assert_eq!(headers.get(":method"), Some("GET"));
    assert_eq!(headers.get(":path"), Some("/search?q=1"));
    assert_eq!(headers.get(":scheme"), Some("http"));
    assert_eq!(headers.get(":host"), Some("example.com"));
    assert_eq!(headers.get(":version"), Some("HTTP/1.1"));
    assert!(headers.contains("User-Agent"));
    request_task.abort();
}

#[tokio::test]
async fn bad_request_path_is_refused() {
    let (client_io, server_io) = duplex(64 * 1024);
    let _server = tokio::spawn(serve(server_io, EchoHandler));
    let (mut reader, mut writer) = raw_peer(client_io);

    let mut headers = Headers::new();
    headers.set(":method", "GET");
    headers.set(":path", "../../../../etc/passwd");
    headers.set(":scheme", "http");
    headers.set(":host", "example.com");
    headers.set(":version", "HTTP/1.1");
    writer
        .send(Frame::SynStream {
            stream_id: 1,
            associated_id: 0,
            priority: 0,
            flags: ControlFlags::FIN,
            headers,
        })
        .await
        .unwrap();

    let Frame::SynReply { flags, headers, .. } = recv(&mut reader).await else {
        panic!("expected 400 SYN_REPLY");
    };
    assert_eq!(flags, ControlFlags::FIN);
    assert_eq!(headers.get(":status"), Some("400 Bad Request"));
    assert_eq!(
        recv(&mut reader).await,
        Frame::RstStream {
            stream_id: 1,
            status: RstStatus::RefusedStream,
        }
    );
}

#[tokio::test]
async fn forbidden_reply_header_is_rejected_with_protocol_error() {
    let (client_io, server_io) = duplex(64 * 1024);
    let client = Client::new(client_io);
    let (mut reader, mut writer) = raw_peer(server_io);

    let request_task =
        tokio::spawn(async move { client.request(Request::get("example.com", "/")).await });

    assert!(matches!(recv(&mut reader).await, Frame::SynStream { .. }));
    let mut reply = Headers::new();
    reply.set(":status", "200 OK");
    reply.set(":version", "HTTP/1.1");
    reply.set("Connection", "close");
    writer
        .send(Frame::SynReply {
            stream_id: 1,
            flags: ControlFlags::NONE,
            headers: reply,
        })
        .await
        .unwrap();

    let result = timeout(Duration::from_secs(5), request_task)
        .await
        .unwrap()
        .unwrap();
    match result {
        Err(Error::Http(HttpError::InvalidHeader(field))) => assert_eq!(field, "Connection"),
        Err(other) => panic!("unexpected error: {other:?}"),
        Ok(_) => panic!("request unexpectedly succeeded"),
    }
    assert_eq!(
        recv(&mut reader).await,
        Frame::RstStream {
            stream_id: 1,
            status: RstStatus::ProtocolError,
        }
    );
}

#[tokio::test]
async fn declared_length_bounds_response_body() {
    struct FixedLength;

    #[async_trait]
    impl Handler for FixedLength {
        async fn handle(&self, _req: Request, _body: Body, w: &mut ResponseWriter) {
            w.headers_mut().set("Content-Length", "3");
            w.write(b"abc").await.expect("body");
        }
    }

    let (client_io, server_io) = duplex(64 * 1024);
    let _server = tokio::spawn(serve(server_io, FixedLength));
    let client = Client::new(client_io);

    let (resp, mut body) = timeout(
        Duration::from_secs(5),
        client.request(Request::get("example.com", "/fixed")),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(resp.content_length, 3);
    assert_eq!(body.read_to_end().await.unwrap(), b"abc");
}

#[tokio::test]
async fn handler_write_head_controls_status() {
    struct NotFound;

    #[async_trait]
    impl Handler for NotFound {
        async fn handle(&self, _req: Request, _body: Body, w: &mut ResponseWriter) {
            w.write_head(404).await.expect("head");
        }
    }

    let (client_io, server_io) = duplex(64 * 1024);
    let _server = tokio::spawn(serve(server_io, NotFound));
    let client = Client::new(client_io);

    let (resp, mut body) = timeout(
        Duration::from_secs(5),
        client.request(Request::get("example.com", "/missing")),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(resp.status, 404);
    assert_eq!(resp.status_text, "Not Found");
    assert_eq!(body.read_to_end().await.unwrap(), b"");
}

#[tokio::test]
async fn pushed_stream_is_refused_by_client() {
    let (client_io, server_io) = duplex(64 * 1024);
    let _client = Client::new(client_io);
    let (mut reader, mut writer) = raw_peer(server_io);

    let mut headers = Headers::new();
    headers.set("X", "y");
    writer
        .send(Frame::SynStream {
            stream_id: 2,
            associated_id: 0,
            priority: 0,
            flags: ControlFlags::NONE,
            headers,
        })
        .await
        .unwrap();
    assert_eq!(
        recv(&mut reader).await,
        Frame::RstStream {
            stream_id: 2,
            status: RstStatus::RefusedStream,
        }
    );
}