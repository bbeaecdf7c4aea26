//! SPDY/3 wire codec.
//!
//! [`FrameDecoder`] and [`FrameEncoder`] plug into `tokio_util`'s
//! [`FramedRead`](tokio_util::codec::FramedRead) and
//! [`FramedWrite`](tokio_util::codec::FramedWrite). Each half owns one side
//! of the connection-scoped zlib stream used for name/value header blocks,
//! primed with the shared dictionary the SPDY/3 draft defines, so frames
//! must be encoded and decoded in wire order.

use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress};
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    frame::{
        ControlFlags, FRAME_TYPE_GOAWAY, FRAME_TYPE_HEADERS, FRAME_TYPE_PING,
        FRAME_TYPE_RST_STREAM, FRAME_TYPE_SETTINGS, FRAME_TYPE_SYN_REPLY, FRAME_TYPE_SYN_STREAM,
        FRAME_TYPE_WINDOW_UPDATE, Frame, RstStatus, SPDY_VERSION, Setting,
    },
    header::Headers,
};

/// Frame header size shared by control and data frames.
const FRAME_HEADER_LEN: usize = 8;

/// Largest frame payload accepted before the connection is failed.
///
/// The wire length field is 24 bits, so this is also the protocol maximum.
pub const MAX_FRAME_LEN: usize = (1 << 24) - 1;

const STREAM_ID_MASK: u32 = 0x7fff_ffff;

/// Shared zlib dictionary for SPDY/3 name/value blocks.
pub const HEADER_DICTIONARY: &[u8] = concat!(
    "\x00\x00\x00\x07options\x00\x00\x00\x04head\x00\x00\x00\x04post",
    "\x00\x00\x00\x03put\x00\x00\x00\x06delete\x00\x00\x00\x05trace",
    "\x00\x00\x00\x06accept\x00\x00\x00\x0eaccept-charset",
    "\x00\x00\x00\x0faccept-encoding\x00\x00\x00\x0faccept-language",
    "\x00\x00\x00\raccept-ranges\x00\x00\x00\x03age\x00\x00\x00\x05allow",
    "\x00\x00\x00\rauthorization\x00\x00\x00\rcache-control",
    "\x00\x00\x00\nconnection\x00\x00\x00\x0ccontent-base",
    "\x00\x00\x00\x10content-encoding\x00\x00\x00\x10content-language",
    "\x00\x00\x00\x0econtent-length\x00\x00\x00\x10content-location",
    "\x00\x00\x00\x0bcontent-md5\x00\x00\x00\rcontent-range",
    "\x00\x00\x00\x0ccontent-type\x00\x00\x00\x04date\x00\x00\x00\x04etag",
    "\x00\x00\x00\x06expect\x00\x00\x00\x07expires\x00\x00\x00\x04from",
    "\x00\x00\x00\x04host\x00\x00\x00\x08if-match",
    "\x00\x00\x00\x11if-modified-since\x00\x00\x00\rif-none-match",
    "\x00\x00\x00\x08if-range\x00\x00\x00\x13if-unmodified-since",
    "\x00\x00\x00\rlast-modified\x00\x00\x00\x08location",
    "\x00\x00\x00\x0cmax-forwards\x00\x00\x00\x06pragma",
    "\x00\x00\x00\x12proxy-authenticate\x00\x00\x00\x13proxy-authorization",
    "\x00\x00\x00\x05range\x00\x00\x00\x07referer\x00\x00\x00\x0bretry-after",
    "\x00\x00\x00\x06server\x00\x00\x00\x02te\x00\x00\x00\x07trailer",
    "\x00\x00\x00\x11transfer-encoding\x00\x00\x00\x07upgrade",
    "\x00\x00\x00\nuser-agent\x00\x00\x00\x04vary\x00\x00\x00\x03via",
    "\x00\x00\x00\x07warning\x00\x00\x00\x0fwww-authenticate",
    "\x00\x00\x00\x06method\x00\x00\x00\x03get\x00\x00\x00\x06status",
    "\x00\x00\x00\x06200 OK\x00\x00\x00\x07version\x00\x00\x00\x08HTTP/1.1",
    "\x00\x00\x00\x03url\x00\x00\x00\x06public\x00\x00\x00\nset-cookie",
    "\x00\x00\x00\nkeep-alive\x00\x00\x00\x06origin",
    "100101201202205206300302303304305306307402405406407408409410",
    "411412413414415416417502504505",
    "203 Non-Authoritative Information204 No Content301 Moved Permanently",
    "400 Bad Request401 Unauthorized403 Forbidden404 Not Found",
    "500 Internal Server Error501 Not Implemented503 Service Unavailable",
    "Jan Feb Mar Apr May Jun Jul Aug Sept Oct Nov Dec",
    " 00:00:00",
    " Mon, Tue, Wed, Thu, Fri, Sat, Sun, GMT",
    "chunked,text/html,image/png,image/jpg,image/gif,",
    "application/xml,application/xhtml+xml,text/plain,text/javascript,",
    "publicprivatemax-age=gzip,deflate,sdchcharset=utf-8",
    "charset=iso-8859-1,utf-,*,enq=0.",
)
.as_bytes();

fn malformed(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("malformed {what} frame"))
}

/// Decoder half of the SPDY/3 codec.
pub struct FrameDecoder {
    inflate: Decompress,
    max_frame_len: usize,
}

impl FrameDecoder {
    /// Create a decoder accepting frames up to the protocol maximum.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inflate: Decompress::new(true),
            max_frame_len: MAX_FRAME_LEN,
        }
    }

    /// Decompress one name/value block, priming the dictionary on demand.
    fn inflate_block(&mut self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len() * 4 + 64);
        let mut consumed = 0usize;
        loop {
            if out.len() == out.capacity() {
                out.reserve(4096);
            }
            let before = self.inflate.total_in();
            match self
                .inflate
                .decompress_vec(&data[consumed..], &mut out, FlushDecompress::Sync)
            {
                Ok(_) => {}
                Err(e) if e.needs_dictionary().is_some() => {
                    self.inflate
                        .set_dictionary(HEADER_DICTIONARY)
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                }
                Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e)),
            }
            consumed += (self.inflate.total_in() - before) as usize;
            if consumed == data.len() && out.len() < out.capacity() {
                return Ok(out);
            }
        }
    }

    fn decode_headers(&mut self, block: &[u8]) -> io::Result<Headers> {
        let raw = self.inflate_block(block)?;
        parse_header_block(&raw)
    }

    fn decode_control(&mut self, kind: u16, flags: u8, mut payload: Bytes) -> io::Result<Frame> {
        let frame = match kind {
            FRAME_TYPE_SYN_STREAM => {
                if payload.len() < 10 {
                    return Err(malformed("SYN_STREAM"));
                }
                let stream_id = payload.get_u32() & STREAM_ID_MASK;
                let associated_id = payload.get_u32() & STREAM_ID_MASK;
                let priority = payload.get_u8() >> 5;
                payload.advance(1); // credential slot
                Frame::SynStream {
                    stream_id,
                    associated_id,
                    priority,
                    flags: ControlFlags::from_bits(flags),
                    headers: self.decode_headers(&payload)?,
                }
            }
            FRAME_TYPE_SYN_REPLY => {
                if payload.len() < 4 {
                    return Err(malformed("SYN_REPLY"));
                }
                let stream_id = payload.get_u32() & STREAM_ID_MASK;
                Frame::SynReply {
                    stream_id,
                    flags: ControlFlags::from_bits(flags),
                    headers: self.decode_headers(&payload)?,
                }
            }
            FRAME_TYPE_RST_STREAM => {
                if payload.len() != 8 {
                    return Err(malformed("RST_STREAM"));
                }
                let stream_id = payload.get_u32() & STREAM_ID_MASK;
                let code = payload.get_u32();
                let status = RstStatus::from_code(code)
                    .ok_or_else(|| malformed("RST_STREAM"))?;
                Frame::RstStream { stream_id, status }
            }
            FRAME_TYPE_SETTINGS => {
                if payload.len() < 4 {
                    return Err(malformed("SETTINGS"));
                }
                let count = payload.get_u32() as usize;
                if payload.len() != count * 8 {
                    return Err(malformed("SETTINGS"));
                }
                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    let word = payload.get_u32();
                    entries.push(Setting {
                        flags: (word >> 24) as u8,
                        id: word & 0x00ff_ffff,
                        value: payload.get_u32(),
                    });
                }
                Frame::Settings { entries }
            }
            FRAME_TYPE_PING => {
                if payload.len() != 4 {
                    return Err(malformed("PING"));
                }
                Frame::Ping {
                    id: payload.get_u32(),
                }
            }
            FRAME_TYPE_GOAWAY => {
                if payload.len() != 8 {
                    return Err(malformed("GOAWAY"));
                }
                Frame::GoAway {
                    last_stream_id: payload.get_u32() & STREAM_ID_MASK,
                    status: payload.get_u32(),
                }
            }
            FRAME_TYPE_HEADERS => {
                if payload.len() < 4 {
                    return Err(malformed("HEADERS"));
                }
                let stream_id = payload.get_u32() & STREAM_ID_MASK;
                Frame::Headers {
                    stream_id,
                    flags: ControlFlags::from_bits(flags),
                    headers: self.decode_headers(&payload)?,
                }
            }
            FRAME_TYPE_WINDOW_UPDATE => {
                if payload.len() != 8 {
                    return Err(malformed("WINDOW_UPDATE"));
                }
                Frame::WindowUpdate {
                    stream_id: payload.get_u32() & STREAM_ID_MASK,
                    delta: payload.get_u32(),
                }
            }
            _ => Frame::Unknown {
                kind,
                flags,
                payload,
            },
        };
        Ok(frame)
    }
}

impl Default for FrameDecoder {
    fn default() -> Self { Self::new() }
}

impl Decoder for FrameDecoder {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<Frame>> {
        if src.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }
        let len = u32::from_be_bytes([0, src[5], src[6], src[7]]) as usize;
        if len > self.max_frame_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "frame exceeds maximum length",
            ));
        }
        if src.len() < FRAME_HEADER_LEN + len {
            src.reserve(FRAME_HEADER_LEN + len - src.len());
            return Ok(None);
        }
        let mut head = src.split_to(FRAME_HEADER_LEN);
        let payload = src.split_to(len).freeze();

        let word = head.get_u32();
        let flags = head.get_u8();
        if word & 0x8000_0000 != 0 {
            let version = ((word >> 16) & 0x7fff) as u16;
            if version != SPDY_VERSION {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unsupported protocol version {version}"),
                ));
            }
            let kind = (word & 0xffff) as u16;
            self.decode_control(kind, flags, payload).map(Some)
        } else {
            Ok(Some(Frame::Data {
                stream_id: word & STREAM_ID_MASK,
                fin: flags & 0x01 != 0,
                data: payload,
            }))
        }
    }
}

/// Encoder half of the SPDY/3 codec.
pub struct FrameEncoder {
    deflate: Compress,
}

impl FrameEncoder {
    /// Create an encoder with the dictionary-primed compressor.
    #[must_use]
    pub fn new() -> Self {
        let mut deflate = Compress::new(Compression::default(), true);
        deflate
            .set_dictionary(HEADER_DICTIONARY)
            .expect("static header dictionary is valid");
        Self { deflate }
    }

    /// Compress one name/value block and flush it to a frame boundary.
    fn deflate_block(&mut self, raw: &[u8]) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(raw.len() / 2 + 64);
        let mut consumed = 0usize;
        loop {
            if out.len() == out.capacity() {
                out.reserve(256);
            }
            let before = self.deflate.total_in();
            self.deflate
                .compress_vec(&raw[consumed..], &mut out, FlushCompress::Sync)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            consumed += (self.deflate.total_in() - before) as usize;
            if consumed == raw.len() && out.len() < out.capacity() {
                return Ok(out);
            }
        }
    }

    fn encode_headers(&mut self, headers: &Headers) -> io::Result<Vec<u8>> {
        self.deflate_block(&build_header_block(headers))
    }
}

impl Default for FrameEncoder {
    fn default() -> Self { Self::new() }
}

fn put_control_header(dst: &mut BytesMut, kind: u16, flags: u8, len: usize) {
    dst.put_u16(0x8000 | SPDY_VERSION);
    dst.put_u16(kind);
    dst.put_u32(((flags as u32) << 24) | len as u32);
}

impl Encoder<Frame> for FrameEncoder {
    type Error = io::Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> io::Result<()> {
        match frame {
            Frame::SynStream {
                stream_id,
                associated_id,
                priority,
                flags,
                headers,
            } => {
                let block = self.encode_headers(&headers)?;
                put_control_header(dst, FRAME_TYPE_SYN_STREAM, flags.bits(), 10 + block.len());
                dst.put_u32(stream_id & STREAM_ID_MASK);
                dst.put_u32(associated_id & STREAM_ID_MASK);
                dst.put_u8(priority << 5);
                dst.put_u8(0);
                dst.put_slice(&block);
            }
            Frame::SynReply {
                stream_id,
                flags,
                headers,
            } => {
                let block = self.encode_headers(&headers)?;
                put_control_header(dst, FRAME_TYPE_SYN_REPLY, flags.bits(), 4 + block.len());
                dst.put_u32(stream_id & STREAM_ID_MASK);
                dst.put_slice(&block);
            }
            Frame::RstStream { stream_id, status } => {
                put_control_header(dst, FRAME_TYPE_RST_STREAM, 0, 8);
                dst.put_u32(stream_id & STREAM_ID_MASK);
                dst.put_u32(status.code());
            }
            Frame::Settings { entries } => {
                put_control_header(dst, FRAME_TYPE_SETTINGS, 0, 4 + entries.len() * 8);
                dst.put_u32(entries.len() as u32);
                for entry in entries {
                    dst.put_u32(((entry.flags as u32) << 24) | (entry.id & 0x00ff_ffff));
                    dst.put_u32(entry.value);
                }
            }
            Frame::Ping { id } => {
                put_control_header(dst, FRAME_TYPE_PING, 0, 4);
                dst.put_u32(id);
            }
            Frame::GoAway {
                last_stream_id,
                status,
            } => {
                put_control_header(dst, FRAME_TYPE_GOAWAY, 0, 8);
                dst.put_u32(last_stream_id & STREAM_ID_MASK);
                dst.put_u32(status);
            }
            Frame::Headers {
                stream_id,
                flags,
                headers,
            } => {
                let block = self.encode_headers(&headers)?;
                put_control_header(dst, FRAME_TYPE_HEADERS, flags.bits(), 4 + block.len());
                dst.put_u32(stream_id & STREAM_ID_MASK);
                dst.put_slice(&block);
            }
            Frame::WindowUpdate { stream_id, delta } => {
                put_control_header(dst, FRAME_TYPE_WINDOW_UPDATE, 0, 8);
                dst.put_u32(stream_id & STREAM_ID_MASK);
                dst.put_u32(delta);
            }
            Frame::Data {
                stream_id,
                fin,
                data,
            } => {
                if data.len() > MAX_FRAME_LEN {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "data frame exceeds maximum length",
                    ));
                }
                dst.put_u32(stream_id & STREAM_ID_MASK);
                dst.put_u32((u32::from(fin) << 24) | data.len() as u32);
                dst.put_slice(&data);
            }
            Frame::Unknown { kind, flags, payload } => {
                put_control_header(dst, kind, flags, payload.len());
                dst.put_slice(&payload);
            }
        }
        Ok(())
    }
}

/// Serialize a name/value block in wire form: keys lowercase, values joined
/// with NUL, pairs in sorted key order.
fn build_header_block(headers: &Headers) -> Vec<u8> {
    let mut raw = BytesMut::new();
    raw.put_u32(headers.len() as u32);
    for (key, values) in headers.iter() {
        let name = key.to_ascii_lowercase();
        raw.put_u32(name.len() as u32);
        raw.put_slice(name.as_bytes());
        let joined = values.join("\0");
        raw.put_u32(joined.len() as u32);
        raw.put_slice(joined.as_bytes());
    }
    raw.to_vec()
}

fn parse_header_block(mut raw: &[u8]) -> io::Result<Headers> {
    let bad = || malformed("header block");
    if raw.len() < 4 {
        return Err(bad());
    }
    let count = raw.get_u32() as usize;
    let mut headers = Headers::new();
    for _ in 0..count {
        let name = take_string(&mut raw).ok_or_else(bad)?;
        let value = take_string(&mut raw).ok_or_else(bad)?;
        for part in value.split('\0') {
            headers.add(&name, part);
        }
    }
    if !raw.is_empty() {
        return Err(bad());
    }
    Ok(headers)
}

fn take_string(raw: &mut &[u8]) -> Option<String> {
    if raw.len() < 4 {
        return None;
    }
    let len = raw.get_u32() as usize;
    if raw.len() < len {
        return None;
    }
    let s = String::from_utf8(raw[..len].to_vec()).ok()?;
    raw.advance(len);
    Some(s)
}
