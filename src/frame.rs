//! Typed SPDY/3 frame values.
//!
//! The codec reads and writes these; the session dispatches on them. Frame
//! layouts follow the SPDY/3 draft: control frames carry a version/type
//! header with 8 flag bits and a 24-bit length, data frames carry a 31-bit
//! stream id.

use std::fmt;

use bytes::Bytes;

use crate::header::Headers;

/// Protocol version spoken by this crate.
pub const SPDY_VERSION: u16 = 3;

/// Default per-stream send window before any SETTINGS arrive.
pub const DEFAULT_INITIAL_WINDOW: i32 = 64 * 1024;

/// SETTINGS id adjusting the initial send window of new streams.
pub const SETTINGS_INITIAL_WINDOW_SIZE: u32 = 7;

pub(crate) const FRAME_TYPE_SYN_STREAM: u16 = 1;
pub(crate) const FRAME_TYPE_SYN_REPLY: u16 = 2;
pub(crate) const FRAME_TYPE_RST_STREAM: u16 = 3;
pub(crate) const FRAME_TYPE_SETTINGS: u16 = 4;
pub(crate) const FRAME_TYPE_PING: u16 = 6;
pub(crate) const FRAME_TYPE_GOAWAY: u16 = 7;
pub(crate) const FRAME_TYPE_HEADERS: u16 = 8;
pub(crate) const FRAME_TYPE_WINDOW_UPDATE: u16 = 9;

/// Flag bits carried on SYN_STREAM, SYN_REPLY, and HEADERS frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ControlFlags(u8);

impl ControlFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Half-close of the sender's direction.
    pub const FIN: Self = Self(0x01);
    /// The stream initiator will not read.
    pub const UNIDIRECTIONAL: Self = Self(0x02);

    /// Raw flag byte as written to the wire.
    #[must_use]
    pub const fn bits(self) -> u8 { self.0 }

    /// Rebuild flags from a wire byte.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self { Self(bits) }

    /// Whether every bit in `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool { self.0 & other.0 == other.0 }
}

impl std::ops::BitOr for ControlFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self { Self(self.0 | rhs.0) }
}

impl std::ops::BitOrAssign for ControlFlags {
    fn bitor_assign(&mut self, rhs: Self) { self.0 |= rhs.0; }
}

/// RST_STREAM status codes defined by SPDY/3.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RstStatus {
    ProtocolError,
    InvalidStream,
    RefusedStream,
    UnsupportedVersion,
    Cancel,
    InternalError,
    FlowControlError,
    StreamInUse,
    StreamAlreadyClosed,
    InvalidCredentials,
    FrameTooLarge,
}

impl RstStatus {
    /// Wire value of this status code.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::ProtocolError => 1,
            Self::InvalidStream => 2,
            Self::RefusedStream => 3,
            Self::UnsupportedVersion => 4,
            Self::Cancel => 5,
            Self::InternalError => 6,
            Self::FlowControlError => 7,
            Self::StreamInUse => 8,
            Self::StreamAlreadyClosed => 9,
            Self::InvalidCredentials => 10,
            Self::FrameTooLarge => 11,
        }
    }

    /// Status for a wire value, if defined.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            1 => Self::ProtocolError,
            2 => Self::InvalidStream,
            3 => Self::RefusedStream,
            4 => Self::UnsupportedVersion,
            5 => Self::Cancel,
            6 => Self::InternalError,
            7 => Self::FlowControlError,
            8 => Self::StreamInUse,
            9 => Self::StreamAlreadyClosed,
            10 => Self::InvalidCredentials,
            11 => Self::FrameTooLarge,
            _ => return None,
        })
    }
}

impl fmt::Display for RstStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ProtocolError => "PROTOCOL_ERROR",
            Self::InvalidStream => "INVALID_STREAM",
            Self::RefusedStream => "REFUSED_STREAM",
            Self::UnsupportedVersion => "UNSUPPORTED_VERSION",
            Self::Cancel => "CANCEL",
            Self::InternalError => "INTERNAL_ERROR",
            Self::FlowControlError => "FLOW_CONTROL_ERROR",
            Self::StreamInUse => "STREAM_IN_USE",
            Self::StreamAlreadyClosed => "STREAM_ALREADY_CLOSED",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::FrameTooLarge => "FRAME_TOO_LARGE",
        };
        f.write_str(name)
    }
}

/// One SETTINGS entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Setting {
    pub flags: u8,
    pub id: u32,
    pub value: u32,
}

/// A parsed SPDY/3 frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    SynStream {
        stream_id: u32,
        associated_id: u32,
        priority: u8,
        flags: ControlFlags,
        headers: Headers,
    },
    SynReply {
        stream_id: u32,
        flags: ControlFlags,
        headers: Headers,
    },
    RstStream {
        stream_id: u32,
        status: RstStatus,
    },
    Settings {
        entries: Vec<Setting>,
    },
    Ping {
        id: u32,
    },
    GoAway {
        last_stream_id: u32,
        status: u32,
    },
    Headers {
        stream_id: u32,
        flags: ControlFlags,
        headers: Headers,
    },
    WindowUpdate {
        stream_id: u32,
        delta: u32,
    },
    Data {
        stream_id: u32,
        fin: bool,
        data: Bytes,
    },
    /// A control frame this crate does not interpret, kept for logging.
    Unknown {
        kind: u16,
        flags: u8,
        payload: Bytes,
    },
}

impl Frame {
    /// Stream id the frame applies to, when it has one.
    #[must_use]
    pub fn stream_id(&self) -> Option<u32> {
        match self {
            Self::SynStream { stream_id, .. }
            | Self::SynReply { stream_id, .. }
            | Self::RstStream { stream_id, .. }
            | Self::Headers { stream_id, .. }
            | Self::WindowUpdate { stream_id, .. }
            | Self::Data { stream_id, .. } => Some(*stream_id),
            _ => None,
        }
    }

    /// Short frame name for diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::SynStream { .. } => "SYN_STREAM",
            Self::SynReply { .. } => "SYN_REPLY",
            Self::RstStream { .. } => "RST_STREAM",
            Self::Settings { .. } => "SETTINGS",
            Self::Ping { .. } => "PING",
            Self::GoAway { .. } => "GOAWAY",
            Self::Headers { .. } => "HEADERS",
            Self::WindowUpdate { .. } => "WINDOW_UPDATE",
            Self::Data { .. } => "DATA",
            Self::Unknown { .. } => "UNKNOWN",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_flag_ops() {
        let flags = ControlFlags::FIN | ControlFlags::UNIDIRECTIONAL;
        assert!(flags.contains(ControlFlags::FIN));
        assert!(flags.contains(ControlFlags::UNIDIRECTIONAL));
        assert!(!ControlFlags::FIN.contains(ControlFlags::UNIDIRECTIONAL));
        assert_eq!(ControlFlags::from_bits(flags.bits()), flags);
    }

    #[test]
    fn rst_status_round_trip() {
        for code in 1..=11 {
            let status = RstStatus::from_code(code).unwrap();
            assert_eq!(status.code(), code);
        }
        assert_eq!(RstStatus::from_code(0), None);
        assert_eq!(RstStatus::from_code(12), None);
    }
}
