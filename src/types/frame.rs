use bytes::Bytes;
use std::collections::BTreeMap;

/// Decoded name/value header block. Names are lower-case; a value holding
/// several logical values joins them with NUL.
pub type HeaderBlock = BTreeMap<String, String>;

/// Common header of a control frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlHead {
    pub version: u16,
    pub frame_type: u16,
    pub flags: u8,
    pub length: u32,
}

/// First 8 bytes of any frame, split on the control bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameHead {
    Control(ControlHead),
    Data { stream_id: u32, flags: u8, length: u32 },
}

impl FrameHead {
    pub fn length(&self) -> u32 {
        match self {
            FrameHead::Control(head) => head.length,
            FrameHead::Data { length, .. } => *length,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynStreamFrame {
    pub flags: u8,
    pub stream_id: u32,
    pub associated_id: u32,
    /// 2-bit priority, 0 is highest.
    pub priority: u8,
    pub headers: HeaderBlock,
}

impl SynStreamFrame {
    pub fn new(stream_id: u32) -> Self {
        Self {
            flags: 0,
            stream_id,
            associated_id: 0,
            priority: 3,
            headers: HeaderBlock::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynReplyFrame {
    pub flags: u8,
    pub stream_id: u32,
    pub headers: HeaderBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RstStreamFrame {
    pub flags: u8,
    pub stream_id: u32,
    pub status: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Setting {
    pub id: u32,
    pub flag: u8,
    pub value: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SettingsFrame {
    pub flags: u8,
    pub settings: Vec<Setting>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingFrame {
    pub id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoawayFrame {
    pub last_good_stream_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadersFrame {
    pub flags: u8,
    pub stream_id: u32,
    pub headers: HeaderBlock,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub stream_id: u32,
    pub flags: u8,
    pub data: Bytes,
}

impl DataFrame {
    pub fn new(stream_id: u32, data: Bytes, fin: bool) -> Self {
        Self {
            stream_id,
            flags: if fin { crate::spdy::consts::FLAG_FIN } else { 0 },
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    SynStream(SynStreamFrame),
    SynReply(SynReplyFrame),
    RstStream(RstStreamFrame),
    Settings(SettingsFrame),
    Noop,
    Ping(PingFrame),
    Goaway(GoawayFrame),
    Headers(HeadersFrame),
    Data(DataFrame),
}

impl Frame {
    pub fn name(&self) -> &'static str {
        match self {
            Frame::SynStream(_) => "SYN_STREAM",
            Frame::SynReply(_) => "SYN_REPLY",
            Frame::RstStream(_) => "RST_STREAM",
            Frame::Settings(_) => "SETTINGS",
            Frame::Noop => "NOOP",
            Frame::Ping(_) => "PING",
            Frame::Goaway(_) => "GOAWAY",
            Frame::Headers(_) => "HEADERS",
            Frame::Data(_) => "DATA",
        }
    }

    /// Stream the frame belongs to; `None` for session-scoped frames.
    pub fn stream_id(&self) -> Option<u32> {
        match self {
            Frame::SynStream(f) => Some(f.stream_id),
            Frame::SynReply(f) => Some(f.stream_id),
            Frame::RstStream(f) => Some(f.stream_id),
            Frame::Headers(f) => Some(f.stream_id),
            Frame::Data(f) => Some(f.stream_id),
            Frame::Settings(_) | Frame::Noop | Frame::Ping(_) | Frame::Goaway(_) => None,
        }
    }

    pub fn flags(&self) -> u8 {
        match self {
            Frame::SynStream(f) => f.flags,
            Frame::SynReply(f) => f.flags,
            Frame::RstStream(f) => f.flags,
            Frame::Settings(f) => f.flags,
            Frame::Headers(f) => f.flags,
            Frame::Data(f) => f.flags,
            Frame::Noop | Frame::Ping(_) | Frame::Goaway(_) => 0,
        }
    }

    pub fn is_fin(&self) -> bool {
        self.flags() & crate::spdy::consts::FLAG_FIN != 0
    }
}
