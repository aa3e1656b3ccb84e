use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{trace, warn};

use super::compression::{HeaderCompressor, HeaderDecompressor};
use super::consts::*;
use crate::types::{
    ControlHead, DataFrame, Frame, FrameHead, GoawayFrame, HeadersFrame, PingFrame,
    ProtocolError, RstStreamFrame, Setting, SettingsFrame, SynReplyFrame, SynStreamFrame,
};
use crate::utils::with_timeout_result;

/// Splits the two leading words of a frame.
pub fn decode_frame_header(first_word: u32, second_word: u32) -> Result<FrameHead, ProtocolError> {
    let flags = (second_word >> 24) as u8;
    let length = second_word & LENGTH_MASK;

    if first_word & CONTROL_BIT == 0 {
        return Ok(FrameHead::Data {
            stream_id: first_word & STREAM_ID_MASK,
            flags,
            length,
        });
    }

    let version = ((first_word & 0x7fff_0000) >> 16) as u16;
    let frame_type = (first_word & 0xffff) as u16;

    if version == 0 {
        return Err(ProtocolError::FramingError(
            "control frame with version 0".to_string(),
        ));
    }
    if frame_type == 0 {
        return Err(ProtocolError::FramingError(
            "control frame with type 0".to_string(),
        ));
    }
    // NOOP has no body; every other control frame carries at least a word.
    if length == 0 && frame_type != NOOP {
        return Err(ProtocolError::FramingError(format!(
            "{} control frame with length 0",
            control_frame_name(frame_type)
        )));
    }
    if version != SPDY_VERSION {
        warn!(version, "control frame for unexpected SPDY version");
    }

    Ok(FrameHead::Control(ControlHead {
        version,
        frame_type,
        flags,
        length,
    }))
}

pub fn parse_frame_head(head: &[u8; FRAME_HEADER_SIZE]) -> Result<FrameHead, ProtocolError> {
    let first = u32::from_be_bytes([head[0], head[1], head[2], head[3]]);
    let second = u32::from_be_bytes([head[4], head[5], head[6], head[7]]);
    decode_frame_header(first, second)
}

/// Decodes a frame body. `payload` holds exactly the bytes announced by the
/// head; header blocks are inflated through the session decompressor.
pub fn decode_body(
    head: &FrameHead,
    mut payload: Bytes,
    decompressor: &mut HeaderDecompressor,
) -> Result<Frame, ProtocolError> {
    let control = match head {
        FrameHead::Data {
            stream_id, flags, ..
        } => {
            trace!(stream_id, length = payload.len(), "decoded DATA");
            return Ok(Frame::Data(DataFrame {
                stream_id: *stream_id,
                flags: *flags,
                data: payload,
            }));
        }
        FrameHead::Control(control) => control,
    };

    let name = control_frame_name(control.frame_type);
    let frame = match control.frame_type {
        SYN_STREAM => {
            require(&payload, SYN_STREAM_FIXED_LEN, name)?;
            let stream_id = payload.get_u32() & STREAM_ID_MASK;
            let associated_id = payload.get_u32() & STREAM_ID_MASK;
            let priority = (payload.get_u16() >> 14) as u8;
            Frame::SynStream(SynStreamFrame {
                flags: control.flags,
                stream_id,
                associated_id,
                priority,
                headers: decompressor.decode(&payload)?,
            })
        }
        SYN_REPLY => {
            require(&payload, SYN_REPLY_FIXED_LEN, name)?;
            let stream_id = payload.get_u32() & STREAM_ID_MASK;
            payload.advance(2);
            Frame::SynReply(SynReplyFrame {
                flags: control.flags,
                stream_id,
                headers: decompressor.decode(&payload)?,
            })
        }
        RST_STREAM => {
            require(&payload, 8, name)?;
            Frame::RstStream(RstStreamFrame {
                flags: control.flags,
                stream_id: payload.get_u32() & STREAM_ID_MASK,
                status: payload.get_u32(),
            })
        }
        SETTINGS => {
            require(&payload, 4, name)?;
            let count = payload.get_u32() as usize;
            let needed = count.checked_mul(8).ok_or_else(|| {
                ProtocolError::FramingError(format!("SETTINGS count {} overflows", count))
            })?;
            if needed > payload.remaining() {
                return Err(ProtocolError::FramingError(format!(
                    "SETTINGS announces {} entries but carries {} bytes",
                    count,
                    payload.remaining()
                )));
            }
            let mut settings = Vec::with_capacity(count);
            for _ in 0..count {
                // The id/flag word is little-endian on the wire, the value is not.
                let id_flag = payload.get_u32_le();
                settings.push(Setting {
                    id: id_flag & 0x00ff_ffff,
                    flag: (id_flag >> 24) as u8,
                    value: payload.get_u32(),
                });
            }
            Frame::Settings(SettingsFrame {
                flags: control.flags,
                settings,
            })
        }
        NOOP => Frame::Noop,
        PING => {
            require(&payload, 4, name)?;
            Frame::Ping(PingFrame {
                id: payload.get_u32(),
            })
        }
        GOAWAY => {
            require(&payload, 4, name)?;
            Frame::Goaway(GoawayFrame {
                last_good_stream_id: payload.get_u32() & STREAM_ID_MASK,
            })
        }
        HEADERS => {
            require(&payload, SYN_REPLY_FIXED_LEN, name)?;
            let stream_id = payload.get_u32() & STREAM_ID_MASK;
            payload.advance(2);
            Frame::Headers(HeadersFrame {
                flags: control.flags,
                stream_id,
                headers: decompressor.decode(&payload)?,
            })
        }
        other => return Err(ProtocolError::UnsupportedFrameType(other)),
    };

    trace!(frame = frame.name(), flags = control.flags, length = control.length, "decoded");
    Ok(frame)
}

fn require(payload: &Bytes, needed: usize, name: &str) -> Result<(), ProtocolError> {
    if payload.remaining() < needed {
        return Err(ProtocolError::FramingError(format!(
            "{} body needs {} bytes, got {}",
            name,
            needed,
            payload.remaining()
        )));
    }
    Ok(())
}

fn control_word(frame_type: u16) -> u32 {
    CONTROL_BIT | ((SPDY_VERSION as u32) << 16) | frame_type as u32
}

fn flags_length(flags: u8, length: usize) -> Result<u32, ProtocolError> {
    if length > MAX_FRAME_LENGTH {
        return Err(ProtocolError::FramingError(format!(
            "frame length {} exceeds {}",
            length, MAX_FRAME_LENGTH
        )));
    }
    Ok(((flags as u32) << 24) + length as u32)
}

pub fn encode_syn_stream(
    frame: &SynStreamFrame,
    compressor: &mut HeaderCompressor,
) -> Result<Bytes, ProtocolError> {
    let block = compressor.encode(&frame.headers)?;
    let mut out = BytesMut::with_capacity(FRAME_HEADER_SIZE + SYN_STREAM_FIXED_LEN + block.len());
    out.put_u32(SYN_STREAM_HEAD);
    out.put_u32(flags_length(frame.flags, block.len() + SYN_STREAM_FIXED_LEN)?);
    out.put_u32(frame.stream_id & STREAM_ID_MASK);
    out.put_u32(frame.associated_id & STREAM_ID_MASK);
    out.put_u16(((frame.priority & 0x03) as u16) << 14);
    out.put_slice(&block);
    Ok(out.freeze())
}

pub fn encode_data(frame: &DataFrame) -> Result<Bytes, ProtocolError> {
    let mut out = BytesMut::with_capacity(FRAME_HEADER_SIZE + frame.data.len());
    out.put_u32(frame.stream_id & STREAM_ID_MASK);
    out.put_u32(flags_length(frame.flags, frame.data.len())?);
    out.put_slice(&frame.data);
    Ok(out.freeze())
}

/// Serializes any frame. Client traffic only ever needs SYN_STREAM and DATA;
/// the other kinds are written by in-process peers and diagnostics.
pub fn encode_frame(frame: &Frame, compressor: &mut HeaderCompressor) -> Result<Bytes, ProtocolError> {
    match frame {
        Frame::SynStream(f) => encode_syn_stream(f, compressor),
        Frame::Data(f) => encode_data(f),
        Frame::SynReply(f) => {
            let block = compressor.encode(&f.headers)?;
            let mut body = BytesMut::with_capacity(SYN_REPLY_FIXED_LEN + block.len());
            body.put_u32(f.stream_id & STREAM_ID_MASK);
            body.put_u16(0);
            body.put_slice(&block);
            control_frame(SYN_REPLY, f.flags, &body)
        }
        Frame::Headers(f) => {
            let block = compressor.encode(&f.headers)?;
            let mut body = BytesMut::with_capacity(SYN_REPLY_FIXED_LEN + block.len());
            body.put_u32(f.stream_id & STREAM_ID_MASK);
            body.put_u16(0);
            body.put_slice(&block);
            control_frame(HEADERS, f.flags, &body)
        }
        Frame::RstStream(f) => {
            let mut body = BytesMut::with_capacity(8);
            body.put_u32(f.stream_id & STREAM_ID_MASK);
            body.put_u32(f.status);
            control_frame(RST_STREAM, f.flags, &body)
        }
        Frame::Settings(f) => {
            let mut body = BytesMut::with_capacity(4 + f.settings.len() * 8);
            body.put_u32(f.settings.len() as u32);
            for setting in &f.settings {
                body.put_u32_le((setting.id & 0x00ff_ffff) | ((setting.flag as u32) << 24));
                body.put_u32(setting.value);
            }
            control_frame(SETTINGS, f.flags, &body)
        }
        Frame::Noop => control_frame(NOOP, 0, &[]),
        Frame::Ping(f) => control_frame(PING, 0, &f.id.to_be_bytes()),
        Frame::Goaway(f) => control_frame(
            GOAWAY,
            0,
            &(f.last_good_stream_id & STREAM_ID_MASK).to_be_bytes(),
        ),
    }
}

fn control_frame(frame_type: u16, flags: u8, body: &[u8]) -> Result<Bytes, ProtocolError> {
    let mut out = BytesMut::with_capacity(FRAME_HEADER_SIZE + body.len());
    out.put_u32(control_word(frame_type));
    out.put_u32(flags_length(flags, body.len())?);
    out.put_slice(body);
    Ok(out.freeze())
}

/// Reads one frame. Waiting for the head is unbounded (an idle session is
/// fine); the body must arrive within `read_timeout` once the head is in.
pub async fn read_frame<R>(
    reader: &mut R,
    decompressor: &mut HeaderDecompressor,
    read_timeout: Option<Duration>,
) -> Result<Frame, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut head_buf = [0u8; FRAME_HEADER_SIZE];
    reader.read_exact(&mut head_buf).await?;
    let head = parse_frame_head(&head_buf)?;
    trace!(?head, "frame head");

    let mut payload = vec![0u8; head.length() as usize];
    if !payload.is_empty() {
        with_timeout_result(read_timeout, async {
            reader.read_exact(&mut payload).await?;
            Ok(())
        })
        .await?;
    }

    decode_body(&head, Bytes::from(payload), decompressor)
}

pub async fn write_frame<W>(
    writer: &mut W,
    frame: &Frame,
    compressor: &mut HeaderCompressor,
    write_timeout: Option<Duration>,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode_frame(frame, compressor)?;
    trace!(frame = frame.name(), stream_id = ?frame.stream_id(), len = bytes.len(), "writing frame");
    with_timeout_result(write_timeout, async {
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(())
    })
    .await
}
