use bytes::{Buf, BufMut, Bytes, BytesMut};
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use std::borrow::Cow;
use tracing::{debug, trace, warn};

use super::consts::{HEADER_DICTIONARY, MAX_HEADER_BLOCK_SIZE};
use crate::types::{HeaderBlock, ProtocolError};

const MIN_OUTPUT_CHUNK: usize = 256;

/// Session-wide deflate stream for outgoing header blocks.
///
/// Every block is ended with a sync flush, so a peer can decode it as soon as
/// it arrives while the window keeps carrying over to the next block.
pub struct HeaderCompressor {
    inner: Compress,
}

impl HeaderCompressor {
    pub fn new() -> Result<Self, ProtocolError> {
        let mut inner = Compress::new(Compression::best(), true);
        inner.set_dictionary(HEADER_DICTIONARY).map_err(|e| {
            ProtocolError::CompressionError(format!("failed to prime compressor: {}", e))
        })?;
        Ok(Self { inner })
    }

    /// Serializes and compresses `headers` as one header block.
    pub fn encode(&mut self, headers: &HeaderBlock) -> Result<Bytes, ProtocolError> {
        let block = encode_header_block(headers)?;
        self.compress(&block).map(Bytes::from)
    }

    pub fn compress(&mut self, input: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        let start_in = self.inner.total_in();
        let mut output = Vec::with_capacity(input.len() + MIN_OUTPUT_CHUNK);

        loop {
            let consumed = (self.inner.total_in() - start_in) as usize;
            if output.len() == output.capacity() {
                output.reserve(output.capacity().max(MIN_OUTPUT_CHUNK));
            }

            self.inner
                .compress_vec(&input[consumed..], &mut output, FlushCompress::Sync)
                .map_err(|e| ProtocolError::CompressionError(e.to_string()))?;

            let consumed = (self.inner.total_in() - start_in) as usize;
            // The flush is complete once all input is in and zlib stopped
            // short of filling the buffer.
            if consumed == input.len() && output.len() < output.capacity() {
                break;
            }
        }

        trace!(raw = input.len(), compressed = output.len(), "compressed header block");
        Ok(output)
    }
}

/// Session-wide inflate stream for incoming header blocks.
///
/// The dictionary is installed when zlib asks for it, which happens on the
/// first block of the session only.
pub struct HeaderDecompressor {
    inner: Decompress,
}

impl Default for HeaderDecompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderDecompressor {
    pub fn new() -> Self {
        Self {
            inner: Decompress::new(true),
        }
    }

    /// Decompresses and parses one header block.
    pub fn decode(&mut self, compressed: &[u8]) -> Result<HeaderBlock, ProtocolError> {
        let block = self.decompress(compressed)?;
        decode_header_block(&block)
    }

    pub fn decompress(&mut self, input: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        let start_in = self.inner.total_in();
        let mut output = Vec::with_capacity(
            (input.len().saturating_mul(4) + MIN_OUTPUT_CHUNK).min(MAX_HEADER_BLOCK_SIZE),
        );

        loop {
            let consumed_before = (self.inner.total_in() - start_in) as usize;
            if output.len() == output.capacity() {
                if output.len() >= MAX_HEADER_BLOCK_SIZE {
                    return Err(ProtocolError::CompressionError(format!(
                        "header block inflates past {} bytes",
                        MAX_HEADER_BLOCK_SIZE
                    )));
                }
                let grow = output
                    .capacity()
                    .max(MIN_OUTPUT_CHUNK)
                    .min(MAX_HEADER_BLOCK_SIZE - output.len());
                output.reserve_exact(grow);
            }
            let produced_before = output.len();

            match self.inner.decompress_vec(
                &input[consumed_before..],
                &mut output,
                FlushDecompress::Sync,
            ) {
                Ok(Status::StreamEnd) => break,
                Ok(_) => {}
                Err(e) if e.needs_dictionary().is_some() => {
                    self.inner.set_dictionary(HEADER_DICTIONARY).map_err(|e| {
                        ProtocolError::CompressionError(format!(
                            "failed to install header dictionary: {}",
                            e
                        ))
                    })?;
                    continue;
                }
                Err(e) => return Err(ProtocolError::CompressionError(e.to_string())),
            }

            let consumed = (self.inner.total_in() - start_in) as usize;
            if consumed == input.len() && output.len() < output.capacity() {
                break;
            }
            if consumed == consumed_before && output.len() == produced_before {
                if consumed == input.len() {
                    break;
                }
                return Err(ProtocolError::CompressionError(
                    "header block ended mid-stream".to_string(),
                ));
            }
        }

        Ok(output)
    }
}

/// Fails with `HeaderEncodingError` when `headers` cannot be laid out: more
/// than `u16::MAX` pairs or a name or value longer than `u16::MAX` bytes.
pub fn check_header_block(headers: &HeaderBlock) -> Result<(), ProtocolError> {
    if u16::try_from(headers.len()).is_err() {
        return Err(ProtocolError::HeaderEncodingError(format!(
            "too many headers: {}",
            headers.len()
        )));
    }
    let oversized = headers
        .iter()
        .flat_map(|(name, value)| [name, value])
        .find(|field| u16::try_from(field.len()).is_err());
    if let Some(field) = oversized {
        return Err(ProtocolError::HeaderEncodingError(format!(
            "header field too long: {} bytes",
            field.len()
        )));
    }
    Ok(())
}

/// Lays out a header block: u16 pair count, then per pair u16 name length,
/// name, u16 value length, value. All integers big-endian.
pub fn encode_header_block(headers: &HeaderBlock) -> Result<Vec<u8>, ProtocolError> {
    let count = u16::try_from(headers.len()).map_err(|_| {
        ProtocolError::HeaderEncodingError(format!("too many headers: {}", headers.len()))
    })?;

    let mut block = BytesMut::with_capacity(2 + headers.len() * 16);
    block.put_u16(count);
    for (name, value) in headers {
        put_string(&mut block, name)?;
        put_string(&mut block, value)?;
    }
    Ok(block.to_vec())
}

fn put_string(block: &mut BytesMut, value: &str) -> Result<(), ProtocolError> {
    let len = u16::try_from(value.len()).map_err(|_| {
        ProtocolError::HeaderEncodingError(format!("header field too long: {} bytes", value.len()))
    })?;
    block.put_u16(len);
    block.put_slice(value.as_bytes());
    Ok(())
}

/// Parses an uncompressed header block. Names are lower-cased; repeated names
/// have their values joined with NUL.
pub fn decode_header_block(mut block: &[u8]) -> Result<HeaderBlock, ProtocolError> {
    let count = take_u16(&mut block)?;
    let mut headers = HeaderBlock::new();

    for _ in 0..count {
        let raw_name = take_string(&mut block)?;
        let value = take_string(&mut block)?;

        let name = raw_name.to_ascii_lowercase();
        if name != raw_name {
            warn!(header = %raw_name, "received header name that is not lower-case");
        }

        match headers.get_mut(&name) {
            Some(existing) => {
                existing.push('\0');
                existing.push_str(&value);
            }
            None => {
                headers.insert(name, value);
            }
        }
    }

    if block.has_remaining() {
        trace!(trailing = block.remaining(), "ignoring bytes after header block");
    }

    Ok(headers)
}

fn take_u16(block: &mut &[u8]) -> Result<u16, ProtocolError> {
    if block.remaining() < 2 {
        return Err(ProtocolError::MalformedHeaders(
            "header block truncated".to_string(),
        ));
    }
    Ok(block.get_u16())
}

fn take_string(block: &mut &[u8]) -> Result<String, ProtocolError> {
    let len = take_u16(block)? as usize;
    if block.remaining() < len {
        return Err(ProtocolError::MalformedHeaders(format!(
            "header field needs {} bytes, {} left",
            len,
            block.remaining()
        )));
    }
    let value = match String::from_utf8_lossy(&block[..len]) {
        Cow::Borrowed(text) => text.to_string(),
        Cow::Owned(text) => {
            debug!(header = %text, "replaced invalid UTF-8 in header field");
            text
        }
    };
    block.advance(len);
    Ok(value)
}
