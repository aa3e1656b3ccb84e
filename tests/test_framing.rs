use bytes::Bytes;
use ripspdy::spdy::consts::*;
use ripspdy::spdy::framing::{
    decode_body, decode_frame_header, encode_data, encode_frame, encode_syn_stream,
    parse_frame_head, read_frame, write_frame,
};
use ripspdy::spdy::{HeaderCompressor, HeaderDecompressor};
use ripspdy::types::{
    DataFrame, Frame, FrameHead, GoawayFrame, HeaderBlock, PingFrame, ProtocolError,
    RstStreamFrame, Setting, SettingsFrame, SynReplyFrame, SynStreamFrame,
};

fn head_of(bytes: &[u8]) -> FrameHead {
    let mut head = [0u8; FRAME_HEADER_SIZE];
    head.copy_from_slice(&bytes[..FRAME_HEADER_SIZE]);
    parse_frame_head(&head).expect("valid head")
}

fn decode(bytes: Bytes, decompressor: &mut HeaderDecompressor) -> Result<Frame, ProtocolError> {
    let head = head_of(&bytes);
    decode_body(&head, bytes.slice(FRAME_HEADER_SIZE..), decompressor)
}

fn sample_headers() -> HeaderBlock {
    let mut headers = HeaderBlock::new();
    headers.insert("method".to_string(), "GET".to_string());
    headers.insert("url".to_string(), "/".to_string());
    headers.insert("version".to_string(), "HTTP/1.1".to_string());
    headers
}

#[test]
fn control_head_fields() {
    let head = decode_frame_header(0x8002_0002, 0x0100_0010).unwrap();
    match head {
        FrameHead::Control(control) => {
            assert_eq!(control.version, 2);
            assert_eq!(control.frame_type, SYN_REPLY);
            assert_eq!(control.flags, FLAG_FIN);
            assert_eq!(control.length, 16);
        }
        other => panic!("expected control head, got {:?}", other),
    }
}

#[test]
fn data_head_fields() {
    let head = decode_frame_header(0x0000_0005, 0x0100_0003).unwrap();
    assert_eq!(
        head,
        FrameHead::Data {
            stream_id: 5,
            flags: FLAG_FIN,
            length: 3
        }
    );
    assert_eq!(head.length(), 3);
}

#[test]
fn control_head_rejects_zero_fields() {
    let zero_version = decode_frame_header(0x8000_0001, 0x0000_0010).unwrap_err();
    assert!(matches!(zero_version, ProtocolError::FramingError(_)));

    let zero_type = decode_frame_header(0x8002_0000, 0x0000_0010).unwrap_err();
    assert!(matches!(zero_type, ProtocolError::FramingError(_)));

    let zero_length = decode_frame_header(0x8002_0006, 0).unwrap_err();
    assert!(matches!(zero_length, ProtocolError::FramingError(_)));

    // NOOP has no body.
    assert!(decode_frame_header(0x8002_0005, 0).is_ok());
}

#[test]
fn syn_stream_layout() {
    let mut compressor = HeaderCompressor::new().unwrap();
    let mut syn = SynStreamFrame::new(1);
    syn.flags = FLAG_FIN;
    syn.headers = sample_headers();

    let bytes = encode_syn_stream(&syn, &mut compressor).unwrap();
    assert_eq!(&bytes[0..4], &[0x80, 0x02, 0x00, 0x01]);
    assert_eq!(bytes[4], FLAG_FIN);
    let length = u32::from_be_bytes([0, bytes[5], bytes[6], bytes[7]]) as usize;
    assert_eq!(length, bytes.len() - FRAME_HEADER_SIZE);
    assert_eq!(&bytes[8..12], &[0, 0, 0, 1]);
    assert_eq!(&bytes[12..16], &[0, 0, 0, 0]);
    assert_eq!(&bytes[16..18], &[0xC0, 0x00]);

    let mut decompressor = HeaderDecompressor::new();
    match decode(bytes, &mut decompressor).unwrap() {
        Frame::SynStream(decoded) => assert_eq!(decoded, syn),
        other => panic!("expected SYN_STREAM, got {:?}", other),
    }
}

#[test]
fn data_layout() {
    let frame = DataFrame::new(3, Bytes::from_static(b"abc"), true);
    let bytes = encode_data(&frame).unwrap();
    assert_eq!(
        &bytes[..],
        &[0, 0, 0, 3, FLAG_FIN, 0, 0, 3, b'a', b'b', b'c']
    );

    let mut decompressor = HeaderDecompressor::new();
    assert_eq!(
        decode(bytes, &mut decompressor).unwrap(),
        Frame::Data(frame)
    );
}

#[test]
fn settings_id_word_is_little_endian() {
    let mut bytes = vec![0x80, 0x02, 0x00, 0x04, 0x00, 0x00, 0x00, 0x0c];
    bytes.extend_from_slice(&[0, 0, 0, 1]);
    bytes.extend_from_slice(&[0x04, 0x00, 0x00, 0x01]);
    bytes.extend_from_slice(&100u32.to_be_bytes());

    let mut decompressor = HeaderDecompressor::new();
    let frame = decode(Bytes::from(bytes.clone()), &mut decompressor).unwrap();
    let expected = SettingsFrame {
        flags: 0,
        settings: vec![Setting {
            id: 4,
            flag: 1,
            value: 100,
        }],
    };
    assert_eq!(frame, Frame::Settings(expected.clone()));

    let mut compressor = HeaderCompressor::new().unwrap();
    let encoded = encode_frame(&Frame::Settings(expected), &mut compressor).unwrap();
    assert_eq!(&encoded[..], &bytes[..]);
}

#[test]
fn settings_count_beyond_body_is_rejected() {
    let mut bytes = vec![0x80, 0x02, 0x00, 0x04, 0x00, 0x00, 0x00, 0x0c];
    bytes.extend_from_slice(&[0, 0, 0, 2]);
    bytes.extend_from_slice(&[0x04, 0x00, 0x00, 0x01]);
    bytes.extend_from_slice(&100u32.to_be_bytes());

    let mut decompressor = HeaderDecompressor::new();
    let err = decode(Bytes::from(bytes), &mut decompressor).unwrap_err();
    assert!(matches!(err, ProtocolError::FramingError(_)));
}

#[test]
fn session_frames() {
    let mut compressor = HeaderCompressor::new().unwrap();
    let mut decompressor = HeaderDecompressor::new();

    let goaway = Frame::Goaway(GoawayFrame {
        last_good_stream_id: 7,
    });
    let bytes = encode_frame(&goaway, &mut compressor).unwrap();
    assert_eq!(&bytes[..], &[0x80, 0x02, 0x00, 0x07, 0, 0, 0, 4, 0, 0, 0, 7]);
    assert_eq!(decode(bytes, &mut decompressor).unwrap(), goaway);

    let rst = Frame::RstStream(RstStreamFrame {
        flags: 0,
        stream_id: 3,
        status: 5,
    });
    let bytes = encode_frame(&rst, &mut compressor).unwrap();
    assert_eq!(&bytes[..8], &[0x80, 0x02, 0x00, 0x03, 0, 0, 0, 8]);
    assert_eq!(decode(bytes, &mut decompressor).unwrap(), rst);

    let ping = Frame::Ping(PingFrame { id: 9 });
    let bytes = encode_frame(&ping, &mut compressor).unwrap();
    assert_eq!(decode(bytes, &mut decompressor).unwrap(), ping);

    let noop = encode_frame(&Frame::Noop, &mut compressor).unwrap();
    assert_eq!(&noop[..], &[0x80, 0x02, 0x00, 0x05, 0, 0, 0, 0]);
    assert_eq!(decode(noop, &mut decompressor).unwrap(), Frame::Noop);
}

#[test]
fn unknown_control_type() {
    let bytes = Bytes::from_static(&[0x80, 0x02, 0x00, 0x09, 0, 0, 0, 4, 0, 0, 0, 0]);
    let mut decompressor = HeaderDecompressor::new();
    let err = decode(bytes, &mut decompressor).unwrap_err();
    assert!(matches!(err, ProtocolError::UnsupportedFrameType(9)));
}

#[test]
fn truncated_syn_reply_body() {
    let bytes = Bytes::from_static(&[0x80, 0x02, 0x00, 0x02, 0, 0, 0, 3, 0, 0, 1]);
    let mut decompressor = HeaderDecompressor::new();
    let err = decode(bytes, &mut decompressor).unwrap_err();
    assert!(matches!(err, ProtocolError::FramingError(_)));
}

#[tokio::test]
async fn read_and_write_over_a_byte_stream() {
    let mut compressor = HeaderCompressor::new().unwrap();
    let reply = Frame::SynReply(SynReplyFrame {
        flags: 0,
        stream_id: 1,
        headers: sample_headers(),
    });
    let data = Frame::Data(DataFrame::new(1, Bytes::from_static(b"hello"), true));

    let mut wire = Vec::new();
    write_frame(&mut wire, &reply, &mut compressor, None).await.unwrap();
    write_frame(&mut wire, &data, &mut compressor, None).await.unwrap();

    let mut decompressor = HeaderDecompressor::new();
    let mut reader = &wire[..];
    assert_eq!(read_frame(&mut reader, &mut decompressor, None).await.unwrap(), reply);
    assert_eq!(read_frame(&mut reader, &mut decompressor, None).await.unwrap(), data);

    let eof = read_frame(&mut reader, &mut decompressor, None).await.unwrap_err();
    assert!(matches!(eof, ProtocolError::Io(_)));
}

#[tokio::test]
async fn read_frame_across_partial_reads() {
    let mut compressor = HeaderCompressor::new().unwrap();
    let frame = Frame::Data(DataFrame::new(7, Bytes::from_static(b"split body"), true));
    let bytes = encode_frame(&frame, &mut compressor).unwrap();

    let mut reader = tokio_test::io::Builder::new()
        .read(&bytes[..3])
        .read(&bytes[3..10])
        .read(&bytes[10..])
        .build();
    let mut decompressor = HeaderDecompressor::new();
    assert_eq!(
        read_frame(&mut reader, &mut decompressor, None).await.unwrap(),
        frame
    );
}
