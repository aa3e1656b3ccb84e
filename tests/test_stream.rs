use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use ripspdy::spdy::consts::FLAG_FIN;
use ripspdy::spdy::stream::{request_headers, response_from_headers};
use ripspdy::spdy::{Stream, StreamPhase};
use ripspdy::types::{
    DataFrame, Frame, Header, HeaderBlock, ProtocolError, Request, Response, ResponseHandler,
    SynReplyFrame,
};
use std::io::Write;
use std::sync::{Arc, Mutex};

type Deliveries = Arc<Mutex<Vec<(u32, Result<Response, ProtocolError>)>>>;

fn recording_handler() -> (ResponseHandler, Deliveries) {
    let deliveries: Deliveries = Arc::new(Mutex::new(Vec::new()));
    let sink = deliveries.clone();
    let handler: ResponseHandler = Box::new(move |stream_id, result| {
        sink.lock().unwrap().push((stream_id, result));
    });
    (handler, deliveries)
}

fn reply(stream_id: u32, status: &str, fin: bool) -> SynReplyFrame {
    let mut headers = HeaderBlock::new();
    headers.insert("status".to_string(), status.to_string());
    headers.insert("version".to_string(), "HTTP/1.1".to_string());
    SynReplyFrame {
        flags: if fin { FLAG_FIN } else { 0 },
        stream_id,
        headers,
    }
}

fn opened(stream_id: u32, request: &Request) -> (Stream, Deliveries) {
    let (handler, deliveries) = recording_handler();
    let mut stream = Stream::new(stream_id, handler);
    stream.syn(request).unwrap();
    (stream, deliveries)
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

#[test]
fn reply_with_fin_completes_without_body() {
    let request = Request::get("https://example.com/index.html").unwrap();
    let (mut stream, deliveries) = opened(1, &request);
    assert_eq!(stream.phase(), StreamPhase::AwaitingReply);

    stream.reply_to_response(&reply(1, "200 OK", true)).unwrap();
    assert_eq!(stream.phase(), StreamPhase::Complete);
    assert!(stream.is_finished());

    let deliveries = deliveries.lock().unwrap();
    assert_eq!(deliveries.len(), 1);
    let (id, result) = &deliveries[0];
    assert_eq!(*id, 1);
    let response = result.as_ref().unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.status_text, "OK");
    assert_eq!(response.protocol, "HTTP/1.1");
    assert!(response.body.is_empty());
}

#[test]
fn body_request_opens_with_syn_then_data() {
    let request = Request::post("http://example.com/submit", "a=1").unwrap();
    let (handler, _) = recording_handler();
    let mut stream = Stream::new(3, handler);

    let frames = stream.syn(&request).unwrap();
    assert_eq!(frames.len(), 2);
    match &frames[0] {
        Frame::SynStream(syn) => {
            assert_eq!(syn.stream_id, 3);
            assert_eq!(syn.flags & FLAG_FIN, 0);
            assert_eq!(syn.headers["method"], "POST");
            assert_eq!(syn.headers["url"], "/submit");
        }
        other => panic!("expected SYN_STREAM, got {:?}", other),
    }
    assert_eq!(
        frames[1],
        Frame::Data(DataFrame::new(3, Bytes::from_static(b"a=1"), true))
    );

    let again = stream.syn(&request).unwrap_err();
    assert!(matches!(again, ProtocolError::ProtocolStateError(_)));
}

#[test]
fn bodiless_request_is_a_single_fin_syn() {
    let request = Request::get("http://example.com/").unwrap();
    let (handler, _) = recording_handler();
    let mut stream = Stream::new(1, handler);

    let frames = stream.syn(&request).unwrap();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].is_fin());
}

#[test]
fn data_frames_are_concatenated() {
    let request = Request::get("http://example.com/").unwrap();
    let (mut stream, deliveries) = opened(1, &request);

    stream.reply_to_response(&reply(1, "200 OK", false)).unwrap();
    assert_eq!(stream.phase(), StreamPhase::AwaitingBody);
    stream
        .data_to_response(&DataFrame::new(1, Bytes::from_static(b"ab"), false))
        .unwrap();
    assert!(deliveries.lock().unwrap().is_empty());
    stream
        .data_to_response(&DataFrame::new(1, Bytes::from_static(b"cd"), true))
        .unwrap();

    let deliveries = deliveries.lock().unwrap();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(
        deliveries[0].1.as_ref().unwrap().body,
        Bytes::from_static(b"abcd")
    );
}

#[test]
fn request_headers_carry_the_mandatory_entries() {
    let request = Request::get("https://example.com:8443/a?b=1#c")
        .unwrap()
        .header(Header::new("Accept", "text/html"))
        .header(Header::new("accept", "application/json"))
        .header(Header::new("Connection", "keep-alive"))
        .header(Header::new("Transfer-Encoding", "chunked"));

    let headers = request_headers(&request);
    assert_eq!(headers["method"], "GET");
    assert_eq!(headers["scheme"], "https");
    assert_eq!(headers["host"], "example.com:8443");
    assert_eq!(headers["url"], "/a?b=1#c");
    assert_eq!(headers["version"], "HTTP/1.1");
    assert_eq!(headers["accept"], "text/html\0application/json");
    assert!(!headers.contains_key("connection"));
    assert!(!headers.contains_key("transfer-encoding"));
}

#[test]
fn explicit_host_header_wins() {
    let request = Request::get("http://10.0.0.1/")
        .unwrap()
        .header(Header::new("Host", "virtual.example"));
    assert_eq!(request_headers(&request)["host"], "virtual.example");
}

#[test]
fn data_before_reply_fails_the_stream() {
    let request = Request::get("http://example.com/").unwrap();
    let (mut stream, deliveries) = opened(1, &request);

    let err = stream
        .data_to_response(&DataFrame::new(1, Bytes::from_static(b"x"), false))
        .unwrap_err();
    assert!(matches!(err, ProtocolError::ProtocolStateError(_)));
    assert_eq!(stream.phase(), StreamPhase::Error);

    let deliveries = deliveries.lock().unwrap();
    assert_eq!(deliveries.len(), 1);
    assert!(matches!(
        deliveries[0].1,
        Err(ProtocolError::ProtocolStateError(_))
    ));
}

#[test]
fn reply_without_status_fails_the_stream() {
    let request = Request::get("http://example.com/").unwrap();
    let (mut stream, deliveries) = opened(1, &request);

    let mut bad = reply(1, "200 OK", true);
    bad.headers.remove("status");
    let err = stream.reply_to_response(&bad).unwrap_err();
    assert!(matches!(err, ProtocolError::MalformedHeaders(_)));
    assert!(matches!(
        deliveries.lock().unwrap()[0].1,
        Err(ProtocolError::MalformedHeaders(_))
    ));
}

#[test]
fn handler_runs_once() {
    let request = Request::get("http://example.com/").unwrap();
    let (mut stream, deliveries) = opened(1, &request);

    stream.reply_to_response(&reply(1, "200 OK", true)).unwrap();
    assert!(stream
        .data_to_response(&DataFrame::new(1, Bytes::from_static(b"late"), true))
        .is_err());
    stream.fail(ProtocolError::Cancelled);
    assert!(stream.reply_to_response(&reply(1, "200 OK", true)).is_err());

    let deliveries = deliveries.lock().unwrap();
    assert_eq!(deliveries.len(), 1);
    assert!(deliveries[0].1.is_ok());
}

#[test]
fn gzip_body_split_across_frames() {
    let request = Request::get("http://example.com/").unwrap();
    let (mut stream, deliveries) = opened(1, &request);

    let mut head = reply(1, "200 OK", false);
    head.headers
        .insert("content-encoding".to_string(), "gzip".to_string());
    stream.reply_to_response(&head).unwrap();

    let body = gzip(b"compressed payload");
    let (left, right) = body.split_at(body.len() / 2);
    stream
        .data_to_response(&DataFrame::new(1, Bytes::copy_from_slice(left), false))
        .unwrap();
    stream
        .data_to_response(&DataFrame::new(1, Bytes::copy_from_slice(right), true))
        .unwrap();

    let deliveries = deliveries.lock().unwrap();
    let response = deliveries[0].1.as_ref().unwrap();
    assert_eq!(response.body, Bytes::from_static(b"compressed payload"));
    assert_eq!(response.content_encoding, vec!["gzip"]);
}

#[test]
fn gzip_member_per_frame() {
    let request = Request::get("http://example.com/").unwrap();
    let (mut stream, deliveries) = opened(1, &request);

    let mut head = reply(1, "200 OK", false);
    head.headers
        .insert("content-encoding".to_string(), "gzip".to_string());
    stream.reply_to_response(&head).unwrap();
    stream
        .data_to_response(&DataFrame::new(1, Bytes::from(gzip(b"one ")), false))
        .unwrap();
    stream
        .data_to_response(&DataFrame::new(1, Bytes::from(gzip(b"two")), true))
        .unwrap();

    let deliveries = deliveries.lock().unwrap();
    assert_eq!(
        deliveries[0].1.as_ref().unwrap().body,
        Bytes::from_static(b"one two")
    );
}

#[test]
fn head_response_drops_body() {
    let request = Request::new("http://example.com/", "HEAD").unwrap();
    let (mut stream, deliveries) = opened(1, &request);

    stream.reply_to_response(&reply(1, "200 OK", false)).unwrap();
    stream
        .data_to_response(&DataFrame::new(1, Bytes::from_static(b"ignored"), true))
        .unwrap();
    assert!(deliveries.lock().unwrap()[0].1.as_ref().unwrap().body.is_empty());
}

#[test]
fn response_head_parsing() {
    let mut block = HeaderBlock::new();
    block.insert("status".to_string(), "404 Not Found".to_string());
    block.insert("version".to_string(), "HTTP/1.1".to_string());
    block.insert("set-cookie".to_string(), "a=1\0b=2".to_string());

    let response = response_from_headers(&block).unwrap();
    assert_eq!(response.status, 404);
    assert_eq!(response.status_text, "Not Found");
    assert_eq!(response.status_line(), "HTTP/1.1 404 Not Found");
    assert_eq!(response.header_values("set-cookie"), vec!["a=1", "b=2"]);

    block.insert("status".to_string(), "abc".to_string());
    assert!(matches!(
        response_from_headers(&block).unwrap_err(),
        ProtocolError::MalformedHeaders(_)
    ));

    block.insert("status".to_string(), "200".to_string());
    block.remove("version");
    assert!(matches!(
        response_from_headers(&block).unwrap_err(),
        ProtocolError::MalformedHeaders(_)
    ));
}

#[test]
fn oversized_header_is_rejected_before_any_frame() {
    let request = Request::post("http://example.com/submit", "a=1")
        .unwrap()
        .header(Header::new("X-Big", "v".repeat(70_000)));
    let (handler, deliveries) = recording_handler();
    let mut stream = Stream::new(1, handler);

    let err = stream.syn(&request).unwrap_err();
    assert!(matches!(err, ProtocolError::HeaderEncodingError(_)));
    assert_eq!(stream.phase(), StreamPhase::Created);
    assert!(deliveries.lock().unwrap().is_empty());
}
