use ripspdy::types::ProtocolError;
use ripspdy::utils::parse_target;

#[test]
fn parse_target_with_default_ports() {
    let http = parse_target("http://example.com/path?q=1").expect("valid http");
    assert_eq!(http.scheme(), "http");
    assert_eq!(http.port(), Some(80));
    assert_eq!(http.path(), "/path");
    assert_eq!(http.path_query(), "/path?q=1");
    assert_eq!(http.host_port().as_deref(), Some("example.com:80"));

    let https = parse_target("https://example.com").expect("valid https");
    assert_eq!(https.port(), Some(443));
    assert_eq!(https.path(), "/");
    assert_eq!(https.host_port().as_deref(), Some("example.com:443"));
    assert_eq!(https.authority().as_deref(), Some("example.com"));
}

#[test]
fn parse_target_explicit_port() {
    let target = parse_target("http://localhost:8080/foo").expect("valid");
    assert_eq!(target.port(), Some(8080));
    assert_eq!(target.authority().as_deref(), Some("localhost:8080"));
    assert_eq!(target.host_port().as_deref(), Some("localhost:8080"));
}

#[test]
fn request_uri_keeps_query_and_fragment() {
    let target = parse_target("https://example.com/a/b?x=1&y=2#frag").expect("valid");
    assert_eq!(target.request_uri(), "/a/b?x=1&y=2#frag");

    let bare = parse_target("https://example.com/index.html").expect("valid");
    assert_eq!(bare.request_uri(), "/index.html");
}

#[test]
fn parse_target_invalid_inputs() {
    let err = parse_target("not a url").unwrap_err();
    assert!(matches!(err, ProtocolError::InvalidTarget(_)));

    let missing_host = parse_target("http://:8080").unwrap_err();
    assert!(matches!(missing_host, ProtocolError::InvalidTarget(_)));

    let scheme = parse_target("ftp://example.com/file").unwrap_err();
    assert!(matches!(scheme, ProtocolError::InvalidTarget(_)));
}
