use bytes::Bytes;
use serde_json::Value;
use url::form_urlencoded;

use super::error::ProtocolError;
use super::timeouts::ClientTimeouts;
use super::{Header, Target};
use crate::utils::{parse_header, parse_target, APPLICATION_JSON, CONTENT_TYPE_HEADER, HTTP_VERSION_1_1};

const APPLICATION_X_WWW_FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

#[derive(Debug, Clone)]
pub struct Request {
    pub target: Target,
    pub method: String,
    /// Protocol version announced to the peer (the SPDY `version` header).
    pub version: String,
    pub headers: Vec<Header>,
    pub body: Option<Bytes>,
    pub timeout: Option<ClientTimeouts>,
}

impl Request {
    pub fn new(target: &str, method: impl Into<String>) -> Result<Self, ProtocolError> {
        let method = method.into();
        if method.is_empty() || method.contains(char::is_whitespace) {
            return Err(ProtocolError::InvalidMethod(method));
        }
        Ok(Self {
            target: parse_target(target)?,
            method,
            version: HTTP_VERSION_1_1.to_string(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        })
    }

    pub fn get(target: &str) -> Result<Self, ProtocolError> {
        Self::new(target, "GET")
    }

    pub fn post(target: &str, body: impl Into<Bytes>) -> Result<Self, ProtocolError> {
        Ok(Self::new(target, "POST")?.body(body))
    }

    pub fn builder(target: &str, method: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(target, method)
    }

    pub fn header(mut self, header: Header) -> Self {
        self.header_mut(header);
        self
    }

    pub fn headers(mut self, headers: Vec<Header>) -> Self {
        self.headers = headers;
        self
    }

    pub fn body<B: Into<Bytes>>(mut self, body: B) -> Self {
        self.set_body(body);
        self
    }

    pub fn timeout(mut self, timeouts: ClientTimeouts) -> Self {
        self.timeout = Some(timeouts);
        self
    }

    pub fn header_mut(&mut self, header: Header) {
        self.headers.push(header);
    }

    /// Replaces every header named `name` (case-insensitive) with one entry.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|h| !h.is(name));
        self.headers.push(Header::new(name, value));
    }

    pub fn set_body<B: Into<Bytes>>(&mut self, body: B) {
        self.body = Some(body.into());
    }

    pub fn set_json(&mut self, json: Value) {
        self.body = Some(Bytes::from(json.to_string().into_bytes()));
        if !self.has_header(CONTENT_TYPE_HEADER) {
            self.headers
                .push(Header::new(CONTENT_TYPE_HEADER, APPLICATION_JSON));
        }
    }

    pub fn set_form<I, K, V>(&mut self, fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in fields {
            serializer.append_pair(&key.into(), &value.into());
        }
        self.body = Some(Bytes::from(serializer.finish().into_bytes()));
        if !self.has_header(CONTENT_TYPE_HEADER) {
            self.headers.push(Header::new(
                CONTENT_TYPE_HEADER,
                APPLICATION_X_WWW_FORM_URLENCODED,
            ));
        }
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h.is(name))
    }

    pub fn has_body(&self) -> bool {
        self.body.as_ref().map_or(false, |body| !body.is_empty())
    }

    /// The `Host` the request is addressed to, port included when explicit.
    pub fn host(&self) -> String {
        self.target.authority().unwrap_or_default()
    }

    pub fn timeouts(&self, fallback: &ClientTimeouts) -> ClientTimeouts {
        self.timeout.clone().unwrap_or_else(|| fallback.clone())
    }
}

#[derive(Debug)]
pub struct RequestBuilder {
    inner: Result<Request, ProtocolError>,
}

impl RequestBuilder {
    pub fn new(target: &str, method: impl Into<String>) -> Self {
        Self {
            inner: Request::new(target, method),
        }
    }

    pub fn build(self) -> Result<Request, ProtocolError> {
        self.inner
    }

    /// Adds a header written as `Name: value`.
    pub fn header(mut self, header: impl AsRef<str>) -> Self {
        let text = header.as_ref().trim().to_string();
        if let Ok(request) = self.inner.as_mut() {
            match parse_header(&text) {
                Some(parsed) => request.header_mut(parsed),
                None => {
                    self.inner = Err(ProtocolError::MalformedHeaders(format!(
                        "Invalid header '{}'",
                        text
                    )))
                }
            }
        }
        self
    }

    pub fn headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for header in headers {
            if self.inner.is_err() {
                break;
            }
            self = self.header(header);
        }
        self
    }

    pub fn header_value(mut self, header: Header) -> Self {
        if let Ok(request) = self.inner.as_mut() {
            request.header_mut(header);
        }
        self
    }

    pub fn body(mut self, body: impl AsRef<[u8]>) -> Self {
        if let Ok(request) = self.inner.as_mut() {
            request.set_body(Bytes::copy_from_slice(body.as_ref()));
        }
        self
    }

    pub fn json(mut self, value: Value) -> Self {
        if let Ok(request) = self.inner.as_mut() {
            request.set_json(value);
        }
        self
    }

    pub fn form<I, K, V>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        if let Ok(request) = self.inner.as_mut() {
            request.set_form(fields);
        }
        self
    }

    pub fn timeout(mut self, timeouts: ClientTimeouts) -> Self {
        if let Ok(request) = self.inner.as_mut() {
            request.timeout = Some(timeouts);
        }
        self
    }
}
