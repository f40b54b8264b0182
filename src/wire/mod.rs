//! Minimal HTTP/1.1 wire protocol
//!
//! Reference: https://cumulocity.com/api/core/
//!
//! Every exchange with the tenant is a single fixed-shape request over a
//! fresh connection: request line, five headers, blank line, JSON body.
//! No chunked transfer, no redirects, no connection reuse.
//!
//! Response handling is equally narrow. Incoming bytes accumulate in a
//! [`ResponseBuffer`] until either the header/body separator (`\r\n\r\n`)
//! has been seen or the peer closes the connection. A `404` status line
//! means the resource is gone and the connection is torn down without
//! further parsing. Buffered content with no `{` anywhere is keep-alive
//! chatter, not a terminal response.

use bytes::{BufMut, BytesMut};

/// Header/body separator
const BLANK_LINE: &[u8] = b"\r\n\r\n";

/// Status-line prefix that triggers immediate connection teardown
const STATUS_404: &[u8] = b"HTTP/1.1 404";

/// Build a complete HTTP/1.1 request with the fixed header set.
///
/// `Content-Length` is the exact byte count of `body` — the bytes written
/// after the blank line are exactly `body`, nothing appended.
pub fn build_request(method: &str, path: &str, host: &str, authorization: &str, body: &str) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(160 + body.len());
    buf.put_slice(method.as_bytes());
    buf.put_slice(b" ");
    buf.put_slice(path.as_bytes());
    buf.put_slice(b" HTTP/1.1\r\n");
    buf.put_slice(b"Host: ");
    buf.put_slice(host.as_bytes());
    buf.put_slice(b"\r\n");
    buf.put_slice(b"Authorization: ");
    buf.put_slice(authorization.as_bytes());
    buf.put_slice(b"\r\n");
    buf.put_slice(b"Content-Type: application/json\r\n");
    buf.put_slice(b"Content-Length: ");
    buf.put_slice(body.len().to_string().as_bytes());
    buf.put_slice(b"\r\n");
    buf.put_slice(b"Accept: application/json\r\n");
    buf.put_slice(b"\r\n");
    buf.put_slice(body.as_bytes());
    buf.to_vec()
}

/// Accumulating buffer for one HTTP response.
///
/// Bytes are pushed as they arrive; the buffer answers three questions:
/// is this a 404, does it look like JSON at all, and is the body
/// separator there yet.
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    buf: BytesMut,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self { buf: BytesMut::new() }
    }

    /// Append a chunk read from the connection
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Whether the buffered response starts with a `404` status line
    pub fn is_not_found(&self) -> bool {
        self.buf.starts_with(STATUS_404)
    }

    /// Whether any `{` has been buffered. Responses with none are
    /// discarded as non-JSON chatter and the caller keeps waiting.
    pub fn looks_like_json(&self) -> bool {
        self.buf.contains(&b'{')
    }

    /// The body-so-far: everything after the first `\r\n\r\n`.
    ///
    /// `None` until the separator has been buffered. The body may still
    /// be incomplete — callers re-read until their own terminal
    /// condition holds.
    pub fn body(&self) -> Option<&str> {
        let pos = self
            .buf
            .windows(BLANK_LINE.len())
            .position(|w| w == BLANK_LINE)?;
        std::str::from_utf8(&self.buf[pos + BLANK_LINE.len()..]).ok()
    }

    /// Raw buffered content, headers included. The registration id
    /// scraper runs over this: the marker search does not care where the
    /// header/body boundary falls.
    pub fn raw(&self) -> &[u8] {
        &self.buf
    }
}

/// Extract the value of a flat string field from a JSON-shaped body.
///
/// Locates the `"key"` marker, then the following `":`, then the next
/// `",`; the value is the substring between (with the value's opening
/// quote skipped). This is deliberately not a JSON parser — it serves
/// the handful of well-known flat response shapes the tenant sends.
/// A missing marker or delimiter yields `None`, never a malformed slice.
pub fn extract_field<'a>(body: &'a str, key: &str) -> Option<&'a str> {
    let marker = format!("\"{key}\"");
    let start = body.find(&marker)?;
    let colon = start + body[start..].find("\":")?;
    // `":` plus the value's opening quote
    let value_start = colon + 3;
    let value_end = value_start + body.get(value_start..)?.find("\",")?;
    body.get(value_start..value_end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_framing() {
        let req = build_request(
            "POST",
            "/devicecontrol/deviceCredentials",
            "t.example.com",
            "Basic Zm9vOmJhcg==",
            r#"{"id":"AA_BB_CC_DD_EE_FF"}"#,
        );
        let text = String::from_utf8(req).unwrap();

        let expected = "POST /devicecontrol/deviceCredentials HTTP/1.1\r\n\
                        Host: t.example.com\r\n\
                        Authorization: Basic Zm9vOmJhcg==\r\n\
                        Content-Type: application/json\r\n\
                        Content-Length: 26\r\n\
                        Accept: application/json\r\n\
                        \r\n\
                        {\"id\":\"AA_BB_CC_DD_EE_FF\"}";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_content_length_matches_body_bytes() {
        // Multi-byte UTF-8 in the body: the header must count bytes,
        // not characters
        let body = r#"{"text":"türen auf"}"#;
        let req = build_request("POST", "/event/events", "h", "Basic x", body);
        let text = String::from_utf8(req).unwrap();

        let value: usize = text
            .lines()
            .find(|l| l.starts_with("Content-Length: "))
            .and_then(|l| l.trim_start_matches("Content-Length: ").trim_end().parse().ok())
            .unwrap();
        assert_eq!(value, body.len());
        assert!(text.ends_with(body));
    }

    #[test]
    fn test_body_after_blank_line() {
        let mut resp = ResponseBuffer::new();
        resp.push(b"HTTP/1.1 201 Created\r\nContent-Type: application/json\r\n\r\n{\"id\":\"42\"}");
        assert_eq!(resp.body(), Some("{\"id\":\"42\"}"));
    }

    #[test]
    fn test_body_absent_until_separator() {
        let mut resp = ResponseBuffer::new();
        resp.push(b"HTTP/1.1 201 Created\r\nContent-Type: application/json\r\n");
        assert_eq!(resp.body(), None);

        // Separator and body arrive in a later chunk
        resp.push(b"\r\n{\"tenantId\":\"t1\"}");
        assert_eq!(resp.body(), Some("{\"tenantId\":\"t1\"}"));
    }

    #[test]
    fn test_split_body_reassembly() {
        // Body split mid-key across two reads
        let mut resp = ResponseBuffer::new();
        resp.push(b"HTTP/1.1 201 Created\r\n\r\n{\"tenantId\":\"t1\",\"use");
        assert_eq!(resp.body(), Some("{\"tenantId\":\"t1\",\"use"));

        resp.push(b"rname\":\"u1\",\"password\":\"p1\"}");
        assert_eq!(
            resp.body(),
            Some("{\"tenantId\":\"t1\",\"username\":\"u1\",\"password\":\"p1\"}")
        );
    }

    #[test]
    fn test_not_found_detection() {
        let mut resp = ResponseBuffer::new();
        resp.push(b"HTTP/1.1 404 Not Found\r\n");
        assert!(resp.is_not_found());

        let mut ok = ResponseBuffer::new();
        ok.push(b"HTTP/1.1 201 Created\r\n");
        assert!(!ok.is_not_found());
    }

    #[test]
    fn test_non_json_chatter_is_not_terminal() {
        let mut resp = ResponseBuffer::new();
        resp.push(b"HTTP/1.1 200 OK\r\n\r\nping");
        assert!(!resp.looks_like_json());

        resp.push(b"{\"id\":\"1\"}");
        assert!(resp.looks_like_json());
    }

    #[test]
    fn test_extract_field_present() {
        let body = r#"{"self":"https://t.example.com/inventory/managedObjects/abc123","id":"abc123","name":"sensor-1"}"#;
        assert_eq!(extract_field(body, "id"), Some("abc123"));
        assert_eq!(
            extract_field(body, "self"),
            Some("https://t.example.com/inventory/managedObjects/abc123")
        );
    }

    #[test]
    fn test_extract_field_absent() {
        let body = r#"{"name":"sensor-1"}"#;
        assert_eq!(extract_field(body, "id"), None);
    }

    #[test]
    fn test_extract_field_missing_delimiters() {
        // Marker present but the trailing `",` never appears — must be
        // "not found", not a garbage slice
        assert_eq!(extract_field(r#"{"id":"abc123"}"#, "id"), None);
        // Marker present but no `":` after it
        assert_eq!(extract_field(r#"{"id"}"#, "id"), None);
        // Marker at the very end of the body
        assert_eq!(extract_field(r#"..."id""#, "id"), None);
    }

    #[test]
    fn test_extract_field_empty_value() {
        assert_eq!(extract_field(r#"{"id":"","name":"x"}"#, "id"), Some(""));
    }
}
