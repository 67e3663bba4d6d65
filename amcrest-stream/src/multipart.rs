//! Incremental decoder for the device's multipart event stream.
//!
//! The stream never ends on its own, so the decoder works on whatever bytes
//! have arrived so far: feed it chunks, then drain complete segments with
//! [`MultipartDecoder::next_segment`]. Each segment declares its payload size
//! in a `Content-Length` header, and a segment is handed out as soon as that
//! many bytes are buffered rather than when the next boundary shows up.
//!
//! ```text
//! --myboundary\r\n
//! Content-Type: text/plain\r\n
//! Content-Length:37\r\n
//! \r\n
//! Code=VideoMotion;action=Start;index=0\r\n
//! \r\n
//! --myboundary\r\n
//! ...
//! ```

use std::collections::HashMap;

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{FramingError, StreamError};

/// Segment headers larger than this are treated as garbage
pub const MAX_HEADER_LEN: usize = 8 * 1024;

/// Extract the `boundary` parameter from a `Content-Type` header value
pub fn parse_boundary(content_type: &str) -> Result<String, StreamError> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|boundary| !boundary.is_empty())
        .ok_or_else(|| StreamError::MissingBoundary(content_type.to_string()))
}

/// One decoded segment: its headers and exactly `Content-Length` payload bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    headers: HashMap<String, String>,
    body: Bytes,
}

impl Part {
    /// Header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }
}

#[derive(Debug)]
enum State {
    /// Looking for the next boundary line
    Boundary,
    /// Reading segment headers up to the blank line
    Headers,
    /// Waiting for `expected` payload bytes
    Body {
        expected: usize,
        headers: HashMap<String, String>,
    },
    /// Closing delimiter seen
    Done,
}

/// Streaming multipart decoder bound to one boundary token
#[derive(Debug)]
pub struct MultipartDecoder {
    delimiter: Vec<u8>,
    buf: BytesMut,
    state: State,
}

impl MultipartDecoder {
    pub fn new(boundary: &str) -> Self {
        Self {
            delimiter: format!("--{boundary}").into_bytes(),
            buf: BytesMut::new(),
            state: State::Boundary,
        }
    }

    /// Append bytes received from the network
    pub fn feed(&mut self, chunk: &[u8]) {
        if !self.is_done() {
            self.buf.extend_from_slice(chunk);
        }
    }

    /// Whether the closing delimiter has been seen
    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Done)
    }

    /// Next complete segment, or `None` if more bytes are needed.
    ///
    /// Framing problems are reported for the offending segment only; the
    /// decoder resynchronises at the following boundary.
    pub fn next_segment(&mut self) -> Option<Result<Part, FramingError>> {
        loop {
            match &self.state {
                State::Done => return None,
                State::Boundary => {
                    if !self.consume_boundary() {
                        return None;
                    }
                }
                State::Headers => {
                    let Some((header_len, consumed)) = find_header_end(&self.buf) else {
                        if self.buf.len() > MAX_HEADER_LEN {
                            self.buf.clear();
                            self.state = State::Boundary;
                            return Some(Err(FramingError::MissingLength));
                        }
                        return None;
                    };

                    let headers = parse_headers(&self.buf[..header_len]);
                    self.buf.advance(consumed);

                    match content_length(&headers) {
                        Ok(expected) => self.state = State::Body { expected, headers },
                        Err(e) => {
                            self.state = State::Boundary;
                            return Some(Err(e));
                        }
                    }
                }
                State::Body { expected, .. } => {
                    let expected = *expected;
                    let window = self.buf.len().min(expected);

                    // A boundary inside the declared length means the segment was cut short
                    if let Some(pos) = find(&self.buf[..window], &self.delimiter) {
                        let actual = trim_line_end(&self.buf[..pos]).len();
                        self.buf.advance(pos);
                        self.state = State::Boundary;
                        return Some(Err(FramingError::ShortRead { expected, actual }));
                    }

                    if self.buf.len() < expected {
                        return None;
                    }

                    let body = self.buf.split_to(expected).freeze();
                    return match std::mem::replace(&mut self.state, State::Boundary) {
                        State::Body { headers, .. } => Some(Ok(Part { headers, body })),
                        _ => None,
                    };
                }
            }
        }
    }

    /// Signal end of input, reporting a segment that was still incomplete
    pub fn finish(&mut self) -> Option<FramingError> {
        let state = std::mem::replace(&mut self.state, State::Done);
        let pending = self.buf.len();
        self.buf.clear();

        match state {
            State::Body { expected, .. } => Some(FramingError::ShortRead {
                expected,
                actual: pending,
            }),
            _ => None,
        }
    }

    /// Advance past the next boundary line. Returns false if more input is needed.
    fn consume_boundary(&mut self) -> bool {
        let Some(pos) = find(&self.buf, &self.delimiter) else {
            // Keep just enough to match a delimiter split across chunks
            let keep = self.delimiter.len().saturating_sub(1);
            if self.buf.len() > keep {
                let excess = self.buf.len() - keep;
                self.buf.advance(excess);
            }
            return false;
        };
        self.buf.advance(pos);

        let after = self.delimiter.len();
        if self.buf.len() < after + 2 {
            return false;
        }
        if &self.buf[after..after + 2] == b"--" {
            self.buf.clear();
            self.state = State::Done;
            return false;
        }

        let Some(eol) = self.buf[after..].iter().position(|&b| b == b'\n') else {
            return false;
        };
        self.buf.advance(after + eol + 1);
        self.state = State::Headers;
        true
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn trim_line_end(bytes: &[u8]) -> &[u8] {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    bytes.strip_suffix(b"\r").unwrap_or(bytes)
}

/// Length of the header block and the number of bytes to consume with its terminator
fn find_header_end(buf: &[u8]) -> Option<(usize, usize)> {
    if buf.starts_with(b"\r\n") {
        return Some((0, 2));
    }
    if buf.starts_with(b"\n") {
        return Some((0, 1));
    }

    let crlf = find(buf, b"\r\n\r\n").map(|pos| (pos, pos + 4));
    let lf = find(buf, b"\n\n").map(|pos| (pos, pos + 2));
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Parse `Name: value` lines; names are lower-cased
fn parse_headers(block: &[u8]) -> HashMap<String, String> {
    let text = String::from_utf8_lossy(block);
    text.lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect()
}

fn content_length(headers: &HashMap<String, String>) -> Result<usize, FramingError> {
    let value = headers
        .get("content-length")
        .ok_or(FramingError::MissingLength)?;
    value
        .parse::<usize>()
        .map_err(|_| FramingError::InvalidLength(value.clone()))
}
