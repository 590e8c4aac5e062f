//! Streaming HTTP/1.1 request parser state machine (component H).
//!
//! Grounded on `examples/original_source/Src/Http/HttpRequestParser.{h,cpp}`:
//! the same six-state machine (`ParsingRequestLine` → `ParsingHeaders` →
//! `ParsingBody`/`ParsingChunkMetadata`/`ParsingChunkData` →
//! `ParsingTrailers`), the same four-outcome `parse()` contract
//! (`ParsedRequest`/`ParsedBody`/`NeedsMoreData`/`Failed`), and the same
//! Host/Content-Length/Transfer-Encoding/Expect handling described in
//! spec.md §4.7. Method decoding matches the teacher's
//! `src/parser/h1/request.rs::set_method` (byte-slice match) rather than
//! the original's masked 64-bit integer read — see SPEC_FULL.md's
//! resolution of this.
//!
//! Consumption is deferred: bytes backing the most recently returned
//! request-line/header block or body/trailer slice are only skipped from
//! the inbound buffer at the *start* of the next `parse()` call, so the
//! ranges handed out in the previous call stay resolvable until then —
//! matching spec.md §4.7's "ranges... are only valid until the parser
//! advances past them."

use crate::error::ErrorKind;
use crate::limits::HttpRequestLimits;
use crate::parser::request::{BodyType, ByteRange, FieldEntry, Method, ParsedRequest};
use crate::simd::{all_valid, CharClass};

/// Anything the parser can read from and skip past — implemented for any
/// `IoChannel<B>` (see `crate::channel`), without requiring a bound on `B`
/// since these operations never touch the backend.
pub trait InboundCursor {
    /// Unread bytes currently available, starting at the read-head.
    fn available(&self) -> &[u8];
    /// Advances the read-head by `n` bytes.
    fn advance(&mut self, n: usize);
}

impl<B> InboundCursor for crate::channel::IoChannel<B> {
    fn available(&self) -> &[u8] {
        self.peek_all()
    }
    fn advance(&mut self, n: usize) {
        self.skip(n)
    }
}

/// The four outcomes `parse()` can report, per spec.md §4.7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserStatus {
    /// A full request (or, for a chunked body, its terminal chunk) has been
    /// recognized. `request()` reflects it.
    ParsedRequest,
    /// A body part has been surfaced; `request().body_part(buf)` borrows
    /// it.
    ParsedBody,
    /// Not enough buffered data to make progress; call again once more
    /// bytes have arrived.
    NeedsMoreData,
    /// Wire syntax was invalid or a limit was exceeded; `error()` reports
    /// which.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    RequestLine,
    Headers,
    Body,
    ChunkMetadata,
    ChunkData,
    Trailers,
}

/// A streaming HTTP/1.1 request parser. One instance per connection.
pub struct RequestParser {
    limits: HttpRequestLimits,
    state: State,
    request_size: usize,
    request: ParsedRequest,
    error: ErrorKind,
    host_seen: bool,
    transfer_encoding_seen: bool,
    has_expect_continue: bool,
    trailers_size: usize,
    pending_consume: usize,
    /// Set for the chunk-data state: bytes of chunk payload still owed
    /// before the trailing CRLF.
    chunk_remaining: u64,
}

const MAX_REQUEST_LINE_OVERHEAD: usize = 32;

fn find_crlf(data: &[u8]) -> Option<usize> {
    let mut i = 0;
    while i + 1 < data.len() {
        if data[i] == b'\r' && data[i + 1] == b'\n' {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn is_hex_digit(b: u8) -> bool {
    b.is_ascii_digit() || (b'a'..=b'f').contains(&b) || (b'A'..=b'F').contains(&b)
}

fn hex_value(b: u8) -> u32 {
    match b {
        b'0'..=b'9' => (b - b'0') as u32,
        b'a'..=b'f' => (b - b'a' + 10) as u32,
        b'A'..=b'F' => (b - b'A' + 10) as u32,
        _ => 0,
    }
}

impl RequestParser {
    /// Builds a parser enforcing `limits`.
    pub fn new(limits: HttpRequestLimits) -> Self {
        Self {
            limits,
            state: State::RequestLine,
            request_size: 0,
            request: ParsedRequest::default(),
            error: ErrorKind::NoError,
            host_seen: false,
            transfer_encoding_seen: false,
            has_expect_continue: false,
            trailers_size: 0,
            pending_consume: 0,
            chunk_remaining: 0,
        }
    }

    /// The request parsed so far; its ranges resolve against the same
    /// `cursor` passed to `parse`.
    pub fn request(&self) -> &ParsedRequest {
        &self.request
    }

    /// The error from the last `Failed` outcome.
    pub fn error(&self) -> ErrorKind {
        self.error
    }

    /// Total bytes consumed for the request in progress.
    pub fn request_size(&self) -> usize {
        self.request_size
    }

    /// True if the caller should emit the expect-continue interim
    /// response; cleared once observed.
    pub fn take_expect_continue(&mut self) -> bool {
        std::mem::replace(&mut self.has_expect_continue, false)
    }

    fn fail(&mut self, kind: ErrorKind) -> ParserStatus {
        self.error = kind;
        self.state = State::RequestLine;
        ParserStatus::Failed
    }

    fn begin_new_request(&mut self) {
        self.request.reset();
        self.request_size = 0;
        self.host_seen = false;
        self.transfer_encoding_seen = false;
        self.has_expect_continue = false;
        self.trailers_size = 0;
        self.state = State::RequestLine;
    }

    /// Drives the state machine once against `cursor`'s currently buffered
    /// bytes.
    pub fn parse(&mut self, cursor: &mut impl InboundCursor) -> ParserStatus {
        if self.pending_consume > 0 {
            cursor.advance(self.pending_consume);
            self.pending_consume = 0;
        }
        match self.state {
            State::RequestLine => self.parse_request_line(cursor),
            State::Headers => self.parse_headers(cursor),
            State::Body => self.parse_body(cursor),
            State::ChunkMetadata => self.parse_chunk_metadata(cursor),
            State::ChunkData => self.parse_chunk_data(cursor),
            State::Trailers => self.parse_trailers(cursor),
        }
    }

    fn over_request_size(&self, additional: usize) -> bool {
        self.request_size + additional > self.limits.max_request_size
    }

    fn parse_request_line(&mut self, cursor: &mut impl InboundCursor) -> ParserStatus {
        // Entering this state always means "start of a request," whether
        // this is the connection's first request or the one after a prior
        // request completed — the bytes of that prior request were already
        // fully consumed by the `pending_consume` advance at the top of
        // `parse()`, so it's safe to drop here rather than at completion
        // time (mirrors `pending_consume` itself: the previous request
        // stays readable via `request()` until this call begins).
        self.begin_new_request();
        let data = cursor.available();
        let scan_bound = self.limits.max_url_size + MAX_REQUEST_LINE_OVERHEAD;
        let search_window = &data[..data.len().min(scan_bound)];
        let Some(crlf_at) = find_crlf(search_window) else {
            if data.len() >= scan_bound {
                return self.fail(ErrorKind::TooBigRequest);
            }
            return ParserStatus::NeedsMoreData;
        };
        let line = &data[..crlf_at];

        let Some(sp1) = line.iter().position(|&b| b == b' ') else {
            return self.fail(ErrorKind::MalformedRequest);
        };
        let Some(method) = Method::from_token(&line[..sp1]) else {
            return self.fail(ErrorKind::MalformedRequest);
        };

        let rest = &line[sp1 + 1..];
        let Some(sp2) = rest.iter().position(|&b| b == b' ') else {
            return self.fail(ErrorKind::MalformedRequest);
        };
        let target = &rest[..sp2];
        let version = &rest[sp2 + 1..];
        if version != b"HTTP/1.1" {
            return self.fail(ErrorKind::MalformedRequest);
        }

        if target == b"*" {
            if method != Method::Options {
                return self.fail(ErrorKind::MalformedRequest);
            }
            self.request.is_asterisk_form = true;
        } else {
            if target.first() != Some(&b'/') {
                return self.fail(ErrorKind::MalformedRequest);
            }
            let query_at = target.iter().position(|&b| b == b'?');
            let path = &target[..query_at.unwrap_or(target.len())];
            if !validate_target_bytes(path, CharClass::UrlPath) {
                return self.fail(ErrorKind::MalformedRequest);
            }
            let path_offset = sp1 + 1 + (target.as_ptr() as usize - target.as_ptr() as usize);
            let target_start = sp1 + 1;
            self.request.path = ByteRange::new(target_start, path.len());
            if let Some(q_at) = query_at {
                let query = &target[q_at + 1..];
                if !validate_target_bytes(query, CharClass::UrlQuery) {
                    return self.fail(ErrorKind::MalformedRequest);
                }
                self.request.query = Some(ByteRange::new(target_start + q_at + 1, query.len()));
            }
            let _ = path_offset;
        }
        self.request.method = Some(method);

        let consumed = crlf_at + 2;
        if self.over_request_size(consumed) {
            return self.fail(ErrorKind::TooBigRequest);
        }
        self.request_size += consumed;
        self.pending_consume = consumed;
        self.state = State::Headers;
        self.parse_headers_inline(cursor)
    }

    // Headers may start in the same buffered chunk as the request line; to
    // avoid requiring a second `parse()` call just to begin the header
    // block, the request-line handler falls through here directly rather
    // than returning `NeedsMoreData` prematurely. This inline call does
    // *not* advance past the deferred `pending_consume` a second time,
    // since `parse_headers` itself never touches `pending_consume`.
    fn parse_headers_inline(&mut self, cursor: &mut impl InboundCursor) -> ParserStatus {
        self.parse_headers(cursor)
    }

    fn parse_headers(&mut self, cursor: &mut impl InboundCursor) -> ParserStatus {
        let base = self.pending_consume;
        loop {
            let data = cursor.available();
            let remaining = &data[base.min(data.len())..];
            let scan_bound = self.limits.max_header_name_size + self.limits.max_header_value_size + 16;
            let window = &remaining[..remaining.len().min(scan_bound)];
            let Some(crlf_at) = find_crlf(window) else {
                if remaining.len() >= scan_bound {
                    return self.fail(ErrorKind::TooBigRequest);
                }
                return ParserStatus::NeedsMoreData;
            };
            let line = &remaining[..crlf_at];
            let line_total = base + crlf_at + 2;

            if line.is_empty() {
                // End of header block.
                if !self.host_seen {
                    return self.fail(ErrorKind::MalformedRequest);
                }
                if self.over_request_size(line_total) {
                    return self.fail(ErrorKind::TooBigRequest);
                }
                self.request_size += line_total;
                self.pending_consume = line_total;
                return self.finish_header_block();
            }

            if self.request.fields.len() >= self.limits.max_header_line_count {
                return self.fail(ErrorKind::TooBigRequest);
            }
            let Some(colon_at) = line.iter().position(|&b| b == b':') else {
                return self.fail(ErrorKind::MalformedRequest);
            };
            let name = &line[..colon_at];
            if name.is_empty() {
                return self.fail(ErrorKind::MalformedRequest);
            }
            if name.len() > self.limits.max_header_name_size {
                return self.fail(ErrorKind::TooBigRequest);
            }
            if !all_valid(name, CharClass::FieldName) {
                return self.fail(ErrorKind::MalformedRequest);
            }
            let raw_value = &line[colon_at + 1..];
            // Line folding (a continuation line starting with SP/HTAB) is
            // rejected by construction: such a line has no colon and falls
            // into the branch above as malformed.
            let value = trim_ows(raw_value);
            if value.len() > self.limits.max_header_value_size {
                return self.fail(ErrorKind::TooBigRequest);
            }
            if !all_valid(value, CharClass::FieldValue) {
                return self.fail(ErrorKind::MalformedRequest);
            }

            let name_start = base + (name.as_ptr() as usize - remaining.as_ptr() as usize);
            let value_start = base + (value.as_ptr() as usize - remaining.as_ptr() as usize);
            if let Err(status) = self.observe_header(name, value) {
                return status;
            }
            self.request.fields.push(FieldEntry {
                name: ByteRange::new(name_start, name.len()),
                value: ByteRange::new(value_start, value.len()),
            });

            if self.over_request_size(line_total.saturating_sub(base)) {
                return self.fail(ErrorKind::TooBigRequest);
            }
            // Advance the scan window without yet touching the buffer's
            // real read-head; the whole header block is consumed in one
            // `pending_consume` once the empty line is seen.
            self.pending_consume = line_total;
        }
    }

    fn observe_header(&mut self, name: &[u8], value: &[u8]) -> Result<(), ParserStatus> {
        if eq_ignore_ascii_case(name, b"host") {
            if self.host_seen {
                return Err(self.fail(ErrorKind::MalformedRequest));
            }
            self.host_seen = true;
        } else if eq_ignore_ascii_case(name, b"content-length") {
            if self.transfer_encoding_seen {
                return Err(self.fail(ErrorKind::MalformedRequest));
            }
            let Ok(text) = std::str::from_utf8(value) else {
                return Err(self.fail(ErrorKind::MalformedRequest));
            };
            if text.len() > 18 || text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
                return Err(self.fail(ErrorKind::MalformedRequest));
            }
            let Ok(n) = text.parse::<u64>() else {
                return Err(self.fail(ErrorKind::MalformedRequest));
            };
            match self.request.body_type {
                BodyType::NoBody => self.request.body_type = BodyType::NotChunked(n),
                BodyType::NotChunked(existing) if existing == n => {}
                _ => return Err(self.fail(ErrorKind::MalformedRequest)),
            }
        } else if eq_ignore_ascii_case(name, b"transfer-encoding") {
            if matches!(self.request.body_type, BodyType::NotChunked(_)) {
                return Err(self.fail(ErrorKind::MalformedRequest));
            }
            let last_codec = value.rsplit(|&b| b == b',').next().unwrap_or(value);
            let last_codec = trim_ows(last_codec);
            if !eq_ignore_ascii_case(last_codec, b"chunked") {
                return Err(self.fail(ErrorKind::MalformedRequest));
            }
            self.transfer_encoding_seen = true;
            self.request.body_type = BodyType::Chunked;
        } else if eq_ignore_ascii_case(name, b"expect") {
            if eq_ignore_ascii_case(trim_ows(value), b"100-continue") {
                self.has_expect_continue = true;
            }
        }
        Ok(())
    }

    fn finish_header_block(&mut self) -> ParserStatus {
        match self.request.body_type {
            BodyType::NoBody => {
                self.state = State::RequestLine;
                ParserStatus::ParsedRequest
            }
            BodyType::NotChunked(n) => {
                if n > self.limits.max_body_size {
                    return self.fail(ErrorKind::TooBigRequest);
                }
                self.request.pending_body_size = n;
                self.state = State::Body;
                ParserStatus::ParsedRequest
            }
            BodyType::Chunked => {
                self.state = State::ChunkMetadata;
                ParserStatus::ParsedRequest
            }
        }
    }

    fn parse_body(&mut self, cursor: &mut impl InboundCursor) -> ParserStatus {
        if self.request.pending_body_size == 0 {
            self.request.body_part = None;
            self.state = State::RequestLine;
            return ParserStatus::ParsedRequest;
        }
        let data = cursor.available();
        if data.is_empty() {
            return ParserStatus::NeedsMoreData;
        }
        let take = (data.len() as u64).min(self.request.pending_body_size) as usize;
        if self.over_request_size(take) {
            return self.fail(ErrorKind::TooBigRequest);
        }
        self.request_size += take;
        self.request.body_part = Some(ByteRange::new(0, take));
        self.request.pending_body_size -= take as u64;
        self.request.accumulated_body_size += take as u64;
        self.pending_consume = take;
        if self.request.pending_body_size == 0 {
            self.state = State::RequestLine;
        }
        ParserStatus::ParsedBody
    }

    fn parse_chunk_metadata(&mut self, cursor: &mut impl InboundCursor) -> ParserStatus {
        let data = cursor.available();
        let scan_bound = self.limits.max_chunk_metadata_size;
        let window = &data[..data.len().min(scan_bound)];
        let Some(crlf_at) = find_crlf(window) else {
            if data.len() >= scan_bound {
                return self.fail(ErrorKind::TooBigRequest);
            }
            return ParserStatus::NeedsMoreData;
        };
        let line = &data[..crlf_at];
        let size_end = line
            .iter()
            .position(|&b| b == b';' || b == b' ')
            .unwrap_or(line.len());
        let size_token = &line[..size_end];
        if size_token.is_empty() || size_token.len() > 16 || !size_token.iter().all(|&b| is_hex_digit(b)) {
            return self.fail(ErrorKind::MalformedRequest);
        }
        let mut size: u64 = 0;
        for &b in size_token {
            size = size.saturating_mul(16) + hex_value(b) as u64;
        }

        let consumed = crlf_at + 2;
        if self.over_request_size(consumed) {
            return self.fail(ErrorKind::TooBigRequest);
        }
        self.request_size += consumed;
        self.pending_consume = consumed;

        if size == 0 {
            self.state = State::Trailers;
            self.parse_trailers(cursor)
        } else {
            if self.request.accumulated_body_size + size > self.limits.max_body_size as u64 {
                return self.fail(ErrorKind::TooBigRequest);
            }
            self.chunk_remaining = size;
            self.state = State::ChunkData;
            self.parse_chunk_data(cursor)
        }
    }

    fn parse_chunk_data(&mut self, cursor: &mut impl InboundCursor) -> ParserStatus {
        let base = self.pending_consume;
        let data = cursor.available();
        let remaining = &data[base.min(data.len())..];
        if self.chunk_remaining > 0 {
            if remaining.is_empty() {
                return ParserStatus::NeedsMoreData;
            }
            let take = (remaining.len() as u64).min(self.chunk_remaining) as usize;
            if self.over_request_size(take) {
                return self.fail(ErrorKind::TooBigRequest);
            }
            self.request_size += take;
            self.request.body_part = Some(ByteRange::new(base, take));
            self.request.accumulated_body_size += take as u64;
            self.chunk_remaining -= take as u64;
            self.pending_consume = base + take;
            return ParserStatus::ParsedBody;
        }
        // Chunk payload fully delivered; consume its trailing CRLF.
        if remaining.len() < 2 {
            return ParserStatus::NeedsMoreData;
        }
        if &remaining[..2] != b"\r\n" {
            return self.fail(ErrorKind::MalformedRequest);
        }
        self.pending_consume = base + 2;
        self.state = State::ChunkMetadata;
        self.parse_chunk_metadata(cursor)
    }

    fn parse_trailers(&mut self, cursor: &mut impl InboundCursor) -> ParserStatus {
        let base = self.pending_consume;
        loop {
            let data = cursor.available();
            let remaining = &data[base.min(data.len())..];
            let scan_bound = self.limits.max_trailer_name_size + self.limits.max_trailer_value_size + 16;
            let window = &remaining[..remaining.len().min(scan_bound)];
            let Some(crlf_at) = find_crlf(window) else {
                if remaining.len() >= scan_bound {
                    return self.fail(ErrorKind::TooBigRequest);
                }
                return ParserStatus::NeedsMoreData;
            };
            let line = &remaining[..crlf_at];
            let line_total = base + crlf_at + 2;

            if line.is_empty() {
                self.pending_consume = line_total;
                self.request.body_part = None;
                self.state = State::RequestLine;
                return ParserStatus::ParsedRequest;
            }

            if self.request.trailers.len() >= self.limits.max_trailer_line_count {
                return self.fail(ErrorKind::TooBigRequest);
            }
            let Some(colon_at) = line.iter().position(|&b| b == b':') else {
                return self.fail(ErrorKind::MalformedRequest);
            };
            let name = &line[..colon_at];
            if name.is_empty() {
                return self.fail(ErrorKind::MalformedRequest);
            }
            if name.len() > self.limits.max_trailer_name_size {
                return self.fail(ErrorKind::TooBigRequest);
            }
            if !all_valid(name, CharClass::FieldName) {
                return self.fail(ErrorKind::MalformedRequest);
            }
            let value = trim_ows(&line[colon_at + 1..]);
            if value.len() > self.limits.max_trailer_value_size {
                return self.fail(ErrorKind::TooBigRequest);
            }
            if !all_valid(value, CharClass::FieldValue) {
                return self.fail(ErrorKind::MalformedRequest);
            }
            let name_start = base + (name.as_ptr() as usize - remaining.as_ptr() as usize);
            let value_start = base + (value.as_ptr() as usize - remaining.as_ptr() as usize);
            self.request.trailers.push(FieldEntry {
                name: ByteRange::new(name_start, name.len()),
                value: ByteRange::new(value_start, value.len()),
            });
            self.trailers_size += line_total.saturating_sub(base);
            self.pending_consume = line_total;
        }
    }
}

fn eq_ignore_ascii_case(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.eq_ignore_ascii_case(y))
}

fn trim_ows(value: &[u8]) -> &[u8] {
    let start = value.iter().position(|&b| b != b' ' && b != b'\t').unwrap_or(value.len());
    let end = value.iter().rposition(|&b| b != b' ' && b != b'\t').map_or(start, |i| i + 1);
    &value[start..end]
}

fn validate_target_bytes(bytes: &[u8], class: CharClass) -> bool {
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 2 >= bytes.len() || !is_hex_digit(bytes[i + 1]) || !is_hex_digit(bytes[i + 2]) {
                return false;
            }
            i += 3;
            continue;
        }
        // Batch the run up to the next percent-escape (or the end of the
        // target) through the same windowed classifier the header/trailer
        // field lines use, rather than testing one byte at a time.
        let run_end = bytes[i..].iter().position(|&b| b == b'%').map_or(bytes.len(), |p| i + p);
        if !all_valid(&bytes[i..run_end], class) {
            return false;
        }
        i = run_end;
    }
    true
}

#[cfg(test)]
mod test {
    use super::*;

    struct FakeCursor {
        data: Vec<u8>,
        offset: usize,
    }

    impl FakeCursor {
        fn new(data: &[u8]) -> Self {
            Self {
                data: data.to_vec(),
                offset: 0,
            }
        }
    }

    impl InboundCursor for FakeCursor {
        fn available(&self) -> &[u8] {
            &self.data[self.offset..]
        }
        fn advance(&mut self, n: usize) {
            self.offset += n;
        }
    }

    #[test]
    fn parses_a_simple_get_with_no_body() {
        let mut cursor = FakeCursor::new(b"GET /foo?bar=1 HTTP/1.1\r\nHost: example.com\r\n\r\n");
        let mut parser = RequestParser::new(HttpRequestLimits::default());
        assert_eq!(ParserStatus::ParsedRequest, parser.parse(&mut cursor));
        assert_eq!(Some(Method::Get), parser.request().method());
        assert_eq!(b"/foo", parser.request().path(cursor.available_from_zero()));
    }

    #[test]
    fn missing_host_header_is_malformed() {
        let mut cursor = FakeCursor::new(b"GET / HTTP/1.1\r\n\r\n");
        let mut parser = RequestParser::new(HttpRequestLimits::default());
        assert_eq!(ParserStatus::Failed, parser.parse(&mut cursor));
        assert_eq!(ErrorKind::MalformedRequest, parser.error());
    }

    #[test]
    fn duplicate_content_length_with_same_value_is_tolerated() {
        let mut cursor = FakeCursor::new(
            b"POST / HTTP/1.1\r\nHost: h\r\nContent-Length: 5\r\nContent-Length: 5\r\n\r\nhello",
        );
        let mut parser = RequestParser::new(HttpRequestLimits::default());
        assert_eq!(ParserStatus::ParsedRequest, parser.parse(&mut cursor));
        assert_eq!(ParserStatus::ParsedBody, parser.parse(&mut cursor));
        assert_eq!(b"hello", parser.request().body_part(cursor.available_from_zero()));
    }

    #[test]
    fn conflicting_content_length_and_transfer_encoding_is_malformed() {
        let mut cursor = FakeCursor::new(
            b"POST / HTTP/1.1\r\nHost: h\r\nContent-Length: 5\r\nTransfer-Encoding: chunked\r\n\r\n",
        );
        let mut parser = RequestParser::new(HttpRequestLimits::default());
        assert_eq!(ParserStatus::ParsedRequest, parser.parse(&mut cursor));
        assert_eq!(ParserStatus::Failed, parser.parse(&mut cursor));
    }

    #[test]
    fn chunked_body_parses_to_completion() {
        let mut cursor = FakeCursor::new(
            b"POST / HTTP/1.1\r\nHost: h\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n",
        );
        let mut parser = RequestParser::new(HttpRequestLimits::default());
        assert_eq!(ParserStatus::ParsedRequest, parser.parse(&mut cursor));
        assert_eq!(ParserStatus::ParsedBody, parser.parse(&mut cursor));
        assert_eq!(b"hello", parser.request().body_part(cursor.available_from_zero()));
        assert_eq!(ParserStatus::ParsedRequest, parser.parse(&mut cursor));
    }

    impl FakeCursor {
        fn available_from_zero(&self) -> &[u8] {
            &self.data[self.offset..]
        }
    }

    #[test]
    fn a_second_request_on_the_same_parser_does_not_see_the_first_requests_headers() {
        let mut cursor = FakeCursor::new(
            b"GET /first HTTP/1.1\r\nHost: a\r\nX-One: 1\r\n\r\nGET /second HTTP/1.1\r\nHost: b\r\n\r\n",
        );
        let mut parser = RequestParser::new(HttpRequestLimits::default());
        assert_eq!(ParserStatus::ParsedRequest, parser.parse(&mut cursor));
        assert_eq!(b"/first", parser.request().path(cursor.available_from_zero()));
        assert_eq!(ParserStatus::ParsedRequest, parser.parse(&mut cursor));
        assert_eq!(b"/second", parser.request().path(cursor.available_from_zero()));
        assert_eq!(1, parser.request().count("host", cursor.available_from_zero()));
        assert!(!parser.request().has("x-one", cursor.available_from_zero()));
    }

    #[test]
    fn header_name_exceeding_its_limit_is_too_big_not_malformed() {
        let mut limits = HttpRequestLimits::default();
        limits.max_header_name_size = 4;
        let mut cursor = FakeCursor::new(b"GET / HTTP/1.1\r\nHost: h\r\nLongname: x\r\n\r\n");
        let mut parser = RequestParser::new(limits);
        assert_eq!(ParserStatus::Failed, parser.parse(&mut cursor));
        assert_eq!(ErrorKind::TooBigRequest, parser.error());
    }

    #[test]
    fn header_value_exceeding_its_limit_is_too_big_not_malformed() {
        let mut limits = HttpRequestLimits::default();
        limits.max_header_value_size = 4;
        let mut cursor = FakeCursor::new(b"GET / HTTP/1.1\r\nHost: h\r\nX-Long: toolongvalue\r\n\r\n");
        let mut parser = RequestParser::new(limits);
        assert_eq!(ParserStatus::Failed, parser.parse(&mut cursor));
        assert_eq!(ErrorKind::TooBigRequest, parser.error());
    }

    #[test]
    fn header_value_with_an_invalid_byte_is_malformed_not_too_big() {
        let mut cursor = FakeCursor::new(b"GET / HTTP/1.1\r\nHost: h\r\nX-Bad: \x01bad\r\n\r\n");
        let mut parser = RequestParser::new(HttpRequestLimits::default());
        assert_eq!(ParserStatus::Failed, parser.parse(&mut cursor));
        assert_eq!(ErrorKind::MalformedRequest, parser.error());
    }

    #[test]
    fn trailer_name_exceeding_its_limit_is_too_big_not_malformed() {
        let mut limits = HttpRequestLimits::default();
        limits.max_trailer_name_size = 4;
        let mut cursor = FakeCursor::new(
            b"POST / HTTP/1.1\r\nHost: h\r\nTransfer-Encoding: chunked\r\n\r\n0\r\nLongname: x\r\n\r\n",
        );
        let mut parser = RequestParser::new(limits);
        assert_eq!(ParserStatus::ParsedRequest, parser.parse(&mut cursor));
        assert_eq!(ParserStatus::Failed, parser.parse(&mut cursor));
        assert_eq!(ErrorKind::TooBigRequest, parser.error());
    }

    #[test]
    fn trailer_value_exceeding_its_limit_is_too_big_not_malformed() {
        let mut limits = HttpRequestLimits::default();
        limits.max_trailer_value_size = 4;
        let mut cursor = FakeCursor::new(
            b"POST / HTTP/1.1\r\nHost: h\r\nTransfer-Encoding: chunked\r\n\r\n0\r\nX: toolongvalue\r\n\r\n",
        );
        let mut parser = RequestParser::new(limits);
        assert_eq!(ParserStatus::ParsedRequest, parser.parse(&mut cursor));
        assert_eq!(ParserStatus::Failed, parser.parse(&mut cursor));
        assert_eq!(ErrorKind::TooBigRequest, parser.error());
    }

    #[test]
    fn randomized_header_fixtures_round_trip_through_the_parser() {
        use fake::faker::lorem::en::Word;
        use fake::Fake;

        for _ in 0..8 {
            let header_name: String = Word().fake();
            let header_value: String = Word().fake();
            let request =
                format!("GET / HTTP/1.1\r\nHost: h\r\n{header_name}: {header_value}\r\n\r\n");
            let mut cursor = FakeCursor::new(request.as_bytes());
            let mut parser = RequestParser::new(HttpRequestLimits::default());
            assert_eq!(ParserStatus::ParsedRequest, parser.parse(&mut cursor));
            assert_eq!(
                Some(header_value.as_bytes()),
                parser
                    .request()
                    .value(&header_name, 1, cursor.available_from_zero())
            );
        }
    }
}
