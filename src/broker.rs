//! Response composition (component I).
//!
//! Grounded on `examples/original_source/Src/Http/HttpBrokerPrivate.{h,cpp}`:
//! the same `response-in-progress`/`response-complete`/`close-after-responding`
//! state, the same verbatim 44-entry status-line table (reconciled against
//! `src/parser/status.rs`'s `Status` enum, kept from the teacher), and the
//! same write order for each response shape (status line, `Server`, `Date`,
//! optional `Connection: close`, content headers, user headers, blank line,
//! body). Writes go through [`crate::net::tcp_socket::TcpSocket`] directly
//! rather than a generic `IOChannel` pointer, since this crate's `TcpSocket`
//! already owns its channel internally (see `net::tcp_socket`) instead of
//! deriving from it.

use std::any::Any;
use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::net::tcp_socket::TcpSocket;
use crate::object::Signal;
use crate::parser::request::ParsedRequest;
use crate::parser::status::Status;

fn status_line(status: Status) -> &'static str {
    match status {
        Status::Continue => "HTTP/1.1 100 Continue\r\n",
        Status::SwitchingProtocols => "HTTP/1.1 101 Switching Protocols\r\n",
        Status::r#Ok => "HTTP/1.1 200 OK\r\n",
        Status::Created => "HTTP/1.1 201 Created\r\n",
        Status::Accepted => "HTTP/1.1 202 Accepted\r\n",
        Status::NonAuthoritativeInformation => "HTTP/1.1 203 Non-Authoritative Information\r\n",
        Status::NoContent => "HTTP/1.1 204 No Content\r\n",
        Status::ResetContent => "HTTP/1.1 205 Reset Content\r\n",
        Status::PartialContent => "HTTP/1.1 206 Partial Content\r\n",
        Status::MultipleChoices => "HTTP/1.1 300 Multiple Choices\r\n",
        Status::MovedPermanently => "HTTP/1.1 301 Moved Permanently\r\n",
        Status::Found => "HTTP/1.1 302 Found\r\n",
        Status::SeeOther => "HTTP/1.1 303 See Other\r\n",
        Status::NotModified => "HTTP/1.1 304 Not Modified\r\n",
        Status::UseProxy => "HTTP/1.1 305 Use Proxy\r\n",
        Status::TemporaryRedirect => "HTTP/1.1 307 Temporary Redirect\r\n",
        Status::PermanentRedirect => "HTTP/1.1 308 Permanent Redirect\r\n",
        Status::BadRequest => "HTTP/1.1 400 Bad Request\r\n",
        Status::Unauthorized => "HTTP/1.1 401 Unauthorized\r\n",
        Status::PaymentRequired => "HTTP/1.1 402 Payment Required\r\n",
        Status::Forbidden => "HTTP/1.1 403 Forbidden\r\n",
        Status::NotFound => "HTTP/1.1 404 Not Found\r\n",
        Status::MethodNotAllowed => "HTTP/1.1 405 Method Not Allowed\r\n",
        Status::NotAcceptable => "HTTP/1.1 406 Not Acceptable\r\n",
        Status::ProxyAuthenticationRequired => "HTTP/1.1 407 Proxy Authentication Required\r\n",
        Status::RequestTimeout => "HTTP/1.1 408 Request Timeout\r\n",
        Status::Conflict => "HTTP/1.1 409 Conflict\r\n",
        Status::Gone => "HTTP/1.1 410 Gone\r\n",
        Status::LengthRequired => "HTTP/1.1 411 Length Required\r\n",
        Status::PreconditionFailed => "HTTP/1.1 412 Precondition Failed\r\n",
        Status::ContentTooLarge => "HTTP/1.1 413 Content Too Large\r\n",
        Status::UriTooLong => "HTTP/1.1 414 URI Too Long\r\n",
        Status::UnsupportedMediaType => "HTTP/1.1 415 Unsupported Media Type\r\n",
        Status::RangeNotSatisfiable => "HTTP/1.1 416 Range Not Satisfiable\r\n",
        Status::ExpectationFailed => "HTTP/1.1 417 Expectation Failed\r\n",
        Status::MisdirectedRequest => "HTTP/1.1 421 Misdirected Request\r\n",
        Status::UnprocessableContent => "HTTP/1.1 422 Unprocessable Content\r\n",
        Status::UpgradeRequired => "HTTP/1.1 426 Upgrade Required\r\n",
        Status::InternalServerError => "HTTP/1.1 500 Internal Server Error\r\n",
        Status::NotImplemented => "HTTP/1.1 501 Not Implemented\r\n",
        Status::BadGateway => "HTTP/1.1 502 Bad Gateway\r\n",
        Status::ServiceUnavailable => "HTTP/1.1 503 Service Unavailable\r\n",
        Status::GatewayTimeout => "HTTP/1.1 504 Gateway Timeout\r\n",
        Status::HTTPVersionNotSupported => "HTTP/1.1 505 HTTP Version Not Supported\r\n",
    }
}

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Civil (year, month, day) from a day count since the Unix epoch, via
/// Howard Hinnant's `civil_from_days` algorithm — avoids pulling in a date
/// crate for the one calculation this server needs.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = if m <= 2 { y + 1 } else { y };
    (year, m, d)
}

/// Formats `epoch_seconds` as RFC 9110 §5.6.7 IMF-fixdate:
/// `<Day>, DD Mon YYYY HH:MM:SS GMT`.
fn imf_fixdate(epoch_seconds: u64) -> String {
    let days = (epoch_seconds / 86400) as i64;
    let secs_of_day = epoch_seconds % 86400;
    let (year, month, day) = civil_from_days(days);
    let weekday = (days.rem_euclid(7) + 4).rem_euclid(7) as usize;
    let hour = secs_of_day / 3600;
    let minute = (secs_of_day % 3600) / 60;
    let second = secs_of_day % 60;
    format!(
        "{}, {:02} {} {:04} {:02}:{:02}:{:02} GMT",
        WEEKDAYS[weekday], day, MONTHS[(month - 1) as usize], year, hour, minute, second
    )
}

thread_local! {
    static DATE_CACHE: RefCell<(u64, String)> = RefCell::new((0, String::new()));
}

/// The cached `Date` header value, recomputed at most once per wall-clock
/// second (spec.md §4.8's "a worker-thread singleton computes the string
/// once per second"), read from a `thread_local` rather than driven by a
/// dedicated `Timer` — see SPEC_FULL.md's resolution of this detail.
fn cached_date() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    DATE_CACHE.with(|cell| {
        let mut cache = cell.borrow_mut();
        if cache.0 != now || cache.1.is_empty() {
            cache.0 = now;
            cache.1 = imf_fixdate(now);
        }
        cache.1.clone()
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseState {
    Idle,
    Chunked,
}

/// The write-side API handed to route handlers. One instance per
/// connection, reset between requests on the same connection by
/// `connection_handler`.
pub struct Broker {
    socket: Rc<RefCell<TcpSocket>>,
    state: ResponseState,
    responded: bool,
    close_after_responding: bool,
    wrote_close_header: bool,
    continuation: Option<Box<dyn Any>>,
    /// The request currently being handled, snapshotted by
    /// `connection_handler` each time it hands control to a route handler or
    /// fires `received_body_data`, so trailer accessors below reflect
    /// whatever has been parsed so far.
    current_request: Option<ParsedRequest>,
    /// Fired once a response (or a forced completion of a chunked one) has
    /// been fully written.
    pub wrote_response: Signal<()>,
    /// Fired by `connection_handler` as body bytes for the request in
    /// progress arrive; `true` marks the final part. A handler that needs
    /// the body beyond what was already buffered at dispatch time connects
    /// to this instead of blocking.
    pub received_body_data: Signal<(Vec<u8>, bool)>,
}

impl Broker {
    /// Builds a broker writing to `socket`.
    pub fn new(socket: Rc<RefCell<TcpSocket>>) -> Self {
        Self {
            socket,
            state: ResponseState::Idle,
            responded: false,
            close_after_responding: false,
            wrote_close_header: false,
            continuation: None,
            current_request: None,
            wrote_response: Signal::new(),
            received_body_data: Signal::new(),
        }
    }

    /// Snapshots the request currently being parsed, so trailer accessors
    /// and the peer address stay current as more of it arrives. Called by
    /// `connection_handler` before dispatching to a route handler and before
    /// each `received_body_data` emission.
    pub(crate) fn set_current_request(&mut self, request: ParsedRequest) {
        self.current_request = Some(request);
    }

    /// The connection's peer address, if the underlying socket is still
    /// connected.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.socket.borrow().peer_addr()
    }

    /// True if the request in progress carried any trailer fields. Only
    /// meaningful once the terminal chunk has been observed.
    pub fn has_trailers(&self) -> bool {
        self.current_request
            .as_ref()
            .is_some_and(|r| r.trailers_count() > 0)
    }

    /// Number of trailer fields named `name` on the request in progress.
    pub fn trailer_count(&self, name: &str) -> usize {
        match &self.current_request {
            Some(request) => request.trailer_count(name, self.socket.borrow().peek_all()),
            None => 0,
        }
    }

    /// The value of the `position`-th (1-based) occurrence of trailer
    /// `name` on the request in progress, if any. Owned, since it's resolved
    /// against a transient borrow of the socket's buffer.
    pub fn trailer(&self, name: &str, position: usize) -> Option<Vec<u8>> {
        let request = self.current_request.as_ref()?;
        let socket = self.socket.borrow();
        request
            .trailer(name, position, socket.peek_all())
            .map(|v| v.to_vec())
    }

    fn write(&self, data: &[u8]) {
        if let Err(e) = self.socket.borrow_mut().write(data) {
            tracing::warn!(error = %e, "broker write failed");
        }
    }

    fn write_str(&self, s: &str) {
        self.write(s.as_bytes());
    }

    /// True once a response has been fully written for the request in
    /// progress.
    pub fn responded(&self) -> bool {
        self.responded
    }

    /// Installs `object` as the response's continuation: an arbitrary owned
    /// value the handler keeps alive past its own return, signaling to
    /// `connection_handler` that the connection should stay open even
    /// though no response has been written yet.
    pub fn set_continuation(&mut self, object: Box<dyn Any>) {
        self.continuation = Some(object);
    }

    /// True if a continuation object is installed.
    pub fn has_continuation(&self) -> bool {
        self.continuation.is_some()
    }

    /// Marks the connection for closure once the current response
    /// completes.
    pub fn close_connection_after_responding(&mut self) {
        self.close_after_responding = true;
    }

    /// Clears all per-request state, ready for the next request on the same
    /// connection. Matches the original's `resetResponseWriting`.
    pub fn reset(&mut self) {
        if !self.wrote_close_header {
            self.responded = false;
        }
        self.state = ResponseState::Idle;
        self.continuation = None;
        self.current_request = None;
    }

    fn write_close_header_if_necessary(&mut self) {
        if self.close_after_responding {
            self.wrote_close_header = true;
            self.write_str("Connection: close\r\n");
        }
    }

    fn write_user_headers(&self, headers: &[(&str, &str)]) {
        for (name, value) in headers {
            self.write_str(name);
            self.write_str(": ");
            self.write_str(value);
            self.write_str("\r\n");
        }
    }

    fn finish_response(&mut self) {
        self.state = ResponseState::Idle;
        self.responded = true;
        if self.wrote_close_header {
            self.socket.borrow_mut().disconnect_from_peer();
        }
        self.wrote_response.emit(&());
    }

    /// Writes a full response with an optional body and MIME type. If a
    /// response was already latched this is a no-op; if a chunked response
    /// is in progress, it's force-finished (`0\r\n\r\n`) and this call is
    /// otherwise ignored — matching spec.md §4.8's "finishes the chunked
    /// response... and ignores the new request."
    pub fn write_response(
        &mut self,
        body: Option<&[u8]>,
        mime_type: Option<&str>,
        status: Status,
        headers: &[(&str, &str)],
    ) {
        if self.responded {
            return;
        }
        if self.state == ResponseState::Chunked {
            self.write_str("0\r\n\r\n");
            self.finish_response();
            return;
        }
        self.write_str(status_line(status));
        self.write_str("Server: Kourier\r\n");
        self.write_str(&format!("Date: {}\r\n", cached_date()));
        self.write_close_header_if_necessary();
        match body {
            Some(body) if !body.is_empty() => {
                self.write_str(&format!("Content-Length: {}\r\n", body.len()))
            }
            _ => self.write_str("Content-Length: 0\r\n"),
        }
        if let Some(mime) = mime_type {
            self.write_str(&format!("Content-Type: {mime}\r\n"));
        }
        self.write_user_headers(headers);
        self.write_str("\r\n");
        if let Some(body) = body {
            if !body.is_empty() {
                self.write(body);
            }
        }
        self.finish_response();
    }

    /// Starts a chunked response. Same latched/in-progress rules as
    /// [`write_response`](Self::write_response).
    pub fn write_chunked_response(
        &mut self,
        mime_type: Option<&str>,
        status: Status,
        headers: &[(&str, &str)],
        expected_trailer_names: &[&str],
    ) {
        if self.responded {
            return;
        }
        if self.state == ResponseState::Chunked {
            self.write_str("0\r\n\r\n");
            self.finish_response();
            return;
        }
        self.state = ResponseState::Chunked;
        self.write_str(status_line(status));
        self.write_str("Server: Kourier\r\n");
        self.write_str(&format!("Date: {}\r\n", cached_date()));
        self.write_close_header_if_necessary();
        if let Some(mime) = mime_type {
            self.write_str(&format!("Content-Type: {mime}\r\n"));
        }
        self.write_str("Transfer-Encoding: chunked\r\n");
        if !expected_trailer_names.is_empty() {
            self.write_str(&format!("Trailer: {}\r\n", expected_trailer_names.join(", ")));
        }
        self.write_user_headers(headers);
        self.write_str("\r\n");
    }

    /// Writes one chunk. A no-op outside an in-progress chunked response, or
    /// for empty `data`.
    pub fn write_chunk(&mut self, data: &[u8]) {
        if self.state != ResponseState::Chunked || data.is_empty() {
            return;
        }
        self.write_str(&format!("{:x}\r\n", data.len()));
        self.write(data);
        self.write_str("\r\n");
    }

    /// Writes the terminal `0\r\n` chunk plus any trailers, latching the
    /// response complete. A no-op outside an in-progress chunked response.
    pub fn write_last_chunk(&mut self, trailers: &[(&str, &str)]) {
        if self.state != ResponseState::Chunked {
            return;
        }
        self.write_str("0\r\n");
        self.write_user_headers(trailers);
        self.write_str("\r\n");
        self.finish_response();
    }

    /// Bytes still queued on the underlying socket.
    pub fn bytes_to_send(&self) -> usize {
        self.socket.borrow().data_to_write()
    }
}
