//! Per-connection glue wiring a socket, parser, broker, router, and timer
//! together (component L).
//!
//! Grounded on `examples/original_source/Src/Server/HttpConnectionHandler.cpp`:
//! the same `on-received-data` loop driving the parser to exhaustion, the
//! same idle-timeout/request-timeout mutual exclusion, and the same
//! first-ParsedRequest-dispatches/second-ParsedRequest-is-chunked-body-
//! completion distinction. The original reaches every collaborator through
//! a raw `HttpConnectionHandler*`/`HttpBroker*` the connection owns for its
//! whole lifetime; here the broker is instead held as `Rc<RefCell<Broker>>`
//! so a handler that defers its response (storing a continuation) can clone
//! that handle into the continuation and call back into the broker from
//! off this connection's call stack once the deferred work completes.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use mio::{Registry, Token};

use crate::broker::Broker;
use crate::error::{ErrorHandler, ErrorKind};
use crate::limits::HttpRequestLimits;
use crate::net::tcp_socket::TcpSocket;
use crate::object::Signal;
use crate::parser::engine::{InboundCursor, ParserStatus, RequestParser};
use crate::parser::request::{BodyType, ParsedRequest};
use crate::parser::status::Status;
use crate::router::HttpRequestRouter;
use crate::timer::{Timer, TimerWheel};

impl InboundCursor for TcpSocket {
    fn available(&self) -> &[u8] {
        self.peek_all()
    }
    fn advance(&mut self, n: usize) {
        self.skip(n)
    }
}

/// A registered route handler: given the parsed request, the raw inbound
/// buffer its byte ranges resolve against, and a handle to the broker, it
/// writes (or defers) the response. Route handlers that need to keep
/// working after returning stash `broker` itself inside a continuation via
/// [`Broker::set_continuation`].
pub type Handler = Rc<dyn Fn(&ParsedRequest, &[u8], Rc<RefCell<Broker>>)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestProgress {
    /// No `ParsedRequest` outcome observed yet for the request in progress.
    AwaitingRequestLine,
    /// A `ParsedRequest` outcome already dispatched a chunked request's
    /// headers; the next `ParsedRequest` outcome is that request's body
    /// completion, not a new request.
    AwaitingChunkedCompletion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimeoutMode {
    Idle,
    Request,
    Inactive,
}

enum DispatchOutcome {
    Dispatched,
    NotFound,
    Panicked,
}

/// Per-connection state: one instance per accepted socket.
pub struct ConnectionHandler {
    socket: Rc<RefCell<TcpSocket>>,
    parser: RequestParser,
    broker: Rc<RefCell<Broker>>,
    router: Rc<HttpRequestRouter<Handler>>,
    timer: Rc<RefCell<Timer>>,
    request_timeout: Duration,
    idle_timeout: Duration,
    timeout_mode: TimeoutMode,
    progress: RequestProgress,
    received_complete_request: bool,
    error_handler: Rc<dyn ErrorHandler>,
    /// Fired once this connection has fully disconnected, carrying the
    /// socket's token so the repository can remove it.
    pub finished: Signal<Token>,
}

impl ConnectionHandler {
    /// Builds a handler for `socket`, registers its timer with
    /// `timer_wheel`, and wires up the socket/broker/timer signal
    /// subscriptions described in spec.md §4.9. `request_timeout` and
    /// `idle_timeout` of zero disable the corresponding timeout.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        socket: Rc<RefCell<TcpSocket>>,
        limits: HttpRequestLimits,
        router: Rc<HttpRequestRouter<Handler>>,
        timer_wheel: &mut TimerWheel,
        request_timeout: Duration,
        idle_timeout: Duration,
        error_handler: Rc<dyn ErrorHandler>,
    ) -> Rc<RefCell<Self>> {
        let broker = Rc::new(RefCell::new(Broker::new(socket.clone())));
        let timer = Rc::new(RefCell::new(Timer::new()));
        timer_wheel.register(&timer);

        let handler = Rc::new(RefCell::new(Self {
            socket: socket.clone(),
            parser: RequestParser::new(limits),
            broker,
            router,
            timer: timer.clone(),
            request_timeout,
            idle_timeout,
            timeout_mode: TimeoutMode::Inactive,
            progress: RequestProgress::AwaitingRequestLine,
            received_complete_request: false,
            error_handler,
            finished: Signal::new(),
        }));

        let weak = Rc::downgrade(&handler);
        let w = weak.clone();
        socket.borrow_mut().disconnected.connect(None, move |_| {
            if let Some(h) = w.upgrade() {
                h.borrow_mut().on_connection_closed();
            }
        });
        let w = weak.clone();
        socket.borrow_mut().error.connect(None, move |_| {
            if let Some(h) = w.upgrade() {
                h.borrow_mut().on_connection_closed();
            }
        });
        let w = weak.clone();
        timer.borrow_mut().timeout.connect(None, move |_| {
            if let Some(h) = w.upgrade() {
                h.borrow_mut().on_timeout();
            }
        });
        // Only fires a resumption when nothing on this connection's call
        // stack already holds the handler borrowed — see the module doc
        // comment: a synchronous `write_response` call from inside
        // `on_received_data` finds this borrow unavailable and no-ops,
        // leaving `on_received_data`'s own loop to reset state for the next
        // request; a deferred response completing from off that call stack
        // finds the borrow free and resumes the loop itself.
        let w = weak;
        let broker_handle = handler.borrow().broker.clone();
        broker_handle.borrow_mut().wrote_response.connect(None, move |_| {
            if let Some(h) = w.upgrade() {
                if let Ok(mut h) = h.try_borrow_mut() {
                    h.on_received_data();
                }
            }
        });

        if idle_timeout > Duration::ZERO {
            handler.borrow_mut().start_idle_timeout();
        }
        handler
    }

    /// Drives the socket's state machine for a readiness event, then
    /// resumes request processing if new bytes arrived. Stands in for
    /// subscribing to the channel's `received_data` signal directly: the
    /// worker loop already demultiplexes events by token down to exactly
    /// this handler, so there is no one else who needs to observe that
    /// signal.
    pub fn on_event(&mut self, registry: &Registry, readable: bool, writable: bool) {
        if let Err(e) = self.socket.borrow_mut().on_event(registry, readable, writable) {
            tracing::warn!(error = %e, "socket event handling failed");
            return;
        }
        if readable {
            self.on_received_data();
        }
    }

    /// Begins a graceful disconnect of this connection, used by
    /// [`crate::handler_repository::HandlerRepository::stop`] to tear every
    /// live connection down on server shutdown.
    pub fn finish(&mut self) {
        self.disconnect();
    }

    /// Checks the connect/disconnect deadline (component F) and the
    /// request/idle deadline (component J) against `now`. The worker calls
    /// this once per tick for every live handler.
    pub fn check_timeout(&mut self, now: Instant, registry: &Registry) {
        self.socket.borrow_mut().check_timeout(now, registry);
    }

    fn start_idle_timeout(&mut self) {
        if self.idle_timeout.is_zero() {
            self.timeout_mode = TimeoutMode::Inactive;
            self.timer.borrow_mut().stop();
            return;
        }
        self.timeout_mode = TimeoutMode::Idle;
        let mut timer = self.timer.borrow_mut();
        timer.set_single_shot(true);
        timer.start(self.idle_timeout, Instant::now());
    }

    fn start_request_timeout(&mut self) {
        if self.request_timeout.is_zero() {
            self.timeout_mode = TimeoutMode::Inactive;
            self.timer.borrow_mut().stop();
            return;
        }
        self.timeout_mode = TimeoutMode::Request;
        let mut timer = self.timer.borrow_mut();
        timer.set_single_shot(true);
        timer.start(self.request_timeout, Instant::now());
    }

    fn report_error(&self, kind: ErrorKind) {
        if let Some(addr) = self.socket.borrow().peer_addr() {
            self.error_handler.handle_error(kind, addr.ip(), addr.port());
        }
    }

    fn disconnect(&mut self) {
        self.timer.borrow_mut().stop();
        self.socket.borrow_mut().disconnect_from_peer();
    }

    fn on_connection_closed(&mut self) {
        self.timer.borrow_mut().stop();
        let token = self.socket.borrow().token();
        self.finished.emit(&token);
    }

    fn on_timeout(&mut self) {
        self.broker
            .borrow_mut()
            .write_response(None, None, Status::RequestTimeout, &[]);
        self.report_error(ErrorKind::RequestTimeout);
        self.disconnect();
    }

    fn reset_for_next_request(&mut self) {
        self.broker.borrow_mut().reset();
        self.received_complete_request = false;
        self.progress = RequestProgress::AwaitingRequestLine;
        if self.socket.borrow().peek_all().is_empty() {
            self.start_idle_timeout();
        } else {
            self.start_request_timeout();
        }
    }

    /// Fires `received_body_data` without holding the broker borrowed across
    /// the call: a connected handler very plausibly wants to call back into
    /// the broker itself (e.g. to write the response once the last part
    /// arrives), which would panic against a `RefCell` already borrowed for
    /// the whole `emit` if the signal were fired through a live
    /// `borrow_mut()`. The signal is swapped out, emitted standalone, then
    /// swapped back in.
    fn emit_received_body_data(&mut self, body: Vec<u8>, is_last: bool) {
        let mut signal = std::mem::take(&mut self.broker.borrow_mut().received_body_data);
        signal.emit(&(body, is_last));
        self.broker.borrow_mut().received_body_data = signal;
    }

    fn dispatch_new_request(&mut self) -> DispatchOutcome {
        let Some(method) = self.parser.request().method() else {
            return DispatchOutcome::NotFound;
        };
        let path = {
            let socket = self.socket.borrow();
            self.parser.request().path(socket.peek_all()).to_vec()
        };
        let Some(handler) = self.router.get_handler(method, &path) else {
            self.broker
                .borrow_mut()
                .write_response(None, None, Status::NotFound, &[]);
            self.report_error(ErrorKind::MalformedRequest);
            return DispatchOutcome::NotFound;
        };
        let broker = self.broker.clone();
        self.broker
            .borrow_mut()
            .set_current_request(self.parser.request().clone());
        let result = {
            let socket = self.socket.borrow();
            let buf = socket.peek_all();
            let request = self.parser.request();
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (*handler)(request, buf, broker)))
        };
        if result.is_err() {
            self.broker
                .borrow_mut()
                .write_response(None, None, Status::InternalServerError, &[]);
            DispatchOutcome::Panicked
        } else {
            DispatchOutcome::Dispatched
        }
    }

    /// Drives the parser against whatever bytes are currently buffered,
    /// dispatching requests and resetting for the next one, until either
    /// the connection is torn down or the parser needs more data than is
    /// available.
    fn on_received_data(&mut self) {
        if self.timeout_mode == TimeoutMode::Idle && !self.socket.borrow().peek_all().is_empty() {
            self.start_request_timeout();
        }
        loop {
            if self.received_complete_request {
                if !self.broker.borrow().responded() {
                    self.timer.borrow_mut().stop();
                    return;
                }
                self.reset_for_next_request();
            }

            let status = {
                let mut socket = self.socket.borrow_mut();
                self.parser.parse(&mut *socket)
            };
            match status {
                ParserStatus::ParsedRequest => match self.progress {
                    RequestProgress::AwaitingRequestLine => {
                        if self.parser.take_expect_continue() {
                            let _ = self.socket.borrow_mut().write(b"HTTP/1.1 100 Continue\r\n\r\n");
                        }
                        match self.dispatch_new_request() {
                            DispatchOutcome::NotFound | DispatchOutcome::Panicked => {
                                self.disconnect();
                                return;
                            }
                            DispatchOutcome::Dispatched => {}
                        }
                        if matches!(self.parser.request().body_type(), BodyType::Chunked) {
                            self.progress = RequestProgress::AwaitingChunkedCompletion;
                        }
                        self.received_complete_request = self.parser.request().is_complete();
                        let broker = self.broker.borrow();
                        if !broker.responded() && !broker.has_continuation() {
                            drop(broker);
                            self.disconnect();
                            return;
                        }
                    }
                    RequestProgress::AwaitingChunkedCompletion => {
                        self.broker
                            .borrow_mut()
                            .set_current_request(self.parser.request().clone());
                        self.emit_received_body_data(Vec::new(), true);
                        self.progress = RequestProgress::AwaitingRequestLine;
                        self.received_complete_request = true;
                        if !self.broker.borrow().responded() {
                            self.timer.borrow_mut().stop();
                            return;
                        }
                    }
                },
                ParserStatus::ParsedBody => {
                    let is_last = matches!(self.parser.request().body_type(), BodyType::NotChunked(_))
                        && self.parser.request().is_complete();
                    let body = {
                        let socket = self.socket.borrow();
                        self.parser.request().body_part(socket.peek_all()).to_vec()
                    };
                    self.broker
                        .borrow_mut()
                        .set_current_request(self.parser.request().clone());
                    self.emit_received_body_data(body, is_last);
                }
                ParserStatus::NeedsMoreData => {
                    let nothing_parsed_yet =
                        self.progress == RequestProgress::AwaitingRequestLine && self.parser.request_size() == 0;
                    if nothing_parsed_yet && self.socket.borrow().peek_all().is_empty() {
                        self.start_idle_timeout();
                    }
                    return;
                }
                ParserStatus::Failed => {
                    self.broker
                        .borrow_mut()
                        .write_response(None, None, Status::BadRequest, &[]);
                    self.report_error(self.parser.error());
                    self.disconnect();
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::Cell;
    use std::io::{Read, Write};
    use std::net::TcpListener as StdTcpListener;

    use mio::Token;

    fn connected_pair(poll: &mio::Poll, token: Token) -> (Rc<RefCell<TcpSocket>>, std::net::TcpStream) {
        let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::net::TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        server.set_nonblocking(true).unwrap();
        client.set_nonblocking(true).unwrap();
        let stream = mio::net::TcpStream::from_std(server);
        let socket = TcpSocket::accept_into(stream, token, poll.registry()).unwrap();
        (Rc::new(RefCell::new(socket)), client)
    }

    fn router_with_ok_route() -> Rc<HttpRequestRouter<Handler>> {
        let mut router = HttpRequestRouter::new();
        let handler: Handler = Rc::new(|_req, _buf, broker| {
            broker.borrow_mut().write_response(Some(b"hi"), None, Status::r#Ok, &[]);
        });
        router
            .add_route(crate::parser::request::Method::Get, "/", handler)
            .unwrap();
        Rc::new(router)
    }

    #[test]
    fn full_request_is_dispatched_and_responded() {
        let poll = mio::Poll::new().unwrap();
        let (socket, mut client) = connected_pair(&poll, Token(0));
        let mut wheel = TimerWheel::new();
        let handler = ConnectionHandler::new(
            socket.clone(),
            HttpRequestLimits::default(),
            router_with_ok_route(),
            &mut wheel,
            Duration::from_secs(5),
            Duration::from_secs(5),
            Rc::new(crate::error::NullErrorHandler),
        );

        client.write_all(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n").unwrap();
        std::thread::sleep(Duration::from_millis(20));
        handler.borrow_mut().on_event(poll.registry(), true, false);
        socket.borrow_mut().on_event(poll.registry(), false, true).unwrap();

        let mut buf = [0u8; 256];
        std::thread::sleep(Duration::from_millis(20));
        let n = client.read(&mut buf).unwrap();
        let response = String::from_utf8_lossy(&buf[..n]);
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
        assert!(response.ends_with("hi"), "{response}");
    }

    #[test]
    fn unrouted_path_gets_404_and_disconnects() {
        let poll = mio::Poll::new().unwrap();
        let (socket, mut client) = connected_pair(&poll, Token(1));
        let mut wheel = TimerWheel::new();
        let finished = Rc::new(Cell::new(false));
        let handler = ConnectionHandler::new(
            socket.clone(),
            HttpRequestLimits::default(),
            Rc::new(HttpRequestRouter::new()),
            &mut wheel,
            Duration::from_secs(5),
            Duration::from_secs(5),
            Rc::new(crate::error::NullErrorHandler),
        );
        let f = finished.clone();
        handler.borrow_mut().finished.connect(None, move |_| f.set(true));

        client.write_all(b"GET /nope HTTP/1.1\r\nHost: h\r\n\r\n").unwrap();
        std::thread::sleep(Duration::from_millis(20));
        handler.borrow_mut().on_event(poll.registry(), true, false);
        socket.borrow_mut().on_event(poll.registry(), false, true).unwrap();

        let mut buf = [0u8; 256];
        std::thread::sleep(Duration::from_millis(20));
        let n = client.read(&mut buf).unwrap();
        let response = String::from_utf8_lossy(&buf[..n]);
        assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"), "{response}");
        assert_eq!(crate::net::tcp_socket::State::Disconnecting, socket.borrow().state());
    }

    #[test]
    fn malformed_request_line_gets_400_and_disconnects() {
        let poll = mio::Poll::new().unwrap();
        let (socket, mut client) = connected_pair(&poll, Token(2));
        let mut wheel = TimerWheel::new();
        let handler = ConnectionHandler::new(
            socket.clone(),
            HttpRequestLimits::default(),
            Rc::new(HttpRequestRouter::new()),
            &mut wheel,
            Duration::from_secs(5),
            Duration::from_secs(5),
            Rc::new(crate::error::NullErrorHandler),
        );

        client.write_all(b"NOTAMETHOD\r\n\r\n").unwrap();
        std::thread::sleep(Duration::from_millis(20));
        handler.borrow_mut().on_event(poll.registry(), true, false);
        socket.borrow_mut().on_event(poll.registry(), false, true).unwrap();

        let mut buf = [0u8; 256];
        std::thread::sleep(Duration::from_millis(20));
        let n = client.read(&mut buf).unwrap();
        let response = String::from_utf8_lossy(&buf[..n]);
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{response}");
    }

    #[test]
    fn expect_continue_sends_interim_response_before_handler_response() {
        let poll = mio::Poll::new().unwrap();
        let (socket, mut client) = connected_pair(&poll, Token(3));
        let mut wheel = TimerWheel::new();
        let handler = ConnectionHandler::new(
            socket.clone(),
            HttpRequestLimits::default(),
            router_with_ok_route(),
            &mut wheel,
            Duration::from_secs(5),
            Duration::from_secs(5),
            Rc::new(crate::error::NullErrorHandler),
        );

        client
            .write_all(b"GET / HTTP/1.1\r\nHost: example.com\r\nExpect: 100-continue\r\n\r\n")
            .unwrap();
        std::thread::sleep(Duration::from_millis(20));
        handler.borrow_mut().on_event(poll.registry(), true, false);
        socket.borrow_mut().on_event(poll.registry(), false, true).unwrap();

        let mut buf = [0u8; 256];
        std::thread::sleep(Duration::from_millis(20));
        let n = client.read(&mut buf).unwrap();
        let response = String::from_utf8_lossy(&buf[..n]);
        assert!(response.starts_with("HTTP/1.1 100 Continue\r\n\r\n"), "{response}");
        let rest = &response["HTTP/1.1 100 Continue\r\n\r\n".len()..];
        assert!(rest.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
        assert!(rest.ends_with("hi"), "{response}");
    }

    #[test]
    fn chunked_body_parts_and_trailer_reach_a_handler_connected_to_received_body_data() {
        let poll = mio::Poll::new().unwrap();
        let (socket, mut client) = connected_pair(&poll, Token(4));
        let mut wheel = TimerWheel::new();

        let collected_body = Rc::new(RefCell::new(Vec::new()));
        let saw_last_part = Rc::new(Cell::new(false));
        let trailer_value = Rc::new(RefCell::new(None));

        let mut router = HttpRequestRouter::new();
        let collected_body_for_route = collected_body.clone();
        let saw_last_part_for_route = saw_last_part.clone();
        let trailer_value_for_route = trailer_value.clone();
        let handler: Handler = Rc::new(move |_req, _buf, broker| {
            let body = collected_body_for_route.clone();
            let last = saw_last_part_for_route.clone();
            let trailer = trailer_value_for_route.clone();
            let broker_for_slot = broker.clone();
            broker
                .borrow_mut()
                .received_body_data
                .connect(None, move |(chunk, is_last)| {
                    body.borrow_mut().extend_from_slice(chunk);
                    if *is_last {
                        last.set(true);
                        *trailer.borrow_mut() = broker_for_slot.borrow().trailer("x-checksum", 1);
                        broker_for_slot
                            .borrow_mut()
                            .write_response(Some(b"done"), None, Status::r#Ok, &[]);
                    }
                });
        });
        router
            .add_route(crate::parser::request::Method::Post, "/upload", handler)
            .unwrap();

        let handler_conn = ConnectionHandler::new(
            socket.clone(),
            HttpRequestLimits::default(),
            Rc::new(router),
            &mut wheel,
            Duration::from_secs(5),
            Duration::from_secs(5),
            Rc::new(crate::error::NullErrorHandler),
        );

        client
            .write_all(
                b"POST /upload HTTP/1.1\r\nHost: h\r\nTransfer-Encoding: chunked\r\n\r\n\
3\r\nfoo\r\n3\r\nbar\r\n0\r\nX-Checksum: abc123\r\n\r\n",
            )
            .unwrap();
        std::thread::sleep(Duration::from_millis(20));
        handler_conn.borrow_mut().on_event(poll.registry(), true, false);
        socket.borrow_mut().on_event(poll.registry(), false, true).unwrap();

        let mut buf = [0u8; 256];
        std::thread::sleep(Duration::from_millis(20));
        let n = client.read(&mut buf).unwrap();
        let response = String::from_utf8_lossy(&buf[..n]);

        assert_eq!(b"foobar".to_vec(), *collected_body.borrow());
        assert!(saw_last_part.get());
        assert_eq!(Some(b"abc123".to_vec()), *trailer_value.borrow());
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
        assert!(response.ends_with("done"), "{response}");
    }
}
