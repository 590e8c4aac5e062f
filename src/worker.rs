//! Per-thread worker loop tying the notifier, connection handler
//! repository, and router together.
//!
//! Grounded on the teacher's `src/multilistener.rs` event loop shape (a
//! single `Poll`/`Events` pair driven by one thread, `Slab`-keyed
//! connections, `vacant_entry().key()` read before construction so the
//! connection can be built with its own token) and on
//! `examples/original_source/Src/Server/HttpServer.cpp`'s per-worker
//! structure, which owns one notifier, one connection handler repository,
//! and a shared, read-only router per thread. Accepting the listening
//! socket itself is out of scope (spec.md §1, "the accept-side listening
//! socket... the core consumes an incoming descriptor signal"): callers
//! hand this worker an already-accepted `mio::net::TcpStream` via
//! [`Worker::accept`].

use std::io;
use std::rc::Rc;
use std::time::{Duration, Instant};

use mio::Token;

use crate::connection_handler::{ConnectionHandler, Handler};
use crate::deleter::{self, Deleter};
use crate::error::ErrorHandler;
use crate::handler_repository::HandlerRepository;
use crate::limits::HttpRequestLimits;
use crate::notifier::{self, Notifier};
use crate::router::HttpRequestRouter;
use crate::timer::TimerWheel;

/// Reserved token for component B's wake-up source, chosen the same way the
/// teacher's `src/listener.rs` reserves `WAKE_TOKEN`: from the top of the
/// `usize` space, since `HandlerRepository::next_token` only ever hands out
/// tokens starting at `0`.
const DELETER_TOKEN: Token = Token(usize::MAX);

/// Per-worker tunables that don't vary per connection.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Max simultaneous connections this worker will hold; `0` disables
    /// the limit. Surfaced on [`HandlerRepository::has_capacity`] for an
    /// external listener to consult (spec.md §6 `maxConnectionCount`).
    pub max_connections: usize,
    /// Request limits applied to every connection's parser.
    pub limits: HttpRequestLimits,
    /// How long a connection may sit idle between requests before being
    /// dropped; zero disables.
    pub idle_timeout: Duration,
    /// How long a request in progress may take before being dropped; zero
    /// disables.
    pub request_timeout: Duration,
    /// Expected concurrent readiness events per `dispatch_once` call,
    /// sized for `mio::Events::with_capacity`.
    pub events_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_connections: 0,
            limits: HttpRequestLimits::default(),
            idle_timeout: Duration::from_secs(75),
            request_timeout: Duration::from_secs(60),
            events_capacity: 1024,
        }
    }
}

/// Owns one thread's worth of the core: a [`Notifier`], a
/// [`HandlerRepository`], a shared [`HttpRequestRouter`], and the
/// [`TimerWheel`] driving every connection's idle/request timers.
pub struct Worker {
    notifier: Rc<std::cell::RefCell<Notifier>>,
    deleter: Rc<std::cell::RefCell<Deleter>>,
    handlers: Rc<std::cell::RefCell<HandlerRepository>>,
    router: Rc<HttpRequestRouter<Handler>>,
    timer_wheel: TimerWheel,
    error_handler: Rc<dyn ErrorHandler>,
    config: WorkerConfig,
}

impl Worker {
    /// Builds a worker and installs its notifier and deferred-deletion
    /// queue as this thread's current ones (spec.md §4.1 "current()"; every
    /// `Object` constructed after this call on this thread observes them
    /// via [`notifier::current`]/[`deleter::try_current`]).
    pub fn new(
        router: Rc<HttpRequestRouter<Handler>>,
        error_handler: Rc<dyn ErrorHandler>,
        config: WorkerConfig,
    ) -> io::Result<Self> {
        let notifier = Rc::new(std::cell::RefCell::new(Notifier::new(config.events_capacity)?));
        let deleter = Rc::new(std::cell::RefCell::new(Deleter::new(
            notifier.borrow().registry(),
            DELETER_TOKEN,
        )?));
        notifier::set_current(notifier.clone());
        deleter::set_current(deleter.clone());
        let capacity = if config.max_connections == 0 {
            usize::MAX
        } else {
            config.max_connections
        };
        Ok(Self {
            notifier,
            deleter,
            handlers: HandlerRepository::new(capacity),
            router,
            timer_wheel: TimerWheel::new(),
            error_handler,
            config,
        })
    }

    /// True if this worker can accept another connection right now.
    pub fn has_capacity(&self) -> bool {
        self.handlers.borrow().has_capacity()
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.handlers.borrow().len()
    }

    /// Hands an already-accepted, non-blocking stream to this worker: a
    /// token is reserved from the handler repository (mirroring the
    /// teacher's `vacant_entry().key()` pattern), the socket, parser,
    /// broker, and timer are built against that token, and the resulting
    /// handler is registered so future readiness events for this token
    /// reach it.
    pub fn accept(&mut self, stream: mio::net::TcpStream) -> io::Result<Token> {
        let token = self.handlers.borrow_mut().next_token();
        let socket = Rc::new(std::cell::RefCell::new(crate::net::tcp_socket::TcpSocket::accept_into(
            stream,
            token,
            self.notifier.borrow().registry(),
        )?));
        let handler = ConnectionHandler::new(
            socket,
            self.config.limits.clone(),
            self.router.clone(),
            &mut self.timer_wheel,
            self.config.request_timeout,
            self.config.idle_timeout,
            self.error_handler.clone(),
        );
        HandlerRepository::add(&self.handlers, token, handler);
        Ok(token)
    }

    /// Begins graceful shutdown: every live connection is told to finish,
    /// and no further connections will be accepted
    /// ([`has_capacity`](Self::has_capacity) returns `false` from this
    /// point on).
    pub fn stop(&mut self) {
        self.handlers.borrow_mut().stop();
    }

    /// True once every connection present when [`stop`](Self::stop) was
    /// called has finished and the repository has emitted `stopped`.
    pub fn is_stopped(&self) -> bool {
        self.handlers.borrow().is_empty()
    }

    /// Runs one iteration of the worker loop: blocks for readiness up to
    /// the soonest active timer deadline (or indefinitely if none), then
    /// dispatches ready events to their connection handlers and drives
    /// every timer. Returns after one `dispatch_once` call; callers loop
    /// this themselves so they retain control over interleaving with
    /// accepting new connections.
    pub fn run_once(&mut self) -> io::Result<()> {
        let now = Instant::now();
        let timeout = self.timer_wheel.next_timeout(now);
        let handlers = self.handlers.clone();
        let notifier = self.notifier.clone();
        let deleter = self.deleter.clone();
        notifier.borrow_mut().dispatch_once(timeout, |registry, token, readable, writable| {
            if token == DELETER_TOKEN {
                deleter.borrow_mut().on_event();
                return;
            }
            if let Some(handler) = handlers.borrow().get(token) {
                handler.borrow_mut().on_event(registry, readable, writable);
            }
        })?;
        let now = Instant::now();
        self.timer_wheel.drive(now);
        let registry_guard = self.notifier.borrow();
        let registry = registry_guard.registry();
        for handler in self.handlers.borrow().iter() {
            handler.borrow_mut().check_timeout(now, registry);
        }
        Ok(())
    }
}
