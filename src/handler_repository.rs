//! Owns every live connection handler on a worker and drives graceful,
//! repository-wide shutdown (component L′).
//!
//! Grounded on
//! `examples/original_source/Src/Server/ConnectionHandlerRepository.{h,cpp}`:
//! the original keeps handlers in an intrusive doubly-linked list (so a
//! handler can unlink itself in O(1) from its own `finished` slot) and,
//! during `stop()`, walks the list calling `finish()` on each entry while
//! carefully advancing a "next to finish" cursor first so a handler that
//! deletes itself synchronously from inside that call never invalidates the
//! iteration. This crate already has an intrusive-list substitute built for
//! exactly this shape — `slab::Slab`, keyed by the same `mio::Token` the
//! notifier demultiplexes events by — so handlers are stored there instead;
//! the "advance the cursor before calling" discipline is preserved
//! literally in [`HandlerRepository::stop`].

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use mio::Token;
use slab::Slab;

use crate::connection_handler::ConnectionHandler;
use crate::object::Signal;

/// The live set of per-connection handlers for one worker.
pub struct HandlerRepository {
    handlers: Slab<Rc<RefCell<ConnectionHandler>>>,
    capacity: usize,
    stopping: bool,
    /// Fired once every handler present when [`stop`](Self::stop) was
    /// called has reported `finished`.
    pub stopped: Signal<()>,
}

impl HandlerRepository {
    /// Builds a repository that refuses new connections once `capacity`
    /// live handlers are held, mirroring
    /// `ConnectionHandlerRepository::handlerCount()` gating the listener's
    /// accept loop in the original. Wrapped in `Rc<RefCell<_>>` immediately
    /// since [`add`](Self::add) needs a weak handle back to itself to wire
    /// up automatic removal.
    pub fn new(capacity: usize) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            handlers: Slab::new(),
            capacity,
            stopping: false,
            stopped: Signal::new(),
        }))
    }

    /// Number of live handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True if there are no live handlers.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Looks up the handler keyed by `token`, if any.
    pub fn get(&self, token: Token) -> Option<Rc<RefCell<ConnectionHandler>>> {
        self.handlers.get(token.0).cloned()
    }

    /// Iterates over every live handler, for the worker loop to drive
    /// timers across all connections each tick.
    pub fn iter(&self) -> impl Iterator<Item = &Rc<RefCell<ConnectionHandler>>> {
        self.handlers.iter().map(|(_, h)| h)
    }

    /// True if another connection can be accepted right now.
    pub fn has_capacity(&self) -> bool {
        !self.stopping && self.handlers.len() < self.capacity
    }

    /// The token the next [`add`](Self::add) call will land on, mirroring
    /// the teacher's `multilistener.rs` accept loop
    /// (`self.connections.vacant_entry()` read for its key before the
    /// connection is built, then inserted by a plain `insert` once
    /// construction — which needs the token — is done). The caller must
    /// build its socket and handler with this token and call `add` before
    /// any other handler is added, or the reservation is stale.
    pub fn next_token(&mut self) -> Token {
        Token(self.handlers.vacant_entry().key())
    }

    /// Takes ownership of `handler`, keyed by its socket's token, and
    /// connects its `finished` signal to remove it from `repo` once it
    /// disconnects — the Rust stand-in for the original's handler
    /// unlinking itself from the intrusive list.
    pub fn add(repo: &Rc<RefCell<Self>>, token: Token, handler: Rc<RefCell<ConnectionHandler>>) {
        let weak_repo: Weak<RefCell<Self>> = Rc::downgrade(repo);
        handler.borrow_mut().finished.connect(None, move |finished_token| {
            if let Some(repo) = weak_repo.upgrade() {
                repo.borrow_mut().remove(*finished_token);
            }
        });
        let key = repo.borrow_mut().handlers.insert(handler);
        debug_assert_eq!(token.0, key, "handler inserted at a different key than its socket's token");
    }

    /// Removes the handler keyed by `token`, if present, and emits `stopped`
    /// if this repository is mid-shutdown and just lost its last handler.
    pub fn remove(&mut self, token: Token) -> Option<Rc<RefCell<ConnectionHandler>>> {
        let removed = if self.handlers.contains(token.0) {
            Some(self.handlers.remove(token.0))
        } else {
            None
        };
        if self.stopping && self.handlers.is_empty() {
            self.stopped.emit(&());
        }
        removed
    }

    /// Begins graceful shutdown: every handler present right now is told to
    /// disconnect. Handlers added afterward are unaffected by this call but
    /// [`has_capacity`](Self::has_capacity) will refuse them regardless,
    /// since `stopping` is now set.
    ///
    /// Fetches every key up front before invoking `finish` on each one — a
    /// handler that finishes synchronously during `finish()` removes itself
    /// from the slab immediately via the `finished` connection wired in
    /// [`add`](Self::add), which must not disturb the keys still queued to
    /// visit. This mirrors the original's "advance the cursor first"
    /// discipline for its intrusive list.
    pub fn stop(&mut self) {
        self.stopping = true;
        if self.handlers.is_empty() {
            self.stopped.emit(&());
            return;
        }
        let keys: Vec<usize> = self.handlers.iter().map(|(k, _)| k).collect();
        for key in keys {
            if let Some(handler) = self.handlers.get(key) {
                handler.clone().borrow_mut().finish();
            }
        }
    }
}
