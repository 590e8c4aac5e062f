//! Edge-triggered readiness notifier, built directly on `mio::Poll`.
//!
//! Grounded on the teacher's `src/multilistener.rs`, which already drives a
//! single `mio::Poll` + `mio::Events` pair per thread with no cross-thread
//! sharing, and on `examples/original_source/Src/Core/EpollEventNotifier.h`
//! for the `current()`-thread-local-singleton and fatal-on-fd-creation-
//! failure contract (spec.md §4.1, §9 "Thread-local singletons").

use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use std::time::Duration;

use mio::{Events, Poll, Token};

/// One worker's edge-triggered readiness monitor. Not `Send`/`Sync` — per
/// spec.md §5, each worker owns exactly one notifier and it never crosses a
/// thread boundary.
pub struct Notifier {
    poll: Poll,
    events: Events,
}

impl Notifier {
    /// Creates a notifier. Failure to create the underlying epoll
    /// descriptor is a startup precondition failure, not a recoverable
    /// error (spec.md §4.1 "Failure"); callers at process start should
    /// `.expect(...)` this rather than propagate it further, matching the
    /// original's `qFatal`.
    pub fn new(capacity: usize) -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(capacity.max(1)),
        })
    }

    /// The registry used to register/reregister/deregister event sources.
    pub fn registry(&self) -> &mio::Registry {
        self.poll.registry()
    }

    /// Blocks up to `timeout` for readiness, then invokes `on_event` once
    /// per ready token, passing along the registry so a handler can
    /// re-register or deregister itself in response. `timeout = None`
    /// blocks indefinitely. Ordering between simultaneously ready sources
    /// is unspecified, matching spec.md §4.1 — `on_event` must tolerate
    /// sources disabled, re-enabled, or scheduled for deletion by handlers
    /// run earlier in the same batch.
    pub fn dispatch_once(
        &mut self,
        timeout: Option<Duration>,
        mut on_event: impl FnMut(&mio::Registry, Token, bool, bool),
    ) -> io::Result<()> {
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            // EINTR is routine under a debugger or when a signal interrupts
            // the syscall; treat it as "no events this tick."
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e),
        }
        let registry = self.poll.registry();
        for event in self.events.iter() {
            on_event(registry, event.token(), event.is_readable(), event.is_writable());
        }
        Ok(())
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Rc<RefCell<Notifier>>>> = const { RefCell::new(None) };
}

/// Installs `notifier` as this thread's current notifier. Called once by a
/// worker at startup; there is at most one notifier per thread (spec.md
/// §4.1 "current()").
pub fn set_current(notifier: Rc<RefCell<Notifier>>) {
    CURRENT.with(|c| *c.borrow_mut() = Some(notifier));
}

/// Returns this thread's current notifier.
///
/// # Panics
/// Panics if no notifier has been installed via [`set_current`] on this
/// thread. Reaching this without a notifier is a programming error (every
/// worker installs one before running any Object), not a recoverable
/// runtime condition.
pub fn current() -> Rc<RefCell<Notifier>> {
    CURRENT.with(|c| {
        c.borrow()
            .clone()
            .expect("no Notifier installed on this thread; call notifier::set_current first")
    })
}
