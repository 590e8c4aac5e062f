//! Single-shot and periodic timeout scheduling (component J).
//!
//! spec.md §4.11 describes the timer as "typically a timer-fd event source"
//! dispatched through the notifier. `mio` has no portable timer-fd
//! registration, so this follows the precedent `net::tcp_socket`'s
//! `check_timeout` already sets for component F: a deadline checked
//! explicitly once per worker-loop tick rather than armed as its own event
//! source. [`Timer`] holds one connection's deadline and fires its
//! `timeout` signal when checked past it; [`TimerWheel`] is the
//! worker-owned registry that tells the loop how long `Notifier::dispatch_once`
//! should block before the next deadline, then drives every registered
//! timer in one pass.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use crate::object::Signal;

/// One connection's timeout, single-shot or periodic.
pub struct Timer {
    interval: Duration,
    single_shot: bool,
    deadline: Option<Instant>,
    /// Fired when the timer is checked at or past its deadline.
    pub timeout: Signal<()>,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Builds an inactive timer. Call [`start`](Self::start) to arm it.
    pub fn new() -> Self {
        Self {
            interval: Duration::ZERO,
            single_shot: true,
            deadline: None,
            timeout: Signal::new(),
        }
    }

    /// Sets whether the timer re-arms itself after firing. Has no effect on
    /// an already-running timer's current deadline.
    pub fn set_single_shot(&mut self, single_shot: bool) {
        self.single_shot = single_shot;
    }

    /// True if the timer re-arms after each fire.
    pub fn is_single_shot(&self) -> bool {
        self.single_shot
    }

    /// Arms the timer to fire `interval` from `now`, replacing any
    /// previously scheduled deadline.
    pub fn start(&mut self, interval: Duration, now: Instant) {
        self.interval = interval;
        self.deadline = Some(now + interval);
    }

    /// Cancels the timer. The next `dispatch`/`check` will not fire it,
    /// matching spec.md §4.11's "cancellation is immediate."
    pub fn stop(&mut self) {
        self.deadline = None;
    }

    /// True while a deadline is scheduled.
    pub fn is_active(&self) -> bool {
        self.deadline.is_some()
    }

    /// The scheduled deadline, if active.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fires `timeout` and returns `true` if `now` is at or past the
    /// deadline; periodic timers re-arm for another `interval` from `now`,
    /// single-shot timers go inactive.
    fn check(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = if self.single_shot {
                    None
                } else {
                    Some(now + self.interval)
                };
                self.timeout.emit(&());
                true
            }
            _ => false,
        }
    }
}

/// A worker's registry of every connection's active [`Timer`], used to
/// compute the notifier's next poll timeout and to drive all timers in one
/// pass per tick. Holds weak references only — a dropped connection's timer
/// is pruned the next time the wheel is driven, never kept alive by it.
#[derive(Default)]
pub struct TimerWheel {
    timers: Vec<Weak<RefCell<Timer>>>,
}

impl TimerWheel {
    /// Builds an empty wheel.
    pub fn new() -> Self {
        Self { timers: Vec::new() }
    }

    /// Registers `timer` for this wheel to drive. The caller retains
    /// ownership; the wheel only ever observes it through a weak reference.
    pub fn register(&mut self, timer: &Rc<RefCell<Timer>>) {
        self.timers.push(Rc::downgrade(timer));
    }

    /// How long the worker's next `dispatch_once` should block to land on
    /// (or just after) the soonest active deadline, or `None` if no timer
    /// is active — the caller should then block indefinitely.
    pub fn next_timeout(&self, now: Instant) -> Option<Duration> {
        self.timers
            .iter()
            .filter_map(Weak::upgrade)
            .filter_map(|t| t.borrow().deadline())
            .map(|deadline| deadline.saturating_duration_since(now))
            .min()
    }

    /// Fires every registered timer whose deadline has passed and drops
    /// entries whose connection no longer exists.
    pub fn drive(&mut self, now: Instant) {
        self.timers.retain(|weak| {
            let Some(timer) = weak.upgrade() else {
                return false;
            };
            timer.borrow_mut().check(now);
            true
        });
    }
}
