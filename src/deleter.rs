//! Defers object destruction until a safe point in the notifier loop.
//!
//! Grounded on `examples/original_source/Src/Core/EpollObjectDeleter.{h,cpp}`:
//! an event source backed by a signaling descriptor that, once woken, drains
//! a pending list in insertion order. The original uses a Linux `eventfd`;
//! this port uses a `mio::Waker` registered on the worker's own notifier,
//! which is the portable primitive the teacher already depends on for
//! exactly this kind of "wake my own poll loop" signal (`src/listener.rs`'s
//! `WAKE_TOKEN`).

use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use mio::{Registry, Token};

/// Anything that can be handed to [`Deleter::schedule_for_deletion`]. Any
/// `Rc<RefCell<T>>` qualifies once wrapped via [`Deleter::handle_of`].
pub type DeletionHandle = Rc<dyn Any>;

/// Per-worker deferred-deletion queue.
pub struct Deleter {
    waker: Arc<mio::Waker>,
    pending: VecDeque<DeletionHandle>,
    signaled: bool,
}

impl Deleter {
    /// Registers a wake-up source at `token` on `registry`. Failure to
    /// create the underlying waker is a startup precondition failure
    /// (spec.md §4.1's fatal-error clause applies equally to B, which is
    /// itself an event source).
    pub fn new(registry: &Registry, token: Token) -> io::Result<Self> {
        Ok(Self {
            waker: Arc::new(mio::Waker::new(registry, token)?),
            pending: VecDeque::new(),
            signaled: false,
        })
    }

    /// Wraps `rc` as an opaque handle suitable for
    /// [`schedule_for_deletion`](Self::schedule_for_deletion).
    pub fn handle_of<T: 'static>(rc: &Rc<T>) -> DeletionHandle {
        rc.clone()
    }

    /// Enqueues `object` for destruction at the next safe point. Idempotent:
    /// an object already pending is not added twice. Signals the waker
    /// exactly once per armed state, matching the original's `set()`
    /// "idempotent while signaled" contract.
    pub fn schedule_for_deletion(&mut self, object: DeletionHandle) -> io::Result<()> {
        if self.pending.iter().any(|o| Rc::ptr_eq(o, &object)) {
            return Ok(());
        }
        self.set()?;
        self.pending.push_back(object);
        Ok(())
    }

    fn set(&mut self) -> io::Result<()> {
        if self.signaled {
            return Ok(());
        }
        self.signaled = true;
        self.waker.wake()
    }

    /// Drains the pending list in insertion order, dropping each object
    /// (running its destructor) as it is visited. Safe against re-entry: a
    /// `Drop` impl that itself schedules further objects appends to the
    /// same queue, and `pop_front` naturally picks those up within this
    /// same call rather than requiring a second dispatch, since the queue's
    /// length is re-checked on every iteration.
    pub fn on_event(&mut self) {
        self.signaled = false;
        while let Some(object) = self.pending.pop_front() {
            drop(object);
        }
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Rc<RefCell<Deleter>>>> = const { RefCell::new(None) };
}

/// Installs `deleter` as this thread's current deferred-deletion queue.
pub fn set_current(deleter: Rc<RefCell<Deleter>>) {
    CURRENT.with(|c| *c.borrow_mut() = Some(deleter));
}

/// Returns a weak handle to this thread's deleter, if one has been
/// installed. Unlike [`crate::notifier::current`], this does not panic when
/// absent — tests frequently construct Objects without a full worker loop
/// behind them, and those Objects are simply dropped immediately rather
/// than deferred.
pub fn try_current() -> Option<Rc<RefCell<Deleter>>> {
    CURRENT.with(|c| c.borrow().clone())
}

/// Weak variant, useful for holding onto "the current deleter, if any" from
/// a struct without extending its lifetime.
pub fn try_current_weak() -> Option<Weak<RefCell<Deleter>>> {
    try_current().map(|rc| Rc::downgrade(&rc))
}

#[cfg(test)]
mod test {
    use super::*;

    struct DropRecorder(Rc<RefCell<Vec<u32>>>, u32);

    impl Drop for DropRecorder {
        fn drop(&mut self) {
            self.0.borrow_mut().push(self.1);
        }
    }

    fn new_deleter_for_test() -> (Rc<RefCell<Deleter>>, mio::Poll) {
        let poll = mio::Poll::new().unwrap();
        let deleter = Deleter::new(poll.registry(), Token(0)).unwrap();
        (Rc::new(RefCell::new(deleter)), poll)
    }

    #[test]
    fn scheduled_objects_drop_in_insertion_order_on_event() {
        let (deleter, _poll) = new_deleter_for_test();
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = Rc::new(DropRecorder(log.clone(), 1));
        let b = Rc::new(DropRecorder(log.clone(), 2));
        deleter
            .borrow_mut()
            .schedule_for_deletion(Deleter::handle_of(&a))
            .unwrap();
        deleter
            .borrow_mut()
            .schedule_for_deletion(Deleter::handle_of(&b))
            .unwrap();
        drop(a);
        drop(b);
        deleter.borrow_mut().on_event();
        assert_eq!(vec![1, 2], *log.borrow());
    }

    #[test]
    fn scheduling_the_same_object_twice_only_enqueues_once() {
        let (deleter, _poll) = new_deleter_for_test();
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = Rc::new(DropRecorder(log.clone(), 1));
        let handle = Deleter::handle_of(&a);
        deleter
            .borrow_mut()
            .schedule_for_deletion(handle.clone())
            .unwrap();
        deleter.borrow_mut().schedule_for_deletion(handle).unwrap();
        assert_eq!(1, deleter.borrow().pending.len());
    }

    #[test]
    fn reentrant_scheduling_during_drop_is_still_drained() {
        let (deleter, _poll) = new_deleter_for_test();
        let log = Rc::new(RefCell::new(Vec::new()));

        struct Chained {
            log: Rc<RefCell<Vec<u32>>>,
            deleter: Rc<RefCell<Deleter>>,
            next: RefCell<Option<Rc<DropRecorder>>>,
        }
        impl Drop for Chained {
            fn drop(&mut self) {
                self.log.borrow_mut().push(0);
                if let Some(next) = self.next.borrow_mut().take() {
                    self.deleter
                        .borrow_mut()
                        .schedule_for_deletion(Deleter::handle_of(&next))
                        .unwrap();
                }
            }
        }

        let tail = Rc::new(DropRecorder(log.clone(), 99));
        let head = Rc::new(Chained {
            log: log.clone(),
            deleter: deleter.clone(),
            next: RefCell::new(Some(tail)),
        });
        deleter
            .borrow_mut()
            .schedule_for_deletion(Deleter::handle_of(&head))
            .unwrap();
        drop(head);
        deleter.borrow_mut().on_event();
        assert_eq!(vec![0, 99], *log.borrow());
    }
}
