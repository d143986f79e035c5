use crate::error::Fault;
use crate::runtime::timer::{TimerHandle, Timers};

use mio::event::Source;
use mio::{Events, Interest, Poll, Token};
use slab::Slab;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant};

pub(crate) type Thunk = Box<dyn FnOnce()>;

/// A key for a registered I/O source, which is an index into the
/// `Slab<Registered>` in the reactor.
#[repr(transparent)]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) struct IoKey(usize);

/// The single-threaded event loop.
///
/// A `Reactor` is a cheap handle over shared state; cloning it hands out
/// another reference to the same loop. Everything in this crate that needs to
/// schedule work — promise settlement, timers, readiness callbacks — borrows
/// one of these handles explicitly. There is no hidden global.
#[derive(Clone)]
pub struct Reactor {
    inner: Rc<RefCell<Inner>>,
}

/// The private, internal reactor state - factored out so a handle can take
/// a borrow of the whole.
pub(crate) struct Inner {
    poll: Poll,
    events: Events,
    sources: Slab<Registered>,
    ticks: VecDeque<Thunk>,
    pub(crate) timers: Timers,
    fatal: Option<Box<dyn FnMut(Fault)>>,
    running: bool,
}

/// Per-source readiness bookkeeping.
///
/// The poller is edge-style: an edge observed while nobody is waiting must
/// not be lost, so it is latched until the next waiter arrives.
#[derive(Default)]
struct Registered {
    read_waiter: Option<Thunk>,
    write_waiter: Option<Thunk>,
    read_latch: bool,
    write_latch: bool,
}

impl Registered {
    fn has_waiter(&self) -> bool {
        self.read_waiter.is_some() || self.write_waiter.is_some()
    }
}

impl Reactor {
    /// Create a new event loop.
    pub fn new() -> Result<Self, Fault> {
        let poll = Poll::new()?;
        Ok(Self {
            inner: Rc::new(RefCell::new(Inner {
                poll,
                events: Events::with_capacity(1024),
                sources: Slab::new(),
                ticks: VecDeque::new(),
                timers: Timers::new(),
                fatal: None,
                running: false,
            })),
        })
    }

    /// Enqueue a callback for the next dispatch.
    pub fn next_tick(&self, f: impl FnOnce() + 'static) {
        self.inner.borrow_mut().ticks.push_back(Box::new(f));
    }

    /// Schedule a one-shot timer.
    ///
    /// The returned handle cancels the timer; it holds the reactor weakly and
    /// is a no-op once the loop is gone or the timer has fired.
    pub fn timer(&self, after: Duration, f: impl FnOnce() + 'static) -> TimerHandle {
        let id = self
            .inner
            .borrow_mut()
            .timers
            .insert(Instant::now() + after, Box::new(f));
        TimerHandle::new(id, Rc::downgrade(&self.inner))
    }

    /// Install the handler for rejections nothing else will observe.
    ///
    /// By default an unobserved terminal rejection aborts via panic; a host
    /// can route it elsewhere with this hook.
    pub fn set_fatal_handler(&self, f: impl FnMut(Fault) + 'static) {
        self.inner.borrow_mut().fatal = Some(Box::new(f));
    }

    /// Surface a rejection no observer will ever see.
    pub(crate) fn fatal(&self, fault: Fault) {
        let hook = self.inner.borrow_mut().fatal.take();
        match hook {
            Some(mut hook) => {
                hook(fault);
                self.inner.borrow_mut().fatal = Some(hook);
            }
            None => panic!("unhandled rejection: {fault}"),
        }
    }

    /// Register an I/O source with the poller.
    pub(crate) fn register(
        &self,
        source: &mut impl Source,
        interest: Interest,
    ) -> Result<IoKey, Fault> {
        let mut inner = self.inner.borrow_mut();
        let key = inner.sources.vacant_key();
        inner
            .poll
            .registry()
            .register(source, Token(key), interest)?;
        inner.sources.insert(Registered::default());
        Ok(IoKey(key))
    }

    /// Remove a source from the poller, dropping any waiters.
    pub(crate) fn deregister(&self, key: IoKey, source: &mut impl Source) {
        let mut inner = self.inner.borrow_mut();
        if inner.sources.contains(key.0) {
            let _ = inner.poll.registry().deregister(source);
            inner.sources.remove(key.0);
        }
    }

    /// Run `f` once the source is readable. One-shot; a latched edge fires
    /// the callback on the next tick instead of waiting for the poller.
    pub(crate) fn await_readable(&self, key: IoKey, f: impl FnOnce() + 'static) {
        let mut inner = self.inner.borrow_mut();
        let Some(source) = inner.sources.get_mut(key.0) else {
            return;
        };
        if source.read_latch {
            source.read_latch = false;
            inner.ticks.push_back(Box::new(f));
        } else {
            source.read_waiter = Some(Box::new(f));
        }
    }

    /// Run `f` once the source is writable. See [`Reactor::await_readable`].
    pub(crate) fn await_writable(&self, key: IoKey, f: impl FnOnce() + 'static) {
        let mut inner = self.inner.borrow_mut();
        let Some(source) = inner.sources.get_mut(key.0) else {
            return;
        };
        if source.write_latch {
            source.write_latch = false;
            inner.ticks.push_back(Box::new(f));
        } else {
            source.write_waiter = Some(Box::new(f));
        }
    }

    /// Dispatch until no pending work remains: no queued ticks, no armed
    /// timers, and no readiness waiters.
    ///
    /// # Panics
    ///
    /// Panics when called while the reactor is already running; the loop is
    /// single-threaded and cooperative, so re-entry can only be a bug.
    pub fn run(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.running {
                panic!("cannot run() a reactor from inside its own dispatch");
            }
            inner.running = true;
        }

        loop {
            while let Some(tick) = self.pop_tick() {
                tick();
            }

            let due = self.inner.borrow_mut().timers.take_due(Instant::now());
            if !due.is_empty() {
                for timer in due {
                    timer();
                }
                continue;
            }

            match self.idle_wait() {
                None => break,
                Some(timeout) => self.poll_io(timeout),
            }
        }

        self.inner.borrow_mut().running = false;
    }

    fn pop_tick(&self) -> Option<Thunk> {
        self.inner.borrow_mut().ticks.pop_front()
    }

    /// Decide whether the loop is done or how long it may sleep.
    ///
    /// Returns `None` when no work can ever arrive again, otherwise the poll
    /// timeout (`Some(None)` sleeps until I/O readiness).
    fn idle_wait(&self) -> Option<Option<Duration>> {
        let mut inner = self.inner.borrow_mut();
        if !inner.ticks.is_empty() {
            return Some(Some(Duration::ZERO));
        }
        let has_waiters = inner.sources.iter().any(|(_, s)| s.has_waiter());
        match inner.timers.next_deadline() {
            Some(deadline) => Some(Some(deadline.saturating_duration_since(Instant::now()))),
            None if has_waiters => Some(None),
            None => None,
        }
    }

    fn poll_io(&self, timeout: Option<Duration>) {
        let mut fired: Vec<Thunk> = Vec::new();
        {
            let inner = &mut *self.inner.borrow_mut();
            if let Err(err) = inner.poll.poll(&mut inner.events, timeout) {
                if err.kind() == std::io::ErrorKind::Interrupted {
                    return;
                }
                // A failing poller cannot make progress.
                panic!("reactor poll failed: {err}");
            }
            for event in inner.events.iter() {
                let Some(source) = inner.sources.get_mut(event.token().0) else {
                    continue;
                };
                if event.is_readable() || event.is_read_closed() {
                    match source.read_waiter.take() {
                        Some(waiter) => fired.push(waiter),
                        None => source.read_latch = true,
                    }
                }
                if event.is_writable() || event.is_write_closed() {
                    match source.write_waiter.take() {
                        Some(waiter) => fired.push(waiter),
                        None => source.write_latch = true,
                    }
                }
            }
        }
        for waiter in fired {
            waiter();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_run_in_order() {
        let reactor = Reactor::new().unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for i in 0..4 {
            let seen = seen.clone();
            reactor.next_tick(move || seen.borrow_mut().push(i));
        }
        reactor.run();
        assert_eq!(*seen.borrow(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn a_tick_may_enqueue_another() {
        let reactor = Reactor::new().unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let inner_seen = seen.clone();
        let handle = reactor.clone();
        reactor.next_tick(move || {
            inner_seen.borrow_mut().push("first");
            let late = inner_seen.clone();
            handle.next_tick(move || late.borrow_mut().push("second"));
        });
        reactor.run();
        assert_eq!(*seen.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn timers_fire_in_deadline_order() {
        let reactor = Reactor::new().unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let a = seen.clone();
        let b = seen.clone();
        reactor.timer(Duration::from_millis(20), move || a.borrow_mut().push("late"));
        reactor.timer(Duration::from_millis(5), move || b.borrow_mut().push("early"));
        reactor.run();
        assert_eq!(*seen.borrow(), vec!["early", "late"]);
    }

    #[test]
    fn cancelled_timer_does_not_fire() {
        let reactor = Reactor::new().unwrap();
        let seen = Rc::new(RefCell::new(false));
        let flag = seen.clone();
        let handle = reactor.timer(Duration::from_millis(5), move || *flag.borrow_mut() = true);
        handle.cancel();
        reactor.run();
        assert!(!*seen.borrow());
    }
}
