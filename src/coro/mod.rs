//! The coroutine adapter.
//!
//! A [`Coroutine`] is a resumable computation that yields promises-or-values
//! and eventually returns. [`spawn`] drives one to completion: each yielded
//! promise is awaited and its value fed back in as the result of the yield,
//! each rejection is injected at the yield point (the computation may treat
//! it as caught and continue), and the whole run is reified as a single
//! promise of the final return.
//!
//! Rust has no stable generators, so the computation is written as a step
//! function over [`Step`]. Closures work directly via [`from_fn`]:
//!
//! ```no_run
//! use rill::coro::{self, Step};
//! use rill::promise::Eventual;
//! use rill::runtime::Reactor;
//!
//! let reactor = Reactor::new().unwrap();
//! let mut state = 0;
//! let total = coro::spawn(
//!     &reactor,
//!     coro::from_fn(move |input: Option<Result<i32, _>>| {
//!         if let Some(Ok(value)) = input {
//!             state += value;
//!         }
//!         if state >= 10 {
//!             Step::Done(state)
//!         } else {
//!             Step::Yield(Eventual::Ready(state + 1))
//!         }
//!     }),
//! );
//! reactor.run();
//! assert_eq!(total.result().unwrap(), 15);
//! ```

use crate::error::Fault;
use crate::promise::{Eventual, Promise, Resolver};
use crate::runtime::Reactor;

use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

/// One move of a resumable computation.
pub enum Step<Y, R> {
    /// Suspend on a promise-or-value; its outcome becomes the next input.
    Yield(Eventual<Y>),
    /// The computation finished with a value.
    Done(R),
    /// The computation failed; the fault propagates out of the adapter.
    Fail(Fault),
}

/// A resumable computation driven by [`spawn`].
///
/// `resume` is first called with `None`; afterwards with the outcome of the
/// previous yield. Returning another [`Step::Yield`] after an `Err` input
/// means the computation caught the fault and keeps going.
pub trait Coroutine {
    /// What the computation suspends on.
    type Yield: Clone + 'static;
    /// What the computation finally produces.
    type Return: Clone + 'static;

    /// Advance to the next suspension point or completion.
    fn resume(&mut self, input: Option<Result<Self::Yield, Fault>>) -> Step<Self::Yield, Self::Return>;
}

/// Wrap a closure as a [`Coroutine`].
pub fn from_fn<Y, R, F>(f: F) -> FnCoroutine<F, Y, R>
where
    Y: Clone + 'static,
    R: Clone + 'static,
    F: FnMut(Option<Result<Y, Fault>>) -> Step<Y, R>,
{
    FnCoroutine {
        f,
        _types: PhantomData,
    }
}

/// A [`Coroutine`] backed by a closure; see [`from_fn`].
pub struct FnCoroutine<F, Y, R> {
    f: F,
    _types: PhantomData<(Y, R)>,
}

impl<F, Y, R> Coroutine for FnCoroutine<F, Y, R>
where
    Y: Clone + 'static,
    R: Clone + 'static,
    F: FnMut(Option<Result<Y, Fault>>) -> Step<Y, R>,
{
    type Yield = Y;
    type Return = R;

    fn resume(&mut self, input: Option<Result<Y, Fault>>) -> Step<Y, R> {
        (self.f)(input)
    }
}

/// Drive a coroutine to completion, reifying the run as a promise.
///
/// Every resume happens on a fresh reactor tick; a computation that yields
/// plain values still hands the loop a chance to dispatch between steps.
/// Cancelling the returned promise cancels whatever the computation is
/// currently awaiting. If the computation catches the injected rejection it
/// keeps running — for cleanup, typically — but its result is discarded,
/// the returned promise having already been rejected by the cancellation.
pub fn spawn<C>(reactor: &Reactor, co: C) -> Promise<C::Return>
where
    C: Coroutine + 'static,
{
    let (promise, resolver) = Promise::pending(reactor);
    let drive = Rc::new(RefCell::new(Drive {
        co,
        awaited: None,
    }));

    let teardown = Rc::clone(&drive);
    resolver.on_cancel(move |reason| {
        if let Some(awaited) = teardown.borrow_mut().awaited.take() {
            awaited.cancel_with(reason.clone());
        }
    });

    advance(reactor.clone(), drive, resolver, None);
    promise
}

struct Drive<C: Coroutine> {
    co: C,
    awaited: Option<Promise<C::Yield>>,
}

fn advance<C>(
    reactor: Reactor,
    drive: Rc<RefCell<Drive<C>>>,
    resolver: Resolver<C::Return>,
    input: Option<Result<C::Yield, Fault>>,
) where
    C: Coroutine + 'static,
{
    let schedule = reactor.clone();
    schedule.next_tick(move || {
        let step = drive.borrow_mut().co.resume(input);
        match step {
            Step::Done(value) => resolver.resolve(value),
            Step::Fail(fault) => resolver.reject(fault),
            Step::Yield(Eventual::Ready(value)) => {
                advance(reactor, drive, resolver, Some(Ok(value)));
            }
            Step::Yield(Eventual::Later(awaited)) => {
                drive.borrow_mut().awaited = Some(awaited.clone());
                let on_value = {
                    let reactor = reactor.clone();
                    let drive = Rc::clone(&drive);
                    let resolver = resolver.clone();
                    move |value| {
                        drive.borrow_mut().awaited = None;
                        advance(reactor, drive, resolver, Some(Ok(value)));
                    }
                };
                let on_fault = move |fault| {
                    drive.borrow_mut().awaited = None;
                    advance(reactor, drive, resolver, Some(Err(fault)));
                };
                awaited.done_or(on_value, on_fault);
            }
        }
    });
}
