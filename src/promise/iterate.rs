use crate::promise::cell::{Chain, Promise, Resolver};
use crate::runtime::Reactor;

use std::cell::RefCell;
use std::rc::Rc;

/// Repeatedly apply `step` until `until` is satisfied, starting from `seed`.
///
/// `until` is checked before each step, so a seed that already satisfies it
/// fulfills without `step` ever running. A step may return a value or a
/// promise; iteration awaits the latter. Every continuation runs on a fresh
/// reactor tick, so arbitrarily long iterations never grow the stack.
pub fn iterate<T, S, P>(reactor: &Reactor, step: S, until: P, seed: T) -> Promise<T>
where
    T: Clone + 'static,
    S: FnMut(T) -> Chain<T> + 'static,
    P: FnMut(&T) -> bool + 'static,
{
    let (promise, resolver) = Promise::pending(reactor);
    let iteration = Rc::new(RefCell::new(Iteration { step, until }));
    advance(reactor.clone(), iteration, resolver, seed);
    promise
}

struct Iteration<S, P> {
    step: S,
    until: P,
}

fn advance<T, S, P>(
    reactor: Reactor,
    iteration: Rc<RefCell<Iteration<S, P>>>,
    resolver: Resolver<T>,
    value: T,
) where
    T: Clone + 'static,
    S: FnMut(T) -> Chain<T> + 'static,
    P: FnMut(&T) -> bool + 'static,
{
    let schedule = reactor.clone();
    schedule.next_tick(move || {
        if (iteration.borrow_mut().until)(&value) {
            resolver.resolve(value);
            return;
        }
        let outcome = (iteration.borrow_mut().step)(value);
        match outcome {
            Err(fault) => resolver.reject(fault),
            Ok(eventual) => {
                let fail = resolver.clone();
                eventual.into_promise(&reactor).done_or(
                    move |value| advance(reactor, iteration, resolver, value),
                    move |fault| fail.reject(fault),
                );
            }
        }
    });
}
