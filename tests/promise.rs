use rill::promise::{Eventual, Promise};
use rill::runtime::Reactor;
use rill::Fault;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

#[test]
fn settles_at_most_once() {
    let reactor = Reactor::new().unwrap();
    let (promise, resolver) = Promise::pending(&reactor);
    resolver.resolve(1);
    resolver.resolve(2);
    resolver.reject(Fault::Logic("too late"));
    reactor.run();
    assert_eq!(promise.result().unwrap(), 1);
}

#[test]
fn observers_run_after_the_settling_caller_finishes() {
    let reactor = Reactor::new().unwrap();
    let (promise, resolver) = Promise::pending(&reactor);
    let log = Rc::new(RefCell::new(Vec::new()));

    let observed = log.clone();
    promise.done(move |value| observed.borrow_mut().push(format!("observed {value}")));

    let settled = log.clone();
    reactor.next_tick(move || {
        resolver.resolve(7);
        settled.borrow_mut().push("settle call returned".to_string());
    });

    reactor.run();
    assert_eq!(
        *log.borrow(),
        vec!["settle call returned".to_string(), "observed 7".to_string()]
    );
}

#[test]
fn observers_fire_in_registration_order() {
    let reactor = Reactor::new().unwrap();
    let (promise, resolver) = Promise::pending(&reactor);
    let log = Rc::new(RefCell::new(Vec::new()));
    for name in ["first", "second", "third"] {
        let log = log.clone();
        promise.done(move |_| log.borrow_mut().push(name));
    }
    resolver.resolve(());
    reactor.run();
    assert_eq!(*log.borrow(), vec!["first", "second", "third"]);
}

#[test]
fn late_observers_still_run_on_a_tick() {
    let reactor = Reactor::new().unwrap();
    let promise = Promise::resolved(&reactor, 41);
    let seen = Rc::new(RefCell::new(None));
    let slot = seen.clone();
    promise.done(move |value| *slot.borrow_mut() = Some(value));
    assert!(seen.borrow().is_none());
    reactor.run();
    assert_eq!(*seen.borrow(), Some(41));
}

#[test]
fn then_is_an_identity_over_fulfilled_values() {
    let reactor = Reactor::new().unwrap();
    let promise = Promise::resolved(&reactor, 5);
    let same = promise.then(|value| Ok(Eventual::Ready(value)));
    reactor.run();
    assert_eq!(same.result(), promise.result());
}

#[test]
fn then_chains_through_a_returned_promise() {
    let reactor = Reactor::new().unwrap();
    let (inner, inner_resolver) = Promise::pending(&reactor);
    let chained = Promise::resolved(&reactor, 3)
        .then(move |value| Ok(Eventual::Later(inner.then(move |more| Ok(Eventual::Ready(value + more))))));
    inner_resolver.resolve(4);
    reactor.run();
    assert_eq!(chained.result().unwrap(), 7);
}

#[test]
fn a_failing_handler_rejects_the_child() {
    let reactor = Reactor::new().unwrap();
    let child: Promise<i32> =
        Promise::resolved(&reactor, 1).then(|_| Err(Fault::Logic("handler refused")));
    reactor.run();
    assert_eq!(child.result(), Err(Fault::Logic("handler refused")));
}

#[test]
fn rejection_passes_through_then_untouched() {
    let reactor = Reactor::new().unwrap();
    let parent: Promise<i32> = Promise::rejected(&reactor, Fault::Timeout);
    let touched = Rc::new(RefCell::new(false));
    let flag = touched.clone();
    let child = parent.then(move |value| {
        *flag.borrow_mut() = true;
        Ok(Eventual::Ready(value))
    });
    reactor.run();
    assert_eq!(child.result(), Err(Fault::Timeout));
    assert!(!*touched.borrow());
}

#[test]
fn rescue_recovers_from_rejection() {
    let reactor = Reactor::new().unwrap();
    let recovered = Promise::<i32>::rejected(&reactor, Fault::Timeout)
        .rescue(|_| Ok(Eventual::Ready(0)));
    reactor.run();
    assert_eq!(recovered.result().unwrap(), 0);
}

#[test]
fn deep_then_chain_resolves_iteratively() {
    let reactor = Reactor::new().unwrap();
    let (head, resolver) = Promise::pending(&reactor);
    let mut tail = head;
    for _ in 0..10_000 {
        tail = tail.then(|value: u32| Ok(Eventual::Ready(value + 1)));
    }
    resolver.resolve(0);
    reactor.run();
    assert_eq!(tail.result().unwrap(), 10_000);
}

#[test]
fn cancelling_every_child_cancels_the_parent() {
    let reactor = Reactor::new().unwrap();
    let (parent, _resolver) = Promise::<i32>::pending(&reactor);
    let first = parent.then(|value| Ok(Eventual::Ready(value)));
    let second = parent.then(|value| Ok(Eventual::Ready(value)));

    first.cancel();
    assert!(parent.is_pending());

    second.cancel();
    reactor.run();
    assert_eq!(parent.result(), Err(Fault::Cancelled));
    assert_eq!(first.result(), Err(Fault::Cancelled));
    assert_eq!(second.result(), Err(Fault::Cancelled));
}

#[test]
fn cancel_on_a_settled_promise_is_a_no_op() {
    let reactor = Reactor::new().unwrap();
    let promise = Promise::resolved(&reactor, 9);
    promise.cancel();
    reactor.run();
    assert_eq!(promise.result().unwrap(), 9);
}

#[test]
fn cancellation_runs_the_hook_with_the_reason() {
    let reactor = Reactor::new().unwrap();
    let heard = Rc::new(RefCell::new(None));
    let slot = heard.clone();
    let promise: Promise<i32> = Promise::new(&reactor, |resolver| {
        resolver.on_cancel(move |reason| *slot.borrow_mut() = Some(reason.clone()));
        Ok(())
    });
    promise.cancel_with(Fault::Logic("shutting down"));
    reactor.run();
    assert_eq!(*heard.borrow(), Some(Fault::Logic("shutting down")));
    assert_eq!(promise.result(), Err(Fault::Logic("shutting down")));
}

#[test]
fn resolving_with_itself_is_a_circular_reference() {
    let reactor = Reactor::new().unwrap();
    let (promise, resolver) = Promise::<i32>::pending(&reactor);
    resolver.resolve(promise.clone());
    reactor.run();
    assert_eq!(promise.result(), Err(Fault::CircularReference));
}

#[test]
fn a_following_cycle_is_detected_at_resolution() {
    let reactor = Reactor::new().unwrap();
    let (a, resolve_a) = Promise::<i32>::pending(&reactor);
    let (b, resolve_b) = Promise::<i32>::pending(&reactor);
    resolve_a.resolve(b.clone());
    resolve_b.resolve(a.clone());
    reactor.run();
    assert_eq!(b.result(), Err(Fault::CircularReference));
    assert_eq!(a.result(), Err(Fault::CircularReference));
}

#[test]
fn timeout_zero_rejects_a_still_pending_parent() {
    let reactor = Reactor::new().unwrap();
    let (parent, _resolver) = Promise::<i32>::pending(&reactor);
    let timed = parent.timeout(Duration::ZERO);
    reactor.run();
    assert_eq!(timed.result(), Err(Fault::Timeout));
}

#[test]
fn timeout_mirrors_a_prompt_parent_and_disarms_its_timer() {
    let reactor = Reactor::new().unwrap();
    let (parent, resolver) = Promise::pending(&reactor);
    let timed = parent.timeout(Duration::from_secs(5));
    resolver.resolve("quick");
    let started = Instant::now();
    reactor.run();
    // The run returning promptly is the proof the timer was cancelled.
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(timed.result().unwrap(), "quick");
}

#[test]
fn delay_holds_the_value_back() {
    let reactor = Reactor::new().unwrap();
    let pause = Duration::from_millis(30);
    let delayed = Promise::resolved(&reactor, 11).delay(pause);
    let started = Instant::now();
    reactor.run();
    assert!(started.elapsed() >= pause);
    assert_eq!(delayed.result().unwrap(), 11);
}

#[test]
fn delay_mirrors_rejection_immediately() {
    let reactor = Reactor::new().unwrap();
    let delayed = Promise::<i32>::rejected(&reactor, Fault::Timeout).delay(Duration::from_secs(5));
    let started = Instant::now();
    reactor.run();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(delayed.result(), Err(Fault::Timeout));
}

#[test]
fn unhandled_terminal_rejection_reaches_the_fatal_hook() {
    let reactor = Reactor::new().unwrap();
    let surfaced = Rc::new(RefCell::new(Vec::new()));
    let sink = surfaced.clone();
    reactor.set_fatal_handler(move |fault| sink.borrow_mut().push(fault));

    Promise::<i32>::rejected(&reactor, Fault::Logic("nobody listening")).done(|_| {});
    reactor.run();
    assert_eq!(*surfaced.borrow(), vec![Fault::Logic("nobody listening")]);
}

#[test]
fn a_producer_error_rejects_the_promise() {
    let reactor = Reactor::new().unwrap();
    let promise: Promise<i32> = Promise::new(&reactor, |_| Err(Fault::Logic("no can do")));
    reactor.run();
    assert_eq!(promise.result(), Err(Fault::Logic("no can do")));
}

#[test]
fn result_on_a_pending_promise_is_unresolved() {
    let reactor = Reactor::new().unwrap();
    let (promise, _resolver) = Promise::<i32>::pending(&reactor);
    assert_eq!(promise.result(), Err(Fault::Unresolved));
    assert!(promise.is_pending());
}

#[test]
fn after_otherwise_and_always_leave_the_outcome_alone() {
    let reactor = Reactor::new().unwrap();
    let log = Rc::new(RefCell::new(Vec::new()));

    let on_value = log.clone();
    let on_either = log.clone();
    let fulfilled = Promise::resolved(&reactor, 2)
        .after(move |value| on_value.borrow_mut().push(format!("saw {value}")))
        .always(move || on_either.borrow_mut().push("finished".to_string()));

    let on_fault = log.clone();
    let rejected = Promise::<i32>::rejected(&reactor, Fault::Timeout)
        .otherwise(move |fault| on_fault.borrow_mut().push(format!("failed: {fault}")));

    reactor.run();
    assert_eq!(fulfilled.result().unwrap(), 2);
    assert_eq!(rejected.result(), Err(Fault::Timeout));
    assert_eq!(
        *log.borrow(),
        vec![
            "saw 2".to_string(),
            "failed: operation timed out".to_string(),
            "finished".to_string()
        ]
    );
}
