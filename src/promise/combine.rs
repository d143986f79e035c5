use crate::error::Fault;
use crate::promise::cell::{Chain, Eventual, Promise, Resolver};
use crate::runtime::Reactor;

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;

/// Fulfill with every operand's value, keyed as given, once all fulfill.
///
/// The first rejection rejects the whole join. An empty collection fulfills
/// with an empty map.
pub fn join<K, T>(
    reactor: &Reactor,
    operands: impl IntoIterator<Item = (K, Eventual<T>)>,
) -> Promise<HashMap<K, T>>
where
    K: Hash + Eq + Clone + Debug + 'static,
    T: Clone + 'static,
{
    let operands: Vec<_> = operands.into_iter().collect();
    let (promise, resolver) = Promise::pending(reactor);
    if operands.is_empty() {
        resolver.resolve(HashMap::new());
        return promise;
    }

    struct Gather<K, T> {
        out: HashMap<K, T>,
        remaining: usize,
    }
    let gathered = Rc::new(RefCell::new(Gather {
        out: HashMap::new(),
        remaining: operands.len(),
    }));

    for (key, operand) in operands {
        let gathered = Rc::clone(&gathered);
        let ok = resolver.clone();
        let err = resolver.clone();
        operand.into_promise(reactor).done_or(
            move |value| {
                let mut state = gathered.borrow_mut();
                state.out.insert(key, value);
                state.remaining -= 1;
                if state.remaining == 0 {
                    let out = std::mem::take(&mut state.out);
                    drop(state);
                    ok.resolve(out);
                }
            },
            move |fault| err.reject(fault),
        );
    }
    promise
}

/// Fulfill with a map of already-settled promises once every operand has
/// settled one way or the other. Never rejects.
pub fn settle<K, T>(
    reactor: &Reactor,
    operands: impl IntoIterator<Item = (K, Eventual<T>)>,
) -> Promise<HashMap<K, Promise<T>>>
where
    K: Hash + Eq + Clone + Debug + 'static,
    T: Clone + 'static,
{
    let operands: Vec<_> = operands.into_iter().collect();
    let (promise, resolver) = Promise::pending(reactor);
    if operands.is_empty() {
        resolver.resolve(HashMap::new());
        return promise;
    }

    struct Gather<K, T> {
        out: HashMap<K, Promise<T>>,
        remaining: usize,
    }
    let gathered = Rc::new(RefCell::new(Gather {
        out: HashMap::new(),
        remaining: operands.len(),
    }));

    for (key, operand) in operands {
        let fulfilled = Rc::clone(&gathered);
        let rejected = Rc::clone(&gathered);
        let ok = resolver.clone();
        let err = resolver.clone();
        let value_loop = reactor.clone();
        let fault_loop = reactor.clone();
        let fault_key = key.clone();
        operand.into_promise(reactor).done_or(
            move |value| {
                let mut state = fulfilled.borrow_mut();
                state.out.insert(key, Promise::resolved(&value_loop, value));
                state.remaining -= 1;
                if state.remaining == 0 {
                    let out = std::mem::take(&mut state.out);
                    drop(state);
                    ok.resolve(out);
                }
            },
            move |fault| {
                let mut state = rejected.borrow_mut();
                state
                    .out
                    .insert(fault_key, Promise::rejected(&fault_loop, fault));
                state.remaining -= 1;
                if state.remaining == 0 {
                    let out = std::mem::take(&mut state.out);
                    drop(state);
                    err.resolve(out);
                }
            },
        );
    }
    promise
}

/// Fulfill with the first operand to fulfill.
///
/// Rejects with [`Fault::Multi`] carrying every failure once all operands
/// have rejected, and with a logic fault for an empty collection.
pub fn any<K, T>(
    reactor: &Reactor,
    operands: impl IntoIterator<Item = (K, Eventual<T>)>,
) -> Promise<T>
where
    K: Hash + Eq + Clone + Debug + 'static,
    T: Clone + 'static,
{
    let operands: Vec<_> = operands.into_iter().collect();
    let (promise, resolver) = Promise::pending(reactor);
    if operands.is_empty() {
        resolver.reject(Fault::Logic("any() requires at least one operand"));
        return promise;
    }

    struct Losses {
        errors: Vec<(String, Fault)>,
        remaining: usize,
    }
    let losses = Rc::new(RefCell::new(Losses {
        errors: Vec::new(),
        remaining: operands.len(),
    }));

    for (key, operand) in operands {
        let losses = Rc::clone(&losses);
        let ok = resolver.clone();
        let err = resolver.clone();
        operand.into_promise(reactor).done_or(
            move |value| ok.resolve(value),
            move |fault| {
                let mut state = losses.borrow_mut();
                state.errors.push((format!("{key:?}"), fault));
                state.remaining -= 1;
                if state.remaining == 0 {
                    let errors = std::mem::take(&mut state.errors);
                    drop(state);
                    err.reject(Fault::Multi(errors));
                }
            },
        );
    }
    promise
}

/// Fulfill with the first `count` values, keyed as given.
///
/// Rejects with [`Fault::Multi`] as soon as enough operands have failed that
/// `count` fulfillments can no longer happen. `count == 0` fulfills with an
/// empty map; asking for more fulfillments than there are operands is a
/// logic fault.
pub fn some<K, T>(
    reactor: &Reactor,
    operands: impl IntoIterator<Item = (K, Eventual<T>)>,
    count: usize,
) -> Promise<HashMap<K, T>>
where
    K: Hash + Eq + Clone + Debug + 'static,
    T: Clone + 'static,
{
    let operands: Vec<_> = operands.into_iter().collect();
    let (promise, resolver) = Promise::pending(reactor);
    if count == 0 {
        resolver.resolve(HashMap::new());
        return promise;
    }
    if count > operands.len() {
        resolver.reject(Fault::Logic("some() asked for more fulfillments than operands"));
        return promise;
    }

    struct Tally<K, T> {
        out: HashMap<K, T>,
        errors: Vec<(String, Fault)>,
    }
    let tally = Rc::new(RefCell::new(Tally {
        out: HashMap::new(),
        errors: Vec::new(),
    }));
    let allowed_failures = operands.len() - count;

    for (key, operand) in operands {
        let wins = Rc::clone(&tally);
        let losses = Rc::clone(&tally);
        let ok = resolver.clone();
        let err = resolver.clone();
        let fault_key = format!("{key:?}");
        operand.into_promise(reactor).done_or(
            move |value| {
                let mut state = wins.borrow_mut();
                state.out.insert(key, value);
                if state.out.len() == count {
                    let out = std::mem::take(&mut state.out);
                    drop(state);
                    ok.resolve(out);
                }
            },
            move |fault| {
                let mut state = losses.borrow_mut();
                state.errors.push((fault_key, fault));
                if state.errors.len() > allowed_failures {
                    let errors = std::mem::take(&mut state.errors);
                    drop(state);
                    err.reject(Fault::Multi(errors));
                }
            },
        );
    }
    promise
}

/// Mirror the first operand to settle, whichever way it settles.
///
/// An empty collection is a logic fault: nothing could ever settle it.
pub fn choose<K, T>(
    reactor: &Reactor,
    operands: impl IntoIterator<Item = (K, Eventual<T>)>,
) -> Promise<T>
where
    K: Hash + Eq + Clone + Debug + 'static,
    T: Clone + 'static,
{
    let operands: Vec<_> = operands.into_iter().collect();
    let (promise, resolver) = Promise::pending(reactor);
    if operands.is_empty() {
        resolver.reject(Fault::Logic("choose() requires at least one operand"));
        return promise;
    }
    for (_key, operand) in operands {
        let ok = resolver.clone();
        let err = resolver.clone();
        operand
            .into_promise(reactor)
            .done_or(move |value| ok.resolve(value), move |fault| err.reject(fault));
    }
    promise
}

/// [`join`], transforming each value through `f` as it arrives.
///
/// The first rejection, or the first `Err` from `f`, rejects the result.
pub fn map<K, T, U>(
    reactor: &Reactor,
    operands: impl IntoIterator<Item = (K, Eventual<T>)>,
    f: impl FnMut(T) -> Result<U, Fault> + 'static,
) -> Promise<HashMap<K, U>>
where
    K: Hash + Eq + Clone + Debug + 'static,
    T: Clone + 'static,
    U: Clone + 'static,
{
    let operands: Vec<_> = operands.into_iter().collect();
    let (promise, resolver) = Promise::pending(reactor);
    if operands.is_empty() {
        resolver.resolve(HashMap::new());
        return promise;
    }

    struct Gather<K, U, F> {
        out: HashMap<K, U>,
        remaining: usize,
        f: F,
    }
    let gathered = Rc::new(RefCell::new(Gather {
        out: HashMap::new(),
        remaining: operands.len(),
        f,
    }));

    for (key, operand) in operands {
        let gathered = Rc::clone(&gathered);
        let ok = resolver.clone();
        let err = resolver.clone();
        operand.into_promise(reactor).done_or(
            move |value| {
                let mut state = gathered.borrow_mut();
                match (state.f)(value) {
                    Ok(mapped) => {
                        state.out.insert(key, mapped);
                        state.remaining -= 1;
                        if state.remaining == 0 {
                            let out = std::mem::take(&mut state.out);
                            drop(state);
                            ok.resolve(out);
                        }
                    }
                    Err(fault) => {
                        drop(state);
                        ok.reject(fault);
                    }
                }
            },
            move |fault| err.reject(fault),
        );
    }
    promise
}

/// Left-fold the operands' values through `f`, awaiting each operand (and
/// any promise `f` returns) in input order.
///
/// An empty sequence fulfills with `init`.
pub fn reduce<T, A, F>(
    reactor: &Reactor,
    operands: impl IntoIterator<Item = Eventual<T>>,
    f: F,
    init: A,
) -> Promise<A>
where
    T: Clone + 'static,
    A: Clone + 'static,
    F: FnMut(A, T) -> Chain<A> + 'static,
{
    let (promise, resolver) = Promise::pending(reactor);
    let fold = Rc::new(RefCell::new(Fold {
        queue: operands.into_iter().collect(),
        f,
    }));
    fold_step(reactor.clone(), fold, resolver, init);
    promise
}

struct Fold<T, F> {
    queue: VecDeque<Eventual<T>>,
    f: F,
}

fn fold_step<T, A, F>(
    reactor: Reactor,
    fold: Rc<RefCell<Fold<T, F>>>,
    resolver: Resolver<A>,
    carry: A,
) where
    T: Clone + 'static,
    A: Clone + 'static,
    F: FnMut(A, T) -> Chain<A> + 'static,
{
    let next = fold.borrow_mut().queue.pop_front();
    let Some(operand) = next else {
        resolver.resolve(carry);
        return;
    };

    let on_fault = {
        let resolver = resolver.clone();
        move |fault| resolver.reject(fault)
    };
    let on_value = {
        let fold = Rc::clone(&fold);
        let resolver = resolver.clone();
        let reactor = reactor.clone();
        move |value: T| {
            let outcome = (fold.borrow_mut().f)(carry, value);
            match outcome {
                Err(fault) => resolver.reject(fault),
                Ok(eventual) => {
                    let chained = eventual.into_promise(&reactor);
                    let fail = resolver.clone();
                    chained.done_or(
                        move |carry| fold_step(reactor, fold, resolver, carry),
                        move |fault| fail.reject(fault),
                    );
                }
            }
        }
    };
    operand.into_promise(&reactor).done_or(on_value, on_fault);
}
