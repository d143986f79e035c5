use crate::error::Fault;
use crate::runtime::Reactor;

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

/// What a settlement handler hands back: the next value, a promise of it, or
/// a fault. `Err` here is the moral equivalent of throwing from a handler.
pub type Chain<T> = Result<Eventual<T>, Fault>;

/// A value that is either already here or still being produced.
///
/// Resolution, handler returns, combinator operands and coroutine yields all
/// accept either form; `From` lifts both.
pub enum Eventual<T> {
    /// The value itself.
    Ready(T),
    /// A promise that will eventually carry the value.
    Later(Promise<T>),
}

impl<T> From<T> for Eventual<T> {
    fn from(value: T) -> Self {
        Eventual::Ready(value)
    }
}

impl<T> From<Promise<T>> for Eventual<T> {
    fn from(promise: Promise<T>) -> Self {
        Eventual::Later(promise)
    }
}

impl<T: Clone + 'static> Eventual<T> {
    /// Lift into a promise, wrapping a ready value in an already-fulfilled one.
    pub fn into_promise(self, reactor: &Reactor) -> Promise<T> {
        match self {
            Eventual::Ready(value) => Promise::resolved(reactor, value),
            Eventual::Later(promise) => promise,
        }
    }
}

/// A single-assignment cell holding a future value or failure.
///
/// A `Promise<T>` is a cheap cloneable handle; all clones observe the same
/// cell. The cell settles at most once. Observers registered before
/// settlement run exactly once, in registration order, on the tick after the
/// settlement; observers registered afterwards run on the next tick. On
/// settlement the cell drops its observer lists and cancellation hook, so
/// closures that captured the promise do not keep the graph alive.
pub struct Promise<T> {
    cell: Rc<RefCell<Cell<T>>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
        }
    }
}

struct Cell<T> {
    reactor: Reactor,
    state: State<T>,
    /// Dependents created via `then`/`timeout`/`delay` that are still able
    /// to cancel. When the last of them cancels, cancellation propagates
    /// upstream to this cell.
    children: usize,
}

enum State<T> {
    Pending(Waiting<T>),
    Fulfilled(T),
    Rejected(Fault),
    Following(Promise<T>),
}

struct Waiting<T> {
    on_fulfill: Vec<Box<dyn FnOnce(T)>>,
    on_reject: Vec<Box<dyn FnOnce(Fault)>>,
    on_cancel: Option<Box<dyn FnOnce(&Fault)>>,
}

impl<T> Waiting<T> {
    fn new() -> Self {
        Self {
            on_fulfill: Vec::new(),
            on_reject: Vec::new(),
            on_cancel: None,
        }
    }
}

/// The capability pair handed to a promise producer.
///
/// `resolve` and `reject` settle the promise; whichever comes second is a
/// no-op. The resolver keeps the cell alive until the producer is done with
/// it, so a promise whose producer still exists cannot be collected out from
/// under its observers.
pub struct Resolver<T> {
    cell: Rc<RefCell<Cell<T>>>,
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<T: Clone + 'static> Resolver<T> {
    /// Settle with a value, or chase another promise.
    pub fn resolve(&self, value: impl Into<Eventual<T>>) {
        let promise = Promise {
            cell: Rc::clone(&self.cell),
        };
        match value.into() {
            Eventual::Ready(v) => promise.fulfill_value(v),
            Eventual::Later(p) => promise.follow(p),
        }
    }

    /// Settle with a fault.
    pub fn reject(&self, fault: Fault) {
        Promise {
            cell: Rc::clone(&self.cell),
        }
        .reject_value(fault);
    }

    /// Install the hook invoked when the pending promise is cancelled.
    ///
    /// The hook runs before the cancellation rejects the promise; it is
    /// dropped on settlement. Installing a second hook replaces the first.
    pub fn on_cancel(&self, hook: impl FnOnce(&Fault) + 'static) {
        if let State::Pending(waiting) = &mut self.cell.borrow_mut().state {
            waiting.on_cancel = Some(Box::new(hook));
        }
    }
}

impl<T: Clone + 'static> Promise<T> {
    /// A pending promise and the resolver that settles it.
    pub fn pending(reactor: &Reactor) -> (Self, Resolver<T>) {
        let cell = Rc::new(RefCell::new(Cell {
            reactor: reactor.clone(),
            state: State::Pending(Waiting::new()),
            children: 0,
        }));
        (
            Promise {
                cell: Rc::clone(&cell),
            },
            Resolver { cell },
        )
    }

    /// Build a promise from a producer callable.
    ///
    /// The producer may settle immediately, stash the resolver for later, or
    /// return `Err` to reject on the spot.
    pub fn new(
        reactor: &Reactor,
        producer: impl FnOnce(Resolver<T>) -> Result<(), Fault>,
    ) -> Self {
        let (promise, resolver) = Self::pending(reactor);
        if let Err(fault) = producer(resolver.clone()) {
            resolver.reject(fault);
        }
        promise
    }

    /// An already-fulfilled promise.
    pub fn resolved(reactor: &Reactor, value: T) -> Self {
        Promise {
            cell: Rc::new(RefCell::new(Cell {
                reactor: reactor.clone(),
                state: State::Fulfilled(value),
                children: 0,
            })),
        }
    }

    /// An already-rejected promise.
    pub fn rejected(reactor: &Reactor, fault: Fault) -> Self {
        Promise {
            cell: Rc::new(RefCell::new(Cell {
                reactor: reactor.clone(),
                state: State::Rejected(fault),
                children: 0,
            })),
        }
    }

    /// The loop this promise settles through.
    pub(crate) fn reactor(&self) -> Reactor {
        self.cell.borrow().reactor.clone()
    }

    /// Whether the promise (or the end of its following chain) has settled.
    pub fn is_pending(&self) -> bool {
        matches!(self.target().cell.borrow().state, State::Pending(_))
    }

    /// Whether the promise carries a value.
    pub fn is_fulfilled(&self) -> bool {
        matches!(self.target().cell.borrow().state, State::Fulfilled(_))
    }

    /// Whether the promise carries a fault.
    pub fn is_rejected(&self) -> bool {
        matches!(self.target().cell.borrow().state, State::Rejected(_))
    }

    /// The settled outcome, or [`Fault::Unresolved`] while pending.
    pub fn result(&self) -> Result<T, Fault> {
        match &self.target().cell.borrow().state {
            State::Fulfilled(value) => Ok(value.clone()),
            State::Rejected(fault) => Err(fault.clone()),
            _ => Err(Fault::Unresolved),
        }
    }

    /// Derive a child that settles with the handler's return.
    ///
    /// On fulfillment the handler maps the value to a [`Chain`]: a new value,
    /// a promise the child will follow, or a fault. A parent rejection passes
    /// through untouched. Cancelling the child tears down toward the parent
    /// once no other dependents remain.
    pub fn then<U, F>(&self, on_fulfill: F) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Chain<U> + 'static,
    {
        self.derive(
            move |resolver, value| apply(resolver, on_fulfill, value),
            |resolver, fault| resolver.reject(fault),
        )
    }

    /// Derive a child whose rejection handler may recover.
    ///
    /// The counterpart of [`Promise::then`] for the failure path: a parent
    /// fulfillment passes through, a rejection is mapped by the handler.
    pub fn rescue<F>(&self, on_reject: F) -> Promise<T>
    where
        F: FnOnce(Fault) -> Chain<T> + 'static,
    {
        self.derive(
            |resolver, value| resolver.resolve(value),
            move |resolver, fault| apply(resolver, on_reject, fault),
        )
    }

    /// Derive a child mapping both settlement paths.
    pub fn handle<U, FV, FE>(&self, on_fulfill: FV, on_reject: FE) -> Promise<U>
    where
        U: Clone + 'static,
        FV: FnOnce(T) -> Chain<U> + 'static,
        FE: FnOnce(Fault) -> Chain<U> + 'static,
    {
        self.derive(
            move |resolver, value| apply(resolver, on_fulfill, value),
            move |resolver, fault| apply(resolver, on_reject, fault),
        )
    }

    /// Terminal observer for the value; an unhandled rejection is surfaced
    /// through the reactor's fatal hook, which aborts by default.
    ///
    /// This is the end of a chain: unlike [`Promise::then`] it creates no
    /// child, so faults cannot silently pool in an unobserved promise.
    pub fn done(&self, on_fulfill: impl FnOnce(T) + 'static) {
        let reactor = self.reactor();
        self.subscribe(
            Box::new(on_fulfill),
            Box::new(move |fault| reactor.fatal(fault)),
        );
    }

    /// Terminal observer for both paths.
    pub fn done_or(
        &self,
        on_fulfill: impl FnOnce(T) + 'static,
        on_reject: impl FnOnce(Fault) + 'static,
    ) {
        self.subscribe(Box::new(on_fulfill), Box::new(on_reject));
    }

    /// Run `f` on fulfillment without altering the outcome.
    pub fn after(&self, f: impl FnOnce(&T) + 'static) -> Promise<T> {
        self.then(move |value| {
            f(&value);
            Ok(Eventual::Ready(value))
        })
    }

    /// Run `f` on rejection without altering the outcome.
    pub fn otherwise(&self, f: impl FnOnce(&Fault) + 'static) -> Promise<T> {
        self.rescue(move |fault| {
            f(&fault);
            Err(fault)
        })
    }

    /// Run `f` on either settlement without altering the outcome.
    pub fn always(&self, f: impl FnOnce() + 'static) -> Promise<T> {
        let f = Rc::new(RefCell::new(Some(Box::new(f) as Box<dyn FnOnce()>)));
        let g = Rc::clone(&f);
        self.handle(
            move |value| {
                if let Some(f) = f.borrow_mut().take() {
                    f();
                }
                Ok(Eventual::Ready(value))
            },
            move |fault| {
                if let Some(g) = g.borrow_mut().take() {
                    g();
                }
                Err(fault)
            },
        )
    }

    /// Cancel with the default reason.
    pub fn cancel(&self) {
        self.cancel_with(Fault::Cancelled);
    }

    /// Cancel a pending promise: run its cancellation hook, then reject it
    /// with `reason`. Forwarded through a following chain; a no-op once
    /// settled.
    pub fn cancel_with(&self, reason: Fault) {
        enum Action<T> {
            Forward(Promise<T>),
            Reject(Option<Box<dyn FnOnce(&Fault)>>),
            Nothing,
        }
        let action = {
            let mut cell = self.cell.borrow_mut();
            match &mut cell.state {
                State::Following(target) => Action::Forward(target.clone()),
                State::Pending(waiting) => Action::Reject(waiting.on_cancel.take()),
                _ => Action::Nothing,
            }
        };
        match action {
            Action::Forward(target) => target.cancel_with(reason),
            Action::Reject(hook) => {
                if let Some(hook) = hook {
                    hook(&reason);
                }
                self.reject_value(reason);
            }
            Action::Nothing => {}
        }
    }

    /// A child that mirrors the parent, unless the parent is still pending
    /// after `deadline`; then the child rejects with [`Fault::Timeout`].
    pub fn timeout(&self, deadline: Duration) -> Promise<T> {
        self.timeout_with(deadline, Fault::Timeout)
    }

    /// [`Promise::timeout`] with a caller-chosen fault.
    pub fn timeout_with(&self, deadline: Duration, fault: Fault) -> Promise<T> {
        let reactor = self.reactor();
        let (child, resolver) = Promise::pending(&reactor);
        self.adopt(&resolver);

        let alarm = resolver.clone();
        let timer = reactor.timer(deadline, move || alarm.reject(fault));

        // The timer must not outlive the child's settlement, whichever way
        // it settles.
        let armed = timer.clone();
        let disarmed = timer.clone();
        child.subscribe(
            Box::new(move |_| armed.cancel()),
            Box::new(move |_| disarmed.cancel()),
        );

        let parent = self.downgrade();
        resolver.on_cancel(move |reason| {
            timer.cancel();
            parent.child_cancelled(reason.clone());
        });

        let ok = resolver.clone();
        let err = resolver;
        self.subscribe(
            Box::new(move |value| ok.resolve(value)),
            Box::new(move |fault| err.reject(fault)),
        );
        child
    }

    /// A child that settles with the parent's value `pause` after the parent
    /// fulfills. A parent rejection is mirrored immediately.
    pub fn delay(&self, pause: Duration) -> Promise<T> {
        let reactor = self.reactor();
        let (child, resolver) = Promise::pending(&reactor);
        self.adopt(&resolver);

        let armed: Rc<RefCell<Option<crate::runtime::TimerHandle>>> =
            Rc::new(RefCell::new(None));

        let parent = self.downgrade();
        let disarm = Rc::clone(&armed);
        resolver.on_cancel(move |reason| {
            if let Some(timer) = disarm.borrow_mut().take() {
                timer.cancel();
            }
            parent.child_cancelled(reason.clone());
        });

        let ok = resolver.clone();
        let err = resolver;
        let loop_handle = reactor.clone();
        self.subscribe(
            Box::new(move |value| {
                let timer = loop_handle.timer(pause, move || ok.resolve(value));
                *armed.borrow_mut() = Some(timer);
            }),
            Box::new(move |fault| err.reject(fault)),
        );
        child
    }

    /// Shared scaffolding for `then`/`rescue`/`handle`: make a child, count
    /// it as a dependent, wire cancellation back to the parent, and route the
    /// parent's settlement through `on_fulfill`/`on_reject`.
    fn derive<U>(
        &self,
        on_fulfill: impl FnOnce(Resolver<U>, T) + 'static,
        on_reject: impl FnOnce(Resolver<U>, Fault) + 'static,
    ) -> Promise<U>
    where
        U: Clone + 'static,
    {
        let reactor = self.reactor();
        let (child, resolver) = Promise::pending(&reactor);
        self.adopt(&resolver);

        let parent = self.downgrade();
        resolver.on_cancel(move |reason| parent.child_cancelled(reason.clone()));

        let ok = resolver.clone();
        let err = resolver;
        self.subscribe(
            Box::new(move |value| on_fulfill(ok, value)),
            Box::new(move |fault| on_reject(err, fault)),
        );
        child
    }

    /// Count a newly derived dependent.
    fn adopt<U>(&self, _child: &Resolver<U>) {
        self.cell.borrow_mut().children += 1;
    }

    fn downgrade(&self) -> ParentRef<T> {
        ParentRef {
            cell: Rc::downgrade(&self.cell),
        }
    }

    /// Register a fulfillment/rejection observer pair at the end of the
    /// following chain. Exactly one of the two will run, on a tick after
    /// settlement.
    pub(crate) fn subscribe(
        &self,
        on_fulfill: Box<dyn FnOnce(T)>,
        on_reject: Box<dyn FnOnce(Fault)>,
    ) {
        let target = self.target();
        let mut cell = target.cell.borrow_mut();
        let reactor = cell.reactor.clone();
        match &mut cell.state {
            State::Pending(waiting) => {
                waiting.on_fulfill.push(on_fulfill);
                waiting.on_reject.push(on_reject);
            }
            State::Fulfilled(value) => {
                let value = value.clone();
                drop(cell);
                reactor.next_tick(move || on_fulfill(value));
            }
            State::Rejected(fault) => {
                let fault = fault.clone();
                drop(cell);
                reactor.next_tick(move || on_reject(fault));
            }
            State::Following(_) => unreachable!("target() chases following links"),
        }
    }

    /// Forward whole observer lists, preserving registration order.
    fn subscribe_many(
        &self,
        on_fulfill: Vec<Box<dyn FnOnce(T)>>,
        on_reject: Vec<Box<dyn FnOnce(Fault)>>,
    ) {
        let target = self.target();
        let mut cell = target.cell.borrow_mut();
        let reactor = cell.reactor.clone();
        match &mut cell.state {
            State::Pending(waiting) => {
                waiting.on_fulfill.extend(on_fulfill);
                waiting.on_reject.extend(on_reject);
            }
            State::Fulfilled(value) => {
                let value = value.clone();
                drop(cell);
                reactor.next_tick(move || {
                    for observer in on_fulfill {
                        observer(value.clone());
                    }
                });
            }
            State::Rejected(fault) => {
                let fault = fault.clone();
                drop(cell);
                reactor.next_tick(move || {
                    for observer in on_reject {
                        observer(fault.clone());
                    }
                });
            }
            State::Following(_) => unreachable!("target() chases following links"),
        }
    }

    /// The terminal promise of a following chain (`self` when not following).
    fn target(&self) -> Promise<T> {
        let mut current = self.clone();
        loop {
            let next = match &current.cell.borrow().state {
                State::Following(next) => next.clone(),
                _ => break,
            };
            current = next;
        }
        current
    }

    fn fulfill_value(&self, value: T) {
        let (waiting, reactor) = {
            let mut cell = self.cell.borrow_mut();
            if !matches!(cell.state, State::Pending(_)) {
                return;
            }
            let previous =
                std::mem::replace(&mut cell.state, State::Fulfilled(value.clone()));
            let State::Pending(waiting) = previous else {
                unreachable!("checked pending above");
            };
            (waiting, cell.reactor.clone())
        };
        // The rejection list and the cancel hook die here, breaking any
        // reference cycles their closures formed with this cell.
        if !waiting.on_fulfill.is_empty() {
            reactor.next_tick(move || {
                for observer in waiting.on_fulfill {
                    observer(value.clone());
                }
            });
        }
    }

    fn reject_value(&self, fault: Fault) {
        let (waiting, reactor) = {
            let mut cell = self.cell.borrow_mut();
            if !matches!(cell.state, State::Pending(_)) {
                return;
            }
            let previous =
                std::mem::replace(&mut cell.state, State::Rejected(fault.clone()));
            let State::Pending(waiting) = previous else {
                unreachable!("checked pending above");
            };
            (waiting, cell.reactor.clone())
        };
        if !waiting.on_reject.is_empty() {
            reactor.next_tick(move || {
                for observer in waiting.on_reject {
                    observer(fault.clone());
                }
            });
        }
    }

    /// Enter the following state, forwarding observers to `target`.
    ///
    /// A chain that leads back to this cell rejects with
    /// [`Fault::CircularReference`] instead.
    fn follow(&self, target: Promise<T>) {
        if self.in_chain(&target) {
            self.reject_value(Fault::CircularReference);
            return;
        }
        let waiting = {
            let mut cell = self.cell.borrow_mut();
            if !matches!(cell.state, State::Pending(_)) {
                return;
            }
            let previous =
                std::mem::replace(&mut cell.state, State::Following(target.clone()));
            let State::Pending(waiting) = previous else {
                unreachable!("checked pending above");
            };
            waiting
        };
        // From here on, cancel() forwards to the target; the local hook is
        // gone along with the rest of `waiting`'s bookkeeping.
        target.subscribe_many(waiting.on_fulfill, waiting.on_reject);
    }

    /// Does `target`'s following chain already include this cell?
    fn in_chain(&self, target: &Promise<T>) -> bool {
        let mut current = target.clone();
        loop {
            if Rc::ptr_eq(&self.cell, &current.cell) {
                return true;
            }
            let next = match &current.cell.borrow().state {
                State::Following(next) => next.clone(),
                _ => return false,
            };
            current = next;
        }
    }
}

/// Weak back-reference from a child's cancellation hook to its parent.
///
/// Weak on purpose: the parent's observer list holds the child strongly, so a
/// strong reference here would cycle until settlement.
struct ParentRef<T> {
    cell: Weak<RefCell<Cell<T>>>,
}

impl<T: Clone + 'static> ParentRef<T> {
    /// One dependent cancelled; when it was the last, cancel the parent with
    /// the same reason.
    fn child_cancelled(&self, reason: Fault) {
        let Some(cell) = self.cell.upgrade() else {
            return;
        };
        let parent = Promise { cell };
        let orphaned = {
            let mut cell = parent.cell.borrow_mut();
            cell.children = cell.children.saturating_sub(1);
            cell.children == 0
        };
        if orphaned {
            parent.cancel_with(reason);
        }
    }
}

fn apply<I, U: Clone + 'static>(
    resolver: Resolver<U>,
    handler: impl FnOnce(I) -> Chain<U>,
    input: I,
) {
    match handler(input) {
        Ok(outcome) => resolver.resolve(outcome),
        Err(fault) => resolver.reject(fault),
    }
}
