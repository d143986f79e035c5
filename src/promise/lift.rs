use crate::error::Fault;
use crate::promise::cell::{Eventual, Promise, Resolver};
use crate::runtime::Reactor;

/// A tuple of promises-or-values that can be gathered into one promise of
/// the resolved tuple. Implemented for arities one through four.
pub trait Operands {
    /// The resolved values, in operand order.
    type Values: Clone + 'static;

    /// Await every operand and fulfill with the tuple of their values; the
    /// first rejection wins.
    fn gather(self, reactor: &Reactor) -> Promise<Self::Values>;
}

impl<A> Operands for (Eventual<A>,)
where
    A: Clone + 'static,
{
    type Values = (A,);

    fn gather(self, reactor: &Reactor) -> Promise<(A,)> {
        self.0
            .into_promise(reactor)
            .then(|a| Ok(Eventual::Ready((a,))))
    }
}

impl<A, B> Operands for (Eventual<A>, Eventual<B>)
where
    A: Clone + 'static,
    B: Clone + 'static,
{
    type Values = (A, B);

    fn gather(self, reactor: &Reactor) -> Promise<(A, B)> {
        let b = self.1.into_promise(reactor);
        self.0.into_promise(reactor).then(move |a| {
            Ok(Eventual::Later(
                b.then(move |b| Ok(Eventual::Ready((a, b)))),
            ))
        })
    }
}

impl<A, B, C> Operands for (Eventual<A>, Eventual<B>, Eventual<C>)
where
    A: Clone + 'static,
    B: Clone + 'static,
    C: Clone + 'static,
{
    type Values = (A, B, C);

    fn gather(self, reactor: &Reactor) -> Promise<(A, B, C)> {
        let b = self.1.into_promise(reactor);
        let c = self.2.into_promise(reactor);
        self.0.into_promise(reactor).then(move |a| {
            Ok(Eventual::Later(b.then(move |b| {
                Ok(Eventual::Later(
                    c.then(move |c| Ok(Eventual::Ready((a, b, c)))),
                ))
            })))
        })
    }
}

impl<A, B, C, D> Operands for (Eventual<A>, Eventual<B>, Eventual<C>, Eventual<D>)
where
    A: Clone + 'static,
    B: Clone + 'static,
    C: Clone + 'static,
    D: Clone + 'static,
{
    type Values = (A, B, C, D);

    fn gather(self, reactor: &Reactor) -> Promise<(A, B, C, D)> {
        let b = self.1.into_promise(reactor);
        let c = self.2.into_promise(reactor);
        let d = self.3.into_promise(reactor);
        self.0.into_promise(reactor).then(move |a| {
            Ok(Eventual::Later(b.then(move |b| {
                Ok(Eventual::Later(c.then(move |c| {
                    Ok(Eventual::Later(
                        d.then(move |d| Ok(Eventual::Ready((a, b, c, d)))),
                    ))
                })))
            })))
        })
    }
}

/// Lift a plain function over promises-or-values.
///
/// Awaits every operand, then applies `f` to the resolved tuple; operand
/// order is preserved. A rejection among the operands, or an `Err` from `f`,
/// rejects the result.
pub fn lift<O, R, F>(reactor: &Reactor, f: F, operands: O) -> Promise<R>
where
    O: Operands,
    R: Clone + 'static,
    F: FnOnce(O::Values) -> Result<R, Fault> + 'static,
{
    operands
        .gather(reactor)
        .then(move |values| Ok(Eventual::Ready(f(values)?)))
}

/// The completion capability handed to a callback-style API.
///
/// One-shot by construction: completing consumes it.
pub struct Completion<T> {
    resolver: Resolver<T>,
}

impl<T: Clone + 'static> Completion<T> {
    /// Deliver the callback's outcome, settling the wrapped promise.
    pub fn complete(self, outcome: Result<T, Fault>) {
        match outcome {
            Ok(value) => self.resolver.resolve(value),
            Err(fault) => self.resolver.reject(fault),
        }
    }
}

/// Adapt a callback-style operation into a promise.
///
/// `start` receives a [`Completion`] to place wherever the underlying API
/// expects its callback; the returned promise settles with whatever is fed
/// to it. An `Err` from `start` itself rejects immediately.
pub fn promisify<T, F>(reactor: &Reactor, start: F) -> Promise<T>
where
    T: Clone + 'static,
    F: FnOnce(Completion<T>) -> Result<(), Fault>,
{
    Promise::new(reactor, |resolver| start(Completion { resolver }))
}
