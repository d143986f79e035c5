//! Eventual values.
//!
//! A [`Promise`] is a single-assignment cell that will eventually hold a
//! value or a [`Fault`](crate::error::Fault). Producers settle it through a
//! [`Resolver`]; consumers chain on it with [`Promise::then`] and friends or
//! terminate a chain with [`Promise::done`]. Settlement is always delivered
//! on a reactor tick, never from inside the producer's stack, so observer
//! code sees a consistent world: whoever settled the promise has finished
//! running.
//!
//! Cancellation flows the other way. Derived promises count as dependents of
//! their parent, and when the last dependent is cancelled the parent is
//! cancelled with the same reason — an orphaned chain collapses without any
//! explicit teardown.
//!
//! The [`join`]/[`settle`]/[`any`]/[`some`]/[`choose`]/[`map`]/[`reduce`]
//! combinators work over keyed collections of promises-or-values, and
//! [`iterate`] drives a step function through the reactor one tick at a
//! time.

mod cell;
mod combine;
mod iterate;
mod lift;

pub use cell::{Chain, Eventual, Promise, Resolver};
pub use combine::{any, choose, join, map, reduce, settle, some};
pub use iterate::iterate;
pub use lift::{lift, promisify, Completion, Operands};
