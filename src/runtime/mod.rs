//! The event loop.
//!
//! The way to use this is to create a [`Reactor`] and hand clones of it to
//! whatever needs to schedule work: promises settle through its tick queue,
//! [`Promise::timeout`] and [`Promise::delay`] arm its timers, and the `net`
//! streams wait on its readiness notifications. [`Reactor::run`] then
//! dispatches until no pending work remains.
//!
//! [`Promise::timeout`]: crate::promise::Promise::timeout
//! [`Promise::delay`]: crate::promise::Promise::delay

#![warn(missing_docs, unreachable_pub)]

mod reactor;
mod timer;

pub use reactor::Reactor;
pub use timer::TimerHandle;

pub(crate) use reactor::IoKey;
