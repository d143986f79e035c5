//! A promise-based asynchronous I/O toolkit.
//!
//! This crate makes single-threaded, event-driven programs readable by
//! combining three pieces: a composable eventual-value cell
//! ([`promise::Promise`]), a coroutine adapter that drives resumable
//! computations by feeding them the values promises eventually produce
//! ([`coro`]), and byte streams that bridge sockets to promises with
//! backpressure and an at-most-one-reader discipline ([`io`], [`net`]).
//! Underneath them all sits one cooperative event loop
//! ([`runtime::Reactor`]), passed around as an explicit handle.
//!
//! # Examples
//!
//! **Echo one line and hang up**
//!
//! ```no_run
//! use rill::io::{Frame, Readable, Writable};
//! use rill::net::TcpListener;
//! use rill::runtime::Reactor;
//!
//! fn main() -> Result<(), rill::Fault> {
//!     let reactor = Reactor::new()?;
//!     let listener = TcpListener::bind(&reactor, "127.0.0.1:8080")?;
//!
//!     listener.accept().done(move |stream| {
//!         let sink = stream.clone();
//!         stream.read(Frame::until(b'\n')).done(move |line| {
//!             sink.write(&line).done({
//!                 let sink = sink.clone();
//!                 move |_| {
//!                     let _ = sink.end(None);
//!                 }
//!             });
//!         });
//!     });
//!
//!     reactor.run();
//!     Ok(())
//! }
//! ```
//!
//! # Design Decisions
//!
//! Everything here is single-threaded and cooperative. Promise observers and
//! coroutine resumptions run on reactor ticks, never on the settling
//! caller's stack, so "after settlement" always means "on a later tick".
//! There are no locks because there is nothing to lock against; handles are
//! `Rc`-cheap to clone and none of them are `Send`.
//!
//! The reactor is an explicit context object rather than a process-wide
//! global: constructing one is cheap, passing it is a one-word clone, and
//! tests can run as many loops side by side as they like.

pub mod coro;
pub mod error;
pub mod io;
pub mod net;
pub mod promise;
pub mod runtime;

pub use error::Fault;
