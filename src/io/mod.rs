//! Byte streams and the buffers beneath them.
//!
//! Streams expose reading and writing as promise-returning operations: a
//! [`Readable`] hands out at most one pending read at a time, a [`Writable`]
//! settles each write once its bytes are handed off, and [`pipe`] chains the
//! two with the read-after-write sequencing that gives the crate its
//! backpressure. [`Duplex`] is the in-memory implementation every other
//! stream is measured against; the socket streams live in
//! [`net`](crate::net).

mod buffer;
mod duplex;
pub(crate) mod stream;

pub use buffer::{Buffer, Frame};
pub use duplex::Duplex;
pub use stream::{pipe, PipeOptions, Readable, Stream, Writable};
