use crate::error::Fault;
use crate::io::Frame;
use crate::promise::{Promise, Resolver};
use crate::runtime::Reactor;

/// The lifetime shared by both stream directions.
pub trait Stream {
    /// Whether the stream is still usable at all. Once false, never true
    /// again.
    fn is_open(&self) -> bool;

    /// Tear the stream down immediately: both directions stop, a pending
    /// read is rejected with `reason` (or [`Fault::Closed`]), and the
    /// underlying resource is released. Idempotent.
    fn close(&self, reason: Option<Fault>);
}

/// The reading half of a stream.
///
/// At most one read may be pending at a time; a second concurrent read
/// rejects with [`Fault::Busy`]. Reads on a closed stream reject with
/// [`Fault::Unreadable`].
pub trait Readable: Stream {
    /// Whether reads can currently be issued.
    fn is_readable(&self) -> bool;

    /// A promise of the next chunk, framed by `frame`.
    ///
    /// Fulfills with already-buffered bytes when there are any; otherwise
    /// waits for data. Except for zero-length frames the chunk is never
    /// empty.
    fn read(&self, frame: Frame) -> Promise<Vec<u8>>;

    /// Wait for readability without consuming anything.
    ///
    /// A zero-length read: fulfills with an empty chunk as soon as a read
    /// could fulfill.
    fn poll(&self) -> Promise<Vec<u8>> {
        self.read(Frame::bytes(0))
    }
}

/// The writing half of a stream.
pub trait Writable: Stream {
    /// Whether writes can currently be issued. Implies [`Stream::is_open`].
    fn is_writable(&self) -> bool;

    /// A promise of the number of bytes accepted, fulfilled once all of
    /// `data` has been handed off. Rejects with [`Fault::Unwritable`] when
    /// the stream no longer accepts writes.
    fn write(&self, data: &[u8]) -> Promise<usize>;

    /// Write `data` (when given), stop accepting writes, and close once
    /// everything handed off so far has drained.
    fn end(&self, data: Option<&[u8]>) -> Promise<()>;
}

/// A read that arrived before its data; settled by the owning stream when
/// bytes become available or the stream closes.
pub(crate) struct PendingRead {
    pub(crate) frame: Frame,
    pub(crate) resolver: Resolver<Vec<u8>>,
}

/// How [`pipe`] should run.
#[derive(Debug, Clone, Copy)]
pub struct PipeOptions {
    /// End the destination once the source closes. Defaults to true.
    pub end_on_close: bool,
    /// Stop after this many bytes have been transferred.
    pub length: Option<u64>,
    /// Stop once a transferred chunk ends with this byte.
    pub delimiter: Option<u8>,
}

impl Default for PipeOptions {
    fn default() -> Self {
        Self {
            end_on_close: true,
            length: None,
            delimiter: None,
        }
    }
}

/// Transfer bytes from `src` to `dest`, fulfilling with the total count.
///
/// Chunks are read one at a time and the next read is not issued until the
/// previous write has settled; that sequencing, together with the
/// single-pending-read rule, is the entire backpressure story. The transfer
/// ends when the configured `length` is reached, when a chunk ends with the
/// configured `delimiter`, when the source closes (with `end_on_close`, the
/// destination is ended too), or when the destination stops accepting
/// writes.
pub fn pipe<R, W>(reactor: &Reactor, src: &R, dest: &W, options: PipeOptions) -> Promise<u64>
where
    R: Readable + Clone + 'static,
    W: Writable + Clone + 'static,
{
    let (promise, resolver) = Promise::pending(reactor);
    pump(src.clone(), dest.clone(), options, 0, resolver);
    promise
}

fn pump<R, W>(src: R, dest: W, options: PipeOptions, moved: u64, resolver: Resolver<u64>)
where
    R: Readable + Clone + 'static,
    W: Writable + Clone + 'static,
{
    if !dest.is_writable() {
        resolver.resolve(moved);
        return;
    }
    let remaining = options.length.map(|length| length - moved);
    if remaining == Some(0) {
        resolver.resolve(moved);
        return;
    }

    let frame = Frame {
        length: remaining.map(|n| usize::try_from(n).unwrap_or(usize::MAX)),
        delimiter: options.delimiter,
    };

    let on_chunk = {
        let resolver = resolver.clone();
        let src = src.clone();
        let dest = dest.clone();
        move |chunk: Vec<u8>| {
            let moved = moved + chunk.len() as u64;
            let delimited = options
                .delimiter
                .is_some_and(|delimiter| chunk.last() == Some(&delimiter));
            let write = dest.write(&chunk);
            let on_written = {
                let resolver = resolver.clone();
                move |_accepted| {
                    if delimited || options.length == Some(moved) {
                        resolver.resolve(moved);
                    } else {
                        pump(src, dest, options, moved, resolver);
                    }
                }
            };
            let on_refused = move |fault| match fault {
                Fault::Unwritable | Fault::Closed => resolver.resolve(moved),
                other => resolver.reject(other),
            };
            write.done_or(on_written, on_refused);
        }
    };
    let on_drained = move |fault| match fault {
        Fault::Closed | Fault::Unreadable => {
            resolver.resolve(moved);
            if options.end_on_close {
                let _ = dest.end(None);
            }
        }
        other => resolver.reject(other),
    };
    src.read(frame).done_or(on_chunk, on_drained);
}
