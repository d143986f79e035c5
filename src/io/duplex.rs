use crate::error::Fault;
use crate::io::stream::{PendingRead, Readable, Stream, Writable};
use crate::io::{Buffer, Frame};
use crate::promise::{Eventual, Promise};
use crate::runtime::Reactor;

use std::cell::RefCell;
use std::rc::Rc;

/// An in-memory duplex stream: bytes written in come back out of reads,
/// through the same framing rules every other stream honors.
///
/// Writes never block. When a read is waiting, a write settles it on the
/// spot; otherwise the bytes sit in the buffer for the next read. Cloning
/// hands out another handle to the same stream.
pub struct Duplex {
    inner: Rc<RefCell<Inner>>,
}

impl Clone for Duplex {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

struct Inner {
    reactor: Reactor,
    buffer: Buffer,
    waiting: Option<PendingRead>,
    open: bool,
    writable: bool,
}

impl Duplex {
    /// A fresh, open, writable stream.
    pub fn new(reactor: &Reactor) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                reactor: reactor.clone(),
                buffer: Buffer::new(),
                waiting: None,
                open: true,
                writable: true,
            })),
        }
    }
}

impl Stream for Duplex {
    fn is_open(&self) -> bool {
        self.inner.borrow().open
    }

    fn close(&self, reason: Option<Fault>) {
        let waiting = {
            let mut inner = self.inner.borrow_mut();
            if !inner.open {
                return;
            }
            inner.open = false;
            inner.writable = false;
            inner.buffer = Buffer::new();
            inner.waiting.take()
        };
        if let Some(read) = waiting {
            read.resolver.reject(reason.unwrap_or(Fault::Closed));
        }
    }
}

impl Readable for Duplex {
    fn is_readable(&self) -> bool {
        self.inner.borrow().open
    }

    fn read(&self, frame: Frame) -> Promise<Vec<u8>> {
        let mut inner = self.inner.borrow_mut();
        if !inner.open {
            return Promise::rejected(&inner.reactor, Fault::Unreadable);
        }
        if inner.waiting.is_some() {
            return Promise::rejected(&inner.reactor, Fault::Busy);
        }
        if !inner.buffer.is_empty() {
            let chunk = inner.buffer.take(frame);
            return Promise::resolved(&inner.reactor, chunk);
        }
        let (promise, resolver) = Promise::pending(&inner.reactor);
        inner.waiting = Some(PendingRead { frame, resolver });
        promise
    }
}

impl Writable for Duplex {
    fn is_writable(&self) -> bool {
        self.inner.borrow().writable
    }

    fn write(&self, data: &[u8]) -> Promise<usize> {
        let (served, promise) = {
            let mut inner = self.inner.borrow_mut();
            if !inner.writable {
                return Promise::rejected(&inner.reactor, Fault::Unwritable);
            }
            inner.buffer.push(data);
            let served = match inner.waiting.take() {
                Some(read) if !inner.buffer.is_empty() => {
                    let chunk = inner.buffer.take(read.frame);
                    Some((read.resolver, chunk))
                }
                other => {
                    inner.waiting = other;
                    None
                }
            };
            (served, Promise::resolved(&inner.reactor, data.len()))
        };
        if let Some((resolver, chunk)) = served {
            resolver.resolve(chunk);
        }
        promise
    }

    fn end(&self, data: Option<&[u8]>) -> Promise<()> {
        if !self.is_writable() {
            let reactor = self.inner.borrow().reactor.clone();
            return Promise::rejected(&reactor, Fault::Unwritable);
        }
        let flushed = match data {
            Some(data) => self.write(data),
            None => {
                let inner = self.inner.borrow();
                Promise::resolved(&inner.reactor, 0)
            }
        };
        self.inner.borrow_mut().writable = false;
        let closer = self.clone();
        let also = self.clone();
        flushed.handle(
            move |_accepted| {
                closer.close(None);
                Ok(Eventual::Ready(()))
            },
            move |fault| {
                also.close(None);
                Err(fault)
            },
        )
    }
}
