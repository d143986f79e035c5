use crate::error::Fault;
use crate::io::stream::{PendingRead, Readable, Stream, Writable};
use crate::io::{Buffer, Frame};
use crate::net::parse_endpoint;
use crate::promise::{Promise, Resolver};
use crate::runtime::{IoKey, Reactor};

use mio::Interest;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::net::{IpAddr, SocketAddr};
use std::rc::Rc;

/// A TCP stream between a local and a remote socket.
///
/// Incoming bytes are drained into an owned [`Buffer`] on readiness and
/// handed to the pending read through the usual framing; outgoing bytes
/// queue, flush as far as the socket allows, and re-arm write interest for
/// the rest, so a write's promise fulfills only once all of it has been
/// handed off. The peer closing its end closes the stream once the buffer
/// has drained.
pub struct TcpStream {
    inner: Rc<RefCell<Inner>>,
}

impl Clone for TcpStream {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

struct Inner {
    reactor: Reactor,
    /// `Some` exactly while the descriptor is owned; `take`n on close so it
    /// is released exactly once.
    io: Option<mio::net::TcpStream>,
    key: Option<IoKey>,
    buffer: Buffer,
    waiting: Option<PendingRead>,
    queue: VecDeque<WriteJob>,
    open: bool,
    writable: bool,
    eof: bool,
    /// Resolver of the `end()` promise while an end is draining.
    ending: Option<Resolver<()>>,
    read_armed: bool,
    write_armed: bool,
}

struct WriteJob {
    data: Vec<u8>,
    written: usize,
    resolver: Resolver<usize>,
}

impl TcpStream {
    /// Open a connection to `endpoint` (`host:port`, IPv6 host in brackets).
    ///
    /// The promise fulfills with the connected stream once the socket
    /// reports writability, and rejects when the connection attempt fails.
    pub fn connect(reactor: &Reactor, endpoint: &str) -> Promise<TcpStream> {
        let addr = match parse_endpoint(endpoint) {
            Ok(addr) => addr,
            Err(fault) => return Promise::rejected(reactor, fault),
        };
        let io = match mio::net::TcpStream::connect(addr) {
            Ok(io) => io,
            Err(err) => return Promise::rejected(reactor, err.into()),
        };
        let stream = match TcpStream::from_mio(reactor, io) {
            Ok(stream) => stream,
            Err(fault) => return Promise::rejected(reactor, fault),
        };
        let (promise, resolver) = Promise::pending(reactor);
        await_connected(stream, resolver);
        promise
    }

    /// Wrap an already-connected (or connecting) socket.
    pub(crate) fn from_mio(reactor: &Reactor, mut io: mio::net::TcpStream) -> Result<Self, Fault> {
        let key = reactor.register(&mut io, Interest::READABLE | Interest::WRITABLE)?;
        Ok(Self {
            inner: Rc::new(RefCell::new(Inner {
                reactor: reactor.clone(),
                io: Some(io),
                key: Some(key),
                buffer: Buffer::new(),
                waiting: None,
                queue: VecDeque::new(),
                open: true,
                writable: true,
                eof: false,
                ending: None,
                read_armed: false,
                write_armed: false,
            })),
        })
    }

    /// The local endpoint's address.
    pub fn local_address(&self) -> Result<IpAddr, Fault> {
        Ok(self.local()?.ip())
    }

    /// The local endpoint's port.
    pub fn local_port(&self) -> Result<u16, Fault> {
        Ok(self.local()?.port())
    }

    /// The remote endpoint's address.
    pub fn remote_address(&self) -> Result<IpAddr, Fault> {
        Ok(self.peer()?.ip())
    }

    /// The remote endpoint's port.
    pub fn remote_port(&self) -> Result<u16, Fault> {
        Ok(self.peer()?.port())
    }

    fn local(&self) -> Result<SocketAddr, Fault> {
        let inner = self.inner.borrow();
        let Some(io) = inner.io.as_ref() else {
            return Err(Fault::Closed);
        };
        Ok(io.local_addr()?)
    }

    fn peer(&self) -> Result<SocketAddr, Fault> {
        let inner = self.inner.borrow();
        let Some(io) = inner.io.as_ref() else {
            return Err(Fault::Closed);
        };
        Ok(io.peer_addr()?)
    }

    /// Arm read interest, unless it already is.
    fn arm_read(&self) {
        let (reactor, key) = {
            let mut inner = self.inner.borrow_mut();
            if inner.read_armed {
                return;
            }
            let Some(key) = inner.key else {
                return;
            };
            inner.read_armed = true;
            (inner.reactor.clone(), key)
        };
        let stream = self.clone();
        reactor.await_readable(key, move || {
            stream.inner.borrow_mut().read_armed = false;
            stream.pump_in();
        });
    }

    fn arm_write(&self) {
        let (reactor, key) = {
            let mut inner = self.inner.borrow_mut();
            if inner.write_armed {
                return;
            }
            let Some(key) = inner.key else {
                return;
            };
            inner.write_armed = true;
            (inner.reactor.clone(), key)
        };
        let stream = self.clone();
        reactor.await_writable(key, move || {
            stream.inner.borrow_mut().write_armed = false;
            stream.pump_out();
        });
    }

    /// Drain the socket into the buffer and settle what can be settled.
    fn pump_in(&self) {
        let mut served: Option<(Resolver<Vec<u8>>, Vec<u8>)> = None;
        let mut failed: Option<Fault> = None;
        let mut hit_eof = false;
        let mut rearm = false;
        {
            let inner = &mut *self.inner.borrow_mut();
            let Some(io) = inner.io.as_mut() else {
                return;
            };
            let mut scratch = [0u8; 4096];
            loop {
                match io.read(&mut scratch) {
                    Ok(0) => {
                        inner.eof = true;
                        hit_eof = true;
                        break;
                    }
                    Ok(count) => inner.buffer.push(&scratch[..count]),
                    Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                    Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                    Err(err) => {
                        failed = Some(err.into());
                        break;
                    }
                }
            }
            if let Some(read) = inner.waiting.take() {
                if !inner.buffer.is_empty() {
                    let chunk = inner.buffer.take(read.frame);
                    served = Some((read.resolver, chunk));
                } else {
                    // Nothing to hand over; either keep waiting or leave the
                    // read in place for close() to reject.
                    let starved = failed.is_none() && !hit_eof;
                    inner.waiting = Some(read);
                    rearm = starved;
                }
            }
        }
        if let Some((resolver, chunk)) = served {
            resolver.resolve(chunk);
        }
        if let Some(fault) = failed {
            self.close(Some(fault));
            return;
        }
        if hit_eof {
            // No more bytes will ever arrive; close as soon as the buffer
            // has nothing left to give.
            if self.inner.borrow().buffer.is_empty() {
                self.close(None);
            }
            return;
        }
        if rearm {
            self.arm_read();
        }
    }

    /// Flush the write queue as far as the socket allows.
    fn pump_out(&self) {
        let mut finished: Vec<(Resolver<usize>, usize)> = Vec::new();
        let mut failed: Option<Fault> = None;
        let mut rearm = false;
        let mut drained: Option<Resolver<()>> = None;
        {
            let inner = &mut *self.inner.borrow_mut();
            let Some(io) = inner.io.as_mut() else {
                return;
            };
            while let Some(job) = inner.queue.front_mut() {
                match io.write(&job.data[job.written..]) {
                    Ok(0) => {
                        failed = Some(std::io::Error::from(ErrorKind::WriteZero).into());
                        break;
                    }
                    Ok(count) => {
                        job.written += count;
                        if job.written == job.data.len() {
                            let job = inner.queue.pop_front().expect("front was just seen");
                            finished.push((job.resolver, job.data.len()));
                        }
                    }
                    Err(err) if err.kind() == ErrorKind::WouldBlock => {
                        rearm = true;
                        break;
                    }
                    Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                    Err(err) => {
                        failed = Some(err.into());
                        break;
                    }
                }
            }
            if failed.is_none() && inner.queue.is_empty() {
                drained = inner.ending.take();
            }
        }
        for (resolver, accepted) in finished {
            resolver.resolve(accepted);
        }
        if let Some(fault) = failed {
            self.close(Some(fault));
            return;
        }
        if let Some(done) = drained {
            self.close(None);
            done.resolve(());
        } else if rearm {
            self.arm_write();
        }
    }
}

/// Wait for writability to learn the connection attempt's outcome.
fn await_connected(stream: TcpStream, resolver: Resolver<TcpStream>) {
    let (reactor, key) = {
        let inner = stream.inner.borrow();
        let Some(key) = inner.key else {
            resolver.reject(Fault::Closed);
            return;
        };
        (inner.reactor.clone(), key)
    };
    reactor.await_writable(key, move || match connect_outcome(&stream) {
        Ok(true) => resolver.resolve(stream.clone()),
        Ok(false) => await_connected(stream, resolver),
        Err(fault) => {
            stream.close(Some(fault.clone()));
            resolver.reject(fault);
        }
    });
}

fn connect_outcome(stream: &TcpStream) -> Result<bool, Fault> {
    let inner = stream.inner.borrow();
    let Some(io) = inner.io.as_ref() else {
        return Err(Fault::Closed);
    };
    if let Some(err) = io.take_error()? {
        return Err(err.into());
    }
    match io.peer_addr() {
        Ok(_) => Ok(true),
        Err(err)
            if err.kind() == ErrorKind::NotConnected
                || err.kind() == ErrorKind::WouldBlock =>
        {
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}

impl Stream for TcpStream {
    fn is_open(&self) -> bool {
        self.inner.borrow().open
    }

    fn close(&self, reason: Option<Fault>) {
        let (io, key, waiting, jobs, ending, reactor) = {
            let mut inner = self.inner.borrow_mut();
            if inner.io.is_none() {
                return;
            }
            inner.open = false;
            inner.writable = false;
            inner.eof = true;
            inner.buffer = Buffer::new();
            (
                inner.io.take(),
                inner.key.take(),
                inner.waiting.take(),
                std::mem::take(&mut inner.queue),
                inner.ending.take(),
                inner.reactor.clone(),
            )
        };
        if let (Some(mut io), Some(key)) = (io, key) {
            reactor.deregister(key, &mut io);
        }
        let fault = reason.unwrap_or(Fault::Closed);
        if let Some(read) = waiting {
            read.resolver.reject(fault.clone());
        }
        for job in jobs {
            job.resolver.reject(Fault::Closed);
        }
        if let Some(done) = ending {
            done.resolve(());
        }
    }
}

impl Readable for TcpStream {
    fn is_readable(&self) -> bool {
        self.inner.borrow().open
    }

    fn read(&self, frame: Frame) -> Promise<Vec<u8>> {
        let promise = {
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
            if inner.eof {
                None
            } else {
                let (promise, resolver) = Promise::pending(&inner.reactor);
                inner.waiting = Some(PendingRead { frame, resolver });
                Some(promise)
            }
        };
        match promise {
            Some(promise) => {
                self.arm_read();
                promise
            }
            None => {
                // The peer is gone and the buffer is spent.
                let reactor = self.inner.borrow().reactor.clone();
                self.close(None);
                Promise::rejected(&reactor, Fault::Closed)
            }
        }
    }
}

impl Writable for TcpStream {
    fn is_writable(&self) -> bool {
        self.inner.borrow().writable
    }

    fn write(&self, data: &[u8]) -> Promise<usize> {
        let promise = {
            let mut inner = self.inner.borrow_mut();
            if !inner.writable {
                return Promise::rejected(&inner.reactor, Fault::Unwritable);
            }
            let (promise, resolver) = Promise::pending(&inner.reactor);
            if data.is_empty() {
                resolver.resolve(0usize);
                return promise;
            }
            inner.queue.push_back(WriteJob {
                data: data.to_vec(),
                written: 0,
                resolver,
            });
            promise
        };
        self.pump_out();
        promise
    }

    fn end(&self, data: Option<&[u8]>) -> Promise<()> {
        if !self.is_writable() {
            let reactor = self.inner.borrow().reactor.clone();
            return Promise::rejected(&reactor, Fault::Unwritable);
        }
        if let Some(data) = data {
            // The job's own promise is folded into the drain below.
            let _ = self.write(data);
        }
        let promise = {
            let mut inner = self.inner.borrow_mut();
            if inner.io.is_none() {
                return Promise::rejected(&inner.reactor, Fault::Closed);
            }
            let (promise, resolver) = Promise::pending(&inner.reactor);
            inner.writable = false;
            inner.ending = Some(resolver);
            promise
        };
        self.pump_out();
        promise
    }
}
