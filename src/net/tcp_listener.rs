use crate::error::Fault;
use crate::net::{parse_endpoint, TcpStream};
use crate::promise::{Promise, Resolver};
use crate::runtime::{IoKey, Reactor};

use mio::Interest;
use std::cell::RefCell;
use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::rc::Rc;

/// A TCP socket server, listening for connections.
///
/// One accept may be pending at a time — the same discipline streams apply
/// to reads. [`TcpListener::close`] stops accepting and rejects a pending
/// accept.
pub struct TcpListener {
    inner: Rc<RefCell<Inner>>,
}

impl Clone for TcpListener {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

struct Inner {
    reactor: Reactor,
    io: Option<mio::net::TcpListener>,
    key: Option<IoKey>,
    waiting: Option<Resolver<TcpStream>>,
    armed: bool,
}

impl TcpListener {
    /// Bind to `endpoint` (`host:port`, IPv6 host in brackets) and start
    /// listening.
    pub fn bind(reactor: &Reactor, endpoint: &str) -> Result<Self, Fault> {
        let addr = parse_endpoint(endpoint)?;
        let mut io = mio::net::TcpListener::bind(addr)?;
        let key = reactor.register(&mut io, Interest::READABLE)?;
        Ok(Self {
            inner: Rc::new(RefCell::new(Inner {
                reactor: reactor.clone(),
                io: Some(io),
                key: Some(key),
                waiting: None,
                armed: false,
            })),
        })
    }

    /// A promise of the next accepted connection.
    ///
    /// Rejects with [`Fault::Busy`] while another accept is pending and with
    /// [`Fault::Closed`] once the listener is closed.
    pub fn accept(&self) -> Promise<TcpStream> {
        let pending = {
            let mut inner = self.inner.borrow_mut();
            let reactor = inner.reactor.clone();
            let Some(io) = inner.io.as_ref() else {
                return Promise::rejected(&reactor, Fault::Closed);
            };
            if inner.waiting.is_some() {
                return Promise::rejected(&reactor, Fault::Busy);
            }
            match io.accept() {
                Ok((socket, _addr)) => {
                    return match TcpStream::from_mio(&reactor, socket) {
                        Ok(stream) => Promise::resolved(&reactor, stream),
                        Err(fault) => Promise::rejected(&reactor, fault),
                    };
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    let (promise, resolver) = Promise::pending(&reactor);
                    inner.waiting = Some(resolver);
                    promise
                }
                Err(err) => return Promise::rejected(&reactor, err.into()),
            }
        };
        self.arm();
        pending
    }

    /// Stop accepting: deregister, release the listening socket, and reject
    /// a pending accept. Idempotent.
    pub fn close(&self) {
        let (io, key, waiting, reactor) = {
            let mut inner = self.inner.borrow_mut();
            if inner.io.is_none() {
                return;
            }
            (
                inner.io.take(),
                inner.key.take(),
                inner.waiting.take(),
                inner.reactor.clone(),
            )
        };
        if let (Some(mut io), Some(key)) = (io, key) {
            reactor.deregister(key, &mut io);
        }
        if let Some(resolver) = waiting {
            resolver.reject(Fault::Closed);
        }
    }

    /// The address the listener is bound to.
    pub fn local_address(&self) -> Result<IpAddr, Fault> {
        Ok(self.local()?.ip())
    }

    /// The port the listener is bound to.
    pub fn local_port(&self) -> Result<u16, Fault> {
        Ok(self.local()?.port())
    }

    fn local(&self) -> Result<SocketAddr, Fault> {
        let inner = self.inner.borrow();
        let Some(io) = inner.io.as_ref() else {
            return Err(Fault::Closed);
        };
        Ok(io.local_addr()?)
    }

    fn arm(&self) {
        let (reactor, key) = {
            let mut inner = self.inner.borrow_mut();
            if inner.armed {
                return;
            }
            let Some(key) = inner.key else {
                return;
            };
            inner.armed = true;
            (inner.reactor.clone(), key)
        };
        let listener = self.clone();
        reactor.await_readable(key, move || {
            listener.inner.borrow_mut().armed = false;
            listener.try_accept();
        });
    }

    /// Serve the pending accept now that the listener looks ready.
    fn try_accept(&self) {
        enum Outcome {
            Served(Resolver<TcpStream>, mio::net::TcpStream, Reactor),
            Failed(Resolver<TcpStream>, Fault),
            Starved,
            Idle,
        }
        let outcome = {
            let mut inner = self.inner.borrow_mut();
            let Some(io) = inner.io.as_ref() else {
                return;
            };
            if inner.waiting.is_none() {
                return;
            }
            match io.accept() {
                Ok((socket, _addr)) => {
                    let reactor = inner.reactor.clone();
                    match inner.waiting.take() {
                        Some(resolver) => Outcome::Served(resolver, socket, reactor),
                        None => Outcome::Idle,
                    }
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => Outcome::Starved,
                Err(err) => match inner.waiting.take() {
                    Some(resolver) => Outcome::Failed(resolver, err.into()),
                    None => Outcome::Idle,
                },
            }
        };
        match outcome {
            Outcome::Served(resolver, socket, reactor) => {
                match TcpStream::from_mio(&reactor, socket) {
                    Ok(stream) => resolver.resolve(stream),
                    Err(fault) => resolver.reject(fault),
                }
            }
            Outcome::Failed(resolver, fault) => resolver.reject(fault),
            Outcome::Starved => self.arm(),
            Outcome::Idle => {}
        }
    }
}
