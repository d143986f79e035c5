use rill::io::{Frame, Readable, Stream, Writable};
use rill::net::{TcpListener, TcpStream};
use rill::runtime::Reactor;
use rill::Fault;

use std::cell::RefCell;
use std::io::{Read, Write};
use std::rc::Rc;
use std::thread;
use std::time::Duration;

#[test]
fn echo_one_line_then_hang_up() {
    let reactor = Reactor::new().unwrap();
    let listener = TcpListener::bind(&reactor, "127.0.0.1:0").unwrap();
    let port = listener.local_port().unwrap();

    let acceptor = listener.clone();
    listener.accept().done(move |stream| {
        acceptor.close();
        let sink = stream.clone();
        stream.read(Frame::until(b'\n')).done(move |line| {
            let closer = sink.clone();
            sink.write(&line).done(move |_| {
                let _ = closer.end(None);
            });
        });
    });

    let client = thread::spawn(move || {
        let mut socket = std::net::TcpStream::connect(("127.0.0.1", port)).unwrap();
        socket.write_all(b"hi\n").unwrap();
        let mut reply = Vec::new();
        socket.read_to_end(&mut reply).unwrap();
        reply
    });

    reactor.run();
    assert_eq!(client.join().unwrap(), b"hi\n");
}

#[test]
fn broadcast_reaches_everyone_but_the_sender() {
    let reactor = Reactor::new().unwrap();
    let listener = TcpListener::bind(&reactor, "127.0.0.1:0").unwrap();
    let port = listener.local_port().unwrap();

    fn gather(listener: TcpListener, joined: Rc<RefCell<Vec<TcpStream>>>) {
        let next = listener.clone();
        listener.accept().done(move |stream| {
            joined.borrow_mut().push(stream);
            if joined.borrow().len() == 3 {
                next.close();
                wire(&joined.borrow());
            } else {
                gather(next, joined);
            }
        });
    }

    // one pending read per member; the first line anyone sends goes to the
    // other members, after which the whole room shuts down
    fn wire(members: &[TcpStream]) {
        for (speaker, stream) in members.iter().enumerate() {
            let room: Vec<TcpStream> = members.to_vec();
            stream.read(Frame::until(b'\n')).done_or(
                move |line| {
                    for (listener, peer) in room.iter().enumerate() {
                        if listener == speaker {
                            continue;
                        }
                        let hangup = peer.clone();
                        peer.write(&line).done(move |_| {
                            let _ = hangup.end(None);
                        });
                    }
                    room[speaker].close(None);
                },
                |_closed| {},
            );
        }
    }

    gather(listener, Rc::new(RefCell::new(Vec::new())));

    let talker = thread::spawn(move || {
        let mut socket = std::net::TcpStream::connect(("127.0.0.1", port)).unwrap();
        socket.write_all(b"x\n").unwrap();
        let mut reply = Vec::new();
        socket.read_to_end(&mut reply).unwrap();
        reply
    });
    let hear = move || {
        let mut socket = std::net::TcpStream::connect(("127.0.0.1", port)).unwrap();
        let mut heard = Vec::new();
        socket.read_to_end(&mut heard).unwrap();
        heard
    };
    let first_listener = thread::spawn(hear.clone());
    let second_listener = thread::spawn(hear);

    reactor.run();
    assert_eq!(talker.join().unwrap(), b"");
    assert_eq!(first_listener.join().unwrap(), b"x\n");
    assert_eq!(second_listener.join().unwrap(), b"x\n");
}

#[test]
fn connect_meets_accept() {
    let reactor = Reactor::new().unwrap();
    let listener = TcpListener::bind(&reactor, "127.0.0.1:0").unwrap();
    let port = listener.local_port().unwrap();

    let reply = Rc::new(RefCell::new(None));
    let heard = reply.clone();
    let acceptor = listener.clone();
    listener.accept().done(move |served| {
        acceptor.close();
        served.read(Frame::bytes(4)).done(move |chunk| {
            *heard.borrow_mut() = Some(chunk);
        });
    });

    let connected = TcpStream::connect(&reactor, &format!("127.0.0.1:{port}"));
    let endpoint_check = Rc::new(RefCell::new(None));
    let seen = endpoint_check.clone();
    connected.done(move |stream| {
        *seen.borrow_mut() = Some(stream.remote_port().unwrap());
        let _ = stream.write(b"ping");
    });

    reactor.run();
    assert_eq!(*endpoint_check.borrow(), Some(port));
    assert_eq!(reply.borrow().as_deref(), Some(b"ping".as_slice()));
}

#[test]
fn endpoint_getters_describe_both_ends() {
    let reactor = Reactor::new().unwrap();
    let listener = TcpListener::bind(&reactor, "127.0.0.1:0").unwrap();
    let port = listener.local_port().unwrap();
    assert!(listener.local_address().unwrap().is_loopback());

    let served: Rc<RefCell<Option<TcpStream>>> = Rc::new(RefCell::new(None));
    let slot = served.clone();
    let acceptor = listener.clone();
    listener.accept().done(move |stream| {
        acceptor.close();
        *slot.borrow_mut() = Some(stream);
    });

    let client = thread::spawn(move || {
        let socket = std::net::TcpStream::connect(("127.0.0.1", port)).unwrap();
        // hold the connection open long enough for the assertions
        thread::sleep(Duration::from_millis(50));
        drop(socket);
    });

    reactor.run();
    let stream = served.borrow().clone().unwrap();
    assert_eq!(stream.local_port().unwrap(), port);
    assert!(stream.local_address().unwrap().is_loopback());
    assert!(stream.remote_address().unwrap().is_loopback());
    assert!(stream.remote_port().is_ok());
    client.join().unwrap();
}

#[test]
fn closing_twice_releases_the_socket_once() {
    let reactor = Reactor::new().unwrap();
    let listener = TcpListener::bind(&reactor, "127.0.0.1:0").unwrap();
    let port = listener.local_port().unwrap();

    let served: Rc<RefCell<Option<TcpStream>>> = Rc::new(RefCell::new(None));
    let slot = served.clone();
    let acceptor = listener.clone();
    listener.accept().done(move |stream| {
        acceptor.close();
        *slot.borrow_mut() = Some(stream);
    });

    let client = thread::spawn(move || {
        let _socket = std::net::TcpStream::connect(("127.0.0.1", port)).unwrap();
    });

    reactor.run();
    client.join().unwrap();

    let stream = served.borrow().clone().unwrap();
    let orphan = stream.read(Frame::all());
    stream.close(None);
    stream.close(Some(Fault::Logic("second close must be a no-op")));
    reactor.run();
    assert_eq!(orphan.result(), Err(Fault::Closed));
    assert!(!stream.is_open());
    assert!(stream.local_port().is_err());

    // the listener is just as idempotent
    let gone = TcpListener::bind(&reactor, "127.0.0.1:0").unwrap();
    gone.close();
    gone.close();
    assert!(matches!(gone.accept().result(), Err(Fault::Closed)));
}

#[test]
fn a_second_concurrent_accept_is_busy() {
    let reactor = Reactor::new().unwrap();
    let listener = TcpListener::bind(&reactor, "127.0.0.1:0").unwrap();
    let first = listener.accept();
    let second = listener.accept();
    listener.close();
    reactor.run();
    assert!(matches!(first.result(), Err(Fault::Closed)));
    assert!(matches!(second.result(), Err(Fault::Busy)));
}
