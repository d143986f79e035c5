use rill::io::{pipe, Duplex, Frame, PipeOptions, Readable, Stream, Writable};
use rill::runtime::Reactor;
use rill::Fault;

use std::time::Duration;

#[test]
fn reads_come_straight_from_the_buffer() {
    let reactor = Reactor::new().unwrap();
    let stream = Duplex::new(&reactor);
    let _ = stream.write(b"hello");
    let chunk = stream.read(Frame::all());
    reactor.run();
    assert_eq!(chunk.result().unwrap(), b"hello");
}

#[test]
fn a_read_waits_for_the_next_write() {
    let reactor = Reactor::new().unwrap();
    let stream = Duplex::new(&reactor);
    let chunk = stream.read(Frame::all());
    assert!(chunk.is_pending());
    let _ = stream.write(b"later");
    reactor.run();
    assert_eq!(chunk.result().unwrap(), b"later");
}

#[test]
fn delimiter_reads_stop_after_the_delimiter() {
    let reactor = Reactor::new().unwrap();
    let stream = Duplex::new(&reactor);
    let _ = stream.write(b"abc\ndef");
    // any window of at least four bytes gives the same chunk
    let line = stream.read(Frame::bytes_until(64, b'\n'));
    let rest = stream.read(Frame::all());
    reactor.run();
    assert_eq!(line.result().unwrap(), b"abc\n");
    assert_eq!(rest.result().unwrap(), b"def");
}

#[test]
fn a_second_concurrent_read_is_busy() {
    let reactor = Reactor::new().unwrap();
    let stream = Duplex::new(&reactor);
    let first = stream.read(Frame::all());
    let second = stream.read(Frame::all());
    reactor.run();
    assert!(first.is_pending());
    assert_eq!(second.result(), Err(Fault::Busy));
}

#[test]
fn reading_a_closed_stream_is_unreadable() {
    let reactor = Reactor::new().unwrap();
    let stream = Duplex::new(&reactor);
    stream.close(None);
    let chunk = stream.read(Frame::all());
    reactor.run();
    assert_eq!(chunk.result(), Err(Fault::Unreadable));
    assert!(!stream.is_readable());
}

#[test]
fn writing_after_end_is_unwritable() {
    let reactor = Reactor::new().unwrap();
    let stream = Duplex::new(&reactor);
    let _ = stream.end(None);
    let write = stream.write(b"too late");
    reactor.run();
    assert_eq!(write.result(), Err(Fault::Unwritable));
}

#[test]
fn poll_sees_readiness_without_consuming() {
    let reactor = Reactor::new().unwrap();
    let stream = Duplex::new(&reactor);
    let _ = stream.write(b"keep me");
    let peeked = stream.poll();
    let chunk = stream.read(Frame::all());
    reactor.run();
    assert_eq!(peeked.result().unwrap(), b"");
    assert_eq!(chunk.result().unwrap(), b"keep me");
}

#[test]
fn poll_waits_for_data_like_any_read() {
    let reactor = Reactor::new().unwrap();
    let stream = Duplex::new(&reactor);
    let peeked = stream.poll();
    assert!(peeked.is_pending());
    let _ = stream.write(b"arrived");
    let chunk = stream.read(Frame::all());
    reactor.run();
    assert_eq!(peeked.result().unwrap(), b"");
    assert_eq!(chunk.result().unwrap(), b"arrived");
}

#[test]
fn end_writes_its_last_chunk_then_closes() {
    let reactor = Reactor::new().unwrap();
    let stream = Duplex::new(&reactor);
    let chunk = stream.read(Frame::all());
    let ended = stream.end(Some(b"bye"));
    assert!(!stream.is_writable());
    reactor.run();
    assert_eq!(chunk.result().unwrap(), b"bye");
    assert_eq!(ended.result(), Ok(()));
    assert!(!stream.is_open());
}

#[test]
fn close_rejects_the_pending_read_and_is_idempotent() {
    let reactor = Reactor::new().unwrap();
    let stream = Duplex::new(&reactor);
    let orphan = stream.read(Frame::all());
    stream.close(Some(Fault::Logic("going away")));
    stream.close(None);
    reactor.run();
    assert_eq!(orphan.result(), Err(Fault::Logic("going away")));
    assert!(!stream.is_open());
    assert!(!stream.is_writable());
}

#[test]
fn pipe_round_trips_every_byte_in_order() {
    let reactor = Reactor::new().unwrap();
    let source = Duplex::new(&reactor);
    let capture = Duplex::new(&reactor);
    let payload = b"the quick brown fox";
    let _ = source.write(payload);

    let moved = pipe(
        &reactor,
        &source,
        &capture,
        PipeOptions {
            end_on_close: false,
            ..PipeOptions::default()
        },
    );
    // let the pipe drain, then close the source to finish the transfer
    let closer = source.clone();
    reactor.timer(Duration::from_millis(10), move || closer.close(None));

    reactor.run();
    assert_eq!(moved.result().unwrap(), payload.len() as u64);
    let captured = capture.read(Frame::all());
    reactor.run();
    assert_eq!(captured.result().unwrap(), payload);
}

#[test]
fn pipe_honors_a_byte_budget() {
    let reactor = Reactor::new().unwrap();
    let source = Duplex::new(&reactor);
    let dest = Duplex::new(&reactor);
    let _ = source.write(b"abcdef");

    let moved = pipe(
        &reactor,
        &source,
        &dest,
        PipeOptions {
            length: Some(4),
            ..PipeOptions::default()
        },
    );
    reactor.run();
    assert_eq!(moved.result().unwrap(), 4);

    let received = dest.read(Frame::all());
    let retained = source.read(Frame::all());
    reactor.run();
    assert_eq!(received.result().unwrap(), b"abcd");
    assert_eq!(retained.result().unwrap(), b"ef");
}

#[test]
fn pipe_stops_at_its_delimiter() {
    let reactor = Reactor::new().unwrap();
    let source = Duplex::new(&reactor);
    let dest = Duplex::new(&reactor);
    let _ = source.write(b"one\ntwo");

    let moved = pipe(
        &reactor,
        &source,
        &dest,
        PipeOptions {
            delimiter: Some(b'\n'),
            ..PipeOptions::default()
        },
    );
    reactor.run();
    assert_eq!(moved.result().unwrap(), 4);

    let received = dest.read(Frame::all());
    let retained = source.read(Frame::all());
    reactor.run();
    assert_eq!(received.result().unwrap(), b"one\n");
    assert_eq!(retained.result().unwrap(), b"two");
}

#[test]
fn pipe_ends_its_destination_when_the_source_closes() {
    let reactor = Reactor::new().unwrap();
    let source = Duplex::new(&reactor);
    let dest = Duplex::new(&reactor);
    let _ = source.write(b"all of it");

    let moved = pipe(&reactor, &source, &dest, PipeOptions::default());
    let closer = source.clone();
    reactor.timer(Duration::from_millis(10), move || closer.close(None));

    reactor.run();
    assert_eq!(moved.result().unwrap(), 9);
    assert!(!dest.is_writable());
    assert!(!dest.is_open());
}

#[test]
fn a_pipe_keeps_draining_chunks_as_they_arrive() {
    let reactor = Reactor::new().unwrap();
    let source = Duplex::new(&reactor);
    let dest = Duplex::new(&reactor);

    let _ = source.write(b"chunk");
    let moved = pipe(
        &reactor,
        &source,
        &dest,
        PipeOptions {
            end_on_close: false,
            ..PipeOptions::default()
        },
    );

    let more = source.clone();
    reactor.timer(Duration::from_millis(5), move || {
        let _ = more.write(b" two");
    });
    let closer = source.clone();
    reactor.timer(Duration::from_millis(15), move || closer.close(None));

    reactor.run();
    assert_eq!(moved.result().unwrap(), 9);
    let received = dest.read(Frame::all());
    reactor.run();
    assert_eq!(received.result().unwrap(), b"chunk two");
}
