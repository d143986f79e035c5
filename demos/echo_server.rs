use anyhow::Result;
use rill::io::{Frame, Readable, Writable};
use rill::net::{TcpListener, TcpStream};
use rill::runtime::Reactor;

fn main() -> Result<()> {
    let reactor = Reactor::new()?;
    let listener = TcpListener::bind(&reactor, "127.0.0.1:8080")?;
    println!("Listening on 127.0.0.1:{}", listener.local_port()?);
    println!("type `nc localhost 8080` to create a TCP client");

    serve(listener);
    reactor.run();
    Ok(())
}

/// Accept forever, echoing each connection line by line.
fn serve(listener: TcpListener) {
    let next = listener.clone();
    listener.accept().done(move |stream| {
        echo(stream);
        serve(next);
    });
}

fn echo(stream: TcpStream) {
    let sink = stream.clone();
    stream.read(Frame::until(b'\n')).done_or(
        move |line| {
            let again = sink.clone();
            sink.write(&line).done(move |_| echo(again));
        },
        |_closed| {},
    );
}
