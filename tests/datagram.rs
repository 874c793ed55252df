//! End-to-end datagram tests.

use std::thread;
use std::time::Duration;

use spool_io::net::{DatagramPeer, Echo};
use spool_io::{Endpoint, Reactor};

#[test]
fn peer_to_peer_ping_carries_sender_and_payload() {
    let mut a = DatagramPeer::bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let mut b = DatagramPeer::bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let a_addr = a.local_addr().unwrap();
    let b_addr = b.local_addr().unwrap();

    a.send(b"ping", b_addr).unwrap();
    let (from, payload) = b
        .receive(Some(Duration::from_secs(5)))
        .unwrap()
        .expect("datagram within the timeout");
    assert_eq!(from, a_addr);
    assert_eq!(payload, b"ping");
}

#[test]
fn reactor_echoes_datagrams() {
    let mut reactor = Reactor::new(Echo).unwrap();
    let socket = Endpoint::datagram("127.0.0.1:0".parse().unwrap()).unwrap();
    let addr = socket.local_addr().unwrap();
    reactor.register(socket).unwrap();
    let handle = reactor.handle();
    let join = thread::spawn(move || reactor.run());

    let client = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    client.send_to(b"ping", addr).unwrap();

    let mut buf = [0u8; 16];
    let (n, from) = client.recv_from(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"ping");
    assert_eq!(from, addr);

    handle.stop();
    join.join().unwrap().unwrap();
}
