//! Polymorphic, always-non-blocking connection endpoints.
//!
//! An [`Endpoint`] wraps one of three socket roles behind a uniform
//! contract: a connected byte stream, a listening socket, or a datagram
//! socket. Every operation returns immediately; "not ready yet" surfaces as
//! [`ReadOutcome::WouldBlock`], `accept() -> None`, `receive() -> None`, or
//! a zero count from `write`/`send`, never as an error. Peer shutdown is
//! [`ReadOutcome::Closed`], also not an error.

use std::io::{self, ErrorKind};
use std::net::SocketAddr;

use mio::net::{TcpListener, TcpStream, UdpSocket};
use tracing::trace;

use crate::buffer::ByteBuffer;
use crate::error::{Error, Result};

/// Endpoint lifecycle. Registration moves `Open -> Registered`; `close`
/// moves any state to `Closed` and releases the OS handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Open,
    Registered,
    Closed,
}

/// Result of a non-blocking stream read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// That many bytes were appended into the buffer.
    Data(usize),
    /// Nothing available right now; wait for the next READ readiness.
    WouldBlock,
    /// The peer closed its write side. The caller must close the endpoint.
    Closed,
}

#[derive(Debug)]
enum Socket {
    Stream(TcpStream),
    Listener(TcpListener),
    Datagram(UdpSocket),
}

#[derive(Debug)]
pub struct Endpoint {
    socket: Option<Socket>,
    state: Lifecycle,
}

fn wrong_role(op: &str) -> Error {
    Error::Connection(io::Error::new(
        ErrorKind::InvalidInput,
        format!("{op} not supported by this endpoint role"),
    ))
}

impl Endpoint {
    /// Binds a listening endpoint in `ACCEPTING`-capable state.
    pub fn listen(addr: SocketAddr) -> Result<Self> {
        Ok(Self::wrap(Socket::Listener(TcpListener::bind(addr)?)))
    }

    /// Opens a non-blocking stream endpoint toward `addr`. The connection
    /// completes in the background; the first writable readiness signals it.
    pub fn connect(addr: SocketAddr) -> Result<Self> {
        Ok(Self::wrap(Socket::Stream(TcpStream::connect(addr)?)))
    }

    /// Binds a datagram endpoint.
    pub fn datagram(addr: SocketAddr) -> Result<Self> {
        Ok(Self::wrap(Socket::Datagram(UdpSocket::bind(addr)?)))
    }

    fn wrap(socket: Socket) -> Self {
        Self {
            socket: Some(socket),
            state: Lifecycle::Open,
        }
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    pub fn is_listener(&self) -> bool {
        matches!(self.socket, Some(Socket::Listener(_)))
    }

    pub fn is_stream(&self) -> bool {
        matches!(self.socket, Some(Socket::Stream(_)))
    }

    pub fn is_datagram(&self) -> bool {
        matches!(self.socket, Some(Socket::Datagram(_)))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        match self.socket.as_ref().ok_or(Error::AlreadyClosed)? {
            Socket::Stream(s) => Ok(s.local_addr()?),
            Socket::Listener(l) => Ok(l.local_addr()?),
            Socket::Datagram(d) => Ok(d.local_addr()?),
        }
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        match self.socket.as_ref().ok_or(Error::AlreadyClosed)? {
            Socket::Stream(s) => Ok(s.peer_addr()?),
            _ => Err(wrong_role("peer_addr")),
        }
    }

    /// Reads into `buf`'s free region (fill mode). Reading into a buffer
    /// with no room reports `WouldBlock` rather than conflating a full
    /// buffer with EOF.
    pub fn read(&mut self, buf: &mut ByteBuffer) -> Result<ReadOutcome> {
        let stream = match self.socket.as_mut().ok_or(Error::AlreadyClosed)? {
            Socket::Stream(s) => s,
            _ => return Err(wrong_role("read")),
        };
        if !buf.has_remaining() {
            return Ok(ReadOutcome::WouldBlock);
        }
        loop {
            match buf.fill_from(stream) {
                Ok(0) => return Ok(ReadOutcome::Closed),
                Ok(n) => return Ok(ReadOutcome::Data(n)),
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    return Ok(ReadOutcome::WouldBlock)
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Connection(e)),
            }
        }
    }

    /// Drains `buf` (drain mode) into the stream. May accept fewer bytes
    /// than `remaining()`; returns 0 when the socket is not writable yet.
    /// The caller keeps the tail via `compact` and retries on the next
    /// writable event.
    pub fn write(&mut self, buf: &mut ByteBuffer) -> Result<usize> {
        let stream = match self.socket.as_mut().ok_or(Error::AlreadyClosed)? {
            Socket::Stream(s) => s,
            _ => return Err(wrong_role("write")),
        };
        loop {
            match buf.drain_to(stream) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(0),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Connection(e)),
            }
        }
    }

    /// Accepts one pending connection, already non-blocking. `None` when no
    /// connection is pending; only meaningful after ACCEPT readiness.
    pub fn accept(&mut self) -> Result<Option<Endpoint>> {
        let listener = match self.socket.as_ref().ok_or(Error::AlreadyClosed)? {
            Socket::Listener(l) => l,
            _ => return Err(wrong_role("accept")),
        };
        match listener.accept() {
            Ok((stream, peer)) => {
                trace!(peer = %peer, "accepted stream");
                Ok(Some(Self::wrap(Socket::Stream(stream))))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(Error::Connection(e)),
        }
    }

    /// Receives one datagram into `buf`'s free region, returning the sender
    /// address, or `None` when nothing is pending.
    pub fn receive(&mut self, buf: &mut ByteBuffer) -> Result<Option<SocketAddr>> {
        let socket = match self.socket.as_ref().ok_or(Error::AlreadyClosed)? {
            Socket::Datagram(d) => d,
            _ => return Err(wrong_role("receive")),
        };
        let mut sender = None;
        let filled = buf.fill_with(|dst| {
            let (n, from) = socket.recv_from(dst)?;
            sender = Some(from);
            Ok(n)
        });
        match filled {
            Ok(_) => Ok(sender),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(Error::Connection(e)),
        }
    }

    /// Sends `buf`'s remaining bytes as one datagram to `dest`. Datagrams
    /// are atomic: the payload is fully consumed, or 0 is returned when the
    /// socket is not writable yet, or the call fails. A partial kernel send
    /// is surfaced as [`Error::Datagram`].
    pub fn send(&mut self, buf: &mut ByteBuffer, dest: SocketAddr) -> Result<usize> {
        let socket = match self.socket.as_ref().ok_or(Error::AlreadyClosed)? {
            Socket::Datagram(d) => d,
            _ => return Err(wrong_role("send")),
        };
        let payload = buf.remaining();
        match socket.send_to(buf.as_slice(), dest) {
            Ok(n) => {
                buf.get(n)?;
                if n < payload {
                    return Err(Error::Datagram {
                        sent: n,
                        remaining: payload - n,
                    });
                }
                Ok(n)
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(Error::Connection(e)),
        }
    }

    /// Releases the OS handle. Idempotent; the caller is responsible for
    /// cancelling any live registration first.
    pub fn close(&mut self) {
        if self.socket.take().is_some() {
            trace!("endpoint closed");
        }
        self.state = Lifecycle::Closed;
    }

    pub(crate) fn source_mut(&mut self) -> Result<&mut dyn mio::event::Source> {
        match self.socket.as_mut().ok_or(Error::AlreadyClosed)? {
            Socket::Stream(s) => Ok(s),
            Socket::Listener(l) => Ok(l),
            Socket::Datagram(d) => Ok(d),
        }
    }

    pub(crate) fn mark_registered(&mut self) {
        if self.state == Lifecycle::Open {
            self.state = Lifecycle::Registered;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::thread::sleep;
    use std::time::{Duration, Instant};

    fn localhost() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    fn spin_until<T>(mut attempt: impl FnMut() -> Option<T>) -> T {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(v) = attempt() {
                return v;
            }
            assert!(Instant::now() < deadline, "timed out waiting for readiness");
            sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn accept_then_read_until_peer_closes() {
        let mut listener = Endpoint::listen(localhost()).unwrap();
        let addr = listener.local_addr().unwrap();

        let mut client = std::net::TcpStream::connect(addr).unwrap();
        let mut server = spin_until(|| listener.accept().unwrap());
        assert!(server.is_stream());
        assert_eq!(server.state(), Lifecycle::Open);

        client.write_all(b"hello").unwrap();
        drop(client);

        let mut buf = ByteBuffer::with_capacity(1024);
        let mut total = 0;
        let mut saw_eof = false;
        spin_until(|| {
            match server.read(&mut buf).unwrap() {
                ReadOutcome::Data(n) => total += n,
                ReadOutcome::WouldBlock => {}
                ReadOutcome::Closed => saw_eof = true,
            }
            saw_eof.then_some(())
        });
        assert_eq!(total, 5);
        buf.flip();
        assert_eq!(buf.as_slice(), b"hello");

        server.close();
        server.close(); // idempotent
        assert_eq!(server.state(), Lifecycle::Closed);
        assert!(matches!(
            server.read(&mut buf),
            Err(Error::AlreadyClosed)
        ));
    }

    #[test]
    fn accept_without_pending_connection_returns_none() {
        let mut listener = Endpoint::listen(localhost()).unwrap();
        assert!(listener.accept().unwrap().is_none());
    }

    #[test]
    fn datagram_ping_round_trip() {
        let mut a = Endpoint::datagram(localhost()).unwrap();
        let mut b = Endpoint::datagram(localhost()).unwrap();
        let a_addr = a.local_addr().unwrap();
        let b_addr = b.local_addr().unwrap();

        let mut out = ByteBuffer::with_capacity(1024);
        out.put(b"ping").unwrap();
        out.flip();
        spin_until(|| (a.send(&mut out, b_addr).unwrap() > 0).then_some(()));
        assert!(!out.has_remaining());

        let mut inbuf = ByteBuffer::with_capacity(1024);
        let from = spin_until(|| b.receive(&mut inbuf).unwrap());
        assert_eq!(from, a_addr);
        inbuf.flip();
        assert_eq!(inbuf.as_slice(), b"ping");
    }

    #[test]
    fn role_mismatch_is_an_error() {
        let mut listener = Endpoint::listen(localhost()).unwrap();
        let mut buf = ByteBuffer::with_capacity(16);
        assert!(listener.read(&mut buf).is_err());
        let mut datagram = Endpoint::datagram(localhost()).unwrap();
        assert!(datagram.accept().is_err());
    }
}
