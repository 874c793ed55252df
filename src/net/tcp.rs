//! Stream server and client conveniences.

use std::net::SocketAddr;
use std::thread::sleep;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use mio::Token;
use tracing::info;

use crate::buffer::ByteBuffer;
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::net::config::ServerConfig;
use crate::reactor::{ConnectionHandler, Outbox, Reactor, ReactorHandle};

/// Handler that echoes every payload back to its sender, streams and
/// datagrams alike.
#[derive(Debug, Clone, Copy, Default)]
pub struct Echo;

impl ConnectionHandler for Echo {
    fn on_data(&mut self, _conn: Token, data: &[u8], out: &mut Outbox) -> Result<()> {
        out.send(data);
        Ok(())
    }

    fn on_datagram(&mut self, _from: SocketAddr, data: &[u8], out: &mut Outbox) -> Result<()> {
        out.send(data);
        Ok(())
    }
}

/// A bound listening endpoint wired into a reactor with its handler.
pub struct Server<H: ConnectionHandler> {
    reactor: Reactor<H>,
    local_addr: SocketAddr,
}

impl<H: ConnectionHandler> Server<H> {
    pub fn bind(config: ServerConfig, handler: H) -> Result<Self> {
        let mut reactor = Reactor::new(handler)?
            .buffer_size(config.buffer_size)
            .poll_timeout(config.poll_timeout)
            .exit_when_idle(config.exit_when_idle);
        let listener = Endpoint::listen(config.address)?;
        let local_addr = listener.local_addr()?;
        reactor.register(listener)?;
        info!(addr = %local_addr, "listening");
        Ok(Self {
            reactor,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> ReactorHandle {
        self.reactor.handle()
    }

    /// Runs the reactor loop on the calling thread until stopped.
    pub fn run(&mut self) -> Result<()> {
        self.reactor.run()
    }

    /// Access to the underlying reactor, e.g. to register extra endpoints
    /// (a datagram socket next to the listener) before running.
    pub fn reactor_mut(&mut self) -> &mut Reactor<H> {
        &mut self.reactor
    }
}

/// Prefixes `text` with the send time, the wire format of the chat demo:
/// `"<unix-seconds>\n<text>"`.
pub fn stamp(text: &str) -> Vec<u8> {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());
    format!("{seconds}\n{text}").into_bytes()
}

/// Send-side client for the chat demo. Drives its endpoint directly, with
/// a short sleep when the socket is not writable yet; the reactor is for
/// the serving side.
pub struct Client {
    endpoint: Endpoint,
    buffer: ByteBuffer,
}

impl Client {
    pub fn connect(addr: SocketAddr) -> Result<Self> {
        Self::with_buffer_size(addr, 1024)
    }

    pub fn with_buffer_size(addr: SocketAddr, buffer_size: usize) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::connect(addr)?,
            buffer: ByteBuffer::with_capacity(buffer_size),
        })
    }

    /// Sends a timestamp-stamped line, the demo payload.
    pub fn send_line(&mut self, text: &str) -> Result<()> {
        self.send(&stamp(text))
    }

    /// Fills, flips, and drains the client buffer until `payload` is fully
    /// written.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        for chunk in payload.chunks(self.buffer.capacity().max(1)) {
            self.buffer.clear();
            self.buffer.put(chunk)?;
            self.buffer.flip();
            while self.buffer.has_remaining() {
                if self.endpoint.write(&mut self.buffer)? == 0 {
                    // freshly-connected sockets may not be writable yet
                    sleep(Duration::from_millis(1));
                }
            }
        }
        Ok(())
    }

    pub fn close(&mut self) {
        self.endpoint.close();
    }
}
