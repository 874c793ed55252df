//! One-datagram-at-a-time peer over the poller.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use mio::Token;

use crate::buffer::ByteBuffer;
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::interest::InterestSet;
use crate::poll::Poller;

/// A bound datagram endpoint with its own poller.
///
/// `send` consumes the whole payload atomically (waiting for writability if
/// the socket is momentarily full); `receive` waits up to `timeout` for one
/// datagram and returns the sender with the payload. Datagram endpoints
/// carry no connection state, so there is nothing here beyond the two
/// calls.
pub struct DatagramPeer {
    endpoint: Endpoint,
    poller: Poller<()>,
    token: Token,
    buffer: ByteBuffer,
}

impl DatagramPeer {
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        Self::with_buffer_size(addr, 1024)
    }

    pub fn with_buffer_size(addr: SocketAddr, buffer_size: usize) -> Result<Self> {
        let mut endpoint = Endpoint::datagram(addr)?;
        let mut poller = Poller::new()?;
        let token = poller
            .handle()
            .register(&mut endpoint, InterestSet::READ, ())?;
        Ok(Self {
            endpoint,
            poller,
            token,
            buffer: ByteBuffer::with_capacity(buffer_size),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.endpoint.local_addr()
    }

    /// Sends `payload` as one datagram to `dest`.
    pub fn send(&mut self, payload: &[u8], dest: SocketAddr) -> Result<()> {
        self.buffer.clear();
        self.buffer.put(payload)?;
        self.buffer.flip();
        while self.endpoint.send(&mut self.buffer, dest)? == 0 {
            self.wait_writable()?;
        }
        Ok(())
    }

    fn wait_writable(&mut self) -> Result<()> {
        let handle = self.poller.handle();
        handle.update_interest(
            &mut self.endpoint,
            self.token,
            InterestSet::READ | InterestSet::WRITE,
        )?;
        loop {
            let ready = self.poller.poll(None)?;
            if ready.iter().any(|r| r.readiness.is_writable()) {
                break;
            }
        }
        handle.update_interest(&mut self.endpoint, self.token, InterestSet::READ)
    }

    /// Waits up to `timeout` for one datagram; `None` blocks indefinitely.
    /// Returns the sender address and payload, or `None` on timeout. Waker
    /// wakeups and readiness for the wrong condition re-enter the wait
    /// against the original deadline.
    pub fn receive(&mut self, timeout: Option<Duration>) -> Result<Option<(SocketAddr, Vec<u8>)>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            // a datagram may already be queued from a previous readiness
            self.buffer.clear();
            if let Some(from) = self.endpoint.receive(&mut self.buffer)? {
                self.buffer.flip();
                return Ok(Some((from, self.buffer.as_slice().to_vec())));
            }
            let wait = match deadline {
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return Ok(None);
                    }
                    Some(d - now)
                }
                None => None,
            };
            self.poller.poll(wait)?;
        }
    }
}
