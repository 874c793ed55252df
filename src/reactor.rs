//! Single-threaded readiness-dispatch loop.
//!
//! The [`Reactor`] owns a [`Poller`] and every registered [`Endpoint`]. Each
//! iteration polls, takes the owned ready set, and dispatches it exactly
//! once: ACCEPT readiness drains `accept()` and registers each new
//! connection for READ; READ readiness drains the stream into the
//! connection's read buffer and hands the bytes to the application's
//! [`ConnectionHandler`]; WRITE readiness flushes the connection's pending
//! buffer, keeping WRITE interest only while a partial write leaves bytes
//! behind.
//!
//! Failure isolation: an I/O error (or handler error) on one endpoint
//! closes and deregisters that endpoint and the loop keeps serving the
//! rest. Only a poller-level failure ends [`run`](Reactor::run).
//!
//! All handlers run on the reactor thread; nothing here executes
//! concurrently with anything else in the same reactor.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mio::Token;
use tracing::{debug, trace, warn};

use crate::buffer::ByteBuffer;
use crate::endpoint::{Endpoint, ReadOutcome};
use crate::error::{Error, Result};
use crate::interest::InterestSet;
use crate::poll::{Poller, PollerHandle, Ready};
use crate::pool::BufferPool;

const DEFAULT_BUFFER_SIZE: usize = 1024;
const SCRATCH_POOL_SIZE: usize = 4;

/// Application callbacks, invoked on the reactor thread.
///
/// Returning an error from `on_data`/`on_datagram` closes the offending
/// endpoint; the reactor itself keeps running.
pub trait ConnectionHandler {
    /// A listener accepted `conn`; it is already registered for READ.
    fn on_accept(&mut self, conn: Token, peer: SocketAddr) {
        let _ = (conn, peer);
    }

    /// Bytes arrived on a stream endpoint. Queue a response with
    /// [`Outbox::send`]; delivery and partial-write retry are the
    /// reactor's job.
    fn on_data(&mut self, conn: Token, data: &[u8], out: &mut Outbox) -> Result<()>;

    /// One datagram arrived. Anything queued on `out` is sent back to
    /// `from` as a single datagram.
    fn on_datagram(&mut self, from: SocketAddr, data: &[u8], out: &mut Outbox) -> Result<()> {
        let _ = (from, data, out);
        Ok(())
    }

    /// The endpoint reached its terminal state and was deregistered.
    fn on_close(&mut self, conn: Token) {
        let _ = conn;
    }

    /// An error was isolated to this endpoint, which is about to close.
    fn on_error(&mut self, conn: Token, error: &Error) {
        let _ = (conn, error);
    }
}

/// Response bytes queued by a handler during one dispatch.
#[derive(Default)]
pub struct Outbox {
    queued: Vec<u8>,
}

impl Outbox {
    pub fn send(&mut self, bytes: &[u8]) {
        self.queued.extend_from_slice(bytes);
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    fn as_bytes(&self) -> &[u8] {
        &self.queued
    }
}

/// Per-connection registration attachment: the read buffer and the
/// pending-write buffer with its partial-write state.
pub(crate) struct Session {
    read_buf: ByteBuffer,
    pending: ByteBuffer,
}

impl Session {
    fn new(buffer_size: usize) -> Self {
        Self {
            read_buf: ByteBuffer::with_capacity(buffer_size),
            pending: ByteBuffer::with_capacity(buffer_size),
        }
    }

    /// Drains the pending buffer through `write` (fill mode on entry and
    /// exit). Returns whether bytes are still pending, in which case the
    /// unread tail was preserved via `compact` for the next writable event.
    fn flush<F>(&mut self, mut write: F) -> Result<bool>
    where
        F: FnMut(&mut ByteBuffer) -> Result<usize>,
    {
        self.pending.flip();
        while self.pending.has_remaining() {
            if write(&mut self.pending)? == 0 {
                break;
            }
        }
        let still_pending = self.pending.has_remaining();
        if still_pending {
            self.pending.compact();
        } else {
            self.pending.clear();
        }
        Ok(still_pending)
    }
}

enum ReadStep {
    /// A chunk was read and handled; `flushed` carries the pending state
    /// when the handler queued a response.
    More { flushed: Option<bool> },
    Idle,
    Eof,
    Failed(Error),
}

pub struct Reactor<H: ConnectionHandler> {
    poller: Poller<Session>,
    endpoints: HashMap<Token, Endpoint>,
    handler: H,
    scratch: BufferPool,
    running: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    buffer_size: usize,
    poll_timeout: Option<Duration>,
    exit_when_idle: bool,
}

impl<H: ConnectionHandler> Reactor<H> {
    pub fn new(handler: H) -> Result<Self> {
        Ok(Self {
            poller: Poller::new()?,
            endpoints: HashMap::new(),
            handler,
            scratch: BufferPool::new(SCRATCH_POOL_SIZE, DEFAULT_BUFFER_SIZE),
            running: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(AtomicBool::new(false)),
            buffer_size: DEFAULT_BUFFER_SIZE,
            poll_timeout: None,
            exit_when_idle: false,
        })
    }

    /// Capacity of every per-connection buffer allocated from here on.
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self.scratch = BufferPool::new(SCRATCH_POOL_SIZE, size);
        self
    }

    /// Poll timeout per loop iteration; `None` (the default) blocks until
    /// work arrives.
    pub fn poll_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Exit `run` once no live registrations remain.
    pub fn exit_when_idle(mut self, enabled: bool) -> Self {
        self.exit_when_idle = enabled;
        self
    }

    pub fn handle(&self) -> ReactorHandle {
        ReactorHandle {
            running: Arc::clone(&self.running),
            stop: Arc::clone(&self.stop),
            poller: self.poller.handle(),
        }
    }

    /// Registers an endpoint with the interest its role implies: ACCEPT
    /// for listeners, READ for streams and datagram sockets.
    pub fn register(&mut self, mut endpoint: Endpoint) -> Result<Token> {
        let (interest, session) = if endpoint.is_listener() {
            (InterestSet::ACCEPT, Session::new(0))
        } else if endpoint.is_datagram() {
            // datagram endpoints are connectionless; reads go through the
            // scratch pool and replies are sent immediately
            (InterestSet::READ, Session::new(0))
        } else {
            (InterestSet::READ, Session::new(self.buffer_size))
        };
        let token = self.poller.handle().register(&mut endpoint, interest, session)?;
        self.endpoints.insert(token, endpoint);
        debug!(token = token.0, "endpoint registered");
        Ok(token)
    }

    /// Runs until [`ReactorHandle::stop`] or, with
    /// [`exit_when_idle`](Self::exit_when_idle), until the last
    /// registration is gone. Poller-level failures are fatal and returned.
    pub fn run(&mut self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        debug!("reactor running");
        let result = self.run_loop();
        // one-shot latch: a stop requested even before `run` is honored,
        // and a later `run` starts fresh
        self.stop.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        debug!("reactor stopped");
        result
    }

    fn run_loop(&mut self) -> Result<()> {
        while !self.stop.load(Ordering::SeqCst) {
            if self.exit_when_idle && self.poller.handle().is_empty() {
                break;
            }
            self.run_once(self.poll_timeout)?;
        }
        Ok(())
    }

    /// One poll-and-dispatch cycle. Returns the number of ready
    /// registrations dispatched; the main loop for tests that need to step
    /// the reactor deterministically.
    pub fn run_once(&mut self, timeout: Option<Duration>) -> Result<usize> {
        let ready = self.poller.poll(timeout)?;
        let dispatched = ready.len();
        for event in ready {
            self.dispatch(event);
        }
        Ok(dispatched)
    }

    fn dispatch(&mut self, event: Ready) {
        trace!(token = event.token.0, readiness = ?event.readiness, "dispatch");
        if event.readiness.is_acceptable() {
            self.on_acceptable(event.token);
        }
        if event.readiness.is_readable() {
            let datagram = self.endpoints.get(&event.token).map(|e| e.is_datagram());
            match datagram {
                Some(true) => self.on_datagram_readable(event.token),
                Some(false) => self.on_stream_readable(event.token),
                None => {}
            }
        }
        if event.readiness.is_writable() {
            self.on_stream_writable(event.token);
        }
    }

    fn on_acceptable(&mut self, token: Token) {
        let handle = self.poller.handle();
        loop {
            let accepted = {
                let Some(listener) = self.endpoints.get_mut(&token) else {
                    return;
                };
                listener.accept()
            };
            match accepted {
                Ok(Some(mut conn)) => {
                    let peer = conn
                        .peer_addr()
                        .unwrap_or_else(|_| SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)));
                    match handle.register(
                        &mut conn,
                        InterestSet::READ,
                        Session::new(self.buffer_size),
                    ) {
                        Ok(conn_token) => {
                            debug!(token = conn_token.0, peer = %peer, "connection accepted");
                            self.endpoints.insert(conn_token, conn);
                            self.handler.on_accept(conn_token, peer);
                        }
                        Err(e) => {
                            warn!(error = %e, "failed to register accepted connection");
                        }
                    }
                }
                Ok(None) => return,
                Err(e) => {
                    self.close_endpoint(token, Some(e));
                    return;
                }
            }
        }
    }

    fn on_stream_readable(&mut self, token: Token) {
        let handle = self.poller.handle();
        let mut pending_after: Option<bool> = None;
        let mut terminal: Option<Option<Error>> = None;

        loop {
            let Some(endpoint) = self.endpoints.get_mut(&token) else {
                return;
            };
            let handler = &mut self.handler;
            let Some(step) = handle.with_attachment(token, |session| {
                session.read_buf.clear();
                match endpoint.read(&mut session.read_buf) {
                    Ok(ReadOutcome::Data(n)) => {
                        trace!(token = token.0, bytes = n, "read");
                        session.read_buf.flip();
                        let mut out = Outbox::default();
                        if let Err(e) =
                            handler.on_data(token, session.read_buf.as_slice(), &mut out)
                        {
                            return ReadStep::Failed(e);
                        }
                        if out.is_empty() {
                            return ReadStep::More { flushed: None };
                        }
                        if let Err(e) = session.pending.put(out.as_bytes()) {
                            return ReadStep::Failed(e);
                        }
                        match session.flush(|buf| endpoint.write(buf)) {
                            Ok(still) => ReadStep::More {
                                flushed: Some(still),
                            },
                            Err(e) => ReadStep::Failed(e),
                        }
                    }
                    Ok(ReadOutcome::WouldBlock) => ReadStep::Idle,
                    Ok(ReadOutcome::Closed) => ReadStep::Eof,
                    Err(e) => ReadStep::Failed(e),
                }
            }) else {
                return;
            };

            match step {
                ReadStep::More { flushed } => {
                    if let Some(still) = flushed {
                        pending_after = Some(still);
                    }
                }
                ReadStep::Idle => break,
                ReadStep::Eof => {
                    terminal = Some(None);
                    break;
                }
                ReadStep::Failed(e) => {
                    terminal = Some(Some(e));
                    break;
                }
            }
        }

        if let Some(error) = terminal {
            self.close_endpoint(token, error);
        } else if let Some(still) = pending_after {
            if let Err(e) = self.sync_write_interest(token, still) {
                self.close_endpoint(token, Some(e));
            }
        }
    }

    fn on_stream_writable(&mut self, token: Token) {
        let handle = self.poller.handle();
        let result = {
            let Some(endpoint) = self.endpoints.get_mut(&token) else {
                return;
            };
            handle.with_attachment(token, |session| {
                session.flush(|buf| endpoint.write(buf))
            })
        };
        match result {
            None => {}
            Some(Ok(still_pending)) => {
                if let Err(e) = self.sync_write_interest(token, still_pending) {
                    self.close_endpoint(token, Some(e));
                }
            }
            Some(Err(e)) => self.close_endpoint(token, Some(e)),
        }
    }

    fn on_datagram_readable(&mut self, token: Token) {
        let mut fatal = None;
        loop {
            let mut scratch = self.scratch.acquire();
            let from = {
                let Some(endpoint) = self.endpoints.get_mut(&token) else {
                    return;
                };
                match endpoint.receive(&mut scratch) {
                    Ok(Some(from)) => from,
                    Ok(None) => break,
                    Err(e) => {
                        fatal = Some(e);
                        break;
                    }
                }
            };
            scratch.flip();
            trace!(token = token.0, from = %from, bytes = scratch.remaining(), "datagram");

            let mut out = Outbox::default();
            if let Err(e) = self.handler.on_datagram(from, scratch.as_slice(), &mut out) {
                fatal = Some(e);
                break;
            }
            if out.is_empty() {
                continue;
            }

            let mut reply = self.scratch.acquire();
            if let Err(e) = reply.put(out.as_bytes()) {
                fatal = Some(e);
                break;
            }
            reply.flip();
            let Some(endpoint) = self.endpoints.get_mut(&token) else {
                return;
            };
            match endpoint.send(&mut reply, from) {
                Ok(0) => warn!(to = %from, "datagram reply dropped, socket not writable"),
                Ok(_) => {}
                Err(e) => {
                    fatal = Some(e);
                    break;
                }
            }
        }
        if let Some(e) = fatal {
            self.close_endpoint(token, Some(e));
        }
    }

    fn sync_write_interest(&mut self, token: Token, want_write: bool) -> Result<()> {
        let handle = self.poller.handle();
        let Some(current) = handle.interest_of(token) else {
            return Ok(());
        };
        let desired = if want_write {
            current | InterestSet::WRITE
        } else {
            current.without(InterestSet::WRITE)
        };
        if desired == current {
            return Ok(());
        }
        let Some(endpoint) = self.endpoints.get_mut(&token) else {
            return Ok(());
        };
        handle.update_interest(endpoint, token, desired)
    }

    /// Cancels the registration first, then releases the endpoint, so no
    /// event can be dispatched to it afterwards.
    fn close_endpoint(&mut self, token: Token, error: Option<Error>) {
        if let Some(e) = &error {
            warn!(token = token.0, error = %e, "closing endpoint after error");
            self.handler.on_error(token, e);
        }
        let handle = self.poller.handle();
        if let Some(mut endpoint) = self.endpoints.remove(&token) {
            let _ = handle.cancel(&mut endpoint, token);
            endpoint.close();
            self.handler.on_close(token);
            debug!(token = token.0, "endpoint closed");
        }
    }
}

/// Cross-thread control over a running reactor.
#[derive(Clone)]
pub struct ReactorHandle {
    running: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    poller: PollerHandle<Session>,
}

impl ReactorHandle {
    /// Signals the loop to exit and wakes a blocked poll. The loop finishes
    /// its current cycle and returns from `run`.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        let _ = self.poller.wake();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn live_registrations(&self) -> usize {
        self.poller.len()
    }
}
