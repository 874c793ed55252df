//! Readiness poller and interest registry.
//!
//! A [`Poller`] owns the OS selector plus the registration table: one entry
//! per endpoint pairing its interest set with an opaque attachment `A`.
//! Polling blocks until at least one registration is ready (or a timeout
//! elapses) and returns an owned, one-shot `Vec<Ready>` snapshot that the
//! caller drains fully before the next call.
//!
//! Registrations may be submitted, updated, or cancelled from other threads
//! through a cloned [`PollerHandle`]; the table is mutex-serialized and
//! every submission wakes a blocked poll, so changes take effect on the
//! next call rather than retroactively.

use std::collections::HashMap;
use std::io::{self, ErrorKind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mio::{Events, Poll, Token, Waker};

use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::interest::InterestSet;

/// Reserved for the cross-thread waker; never handed out.
const WAKER_TOKEN: Token = Token(0);

const DEFAULT_EVENTS_CAPACITY: usize = 1024;

/// One registered endpoint: its current interest set and the caller's
/// attachment (typically per-connection buffer state).
pub struct Registration<A> {
    pub interest: InterestSet,
    pub attachment: A,
}

/// A ready registration as observed by one poll call. The readiness set is
/// a snapshot; it is consumed with this value and never redelivered.
#[derive(Debug, Clone, Copy)]
pub struct Ready {
    pub token: Token,
    pub readiness: InterestSet,
}

struct Shared<A> {
    registry: mio::Registry,
    entries: Mutex<HashMap<Token, Registration<A>>>,
    waker: Waker,
    next_token: AtomicUsize,
}

pub struct Poller<A> {
    poll: Poll,
    events: Events,
    shared: Arc<Shared<A>>,
}

impl<A> Poller<A> {
    pub fn new() -> Result<Self> {
        Self::with_capacity(DEFAULT_EVENTS_CAPACITY)
    }

    /// `events_capacity` bounds how many OS events one poll call can
    /// surface; excess readiness is reported by the following call.
    pub fn with_capacity(events_capacity: usize) -> Result<Self> {
        let poll = Poll::new()?;
        let registry = poll.registry().try_clone()?;
        let waker = Waker::new(poll.registry(), WAKER_TOKEN)?;
        Ok(Self {
            poll,
            events: Events::with_capacity(events_capacity),
            shared: Arc::new(Shared {
                registry,
                entries: Mutex::new(HashMap::new()),
                waker,
                next_token: AtomicUsize::new(1),
            }),
        })
    }

    /// Cloneable handle for registration management, usable from any
    /// thread.
    pub fn handle(&self) -> PollerHandle<A> {
        PollerHandle(Arc::clone(&self.shared))
    }

    /// Blocks until at least one registration is ready or `timeout`
    /// elapses. `None` blocks indefinitely; `Some(Duration::ZERO)` is a
    /// non-blocking check. An empty vec means the timeout elapsed (or the
    /// poll was woken for new work).
    pub fn poll(&mut self, timeout: Option<Duration>) -> Result<Vec<Ready>> {
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(e) => return Err(Error::Io(e)),
        }

        let entries = self.shared.entries.lock().unwrap();
        let mut ready = Vec::new();
        for event in self.events.iter() {
            if event.token() == WAKER_TOKEN {
                continue;
            }
            // A registration cancelled since the OS queued this event must
            // not be dispatched.
            let Some(entry) = entries.get(&event.token()) else {
                continue;
            };
            let mut readiness = InterestSet::empty();
            if event.is_readable() {
                if entry.interest.is_acceptable() {
                    readiness |= InterestSet::ACCEPT;
                }
                if entry.interest.is_readable() {
                    readiness |= InterestSet::READ;
                }
            }
            if event.is_writable() && entry.interest.is_writable() {
                readiness |= InterestSet::WRITE;
            }
            if !readiness.is_empty() {
                ready.push(Ready {
                    token: event.token(),
                    readiness,
                });
            }
        }
        Ok(ready)
    }
}

pub struct PollerHandle<A>(Arc<Shared<A>>);

impl<A> Clone for PollerHandle<A> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<A> PollerHandle<A> {
    /// Registers `endpoint` with the given interest set and attachment.
    /// Fails with [`Error::AlreadyClosed`] on a closed endpoint. Wakes a
    /// blocked poll so work submitted from another thread is picked up on
    /// the next call.
    pub fn register(
        &self,
        endpoint: &mut Endpoint,
        interest: InterestSet,
        attachment: A,
    ) -> Result<Token> {
        let mio_interest = non_empty(interest)?;
        let token = Token(self.0.next_token.fetch_add(1, Ordering::Relaxed));
        self.0
            .registry
            .register(endpoint.source_mut()?, token, mio_interest)?;
        endpoint.mark_registered();
        self.0.entries.lock().unwrap().insert(
            token,
            Registration {
                interest,
                attachment,
            },
        );
        self.0.waker.wake()?;
        Ok(token)
    }

    /// Replaces the interest set of an existing registration in place; no
    /// duplicate entry is ever created for one endpoint.
    pub fn update_interest(
        &self,
        endpoint: &mut Endpoint,
        token: Token,
        interest: InterestSet,
    ) -> Result<()> {
        let mio_interest = non_empty(interest)?;
        let mut entries = self.0.entries.lock().unwrap();
        let Some(entry) = entries.get_mut(&token) else {
            return Err(Error::AlreadyClosed);
        };
        self.0
            .registry
            .reregister(endpoint.source_mut()?, token, mio_interest)?;
        entry.interest = interest;
        Ok(())
    }

    /// Removes a registration, returning its attachment. After this call
    /// the poller never dispatches the token again, even for events the OS
    /// has already queued. Safe to call with an already-closed endpoint.
    pub fn cancel(&self, endpoint: &mut Endpoint, token: Token) -> Option<A> {
        let removed = self.0.entries.lock().unwrap().remove(&token);
        if removed.is_some() {
            if let Ok(source) = endpoint.source_mut() {
                let _ = self.0.registry.deregister(source);
            }
        }
        removed.map(|r| r.attachment)
    }

    pub fn interest_of(&self, token: Token) -> Option<InterestSet> {
        self.0
            .entries
            .lock()
            .unwrap()
            .get(&token)
            .map(|e| e.interest)
    }

    /// Runs `f` against the attachment of a live registration.
    pub fn with_attachment<R>(&self, token: Token, f: impl FnOnce(&mut A) -> R) -> Option<R> {
        self.0
            .entries
            .lock()
            .unwrap()
            .get_mut(&token)
            .map(|e| f(&mut e.attachment))
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.0.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forces a blocked poll to return early with an empty ready set.
    pub fn wake(&self) -> Result<()> {
        self.0.waker.wake()?;
        Ok(())
    }
}

fn non_empty(interest: InterestSet) -> Result<mio::Interest> {
    interest.to_mio().ok_or_else(|| {
        Error::Io(io::Error::new(
            ErrorKind::InvalidInput,
            "empty interest set; cancel the registration instead",
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    fn localhost() -> std::net::SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn zero_timeout_poll_returns_empty() {
        let mut poller: Poller<()> = Poller::new().unwrap();
        let ready = poller.poll(Some(Duration::ZERO)).unwrap();
        assert!(ready.is_empty());
    }

    #[test]
    fn pending_connection_reports_accept_readiness() {
        let mut poller: Poller<()> = Poller::new().unwrap();
        let handle = poller.handle();

        let mut listener = Endpoint::listen(localhost()).unwrap();
        let addr = listener.local_addr().unwrap();
        let token = handle
            .register(&mut listener, InterestSet::ACCEPT, ())
            .unwrap();
        assert_eq!(listener.state(), crate::endpoint::Lifecycle::Registered);

        let _client = std::net::TcpStream::connect(addr).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let ready = poller.poll(Some(Duration::from_millis(100))).unwrap();
            if let Some(ev) = ready.iter().find(|r| r.token == token) {
                assert!(ev.readiness.is_acceptable());
                assert!(!ev.readiness.is_writable());
                break;
            }
            assert!(Instant::now() < deadline);
        }
    }

    #[test]
    fn registering_closed_endpoint_fails() {
        let poller: Poller<()> = Poller::new().unwrap();
        let mut endpoint = Endpoint::listen(localhost()).unwrap();
        endpoint.close();
        let err = poller
            .handle()
            .register(&mut endpoint, InterestSet::ACCEPT, ())
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyClosed));
    }

    #[test]
    fn cancelled_registration_is_never_dispatched() {
        let mut poller: Poller<()> = Poller::new().unwrap();
        let handle = poller.handle();

        let mut listener = Endpoint::listen(localhost()).unwrap();
        let addr = listener.local_addr().unwrap();
        let token = handle
            .register(&mut listener, InterestSet::ACCEPT, ())
            .unwrap();

        let _client = std::net::TcpStream::connect(addr).unwrap();
        handle.cancel(&mut listener, token);
        assert!(handle.is_empty());

        let ready = poller.poll(Some(Duration::from_millis(200))).unwrap();
        assert!(ready.iter().all(|r| r.token != token));
    }

    #[test]
    fn registration_from_another_thread_wakes_a_blocked_poll() {
        let mut poller: Poller<u32> = Poller::new().unwrap();
        let handle = poller.handle();

        let registrar = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            let mut listener = Endpoint::listen(localhost()).unwrap();
            handle
                .register(&mut listener, InterestSet::ACCEPT, 7)
                .unwrap();
            listener
        });

        // Blocks with no timeout; only the registration wake can release it.
        let ready = poller.poll(None).unwrap();
        assert!(ready.is_empty());

        let _listener = registrar.join().unwrap();
        assert_eq!(poller.handle().len(), 1);
        assert_eq!(poller.handle().with_attachment(Token(1), |a| *a), Some(7));
    }

    #[test]
    fn empty_interest_set_is_rejected() {
        let poller: Poller<()> = Poller::new().unwrap();
        let mut listener = Endpoint::listen(localhost()).unwrap();
        assert!(poller
            .handle()
            .register(&mut listener, InterestSet::empty(), ())
            .is_err());
    }
}
