use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure taxonomy for the crate.
///
/// Buffer and mark violations are programmer errors and fail the offending
/// call immediately; they are never retried. [`Error::Connection`] is scoped
/// to a single endpoint: the reactor closes and deregisters that endpoint
/// and keeps serving the rest. [`Error::Io`] is poller-level and fatal to
/// the reactor loop.
#[derive(Debug, Error)]
pub enum Error {
    /// `put` past the buffer's limit.
    #[error("buffer overflow: put of {requested} bytes with {remaining} remaining")]
    BufferOverflow { requested: usize, remaining: usize },

    /// `get` past the buffer's limit.
    #[error("buffer underflow: get of {requested} bytes with {remaining} remaining")]
    BufferUnderflow { requested: usize, remaining: usize },

    /// `reset` without a prior `mark`.
    #[error("reset called without a mark")]
    InvalidMark,

    /// Operation on an endpoint whose OS handle has been released.
    #[error("endpoint already closed")]
    AlreadyClosed,

    /// I/O failure on a single endpoint. Recovered by closing and
    /// deregistering that endpoint; never tears down the loop.
    #[error("connection error: {0}")]
    Connection(#[source] io::Error),

    /// A datagram send consumed only part of the payload.
    #[error("datagram send consumed {sent} bytes, {remaining} left unsent")]
    Datagram { sent: usize, remaining: usize },

    /// Poller or OS-level failure. Fatal to the reactor loop.
    #[error(transparent)]
    Io(#[from] io::Error),
}
