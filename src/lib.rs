//! # spool-io
//!
//! Readiness-multiplexed non-blocking I/O without an async runtime: one
//! poller watches many endpoints, one fixed-capacity buffer mediates every
//! transfer, and a single-threaded reactor loop dispatches accept, read,
//! and write work without per-connection threads.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   poll()    ┌────────────┐   ready set   ┌───────────────────┐
//! │   Reactor    │───────────▶│   Poller   │──────────────▶│ dispatch per token │
//! │ (one thread) │             │ + registry │               │ accept/read/write  │
//! └──────────────┘             └────────────┘               └─────────┬─────────┘
//!                                                                     │
//!                                 ┌───────────┐    fill/flip/drain    │
//!                                 │ ByteBuffer │◀─────────────────────┘
//!                                 └───────────┘   Endpoint <-> app
//! ```
//!
//! - [`ByteBuffer`] is the position/limit/mark state machine every transfer
//!   goes through (fill, [`flip`](buffer::ByteBuffer::flip), drain,
//!   [`compact`](buffer::ByteBuffer::compact) on partial writes).
//! - [`Endpoint`] gives stream, listener, and datagram sockets one
//!   non-blocking contract.
//! - [`Poller`] owns the interest registry and returns an owned, one-shot
//!   ready set per call; registration from other threads wakes a blocked
//!   poll.
//! - [`Reactor`] consumes ready sets and runs the per-endpoint lifecycle,
//!   isolating each endpoint's failures from the rest of the loop.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use spool_io::net::{Echo, Server, ServerConfig};
//!
//! fn main() -> spool_io::Result<()> {
//!     let config = ServerConfig::builder()
//!         .address("127.0.0.1:9898".parse().unwrap())
//!         .buffer_size(1024)
//!         .build();
//!     let mut server = Server::bind(config, Echo)?;
//!     let handle = server.handle(); // handle.stop() from any thread
//!     server.run()
//! }
//! ```

pub mod buffer;
pub mod endpoint;
pub mod error;
pub mod interest;
pub mod net;
pub mod poll;
pub mod pool;
pub mod reactor;

pub use buffer::ByteBuffer;
pub use endpoint::{Endpoint, Lifecycle, ReadOutcome};
pub use error::{Error, Result};
pub use interest::InterestSet;
pub use mio::Token;
pub use poll::{Poller, PollerHandle, Ready, Registration};
pub use pool::{BufferPool, PooledBuffer};
pub use reactor::{ConnectionHandler, Outbox, Reactor, ReactorHandle};

/// Commonly used types in one import.
pub mod prelude {
    pub use crate::buffer::ByteBuffer;
    pub use crate::endpoint::{Endpoint, ReadOutcome};
    pub use crate::error::{Error, Result};
    pub use crate::interest::InterestSet;
    pub use crate::reactor::{ConnectionHandler, Outbox, Reactor, ReactorHandle};
    pub use mio::Token;
}
