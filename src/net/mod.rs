//! Demo-facing networking layer over the reactor core.
//!
//! Everything here is a thin convenience: [`tcp::Server`] wires a listening
//! endpoint and a handler into a [`Reactor`](crate::reactor::Reactor),
//! [`tcp::Client`] drives a connected endpoint by hand the way the
//! original chat client does, and [`udp::DatagramPeer`] exchanges single
//! datagrams through a private poller. The invariants all live below, in
//! the buffer, poller, and reactor.

pub mod config;
pub mod tcp;
pub mod udp;

pub use config::ServerConfig;
pub use tcp::{Client, Echo, Server};
pub use udp::DatagramPeer;
