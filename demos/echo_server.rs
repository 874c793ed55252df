//! Reactor echo server on the chat demo port.
//!
//! Serves stream connections on 9898 and datagrams on 9988, echoing every
//! payload back to its sender. Pair it with the `chat_client` and
//! `datagram_send` demos.

use anyhow::Result;
use spool_io::net::{Echo, Server, ServerConfig};
use spool_io::Endpoint;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::builder()
        .address("127.0.0.1:9898".parse()?)
        .buffer_size(1024)
        .build();
    let mut server = Server::bind(config, Echo)?;

    let datagram = Endpoint::datagram("127.0.0.1:9988".parse()?)?;
    server.reactor_mut().register(datagram)?;

    println!("echo server on 127.0.0.1:9898 (tcp) and 127.0.0.1:9988 (udp)");
    server.run()?;
    Ok(())
}
