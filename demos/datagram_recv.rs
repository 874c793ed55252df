//! Datagram receiver: prints every payload arriving on 9988 with its
//! sender.

use anyhow::Result;
use spool_io::net::DatagramPeer;

fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let mut peer = DatagramPeer::bind("127.0.0.1:9988".parse()?)?;
    println!("receiving on {}", peer.local_addr()?);

    loop {
        if let Some((from, payload)) = peer.receive(None)? {
            println!("{from}: {}", String::from_utf8_lossy(&payload));
        }
    }
}
