//! Datagram sender: each stdin line goes to 9988 as one stamped datagram.

use std::io::{self, BufRead};

use anyhow::Result;
use spool_io::net::{tcp::stamp, DatagramPeer};

fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let mut peer = DatagramPeer::bind("127.0.0.1:0".parse()?)?;
    let dest = "127.0.0.1:9988".parse()?;
    println!("sending to {dest}; type lines to send, ctrl-d to quit");

    for line in io::stdin().lock().lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        peer.send(&stamp(&line), dest)?;
    }
    Ok(())
}
