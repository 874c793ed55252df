//! Stdin-driven chat client: each line is sent to the echo server stamped
//! as `"<unix-seconds>\n<text>"`.

use std::io::{self, BufRead};

use anyhow::Result;
use spool_io::net::Client;

fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let mut client = Client::connect("127.0.0.1:9898".parse()?)?;
    println!("connected; type lines to send, ctrl-d to quit");

    for line in io::stdin().lock().lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        client.send_line(&line)?;
    }
    client.close();
    Ok(())
}
