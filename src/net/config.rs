use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for a reactor-backed server.
///
/// Every knob is caller-supplied; nothing is read from the environment.
/// Defaults match the demo setup: 1024-byte buffers and an indefinitely
/// blocking poll.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the listening endpoint to.
    pub address: SocketAddr,
    /// Capacity of each per-connection read and pending-write buffer.
    pub buffer_size: usize,
    /// Poll timeout per loop iteration; `None` blocks until work arrives.
    pub poll_timeout: Option<Duration>,
    /// Exit the reactor loop once no registrations remain.
    pub exit_when_idle: bool,
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:9898".parse().expect("valid default address"),
            buffer_size: 1024,
            poll_timeout: None,
            exit_when_idle: false,
        }
    }
}

/// Builder for [`ServerConfig`]; unset fields fall back to the defaults.
#[derive(Default)]
pub struct ServerConfigBuilder {
    address: Option<SocketAddr>,
    buffer_size: Option<usize>,
    poll_timeout: Option<Option<Duration>>,
    exit_when_idle: Option<bool>,
}

impl ServerConfigBuilder {
    pub fn address(mut self, address: SocketAddr) -> Self {
        self.address = Some(address);
        self
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Some(size);
        self
    }

    pub fn poll_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.poll_timeout = Some(timeout);
        self
    }

    pub fn exit_when_idle(mut self, enabled: bool) -> Self {
        self.exit_when_idle = Some(enabled);
        self
    }

    pub fn build(self) -> ServerConfig {
        let default = ServerConfig::default();
        ServerConfig {
            address: self.address.unwrap_or(default.address),
            buffer_size: self.buffer_size.unwrap_or(default.buffer_size),
            poll_timeout: self.poll_timeout.unwrap_or(default.poll_timeout),
            exit_when_idle: self.exit_when_idle.unwrap_or(default.exit_when_idle),
        }
    }
}
