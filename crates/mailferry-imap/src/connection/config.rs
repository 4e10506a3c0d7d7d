//! Where and how to connect.

use std::time::Duration;

/// Transport security of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// Cleartext for the whole session.
    None,
    /// Cleartext greeting, then upgraded with STARTTLS.
    StartTls,
    /// TLS handshake before the greeting.
    #[default]
    Implicit,
}

impl Security {
    /// Well-known port for this mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        if matches!(self, Self::Implicit) { 993 } else { 143 }
    }
}

impl std::fmt::Display for Security {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::None => "plaintext",
            Self::StartTls => "STARTTLS",
            Self::Implicit => "TLS",
        };
        f.write_str(name)
    }
}

/// One transport to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Hostname, also used as the TLS server name.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Transport security.
    pub security: Security,
    /// Bound on TCP connect plus TLS handshake.
    pub connect_timeout: Duration,
    /// Bound on each command round trip.
    pub io_timeout: Duration,
}

impl Config {
    /// Targets `host` on the well-known port of `security`, with 30 s
    /// connect and 120 s I/O timeouts.
    #[must_use]
    pub fn new(host: impl Into<String>, security: Security) -> Self {
        Self {
            host: host.into(),
            port: security.default_port(),
            security,
            connect_timeout: Duration::from_secs(30),
            io_timeout: Duration::from_secs(120),
        }
    }

    /// Uses `port` instead of the well-known one.
    #[must_use]
    pub const fn on_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Replaces both timeouts.
    #[must_use]
    pub const fn with_timeouts(mut self, connect: Duration, io: Duration) -> Self {
        self.connect_timeout = connect;
        self.io_timeout = io;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_follows_security() {
        assert_eq!(Config::new("mx.example", Security::Implicit).port, 993);
        assert_eq!(Config::new("mx.example", Security::StartTls).port, 143);
        assert_eq!(Config::new("mx.example", Security::None).port, 143);
    }

    #[test]
    fn overrides() {
        let config = Config::new("localhost", Security::None)
            .on_port(1143)
            .with_timeouts(Duration::from_secs(5), Duration::from_secs(7));
        assert_eq!(config.port, 1143);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.io_timeout, Duration::from_secs(7));
    }
}
