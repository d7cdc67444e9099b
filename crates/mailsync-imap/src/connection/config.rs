//! Server address and time limits for one connection.

use std::time::Duration;

/// Connection security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// No encryption.
    None,
    /// Plaintext greeting upgraded with STARTTLS.
    StartTls,
    /// TLS from the first byte.
    #[default]
    Implicit,
}

impl Security {
    /// Port servers conventionally listen on for this mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None | Self::StartTls => 143,
            Self::Implicit => 993,
        }
    }
}

/// How long the client waits before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// TCP connect plus TLS handshake.
    pub connect: Duration,
    /// Greeting, and each command round-trip.
    pub io: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            io: Duration::from_secs(120),
        }
    }
}

/// Server to open a connection to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Server hostname, also used for TLS name verification.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Time limits.
    pub timeouts: Timeouts,
}

impl Config {
    /// Targets `host` on the conventional port for `security`.
    #[must_use]
    pub fn new(host: impl Into<String>, security: Security) -> Self {
        Self {
            host: host.into(),
            port: security.default_port(),
            security,
            timeouts: Timeouts::default(),
        }
    }

    /// Uses a non-standard port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Replaces the time limits.
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_follows_security() {
        assert_eq!(Config::new("imap.example.com", Security::StartTls).port, 143);
        assert_eq!(Config::new("imap.example.com", Security::None).port, 143);

        let config = Config::new("imap.example.com", Security::Implicit);
        assert_eq!(config.port, 993);
        assert_eq!(config.timeouts.io, Duration::from_secs(120));
    }

    #[test]
    fn test_overrides() {
        let timeouts = Timeouts {
            connect: Duration::from_secs(5),
            io: Duration::from_secs(10),
        };
        let config = Config::new("localhost", Security::None)
            .with_port(1143)
            .with_timeouts(timeouts);
        assert_eq!(config.port, 1143);
        assert_eq!(config.timeouts, timeouts);
    }
}
