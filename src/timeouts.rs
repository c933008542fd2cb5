//! Timeout configuration for client operations.
//!
//! The mirror itself imposes no deadlines; these are the underlying
//! transport's timeouts for HTTP requests and the feed socket.

use std::time::Duration;

/// Timeout configuration for [`MirrorClient`](crate::MirrorClient) operations.
///
/// # Examples
///
/// ```rust
/// use table_mirror::MirrorTimeouts;
/// use std::time::Duration;
///
/// // Defaults (recommended)
/// let timeouts = MirrorTimeouts::default();
///
/// // High-latency environments
/// let timeouts = MirrorTimeouts::builder()
///     .connection_timeout(Duration::from_secs(30))
///     .request_timeout(Duration::from_secs(60))
///     .build();
///
/// // Local development
/// let timeouts = MirrorTimeouts::fast();
/// ```
#[derive(Debug, Clone)]
pub struct MirrorTimeouts {
    /// Timeout for establishing connections (TCP + TLS handshake).
    /// Default: 10 seconds
    pub connection_timeout: Duration,

    /// End-to-end timeout for one HTTP request.
    /// Default: 30 seconds
    pub request_timeout: Duration,

    /// Timeout for the feed socket authentication exchange.
    /// Default: 5 seconds
    pub auth_timeout: Duration,

    /// Keep-alive ping interval on the feed socket.
    /// Set to 0 to disable keep-alive pings.
    /// Default: 20 seconds
    pub keepalive_interval: Duration,
}

impl Default for MirrorTimeouts {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            auth_timeout: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(20),
        }
    }
}

impl MirrorTimeouts {
    /// Create a builder for custom timeout configuration.
    pub fn builder() -> MirrorTimeoutsBuilder {
        MirrorTimeoutsBuilder::new()
    }

    /// Timeouts optimized for localhost development.
    pub fn fast() -> Self {
        Self {
            connection_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(5),
            auth_timeout: Duration::from_secs(2),
            keepalive_interval: Duration::from_secs(15),
        }
    }

    /// Timeouts optimized for high-latency or unreliable networks.
    pub fn relaxed() -> Self {
        Self {
            connection_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(120),
            auth_timeout: Duration::from_secs(15),
            keepalive_interval: Duration::from_secs(30),
        }
    }

    /// Check if a duration represents "no timeout" (zero or absurdly large).
    pub fn is_no_timeout(duration: Duration) -> bool {
        duration.is_zero() || duration > Duration::from_secs(86400 * 365)
    }
}

/// Builder for custom [`MirrorTimeouts`] configurations.
#[derive(Debug, Clone)]
pub struct MirrorTimeoutsBuilder {
    timeouts: MirrorTimeouts,
}

impl MirrorTimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: MirrorTimeouts::default(),
        }
    }

    /// Set the connection timeout (TCP + TLS handshake).
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connection_timeout = timeout;
        self
    }

    /// Set the end-to-end HTTP request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.request_timeout = timeout;
        self
    }

    /// Set the feed authentication exchange timeout.
    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.auth_timeout = timeout;
        self
    }

    /// Set the keepalive ping interval. Zero disables pings.
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.timeouts.keepalive_interval = interval;
        self
    }

    /// Build the timeout configuration.
    pub fn build(self) -> MirrorTimeouts {
        self.timeouts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let timeouts = MirrorTimeouts::default();
        assert_eq!(timeouts.connection_timeout, Duration::from_secs(10));
        assert_eq!(timeouts.request_timeout, Duration::from_secs(30));
        assert!(!timeouts.keepalive_interval.is_zero());
    }

    #[test]
    fn test_builder() {
        let timeouts = MirrorTimeouts::builder()
            .connection_timeout(Duration::from_secs(60))
            .request_timeout(Duration::from_secs(120))
            .keepalive_interval(Duration::ZERO)
            .build();

        assert_eq!(timeouts.connection_timeout, Duration::from_secs(60));
        assert_eq!(timeouts.request_timeout, Duration::from_secs(120));
        assert!(timeouts.keepalive_interval.is_zero());
    }

    #[test]
    fn test_presets() {
        assert!(MirrorTimeouts::fast().connection_timeout <= Duration::from_secs(5));
        assert!(MirrorTimeouts::relaxed().request_timeout >= Duration::from_secs(60));
    }

    #[test]
    fn test_is_no_timeout() {
        assert!(MirrorTimeouts::is_no_timeout(Duration::ZERO));
        assert!(!MirrorTimeouts::is_no_timeout(Duration::from_secs(1)));
    }
}
