//! Error types for the tunnel.

use thiserror::Error;

/// Result type alias for tunnel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while proxying.
///
/// Authentication failures deliberately carry no detail: a peer that fails
/// the AEAD tag check must be indistinguishable on the wire from any other
/// torn-down connection.
#[derive(Error, Debug)]
pub enum Error {
    /// Cipher setup or sealing failed
    #[error("cipher error: {0}")]
    Crypto(String),

    /// AEAD tag verification failed on an inbound frame
    #[error("authentication failed")]
    Authentication,

    /// Malformed SOCKS5 exchange or tunnel framing
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Malformed or truncated address header
    #[error("address error: {0}")]
    Address(String),

    /// Network I/O error
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    /// Hostname resolution failed
    #[error("dns error: {0}")]
    Dns(String),

    /// No traffic within the session's inactivity deadline
    #[error("inactivity timeout")]
    IdleTimeout,

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a new cipher error
    pub fn crypto(msg: impl Into<String>) -> Self {
        Error::Crypto(msg.into())
    }

    /// Create a new protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    /// Create a new address error
    pub fn address(msg: impl Into<String>) -> Self {
        Error::Address(msg.into())
    }

    /// Create a new DNS error
    pub fn dns(msg: impl Into<String>) -> Self {
        Error::Dns(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Check if this error is an AEAD authentication failure
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Error::Authentication)
    }

    /// Check if this error is the inactivity deadline firing
    pub fn is_idle_timeout(&self) -> bool {
        matches!(self, Error::IdleTimeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Authentication;
        assert_eq!(err.to_string(), "authentication failed");

        let err = Error::IdleTimeout;
        assert_eq!(err.to_string(), "inactivity timeout");
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::Authentication.is_auth_failure());
        assert!(!Error::IdleTimeout.is_auth_failure());
        assert!(Error::IdleTimeout.is_idle_timeout());
        assert!(!Error::Authentication.is_idle_timeout());
    }
}
