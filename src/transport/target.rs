//! Connect targets given as `tcp://host:port` URLs.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// The only accepted URL scheme.
const SCHEME: &str = "tcp";

// ============================================================================
// Target
// ============================================================================

/// Host and port a client connects to.
///
/// # Example
///
/// ```
/// use tcp_exchange::Target;
///
/// let target = Target::parse("tcp://127.0.0.1:9090").unwrap();
/// assert_eq!(target.host(), "127.0.0.1");
/// assert_eq!(target.port(), 9090);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    host: String,
    port: u16,
}

impl Target {
    /// Creates a target from parts. No validation is done here;
    /// [`Client::connect`](super::Client::connect) rejects port 0.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses a `tcp://host:port` URL.
    ///
    /// IPv6 hosts use brackets: `tcp://[::1]:9090`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the URL does not parse, the
    /// scheme is not `tcp`, or the host or a non-zero port is missing.
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input)
            .map_err(|e| Error::invalid_argument(format!("invalid target '{input}': {e}")))?;

        if url.scheme() != SCHEME {
            return Err(Error::invalid_argument(format!(
                "unsupported scheme '{}' in '{input}', expected '{SCHEME}'",
                url.scheme()
            )));
        }

        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host,
            _ => return Err(Error::invalid_argument(format!("missing host in '{input}'"))),
        };

        let port = match url.port() {
            Some(0) | None => {
                return Err(Error::invalid_argument(format!(
                    "missing or zero port in '{input}'"
                )));
            }
            Some(port) => port,
        };

        // Url keeps the brackets on IPv6 hosts; lookup_host wants them off.
        let host = host.trim_start_matches('[').trim_end_matches(']');

        Ok(Self::new(host, port))
    }

    /// Returns the host name or address.
    #[inline]
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "{SCHEME}://[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{SCHEME}://{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_parse_host_and_port() {
        let target = Target::parse("tcp://example.com:9090").expect("valid");
        assert_eq!(target.host(), "example.com");
        assert_eq!(target.port(), 9090);
    }

    #[test]
    fn test_parse_ipv6() {
        let target: Target = "tcp://[::1]:4000".parse().expect("valid");
        assert_eq!(target.host(), "::1");
        assert_eq!(target.to_string(), "tcp://[::1]:4000");
    }

    #[test]
    fn test_parse_rejects_other_schemes() {
        let err = Target::parse("http://example.com:80").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn test_parse_rejects_missing_port() {
        assert!(Target::parse("tcp://example.com").is_err());
        assert!(Target::parse("tcp://example.com:0").is_err());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_err!(Target::parse("not a url"));
        assert_err!(Target::parse("tcp://:9090"));
        assert_ok!(Target::parse("tcp://localhost:1"));
    }

    #[test]
    fn test_display_round_trip() {
        let target = Target::new("localhost", 9090);
        assert_eq!(target.to_string(), "tcp://localhost:9090");
        assert_eq!(Target::parse(&target.to_string()).expect("valid"), target);
    }
}
