//! Client and server configuration.
//!
//! Both option types serialize to JSON with durations in milliseconds.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use tcp_exchange::{AdmissionPolicy, ServerOptions};
//!
//! let options = ServerOptions::from_json(r#"{ "port": 4000, "admission": "reject" }"#).unwrap();
//! assert_eq!(options.port, 4000);
//! assert_eq!(options.admission, AdmissionPolicy::Reject);
//! assert_eq!(options.write_timeout, Duration::from_secs(30));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::transport::connection::StreamOptions;

// ============================================================================
// Constants
// ============================================================================

/// Default server port.
pub const DEFAULT_PORT: u16 = 9090;

/// Default connect and write timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default read buffer size in bytes.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

// ============================================================================
// AdmissionPolicy
// ============================================================================

/// What the server does when a client connects while another is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AdmissionPolicy {
    /// Disconnect the current client and take the new one.
    #[default]
    Replace,
    /// Close the new connection and keep the current client.
    Reject,
}

// ============================================================================
// ClientOptions
// ============================================================================

/// Client connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientOptions {
    /// Upper bound on resolve plus connect.
    #[serde(rename = "connectTimeoutMs", with = "duration_ms")]
    pub connect_timeout: Duration,

    /// Upper bound on a single write.
    #[serde(rename = "writeTimeoutMs", with = "duration_ms")]
    pub write_timeout: Duration,

    /// Read buffer size; also the largest chunk a single read yields.
    pub read_buffer_size: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_TIMEOUT,
            write_timeout: DEFAULT_TIMEOUT,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    /// Parses options from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] on malformed input.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Sets the connect timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the write timeout.
    #[inline]
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Sets the read buffer size.
    #[inline]
    #[must_use]
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Checks the settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a zero timeout or buffer size.
    pub fn validate(&self) -> Result<()> {
        require_nonzero_duration("client connect timeout", self.connect_timeout)?;
        require_nonzero_duration("client write timeout", self.write_timeout)?;
        require_nonzero_buffer("client", self.read_buffer_size)
    }

    /// Stream settings handed to each connection.
    pub(crate) fn stream(&self) -> StreamOptions {
        StreamOptions {
            write_timeout: self.write_timeout,
            read_buffer_size: self.read_buffer_size,
        }
    }
}

// ============================================================================
// ServerOptions
// ============================================================================

/// Server listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerOptions {
    /// Address the listener binds to.
    pub bind_ip: IpAddr,

    /// Port used by [`Server::start_default`](crate::Server::start_default).
    pub port: u16,

    /// Upper bound on a single write.
    #[serde(rename = "writeTimeoutMs", with = "duration_ms")]
    pub write_timeout: Duration,

    /// Read buffer size; also the largest chunk a single read yields.
    pub read_buffer_size: usize,

    /// Handling of a second client.
    pub admission: AdmissionPolicy,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerOptions {
    /// Creates options with default settings (all interfaces, port 9090).
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            write_timeout: DEFAULT_TIMEOUT,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            admission: AdmissionPolicy::Replace,
        }
    }

    /// Parses options from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] on malformed input.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Sets the bind address.
    #[inline]
    #[must_use]
    pub fn with_bind_ip(mut self, ip: IpAddr) -> Self {
        self.bind_ip = ip;
        self
    }

    /// Sets the default port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the write timeout.
    #[inline]
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Sets the read buffer size.
    #[inline]
    #[must_use]
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Sets the admission policy.
    #[inline]
    #[must_use]
    pub fn with_admission(mut self, admission: AdmissionPolicy) -> Self {
        self.admission = admission;
        self
    }

    /// Checks the settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a zero timeout or buffer size.
    pub fn validate(&self) -> Result<()> {
        require_nonzero_duration("server write timeout", self.write_timeout)?;
        require_nonzero_buffer("server", self.read_buffer_size)
    }

    /// Stream settings handed to each accepted connection.
    pub(crate) fn stream(&self) -> StreamOptions {
        StreamOptions {
            write_timeout: self.write_timeout,
            read_buffer_size: self.read_buffer_size,
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

fn require_nonzero_duration(name: &str, value: Duration) -> Result<()> {
    if value.is_zero() {
        return Err(Error::config(format!("{name} must be > 0")));
    }
    Ok(())
}

fn require_nonzero_buffer(side: &str, size: usize) -> Result<()> {
    if size == 0 {
        return Err(Error::config(format!("{side} read buffer must be > 0")));
    }
    Ok(())
}

// ============================================================================
// Serde Helpers
// ============================================================================

/// `Duration` as integer milliseconds.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_defaults() {
        let options = ClientOptions::default();
        assert_eq!(options.connect_timeout, Duration::from_secs(30));
        assert_eq!(options.write_timeout, Duration::from_secs(30));
        assert_eq!(options.read_buffer_size, 4096);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_server_defaults() {
        let options = ServerOptions::default();
        assert_eq!(options.bind_ip, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(options.port, DEFAULT_PORT);
        assert_eq!(options.admission, AdmissionPolicy::Replace);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let options = ClientOptions::new()
            .with_connect_timeout(Duration::from_secs(2))
            .with_write_timeout(Duration::from_millis(500))
            .with_read_buffer_size(128);

        assert_eq!(options.connect_timeout, Duration::from_secs(2));
        assert_eq!(
            options.stream(),
            StreamOptions {
                write_timeout: Duration::from_millis(500),
                read_buffer_size: 128,
            }
        );
    }

    #[test]
    fn test_validate_rejects_zero() {
        let err = ClientOptions::new().with_read_buffer_size(0).validate().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));

        let err = ServerOptions::new()
            .with_write_timeout(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_json_durations_in_millis() {
        let options = ClientOptions::new().with_connect_timeout(Duration::from_millis(1500));
        let json = serde_json::to_value(&options).expect("serialize");

        assert_eq!(json["connectTimeoutMs"], 1500);
        assert_eq!(json["writeTimeoutMs"], 30_000);
        assert_eq!(json["readBufferSize"], 4096);
    }

    #[test]
    fn test_from_json_partial() {
        let options = ServerOptions::from_json(r#"{ "bindIp": "127.0.0.1", "writeTimeoutMs": 250 }"#)
            .expect("valid json");

        assert_eq!(options.bind_ip, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(options.write_timeout, Duration::from_millis(250));
        assert_eq!(options.port, DEFAULT_PORT);
    }

    #[test]
    fn test_from_json_malformed() {
        let err = ClientOptions::from_json("{ nope").unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }
}
