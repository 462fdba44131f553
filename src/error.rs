//! Error types for the TCP exchange.
//!
//! Operations that a caller waits on return a typed error:
//! [`ConnectError`] from `connect`, [`BindError`] from `start`, and
//! [`SendError`] from `send`. Failures that happen mid-session have nobody
//! waiting on them, so they travel as a [`StreamError`] inside a
//! `Disconnected` event instead.
//!
//! # Usage
//!
//! ```ignore
//! use tcp_exchange::{ConnectError, Exchange};
//!
//! let exchange = Exchange::builder().build()?;
//! let client = exchange.client();
//!
//! match client.connect("127.0.0.1", 9090).await {
//!     Ok(()) => println!("connected"),
//!     Err(ConnectError::Refused { addr }) => println!("nobody on {addr}"),
//!     Err(e) => return Err(e.into()),
//! }
//! ```
//!
//! # Error Categories
//!
//! | Type | Raised by | Variants |
//! |------|-----------|----------|
//! | [`ConnectError`] | `Client::connect` | resolve, refused, timeout, cancelled |
//! | [`BindError`] | `Server::start` | already listening, in use, permission |
//! | [`SendError`] | `send` | not connected, no client, write failure |
//! | [`StreamError`] | `Disconnected` event | closed by peer, I/O, write timeout |
//! | [`DecodeWarning`] | read loop (logged only) | invalid UTF-8 chunk |
//! | [`enum@Error`] | everything else | config, argument, JSON, I/O |

// ============================================================================
// Imports
// ============================================================================

use std::io::{Error as IoError, ErrorKind};
use std::net::SocketAddr;
use std::result::Result as StdResult;
use std::str::Utf8Error;

use thiserror::Error;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// ConnectError
// ============================================================================

/// Failure of a client connect attempt.
///
/// Whatever the variant, the client is back in `Disconnected` and can be
/// used for another attempt.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// Port 0 is not a connectable port.
    #[error("Invalid port: 0 (expected 1-65535)")]
    InvalidPort,

    /// Host name could not be resolved.
    #[error("Failed to resolve {host}: {message}")]
    Resolve {
        /// Host that was looked up.
        host: String,
        /// Resolver message.
        message: String,
    },

    /// Remote end refused the connection.
    #[error("Connection refused by {addr}")]
    Refused {
        /// Address that refused.
        addr: SocketAddr,
    },

    /// Connect did not complete in time.
    #[error("Connect timed out after {timeout_ms}ms")]
    Timeout {
        /// Milliseconds waited before giving up.
        timeout_ms: u64,
    },

    /// Attempt was abandoned by `disconnect` or a newer `connect`.
    #[error("Connect cancelled")]
    Cancelled,

    /// Any other I/O failure.
    #[error("Connect failed: {0}")]
    Io(#[from] IoError),
}

impl ConnectError {
    /// Creates a resolution error.
    #[inline]
    pub fn resolve(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Resolve {
            host: host.into(),
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(timeout_ms: u64) -> Self {
        Self::Timeout { timeout_ms }
    }

    /// Maps an I/O error from a connect to a specific address.
    pub(crate) fn from_io(addr: SocketAddr, err: IoError) -> Self {
        match err.kind() {
            ErrorKind::ConnectionRefused => Self::Refused { addr },
            _ => Self::Io(err),
        }
    }

    /// Returns `true` if the attempt ran out of time.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if the attempt was cancelled locally.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

// ============================================================================
// BindError
// ============================================================================

/// Failure to start listening.
#[derive(Error, Debug)]
pub enum BindError {
    /// Server is already listening.
    #[error("Already listening on {addr}")]
    AlreadyListening {
        /// Address currently bound.
        addr: SocketAddr,
    },

    /// Address is taken by another socket.
    #[error("Address in use: {addr}")]
    AddrInUse {
        /// Requested address.
        addr: SocketAddr,
    },

    /// Not allowed to bind the address (privileged port).
    #[error("Permission denied binding {addr}")]
    PermissionDenied {
        /// Requested address.
        addr: SocketAddr,
    },

    /// Any other I/O failure.
    #[error("Bind failed: {0}")]
    Io(#[from] IoError),
}

impl BindError {
    /// Maps an I/O error from `bind` on `addr`.
    pub(crate) fn from_io(addr: SocketAddr, err: IoError) -> Self {
        match err.kind() {
            ErrorKind::AddrInUse => Self::AddrInUse { addr },
            ErrorKind::PermissionDenied => Self::PermissionDenied { addr },
            _ => Self::Io(err),
        }
    }
}

// ============================================================================
// SendError
// ============================================================================

/// Failure to send a payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// Client endpoint has no connection.
    #[error("Not connected")]
    NotConnected,

    /// Server has no accepted client.
    #[error("No client connected")]
    NoClient,

    /// Write failed; the connection has been closed.
    #[error("Write failed: {message}")]
    Write {
        /// Description of the failure.
        message: String,
    },

    /// Connection went away before the write ran.
    #[error("Connection closed")]
    Closed,
}

impl SendError {
    /// Creates a write error.
    #[inline]
    pub fn write(message: impl Into<String>) -> Self {
        Self::Write {
            message: message.into(),
        }
    }

    /// Returns `true` if nothing was connected at call time.
    #[inline]
    #[must_use]
    pub fn is_unconnected(&self) -> bool {
        matches!(self, Self::NotConnected | Self::NoClient)
    }
}

// ============================================================================
// StreamError
// ============================================================================

/// Reason a connection ended on its own.
///
/// Carried by `Event::Disconnected`. Explicit disconnects carry no error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Peer closed the stream (EOF).
    #[error("Connection closed by peer")]
    Closed,

    /// Read or write failed.
    #[error("Stream I/O error ({kind:?}): {message}")]
    Io {
        /// I/O error kind.
        kind: ErrorKind,
        /// I/O error message.
        message: String,
    },

    /// A write did not finish in time.
    #[error("Write timed out after {timeout_ms}ms")]
    WriteTimeout {
        /// Milliseconds waited.
        timeout_ms: u64,
    },
}

impl From<&IoError> for StreamError {
    fn from(err: &IoError) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

// ============================================================================
// DecodeWarning
// ============================================================================

/// A received chunk that was not valid UTF-8.
///
/// Never returned to a caller: the read loop logs it and drops the chunk.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Dropped {len}-byte chunk: invalid UTF-8 after {valid_up_to} bytes")]
pub struct DecodeWarning {
    /// Length of the dropped chunk.
    pub len: usize,
    /// Bytes that decoded before the first invalid sequence.
    pub valid_up_to: usize,
}

impl DecodeWarning {
    /// Builds a warning for a chunk of `len` bytes.
    #[inline]
    #[must_use]
    pub fn new(len: usize, err: Utf8Error) -> Self {
        Self {
            len,
            valid_up_to: err.valid_up_to(),
        }
    }
}

// ============================================================================
// Error Enum
// ============================================================================

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid argument.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// Connect failed.
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Bind failed.
    #[error(transparent)]
    Bind(#[from] BindError),

    /// Send failed.
    #[error(transparent)]
    Send(#[from] SendError),

    /// Stream failed.
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Connect(ConnectError::Timeout { .. })
                | Self::Stream(StreamError::WriteTimeout { .. })
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connect(_)
                | Self::Stream(_)
                | Self::Send(SendError::Write { .. } | SendError::Closed)
        )
    }

    /// Returns `true` if retrying the same call may succeed.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Connect(
                ConnectError::Timeout { .. } | ConnectError::Refused { .. } | ConnectError::Cancelled
            ) | Self::Send(SendError::NotConnected | SendError::NoClient)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
