use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

type Source = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Classified errors surfaced by transports, the cloud client and the scanner.
///
/// Every error carries enough context (operation, register address, host,
/// serial) to diagnose a failure without re-running it. Transient read
/// classes are retried inside the transports; everything else surfaces
/// directly.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid caller-supplied configuration: bad IP range, unknown family
    /// override, out-of-range register window, malformed value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Failed to establish the underlying connection (TCP connect, login,
    /// dongle refused).
    #[error("connection failed: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Source>,
    },

    /// An individual operation exceeded its timeout.
    #[error("timeout during {operation}")]
    Timeout { operation: String },

    /// Read failed: Modbus exception response, frame/checksum error, short
    /// read, or missing required registers after retries.
    #[error("read failed during {operation}: {message}")]
    Read {
        operation: String,
        message: String,
        /// Transient reads (I/O hiccups) are retried by the transports;
        /// protocol-level rejections (Modbus exception responses) are not.
        transient: bool,
        #[source]
        source: Option<Source>,
    },

    /// Write rejected by the device, echo mismatch, or short write.
    /// Writes are never retried.
    #[error("write failed during {operation}: {message}")]
    Write {
        operation: String,
        message: String,
        #[source]
        source: Option<Source>,
    },

    /// Cloud credentials invalid, or a second consecutive re-login failed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Device-level mismatch: unrecognised device-type code, serial mismatch
    /// against the caller-expected value, or an operation unsupported by the
    /// discovered family.
    #[error("device error: {0}")]
    Device(String),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Error::Connection {
            message: message.into(),
            source: None,
        }
    }

    pub fn connection_with(
        message: impl Into<String>,
        source: impl Into<Source>,
    ) -> Self {
        Error::Connection {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        Error::Timeout {
            operation: operation.into(),
        }
    }

    /// A read failure worth retrying (socket hiccup, short read).
    pub fn read_transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Read {
            operation: operation.into(),
            message: message.into(),
            transient: true,
            source: None,
        }
    }

    pub fn read_transient_with(
        operation: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<Source>,
    ) -> Self {
        Error::Read {
            operation: operation.into(),
            message: message.into(),
            transient: true,
            source: Some(source.into()),
        }
    }

    /// A protocol-level read rejection (Modbus exception response); retrying
    /// would only repeat the same answer.
    pub fn read_rejected(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Read {
            operation: operation.into(),
            message: message.into(),
            transient: false,
            source: None,
        }
    }

    pub fn write(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Write {
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn write_with(
        operation: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<Source>,
    ) -> Self {
        Error::Write {
            operation: operation.into(),
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Error::Auth(message.into())
    }

    pub fn device(message: impl Into<String>) -> Self {
        Error::Device(message.into())
    }

    /// Whether a transport should retry the failed operation.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Timeout { .. } => true,
            Error::Read { transient, .. } => *transient,
            _ => false,
        }
    }
}
