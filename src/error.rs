//! Error types for the file sharing node and client
//!
//! This module defines comprehensive error types for all components
//! of the P2P file sharing system.

use std::fmt;

/// Comprehensive error type for file sharing operations
#[derive(Debug, Clone)]
pub enum ShareError {
    /// Authentication failures (wrong shared secret or tampered data,
    /// indistinguishable by design)
    AuthenticationFailed {
        message: String,
    },

    /// Network-level errors (retryable)
    ConnectionError {
        message: String,
        address: Option<String>,
        source: Option<String>,
    },

    /// Malformed or unexpected protocol traffic
    ProtocolError {
        message: String,
        source: Option<String>,
    },

    /// Requested file is not in the registry
    FileNotFound {
        name: String,
    },

    /// Post-transfer integrity failure
    ChecksumMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// A session exists but has not received all bytes
    IncompleteTransfer {
        name: String,
        received: u64,
        expected: u64,
    },

    /// The shared secret is unusable (e.g. empty)
    InvalidSecret {
        message: String,
    },

    /// File I/O and session persistence errors
    StorageError {
        message: String,
        path: Option<String>,
        source: Option<String>,
    },

    /// Configuration errors
    ConfigError {
        message: String,
        field: Option<String>,
    },
}

impl ShareError {
    /// Create a new AuthenticationFailed error
    pub fn authentication_failed(message: impl Into<String>) -> Self {
        ShareError::AuthenticationFailed {
            message: message.into(),
        }
    }

    /// Create a new ConnectionError
    pub fn connection_error(message: impl Into<String>) -> Self {
        ShareError::ConnectionError {
            message: message.into(),
            address: None,
            source: None,
        }
    }

    /// Create a new ConnectionError with address
    pub fn connection_error_with_address(message: impl Into<String>, address: impl Into<String>) -> Self {
        ShareError::ConnectionError {
            message: message.into(),
            address: Some(address.into()),
            source: None,
        }
    }

    /// Create a new ConnectionError with address and source
    pub fn connection_error_full(message: impl Into<String>, address: impl Into<String>, source: impl Into<String>) -> Self {
        ShareError::ConnectionError {
            message: message.into(),
            address: Some(address.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new ProtocolError
    pub fn protocol_error(message: impl Into<String>) -> Self {
        ShareError::ProtocolError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new ProtocolError with source
    pub fn protocol_error_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        ShareError::ProtocolError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new FileNotFound error
    pub fn file_not_found(name: impl Into<String>) -> Self {
        ShareError::FileNotFound { name: name.into() }
    }

    /// Create a new ChecksumMismatch error
    pub fn checksum_mismatch(name: impl Into<String>, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        ShareError::ChecksumMismatch {
            name: name.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a new IncompleteTransfer error
    pub fn incomplete_transfer(name: impl Into<String>, received: u64, expected: u64) -> Self {
        ShareError::IncompleteTransfer {
            name: name.into(),
            received,
            expected,
        }
    }

    /// Create a new InvalidSecret error
    pub fn invalid_secret(message: impl Into<String>) -> Self {
        ShareError::InvalidSecret {
            message: message.into(),
        }
    }

    /// Create a new StorageError
    pub fn storage_error(message: impl Into<String>) -> Self {
        ShareError::StorageError {
            message: message.into(),
            path: None,
            source: None,
        }
    }

    /// Create a new StorageError with path
    pub fn storage_error_with_path(message: impl Into<String>, path: impl Into<String>) -> Self {
        ShareError::StorageError {
            message: message.into(),
            path: Some(path.into()),
            source: None,
        }
    }

    /// Create a new StorageError with path and source
    pub fn storage_error_full(message: impl Into<String>, path: impl Into<String>, source: impl Into<String>) -> Self {
        ShareError::StorageError {
            message: message.into(),
            path: Some(path.into()),
            source: Some(source.into()),
        }
    }

    /// Create a new ConfigError
    pub fn config_error(message: impl Into<String>) -> Self {
        ShareError::ConfigError {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new ConfigError with field
    pub fn config_error_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        ShareError::ConfigError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Check whether retrying the same operation can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, ShareError::ConnectionError { .. } | ShareError::IncompleteTransfer { .. })
    }

    /// Stable kind string used in wire error frames
    pub fn kind(&self) -> &'static str {
        match self {
            ShareError::AuthenticationFailed { .. } => "authentication_failed",
            ShareError::ConnectionError { .. } => "connection_error",
            ShareError::ProtocolError { .. } => "protocol_error",
            ShareError::FileNotFound { .. } => "file_not_found",
            ShareError::ChecksumMismatch { .. } => "checksum_mismatch",
            ShareError::IncompleteTransfer { .. } => "incomplete_transfer",
            ShareError::InvalidSecret { .. } => "invalid_secret",
            ShareError::StorageError { .. } => "storage_error",
            ShareError::ConfigError { .. } => "config_error",
        }
    }

    /// Reconstruct an error from a wire error frame
    pub fn from_kind(kind: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            "authentication_failed" => ShareError::authentication_failed(message),
            "file_not_found" => ShareError::file_not_found(message),
            "connection_error" => ShareError::connection_error(message),
            _ => ShareError::protocol_error_with_source(message, format!("kind: {}", kind)),
        }
    }
}

impl fmt::Display for ShareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShareError::AuthenticationFailed { message } => {
                write!(f, "Authentication failed: {}", message)
            }
            ShareError::ConnectionError { message, address, source } => {
                match (address, source) {
                    (Some(a), Some(s)) => write!(f, "Connection error: {} (address: {}, source: {})", message, a, s),
                    (Some(a), None) => write!(f, "Connection error: {} (address: {})", message, a),
                    (None, Some(s)) => write!(f, "Connection error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Connection error: {}", message),
                }
            }
            ShareError::ProtocolError { message, source } => {
                if let Some(src) = source {
                    write!(f, "Protocol error: {} (source: {})", message, src)
                } else {
                    write!(f, "Protocol error: {}", message)
                }
            }
            ShareError::FileNotFound { name } => {
                write!(f, "File not found: {}", name)
            }
            ShareError::ChecksumMismatch { name, expected, actual } => {
                write!(f, "Checksum mismatch for '{}': expected {}, got {}", name, expected, actual)
            }
            ShareError::IncompleteTransfer { name, received, expected } => {
                write!(f, "Incomplete transfer of '{}': {}/{} bytes received", name, received, expected)
            }
            ShareError::InvalidSecret { message } => {
                write!(f, "Invalid secret: {}", message)
            }
            ShareError::StorageError { message, path, source } => {
                match (path, source) {
                    (Some(p), Some(s)) => write!(f, "Storage error: {} (path: {}, source: {})", message, p, s),
                    (Some(p), None) => write!(f, "Storage error: {} (path: {})", message, p),
                    (None, Some(s)) => write!(f, "Storage error: {} (source: {})", message, s),
                    (None, None) => write!(f, "Storage error: {}", message),
                }
            }
            ShareError::ConfigError { message, field } => {
                if let Some(field_val) = field {
                    write!(f, "Config error: {} (field: {})", message, field_val)
                } else {
                    write!(f, "Config error: {}", message)
                }
            }
        }
    }
}

impl std::error::Error for ShareError {}

// Implement From traits for common error types

impl From<std::io::Error> for ShareError {
    fn from(err: std::io::Error) -> Self {
        ShareError::storage_error_full(err.to_string(), "unknown".to_string(), err.kind().to_string())
    }
}

impl From<serde_json::Error> for ShareError {
    fn from(err: serde_json::Error) -> Self {
        ShareError::storage_error_full("Failed to parse JSON data", "unknown".to_string(), err.to_string())
    }
}

impl From<std::net::AddrParseError> for ShareError {
    fn from(err: std::net::AddrParseError) -> Self {
        ShareError::connection_error_full("Failed to parse address", "unknown".to_string(), err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for ShareError {
    fn from(_err: tokio::time::error::Elapsed) -> Self {
        ShareError::connection_error("Operation timed out")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_failed() {
        let err = ShareError::authentication_failed("decryption failed");
        assert_eq!(err.to_string(), "Authentication failed: decryption failed");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_connection_error_with_address() {
        let err = ShareError::connection_error_with_address("Connection refused", "127.0.0.1:9000");
        assert!(err.to_string().contains("Connection error"));
        assert!(err.to_string().contains("127.0.0.1:9000"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_protocol_error_with_source() {
        let err = ShareError::protocol_error_with_source("Invalid message ID", "value: 42");
        assert!(err.to_string().contains("Protocol error"));
        assert!(err.to_string().contains("value: 42"));
    }

    #[test]
    fn test_file_not_found() {
        let err = ShareError::file_not_found("missing.txt");
        assert_eq!(err.to_string(), "File not found: missing.txt");
    }

    #[test]
    fn test_checksum_mismatch() {
        let err = ShareError::checksum_mismatch("a.txt", "aabb", "ccdd");
        assert!(err.to_string().contains("a.txt"));
        assert!(err.to_string().contains("aabb"));
        assert!(err.to_string().contains("ccdd"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_incomplete_transfer() {
        let err = ShareError::incomplete_transfer("a.txt", 400, 1000);
        assert!(err.to_string().contains("400/1000"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_storage_error_with_path() {
        let err = ShareError::storage_error_with_path("File not found", "/path/to/file");
        assert!(err.to_string().contains("Storage error"));
        assert!(err.to_string().contains("/path/to/file"));
    }

    #[test]
    fn test_config_error_with_field() {
        let err = ShareError::config_error_with_field("Invalid value", "port");
        assert!(err.to_string().contains("Config error"));
        assert!(err.to_string().contains("port"));
    }

    #[test]
    fn test_kind_round_trip() {
        let err = ShareError::authentication_failed("bad key");
        assert_eq!(err.kind(), "authentication_failed");
        let back = ShareError::from_kind(err.kind(), "bad key");
        assert!(matches!(back, ShareError::AuthenticationFailed { .. }));
    }

    #[test]
    fn test_from_kind_unknown() {
        let err = ShareError::from_kind("no_such_kind", "whatever");
        assert!(matches!(err, ShareError::ProtocolError { .. }));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: ShareError = io_err.into();
        assert!(matches!(err, ShareError::StorageError { .. }));
    }

    #[test]
    fn test_from_addr_parse_error() {
        let addr_err = "invalid:address".parse::<std::net::SocketAddr>().unwrap_err();
        let err: ShareError = addr_err.into();
        assert!(matches!(err, ShareError::ConnectionError { .. }));
    }
}
