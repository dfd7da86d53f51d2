//! Error types for wgclient

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum WgClientError {
    /// IO error
    Io(io::Error),
    /// Registry or settings document could not be parsed
    ConfigParse(String),
    /// A user name is not usable as a tunnel name
    InvalidTunnelName { name: String, reason: String },
    /// Hostname lookup failed
    Resolution { hostname: String, reason: String },
    /// Hostname lookup succeeded but returned no IPv4 addresses
    NoResolverResponse(String),
    /// Invalid parameter
    InvalidParameter(String),
    /// Not found
    NotFound(String),
    /// Already exists
    AlreadyExists(String),
    /// Operation was cancelled before completing
    Cancelled(String),
    /// Timeout
    Timeout(String),
}

impl fmt::Display for WgClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WgClientError::Io(e) => write!(f, "IO error: {}", e),
            WgClientError::ConfigParse(msg) => write!(f, "Config parse error: {}", msg),
            WgClientError::InvalidTunnelName { name, reason } => {
                write!(f, "Invalid tunnel name '{}': {}", name, reason)
            }
            WgClientError::Resolution { hostname, reason } => {
                write!(f, "Failed to resolve '{}': {}", hostname, reason)
            }
            WgClientError::NoResolverResponse(hostname) => {
                write!(f, "No DNS resolver response for dns name '{}'", hostname)
            }
            WgClientError::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            WgClientError::NotFound(msg) => write!(f, "Not found: {}", msg),
            WgClientError::AlreadyExists(msg) => write!(f, "Already exists: {}", msg),
            WgClientError::Cancelled(msg) => write!(f, "Cancelled: {}", msg),
            WgClientError::Timeout(msg) => write!(f, "Timeout: {}", msg),
        }
    }
}

impl std::error::Error for WgClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WgClientError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for WgClientError {
    fn from(error: io::Error) -> Self {
        WgClientError::Io(error)
    }
}

impl From<serde_json::Error> for WgClientError {
    fn from(error: serde_json::Error) -> Self {
        WgClientError::ConfigParse(error.to_string())
    }
}

impl From<toml::de::Error> for WgClientError {
    fn from(error: toml::de::Error) -> Self {
        WgClientError::ConfigParse(error.to_string())
    }
}

pub type WgClientResult<T> = Result<T, WgClientError>;
