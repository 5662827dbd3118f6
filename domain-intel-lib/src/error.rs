//! Error handling for domain analysis operations.
//!
//! This module defines a single error type covering every way an analysis can
//! fail, from bad input to upstream WHOIS and website failures. Upstream
//! failures are downgraded to error markers by the analyzer; only input and
//! internal errors escape a request.

use std::fmt;
use std::time::Duration;

/// Main error type for domain analysis operations.
#[derive(Debug, Clone)]
pub enum AnalysisError {
    /// Missing or malformed input URL
    InvalidInput {
        input: String,
        reason: String,
    },

    /// Network-related errors (connection, DNS, TLS, etc.)
    NetworkError {
        message: String,
        source: Option<String>,
    },

    /// WHOIS lookup failures (command missing, unregistered domain, unparseable output)
    WhoisError {
        domain: String,
        message: String,
    },

    /// Website fetch failures, including non-2xx responses
    FetchError {
        domain: String,
        message: String,
        status_code: Option<u16>,
    },

    /// Configuration errors (invalid settings, etc.)
    ConfigError {
        message: String,
    },

    /// File I/O errors when reading configuration
    FileError {
        path: String,
        message: String,
    },

    /// Timeout errors when an upstream takes too long
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// Rate limiting reported by an upstream service
    RateLimited {
        service: String,
        message: String,
    },

    /// Anything unanticipated
    Internal {
        message: String,
    },
}

impl AnalysisError {
    /// Create a new invalid input error.
    pub fn invalid_input<I: Into<String>, R: Into<String>>(input: I, reason: R) -> Self {
        Self::InvalidInput {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Create a new network error with source information.
    pub fn network_with_source<M: Into<String>, S: Into<String>>(message: M, source: S) -> Self {
        Self::NetworkError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new WHOIS error.
    pub fn whois<D: Into<String>, M: Into<String>>(domain: D, message: M) -> Self {
        Self::WhoisError {
            domain: domain.into(),
            message: message.into(),
        }
    }

    /// Create a new website fetch error.
    pub fn fetch<D: Into<String>, M: Into<String>>(domain: D, message: M) -> Self {
        Self::FetchError {
            domain: domain.into(),
            message: message.into(),
            status_code: None,
        }
    }

    /// Create a new website fetch error carrying the HTTP status.
    pub fn fetch_with_status<D: Into<String>, M: Into<String>>(
        domain: D,
        message: M,
        status_code: u16,
    ) -> Self {
        Self::FetchError {
            domain: domain.into(),
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Create a new rate limit error.
    pub fn rate_limited<S: Into<String>, M: Into<String>>(service: S, message: M) -> Self {
        Self::RateLimited {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout<O: Into<String>>(operation: O, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a new configuration error.
    pub fn config<M: Into<String>>(message: M) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new file error.
    pub fn file_error<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::FileError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new internal error.
    pub fn internal<M: Into<String>>(message: M) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error was caused by the caller's input.
    ///
    /// The HTTP layer maps these to 400 and everything else to 500.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput { .. })
    }
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput { input, reason } => {
                if input.is_empty() {
                    write!(f, "Invalid input: {}", reason)
                } else {
                    write!(f, "Invalid input '{}': {}", input, reason)
                }
            }
            Self::NetworkError { message, source } => {
                if let Some(source) = source {
                    write!(f, "Network error: {} (source: {})", message, source)
                } else {
                    write!(f, "Network error: {}", message)
                }
            }
            Self::WhoisError { domain, message } => {
                write!(f, "WHOIS error for '{}': {}", domain, message)
            }
            Self::FetchError {
                domain,
                message,
                status_code,
            } => {
                if let Some(code) = status_code {
                    write!(f, "Fetch error for '{}' (HTTP {}): {}", domain, code, message)
                } else {
                    write!(f, "Fetch error for '{}': {}", domain, message)
                }
            }
            Self::ConfigError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            Self::FileError { path, message } => {
                write!(f, "File error at '{}': {}", path, message)
            }
            Self::Timeout {
                operation,
                duration,
            } => {
                write!(f, "Timeout after {:?} during: {}", duration, operation)
            }
            Self::RateLimited { service, message } => {
                write!(f, "Rate limited by {}: {}", service, message)
            }
            Self::Internal { message } => {
                write!(f, "Internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for AnalysisError {}

impl From<reqwest::Error> for AnalysisError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::network_with_source("Connection failed", err.to_string())
        } else if err.is_builder() {
            Self::network_with_source("Invalid HTTP client settings", err.to_string())
        } else {
            Self::network_with_source("HTTP request failed", err.to_string())
        }
    }
}
