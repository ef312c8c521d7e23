//! # Error Types Module
//!
//! Centralized error handling for the acquisition core.
//! Provides one error type per concern with user-facing messages.
//!
//! ## Error Types
//! - `ConnectionError`: websocket connect, send and drop failures
//! - `ConfigError`: configuration file I/O and parsing errors
//! - `RecordingError`: rejected recording transitions (start, advance)
//! - `AnalysisError`: packaging or calling the external analysis service
//!
//! ## Recovery
//! None of these are fatal. Connection errors reset the link to
//! `Disconnected`, recording errors leave the session untouched, and analysis
//! errors keep the previous verdict.

use crate::recorder::Lead;
use std::fmt;

/// Errors that can occur on the device link
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionError {
    /// Opening the socket failed
    Connect { endpoint: String, reason: String },
    /// A command was issued while no socket is open
    NotConnected,
    /// The outbound queue or socket rejected a command
    Send(String),
    /// The socket dropped mid-session
    Dropped(String),
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::Connect { endpoint, reason } => {
                write!(f, "Could not connect to device at {}: {}", endpoint, reason)
            }
            ConnectionError::NotConnected => {
                write!(f, "Device is not connected")
            }
            ConnectionError::Send(msg) => {
                write!(f, "Failed to send command to device: {}", msg)
            }
            ConnectionError::Dropped(msg) => {
                write!(f, "Connection to device lost: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConnectionError {}

/// Errors that can occur during configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read config file
    ReadFailed(std::io::Error),
    /// Failed to write config file
    WriteFailed(std::io::Error),
    /// Failed to parse config file
    ParseFailed(toml::de::Error),
    /// Failed to serialize config
    SerializeFailed(toml::ser::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ReadFailed(e) => {
                write!(f, "Failed to read config file: {}", e)
            }
            ConfigError::WriteFailed(e) => {
                write!(f, "Failed to write config file: {}", e)
            }
            ConfigError::ParseFailed(e) => {
                write!(f, "Failed to parse config file: {}", e)
            }
            ConfigError::SerializeFailed(e) => {
                write!(f, "Failed to serialize config: {}", e)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadFailed(e) => Some(e),
            ConfigError::WriteFailed(e) => Some(e),
            ConfigError::ParseFailed(e) => Some(e),
            ConfigError::SerializeFailed(e) => Some(e),
        }
    }
}

/// Rejected recording transitions.
///
/// The `Display` text is shown to the user as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingError {
    /// Start requested without a device link
    NotConnected,
    /// Start requested while a recording is running
    AlreadyRecording,
    /// Advance requested while a recording is running
    StillRecording,
    /// Advance requested before the current lead holds any samples
    IncompleteLead(Lead),
    /// All three leads are done; the session is in the assembly phase
    SessionFinished,
    /// Analysis requested before all three leads are recorded
    LeadsPending,
}

impl fmt::Display for RecordingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingError::NotConnected => {
                write!(f, "Please connect to a device first")
            }
            RecordingError::AlreadyRecording => {
                write!(f, "A recording is already in progress")
            }
            RecordingError::StillRecording => {
                write!(
                    f,
                    "Please wait for the measurement to complete or stop it manually"
                )
            }
            RecordingError::IncompleteLead(lead) => {
                write!(f, "Please complete a recording for Lead {}", lead)
            }
            RecordingError::SessionFinished => {
                write!(f, "All leads are recorded; run the analysis or start a new session")
            }
            RecordingError::LeadsPending => {
                write!(f, "Please record all three leads before analysis")
            }
        }
    }
}

impl std::error::Error for RecordingError {}

/// Errors from the external analysis step
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Lead I has no samples, so there is nothing to submit
    MissingLeadOne,
    /// Network or transport failure
    Request(String),
    /// The service answered with a non-success status
    Server { status: u16, message: String },
    /// The response body was not a verdict
    Decode(String),
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::MissingLeadOne => {
                write!(f, "Please measure Lead I first")
            }
            AnalysisError::Request(msg) => {
                write!(f, "Analysis failed: {}", msg)
            }
            AnalysisError::Server { status, message } => {
                write!(f, "Analysis failed: service returned {}: {}", status, message)
            }
            AnalysisError::Decode(msg) => {
                write!(f, "Analysis failed: unreadable response: {}", msg)
            }
        }
    }
}

impl std::error::Error for AnalysisError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_display() {
        let err = ConnectionError::Connect {
            endpoint: "ws://192.168.1.100:81".to_string(),
            reason: "refused".to_string(),
        };
        assert!(err.to_string().contains("ws://192.168.1.100:81"));
        assert!(err.to_string().contains("refused"));
    }

    #[test]
    fn test_config_error_chain() {
        use std::error::Error;
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = ConfigError::ReadFailed(io_err);
        assert!(err.source().is_some());
    }

    #[test]
    fn test_incomplete_lead_names_the_lead() {
        let err = RecordingError::IncompleteLead(Lead::II);
        assert_eq!(err.to_string(), "Please complete a recording for Lead II");
    }

    #[test]
    fn test_leads_pending_message() {
        assert_eq!(
            RecordingError::LeadsPending.to_string(),
            "Please record all three leads before analysis"
        );
    }

    #[test]
    fn test_missing_lead_one_message() {
        assert_eq!(AnalysisError::MissingLeadOne.to_string(), "Please measure Lead I first");
    }
}
