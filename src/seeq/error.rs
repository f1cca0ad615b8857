// error.rs

use std::error::Error as StdError;
use thiserror::Error;

use crate::seeq::types::SensorRecord;

#[derive(Error, Debug)]
pub enum SeeqError {
    #[error("{message}")]
    AuthenticationRequired { message: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed {
        message: String,
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    #[error("Invalid datetime format: Could not parse datetime '{input}'")]
    DateParse { input: String },

    #[error("Invalid datetime format: Unknown timezone '{zone}'")]
    InvalidTimezone { zone: String },

    #[error("Invalid grid '{grid}': expected a count and unit such as 15min, 1h or 1d")]
    InvalidGrid { grid: String },

    #[error("No sensors were requested")]
    NoSensorsRequested,

    #[error("No sensors found or search failed")]
    NoResults,

    #[error("No valid sensors found to pull data from")]
    NoValidSensors { records: Vec<SensorRecord> },

    #[error("Failed to pull data: {message}")]
    PullFailed {
        message: String,
        records: Vec<SensorRecord>,
    },

    #[error("JSON serialization failed: {0}")]
    Serialization(String),

    #[error("Unknown function: {0}")]
    UnknownOperation(String),

    #[error("Server error: {message} (status: {status})")]
    ServerError {
        message: String,
        status: u16,
        body: Option<String>,
    },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),
}

impl SeeqError {
    /// Short error string placed in the envelope's `error` field.
    pub fn code(&self) -> String {
        match self {
            Self::AuthenticationRequired { .. } | Self::AuthenticationFailed { .. } => {
                "Authentication required".to_string()
            }
            Self::DateParse { .. } | Self::InvalidTimezone { .. } => {
                "Datetime parsing failed".to_string()
            }
            Self::InvalidGrid { .. } => "Invalid grid".to_string(),
            Self::NoSensorsRequested => "No sensors requested".to_string(),
            Self::NoResults => "Search returned no results".to_string(),
            Self::NoValidSensors { .. } => "All sensors failed search".to_string(),
            Self::PullFailed { .. } => "Data pull failed".to_string(),
            Self::Serialization(_) => "JSON serialization failed".to_string(),
            Self::UnknownOperation(name) => format!("Unknown function: {}", name),
            Self::ServerError { .. } | Self::Http(_) | Self::Json(_) | Self::Url(_) => {
                self.to_string()
            }
        }
    }

    /// Faults nobody anticipated; these carry a traceback in the envelope.
    pub fn is_unexpected(&self) -> bool {
        matches!(
            self,
            Self::ServerError { .. } | Self::Http(_) | Self::Json(_) | Self::Url(_)
        )
    }

    /// Search records gathered before the failure, if any.
    pub fn records(&self) -> Option<&[SensorRecord]> {
        match self {
            Self::NoValidSensors { records } | Self::PullFailed { records, .. } => Some(records),
            _ => None,
        }
    }

    /// Renders the error and its source chain, one cause per line.
    pub fn traceback(&self) -> String {
        let mut trace = format!("{:?}", self);
        let mut source = self.source();
        while let Some(cause) = source {
            trace.push_str("\nCaused by: ");
            trace.push_str(&cause.to_string());
            source = cause.source();
        }
        trace
    }

    pub fn authentication_required<T: Into<String>>(message: T) -> Self {
        Self::AuthenticationRequired {
            message: message.into(),
        }
    }

    pub fn authentication_failed<T: Into<String>>(message: T) -> Self {
        Self::AuthenticationFailed {
            message: message.into(),
            source: None,
        }
    }

    pub fn server_error(status: u16, body: Option<String>) -> Self {
        Self::ServerError {
            message: format!("Server responded with status code: {}", status),
            status,
            body,
        }
    }
}

/// Result type alias for SeeqError
pub type Result<T> = std::result::Result<T, SeeqError>;
