//! Unified Error Model
//!
//! A failed call yields exactly one [`ApiCallError`]. Backend-reported
//! failures are [`ApplicationError`] (service scoped) or [`CallError`]
//! (cross-service); [`TransportError`] and [`CodecError`] mean the backend
//! could not be reached or understood.
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Code → human-readable text for one service.
pub type ErrorCodeTable = HashMap<i32, String>;

/// Per-service error-code tables.
///
/// Filled during process initialization, then shared read-only behind an
/// `Arc`.
#[derive(Debug, Clone, Default)]
pub struct ErrorCodeTables {
    tables: HashMap<String, ErrorCodeTable>,
}

impl ErrorCodeTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the table for `service`
    pub fn register<I, S>(&mut self, service: impl Into<String>, table: I)
    where
        I: IntoIterator<Item = (i32, S)>,
        S: Into<String>,
    {
        let table = table.into_iter().map(|(code, text)| (code, text.into())).collect();
        self.tables.insert(service.into(), table);
    }

    pub fn get(&self, service: &str) -> Option<&ErrorCodeTable> {
        self.tables.get(service)
    }

    /// Build an [`ApplicationError`] with the table text resolved now.
    pub fn application_error(&self, service: &str, code: i32, detail: impl Into<String>) -> ApplicationError {
        let code_text = self
            .get(service)
            .map(|table| table.get(&code).cloned().unwrap_or_default());
        ApplicationError {
            service: service.to_string(),
            code,
            detail: detail.into(),
            code_text,
        }
    }
}

/// A call failed in a service-specific way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationError {
    pub service: String,
    pub code: i32,
    pub detail: String,
    /// `Some` when the service has a registered table (empty text for a
    /// code the table does not know).
    pub code_text: Option<String>,
}

impl ApplicationError {
    /// Error without a resolved code table.
    pub fn new(service: impl Into<String>, code: i32, detail: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            code,
            detail: detail.into(),
            code_text: None,
        }
    }
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.code == 0 {
            if self.detail.is_empty() {
                return write!(f, "APIError <empty>");
            }
            return write!(f, "{}", self.detail);
        }
        match &self.code_text {
            Some(text) => write!(f, "API error {} ({}: {})", self.code, self.service, text)?,
            None => write!(f, "{} API error {}", self.service, self.code)?,
        }
        if !self.detail.is_empty() {
            write!(f, ": {}", self.detail)?;
        }
        Ok(())
    }
}

impl std::error::Error for ApplicationError {}

/// Reserved cross-service codes carried by [`CallError`].
pub mod call_codes {
    pub const OK: i32 = 0;
    pub const OVER_QUOTA: i32 = 4;
    pub const CAPABILITY_DISABLED: i32 = 6;
    pub const BUFFER_ERROR: i32 = 9;
    pub const CANCELLED: i32 = 11;
}

/// A call failed in a generic way, e.g. quota or a disabled capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallError {
    pub code: i32,
    pub detail: String,
}

impl CallError {
    pub fn new(code: i32, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let phrase = match self.code {
            call_codes::OK => return write!(f, "{}", self.detail),
            call_codes::OVER_QUOTA => "Over quota".to_string(),
            call_codes::CAPABILITY_DISABLED => "Capability disabled".to_string(),
            call_codes::BUFFER_ERROR => "Buffer error".to_string(),
            call_codes::CANCELLED => "Canceled".to_string(),
            other => format!("Call error {}", other),
        };
        write!(f, "{}: {}", phrase, self.detail)
    }
}

impl std::error::Error for CallError {}

/// The backend could not be reached or answered outside HTTP success.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),

    #[error("could not connect to backend at {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to read backend response: {0}")]
    Body(#[source] reqwest::Error),

    #[error("backend request failed: {0}")]
    Request(#[source] reqwest::Error),
}

/// The envelope itself is unusable.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("malformed envelope: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("response envelope carries neither a payload nor an error")]
    EmptyResponse,

    #[error("response envelope carries an exception blob")]
    Exception,

    #[error("payload is not a {expected}")]
    PayloadMismatch { expected: &'static str },
}

/// Result error of `Call`.
#[derive(Error, Debug)]
pub enum ApiCallError {
    #[error(transparent)]
    Application(#[from] ApplicationError),

    #[error(transparent)]
    Call(#[from] CallError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl ApiCallError {
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn application(&self) -> Option<&ApplicationError> {
        match self {
            Self::Application(e) => Some(e),
            _ => None,
        }
    }
}
