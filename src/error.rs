//! Error types for slot probes

use std::fmt;

/// Result type alias for probe operations
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Category of a probe failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeErrorKind {
    /// Target unreachable, timed out or answered with a non-success status
    Network,

    /// Target answered but the body was not a valid slot
    Parse,
}

/// Error returned by a single slot lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeError {
    pub kind: ProbeErrorKind,

    /// Human-readable detail (URL, transport error, offending body)
    pub detail: String,

    /// HTTP status code, if the target answered with a non-success status
    pub status: Option<u16>,
}

impl ProbeError {
    pub fn network(detail: impl Into<String>) -> Self {
        Self {
            kind: ProbeErrorKind::Network,
            detail: detail.into(),
            status: None,
        }
    }

    pub fn parse(detail: impl Into<String>) -> Self {
        Self {
            kind: ProbeErrorKind::Parse,
            detail: detail.into(),
            status: None,
        }
    }

    /// Non-success HTTP status from `url`
    pub fn status(status: u16, url: &str) -> Self {
        Self {
            kind: ProbeErrorKind::Network,
            detail: format!("HTTP {status} from {url}"),
            status: Some(status),
        }
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ProbeErrorKind::Network => write!(f, "network error: {}", self.detail),
            ProbeErrorKind::Parse => write!(f, "parse error: {}", self.detail),
        }
    }
}

impl std::error::Error for ProbeError {}
