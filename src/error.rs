//! Error taxonomy for the recoverable failure modes of the engine.
//!
//! Every variant here is recovered locally: a failing source degrades to an
//! empty result set, a record that cannot be normalized is dropped, and a
//! cache outage falls back to computing fresh results. Nothing in this crate
//! treats these as fatal.

/// A source adapter call that could not produce results.
///
/// The aggregator logs these at `warn` and continues with the remaining
/// sources; they are never propagated to the caller of
/// [`fetch`](crate::aggregator::EvidenceAggregator::fetch).
///
/// `Display` and `Error` are implemented by hand because the `source` field
/// holds the adapter's name, not a causal error, and `thiserror` would
/// otherwise treat any field named `source` as the `Error::source()` chain.
#[derive(Debug)]
pub enum SourceError {
    /// Transport-level failure (connect, TLS, DNS).
    Unavailable { source: String, reason: String },

    /// The upstream service answered with a non-2xx status.
    Status { source: String, status: u16 },

    /// The request exceeded the configured deadline.
    Timeout { source: String, secs: u64 },

    /// The payload came back but could not be interpreted.
    Malformed { source: String, reason: String },

    /// The adapter's rate gate was closed during shutdown.
    GateClosed { source: String },
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Unavailable { source, reason } => {
                write!(f, "{source}: request failed: {reason}")
            }
            SourceError::Status { source, status } => {
                write!(f, "{source}: unexpected status {status}")
            }
            SourceError::Timeout { source, secs } => {
                write!(f, "{source}: timed out after {secs}s")
            }
            SourceError::Malformed { source, reason } => {
                write!(f, "{source}: malformed payload: {reason}")
            }
            SourceError::GateClosed { source } => write!(f, "{source}: rate gate closed"),
        }
    }
}

impl std::error::Error for SourceError {}

impl SourceError {
    /// Classify a `reqwest` error into the taxonomy.
    pub fn from_http(source: &str, timeout_secs: u64, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Timeout {
                source: source.to_string(),
                secs: timeout_secs,
            }
        } else if err.is_decode() {
            SourceError::Malformed {
                source: source.to_string(),
                reason: err.to_string(),
            }
        } else {
            SourceError::Unavailable {
                source: source.to_string(),
                reason: err.to_string(),
            }
        }
    }

    pub fn malformed(source: &str, reason: impl Into<String>) -> Self {
        SourceError::Malformed {
            source: source.to_string(),
            reason: reason.into(),
        }
    }
}
