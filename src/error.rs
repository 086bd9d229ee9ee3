//! Error types for streamfork
//!
//! Every terminal operation returns [`Result`]. Errors raised by user callbacks
//! travel as [`anyhow::Error`] inside [`StreamError::Callback`]; errors raised by
//! the engine itself (reuse, unbounded stateful stages, duplicate keys) have
//! their own variants so callers can match on them.

use std::any::Any;
use std::fmt;

use thiserror::Error;

use crate::pipeline::StageKind;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, StreamError>;

/// Main error type for streamfork
#[derive(Error, Debug)]
pub enum StreamError {
    /// A terminal operation was invoked on a pipeline that was already consumed
    #[error("pipeline has already been operated upon or consumed")]
    PipelineReuse,

    /// `sorted`/`distinct` placed downstream of an infinite source without a `limit`
    #[error(
        "unbounded stateful operation `{operation}` follows an infinite source without an intervening limit"
    )]
    UnboundedStatefulOperation { operation: StageKind },

    /// `to_map` met the same key twice and no merge function was supplied
    #[error("duplicate key {key} (attempted merging values {existing} and {incoming})")]
    DuplicateKey {
        key: String,
        existing: String,
        incoming: String,
    },

    /// A user-supplied callback failed
    #[error("callback failed: {source}{}", SuppressedSuffix(.suppressed))]
    Callback {
        #[source]
        source: anyhow::Error,
        /// Secondary errors raised by sibling tasks that were cancelled afterwards
        suppressed: Vec<StreamError>,
    },

    /// A callback panicked on a worker thread
    #[error("worker panicked: {message}")]
    WorkerPanic { message: String },

    /// Evaluation was cancelled cooperatively. Used to unwind sibling tasks;
    /// terminal operations never return it.
    #[error("evaluation cancelled")]
    Cancelled,

    /// Configuration validation failed
    #[error("invalid configuration: {message}")]
    Config { message: String },
}

impl StreamError {
    /// Wrap an error produced by a user callback.
    ///
    /// Errors that already are a [`StreamError`] (for example a duplicate key
    /// raised inside a built-in collector) are passed through unchanged.
    pub fn callback(error: anyhow::Error) -> Self {
        match error.downcast::<StreamError>() {
            Ok(engine_error) => engine_error,
            Err(source) => Self::Callback {
                source,
                suppressed: Vec::new(),
            },
        }
    }

    /// Create a duplicate key error from the colliding values
    pub fn duplicate_key(
        key: &impl fmt::Debug,
        existing: &impl fmt::Debug,
        incoming: &impl fmt::Debug,
    ) -> Self {
        Self::DuplicateKey {
            key: format!("{key:?}"),
            existing: format!("{existing:?}"),
            incoming: format!("{incoming:?}"),
        }
    }

    /// Create an invalid config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Convert a panic payload caught on a worker thread
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::WorkerPanic { message }
    }

    /// True for the internal cancellation marker
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Secondary errors attached to a callback failure
    pub fn suppressed(&self) -> &[StreamError] {
        match self {
            Self::Callback { suppressed, .. } => suppressed,
            _ => &[],
        }
    }

    /// Merge two errors raised by sibling tasks. `self` stays the primary error;
    /// `other` is attached as suppressed unless it is only a cancellation.
    pub(crate) fn absorb(self, other: StreamError) -> StreamError {
        match (self, other) {
            (primary, StreamError::Cancelled) => primary,
            (StreamError::Cancelled, secondary) => secondary,
            (
                StreamError::Callback {
                    source,
                    mut suppressed,
                },
                secondary,
            ) => {
                suppressed.push(secondary);
                StreamError::Callback { source, suppressed }
            }
            (primary, secondary) => {
                tracing::warn!("Suppressed error from sibling task: {}", secondary);
                primary
            }
        }
    }
}

struct SuppressedSuffix<'a>(&'a [StreamError]);

impl fmt::Display for SuppressedSuffix<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.len() {
            0 => Ok(()),
            1 => write!(f, " (1 suppressed error)"),
            n => write!(f, " ({n} suppressed errors)"),
        }
    }
}
