//! Error handling and error types for gridtrain.
//!
//! Every failure in the orchestration core is surfaced as a [`GridError`]
//! through the crate-wide [`Result`] alias. None of these errors are retried
//! internally: retrying (for example re-running from the last good
//! checkpoint) is the job of the external training loop.

use std::io;
use thiserror::Error;

/// Main error type for the gridtrain library.
#[derive(Error, Debug)]
pub enum GridError {
    /// An execution mode outside {training, validation, testing} was selected.
    #[error("Unknown execution mode: {mode} is not supported by the input coordinator")]
    UnknownMode {
        /// Display name of the offending mode
        mode: String,
    },

    /// An operation that needs an active execution mode ran without one.
    #[error("Invalid execution mode: {operation} requires an execution mode to be selected")]
    InvalidMode {
        /// Operation that was attempted
        operation: String,
    },

    /// Attached datasets disagree on feature or label dimensionality.
    #[error(
        "Dataset shape mismatch: {phase} {quantity} size {actual} does not match the established size {expected}"
    )]
    DatasetShapeMismatch {
        /// Phase whose dataset conflicts with the ones checked before it
        phase: String,
        /// "feature" or "label"
        quantity: String,
        /// Size established by earlier phases
        expected: i64,
        /// Size reported by the conflicting phase
        actual: i64,
    },

    /// Ranks failed to rendezvous on a collective (timeout or mismatched calls).
    #[error("Collective failure in {scope} {operation}: {reason}")]
    CollectiveFailure {
        /// Communicator scope of the collective
        scope: String,
        /// Collective operation tag
        operation: String,
        /// What went wrong
        reason: String,
    },

    /// A checkpointed matrix does not match the shape of the live matrix.
    #[error("Dimension mismatch on restore of layer {layer} ({name}): expected {expected}, found {actual}")]
    DimensionMismatchOnRestore {
        /// Layer index the matrix belongs to
        layer: usize,
        /// Checkpoint entry name that was looked up
        name: String,
        /// Live matrix shape
        expected: String,
        /// Stored matrix shape
        actual: String,
    },

    /// A checkpoint entry that must exist is missing.
    #[error("Missing checkpoint entry: {namespace}/{key}")]
    MissingCheckpointEntry {
        /// Persistence namespace
        namespace: String,
        /// Entry key
        key: String,
    },

    /// Checkpoint layout or manifest problems.
    #[error("Checkpoint error: {message}")]
    Checkpoint { message: String },

    /// A metric failed to produce a value.
    #[error("Metric error in {metric}: {message}")]
    Metric {
        /// Metric name
        metric: String,
        /// What went wrong
        message: String,
    },

    /// Configuration and validation errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Invalid input parameters
    #[error("Invalid parameter: {parameter} = {value}, {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },

    /// File I/O errors
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    /// Bincode serialization errors
    #[error("Bincode error: {source}")]
    Bincode {
        #[from]
        source: bincode::Error,
    },

    /// JSON serialization errors
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    /// TOML configuration errors
    #[error("TOML error: {message}")]
    Toml { message: String },

    /// Internal library errors (should not occur in normal usage)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Type alias for Results using GridError
pub type Result<T> = std::result::Result<T, GridError>;

impl GridError {
    /// Create an unknown-mode error
    pub fn unknown_mode<S: Into<String>>(mode: S) -> Self {
        GridError::UnknownMode { mode: mode.into() }
    }

    /// Create an invalid-mode error
    pub fn invalid_mode<S: Into<String>>(operation: S) -> Self {
        GridError::InvalidMode {
            operation: operation.into(),
        }
    }

    /// Create a dataset shape mismatch error
    pub fn shape_mismatch<P, Q>(phase: P, quantity: Q, expected: i64, actual: i64) -> Self
    where
        P: Into<String>,
        Q: Into<String>,
    {
        GridError::DatasetShapeMismatch {
            phase: phase.into(),
            quantity: quantity.into(),
            expected,
            actual,
        }
    }

    /// Create a collective failure error
    pub fn collective<S, O, R>(scope: S, operation: O, reason: R) -> Self
    where
        S: Into<String>,
        O: Into<String>,
        R: Into<String>,
    {
        GridError::CollectiveFailure {
            scope: scope.into(),
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a restore-time dimension mismatch error
    pub fn restore_mismatch<N, E, A>(layer: usize, name: N, expected: E, actual: A) -> Self
    where
        N: Into<String>,
        E: Into<String>,
        A: Into<String>,
    {
        GridError::DimensionMismatchOnRestore {
            layer,
            name: name.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a missing checkpoint entry error
    pub fn missing_entry<N: Into<String>, K: Into<String>>(namespace: N, key: K) -> Self {
        GridError::MissingCheckpointEntry {
            namespace: namespace.into(),
            key: key.into(),
        }
    }

    /// Create a checkpoint error
    pub fn checkpoint<S: Into<String>>(message: S) -> Self {
        GridError::Checkpoint {
            message: message.into(),
        }
    }

    /// Create a metric error
    pub fn metric<M: Into<String>, S: Into<String>>(metric: M, message: S) -> Self {
        GridError::Metric {
            metric: metric.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        GridError::Config {
            message: message.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter<P, V, R>(parameter: P, value: V, reason: R) -> Self
    where
        P: Into<String>,
        V: Into<String>,
        R: Into<String>,
    {
        GridError::InvalidParameter {
            parameter: parameter.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error (should be used sparingly)
    pub fn internal<S: Into<String>>(message: S) -> Self {
        GridError::Internal {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable.
    ///
    /// Everything the orchestration core raises is fatal for the current run;
    /// only a metric failure leaves the process grid in a usable state.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, GridError::Metric { .. })
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            GridError::UnknownMode { .. } => "unknown_mode",
            GridError::InvalidMode { .. } => "invalid_mode",
            GridError::DatasetShapeMismatch { .. } => "dataset_shape_mismatch",
            GridError::CollectiveFailure { .. } => "collective_failure",
            GridError::DimensionMismatchOnRestore { .. } => "dimension_mismatch_on_restore",
            GridError::MissingCheckpointEntry { .. } => "missing_checkpoint_entry",
            GridError::Checkpoint { .. } => "checkpoint",
            GridError::Metric { .. } => "metric",
            GridError::Config { .. } => "config",
            GridError::InvalidParameter { .. } => "invalid_parameter",
            GridError::Io { .. } => "io",
            GridError::Bincode { .. } => "bincode",
            GridError::Json { .. } => "json",
            GridError::Toml { .. } => "toml",
            GridError::Internal { .. } => "internal",
        }
    }
}

impl From<toml::de::Error> for GridError {
    fn from(err: toml::de::Error) -> Self {
        GridError::Toml {
            message: format!("failed to parse: {}", err),
        }
    }
}

impl From<toml::ser::Error> for GridError {
    fn from(err: toml::ser::Error) -> Self {
        GridError::Toml {
            message: format!("failed to serialize: {}", err),
        }
    }
}

/// Convenience macros for error creation
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::core::error::GridError::config($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::core::error::GridError::config(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            return Err($err.into());
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = GridError::unknown_mode("prediction");
        assert_eq!(err.category(), "unknown_mode");
        assert!(!err.is_recoverable());

        let err = GridError::metric("categorical accuracy", "no samples recorded");
        assert_eq!(err.category(), "metric");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_shape_mismatch_names_phase() {
        let err = GridError::shape_mismatch("validation", "feature", 784, 100);
        let message = err.to_string();
        assert!(message.contains("validation"));
        assert!(message.contains("784"));
        assert!(message.contains("100"));
    }

    #[test]
    fn test_restore_mismatch_names_layer() {
        let err = GridError::restore_mismatch(3, "L3_rmsprop_10x5.bin", "10x5", "10x4");
        let message = err.to_string();
        assert!(message.contains("layer 3"));
        assert!(message.contains("L3_rmsprop_10x5.bin"));
        assert_eq!(err.category(), "dimension_mismatch_on_restore");
    }

    #[test]
    fn test_error_macros() {
        let err = config_error!("num_models must be positive");
        assert!(matches!(err, GridError::Config { .. }));

        let err = config_error!("bad value: {}", 42);
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let grid_err: GridError = io_err.into();
        assert!(matches!(grid_err, GridError::Io { .. }));
        assert_eq!(grid_err.category(), "io");
    }

    #[test]
    fn test_toml_error_conversion() {
        let parse_err = toml::from_str::<toml::Table>("num_models = ").unwrap_err();
        let grid_err: GridError = parse_err.into();
        assert_eq!(grid_err.category(), "toml");
        assert!(grid_err.to_string().starts_with("TOML error"));
    }
}
