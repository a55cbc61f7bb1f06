//! Error types.
//!
//! Two layers:
//!
//! - [`ForecastError`]: the library taxonomy (input, data, numeric). The numeric core
//!   only ever returns these.
//! - [`AppError`]: what the `cmig` binary prints, carrying a process exit code.

use thiserror::Error;

/// Bad caller input. Always raised before any matrix work starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("risk score {score} is outside [0, 100]")]
    ScoreOutOfRange { score: f64 },

    /// The rating string has no entry in the rating table.
    ///
    /// Callers fall back to score-based classification; an unmapped rating is never
    /// treated as a default.
    #[error("unmapped credit rating '{rating}'")]
    UnmappedRating { rating: String },

    #[error("unmapped sector '{sector}'")]
    UnmappedSector { sector: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Missing upstream data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    /// Neither the migration source nor a fallback table could supply a base matrix.
    #[error("no migration data available: {reason}")]
    MigrationDataUnavailable { reason: String },

    /// Nothing to classify the company from (no default flag, score, or mapped rating).
    #[error("cannot resolve a risk state for '{company}': {reason}")]
    UpstreamData { company: String, reason: String },
}

/// Numerical failures in matrix construction or absorption algebra.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NumericError {
    #[error("invalid transition matrix after {step}: {detail}")]
    InvalidMatrix { step: String, detail: String },

    #[error("absorption from {state} unresolved after {periods} periods (absorbed mass {absorbed:.6})")]
    UnresolvedAbsorption {
        state: String,
        periods: u32,
        absorbed: f64,
    },
}

/// Library error taxonomy.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Numeric(#[from] NumericError),
}

impl ForecastError {
    pub fn invalid_matrix(step: impl Into<String>, detail: impl Into<String>) -> Self {
        NumericError::InvalidMatrix {
            step: step.into(),
            detail: detail.into(),
        }
        .into()
    }

    /// Exit code used by the binary for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            ForecastError::Input(_) => 2,
            ForecastError::Data(_) => 4,
            ForecastError::Numeric(_) => 5,
        }
    }
}

/// Failure reported by a [`crate::chain::RatingMigrationSource`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("migration data unavailable: {reason}")]
pub struct DataUnavailable {
    pub reason: String,
}

impl DataUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<ForecastError> for AppError {
    fn from(err: ForecastError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
