//! Error types for VaR runs
//!
//! Only conditions that make a run meaningless are errors. Data gaps and
//! numeric anomalies are reported as [`RiskWarning`](crate::RiskWarning)s
//! alongside the results instead.

use thiserror::Error;

/// Errors that abort a VaR run
#[derive(Error, Debug)]
pub enum VarError {
    #[error("Invalid confidence level: {0} (must be between 0 and 1)")]
    InvalidConfidenceLevel(f64),

    #[error("Invalid time horizon: {0} (must be positive)")]
    InvalidTimeHorizon(u32),

    #[error("Invalid lookback window: {0} days (must be positive)")]
    InvalidLookback(u32),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Weight vector has {weights} entries but covariance matrix covers {factors} factors")]
    DimensionMismatch { weights: usize, factors: usize },

    #[error("Weight vector is empty")]
    EmptyWeights,

    #[error("Portfolio contains no positions")]
    EmptyPortfolio,

    #[error("Gross portfolio exposure is zero, weights cannot be normalised")]
    ZeroGrossExposure,

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl VarError {
    /// Whether this error belongs to the configuration class: a bad parameter
    /// or an inconsistent input shape rather than a data or I/O problem.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            VarError::InvalidConfidenceLevel(_)
                | VarError::InvalidTimeHorizon(_)
                | VarError::InvalidLookback(_)
                | VarError::InvalidParameter(_)
                | VarError::DimensionMismatch { .. }
                | VarError::EmptyWeights
                | VarError::EmptyPortfolio
                | VarError::ZeroGrossExposure
                | VarError::ConfigParse(_)
        )
    }
}

impl From<serde_yaml::Error> for VarError {
    fn from(err: serde_yaml::Error) -> Self {
        VarError::ConfigParse(err.to_string())
    }
}

impl From<serde_json::Error> for VarError {
    fn from(err: serde_json::Error) -> Self {
        VarError::ConfigParse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VarError>;
