//! # metals-var: Value-at-Risk for metals futures and forwards
//!
//! This library turns the cleaned positions and prices tables of a metals
//! book into parametric and historical VaR figures for the whole portfolio,
//! each business line and each metal.
//!
//! ## Core Components
//!
//! - **ReturnSeriesBuilder**: daily simple returns per risk factor over a lookback window
//! - **CovarianceEngine**: sample covariance of the held factors on aligned dates
//! - **PortfolioValuator**: signed exposures and gross-normalised weights
//! - **ParametricVar / HistoricalVar**: the two estimators
//! - **VarEngine**: runs the chosen estimator for every reporting scope
//!
//! Data gaps never abort a run. They are returned as [`RiskWarning`]s next to
//! the results; only configuration problems are errors.
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::NaiveDate;
//! use metals_var::{LongShort, Position, PriceObservation, VarConfig, VarEngine, VarScope};
//!
//! let maturity = NaiveDate::from_ymd_opt(2024, 12, 18).unwrap();
//! let positions = vec![Position {
//!     maturity,
//!     contract_type: "Future".to_string(),
//!     business_line: "Copper".to_string(),
//!     strategy: "Hedge".to_string(),
//!     metal: "Copper".to_string(),
//!     exchange: "LME".to_string(),
//!     currency: "USD".to_string(),
//!     long_short: LongShort::Long,
//!     volume: 25.0,
//!     unit: "MT".to_string(),
//! }];
//!
//! let prices: Vec<PriceObservation> = [(2, 9000.0), (3, 9090.0), (4, 8999.1), (5, 9044.1)]
//!     .iter()
//!     .map(|&(day, quote)| PriceObservation {
//!         price_date: NaiveDate::from_ymd_opt(2024, 9, day).unwrap(),
//!         maturity,
//!         quote_value: quote,
//!         metal: "Copper".to_string(),
//!         exchange: "LME".to_string(),
//!         unit: "USD/MT".to_string(),
//!     })
//!     .collect();
//!
//! let engine = VarEngine::new(VarConfig::default()).unwrap();
//! let report = engine.run(&positions, &prices).unwrap();
//!
//! let total = report.total().unwrap();
//! assert_eq!(total.scope, VarScope::Total);
//! assert!(total.var_amount > 0.0);
//! assert!(report.warnings.is_empty());
//! ```

pub mod analytics;
pub mod config;
mod engine;
pub mod error;
pub mod loader;
pub mod model;

pub use analytics::{
    CovarianceEngine, CovarianceMatrix, HistoricalVar, LatestQuote, ParametricVar, PnlSimulation,
    PortfolioValuation, PortfolioValuator, PositionExposure, ReturnSeries, ReturnSeriesBuilder,
    ReturnSeriesSet, VarMethod, VarResult,
};
pub use config::{MissingDataPolicy, VarConfig};
pub use engine::{Aggregator, VarEngine};
pub use error::{Result, VarError};
pub use model::{LongShort, Position, PriceObservation, RiskFactorKey};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Part of the portfolio a VaR figure refers to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum VarScope {
    /// Every valued position
    Total,

    /// Positions of one business line
    BusinessLine(String),

    /// Positions on one metal
    Metal(String),
}

impl VarScope {
    /// Report label: "total", or the business line / metal name
    pub fn label(&self) -> &str {
        match self {
            VarScope::Total => "total",
            VarScope::BusinessLine(name) | VarScope::Metal(name) => name,
        }
    }
}

impl fmt::Display for VarScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarScope::Total => f.write_str("total"),
            VarScope::BusinessLine(name) => write!(f, "business line {}", name),
            VarScope::Metal(name) => write!(f, "metal {}", name),
        }
    }
}

/// Recoverable condition met during a run
///
/// The affected element is left out and the run continues. Every warning is
/// also logged when it is raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RiskWarning {
    /// Fewer than two usable prices inside the lookback window
    InsufficientHistory {
        factor: RiskFactorKey,
        observations: usize,
    },

    /// Non-positive or non-numeric quotes dropped
    InvalidQuotes { factor: RiskFactorKey, dropped: usize },

    /// Positions with a non-numeric or infinite volume; they are excluded
    InvalidVolume {
        factor: RiskFactorKey,
        positions: usize,
    },

    /// Two quotes for the same factor and date; the later row was kept
    DuplicatePriceDate { factor: RiskFactorKey, date: NaiveDate },

    /// No quote for a held factor; its positions are excluded
    MissingPrice {
        factor: RiskFactorKey,
        positions: usize,
    },

    /// Volume or quote unit that cannot be converted to tonnes
    UnrecognisedUnit { unit: String, rows: usize },

    /// Position currency without a configured conversion rate
    UnconvertibleCurrency { currency: String, positions: usize },

    /// Portfolio variance came out negative and was clamped to zero
    NegativeVarianceClamped { scope: VarScope, variance: f64 },

    /// No estimate possible for a scope; its VaR is reported as zero
    UnestimableScope {
        scope: VarScope,
        method: VarMethod,
        reason: String,
    },

    /// Historical days left out because a factor had no return on them
    DroppedSimulationDays {
        scope: VarScope,
        dropped: usize,
        kept: usize,
    },
}

impl RiskWarning {
    /// Risk factor the warning is about, if any
    pub fn factor(&self) -> Option<&RiskFactorKey> {
        match self {
            RiskWarning::InsufficientHistory { factor, .. }
            | RiskWarning::InvalidQuotes { factor, .. }
            | RiskWarning::InvalidVolume { factor, .. }
            | RiskWarning::DuplicatePriceDate { factor, .. }
            | RiskWarning::MissingPrice { factor, .. } => Some(factor),
            _ => None,
        }
    }
}

impl fmt::Display for RiskWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskWarning::InsufficientHistory {
                factor,
                observations,
            } => write!(
                f,
                "{}: only {} usable price(s) in lookback window, excluded from risk",
                factor, observations
            ),
            RiskWarning::InvalidQuotes { factor, dropped } => {
                write!(f, "{}: dropped {} non-positive or non-numeric quote(s)", factor, dropped)
            }
            RiskWarning::InvalidVolume { factor, positions } => write!(
                f,
                "{}: {} position(s) with non-numeric volume excluded",
                factor, positions
            ),
            RiskWarning::DuplicatePriceDate { factor, date } => {
                write!(f, "{}: duplicate quotes on {}, kept the last", factor, date)
            }
            RiskWarning::MissingPrice { factor, positions } => write!(
                f,
                "{}: no price available, {} position(s) excluded",
                factor, positions
            ),
            RiskWarning::UnrecognisedUnit { unit, rows } => {
                write!(f, "unit '{}' not recognised, {} row(s) excluded", unit, rows)
            }
            RiskWarning::UnconvertibleCurrency {
                currency,
                positions,
            } => write!(
                f,
                "no fx rate for {}, {} position(s) excluded",
                currency, positions
            ),
            RiskWarning::NegativeVarianceClamped { scope, variance } => write!(
                f,
                "{}: negative portfolio variance {:e} clamped to zero",
                scope, variance
            ),
            RiskWarning::UnestimableScope {
                scope,
                method,
                reason,
            } => write!(f, "{}: {} VaR not estimable ({})", scope, method, reason),
            RiskWarning::DroppedSimulationDays {
                scope,
                dropped,
                kept,
            } => write!(
                f,
                "{}: {} simulation day(s) dropped for missing returns, {} kept",
                scope, dropped, kept
            ),
        }
    }
}

/// Output of one run: a result per scope plus the warnings raised
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VarReport {
    pub results: Vec<VarResult>,
    pub warnings: Vec<RiskWarning>,
}

impl VarReport {
    pub fn get(&self, scope: &VarScope) -> Option<&VarResult> {
        self.results.iter().find(|r| &r.scope == scope)
    }

    pub fn total(&self) -> Option<&VarResult> {
        self.get(&VarScope::Total)
    }

    pub fn business_lines(&self) -> impl Iterator<Item = &VarResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.scope, VarScope::BusinessLine(_)))
    }

    pub fn metals(&self) -> impl Iterator<Item = &VarResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.scope, VarScope::Metal(_)))
    }

    /// Factors named by any warning
    pub fn flagged_factors(&self) -> Vec<&RiskFactorKey> {
        let mut factors: Vec<&RiskFactorKey> =
            self.warnings.iter().filter_map(|w| w.factor()).collect();
        factors.sort();
        factors.dedup();
        factors
    }
}
