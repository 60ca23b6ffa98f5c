//! # VaR Analytics
//!
//! The computational core. Every component is a pure function of its inputs.
//!
//! ## Modules
//!
//! - `returns`: daily return series per risk factor
//! - `covariance`: covariance matrix on aligned return dates
//! - `valuation`: signed exposures and weights
//! - `var`: parametric and historical estimators

pub mod covariance;
pub mod returns;
pub mod valuation;
pub mod var;

pub use covariance::{CovarianceEngine, CovarianceMatrix};
pub use returns::{ReturnPoint, ReturnSeries, ReturnSeriesBuilder, ReturnSeriesSet};
pub use valuation::{
    latest_quotes, LatestQuote, PortfolioValuation, PortfolioValuator, PositionExposure,
};
pub use var::{z_score, HistoricalVar, ParametricOutcome, ParametricVar, PnlSimulation, VarMethod, VarResult};
