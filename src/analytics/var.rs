//! Value at Risk estimators
//!
//! - Parametric VaR: VaR = z(c) * sqrt(wᵀ Σ w) * sqrt(T) * V, with V the gross
//!   portfolio value. Multi-day horizons use the square-root-of-time rule,
//!   which assumes i.i.d. daily returns.
//! - Historical VaR: current factor exposures replayed against realized daily
//!   returns; VaR is the loss at the (1 - c) lower quantile of the simulated
//!   P&L. No distributional assumption and no randomness.

use crate::analytics::covariance::CovarianceMatrix;
use crate::analytics::returns::ReturnSeriesSet;
use crate::config::MissingDataPolicy;
use crate::error::{Result, VarError};
use crate::model::RiskFactorKey;
use crate::VarScope;
use chrono::NaiveDate;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// VaR calculation method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarMethod {
    Parametric,
    Historical,
}

impl VarMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            VarMethod::Parametric => "parametric",
            VarMethod::Historical => "historical",
        }
    }
}

impl fmt::Display for VarMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VarMethod {
    type Err = VarError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "parametric" => Ok(VarMethod::Parametric),
            "historical" => Ok(VarMethod::Historical),
            other => Err(VarError::InvalidParameter(format!(
                "Unknown VaR method '{}' (expected parametric or historical)",
                other
            ))),
        }
    }
}

/// VaR for one scope of the portfolio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarResult {
    /// Whole portfolio, a business line or a metal
    pub scope: VarScope,

    /// Calculation method used
    pub method: VarMethod,

    /// Confidence level (e.g., 0.95, 0.99)
    pub confidence_level: f64,

    /// Time horizon in days
    pub time_horizon_days: u32,

    /// VaR amount in base currency (positive value represents potential loss)
    pub var_amount: f64,
}

/// Validate a confidence level: strictly between 0 and 1
pub fn validate_confidence(confidence_level: f64) -> Result<()> {
    if !(confidence_level > 0.0 && confidence_level < 1.0) {
        return Err(VarError::InvalidConfidenceLevel(confidence_level));
    }
    Ok(())
}

/// Inverse standard-normal quantile for `confidence_level`
pub fn z_score(confidence_level: f64) -> Result<f64> {
    validate_confidence(confidence_level)?;
    let normal =
        Normal::new(0.0, 1.0).map_err(|e| VarError::CalculationError(e.to_string()))?;
    Ok(normal.inverse_cdf(confidence_level))
}

/// Outcome of a parametric calculation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParametricOutcome {
    pub var_amount: f64,

    /// Portfolio return variance wᵀ Σ w after clamping
    pub variance: f64,

    /// Raw variance before clamping, when it came out negative
    pub clamped_from: Option<f64>,
}

/// Variance-covariance VaR
#[derive(Debug, Clone)]
pub struct ParametricVar {
    confidence_level: f64,
    time_horizon_days: u32,
    z_score: f64,
}

impl ParametricVar {
    pub fn new(confidence_level: f64, time_horizon_days: u32) -> Result<Self> {
        if time_horizon_days == 0 {
            return Err(VarError::InvalidTimeHorizon(time_horizon_days));
        }
        Ok(Self {
            confidence_level,
            time_horizon_days,
            z_score: z_score(confidence_level)?,
        })
    }

    pub fn confidence_level(&self) -> f64 {
        self.confidence_level
    }

    pub fn time_horizon_days(&self) -> u32 {
        self.time_horizon_days
    }

    pub fn z_score(&self) -> f64 {
        self.z_score
    }

    /// Weight vector aligned to the covariance factor order. Factors absent
    /// from `weights` get weight zero.
    pub fn align_weights(
        weights: &BTreeMap<RiskFactorKey, f64>,
        covariance: &CovarianceMatrix,
    ) -> DVector<f64> {
        DVector::from_iterator(
            covariance.dim(),
            covariance
                .factors()
                .iter()
                .map(|f| weights.get(f).copied().unwrap_or(0.0)),
        )
    }

    /// Portfolio variance wᵀ Σ w; returns (clamped, raw)
    pub fn portfolio_variance(
        weights: &DVector<f64>,
        covariance: &CovarianceMatrix,
    ) -> Result<(f64, f64)> {
        if weights.is_empty() {
            return Err(VarError::EmptyWeights);
        }
        if weights.len() != covariance.dim() {
            return Err(VarError::DimensionMismatch {
                weights: weights.len(),
                factors: covariance.dim(),
            });
        }

        let raw = (weights.transpose() * covariance.matrix() * weights)[(0, 0)];
        if !raw.is_finite() {
            return Err(VarError::CalculationError(format!(
                "Portfolio variance is not finite: {}",
                raw
            )));
        }
        Ok((raw.max(0.0), raw))
    }

    /// VaR of a portfolio with weights `weights` and gross value `portfolio_value`.
    ///
    /// A negative variance from floating-point error is clamped to zero and
    /// reported through `clamped_from`. Below the median (c < 0.5) the quantile
    /// is a gain and the loss is reported as zero.
    pub fn calculate(
        &self,
        weights: &DVector<f64>,
        covariance: &CovarianceMatrix,
        portfolio_value: f64,
    ) -> Result<ParametricOutcome> {
        if !portfolio_value.is_finite() || portfolio_value < 0.0 {
            return Err(VarError::InvalidParameter(format!(
                "Portfolio value must be a non-negative number, got {}",
                portfolio_value
            )));
        }

        let (variance, raw) = Self::portfolio_variance(weights, covariance)?;
        let time_scaling = (self.time_horizon_days as f64).sqrt();
        let var_amount = (self.z_score * variance.sqrt() * time_scaling * portfolio_value).max(0.0);

        Ok(ParametricOutcome {
            var_amount,
            variance,
            clamped_from: (raw < 0.0).then_some(raw),
        })
    }
}

/// Simulated daily portfolio P&L from historical returns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PnlSimulation {
    /// (date, P&L) in date order
    pub pnl: Vec<(NaiveDate, f64)>,

    /// Dates dropped because a contributing factor had no return that day
    pub dropped_days: usize,
}

impl PnlSimulation {
    /// Replay `exposures` against `returns`.
    ///
    /// Factors without a usable series are skipped entirely; callers report
    /// them. With [`MissingDataPolicy::DropDay`] only dates on which every
    /// remaining factor has a return are simulated; with
    /// [`MissingDataPolicy::ZeroFill`] every date any factor has is used and
    /// missing legs contribute nothing.
    pub fn simulate(
        exposures: &BTreeMap<RiskFactorKey, f64>,
        returns: &ReturnSeriesSet,
        policy: MissingDataPolicy,
    ) -> Self {
        let legs: Vec<(&RiskFactorKey, f64)> = exposures
            .iter()
            .filter(|(factor, _)| returns.is_usable(factor))
            .map(|(factor, exposure)| (factor, *exposure))
            .collect();

        let all_dates: BTreeSet<NaiveDate> = legs
            .iter()
            .filter_map(|(factor, _)| returns.get(factor))
            .flat_map(|series| series.dates())
            .collect();

        let mut pnl = Vec::with_capacity(all_dates.len());
        let mut dropped_days = 0;

        'dates: for date in all_dates {
            let mut total = 0.0;
            for (factor, exposure) in &legs {
                match returns.get(factor).and_then(|s| s.get(date)) {
                    Some(r) => total += exposure * r,
                    None => match policy {
                        MissingDataPolicy::DropDay => {
                            dropped_days += 1;
                            continue 'dates;
                        }
                        MissingDataPolicy::ZeroFill => {}
                    },
                }
            }
            pnl.push((date, total));
        }

        Self { pnl, dropped_days }
    }

    pub fn values(&self) -> Vec<f64> {
        self.pnl.iter().map(|(_, v)| *v).collect()
    }

    pub fn len(&self) -> usize {
        self.pnl.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pnl.is_empty()
    }
}

/// Historical-simulation VaR
#[derive(Debug, Clone)]
pub struct HistoricalVar {
    confidence_level: f64,
}

impl HistoricalVar {
    pub fn new(confidence_level: f64) -> Result<Self> {
        validate_confidence(confidence_level)?;
        Ok(Self { confidence_level })
    }

    pub fn confidence_level(&self) -> f64 {
        self.confidence_level
    }

    /// Loss at the (1 - c) lower quantile of `pnl`, as a non-negative amount.
    ///
    /// With values sorted ascending the quantile is the k-th value,
    /// k = ceil((1 - c) * n), at least 1.
    pub fn quantile_loss(&self, pnl: &[f64]) -> Result<f64> {
        if pnl.is_empty() {
            return Err(VarError::InsufficientData(
                "No simulated P&L observations".to_string(),
            ));
        }
        if pnl.iter().any(|v| !v.is_finite()) {
            return Err(VarError::CalculationError(
                "Simulated P&L contains non-finite values".to_string(),
            ));
        }

        let mut sorted = pnl.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        // Tolerance keeps exact products such as 0.2 * 5 from rounding up
        let tail = (1.0 - self.confidence_level) * sorted.len() as f64;
        let k = ((tail - 1e-9).ceil() as usize).clamp(1, sorted.len());

        Ok((-sorted[k - 1]).max(0.0))
    }

    /// Simulate and take the quantile in one step
    pub fn calculate(
        &self,
        exposures: &BTreeMap<RiskFactorKey, f64>,
        returns: &ReturnSeriesSet,
        policy: MissingDataPolicy,
    ) -> Result<(f64, PnlSimulation)> {
        let simulation = PnlSimulation::simulate(exposures, returns, policy);
        let loss = self.quantile_loss(&simulation.values())?;
        Ok((loss, simulation))
    }
}
