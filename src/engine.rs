//! VaR run driver
//!
//! Values the portfolio, builds return series for the held factors, then
//! runs the configured estimator once per reporting scope: the total, each
//! business line and each metal. Every scope is estimated from its own
//! positions, so partition figures keep their diversification effects and
//! the total is not the sum of its parts.

use crate::analytics::covariance::CovarianceEngine;
use crate::analytics::returns::{ReturnSeriesBuilder, ReturnSeriesSet};
use crate::analytics::valuation::{
    factor_exposures_of, gross_of, latest_quotes, PortfolioValuation, PortfolioValuator,
    PositionExposure,
};
use crate::analytics::var::{HistoricalVar, ParametricVar, VarMethod, VarResult};
use crate::config::VarConfig;
use crate::error::{Result, VarError};
use crate::model::{Position, PriceObservation, RiskFactorKey};
use crate::{RiskWarning, VarReport, VarScope};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Splits a valued portfolio into reporting scopes
pub struct Aggregator;

impl Aggregator {
    /// Scopes in reporting order (total, business lines, metals) with the
    /// valued exposures belonging to each.
    ///
    /// Labels come from every input position, so a business line whose
    /// positions were all excluded still gets a (possibly empty) scope.
    pub fn partition<'a>(
        positions: &[Position],
        valuation: &'a PortfolioValuation,
    ) -> Vec<(VarScope, Vec<&'a PositionExposure>)> {
        let mut by_line: BTreeMap<&str, Vec<&'a PositionExposure>> = BTreeMap::new();
        let mut by_metal: BTreeMap<&str, Vec<&'a PositionExposure>> = BTreeMap::new();

        for position in positions {
            by_line.entry(position.business_line.as_str()).or_default();
            by_metal.entry(position.metal.as_str()).or_default();
        }
        for exposure in &valuation.exposures {
            if let Some(members) = by_line.get_mut(exposure.business_line.as_str()) {
                members.push(exposure);
            }
            if let Some(members) = by_metal.get_mut(exposure.metal.as_str()) {
                members.push(exposure);
            }
        }

        let mut scopes = Vec::with_capacity(1 + by_line.len() + by_metal.len());
        scopes.push((VarScope::Total, valuation.exposures.iter().collect()));
        scopes.extend(
            by_line
                .into_iter()
                .map(|(name, members)| (VarScope::BusinessLine(name.to_string()), members)),
        );
        scopes.extend(
            by_metal
                .into_iter()
                .map(|(name, members)| (VarScope::Metal(name.to_string()), members)),
        );
        scopes
    }
}

/// Estimator chosen for a run, built once from the configuration
enum Estimator {
    Parametric(ParametricVar),
    Historical(HistoricalVar),
}

/// VaR calculation engine
///
/// Holds a validated configuration; each [`run`](VarEngine::run) is an
/// independent, deterministic batch over immutable inputs.
pub struct VarEngine {
    config: VarConfig,
    covariance: CovarianceEngine,
}

impl VarEngine {
    /// Create an engine, rejecting an invalid configuration up front
    pub fn new(config: VarConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            covariance: CovarianceEngine::new(),
        })
    }

    /// Load the configuration from a YAML string
    ///
    /// # Example
    ///
    /// ```
    /// use metals_var::VarEngine;
    ///
    /// let yaml = r#"
    /// method: parametric
    /// confidence_level: 0.99
    /// horizon_days: 10
    /// "#;
    ///
    /// let engine = VarEngine::from_yaml(yaml).unwrap();
    /// assert_eq!(engine.config().horizon_days, 10);
    /// ```
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Self::new(VarConfig::from_yaml(yaml)?)
    }

    /// Load the configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        Self::new(VarConfig::from_json(json)?)
    }

    pub fn config(&self) -> &VarConfig {
        &self.config
    }

    /// Compute VaR for every scope of the portfolio.
    ///
    /// Either every scope gets a result (with warnings for anything left
    /// out) or the run fails as a whole with a configuration error.
    pub fn run(&self, positions: &[Position], prices: &[PriceObservation]) -> Result<VarReport> {
        let estimator = self.estimator()?;
        let builder = ReturnSeriesBuilder::new(self.config.lookback_days)?;
        let valuator =
            PortfolioValuator::new(self.config.base_currency.clone(), self.config.fx_rates.clone());

        info!(
            "Running {} VaR at {:.1}% over {} positions and {} prices",
            self.config.method,
            self.config.confidence_level * 100.0,
            positions.len(),
            prices.len()
        );

        let quotes = latest_quotes(prices);
        let valuation = valuator.value(positions, &quotes)?;

        // Every factor a position names, priced or not, so quote-side gaps are reported
        let held: BTreeSet<RiskFactorKey> = positions.iter().map(Position::risk_factor).collect();
        let returns =
            builder.build(prices.iter().filter(|p| held.contains(&p.risk_factor())));

        let mut warnings = valuation.warnings.clone();
        warnings.extend(returns.warnings.iter().cloned());

        let scopes = Aggregator::partition(positions, &valuation);
        let mut results = Vec::with_capacity(scopes.len());

        for (scope, members) in scopes {
            let var_amount = match &estimator {
                Estimator::Parametric(model) => {
                    self.parametric_scope(model, &scope, &members, &returns, &mut warnings)?
                }
                Estimator::Historical(model) => {
                    self.historical_scope(model, &scope, &members, &returns, &mut warnings)?
                }
            };

            debug!("{} VaR for {}: {:.2}", self.config.method, scope, var_amount);

            results.push(VarResult {
                scope,
                method: self.config.method,
                confidence_level: self.config.confidence_level,
                time_horizon_days: self.horizon_for(self.config.method),
                var_amount,
            });
        }

        info!(
            "Computed {} VaR results with {} warning(s)",
            results.len(),
            warnings.len()
        );

        Ok(VarReport { results, warnings })
    }

    fn estimator(&self) -> Result<Estimator> {
        Ok(match self.config.method {
            VarMethod::Parametric => Estimator::Parametric(ParametricVar::new(
                self.config.confidence_level,
                self.config.horizon_days,
            )?),
            VarMethod::Historical => {
                Estimator::Historical(HistoricalVar::new(self.config.confidence_level)?)
            }
        })
    }

    /// Historical VaR is a one-day figure; only parametric scales by horizon
    fn horizon_for(&self, method: VarMethod) -> u32 {
        match method {
            VarMethod::Parametric => self.config.horizon_days,
            VarMethod::Historical => 1,
        }
    }

    fn parametric_scope(
        &self,
        model: &ParametricVar,
        scope: &VarScope,
        members: &[&PositionExposure],
        returns: &ReturnSeriesSet,
        warnings: &mut Vec<RiskWarning>,
    ) -> Result<f64> {
        let method = VarMethod::Parametric;
        let gross = gross_of(members.iter().copied());
        if gross == 0.0 {
            return Ok(unestimable(scope, method, "zero gross exposure", warnings));
        }

        let exposures = factor_exposures_of(members.iter().copied());
        let factors: Vec<RiskFactorKey> = exposures
            .keys()
            .filter(|f| returns.is_usable(f))
            .cloned()
            .collect();
        if factors.is_empty() {
            return Ok(unestimable(scope, method, "no factor with return history", warnings));
        }

        let covariance = match self.covariance.estimate(returns, &factors) {
            Ok(covariance) => covariance,
            Err(VarError::InsufficientData(reason)) => {
                return Ok(unestimable(scope, method, &reason, warnings));
            }
            Err(e) => return Err(e),
        };

        let weights: BTreeMap<RiskFactorKey, f64> = exposures
            .into_iter()
            .map(|(factor, exposure)| (factor, exposure / gross))
            .collect();
        let w = ParametricVar::align_weights(&weights, &covariance);

        let outcome = model.calculate(&w, &covariance, gross)?;
        if let Some(variance) = outcome.clamped_from {
            let warning = RiskWarning::NegativeVarianceClamped {
                scope: scope.clone(),
                variance,
            };
            warn!("{}", warning);
            warnings.push(warning);
        }

        Ok(outcome.var_amount)
    }

    fn historical_scope(
        &self,
        model: &HistoricalVar,
        scope: &VarScope,
        members: &[&PositionExposure],
        returns: &ReturnSeriesSet,
        warnings: &mut Vec<RiskWarning>,
    ) -> Result<f64> {
        let method = VarMethod::Historical;
        if gross_of(members.iter().copied()) == 0.0 {
            return Ok(unestimable(scope, method, "zero gross exposure", warnings));
        }

        let exposures = factor_exposures_of(members.iter().copied());
        let (loss, simulation) =
            match model.calculate(&exposures, returns, self.config.missing_data) {
                Ok(outcome) => outcome,
                Err(VarError::InsufficientData(_)) => {
                    return Ok(unestimable(
                        scope,
                        method,
                        "no day with returns for every factor",
                        warnings,
                    ));
                }
                Err(e) => return Err(e),
            };

        if simulation.dropped_days > 0 {
            let warning = RiskWarning::DroppedSimulationDays {
                scope: scope.clone(),
                dropped: simulation.dropped_days,
                kept: simulation.len(),
            };
            warn!("{}", warning);
            warnings.push(warning);
        }

        Ok(loss)
    }
}

/// Record a scope that cannot be estimated; its VaR is reported as zero
fn unestimable(
    scope: &VarScope,
    method: VarMethod,
    reason: &str,
    warnings: &mut Vec<RiskWarning>,
) -> f64 {
    let warning = RiskWarning::UnestimableScope {
        scope: scope.clone(),
        method,
        reason: reason.to_string(),
    };
    warn!("{}", warning);
    warnings.push(warning);
    0.0
}
