//! Return covariance over the risk factors of a portfolio
//!
//! Series are aligned with an inner join: only dates on which *every*
//! requested factor has a return are used. Factors on different holiday
//! calendars therefore shorten the common sample rather than being paired
//! date-by-date with different samples per pair.

use crate::analytics::returns::ReturnSeriesSet;
use crate::error::{Result, VarError};
use crate::model::RiskFactorKey;
use chrono::NaiveDate;
use nalgebra::DMatrix;
use std::collections::BTreeSet;
use tracing::debug;

/// Square covariance matrix indexed by an ordered list of risk factors
#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceMatrix {
    factors: Vec<RiskFactorKey>,
    matrix: DMatrix<f64>,
    observations: usize,
}

impl CovarianceMatrix {
    /// Wrap an existing matrix. It must be square with one row per factor.
    pub fn from_parts(
        factors: Vec<RiskFactorKey>,
        matrix: DMatrix<f64>,
        observations: usize,
    ) -> Result<Self> {
        if matrix.nrows() != matrix.ncols() || matrix.nrows() != factors.len() {
            return Err(VarError::InvalidParameter(format!(
                "Covariance matrix is {}x{} for {} factors",
                matrix.nrows(),
                matrix.ncols(),
                factors.len()
            )));
        }
        Ok(Self {
            factors,
            matrix,
            observations,
        })
    }

    pub fn factors(&self) -> &[RiskFactorKey] {
        &self.factors
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    pub fn dim(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// Number of aligned return dates the estimate is based on
    pub fn observations(&self) -> usize {
        self.observations
    }

    pub fn index_of(&self, factor: &RiskFactorKey) -> Option<usize> {
        self.factors.iter().position(|f| f == factor)
    }

    /// Covariance between two factors, if both are in the matrix
    pub fn get(&self, a: &RiskFactorKey, b: &RiskFactorKey) -> Option<f64> {
        Some(self.matrix[(self.index_of(a)?, self.index_of(b)?)])
    }
}

/// Sample covariance estimator over aligned return series
#[derive(Debug, Clone, Default)]
pub struct CovarianceEngine;

impl CovarianceEngine {
    pub fn new() -> Self {
        Self
    }

    /// Dates on which every factor in `factors` has a return
    pub fn aligned_dates(
        &self,
        returns: &ReturnSeriesSet,
        factors: &[RiskFactorKey],
    ) -> Vec<NaiveDate> {
        let mut series = factors.iter().map(|f| returns.get(f));

        let Some(Some(first)) = series.next() else {
            return Vec::new();
        };
        let mut common: BTreeSet<NaiveDate> = first.dates().collect();

        for s in series {
            match s {
                Some(s) => {
                    let dates: BTreeSet<NaiveDate> = s.dates().collect();
                    common = common.intersection(&dates).copied().collect();
                }
                None => return Vec::new(),
            }
        }

        common.into_iter().collect()
    }

    /// Estimate the covariance matrix of `factors`.
    ///
    /// Factors are sorted for a stable index order. Every factor must have a
    /// series in `returns`, and at least two aligned dates are required for the
    /// unbiased (n - 1) estimator.
    pub fn estimate(
        &self,
        returns: &ReturnSeriesSet,
        factors: &[RiskFactorKey],
    ) -> Result<CovarianceMatrix> {
        if factors.is_empty() {
            return Err(VarError::InsufficientData(
                "No risk factors to estimate".to_string(),
            ));
        }

        let mut factors = factors.to_vec();
        factors.sort();
        factors.dedup();

        if let Some(missing) = factors.iter().find(|f| !returns.is_usable(f)) {
            return Err(VarError::InsufficientData(format!(
                "No return series for {}",
                missing
            )));
        }

        let dates = self.aligned_dates(returns, &factors);
        let num_obs = dates.len();
        if num_obs < 2 {
            return Err(VarError::InsufficientData(format!(
                "Need at least 2 aligned return dates across {} factors, got {}",
                factors.len(),
                num_obs
            )));
        }

        // Aligned samples: one column per factor
        let n = factors.len();
        let mut samples = DMatrix::zeros(num_obs, n);
        for (j, factor) in factors.iter().enumerate() {
            let series = returns.get(factor).ok_or_else(|| {
                VarError::InsufficientData(format!("No return series for {}", factor))
            })?;
            for (i, date) in dates.iter().enumerate() {
                samples[(i, j)] = series.get(*date).ok_or_else(|| {
                    VarError::CalculationError(format!("{} has no return on {}", factor, date))
                })?;
            }
        }

        let means: Vec<f64> = (0..n)
            .map(|j| samples.column(j).sum() / num_obs as f64)
            .collect();

        let mut cov_matrix = DMatrix::zeros(n, n);
        for i in 0..n {
            for j in i..n {
                let covariance: f64 = samples
                    .column(i)
                    .iter()
                    .zip(samples.column(j).iter())
                    .map(|(r_i, r_j)| (r_i - means[i]) * (r_j - means[j]))
                    .sum::<f64>()
                    / (num_obs - 1) as f64;

                cov_matrix[(i, j)] = covariance;
                cov_matrix[(j, i)] = covariance;
            }
        }

        debug!(
            "Estimated {}x{} covariance over {} aligned dates",
            n, n, num_obs
        );

        CovarianceMatrix::from_parts(factors, cov_matrix, num_obs)
    }
}
