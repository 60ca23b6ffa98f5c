//! Daily return series per risk factor
//!
//! Returns are simple returns between consecutive *available* observations
//! of a factor. Calendar gaps are not forward-filled, so a return spanning a
//! holiday is a single step.

use crate::error::{Result, VarError};
use crate::model::{PriceObservation, RiskFactorKey};
use crate::RiskWarning;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// One return observation, dated at the later of its two prices
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReturnPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Ordered return series for a single risk factor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnSeries {
    factor: RiskFactorKey,
    points: Vec<ReturnPoint>,
}

impl ReturnSeries {
    /// Build a series from points; points are sorted by date.
    pub fn new(factor: RiskFactorKey, mut points: Vec<ReturnPoint>) -> Self {
        points.sort_by_key(|p| p.date);
        Self { factor, points }
    }

    /// Series derived from an ordered price history
    pub fn from_prices(factor: RiskFactorKey, prices: &[(NaiveDate, f64)]) -> Self {
        let points = prices
            .windows(2)
            .map(|pair| {
                let (_, previous) = pair[0];
                let (date, current) = pair[1];
                ReturnPoint {
                    date,
                    value: (current - previous) / previous,
                }
            })
            .collect();
        Self::new(factor, points)
    }

    pub fn factor(&self) -> &RiskFactorKey {
        &self.factor
    }

    pub fn points(&self) -> &[ReturnPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.points.iter().map(|p| p.date)
    }

    /// Return observed on `date`, if any
    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.points
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|idx| self.points[idx].value)
    }
}

/// Output of [`ReturnSeriesBuilder::build`]
#[derive(Debug, Clone, Default)]
pub struct ReturnSeriesSet {
    /// One entry per factor seen in the input; factors without enough
    /// history map to an empty series
    pub series: BTreeMap<RiskFactorKey, ReturnSeries>,

    /// Data gaps met while building
    pub warnings: Vec<RiskWarning>,
}

impl ReturnSeriesSet {
    pub fn get(&self, factor: &RiskFactorKey) -> Option<&ReturnSeries> {
        self.series.get(factor)
    }

    /// Whether `factor` has at least one return and can enter a risk estimate
    pub fn is_usable(&self, factor: &RiskFactorKey) -> bool {
        self.series.get(factor).map_or(false, |s| !s.is_empty())
    }

    /// Factors with a non-empty series
    pub fn usable_factors(&self) -> impl Iterator<Item = &RiskFactorKey> {
        self.series
            .iter()
            .filter(|(_, s)| !s.is_empty())
            .map(|(k, _)| k)
    }
}

/// Derives return series from the prices table
#[derive(Debug, Clone)]
pub struct ReturnSeriesBuilder {
    lookback_days: u32,
}

impl ReturnSeriesBuilder {
    /// Create a builder with a lookback window in calendar days
    pub fn new(lookback_days: u32) -> Result<Self> {
        if lookback_days == 0 {
            return Err(VarError::InvalidLookback(lookback_days));
        }
        Ok(Self { lookback_days })
    }

    pub fn lookback_days(&self) -> u32 {
        self.lookback_days
    }

    /// Build one return series per risk factor found in `prices`.
    ///
    /// The window is anchored on each factor's own latest observation and is
    /// inclusive at both ends.
    pub fn build<'a, I>(&self, prices: I) -> ReturnSeriesSet
    where
        I: IntoIterator<Item = &'a PriceObservation>,
    {
        let mut warnings = Vec::new();
        let mut histories: BTreeMap<RiskFactorKey, BTreeMap<NaiveDate, f64>> = BTreeMap::new();
        let mut invalid: BTreeMap<RiskFactorKey, usize> = BTreeMap::new();
        let mut unknown_units: BTreeMap<String, usize> = BTreeMap::new();
        let mut duplicates: BTreeSet<(RiskFactorKey, NaiveDate)> = BTreeSet::new();

        for obs in prices {
            let factor = obs.risk_factor();

            if !obs.has_usable_quote() {
                *invalid.entry(factor).or_default() += 1;
                continue;
            }

            let Some(price) = obs.price_per_tonne() else {
                *unknown_units.entry(obs.unit.clone()).or_default() += 1;
                continue;
            };

            let history = histories.entry(factor.clone()).or_default();
            if history.insert(obs.price_date, price).is_some() {
                duplicates.insert((factor, obs.price_date));
            }
        }

        for (unit, rows) in unknown_units {
            warnings.push(RiskWarning::UnrecognisedUnit { unit, rows });
        }
        for (factor, dropped) in invalid {
            warnings.push(RiskWarning::InvalidQuotes { factor, dropped });
        }
        for (factor, date) in duplicates {
            warnings.push(RiskWarning::DuplicatePriceDate { factor, date });
        }

        let mut series = BTreeMap::new();
        for (factor, history) in histories {
            let windowed = self.window(&history);

            if windowed.len() < 2 {
                warnings.push(RiskWarning::InsufficientHistory {
                    factor: factor.clone(),
                    observations: windowed.len(),
                });
                series.insert(factor.clone(), ReturnSeries::new(factor, Vec::new()));
                continue;
            }

            let returns = ReturnSeries::from_prices(factor.clone(), &windowed);
            debug!("Built {} returns for {}", returns.len(), factor);
            series.insert(factor, returns);
        }

        for warning in &warnings {
            warn!("{}", warning);
        }

        ReturnSeriesSet { series, warnings }
    }

    /// Observations inside the lookback window ending at the latest date
    fn window(&self, history: &BTreeMap<NaiveDate, f64>) -> Vec<(NaiveDate, f64)> {
        let Some((&latest, _)) = history.iter().next_back() else {
            return Vec::new();
        };
        // A window reaching past the earliest representable date covers everything
        let lookback = Duration::days(i64::from(self.lookback_days));
        let window = match latest.checked_sub_signed(lookback) {
            Some(start) => history.range(start..=latest),
            None => history.range(..=latest),
        };

        window.map(|(&date, &price)| (date, price)).collect()
    }
}
