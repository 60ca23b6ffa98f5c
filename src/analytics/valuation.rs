//! Portfolio valuation: signed monetary exposure and weight per position
//!
//! Policies:
//! - long positions carry positive exposure, shorts negative
//! - a position whose risk factor has no latest quote is excluded (and
//!   reported), never valued at zero
//! - weights are normalised by gross absolute exposure
//! - exposures are expressed in the base currency; positions in a currency
//!   without a configured rate are excluded

use crate::error::{Result, VarError};
use crate::model::{Position, PriceObservation, RiskFactorKey};
use crate::RiskWarning;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Latest usable quote of a risk factor, per tonne
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatestQuote {
    pub price_date: NaiveDate,
    pub price_per_tonne: f64,
}

/// Latest usable quote per risk factor over the full price history.
///
/// Rows with non-positive quotes or unknown units are skipped; the latest
/// `price_date` wins and, on equal dates, the later row.
pub fn latest_quotes<'a, I>(prices: I) -> BTreeMap<RiskFactorKey, LatestQuote>
where
    I: IntoIterator<Item = &'a PriceObservation>,
{
    let mut latest: BTreeMap<RiskFactorKey, LatestQuote> = BTreeMap::new();

    for obs in prices {
        if !obs.has_usable_quote() {
            continue;
        }
        let Some(price_per_tonne) = obs.price_per_tonne() else {
            continue;
        };

        let quote = LatestQuote {
            price_date: obs.price_date,
            price_per_tonne,
        };
        latest
            .entry(obs.risk_factor())
            .and_modify(|current| {
                if quote.price_date >= current.price_date {
                    *current = quote;
                }
            })
            .or_insert(quote);
    }

    latest
}

/// Exposure of one valued position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionExposure {
    /// Index of the position in the input slice
    pub position_index: usize,
    pub factor: RiskFactorKey,
    pub business_line: String,
    pub metal: String,
    /// Signed quantity in tonnes
    pub signed_tonnes: f64,
    pub price_per_tonne: f64,
    /// Signed exposure in the base currency
    pub exposure: f64,
    /// exposure / gross exposure of the whole valued portfolio
    pub weight: f64,
}

/// Result of valuing a portfolio
#[derive(Debug, Clone, Default)]
pub struct PortfolioValuation {
    pub exposures: Vec<PositionExposure>,

    /// Indices of positions left out of the valuation
    pub excluded: Vec<usize>,

    pub warnings: Vec<RiskWarning>,
}

impl PortfolioValuation {
    /// Sum of absolute exposures
    pub fn gross_exposure(&self) -> f64 {
        gross_of(self.exposures.iter())
    }

    /// Sum of signed exposures
    pub fn net_exposure(&self) -> f64 {
        self.exposures.iter().map(|e| e.exposure).sum()
    }

    /// Signed exposure summed per risk factor
    pub fn factor_exposures(&self) -> BTreeMap<RiskFactorKey, f64> {
        factor_exposures_of(self.exposures.iter())
    }

    /// Weight summed per risk factor
    pub fn factor_weights(&self) -> BTreeMap<RiskFactorKey, f64> {
        let mut weights: BTreeMap<RiskFactorKey, f64> = BTreeMap::new();
        for e in &self.exposures {
            *weights.entry(e.factor.clone()).or_default() += e.weight;
        }
        weights
    }
}

/// Sum of absolute exposures over a set of positions
pub fn gross_of<'a, I>(exposures: I) -> f64
where
    I: IntoIterator<Item = &'a PositionExposure>,
{
    exposures.into_iter().map(|e| e.exposure.abs()).sum()
}

/// Signed exposure summed per risk factor over a set of positions
pub fn factor_exposures_of<'a, I>(exposures: I) -> BTreeMap<RiskFactorKey, f64>
where
    I: IntoIterator<Item = &'a PositionExposure>,
{
    let mut totals: BTreeMap<RiskFactorKey, f64> = BTreeMap::new();
    for e in exposures {
        *totals.entry(e.factor.clone()).or_default() += e.exposure;
    }
    totals
}

/// Values positions against latest quotes
#[derive(Debug, Clone)]
pub struct PortfolioValuator {
    base_currency: String,
    fx_rates: BTreeMap<String, f64>,
}

impl PortfolioValuator {
    /// `fx_rates` maps a currency code to units of `base_currency` per unit.
    pub fn new(base_currency: impl Into<String>, fx_rates: BTreeMap<String, f64>) -> Self {
        Self {
            base_currency: base_currency.into(),
            fx_rates,
        }
    }

    pub fn base_currency(&self) -> &str {
        &self.base_currency
    }

    /// Conversion rate into the base currency
    pub fn fx_rate(&self, currency: &str) -> Option<f64> {
        if currency.eq_ignore_ascii_case(&self.base_currency) {
            return Some(1.0);
        }
        self.fx_rates
            .iter()
            .find(|(code, _)| code.eq_ignore_ascii_case(currency))
            .map(|(_, rate)| *rate)
    }

    /// Value every position.
    ///
    /// Fails with [`VarError::EmptyPortfolio`] on an empty input and with
    /// [`VarError::ZeroGrossExposure`] if the valued positions sum to zero
    /// gross exposure (a lone zero-volume position, for example). If no
    /// position can be valued the result has no exposures and only warnings.
    pub fn value(
        &self,
        positions: &[Position],
        quotes: &BTreeMap<RiskFactorKey, LatestQuote>,
    ) -> Result<PortfolioValuation> {
        if positions.is_empty() {
            return Err(VarError::EmptyPortfolio);
        }

        let mut exposures = Vec::with_capacity(positions.len());
        let mut excluded = Vec::new();
        let mut missing_price: BTreeMap<RiskFactorKey, usize> = BTreeMap::new();
        let mut unknown_units: BTreeMap<String, usize> = BTreeMap::new();
        let mut unconvertible: BTreeMap<String, usize> = BTreeMap::new();
        let mut invalid_volume: BTreeMap<RiskFactorKey, usize> = BTreeMap::new();

        for (index, position) in positions.iter().enumerate() {
            let factor = position.risk_factor();

            if !position.has_usable_volume() {
                *invalid_volume.entry(factor).or_default() += 1;
                excluded.push(index);
                continue;
            }

            let Some(quote) = quotes.get(&factor) else {
                *missing_price.entry(factor).or_default() += 1;
                excluded.push(index);
                continue;
            };

            let Some(signed_tonnes) = position.signed_tonnes() else {
                *unknown_units.entry(position.unit.clone()).or_default() += 1;
                excluded.push(index);
                continue;
            };

            let Some(fx) = self.fx_rate(&position.currency) else {
                *unconvertible.entry(position.currency.clone()).or_default() += 1;
                excluded.push(index);
                continue;
            };

            exposures.push(PositionExposure {
                position_index: index,
                factor,
                business_line: position.business_line.clone(),
                metal: position.metal.clone(),
                signed_tonnes,
                price_per_tonne: quote.price_per_tonne,
                exposure: signed_tonnes * quote.price_per_tonne * fx,
                weight: 0.0,
            });
        }

        let mut warnings = Vec::new();
        for (factor, count) in invalid_volume {
            warnings.push(RiskWarning::InvalidVolume {
                factor,
                positions: count,
            });
        }
        for (factor, count) in missing_price {
            warnings.push(RiskWarning::MissingPrice {
                factor,
                positions: count,
            });
        }
        for (unit, rows) in unknown_units {
            warnings.push(RiskWarning::UnrecognisedUnit { unit, rows });
        }
        for (currency, count) in unconvertible {
            warnings.push(RiskWarning::UnconvertibleCurrency {
                currency,
                positions: count,
            });
        }
        for warning in &warnings {
            warn!("{}", warning);
        }

        // Nothing valued is a data gap: every scope ends up unestimable
        let gross = gross_of(exposures.iter());
        if !exposures.is_empty() && gross == 0.0 {
            return Err(VarError::ZeroGrossExposure);
        }

        for e in &mut exposures {
            e.weight = e.exposure / gross;
        }

        debug!(
            "Valued {} positions ({} excluded), gross exposure {:.2} {}",
            exposures.len(),
            excluded.len(),
            gross,
            self.base_currency
        );

        Ok(PortfolioValuation {
            exposures,
            excluded,
            warnings,
        })
    }
}

impl Default for PortfolioValuator {
    fn default() -> Self {
        Self::new("USD", BTreeMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LongShort;
    use approx::assert_relative_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn position(metal: &str, long_short: LongShort, volume: f64) -> Position {
        Position {
            maturity: date(2024, 12, 18),
            contract_type: "Future".to_string(),
            business_line: "Prop".to_string(),
            strategy: "Outright".to_string(),
            metal: metal.to_string(),
            exchange: "LME".to_string(),
            currency: "USD".to_string(),
            long_short,
            volume,
            unit: "MT".to_string(),
        }
    }

    fn quotes(entries: &[(&str, f64)]) -> BTreeMap<RiskFactorKey, LatestQuote> {
        entries
            .iter()
            .map(|(metal, price)| {
                (
                    RiskFactorKey::new(*metal, date(2024, 12, 1), "LME"),
                    LatestQuote {
                        price_date: date(2024, 11, 29),
                        price_per_tonne: *price,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_latest_quote_is_most_recent_date() {
        let obs = |day: u32, quote: f64| PriceObservation {
            price_date: date(2024, 11, day),
            maturity: date(2024, 12, 18),
            quote_value: quote,
            metal: "Copper".to_string(),
            exchange: "LME".to_string(),
            unit: "USD/MT".to_string(),
        };
        let prices = vec![obs(28, 9000.0), obs(29, 9100.0), obs(27, 8900.0), obs(30, -1.0)];

        let latest = latest_quotes(&prices);
        let quote = latest[&RiskFactorKey::new("Copper", date(2024, 12, 1), "LME")];

        assert_eq!(quote.price_date, date(2024, 11, 29));
        assert_eq!(quote.price_per_tonne, 9100.0);
    }

    #[test]
    fn test_sign_convention() {
        let positions = vec![
            position("Copper", LongShort::Long, 10.0),
            position("Zinc", LongShort::Short, 10.0),
        ];
        let valuation = PortfolioValuator::default()
            .value(&positions, &quotes(&[("Copper", 9000.0), ("Zinc", 2500.0)]))
            .unwrap();

        assert_eq!(valuation.exposures[0].exposure, 90_000.0);
        assert_eq!(valuation.exposures[1].exposure, -25_000.0);
        assert_eq!(valuation.net_exposure(), 65_000.0);
    }

    #[test]
    fn test_weights_use_gross_denominator() {
        // Long 100 and short 50: net 50 would give weights 2 and -1
        let positions = vec![
            position("Copper", LongShort::Long, 1.0),
            position("Zinc", LongShort::Short, 1.0),
        ];
        let valuation = PortfolioValuator::default()
            .value(&positions, &quotes(&[("Copper", 100.0), ("Zinc", 50.0)]))
            .unwrap();

        assert_relative_eq!(valuation.gross_exposure(), 150.0);
        assert_relative_eq!(valuation.exposures[0].weight, 2.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(valuation.exposures[1].weight, -1.0 / 3.0, epsilon = 1e-12);

        let abs_sum: f64 = valuation.exposures.iter().map(|e| e.weight.abs()).sum();
        assert_relative_eq!(abs_sum, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_factor_weights_aggregate_positions() {
        let positions = vec![
            position("Copper", LongShort::Long, 3.0),
            position("Copper", LongShort::Short, 1.0),
        ];
        let valuation = PortfolioValuator::default()
            .value(&positions, &quotes(&[("Copper", 100.0)]))
            .unwrap();

        let factor = RiskFactorKey::new("Copper", date(2024, 12, 1), "LME");
        assert_relative_eq!(valuation.factor_exposures()[&factor], 200.0);
        assert_relative_eq!(valuation.factor_weights()[&factor], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_volume_position_contributes_nothing() {
        let positions = vec![
            position("Copper", LongShort::Long, 10.0),
            position("Zinc", LongShort::Long, 0.0),
        ];
        let valuation = PortfolioValuator::default()
            .value(&positions, &quotes(&[("Copper", 100.0), ("Zinc", 50.0)]))
            .unwrap();

        assert_eq!(valuation.exposures[1].exposure, 0.0);
        assert_eq!(valuation.exposures[1].weight, 0.0);
        assert_eq!(valuation.exposures[0].weight, 1.0);
    }

    #[test]
    fn test_sole_zero_volume_position_is_configuration_error() {
        let positions = vec![position("Copper", LongShort::Long, 0.0)];
        let result = PortfolioValuator::default().value(&positions, &quotes(&[("Copper", 100.0)]));

        let err = result.unwrap_err();
        assert!(matches!(err, VarError::ZeroGrossExposure));
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_missing_price_excludes_and_warns() {
        let positions = vec![
            position("Copper", LongShort::Long, 10.0),
            position("Nickel", LongShort::Long, 5.0),
            position("Nickel", LongShort::Short, 2.0),
        ];
        let valuation = PortfolioValuator::default()
            .value(&positions, &quotes(&[("Copper", 100.0)]))
            .unwrap();

        assert_eq!(valuation.exposures.len(), 1);
        assert_eq!(valuation.excluded, vec![1, 2]);
        assert_eq!(
            valuation.warnings,
            vec![RiskWarning::MissingPrice {
                factor: RiskFactorKey::new("Nickel", date(2024, 12, 1), "LME"),
                positions: 2,
            }]
        );
    }

    #[test]
    fn test_currency_conversion_policy() {
        let mut eur = position("Zinc", LongShort::Long, 1.0);
        eur.currency = "EUR".to_string();
        let mut gbp = position("Zinc", LongShort::Long, 1.0);
        gbp.currency = "GBP".to_string();
        let positions = vec![position("Copper", LongShort::Long, 1.0), eur, gbp];

        let mut rates = BTreeMap::new();
        rates.insert("EUR".to_string(), 1.1);
        let valuator = PortfolioValuator::new("USD", rates);

        let valuation = valuator
            .value(&positions, &quotes(&[("Copper", 100.0), ("Zinc", 100.0)]))
            .unwrap();

        assert_eq!(valuation.exposures.len(), 2);
        assert_relative_eq!(valuation.exposures[1].exposure, 110.0, epsilon = 1e-12);
        assert_eq!(valuation.excluded, vec![2]);
        assert!(valuation.warnings.contains(&RiskWarning::UnconvertibleCurrency {
            currency: "GBP".to_string(),
            positions: 1,
        }));
    }

    #[test]
    fn test_pound_volumes_converted_to_tonnes() {
        let mut pounds = position("Copper", LongShort::Long, 10_000.0);
        pounds.unit = "LB".to_string();

        let valuation = PortfolioValuator::default()
            .value(&[pounds], &quotes(&[("Copper", 9000.0)]))
            .unwrap();

        assert_relative_eq!(valuation.exposures[0].signed_tonnes, 4.536, epsilon = 1e-12);
        assert_relative_eq!(valuation.exposures[0].exposure, 40_824.0, epsilon = 1e-6);
    }

    #[test]
    fn test_empty_portfolio() {
        let result = PortfolioValuator::default().value(&[], &BTreeMap::new());
        assert!(matches!(result, Err(VarError::EmptyPortfolio)));
    }

    #[test]
    fn test_nothing_priced_keeps_warnings() {
        let positions = vec![position("Nickel", LongShort::Long, 5.0)];
        let valuation = PortfolioValuator::default()
            .value(&positions, &quotes(&[("Copper", 100.0)]))
            .unwrap();

        assert!(valuation.exposures.is_empty());
        assert_eq!(valuation.excluded, vec![0]);
        assert_eq!(valuation.gross_exposure(), 0.0);
        assert_eq!(
            valuation.warnings,
            vec![RiskWarning::MissingPrice {
                factor: RiskFactorKey::new("Nickel", date(2024, 12, 1), "LME"),
                positions: 1,
            }]
        );
    }

    #[test]
    fn test_zero_volume_beside_unpriced_position_is_configuration_error() {
        // The only valued position has zero volume, so weights cannot be formed
        let positions = vec![
            position("Copper", LongShort::Long, 0.0),
            position("Nickel", LongShort::Long, 5.0),
        ];
        let result = PortfolioValuator::default().value(&positions, &quotes(&[("Copper", 100.0)]));

        assert!(matches!(result, Err(VarError::ZeroGrossExposure)));
    }

    #[test]
    fn test_non_finite_volume_excluded_and_warned() {
        let positions = vec![
            position("Copper", LongShort::Long, 5.0),
            position("Copper", LongShort::Long, f64::NAN),
            position("Copper", LongShort::Short, f64::INFINITY),
        ];
        let valuation = PortfolioValuator::default()
            .value(&positions, &quotes(&[("Copper", 100.0)]))
            .unwrap();

        assert_eq!(valuation.exposures.len(), 1);
        assert_eq!(valuation.excluded, vec![1, 2]);
        assert_relative_eq!(valuation.gross_exposure(), 500.0);
        assert_eq!(valuation.exposures[0].weight, 1.0);
        assert_eq!(
            valuation.warnings,
            vec![RiskWarning::InvalidVolume {
                factor: RiskFactorKey::new("Copper", date(2024, 12, 1), "LME"),
                positions: 2,
            }]
        );
    }
}
