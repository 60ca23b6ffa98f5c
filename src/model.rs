//! Typed records for the cleaned positions and prices tables
//!
//! Both tables arrive already trimmed and coerced; this module only gives
//! them types and derives the keys the analytics join on.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Metric tonnes per pound
pub const TONNES_PER_POUND: f64 = 0.0004536;

/// Direction of a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LongShort {
    #[serde(rename = "L", alias = "LONG", alias = "Long")]
    Long,
    #[serde(rename = "S", alias = "SHORT", alias = "Short")]
    Short,
}

impl LongShort {
    /// +1 for long, -1 for short
    pub fn sign(&self) -> f64 {
        match self {
            LongShort::Long => 1.0,
            LongShort::Short => -1.0,
        }
    }
}

/// Risk factor: the (metal, maturity month, exchange) tuple that drives a
/// position's P&L.
///
/// `maturity` is always normalised to the first day of its month, so a
/// position maturing on the 15th and a quote for the 3rd of the same month
/// land on the same factor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RiskFactorKey {
    pub metal: String,
    pub maturity: NaiveDate,
    pub exchange: String,
}

impl RiskFactorKey {
    pub fn new(metal: impl Into<String>, maturity: NaiveDate, exchange: impl Into<String>) -> Self {
        Self {
            metal: metal.into(),
            maturity: maturity_month(maturity),
            exchange: exchange.into(),
        }
    }
}

impl fmt::Display for RiskFactorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}",
            self.metal,
            self.maturity.format("%b-%Y"),
            self.exchange
        )
    }
}

/// First day of the month containing `date`
pub fn maturity_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Tonnes represented by one unit of `unit`, or None if the unit is unknown.
pub fn tonnes_per_unit(unit: &str) -> Option<f64> {
    match unit.trim().to_ascii_uppercase().as_str() {
        "MT" => Some(1.0),
        "LB" => Some(TONNES_PER_POUND),
        _ => None,
    }
}

/// One row of the cleaned positions table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub maturity: NaiveDate,
    pub contract_type: String,
    pub business_line: String,
    pub strategy: String,
    pub metal: String,
    pub exchange: String,
    pub currency: String,
    pub long_short: LongShort,
    /// Quantity in `unit`; only the magnitude is used, direction comes from `long_short`
    pub volume: f64,
    pub unit: String,
}

impl Position {
    pub fn risk_factor(&self) -> RiskFactorKey {
        RiskFactorKey::new(self.metal.clone(), self.maturity, self.exchange.clone())
    }

    /// Whether the volume is a number that can be valued
    pub fn has_usable_volume(&self) -> bool {
        self.volume.is_finite()
    }

    /// Signed quantity in metric tonnes, or None if the unit is not recognised
    pub fn signed_tonnes(&self) -> Option<f64> {
        tonnes_per_unit(&self.unit).map(|factor| self.volume.abs() * factor * self.long_short.sign())
    }
}

/// One row of the cleaned prices table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub price_date: NaiveDate,
    pub maturity: NaiveDate,
    pub quote_value: f64,
    pub metal: String,
    pub exchange: String,
    /// Quote unit such as `USD/MT` or `USD/LB`
    pub unit: String,
}

impl PriceObservation {
    pub fn risk_factor(&self) -> RiskFactorKey {
        RiskFactorKey::new(self.metal.clone(), self.maturity, self.exchange.clone())
    }

    /// Quote converted to a per-tonne price.
    ///
    /// None if the quantity part of the unit is unknown. The value itself is
    /// not checked here; callers filter non-positive quotes.
    pub fn price_per_tonne(&self) -> Option<f64> {
        let quantity_unit = self.unit.rsplit('/').next().unwrap_or(&self.unit);
        tonnes_per_unit(quantity_unit).map(|factor| self.quote_value / factor)
    }

    /// Whether the quote can be used as a price at all
    pub fn has_usable_quote(&self) -> bool {
        self.quote_value.is_finite() && self.quote_value > 0.0
    }
}
