//! Integration tests for the VaR engine
//!
//! These tests run the full pipeline from the CSV fixtures: loading,
//! valuation, return series, the two estimators and the scope breakdown.

use approx::assert_relative_eq;
use chrono::{Duration, NaiveDate};
use metals_var::analytics::latest_quotes;
use metals_var::{
    loader, LongShort, PortfolioValuator, Position, PriceObservation, RiskFactorKey, RiskWarning,
    VarConfig, VarEngine, VarError, VarMethod, VarScope,
};
use std::path::{Path, PathBuf};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn load_book() -> (Vec<Position>, Vec<PriceObservation>) {
    let positions =
        loader::load_positions(&fixture("positions.csv")).expect("Failed to read positions");
    let prices = loader::load_prices(&fixture("prices.csv")).expect("Failed to read prices");
    (positions, prices)
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn test_fixture_run_reports_every_scope() {
    let (positions, prices) = load_book();
    let engine = VarEngine::new(VarConfig::default()).unwrap();

    let report = engine.run(&positions, &prices).unwrap();

    let scopes: Vec<VarScope> = report.results.iter().map(|r| r.scope.clone()).collect();
    assert_eq!(
        scopes,
        vec![
            VarScope::Total,
            VarScope::BusinessLine("Copper".to_string()),
            VarScope::BusinessLine("Prop".to_string()),
            VarScope::BusinessLine("ZincLead".to_string()),
            VarScope::Metal("Copper".to_string()),
            VarScope::Metal("Zinc".to_string()),
        ]
    );

    for result in &report.results {
        assert_eq!(result.method, VarMethod::Parametric);
        assert_eq!(result.confidence_level, 0.99);
        assert_eq!(result.time_horizon_days, 1);
        assert!(result.var_amount > 0.0, "{} VaR should be positive", result.scope);
    }
}

#[test]
fn test_unpriced_factor_is_flagged() {
    let (positions, prices) = load_book();
    let engine = VarEngine::new(VarConfig::default()).unwrap();

    let report = engine.run(&positions, &prices).unwrap();

    // Zinc Mar-2025 is held but never quoted
    let unpriced = RiskFactorKey::new("Zinc", date(2025, 3, 19), "LME");
    assert_eq!(report.flagged_factors(), vec![&unpriced]);
    assert!(report.warnings.iter().any(|w| matches!(
        w,
        RiskWarning::MissingPrice { factor, positions: 1 } if factor == &unpriced
    )));

    // Lead is quoted but not held; it never enters the run
    assert!(report
        .warnings
        .iter()
        .all(|w| w.factor().map_or(true, |f| f.metal != "Lead")));
}

#[test]
fn test_pound_contracts_valued_per_tonne() {
    let (positions, prices) = load_book();
    let quotes = latest_quotes(&prices);

    let valuation = PortfolioValuator::default().value(&positions, &quotes).unwrap();

    let comex = valuation
        .exposures
        .iter()
        .find(|e| e.factor.exchange == "COMEX")
        .expect("COMEX position should be valued");
    let last_quote = prices
        .iter()
        .filter(|p| p.exchange == "COMEX")
        .max_by_key(|p| p.price_date)
        .unwrap()
        .quote_value;

    // 50,000 lb at a USD/lb quote
    assert_relative_eq!(comex.exposure, 50_000.0 * last_quote, max_relative = 1e-9);
    assert_relative_eq!(
        valuation.exposures.iter().map(|e| e.weight.abs()).sum::<f64>(),
        1.0,
        epsilon = 1e-12
    );
}

#[test]
fn test_partitions_are_subadditive() {
    let (positions, prices) = load_book();
    let engine = VarEngine::new(VarConfig::default()).unwrap();

    let report = engine.run(&positions, &prices).unwrap();
    let total = report.total().unwrap().var_amount;

    let by_metal: f64 = report.metals().map(|r| r.var_amount).sum();
    let by_line: f64 = report.business_lines().map(|r| r.var_amount).sum();

    assert!(by_metal >= total * (1.0 - 1e-12));
    assert!(by_line >= total * (1.0 - 1e-12));
}

#[test]
fn test_parametric_horizon_scaling() {
    let (positions, prices) = load_book();

    let one_day = VarEngine::new(VarConfig::default())
        .unwrap()
        .run(&positions, &prices)
        .unwrap();
    let ten_day = VarEngine::new(VarConfig {
        horizon_days: 10,
        ..VarConfig::default()
    })
    .unwrap()
    .run(&positions, &prices)
    .unwrap();

    for (short, long) in one_day.results.iter().zip(&ten_day.results) {
        assert_eq!(short.scope, long.scope);
        assert_eq!(long.time_horizon_days, 10);
        assert_relative_eq!(
            long.var_amount,
            short.var_amount * 10f64.sqrt(),
            max_relative = 1e-9
        );
    }
}

#[test]
fn test_historical_run_from_config_file() {
    let (positions, prices) = load_book();
    let config = VarConfig::load(&fixture("var_config.yaml")).expect("Failed to load config");
    assert_eq!(config.method, VarMethod::Historical);

    let report = VarEngine::new(config).unwrap().run(&positions, &prices).unwrap();

    assert_eq!(report.results.len(), 6);
    let total = report.total().unwrap();
    assert_eq!(total.method, VarMethod::Historical);
    assert_eq!(total.confidence_level, 0.95);
    assert_eq!(total.time_horizon_days, 1);
    assert!(total.var_amount > 0.0);
    assert!(report.results.iter().all(|r| r.var_amount >= 0.0));
}

#[test]
fn test_runs_are_deterministic() {
    let (positions, prices) = load_book();

    for method in [VarMethod::Parametric, VarMethod::Historical] {
        let engine = VarEngine::new(VarConfig {
            method,
            ..VarConfig::default()
        })
        .unwrap();

        let first = engine.run(&positions, &prices).unwrap();
        let second = engine.run(&positions, &prices).unwrap();
        assert_eq!(first, second);
    }
}

#[test]
fn test_report_serializes_to_json() {
    let (positions, prices) = load_book();
    let report = VarEngine::new(VarConfig::default())
        .unwrap()
        .run(&positions, &prices)
        .unwrap();

    let mut out = Vec::new();
    loader::write_report_json(&report, &mut out).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&out).unwrap();

    assert_eq!(json["results"].as_array().unwrap().len(), 6);
    assert_eq!(json["results"][0]["scope"]["kind"], "total");
    assert_eq!(json["warnings"][0]["kind"], "missing_price");
}

/// Two metals whose prices move in lockstep: B is always twice A
fn lockstep_book() -> (Vec<Position>, Vec<PriceObservation>) {
    let maturity = date(2024, 12, 18);
    let returns = [0.012, -0.02, 0.007, -0.015, 0.021, -0.004, 0.009, -0.011];

    let mut prices = Vec::new();
    let mut price = 2500.0;
    for (i, r) in std::iter::once(&0.0).chain(returns.iter()).enumerate() {
        price *= 1.0 + r;
        for (metal, factor) in [("Aluminium", 1.0), ("Copper", 2.0)] {
            prices.push(PriceObservation {
                price_date: date(2024, 9, 2) + Duration::days(i as i64),
                maturity,
                quote_value: price * factor,
                metal: metal.to_string(),
                exchange: "LME".to_string(),
                unit: "USD/MT".to_string(),
            });
        }
    }

    let positions = [("Aluminium", 40.0), ("Copper", 15.0)]
        .iter()
        .map(|&(metal, volume)| Position {
            maturity,
            contract_type: "Future".to_string(),
            business_line: "Prop".to_string(),
            strategy: "Outright".to_string(),
            metal: metal.to_string(),
            exchange: "LME".to_string(),
            currency: "USD".to_string(),
            long_short: LongShort::Long,
            volume,
            unit: "MT".to_string(),
        })
        .collect();

    (positions, prices)
}

#[test]
fn test_perfectly_correlated_metals_add_up() {
    let (positions, prices) = lockstep_book();

    for method in [VarMethod::Parametric, VarMethod::Historical] {
        let engine = VarEngine::new(VarConfig {
            method,
            confidence_level: 0.9,
            ..VarConfig::default()
        })
        .unwrap();
        let report = engine.run(&positions, &prices).unwrap();

        let total = report.total().unwrap().var_amount;
        let by_metal: f64 = report.metals().map(|r| r.var_amount).sum();

        assert!(total > 0.0);
        assert_relative_eq!(by_metal, total, max_relative = 1e-9);
    }
}

#[test]
fn test_configuration_error_fails_whole_run() {
    let (mut positions, prices) = load_book();
    for position in &mut positions {
        position.volume = 0.0;
    }

    let engine = VarEngine::new(VarConfig::default()).unwrap();
    let err = engine.run(&positions, &prices).unwrap_err();

    assert!(matches!(err, VarError::ZeroGrossExposure));
    assert!(err.is_configuration_error());
}

#[test]
fn test_invalid_config_file_rejected() {
    let yaml = "method: parametric\nconfidence_level: 1.0\n";
    assert!(matches!(
        VarEngine::from_yaml(yaml),
        Err(VarError::InvalidConfidenceLevel(_))
    ));

    let yaml = "method: monte_carlo\n";
    let err = VarEngine::from_yaml(yaml).err().unwrap();
    assert!(matches!(err, VarError::ConfigParse(_)));
    assert!(err.is_configuration_error());
}
