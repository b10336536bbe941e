//! Shared fixtures for the integration tests

#![allow(dead_code)]

use polars::df;
use polars::prelude::DataFrame;
use trendlab::data::indicators::{add_technical_indicators, remove_features};
use trendlab::data::synthetic::{create_dataframe, get_sinusoid};
use trendlab::data::FeatureTable;

pub const PRICE_COLUMNS: [&str; 6] = ["open", "high", "low", "close", "adj_close", "volume"];

/// Prices that alternate up and down, so the next move is always the
/// opposite of the current one
pub fn zigzag_prices(n: usize) -> DataFrame {
    let close: Vec<f64> = (0..n).map(|t| 10.0 + (t % 2) as f64).collect();
    let open: Vec<f64> = (0..n).map(|t| if t == 0 { close[0] } else { close[t - 1] }).collect();
    let high: Vec<f64> = close.iter().zip(&open).map(|(c, o)| c.max(*o) + 0.1).collect();
    let low: Vec<f64> = close.iter().zip(&open).map(|(c, o)| c.min(*o) - 0.1).collect();
    let dates: Vec<String> = (0..n).map(|t| format!("2020-01-{:02}", t % 28 + 1)).collect();
    df!(
        "Date" => dates,
        "Open" => open,
        "High" => high,
        "Low" => low,
        "Close" => close.clone(),
        "Adj Close" => close,
        "Volume" => vec![1_000.0; n],
    )
    .unwrap()
}

/// Binary trend feature with the next-row trend as target, raw prices removed
pub fn trend_table(prices: &DataFrame) -> FeatureTable {
    let table = FeatureTable::from_dataframe(prices).unwrap();
    let table = add_technical_indicators(table, &["trend_1d", "target"]).unwrap();
    let mut table = remove_features(table, &PRICE_COLUMNS).unwrap();
    table.drop_missing();
    table
}

/// Noise-free sinusoid of period 10 with its next-row trend as target and
/// `close` as the only feature. Closes one period apart differ by a few ulps.
pub fn sinusoid_table(length: usize) -> FeatureTable {
    let close = get_sinusoid(length, 1.0, 0.1, 0.0, 0.0);
    let table = create_dataframe(&close, 0.0, None).unwrap();
    let table = add_technical_indicators(table, &["target"]).unwrap();
    let mut table = remove_features(table, &["open", "adj_close", "low", "high", "volume"]).unwrap();
    table.drop_missing();
    table
}

/// Two informative features with a little label noise
pub fn noisy_table(n: usize) -> FeatureTable {
    let a: Vec<f64> = (0..n).map(|i| ((i * 37) % 101) as f64 / 101.0).collect();
    let b: Vec<f64> = (0..n).map(|i| ((i * 53) % 97) as f64 / 97.0).collect();
    let target: Vec<f64> = (0..n)
        .map(|i| {
            let label = a[i] + b[i] > 1.0;
            // every 13th label flipped
            if i % 13 == 0 {
                (!label) as u8 as f64
            } else {
                label as u8 as f64
            }
        })
        .collect();
    FeatureTable::from_columns(vec![("a", a), ("b", b), ("target", target)]).unwrap()
}
