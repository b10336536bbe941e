//! Feature tables, indicators and synthetic series
//!
//! - [`FeatureTable`] - named numeric columns with CSV I/O through polars
//! - [`indicators`] - trend, moving averages, RSI and targets
//! - [`synthetic`] - sinusoid generator and OHLCV frames
//! - [`balance`] - SMOTE oversampling of minority classes

pub mod balance;
pub mod indicators;
pub mod synthetic;
mod table;

pub use table::{normalize_column_name, FeatureTable};
