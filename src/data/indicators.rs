//! Technical indicators over OHLCV tables
//!
//! Indicators read the `close` column (`cci_30` and `dx_30` also read `high`
//! and `low`) and append columns named after the indicator; `bbands` appends
//! `bb_upper`, `bb_middle` and `bb_lower`. Rows where an indicator is undefined
//! hold `NaN` so callers can finish with [`FeatureTable::drop_missing`].

use super::table::FeatureTable;
use crate::error::{Result, TrendlabError};
use ndarray::{Array1, ArrayView1};
use tracing::{debug, warn};

/// Default look-back of `ema` and `sma`
pub const DEFAULT_PERIOD: usize = 9;

/// Look-back of `rsi_30`, `cci_30` and `dx_30`
pub const RSI_PERIOD: usize = 30;

/// Fast and slow spans of `macd`
pub const MACD_SPANS: (usize, usize) = (12, 26);

/// Window and width (in standard deviations) of `bbands`
pub const BBANDS_PERIOD: usize = 20;
pub const BBANDS_WIDTH: f64 = 2.0;

/// Lower-case every heading and replace spaces by underscores
pub fn normalize_column_headings(mut table: FeatureTable) -> Result<FeatureTable> {
    table.normalize_headings()?;
    Ok(table)
}

/// Drop the named columns
pub fn remove_features(mut table: FeatureTable, features: &[&str]) -> Result<FeatureTable> {
    table.remove_columns(features)?;
    Ok(table)
}

/// Append the requested indicators. Unknown names are logged and skipped.
///
/// Features: `trend_1d`, `ema`, `sma`, `macd`, `bbands`, `rsi_30`, `cci_30`,
/// `dx_30`, `simple_rtn`. Targets: `target` (next-row trend), `next_close` and
/// `next_pct_change`.
pub fn add_technical_indicators(mut table: FeatureTable, indicators: &[&str]) -> Result<FeatureTable> {
    table.normalize_headings()?;
    let close = table.column("close")?.to_owned();

    let mut unknown = Vec::new();
    for &indicator in indicators {
        let columns = match indicator {
            "trend_1d" => vec![(indicator, trend(close.view()))],
            "ema" => vec![(indicator, ema(close.view(), DEFAULT_PERIOD))],
            "sma" => vec![(indicator, sma(close.view(), DEFAULT_PERIOD))],
            "macd" => vec![(indicator, macd(close.view(), MACD_SPANS.0, MACD_SPANS.1))],
            "bbands" => {
                let (upper, middle, lower) = bollinger_bands(close.view(), BBANDS_PERIOD, BBANDS_WIDTH);
                vec![("bb_upper", upper), ("bb_middle", middle), ("bb_lower", lower)]
            }
            "rsi_30" => vec![(indicator, rsi(close.view(), RSI_PERIOD))],
            "cci_30" => {
                let (high, low) = (table.column("high")?, table.column("low")?);
                vec![(indicator, cci(high, low, close.view(), RSI_PERIOD))]
            }
            "dx_30" => {
                let (high, low) = (table.column("high")?, table.column("low")?);
                vec![(indicator, directional_index(high, low, close.view(), RSI_PERIOD))]
            }
            "simple_rtn" => vec![(indicator, simple_return(close.view()))],
            "target" => vec![(indicator, next_trend(close.view()))],
            "next_close" => vec![(indicator, next_close(close.view()))],
            "next_pct_change" => vec![(indicator, next_pct_change(close.view()))],
            other => {
                unknown.push(other);
                continue;
            }
        };
        debug!(indicator, columns = columns.len(), "Adding indicator");
        for (name, values) in columns {
            table.add_column(name, values)?;
        }
    }

    if !unknown.is_empty() {
        warn!(?unknown, "Unknown indicators ignored");
    }
    Ok(table)
}

/// Append a `target` column: 1 when the close `n` rows ahead is above today's
/// close by more than `threshold_pct` percent, 0 otherwise. The last `n` rows
/// have no future and hold `NaN`.
pub fn add_target_pct_change(
    mut table: FeatureTable,
    n: usize,
    threshold_pct: f64,
) -> Result<FeatureTable> {
    if n == 0 {
        return Err(TrendlabError::invalid_parameter("n", n, "must be at least 1"));
    }
    let close = table.column("close")?.to_owned();
    let len = close.len();
    let target = Array1::from_shape_fn(len, |t| {
        if t + n >= len {
            return f64::NAN;
        }
        let change = (close[t + n] - close[t]) / close[t] * 100.0;
        if change > threshold_pct {
            1.0
        } else {
            0.0
        }
    });
    table.add_column("target", target)?;
    Ok(table)
}

/// 1 where the close rose against the previous row, 0 otherwise (row 0 is 0)
pub fn trend(close: ArrayView1<f64>) -> Array1<f64> {
    Array1::from_shape_fn(close.len(), |t| {
        if t > 0 && close[t] - close[t - 1] > 0.0 {
            1.0
        } else {
            0.0
        }
    })
}

/// Trend of the next row; `NaN` on the last row
pub fn next_trend(close: ArrayView1<f64>) -> Array1<f64> {
    let len = close.len();
    Array1::from_shape_fn(len, |t| {
        if t + 1 >= len {
            f64::NAN
        } else if close[t + 1] > close[t] {
            1.0
        } else {
            0.0
        }
    })
}

/// Close of the next row; `NaN` on the last row
pub fn next_close(close: ArrayView1<f64>) -> Array1<f64> {
    let len = close.len();
    Array1::from_shape_fn(len, |t| if t + 1 >= len { f64::NAN } else { close[t + 1] })
}

/// Percent change from this close to the next one; `NaN` on the last row
pub fn next_pct_change(close: ArrayView1<f64>) -> Array1<f64> {
    let len = close.len();
    Array1::from_shape_fn(len, |t| {
        if t + 1 >= len {
            f64::NAN
        } else {
            (close[t + 1] / close[t] - 1.0) * 100.0
        }
    })
}

/// Adjusted exponential moving average with span `period`
pub fn ema(values: ArrayView1<f64>, period: usize) -> Array1<f64> {
    let alpha = 2.0 / (period as f64 + 1.0);
    adjusted_ewm(values, alpha)
}

/// Simple moving average; the first `period - 1` rows are `NaN`
pub fn sma(values: ArrayView1<f64>, period: usize) -> Array1<f64> {
    let period = period.max(1);
    let mut out = Array1::from_elem(values.len(), f64::NAN);
    let mut sum = 0.0;
    for t in 0..values.len() {
        sum += values[t];
        if t >= period {
            sum -= values[t - period];
        }
        if t + 1 >= period {
            out[t] = sum / period as f64;
        }
    }
    out
}

/// Fast EMA minus slow EMA
pub fn macd(close: ArrayView1<f64>, fast: usize, slow: usize) -> Array1<f64> {
    ema(close, fast) - ema(close, slow)
}

/// Upper, middle and lower Bollinger bands: the `period` SMA plus and minus
/// `width` sample standard deviations
pub fn bollinger_bands(close: ArrayView1<f64>, period: usize, width: f64) -> (Array1<f64>, Array1<f64>, Array1<f64>) {
    let period = period.max(2);
    let middle = sma(close, period);
    let std = Array1::from_shape_fn(close.len(), |t| {
        if t + 1 < period {
            return f64::NAN;
        }
        let window = close.slice(ndarray::s![t + 1 - period..=t]);
        window.std(1.0)
    });
    let upper = &middle + &(width * &std);
    let lower = &middle - &(width * &std);
    (upper, middle, lower)
}

/// Commodity channel index of the typical price `(high + low + close) / 3`.
/// A window without deviation yields 0.
pub fn cci(high: ArrayView1<f64>, low: ArrayView1<f64>, close: ArrayView1<f64>, period: usize) -> Array1<f64> {
    let period = period.max(1);
    let typical: Array1<f64> = Array1::from_shape_fn(close.len(), |t| (high[t] + low[t] + close[t]) / 3.0);
    let mean = sma(typical.view(), period);
    Array1::from_shape_fn(close.len(), |t| {
        if t + 1 < period {
            return f64::NAN;
        }
        let deviation = typical
            .slice(ndarray::s![t + 1 - period..=t])
            .iter()
            .map(|v| (v - mean[t]).abs())
            .sum::<f64>()
            / period as f64;
        if deviation > 0.0 {
            (typical[t] - mean[t]) / (0.015 * deviation)
        } else {
            0.0
        }
    })
}

/// Directional movement index: `100 |+DI - -DI| / (+DI + -DI)`, with the
/// directional moves and the true range smoothed like [`rsi`]
pub fn directional_index(
    high: ArrayView1<f64>,
    low: ArrayView1<f64>,
    close: ArrayView1<f64>,
    period: usize,
) -> Array1<f64> {
    let len = close.len();
    let mut plus_dm = Array1::zeros(len);
    let mut minus_dm = Array1::zeros(len);
    let mut true_range = Array1::zeros(len);
    for t in 0..len {
        if t == 0 {
            true_range[t] = high[t] - low[t];
            continue;
        }
        let up = high[t] - high[t - 1];
        let down = low[t - 1] - low[t];
        if up > down && up > 0.0 {
            plus_dm[t] = up;
        }
        if down > up && down > 0.0 {
            minus_dm[t] = down;
        }
        true_range[t] = (high[t] - low[t])
            .max((high[t] - close[t - 1]).abs())
            .max((low[t] - close[t - 1]).abs());
    }

    let alpha = 1.0 / period.max(1) as f64;
    let plus = adjusted_ewm(plus_dm.view(), alpha);
    let minus = adjusted_ewm(minus_dm.view(), alpha);
    let range = adjusted_ewm(true_range.view(), alpha);
    Array1::from_shape_fn(len, |t| {
        if range[t] <= 0.0 {
            return 0.0;
        }
        let pdi = 100.0 * plus[t] / range[t];
        let mdi = 100.0 * minus[t] / range[t];
        if pdi + mdi > 0.0 {
            100.0 * (pdi - mdi).abs() / (pdi + mdi)
        } else {
            0.0
        }
    })
}

/// Relative strength index with Wilder smoothing
pub fn rsi(close: ArrayView1<f64>, period: usize) -> Array1<f64> {
    let len = close.len();
    let mut gains = Array1::zeros(len);
    let mut losses = Array1::zeros(len);
    for t in 1..len {
        let delta = close[t] - close[t - 1];
        if delta > 0.0 {
            gains[t] = delta;
        } else {
            losses[t] = -delta;
        }
    }

    let alpha = 1.0 / period.max(1) as f64;
    let avg_gain = adjusted_ewm(gains.view(), alpha);
    let avg_loss = adjusted_ewm(losses.view(), alpha);

    Array1::from_shape_fn(len, |t| {
        if avg_loss[t] == 0.0 {
            if avg_gain[t] == 0.0 {
                50.0
            } else {
                100.0
            }
        } else {
            let rs = avg_gain[t] / avg_loss[t];
            100.0 - 100.0 / (1.0 + rs)
        }
    })
}

/// Percent change against the previous row as a fraction; row 0 is `NaN`
pub fn simple_return(close: ArrayView1<f64>) -> Array1<f64> {
    Array1::from_shape_fn(close.len(), |t| {
        if t == 0 {
            f64::NAN
        } else {
            close[t] / close[t - 1] - 1.0
        }
    })
}

fn adjusted_ewm(values: ArrayView1<f64>, alpha: f64) -> Array1<f64> {
    let decay = 1.0 - alpha;
    let mut num = 0.0;
    let mut den = 0.0;
    values
        .iter()
        .map(|&v| {
            num = v + decay * num;
            den = 1.0 + decay * den;
            num / den
        })
        .collect()
}
