//! 特征工程
//!
//! 从日线K线与外部情感分数计算固定顺序的特征行。

use crate::indicators;
use crate::types::{validate_bars, Bar, ForecastResult};
use chrono::NaiveDate;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use sentiment::SentimentReading;

const RSI_PERIOD: usize = 14;
const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;
const BOLLINGER_PERIOD: usize = 20;
const BOLLINGER_WIDTH: f64 = 2.0;
const SMA_SHORT: usize = 20;
const SMA_MEDIUM: usize = 50;
const SMA_LONG: usize = 200;
const VOLUME_PERIOD: usize = 20;
const MOMENTUM_PERIOD: usize = 10;
const VOLATILITY_PERIOD: usize = 20;

/// 预热期：最长指标（SMA200）需要丢弃的前导行数
pub const WARMUP_ROWS: usize = SMA_LONG - 1;

/// 一行特征，字段顺序即模型输入列顺序
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub return_1d: f64,
    pub rsi_14: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub bollinger_upper: f64,
    pub bollinger_lower: f64,
    pub sma_20: f64,
    pub sma_50: f64,
    pub sma_200: f64,
    pub volume_ratio: f64,
    pub momentum_10: f64,
    pub volatility_20: f64,
    pub sentiment: f64,
}

impl FeatureVector {
    pub const COUNT: usize = 13;

    pub const COLUMNS: [&'static str; Self::COUNT] = [
        "return_1d",
        "rsi_14",
        "macd",
        "macd_signal",
        "bollinger_upper",
        "bollinger_lower",
        "sma_20",
        "sma_50",
        "sma_200",
        "volume_ratio",
        "momentum_10",
        "volatility_20",
        "sentiment",
    ];

    pub fn columns() -> Vec<String> {
        Self::COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    pub fn to_array(&self) -> [f64; Self::COUNT] {
        [
            self.return_1d,
            self.rsi_14,
            self.macd,
            self.macd_signal,
            self.bollinger_upper,
            self.bollinger_lower,
            self.sma_20,
            self.sma_50,
            self.sma_200,
            self.volume_ratio,
            self.momentum_10,
            self.volatility_20,
            self.sentiment,
        ]
    }
}

/// 一根K线对应的特征行，计算后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub close: f64,
    /// 预热期内为 `None`
    pub features: Option<FeatureVector>,
    pub sentiment: SentimentReading,
    /// 前向收益率 close[t+1] / close[t] - 1，最后一根K线为 `None`
    pub target: Option<f64>,
}

impl FeatureRow {
    pub fn is_complete(&self) -> bool {
        self.features.is_some()
    }
}

/// 按K线对齐的各指标序列
struct IndicatorSeries {
    returns: Vec<Option<f64>>,
    rsi: Vec<Option<f64>>,
    macd: Vec<Option<f64>>,
    macd_signal: Vec<Option<f64>>,
    bb_upper: Vec<Option<f64>>,
    bb_lower: Vec<Option<f64>>,
    sma_20: Vec<Option<f64>>,
    sma_50: Vec<Option<f64>>,
    sma_200: Vec<Option<f64>>,
    volume_ratio: Vec<Option<f64>>,
    momentum: Vec<Option<f64>>,
    volatility: Vec<Option<f64>>,
}

impl IndicatorSeries {
    fn compute(close: &[f64], volume: &[f64]) -> Self {
        let returns = indicators::pct_change(close, 1);
        let (macd, macd_signal) = indicators::macd(close, MACD_FAST, MACD_SLOW, MACD_SIGNAL);
        let (bb_upper, bb_lower) = indicators::bollinger(close, BOLLINGER_PERIOD, BOLLINGER_WIDTH);
        let volume_ratio = indicators::sma(volume, VOLUME_PERIOD)
            .iter()
            .zip(volume)
            .map(|(mean, v)| mean.filter(|m| *m > 0.0).map(|m| v / m))
            .collect();
        let volatility = indicators::rolling_std(&returns, VOLATILITY_PERIOD, 1);

        Self {
            rsi: indicators::rsi(close, RSI_PERIOD),
            macd,
            macd_signal,
            bb_upper,
            bb_lower,
            sma_20: indicators::sma(close, SMA_SHORT),
            sma_50: indicators::sma(close, SMA_MEDIUM),
            sma_200: indicators::sma(close, SMA_LONG),
            volume_ratio,
            momentum: indicators::pct_change(close, MOMENTUM_PERIOD),
            volatility,
            returns,
        }
    }

    /// 第 `i` 行，任一指标缺失则为 `None`
    fn row(&self, i: usize, sentiment: f64) -> Option<FeatureVector> {
        Some(FeatureVector {
            return_1d: self.returns[i]?,
            rsi_14: self.rsi[i]?,
            macd: self.macd[i]?,
            macd_signal: self.macd_signal[i]?,
            bollinger_upper: self.bb_upper[i]?,
            bollinger_lower: self.bb_lower[i]?,
            sma_20: self.sma_20[i]?,
            sma_50: self.sma_50[i]?,
            sma_200: self.sma_200[i]?,
            volume_ratio: self.volume_ratio[i]?,
            momentum_10: self.momentum[i]?,
            volatility_20: self.volatility[i]?,
            sentiment,
        })
    }
}

/// 特征工程器
pub struct FeatureEngineer;

impl FeatureEngineer {
    /// 为每根K线计算一行特征
    pub fn compute(bars: &[Bar], sentiment: &SentimentReading) -> ForecastResult<Vec<FeatureRow>> {
        validate_bars(bars)?;

        let close: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let volume: Vec<f64> = bars.iter().map(|b| b.volume).collect();

        let series = IndicatorSeries::compute(&close, &volume);

        // 情感按股票广播为常数列
        let sentiment_value = sentiment.value();

        let rows = (0..bars.len())
            .map(|i| {
                let target = bars.get(i + 1).map(|next| next.close / bars[i].close - 1.0);

                FeatureRow {
                    date: bars[i].date,
                    close: bars[i].close,
                    features: series
                        .row(i, sentiment_value)
                        .filter(|f| f.to_array().iter().all(|v| v.is_finite())),
                    sentiment: sentiment.clone(),
                    target,
                }
            })
            .collect();

        Ok(rows)
    }

    /// 丢弃不完整的行，保留最近一段连续的完整行
    ///
    /// 预热期之后若中途出现不完整行，更早的行会被丢弃以保证窗口无缺口。
    pub fn complete_rows(rows: Vec<FeatureRow>) -> Vec<FeatureRow> {
        let start = rows
            .iter()
            .rposition(|row| !row.is_complete())
            .map_or(0, |idx| idx + 1);

        let discarded = rows[..start].iter().filter(|row| row.is_complete()).count();
        if discarded > 0 {
            tracing::warn!(
                "Discarding {} complete rows before a gap in feature history",
                discarded
            );
        }

        rows.into_iter().skip(start).collect()
    }

    /// 特征矩阵（行数 × 13），要求所有行都已完整
    pub fn feature_matrix(rows: &[FeatureRow]) -> Array2<f64> {
        let mut matrix = Array2::<f64>::from_elem((rows.len(), FeatureVector::COUNT), f64::NAN);
        for (i, row) in rows.iter().enumerate() {
            if let Some(features) = &row.features {
                for (j, value) in features.to_array().iter().enumerate() {
                    matrix[[i, j]] = *value;
                }
            }
        }
        matrix
    }

    /// 目标向量，缺失的目标为 NaN
    pub fn target_vector(rows: &[FeatureRow]) -> Array1<f64> {
        rows.iter().map(|row| row.target.unwrap_or(f64::NAN)).collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;

    /// 收盘价严格递增的合成日线
    pub(crate) fn rising_bars(n: usize) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        (0..n)
            .map(|i| {
                let close = 100.0 + i as f64 * 0.5 + (i as f64 * 0.3).sin() * 0.1;
                Bar {
                    date: start + Duration::days(i as i64),
                    open: close - 0.2,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 10_000.0 + (i % 7) as f64 * 500.0,
                }
            })
            .collect()
    }

    /// 带噪声的随机游走日线
    pub(crate) fn noisy_bars(n: usize, seed: u64) -> Vec<Bar> {
        use rand::{rngs::StdRng, Rng, SeedableRng};
        let mut rng = StdRng::seed_from_u64(seed);
        let start = NaiveDate::from_ymd_opt(2019, 1, 1).unwrap();
        let mut price = 100.0;
        (0..n)
            .map(|i| {
                price *= 1.0 + rng.gen_range(-0.02..0.021);
                Bar {
                    date: start + Duration::days(i as i64),
                    open: price,
                    high: price * 1.01,
                    low: price * 0.99,
                    close: price,
                    volume: rng.gen_range(5_000.0..15_000.0),
                }
            })
            .collect()
    }

    #[test]
    fn test_warmup_rows_dropped() {
        let bars = rising_bars(260);
        let rows = FeatureEngineer::compute(&bars, &SentimentReading::unavailable("n/a")).unwrap();
        assert_eq!(rows.len(), 260);
        assert!(!rows[WARMUP_ROWS - 1].is_complete());
        assert!(rows[WARMUP_ROWS].is_complete());

        let complete = FeatureEngineer::complete_rows(rows);
        assert_eq!(complete.len(), 260 - WARMUP_ROWS);
        assert_eq!(complete.len(), 61);
    }

    #[test]
    fn test_no_nan_after_warmup() {
        for n in [260, 300, 500] {
            let bars = noisy_bars(n, n as u64);
            let rows = FeatureEngineer::compute(&bars, &SentimentReading::observed(0.7).unwrap())
                .unwrap();
            let complete = FeatureEngineer::complete_rows(rows);
            assert_eq!(complete.len(), n - WARMUP_ROWS);

            let matrix = FeatureEngineer::feature_matrix(&complete);
            assert!(matrix.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn test_target_is_forward_return() {
        let bars = rising_bars(10);
        let rows = FeatureEngineer::compute(&bars, &SentimentReading::unavailable("n/a")).unwrap();
        let expected = bars[4].close / bars[3].close - 1.0;
        assert!((rows[3].target.unwrap() - expected).abs() < 1e-12);
        assert_eq!(rows[9].target, None);
    }

    #[test]
    fn test_sentiment_broadcast_and_carried() {
        let bars = rising_bars(220);
        let reading = SentimentReading::unavailable("feed down");
        let rows = FeatureEngineer::complete_rows(FeatureEngineer::compute(&bars, &reading).unwrap());
        for row in &rows {
            assert_eq!(row.features.unwrap().sentiment, 0.5);
            assert_eq!(row.sentiment, reading);
        }
    }

    #[test]
    fn test_gap_keeps_latest_contiguous_run() {
        let mut bars = rising_bars(260);
        // 成交量为零使 20 日均量为零，之后若干行的量比缺失
        for bar in bars.iter_mut().skip(210).take(20) {
            bar.volume = 0.0;
        }
        let rows = FeatureEngineer::compute(&bars, &SentimentReading::unavailable("n/a")).unwrap();
        let complete = FeatureEngineer::complete_rows(rows);
        assert!(complete.iter().all(|r| r.is_complete()));
        assert_eq!(complete.last().unwrap().date, bars.last().unwrap().date);
        assert!(complete.len() < 260 - WARMUP_ROWS);
    }

    #[test]
    fn test_empty_bars() {
        let err = FeatureEngineer::compute(&[], &SentimentReading::unavailable("n/a")).unwrap_err();
        assert_eq!(err.kind(), "data_unavailable");
    }
}
