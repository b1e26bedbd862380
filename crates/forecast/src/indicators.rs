//! 技术指标
//!
//! 每个函数返回与输入等长的序列，历史不足的位置为 `None`，从不插补。

/// 简单移动平均
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }

    let mut sum: f64 = values[..period].iter().sum();
    out[period - 1] = Some(sum / period as f64);
    for i in period..values.len() {
        sum += values[i] - values[i - period];
        out[i] = Some(sum / period as f64);
    }
    out
}

/// 指数移动平均（adjust = false，至少 `span` 个观测值后才输出）
///
/// 以第一个有效值作为初值，前导 `None` 被跳过。
pub fn ema(values: &[Option<f64>], span: usize) -> Vec<Option<f64>> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = vec![None; values.len()];
    let mut state: Option<f64> = None;
    let mut observations = 0usize;

    for (i, value) in values.iter().enumerate() {
        let Some(v) = *value else {
            continue;
        };
        let next = match state {
            Some(prev) => alpha * v + (1.0 - alpha) * prev,
            None => v,
        };
        state = Some(next);
        observations += 1;
        if observations >= span {
            out[i] = Some(next);
        }
    }
    out
}

/// `period` 期百分比变化
pub fn pct_change(values: &[f64], period: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if i < period || values[i - period] == 0.0 {
                None
            } else {
                Some(values[i] / values[i - period] - 1.0)
            }
        })
        .collect()
}

/// 滚动标准差，窗口内任一值缺失则为 `None`
///
/// `ddof = 0` 为总体标准差，`ddof = 1` 为样本标准差。
pub fn rolling_std(values: &[Option<f64>], period: usize, ddof: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period <= ddof {
        return out;
    }

    for i in (period - 1)..values.len() {
        let window: Option<Vec<f64>> = values[i + 1 - period..=i].iter().copied().collect();
        if let Some(window) = window {
            let mean = window.iter().sum::<f64>() / period as f64;
            let variance = window.iter().map(|&x| (x - mean).powi(2)).sum::<f64>()
                / (period - ddof) as f64;
            out[i] = Some(variance.sqrt());
        }
    }
    out
}

/// Wilder 平滑 RSI
///
/// 前 `period` 个涨跌幅取简单平均作为初值，之后按 `(prev * (n - 1) + cur) / n` 平滑。
pub fn rsi(close: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; close.len()];
    if period == 0 || close.len() <= period {
        return out;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = close[i] - close[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    out[period] = Some(rsi_value(avg_gain, avg_loss));

    for i in (period + 1)..close.len() {
        let change = close[i] - close[i - 1];
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        out[i] = Some(rsi_value(avg_gain, avg_loss));
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            return 50.0;
        }
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// MACD 线与信号线
pub fn macd(close: &[f64], fast: usize, slow: usize, signal: usize) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    let close: Vec<Option<f64>> = close.iter().copied().map(Some).collect();
    let fast_ema = ema(&close, fast);
    let slow_ema = ema(&close, slow);

    let line: Vec<Option<f64>> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();
    let signal_line = ema(&line, signal);

    (line, signal_line)
}

/// 布林带（上轨、下轨），标准差为总体标准差
pub fn bollinger(close: &[f64], period: usize, width: f64) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    let middle = sma(close, period);
    let wrapped: Vec<Option<f64>> = close.iter().copied().map(Some).collect();
    let std = rolling_std(&wrapped, period, 0);

    let upper = middle
        .iter()
        .zip(&std)
        .map(|(m, s)| Some((*m)? + width * (*s)?))
        .collect();
    let lower = middle
        .iter()
        .zip(&std)
        .map(|(m, s)| Some((*m)? - width * (*s)?))
        .collect();

    (upper, lower)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_sma() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert!(approx(out[2].unwrap(), 2.0));
        assert!(approx(out[4].unwrap(), 4.0));
    }

    #[test]
    fn test_ema_min_periods() {
        let values: Vec<Option<f64>> = (1..=5).map(|x| Some(x as f64)).collect();
        let out = ema(&values, 3);
        assert_eq!(out[1], None);
        // alpha = 0.5: 1 -> 1.5 -> 2.25
        assert!(approx(out[2].unwrap(), 2.25));
    }

    #[test]
    fn test_ema_skips_leading_none() {
        let values = vec![None, None, Some(2.0), Some(4.0)];
        let out = ema(&values, 2);
        assert_eq!(out[2], None);
        // alpha = 2/3: 2 -> 2/3*4 + 1/3*2
        assert!(approx(out[3].unwrap(), 10.0 / 3.0));
    }

    #[test]
    fn test_pct_change() {
        let out = pct_change(&[100.0, 110.0, 121.0], 1);
        assert_eq!(out[0], None);
        assert!(approx(out[1].unwrap(), 0.1));
        assert!(approx(out[2].unwrap(), 0.1));
    }

    #[test]
    fn test_rolling_std_sample() {
        let values: Vec<Option<f64>> = vec![Some(2.0), Some(4.0), Some(4.0), Some(4.0), Some(5.0)];
        let out = rolling_std(&values, 5, 1);
        // 样本方差 = 4.8 / 4
        assert!(approx(out[4].unwrap(), (1.2f64).sqrt()));
    }

    #[test]
    fn test_rolling_std_missing_value() {
        let values = vec![None, Some(1.0), Some(2.0)];
        let out = rolling_std(&values, 2, 0);
        assert_eq!(out[1], None);
        assert!(approx(out[2].unwrap(), 0.5));
    }

    #[test]
    fn test_rsi_monotonic_up_is_100() {
        let close: Vec<f64> = (0..30).map(|x| 100.0 + x as f64).collect();
        let out = rsi(&close, 14);
        assert_eq!(out[13], None);
        assert!(approx(out[14].unwrap(), 100.0));
        assert!(approx(out[29].unwrap(), 100.0));
    }

    #[test]
    fn test_rsi_bounded() {
        let close: Vec<f64> = (0..60)
            .map(|x| 100.0 + (x as f64 * 0.7).sin() * 5.0)
            .collect();
        for value in rsi(&close, 14).into_iter().flatten() {
            assert!((0.0..=100.0).contains(&value));
        }
    }

    #[test]
    fn test_macd_warmup() {
        let close: Vec<f64> = (0..60).map(|x| 100.0 + x as f64).collect();
        let (line, signal) = macd(&close, 12, 26, 9);
        assert_eq!(line[24], None);
        assert!(line[25].is_some());
        assert_eq!(signal[32], None);
        assert!(signal[33].is_some());
    }

    #[test]
    fn test_bollinger_constant_series() {
        let close = vec![10.0; 25];
        let (upper, lower) = bollinger(&close, 20, 2.0);
        assert_eq!(upper[18], None);
        assert!(approx(upper[19].unwrap(), 10.0));
        assert!(approx(lower[24].unwrap(), 10.0));
    }
}
