//! 训练数据准备：特征 → 划分 → 归一化 → 窗口

use crate::features::{FeatureEngineer, FeatureVector, WARMUP_ROWS};
use crate::preprocessing::MinMaxScaler;
use crate::timeseries::{chronological_split, min_split_windows, WindowBuilder, WindowSet};
use crate::types::{validate_bars, Bar, ForecastError, ForecastResult};
use ndarray::s;
use sentiment::SentimentReading;
use tracing::info;

/// 准备好的训练数据，训练期间只读
#[derive(Debug, Clone)]
pub struct PreparedDataset {
    /// 只用训练窗口所覆盖的行拟合
    pub scaler: MinMaxScaler,
    pub train: WindowSet,
    pub validation: WindowSet,
    pub lookback: usize,
    pub feature_columns: Vec<String>,
}

/// 训练所需的最少K线数量
///
/// 预热行 + 一个回看窗口 + 训练/验证两侧都非空所需的标签行 + 最后一根没有目标的K线。
pub fn min_training_bars(lookback: usize, validation_ratio: f64) -> ForecastResult<usize> {
    Ok(WARMUP_ROWS + lookback + min_split_windows(validation_ratio)? + 1)
}

/// 由K线构建训练/验证窗口
///
/// 先按时间顺序划分窗口，再只用训练窗口覆盖的行拟合缩放器，验证数据不参与拟合。
pub fn prepare_training_data(
    bars: &[Bar],
    sentiment: &SentimentReading,
    lookback: usize,
    validation_ratio: f64,
) -> ForecastResult<PreparedDataset> {
    validate_bars(bars)?;
    if lookback == 0 {
        return Err(ForecastError::InvalidConfig("回看长度必须大于 0".to_string()));
    }

    let required_bars = min_training_bars(lookback, validation_ratio)?;
    let rows = FeatureEngineer::complete_rows(FeatureEngineer::compute(bars, sentiment)?);

    // 最后一根K线没有下一期收益率
    let labelled: Vec<_> = rows.into_iter().filter(|row| row.target.is_some()).collect();
    if labelled.len() < lookback + min_split_windows(validation_ratio)? {
        return Err(ForecastError::InsufficientHistory {
            required: required_bars,
            actual: bars.len(),
        });
    }

    let n_windows = labelled.len() - lookback;
    let (n_train, n_validation) = chronological_split(n_windows, validation_ratio)?;

    let features = FeatureEngineer::feature_matrix(&labelled);
    let targets = FeatureEngineer::target_vector(&labelled);

    // 训练窗口 i 覆盖行 i..i+L，最后一个训练窗口止于第 n_train + L - 2 行
    let fit_rows = n_train + lookback - 1;
    let mut scaler = MinMaxScaler::new();
    scaler.fit(features.slice(s![..fit_rows, ..]))?;

    let normalized = scaler.transform(features.view())?;
    let windows = WindowBuilder::new(lookback).build(normalized.view(), targets.view())?;
    let (train, validation) = windows.split_at(n_train);

    info!(
        "Prepared {} training and {} validation windows from {} bars (scaler fit on {} rows)",
        n_train,
        n_validation,
        bars.len(),
        fit_rows
    );

    Ok(PreparedDataset {
        scaler,
        train,
        validation,
        lookback,
        feature_columns: FeatureVector::columns(),
    })
}
