//! 特征归一化

use crate::types::{ForecastError, ForecastResult};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// 拟合后的每列最小值/最大值，拟合后只读
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerState {
    pub min: Array1<f64>,
    pub max: Array1<f64>,
}

impl ScalerState {
    pub fn n_features(&self) -> usize {
        self.min.len()
    }

    /// 从磁盘读回的状态必须非空且 min/max 列数一致
    pub fn validate(&self) -> ForecastResult<()> {
        if self.min.len() != self.max.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.min.len(),
                actual: self.max.len(),
            });
        }
        if self.min.is_empty() {
            return Err(ForecastError::ScalerNotFit);
        }
        Ok(())
    }

    /// 列范围，常数列按 1.0 处理
    fn range(&self, j: usize) -> f64 {
        let range = self.max[j] - self.min[j];
        if range.abs() < 1e-12 {
            1.0
        } else {
            range
        }
    }
}

/// Min-Max 缩放器
///
/// `transform` 按训练区间线性映射到 [0, 1]。超出训练区间的值**不会被截断**，
/// 而是线性外推到 [0, 1] 之外：实盘数据可能突破历史区间。
#[derive(Debug, Clone, Default)]
pub struct MinMaxScaler {
    state: Option<ScalerState>,
}

impl MinMaxScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: ScalerState) -> ForecastResult<Self> {
        state.validate()?;
        Ok(Self { state: Some(state) })
    }

    pub fn state(&self) -> Option<&ScalerState> {
        self.state.as_ref()
    }

    pub fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    /// 只用训练集拟合，重复调用会替换旧状态
    pub fn fit(&mut self, data: ArrayView2<f64>) -> ForecastResult<()> {
        if data.nrows() == 0 || data.ncols() == 0 {
            return Err(ForecastError::DataUnavailable("缩放器拟合数据为空".to_string()));
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::InvalidBars(
                "缩放器拟合数据包含非有限值".to_string(),
            ));
        }

        let min = data.fold_axis(Axis(0), f64::INFINITY, |acc, &v| acc.min(v));
        let max = data.fold_axis(Axis(0), f64::NEG_INFINITY, |acc, &v| acc.max(v));

        self.state = Some(ScalerState { min, max });
        Ok(())
    }

    /// 归一化数据
    pub fn transform(&self, data: ArrayView2<f64>) -> ForecastResult<Array2<f64>> {
        let state = self.state.as_ref().ok_or(ForecastError::ScalerNotFit)?;
        if data.ncols() != state.n_features() {
            return Err(ForecastError::DimensionMismatch {
                expected: state.n_features(),
                actual: data.ncols(),
            });
        }

        let mut normalized = data.to_owned();
        for mut row in normalized.axis_iter_mut(Axis(0)) {
            for (j, val) in row.iter_mut().enumerate() {
                *val = (*val - state.min[j]) / state.range(j);
            }
        }

        Ok(normalized)
    }

    /// 拟合并转换
    pub fn fit_transform(&mut self, data: ArrayView2<f64>) -> ForecastResult<Array2<f64>> {
        self.fit(data)?;
        self.transform(data)
    }

    /// 反归一化
    pub fn inverse_transform(&self, data: ArrayView2<f64>) -> ForecastResult<Array2<f64>> {
        let state = self.state.as_ref().ok_or(ForecastError::ScalerNotFit)?;
        if data.ncols() != state.n_features() {
            return Err(ForecastError::DimensionMismatch {
                expected: state.n_features(),
                actual: data.ncols(),
            });
        }

        let mut denormalized = data.to_owned();
        for mut row in denormalized.axis_iter_mut(Axis(0)) {
            for (j, val) in row.iter_mut().enumerate() {
                *val = *val * state.range(j) + state.min[j];
            }
        }

        Ok(denormalized)
    }
}
