//! # Forecast
//!
//! 基于 LSTM 的下一期收益率预测。
//!
//! ## 主要模块
//!
//! - `features`: 技术指标特征工程
//! - `preprocessing`: Min-Max 归一化
//! - `timeseries`: 回看窗口构建
//! - `models`: 堆叠 LSTM 模型与优化器
//! - `training`: 早停训练与检查点
//! - `checkpoint`: 检查点持久化
//! - `predictor`: 单窗口推理
//! - `ensemble`: 多种子集成训练
//! - `service`: 预测服务入口
//! - `evaluation`: 模型评估指标

pub mod checkpoint;
pub mod dataset;
pub mod ensemble;
pub mod evaluation;
pub mod features;
pub mod indicators;
pub mod models;
pub mod predictor;
pub mod preprocessing;
pub mod service;
pub mod timeseries;
pub mod training;
pub mod types;

pub use checkpoint::{CheckpointMeta, CheckpointStore, CommittedRun, MemberCheckpointer};
pub use dataset::{prepare_training_data, PreparedDataset};
pub use features::{FeatureEngineer, FeatureRow, FeatureVector};
pub use models::{SequenceConfig, SequenceModel};
pub use predictor::Predictor;
pub use preprocessing::{MinMaxScaler, ScalerState};
pub use service::{ForecastResponse, ForecastService, MarketDataError, MarketDataSource};
pub use timeseries::{WindowBuilder, WindowSet};
pub use training::{Trainer, TrainerConfig, TrainingReport};
pub use types::{Bar, Forecast, ForecastError, ForecastResult, Metrics};

use std::path::{Path, PathBuf};

/// 预测引擎配置
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// 回看窗口长度（交易日）
    pub lookback: usize,
    /// 验证集比例
    pub validation_ratio: f64,
    /// 训练时拉取的K线数量（约五年日线）
    pub training_bars: usize,
    /// 集成成员数量
    pub ensemble_size: usize,
    /// 检查点根目录
    pub checkpoint_dir: PathBuf,
    pub model: SequenceConfig,
    pub trainer: TrainerConfig,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            lookback: 60,
            validation_ratio: 0.2,
            training_bars: 1260,
            ensemble_size: 1,
            checkpoint_dir: PathBuf::from("models"),
            model: SequenceConfig::default(),
            trainer: TrainerConfig::default(),
        }
    }
}

impl ForecastConfig {
    /// 从 JSON 文件加载，缺失字段使用默认值
    pub fn from_json_file(path: impl AsRef<Path>) -> ForecastResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ForecastResult<()> {
        if self.lookback == 0 {
            return Err(ForecastError::InvalidConfig("lookback 必须大于 0".to_string()));
        }
        if !(self.validation_ratio > 0.0 && self.validation_ratio < 1.0) {
            return Err(ForecastError::InvalidConfig(format!(
                "validation_ratio 必须在 (0, 1) 内: {}",
                self.validation_ratio
            )));
        }
        if self.ensemble_size == 0 {
            return Err(ForecastError::InvalidConfig("ensemble_size 必须大于 0".to_string()));
        }
        let min_bars = dataset::min_training_bars(self.lookback, self.validation_ratio)?;
        if self.training_bars < min_bars {
            return Err(ForecastError::InvalidConfig(format!(
                "training_bars {} 少于最少需要的 {}",
                self.training_bars, min_bars
            )));
        }
        if self.model.input_size as usize != FeatureVector::COUNT {
            return Err(ForecastError::InvalidConfig(format!(
                "model.input_size 必须等于特征数 {}",
                FeatureVector::COUNT
            )));
        }
        self.model.validate()?;
        self.trainer.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = ForecastConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lookback, 60);
        assert_eq!(config.model.num_layers, 3);
        assert_eq!(config.trainer.patience, 10);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"lookback": 30, "ensemble_size": 3}}"#).unwrap();

        let config = ForecastConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.lookback, 30);
        assert_eq!(config.ensemble_size, 3);
        assert_eq!(config.validation_ratio, 0.2);
        assert_eq!(config.trainer.learning_rate, 0.001);
    }

    #[test]
    fn test_rejects_bad_values() {
        let config = ForecastConfig {
            validation_ratio: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ForecastConfig {
            training_bars: 100,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let mut config = ForecastConfig::default();
        config.model.input_size = 12;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_training_bars_minimum() {
        let config = ForecastConfig {
            training_bars: 261,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ForecastConfig {
            training_bars: 262,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
