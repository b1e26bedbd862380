//! 核心类型定义

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sentiment::SentimentReading;
use thiserror::Error;

pub type ForecastResult<T> = Result<T, ForecastError>;

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("数据不可用: {0}")]
    DataUnavailable(String),

    #[error("历史数据不足: required {required}, got {actual}")]
    InsufficientHistory { required: usize, actual: usize },

    #[error("数据维度不匹配: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("特征列不一致: {0}")]
    SchemaMismatch(String),

    #[error("缩放器尚未拟合")]
    ScalerNotFit,

    #[error("模型未训练: {0}")]
    ModelNotTrained(String),

    #[error(
        "数值不稳定: epoch {epoch}, training loss {training_loss}, validation loss {validation_loss}"
    )]
    NumericInstability {
        epoch: usize,
        training_loss: f64,
        validation_loss: f64,
    },

    #[error("无效的K线数据: {0}")]
    InvalidBars(String),

    #[error("无效的配置: {0}")]
    InvalidConfig(String),

    #[error("模型训练错误: {0}")]
    Training(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("PyTorch 错误: {0}")]
    Torch(#[from] tch::TchError),
}

impl ForecastError {
    /// 稳定的错误类别标识，用于对外的结构化错误
    pub fn kind(&self) -> &'static str {
        match self {
            ForecastError::DataUnavailable(_) => "data_unavailable",
            ForecastError::InsufficientHistory { .. } => "insufficient_history",
            ForecastError::DimensionMismatch { .. } => "dimension_mismatch",
            ForecastError::SchemaMismatch(_) => "schema_mismatch",
            ForecastError::ScalerNotFit => "scaler_not_fit",
            ForecastError::ModelNotTrained(_) => "model_not_trained",
            ForecastError::NumericInstability { .. } => "numeric_instability",
            ForecastError::InvalidBars(_) => "invalid_bars",
            ForecastError::InvalidConfig(_) => "invalid_config",
            ForecastError::Training(_) => "training",
            ForecastError::Io(_) => "io",
            ForecastError::Serialization(_) => "serialization",
            ForecastError::Torch(_) => "torch",
        }
    }
}

/// 日线K线（OHLCV）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// 检查单根K线是否合法
    pub fn validate(&self) -> ForecastResult<()> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(ForecastError::InvalidBars(format!(
                "{}: 价格必须为正的有限值",
                self.date
            )));
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(ForecastError::InvalidBars(format!(
                "{}: 成交量必须为非负的有限值",
                self.date
            )));
        }
        if self.high < self.low {
            return Err(ForecastError::InvalidBars(format!(
                "{}: high < low",
                self.date
            )));
        }
        Ok(())
    }
}

/// 检查K线序列：非空、逐根合法、日期严格递增（无重复）
pub fn validate_bars(bars: &[Bar]) -> ForecastResult<()> {
    if bars.is_empty() {
        return Err(ForecastError::DataUnavailable("K线为空".to_string()));
    }

    for bar in bars {
        bar.validate()?;
    }

    if let Some(pair) = bars.windows(2).find(|pair| pair[1].date <= pair[0].date) {
        return Err(ForecastError::InvalidBars(format!(
            "日期未严格递增: {} -> {}",
            pair[0].date, pair[1].date
        )));
    }

    Ok(())
}

/// 预测结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast {
    pub symbol: String,
    /// 预测的下一期收益率
    pub predicted_return: f64,
    /// 最近收盘价
    pub last_close: f64,
    /// 按预测收益率推算的下一期价格
    pub estimated_price: f64,
    pub as_of: NaiveDate,
    pub sentiment: SentimentReading,
    /// 参与平均的模型数量
    pub members: usize,
    pub note: String,
}

/// 评估指标
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    /// 均方误差
    pub mse: f64,
    /// 均方根误差
    pub rmse: f64,
    /// 平均绝对误差
    pub mae: f64,
    /// R² 分数
    pub r2_score: f64,
    /// 方向准确率（预测涨跌方向的准确度）
    pub direction_accuracy: f64,
}

impl Metrics {
    pub fn new(mse: f64, rmse: f64, mae: f64, r2_score: f64, direction_accuracy: f64) -> Self {
        Self {
            mse,
            rmse,
            mae,
            r2_score,
            direction_accuracy,
        }
    }
}
