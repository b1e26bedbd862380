//! 核心类型定义

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type SentimentResult<T> = Result<T, SentimentError>;

#[derive(Debug, Error)]
pub enum SentimentError {
    #[error("新闻源请求失败: {0}")]
    Feed(String),

    #[error("没有可用的新闻标题: {0}")]
    NoHeadlines(String),

    #[error("情感分数越界: {0}")]
    OutOfRange(f64),
}

/// 情感读数
///
/// 区分"确认中性"（`Observed(0.5)`）与"不可用"，不再把失败静默地当作中性。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SentimentReading {
    /// 观测到的分数 [0, 1]
    Observed { score: f64 },
    /// 数据源失败或无数据
    Unavailable { reason: String },
}

impl SentimentReading {
    /// 中性分数
    pub const NEUTRAL: f64 = 0.5;

    /// 构造观测值，分数必须在 [0, 1] 内
    pub fn observed(score: f64) -> SentimentResult<Self> {
        if !score.is_finite() || !(0.0..=1.0).contains(&score) {
            return Err(SentimentError::OutOfRange(score));
        }
        Ok(SentimentReading::Observed { score })
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        SentimentReading::Unavailable {
            reason: reason.into(),
        }
    }

    /// 作为特征列使用的数值，不可用时退化为中性
    pub fn value(&self) -> f64 {
        match self {
            SentimentReading::Observed { score } => *score,
            SentimentReading::Unavailable { .. } => Self::NEUTRAL,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, SentimentReading::Observed { .. })
    }

    /// 观测值恰好为中性
    pub fn is_confirmed_neutral(&self) -> bool {
        matches!(self, SentimentReading::Observed { score } if (*score - Self::NEUTRAL).abs() < f64::EPSILON)
    }
}

impl std::fmt::Display for SentimentReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SentimentReading::Observed { score } => write!(f, "{:.3}", score),
            SentimentReading::Unavailable { reason } => write!(f, "unavailable ({})", reason),
        }
    }
}
