//! # Sentiment
//!
//! 个股情感分数
//!
//! ## 功能
//!
//! - 显式的情感读数（观测值 / 不可用）
//! - 基于词典的新闻标题打分
//! - 情感数据源接口与失败降级

pub mod types;
pub mod analyzer;
pub mod source;

pub use analyzer::HeadlineAnalyzer;
pub use source::{read_sentiment, FixedSentiment, HeadlineFeed, HeadlineSentiment, SentimentSource};
pub use types::{SentimentError, SentimentReading, SentimentResult};
