//! 情感数据源接口

use crate::analyzer::HeadlineAnalyzer;
use crate::types::{SentimentError, SentimentReading, SentimentResult};
use async_trait::async_trait;

/// 按股票代码提供情感分数的数据源
#[async_trait]
pub trait SentimentSource: Send + Sync {
    /// 返回 [0, 1] 的情感分数
    async fn fetch_score(&self, symbol: &str) -> SentimentResult<f64>;
}

/// 新闻标题来源（抓取本身由外部实现）
#[async_trait]
pub trait HeadlineFeed: Send + Sync {
    async fn fetch_headlines(&self, symbol: &str) -> SentimentResult<Vec<String>>;
}

/// 将标题来源与词典分析器组合成情感数据源
pub struct HeadlineSentiment<F> {
    feed: F,
    analyzer: HeadlineAnalyzer,
}

impl<F: HeadlineFeed> HeadlineSentiment<F> {
    pub fn new(feed: F) -> Self {
        Self {
            feed,
            analyzer: HeadlineAnalyzer::new(),
        }
    }
}

#[async_trait]
impl<F: HeadlineFeed> SentimentSource for HeadlineSentiment<F> {
    async fn fetch_score(&self, symbol: &str) -> SentimentResult<f64> {
        let headlines = self.feed.fetch_headlines(symbol).await?;
        self.analyzer
            .score_headlines(&headlines)
            .ok_or_else(|| SentimentError::NoHeadlines(symbol.to_string()))
    }
}

/// 固定分数的数据源
#[derive(Debug, Clone, Copy)]
pub struct FixedSentiment(pub f64);

#[async_trait]
impl SentimentSource for FixedSentiment {
    async fn fetch_score(&self, _symbol: &str) -> SentimentResult<f64> {
        Ok(self.0)
    }
}

/// 读取情感分数，失败时降级为 `Unavailable` 而不是中断管道
pub async fn read_sentiment(source: &dyn SentimentSource, symbol: &str) -> SentimentReading {
    match source.fetch_score(symbol).await {
        Ok(score) => match SentimentReading::observed(score) {
            Ok(reading) => reading,
            Err(e) => {
                tracing::warn!("Discarding sentiment for {}: {}", symbol, e);
                SentimentReading::unavailable(e.to_string())
            }
        },
        Err(e) => {
            tracing::warn!("Sentiment unavailable for {}: {}", symbol, e);
            SentimentReading::unavailable(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticFeed(Vec<String>);

    #[async_trait]
    impl HeadlineFeed for StaticFeed {
        async fn fetch_headlines(&self, _symbol: &str) -> SentimentResult<Vec<String>> {
            Ok(self.0.clone())
        }
    }

    struct FailingFeed;

    #[async_trait]
    impl HeadlineFeed for FailingFeed {
        async fn fetch_headlines(&self, _symbol: &str) -> SentimentResult<Vec<String>> {
            Err(SentimentError::Feed("connection reset".to_string()))
        }
    }

    #[tokio::test]
    async fn test_headline_source_observed() {
        let source = HeadlineSentiment::new(StaticFeed(vec![
            "Shares rally to record high".to_string(),
        ]));
        let reading = read_sentiment(&source, "AAPL").await;
        assert!(reading.is_available());
        assert!(reading.value() > 0.5);
    }

    #[tokio::test]
    async fn test_failing_feed_is_unavailable() {
        let source = HeadlineSentiment::new(FailingFeed);
        let reading = read_sentiment(&source, "AAPL").await;
        assert!(!reading.is_available());
        assert_eq!(reading.value(), 0.5);
    }

    #[tokio::test]
    async fn test_empty_feed_is_unavailable() {
        let source = HeadlineSentiment::new(StaticFeed(Vec::new()));
        let reading = read_sentiment(&source, "MSFT").await;
        assert!(matches!(reading, SentimentReading::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_out_of_range_score_is_unavailable() {
        let reading = read_sentiment(&FixedSentiment(3.0), "MSFT").await;
        assert!(!reading.is_available());
    }
}
