//! 预测服务
//!
//! 把行情源、情感源和检查点存储组合成按股票代码的预测/训练入口。

use crate::checkpoint::CheckpointStore;
use crate::dataset::prepare_training_data;
use crate::ensemble::train_ensemble;
use crate::predictor::Predictor;
use crate::training::TrainingReport;
use crate::types::{validate_bars, Bar, Forecast, ForecastError, ForecastResult};
use crate::ForecastConfig;
use async_trait::async_trait;
use sentiment::{read_sentiment, SentimentSource};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tch::Device;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

const DISCLAIMER: &str = "This prediction is based on historical data and technical indicators. \
Please use it as one of many factors in your investment decisions.";

#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("market data provider error: {0}")]
    Provider(String),
}

impl From<MarketDataError> for ForecastError {
    fn from(err: MarketDataError) -> Self {
        ForecastError::DataUnavailable(err.to_string())
    }
}

/// 行情数据源
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// 按时间升序返回最近 `count` 根日线
    async fn recent_bars(&self, symbol: &str, count: usize) -> Result<Vec<Bar>, MarketDataError>;
}

/// 对外的结构化响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ForecastResponse {
    Ok { predicted_return: f64, note: String },
    Error { kind: String, message: String },
}

pub struct ForecastService {
    config: ForecastConfig,
    market: Arc<dyn MarketDataSource>,
    sentiment: Arc<dyn SentimentSource>,
    store: CheckpointStore,
    device: Device,
    predictors: RwLock<HashMap<String, Arc<Predictor>>>,
    training: Mutex<()>,
}

impl ForecastService {
    pub fn new(
        config: ForecastConfig,
        market: Arc<dyn MarketDataSource>,
        sentiment: Arc<dyn SentimentSource>,
    ) -> ForecastResult<Self> {
        config.validate()?;
        let store = CheckpointStore::new(&config.checkpoint_dir);

        Ok(Self {
            config,
            market,
            sentiment,
            store,
            device: Device::cuda_if_available(),
            predictors: RwLock::new(HashMap::new()),
            training: Mutex::new(()),
        })
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// 预测下一期收益率
    pub async fn forecast(&self, symbol: &str) -> ForecastResult<Forecast> {
        let predictor = self.predictor(symbol).await?;

        let bars = self
            .market
            .recent_bars(symbol, predictor.required_bars())
            .await?;
        let sentiment = read_sentiment(self.sentiment.as_ref(), symbol).await;

        let predicted_return = predictor.predict(&bars, &sentiment)?;
        let last = bars
            .last()
            .ok_or_else(|| ForecastError::DataUnavailable(symbol.to_string()))?;

        let mut note = DISCLAIMER.to_string();
        if !sentiment.is_available() {
            note.push_str(" Sentiment was unavailable; a neutral score of 0.5 was used.");
        }

        info!(
            "Forecast for {}: predicted return {:.4}% (sentiment {})",
            symbol,
            predicted_return * 100.0,
            sentiment
        );

        Ok(Forecast {
            symbol: predictor.symbol().to_string(),
            predicted_return,
            last_close: last.close,
            estimated_price: last.close * (1.0 + predicted_return),
            as_of: last.date,
            sentiment,
            members: predictor.member_count(),
            note,
        })
    }

    /// 重新训练并替换该股票的缩放器和检查点
    ///
    /// 训练失败时之前提交的模型保持生效。
    pub async fn train(&self, symbol: &str) -> ForecastResult<Vec<TrainingReport>> {
        let bars = self
            .market
            .recent_bars(symbol, self.config.training_bars)
            .await?;
        let sentiment = read_sentiment(self.sentiment.as_ref(), symbol).await;

        let dataset = Arc::new(prepare_training_data(
            &bars,
            &sentiment,
            self.config.lookback,
            self.config.validation_ratio,
        )?);

        // 同一服务内的训练串行执行，提交时清理的旧训练目录不会是另一次进行中的训练
        let _guard = self.training.lock().await;
        let result = train_ensemble(
            &self.store,
            symbol,
            dataset,
            self.config.model.clone(),
            self.config.trainer.clone(),
            self.config.ensemble_size,
            self.device,
        )
        .await;

        if result.is_ok() {
            self.predictors.write().await.remove(&cache_key(symbol));
        }

        result
    }

    /// 最近 `count` 根日线
    pub async fn history(&self, symbol: &str, count: usize) -> ForecastResult<Vec<Bar>> {
        let bars = self.market.recent_bars(symbol, count).await?;
        validate_bars(&bars)?;
        Ok(bars)
    }

    pub fn trained_symbols(&self) -> ForecastResult<Vec<String>> {
        self.store.trained_symbols()
    }

    /// 请求边界：返回 `{predicted_return, note}` 或结构化错误
    pub async fn respond(&self, symbol: &str) -> ForecastResponse {
        match self.forecast(symbol).await {
            Ok(forecast) => ForecastResponse::Ok {
                predicted_return: forecast.predicted_return,
                note: forecast.note,
            },
            Err(e) => {
                warn!("Forecast for {} failed: {}", symbol, e);
                ForecastResponse::Error {
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                }
            }
        }
    }

    async fn predictor(&self, symbol: &str) -> ForecastResult<Arc<Predictor>> {
        let key = cache_key(symbol);
        if let Some(predictor) = self.predictors.read().await.get(&key) {
            return Ok(Arc::clone(predictor));
        }

        // 读取文件和构建模型都是阻塞操作
        let store = self.store.clone();
        let owned_symbol = symbol.to_string();
        let device = self.device;
        let predictor = tokio::task::spawn_blocking(move || {
            Predictor::load(&store, &owned_symbol, device)
        })
        .await
        .map_err(|e| ForecastError::Training(format!("predictor load panicked: {}", e)))??;
        let predictor = Arc::new(predictor);
        self.predictors
            .write()
            .await
            .insert(key, Arc::clone(&predictor));
        Ok(predictor)
    }
}

fn cache_key(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}
