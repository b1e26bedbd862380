//! LSTM 收益率预测示例
//!
//! 用模拟行情训练一个小型集成模型，再对最新窗口做一次预测

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use forecast::{
    Bar, ForecastConfig, ForecastResponse, ForecastService, MarketDataError, MarketDataSource,
    SequenceConfig, TrainerConfig,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use sentiment::{HeadlineFeed, HeadlineSentiment, SentimentResult};
use std::sync::Arc;

struct SimulatedMarket {
    bars: Vec<Bar>,
}

#[async_trait]
impl MarketDataSource for SimulatedMarket {
    async fn recent_bars(&self, _symbol: &str, count: usize) -> Result<Vec<Bar>, MarketDataError> {
        let start = self.bars.len().saturating_sub(count);
        Ok(self.bars[start..].to_vec())
    }
}

struct CannedHeadlines;

#[async_trait]
impl HeadlineFeed for CannedHeadlines {
    async fn fetch_headlines(&self, symbol: &str) -> SentimentResult<Vec<String>> {
        Ok(vec![
            format!("{} beats earnings expectations, shares surge", symbol),
            format!("Analysts upgrade {} on strong growth", symbol),
            format!("{} faces lawsuit over product delays", symbol),
        ])
    }
}

fn generate_mock_bars(n: usize) -> Vec<Bar> {
    let mut rng = StdRng::seed_from_u64(2024);
    let start = NaiveDate::from_ymd_opt(2019, 1, 2).expect("valid start date");
    let mut price = 100.0;

    (0..n)
        .map(|i| {
            let change = rng.gen_range(-0.02..0.02) + 0.0005;
            price *= 1.0 + change;
            let open = price * (1.0 + rng.gen_range(-0.005..0.005));
            Bar {
                date: start + Duration::days(i as i64),
                open,
                high: price.max(open) * (1.0 + rng.gen_range(0.0..0.01)),
                low: price.min(open) * (1.0 - rng.gen_range(0.0..0.01)),
                close: price,
                volume: rng.gen_range(800_000.0..1_200_000.0),
            }
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("=== LSTM 收益率预测示例 ===\n");

    println!("1. 生成模拟市场数据...");
    let market = Arc::new(SimulatedMarket {
        bars: generate_mock_bars(600),
    });

    let checkpoint_dir = tempfile::tempdir()?;
    let config = ForecastConfig {
        lookback: 30,
        training_bars: 600,
        ensemble_size: 2,
        checkpoint_dir: checkpoint_dir.path().to_path_buf(),
        model: SequenceConfig {
            hidden_size: 32,
            num_layers: 2,
            ..Default::default()
        },
        trainer: TrainerConfig {
            max_epochs: 30,
            patience: 5,
            ..Default::default()
        },
        ..Default::default()
    };
    println!("   配置: {:?}", config);

    let sentiment = Arc::new(HeadlineSentiment::new(CannedHeadlines));
    let service = ForecastService::new(config, market, sentiment)?;

    println!("\n2. 训练集成模型...");
    let reports = service.train("DEMO").await?;
    for (i, report) in reports.iter().enumerate() {
        println!(
            "   成员 {}: {} epochs, 最优 epoch {}, 验证损失 {:.6}, 方向准确率 {:.2}%",
            i,
            report.epochs_run,
            report.best_epoch,
            report.best_validation_loss,
            report.validation_metrics.direction_accuracy * 100.0
        );
    }
    println!("   已训练: {:?}", service.trained_symbols()?);

    println!("\n3. 预测下一期收益率...");
    let forecast = service.forecast("DEMO").await?;
    println!("   日期: {}", forecast.as_of);
    println!("   最新收盘价: {:.2}", forecast.last_close);
    println!("   预测收益率: {:.4}%", forecast.predicted_return * 100.0);
    println!("   估计价格: {:.2}", forecast.estimated_price);
    println!("   情感: {}", forecast.sentiment);

    println!("\n4. 结构化响应...");
    let response: ForecastResponse = service.respond("DEMO").await;
    println!("   {}", serde_json::to_string_pretty(&response)?);

    Ok(())
}
