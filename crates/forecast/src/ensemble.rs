//! 集成训练
//!
//! 每个成员使用相同的数据和不同的随机种子，在独立的阻塞线程中训练，互不共享可变状态。
//! 缩放器和成员检查点写入一次新的训练目录，全部成员成功后才提交；任一成员失败则丢弃整次训练，
//! 之前提交的模型保持不变。

use crate::checkpoint::{CheckpointStore, MemberCheckpointer};
use crate::dataset::PreparedDataset;
use crate::models::{SequenceConfig, SequenceModel};
use crate::training::{Trainer, TrainerConfig, TrainingReport};
use crate::types::{ForecastError, ForecastResult};
use futures::future::join_all;
use std::sync::Arc;
use tch::Device;
use tracing::{error, info, warn};

/// 训练单个成员并写入 `run` 下的 `member-<index>` 检查点
#[allow(clippy::too_many_arguments)]
pub fn train_member(
    store: CheckpointStore,
    symbol: &str,
    run: &str,
    index: usize,
    dataset: &PreparedDataset,
    model_config: SequenceConfig,
    trainer_config: TrainerConfig,
    device: Device,
) -> ForecastResult<TrainingReport> {
    let seed = trainer_config.seed.wrapping_add(index as u64);
    tch::manual_seed(seed as i64);

    let mut model = SequenceModel::new(model_config, device)?;
    let trainer = Trainer::new(TrainerConfig {
        seed,
        ..trainer_config
    })?;
    let mut sink = MemberCheckpointer::new(
        store,
        symbol,
        run,
        index,
        dataset.lookback,
        dataset.feature_columns.clone(),
    );

    info!("Training member {} for {} (seed {})", index, symbol, seed);
    trainer.fit(&mut model, &dataset.train, &dataset.validation, &mut sink)
}

/// 并行训练 `ensemble_size` 个成员，全部成功后提交为当前模型
pub async fn train_ensemble(
    store: &CheckpointStore,
    symbol: &str,
    dataset: Arc<PreparedDataset>,
    model_config: SequenceConfig,
    trainer_config: TrainerConfig,
    ensemble_size: usize,
    device: Device,
) -> ForecastResult<Vec<TrainingReport>> {
    if ensemble_size == 0 {
        return Err(ForecastError::InvalidConfig("ensemble_size 必须大于 0".to_string()));
    }
    let scaler = dataset.scaler.state().ok_or(ForecastError::ScalerNotFit)?;

    let run = store.begin_run(symbol)?;
    let result = match store.save_scaler(symbol, &run, scaler) {
        Ok(()) => {
            train_members(
                store,
                symbol,
                &run,
                dataset,
                model_config,
                trainer_config,
                ensemble_size,
                device,
            )
            .await
        }
        Err(e) => Err(e),
    };

    let reports = match result.and_then(|reports| {
        store.commit_run(symbol, &run, ensemble_size)?;
        Ok(reports)
    }) {
        Ok(reports) => reports,
        Err(e) => {
            error!("Training run {} for {} failed: {}", run, symbol, e);
            if let Err(cleanup) = store.discard_run(symbol, &run) {
                warn!("Failed to discard run {} for {}: {}", run, symbol, cleanup);
            }
            return Err(e);
        }
    };

    let mean_val_loss =
        reports.iter().map(|r| r.best_validation_loss).sum::<f64>() / reports.len() as f64;
    info!(
        "Trained {} members for {}, mean best val loss {:.6}",
        reports.len(),
        symbol,
        mean_val_loss
    );

    Ok(reports)
}

#[allow(clippy::too_many_arguments)]
async fn train_members(
    store: &CheckpointStore,
    symbol: &str,
    run: &str,
    dataset: Arc<PreparedDataset>,
    model_config: SequenceConfig,
    trainer_config: TrainerConfig,
    ensemble_size: usize,
    device: Device,
) -> ForecastResult<Vec<TrainingReport>> {
    let handles = (0..ensemble_size).map(|index| {
        let store = store.clone();
        let symbol = symbol.to_string();
        let run = run.to_string();
        let dataset = Arc::clone(&dataset);
        let model_config = model_config.clone();
        let trainer_config = trainer_config.clone();

        tokio::task::spawn_blocking(move || {
            train_member(
                store,
                &symbol,
                &run,
                index,
                &dataset,
                model_config,
                trainer_config,
                device,
            )
        })
    });

    let results = join_all(handles).await;

    let mut reports = Vec::with_capacity(ensemble_size);
    for (index, result) in results.into_iter().enumerate() {
        let report = result
            .map_err(|e| ForecastError::Training(format!("member {} panicked: {}", index, e)))?
            .map_err(|e| {
                error!("Member {} for {} failed: {}", index, symbol, e);
                e
            })?;
        reports.push(report);
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::prepare_training_data;
    use crate::features::tests::noisy_bars;
    use crate::predictor::Predictor;
    use sentiment::SentimentReading;
    use std::fs;
    use tempfile::tempdir;

    fn small_config() -> SequenceConfig {
        SequenceConfig {
            hidden_size: 8,
            num_layers: 2,
            dense_size: 4,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_members_checkpointed_and_loadable() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let bars = noisy_bars(300, 21);
        let dataset = Arc::new(
            prepare_training_data(&bars, &SentimentReading::unavailable("n/a"), 20, 0.2).unwrap(),
        );

        let trainer_config = TrainerConfig {
            max_epochs: 4,
            ..Default::default()
        };
        let reports = train_ensemble(
            &store,
            "ACME",
            Arc::clone(&dataset),
            small_config(),
            trainer_config,
            2,
            Device::Cpu,
        )
        .await
        .unwrap();

        assert_eq!(reports.len(), 2);
        let run = store.current_run("ACME").unwrap().unwrap().run;
        assert_eq!(store.members("ACME", &run).unwrap(), vec![0, 1]);
        assert_eq!(
            &store.load_scaler("ACME", &run).unwrap(),
            dataset.scaler.state().unwrap()
        );
        for (index, report) in reports.iter().enumerate() {
            let meta = store.load_meta("ACME", &run, index).unwrap();
            assert_eq!(meta.epoch, report.best_epoch);
            assert_eq!(meta.lookback, 20);
        }

        let predictor = Predictor::load(&store, "ACME", Device::Cpu).unwrap();
        assert_eq!(predictor.member_count(), 2);
        let predicted = predictor
            .predict(&bars, &SentimentReading::unavailable("n/a"))
            .unwrap();
        assert!(predicted.is_finite());
    }

    #[tokio::test]
    async fn test_failed_run_keeps_previous_commit() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let sentiment = SentimentReading::unavailable("n/a");

        let first = Arc::new(prepare_training_data(&noisy_bars(300, 4), &sentiment, 20, 0.2).unwrap());
        train_ensemble(
            &store,
            "ACME",
            Arc::clone(&first),
            small_config(),
            TrainerConfig {
                max_epochs: 2,
                ..Default::default()
            },
            1,
            Device::Cpu,
        )
        .await
        .unwrap();
        let committed = store.current_run("ACME").unwrap().unwrap();

        // 不同的数据得到不同的缩放器，发散的学习率让第一个 epoch 就出现 NaN
        let second = Arc::new(prepare_training_data(&noisy_bars(500, 9), &sentiment, 20, 0.2).unwrap());
        assert_ne!(second.scaler.state(), first.scaler.state());
        let err = train_ensemble(
            &store,
            "ACME",
            second,
            small_config(),
            TrainerConfig {
                max_epochs: 2,
                learning_rate: 1e300,
                ..Default::default()
            },
            2,
            Device::Cpu,
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "numeric_instability");

        assert_eq!(store.current_run("ACME").unwrap().unwrap(), committed);
        assert_eq!(
            &store.load_scaler("ACME", &committed.run).unwrap(),
            first.scaler.state().unwrap()
        );
        let runs = fs::read_dir(store.symbol_dir("ACME").unwrap())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_type().unwrap().is_dir())
            .count();
        assert_eq!(runs, 1);

        let predictor = Predictor::load(&store, "ACME", Device::Cpu).unwrap();
        assert_eq!(predictor.member_count(), 1);
    }

    #[tokio::test]
    async fn test_zero_members_rejected() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let dataset = Arc::new(
            prepare_training_data(
                &noisy_bars(260 + 40, 2),
                &SentimentReading::unavailable("n/a"),
                20,
                0.2,
            )
            .unwrap(),
        );
        let err = train_ensemble(
            &store,
            "ACME",
            dataset,
            small_config(),
            TrainerConfig::default(),
            0,
            Device::Cpu,
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "invalid_config");
    }
}
