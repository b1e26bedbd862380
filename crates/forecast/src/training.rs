//! 模型训练
//!
//! 停止规则（[`EarlyStopping`] + [`run_schedule`]）与梯度计算分离：
//! 调度器只看到每个 epoch 的损失，具体训练由 [`EpochDriver`] 实现。

use crate::evaluation::Evaluator;
use crate::models::deep_learning::{array1_to_tensor, array3_to_tensor};
use crate::models::{Adam, SequenceModel};
use crate::timeseries::WindowSet;
use crate::types::{ForecastError, ForecastResult, Metrics};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tch::{Reduction, Tensor};
use tracing::{debug, info};

/// 训练配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub max_epochs: usize,
    /// 连续多少个 epoch 验证损失未改善后停止
    pub patience: usize,
    pub learning_rate: f64,
    /// `None` 表示整批训练，每个 epoch 一次优化步
    pub batch_size: Option<usize>,
    pub seed: u64,
    /// 每隔多少个 epoch 输出一次日志
    pub log_every: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            max_epochs: 100,
            patience: 10,
            learning_rate: 0.001,
            batch_size: None,
            seed: 42,
            log_every: 10,
        }
    }
}

impl TrainerConfig {
    pub fn validate(&self) -> ForecastResult<()> {
        if self.max_epochs == 0 {
            return Err(ForecastError::InvalidConfig("max_epochs 必须大于 0".to_string()));
        }
        if self.patience == 0 {
            return Err(ForecastError::InvalidConfig("patience 必须大于 0".to_string()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ForecastError::InvalidConfig(format!(
                "learning_rate 必须为正: {}",
                self.learning_rate
            )));
        }
        if self.batch_size == Some(0) {
            return Err(ForecastError::InvalidConfig("batch_size 必须大于 0".to_string()));
        }
        Ok(())
    }
}

/// 单个 epoch 的损失（epoch 从 0 开始计数）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochLosses {
    pub epoch: usize,
    pub training_loss: f64,
    pub validation_loss: f64,
}

impl EpochLosses {
    pub fn is_finite(&self) -> bool {
        self.training_loss.is_finite() && self.validation_loss.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// 验证损失连续 `patience` 个 epoch 未改善
    EarlyStopped,
    /// 达到 `max_epochs`
    MaxEpochs,
}

/// 训练状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingPhase {
    Training,
    /// 验证损失严格改善，计数器清零，需要写检查点
    Improved,
    /// 未改善，计数器加一
    Stalled { stale_epochs: usize },
    Stopped(StopReason),
}

/// 早停判定
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best: Option<EpochLosses>,
    stale_epochs: usize,
    phase: TrainingPhase,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best: None,
            stale_epochs: 0,
            phase: TrainingPhase::Training,
        }
    }

    pub fn phase(&self) -> TrainingPhase {
        self.phase
    }

    pub fn best(&self) -> Option<EpochLosses> {
        self.best
    }

    pub fn stale_epochs(&self) -> usize {
        self.stale_epochs
    }

    /// 记录一个 epoch 的损失并返回新的阶段
    ///
    /// NaN/Inf 损失直接返回 `NumericInstability`，状态不变。
    pub fn observe(&mut self, losses: EpochLosses) -> ForecastResult<TrainingPhase> {
        if !losses.is_finite() {
            return Err(ForecastError::NumericInstability {
                epoch: losses.epoch,
                training_loss: losses.training_loss,
                validation_loss: losses.validation_loss,
            });
        }

        let improved = self
            .best
            .map_or(true, |best| losses.validation_loss < best.validation_loss);

        self.phase = if improved {
            self.best = Some(losses);
            self.stale_epochs = 0;
            TrainingPhase::Improved
        } else {
            self.stale_epochs += 1;
            if self.stale_epochs >= self.patience {
                TrainingPhase::Stopped(StopReason::EarlyStopped)
            } else {
                TrainingPhase::Stalled {
                    stale_epochs: self.stale_epochs,
                }
            }
        };

        Ok(self.phase)
    }

    /// 达到 epoch 上限
    pub fn exhaust(&mut self) {
        if !matches!(self.phase, TrainingPhase::Stopped(_)) {
            self.phase = TrainingPhase::Stopped(StopReason::MaxEpochs);
        }
    }
}

/// 单个 epoch 的执行者
pub trait EpochDriver {
    /// 执行一个 epoch（训练 + 验证），返回两个损失
    fn run_epoch(&mut self, epoch: usize) -> ForecastResult<EpochLosses>;

    /// 验证损失严格改善时调用
    fn on_improved(&mut self, losses: &EpochLosses) -> ForecastResult<()>;
}

/// 调度结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleOutcome {
    pub epochs_run: usize,
    pub best: EpochLosses,
    pub stop_reason: StopReason,
    pub history: Vec<EpochLosses>,
}

/// 运行 epoch 循环直到早停或达到上限
pub fn run_schedule<D: EpochDriver + ?Sized>(
    driver: &mut D,
    max_epochs: usize,
    patience: usize,
    log_every: usize,
) -> ForecastResult<ScheduleOutcome> {
    let mut stopping = EarlyStopping::new(patience);
    let mut history = Vec::new();

    for epoch in 0..max_epochs {
        let losses = driver.run_epoch(epoch)?;
        history.push(losses);

        let phase = stopping.observe(losses)?;
        if phase == TrainingPhase::Improved {
            driver.on_improved(&losses)?;
        }

        if log_every > 0 && (epoch + 1) % log_every == 0 {
            info!(
                "Epoch {}/{}, Train Loss: {:.6}, Val Loss: {:.6}",
                epoch + 1,
                max_epochs,
                losses.training_loss,
                losses.validation_loss
            );
        }

        if let TrainingPhase::Stopped(reason) = phase {
            info!(
                "Early stopping at epoch {} (stale for {} epochs)",
                epoch,
                stopping.stale_epochs()
            );
            return finish(stopping, history, reason);
        }
    }

    stopping.exhaust();
    finish(stopping, history, StopReason::MaxEpochs)
}

fn finish(
    stopping: EarlyStopping,
    history: Vec<EpochLosses>,
    stop_reason: StopReason,
) -> ForecastResult<ScheduleOutcome> {
    let best = stopping
        .best()
        .ok_or_else(|| ForecastError::Training("没有完成任何 epoch".to_string()))?;

    Ok(ScheduleOutcome {
        epochs_run: history.len(),
        best,
        stop_reason,
        history,
    })
}

/// 检查点内容（只在验证损失改善时产生）
pub struct Checkpoint<'a> {
    pub losses: EpochLosses,
    pub model: &'a SequenceModel,
    pub optimizer: &'a Adam,
}

/// 检查点写入目标
pub trait CheckpointSink {
    fn save(&mut self, checkpoint: &Checkpoint<'_>) -> ForecastResult<()>;
}

/// 不持久化，只在内存中保留最优权重
#[derive(Debug, Default)]
pub struct DiscardCheckpoints;

impl CheckpointSink for DiscardCheckpoints {
    fn save(&mut self, _checkpoint: &Checkpoint<'_>) -> ForecastResult<()> {
        Ok(())
    }
}

/// 训练报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub epochs_run: usize,
    pub best_epoch: usize,
    pub best_training_loss: f64,
    pub best_validation_loss: f64,
    pub stop_reason: StopReason,
    pub history: Vec<EpochLosses>,
    /// 用最优权重在验证集上的评估指标
    pub validation_metrics: Metrics,
}

/// 训练器
pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> ForecastResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// 训练模型，结束后模型持有验证损失最优的权重
    pub fn fit(
        &self,
        model: &mut SequenceModel,
        train: &WindowSet,
        validation: &WindowSet,
        sink: &mut dyn CheckpointSink,
    ) -> ForecastResult<TrainingReport> {
        if train.is_empty() || validation.is_empty() {
            return Err(ForecastError::InsufficientHistory {
                required: 2,
                actual: train.len() + validation.len(),
            });
        }
        for windows in [train, validation] {
            if windows.n_features() as i64 != model.config().input_size {
                return Err(ForecastError::DimensionMismatch {
                    expected: model.config().input_size as usize,
                    actual: windows.n_features(),
                });
            }
        }

        info!(
            "Training on {} windows, validating on {} windows (lookback {}, {} features)",
            train.len(),
            validation.len(),
            train.lookback(),
            train.n_features()
        );

        let device = model.device();
        let optimizer = Adam::new(model.var_store(), self.config.learning_rate);
        let mut driver = GradientDriver {
            train_x: array3_to_tensor(&train.x, device)?,
            train_y: array1_to_tensor(&train.y, device)?,
            val_x: array3_to_tensor(&validation.x, device)?,
            val_y: array1_to_tensor(&validation.y, device)?,
            model,
            optimizer,
            batch_size: self.config.batch_size,
            rng: StdRng::seed_from_u64(self.config.seed),
            sink,
            best_weights: None,
        };

        let outcome = run_schedule(
            &mut driver,
            self.config.max_epochs,
            self.config.patience,
            self.config.log_every,
        )?;

        let GradientDriver {
            model, best_weights, ..
        } = driver;
        if let Some(best_weights) = best_weights {
            model.load_weights(&best_weights)?;
        }

        let predictions = model.predict(&validation.x)?;
        let validation_metrics = Evaluator::evaluate(&validation.y, &predictions)?;

        info!(
            "Training finished after {} epochs ({:?}), best epoch {} with val loss {:.6}",
            outcome.epochs_run, outcome.stop_reason, outcome.best.epoch, outcome.best.validation_loss
        );

        Ok(TrainingReport {
            epochs_run: outcome.epochs_run,
            best_epoch: outcome.best.epoch,
            best_training_loss: outcome.best.training_loss,
            best_validation_loss: outcome.best.validation_loss,
            stop_reason: outcome.stop_reason,
            history: outcome.history,
            validation_metrics,
        })
    }
}

/// 基于梯度的 epoch 执行者
struct GradientDriver<'a> {
    model: &'a mut SequenceModel,
    optimizer: Adam,
    train_x: Tensor,
    train_y: Tensor,
    val_x: Tensor,
    val_y: Tensor,
    batch_size: Option<usize>,
    rng: StdRng,
    sink: &'a mut dyn CheckpointSink,
    best_weights: Option<Vec<(String, Tensor)>>,
}

impl GradientDriver<'_> {
    fn train_full_batch(&mut self) -> ForecastResult<f64> {
        let predictions = self.model.forward_t(&self.train_x, true);
        let loss = predictions.f_mse_loss(&self.train_y, Reduction::Mean)?;
        self.optimizer.backward_step(&loss)?;
        Ok(loss.f_double_value(&[])?)
    }

    /// 只打乱训练窗口的顺序，验证窗口不参与
    fn train_mini_batches(&mut self, batch_size: usize) -> ForecastResult<f64> {
        let n = self.train_x.size()[0];
        let mut indices: Vec<i64> = (0..n).collect();
        indices.shuffle(&mut self.rng);

        let mut weighted_loss = 0.0;
        for chunk in indices.chunks(batch_size) {
            let index = Tensor::from_slice(chunk).to_device(self.model.device());
            let batch_x = self.train_x.f_index_select(0, &index)?;
            let batch_y = self.train_y.f_index_select(0, &index)?;

            let predictions = self.model.forward_t(&batch_x, true);
            let loss = predictions.f_mse_loss(&batch_y, Reduction::Mean)?;
            self.optimizer.backward_step(&loss)?;
            weighted_loss += loss.f_double_value(&[])? * chunk.len() as f64;
        }

        Ok(weighted_loss / n as f64)
    }

    fn validation_loss(&self) -> ForecastResult<f64> {
        let loss = tch::no_grad(|| {
            self.model
                .forward_t(&self.val_x, false)
                .f_mse_loss(&self.val_y, Reduction::Mean)
        })?;
        Ok(loss.f_double_value(&[])?)
    }
}

impl EpochDriver for GradientDriver<'_> {
    fn run_epoch(&mut self, epoch: usize) -> ForecastResult<EpochLosses> {
        let training_loss = match self.batch_size {
            Some(batch_size) => self.train_mini_batches(batch_size)?,
            None => self.train_full_batch()?,
        };
        let validation_loss = self.validation_loss()?;

        debug!(
            "epoch {} train_loss={:.6} val_loss={:.6}",
            epoch, training_loss, validation_loss
        );

        Ok(EpochLosses {
            epoch,
            training_loss,
            validation_loss,
        })
    }

    fn on_improved(&mut self, losses: &EpochLosses) -> ForecastResult<()> {
        self.sink.save(&Checkpoint {
            losses: *losses,
            model: &*self.model,
            optimizer: &self.optimizer,
        })?;
        self.best_weights = Some(self.model.snapshot());
        Ok(())
    }
}
