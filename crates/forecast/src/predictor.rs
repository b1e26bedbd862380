//! 单窗口推理
//!
//! 与训练使用同一条特征/归一化流水线。加载后只读，可在并发请求间共享。

use crate::checkpoint::CheckpointStore;
use crate::features::{FeatureEngineer, FeatureRow, FeatureVector, WARMUP_ROWS};
use crate::models::SequenceModel;
use crate::preprocessing::MinMaxScaler;
use crate::timeseries::WindowBuilder;
use crate::types::{validate_bars, Bar, ForecastError, ForecastResult};
use sentiment::SentimentReading;
use tch::Device;
use tracing::{debug, info};

pub struct Predictor {
    symbol: String,
    scaler: MinMaxScaler,
    feature_columns: Vec<String>,
    lookback: usize,
    members: Vec<SequenceModel>,
}

impl std::fmt::Debug for Predictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Predictor")
            .field("symbol", &self.symbol)
            .field("lookback", &self.lookback)
            .field("members", &self.members.len())
            .finish()
    }
}

impl Predictor {
    /// 加载当前生效训练的缩放器和全部集成成员
    ///
    /// 缩放器与成员权重只从 `current.json` 指向的同一次训练读取。
    pub fn load(store: &CheckpointStore, symbol: &str, device: Device) -> ForecastResult<Self> {
        let committed = store
            .current_run(symbol)?
            .ok_or_else(|| ForecastError::ModelNotTrained(symbol.to_string()))?;
        let run = committed.run.as_str();

        let scaler = MinMaxScaler::from_state(store.load_scaler(symbol, run)?)?;

        let indices = store.members(symbol, run)?;
        if indices != (0..committed.members).collect::<Vec<_>>() {
            return Err(ForecastError::SchemaMismatch(format!(
                "run {} has members {:?}, committed {}",
                run, indices, committed.members
            )));
        }

        let mut lookback = None;
        let mut feature_columns: Option<Vec<String>> = None;
        let mut members = Vec::with_capacity(indices.len());
        for index in indices {
            let loaded = store.load_member(symbol, run, index, device)?;

            // 所有成员必须基于同一套特征和回看长度训练
            if let Some(expected) = lookback {
                if expected != loaded.meta.lookback {
                    return Err(ForecastError::SchemaMismatch(format!(
                        "member {} lookback {} != {}",
                        index, loaded.meta.lookback, expected
                    )));
                }
            }
            if let Some(expected) = &feature_columns {
                if *expected != loaded.meta.feature_columns {
                    return Err(ForecastError::SchemaMismatch(format!(
                        "member {} feature columns differ",
                        index
                    )));
                }
            }
            lookback = Some(loaded.meta.lookback);
            feature_columns = Some(loaded.meta.feature_columns.clone());
            members.push(loaded.model);
        }

        let predictor = Self::from_parts(
            symbol,
            scaler,
            feature_columns.unwrap_or_default(),
            lookback.unwrap_or_default(),
            members,
        )?;
        info!(
            "Loaded predictor for {} from {} ({} members, lookback {})",
            predictor.symbol,
            run,
            predictor.members.len(),
            predictor.lookback
        );
        Ok(predictor)
    }

    /// 由内存中的组件构建，检查各部分维度一致
    pub fn from_parts(
        symbol: impl Into<String>,
        scaler: MinMaxScaler,
        feature_columns: Vec<String>,
        lookback: usize,
        members: Vec<SequenceModel>,
    ) -> ForecastResult<Self> {
        let symbol = symbol.into();
        if members.is_empty() {
            return Err(ForecastError::ModelNotTrained(symbol));
        }
        if lookback == 0 {
            return Err(ForecastError::InvalidConfig("回看长度必须大于 0".to_string()));
        }

        let state = scaler.state().ok_or(ForecastError::ScalerNotFit)?;
        if state.n_features() != feature_columns.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: feature_columns.len(),
                actual: state.n_features(),
            });
        }
        for model in &members {
            let input_size = model.config().input_size as usize;
            if input_size != feature_columns.len() {
                return Err(ForecastError::DimensionMismatch {
                    expected: feature_columns.len(),
                    actual: input_size,
                });
            }
        }

        Ok(Self {
            symbol,
            scaler,
            feature_columns,
            lookback,
            members,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// 一次推理至少需要的K线数量（预热 + 回看）
    pub fn required_bars(&self) -> usize {
        WARMUP_ROWS + self.lookback
    }

    /// 用最近的K线预测下一期收益率
    pub fn predict(&self, bars: &[Bar], sentiment: &SentimentReading) -> ForecastResult<f64> {
        validate_bars(bars)?;
        if bars.len() < self.required_bars() {
            return Err(ForecastError::InsufficientHistory {
                required: self.required_bars(),
                actual: bars.len(),
            });
        }

        let rows = FeatureEngineer::complete_rows(FeatureEngineer::compute(bars, sentiment)?);
        self.predict_features(&rows)
    }

    /// 用已计算好的完整特征行预测，取最后 L 行构成一个窗口
    pub fn predict_features(&self, rows: &[FeatureRow]) -> ForecastResult<f64> {
        if rows.len() < self.lookback {
            return Err(ForecastError::InsufficientHistory {
                required: self.lookback,
                actual: rows.len(),
            });
        }
        self.check_schema()?;

        let tail = &rows[rows.len() - self.lookback..];
        if tail.iter().any(|row| !row.is_complete()) {
            return Err(ForecastError::InsufficientHistory {
                required: self.lookback,
                actual: tail.iter().filter(|row| row.is_complete()).count(),
            });
        }

        let features = FeatureEngineer::feature_matrix(tail);
        let normalized = self.scaler.transform(features.view())?;
        let window = WindowBuilder::new(self.lookback).last_window(normalized.view())?;

        let mut total = 0.0;
        for model in &self.members {
            let output = model.predict(&window)?;
            total += output.get(0).copied().ok_or_else(|| {
                ForecastError::Training("模型没有输出".to_string())
            })?;
        }
        let predicted = total / self.members.len() as f64;

        debug!(
            "{}: predicted return {:.6} from {} members",
            self.symbol,
            predicted,
            self.members.len()
        );
        Ok(predicted)
    }

    /// 推理特征必须与训练时的列数、列名和顺序完全一致
    fn check_schema(&self) -> ForecastResult<()> {
        let current = FeatureVector::columns();
        if current.len() != self.feature_columns.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.feature_columns.len(),
                actual: current.len(),
            });
        }
        if current != self.feature_columns {
            return Err(ForecastError::SchemaMismatch(format!(
                "trained on {:?}, got {:?}",
                self.feature_columns, current
            )));
        }
        Ok(())
    }
}
