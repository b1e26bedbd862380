//! 检查点持久化
//!
//! 目录结构：
//!
//! ```text
//! <root>/<SYMBOL>/current.json
//! <root>/<SYMBOL>/run-<id>/scaler.json
//! <root>/<SYMBOL>/run-<id>/member-<i>/checkpoint.json
//! <root>/<SYMBOL>/run-<id>/member-<i>/weights-<epoch>.ot
//! <root>/<SYMBOL>/run-<id>/member-<i>/optimizer-<epoch>.ot
//! ```
//!
//! 每次训练写入一个新的 `run-<id>` 目录。所有成员成功后才原子替换 `current.json`，
//! 推理只读取它指向的那一次训练，缩放器和各成员权重因此总是来自同一次训练。
//! 失败或中断的训练目录不会被引用，下次提交时清理。
//!
//! 所有文件先写入同目录下的临时文件再原子重命名。成员目录内 `checkpoint.json` 最后写入，
//! 它引用的权重文件才算提交；提交后删除旧 epoch 的文件。

use crate::models::{Adam, SequenceConfig, SequenceModel};
use crate::preprocessing::ScalerState;
use crate::training::{Checkpoint, CheckpointSink};
use crate::types::{ForecastError, ForecastResult};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tch::{Device, Tensor};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

const SCALER_FILE: &str = "scaler.json";
const CHECKPOINT_FILE: &str = "checkpoint.json";
const CURRENT_FILE: &str = "current.json";
const MEMBER_PREFIX: &str = "member-";
const RUN_PREFIX: &str = "run-";

/// 检查点元数据（提交记录）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub epoch: usize,
    pub training_loss: f64,
    pub validation_loss: f64,
    pub optimizer_step: u64,
    pub model: SequenceConfig,
    pub lookback: usize,
    pub feature_columns: Vec<String>,
    pub weights_file: String,
    pub optimizer_file: String,
    pub saved_at: DateTime<Utc>,
}

/// `current.json`：当前生效的训练
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommittedRun {
    pub run: String,
    pub members: usize,
    pub committed_at: DateTime<Utc>,
}

/// 从磁盘恢复的集成成员
pub struct LoadedMember {
    pub meta: CheckpointMeta,
    pub model: SequenceModel,
    dir: PathBuf,
}

impl LoadedMember {
    /// 恢复优化器状态，用于继续训练
    pub fn restore_optimizer(&self, optimizer: &mut Adam) -> ForecastResult<()> {
        let named = Tensor::load_multi_with_device(
            self.dir.join(&self.meta.optimizer_file),
            self.model.device(),
        )?;
        optimizer.load_state(&named, self.meta.optimizer_step)
    }
}

/// 按股票代码组织的检查点存储
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    root: PathBuf,
}

impl CheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 代码统一转为大写，只允许字母、数字和 `.` `-` `_`
    pub fn symbol_dir(&self, symbol: &str) -> ForecastResult<PathBuf> {
        let symbol = normalize_symbol(symbol)?;
        Ok(self.root.join(symbol))
    }

    pub fn run_dir(&self, symbol: &str, run: &str) -> ForecastResult<PathBuf> {
        if !is_run_name(run) {
            return Err(ForecastError::InvalidConfig(format!("无效的训练编号: {:?}", run)));
        }
        Ok(self.symbol_dir(symbol)?.join(run))
    }

    pub fn member_dir(&self, symbol: &str, run: &str, member: usize) -> ForecastResult<PathBuf> {
        Ok(self
            .run_dir(symbol, run)?
            .join(format!("{}{}", MEMBER_PREFIX, member)))
    }

    /// 创建一个新的、尚未生效的训练目录
    pub fn begin_run(&self, symbol: &str) -> ForecastResult<String> {
        let dir = self.symbol_dir(symbol)?;
        fs::create_dir_all(&dir)?;

        let stamp = Utc::now().format("%Y%m%dT%H%M%S%6f").to_string();
        let mut attempt = 0usize;
        loop {
            let run = if attempt == 0 {
                format!("{}{}", RUN_PREFIX, stamp)
            } else {
                format!("{}{}-{}", RUN_PREFIX, stamp, attempt)
            };
            match fs::create_dir(dir.join(&run)) {
                Ok(()) => {
                    debug!("Staging training run {} for {}", run, symbol);
                    return Ok(run);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// 当前生效的训练，从未提交过时为 `None`
    pub fn current_run(&self, symbol: &str) -> ForecastResult<Option<CommittedRun>> {
        let path = self.symbol_dir(symbol)?.join(CURRENT_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let committed: CommittedRun = read_json(&path)?;
        if !is_run_name(&committed.run) {
            return Err(ForecastError::SchemaMismatch(format!(
                "current.json 指向无效的训练: {:?}",
                committed.run
            )));
        }
        Ok(Some(committed))
    }

    /// 确认缩放器和 `0..members` 全部成员都已写入后，原子切换 `current.json`
    ///
    /// 切换后删除其他训练目录。
    pub fn commit_run(&self, symbol: &str, run: &str, members: usize) -> ForecastResult<CommittedRun> {
        if !self.run_dir(symbol, run)?.join(SCALER_FILE).exists() {
            return Err(ForecastError::ScalerNotFit);
        }
        let written = self.members(symbol, run)?;
        if members == 0 || written != (0..members).collect::<Vec<_>>() {
            return Err(ForecastError::Training(format!(
                "run {} has members {:?}, expected {}",
                run, written, members
            )));
        }

        let committed = CommittedRun {
            run: run.to_string(),
            members,
            committed_at: Utc::now(),
        };
        write_json_atomic(&self.symbol_dir(symbol)?, CURRENT_FILE, &committed)?;
        info!("Committed run {} for {} ({} members)", run, symbol, members);

        self.remove_other_runs(symbol, run)?;
        Ok(committed)
    }

    /// 删除未提交的训练目录
    pub fn discard_run(&self, symbol: &str, run: &str) -> ForecastResult<()> {
        if let Some(committed) = self.current_run(symbol)? {
            if committed.run == run {
                return Err(ForecastError::InvalidConfig(format!(
                    "run {} is committed and cannot be discarded",
                    run
                )));
            }
        }
        let dir = self.run_dir(symbol, run)?;
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
            info!("Discarded run {} for {}", run, symbol);
        }
        Ok(())
    }

    pub fn save_scaler(&self, symbol: &str, run: &str, state: &ScalerState) -> ForecastResult<()> {
        let dir = self.run_dir(symbol, run)?;
        fs::create_dir_all(&dir)?;
        write_json_atomic(&dir, SCALER_FILE, state)?;
        debug!("Saved scaler for {} ({} features)", symbol, state.n_features());
        Ok(())
    }

    /// 没有缩放器时返回 `ModelNotTrained`
    pub fn load_scaler(&self, symbol: &str, run: &str) -> ForecastResult<ScalerState> {
        let path = self.run_dir(symbol, run)?.join(SCALER_FILE);
        if !path.exists() {
            return Err(ForecastError::ModelNotTrained(symbol.to_string()));
        }
        let state: ScalerState = read_json(&path)?;
        state.validate()?;
        Ok(state)
    }

    /// 写入一个成员的检查点
    pub fn save_member(
        &self,
        symbol: &str,
        run: &str,
        member: usize,
        checkpoint: &Checkpoint<'_>,
        lookback: usize,
        feature_columns: &[String],
    ) -> ForecastResult<CheckpointMeta> {
        let dir = self.member_dir(symbol, run, member)?;
        fs::create_dir_all(&dir)?;

        let epoch = checkpoint.losses.epoch;
        let weights_file = format!("weights-{:04}.ot", epoch);
        let optimizer_file = format!("optimizer-{:04}.ot", epoch);

        write_tensors_atomic(&dir, &weights_file, &checkpoint.model.named_weights())?;
        write_tensors_atomic(&dir, &optimizer_file, &checkpoint.optimizer.named_state())?;

        let meta = CheckpointMeta {
            epoch,
            training_loss: checkpoint.losses.training_loss,
            validation_loss: checkpoint.losses.validation_loss,
            optimizer_step: checkpoint.optimizer.step_count(),
            model: checkpoint.model.config().clone(),
            lookback,
            feature_columns: feature_columns.to_vec(),
            weights_file,
            optimizer_file,
            saved_at: Utc::now(),
        };
        write_json_atomic(&dir, CHECKPOINT_FILE, &meta)?;

        remove_superseded(&dir, &meta)?;

        debug!(
            "Checkpoint {} {} member {} epoch {} val_loss {:.6}",
            symbol, run, member, epoch, meta.validation_loss
        );
        Ok(meta)
    }

    pub fn load_meta(&self, symbol: &str, run: &str, member: usize) -> ForecastResult<CheckpointMeta> {
        let path = self.member_dir(symbol, run, member)?.join(CHECKPOINT_FILE);
        if !path.exists() {
            return Err(ForecastError::ModelNotTrained(format!(
                "{} member {}",
                symbol, member
            )));
        }
        read_json(&path)
    }

    /// 加载一个成员的模型与元数据
    pub fn load_member(
        &self,
        symbol: &str,
        run: &str,
        member: usize,
        device: Device,
    ) -> ForecastResult<LoadedMember> {
        let meta = self.load_meta(symbol, run, member)?;
        let dir = self.member_dir(symbol, run, member)?;

        let mut model = SequenceModel::new(meta.model.clone(), device)?;
        let weights = Tensor::load_multi_with_device(dir.join(&meta.weights_file), device)?;
        model.load_weights(&weights)?;

        Ok(LoadedMember { meta, model, dir })
    }

    /// 某次训练中已提交检查点的成员编号（升序）
    pub fn members(&self, symbol: &str, run: &str) -> ForecastResult<Vec<usize>> {
        let dir = self.run_dir(symbol, run)?;
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut members = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(index) = name
                .to_str()
                .and_then(|n| n.strip_prefix(MEMBER_PREFIX))
                .and_then(|n| n.parse::<usize>().ok())
            else {
                continue;
            };
            if entry.path().join(CHECKPOINT_FILE).exists() {
                members.push(index);
            }
        }
        members.sort_unstable();
        Ok(members)
    }

    /// 有已提交训练的股票代码
    pub fn trained_symbols(&self) -> ForecastResult<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut symbols = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(symbol) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if normalize_symbol(&symbol).is_err() {
                continue;
            }
            match self.current_run(&symbol) {
                Ok(Some(committed)) if self.run_dir(&symbol, &committed.run)?.exists() => {
                    symbols.push(symbol)
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping {} with unreadable current.json: {}", symbol, e),
            }
        }
        symbols.sort();
        Ok(symbols)
    }

    fn remove_other_runs(&self, symbol: &str, keep: &str) -> ForecastResult<()> {
        for entry in fs::read_dir(self.symbol_dir(symbol)?)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !is_run_name(name) || name == keep || !entry.file_type()?.is_dir() {
                continue;
            }
            match fs::remove_dir_all(entry.path()) {
                Ok(()) => debug!("Removed stale run {} for {}", name, symbol),
                Err(e) => warn!("Failed to remove stale run {} for {}: {}", name, symbol, e),
            }
        }
        Ok(())
    }
}

/// 把一个集成成员的检查点写入某次训练
pub struct MemberCheckpointer {
    store: CheckpointStore,
    symbol: String,
    run: String,
    member: usize,
    lookback: usize,
    feature_columns: Vec<String>,
    last_saved: Option<CheckpointMeta>,
}

impl MemberCheckpointer {
    pub fn new(
        store: CheckpointStore,
        symbol: impl Into<String>,
        run: impl Into<String>,
        member: usize,
        lookback: usize,
        feature_columns: Vec<String>,
    ) -> Self {
        Self {
            store,
            symbol: symbol.into(),
            run: run.into(),
            member,
            lookback,
            feature_columns,
            last_saved: None,
        }
    }

    pub fn last_saved(&self) -> Option<&CheckpointMeta> {
        self.last_saved.as_ref()
    }
}

impl CheckpointSink for MemberCheckpointer {
    fn save(&mut self, checkpoint: &Checkpoint<'_>) -> ForecastResult<()> {
        let meta = self.store.save_member(
            &self.symbol,
            &self.run,
            self.member,
            checkpoint,
            self.lookback,
            &self.feature_columns,
        )?;
        self.last_saved = Some(meta);
        Ok(())
    }
}

fn normalize_symbol(symbol: &str) -> ForecastResult<String> {
    let symbol = symbol.trim().to_uppercase();
    let valid = !symbol.is_empty()
        && !symbol.starts_with('.')
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '^'));
    if !valid {
        return Err(ForecastError::InvalidConfig(format!(
            "无效的股票代码: {:?}",
            symbol
        )));
    }
    Ok(symbol)
}

fn is_run_name(name: &str) -> bool {
    name.strip_prefix(RUN_PREFIX).is_some_and(|id| {
        !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

fn write_json_atomic<T: Serialize>(dir: &Path, file_name: &str, value: &T) -> ForecastResult<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(dir.join(file_name)).map_err(|e| e.error)?;
    Ok(())
}

fn write_tensors_atomic(
    dir: &Path,
    file_name: &str,
    named: &[(String, Tensor)],
) -> ForecastResult<()> {
    let tmp = NamedTempFile::new_in(dir)?;
    Tensor::save_multi(named, tmp.path())?;
    tmp.as_file().sync_all()?;
    tmp.persist(dir.join(file_name)).map_err(|e| e.error)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> ForecastResult<T> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// 删除未被当前提交记录引用的权重/优化器文件
fn remove_superseded(dir: &Path, meta: &CheckpointMeta) -> ForecastResult<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let is_tensor_file =
            (name.starts_with("weights-") || name.starts_with("optimizer-")) && name.ends_with(".ot");
        if is_tensor_file && name != meta.weights_file && name != meta.optimizer_file {
            if let Err(e) = fs::remove_file(entry.path()) {
                warn!("Failed to remove superseded checkpoint file {}: {}", name, e);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::EpochLosses;
    use ndarray::{array, Array3};
    use tempfile::tempdir;

    fn tiny_model() -> SequenceModel {
        SequenceModel::new(
            SequenceConfig {
                input_size: 2,
                hidden_size: 4,
                num_layers: 1,
                dense_size: 3,
                dropout: 0.0,
            },
            Device::Cpu,
        )
        .unwrap()
    }

    fn columns() -> Vec<String> {
        vec!["a".to_string(), "b".to_string()]
    }

    fn losses(epoch: usize, validation_loss: f64) -> EpochLosses {
        EpochLosses {
            epoch,
            training_loss: 0.5,
            validation_loss,
        }
    }

    fn unit_state() -> ScalerState {
        ScalerState {
            min: array![0.0, 0.0],
            max: array![1.0, 1.0],
        }
    }

    /// 写入缩放器和 `members` 个成员并提交
    fn committed_run(store: &CheckpointStore, symbol: &str, state: &ScalerState, members: usize) -> String {
        let model = tiny_model();
        let optimizer = Adam::new(model.var_store(), 0.01);
        let run = store.begin_run(symbol).unwrap();
        store.save_scaler(symbol, &run, state).unwrap();
        for member in 0..members {
            let checkpoint = Checkpoint {
                losses: losses(0, 0.1),
                model: &model,
                optimizer: &optimizer,
            };
            store
                .save_member(symbol, &run, member, &checkpoint, 5, &columns())
                .unwrap();
        }
        store.commit_run(symbol, &run, members).unwrap();
        run
    }

    #[test]
    fn test_scaler_round_trip() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let state = ScalerState {
            min: array![0.0, 1.0],
            max: array![2.0, 3.0],
        };
        let run = store.begin_run("aapl").unwrap();

        assert!(matches!(
            store.load_scaler("aapl", &run),
            Err(ForecastError::ModelNotTrained(_))
        ));
        store.save_scaler("aapl", &run, &state).unwrap();
        assert_eq!(store.load_scaler("AAPL", &run).unwrap(), state);
        assert!(dir.path().join("AAPL").join(&run).join("scaler.json").exists());
    }

    #[test]
    fn test_truncated_scaler_rejected() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let run = store.begin_run("AAPL").unwrap();
        fs::write(
            store.run_dir("AAPL", &run).unwrap().join(SCALER_FILE),
            r#"{"min":{"v":1,"dim":[2],"data":[0.0,1.0]},"max":{"v":1,"dim":[1],"data":[2.0]}}"#,
        )
        .unwrap();

        let err = store.load_scaler("AAPL", &run).unwrap_err();
        assert_eq!(err.kind(), "dimension_mismatch");
    }

    #[test]
    fn test_member_checkpoint_round_trip() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let model = tiny_model();
        let optimizer = Adam::new(model.var_store(), 0.01);
        let run = store.begin_run("MSFT").unwrap();

        let checkpoint = Checkpoint {
            losses: losses(3, 0.25),
            model: &model,
            optimizer: &optimizer,
        };
        let meta = store
            .save_member("MSFT", &run, 0, &checkpoint, 5, &columns())
            .unwrap();
        assert_eq!(meta.weights_file, "weights-0003.ot");

        let loaded = store.load_member("MSFT", &run, 0, Device::Cpu).unwrap();
        assert_eq!(loaded.meta.epoch, 3);
        assert_eq!(loaded.meta.lookback, 5);
        assert_eq!(loaded.meta.feature_columns, columns());

        let windows = Array3::from_shape_fn((2, 5, 2), |(i, t, f)| (i + t + f) as f64 * 0.1);
        assert_eq!(
            model.predict(&windows).unwrap(),
            loaded.model.predict(&windows).unwrap()
        );

        let mut restored = Adam::new(loaded.model.var_store(), 0.01);
        loaded.restore_optimizer(&mut restored).unwrap();
        assert_eq!(restored.step_count(), optimizer.step_count());
    }

    #[test]
    fn test_superseded_files_removed() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let model = tiny_model();
        let optimizer = Adam::new(model.var_store(), 0.01);
        let run = store.begin_run("SPY").unwrap();

        for (epoch, loss) in [(0, 0.9), (4, 0.5)] {
            let checkpoint = Checkpoint {
                losses: losses(epoch, loss),
                model: &model,
                optimizer: &optimizer,
            };
            store
                .save_member("SPY", &run, 1, &checkpoint, 5, &columns())
                .unwrap();
        }

        let member_dir = store.member_dir("SPY", &run, 1).unwrap();
        let mut files: Vec<String> = fs::read_dir(&member_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        assert_eq!(
            files,
            vec!["checkpoint.json", "optimizer-0004.ot", "weights-0004.ot"]
        );
        assert_eq!(store.load_meta("SPY", &run, 1).unwrap().epoch, 4);
    }

    #[test]
    fn test_commit_switches_current_run() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        assert!(store.current_run("TSLA").unwrap().is_none());

        let first = committed_run(&store, "TSLA", &unit_state(), 2);
        let current = store.current_run("tsla").unwrap().unwrap();
        assert_eq!(current.run, first);
        assert_eq!(current.members, 2);

        let second = committed_run(&store, "TSLA", &unit_state(), 1);
        assert_ne!(first, second);
        assert_eq!(store.current_run("TSLA").unwrap().unwrap().run, second);
        assert!(!store.run_dir("TSLA", &first).unwrap().exists());
        assert_eq!(store.members("TSLA", &second).unwrap(), vec![0]);
    }

    #[test]
    fn test_abandoned_run_leaves_committed_state() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let old_state = unit_state();
        let committed = committed_run(&store, "NVDA", &old_state, 1);

        // 新缩放器已写入，但成员从未完成
        let staged = store.begin_run("NVDA").unwrap();
        let new_state = ScalerState {
            min: array![-5.0, -5.0],
            max: array![5.0, 5.0],
        };
        store.save_scaler("NVDA", &staged, &new_state).unwrap();
        assert!(store.commit_run("NVDA", &staged, 1).is_err());

        let current = store.current_run("NVDA").unwrap().unwrap();
        assert_eq!(current.run, committed);
        assert_eq!(store.load_scaler("NVDA", &current.run).unwrap(), old_state);

        store.discard_run("NVDA", &staged).unwrap();
        assert!(!store.run_dir("NVDA", &staged).unwrap().exists());
        assert!(store.discard_run("NVDA", &committed).is_err());
    }

    #[test]
    fn test_commit_requires_every_member() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let model = tiny_model();
        let optimizer = Adam::new(model.var_store(), 0.01);
        let run = store.begin_run("AMD").unwrap();

        assert!(matches!(
            store.commit_run("AMD", &run, 1),
            Err(ForecastError::ScalerNotFit)
        ));

        store.save_scaler("AMD", &run, &unit_state()).unwrap();
        let checkpoint = Checkpoint {
            losses: losses(0, 0.1),
            model: &model,
            optimizer: &optimizer,
        };
        store
            .save_member("AMD", &run, 1, &checkpoint, 5, &columns())
            .unwrap();
        assert_eq!(store.commit_run("AMD", &run, 2).unwrap_err().kind(), "training");
        assert!(store.current_run("AMD").unwrap().is_none());
    }

    #[test]
    fn test_trained_symbols() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        assert!(store.trained_symbols().unwrap().is_empty());

        // 只有未提交的训练
        let staged = store.begin_run("QQQ").unwrap();
        store.save_scaler("QQQ", &staged, &unit_state()).unwrap();
        committed_run(&store, "TSLA", &unit_state(), 1);

        assert_eq!(store.trained_symbols().unwrap(), vec!["TSLA".to_string()]);
    }

    #[test]
    fn test_member_checkpointer_sink() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        let model = tiny_model();
        let optimizer = Adam::new(model.var_store(), 0.01);
        let run = store.begin_run("IBM").unwrap();

        let mut sink = MemberCheckpointer::new(store.clone(), "ibm", run.clone(), 0, 5, columns());
        sink.save(&Checkpoint {
            losses: losses(2, 0.3),
            model: &model,
            optimizer: &optimizer,
        })
        .unwrap();

        assert_eq!(sink.last_saved().unwrap().epoch, 2);
        assert_eq!(store.members("IBM", &run).unwrap(), vec![0]);
    }

    #[test]
    fn test_rejects_path_like_names() {
        let store = CheckpointStore::new("models");
        assert!(store.symbol_dir("../etc").is_err());
        assert!(store.symbol_dir("").is_err());
        assert!(store.symbol_dir("BRK.B").is_ok());
        assert!(store.run_dir("SPY", "../SPY").is_err());
        assert!(store.run_dir("SPY", "run-").is_err());
        assert!(store.run_dir("SPY", "run-20240101T000000000001-2").is_ok());
    }
}
