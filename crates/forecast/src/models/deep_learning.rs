//! 堆叠 LSTM 回归模型
//!
//! 使用 tch-rs (PyTorch bindings for Rust) 实现

use crate::types::{ForecastError, ForecastResult};
use ndarray::{Array1, Array3};
use serde::{Deserialize, Serialize};
use tch::nn::{self, Module, RNN};
use tch::{Device, Kind, Tensor};

/// 序列模型配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceConfig {
    pub input_size: i64,
    pub hidden_size: i64,
    pub num_layers: i64,
    pub dense_size: i64,
    pub dropout: f64,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            input_size: 13,
            hidden_size: 100,
            num_layers: 3,
            dense_size: 25,
            dropout: 0.2,
        }
    }
}

impl SequenceConfig {
    pub fn validate(&self) -> ForecastResult<()> {
        if self.input_size <= 0 || self.hidden_size <= 0 || self.dense_size <= 0 {
            return Err(ForecastError::InvalidConfig(
                "input_size / hidden_size / dense_size 必须为正".to_string(),
            ));
        }
        if self.num_layers <= 0 {
            return Err(ForecastError::InvalidConfig("num_layers 必须为正".to_string()));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ForecastError::InvalidConfig(format!(
                "dropout 必须在 [0, 1) 内: {}",
                self.dropout
            )));
        }
        Ok(())
    }
}

/// 堆叠 LSTM 网络
///
/// LSTM × num_layers → 最后时间步隐状态 → dropout → Linear(dense) + ReLU → Linear(1)
pub struct SequenceModel {
    config: SequenceConfig,
    vs: nn::VarStore,
    layers: Vec<nn::LSTM>,
    dense: nn::Linear,
    output: nn::Linear,
}

impl std::fmt::Debug for SequenceModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceModel")
            .field("config", &self.config)
            .field("device", &self.vs.device())
            .finish()
    }
}

impl SequenceModel {
    pub fn new(config: SequenceConfig, device: Device) -> ForecastResult<Self> {
        config.validate()?;

        let vs = nn::VarStore::new(device);
        let (layers, dense, output) = {
            let root = vs.root();

            // 每层单独构建，层间 dropout 由 forward 根据训练/推理模式控制
            let layers = (0..config.num_layers)
                .map(|i| {
                    let input_size = if i == 0 {
                        config.input_size
                    } else {
                        config.hidden_size
                    };
                    nn::lstm(
                        &root / format!("lstm_{}", i),
                        input_size,
                        config.hidden_size,
                        nn::RNNConfig {
                            num_layers: 1,
                            dropout: 0.0,
                            batch_first: true,
                            ..Default::default()
                        },
                    )
                })
                .collect::<Vec<_>>();

            let dense = nn::linear(
                &root / "dense",
                config.hidden_size,
                config.dense_size,
                Default::default(),
            );
            let output = nn::linear(&root / "output", config.dense_size, 1, Default::default());

            (layers, dense, output)
        };

        Ok(Self {
            config,
            vs,
            layers,
            dense,
            output,
        })
    }

    pub fn config(&self) -> &SequenceConfig {
        &self.config
    }

    pub fn device(&self) -> Device {
        self.vs.device()
    }

    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    /// 前向传播
    ///
    /// input shape: [batch_size, seq_len, input_size]，输出 [batch_size, 1]。
    /// `train = false` 时不使用 dropout，结果确定。
    pub fn forward_t(&self, input: &Tensor, train: bool) -> Tensor {
        let mut hidden = input.shallow_clone();
        for (i, layer) in self.layers.iter().enumerate() {
            let (out, _) = layer.seq(&hidden);
            hidden = if i + 1 < self.layers.len() {
                out.dropout(self.config.dropout, train)
            } else {
                out
            };
        }

        // 取最后一个时间步的输出
        let last_output = hidden.select(1, -1).dropout(self.config.dropout, train);

        self.dense.forward(&last_output).relu().apply(&self.output)
    }

    /// 推理模式预测，返回每个窗口的标量输出
    pub fn predict(&self, windows: &Array3<f64>) -> ForecastResult<Array1<f64>> {
        let n_features = windows.shape()[2];
        if n_features as i64 != self.config.input_size {
            return Err(ForecastError::DimensionMismatch {
                expected: self.config.input_size as usize,
                actual: n_features,
            });
        }

        let x = array3_to_tensor(windows, self.device())?;
        let predictions = tch::no_grad(|| self.forward_t(&x, false));
        tensor_to_array1(&predictions)
    }

    /// 按名称排序的权重（浅拷贝，共享存储）
    pub fn named_weights(&self) -> Vec<(String, Tensor)> {
        let mut named: Vec<(String, Tensor)> = self.vs.variables().into_iter().collect();
        named.sort_by(|a, b| a.0.cmp(&b.0));
        named
    }

    /// 按名称拷贝权重，缺失任何变量都会报错
    pub fn load_weights(&mut self, named: &[(String, Tensor)]) -> ForecastResult<()> {
        let mut variables = self.vs.variables();
        if named.len() != variables.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: variables.len(),
                actual: named.len(),
            });
        }

        tch::no_grad(|| -> ForecastResult<()> {
            for (name, value) in named {
                let var = variables.get_mut(name).ok_or_else(|| {
                    ForecastError::SchemaMismatch(format!("未知的权重: {}", name))
                })?;
                if var.size() != value.size() {
                    return Err(ForecastError::SchemaMismatch(format!(
                        "权重 {} 形状不一致: {:?} vs {:?}",
                        name,
                        var.size(),
                        value.size()
                    )));
                }
                var.f_copy_(value)?;
            }
            Ok(())
        })
    }

    /// 深拷贝当前权重
    pub fn snapshot(&self) -> Vec<(String, Tensor)> {
        self.named_weights()
            .into_iter()
            .map(|(name, t)| (name, t.detach().copy()))
            .collect()
    }
}

pub(crate) fn array3_to_tensor(arr: &Array3<f64>, device: Device) -> ForecastResult<Tensor> {
    let shape = arr.shape();
    let data: Vec<f32> = arr.iter().map(|&v| v as f32).collect();

    Ok(Tensor::from_slice(&data)
        .f_view([shape[0] as i64, shape[1] as i64, shape[2] as i64])?
        .to_device(device))
}

pub(crate) fn array1_to_tensor(arr: &Array1<f64>, device: Device) -> ForecastResult<Tensor> {
    let data: Vec<f32> = arr.iter().map(|&v| v as f32).collect();

    Ok(Tensor::from_slice(&data)
        .f_view([arr.len() as i64, 1])?
        .to_device(device))
}

pub(crate) fn tensor_to_array1(tensor: &Tensor) -> ForecastResult<Array1<f64>> {
    let flat = tensor
        .to_device(Device::Cpu)
        .to_kind(Kind::Double)
        .f_view([-1])?;
    let data = Vec::<f64>::try_from(&flat)?;
    Ok(Array1::from_vec(data))
}
