//! Adam 优化器
//!
//! 一阶/二阶矩按变量名保存，便于随检查点一起持久化并在恢复后继续训练。

use crate::types::{ForecastError, ForecastResult};
use tch::{nn, Tensor};

const EXP_AVG: &str = "exp_avg";
const EXP_AVG_SQ: &str = "exp_avg_sq";

struct ParamState {
    name: String,
    param: Tensor,
    exp_avg: Tensor,
    exp_avg_sq: Tensor,
}

pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    step_count: u64,
    params: Vec<ParamState>,
}

impl Adam {
    pub fn new(vs: &nn::VarStore, learning_rate: f64) -> Self {
        let mut variables: Vec<(String, Tensor)> = vs.variables().into_iter().collect();
        variables.sort_by(|a, b| a.0.cmp(&b.0));

        let params = variables
            .into_iter()
            .map(|(name, param)| {
                let (exp_avg, exp_avg_sq) =
                    tch::no_grad(|| (param.zeros_like(), param.zeros_like()));
                ParamState {
                    name,
                    param,
                    exp_avg,
                    exp_avg_sq,
                }
            })
            .collect();

        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            step_count: 0,
            params,
        }
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn zero_grad(&mut self) {
        for state in &mut self.params {
            state.param.zero_grad();
        }
    }

    /// 清零梯度、反向传播并更新参数
    pub fn backward_step(&mut self, loss: &Tensor) -> ForecastResult<()> {
        self.zero_grad();
        loss.f_backward()?;
        self.step()
    }

    /// 按当前梯度更新一次参数，没有梯度的变量跳过
    pub fn step(&mut self) -> ForecastResult<()> {
        self.step_count += 1;
        let t = self.step_count as i32;
        let bias_correction1 = 1.0 - self.beta1.powi(t);
        let bias_correction2 = 1.0 - self.beta2.powi(t);
        let (beta1, beta2, eps, lr) = (self.beta1, self.beta2, self.eps, self.learning_rate);

        tch::no_grad(|| -> ForecastResult<()> {
            for state in &mut self.params {
                let grad = state.param.grad();
                if !grad.defined() {
                    continue;
                }

                let exp_avg = &state.exp_avg * beta1 + &grad * (1.0 - beta1);
                let exp_avg_sq = &state.exp_avg_sq * beta2 + grad.square() * (1.0 - beta2);
                state.exp_avg.f_copy_(&exp_avg)?;
                state.exp_avg_sq.f_copy_(&exp_avg_sq)?;

                let denom = (&exp_avg_sq / bias_correction2).sqrt() + eps;
                let update = (&exp_avg / bias_correction1) / denom * lr;
                let updated = &state.param - update;
                state.param.f_copy_(&updated)?;
            }
            Ok(())
        })
    }

    /// 优化器状态（`exp_avg.<变量名>` / `exp_avg_sq.<变量名>`）
    pub fn named_state(&self) -> Vec<(String, Tensor)> {
        let mut named = Vec::with_capacity(self.params.len() * 2);
        for state in &self.params {
            named.push((format!("{}.{}", EXP_AVG, state.name), state.exp_avg.shallow_clone()));
            named.push((
                format!("{}.{}", EXP_AVG_SQ, state.name),
                state.exp_avg_sq.shallow_clone(),
            ));
        }
        named
    }

    /// 恢复优化器状态，名称必须与当前变量一一对应
    pub fn load_state(&mut self, named: &[(String, Tensor)], step_count: u64) -> ForecastResult<()> {
        if named.len() != self.params.len() * 2 {
            return Err(ForecastError::DimensionMismatch {
                expected: self.params.len() * 2,
                actual: named.len(),
            });
        }

        tch::no_grad(|| -> ForecastResult<()> {
            for state in &mut self.params {
                let exp_avg = find_state(named, &format!("{}.{}", EXP_AVG, state.name))?;
                let exp_avg_sq = find_state(named, &format!("{}.{}", EXP_AVG_SQ, state.name))?;
                state.exp_avg.f_copy_(exp_avg)?;
                state.exp_avg_sq.f_copy_(exp_avg_sq)?;
            }
            Ok(())
        })?;

        self.step_count = step_count;
        Ok(())
    }
}

fn find_state<'a>(named: &'a [(String, Tensor)], key: &str) -> ForecastResult<&'a Tensor> {
    named
        .iter()
        .find(|(name, _)| name == key)
        .map(|(_, t)| t)
        .ok_or_else(|| ForecastError::SchemaMismatch(format!("缺少优化器状态: {}", key)))
}
