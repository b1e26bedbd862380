//! 时间序列窗口构建

use crate::types::{ForecastError, ForecastResult};
use ndarray::{s, Array1, Array3, ArrayView1, ArrayView2};

/// 回看窗口集合
///
/// - x: (窗口数, 回看长度, 特征数)
/// - y: (窗口数,)
#[derive(Debug, Clone)]
pub struct WindowSet {
    pub x: Array3<f64>,
    pub y: Array1<f64>,
}

impl WindowSet {
    pub fn len(&self) -> usize {
        self.x.shape()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn lookback(&self) -> usize {
        self.x.shape()[1]
    }

    pub fn n_features(&self) -> usize {
        self.x.shape()[2]
    }

    pub fn window(&self, i: usize) -> ArrayView2<'_, f64> {
        self.x.slice(s![i, .., ..])
    }

    pub fn label(&self, i: usize) -> f64 {
        self.y[i]
    }

    /// 按时间顺序切分：前 `n` 个窗口与其余窗口
    pub fn split_at(&self, n: usize) -> (WindowSet, WindowSet) {
        let n = n.min(self.len());
        let head = WindowSet {
            x: self.x.slice(s![..n, .., ..]).to_owned(),
            y: self.y.slice(s![..n]).to_owned(),
        };
        let tail = WindowSet {
            x: self.x.slice(s![n.., .., ..]).to_owned(),
            y: self.y.slice(s![n..]).to_owned(),
        };
        (head, tail)
    }
}

/// 窗口构建器
pub struct WindowBuilder {
    lookback: usize,
}

impl WindowBuilder {
    /// # 参数
    /// - `lookback`: 每个窗口包含的连续行数 L
    pub fn new(lookback: usize) -> Self {
        Self { lookback }
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }

    /// 构建 (窗口, 标签) 对
    ///
    /// window[i] = rows[i .. i + L]，label[i] = target[i + L]，即窗口最后一行之后那一行的目标。
    /// N 行产生 N - L 个窗口，顺序保持时间顺序，不打乱。
    pub fn build(&self, features: ArrayView2<f64>, targets: ArrayView1<f64>) -> ForecastResult<WindowSet> {
        if features.nrows() != targets.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: features.nrows(),
                actual: targets.len(),
            });
        }
        if self.lookback == 0 {
            return Err(ForecastError::InvalidConfig("回看长度必须大于 0".to_string()));
        }

        let n_rows = features.nrows();
        if n_rows < self.lookback + 1 {
            return Err(ForecastError::InsufficientHistory {
                required: self.lookback + 1,
                actual: n_rows,
            });
        }

        let n_windows = n_rows - self.lookback;
        let n_features = features.ncols();

        let mut x = Array3::<f64>::zeros((n_windows, self.lookback, n_features));
        let mut y = Array1::<f64>::zeros(n_windows);

        for i in 0..n_windows {
            x.slice_mut(s![i, .., ..])
                .assign(&features.slice(s![i..i + self.lookback, ..]));
            y[i] = targets[i + self.lookback];
        }

        Ok(WindowSet { x, y })
    }

    /// 取最后 L 行构成单个推理窗口 (1, L, 特征数)
    pub fn last_window(&self, features: ArrayView2<f64>) -> ForecastResult<Array3<f64>> {
        let n_rows = features.nrows();
        if self.lookback == 0 || n_rows < self.lookback {
            return Err(ForecastError::InsufficientHistory {
                required: self.lookback,
                actual: n_rows,
            });
        }

        let window = features.slice(s![n_rows - self.lookback.., ..]).to_owned();
        let n_features = window.ncols();
        window
            .into_shape((1, self.lookback, n_features))
            .map_err(|e| ForecastError::Training(format!("窗口形状转换失败: {}", e)))
    }
}

/// 按时间顺序划分训练/验证窗口数量
///
/// 返回 (训练窗口数, 验证窗口数)，两者都必须大于 0。
pub fn chronological_split(n_windows: usize, validation_ratio: f64) -> ForecastResult<(usize, usize)> {
    check_ratio(validation_ratio)?;

    let (n_train, n_validation) = split_counts(n_windows, validation_ratio);
    if n_train == 0 || n_validation == 0 {
        return Err(ForecastError::InsufficientHistory {
            required: min_split_windows(validation_ratio)?,
            actual: n_windows,
        });
    }

    Ok((n_train, n_validation))
}

/// 两侧都非空所需的最少窗口数
pub fn min_split_windows(validation_ratio: f64) -> ForecastResult<usize> {
    check_ratio(validation_ratio)?;

    // n >= 1/r + 1 时验证侧必然非空，循环有界
    let mut n = 2;
    loop {
        let (n_train, n_validation) = split_counts(n, validation_ratio);
        if n_train > 0 && n_validation > 0 {
            return Ok(n);
        }
        n += 1;
    }
}

fn split_counts(n_windows: usize, validation_ratio: f64) -> (usize, usize) {
    let n_train = (n_windows as f64 * (1.0 - validation_ratio)).floor() as usize;
    (n_train, n_windows.saturating_sub(n_train))
}

fn check_ratio(validation_ratio: f64) -> ForecastResult<()> {
    if validation_ratio > 0.0 && validation_ratio < 1.0 {
        Ok(())
    } else {
        Err(ForecastError::InvalidConfig(format!(
            "验证集比例必须在 (0, 1) 内: {}",
            validation_ratio
        )))
    }
}
