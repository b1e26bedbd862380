//! 深度学习模型模块

pub mod deep_learning;
pub mod optimizer;

pub use deep_learning::{SequenceConfig, SequenceModel};
pub use optimizer::Adam;
