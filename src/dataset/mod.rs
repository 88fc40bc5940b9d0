//! 数据集处理
//!
//! 目前只有仿真数据：沿直线运动的相机组观测一片随机路标点，带有真值。
mod synthetic;

pub use synthetic::{corrupt_landmark_positions, SyntheticDataset, SyntheticDatasetConfig, SyntheticScene};

use crate::error::Result;
use crate::vi_map::ViMap;

pub type DefaultDataset = synthetic::SyntheticDataset;
pub trait DatasetTrait {
    /// 构建地图，路标点已三角化且质量为 Unknown
    fn build_map(&self) -> Result<ViMap>;
}
