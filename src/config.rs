//! 配置
//!
//! 所有阈值都通过显式的配置结构传入，不使用全局变量。缺省字段由 `#[serde(default)]` 补齐。

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::dataset::SyntheticDatasetConfig;
use crate::error::Error;

/// 最小观测夹角（度）
pub const MIN_OBSERVATION_ANGLE_DEG: f64 = 5.0;
/// 最少观测数量
pub const MIN_OBSERVERS: usize = 4;
/// 到最近观测者的最大距离（米）
pub const MAX_DISTANCE_FROM_CLOSEST_OBSERVER: f64 = 40.0;
/// 到最近观测者的最小距离（米）
pub const MIN_DISTANCE_FROM_CLOSEST_OBSERVER: f64 = 0.05;
/// 像素噪声标准差
pub const PIXEL_SIGMA: f64 = 0.7;

/// 路标点质量评估阈值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LandmarkQualityConfig {
    pub min_observation_angle_deg: f64,
    pub min_observers: usize,
    pub max_distance_from_closest_observer: f64,
    pub min_distance_from_closest_observer: f64,
}

impl Default for LandmarkQualityConfig {
    fn default() -> Self {
        Self {
            min_observation_angle_deg: MIN_OBSERVATION_ANGLE_DEG,
            min_observers: MIN_OBSERVERS,
            max_distance_from_closest_observer: MAX_DISTANCE_FROM_CLOSEST_OBSERVER,
            min_distance_from_closest_observer: MIN_DISTANCE_FROM_CLOSEST_OBSERVER,
        }
    }
}

impl LandmarkQualityConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.min_observers == 0 {
            return Err(Error::InvalidConfig("min_observers must be >= 1".into()));
        }
        if !(self.min_observation_angle_deg >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "min_observation_angle_deg must be non-negative, got {}",
                self.min_observation_angle_deg
            )));
        }
        if !(self.min_distance_from_closest_observer <= self.max_distance_from_closest_observer) {
            return Err(Error::InvalidConfig(format!(
                "distance bounds [{}, {}] are empty",
                self.min_distance_from_closest_observer, self.max_distance_from_closest_observer
            )));
        }
        Ok(())
    }
}

/// 重投影误差项配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualErrorConfig {
    pub pixel_sigma: f64,
    /// 相机外参不作为优化参数块
    pub fix_extrinsics: bool,
}

impl Default for VisualErrorConfig {
    fn default() -> Self {
        Self {
            pixel_sigma: PIXEL_SIGMA,
            fix_extrinsics: true,
        }
    }
}

/// 并行处理配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// 即使数据量很小也使用多线程
    pub always_parallelize: bool,
    /// 线程数，`None` 表示使用硬件线程数
    pub num_threads: Option<usize>,
}

impl ParallelConfig {
    pub fn single_threaded() -> Self {
        Self {
            always_parallelize: false,
            num_threads: Some(1),
        }
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
            .unwrap_or_else(crate::parallel::num_hardware_threads)
            .max(1)
    }
}

/// 路标点扰动配置，用于重新三角化的演示
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorruptionConfig {
    pub position_std_dev: f64,
    pub every_nth: usize,
    pub seed: u64,
}

impl Default for CorruptionConfig {
    fn default() -> Self {
        Self {
            position_std_dev: 5.0,
            every_nth: 1,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub landmark_quality: LandmarkQualityConfig,
    pub visual_error: VisualErrorConfig,
    pub parallel: ParallelConfig,
    pub dataset: SyntheticDatasetConfig,
    pub corruption: CorruptionConfig,
}

impl Config {
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.landmark_quality.validate()?;
        if !(config.visual_error.pixel_sigma > 0.0) {
            anyhow::bail!("pixel_sigma must be positive");
        }
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_json_str(&json).with_context(|| format!("invalid config {}", path.display()))
    }
}
