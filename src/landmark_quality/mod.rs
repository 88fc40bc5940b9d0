//! 路标点质量评估
//!
//! 根据观测数量、到最近观测者的距离以及观测夹角判断路标点是否被良好约束。
//! 阈值通过 [LandmarkQualityConfig] 显式传入。

mod metrics;
pub use metrics::LandmarkQualityMetrics;

use std::collections::HashSet;

use crate::config::{LandmarkQualityConfig, ParallelConfig};
use crate::global_types::MissionId;
use crate::parallel::parallel_process_mut;
use crate::vi_map::{Landmark, PoseGraphView, Quality, ViMap};

/// 评估单个路标点，不修改地图
pub fn evaluate_landmark_quality(
    pose_graph: &PoseGraphView<'_>,
    landmark: &Landmark,
    config: &LandmarkQualityConfig,
) -> Quality {
    LandmarkQualityMetrics::compute(pose_graph, landmark).classify(config)
}

/// 路标点是否被良好约束。
///
/// `re_evaluate` 为 `false` 且已有 Good/Bad 标签时直接使用缓存的标签。
pub fn is_landmark_well_constrained(
    map: &ViMap,
    landmark: &Landmark,
    config: &LandmarkQualityConfig,
    re_evaluate: bool,
) -> bool {
    if !re_evaluate && landmark.quality() != Quality::Unknown {
        return landmark.quality() == Quality::Good;
    }
    evaluate_landmark_quality(&map.pose_graph(), landmark, config) == Quality::Good
}

/// 各质量标签的数量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QualitySummary {
    pub num_unknown: usize,
    pub num_good: usize,
    pub num_bad: usize,
}

impl QualitySummary {
    pub fn from_landmarks<'a>(landmarks: impl IntoIterator<Item = &'a Landmark>) -> Self {
        let mut summary = Self::default();
        for landmark in landmarks {
            match landmark.quality() {
                Quality::Unknown => summary.num_unknown += 1,
                Quality::Good => summary.num_good += 1,
                Quality::Bad => summary.num_bad += 1,
            }
        }
        summary
    }

    pub fn of_map(map: &ViMap) -> Self {
        Self::from_landmarks(map.landmarks())
    }

    pub fn total(&self) -> usize {
        self.num_unknown + self.num_good + self.num_bad
    }
}

/// 批量评估路标点质量
#[derive(Debug, Clone, Default)]
pub struct LandmarkQualityEvaluator {
    config: LandmarkQualityConfig,
    parallel: ParallelConfig,
}

impl LandmarkQualityEvaluator {
    pub fn new(config: LandmarkQualityConfig, parallel: ParallelConfig) -> Self {
        Self { config, parallel }
    }

    pub fn config(&self) -> &LandmarkQualityConfig {
        &self.config
    }

    /// 评估给定任务中的所有路标点，结果写回地图。返回这些任务中各标签的数量。
    pub fn evaluate_missions(&self, map: &mut ViMap, mission_ids: &[MissionId]) -> QualitySummary {
        let missions = checked_mission_set(map, mission_ids);
        let config = &self.config;
        let (pose_graph, landmarks) = map.split_landmarks_mut();
        log::info!(
            "Evaluating quality of landmarks in {} missions",
            missions.len()
        );
        parallel_process_mut(
            landmarks,
            |_, landmark| {
                if missions.contains(&landmark.mission_id()) {
                    let quality = evaluate_landmark_quality(&pose_graph, landmark, config);
                    landmark.set_quality(quality);
                }
            },
            self.parallel.always_parallelize,
            self.parallel.num_threads(),
        );

        let summary = QualitySummary::from_landmarks(
            map.landmarks()
                .iter()
                .filter(|l| missions.contains(&l.mission_id())),
        );
        log::info!(
            "Landmark quality: {} good, {} bad",
            summary.num_good,
            summary.num_bad
        );
        summary
    }

    pub fn evaluate_all(&self, map: &mut ViMap) -> QualitySummary {
        let mission_ids = map.mission_ids();
        self.evaluate_missions(map, &mission_ids)
    }

    /// 把给定任务中所有路标点的质量设为 Unknown
    pub fn reset_to_unknown(&self, map: &mut ViMap, mission_ids: &[MissionId]) {
        let missions = checked_mission_set(map, mission_ids);
        let (_, landmarks) = map.split_landmarks_mut();
        parallel_process_mut(
            landmarks,
            |_, landmark| {
                if missions.contains(&landmark.mission_id()) {
                    landmark.set_quality(Quality::Unknown);
                }
            },
            self.parallel.always_parallelize,
            self.parallel.num_threads(),
        );
    }
}

fn checked_mission_set(map: &ViMap, mission_ids: &[MissionId]) -> HashSet<MissionId> {
    for &mission_id in mission_ids {
        assert!(
            map.has_mission(mission_id),
            "mission {} does not exist",
            mission_id
        );
    }
    mission_ids.iter().copied().collect()
}
