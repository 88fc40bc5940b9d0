//! 路标点重新三角化
//!
//! 用所有观测的标定射线重新计算路标点位置。成功时覆盖 `p_M_fi` 并把质量重置为 Unknown，
//! 失败（有效射线不足或几何不可观）时路标点保持不变。
#![allow(non_snake_case)]

mod linear;
pub use linear::{linear_triangulate_from_n_views, TriangulationResult};

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use nalgebra::{Point3, Vector3};

use crate::config::ParallelConfig;
use crate::global_types::{MissionId, VertexId};
use crate::parallel::parallel_process_mut;
use crate::vi_map::{Landmark, PoseGraphView, ViMap};

/// 一次重新三角化的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriangulationSummary {
    pub num_successful: usize,
    pub num_too_few_measurements: usize,
    pub num_unobservable: usize,
}

impl TriangulationSummary {
    pub fn total(&self) -> usize {
        self.num_successful + self.num_too_few_measurements + self.num_unobservable
    }
}

/// 收集路标点所有观测在全局坐标系下的射线。反投影失败的特征点被跳过。
pub fn observation_rays_G(
    pose_graph: &PoseGraphView<'_>,
    landmark: &Landmark,
) -> (Vec<Vector3<f64>>, Vec<Vector3<f64>>) {
    let mut bearings_G = Vec::with_capacity(landmark.num_observations());
    let mut p_G_C = Vec::with_capacity(landmark.num_observations());
    for observation in landmark.observations() {
        let vertex = pose_graph.vertex(observation.vertex_id);
        let ncamera = pose_graph.mission(vertex.mission_id()).ncamera();
        let keypoint = vertex
            .visual_frame(observation.frame_index)
            .keypoint(observation.keypoint_index);
        let Some(bearing_C) = ncamera.camera(observation.frame_index).back_project3(keypoint) else {
            log::debug!(
                "skip keypoint {} of vertex {}: back-projection failed",
                observation.keypoint_index,
                observation.vertex_id
            );
            continue;
        };
        let T_G_C = pose_graph.get_visual_frame_T_G_C(observation.vertex_id, observation.frame_index);
        bearings_G.push(T_G_C.rotation * bearing_C);
        p_G_C.push(T_G_C.translation.vector);
    }
    (bearings_G, p_G_C)
}

/// 三角化单个路标点，成功时写回位置（质量随之变为 Unknown）
pub fn retriangulate_landmark(pose_graph: &PoseGraphView<'_>, landmark: &mut Landmark) -> TriangulationResult {
    let (bearings_G, p_G_C) = observation_rays_G(pose_graph, landmark);
    let result = linear_triangulate_from_n_views(&bearings_G, &p_G_C);
    if let TriangulationResult::Successful(p_G_fi) = result {
        let T_G_M = pose_graph.get_T_G_M(landmark.mission_id());
        let p_M_fi = T_G_M.inverse_transform_point(&Point3::from(p_G_fi)).coords;
        landmark.set_p_M_fi(p_M_fi);
    }
    result
}

/// 重新三角化满足 `selected` 的路标点
fn retriangulate_selected<S>(map: &mut ViMap, selected: S, parallel: &ParallelConfig) -> TriangulationSummary
where
    S: Fn(&Landmark) -> bool + Sync,
{
    let num_successful = AtomicUsize::new(0);
    let num_too_few = AtomicUsize::new(0);
    let num_unobservable = AtomicUsize::new(0);

    let (pose_graph, landmarks) = map.split_landmarks_mut();
    parallel_process_mut(
        landmarks,
        |_, landmark| {
            if !selected(landmark) {
                return;
            }
            let counter = match retriangulate_landmark(&pose_graph, landmark) {
                TriangulationResult::Successful(_) => &num_successful,
                TriangulationResult::TooFewMeasurements => &num_too_few,
                TriangulationResult::Unobservable | TriangulationResult::Uninitialized => &num_unobservable,
            };
            counter.fetch_add(1, Ordering::Relaxed);
        },
        parallel.always_parallelize,
        parallel.num_threads(),
    );

    let summary = TriangulationSummary {
        num_successful: num_successful.into_inner(),
        num_too_few_measurements: num_too_few.into_inner(),
        num_unobservable: num_unobservable.into_inner(),
    };
    log::info!(
        "Retriangulated {} landmarks: {} successful, {} too few measurements, {} unobservable",
        summary.total(),
        summary.num_successful,
        summary.num_too_few_measurements,
        summary.num_unobservable
    );
    summary
}

/// 重新三角化地图中的所有路标点
pub fn retriangulate_landmarks(map: &mut ViMap, parallel: &ParallelConfig) -> TriangulationSummary {
    retriangulate_selected(map, |_| true, parallel)
}

pub fn retriangulate_landmarks_of_missions(
    map: &mut ViMap,
    mission_ids: &[MissionId],
    parallel: &ParallelConfig,
) -> TriangulationSummary {
    for &mission_id in mission_ids {
        assert!(map.has_mission(mission_id), "mission {} does not exist", mission_id);
    }
    let missions: HashSet<MissionId> = mission_ids.iter().copied().collect();
    retriangulate_selected(map, |landmark| missions.contains(&landmark.mission_id()), parallel)
}

pub fn retriangulate_landmarks_of_mission(
    map: &mut ViMap,
    mission_id: MissionId,
    parallel: &ParallelConfig,
) -> TriangulationSummary {
    retriangulate_landmarks_of_missions(map, &[mission_id], parallel)
}

/// 重新三角化该顶点任一帧观测到的路标点
pub fn retriangulate_landmarks_of_vertex(
    map: &mut ViMap,
    vertex_id: VertexId,
    parallel: &ParallelConfig,
) -> TriangulationSummary {
    let vertex = map.vertex(vertex_id);
    let observed: HashSet<_> = (0..vertex.num_frames())
        .flat_map(|frame_index| vertex.frame_observed_landmark_ids(frame_index).iter().copied())
        .collect();
    retriangulate_selected(map, |landmark| observed.contains(&landmark.id()), parallel)
}
