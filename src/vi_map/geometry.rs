#![allow(non_snake_case)]

use nalgebra::{Isometry3, Matrix3, SymmetricEigen, Vector3};

use super::{Quality, ViMap};
use crate::global_types::{MissionId, Timestamp, VertexId};

/// 基于地图的几何查询
pub struct VIMapGeometry<'a> {
    map: &'a ViMap,
}

impl<'a> VIMapGeometry<'a> {
    pub fn new(map: &'a ViMap) -> Self {
        Self { map }
    }

    /// `T_G_C = T_G_I * T_C_B⁻¹`
    pub fn get_visual_frame_T_G_C(&self, vertex_id: VertexId, frame_index: usize) -> Isometry3<f64> {
        self.map
            .pose_graph()
            .get_visual_frame_T_G_C(vertex_id, frame_index)
    }

    /// 帧中观测到的 Good 路标点到相机中心距离的中位数，没有可用路标点时返回 `+∞`
    pub fn median_scene_depth(&self, vertex_id: VertexId, frame_index: usize) -> f64 {
        let p_G_C = self
            .get_visual_frame_T_G_C(vertex_id, frame_index)
            .translation
            .vector;

        let mut square_depths: Vec<f64> = self
            .map
            .frame_observed_landmark_ids(vertex_id, frame_index)
            .iter()
            .filter(|id| id.is_valid())
            .map(|&id| self.map.landmark(id))
            .filter(|landmark| landmark.quality() == Quality::Good)
            .map(|landmark| (self.map.pose_graph().landmark_p_G_fi(landmark) - p_G_C).norm_squared())
            .collect();

        if square_depths.is_empty() {
            log::warn!("No landmarks found to compute median scene depth, returning infinity");
            return f64::INFINITY;
        }
        let mid = square_depths.len() / 2;
        let (_, median, _) = square_depths.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
        median.sqrt()
    }

    /// 同一任务中 `p_M_I` 距离小于 `range_m` 的顶点（包括自身），按 id 排序
    pub fn neighbours_within_range(&self, vertex_id: VertexId, range_m: f64) -> Vec<VertexId> {
        let vertex = self.map.vertex(vertex_id);
        let p_M_I = vertex.state().p_M_I();
        let mut neighbours: Vec<VertexId> = self
            .map
            .mission(vertex.mission_id())
            .vertex_ids()
            .iter()
            .copied()
            .filter(|&id| (self.map.vertex(id).state().p_M_I() - p_M_I).norm() < range_m)
            .collect();
        neighbours.sort();
        neighbours
    }

    /// 任务中所有顶点位置 `p_G_I` 的协方差特征值（升序）与对应特征向量（按列）
    pub fn p_G_I_covariance_eigen(&self, mission_id: MissionId) -> (Vector3<f64>, Matrix3<f64>) {
        let positions = self.map.all_vertex_p_G_I(mission_id);
        assert!(!positions.is_empty(), "mission {} has no vertices", mission_id);

        let n = positions.len() as f64;
        let mean = positions.iter().sum::<Vector3<f64>>() / n;
        let mut covariance = Matrix3::zeros();
        for p in positions.iter() {
            let d = p - mean;
            covariance += d * d.transpose();
        }
        if positions.len() > 1 {
            covariance /= n - 1.0;
        }

        let eigen = SymmetricEigen::new(covariance);
        let mut order = [0usize, 1, 2];
        order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));
        let eigenvalues = Vector3::new(
            eigen.eigenvalues[order[0]],
            eigen.eigenvalues[order[1]],
            eigen.eigenvalues[order[2]],
        );
        let eigenvectors = Matrix3::from_columns(&[
            eigen.eigenvectors.column(order[0]).into_owned(),
            eigen.eigenvectors.column(order[1]).into_owned(),
            eigen.eigenvectors.column(order[2]).into_owned(),
        ]);
        (eigenvalues, eigenvectors)
    }

    /// 所有顶点位置的平均值相对根顶点位置的偏移
    pub fn bv_G_root_average(&self, mission_id: MissionId) -> Vector3<f64> {
        let positions = self.map.all_vertex_p_G_I(mission_id);
        assert!(!positions.is_empty(), "mission {} has no vertices", mission_id);
        let mean = positions.iter().sum::<Vector3<f64>>() / positions.len() as f64;
        let root_vertex_id = self.map.mission(mission_id).root_vertex_id();
        mean - self.map.get_T_G_I(root_vertex_id).translation.vector
    }

    /// 在任务的顶点之间按时间插值 `T_G_I`（平移线性插值，旋转 slerp）。
    ///
    /// 任一时间戳超出顶点时间范围时返回 `None`。
    pub fn interpolate_T_G_I_for_timestamps(
        &self,
        mission_id: MissionId,
        timestamps: &[Timestamp],
    ) -> Option<Vec<Isometry3<f64>>> {
        assert!(!timestamps.is_empty(), "no timestamps to interpolate");
        let mission = self.map.mission(mission_id);
        let mut samples: Vec<(Timestamp, Isometry3<f64>)> = mission
            .vertex_ids()
            .iter()
            .map(|&id| {
                let vertex = self.map.vertex(id);
                (vertex.timestamp(), *vertex.get_T_M_I())
            })
            .collect();
        assert!(!samples.is_empty(), "mission {} has no vertices", mission_id);
        samples.sort_by_key(|(t, _)| *t);

        let T_G_M = *mission.get_T_G_M();
        let (first, last) = (samples[0].0, samples[samples.len() - 1].0);
        let mut T_G_I = Vec::with_capacity(timestamps.len());
        for &t in timestamps {
            if t < first || t > last {
                log::warn!("timestamp {} ns is outside [{}, {}] ns", t.as_nanos(), first.as_nanos(), last.as_nanos());
                return None;
            }
            // 第一个时间戳大于 t 的样本
            let upper = samples.partition_point(|(t_i, _)| *t_i <= t);
            let T_M_I = if upper == samples.len() {
                samples[upper - 1].1
            } else {
                let (t_a, T_a) = &samples[upper - 1];
                let (t_b, T_b) = &samples[upper];
                let alpha = t.duration_since(t_a) / t_b.duration_since(t_a);
                interpolate_isometry(T_a, T_b, alpha)
            };
            T_G_I.push(T_G_M * T_M_I);
        }
        Some(T_G_I)
    }
}

fn interpolate_isometry(T_a: &Isometry3<f64>, T_b: &Isometry3<f64>, alpha: f64) -> Isometry3<f64> {
    let translation = T_a.translation.vector.lerp(&T_b.translation.vector, alpha);
    // 旋转相差 π 时 slerp 不唯一，取较近的端点
    let rotation = T_a
        .rotation
        .try_slerp(&T_b.rotation, alpha, 1e-9)
        .unwrap_or(if alpha < 0.5 { T_a.rotation } else { T_b.rotation });
    Isometry3::from_parts(translation.into(), rotation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{NCamera, PinholeCamera, PinholeParameters};
    use crate::global_types::{LandmarkId, Timestamp};
    use crate::vi_map::{Landmark, Mission, ViNodeState, Vertex};
    use approx::assert_relative_eq;
    use nalgebra::Vector2;
    use std::sync::Arc;

    /// 沿 x 轴排列的 4 个顶点，相机与机体重合
    fn line_map() -> ViMap {
        let camera = PinholeCamera::new(PinholeParameters::default()).unwrap();
        let ncamera = Arc::new(NCamera::new(
            vec![Isometry3::identity()],
            vec![Arc::new(camera)],
        ));
        let mut map = ViMap::new();
        let mission_id = MissionId::new(0);
        map.add_mission(Mission::new(mission_id, Isometry3::identity(), ncamera));
        for i in 0..4u64 {
            let state = ViNodeState::builder()
                .pose(Isometry3::translation(i as f64, 0.0, 0.0))
                .build();
            map.add_vertex(Vertex::new(
                VertexId::new(i),
                mission_id,
                Timestamp::from_nanos(i as i64),
                state,
                1,
            ));
        }
        for (i, depth) in [2.0, 4.0, 8.0].iter().enumerate() {
            let id = LandmarkId::new(i as u64);
            let mut landmark = Landmark::new(id, mission_id);
            landmark.set_p_M_fi(Vector3::new(0.0, 0.0, *depth));
            landmark.set_quality(Quality::Good);
            map.add_landmark(landmark);
            map.add_observation(id, VertexId::new(0), 0, Vector2::new(376.0, 240.0));
        }
        map
    }

    #[test]
    fn test_median_scene_depth() {
        let map = line_map();
        let geometry = VIMapGeometry::new(&map);
        assert_relative_eq!(geometry.median_scene_depth(VertexId::new(0), 0), 4.0);
        assert_eq!(geometry.median_scene_depth(VertexId::new(1), 0), f64::INFINITY);
    }

    #[test]
    fn test_neighbours_within_range() {
        let map = line_map();
        let geometry = VIMapGeometry::new(&map);
        assert_eq!(
            geometry.neighbours_within_range(VertexId::new(1), 1.5),
            vec![VertexId::new(0), VertexId::new(1), VertexId::new(2)]
        );
    }

    #[test]
    fn test_interpolate_T_G_I() {
        let camera = PinholeCamera::new(PinholeParameters::default()).unwrap();
        let ncamera = Arc::new(NCamera::new(vec![Isometry3::identity()], vec![Arc::new(camera)]));
        let mut map = ViMap::new();
        let mission_id = MissionId::new(0);
        map.add_mission(Mission::new(mission_id, Isometry3::translation(0.0, 0.0, 5.0), ncamera));
        let poses = [
            Isometry3::identity(),
            Isometry3::new(Vector3::new(2.0, 0.0, 0.0), Vector3::z() * std::f64::consts::FRAC_PI_2),
        ];
        for (i, T_M_I) in poses.iter().enumerate() {
            let state = ViNodeState::builder().pose(*T_M_I).build();
            map.add_vertex(Vertex::new(
                VertexId::new(i as u64),
                mission_id,
                Timestamp::from_nanos(i as i64 * 1_000_000_000),
                state,
                1,
            ));
        }

        let geometry = VIMapGeometry::new(&map);
        let timestamps = [
            Timestamp::from_nanos(0),
            Timestamp::from_nanos(500_000_000),
            Timestamp::from_nanos(1_000_000_000),
        ];
        let T_G_I = geometry
            .interpolate_T_G_I_for_timestamps(mission_id, &timestamps)
            .unwrap();
        assert_eq!(T_G_I.len(), 3);
        assert_relative_eq!(T_G_I[0].translation.vector, Vector3::new(0.0, 0.0, 5.0), epsilon = 1e-12);
        assert_relative_eq!(T_G_I[1].translation.vector, Vector3::new(1.0, 0.0, 5.0), epsilon = 1e-12);
        assert_relative_eq!(T_G_I[1].rotation.angle(), std::f64::consts::FRAC_PI_4, epsilon = 1e-12);
        assert_relative_eq!(T_G_I[2].translation.vector, Vector3::new(2.0, 0.0, 5.0), epsilon = 1e-12);

        assert!(geometry
            .interpolate_T_G_I_for_timestamps(mission_id, &[Timestamp::from_nanos(1_000_000_001)])
            .is_none());
    }

    #[test]
    fn test_covariance_eigen_and_root_average() {
        let map = line_map();
        let geometry = VIMapGeometry::new(&map);
        let (values, vectors) = geometry.p_G_I_covariance_eigen(MissionId::new(0));
        assert!(values[0] <= values[1] && values[1] <= values[2]);
        assert_relative_eq!(values[2], 5.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(vectors[(0, 2)].abs(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(
            geometry.bv_G_root_average(MissionId::new(0)),
            Vector3::new(1.5, 0.0, 0.0)
        );
    }
}
