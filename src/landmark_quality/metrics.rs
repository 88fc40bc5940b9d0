#![allow(non_snake_case)]

use nalgebra::{Point3, Vector3};

use crate::config::LandmarkQualityConfig;
use crate::geometry::max_pairwise_angle_rad;
use crate::vi_map::{Landmark, PoseGraphView, Quality};

/// 射线长度小于该值时认为相机中心与路标点重合，丢弃该观测
const MIN_RAY_LENGTH: f64 = 1e-12;

/// 路标点的几何约束指标
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LandmarkQualityMetrics {
    /// 可用观测射线数量
    pub num_observers: usize,
    /// 到最近观测相机中心的距离；路标点在该相机后方时为负
    pub signed_distance_to_closest_observer: f64,
    /// 所有观测射线两两之间的最大夹角（弧度）
    pub max_observation_angle_rad: f64,
}

impl LandmarkQualityMetrics {
    /// 计算指标。路标点未三角化或观测引用了不存在的顶点时 panic。
    pub fn compute(pose_graph: &PoseGraphView<'_>, landmark: &Landmark) -> Self {
        assert!(landmark.id().is_valid(), "invalid landmark id");
        assert!(
            landmark.is_triangulated(),
            "landmark {} must be triangulated before evaluating its quality",
            landmark.id()
        );
        let p_G_fi = pose_graph.landmark_p_G_fi(landmark);

        let mut rays: Vec<Vector3<f64>> = Vec::with_capacity(landmark.num_observations());
        let mut signed_distance_to_closest_observer = f64::INFINITY;
        let mut closest_distance = f64::INFINITY;
        for observation in landmark.observations() {
            assert!(
                pose_graph.has_vertex(observation.vertex_id),
                "landmark {} is observed by unknown vertex {}",
                landmark.id(),
                observation.vertex_id
            );
            let T_G_C = pose_graph.get_visual_frame_T_G_C(observation.vertex_id, observation.frame_index);
            let p_G_C = T_G_C.translation.vector;
            let ray = p_G_C - p_G_fi;
            let length = ray.norm();
            if !(length > MIN_RAY_LENGTH) {
                continue;
            }
            if length < closest_distance {
                closest_distance = length;
                let p_C_fi = T_G_C.inverse_transform_point(&Point3::from(p_G_fi));
                signed_distance_to_closest_observer =
                    if p_C_fi.z < 0.0 { -length } else { length };
            }
            rays.push(ray);
        }

        Self {
            num_observers: rays.len(),
            signed_distance_to_closest_observer,
            max_observation_angle_rad: max_pairwise_angle_rad(&rays),
        }
    }

    /// 分类规则：
    /// - 观测数 `< min_observers` 为 Bad
    /// - 到最近观测者的有符号距离不在 `[min, max]`（闭区间）内为 Bad
    /// - 最大夹角 `< min_observation_angle_deg`（严格小于）为 Bad
    /// - 其余为 Good
    pub fn classify(&self, config: &LandmarkQualityConfig) -> Quality {
        if self.num_observers == 0 || self.num_observers < config.min_observers {
            return Quality::Bad;
        }
        let distance = self.signed_distance_to_closest_observer;
        if !(distance >= config.min_distance_from_closest_observer
            && distance <= config.max_distance_from_closest_observer)
        {
            return Quality::Bad;
        }
        if self.max_observation_angle_rad < config.min_observation_angle_deg.to_radians() {
            return Quality::Bad;
        }
        Quality::Good
    }
}
