#![allow(non_snake_case)]

use std::collections::HashMap;
use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;

use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector2, Vector3};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use super::DatasetTrait;
use crate::camera::{CameraTrait, NCamera, PinholeCamera, PinholeParameters};
use crate::error::{Error, Result};
use crate::global_types::{LandmarkId, MissionId, Timestamp, VertexId};
use crate::vi_map::{Landmark, Mission, ViMap, ViNodeState, Vertex};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticDatasetConfig {
    /// 关键帧数量，沿任务坐标系 x 轴等间隔排列
    pub num_vertices: usize,
    pub vertex_spacing_m: f64,
    pub vertex_period_s: f64,
    /// 近处路标点数量，深度在 `depth_range_m` 内
    pub num_landmarks: usize,
    pub depth_range_m: [f64; 2],
    /// 远处路标点数量，深度在 `far_depth_range_m` 内
    pub num_far_landmarks: usize,
    pub far_depth_range_m: [f64; 2],
    /// 相机数量，相邻相机沿机体 x 轴相距 `camera_baseline_m`
    pub num_cameras: usize,
    pub camera_baseline_m: f64,
    pub camera: PinholeParameters,
    /// 特征点像素噪声标准差
    pub pixel_noise_std: f64,
    pub seed: u64,
}

impl Default for SyntheticDatasetConfig {
    fn default() -> Self {
        Self {
            num_vertices: 20,
            vertex_spacing_m: 0.25,
            vertex_period_s: 0.1,
            num_landmarks: 300,
            depth_range_m: [2.0, 12.0],
            num_far_landmarks: 30,
            far_depth_range_m: [60.0, 80.0],
            num_cameras: 1,
            camera_baseline_m: 0.11,
            camera: PinholeParameters::default(),
            pixel_noise_std: 0.0,
            seed: 42,
        }
    }
}

impl SyntheticDatasetConfig {
    fn validate(&self) -> Result<()> {
        let ranges_ok = |r: &[f64; 2]| r[0] > 0.0 && r[1] >= r[0];
        if self.num_vertices == 0 || self.num_cameras == 0 {
            return Err(Error::InvalidConfig(
                "synthetic dataset needs at least one vertex and one camera".into(),
            ));
        }
        if !ranges_ok(&self.depth_range_m) || !ranges_ok(&self.far_depth_range_m) {
            return Err(Error::InvalidConfig("depth ranges must be positive and ordered".into()));
        }
        if !(self.pixel_noise_std >= 0.0) || !(self.vertex_period_s > 0.0) {
            return Err(Error::InvalidConfig(
                "pixel noise must be non-negative and vertex period positive".into(),
            ));
        }
        Ok(())
    }
}

/// 仿真地图及路标点真值（任务坐标系）
#[derive(Debug)]
pub struct SyntheticScene {
    pub map: ViMap,
    pub ground_truth: HashMap<LandmarkId, Vector3<f64>>,
}

/// 相机朝向机体 +y，光轴水平；相机 y 轴朝向机体 -z
fn rig_T_C_B(index: usize, baseline: f64) -> Isometry3<f64> {
    let q_B_C = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), -FRAC_PI_2);
    let T_B_C = Isometry3::from_parts(Translation3::new(index as f64 * baseline, 0.0, 0.0), q_B_C);
    T_B_C.inverse()
}

#[derive(Debug, Clone, Default)]
pub struct SyntheticDataset {
    config: SyntheticDatasetConfig,
}

impl SyntheticDataset {
    pub fn new(config: SyntheticDatasetConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SyntheticDatasetConfig {
        &self.config
    }

    pub fn build(&self) -> Result<SyntheticScene> {
        let config = &self.config;
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);

        let mut cameras: Vec<Arc<dyn CameraTrait>> = Vec::with_capacity(config.num_cameras);
        let mut T_C_B = Vec::with_capacity(config.num_cameras);
        for i in 0..config.num_cameras {
            let mut parameters = config.camera.clone();
            parameters.camera_name = format!("cam{}", i);
            cameras.push(Arc::new(PinholeCamera::new(parameters)?));
            T_C_B.push(rig_T_C_B(i, config.camera_baseline_m));
        }
        let ncamera = Arc::new(NCamera::new(T_C_B, cameras));

        let mission_id = MissionId::new(0);
        let mut map = ViMap::new();
        map.add_mission(Mission::new(mission_id, Isometry3::identity(), ncamera.clone()));

        // 关键帧
        let velocity = Vector3::new(config.vertex_spacing_m / config.vertex_period_s, 0.0, 0.0);
        let mut vertex_poses = Vec::with_capacity(config.num_vertices);
        for i in 0..config.num_vertices {
            let T_M_I = Isometry3::translation(i as f64 * config.vertex_spacing_m, 0.0, 0.0);
            let state = ViNodeState::builder().pose(T_M_I).velocity(velocity).build();
            let timestamp = Timestamp::from_nanos((i as f64 * config.vertex_period_s * 1e9) as i64);
            let vertex_id = VertexId::new(i as u64);
            map.add_vertex(Vertex::new(vertex_id, mission_id, timestamp, state, config.num_cameras));
            vertex_poses.push((vertex_id, T_M_I));
        }

        // 路标点：在轨迹前方 (+y) 随机分布
        let trajectory_length = (config.num_vertices - 1) as f64 * config.vertex_spacing_m;
        let mut ground_truth = HashMap::with_capacity(config.num_landmarks + config.num_far_landmarks);
        let depth_ranges = std::iter::repeat(config.depth_range_m)
            .take(config.num_landmarks)
            .chain(std::iter::repeat(config.far_depth_range_m).take(config.num_far_landmarks));
        for (i, [near, far]) in depth_ranges.enumerate() {
            let depth = if far > near { rng.gen_range(near..far) } else { near };
            let x = rng.gen_range(0.0..=trajectory_length) + rng.gen_range(-0.3..0.3) * depth;
            let z = rng.gen_range(-0.25..0.25) * depth;
            let p_M_fi = Vector3::new(x, depth, z);

            let landmark_id = LandmarkId::new(i as u64);
            let mut landmark = Landmark::new(landmark_id, mission_id);
            landmark.set_p_M_fi(p_M_fi);
            map.add_landmark(landmark);
            ground_truth.insert(landmark_id, p_M_fi);

            for (vertex_id, T_M_I) in &vertex_poses {
                for frame_index in 0..ncamera.num_cameras() {
                    let T_C_M = ncamera.get_T_C_B(frame_index) * T_M_I.inverse();
                    let p_C = T_C_M.transform_point(&Point3::from(p_M_fi)).coords;
                    let camera = ncamera.camera(frame_index);
                    let (keypoint, result) = camera.project3(&p_C);
                    if !result.is_keypoint_visible() {
                        continue;
                    }
                    let keypoint = keypoint + pixel_noise(&mut rng, config.pixel_noise_std);
                    map.add_observation(landmark_id, *vertex_id, frame_index, keypoint);
                }
            }
        }

        log::info!(
            "Synthetic mission: {} vertices, {} landmarks, {} cameras",
            map.num_vertices(),
            map.num_landmarks(),
            ncamera.num_cameras()
        );
        Ok(SyntheticScene { map, ground_truth })
    }
}

impl DatasetTrait for SyntheticDataset {
    fn build_map(&self) -> Result<ViMap> {
        Ok(self.build()?.map)
    }
}

fn pixel_noise(rng: &mut StdRng, std_dev: f64) -> Vector2<f64> {
    if std_dev == 0.0 {
        return Vector2::zeros();
    }
    let x: f64 = rng.sample(StandardNormal);
    let y: f64 = rng.sample(StandardNormal);
    Vector2::new(x, y) * std_dev
}

/// 给每第 `every_nth` 个已三角化的路标点加上各向同性高斯噪声，返回被扰动的数量。
/// 被扰动的路标点质量变为 Unknown。
pub fn corrupt_landmark_positions(map: &mut ViMap, std_dev: f64, every_nth: usize, seed: u64) -> usize {
    assert!(every_nth > 0, "every_nth must be positive");
    let mut rng = StdRng::seed_from_u64(seed);
    let (_, landmarks) = map.split_landmarks_mut();
    let mut num_corrupted = 0;
    for landmark in landmarks.iter_mut().step_by(every_nth) {
        let Some(p_M_fi) = landmark.p_M_fi().copied() else {
            continue;
        };
        let noise = Vector3::from_fn(|_, _| rng.sample::<f64, _>(StandardNormal)) * std_dev;
        landmark.set_p_M_fi(p_M_fi + noise);
        num_corrupted += 1;
    }
    log::info!(
        "Corrupted {} landmark positions with sigma {} m",
        num_corrupted,
        std_dev
    );
    num_corrupted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vi_map::Quality;
    use approx::assert_relative_eq;

    #[test]
    fn test_build_is_deterministic() {
        let a = SyntheticDataset::default().build().unwrap();
        let b = SyntheticDataset::default().build().unwrap();
        assert_eq!(a.map.num_landmarks(), b.map.num_landmarks());
        for landmark in a.map.landmarks() {
            let other = b.map.landmark(landmark.id());
            assert_eq!(landmark.p_M_fi(), other.p_M_fi());
            assert_eq!(landmark.observations(), other.observations());
        }
    }

    #[test]
    fn test_observations_reproject_exactly() {
        let scene = SyntheticDataset::default().build().unwrap();
        let map = &scene.map;
        let mut num_observations = 0;
        for landmark in map.landmarks() {
            assert_eq!(landmark.quality(), Quality::Unknown);
            let p_G_fi = map.landmark_p_G_fi(landmark.id());
            for observation in landmark.observations() {
                let T_G_C = map
                    .pose_graph()
                    .get_visual_frame_T_G_C(observation.vertex_id, observation.frame_index);
                let p_C = T_G_C.inverse_transform_point(&Point3::from(p_G_fi)).coords;
                assert!(p_C.z > 0.0);
                let camera = map.mission(landmark.mission_id()).ncamera().camera(observation.frame_index);
                let (projected, _) = camera.project3(&p_C);
                let measured = map
                    .vertex(observation.vertex_id)
                    .visual_frame(observation.frame_index)
                    .keypoint(observation.keypoint_index);
                assert_relative_eq!(projected, *measured, epsilon = 1e-9);
                num_observations += 1;
            }
        }
        assert!(num_observations > map.num_landmarks());
    }

    #[test]
    fn test_stereo_rig() {
        let config = SyntheticDatasetConfig {
            num_cameras: 2,
            ..Default::default()
        };
        let map = SyntheticDataset::new(config).build_map().unwrap();
        let vertex = map.vertex(VertexId::new(0));
        assert_eq!(vertex.num_frames(), 2);
        assert!(!vertex.frame_observed_landmark_ids(1).is_empty());
    }

    #[test]
    fn test_invalid_config() {
        let config = SyntheticDatasetConfig {
            num_vertices: 0,
            ..Default::default()
        };
        assert!(SyntheticDataset::new(config).build().is_err());
    }

    #[test]
    fn test_corrupt_every_nth() {
        let mut map = SyntheticDataset::default().build_map().unwrap();
        let before: Vec<Vector3<f64>> = map.landmarks().iter().map(|l| *l.p_M_fi().unwrap()).collect();
        let num_corrupted = corrupt_landmark_positions(&mut map, 1.0, 3, 1);
        assert_eq!(num_corrupted, (map.num_landmarks() + 2) / 3);
        for (i, landmark) in map.landmarks().iter().enumerate() {
            let moved = *landmark.p_M_fi().unwrap() != before[i];
            assert_eq!(moved, i % 3 == 0);
        }
    }
}
