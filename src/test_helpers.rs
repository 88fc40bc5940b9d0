//! 测试用的小地图
#![allow(non_snake_case)]

use std::sync::Arc;

use nalgebra::{Isometry3, Point3, Vector3};

use crate::camera::{CameraTrait, NCamera, PinholeCamera, PinholeParameters};
use crate::global_types::{LandmarkId, MissionId, Timestamp, VertexId};
use crate::vi_map::{Landmark, Mission, ViMap, ViNodeState, Vertex};

pub fn mission_id() -> MissionId {
    MissionId::new(0)
}

pub fn single_camera_rig() -> Arc<NCamera> {
    let camera = PinholeCamera::new(PinholeParameters::default()).unwrap();
    Arc::new(NCamera::new(vec![Isometry3::identity()], vec![Arc::new(camera)]))
}

/// 相机中心位于 `position`、光轴朝向 `target` 的位姿
pub fn camera_facing(position: &Vector3<f64>, target: &Vector3<f64>) -> Isometry3<f64> {
    let dir = target - position;
    let up = if dir.cross(&Vector3::y()).norm() > 1e-6 * dir.norm() {
        Vector3::y()
    } else {
        Vector3::x()
    };
    Isometry3::face_towards(&Point3::from(*position), &Point3::from(*target), &up)
}

/// 一个任务、每个相机位置一个顶点、一个路标点。每个顶点观测该路标点一次。
pub fn observed_landmark_map(
    camera_positions: &[Vector3<f64>],
    p_M_fi: Vector3<f64>,
) -> (ViMap, LandmarkId) {
    let ncamera = single_camera_rig();
    let mut map = ViMap::new();
    map.add_mission(Mission::new(mission_id(), Isometry3::identity(), ncamera.clone()));

    let landmark_id = LandmarkId::new(0);
    let mut landmark = Landmark::new(landmark_id, mission_id());
    landmark.set_p_M_fi(p_M_fi);
    map.add_landmark(landmark);

    for (i, position) in camera_positions.iter().enumerate() {
        let vertex_id = VertexId::new(i as u64);
        let T_M_I = camera_facing(position, &p_M_fi);
        let state = ViNodeState::builder().pose(T_M_I).build();
        map.add_vertex(Vertex::new(
            vertex_id,
            mission_id(),
            Timestamp::from_nanos(i as i64 * 50_000_000),
            state,
            1,
        ));
        let p_C = T_M_I.inverse_transform_point(&Point3::from(p_M_fi)).coords;
        let (keypoint, _) = ncamera.camera(0).project3(&p_C);
        map.add_observation(landmark_id, vertex_id, 0, keypoint);
    }
    (map, landmark_id)
}
