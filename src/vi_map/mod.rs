//! 视觉惯性地图
//!
//! 保存任务、顶点与路标点。路标点按顺序存放在连续的数组中，
//! 以便并行处理时把可变的路标点与只读的位姿图分开借用（见 [ViMap::split_landmarks_mut]）。
#![allow(non_snake_case)]

mod geometry;
mod landmark;
mod mission;
mod vertex;

pub use geometry::VIMapGeometry;
pub use landmark::{KeypointIdentifier, Landmark, Quality};
pub use mission::Mission;
pub use vertex::{StateCovariance, ViNodeState, ViNodeStateBuilder, Vertex, VisualFrame};

use std::collections::{BTreeMap, HashMap};

use nalgebra::{Isometry3, Point3, Vector2, Vector3};

use crate::global_types::{LandmarkId, MissionId, VertexId};

/// 位姿图的只读视图：任务与顶点
#[derive(Debug, Clone, Copy)]
pub struct PoseGraphView<'a> {
    missions: &'a BTreeMap<MissionId, Mission>,
    vertices: &'a HashMap<VertexId, Vertex>,
}

impl<'a> PoseGraphView<'a> {
    pub fn has_mission(&self, mission_id: MissionId) -> bool {
        self.missions.contains_key(&mission_id)
    }

    pub fn mission(&self, mission_id: MissionId) -> &'a Mission {
        match self.missions.get(&mission_id) {
            Some(mission) => mission,
            None => panic!("mission {} does not exist", mission_id),
        }
    }

    pub fn mission_ids(&self) -> Vec<MissionId> {
        self.missions.keys().copied().collect()
    }

    pub fn has_vertex(&self, vertex_id: VertexId) -> bool {
        self.vertices.contains_key(&vertex_id)
    }

    pub fn vertex(&self, vertex_id: VertexId) -> &'a Vertex {
        match self.vertices.get(&vertex_id) {
            Some(vertex) => vertex,
            None => panic!("vertex {} does not exist", vertex_id),
        }
    }

    /// 所有顶点 id，按 id 排序
    pub fn vertex_ids(&self) -> Vec<VertexId> {
        let mut ids: Vec<VertexId> = self.vertices.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn frame_observed_landmark_ids(
        &self,
        vertex_id: VertexId,
        frame_index: usize,
    ) -> &'a [LandmarkId] {
        self.vertex(vertex_id).frame_observed_landmark_ids(frame_index)
    }

    pub fn get_T_M_I(&self, vertex_id: VertexId) -> Isometry3<f64> {
        *self.vertex(vertex_id).get_T_M_I()
    }

    pub fn get_T_G_M(&self, mission_id: MissionId) -> Isometry3<f64> {
        *self.mission(mission_id).get_T_G_M()
    }

    pub fn get_T_G_I(&self, vertex_id: VertexId) -> Isometry3<f64> {
        let vertex = self.vertex(vertex_id);
        self.get_T_G_M(vertex.mission_id()) * vertex.get_T_M_I()
    }

    /// 观测 `(vertex, frame_index)` 的相机在全局坐标系中的位姿
    pub fn get_visual_frame_T_G_C(&self, vertex_id: VertexId, frame_index: usize) -> Isometry3<f64> {
        let vertex = self.vertex(vertex_id);
        let T_C_B = self
            .mission(vertex.mission_id())
            .ncamera()
            .get_T_C_B(frame_index);
        self.get_T_G_I(vertex_id) * T_C_B.inverse()
    }

    /// 路标点在全局坐标系中的位置；未三角化是前置条件错误
    pub fn landmark_p_G_fi(&self, landmark: &Landmark) -> Vector3<f64> {
        let p_M_fi = match landmark.p_M_fi() {
            Some(p) => p,
            None => panic!("landmark {} has not been triangulated", landmark.id()),
        };
        self.get_T_G_M(landmark.mission_id())
            .transform_point(&Point3::from(*p_M_fi))
            .coords
    }
}

#[derive(Debug, Default)]
pub struct ViMap {
    missions: BTreeMap<MissionId, Mission>,
    vertices: HashMap<VertexId, Vertex>,
    landmarks: Vec<Landmark>,
    landmark_index: HashMap<LandmarkId, usize>,
}

impl ViMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pose_graph(&self) -> PoseGraphView<'_> {
        PoseGraphView {
            missions: &self.missions,
            vertices: &self.vertices,
        }
    }

    /// 同时借出只读位姿图和可变路标点数组
    pub fn split_landmarks_mut(&mut self) -> (PoseGraphView<'_>, &mut [Landmark]) {
        (
            PoseGraphView {
                missions: &self.missions,
                vertices: &self.vertices,
            },
            &mut self.landmarks,
        )
    }

    // ---------------------------------------------------------------- 写入

    pub fn add_mission(&mut self, mission: Mission) {
        let id = mission.id();
        assert!(
            self.missions.insert(id, mission).is_none(),
            "mission {} already exists",
            id
        );
    }

    pub fn add_vertex(&mut self, vertex: Vertex) {
        let id = vertex.id();
        let mission = match self.missions.get_mut(&vertex.mission_id()) {
            Some(mission) => mission,
            None => panic!("vertex {} refers to unknown mission {}", id, vertex.mission_id()),
        };
        assert_eq!(
            vertex.num_frames(),
            mission.ncamera().num_cameras(),
            "vertex frames must match the camera rig"
        );
        mission.push_vertex(id);
        assert!(
            self.vertices.insert(id, vertex).is_none(),
            "vertex {} already exists",
            id
        );
    }

    pub fn add_landmark(&mut self, landmark: Landmark) {
        let id = landmark.id();
        assert!(
            self.missions.contains_key(&landmark.mission_id()),
            "landmark {} refers to unknown mission",
            id
        );
        assert!(
            !self.landmark_index.contains_key(&id),
            "landmark {} already exists",
            id
        );
        self.landmark_index.insert(id, self.landmarks.len());
        self.landmarks.push(landmark);
    }

    /// 在顶点的某一帧中添加特征点测量，并关联到路标点
    pub fn add_observation(
        &mut self,
        landmark_id: LandmarkId,
        vertex_id: VertexId,
        frame_index: usize,
        keypoint: Vector2<f64>,
    ) -> KeypointIdentifier {
        let index = self.landmark_slot(landmark_id);
        let vertex = match self.vertices.get_mut(&vertex_id) {
            Some(vertex) => vertex,
            None => panic!("vertex {} does not exist", vertex_id),
        };
        let keypoint_index = vertex
            .visual_frame_mut(frame_index)
            .add_keypoint(keypoint, landmark_id);
        let observation = KeypointIdentifier::new(vertex_id, frame_index, keypoint_index);
        self.landmarks[index].add_observation(observation);
        observation
    }

    // ---------------------------------------------------------------- 查询

    pub fn has_mission(&self, mission_id: MissionId) -> bool {
        self.missions.contains_key(&mission_id)
    }

    pub fn mission(&self, mission_id: MissionId) -> &Mission {
        self.pose_graph().mission(mission_id)
    }

    pub fn mission_ids(&self) -> Vec<MissionId> {
        self.pose_graph().mission_ids()
    }

    pub fn has_vertex(&self, vertex_id: VertexId) -> bool {
        self.vertices.contains_key(&vertex_id)
    }

    pub fn vertex(&self, vertex_id: VertexId) -> &Vertex {
        self.pose_graph().vertex(vertex_id)
    }

    pub fn vertex_mut(&mut self, vertex_id: VertexId) -> &mut Vertex {
        match self.vertices.get_mut(&vertex_id) {
            Some(vertex) => vertex,
            None => panic!("vertex {} does not exist", vertex_id),
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn has_landmark(&self, landmark_id: LandmarkId) -> bool {
        self.landmark_index.contains_key(&landmark_id)
    }

    fn landmark_slot(&self, landmark_id: LandmarkId) -> usize {
        assert!(landmark_id.is_valid(), "invalid landmark id");
        match self.landmark_index.get(&landmark_id) {
            Some(&index) => index,
            None => panic!("landmark {} does not exist", landmark_id),
        }
    }

    pub fn landmark(&self, landmark_id: LandmarkId) -> &Landmark {
        &self.landmarks[self.landmark_slot(landmark_id)]
    }

    pub fn landmark_mut(&mut self, landmark_id: LandmarkId) -> &mut Landmark {
        let index = self.landmark_slot(landmark_id);
        &mut self.landmarks[index]
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    pub fn num_landmarks(&self) -> usize {
        self.landmarks.len()
    }

    pub fn all_landmark_ids(&self) -> Vec<LandmarkId> {
        self.landmarks.iter().map(|l| l.id()).collect()
    }

    pub fn all_landmark_ids_in_mission(&self, mission_id: MissionId) -> Vec<LandmarkId> {
        assert!(
            self.has_mission(mission_id),
            "mission {} does not exist",
            mission_id
        );
        self.landmarks
            .iter()
            .filter(|l| l.mission_id() == mission_id)
            .map(|l| l.id())
            .collect()
    }

    pub fn frame_observed_landmark_ids(&self, vertex_id: VertexId, frame_index: usize) -> &[LandmarkId] {
        self.pose_graph()
            .frame_observed_landmark_ids(vertex_id, frame_index)
    }

    pub fn get_T_M_I(&self, vertex_id: VertexId) -> Isometry3<f64> {
        self.pose_graph().get_T_M_I(vertex_id)
    }

    pub fn get_T_G_I(&self, vertex_id: VertexId) -> Isometry3<f64> {
        self.pose_graph().get_T_G_I(vertex_id)
    }

    pub fn get_T_G_M(&self, mission_id: MissionId) -> Isometry3<f64> {
        self.pose_graph().get_T_G_M(mission_id)
    }

    pub fn landmark_p_G_fi(&self, landmark_id: LandmarkId) -> Vector3<f64> {
        self.pose_graph().landmark_p_G_fi(self.landmark(landmark_id))
    }

    /// 某个任务中所有顶点在全局坐标系中的位置
    pub fn all_vertex_p_G_I(&self, mission_id: MissionId) -> Vec<Vector3<f64>> {
        self.mission(mission_id)
            .vertex_ids()
            .iter()
            .map(|&id| self.get_T_G_I(id).translation.vector)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{NCamera, PinholeCamera, PinholeParameters};
    use crate::global_types::Timestamp;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn single_camera_rig() -> Arc<NCamera> {
        let camera = PinholeCamera::new(PinholeParameters::default()).unwrap();
        Arc::new(NCamera::new(
            vec![Isometry3::translation(0.0, 0.1, 0.0)],
            vec![Arc::new(camera)],
        ))
    }

    fn small_map() -> ViMap {
        let mut map = ViMap::new();
        let mission_id = MissionId::new(0);
        map.add_mission(Mission::new(
            mission_id,
            Isometry3::translation(10.0, 0.0, 0.0),
            single_camera_rig(),
        ));
        for i in 0..2u64 {
            let state = ViNodeState::builder()
                .pose(Isometry3::translation(i as f64, 0.0, 0.0))
                .build();
            map.add_vertex(Vertex::new(
                VertexId::new(i),
                mission_id,
                Timestamp::from_nanos(i as i64 * 100_000_000),
                state,
                1,
            ));
        }
        map.add_landmark(Landmark::new(LandmarkId::new(7), mission_id));
        map
    }

    #[test]
    fn test_observations_and_queries() {
        let mut map = small_map();
        let observation = map.add_observation(
            LandmarkId::new(7),
            VertexId::new(1),
            0,
            Vector2::new(100.0, 200.0),
        );
        assert_eq!(observation.keypoint_index, 0);
        assert_eq!(
            map.frame_observed_landmark_ids(VertexId::new(1), 0),
            &[LandmarkId::new(7)]
        );
        assert_eq!(map.landmark(LandmarkId::new(7)).num_observations(), 1);
        assert_eq!(
            map.all_landmark_ids_in_mission(MissionId::new(0)),
            vec![LandmarkId::new(7)]
        );
        assert_eq!(
            map.mission(MissionId::new(0)).root_vertex_id(),
            VertexId::new(0)
        );
    }

    #[test]
    fn test_poses() {
        let map = small_map();
        let T_G_I = map.get_T_G_I(VertexId::new(1));
        assert_relative_eq!(T_G_I.translation.vector, Vector3::new(11.0, 0.0, 0.0));
        let T_G_C = map.pose_graph().get_visual_frame_T_G_C(VertexId::new(1), 0);
        assert_relative_eq!(T_G_C.translation.vector, Vector3::new(11.0, -0.1, 0.0));
    }

    #[test]
    fn test_landmark_position_in_global_frame() {
        let mut map = small_map();
        map.landmark_mut(LandmarkId::new(7))
            .set_p_M_fi(Vector3::new(1.0, 2.0, 3.0));
        assert_relative_eq!(
            map.landmark_p_G_fi(LandmarkId::new(7)),
            Vector3::new(11.0, 2.0, 3.0)
        );
    }

    #[test]
    fn test_split_borrow() {
        let mut map = small_map();
        let (pose_graph, landmarks) = map.split_landmarks_mut();
        for landmark in landmarks.iter_mut() {
            let vertex = pose_graph.vertex(VertexId::new(0));
            landmark.set_p_M_fi(vertex.state().p_M_I());
        }
        assert!(map.landmark(LandmarkId::new(7)).is_triangulated());
    }

    #[test]
    #[should_panic]
    fn test_unknown_landmark_panics() {
        let map = small_map();
        map.landmark(LandmarkId::new(99));
    }
}
