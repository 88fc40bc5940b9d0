#![allow(non_snake_case)]

use nalgebra::{Isometry3, SMatrix, UnitQuaternion, Vector2, Vector3};

use crate::global_types::{LandmarkId, MissionId, Timestamp, VertexId};

/// 状态协方差，顺序 `[p, θ, v, b_a, b_g]`
pub type StateCovariance = SMatrix<f64, 15, 15>;

/// 顶点状态：位姿、速度、IMU 零偏以及可选的协方差
#[derive(Debug, Clone, PartialEq)]
pub struct ViNodeState {
    pub T_M_I: Isometry3<f64>,
    pub v_M: Vector3<f64>,
    pub acc_bias: Vector3<f64>,
    pub gyro_bias: Vector3<f64>,
    pub covariance: Option<StateCovariance>,
}

impl Default for ViNodeState {
    fn default() -> Self {
        Self {
            T_M_I: Isometry3::identity(),
            v_M: Vector3::zeros(),
            acc_bias: Vector3::zeros(),
            gyro_bias: Vector3::zeros(),
            covariance: None,
        }
    }
}

impl ViNodeState {
    pub fn builder() -> ViNodeStateBuilder {
        ViNodeStateBuilder::default()
    }

    #[inline]
    pub fn p_M_I(&self) -> Vector3<f64> {
        self.T_M_I.translation.vector
    }

    #[inline]
    pub fn q_M_I(&self) -> &UnitQuaternion<f64> {
        &self.T_M_I.rotation
    }
}

#[derive(Debug, Default)]
pub struct ViNodeStateBuilder {
    state: ViNodeState,
}

impl ViNodeStateBuilder {
    pub fn pose(mut self, T_M_I: Isometry3<f64>) -> Self {
        self.state.T_M_I = T_M_I;
        self
    }

    pub fn velocity(mut self, v_M: Vector3<f64>) -> Self {
        self.state.v_M = v_M;
        self
    }

    pub fn biases(mut self, acc_bias: Vector3<f64>, gyro_bias: Vector3<f64>) -> Self {
        self.state.acc_bias = acc_bias;
        self.state.gyro_bias = gyro_bias;
        self
    }

    pub fn covariance(mut self, covariance: StateCovariance) -> Self {
        self.state.covariance = Some(covariance);
        self
    }

    pub fn build(self) -> ViNodeState {
        self.state
    }
}

/// 一个相机在某一时刻的特征点测量，以及每个特征点对应的路标点
#[derive(Debug, Clone, Default)]
pub struct VisualFrame {
    keypoints: Vec<Vector2<f64>>,
    landmark_ids: Vec<LandmarkId>,
}

impl VisualFrame {
    pub fn num_keypoints(&self) -> usize {
        self.keypoints.len()
    }

    pub fn keypoint(&self, index: usize) -> &Vector2<f64> {
        &self.keypoints[index]
    }

    pub fn keypoints(&self) -> &[Vector2<f64>] {
        &self.keypoints
    }

    /// 与特征点一一对应；未关联的特征点为 [LandmarkId::INVALID]
    pub fn landmark_ids(&self) -> &[LandmarkId] {
        &self.landmark_ids
    }

    /// 添加特征点，返回其序号
    pub fn add_keypoint(&mut self, keypoint: Vector2<f64>, landmark_id: LandmarkId) -> usize {
        self.keypoints.push(keypoint);
        self.landmark_ids.push(landmark_id);
        self.keypoints.len() - 1
    }
}

/// 位姿图顶点
#[derive(Debug, Clone)]
pub struct Vertex {
    id: VertexId,
    mission_id: MissionId,
    timestamp: Timestamp,
    state: ViNodeState,
    frames: Vec<VisualFrame>,
}

impl Vertex {
    pub fn new(
        id: VertexId,
        mission_id: MissionId,
        timestamp: Timestamp,
        state: ViNodeState,
        num_frames: usize,
    ) -> Self {
        assert!(id.is_valid(), "vertex id must be valid");
        Self {
            id,
            mission_id,
            timestamp,
            state,
            frames: vec![VisualFrame::default(); num_frames],
        }
    }

    #[inline]
    pub fn id(&self) -> VertexId {
        self.id
    }

    #[inline]
    pub fn mission_id(&self) -> MissionId {
        self.mission_id
    }

    #[inline]
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    #[inline]
    pub fn state(&self) -> &ViNodeState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ViNodeState {
        &mut self.state
    }

    #[inline]
    pub fn get_T_M_I(&self) -> &Isometry3<f64> {
        &self.state.T_M_I
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn visual_frame(&self, frame_index: usize) -> &VisualFrame {
        &self.frames[frame_index]
    }

    pub fn visual_frame_mut(&mut self, frame_index: usize) -> &mut VisualFrame {
        &mut self.frames[frame_index]
    }

    /// 某一帧观测到的路标点 id（与特征点一一对应）
    pub fn frame_observed_landmark_ids(&self, frame_index: usize) -> &[LandmarkId] {
        self.frames[frame_index].landmark_ids()
    }
}

#[test]
fn test_state_builder() {
    let T_M_I = Isometry3::translation(1.0, 2.0, 3.0);
    let state = ViNodeState::builder()
        .pose(T_M_I)
        .velocity(Vector3::new(0.5, 0.0, 0.0))
        .covariance(StateCovariance::identity())
        .build();
    assert_eq!(state.p_M_I(), Vector3::new(1.0, 2.0, 3.0));
    assert_eq!(state.acc_bias, Vector3::zeros());
    assert!(state.covariance.is_some());
}

#[test]
fn test_visual_frame() {
    let mut vertex = Vertex::new(
        VertexId::new(1),
        MissionId::new(0),
        Timestamp::from_nanos(0),
        ViNodeState::default(),
        2,
    );
    let index = vertex
        .visual_frame_mut(1)
        .add_keypoint(Vector2::new(10.0, 20.0), LandmarkId::new(5));
    assert_eq!(index, 0);
    assert_eq!(vertex.frame_observed_landmark_ids(1), &[LandmarkId::new(5)]);
    assert!(vertex.frame_observed_landmark_ids(0).is_empty());
}
