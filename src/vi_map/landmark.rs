use nalgebra::Vector3;

use crate::global_types::{LandmarkId, MissionId, VertexId};

/// 路标点质量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Quality {
    /// 未评估，或位置改变后尚未重新评估
    #[default]
    Unknown,
    Good,
    Bad,
}

/// 一次观测：顶点、相机组中的帧序号、帧内特征点序号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeypointIdentifier {
    pub vertex_id: VertexId,
    pub frame_index: usize,
    pub keypoint_index: usize,
}

impl KeypointIdentifier {
    pub fn new(vertex_id: VertexId, frame_index: usize, keypoint_index: usize) -> Self {
        Self {
            vertex_id,
            frame_index,
            keypoint_index,
        }
    }
}

#[allow(non_snake_case)]
#[derive(Debug, Clone)]
pub struct Landmark {
    id: LandmarkId,
    /// 位置所在的任务坐标系
    mission_id: MissionId,
    p_M_fi: Option<Vector3<f64>>,
    quality: Quality,
    observations: Vec<KeypointIdentifier>,
}

#[allow(non_snake_case)]
impl Landmark {
    pub fn new(id: LandmarkId, mission_id: MissionId) -> Self {
        assert!(id.is_valid(), "landmark id must be valid");
        Self {
            id,
            mission_id,
            p_M_fi: None,
            quality: Quality::Unknown,
            observations: Vec::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> LandmarkId {
        self.id
    }

    #[inline]
    pub fn mission_id(&self) -> MissionId {
        self.mission_id
    }

    /// 未三角化时为 `None`
    #[inline]
    pub fn p_M_fi(&self) -> Option<&Vector3<f64>> {
        self.p_M_fi.as_ref()
    }

    #[inline]
    pub fn is_triangulated(&self) -> bool {
        self.p_M_fi.is_some()
    }

    /// 设置位置，同时把质量重置为 [Quality::Unknown]
    pub fn set_p_M_fi(&mut self, p_M_fi: Vector3<f64>) {
        self.p_M_fi = Some(p_M_fi);
        self.quality = Quality::Unknown;
    }

    #[inline]
    pub fn quality(&self) -> Quality {
        self.quality
    }

    #[inline]
    pub fn set_quality(&mut self, quality: Quality) {
        self.quality = quality;
    }

    pub fn observations(&self) -> &[KeypointIdentifier] {
        &self.observations
    }

    pub fn num_observations(&self) -> usize {
        self.observations.len()
    }

    pub fn add_observation(&mut self, observation: KeypointIdentifier) {
        self.observations.push(observation);
    }

    /// 被多少个不同的顶点观测到
    pub fn num_observer_vertices(&self) -> usize {
        let mut vertices: Vec<VertexId> = self.observations.iter().map(|o| o.vertex_id).collect();
        vertices.sort();
        vertices.dedup();
        vertices.len()
    }
}

#[test]
fn test_set_position_resets_quality() {
    let mut landmark = Landmark::new(LandmarkId::new(1), MissionId::new(0));
    assert!(!landmark.is_triangulated());
    landmark.set_quality(Quality::Good);
    landmark.set_p_M_fi(Vector3::new(1.0, 2.0, 3.0));
    assert_eq!(landmark.quality(), Quality::Unknown);
    assert_eq!(landmark.p_M_fi(), Some(&Vector3::new(1.0, 2.0, 3.0)));
}

#[test]
fn test_observer_vertices() {
    let mut landmark = Landmark::new(LandmarkId::new(1), MissionId::new(0));
    landmark.add_observation(KeypointIdentifier::new(VertexId::new(0), 0, 3));
    landmark.add_observation(KeypointIdentifier::new(VertexId::new(0), 1, 7));
    landmark.add_observation(KeypointIdentifier::new(VertexId::new(2), 0, 1));
    assert_eq!(landmark.num_observations(), 3);
    assert_eq!(landmark.num_observer_vertices(), 2);
}
