#![allow(non_snake_case)]

use std::sync::Arc;

use nalgebra::Isometry3;

use crate::camera::NCamera;
use crate::global_types::{MissionId, VertexId};

/// 一次建图任务：基坐标系、根顶点与相机组
#[derive(Debug, Clone)]
pub struct Mission {
    id: MissionId,
    T_G_M: Isometry3<f64>,
    root_vertex_id: VertexId,
    ncamera: Arc<NCamera>,
    vertex_ids: Vec<VertexId>,
}

impl Mission {
    pub fn new(id: MissionId, T_G_M: Isometry3<f64>, ncamera: Arc<NCamera>) -> Self {
        assert!(id.is_valid(), "mission id must be valid");
        Self {
            id,
            T_G_M,
            root_vertex_id: VertexId::INVALID,
            ncamera,
            vertex_ids: Vec::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> MissionId {
        self.id
    }

    #[inline]
    pub fn get_T_G_M(&self) -> &Isometry3<f64> {
        &self.T_G_M
    }

    /// 第一个加入的顶点
    #[inline]
    pub fn root_vertex_id(&self) -> VertexId {
        self.root_vertex_id
    }

    #[inline]
    pub fn ncamera(&self) -> &NCamera {
        &self.ncamera
    }

    pub fn vertex_ids(&self) -> &[VertexId] {
        &self.vertex_ids
    }

    pub(super) fn push_vertex(&mut self, vertex_id: VertexId) {
        if !self.root_vertex_id.is_valid() {
            self.root_vertex_id = vertex_id;
        }
        self.vertex_ids.push(vertex_id);
    }
}
