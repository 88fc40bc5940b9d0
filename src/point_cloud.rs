//! 点云
//!
//! 结构体数组形式：位置必有，颜色、标量和法向量可选（为空表示没有）。

use std::path::Path;

use anyhow::Context;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::vi_map::{Quality, ViMap};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointCloud {
    /// `[x0, y0, z0, x1, ...]`
    pub xyz: Vec<f64>,
    /// `[r0, g0, b0, ...]`
    pub colors: Vec<u8>,
    pub scalars: Vec<f64>,
    pub normals: Vec<f64>,
}

impl PointCloud {
    pub fn with_capacity(num_points: usize) -> Self {
        Self {
            xyz: Vec::with_capacity(3 * num_points),
            ..Default::default()
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.xyz.len() / 3
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.xyz.is_empty()
    }

    pub fn has_colors(&self) -> bool {
        !self.colors.is_empty()
    }

    pub fn has_scalars(&self) -> bool {
        !self.scalars.is_empty()
    }

    pub fn has_normals(&self) -> bool {
        !self.normals.is_empty()
    }

    pub fn push_point(&mut self, p: &Vector3<f64>) {
        self.xyz.extend_from_slice(&[p.x, p.y, p.z]);
    }

    pub fn point(&self, index: usize) -> Vector3<f64> {
        Vector3::from_column_slice(&self.xyz[3 * index..3 * index + 3])
    }

    pub fn points(&self) -> impl Iterator<Item = Vector3<f64>> + '_ {
        self.xyz.chunks_exact(3).map(Vector3::from_column_slice)
    }

    /// 各可选通道要么为空，要么与点数一致
    pub fn is_consistent(&self) -> bool {
        let n = self.len();
        self.xyz.len() % 3 == 0
            && (self.colors.is_empty() || self.colors.len() == 3 * n)
            && (self.scalars.is_empty() || self.scalars.len() == n)
            && (self.normals.is_empty() || self.normals.len() == 3 * n)
    }

    /// 质心，空点云返回 `None`
    pub fn centroid(&self) -> Option<Vector3<f64>> {
        if self.is_empty() {
            return None;
        }
        Some(self.points().sum::<Vector3<f64>>() / self.len() as f64)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let file = std::fs::File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        serde_json::to_writer(std::io::BufWriter::new(file), self)?;
        Ok(())
    }
}

fn quality_color(quality: Quality) -> [u8; 3] {
    match quality {
        Quality::Good => [0, 200, 0],
        Quality::Bad => [200, 0, 0],
        Quality::Unknown => [128, 128, 128],
    }
}

/// 把已三角化的路标点转为全局坐标系下的点云。
///
/// 颜色表示质量，标量为观测数量。`only_good` 为 `true` 时只保留 Good 路标点。
pub fn landmarks_to_point_cloud(map: &ViMap, only_good: bool) -> PointCloud {
    let pose_graph = map.pose_graph();
    let mut cloud = PointCloud::with_capacity(map.num_landmarks());
    for landmark in map.landmarks() {
        if !landmark.is_triangulated() || (only_good && landmark.quality() != Quality::Good) {
            continue;
        }
        cloud.push_point(&pose_graph.landmark_p_G_fi(landmark));
        cloud.colors.extend_from_slice(&quality_color(landmark.quality()));
        cloud.scalars.push(landmark.num_observations() as f64);
    }
    cloud
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::global_types::LandmarkId;
    use crate::test_helpers::observed_landmark_map;
    use crate::vi_map::Landmark;

    #[test]
    fn test_landmarks_to_point_cloud() {
        let p = Vector3::new(0.0, 0.0, 1.0);
        let (mut map, id) = observed_landmark_map(&[Vector3::new(0.0, 0.0, -1.0), Vector3::new(2.0, 0.0, 0.0)], p);
        let mission_id = map.mission_ids()[0];
        // 未三角化的路标点不输出
        map.add_landmark(Landmark::new(LandmarkId::new(5), mission_id));

        let cloud = landmarks_to_point_cloud(&map, false);
        assert_eq!(cloud.len(), 1);
        assert!(cloud.is_consistent());
        assert_eq!(cloud.point(0), p);
        assert_eq!(cloud.scalars, vec![2.0]);
        assert!(!cloud.has_normals());

        assert!(landmarks_to_point_cloud(&map, true).is_empty());
        map.landmark_mut(id).set_quality(Quality::Good);
        let cloud = landmarks_to_point_cloud(&map, true);
        assert_eq!(cloud.len(), 1);
        assert_eq!(cloud.colors, vec![0, 200, 0]);
    }

    #[test]
    fn test_centroid_and_consistency() {
        let mut cloud = PointCloud::default();
        assert!(cloud.centroid().is_none());
        cloud.push_point(&Vector3::new(1.0, 0.0, 0.0));
        cloud.push_point(&Vector3::new(3.0, 2.0, 0.0));
        assert_eq!(cloud.centroid(), Some(Vector3::new(2.0, 1.0, 0.0)));
        assert!(cloud.is_consistent());
        cloud.scalars.push(1.0);
        assert!(!cloud.is_consistent());
        assert_eq!(cloud.points().count(), 2);
    }
}
