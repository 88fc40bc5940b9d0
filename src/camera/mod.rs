//! 相机模型
//!
//! 投影、反投影以及投影对点、内参和畸变参数的雅可比。
#![allow(non_snake_case)]

mod distortion;
mod pinhole_camera;
pub use distortion::DistortionType;
pub use pinhole_camera::{PinholeCamera, PinholeParameters};

use std::sync::Arc;

use nalgebra::{Isometry3, Matrix2x3, Matrix2x4, Matrix2xX, Vector2, Vector3};

/// 投影结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionResult {
    /// 投影落在图像内
    KeypointVisible,
    /// 投影有效但落在图像外
    KeypointOutsideImageBox,
    /// 点在相机后方
    PointBehindCamera,
    /// 投影无效（数值不有限、畸变模型无解等）
    ProjectionInvalid,
}

impl ProjectionResult {
    /// 投影在数值上有效（可能在图像外）
    #[inline]
    pub fn is_valid(&self) -> bool {
        matches!(
            self,
            ProjectionResult::KeypointVisible | ProjectionResult::KeypointOutsideImageBox
        )
    }

    #[inline]
    pub fn is_keypoint_visible(&self) -> bool {
        *self == ProjectionResult::KeypointVisible
    }
}

/// 像素坐标对相机系点、内参 `[fx, fy, cx, cy]` 和畸变参数的雅可比
#[derive(Debug, Clone)]
pub struct ProjectionJacobians {
    pub point: Matrix2x3<f64>,
    pub intrinsics: Matrix2x4<f64>,
    pub distortion: Matrix2xX<f64>,
}

impl ProjectionJacobians {
    pub fn zeros(num_distortion_parameters: usize) -> Self {
        Self {
            point: Matrix2x3::zeros(),
            intrinsics: Matrix2x4::zeros(),
            distortion: Matrix2xX::zeros(num_distortion_parameters),
        }
    }
}

/// 相机的trait
pub trait CameraTrait: Send + Sync + std::fmt::Debug {
    fn image_width(&self) -> u32;
    fn image_height(&self) -> u32;

    /// 内参 `[fx, fy, cx, cy]`
    fn intrinsics(&self) -> [f64; 4];
    /// 畸变参数，长度由畸变模型决定
    fn distortion_parameters(&self) -> Vec<f64>;

    /// 使用外部给定的内参和畸变参数投影，用于优化时参数块不断变化的情况
    fn project3_functional(
        &self,
        p_C: &Vector3<f64>,
        intrinsics: &[f64],
        distortion: &[f64],
        jacobians: Option<&mut ProjectionJacobians>,
    ) -> (Vector2<f64>, ProjectionResult);

    /// 将像素坐标反投影为相机系下的方向（`z = 1`），去畸变失败时返回 `None`
    fn back_project3(&self, keypoint: &Vector2<f64>) -> Option<Vector3<f64>>;

    fn project3(&self, p_C: &Vector3<f64>) -> (Vector2<f64>, ProjectionResult) {
        let intrinsics = self.intrinsics();
        let distortion = self.distortion_parameters();
        self.project3_functional(p_C, &intrinsics, &distortion, None)
    }

    fn is_keypoint_visible(&self, keypoint: &Vector2<f64>) -> bool {
        keypoint.x >= 0.0
            && keypoint.y >= 0.0
            && keypoint.x < self.image_width() as f64
            && keypoint.y < self.image_height() as f64
    }
}

/// 相机组：每个相机及其相对于机体系的外参 `T_C_B`
#[derive(Debug, Clone)]
pub struct NCamera {
    cameras: Vec<Arc<dyn CameraTrait>>,
    T_C_B: Vec<Isometry3<f64>>,
}

impl NCamera {
    pub fn new(T_C_B: Vec<Isometry3<f64>>, cameras: Vec<Arc<dyn CameraTrait>>) -> Self {
        assert_eq!(
            T_C_B.len(),
            cameras.len(),
            "each camera in the rig needs exactly one extrinsic"
        );
        Self { cameras, T_C_B }
    }

    #[inline]
    pub fn num_cameras(&self) -> usize {
        self.cameras.len()
    }

    #[inline]
    pub fn camera(&self, index: usize) -> &dyn CameraTrait {
        self.cameras[index].as_ref()
    }

    #[inline]
    pub fn camera_shared(&self, index: usize) -> Arc<dyn CameraTrait> {
        self.cameras[index].clone()
    }

    #[inline]
    pub fn get_T_C_B(&self, index: usize) -> &Isometry3<f64> {
        &self.T_C_B[index]
    }
}
