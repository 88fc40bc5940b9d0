use std::sync::Arc;

use nalgebra::{Isometry3, Matrix2x3, Matrix3, Quaternion, UnitQuaternion, Vector2, Vector3};

use super::CostFunction;
use crate::camera::{CameraTrait, ProjectionJacobians};
use crate::config::VisualErrorConfig;
use crate::error::Result;
use crate::geometry::{euclidean_to_aid, lift_local_jacobian, skew, Unit3};
use crate::global_cast::{copy_to_row_major, quaternion_from_slice, quaternion_to_array, vector3_from_slice, vector3_to_array};
use crate::global_types::LandmarkId;
use crate::vi_map::ViMap;

/// 方位四元数范数的下限
const BEARING_NORM_EPSILON: f64 = 1e-8;

/// 相机外参 `T_C_I` 是参数块还是常量
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExtrinsicsMode {
    /// `q_C_I`（4）与 `p_C_I`（3）作为参数块
    Optimized,
    /// 固定的 `T_C_I`，不出现在参数块中
    Fixed(Isometry3<f64>),
}

/// 锚点逆深度路标点的重投影误差
///
/// 参数块依次为：锚点位置（3）、方位向量四元数（4）、逆深度（1）、`q_M_I`（4）、`p_M_I`（3）、
/// [`q_C_I`（4）、`p_C_I`（3）]、内参（4）、[畸变（k）]。外参块仅在 [ExtrinsicsMode::Optimized]
/// 时存在，畸变块仅在相机有畸变参数时存在。
///
/// ```text
/// p_M = a + u / ρ
/// p_I = R_M_Iᵀ (p_M - p_M_I)
/// p_C = R_C_I p_I + p_C_I
/// r   = (π(p_C) - z) / σ
/// ```
#[derive(Debug, Clone)]
pub struct AidReprojectionError {
    measurement: Vector2<f64>,
    pixel_sigma: f64,
    camera: Arc<dyn CameraTrait>,
    extrinsics: ExtrinsicsMode,
    block_sizes: Vec<usize>,
}

impl AidReprojectionError {
    const ANCHOR: usize = 0;
    const BEARING: usize = 1;
    const INVERSE_DEPTH: usize = 2;
    const Q_M_I: usize = 3;
    const P_M_I: usize = 4;
    const Q_C_I: usize = 5;
    const P_C_I: usize = 6;

    pub fn new(
        measurement: Vector2<f64>,
        pixel_sigma: f64,
        camera: Arc<dyn CameraTrait>,
        extrinsics: ExtrinsicsMode,
    ) -> Self {
        assert!(pixel_sigma > 0.0, "pixel sigma must be positive");
        let mut block_sizes = vec![3, 4, 1, 4, 3];
        if extrinsics == ExtrinsicsMode::Optimized {
            block_sizes.extend([4, 3]);
        }
        block_sizes.push(4);
        let num_distortion = camera.distortion_parameters().len();
        if num_distortion > 0 {
            block_sizes.push(num_distortion);
        }
        Self {
            measurement,
            pixel_sigma,
            camera,
            extrinsics,
            block_sizes,
        }
    }

    pub fn extrinsics(&self) -> &ExtrinsicsMode {
        &self.extrinsics
    }

    pub fn intrinsics_block(&self) -> usize {
        match self.extrinsics {
            ExtrinsicsMode::Optimized => Self::P_C_I + 1,
            ExtrinsicsMode::Fixed(_) => Self::P_M_I + 1,
        }
    }

    pub fn distortion_block(&self) -> Option<usize> {
        let index = self.intrinsics_block() + 1;
        (index < self.block_sizes.len()).then_some(index)
    }
}

impl CostFunction for AidReprojectionError {
    fn num_residuals(&self) -> usize {
        2
    }

    fn parameter_block_sizes(&self) -> &[usize] {
        &self.block_sizes
    }

    fn evaluate(
        &self,
        parameters: &[&[f64]],
        residuals: &mut [f64],
        jacobians: Option<&mut [Option<&mut [f64]>]>,
    ) -> bool {
        if !parameters.iter().all(|block| block.iter().all(|v| v.is_finite())) {
            return false;
        }
        let anchor = vector3_from_slice(parameters[Self::ANCHOR]);
        let q_bearing = quaternion_from_slice(parameters[Self::BEARING]);
        let inverse_depth = parameters[Self::INVERSE_DEPTH][0];
        if !(inverse_depth > 0.0) {
            return false;
        }
        let q_M_I = quaternion_from_slice(parameters[Self::Q_M_I]);
        let p_M_I = vector3_from_slice(parameters[Self::P_M_I]);
        let (q_C_I, p_C_I): (Quaternion<f64>, Vector3<f64>) = match self.extrinsics {
            ExtrinsicsMode::Optimized => (
                quaternion_from_slice(parameters[Self::Q_C_I]),
                vector3_from_slice(parameters[Self::P_C_I]),
            ),
            ExtrinsicsMode::Fixed(T_C_I) => (*T_C_I.rotation.quaternion(), T_C_I.translation.vector),
        };
        if !(q_M_I.norm() > 0.0 && q_C_I.norm() > 0.0) {
            return false;
        }
        // 零方位四元数使路标点退化到锚点
        if !(q_bearing.norm() > BEARING_NORM_EPSILON) {
            return false;
        }
        let intrinsics = parameters[self.intrinsics_block()];
        let distortion: &[f64] = match self.distortion_block() {
            Some(index) => parameters[index],
            None => &[],
        };

        let R_M_I: Matrix3<f64> = UnitQuaternion::from_quaternion(q_M_I).to_rotation_matrix().into_inner();
        let R_C_I: Matrix3<f64> = UnitQuaternion::from_quaternion(q_C_I).to_rotation_matrix().into_inner();

        let u = Unit3::direction_from_coefficients(&q_bearing);
        let p_M = anchor + u / inverse_depth;
        let p_M_rel = p_M - p_M_I;
        let p_I = R_M_I.transpose() * p_M_rel;
        let p_C = R_C_I * p_I + p_C_I;

        let mut projection_jacobians = jacobians
            .is_some()
            .then(|| ProjectionJacobians::zeros(distortion.len()));
        let (keypoint, result) =
            self.camera
                .project3_functional(&p_C, intrinsics, distortion, projection_jacobians.as_mut());
        if !result.is_valid() {
            return false;
        }
        let error = (keypoint - self.measurement) / self.pixel_sigma;
        residuals[..2].copy_from_slice(error.as_slice());

        let (Some(jacobians), Some(projection)) = (jacobians, projection_jacobians) else {
            return true;
        };
        let inv_sigma = 1.0 / self.pixel_sigma;
        let J_p_C: Matrix2x3<f64> = projection.point * inv_sigma;
        let R_C_M = R_C_I * R_M_I.transpose();
        let J_p_M = J_p_C * R_C_M;

        if let Some(jacobian) = jacobians[Self::ANCHOR].as_deref_mut() {
            copy_to_row_major(&J_p_M, jacobian);
        }
        if let Some(jacobian) = jacobians[Self::BEARING].as_deref_mut() {
            let J = J_p_M * Unit3::direction_jacobian_ambient(&q_bearing) / inverse_depth;
            copy_to_row_major(&J, jacobian);
        }
        if let Some(jacobian) = jacobians[Self::INVERSE_DEPTH].as_deref_mut() {
            let J = J_p_M * (-u / (inverse_depth * inverse_depth));
            copy_to_row_major(&J, jacobian);
        }
        if let Some(jacobian) = jacobians[Self::Q_M_I].as_deref_mut() {
            let local = J_p_C * R_C_I * R_M_I.transpose() * skew(&p_M_rel);
            copy_to_row_major(&lift_local_jacobian(&local, &q_M_I), jacobian);
        }
        if let Some(jacobian) = jacobians[Self::P_M_I].as_deref_mut() {
            copy_to_row_major(&(-J_p_M), jacobian);
        }
        if self.extrinsics == ExtrinsicsMode::Optimized {
            if let Some(jacobian) = jacobians[Self::Q_C_I].as_deref_mut() {
                let local = J_p_C * (-skew(&(R_C_I * p_I)));
                copy_to_row_major(&lift_local_jacobian(&local, &q_C_I), jacobian);
            }
            if let Some(jacobian) = jacobians[Self::P_C_I].as_deref_mut() {
                copy_to_row_major(&J_p_C, jacobian);
            }
        }
        if let Some(jacobian) = jacobians[self.intrinsics_block()].as_deref_mut() {
            copy_to_row_major(&(projection.intrinsics * inv_sigma), jacobian);
        }
        if let Some(index) = self.distortion_block() {
            if let Some(jacobian) = jacobians[index].as_deref_mut() {
                copy_to_row_major(&(projection.distortion * inv_sigma), jacobian);
            }
        }
        true
    }
}

/// 一个误差项及其参数块的当前值
#[derive(Debug, Clone)]
pub struct ResidualBlock {
    pub cost_function: AidReprojectionError,
    pub parameter_blocks: Vec<Vec<f64>>,
}

impl ResidualBlock {
    pub fn parameters(&self) -> Vec<&[f64]> {
        self.parameter_blocks.iter().map(|b| b.as_slice()).collect()
    }

    /// 当前参数下的残差，无法计算时返回 `None`
    pub fn residuals(&self) -> Option<Vector2<f64>> {
        let mut residuals = [0.0; 2];
        self.cost_function
            .evaluate(&self.parameters(), &mut residuals, None)
            .then(|| Vector2::new(residuals[0], residuals[1]))
    }
}

/// 为路标点的每个观测构建锚点逆深度重投影误差。锚点为第一个观测相机的光心（任务坐标系）。
///
/// 路标点必须已三角化；路标点与锚点重合时返回错误。
pub fn aid_residual_blocks(
    map: &ViMap,
    landmark_id: LandmarkId,
    config: &VisualErrorConfig,
) -> Result<Vec<ResidualBlock>> {
    let landmark = map.landmark(landmark_id);
    let Some(p_M_fi) = landmark.p_M_fi() else {
        panic!("landmark {} must be triangulated", landmark_id);
    };
    let Some(first) = landmark.observations().first() else {
        return Ok(Vec::new());
    };

    let pose_graph = map.pose_graph();
    let T_M_C_anchor = {
        let vertex = pose_graph.vertex(first.vertex_id);
        let ncamera = pose_graph.mission(vertex.mission_id()).ncamera();
        vertex.get_T_M_I() * ncamera.get_T_C_B(first.frame_index).inverse()
    };
    let anchor = T_M_C_anchor.translation.vector;
    let (bearing, inverse_depth) = euclidean_to_aid(p_M_fi, &anchor)?;

    let mut blocks = Vec::with_capacity(landmark.num_observations());
    for observation in landmark.observations() {
        let vertex = pose_graph.vertex(observation.vertex_id);
        let ncamera = pose_graph.mission(vertex.mission_id()).ncamera();
        let camera = ncamera.camera_shared(observation.frame_index);
        let T_C_I = *ncamera.get_T_C_B(observation.frame_index);
        let T_M_I = vertex.get_T_M_I();
        let keypoint = *vertex
            .visual_frame(observation.frame_index)
            .keypoint(observation.keypoint_index);

        let mut parameter_blocks = vec![
            vector3_to_array(&anchor).to_vec(),
            quaternion_to_array(bearing.quaternion().quaternion()).to_vec(),
            vec![inverse_depth],
            quaternion_to_array(T_M_I.rotation.quaternion()).to_vec(),
            vector3_to_array(&T_M_I.translation.vector).to_vec(),
        ];
        let extrinsics = if config.fix_extrinsics {
            ExtrinsicsMode::Fixed(T_C_I)
        } else {
            parameter_blocks.push(quaternion_to_array(T_C_I.rotation.quaternion()).to_vec());
            parameter_blocks.push(vector3_to_array(&T_C_I.translation.vector).to_vec());
            ExtrinsicsMode::Optimized
        };
        parameter_blocks.push(camera.intrinsics().to_vec());
        let distortion = camera.distortion_parameters();
        if !distortion.is_empty() {
            parameter_blocks.push(distortion);
        }

        let cost_function = AidReprojectionError::new(keypoint, config.pixel_sigma, camera, extrinsics);
        blocks.push(ResidualBlock {
            cost_function,
            parameter_blocks,
        });
    }
    Ok(blocks)
}
