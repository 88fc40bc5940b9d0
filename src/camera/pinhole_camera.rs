use nalgebra::{Matrix2, Matrix2x3, Matrix2x4, Matrix2xX, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use super::{CameraTrait, DistortionType, ProjectionJacobians, ProjectionResult};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinholeParameters {
    pub camera_name: String,
    // size
    pub image_width: u32,
    pub image_height: u32,
    // intrinsic
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    // distortion
    #[serde(default)]
    pub distortion: DistortionType,
}

impl Default for PinholeParameters {
    fn default() -> Self {
        Self {
            camera_name: "cam0".into(),
            image_width: 752,
            image_height: 480,
            fx: 458.654,
            fy: 457.296,
            cx: 367.215,
            cy: 248.375,
            distortion: DistortionType::None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PinholeCamera {
    pub parameters: PinholeParameters,
}

impl PinholeCamera {
    pub fn new(parameters: PinholeParameters) -> Result<Self> {
        let p = &parameters;
        if !(p.fx > 0.0 && p.fy > 0.0) || !p.cx.is_finite() || !p.cy.is_finite() {
            return Err(Error::InvalidCameraParameters(format!(
                "focal lengths must be positive, got fx={} fy={}",
                p.fx, p.fy
            )));
        }
        if p.image_width == 0 || p.image_height == 0 {
            return Err(Error::InvalidCameraParameters(
                "image size must be non-zero".into(),
            ));
        }
        Ok(Self { parameters })
    }

    #[inline]
    pub fn distortion(&self) -> &DistortionType {
        &self.parameters.distortion
    }
}

impl CameraTrait for PinholeCamera {
    fn image_width(&self) -> u32 {
        self.parameters.image_width
    }

    fn image_height(&self) -> u32 {
        self.parameters.image_height
    }

    fn intrinsics(&self) -> [f64; 4] {
        let p = &self.parameters;
        [p.fx, p.fy, p.cx, p.cy]
    }

    fn distortion_parameters(&self) -> Vec<f64> {
        self.parameters.distortion.parameters()
    }

    fn project3_functional(
        &self,
        p_C: &Vector3<f64>,
        intrinsics: &[f64],
        distortion: &[f64],
        jacobians: Option<&mut ProjectionJacobians>,
    ) -> (Vector2<f64>, ProjectionResult) {
        assert_eq!(intrinsics.len(), 4, "pinhole intrinsics are [fx, fy, cx, cy]");
        let (fx, fy, cx, cy) = (intrinsics[0], intrinsics[1], intrinsics[2], intrinsics[3]);

        if !p_C.iter().all(|v| v.is_finite()) {
            return (Vector2::zeros(), ProjectionResult::ProjectionInvalid);
        }
        if p_C.z <= 0.0 {
            return (Vector2::zeros(), ProjectionResult::PointBehindCamera);
        }

        let inv_z = 1.0 / p_C.z;
        let m = Vector2::new(p_C.x * inv_z, p_C.y * inv_z);

        let mut jacobian_m = Matrix2::identity();
        let mut jacobian_dist = Matrix2xX::zeros(distortion.len());
        let want_jacobians = jacobians.is_some();
        let d = self.parameters.distortion.distort_with_parameters(
            distortion,
            &m,
            want_jacobians.then_some(&mut jacobian_m),
            want_jacobians.then_some(&mut jacobian_dist),
        );
        let keypoint = Vector2::new(fx * d.x + cx, fy * d.y + cy);
        if !keypoint.iter().all(|v| v.is_finite()) {
            return (keypoint, ProjectionResult::ProjectionInvalid);
        }

        if let Some(jac) = jacobians {
            let focal = Matrix2::new(fx, 0.0, 0.0, fy);
            let dm_dp = Matrix2x3::new(
                inv_z,
                0.0,
                -p_C.x * inv_z * inv_z,
                0.0,
                inv_z,
                -p_C.y * inv_z * inv_z,
            );
            jac.point = focal * jacobian_m * dm_dp;
            jac.intrinsics = Matrix2x4::new(d.x, 0.0, 1.0, 0.0, 0.0, d.y, 0.0, 1.0);
            jac.distortion = focal * jacobian_dist;
        }

        let result = if self.is_keypoint_visible(&keypoint) {
            ProjectionResult::KeypointVisible
        } else {
            ProjectionResult::KeypointOutsideImageBox
        };
        (keypoint, result)
    }

    fn back_project3(&self, keypoint: &Vector2<f64>) -> Option<Vector3<f64>> {
        let p = &self.parameters;
        let distorted = Vector2::new((keypoint.x - p.cx) / p.fx, (keypoint.y - p.cy) / p.fy);
        let m = p.distortion.undistort(&distorted)?;
        Some(Vector3::new(m.x, m.y, 1.0))
    }
}
