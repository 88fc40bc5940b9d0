use nalgebra::{Quaternion, UnitQuaternion, Vector2, Vector3};

use super::LocalParameterization;
use crate::geometry::{quaternion_plus_jacobian, Unit3};
use crate::global_cast::{copy_to_row_major, quaternion_from_slice, quaternion_to_array};

/// 四元数 `[x, y, z, w]`，更新 `q ← exp(δ) ⊗ q`
#[derive(Debug, Clone, Copy, Default)]
pub struct QuaternionParameterization;

impl LocalParameterization for QuaternionParameterization {
    fn global_size(&self) -> usize {
        4
    }

    fn local_size(&self) -> usize {
        3
    }

    fn plus(&self, x: &[f64], delta: &[f64], x_plus_delta: &mut [f64]) -> bool {
        let q = quaternion_from_slice(x);
        let delta = Vector3::new(delta[0], delta[1], delta[2]);
        if !delta.iter().all(|v| v.is_finite()) {
            return false;
        }
        let dq: Quaternion<f64> = UnitQuaternion::from_scaled_axis(delta).into_inner();
        x_plus_delta.copy_from_slice(&quaternion_to_array(&(dq * q)));
        true
    }

    fn compute_jacobian(&self, x: &[f64], jacobian: &mut [f64]) -> bool {
        let q = quaternion_from_slice(x);
        copy_to_row_major(&quaternion_plus_jacobian(&q), jacobian);
        true
    }
}

/// 单位方位向量，存储为四元数 `[x, y, z, w]`，局部维度 2
#[derive(Debug, Clone, Copy, Default)]
pub struct Unit3Parameterization;

impl Unit3Parameterization {
    fn unit3(x: &[f64]) -> Unit3 {
        Unit3::from_quaternion(UnitQuaternion::from_quaternion(quaternion_from_slice(x)))
    }
}

impl LocalParameterization for Unit3Parameterization {
    fn global_size(&self) -> usize {
        4
    }

    fn local_size(&self) -> usize {
        2
    }

    fn plus(&self, x: &[f64], delta: &[f64], x_plus_delta: &mut [f64]) -> bool {
        let delta = Vector2::new(delta[0], delta[1]);
        if !delta.iter().all(|v| v.is_finite()) {
            return false;
        }
        let updated = Self::unit3(x).plus(&delta);
        x_plus_delta.copy_from_slice(&quaternion_to_array(updated.quaternion().quaternion()));
        true
    }

    fn compute_jacobian(&self, x: &[f64], jacobian: &mut [f64]) -> bool {
        copy_to_row_major(&Self::unit3(x).plus_jacobian(), jacobian);
        true
    }
}

/// 欧氏参数块，`x + δ`
#[derive(Debug, Clone, Copy)]
pub struct IdentityParameterization {
    size: usize,
}

impl IdentityParameterization {
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "parameter block size must be positive");
        Self { size }
    }
}

impl LocalParameterization for IdentityParameterization {
    fn global_size(&self) -> usize {
        self.size
    }

    fn local_size(&self) -> usize {
        self.size
    }

    fn plus(&self, x: &[f64], delta: &[f64], x_plus_delta: &mut [f64]) -> bool {
        for ((out, x), d) in x_plus_delta.iter_mut().zip(x).zip(delta) {
            *out = x + d;
        }
        true
    }

    fn compute_jacobian(&self, _x: &[f64], jacobian: &mut [f64]) -> bool {
        jacobian.fill(0.0);
        for i in 0..self.size {
            jacobian[i * self.size + i] = 1.0;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_quaternion_plus_stays_unit() {
        let q = UnitQuaternion::from_euler_angles(0.4, -0.2, 2.0);
        let x = quaternion_to_array(q.quaternion());
        let mut out = [0.0; 4];
        assert!(QuaternionParameterization.plus(&x, &[0.3, -0.1, 0.05], &mut out));
        let norm = out.iter().map(|v| v * v).sum::<f64>().sqrt();
        assert_relative_eq!(norm, 1.0, epsilon = 1e-12);

        assert!(QuaternionParameterization.plus(&x, &[0.0; 3], &mut out));
        for (a, b) in out.iter().zip(x.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-15);
        }
    }

    #[test]
    fn test_quaternion_jacobian_numeric() {
        let q = UnitQuaternion::from_euler_angles(-1.0, 0.3, 0.7);
        let x = quaternion_to_array(q.quaternion());
        let mut jacobian = [0.0; 12];
        QuaternionParameterization.compute_jacobian(&x, &mut jacobian);
        let h = 1e-6;
        for k in 0..3 {
            let mut delta = [0.0; 3];
            delta[k] = h;
            let (mut plus, mut minus) = ([0.0; 4], [0.0; 4]);
            QuaternionParameterization.plus(&x, &delta, &mut plus);
            delta[k] = -h;
            QuaternionParameterization.plus(&x, &delta, &mut minus);
            for i in 0..4 {
                let numeric = (plus[i] - minus[i]) / (2.0 * h);
                assert_relative_eq!(numeric, jacobian[i * 3 + k], epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn test_unit3_plus_keeps_norm() {
        let bearing = Unit3::from_direction(&Vector3::new(0.1, -0.3, 0.8)).unwrap();
        let x = quaternion_to_array(bearing.quaternion().quaternion());
        let mut out = [0.0; 4];
        assert!(Unit3Parameterization.plus(&x, &[0.2, -0.4], &mut out));
        let direction = Unit3::direction_from_coefficients(&quaternion_from_slice(&out));
        assert_relative_eq!(direction.norm(), 1.0, epsilon = 1e-12);
        assert!(!Unit3Parameterization.plus(&x, &[f64::NAN, 0.0], &mut out));
    }

    #[test]
    fn test_identity() {
        let p = IdentityParameterization::new(3);
        let mut out = [0.0; 3];
        p.plus(&[1.0, 2.0, 3.0], &[0.5, -1.0, 0.0], &mut out);
        assert_eq!(out, [1.5, 1.0, 3.0]);
        let mut jacobian = [7.0; 9];
        p.compute_jacobian(&out, &mut jacobian);
        assert_eq!(jacobian, [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
    }
}
