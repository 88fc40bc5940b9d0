use nalgebra::{Matrix3, Matrix6, SMatrix, UnitQuaternion, Vector3, Vector6};

use super::CostFunction;
use crate::error::{Error, Result};
use crate::geometry::{lift_local_jacobian, positive_quaternion_product, skew};
use crate::global_cast::{copy_to_row_major, quaternion_from_slice, vector3_from_slice};

/// 协方差对称性的相对容差
const SYMMETRY_TOLERANCE: f64 = 1e-9;

/// 位姿先验误差
///
/// 参数块：`q_M_I`（4，`[x, y, z, w]`）、`p_M_I`（3）。
///
/// 残差 `r = sqrt_info * [2 vec(q ⊗ q_prior⁻¹); p - p_prior]`，四元数乘积取标量非负的表示。
#[derive(Debug, Clone)]
pub struct PosePriorError {
    q_M_I_prior: UnitQuaternion<f64>,
    p_M_I_prior: Vector3<f64>,
    sqrt_information: Matrix6<f64>,
}

impl PosePriorError {
    const BLOCK_SIZES: [usize; 2] = [4, 3];

    /// 由 6x6 协方差（旋转在前）构造。协方差不对称正定时返回错误。
    pub fn new(
        q_M_I_prior: UnitQuaternion<f64>,
        p_M_I_prior: Vector3<f64>,
        covariance: &Matrix6<f64>,
    ) -> Result<Self> {
        let asymmetry = (covariance - covariance.transpose()).amax();
        if !(asymmetry <= SYMMETRY_TOLERANCE * covariance.amax().max(1.0)) {
            return Err(Error::InvalidCovariance);
        }
        let information = covariance
            .cholesky()
            .ok_or(Error::InvalidCovariance)?
            .inverse();
        // 信息矩阵 = L Lᵀ，sqrt_info = Lᵀ 使得 sqrt_infoᵀ sqrt_info = 信息矩阵
        let information = (information + information.transpose()) * 0.5;
        let l = information
            .cholesky()
            .ok_or(Error::InvalidCovariance)?
            .unpack();
        Ok(Self::from_sqrt_information(q_M_I_prior, p_M_I_prior, l.transpose()))
    }

    pub fn from_sqrt_information(
        q_M_I_prior: UnitQuaternion<f64>,
        p_M_I_prior: Vector3<f64>,
        sqrt_information: Matrix6<f64>,
    ) -> Self {
        Self {
            q_M_I_prior,
            p_M_I_prior,
            sqrt_information,
        }
    }

    pub fn sqrt_information(&self) -> &Matrix6<f64> {
        &self.sqrt_information
    }
}

impl CostFunction for PosePriorError {
    fn num_residuals(&self) -> usize {
        6
    }

    fn parameter_block_sizes(&self) -> &[usize] {
        &Self::BLOCK_SIZES
    }

    fn evaluate(
        &self,
        parameters: &[&[f64]],
        residuals: &mut [f64],
        jacobians: Option<&mut [Option<&mut [f64]>]>,
    ) -> bool {
        let q_M_I = quaternion_from_slice(parameters[0]);
        let p_M_I = vector3_from_slice(parameters[1]);
        if !q_M_I.coords.iter().chain(p_M_I.iter()).all(|v| v.is_finite()) {
            return false;
        }

        let (delta_q, _) =
            positive_quaternion_product(&q_M_I, &self.q_M_I_prior.inverse().into_inner());
        let mut error = Vector6::zeros();
        error.fixed_rows_mut::<3>(0).copy_from(&(delta_q.imag() * 2.0));
        error
            .fixed_rows_mut::<3>(3)
            .copy_from(&(p_M_I - self.p_M_I_prior));
        let weighted = self.sqrt_information * error;
        residuals[..6].copy_from_slice(weighted.as_slice());

        let Some(jacobians) = jacobians else {
            return true;
        };
        if let Some(jacobian) = jacobians[0].as_deref_mut() {
            // 对 exp(δ) ⊗ q 的切空间导数；delta_q 已经带有符号
            let local: Matrix3<f64> = Matrix3::identity() * delta_q.w - skew(&delta_q.imag());
            let mut J_orientation = SMatrix::<f64, 6, 3>::zeros();
            J_orientation.fixed_view_mut::<3, 3>(0, 0).copy_from(&local);
            let lifted = lift_local_jacobian(&J_orientation, &q_M_I);
            copy_to_row_major(&(self.sqrt_information * lifted), jacobian);
        }
        if let Some(jacobian) = jacobians[1].as_deref_mut() {
            copy_to_row_major(&self.sqrt_information.fixed_view::<6, 3>(0, 3), jacobian);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_terms::{
        GradientChecker, GradientCheckerOptions, IdentityParameterization, LocalParameterization,
        QuaternionParameterization,
    };
    use crate::geometry::quaternion_plus_jacobian;
    use crate::global_cast::{dmatrix_from_row_major, quaternion_to_array, vector3_to_array};
    use approx::assert_relative_eq;
    use rand::prelude::*;
    use rand::rngs::StdRng;

    fn random_covariance(rng: &mut StdRng) -> Matrix6<f64> {
        let a = Matrix6::from_fn(|_, _| rng.gen_range(-1.0..1.0));
        a * a.transpose() + Matrix6::identity() * 0.1
    }

    fn random_rotation(rng: &mut StdRng) -> UnitQuaternion<f64> {
        UnitQuaternion::from_euler_angles(
            rng.gen_range(-3.0..3.0),
            rng.gen_range(-1.5..1.5),
            rng.gen_range(-3.0..3.0),
        )
    }

    #[test]
    fn test_zero_residual_at_prior() {
        let q = UnitQuaternion::from_euler_angles(0.2, -0.4, 1.1);
        let p = Vector3::new(1.0, -2.0, 0.5);
        let prior = PosePriorError::from_sqrt_information(q, p, Matrix6::identity());

        let q_block = quaternion_to_array(q.quaternion());
        let p_block = vector3_to_array(&p);
        let mut residuals = [1.0; 6];
        let mut J_q = [0.0; 24];
        let mut J_p = [0.0; 18];
        let mut jacobians = [Some(&mut J_q[..]), Some(&mut J_p[..])];
        assert!(prior.evaluate(&[&q_block, &p_block], &mut residuals, Some(&mut jacobians[..])));
        for r in residuals {
            assert!(r.abs() < 1e-12);
        }

        // 零残差处方向雅可比的上三行正好是 4 Pᵀ
        let J_q = dmatrix_from_row_major(6, 4, &J_q);
        let expected = quaternion_plus_jacobian(q.quaternion()).transpose() * 4.0;
        for i in 0..3 {
            for j in 0..4 {
                assert_relative_eq!(J_q[(i, j)], expected[(i, j)], epsilon = 1e-12);
            }
        }
        assert_relative_eq!(J_q.view((3, 0), (3, 4)).norm(), 0.0);

        let J_p = dmatrix_from_row_major(6, 3, &J_p);
        assert_relative_eq!(J_p.view((3, 0), (3, 3)).into_owned(), nalgebra::DMatrix::identity(3, 3));
        assert_relative_eq!(J_p.view((0, 0), (3, 3)).norm(), 0.0);
    }

    #[test]
    fn test_sign_flip_gives_same_residual() {
        let prior_q = UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3);
        let prior = PosePriorError::from_sqrt_information(prior_q, Vector3::zeros(), Matrix6::identity());
        let q = UnitQuaternion::from_euler_angles(0.15, 0.1, 0.25);
        let positive = quaternion_to_array(q.quaternion());
        let negative = quaternion_to_array(&(-q.into_inner()));
        let p_block = [0.0; 3];
        let mut r_pos = [0.0; 6];
        let mut r_neg = [0.0; 6];
        assert!(prior.evaluate(&[&positive, &p_block], &mut r_pos, None));
        assert!(prior.evaluate(&[&negative, &p_block], &mut r_neg, None));
        for (a, b) in r_pos.iter().zip(r_neg.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_sqrt_information_from_covariance() {
        let mut rng = StdRng::seed_from_u64(3);
        let covariance = random_covariance(&mut rng);
        let prior = PosePriorError::new(UnitQuaternion::identity(), Vector3::zeros(), &covariance).unwrap();
        let sqrt_info = prior.sqrt_information();
        let information = covariance.try_inverse().unwrap();
        assert_relative_eq!(sqrt_info.transpose() * sqrt_info, information, epsilon = 1e-8, max_relative = 1e-8);
        // 上三角
        for i in 0..6 {
            for j in 0..i {
                assert_eq!(sqrt_info[(i, j)], 0.0);
            }
        }
    }

    #[test]
    fn test_invalid_covariance() {
        let mut covariance = Matrix6::identity();
        covariance[(2, 2)] = -1.0;
        assert!(matches!(
            PosePriorError::new(UnitQuaternion::identity(), Vector3::zeros(), &covariance),
            Err(Error::InvalidCovariance)
        ));
        let mut asymmetric = Matrix6::identity();
        asymmetric[(0, 1)] = 0.5;
        assert!(PosePriorError::new(UnitQuaternion::identity(), Vector3::zeros(), &asymmetric).is_err());
    }

    #[test]
    fn test_skips_missing_jacobians() {
        let prior = PosePriorError::from_sqrt_information(UnitQuaternion::identity(), Vector3::zeros(), Matrix6::identity());
        let q_block = [0.1, 0.0, 0.0, 0.99];
        let p_block = [1.0, 2.0, 3.0];
        let mut residuals = [0.0; 6];
        let mut J_p = [0.0; 18];
        let mut jacobians = [None, Some(&mut J_p[..])];
        assert!(prior.evaluate(&[&q_block, &p_block], &mut residuals, Some(&mut jacobians[..])));
        assert_eq!(J_p[9], 1.0);
        assert_relative_eq!(residuals[3], 1.0);
    }

    #[test]
    fn test_gradient_check_random_samples() {
        let mut rng = StdRng::seed_from_u64(11);
        let quaternion = QuaternionParameterization;
        let position = IdentityParameterization::new(3);
        let parameterizations: [&dyn LocalParameterization; 2] = [&quaternion, &position];
        for _ in 0..25 {
            let prior_q = random_rotation(&mut rng);
            let prior_p = Vector3::from_fn(|_, _| rng.gen_range(-5.0..5.0));
            let covariance = random_covariance(&mut rng);
            let prior = PosePriorError::new(prior_q, prior_p, &covariance).unwrap();

            let q = random_rotation(&mut rng);
            let p = Vector3::from_fn(|_, _| rng.gen_range(-5.0..5.0));
            let q_block = quaternion_to_array(q.quaternion());
            let p_block = vector3_to_array(&p);

            let checker = GradientChecker::new(
                &prior,
                parameterizations.iter().map(|p| Some(*p)).collect(),
                GradientCheckerOptions::default(),
            );
            let result = checker.probe(&[&q_block, &p_block]).unwrap();
            assert!(result.passed, "max relative error {}", result.max_relative_error);
        }
    }
}
