use nalgebra::{DMatrix, DVector};

use super::{CostFunction, LocalParameterization};
use crate::error::{Error, Result};
use crate::global_cast::dmatrix_from_row_major;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientCheckerOptions {
    /// 有限差分步长（切空间）
    pub step_size: f64,
    /// 允许的最大误差 `|a - n| / max(|a|, |n|, absolute_floor)`
    pub relative_tolerance: f64,
    /// 分母的下限。幅值低于它的元素按绝对误差 `|a - n| / absolute_floor` 比较
    pub absolute_floor: f64,
    /// 是否使用 Richardson 外推（步长 h 与 h/2）
    pub use_richardson_extrapolation: bool,
}

impl Default for GradientCheckerOptions {
    fn default() -> Self {
        Self {
            step_size: 1e-4,
            relative_tolerance: 1e-6,
            absolute_floor: 1.0,
            use_richardson_extrapolation: true,
        }
    }
}

/// 检查结果。雅可比都是切空间上的（解析雅可比已乘以局部参数化的雅可比）。
#[derive(Debug, Clone)]
pub struct GradientCheckResult {
    pub residuals: DVector<f64>,
    pub analytic_jacobians: Vec<DMatrix<f64>>,
    pub numeric_jacobians: Vec<DMatrix<f64>>,
    pub max_relative_error: f64,
    pub passed: bool,
}

/// 用中心差分检查代价函数的解析雅可比
pub struct GradientChecker<'a> {
    cost_function: &'a dyn CostFunction,
    parameterizations: Vec<Option<&'a dyn LocalParameterization>>,
    options: GradientCheckerOptions,
}

impl<'a> GradientChecker<'a> {
    /// `parameterizations[i]` 为 `None` 时第 i 个参数块按欧氏空间处理
    pub fn new(
        cost_function: &'a dyn CostFunction,
        parameterizations: Vec<Option<&'a dyn LocalParameterization>>,
        options: GradientCheckerOptions,
    ) -> Self {
        let block_sizes = cost_function.parameter_block_sizes();
        assert_eq!(
            parameterizations.len(),
            block_sizes.len(),
            "one parameterization slot per parameter block"
        );
        for (parameterization, &size) in parameterizations.iter().zip(block_sizes) {
            if let Some(parameterization) = parameterization {
                assert_eq!(parameterization.global_size(), size, "parameterization size mismatch");
            }
        }
        Self {
            cost_function,
            parameterizations,
            options,
        }
    }

    fn local_size(&self, block: usize) -> usize {
        match self.parameterizations[block] {
            Some(p) => p.local_size(),
            None => self.cost_function.parameter_block_sizes()[block],
        }
    }

    /// 切空间到参数块的雅可比（`global x local`）
    fn plus_jacobian(&self, block: usize, x: &[f64]) -> Result<DMatrix<f64>> {
        let global_size = x.len();
        match self.parameterizations[block] {
            Some(p) => {
                let mut buffer = vec![0.0; global_size * p.local_size()];
                if !p.compute_jacobian(x, &mut buffer) {
                    return Err(Error::CostEvaluationFailed);
                }
                Ok(dmatrix_from_row_major(global_size, p.local_size(), &buffer))
            }
            None => Ok(DMatrix::identity(global_size, global_size)),
        }
    }

    fn plus(&self, block: usize, x: &[f64], delta: &[f64]) -> Result<Vec<f64>> {
        let mut out = vec![0.0; x.len()];
        match self.parameterizations[block] {
            Some(p) => {
                if !p.plus(x, delta, &mut out) {
                    return Err(Error::CostEvaluationFailed);
                }
            }
            None => {
                for ((o, x), d) in out.iter_mut().zip(x).zip(delta) {
                    *o = x + d;
                }
            }
        }
        Ok(out)
    }

    fn residuals_at(&self, parameters: &[Vec<f64>]) -> Result<DVector<f64>> {
        let views: Vec<&[f64]> = parameters.iter().map(|p| p.as_slice()).collect();
        let mut residuals = vec![0.0; self.cost_function.num_residuals()];
        if !self.cost_function.evaluate(&views, &mut residuals, None) {
            return Err(Error::CostEvaluationFailed);
        }
        Ok(DVector::from_vec(residuals))
    }

    /// 第 `block` 个参数块第 `k` 个切空间方向上的中心差分
    fn central_difference(&self, parameters: &[Vec<f64>], block: usize, k: usize, h: f64) -> Result<DVector<f64>> {
        let mut delta = vec![0.0; self.local_size(block)];
        let mut shifted = parameters.to_vec();

        delta[k] = h;
        shifted[block] = self.plus(block, &parameters[block], &delta)?;
        let forward = self.residuals_at(&shifted)?;

        delta[k] = -h;
        shifted[block] = self.plus(block, &parameters[block], &delta)?;
        let backward = self.residuals_at(&shifted)?;

        Ok((forward - backward) / (2.0 * h))
    }

    /// 在给定参数处比较解析雅可比与数值雅可比。代价函数在该点或扰动点无法计算时返回错误。
    pub fn probe(&self, parameters: &[&[f64]]) -> Result<GradientCheckResult> {
        let block_sizes = self.cost_function.parameter_block_sizes().to_vec();
        assert_eq!(parameters.len(), block_sizes.len(), "wrong number of parameter blocks");
        let num_residuals = self.cost_function.num_residuals();

        let mut residuals = vec![0.0; num_residuals];
        let mut buffers: Vec<Vec<f64>> = block_sizes.iter().map(|&size| vec![0.0; num_residuals * size]).collect();
        {
            let mut jacobians: Vec<Option<&mut [f64]>> = buffers.iter_mut().map(|b| Some(b.as_mut_slice())).collect();
            if !self
                .cost_function
                .evaluate(parameters, &mut residuals, Some(&mut jacobians[..]))
            {
                return Err(Error::CostEvaluationFailed);
            }
        }

        let owned: Vec<Vec<f64>> = parameters.iter().map(|p| p.to_vec()).collect();
        // 不请求雅可比时残差必须一致
        let plain_residuals = self.residuals_at(&owned)?;
        let residuals = DVector::from_vec(residuals);
        let floor = self.options.absolute_floor;
        let mut max_relative_error = relative_error_max(&residuals, &plain_residuals, floor);

        let mut analytic_jacobians = Vec::with_capacity(block_sizes.len());
        let mut numeric_jacobians = Vec::with_capacity(block_sizes.len());
        let h = self.options.step_size;
        for (block, &size) in block_sizes.iter().enumerate() {
            let ambient = dmatrix_from_row_major(num_residuals, size, &buffers[block]);
            let analytic = ambient * self.plus_jacobian(block, parameters[block])?;

            let local_size = self.local_size(block);
            let mut numeric = DMatrix::zeros(num_residuals, local_size);
            for k in 0..local_size {
                let column = if self.options.use_richardson_extrapolation {
                    let coarse = self.central_difference(&owned, block, k, h)?;
                    let fine = self.central_difference(&owned, block, k, h / 2.0)?;
                    (fine * 4.0 - coarse) / 3.0
                } else {
                    self.central_difference(&owned, block, k, h)?
                };
                numeric.set_column(k, &column);
            }

            let error = relative_error_max(&analytic, &numeric, floor);
            if error > self.options.relative_tolerance {
                log::debug!(
                    "parameter block {}: analytic {} numeric {} (relative error {:e})",
                    block,
                    analytic,
                    numeric,
                    error
                );
            }
            max_relative_error = max_relative_error.max(error);
            analytic_jacobians.push(analytic);
            numeric_jacobians.push(numeric);
        }

        Ok(GradientCheckResult {
            residuals,
            analytic_jacobians,
            numeric_jacobians,
            max_relative_error,
            passed: max_relative_error <= self.options.relative_tolerance,
        })
    }
}

/// 逐元素 `|a - b| / max(|a|, |b|, floor)` 的最大值
fn relative_error_max<R, C, S1, S2>(
    a: &nalgebra::Matrix<f64, R, C, S1>,
    b: &nalgebra::Matrix<f64, R, C, S2>,
    floor: f64,
) -> f64
where
    R: nalgebra::Dim,
    C: nalgebra::Dim,
    S1: nalgebra::storage::RawStorage<f64, R, C>,
    S2: nalgebra::storage::RawStorage<f64, R, C>,
{
    assert_eq!(a.shape(), b.shape());
    let (rows, cols) = a.shape();
    let mut max_error: f64 = 0.0;
    for i in 0..rows {
        for j in 0..cols {
            let (x, y) = (a[(i, j)], b[(i, j)]);
            let error = (x - y).abs() / x.abs().max(y.abs()).max(floor);
            if !error.is_finite() {
                return f64::INFINITY;
            }
            max_error = max_error.max(error);
        }
    }
    max_error
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// r = [x0², x0 x1]，故意写错第二个雅可比
    struct Quadratic {
        wrong: bool,
    }

    impl CostFunction for Quadratic {
        fn num_residuals(&self) -> usize {
            2
        }

        fn parameter_block_sizes(&self) -> &[usize] {
            &[2]
        }

        fn evaluate(&self, parameters: &[&[f64]], residuals: &mut [f64], jacobians: Option<&mut [Option<&mut [f64]>]>) -> bool {
            let x = parameters[0];
            residuals[0] = x[0] * x[0];
            residuals[1] = x[0] * x[1];
            if let Some(jacobians) = jacobians {
                if let Some(j) = jacobians[0].as_deref_mut() {
                    j.copy_from_slice(&[2.0 * x[0], 0.0, x[1], if self.wrong { 0.0 } else { x[0] }]);
                }
            }
            true
        }
    }

    #[test]
    fn test_detects_correct_and_wrong_jacobians() {
        let x = [1.5, -2.0];
        let good = Quadratic { wrong: false };
        let result = GradientChecker::new(&good, vec![None], Default::default()).probe(&[&x]).unwrap();
        assert!(result.passed);
        assert!(result.max_relative_error < 1e-9);

        let bad = Quadratic { wrong: true };
        let result = GradientChecker::new(&bad, vec![None], Default::default()).probe(&[&x]).unwrap();
        assert!(!result.passed);
        assert!(result.max_relative_error > 0.5);
    }

    #[test]
    fn test_relative_error_floor() {
        let a = DMatrix::from_element(1, 1, 1e-3);
        let b = DMatrix::from_element(1, 1, 2e-3);
        // 默认下限 1：小幅值元素按绝对误差比较
        assert_relative_eq!(relative_error_max(&a, &b, 1.0), 1e-3, epsilon = 1e-15);
        // 下限很小时是纯相对误差
        assert_relative_eq!(relative_error_max(&a, &b, 1e-8), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_small_floor_detects_small_jacobian_errors() {
        // 错误的元素为 0，正确值 x0 = 1e-7，低于默认的绝对容差
        let x = [1e-7, 2.0];
        let bad = Quadratic { wrong: true };
        let result = GradientChecker::new(&bad, vec![None], Default::default()).probe(&[&x]).unwrap();
        assert!(result.passed);

        let options = GradientCheckerOptions {
            absolute_floor: 1e-8,
            ..Default::default()
        };
        let result = GradientChecker::new(&bad, vec![None], options).probe(&[&x]).unwrap();
        assert!(!result.passed);
        assert!(result.max_relative_error > 0.5);

        let good = Quadratic { wrong: false };
        let result = GradientChecker::new(&good, vec![None], options).probe(&[&x]).unwrap();
        assert!(result.passed);
    }
}
