//! 误差项
//!
//! 面向非线性最小二乘求解器的残差与解析雅可比：位姿先验和锚点逆深度重投影误差。
//! 参数块是 `&[f64]`，雅可比按行优先存储，大小为 `num_residuals x 参数块维度`（环境维度）。
//! 流形上的参数块（四元数、单位方位向量）通过 [LocalParameterization] 更新。
#![allow(non_snake_case)]

mod aid_reprojection;
mod gradient_checker;
mod parameterization;
mod pose_prior;

pub use aid_reprojection::{aid_residual_blocks, AidReprojectionError, ExtrinsicsMode, ResidualBlock};
pub use gradient_checker::{GradientCheckResult, GradientChecker, GradientCheckerOptions};
pub use parameterization::{IdentityParameterization, QuaternionParameterization, Unit3Parameterization};
pub use pose_prior::PosePriorError;

/// 代价函数
pub trait CostFunction: Send + Sync {
    fn num_residuals(&self) -> usize;
    fn parameter_block_sizes(&self) -> &[usize];

    /// 计算残差和（可选的）雅可比。
    ///
    /// `jacobians` 为 `None` 时只计算残差；其中为 `None` 的项表示求解器不需要该参数块的雅可比，
    /// 直接跳过。返回 `false` 表示在该点无法计算（求解器应拒绝这一步）。
    fn evaluate(
        &self,
        parameters: &[&[f64]],
        residuals: &mut [f64],
        jacobians: Option<&mut [Option<&mut [f64]>]>,
    ) -> bool;
}

/// 参数块的局部参数化
pub trait LocalParameterization: Send + Sync {
    /// 存储维度
    fn global_size(&self) -> usize;
    /// 切空间维度
    fn local_size(&self) -> usize;
    /// `x ⊞ δ`
    fn plus(&self, x: &[f64], delta: &[f64], x_plus_delta: &mut [f64]) -> bool;
    /// `d(x ⊞ δ)/dδ |δ=0`，行优先 `global_size x local_size`
    fn compute_jacobian(&self, x: &[f64], jacobian: &mut [f64]) -> bool;
}
