use nalgebra::{Matrix3, Matrix4x3, Quaternion, SMatrix};

use super::skew;

/// 计算 `lhs ⊗ rhs`，并取标量部分非负的那一个表示。
///
/// 返回乘积以及所乘的符号（`1.0` 或 `-1.0`），雅可比需要乘上同一个符号。
pub fn positive_quaternion_product(
    lhs: &Quaternion<f64>,
    rhs: &Quaternion<f64>,
) -> (Quaternion<f64>, f64) {
    let product = lhs * rhs;
    if product.w < 0.0 {
        (-product, -1.0)
    } else {
        (product, 1.0)
    }
}

/// 四元数局部参数化的 4x3 雅可比 `d(exp(δ) ⊗ q) / dδ |δ=0`，行顺序 `[x, y, z, w]`。
///
/// 满足 `Pᵀ P = I / 4`（单位四元数）。
pub fn quaternion_plus_jacobian(q: &Quaternion<f64>) -> Matrix4x3<f64> {
    let q_v = q.imag();
    let top: Matrix3<f64> = Matrix3::identity() * q.w - skew(&q_v);
    let mut jacobian = Matrix4x3::zeros();
    jacobian.fixed_view_mut::<3, 3>(0, 0).copy_from(&top);
    jacobian
        .fixed_view_mut::<1, 3>(3, 0)
        .copy_from(&(-q_v.transpose()));
    jacobian * 0.5
}

/// 将切空间（3 维）雅可比提升为四元数参数块（4 维）上的雅可比。
///
/// 结果 `J_a = 4 J_l Pᵀ` 满足 `J_a P = J_l`，因此求解器经过局部参数化后得到的正是 `J_l`。
pub fn lift_local_jacobian<const R: usize>(
    local_jacobian: &SMatrix<f64, R, 3>,
    q: &Quaternion<f64>,
) -> SMatrix<f64, R, 4> {
    local_jacobian * quaternion_plus_jacobian(q).transpose() * 4.0
}
