//! 几何工具
//!
//! 四元数运算、单位方位向量 [Unit3]、射线夹角与距离。
//!
//! 四元数统一使用 Hamilton 约定，参数块中的存储顺序为 `[x, y, z, w]`，
//! 与 `nalgebra::Quaternion::coords` 一致。

mod quaternion;
mod rays;
mod unit3;

pub use quaternion::{lift_local_jacobian, positive_quaternion_product, quaternion_plus_jacobian};
pub use rays::{angle_between_rays_rad, max_pairwise_angle_rad, point_to_ray_distance};
pub use unit3::{aid_to_euclidean, euclidean_to_aid, Unit3};

use nalgebra::{Matrix3, Vector3};

/// 反对称矩阵 `[v]x`，满足 `[v]x * u = v.cross(u)`
#[inline]
pub fn skew(vec: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -vec[2], vec[1], vec[2], 0.0, -vec[0], -vec[1], vec[0], 0.0,
    )
}

#[test]
fn test_skew() {
    let a = Vector3::new(0.3, -1.2, 2.0);
    let b = Vector3::new(-0.7, 0.4, 1.1);
    assert!((skew(&a) * b - a.cross(&b)).norm() < 1e-15);
    assert!((skew(&a) + skew(&a).transpose()).norm() < 1e-15);
}
