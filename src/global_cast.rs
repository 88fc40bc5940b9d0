//! 全局类型转换
//!
//! 在求解器使用的 `&[f64]` 参数块与 nalgebra 类型之间转换。
//! 四元数参数块按 `[x, y, z, w]` 存储，雅可比按行优先存储。

use nalgebra::storage::RawStorage;
use nalgebra::*;

/// 从参数块读取四元数（不做归一化）
#[inline]
pub fn quaternion_from_slice(block: &[f64]) -> Quaternion<f64> {
    assert!(block.len() >= 4, "quaternion block needs 4 values");
    Quaternion::new(block[3], block[0], block[1], block[2])
}

/// 从参数块读取单位四元数，范数偏离 1 时归一化
#[inline]
pub fn unit_quaternion_from_slice(block: &[f64]) -> UnitQuaternion<f64> {
    UnitQuaternion::from_quaternion(quaternion_from_slice(block))
}

#[inline]
pub fn quaternion_to_array(q: &Quaternion<f64>) -> [f64; 4] {
    [q.i, q.j, q.k, q.w]
}

#[inline]
pub fn vector3_from_slice(block: &[f64]) -> Vector3<f64> {
    assert!(block.len() >= 3, "vector block needs 3 values");
    Vector3::new(block[0], block[1], block[2])
}

#[inline]
pub fn vector3_to_array(v: &Vector3<f64>) -> [f64; 3] {
    [v.x, v.y, v.z]
}

/// 组合 [UnitQuaternion] 和 [Vector3] 为 [Isometry3]
#[inline]
pub fn isometry_from_parts(q: &UnitQuaternion<f64>, p: &Vector3<f64>) -> Isometry3<f64> {
    Isometry3::from_parts(Translation3::from(*p), *q)
}

/// 把矩阵按行优先写入雅可比缓冲区
pub fn copy_to_row_major<R, C, S>(matrix: &Matrix<f64, R, C, S>, out: &mut [f64])
where
    R: Dim,
    C: Dim,
    S: RawStorage<f64, R, C>,
{
    let (rows, cols) = matrix.shape();
    assert_eq!(out.len(), rows * cols, "jacobian buffer has wrong size");
    for i in 0..rows {
        for j in 0..cols {
            out[i * cols + j] = matrix[(i, j)];
        }
    }
}

/// 从行优先缓冲区读取动态大小的矩阵
pub fn dmatrix_from_row_major(rows: usize, cols: usize, data: &[f64]) -> DMatrix<f64> {
    assert_eq!(data.len(), rows * cols, "buffer has wrong size");
    DMatrix::from_row_slice(rows, cols, data)
}

#[test]
fn test_quaternion_layout() {
    let q = UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3);
    let block = quaternion_to_array(q.quaternion());
    assert_eq!(block[3], q.w);
    assert_eq!(block, [q.coords[0], q.coords[1], q.coords[2], q.coords[3]]);
    let back = unit_quaternion_from_slice(&block);
    assert!(back.angle_to(&q) < 1e-12);
}

#[test]
fn test_isometry3() {
    let q = UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2);
    let isometry = isometry_from_parts(&q, &Vector3::new(1.0, 2.0, 3.0));
    let p = isometry * Point3::new(1.0, 0.0, 0.0);
    assert!((p.coords - Vector3::new(1.0, 3.0, 3.0)).norm() < 1e-12);
}

#[test]
fn test_row_major_copy() {
    let m = Matrix2x3::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0);
    let mut out = [0.0; 6];
    copy_to_row_major(&m, &mut out);
    assert_eq!(out, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    assert_eq!(dmatrix_from_row_major(2, 3, &out)[(1, 0)], 4.0);
    copy_to_row_major(&m.fixed_view::<2, 1>(0, 2), &mut out[..2]);
    assert_eq!(&out[..2], &[3.0, 6.0]);
}
