use nalgebra::{Matrix3x2, Matrix3x4, Matrix4x2, Quaternion, UnitQuaternion, Vector2, Vector3};

use super::quaternion_plus_jacobian;
use crate::error::{Error, Result};

/// `1 + cos(θ)` 小于该值时认为方向与 z 轴反向
const ANTIPARALLEL_EPS: f64 = 1e-10;

/// 单位方位向量，2 个自由度。
///
/// 内部保存一个四元数 `q`，方位向量为 `R(q) * e_z`。切空间基取 `R(q)` 的前两列，
/// 因此任何方向上都不会出现叉乘退化。参数块中按 `[x, y, z, w]` 存储（4 维），
/// 局部更新为 `q ← exp(B δ) ⊗ q`，`δ` 为 2 维。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Unit3 {
    q: UnitQuaternion<f64>,
}

impl Unit3 {
    pub fn from_quaternion(q: UnitQuaternion<f64>) -> Self {
        Self { q }
    }

    /// 由任意非零向量构造，`q` 为把 `e_z` 转到该方向的最短旋转
    pub fn from_direction(direction: &Vector3<f64>) -> Result<Self> {
        let norm = direction.norm();
        if !(norm > 0.0) || !norm.is_finite() {
            return Err(Error::DegenerateBearing);
        }
        let u = direction / norm;
        let one_plus_cos = 1.0 + u.z;
        let q = if one_plus_cos < ANTIPARALLEL_EPS {
            // 绕 x 轴旋转 π
            UnitQuaternion::from_quaternion(Quaternion::new(0.0, 1.0, 0.0, 0.0))
        } else {
            // e_z x u = (-u.y, u.x, 0)
            UnitQuaternion::from_quaternion(Quaternion::new(one_plus_cos, -u.y, u.x, 0.0))
        };
        Ok(Self { q })
    }

    #[inline]
    pub fn quaternion(&self) -> &UnitQuaternion<f64> {
        &self.q
    }

    /// 单位方位向量
    #[inline]
    pub fn direction(&self) -> Vector3<f64> {
        self.q * Vector3::z()
    }

    /// 切空间基 `[b1, b2]`，两列互相正交且与方位向量正交
    pub fn tangent_basis(&self) -> Matrix3x2<f64> {
        let rotation = self.q.to_rotation_matrix();
        rotation.matrix().fixed_view::<3, 2>(0, 0).into_owned()
    }

    /// `exp(B δ) ⊗ q`
    pub fn plus(&self, delta: &Vector2<f64>) -> Self {
        let rotation_vector = self.tangent_basis() * delta;
        Self {
            q: UnitQuaternion::from_scaled_axis(rotation_vector) * self.q,
        }
    }

    /// 方位向量对四元数系数 `[x, y, z, w]` 的 3x4 雅可比
    ///
    /// 方位向量按多项式 `R(q) e_z` 展开，`q` 不要求是单位四元数。
    pub fn direction_jacobian_ambient(q: &Quaternion<f64>) -> Matrix3x4<f64> {
        let (x, y, z, w) = (q.i, q.j, q.k, q.w);
        Matrix3x4::new(
            2.0 * z,
            2.0 * w,
            2.0 * x,
            2.0 * y,
            -2.0 * w,
            2.0 * z,
            2.0 * y,
            -2.0 * x,
            -2.0 * x,
            -2.0 * y,
            2.0 * z,
            2.0 * w,
        )
    }

    /// `R(q) e_z` 的多项式形式，与 [Unit3::direction_jacobian_ambient] 对应
    pub fn direction_from_coefficients(q: &Quaternion<f64>) -> Vector3<f64> {
        let (x, y, z, w) = (q.i, q.j, q.k, q.w);
        Vector3::new(
            2.0 * (x * z + w * y),
            2.0 * (y * z - w * x),
            w * w - x * x - y * y + z * z,
        )
    }

    /// 局部参数化的 4x2 雅可比 `d(exp(B δ) ⊗ q) / dδ |δ=0`
    pub fn plus_jacobian(&self) -> Matrix4x2<f64> {
        quaternion_plus_jacobian(self.q.quaternion()) * self.tangent_basis()
    }
}

/// 欧氏坐标转为锚点逆深度表示，返回 `(方位向量, 逆深度)`
pub fn euclidean_to_aid(p: &Vector3<f64>, anchor: &Vector3<f64>) -> Result<(Unit3, f64)> {
    let diff = p - anchor;
    let distance = diff.norm();
    if !(distance > 0.0) || !distance.is_finite() {
        return Err(Error::LandmarkAtAnchor);
    }
    let bearing = Unit3::from_direction(&diff)?;
    Ok((bearing, 1.0 / distance))
}

/// 锚点逆深度表示转为欧氏坐标 `anchor + u / ρ`
pub fn aid_to_euclidean(anchor: &Vector3<f64>, bearing: &Unit3, inverse_depth: f64) -> Vector3<f64> {
    assert!(
        inverse_depth > 0.0,
        "inverse depth must be positive, got {}",
        inverse_depth
    );
    anchor + bearing.direction() / inverse_depth
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_direction() {
        let dirs = [
            Vector3::new(0.3, -0.2, 1.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(0.0, 0.0, -2.0),
            Vector3::new(-0.4, 0.7, -0.1),
        ];
        for dir in dirs.iter() {
            let bearing = Unit3::from_direction(dir).unwrap();
            assert_relative_eq!(bearing.direction(), dir.normalize(), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_degenerate_direction() {
        assert!(matches!(
            Unit3::from_direction(&Vector3::zeros()),
            Err(Error::DegenerateBearing)
        ));
        assert!(Unit3::from_direction(&Vector3::new(f64::NAN, 0.0, 1.0)).is_err());
    }

    #[test]
    fn test_tangent_basis_orthonormal() {
        let bearing = Unit3::from_direction(&Vector3::new(0.0, 0.0, -1.0)).unwrap();
        let basis = bearing.tangent_basis();
        let u = bearing.direction();
        assert_relative_eq!(basis.transpose() * basis, nalgebra::Matrix2::identity(), epsilon = 1e-12);
        assert_relative_eq!((basis.transpose() * u).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_plus_moves_along_tangent() {
        let bearing = Unit3::from_direction(&Vector3::new(0.5, 0.1, 1.0)).unwrap();
        let basis = bearing.tangent_basis();
        let u = bearing.direction();
        let h = 1e-6;
        let plus = bearing.plus(&Vector2::new(h, 0.0));
        // exp(b1 h) u ≈ u + h b1 x u = u - h b2
        assert_relative_eq!(
            (plus.direction() - u) / h,
            -basis.column(1).into_owned(),
            epsilon = 1e-5
        );
        assert_relative_eq!(bearing.plus(&Vector2::zeros()).direction(), u, epsilon = 1e-15);
    }

    #[test]
    fn test_direction_jacobian_chain() {
        let bearing = Unit3::from_direction(&Vector3::new(-0.2, 0.9, 0.4)).unwrap();
        let q = bearing.quaternion().into_inner();
        let local = Unit3::direction_jacobian_ambient(&q) * bearing.plus_jacobian();
        let basis = bearing.tangent_basis();
        let expected = Matrix3x2::from_columns(&[-basis.column(1).into_owned(), basis.column(0).into_owned()]);
        assert_relative_eq!(local, expected, epsilon = 1e-12);
        assert_relative_eq!(
            Unit3::direction_from_coefficients(&q),
            bearing.direction(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_aid_conversion() {
        let anchor = Vector3::new(1.0, -2.0, 0.5);
        let p = Vector3::new(4.0, 2.0, 0.5);
        let (bearing, inverse_depth) = euclidean_to_aid(&p, &anchor).unwrap();
        assert_relative_eq!(inverse_depth, 0.2, epsilon = 1e-15);
        assert_relative_eq!(aid_to_euclidean(&anchor, &bearing, inverse_depth), p, epsilon = 1e-12);
        assert!(matches!(
            euclidean_to_aid(&anchor, &anchor),
            Err(Error::LandmarkAtAnchor)
        ));
    }
}
