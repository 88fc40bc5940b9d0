#![allow(non_snake_case)]

use nalgebra::{Matrix3, Vector3};

/// 奇异值相对最大奇异值小于该值时认为不可观
const RANK_TOLERANCE: f64 = 1e-10;

/// 三角化结果
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum TriangulationResult {
    Successful(Vector3<f64>),
    /// 有效观测少于 2 个
    TooFewMeasurements,
    /// 观测射线几何退化（平行射线、基线为零等）
    Unobservable,
    #[default]
    Uninitialized,
}

impl TriangulationResult {
    pub fn was_successful(&self) -> bool {
        matches!(self, TriangulationResult::Successful(_))
    }

    pub fn position(&self) -> Option<Vector3<f64>> {
        match self {
            TriangulationResult::Successful(p) => Some(*p),
            _ => None,
        }
    }
}

/// 最小二乘中点法多视图三角化。
///
/// `bearings_G[i]` 为第 i 个相机在全局坐标系中的观测方向（不要求归一化），`p_G_C[i]`
/// 为相机中心。求到所有射线距离平方和最小的点：`Σ(I - b bᵀ) p = Σ(I - b bᵀ) c`。
pub fn linear_triangulate_from_n_views(
    bearings_G: &[Vector3<f64>],
    p_G_C: &[Vector3<f64>],
) -> TriangulationResult {
    assert_eq!(
        bearings_G.len(),
        p_G_C.len(),
        "every bearing needs a camera position"
    );

    let mut a = Matrix3::zeros();
    let mut rhs = Vector3::zeros();
    let mut num_measurements = 0usize;
    for (bearing, center) in bearings_G.iter().zip(p_G_C.iter()) {
        let norm = bearing.norm();
        if !(norm > 0.0) || !norm.is_finite() || !center.iter().all(|v| v.is_finite()) {
            continue;
        }
        let b = bearing / norm;
        let projector = Matrix3::identity() - b * b.transpose();
        a += projector;
        rhs += projector * center;
        num_measurements += 1;
    }
    if num_measurements < 2 {
        return TriangulationResult::TooFewMeasurements;
    }

    let svd = a.svd(true, true);
    let max_singular_value = svd.singular_values.max();
    if !(max_singular_value > 0.0) {
        return TriangulationResult::Unobservable;
    }
    if svd.rank(RANK_TOLERANCE * max_singular_value) < 3 {
        return TriangulationResult::Unobservable;
    }
    match svd.solve(&rhs, RANK_TOLERANCE * max_singular_value) {
        Ok(p) if p.iter().all(|v| v.is_finite()) => TriangulationResult::Successful(p),
        _ => TriangulationResult::Unobservable,
    }
}
