use nalgebra::Vector3;

/// 两条射线之间的夹角（弧度，范围 `[0, π]`）。
///
/// 使用 `atan2(|a x b|, a·b)`，在接近平行时比 `acos` 稳定。输入不需要归一化；
/// 任一射线长度为零时返回 `0`。
#[inline]
pub fn angle_between_rays_rad(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    let cross = a.cross(b).norm();
    let dot = a.dot(b);
    if cross == 0.0 && dot == 0.0 {
        return 0.0;
    }
    cross.atan2(dot)
}

/// 所有射线两两之间的最大夹角（弧度）。少于两条射线时为 `0`。
pub fn max_pairwise_angle_rad(rays: &[Vector3<f64>]) -> f64 {
    let mut max_angle = 0.0f64;
    for (i, ray_i) in rays.iter().enumerate() {
        for ray_j in rays.iter().skip(i + 1) {
            max_angle = max_angle.max(angle_between_rays_rad(ray_i, ray_j));
        }
    }
    max_angle
}

/// 点到射线（起点 `origin`，方向 `direction`）的距离。点在起点之后时返回到起点的距离。
pub fn point_to_ray_distance(
    point: &Vector3<f64>,
    origin: &Vector3<f64>,
    direction: &Vector3<f64>,
) -> f64 {
    let norm = direction.norm();
    assert!(norm > 0.0, "ray direction must be non-zero");
    let dir = direction / norm;
    let diff = point - origin;
    let along = diff.dot(&dir);
    if along <= 0.0 {
        diff.norm()
    } else {
        (diff - dir * along).norm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_angle_between_rays() {
        let x = Vector3::x();
        let y = Vector3::y() * 3.0;
        assert_relative_eq!(angle_between_rays_rad(&x, &y), FRAC_PI_2, epsilon = 1e-15);
        assert_relative_eq!(angle_between_rays_rad(&x, &(-x)), PI, epsilon = 1e-15);
        assert_eq!(angle_between_rays_rad(&x, &Vector3::zeros()), 0.0);
    }

    #[test]
    fn test_angle_nearly_parallel() {
        // acos 在这里会因舍入丢失精度
        let a = Vector3::new(0.0, 0.0, 1.0);
        let b = Vector3::new(1e-9, 0.0, 1.0);
        assert_relative_eq!(angle_between_rays_rad(&a, &b), 1e-9, max_relative = 1e-6);
    }

    #[test]
    fn test_max_pairwise_angle() {
        let rays = vec![
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(0.1, 0.0, 1.0),
            Vector3::new(-0.1, 0.0, 1.0),
        ];
        assert_relative_eq!(
            max_pairwise_angle_rad(&rays),
            2.0 * 0.1f64.atan(),
            epsilon = 1e-12
        );
        assert_eq!(max_pairwise_angle_rad(&rays[..1]), 0.0);
    }

    #[test]
    fn test_point_to_ray_distance() {
        let origin = Vector3::zeros();
        let dir = Vector3::z() * 2.0;
        assert_relative_eq!(
            point_to_ray_distance(&Vector3::new(1.0, 0.0, 5.0), &origin, &dir),
            1.0
        );
        assert_relative_eq!(
            point_to_ray_distance(&Vector3::new(3.0, 4.0, -1.0), &origin, &dir),
            (26.0f64).sqrt()
        );
    }
}
