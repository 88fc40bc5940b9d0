use nalgebra::{Matrix2, Matrix2xX, Vector2};
use serde::{Deserialize, Serialize};

/// Newton 去畸变的最大迭代次数
const MAX_UNDISTORT_ITERATIONS: usize = 20;
const UNDISTORT_TOLERANCE: f64 = 1e-12;
/// 半径或视场角小于该值时使用极限形式
const SMALL_VALUE: f64 = 1e-8;

/// 畸变模型，作用在归一化像平面坐标上
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DistortionType {
    /// 无畸变
    #[default]
    None,
    /// 径向-切向畸变，参数顺序 `[k1, k2, p1, p2]`
    RadTan { k1: f64, k2: f64, p1: f64, p2: f64 },
    /// FOV 鱼眼畸变，参数 `[w]`
    Fisheye { w: f64 },
}

impl DistortionType {
    /// 从参数向量构造，长度决定模型
    pub fn from_parameters(parameters: &[f64]) -> Option<Self> {
        match parameters.len() {
            0 => Some(Self::None),
            1 => Some(Self::Fisheye { w: parameters[0] }),
            4 => Some(Self::RadTan {
                k1: parameters[0],
                k2: parameters[1],
                p1: parameters[2],
                p2: parameters[3],
            }),
            _ => None,
        }
    }

    pub fn parameters(&self) -> Vec<f64> {
        match *self {
            Self::None => vec![],
            Self::RadTan { k1, k2, p1, p2 } => vec![k1, k2, p1, p2],
            Self::Fisheye { w } => vec![w],
        }
    }

    pub fn num_parameters(&self) -> usize {
        match self {
            Self::None => 0,
            Self::RadTan { .. } => 4,
            Self::Fisheye { .. } => 1,
        }
    }

    /// 用给定的参数（而不是自身保存的参数）计算畸变。
    ///
    /// `jacobian_point` 为 `∂d/∂m`（2x2），`jacobian_distortion` 为 `∂d/∂参数`（2xk）。
    pub fn distort_with_parameters(
        &self,
        parameters: &[f64],
        m: &Vector2<f64>,
        jacobian_point: Option<&mut Matrix2<f64>>,
        jacobian_distortion: Option<&mut Matrix2xX<f64>>,
    ) -> Vector2<f64> {
        assert_eq!(
            parameters.len(),
            self.num_parameters(),
            "distortion parameter count mismatch"
        );
        match self {
            Self::None => {
                if let Some(j) = jacobian_point {
                    *j = Matrix2::identity();
                }
                if let Some(j) = jacobian_distortion {
                    *j = Matrix2xX::zeros(0);
                }
                *m
            }
            Self::RadTan { .. } => {
                radtan_distort(parameters, m, jacobian_point, jacobian_distortion)
            }
            Self::Fisheye { .. } => {
                fov_distort(parameters[0], m, jacobian_point, jacobian_distortion)
            }
        }
    }

    pub fn distort(&self, m: &Vector2<f64>) -> Vector2<f64> {
        self.distort_with_parameters(&self.parameters(), m, None, None)
    }

    /// Newton 迭代去畸变，不收敛时返回 `None`
    pub fn undistort(&self, distorted: &Vector2<f64>) -> Option<Vector2<f64>> {
        if let Self::None = self {
            return Some(*distorted);
        }
        let parameters = self.parameters();
        let mut m = *distorted;
        let mut jacobian = Matrix2::identity();
        for _ in 0..MAX_UNDISTORT_ITERATIONS {
            let d = self.distort_with_parameters(&parameters, &m, Some(&mut jacobian), None);
            let error = d - distorted;
            if error.norm_squared() < UNDISTORT_TOLERANCE * UNDISTORT_TOLERANCE {
                return Some(m);
            }
            let step = jacobian.lu().solve(&error)?;
            m -= step;
            if !m.iter().all(|v| v.is_finite()) {
                return None;
            }
        }
        let d = self.distort_with_parameters(&parameters, &m, None, None);
        if (d - distorted).norm() < 1e-9 {
            Some(m)
        } else {
            None
        }
    }
}

fn radtan_distort(
    parameters: &[f64],
    m: &Vector2<f64>,
    jacobian_point: Option<&mut Matrix2<f64>>,
    jacobian_distortion: Option<&mut Matrix2xX<f64>>,
) -> Vector2<f64> {
    let (k1, k2, p1, p2) = (parameters[0], parameters[1], parameters[2], parameters[3]);
    let (x, y) = (m.x, m.y);
    let r2 = x * x + y * y;
    let radial = 1.0 + k1 * r2 + k2 * r2 * r2;

    if let Some(j) = jacobian_point {
        let radial_dr2 = k1 + 2.0 * k2 * r2;
        let dxd_dx = radial + 2.0 * x * x * radial_dr2 + 2.0 * p1 * y + 6.0 * p2 * x;
        let dxd_dy = 2.0 * x * y * radial_dr2 + 2.0 * p1 * x + 2.0 * p2 * y;
        let dyd_dx = 2.0 * x * y * radial_dr2 + 2.0 * p2 * y + 2.0 * p1 * x;
        let dyd_dy = radial + 2.0 * y * y * radial_dr2 + 2.0 * p2 * x + 6.0 * p1 * y;
        *j = Matrix2::new(dxd_dx, dxd_dy, dyd_dx, dyd_dy);
    }
    if let Some(j) = jacobian_distortion {
        *j = Matrix2xX::from_row_slice(&[
            x * r2,
            x * r2 * r2,
            2.0 * x * y,
            r2 + 2.0 * x * x,
            y * r2,
            y * r2 * r2,
            r2 + 2.0 * y * y,
            2.0 * x * y,
        ]);
    }

    Vector2::new(
        x * radial + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x),
        y * radial + 2.0 * p2 * x * y + p1 * (r2 + 2.0 * y * y),
    )
}

/// FOV 模型：`r_d = atan(2 r tan(w/2)) / w`，`d = m * r_d / r`
fn fov_distort(
    w: f64,
    m: &Vector2<f64>,
    jacobian_point: Option<&mut Matrix2<f64>>,
    jacobian_distortion: Option<&mut Matrix2xX<f64>>,
) -> Vector2<f64> {
    if w.abs() < SMALL_VALUE {
        if let Some(j) = jacobian_point {
            *j = Matrix2::identity();
        }
        if let Some(j) = jacobian_distortion {
            *j = Matrix2xX::zeros(1);
        }
        return *m;
    }

    let r = m.norm();
    let tan_w_half = (w / 2.0).tan();
    let sec_w_half_2 = 1.0 + tan_w_half * tan_w_half;

    let (factor, dfactor_dr, dfactor_dw) = if r < SMALL_VALUE {
        let factor = 2.0 * tan_w_half / w;
        let dfactor_dw = (sec_w_half_2 * w - 2.0 * tan_w_half) / (w * w);
        (factor, 0.0, dfactor_dw)
    } else {
        let a = 2.0 * r * tan_w_half;
        let atan_a = a.atan();
        let rd = atan_a / w;
        let drd_dr = 2.0 * tan_w_half / ((1.0 + a * a) * w);
        let drd_dw = (r * sec_w_half_2 / (1.0 + a * a) * w - atan_a) / (w * w);
        (rd / r, (drd_dr * r - rd) / (r * r), drd_dw / r)
    };

    if let Some(j) = jacobian_point {
        let mut jac = Matrix2::identity() * factor;
        if r >= SMALL_VALUE {
            jac += m * m.transpose() * (dfactor_dr / r);
        }
        *j = jac;
    }
    if let Some(j) = jacobian_distortion {
        *j = Matrix2xX::from_column_slice(&[m.x * dfactor_dw, m.y * dfactor_dw]);
    }

    m * factor
}
