//! 错误类型
//!
//! 可恢复的错误通过 [Error] 返回；违反前置条件（无效 id、未三角化的路标点等）直接 panic。

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("covariance matrix is not symmetric positive definite")]
    InvalidCovariance,
    #[error("bearing vector has zero or non-finite norm")]
    DegenerateBearing,
    #[error("landmark coincides with its anchor position")]
    LandmarkAtAnchor,
    #[error("invalid camera parameters: {0}")]
    InvalidCameraParameters(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("cost function evaluation failed")]
    CostEvaluationFailed,
}

pub type Result<T> = std::result::Result<T, Error>;
