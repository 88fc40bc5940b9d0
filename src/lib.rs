//! 视觉惯性地图的路标点处理
//!
//! 路标点质量评估、重新三角化、位姿先验与锚点逆深度重投影误差项，以及并行批处理。
//!
//! nalgebra
//! https://docs.rs/nalgebra/latest/nalgebra/

pub mod camera;
pub mod config;
pub mod dataset;
pub mod error;
pub mod error_terms;
pub mod geometry;
pub mod global_cast;
pub mod global_types;
pub mod landmark_quality; // 路标点质量
pub mod landmark_triangulation;
pub mod parallel;
pub mod point_cloud;
pub mod vi_map;

#[cfg(test)]
mod test_helpers;

pub use error::{Error, Result};
