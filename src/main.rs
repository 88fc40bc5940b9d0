//! 仿真任务上的完整流程：
//! 构建地图 -> 扰动路标点 -> 重置质量 -> 重新三角化 -> 质量评估 -> 重投影误差 -> 点云
//!
//! 用法：`vi-map-rs [config.json] [cloud.json]`

use anyhow::Context;

use vi_map_rs::config::Config;
use vi_map_rs::dataset::{self, corrupt_landmark_positions};
use vi_map_rs::error_terms::aid_residual_blocks;
use vi_map_rs::landmark_quality::{LandmarkQualityEvaluator, QualitySummary};
use vi_map_rs::landmark_triangulation::retriangulate_landmarks_of_missions;
use vi_map_rs::point_cloud::landmarks_to_point_cloud;
use vi_map_rs::vi_map::Quality;

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_nanos()
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("config: {:?}", path);
            Config::from_json_file(&path)?
        }
        None => Config::default(),
    };

    let scene = dataset::DefaultDataset::new(config.dataset.clone())
        .build()
        .context("failed to build synthetic dataset")?;
    let mut map = scene.map;
    let mission_ids = map.mission_ids();

    let corruption = &config.corruption;
    corrupt_landmark_positions(
        &mut map,
        corruption.position_std_dev,
        corruption.every_nth.max(1),
        corruption.seed,
    );

    let evaluator = LandmarkQualityEvaluator::new(config.landmark_quality.clone(), config.parallel.clone());
    evaluator.reset_to_unknown(&mut map, &mission_ids);
    retriangulate_landmarks_of_missions(&mut map, &mission_ids, &config.parallel);
    let summary: QualitySummary = evaluator.evaluate_missions(&mut map, &mission_ids);

    // 重新三角化后的位置误差
    let mut max_error: f64 = 0.0;
    for landmark in map.landmarks() {
        if let (Some(p_M_fi), Some(truth)) = (landmark.p_M_fi(), scene.ground_truth.get(&landmark.id())) {
            if landmark.quality() == Quality::Good {
                max_error = max_error.max((p_M_fi - truth).norm());
            }
        }
    }
    log::info!("max position error of good landmarks: {:.3e} m", max_error);

    let mut squared_error = 0.0;
    let mut num_residuals = 0usize;
    let mut num_failed = 0usize;
    for landmark in map.landmarks().iter().filter(|l| l.quality() == Quality::Good) {
        for block in aid_residual_blocks(&map, landmark.id(), &config.visual_error)? {
            match block.residuals() {
                Some(r) => {
                    squared_error += r.norm_squared();
                    num_residuals += 1;
                }
                None => num_failed += 1,
            }
        }
    }
    if num_residuals > 0 {
        log::info!(
            "reprojection rms of {} residuals: {:.3e} (normalized), {} failed",
            num_residuals,
            (squared_error / num_residuals as f64).sqrt(),
            num_failed
        );
    }

    let cloud = landmarks_to_point_cloud(&map, true);
    log::info!(
        "point cloud: {} of {} landmarks ({} good, {} bad, {} unknown)",
        cloud.len(),
        map.num_landmarks(),
        summary.num_good,
        summary.num_bad,
        summary.num_unknown
    );
    if let Some(centroid) = cloud.centroid() {
        log::info!("point cloud centroid: {:?}", centroid.as_slice());
    }
    if let Some(path) = std::env::args().nth(2) {
        cloud.save_json(&path)?;
        log::info!("point cloud saved to {}", path);
    }
    Ok(())
}
