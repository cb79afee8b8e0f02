// src/main.rs

mod analysis;
mod calibrator;
mod config;
mod court;
mod court_detector;
mod homography;
mod manual_calibration;
mod oracles;
mod types;

use anyhow::Result;
use calibrator::{CalibrationReport, Calibrator, CancelToken, Oracles};
use manual_calibration::ManualCalibration;
use oracles::RecordedObservations;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use types::Config;
use walkdir::WalkDir;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rally_calibration=info")),
        )
        .init();

    info!("🎾 Rally Calibration Starting");

    let config = match Config::load("config.yaml") {
        Ok(config) => {
            info!("✓ Configuration loaded");
            config
        }
        Err(err) => {
            warn!("config.yaml not usable ({err}), using defaults");
            Config::default()
        }
    };

    let manual = match &config.io.manual_calibration {
        Some(path) => {
            let calibration = ManualCalibration::load(Path::new(path))?;
            info!(
                path = %path,
                avg_error_m = calibration.validation.avg_error_meters,
                "✓ Manual court calibration loaded"
            );
            Some(calibration)
        }
        None => None,
    };

    let clips = find_observation_files(&config.io.input_dir);
    if clips.is_empty() {
        error!("No observation files found in {}", config.io.input_dir);
        return Ok(());
    }
    info!("Found {} clip(s) to process", clips.len());
    std::fs::create_dir_all(&config.io.output_dir)?;

    let cancel = CancelToken::new();
    let mut processed = 0usize;
    for (idx, clip_path) in clips.iter().enumerate() {
        info!("========================================");
        info!(
            "Processing clip {}/{}: {}",
            idx + 1,
            clips.len(),
            clip_path.display()
        );

        match process_clip(clip_path, &config, manual.clone(), &cancel) {
            Ok(report) => {
                processed += 1;
                let stem = clip_path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("clip");
                let out_path =
                    Path::new(&config.io.output_dir).join(format!("{stem}_report.json"));
                if let Err(err) = report.save(&out_path) {
                    error!("Failed to write report for {}: {err:#}", clip_path.display());
                    continue;
                }
                log_report(&report, &out_path);
            }
            Err(err) => {
                error!("Failed to process {}: {err:#}", clip_path.display());
            }
        }
    }

    info!("Done: {processed}/{} clip(s) processed", clips.len());
    Ok(())
}

fn process_clip(
    path: &Path,
    config: &Config,
    manual: Option<ManualCalibration>,
    cancel: &CancelToken,
) -> Result<CalibrationReport> {
    let observations = RecordedObservations::load(path)?;
    let mut calibrator = Calibrator::new(config.clone());
    if let Some(manual) = manual {
        calibrator = calibrator.with_manual_calibration(manual);
    }
    let oracles = Oracles {
        ball: &observations,
        court: &observations,
        pose: &observations,
        bounce: &observations,
    };
    calibrator.run(&observations.video_info, &oracles, cancel)
}

fn log_report(report: &CalibrationReport, out_path: &Path) {
    let stats = &report.detection_stats;
    info!("✓ Clip processed successfully!");
    info!(
        "  Ball detection rate: {:.1}%",
        stats.ball_detection_rate * 100.0
    );
    info!(
        "  Court detection rate: {:.1}% ({})",
        stats.court_detection_rate * 100.0,
        stats.court_calibration_source
    );
    info!("  Bounces detected: {}", stats.bounces_detected);
    info!(
        "  🎯 Shots: {} ({} in / {} out / {} unknown)",
        report.summary.total_shots,
        report.summary.shots_in,
        report.summary.shots_out,
        report.summary.shots_unknown
    );
    if let Some(speed) = &report.summary.overall.speed_mps {
        info!(
            "  💨 Shot speed: mean {:.1} m/s, p90 {:.1} m/s",
            speed.mean, speed.p90
        );
    }
    info!("  Report written to {}", out_path.display());
}

/// Recursively collect recorded-observation dumps, skipping saved
/// calibration files.
fn find_observation_files(input_dir: &str) -> Vec<PathBuf> {
    let mut clips: Vec<PathBuf> = WalkDir::new(input_dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension().and_then(|e| e.to_str()) == Some("json")
                && !p
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.ends_with("_calibration.json"))
                    .unwrap_or(false)
        })
        .collect();
    clips.sort();
    clips
}
