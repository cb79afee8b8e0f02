// src/calibrator.rs
//
// End-to-end clip calibration. Stage 1 walks the frames once, collecting
// court detections and ball candidates; stage 2 runs the ordered analysis
// passes (gap fill, bounce classification, shot segmentation, per-shot
// outcome/pose/stroke) and assembles the report. Cancellation is checked
// between frames and between stages.

use crate::analysis::aggregate::Summary;
use crate::analysis::bounce::BounceClassifier;
use crate::analysis::outcome::classify_landing;
use crate::analysis::pose_metrics::{assess_camera_angle, body_scale, compute_metrics};
use crate::analysis::shot_segmenter::ShotSegmenter;
use crate::analysis::stroke::classify_stroke;
use crate::analysis::trajectory::TrajectoryBuilder;
use crate::court_detector::{CourtDetector, CourtMapping, DetectionMethod};
use crate::manual_calibration::ManualCalibration;
use crate::oracles::{BallOracle, BounceOracle, CourtOracle, PoseOracle};
use crate::types::{CalibrationRecord, Config, Shot, VideoInfo};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

const MIN_FRAMES: usize = 3;

/// Cooperative cancellation flag shared with the caller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionStats {
    pub ball_detection_rate: f64,
    pub court_detection_rate: f64,
    pub court_calibration_source: String,
    pub bounces_detected: usize,
    pub shots_segmented: usize,
    pub shots_analyzed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub timestamp: String,
    pub video_info: VideoInfo,
    pub detection_stats: DetectionStats,
    pub summary: Summary,
    pub shots: Vec<CalibrationRecord>,
}

impl CalibrationReport {
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("writing report to {}", path.display()))?;
        Ok(())
    }
}

/// Oracle handles for one clip. Borrowed for the duration of a run; the
/// recorded-observation file implements all four.
pub struct Oracles<'a> {
    pub ball: &'a dyn BallOracle,
    pub court: &'a dyn CourtOracle,
    pub pose: &'a dyn PoseOracle,
    pub bounce: &'a dyn BounceOracle,
}

pub struct Calibrator {
    config: Config,
    manual: Option<ManualCalibration>,
}

impl Calibrator {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            manual: None,
        }
    }

    /// Use a saved manual calibration for every frame instead of per-frame
    /// automatic detection.
    pub fn with_manual_calibration(mut self, manual: ManualCalibration) -> Self {
        self.manual = Some(manual);
        self
    }

    pub fn run(
        &self,
        video_info: &VideoInfo,
        oracles: &Oracles<'_>,
        cancel: &CancelToken,
    ) -> Result<CalibrationReport> {
        let total_frames = video_info.total_frames;
        if total_frames < MIN_FRAMES {
            bail!(
                "clip too short to analyze: {} frames (need at least {})",
                total_frames,
                MIN_FRAMES
            );
        }
        info!(
            frames = total_frames,
            fps = video_info.fps,
            "🎾 starting clip calibration"
        );

        // Stage 1: per-frame detection.
        let (mappings, court_frames, source) =
            self.collect_mappings(video_info, oracles.court, cancel)?;
        let mut builder = TrajectoryBuilder::new(self.config.trajectory.clone());
        for frame in 0..total_frames {
            if cancel.is_cancelled() {
                bail!("cancelled during ball detection at frame {frame}");
            }
            builder.push_candidates(&oracles.ball.candidates(frame));
        }

        // Stage 2: ordered analysis passes.
        if cancel.is_cancelled() {
            bail!("cancelled before trajectory analysis");
        }
        let trajectory = builder.finish();
        let bounces =
            BounceClassifier::new(self.config.bounce.clone()).detect(&trajectory, oracles.bounce);

        if cancel.is_cancelled() {
            bail!("cancelled before shot segmentation");
        }
        let segmenter = ShotSegmenter::new(self.config.segmenter.clone(), video_info.fps);
        let shots = segmenter.segment(&trajectory, &bounces, &mappings);
        let shots_segmented = shots.len();

        // Shots with no usable pose at contact are segmented but not
        // analyzed, so shots_analyzed can fall short of shots_segmented.
        let mut records = Vec::with_capacity(shots.len());
        for (index, shot) in shots.iter().enumerate() {
            if cancel.is_cancelled() {
                bail!("cancelled during shot analysis");
            }
            if let Some(record) =
                self.analyze_shot(index, shot, &mappings, oracles.pose, video_info.fps)
            {
                records.push(record);
            }
        }

        let summary = Summary::build(&records);
        let stats = DetectionStats {
            ball_detection_rate: trajectory.detection_rate(),
            court_detection_rate: court_frames as f64 / total_frames as f64,
            court_calibration_source: source,
            bounces_detected: bounces.len(),
            shots_segmented,
            shots_analyzed: records.len(),
        };
        info!(
            ball_rate = %format!("{:.1}%", stats.ball_detection_rate * 100.0),
            court_rate = %format!("{:.1}%", stats.court_detection_rate * 100.0),
            bounces = stats.bounces_detected,
            shots = stats.shots_analyzed,
            "✅ clip calibration complete"
        );

        Ok(CalibrationReport {
            timestamp: chrono::Utc::now().to_rfc3339(),
            video_info: *video_info,
            detection_stats: stats,
            summary,
            shots: records,
        })
    }

    /// Per-frame court mappings: the manual calibration replicated across
    /// every frame when present, otherwise the multi-strategy detector run
    /// frame by frame.
    fn collect_mappings(
        &self,
        video_info: &VideoInfo,
        court: &dyn CourtOracle,
        cancel: &CancelToken,
    ) -> Result<(Vec<Option<CourtMapping>>, usize, String)> {
        let total_frames = video_info.total_frames;

        if let Some(manual) = &self.manual {
            let homography = manual.homography()?;
            let mapping = CourtMapping {
                homography,
                frame: crate::court_detector::CoordinateFrame::CornerOrigin,
            };
            info!(
                avg_error_m = manual.validation.avg_error_meters,
                "using manual court calibration for all frames"
            );
            return Ok((
                vec![Some(mapping); total_frames],
                total_frames,
                "manual".to_string(),
            ));
        }

        let detector = CourtDetector::new(
            self.config.court.clone(),
            (video_info.width, video_info.height),
        );
        let mut mappings: Vec<Option<CourtMapping>> = Vec::with_capacity(total_frames);
        let mut detected = 0usize;
        let mut neural = 0usize;
        for frame in 0..total_frames {
            if cancel.is_cancelled() {
                bail!("cancelled during court detection at frame {frame}");
            }
            match detector.detect(court, frame) {
                Some(detection) => {
                    trace!(
                        frame,
                        method = ?detection.method,
                        conf = detection.confidence,
                        keypoints = detection.keypoints_detected,
                        "court mapping solved"
                    );
                    detected += 1;
                    if detection.method == DetectionMethod::NeuralKeypoints {
                        neural += 1;
                    }
                    mappings.push(Some(detection.mapping));
                }
                None => mappings.push(None),
            }
        }
        if detected == 0 {
            warn!("no court detected in any frame; outcomes will be unknown");
        }
        let source = if detected == 0 {
            "none".to_string()
        } else if neural * 2 >= detected {
            "automatic".to_string()
        } else {
            "fallback".to_string()
        };
        Ok((mappings, detected, source))
    }

    /// Outcome, pose, and stroke analysis for one segmented shot. `None`
    /// when no pose is reported at contact (or the pose geometry is
    /// degenerate); such shots stay segmented but unanalyzed.
    fn analyze_shot(
        &self,
        index: usize,
        shot: &Shot,
        mappings: &[Option<CourtMapping>],
        pose_oracle: &dyn PoseOracle,
        fps: f64,
    ) -> Option<CalibrationRecord> {
        let landing_mapping = mappings.get(shot.landing_frame).and_then(|m| m.as_ref());
        let (outcome, landing_court) =
            classify_landing(shot.landing_pixel, landing_mapping, &self.config.outcome);

        // First reported pose at contact; the preceding frame provides the
        // wrist velocity baseline.
        let contact_pose = pose_oracle.poses(shot.contact_frame).into_iter().next();
        let Some(pose) = contact_pose else {
            debug!(
                shot = index,
                contact = shot.contact_frame,
                "no pose at contact, shot not analyzed"
            );
            return None;
        };
        let previous_pose = if shot.contact_frame > 0 {
            pose_oracle.poses(shot.contact_frame - 1).into_iter().next()
        } else {
            None
        };
        let metrics = compute_metrics(&pose, previous_pose.as_ref(), fps)?;
        let assessment = assess_camera_angle(&pose)?;
        let torso = body_scale(&pose).map(|s| s.torso_length);

        let stroke = if assessment.suitable {
            classify_stroke(&metrics, &self.config.stroke)
        } else {
            crate::analysis::stroke::StrokeType::Unknown
        };

        Some(CalibrationRecord {
            shot_index: index,
            stroke_type: stroke.as_str().to_string(),
            outcome,
            contact_frame: shot.contact_frame,
            duration_seconds: shot.duration_seconds,
            speed_mps: shot.speed_mps,
            speed_mph: shot.speed_mph,
            landing_court,
            velocity_normalized: metrics.velocity_normalized,
            velocity_raw: metrics.velocity_raw,
            left_elbow_angle: metrics.left_elbow_angle,
            right_elbow_angle: metrics.right_elbow_angle,
            hip_shoulder_separation: metrics.hip_shoulder_separation,
            knee_bend: metrics.knee_bend,
            camera_view_type: assessment.view_type.as_str().to_string(),
            pose_suitable: assessment.suitable,
            body_scale_torso: torso,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::pose_metrics::{LandmarkPoint, PoseSnapshot};
    use crate::manual_calibration::CalibrationMode;
    use crate::oracles::{FrameObservations, RecordedObservations};
    use crate::types::PixelPoint;
    use std::collections::BTreeMap;

    fn video(frames: usize) -> VideoInfo {
        VideoInfo {
            width: 1280,
            height: 720,
            fps: 30.0,
            total_frames: frames,
        }
    }

    fn empty_observations(frames: usize) -> RecordedObservations {
        RecordedObservations {
            video_info: video(frames),
            frames: BTreeMap::new(),
            bounce_scores: BTreeMap::new(),
        }
    }

    fn oracles(obs: &RecordedObservations) -> Oracles<'_> {
        Oracles {
            ball: obs,
            court: obs,
            pose: obs,
            bounce: obs,
        }
    }

    #[test]
    fn test_too_few_frames_is_fatal() {
        let obs = empty_observations(2);
        let calibrator = Calibrator::new(Config::default());
        let result = calibrator.run(&video(2), &oracles(&obs), &CancelToken::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_cancellation_aborts_run() {
        let obs = empty_observations(100);
        let calibrator = Calibrator::new(Config::default());
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = calibrator.run(&video(100), &oracles(&obs), &cancel);
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_observations_produce_empty_report() {
        let obs = empty_observations(30);
        let calibrator = Calibrator::new(Config::default());
        let report = calibrator
            .run(&video(30), &oracles(&obs), &CancelToken::new())
            .unwrap();
        assert_eq!(report.summary.total_shots, 0);
        assert_eq!(report.detection_stats.ball_detection_rate, 0.0);
        assert_eq!(report.detection_stats.court_calibration_source, "none");
    }

    /// Square manual mapping: 100 px per meter.
    fn square_calibration() -> ManualCalibration {
        ManualCalibration::compute(
            CalibrationMode::Full,
            (1280, 720),
            [
                PixelPoint::new(0.0, 0.0),
                PixelPoint::new(823.0, 0.0),
                PixelPoint::new(823.0, 2377.0),
                PixelPoint::new(0.0, 2377.0),
            ],
        )
        .unwrap()
    }

    /// Simple pose facing the camera, shoulders rotated for a forehand.
    fn swing_pose(wrist_x: f64) -> PoseSnapshot {
        let lm = |x: f64, y: f64, z: f64| LandmarkPoint {
            x,
            y,
            z,
            visibility: 0.9,
        };
        let mut landmarks = BTreeMap::new();
        landmarks.insert(11, lm(0.40, 0.36, 0.0));
        landmarks.insert(12, lm(0.58, 0.24, 0.0));
        landmarks.insert(23, lm(0.42, 0.55, 0.0));
        landmarks.insert(24, lm(0.58, 0.55, 0.0));
        landmarks.insert(13, lm(0.66, 0.32, 0.0));
        landmarks.insert(14, lm(0.66, 0.32, 0.0));
        landmarks.insert(15, lm(wrist_x, 0.40, 0.0));
        landmarks.insert(16, lm(wrist_x, 0.40, 0.0));
        landmarks.insert(25, lm(0.44, 0.75, 0.0));
        landmarks.insert(26, lm(0.56, 0.75, 0.0));
        landmarks.insert(27, lm(0.44, 0.95, 0.0));
        landmarks.insert(28, lm(0.56, 0.95, 0.0));
        PoseSnapshot { landmarks }
    }

    #[test]
    fn test_end_to_end_with_manual_calibration() {
        // Ball flies right at 100 px/frame under a 100 px/m manual mapping,
        // bounces at frame 14, with a pose available around contact.
        let total = 40;
        let mut frames = BTreeMap::new();
        for i in 0..20 {
            frames.insert(
                i,
                FrameObservations {
                    ball: vec![PixelPoint::new(60.0 * i as f64, 500.0 + 2.0 * i as f64)],
                    poses: vec![swing_pose(0.40 + 0.01 * i as f64)],
                    ..Default::default()
                },
            );
        }
        let mut bounce_scores = BTreeMap::new();
        bounce_scores.insert(14, 0.8);
        let obs = RecordedObservations {
            video_info: video(total),
            frames,
            bounce_scores,
        };

        let calibrator =
            Calibrator::new(Config::default()).with_manual_calibration(square_calibration());
        let report = calibrator
            .run(&video(total), &oracles(&obs), &CancelToken::new())
            .unwrap();

        assert_eq!(report.detection_stats.court_calibration_source, "manual");
        assert_eq!(report.detection_stats.bounces_detected, 1);
        assert!(report.summary.total_shots >= 1);
        let first = &report.shots[0];
        // Landing at the bounce frame, inside the court laterally but the
        // call depends on the mapped position; it must not be unknown.
        assert_ne!(first.outcome, crate::types::Outcome::Unknown);
        assert!(first.speed_mps.is_some());
        assert!(first.pose_suitable);
    }

    #[test]
    fn test_shots_without_pose_are_segmented_but_not_analyzed() {
        // Same ball flight as the end-to-end case but no poses anywhere:
        // the shot is still segmented, yet produces no record and none of
        // its (absent) kinematics reach the summary.
        let total = 40;
        let mut frames = BTreeMap::new();
        for i in 0..20 {
            frames.insert(
                i,
                FrameObservations {
                    ball: vec![PixelPoint::new(60.0 * i as f64, 500.0)],
                    ..Default::default()
                },
            );
        }
        let obs = RecordedObservations {
            video_info: video(total),
            frames,
            bounce_scores: BTreeMap::new(),
        };
        let calibrator =
            Calibrator::new(Config::default()).with_manual_calibration(square_calibration());
        let report = calibrator
            .run(&video(total), &oracles(&obs), &CancelToken::new())
            .unwrap();
        assert!(report.detection_stats.shots_segmented >= 1);
        assert_eq!(report.detection_stats.shots_analyzed, 0);
        assert!(report.shots.is_empty());
        assert_eq!(report.summary.total_shots, 0);
        assert!(report.summary.overall.velocity_normalized.is_none());
    }
}
