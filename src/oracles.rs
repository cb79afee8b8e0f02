// src/oracles.rs
//
// Detector oracle seams. The neural and image-processing detectors are
// external to this crate; the analysis engine talks to them through these
// traits. `RecordedObservations` replays detector outputs captured to JSON,
// which is how both the CLI and the end-to-end tests drive the pipeline.

use crate::analysis::bounce::BounceFeatures;
use crate::analysis::pose_metrics::PoseSnapshot;
use crate::court::NUM_KEYPOINTS;
use crate::types::{PixelPoint, VideoInfo};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// A detected line segment in image space, from edge/line extraction over
/// the frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LineSegment {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl LineSegment {
    pub fn length(&self) -> f64 {
        ((self.x2 - self.x1).powi(2) + (self.y2 - self.y1).powi(2)).sqrt()
    }

    /// Orientation in degrees in (-90, 90], measured from the image x axis.
    pub fn angle_deg(&self) -> f64 {
        let mut a = (self.y2 - self.y1).atan2(self.x2 - self.x1).to_degrees();
        if a > 90.0 {
            a -= 180.0;
        } else if a <= -90.0 {
            a += 180.0;
        }
        a
    }

    pub fn mid_y(&self) -> f64 {
        (self.y1 + self.y2) / 2.0
    }

    pub fn y_span(&self) -> f64 {
        (self.y2 - self.y1).abs()
    }
}

/// A candidate court-surface quadrilateral from color segmentation, with
/// corners already ordered near-left, near-right, far-right, far-left.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorQuad {
    pub corners: [PixelPoint; 4],
    /// Fraction of the frame area covered by the segmented region.
    pub area_fraction: f64,
}

/// Ball detector: runs over the current frame plus two preceding frames and
/// reports zero or more candidate positions for the current frame.
pub trait BallOracle {
    fn candidates(&self, frame_idx: usize) -> Vec<PixelPoint>;
}

/// Court feature detectors: neural keypoints plus the classical-CV inputs
/// the fallback strategies consume.
pub trait CourtOracle {
    /// The 14 named keypoints, each present or absent.
    fn keypoints(&self, frame_idx: usize) -> [Option<PixelPoint>; NUM_KEYPOINTS];
    fn line_segments(&self, frame_idx: usize) -> Vec<LineSegment>;
    fn color_quads(&self, frame_idx: usize) -> Vec<ColorQuad>;
}

/// Multi-person pose detector. Poses come back in detector order; the
/// engine always takes the first.
pub trait PoseOracle {
    fn poses(&self, frame_idx: usize) -> Vec<PoseSnapshot>;
}

/// Bounce regressor over the engineered trajectory features.
pub trait BounceOracle {
    fn score(&self, features: &BounceFeatures) -> f64;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameObservations {
    pub ball: Vec<PixelPoint>,
    pub keypoints: Vec<Option<PixelPoint>>,
    pub lines: Vec<LineSegment>,
    pub quads: Vec<ColorQuad>,
    pub poses: Vec<PoseSnapshot>,
}

/// Detector outputs for one clip, captured to JSON. Frames with no entry
/// behave as all-absent detections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedObservations {
    pub video_info: VideoInfo,
    #[serde(default)]
    pub frames: BTreeMap<usize, FrameObservations>,
    /// Regressor scores keyed by the bounce-candidate frame index.
    #[serde(default)]
    pub bounce_scores: BTreeMap<usize, f64>,
}

impl RecordedObservations {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading observations from {}", path.display()))?;
        let observations: Self = serde_json::from_str(&contents)
            .with_context(|| format!("parsing observations from {}", path.display()))?;
        Ok(observations)
    }
}

impl BallOracle for RecordedObservations {
    fn candidates(&self, frame_idx: usize) -> Vec<PixelPoint> {
        self.frames
            .get(&frame_idx)
            .map(|f| f.ball.clone())
            .unwrap_or_default()
    }
}

impl CourtOracle for RecordedObservations {
    fn keypoints(&self, frame_idx: usize) -> [Option<PixelPoint>; NUM_KEYPOINTS] {
        let mut out = [None; NUM_KEYPOINTS];
        if let Some(frame) = self.frames.get(&frame_idx) {
            for (slot, kp) in out.iter_mut().zip(frame.keypoints.iter()) {
                *slot = *kp;
            }
        }
        out
    }

    fn line_segments(&self, frame_idx: usize) -> Vec<LineSegment> {
        self.frames
            .get(&frame_idx)
            .map(|f| f.lines.clone())
            .unwrap_or_default()
    }

    fn color_quads(&self, frame_idx: usize) -> Vec<ColorQuad> {
        self.frames
            .get(&frame_idx)
            .map(|f| f.quads.clone())
            .unwrap_or_default()
    }
}

impl PoseOracle for RecordedObservations {
    fn poses(&self, frame_idx: usize) -> Vec<PoseSnapshot> {
        self.frames
            .get(&frame_idx)
            .map(|f| f.poses.clone())
            .unwrap_or_default()
    }
}

impl BounceOracle for RecordedObservations {
    fn score(&self, features: &BounceFeatures) -> f64 {
        self.bounce_scores
            .get(&features.frame)
            .copied()
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_frame_yields_absent_detections() {
        let obs = RecordedObservations {
            video_info: VideoInfo {
                width: 1280,
                height: 720,
                fps: 30.0,
                total_frames: 10,
            },
            frames: BTreeMap::new(),
            bounce_scores: BTreeMap::new(),
        };
        assert!(obs.candidates(3).is_empty());
        assert!(obs.keypoints(3).iter().all(Option::is_none));
        assert!(obs.poses(3).is_empty());
    }

    #[test]
    fn test_short_keypoint_vector_pads_with_absent() {
        let mut frames = BTreeMap::new();
        frames.insert(
            0,
            FrameObservations {
                keypoints: vec![Some(PixelPoint::new(1.0, 2.0)), None],
                ..Default::default()
            },
        );
        let obs = RecordedObservations {
            video_info: VideoInfo {
                width: 1280,
                height: 720,
                fps: 30.0,
                total_frames: 1,
            },
            frames,
            bounce_scores: BTreeMap::new(),
        };
        let kps = obs.keypoints(0);
        assert_eq!(kps[0], Some(PixelPoint::new(1.0, 2.0)));
        assert!(kps[2..].iter().all(Option::is_none));
    }

    #[test]
    fn test_angle_normalization() {
        let seg = LineSegment {
            x1: 0.0,
            y1: 0.0,
            x2: -10.0,
            y2: -1.0,
        };
        // Points "backwards"; normalized orientation stays near horizontal.
        assert!(seg.angle_deg().abs() < 15.0);
    }
}
