// src/types.rs

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub io: IoConfig,
    pub court: CourtDetectionConfig,
    pub trajectory: TrajectoryConfig,
    pub bounce: BounceConfig,
    pub segmenter: SegmenterConfig,
    pub outcome: OutcomeConfig,
    pub stroke: StrokeConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    pub input_dir: String,
    pub output_dir: String,
    /// Optional manual court calibration JSON reused for every clip.
    pub manual_calibration: Option<String>,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            input_dir: "observations".to_string(),
            output_dir: "reports".to_string(),
            manual_calibration: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CourtDetectionConfig {
    /// Minimum confidence for the neural-keypoint strategy to win outright.
    pub keypoint_confidence_threshold: f64,
    /// Minimum confidence for the line-intersection strategy to win outright.
    pub line_confidence_threshold: f64,
    /// Minimum confidence for the color-quad strategy to win outright.
    pub color_confidence_threshold: f64,
}

impl Default for CourtDetectionConfig {
    fn default() -> Self {
        Self {
            keypoint_confidence_threshold: 0.7,
            line_confidence_threshold: 0.5,
            color_confidence_threshold: 0.4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrajectoryConfig {
    /// Maximum pixel distance between the previous accepted position and a
    /// new candidate (or a spline-extrapolated fill and the next observation).
    pub max_gate_px: f64,
    /// Number of preceding valid frames required for spline gap filling.
    pub interpolation_window: usize,
    /// Maximum consecutive gap fills before giving up on a run of misses.
    pub max_consecutive_fills: usize,
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        Self {
            max_gate_px: 80.0,
            interpolation_window: 5,
            max_consecutive_fills: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BounceConfig {
    /// Regressor score above which a frame is a candidate bounce.
    pub score_threshold: f64,
}

impl Default for BounceConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.45,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Per-axis displacement below which a sample is ignored for direction.
    pub min_displacement_px: f64,
    /// Direction change that splits the rally into a new shot.
    pub reversal_angle_deg: f64,
    /// Shots shorter than this are discarded.
    pub min_shot_seconds: f64,
    /// Soft cap on shot duration; reversal/bounce triggers keep shots short.
    pub max_shot_seconds: f64,
    /// Frames after contact used for the court-space speed estimate.
    pub speed_window_frames: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_displacement_px: 5.0,
            reversal_angle_deg: 90.0,
            min_shot_seconds: 0.3,
            max_shot_seconds: 3.0,
            speed_window_frames: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutcomeConfig {
    /// Extra tolerance around the court boundary, meters.
    pub margin_m: f64,
}

impl Default for OutcomeConfig {
    fn default() -> Self {
        Self { margin_m: 0.3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrokeConfig {
    /// Peak wrist velocity (torso-lengths/s) below which no stroke is called.
    pub min_peak_velocity: f64,
    /// Hip-shoulder separation beyond which rotation decides the stroke side.
    pub rotation_threshold_deg: f64,
}

impl Default for StrokeConfig {
    fn default() -> Self {
        Self {
            min_peak_velocity: 0.5,
            rotation_threshold_deg: 20.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// A point in image space. Absence of a detection is `Option<PixelPoint>`;
/// both coordinates are always present together. Serializes as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl From<(f64, f64)> for PixelPoint {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

impl From<PixelPoint> for (f64, f64) {
    fn from(p: PixelPoint) -> Self {
        (p.x, p.y)
    }
}

impl PixelPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &PixelPoint) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// A point on the court plane in meters. The origin convention depends on
/// the calibration source: centered on the court for automatic calibration,
/// near-baseline-left corner for manual and classical-CV calibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct CourtPoint {
    pub x: f64,
    pub y: f64,
}

impl From<(f64, f64)> for CourtPoint {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

impl From<CourtPoint> for (f64, f64) {
    fn from(p: CourtPoint) -> Self {
        (p.x, p.y)
    }
}

impl CourtPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &CourtPoint) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    In,
    Out,
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub total_frames: usize,
}

/// One segmented shot. Invariant:
/// start_frame <= contact_frame <= landing_frame <= end_frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shot {
    pub start_frame: usize,
    pub end_frame: usize,
    pub contact_frame: usize,
    pub landing_frame: usize,
    pub landing_pixel: Option<PixelPoint>,
    pub speed_mps: Option<f64>,
    pub speed_mph: Option<f64>,
    pub duration_frames: usize,
    pub duration_seconds: f64,
}

/// Per-shot join of trajectory, pose, and stroke data fed to the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub shot_index: usize,
    pub stroke_type: String,
    pub outcome: Outcome,
    pub contact_frame: usize,
    pub duration_seconds: f64,
    pub speed_mps: Option<f64>,
    pub speed_mph: Option<f64>,
    pub landing_court: Option<CourtPoint>,
    pub velocity_normalized: f64,
    pub velocity_raw: f64,
    pub left_elbow_angle: f64,
    pub right_elbow_angle: f64,
    pub hip_shoulder_separation: f64,
    pub knee_bend: f64,
    pub camera_view_type: String,
    /// Whether the camera angle was good enough to trust the kinematics.
    /// Unsuitable records keep their ball-side numbers but are left out of
    /// the kinematic aggregates.
    pub pose_suitable: bool,
    pub body_scale_torso: Option<f64>,
}
