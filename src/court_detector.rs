// src/court_detector.rs
//
// Per-frame court calibration with three strategies in decreasing order of
// reliability: neural keypoints, line intersection, color segmentation.
// Each strategy reports a confidence; arbitration stops early once a
// strategy clears its own threshold and otherwise falls back to the best
// non-null attempt.

use crate::court::{
    reference_point, reference_to_meters_matrix, singles_corners_m, COURT_LENGTH_M,
    CONFIGURATIONS, NUM_KEYPOINTS, NUM_SCORED_KEYPOINTS,
};
use crate::homography::Homography;
use crate::oracles::{CourtOracle, LineSegment};
use crate::types::{CourtDetectionConfig, CourtPoint, PixelPoint};
use tracing::{debug, trace};

const LINE_STRATEGY_CONFIDENCE: f64 = 0.7;
const BASELINE_MAX_ANGLE_DEG: f64 = 15.0;
const SIDELINE_MIN_ANGLE_DEG: f64 = 50.0;
const SIDELINE_MIN_Y_SPAN_FRAC: f64 = 0.08;
const SIDELINE_MIN_LENGTH_PX: f64 = 60.0;
const FAR_LINE_BAND: (f64, f64) = (0.25, 0.55);
const COLOR_MIN_AREA_FRACTION: f64 = 0.2;
const COLOR_MAX_CONFIDENCE: f64 = 0.5;

/// Which axis convention the solved meters plane uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateFrame {
    /// x centered on the court, y from the near baseline. Neural strategy.
    Centered,
    /// Origin at the near-left singles corner. Manual and classical-CV.
    CornerOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMethod {
    NeuralKeypoints,
    LineIntersection,
    ColorSegmentation,
}

/// A solved pixel->meters mapping plus the convention its output obeys.
#[derive(Debug, Clone)]
pub struct CourtMapping {
    pub homography: Homography,
    pub frame: CoordinateFrame,
}

impl CourtMapping {
    pub fn pixel_to_court(&self, p: &PixelPoint) -> Option<CourtPoint> {
        self.homography.pixel_to_court(p)
    }
}

#[derive(Debug, Clone)]
pub struct CourtDetection {
    pub method: DetectionMethod,
    pub confidence: f64,
    pub mapping: CourtMapping,
    pub keypoints_detected: usize,
}

pub struct CourtDetector {
    config: CourtDetectionConfig,
    frame_size: (u32, u32),
}

impl CourtDetector {
    pub fn new(config: CourtDetectionConfig, frame_size: (u32, u32)) -> Self {
        Self { config, frame_size }
    }

    /// Run the strategy cascade for one frame. `None` when every strategy
    /// comes up empty.
    pub fn detect(&self, oracle: &dyn CourtOracle, frame_idx: usize) -> Option<CourtDetection> {
        let mut best: Option<CourtDetection> = None;

        if let Some(det) = self.detect_neural(oracle, frame_idx) {
            if det.confidence >= self.config.keypoint_confidence_threshold {
                trace!(frame = frame_idx, conf = det.confidence, "neural keypoints cleared threshold");
                return Some(det);
            }
            best = Some(det);
        }

        if let Some(det) = self.detect_lines(oracle, frame_idx) {
            if det.confidence >= self.config.line_confidence_threshold {
                trace!(frame = frame_idx, conf = det.confidence, "line intersection cleared threshold");
                return Some(det);
            }
            best = pick_better(best, det);
        }

        if let Some(det) = self.detect_color(oracle, frame_idx) {
            if det.confidence >= self.config.color_confidence_threshold {
                trace!(frame = frame_idx, conf = det.confidence, "color segmentation cleared threshold");
                return Some(det);
            }
            best = pick_better(best, det);
        }

        if best.is_none() {
            debug!(frame = frame_idx, "no court detection on any strategy");
        }
        best
    }

    /// Neural-keypoint strategy: among the predefined four-point
    /// configurations that are fully detected, solve each reference->pixel
    /// homography and keep the one whose projection of the *other* detected
    /// keypoints has the smallest mean residual.
    fn detect_neural(&self, oracle: &dyn CourtOracle, frame_idx: usize) -> Option<CourtDetection> {
        let keypoints = oracle.keypoints(frame_idx);
        let detected = keypoints.iter().filter(|k| k.is_some()).count();
        if detected < 4 {
            return None;
        }

        let mut best: Option<(f64, Homography)> = None;
        for conf in &CONFIGURATIONS {
            let Some(pixels) = conf
                .iter()
                .map(|&i| keypoints[i])
                .collect::<Option<Vec<PixelPoint>>>()
            else {
                continue;
            };
            let src: Vec<(f64, f64)> = conf.iter().map(|&i| reference_point(i)).collect();
            let dst: Vec<(f64, f64)> = pixels.iter().map(|p| (p.x, p.y)).collect();
            let Some(candidate) = Homography::fit(&src, &dst) else {
                continue;
            };

            let Some(residual) = score_configuration(&candidate, conf, &keypoints) else {
                // No independent keypoints to score against; accept the
                // exact-fit candidate only if nothing scored beats it.
                if best.is_none() {
                    best = Some((f64::MAX, candidate));
                }
                continue;
            };
            match &best {
                Some((best_residual, _)) if residual >= *best_residual => {}
                _ => best = Some((residual, candidate)),
            }
        }

        let (residual, ref_to_pixel) = best?;
        trace!(frame = frame_idx, residual, "selected keypoint configuration");

        // Stored mapping is pixel->reference composed with the
        // reference->meters affine.
        let pixel_to_ref = Homography::from_matrix(ref_to_pixel.matrix().try_inverse()?)?;
        let mapping_h = pixel_to_ref.then(&reference_to_meters_matrix())?;

        Some(CourtDetection {
            method: DetectionMethod::NeuralKeypoints,
            confidence: detected as f64 / NUM_KEYPOINTS as f64,
            mapping: CourtMapping {
                homography: mapping_h,
                frame: CoordinateFrame::Centered,
            },
            keypoints_detected: detected,
        })
    }

    /// Line-intersection strategy: classify extracted segments into a near
    /// baseline, two sidelines, and a far line, then intersect them to
    /// recover the four singles corners.
    fn detect_lines(&self, oracle: &dyn CourtOracle, frame_idx: usize) -> Option<CourtDetection> {
        let segments = oracle.line_segments(frame_idx);
        if segments.len() < 4 {
            return None;
        }
        let height = self.frame_size.1 as f64;

        let mut baselines: Vec<&LineSegment> = Vec::new();
        let mut far_lines: Vec<&LineSegment> = Vec::new();
        let mut sidelines: Vec<&LineSegment> = Vec::new();
        for seg in &segments {
            let angle = seg.angle_deg().abs();
            if angle < BASELINE_MAX_ANGLE_DEG {
                if seg.mid_y() > height / 2.0 {
                    baselines.push(seg);
                } else if seg.mid_y() > height * FAR_LINE_BAND.0
                    && seg.mid_y() < height * FAR_LINE_BAND.1
                {
                    far_lines.push(seg);
                }
            } else if angle > SIDELINE_MIN_ANGLE_DEG
                && seg.y_span() > height * SIDELINE_MIN_Y_SPAN_FRAC
                && seg.length() > SIDELINE_MIN_LENGTH_PX
            {
                sidelines.push(seg);
            }
        }
        if sidelines.len() < 2 {
            return None;
        }

        let baseline = longest(&baselines)?;
        let far_line = longest(&far_lines)?;
        sidelines.sort_by(|a, b| mid_x(a).partial_cmp(&mid_x(b)).unwrap_or(std::cmp::Ordering::Equal));
        let left = sidelines[0];
        let right = sidelines[sidelines.len() - 1];
        if mid_x(right) - mid_x(left) < 1.0 {
            return None;
        }

        // Corners ordered near-left, near-right, far-right, far-left to
        // match the corner-origin court corners.
        let corners = [
            intersect(baseline, left)?,
            intersect(baseline, right)?,
            intersect(far_line, right)?,
            intersect(far_line, left)?,
        ];
        let mapping = solve_corner_mapping(&corners)?;
        debug!(frame = frame_idx, "court recovered from line intersections");

        Some(CourtDetection {
            method: DetectionMethod::LineIntersection,
            confidence: LINE_STRATEGY_CONFIDENCE,
            mapping,
            keypoints_detected: 0,
        })
    }

    /// Color-segmentation strategy: take the largest court-hued quad and
    /// treat its ordered corners as the singles court extent.
    fn detect_color(&self, oracle: &dyn CourtOracle, frame_idx: usize) -> Option<CourtDetection> {
        let quads = oracle.color_quads(frame_idx);
        let quad = quads
            .iter()
            .filter(|q| q.area_fraction > COLOR_MIN_AREA_FRACTION)
            .max_by(|a, b| {
                a.area_fraction
                    .partial_cmp(&b.area_fraction)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })?;
        let mapping = solve_corner_mapping(&quad.corners)?;
        debug!(
            frame = frame_idx,
            area = quad.area_fraction,
            "court recovered from color segmentation"
        );

        Some(CourtDetection {
            method: DetectionMethod::ColorSegmentation,
            confidence: quad.area_fraction.min(COLOR_MAX_CONFIDENCE),
            mapping,
            keypoints_detected: 0,
        })
    }
}

fn pick_better(best: Option<CourtDetection>, candidate: CourtDetection) -> Option<CourtDetection> {
    match best {
        Some(b) if b.confidence >= candidate.confidence => Some(b),
        _ => Some(candidate),
    }
}

/// Mean projection residual of a candidate homography against the detected
/// keypoints outside its defining four. Center-line points are excluded.
fn score_configuration(
    candidate: &Homography,
    conf: &[usize; 4],
    keypoints: &[Option<PixelPoint>; NUM_KEYPOINTS],
) -> Option<f64> {
    let mut total = 0.0;
    let mut count = 0;
    for (i, kp) in keypoints.iter().enumerate().take(NUM_SCORED_KEYPOINTS) {
        let Some(detected) = kp else { continue };
        if conf.contains(&i) {
            continue;
        }
        let (rx, ry) = reference_point(i);
        let (px, py) = candidate.project(rx, ry)?;
        total += ((px - detected.x).powi(2) + (py - detected.y).powi(2)).sqrt();
        count += 1;
    }
    if count == 0 {
        return None;
    }
    Some(total / count as f64)
}

fn longest<'a>(segments: &[&'a LineSegment]) -> Option<&'a LineSegment> {
    segments
        .iter()
        .max_by(|a, b| {
            a.length()
                .partial_cmp(&b.length())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .copied()
}

fn mid_x(seg: &LineSegment) -> f64 {
    (seg.x1 + seg.x2) / 2.0
}

/// Intersection of the infinite lines through two segments.
fn intersect(a: &LineSegment, b: &LineSegment) -> Option<PixelPoint> {
    let d1 = (a.x2 - a.x1, a.y2 - a.y1);
    let d2 = (b.x2 - b.x1, b.y2 - b.y1);
    let denom = d1.0 * d2.1 - d1.1 * d2.0;
    if denom.abs() < 1e-9 {
        return None;
    }
    let t = ((b.x1 - a.x1) * d2.1 - (b.y1 - a.y1) * d2.0) / denom;
    Some(PixelPoint::new(a.x1 + t * d1.0, a.y1 + t * d1.1))
}

/// Solve pixel->meters for four corners ordered near-left, near-right,
/// far-right, far-left, in the corner-origin convention.
fn solve_corner_mapping(corners: &[PixelPoint; 4]) -> Option<CourtMapping> {
    let court = singles_corners_m(COURT_LENGTH_M);
    let src: Vec<(f64, f64)> = corners.iter().map(|p| (p.x, p.y)).collect();
    let dst: Vec<(f64, f64)> = court.iter().map(|p| (p.x, p.y)).collect();
    let homography = Homography::fit(&src, &dst)?;
    Some(CourtMapping {
        homography,
        frame: CoordinateFrame::CornerOrigin,
    })
}
