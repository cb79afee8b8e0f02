// src/analysis/pose_metrics.rs
//
// Kinematic metrics from pose landmark snapshots at the moment of racket
// contact. All landmark coordinates are normalized image space; distances
// are normalized by torso length so metrics compare across subjects and
// zoom levels.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const ANGLE_EPS: f64 = 1e-10;
const MIN_TORSO_LENGTH: f64 = 0.01;
const EXTREME_SIDE_SHOULDER_WIDTH: f64 = 0.05;
const ANGLED_DEPTH_DIFFERENCE: f64 = 0.1;
const FRONT_BACK_MAX_ANGLE_DEG: f64 = 20.0;

/// Landmark ids of the pose model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Landmark {
    Nose = 0,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub visibility: f64,
}

/// One person's pose in one frame: landmark id -> normalized coordinates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoseSnapshot {
    pub landmarks: BTreeMap<usize, LandmarkPoint>,
}

impl PoseSnapshot {
    pub fn get(&self, landmark: Landmark) -> Option<&LandmarkPoint> {
        self.landmarks.get(&(landmark as usize))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BodyScale {
    pub torso_length: f64,
    pub shoulder_width: f64,
    pub width_to_torso_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewType {
    FrontOrBack,
    Side,
    Angled,
    ExtremeSide,
}

impl ViewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewType::FrontOrBack => "front_or_back",
            ViewType::Side => "side",
            ViewType::Angled => "angled",
            ViewType::ExtremeSide => "extreme_side",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CameraAngleAssessment {
    pub shoulder_angle_deg: f64,
    pub shoulder_width_norm: f64,
    pub depth_difference: f64,
    pub view_type: ViewType,
    pub suitable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KinematicMetrics {
    /// Peak wrist speed in normalized image units per second.
    pub velocity_raw: f64,
    /// Peak wrist speed in torso lengths per second.
    pub velocity_normalized: f64,
    /// Which wrist moved faster.
    pub dominant_hand: Side,
    pub left_elbow_angle: f64,
    pub right_elbow_angle: f64,
    /// Signed shoulder-minus-hip line rotation, degrees in [-180, 180].
    pub hip_shoulder_separation: f64,
    /// Mean knee flexion angle, degrees (180 = straight leg).
    pub knee_bend: f64,
    pub body_scale: BodyScale,
}

/// Torso length (shoulder midpoint to hip midpoint) and shoulder width.
/// `None` when any of the four torso landmarks is missing or the torso
/// collapses to a point.
pub fn body_scale(pose: &PoseSnapshot) -> Option<BodyScale> {
    let ls = pose.get(Landmark::LeftShoulder)?;
    let rs = pose.get(Landmark::RightShoulder)?;
    let lh = pose.get(Landmark::LeftHip)?;
    let rh = pose.get(Landmark::RightHip)?;

    let shoulder_mid = midpoint(ls, rs);
    let hip_mid = midpoint(lh, rh);
    let torso_length = dist2(shoulder_mid, hip_mid);
    if torso_length < MIN_TORSO_LENGTH {
        return None;
    }
    let shoulder_width = dist2((ls.x, ls.y), (rs.x, rs.y));
    Some(BodyScale {
        torso_length,
        shoulder_width,
        width_to_torso_ratio: shoulder_width / torso_length,
    })
}

/// Classify how the camera sees the subject from shoulder geometry. A
/// nearly edge-on subject gives useless rotation metrics, so extreme side
/// views are flagged unsuitable.
pub fn assess_camera_angle(pose: &PoseSnapshot) -> Option<CameraAngleAssessment> {
    let ls = pose.get(Landmark::LeftShoulder)?;
    let rs = pose.get(Landmark::RightShoulder)?;

    let shoulder_width_norm = dist2((ls.x, ls.y), (rs.x, rs.y));
    let shoulder_angle_deg = (rs.y - ls.y).atan2(rs.x - ls.x).to_degrees();
    let depth_difference = (ls.z - rs.z).abs();

    let view_type = if shoulder_width_norm < EXTREME_SIDE_SHOULDER_WIDTH {
        ViewType::ExtremeSide
    } else if depth_difference > ANGLED_DEPTH_DIFFERENCE {
        ViewType::Angled
    } else if shoulder_angle_deg.abs() < FRONT_BACK_MAX_ANGLE_DEG {
        ViewType::FrontOrBack
    } else {
        ViewType::Side
    };

    Some(CameraAngleAssessment {
        shoulder_angle_deg,
        shoulder_width_norm,
        depth_difference,
        view_type,
        suitable: view_type != ViewType::ExtremeSide,
    })
}

/// Kinematics at contact. `previous` is the pose one frame earlier, used
/// for wrist velocity; metrics are `None` when the body scale cannot be
/// established.
pub fn compute_metrics(
    current: &PoseSnapshot,
    previous: Option<&PoseSnapshot>,
    fps: f64,
) -> Option<KinematicMetrics> {
    let scale = body_scale(current)?;

    let left_speed = wrist_speed(current, previous, Landmark::LeftWrist, fps);
    let right_speed = wrist_speed(current, previous, Landmark::RightWrist, fps);
    let (velocity_raw, dominant_hand) = if right_speed >= left_speed {
        (right_speed, Side::Right)
    } else {
        (left_speed, Side::Left)
    };

    let left_elbow_angle = joint_angle(
        current,
        Landmark::LeftShoulder,
        Landmark::LeftElbow,
        Landmark::LeftWrist,
    );
    let right_elbow_angle = joint_angle(
        current,
        Landmark::RightShoulder,
        Landmark::RightElbow,
        Landmark::RightWrist,
    );

    let left_knee = joint_angle(
        current,
        Landmark::LeftHip,
        Landmark::LeftKnee,
        Landmark::LeftAnkle,
    );
    let right_knee = joint_angle(
        current,
        Landmark::RightHip,
        Landmark::RightKnee,
        Landmark::RightAnkle,
    );
    let knee_bend = (left_knee + right_knee) / 2.0;

    Some(KinematicMetrics {
        velocity_raw,
        velocity_normalized: velocity_raw / scale.torso_length,
        dominant_hand,
        left_elbow_angle,
        right_elbow_angle,
        hip_shoulder_separation: hip_shoulder_separation(current).unwrap_or(0.0),
        knee_bend,
        body_scale: scale,
    })
}

/// Signed rotation of the shoulder line relative to the hip line, wrapped
/// to [-180, 180]. Positive means shoulders rotated counterclockwise past
/// the hips in image space.
pub fn hip_shoulder_separation(pose: &PoseSnapshot) -> Option<f64> {
    let ls = pose.get(Landmark::LeftShoulder)?;
    let rs = pose.get(Landmark::RightShoulder)?;
    let lh = pose.get(Landmark::LeftHip)?;
    let rh = pose.get(Landmark::RightHip)?;

    let shoulder_angle = (rs.y - ls.y).atan2(rs.x - ls.x).to_degrees();
    let hip_angle = (rh.y - lh.y).atan2(rh.x - lh.x).to_degrees();
    let mut separation = shoulder_angle - hip_angle;
    while separation > 180.0 {
        separation -= 360.0;
    }
    while separation < -180.0 {
        separation += 360.0;
    }
    Some(separation)
}

fn wrist_speed(
    current: &PoseSnapshot,
    previous: Option<&PoseSnapshot>,
    wrist: Landmark,
    fps: f64,
) -> f64 {
    let (Some(now), Some(prev_pose)) = (current.get(wrist), previous) else {
        return 0.0;
    };
    let Some(before) = prev_pose.get(wrist) else {
        return 0.0;
    };
    dist2((now.x, now.y), (before.x, before.y)) * fps
}

/// Interior angle at `vertex` between the rays toward `a` and `b`, in
/// degrees. Degenerate geometry yields 0.
fn joint_angle(pose: &PoseSnapshot, a: Landmark, vertex: Landmark, b: Landmark) -> f64 {
    let (Some(pa), Some(pv), Some(pb)) = (pose.get(a), pose.get(vertex), pose.get(b)) else {
        return 0.0;
    };
    let va = (pa.x - pv.x, pa.y - pv.y);
    let vb = (pb.x - pv.x, pb.y - pv.y);
    let na = (va.0 * va.0 + va.1 * va.1).sqrt();
    let nb = (vb.0 * vb.0 + vb.1 * vb.1).sqrt();
    if na < ANGLE_EPS || nb < ANGLE_EPS {
        return 0.0;
    }
    let cos = ((va.0 * vb.0 + va.1 * vb.1) / (na * nb)).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

fn midpoint(a: &LandmarkPoint, b: &LandmarkPoint) -> (f64, f64) {
    ((a.x + b.x) / 2.0, (a.y + b.y) / 2.0)
}

fn dist2(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lm(x: f64, y: f64, z: f64) -> LandmarkPoint {
        LandmarkPoint {
            x,
            y,
            z,
            visibility: 0.95,
        }
    }

    /// Upright subject facing the camera: level shoulders and hips.
    fn facing_pose() -> PoseSnapshot {
        let mut landmarks = BTreeMap::new();
        landmarks.insert(Landmark::LeftShoulder as usize, lm(0.40, 0.30, 0.0));
        landmarks.insert(Landmark::RightShoulder as usize, lm(0.60, 0.30, 0.0));
        landmarks.insert(Landmark::LeftHip as usize, lm(0.42, 0.55, 0.0));
        landmarks.insert(Landmark::RightHip as usize, lm(0.58, 0.55, 0.0));
        landmarks.insert(Landmark::LeftElbow as usize, lm(0.33, 0.40, 0.0));
        landmarks.insert(Landmark::RightElbow as usize, lm(0.67, 0.40, 0.0));
        landmarks.insert(Landmark::LeftWrist as usize, lm(0.30, 0.50, 0.0));
        landmarks.insert(Landmark::RightWrist as usize, lm(0.70, 0.50, 0.0));
        landmarks.insert(Landmark::LeftKnee as usize, lm(0.43, 0.75, 0.0));
        landmarks.insert(Landmark::RightKnee as usize, lm(0.57, 0.75, 0.0));
        landmarks.insert(Landmark::LeftAnkle as usize, lm(0.43, 0.95, 0.0));
        landmarks.insert(Landmark::RightAnkle as usize, lm(0.57, 0.95, 0.0));
        PoseSnapshot { landmarks }
    }

    #[test]
    fn test_body_scale_from_torso_midpoints() {
        let scale = body_scale(&facing_pose()).unwrap();
        assert!((scale.torso_length - 0.25).abs() < 1e-9);
        assert!((scale.shoulder_width - 0.20).abs() < 1e-9);
        assert!((scale.width_to_torso_ratio - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_camera_view_classification() {
        // Level shoulders, no depth split: front or back.
        let assessment = assess_camera_angle(&facing_pose()).unwrap();
        assert_eq!(assessment.view_type, ViewType::FrontOrBack);
        assert!(assessment.suitable);

        // Narrow shoulders: extreme side, unsuitable.
        let mut pose = facing_pose();
        pose.landmarks
            .insert(Landmark::RightShoulder as usize, lm(0.42, 0.30, 0.0));
        let assessment = assess_camera_angle(&pose).unwrap();
        assert_eq!(assessment.view_type, ViewType::ExtremeSide);
        assert!(!assessment.suitable);

        // Large depth split: angled.
        let mut pose = facing_pose();
        pose.landmarks
            .insert(Landmark::RightShoulder as usize, lm(0.60, 0.30, 0.25));
        let assessment = assess_camera_angle(&pose).unwrap();
        assert_eq!(assessment.view_type, ViewType::Angled);

        // Steep shoulder line without depth split: side.
        let mut pose = facing_pose();
        pose.landmarks
            .insert(Landmark::RightShoulder as usize, lm(0.55, 0.42, 0.0));
        let assessment = assess_camera_angle(&pose).unwrap();
        assert_eq!(assessment.view_type, ViewType::Side);
    }

    #[test]
    fn test_wrist_velocity_normalized_by_torso() {
        let previous = facing_pose();
        let mut current = facing_pose();
        // Right wrist travels 0.05 units in one frame at 30 fps.
        current
            .landmarks
            .insert(Landmark::RightWrist as usize, lm(0.75, 0.50, 0.0));
        let metrics = compute_metrics(&current, Some(&previous), 30.0).unwrap();
        assert_eq!(metrics.dominant_hand, Side::Right);
        assert!((metrics.velocity_raw - 1.5).abs() < 1e-9);
        assert!((metrics.velocity_normalized - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_velocity_zero_without_previous_frame() {
        let metrics = compute_metrics(&facing_pose(), None, 30.0).unwrap();
        assert_eq!(metrics.velocity_raw, 0.0);
    }

    #[test]
    fn test_straight_arm_elbow_angle() {
        let mut pose = facing_pose();
        // Shoulder, elbow, wrist collinear on the right arm.
        pose.landmarks
            .insert(Landmark::RightElbow as usize, lm(0.65, 0.40, 0.0));
        pose.landmarks
            .insert(Landmark::RightWrist as usize, lm(0.70, 0.50, 0.0));
        pose.landmarks
            .insert(Landmark::RightShoulder as usize, lm(0.60, 0.30, 0.0));
        let metrics = compute_metrics(&pose, None, 30.0).unwrap();
        assert!((metrics.right_elbow_angle - 180.0).abs() < 1e-6);
    }

    #[test]
    fn test_hip_shoulder_separation_sign() {
        let mut pose = facing_pose();
        // Rotate the shoulder line clockwise in image space (right shoulder
        // higher than left): negative angle relative to level hips.
        pose.landmarks
            .insert(Landmark::RightShoulder as usize, lm(0.60, 0.20, 0.0));
        let separation = hip_shoulder_separation(&pose).unwrap();
        assert!(separation < -20.0, "separation = {separation}");
    }

    #[test]
    fn test_degenerate_torso_rejected() {
        let mut landmarks = BTreeMap::new();
        landmarks.insert(Landmark::LeftShoulder as usize, lm(0.5, 0.5, 0.0));
        landmarks.insert(Landmark::RightShoulder as usize, lm(0.5, 0.5, 0.0));
        landmarks.insert(Landmark::LeftHip as usize, lm(0.5, 0.5, 0.0));
        landmarks.insert(Landmark::RightHip as usize, lm(0.5, 0.5, 0.0));
        let pose = PoseSnapshot { landmarks };
        assert!(compute_metrics(&pose, None, 30.0).is_none());
    }
}
