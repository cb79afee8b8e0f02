// src/analysis/stroke.rs
//
// Stroke labeling from contact-frame kinematics. A slow swing is left
// unlabeled; otherwise the signed hip-shoulder rotation decides the side,
// interpreted through which hand is swinging.

use crate::analysis::pose_metrics::{KinematicMetrics, Side};
use crate::types::StrokeConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrokeType {
    Forehand,
    Backhand,
    Groundstroke,
    Unknown,
}

impl StrokeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrokeType::Forehand => "forehand",
            StrokeType::Backhand => "backhand",
            StrokeType::Groundstroke => "groundstroke",
            StrokeType::Unknown => "unknown",
        }
    }
}

pub fn classify_stroke(metrics: &KinematicMetrics, config: &StrokeConfig) -> StrokeType {
    if metrics.velocity_normalized < config.min_peak_velocity {
        return StrokeType::Unknown;
    }
    let rotation = metrics.hip_shoulder_separation;
    if rotation > config.rotation_threshold_deg {
        match metrics.dominant_hand {
            Side::Right => StrokeType::Forehand,
            Side::Left => StrokeType::Backhand,
        }
    } else if rotation < -config.rotation_threshold_deg {
        match metrics.dominant_hand {
            Side::Right => StrokeType::Backhand,
            Side::Left => StrokeType::Forehand,
        }
    } else {
        StrokeType::Groundstroke
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::pose_metrics::BodyScale;

    fn metrics(velocity: f64, rotation: f64, hand: Side) -> KinematicMetrics {
        KinematicMetrics {
            velocity_raw: velocity * 0.25,
            velocity_normalized: velocity,
            dominant_hand: hand,
            left_elbow_angle: 140.0,
            right_elbow_angle: 150.0,
            hip_shoulder_separation: rotation,
            knee_bend: 160.0,
            body_scale: BodyScale {
                torso_length: 0.25,
                shoulder_width: 0.2,
                width_to_torso_ratio: 0.8,
            },
        }
    }

    #[test]
    fn test_rule_table() {
        let cfg = StrokeConfig::default();
        let cases = [
            (metrics(0.3, 45.0, Side::Right), StrokeType::Unknown),
            (metrics(2.0, 45.0, Side::Right), StrokeType::Forehand),
            (metrics(2.0, 45.0, Side::Left), StrokeType::Backhand),
            (metrics(2.0, -45.0, Side::Right), StrokeType::Backhand),
            (metrics(2.0, -45.0, Side::Left), StrokeType::Forehand),
            (metrics(2.0, 10.0, Side::Right), StrokeType::Groundstroke),
            (metrics(2.0, -10.0, Side::Left), StrokeType::Groundstroke),
        ];
        for (m, expected) in cases {
            assert_eq!(classify_stroke(&m, &cfg), expected);
        }
    }

    #[test]
    fn test_threshold_boundaries_fall_to_groundstroke() {
        let cfg = StrokeConfig::default();
        // Exactly at the rotation threshold: not past it, so no side call.
        let m = metrics(2.0, 20.0, Side::Right);
        assert_eq!(classify_stroke(&m, &cfg), StrokeType::Groundstroke);
    }
}
