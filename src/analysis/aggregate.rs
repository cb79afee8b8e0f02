// src/analysis/aggregate.rs
//
// End-of-clip aggregation: percentile summaries of the per-shot records,
// grouped overall, by outcome, and by stroke type, plus camera-view and
// body-scale stability counts.

use crate::types::{CalibrationRecord, Outcome};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Percentile summary of one metric across shots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub p10: f64,
    pub p25: f64,
    pub p75: f64,
    pub p90: f64,
}

impl AggregateStats {
    /// `None` for an empty sample.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let count = sorted.len();
        let mean = sorted.iter().sum::<f64>() / count as f64;
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;

        Some(Self {
            count,
            min: sorted[0],
            max: sorted[count - 1],
            mean,
            median: percentile(&sorted, 50.0),
            std: variance.sqrt(),
            p10: percentile(&sorted, 10.0),
            p25: percentile(&sorted, 25.0),
            p75: percentile(&sorted, 75.0),
            p90: percentile(&sorted, 90.0),
        })
    }
}

/// Linear-interpolation percentile over a sorted sample, matching the
/// numpy default method.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (n - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let frac = rank - lower as f64;
    sorted[lower] * (1.0 - frac) + sorted[upper] * frac
}

/// Distributions of the four calibration metrics over some subset of the
/// records. Hip-shoulder separation is aggregated as magnitude. Ball speed
/// covers every record; the body-derived metrics come only from records
/// whose camera angle was suitable, so an extreme side view cannot drag
/// the kinematic percentiles down.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricStats {
    pub speed_mps: Option<AggregateStats>,
    pub velocity_normalized: Option<AggregateStats>,
    pub hip_shoulder_separation: Option<AggregateStats>,
    pub knee_bend: Option<AggregateStats>,
}

impl MetricStats {
    fn over<'a>(records: impl Iterator<Item = &'a CalibrationRecord> + Clone) -> Self {
        let speeds: Vec<f64> = records.clone().filter_map(|r| r.speed_mps).collect();
        let suitable = records.filter(|r| r.pose_suitable);
        let velocities: Vec<f64> = suitable.clone().map(|r| r.velocity_normalized).collect();
        let separations: Vec<f64> = suitable
            .clone()
            .map(|r| r.hip_shoulder_separation.abs())
            .collect();
        let knees: Vec<f64> = suitable.map(|r| r.knee_bend).filter(|a| *a > 0.0).collect();
        Self {
            speed_mps: AggregateStats::from_values(&speeds),
            velocity_normalized: AggregateStats::from_values(&velocities),
            hip_shoulder_separation: AggregateStats::from_values(&separations),
            knee_bend: AggregateStats::from_values(&knees),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrokeGroup {
    pub count: usize,
    pub metrics: MetricStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorsoStability {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    /// Coefficient of variation; a jumpy torso estimate means unstable
    /// scale normalization.
    pub cv: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub total_shots: usize,
    pub shots_in: usize,
    pub shots_out: usize,
    pub shots_unknown: usize,
    pub overall: MetricStats,
    pub in_only: MetricStats,
    pub by_stroke: BTreeMap<String, StrokeGroup>,
    pub camera_views: BTreeMap<String, usize>,
    pub suitable_pose_count: usize,
    pub torso: Option<TorsoStability>,
}

impl Summary {
    pub fn build(records: &[CalibrationRecord]) -> Self {
        let overall = MetricStats::over(records.iter());
        let in_only = MetricStats::over(records.iter().filter(|r| r.outcome == Outcome::In));

        let mut by_stroke: BTreeMap<String, StrokeGroup> = BTreeMap::new();
        let strokes: std::collections::BTreeSet<&str> =
            records.iter().map(|r| r.stroke_type.as_str()).collect();
        for stroke in strokes {
            let group = records.iter().filter(|r| r.stroke_type == stroke);
            by_stroke.insert(
                stroke.to_string(),
                StrokeGroup {
                    count: group.clone().count(),
                    metrics: MetricStats::over(group),
                },
            );
        }

        let mut camera_views: BTreeMap<String, usize> = BTreeMap::new();
        let mut suitable_pose_count = 0;
        for record in records {
            *camera_views.entry(record.camera_view_type.clone()).or_default() += 1;
            if record.pose_suitable {
                suitable_pose_count += 1;
            }
        }

        let torsos: Vec<f64> = records.iter().filter_map(|r| r.body_scale_torso).collect();
        let torso = AggregateStats::from_values(&torsos).map(|s| TorsoStability {
            count: s.count,
            mean: s.mean,
            std: s.std,
            cv: if s.mean.abs() > f64::EPSILON {
                s.std / s.mean
            } else {
                0.0
            },
        });

        Self {
            total_shots: records.len(),
            shots_in: records.iter().filter(|r| r.outcome == Outcome::In).count(),
            shots_out: records.iter().filter(|r| r.outcome == Outcome::Out).count(),
            shots_unknown: records
                .iter()
                .filter(|r| r.outcome == Outcome::Unknown)
                .count(),
            overall,
            in_only,
            by_stroke,
            camera_views,
            suitable_pose_count,
            torso,
        }
    }
}
