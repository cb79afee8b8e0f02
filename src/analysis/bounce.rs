// src/analysis/bounce.rs
//
// Bounce detection over the reconstructed trajectory. For every frame with
// a full +/-2 window of defined positions we engineer difference/ratio
// features, hand them to the scoring oracle, threshold, and collapse runs
// of consecutive positives to their best frame.

use crate::analysis::trajectory::Trajectory;
use crate::oracles::BounceOracle;
use crate::types::BounceConfig;
use std::collections::BTreeSet;
use tracing::debug;

const WINDOW: usize = 2;
const RATIO_EPS: f64 = 1e-15;
pub const NUM_FEATURES: usize = 12;

/// Engineered features for one candidate frame, ordered x block then y
/// block; within a block: backward diffs (lag minus center, lags 1, 2),
/// forward diffs (next minus center, lags 1, 2), then backward/forward
/// ratios (lags 1, 2). The x entries are absolute values, the y entries
/// keep their sign. The scoring model was trained on exactly this
/// orientation; do not flip the diffs.
#[derive(Debug, Clone)]
pub struct BounceFeatures {
    pub frame: usize,
    pub values: [f64; NUM_FEATURES],
}

pub struct BounceClassifier {
    config: BounceConfig,
}

impl BounceClassifier {
    pub fn new(config: BounceConfig) -> Self {
        Self { config }
    }

    /// Score every eligible frame and return the deduplicated set of
    /// bounce frame indices.
    pub fn detect(&self, trajectory: &Trajectory, oracle: &dyn BounceOracle) -> BTreeSet<usize> {
        let mut candidates: Vec<(usize, f64)> = Vec::new();
        for frame in WINDOW..trajectory.len().saturating_sub(WINDOW) {
            let Some(features) = extract_features(trajectory, frame) else {
                continue;
            };
            let score = oracle.score(&features);
            if score > self.config.score_threshold {
                candidates.push((frame, score));
            }
        }

        let bounces = dedup_runs(&candidates);
        debug!(
            candidates = candidates.len(),
            bounces = bounces.len(),
            "bounce classification done"
        );
        bounces
    }
}

/// Feature vector for `frame`, or `None` when any frame of its window has
/// no position.
pub fn extract_features(trajectory: &Trajectory, frame: usize) -> Option<BounceFeatures> {
    if frame < WINDOW {
        return None;
    }
    let at = |offset: isize| trajectory.position((frame as isize + offset) as usize);
    let window: Vec<_> = (-(WINDOW as isize)..=WINDOW as isize)
        .map(at)
        .collect::<Option<Vec<_>>>()?;
    let center = window[WINDOW];

    let mut values = [0.0; NUM_FEATURES];
    for (block, pick) in [(0usize, 0usize), (6, 1)] {
        let coord = |i: usize| if pick == 0 { window[i].x } else { window[i].y };
        let absolute = pick == 0;
        let c = if pick == 0 { center.x } else { center.y };
        for lag in 1..=WINDOW {
            let backward = coord(WINDOW - lag) - c;
            let forward = coord(WINDOW + lag) - c;
            let ratio = backward / (forward + RATIO_EPS);
            let idx = block + lag - 1;
            values[idx] = if absolute { backward.abs() } else { backward };
            values[idx + 2] = if absolute { forward.abs() } else { forward };
            values[idx + 4] = if absolute { ratio.abs() } else { ratio };
        }
    }

    Some(BounceFeatures { frame, values })
}

/// Collapse maximal runs of consecutive candidate frames, keeping the
/// highest-scoring frame of each run.
fn dedup_runs(candidates: &[(usize, f64)]) -> BTreeSet<usize> {
    let mut result = BTreeSet::new();
    let mut run_best: Option<(usize, f64)> = None;
    let mut prev_frame: Option<usize> = None;

    for &(frame, score) in candidates {
        let contiguous = prev_frame.map(|p| frame == p + 1).unwrap_or(false);
        if contiguous {
            if let Some((_, best_score)) = run_best {
                if score > best_score {
                    run_best = Some((frame, score));
                }
            }
        } else {
            if let Some((best_frame, _)) = run_best {
                result.insert(best_frame);
            }
            run_best = Some((frame, score));
        }
        prev_frame = Some(frame);
    }
    if let Some((best_frame, _)) = run_best {
        result.insert(best_frame);
    }
    result
}
