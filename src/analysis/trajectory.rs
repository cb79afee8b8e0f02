// src/analysis/trajectory.rs
//
// Ball trajectory reconstruction. A forward pass accepts at most one
// candidate per frame, gated against the previous accepted position; a
// second pass fills short detection gaps by spline extrapolation and
// invalidates observations that disagree with the extrapolation; a
// vacated slot is then filled like any other gap.

use crate::types::{PixelPoint, TrajectoryConfig};
use tracing::{debug, trace};

/// Accumulates one accepted position (or absence) per frame.
pub struct TrajectoryBuilder {
    config: TrajectoryConfig,
    positions: Vec<Option<PixelPoint>>,
    last_accepted: Option<PixelPoint>,
}

impl TrajectoryBuilder {
    pub fn new(config: TrajectoryConfig) -> Self {
        Self {
            config,
            positions: Vec::new(),
            last_accepted: None,
        }
    }

    /// Accept at most one of this frame's candidates: the first within the
    /// distance gate of the previous accepted position, or the first
    /// candidate outright when there is no history yet.
    pub fn push_candidates(&mut self, candidates: &[PixelPoint]) {
        let accepted = match self.last_accepted {
            Some(prev) => candidates
                .iter()
                .find(|c| c.distance_to(&prev) <= self.config.max_gate_px)
                .copied(),
            None => candidates.first().copied(),
        };
        if let Some(p) = accepted {
            self.last_accepted = Some(p);
        }
        self.positions.push(accepted);
    }

    /// Run the gap-filling pass and freeze the result.
    pub fn finish(self) -> Trajectory {
        let raw_detected = self.positions.iter().filter(|p| p.is_some()).count();
        let mut positions = self.positions;
        let config = self.config;

        let mut consecutive_fills = 0usize;
        let mut filled = 0usize;
        let mut invalidated = 0usize;
        for i in 0..positions.len() {
            if positions[i].is_some() {
                consecutive_fills = 0;
                continue;
            }
            if consecutive_fills >= config.max_consecutive_fills {
                continue;
            }
            let Some(estimate) = extrapolate_window(&positions, i, config.interpolation_window)
            else {
                continue;
            };
            trace!(frame = i, x = estimate.x, y = estimate.y, "gap filled");
            positions[i] = Some(estimate);
            consecutive_fills += 1;
            filled += 1;

            // An observed next position that disagrees with the
            // extrapolation beyond the gate is an inconsistent jump; drop
            // it rather than accept it.
            if let Some(next) = positions.get(i + 1).copied().flatten() {
                if estimate.distance_to(&next) > config.max_gate_px {
                    positions[i + 1] = None;
                    invalidated += 1;
                }
            }
        }
        if filled > 0 || invalidated > 0 {
            debug!(filled, invalidated, "trajectory gap filling done");
        }

        Trajectory {
            positions,
            raw_detected,
        }
    }
}

/// Frozen per-frame positions, one slot per frame index.
#[derive(Debug, Clone)]
pub struct Trajectory {
    positions: Vec<Option<PixelPoint>>,
    raw_detected: usize,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn position(&self, frame_idx: usize) -> Option<PixelPoint> {
        self.positions.get(frame_idx).copied().flatten()
    }

    /// Fraction of frames with a raw detection, before gap filling.
    pub fn detection_rate(&self) -> f64 {
        if self.positions.is_empty() {
            return 0.0;
        }
        self.raw_detected as f64 / self.positions.len() as f64
    }
}

/// Extrapolate frame `i` from the `window` immediately preceding valid
/// positions. Requires the full window to be contiguous and valid.
fn extrapolate_window(
    positions: &[Option<PixelPoint>],
    i: usize,
    window: usize,
) -> Option<PixelPoint> {
    if i < window {
        return None;
    }
    let mut xs = Vec::with_capacity(window);
    let mut ys = Vec::with_capacity(window);
    for j in (i - window)..i {
        let p = positions[j]?;
        xs.push(p.x);
        ys.push(p.y);
    }
    Some(PixelPoint::new(
        natural_spline_extrapolate(&xs)?,
        natural_spline_extrapolate(&ys)?,
    ))
}

/// Fit a natural cubic spline through `values` at integer abscissae
/// 0..n-1 and evaluate the final segment's cubic one step past the end.
/// Second derivatives come from the tridiagonal system
/// M[i-1] + 4 M[i] + M[i+1] = 6 (y[i+1] - 2 y[i] + y[i-1]) with
/// M[0] = M[n-1] = 0.
pub fn natural_spline_extrapolate(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    if n == 2 {
        return Some(2.0 * values[1] - values[0]);
    }

    let interior = n - 2;
    let mut diag = vec![4.0; interior];
    let mut rhs: Vec<f64> = (1..=interior)
        .map(|i| 6.0 * (values[i + 1] - 2.0 * values[i] + values[i - 1]))
        .collect();

    // Thomas algorithm; sub/super diagonals are all 1.
    for i in 1..interior {
        let w = 1.0 / diag[i - 1];
        diag[i] -= w;
        rhs[i] -= w * rhs[i - 1];
    }
    let mut m = vec![0.0; n];
    m[interior] = rhs[interior - 1] / diag[interior - 1];
    for i in (1..interior).rev() {
        m[i] = (rhs[i - 1] - m[i + 1]) / diag[i - 1];
    }

    // Evaluate segment [n-2, n-1] at x = n (t = 2 past the segment start).
    let i = n - 2;
    let (y0, y1) = (values[i], values[i + 1]);
    let (m0, m1) = (m[i], m[i + 1]);
    let a: f64 = -1.0; // x_{i+1} - x
    let b: f64 = 2.0; // x - x_i
    Some(
        m0 * a.powi(3) / 6.0
            + m1 * b.powi(3) / 6.0
            + (y0 - m0 / 6.0) * a
            + (y1 - m1 / 6.0) * b,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(frames: &[Option<(f64, f64)>]) -> Trajectory {
        let mut builder = TrajectoryBuilder::new(TrajectoryConfig::default());
        for frame in frames {
            match frame {
                Some((x, y)) => builder.push_candidates(&[PixelPoint::new(*x, *y)]),
                None => builder.push_candidates(&[]),
            }
        }
        builder.finish()
    }

    #[test]
    fn test_linear_motion_extrapolates_exactly() {
        let ys: Vec<f64> = (0..5).map(|i| 10.0 + 3.0 * i as f64).collect();
        let next = natural_spline_extrapolate(&ys).unwrap();
        assert!((next - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_three_point_extrapolation() {
        // Natural boundary conditions pin the end curvature to zero, so the
        // one-step extension of [1, 2, 5] lands at 8.
        let next = natural_spline_extrapolate(&[1.0, 2.0, 5.0]).unwrap();
        assert!((next - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_gate_rejects_distant_candidate() {
        let mut builder = TrajectoryBuilder::new(TrajectoryConfig::default());
        builder.push_candidates(&[PixelPoint::new(100.0, 100.0)]);
        // A jump of >80 px is rejected even though a candidate exists.
        builder.push_candidates(&[PixelPoint::new(300.0, 300.0)]);
        // A nearby candidate after a decoy is accepted.
        builder.push_candidates(&[
            PixelPoint::new(500.0, 500.0),
            PixelPoint::new(110.0, 104.0),
        ]);
        let traj = builder.finish();
        assert!(traj.position(1).is_none());
        assert_eq!(traj.position(2), Some(PixelPoint::new(110.0, 104.0)));
    }

    #[test]
    fn test_single_gap_is_filled() {
        let frames: Vec<Option<(f64, f64)>> = vec![
            Some((0.0, 100.0)),
            Some((10.0, 100.0)),
            Some((20.0, 100.0)),
            Some((30.0, 100.0)),
            Some((40.0, 100.0)),
            None,
            Some((60.0, 100.0)),
        ];
        let traj = build(&frames);
        let filled = traj.position(5).unwrap();
        assert!((filled.x - 50.0).abs() < 1e-6);
        assert!((filled.y - 100.0).abs() < 1e-6);
        // Consistent next observation survives.
        assert!(traj.position(6).is_some());
    }

    #[test]
    fn test_fill_limit_stops_long_gaps() {
        let mut frames: Vec<Option<(f64, f64)>> =
            (0..5).map(|i| Some((10.0 * i as f64, 50.0))).collect();
        frames.extend(std::iter::repeat(None).take(6));
        let traj = build(&frames);
        assert!(traj.position(5).is_some());
        assert!(traj.position(6).is_some());
        assert!(traj.position(7).is_some());
        // Fourth consecutive fill is refused.
        assert!(traj.position(8).is_none());
        assert!(traj.position(10).is_none());
    }

    #[test]
    fn test_inconsistent_next_observation_replaced_by_extrapolation() {
        // Fast rightward motion, 20 px per frame.
        let mut frames: Vec<Option<(f64, f64)>> =
            (0..5).map(|i| Some((20.0 * i as f64, 50.0))).collect();
        frames.push(None); // filled near x = 100
        // Within the gate of the last raw detection at x = 80 (so the
        // builder accepts it) but >80 px from the extrapolation: dropped,
        // and the now-empty slot is itself filled on the next pass step.
        frames.push(Some((15.0, 50.0)));
        let traj = build(&frames);
        let filled = traj.position(5).unwrap();
        assert!((filled.x - 100.0).abs() < 1e-6);
        let refilled = traj.position(6).unwrap();
        assert!((refilled.x - 120.0).abs() < 1e-6, "x = {}", refilled.x);
        assert!((refilled.y - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_detection_rate_counts_raw_frames_only() {
        let frames: Vec<Option<(f64, f64)>> = vec![
            Some((0.0, 0.0)),
            Some((5.0, 0.0)),
            Some((10.0, 0.0)),
            Some((15.0, 0.0)),
            Some((20.0, 0.0)),
            None,
            Some((30.0, 0.0)),
            None,
        ];
        let traj = build(&frames);
        // Frame 5 gets filled, but the rate reflects the 6 raw detections.
        assert!(traj.position(5).is_some());
        assert!((traj.detection_rate() - 6.0 / 8.0).abs() < 1e-12);
    }

    #[test]
    fn test_mostly_absent_input_survives() {
        let mut frames: Vec<Option<(f64, f64)>> = Vec::new();
        for i in 0..40 {
            if i % 3 == 0 {
                frames.push(Some((i as f64, 10.0)));
            } else {
                frames.push(None);
            }
        }
        let traj = build(&frames);
        assert_eq!(traj.len(), 40);
        assert!(traj.detection_rate() < 0.5);
    }
}
