// src/analysis/shot_segmenter.rs
//
// Shot segmentation state machine over the frozen trajectory. Two states:
// idle and in-shot. A sharp direction reversal closes the current shot at
// the prior frame and opens a new one; a bounce closes the shot at the
// bounce frame and returns to idle. Shots shorter than the minimum
// duration are discarded.

use crate::analysis::trajectory::Trajectory;
use crate::court_detector::CourtMapping;
use crate::types::{PixelPoint, SegmenterConfig, Shot};
use std::collections::BTreeSet;
use tracing::{debug, trace};

const MPS_TO_MPH: f64 = 2.237;

enum State {
    Idle,
    InShot { start_frame: usize },
}

pub struct ShotSegmenter {
    config: SegmenterConfig,
    fps: f64,
    min_shot_frames: usize,
}

impl ShotSegmenter {
    pub fn new(config: SegmenterConfig, fps: f64) -> Self {
        let min_shot_frames = (config.min_shot_seconds * fps).round() as usize;
        Self {
            config,
            fps,
            min_shot_frames,
        }
    }

    /// Split the trajectory into shots. `mappings` is the per-frame court
    /// mapping used for court-space speed; slots may be absent.
    pub fn segment(
        &self,
        trajectory: &Trajectory,
        bounces: &BTreeSet<usize>,
        mappings: &[Option<CourtMapping>],
    ) -> Vec<Shot> {
        let mut shots = Vec::new();
        let mut state = State::Idle;
        let mut prev_valid: Option<(usize, PixelPoint)> = None;
        let mut prev_direction: Option<f64> = None;

        for frame in 0..trajectory.len() {
            if let Some(pos) = trajectory.position(frame) {
                if let Some((prior_frame, prior_pos)) = prev_valid {
                    let dx = pos.x - prior_pos.x;
                    let dy = pos.y - prior_pos.y;
                    if dx.abs() > self.config.min_displacement_px
                        || dy.abs() > self.config.min_displacement_px
                    {
                        let direction = dy.atan2(dx).to_degrees();
                        match state {
                            State::Idle => {
                                trace!(frame = prior_frame, "shot opened");
                                state = State::InShot {
                                    start_frame: prior_frame,
                                };
                            }
                            State::InShot { start_frame } => {
                                if let Some(prev_dir) = prev_direction {
                                    if angle_between(direction, prev_dir)
                                        > self.config.reversal_angle_deg
                                    {
                                        trace!(frame = prior_frame, "direction reversal");
                                        self.close_shot(
                                            &mut shots,
                                            start_frame,
                                            prior_frame,
                                            trajectory,
                                            bounces,
                                            mappings,
                                        );
                                        state = State::InShot { start_frame: frame };
                                    }
                                }
                            }
                        }
                        prev_direction = Some(direction);
                    }
                }
                prev_valid = Some((frame, pos));
            }

            if bounces.contains(&frame) {
                if let State::InShot { start_frame } = state {
                    trace!(frame, "bounce closes shot");
                    self.close_shot(&mut shots, start_frame, frame, trajectory, bounces, mappings);
                    state = State::Idle;
                    prev_direction = None;
                }
            }
        }

        // A shot still open at end of trajectory is kept if long enough.
        if let State::InShot { start_frame } = state {
            if let Some((last_frame, _)) = prev_valid {
                if last_frame > start_frame {
                    self.close_shot(&mut shots, start_frame, last_frame, trajectory, bounces, mappings);
                }
            }
        }

        debug!(shots = shots.len(), "shot segmentation done");
        shots
    }

    fn close_shot(
        &self,
        shots: &mut Vec<Shot>,
        start_frame: usize,
        end_frame: usize,
        trajectory: &Trajectory,
        bounces: &BTreeSet<usize>,
        mappings: &[Option<CourtMapping>],
    ) {
        let duration_frames = end_frame - start_frame;
        if duration_frames < self.min_shot_frames {
            trace!(start_frame, end_frame, "shot below minimum duration, dropped");
            return;
        }

        let contact_frame = self.find_contact(trajectory, start_frame, end_frame);

        // Landing: last bounce inside the span, else the last valid frame.
        let landing_frame = bounces
            .range(start_frame..=end_frame)
            .next_back()
            .copied()
            .unwrap_or_else(|| {
                (start_frame..=end_frame)
                    .rev()
                    .find(|&f| trajectory.position(f).is_some())
                    .unwrap_or(end_frame)
            });
        let landing_pixel = trajectory.position(landing_frame);
        let contact_frame = contact_frame.min(landing_frame);

        let speed_mps = self.compute_speed(trajectory, contact_frame, end_frame, mappings);

        shots.push(Shot {
            start_frame,
            end_frame,
            contact_frame,
            landing_frame,
            landing_pixel,
            speed_mps,
            speed_mph: speed_mps.map(|s| s * MPS_TO_MPH),
            duration_frames,
            duration_seconds: duration_frames as f64 / self.fps,
        });
    }

    /// Contact approximation: the frame with the largest inter-frame pixel
    /// displacement within the first third of the span.
    fn find_contact(&self, trajectory: &Trajectory, start_frame: usize, end_frame: usize) -> usize {
        let third_end = start_frame + (end_frame - start_frame).max(1) / 3;
        let mut best = (start_frame, 0.0f64);
        let mut prev: Option<(usize, PixelPoint)> = None;
        for frame in start_frame..=third_end.max(start_frame + 1).min(end_frame) {
            let Some(pos) = trajectory.position(frame) else {
                continue;
            };
            if let Some((_, prior)) = prev {
                let disp = pos.distance_to(&prior);
                if disp > best.1 {
                    best = (frame, disp);
                }
            }
            prev = Some((frame, pos));
        }
        best.0
    }

    /// Court-space speed over a short window after contact. `None` when
    /// fewer than two samples convert to court coordinates.
    fn compute_speed(
        &self,
        trajectory: &Trajectory,
        contact_frame: usize,
        end_frame: usize,
        mappings: &[Option<CourtMapping>],
    ) -> Option<f64> {
        let window_end = (contact_frame + self.config.speed_window_frames).min(end_frame);
        let mut samples: Vec<(usize, crate::types::CourtPoint)> = Vec::new();
        for frame in contact_frame..=window_end {
            let Some(pos) = trajectory.position(frame) else {
                continue;
            };
            let Some(mapping) = mappings.get(frame).and_then(|m| m.as_ref()) else {
                continue;
            };
            if let Some(court) = mapping.pixel_to_court(&pos) {
                samples.push((frame, court));
            }
        }
        if samples.len() < 2 {
            return None;
        }
        let mut distance = 0.0;
        let mut frames = 0usize;
        for pair in samples.windows(2) {
            distance += pair[0].1.distance_to(&pair[1].1);
            frames += pair[1].0 - pair[0].0;
        }
        if frames == 0 {
            return None;
        }
        Some(distance / (frames as f64 / self.fps))
    }
}

/// Absolute angular difference in degrees, wrapped to [0, 180].
fn angle_between(a: f64, b: f64) -> f64 {
    let mut diff = (a - b).abs() % 360.0;
    if diff > 180.0 {
        diff = 360.0 - diff;
    }
    diff
}
