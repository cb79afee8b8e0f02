// src/analysis/mod.rs
//
// Trajectory analysis pipeline modules.
//
// Signal flow:
//   Ball candidates  → trajectory ─┬→ bounce ─┐
//                                  └──────────┼→ shot_segmenter → Shot
//   Court mapping    → outcome ←──────────────┘
//   Pose snapshots   → pose_metrics → stroke
//   Shots + metrics  → aggregate → Summary
//
// Orchestrated by calibrator::Calibrator.

pub mod aggregate;
pub mod bounce;
pub mod outcome;
pub mod pose_metrics;
pub mod shot_segmenter;
pub mod stroke;
pub mod trajectory;
