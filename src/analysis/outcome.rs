// src/analysis/outcome.rs
//
// In/out call for a shot's landing position. The bounds depend on the
// coordinate convention of the calibration that produced the mapping:
// centered x for the automatic keypoint path, corner-origin for manual and
// classical-CV calibration. Singles lines decide the call.

use crate::court::{COURT_LENGTH_M, COURT_WIDTH_SINGLES_M};
use crate::court_detector::{CoordinateFrame, CourtMapping};
use crate::types::{CourtPoint, Outcome, OutcomeConfig, PixelPoint};

/// Classify a landing pixel. Returns the call plus the court coordinates
/// it was based on; `Unknown` with no coordinates when there is no mapping
/// for the landing frame or the pixel fails to project.
pub fn classify_landing(
    landing_pixel: Option<PixelPoint>,
    mapping: Option<&CourtMapping>,
    config: &OutcomeConfig,
) -> (Outcome, Option<CourtPoint>) {
    let (Some(pixel), Some(mapping)) = (landing_pixel, mapping) else {
        return (Outcome::Unknown, None);
    };
    let Some(court) = mapping.pixel_to_court(&pixel) else {
        return (Outcome::Unknown, None);
    };

    let margin = config.margin_m;
    let inside = match mapping.frame {
        CoordinateFrame::Centered => {
            court.x.abs() <= COURT_WIDTH_SINGLES_M / 2.0 + margin
                && court.y >= -margin
                && court.y <= COURT_LENGTH_M + margin
        }
        CoordinateFrame::CornerOrigin => {
            court.x >= -margin
                && court.x <= COURT_WIDTH_SINGLES_M + margin
                && court.y >= -margin
                && court.y <= COURT_LENGTH_M + margin
        }
    };
    let outcome = if inside { Outcome::In } else { Outcome::Out };
    (outcome, Some(court))
}
