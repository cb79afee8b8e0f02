// src/court.rs
//
// Reference geometry of a tennis court.
//
// Keypoints live on a fixed reference plane (a top-down court image of
// 1117x2408 units plus borders) so that homographies solved against any
// subset of keypoints are mutually comparable. Conversions to meters are
// affine in that plane.

use crate::types::CourtPoint;

// Real-world dimensions, meters.
pub const COURT_LENGTH_M: f64 = 23.77;
pub const COURT_WIDTH_DOUBLES_M: f64 = 10.97;
pub const COURT_WIDTH_SINGLES_M: f64 = 8.23;
pub const HALF_COURT_LENGTH_M: f64 = COURT_LENGTH_M / 2.0;

// Reference plane dimensions, units.
const REF_COURT_WIDTH: f64 = 1117.0;
const REF_COURT_HEIGHT: f64 = 2408.0;
const REF_BORDER_X: f64 = 274.0;
const REF_BORDER_Y: f64 = 549.0;

pub const NUM_KEYPOINTS: usize = 14;
pub const NUM_CONFIGURATIONS: usize = 12;

/// Number of leading keypoints considered when scoring a candidate
/// homography by reprojection residual (the two center-line points are
/// excluded from scoring).
pub const NUM_SCORED_KEYPOINTS: usize = 12;

/// The 14 named court keypoints in reference-plane coordinates, in the
/// order the keypoint oracle reports them:
///
///  0/1   near baseline left/right
///  2/3   far baseline left/right
///  4/5   left singles sideline, near/far end
///  6/7   right singles sideline, near/far end
///  8/9   near service line left/right
/// 10/11  far service line left/right
/// 12/13  center service line, near/far end
pub const KEYPOINTS: [(f64, f64); NUM_KEYPOINTS] = [
    (286.0, 561.0),
    (1379.0, 561.0),
    (286.0, 2935.0),
    (1379.0, 2935.0),
    (423.0, 561.0),
    (423.0, 2935.0),
    (1242.0, 561.0),
    (1242.0, 2935.0),
    (423.0, 1110.0),
    (1242.0, 1110.0),
    (423.0, 2386.0),
    (1242.0, 2386.0),
    (832.0, 1110.0),
    (832.0, 2386.0),
];

/// Four-point sub-configurations of the keypoint set. Each entry indexes
/// into KEYPOINTS; a configuration is solvable when all four of its points
/// were detected in the frame.
pub const CONFIGURATIONS: [[usize; 4]; NUM_CONFIGURATIONS] = [
    [0, 1, 2, 3],    // outer baseline corners
    [4, 6, 5, 7],    // singles sideline corners
    [4, 1, 5, 3],    // left singles + right doubles sidelines
    [0, 6, 2, 7],    // left doubles + right singles sidelines
    [8, 9, 10, 11],  // service box corners
    [8, 9, 5, 7],    // near service line + far singles corners
    [4, 6, 10, 11],  // near singles corners + far service line
    [6, 1, 7, 3],    // right alley
    [0, 4, 2, 5],    // left alley
    [8, 12, 10, 13], // left service boxes
    [12, 9, 13, 11], // right service boxes
    [10, 11, 5, 7],  // far service line + far singles corners
];

/// Reference-plane position of a keypoint.
pub fn reference_point(index: usize) -> (f64, f64) {
    KEYPOINTS[index]
}

/// Convert a reference-plane position to meters, centered on the court
/// (x in [-width/2, width/2] across the doubles court, y in [0, length]
/// from the near baseline).
pub fn reference_to_meters(x_ref: f64, y_ref: f64) -> CourtPoint {
    let x = (x_ref - REF_BORDER_X) / REF_COURT_WIDTH * COURT_WIDTH_DOUBLES_M
        - COURT_WIDTH_DOUBLES_M / 2.0;
    let y = (y_ref - REF_BORDER_Y) / REF_COURT_HEIGHT * COURT_LENGTH_M;
    CourtPoint::new(x, y)
}

/// 3x3 affine taking reference-plane coordinates to centered meters, for
/// composition with a pixel->reference homography.
pub fn reference_to_meters_matrix() -> nalgebra::Matrix3<f64> {
    let sx = COURT_WIDTH_DOUBLES_M / REF_COURT_WIDTH;
    let sy = COURT_LENGTH_M / REF_COURT_HEIGHT;
    nalgebra::Matrix3::new(
        sx,
        0.0,
        -REF_BORDER_X * sx - COURT_WIDTH_DOUBLES_M / 2.0,
        0.0,
        sy,
        -REF_BORDER_Y * sy,
        0.0,
        0.0,
        1.0,
    )
}

/// Singles court corners in corner-origin meters, ordered near-left,
/// near-right, far-right, far-left. Used by manual calibration and the
/// classical-CV detection strategies.
pub fn singles_corners_m(length_m: f64) -> [CourtPoint; 4] {
    [
        CourtPoint::new(0.0, 0.0),
        CourtPoint::new(COURT_WIDTH_SINGLES_M, 0.0),
        CourtPoint::new(COURT_WIDTH_SINGLES_M, length_m),
        CourtPoint::new(0.0, length_m),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_configuration_uses_distinct_points() {
        for conf in &CONFIGURATIONS {
            for i in 0..4 {
                for j in (i + 1)..4 {
                    assert_ne!(conf[i], conf[j], "degenerate configuration {:?}", conf);
                }
            }
        }
    }

    #[test]
    fn test_reference_corners_map_to_court_extent() {
        // Near baseline left corner of the doubles court.
        let near_left = reference_to_meters(REF_BORDER_X + 12.0, REF_BORDER_Y + 12.0);
        assert!(near_left.x < -COURT_WIDTH_DOUBLES_M / 2.0 + 0.2);
        assert!(near_left.y < 0.2);

        // Center of the reference court plane sits at mid-court.
        let center = reference_to_meters(
            REF_BORDER_X + REF_COURT_WIDTH / 2.0,
            REF_BORDER_Y + REF_COURT_HEIGHT / 2.0,
        );
        assert!(center.x.abs() < 1e-9);
        assert!((center.y - COURT_LENGTH_M / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_affine_matrix_matches_scalar_conversion() {
        let m = reference_to_meters_matrix();
        let p = m * nalgebra::Vector3::new(832.0, 1748.0, 1.0);
        let q = reference_to_meters(832.0, 1748.0);
        assert!((p[0] / p[2] - q.x).abs() < 1e-9);
        assert!((p[1] / p[2] - q.y).abs() < 1e-9);
    }
}
