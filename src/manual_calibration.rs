// src/manual_calibration.rs
//
// Manual court calibration from four clicked corner pixels. The result is a
// pixel->meters homography in the corner-origin convention (near-baseline
// left corner at (0, 0)), persisted as JSON so one calibration can be reused
// across every clip shot from the same camera.

use crate::court::{COURT_LENGTH_M, COURT_WIDTH_SINGLES_M, HALF_COURT_LENGTH_M};
use crate::homography::Homography;
use crate::types::{CourtPoint, PixelPoint};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationMode {
    /// Four corners of the full singles court are visible.
    Full,
    /// Only the near half up to the net is visible.
    Half,
}

impl CalibrationMode {
    pub fn court_length_m(self) -> f64 {
        match self {
            CalibrationMode::Full => COURT_LENGTH_M,
            CalibrationMode::Half => HALF_COURT_LENGTH_M,
        }
    }
}

/// Round-trip check of one corner: its pixel projected to meters against
/// the meters it was declared to be.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationPoint {
    pub pixel: PixelPoint,
    pub expected: CourtPoint,
    pub projected: CourtPoint,
    pub error_meters: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Validation {
    pub points: Vec<ValidationPoint>,
    pub avg_error_meters: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourtDimensions {
    pub length: f64,
    pub width: f64,
    pub units: String,
}

/// The persisted calibration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualCalibration {
    pub mode: CalibrationMode,
    pub frame_size: (u32, u32),
    /// Clicked corners ordered near-left, near-right, far-right, far-left.
    pub pixel_corners: [PixelPoint; 4],
    pub court_corners: [CourtPoint; 4],
    /// Row-major pixel->meters matrix.
    pub homography: [[f64; 3]; 3],
    pub validation: Validation,
    pub court_dimensions: CourtDimensions,
}

impl ManualCalibration {
    /// Solve the corner homography and validate it by round-tripping each
    /// corner. Fails on degenerate corner geometry.
    pub fn compute(
        mode: CalibrationMode,
        frame_size: (u32, u32),
        pixel_corners: [PixelPoint; 4],
    ) -> Result<Self> {
        let length = mode.court_length_m();
        let court_corners = crate::court::singles_corners_m(length);

        let src: Vec<(f64, f64)> = pixel_corners.iter().map(|p| (p.x, p.y)).collect();
        let dst: Vec<(f64, f64)> = court_corners.iter().map(|p| (p.x, p.y)).collect();
        let homography = Homography::fit(&src, &dst)
            .ok_or_else(|| anyhow!("corner points are degenerate, cannot solve homography"))?;

        let mut points = Vec::with_capacity(4);
        let mut total_error = 0.0;
        for (pixel, expected) in pixel_corners.iter().zip(court_corners.iter()) {
            let projected = homography
                .pixel_to_court(pixel)
                .ok_or_else(|| anyhow!("corner {:?} projects to infinity", pixel))?;
            let error_meters = projected.distance_to(expected);
            total_error += error_meters;
            points.push(ValidationPoint {
                pixel: *pixel,
                expected: *expected,
                projected,
                error_meters,
            });
        }
        let avg_error_meters = total_error / 4.0;
        info!(avg_error_m = avg_error_meters, ?mode, "manual calibration solved");

        let m = homography.matrix();
        let rows = [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
            [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
        ];

        Ok(Self {
            mode,
            frame_size,
            pixel_corners,
            court_corners,
            homography: rows,
            validation: Validation {
                points,
                avg_error_meters,
            },
            court_dimensions: CourtDimensions {
                length,
                width: COURT_WIDTH_SINGLES_M,
                units: "meters".to_string(),
            },
        })
    }

    /// Rebuild the solved `Homography` from the persisted matrix.
    pub fn homography(&self) -> Result<Homography> {
        let r = &self.homography;
        let m = nalgebra::Matrix3::new(
            r[0][0], r[0][1], r[0][2], r[1][0], r[1][1], r[1][2], r[2][0], r[2][1], r[2][2],
        );
        Homography::from_matrix(m).ok_or_else(|| anyhow!("persisted homography is singular"))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .with_context(|| format!("writing calibration to {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading calibration from {}", path.display()))?;
        let calibration: Self = serde_json::from_str(&contents)?;
        Ok(calibration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clicked_corners() -> [PixelPoint; 4] {
        // A plausible broadcast-camera trapezoid: near baseline wide,
        // far baseline narrow and higher in the frame.
        [
            PixelPoint::new(300.0, 980.0),
            PixelPoint::new(1620.0, 980.0),
            PixelPoint::new(1250.0, 340.0),
            PixelPoint::new(670.0, 340.0),
        ]
    }

    #[test]
    fn test_corners_round_trip_exactly() {
        let cal = ManualCalibration::compute(CalibrationMode::Full, (1920, 1080), clicked_corners())
            .unwrap();
        assert!(cal.validation.avg_error_meters < 1e-6);
        let h = cal.homography().unwrap();
        let near_right = h.pixel_to_court(&cal.pixel_corners[1]).unwrap();
        assert!((near_right.x - COURT_WIDTH_SINGLES_M).abs() < 1e-6);
        assert!(near_right.y.abs() < 1e-6);
    }

    #[test]
    fn test_half_mode_uses_half_length() {
        let cal = ManualCalibration::compute(CalibrationMode::Half, (1920, 1080), clicked_corners())
            .unwrap();
        assert!((cal.court_dimensions.length - COURT_LENGTH_M / 2.0).abs() < 1e-12);
        assert!((cal.court_corners[2].y - COURT_LENGTH_M / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_save_load_round_trip() {
        let cal = ManualCalibration::compute(CalibrationMode::Full, (1280, 720), clicked_corners())
            .unwrap();
        let dir = std::env::temp_dir().join("rally_calibration_test_manual");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("court_calibration.json");
        cal.save(&path).unwrap();
        let loaded = ManualCalibration::load(&path).unwrap();
        assert_eq!(loaded.mode, CalibrationMode::Full);
        assert_eq!(loaded.pixel_corners[0], cal.pixel_corners[0]);
        assert!((loaded.validation.avg_error_meters - cal.validation.avg_error_meters).abs() < 1e-12);
        std::fs::remove_file(&path).ok();
    }
}
