// src/homography.rs
//
// Planar homography estimation and projection. Solved by direct linear
// transform over point correspondences; both directions are cached so
// per-frame projection never re-inverts.

use crate::types::{CourtPoint, PixelPoint};
use nalgebra::{DMatrix, Matrix3, Vector3};

const W_EPS: f64 = 1e-12;

#[derive(Debug, Clone)]
pub struct Homography {
    forward: Matrix3<f64>,
    inverse: Matrix3<f64>,
}

impl Homography {
    /// Wrap a precomputed matrix, caching its inverse. Returns `None` when
    /// the matrix is singular or contains non-finite entries.
    pub fn from_matrix(forward: Matrix3<f64>) -> Option<Self> {
        if forward.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let inverse = forward.try_inverse()?;
        if inverse.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(Self { forward, inverse })
    }

    /// Least-squares DLT fit mapping `src` points onto `dst` points.
    /// Needs at least 4 correspondences; returns `None` for degenerate
    /// geometry (collinear points, repeated points).
    pub fn fit(src: &[(f64, f64)], dst: &[(f64, f64)]) -> Option<Self> {
        if src.len() != dst.len() || src.len() < 4 {
            return None;
        }
        let n = src.len();

        // Each correspondence contributes two rows of the design matrix A,
        // and the homography is the null-space direction of A: the
        // right-singular vector with the smallest singular value. The thin
        // SVD of a wide matrix only carries `nrows` right-singular vectors,
        // so the matrix is padded with zero rows to at least 9; the padding
        // changes nothing about the row space but guarantees the null-space
        // vector is present in V^T even for the minimal 4-point solve.
        let mut a = DMatrix::<f64>::zeros((2 * n).max(9), 9);
        for (i, (&(sx, sy), &(dx, dy))) in src.iter().zip(dst.iter()).enumerate() {
            let r = 2 * i;
            a[(r, 0)] = sx;
            a[(r, 1)] = sy;
            a[(r, 2)] = 1.0;
            a[(r, 6)] = -dx * sx;
            a[(r, 7)] = -dx * sy;
            a[(r, 8)] = -dx;
            a[(r + 1, 3)] = sx;
            a[(r + 1, 4)] = sy;
            a[(r + 1, 5)] = 1.0;
            a[(r + 1, 6)] = -dy * sx;
            a[(r + 1, 7)] = -dy * sy;
            a[(r + 1, 8)] = -dy;
        }

        let svd = a.svd(false, true);
        let v_t = svd.v_t?;
        // Singular values come back sorted descending, so the last row of
        // V^T spans the (approximate) null space.
        let h = v_t.row(v_t.nrows() - 1);
        if h[8].abs() < W_EPS {
            return None;
        }
        let forward = Matrix3::new(
            h[0] / h[8],
            h[1] / h[8],
            h[2] / h[8],
            h[3] / h[8],
            h[4] / h[8],
            h[5] / h[8],
            h[6] / h[8],
            h[7] / h[8],
            1.0,
        );
        Self::from_matrix(forward)
    }

    /// Compose with a 3x3 transform applied after this homography.
    pub fn then(&self, post: &Matrix3<f64>) -> Option<Self> {
        Self::from_matrix(post * self.forward)
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.forward
    }

    /// Forward projection. `None` when the point sits on the plane at
    /// infinity of the mapping.
    pub fn project(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        project_with(&self.forward, x, y)
    }

    /// Inverse projection (destination plane back to source plane).
    pub fn project_inverse(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        project_with(&self.inverse, x, y)
    }

    pub fn pixel_to_court(&self, p: &PixelPoint) -> Option<CourtPoint> {
        self.project(p.x, p.y).map(|(x, y)| CourtPoint::new(x, y))
    }

    /// Mean reprojection distance of `src` against `dst` in destination
    /// units. `None` when any point fails to project.
    pub fn mean_residual(&self, src: &[(f64, f64)], dst: &[(f64, f64)]) -> Option<f64> {
        if src.is_empty() {
            return None;
        }
        let mut total = 0.0;
        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
            let (px, py) = self.project(sx, sy)?;
            total += ((px - dx).powi(2) + (py - dy).powi(2)).sqrt();
        }
        Some(total / src.len() as f64)
    }
}

fn project_with(m: &Matrix3<f64>, x: f64, y: f64) -> Option<(f64, f64)> {
    let p = m * Vector3::new(x, y, 1.0);
    if p[2].abs() < W_EPS {
        return None;
    }
    Some((p[0] / p[2], p[1] / p[2]))
}
