// common_util.rs
// Small helpers for periodic boundary conditions in generalized
// (fractional) coordinates, shared by the cell list and the k-space code
use nalgebra::Vector3;

use crate::boundary::Boundary;

// Applies periodic boundary conditions to a set of generalized coordinates
// to put the domain in [0.0, 1.0)
// Uses floor, not truncation, so negative coordinates wrap correctly
// Consider very small negative f64 values: x - x.floor() can round up
// to exactly 1.0, hence the second pass
pub fn apply_pbc(gen: Vector3<f64>) -> Vector3<f64> {
    gen.map(|x| x - x.floor())
       .map(|x| x - x.floor())
}

// Squared minimum-image distance between two points given in generalized
// coordinates. Searches the 27 neighboring images explicitly, which is
// exact whenever the cutoff is at most half the narrowest cell width
// https://scicomp.stackexchange.com/questions/3107/minimum-image-convention-for-triclinic-unit-cell
pub fn min_image_sq(boundary: &Boundary, gen_i: Vector3<f64>, gen_j: Vector3<f64>) -> f64 {
    let mut min_rsq = f64::INFINITY;
    for sx in -1..2 {
        for sy in -1..2 {
            for sz in -1..2 {
                let shift = Vector3::new(sx as f64, sy as f64, sz as f64);
                let dr = boundary.transform_gen_to_cart(gen_j - gen_i + shift);
                let rsq = dr.norm_squared();
                if rsq < min_rsq {
                    min_rsq = rsq;
                }
            }
        }
    }
    min_rsq
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_back_negative() {
        let x = apply_pbc(Vector3::new(-1e-50, 2.0, -0.25));
        assert_eq!(x[0], 0.0);
        assert_eq!(x[1], 0.0);
        assert_eq!(x[2], 0.75);
    }

    #[test]
    fn map_back_identity() {
        let x = apply_pbc(Vector3::new(0.1, 0.5, 0.999));
        assert_eq!(x, Vector3::new(0.1, 0.5, 0.999));
    }

    #[test]
    fn min_image_cube() {
        let boundary = Boundary::from_cell(&[
            4.0, 0.0, 0.0,
            0.0, 4.0, 0.0,
            0.0, 0.0, 4.0,
        ]);
        // Closest approach is through the face, 0.1 + 0.1 in x
        let gi = Vector3::new(0.025, 0.5, 0.5);
        let gj = Vector3::new(0.975, 0.5, 0.5);
        let rsq = min_image_sq(&boundary, gi, gj);
        assert!((rsq - 0.04).abs() < 1e-12);
    }

    #[test]
    fn min_image_direct() {
        let boundary = Boundary::from_cell(&[
            4.0, 0.0, 0.0,
            0.0, 4.0, 0.0,
            0.0, 0.0, 4.0,
        ]);
        let gi = Vector3::new(0.25, 0.25, 0.25);
        let gj = Vector3::new(0.5, 0.25, 0.25);
        let rsq = min_image_sq(&boundary, gi, gj);
        assert!((rsq - 1.0).abs() < 1e-12);
    }
}
