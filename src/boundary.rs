// boundary.rs
// Periodic unit cell for a (possibly non-orthogonal) simulation box
// Stores the cell in the same flat layout used by the configuration
// files: (3*row + column), each row a lattice vector
// Provides the coordinate and geometry services consumed by the cell
// list and the k-space engine
use nalgebra::{Matrix3, Vector3};
use std::convert::TryInto;

use crate::PI;

#[derive(Clone, Debug)]
pub struct Boundary {
    cell: [f64; 9],
    bravais: [Vector3<f64>; 3],
    reciprocal: [Vector3<f64>; 3],
    inverse: Matrix3<f64>, // maps Cartesian onto generalized coordinates
    volume: f64,
    widths: [f64; 3], // perpendicular width along each lattice direction
}

impl Boundary {
    pub fn from_cell(cell: &[f64]) -> Boundary {
        assert_eq!(cell.len(), 9, "Unit cell must have 9 entries");
        // Columns of u are the lattice vectors, same convention as the
        // cell list grid construction
        let u = Matrix3::from_column_slice(cell);
        let volume = u.determinant().abs();
        if volume < 1e-12 {
            panic!("Unit cell is singular or degenerate: volume = {:e}", volume);
        }
        let inverse = u.lu()
            .try_inverse()
            .expect("Non-singular unit cell must be invertible");
        let bravais = [
            u.column(0).into_owned(),
            u.column(1).into_owned(),
            u.column(2).into_owned(),
        ];
        // Rows of the inverse are dual to the lattice vectors, so the
        // reciprocal vectors satisfy a_i . b_j = 2 pi delta_ij
        let reciprocal = [
            inverse.row(0).transpose() * (2.0 * PI),
            inverse.row(1).transpose() * (2.0 * PI),
            inverse.row(2).transpose() * (2.0 * PI),
        ];
        // Perpendicular distance between opposite cell faces, used to
        // size grid cells and to bound the minimum-image cutoff
        let widths = [
            volume / bravais[1].cross(&bravais[2]).norm(),
            volume / bravais[2].cross(&bravais[0]).norm(),
            volume / bravais[0].cross(&bravais[1]).norm(),
        ];
        Boundary {
            cell: cell.try_into().expect("Length was checked above"),
            bravais,
            reciprocal,
            inverse,
            volume,
            widths,
        }
    }

    // Cubic box helper, used all over the tests and the driver
    pub fn cubic(side: f64) -> Boundary {
        Boundary::from_cell(&[
            side, 0.0, 0.0,
            0.0, side, 0.0,
            0.0, 0.0, side,
        ])
    }

    pub fn cell(&self) -> &[f64] {
        &self.cell
    }

    pub fn bravais_basis_vector(&self, j: usize) -> Vector3<f64> {
        self.bravais[j]
    }

    pub fn reciprocal_basis_vector(&self, j: usize) -> Vector3<f64> {
        self.reciprocal[j]
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn perpendicular_width(&self, j: usize) -> f64 {
        self.widths[j]
    }

    pub fn transform_cart_to_gen(&self, cart: Vector3<f64>) -> Vector3<f64> {
        self.inverse * cart
    }

    pub fn transform_gen_to_cart(&self, gen: Vector3<f64>) -> Vector3<f64> {
        self.bravais[0] * gen[0] + self.bravais[1] * gen[1] + self.bravais[2] * gen[2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triclinic() -> Boundary {
        Boundary::from_cell(&[
            2.0, 0.0, 0.0,
            0.5, 1.8, 0.0,
            0.3, -0.4, 2.2,
        ])
    }

    #[test]
    fn cubic_volume_and_widths() {
        let b = Boundary::cubic(3.0);
        assert!((b.volume() - 27.0).abs() < 1e-12);
        for j in 0..3 {
            assert!((b.perpendicular_width(j) - 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn reciprocal_orthogonality() {
        let b = triclinic();
        for i in 0..3 {
            for j in 0..3 {
                let dot = b.bravais_basis_vector(i).dot(&b.reciprocal_basis_vector(j));
                let expected = if i == j { 2.0 * PI } else { 0.0 };
                assert!(
                    (dot - expected).abs() < 1e-12,
                    "a_{} . b_{} = {}", i, j, dot
                );
            }
        }
    }

    #[test]
    fn transform_round_trip() {
        let b = triclinic();
        let gen = Vector3::new(0.2, 0.7, 0.45);
        let cart = b.transform_gen_to_cart(gen);
        let back = b.transform_cart_to_gen(cart);
        assert!((gen - back).norm() < 1e-13);
    }

    #[test]
    fn triclinic_volume() {
        let b = triclinic();
        // Lower-triangular rows: determinant is the diagonal product
        assert!((b.volume() - 2.0 * 1.8 * 2.2).abs() < 1e-12);
    }

    #[test]
    #[should_panic(expected = "singular")]
    fn degenerate_cell_is_fatal() {
        Boundary::from_cell(&[
            1.0, 0.0, 0.0,
            2.0, 0.0, 0.0,
            0.0, 0.0, 1.0,
        ]);
    }
}
