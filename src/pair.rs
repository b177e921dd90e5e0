// pair.rs
// Short-range pair interactions evaluated over the cell-list neighbor
// enumeration. The loop shape follows the cell-list contract: iterate
// the non-empty local cells, take each cell's own atoms against the
// later entries of its neighbor array
// Pairs that cross the periodic boundary show up once from each side as
// local-ghost pairs, so their energy carries a half weight and their
// force is applied to the primary-side atom only
use crate::cell_list::CellList;
use crate::system::System;

pub trait PairPotential {
    // Pair energy at squared separation rsq
    fn energy(&self, rsq: f64) -> f64;

    // Magnitude of the pair force divided by r; multiply by the
    // separation vector to get the force on the first atom
    fn force_over_r(&self, rsq: f64) -> f64;

    fn cutoff(&self) -> f64;
}

// Truncated 12-6 Lennard-Jones
// TODO: per-type-pair parameter table once mixtures need distinct sizes
#[derive(Clone, Debug)]
pub struct LennardJones {
    pub sigma: f64,
    pub well: f64,
    pub cutoff: f64,
}

impl PairPotential for LennardJones {
    fn energy(&self, rsq: f64) -> f64 {
        let s2 = self.sigma * self.sigma / rsq;
        let s6 = s2 * s2 * s2;
        4.0 * self.well * (s6 * s6 - s6)
    }

    fn force_over_r(&self, rsq: f64) -> f64 {
        let s2 = self.sigma * self.sigma / rsq;
        let s6 = s2 * s2 * s2;
        24.0 * self.well * (2.0 * s6 * s6 - s6) / rsq
    }

    fn cutoff(&self) -> f64 {
        self.cutoff
    }
}

// Total short-range pair energy from the cell list. Separations come
// straight from the cell-list slots, which already hold wrapped and
// image positions
pub fn cell_pair_energy<P: PairPotential>(cell_list: &CellList, potential: &P) -> f64 {
    let rc_sq = potential.cutoff() * potential.cutoff();
    let mut neighbors = Vec::new();
    let mut energy = 0.0;
    for &c in cell_list.local_cells() {
        cell_list.get_neighbors(c, &mut neighbors);
        let n_own = cell_list.cell(c).n_atom();
        for i in 0..n_own {
            for j in (i + 1)..neighbors.len() {
                let rsq = (neighbors[i].pos - neighbors[j].pos).norm_squared();
                if rsq <= rc_sq {
                    let weight = if neighbors[j].ghost { 0.5 } else { 1.0 };
                    energy += weight * potential.energy(rsq);
                }
            }
        }
    }
    energy
}

// Accumulate short-range pair forces into the atoms' force accumulators.
// Interior pairs update both partners; ghost pairs update only the local
// partner, its mirror arrives when the other atom's cell is primary
pub fn add_cell_pair_forces<P: PairPotential>(
    system: &mut System,
    cell_list: &CellList,
    potential: &P,
) {
    let rc_sq = potential.cutoff() * potential.cutoff();
    let mut neighbors = Vec::new();
    for &c in cell_list.local_cells() {
        cell_list.get_neighbors(c, &mut neighbors);
        let n_own = cell_list.cell(c).n_atom();
        for i in 0..n_own {
            for j in (i + 1)..neighbors.len() {
                let dr = neighbors[i].pos - neighbors[j].pos;
                let rsq = dr.norm_squared();
                if rsq <= rc_sq {
                    let f = dr * potential.force_over_r(rsq);
                    system.atom_mut(neighbors[i].atom_id).force += f;
                    if !neighbors[j].ghost {
                        system.atom_mut(neighbors[j].atom_id).force -= f;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::Boundary;
    use crate::system::{Atom, AtomType};
    use nalgebra::Vector3;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;

    fn lj() -> LennardJones {
        LennardJones {
            sigma: 1.0,
            well: 1.0,
            cutoff: 2.5,
        }
    }

    #[test]
    fn lj_minimum() {
        let pot = lj();
        let r_min: f64 = 2.0f64.powf(1.0 / 6.0);
        assert!((pot.energy(r_min * r_min) + 1.0).abs() < 1e-12);
        assert!(pot.force_over_r(r_min * r_min).abs() < 1e-12);
    }

    #[test]
    fn cell_energy_matches_brute_force() {
        let mut rng = Xoshiro256StarStar::seed_from_u64(3);
        let system = System::random(80, Boundary::cubic(12.0), 0.0, &mut rng);
        let pot = lj();
        let mut list = CellList::new();
        list.make_grid(system.boundary(), pot.cutoff(), 2);
        list.update(&system);
        let from_cells = cell_pair_energy(&list, &pot);
        let brute = system.pair_energy_brute(&pot);
        assert!(
            (from_cells - brute).abs() <= 1e-10 * brute.abs().max(1.0),
            "cell list {} vs brute force {}", from_cells, brute
        );
    }

    #[test]
    fn cell_energy_matches_brute_force_triclinic() {
        let boundary = Boundary::from_cell(&[
            9.0, 0.0, 0.0,
            1.2, 8.4, 0.0,
            -0.8, 1.1, 9.3,
        ]);
        let mut rng = Xoshiro256StarStar::seed_from_u64(7);
        let system = System::random(60, boundary, 0.0, &mut rng);
        let pot = lj();
        let mut list = CellList::new();
        list.make_grid(system.boundary(), pot.cutoff(), 1);
        list.update(&system);
        let from_cells = cell_pair_energy(&list, &pot);
        let brute = system.pair_energy_brute(&pot);
        assert!(
            (from_cells - brute).abs() <= 1e-10 * brute.abs().max(1.0),
            "cell list {} vs brute force {}", from_cells, brute
        );
    }

    #[test]
    fn forces_sum_to_zero() {
        let mut rng = Xoshiro256StarStar::seed_from_u64(13);
        let mut system = System::random(50, Boundary::cubic(11.0), 0.0, &mut rng);
        let pot = lj();
        let mut list = CellList::new();
        list.make_grid(system.boundary(), pot.cutoff(), 2);
        list.update(&system);
        system.zero_forces();
        add_cell_pair_forces(&mut system, &list, &pot);
        let total: Vector3<f64> = (0..system.n_atom())
            .map(|i| system.atom(i).force)
            .fold(Vector3::zeros(), |acc, f| acc + f);
        assert!(total.norm() < 1e-9, "net force {}", total.norm());
    }

    #[test]
    fn two_atom_force_is_central_difference_of_energy() {
        let boundary = Boundary::cubic(10.0);
        let types = vec![AtomType { name: "a".to_string(), charge: 0.0 }];
        let mk = |x: f64| Atom {
            pos: Vector3::new(x, 5.0, 5.0),
            type_id: 0,
            force: Vector3::zeros(),
        };
        let pot = lj();
        let h = 1e-6;
        let energy_at = |x: f64| {
            let system = System::new(
                Boundary::cubic(10.0),
                vec![AtomType { name: "a".to_string(), charge: 0.0 }],
                vec![mk(x), mk(6.3)],
            );
            let mut list = CellList::new();
            list.make_grid(system.boundary(), pot.cutoff(), 2);
            list.update(&system);
            cell_pair_energy(&list, &pot)
        };
        let mut system = System::new(boundary, types, vec![mk(5.0), mk(6.3)]);
        let mut list = CellList::new();
        list.make_grid(system.boundary(), pot.cutoff(), 2);
        list.update(&system);
        system.zero_forces();
        add_cell_pair_forces(&mut system, &list, &pot);
        let fd = -(energy_at(5.0 + h) - energy_at(5.0 - h)) / (2.0 * h);
        let fx = system.atom(0).force[0];
        assert!((fx - fd).abs() < 1e-5, "analytic {} vs fd {}", fx, fd);
    }
}
