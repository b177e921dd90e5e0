// ewald.rs
// Reciprocal-space part of the Ewald sum for point charges in a periodic
// (possibly non-orthogonal) unit cell: wave generation, structure factor,
// k-space energy, forces, and stress
// Only one member of each conjugate wave pair {k, -k} is stored; the
// first nonzero index is chosen non-negative and the missing half sphere
// enters through a factor of two
// The force loop never evaluates a transcendental in its innermost level:
// per-atom phase factors are built once per index dimension by repeated
// complex multiplication and recombined through the hierarchical index
// range tables
// References:
// Frenkel & Smit, Understanding Molecular Simulation, 2nd Ed., Ch. 12.1
// Deserno & Holm, J. Chem. Phys. 109, 7678 (1998)
use nalgebra::{Matrix3, Vector3};
use num_complex::Complex64;

use crate::boundary::Boundary;
use crate::system::System;
use crate::PI;

// Charges below this magnitude contribute nothing and are skipped
const CHARGE_EPS: f64 = 1.0e-10;

// Lazily recomputed quantity, invalidated by the explicit note_* calls
enum Cache<T> {
    Unset,
    Valid(T),
}

pub struct Ewald {
    // Setup parameters, fixed at construction
    alpha: f64,    // Gaussian splitting parameter
    epsilon: f64,  // dielectric permittivity
    k_cutoff: f64, // reciprocal-space cutoff

    // Wave tables, rebuilt only on geometry or cutoff changes
    waves: Vec<[i32; 3]>,
    ksq: Vec<f64>,
    g: Vec<f64>, // exp(-ksq / 4 alpha^2) / ksq
    base: [i32; 3],
    upper: [i32; 3],
    range0: (i32, i32),
    range1: Vec<(i32, i32)>,
    range2: Vec<(i32, i32)>,
    waves_built: bool,

    // Fourier modes of the charge density, recomputed when atoms move
    rho: Vec<Complex64>,

    // Per-atom phase factor scratch, one entry per index value
    fexp0: Vec<Complex64>,
    fexp1: Vec<Complex64>,
    fexp2: Vec<Complex64>,

    energy: Cache<f64>,
    stress: Cache<Matrix3<f64>>,
}

impl Ewald {
    pub fn new(alpha: f64, epsilon: f64, k_cutoff: f64) -> Ewald {
        if alpha <= 0.0 {
            panic!("Ewald splitting parameter must be positive, got {}", alpha);
        }
        if epsilon <= 0.0 {
            panic!("Dielectric permittivity must be positive, got {}", epsilon);
        }
        if k_cutoff <= 0.0 {
            panic!("Wavevector cutoff must be positive, got {}", k_cutoff);
        }
        Ewald {
            alpha,
            epsilon,
            k_cutoff,
            waves: Vec::new(),
            ksq: Vec::new(),
            g: Vec::new(),
            base: [0; 3],
            upper: [0; 3],
            range0: (0, -1),
            range1: Vec::new(),
            range2: Vec::new(),
            waves_built: false,
            rho: Vec::new(),
            fexp0: Vec::new(),
            fexp1: Vec::new(),
            fexp2: Vec::new(),
            energy: Cache::Unset,
            stress: Cache::Unset,
        }
    }

    pub fn n_wave(&self) -> usize {
        self.waves.len()
    }

    // Atoms moved: cached sums are stale, the wave set is not
    pub fn note_positions_changed(&mut self) {
        self.energy = Cache::Unset;
        self.stress = Cache::Unset;
    }

    // Boundary or cutoff changed: everything is stale
    pub fn note_geometry_changed(&mut self) {
        self.waves_built = false;
        self.energy = Cache::Unset;
        self.stress = Cache::Unset;
    }

    // Enumerate all wavevectors k = k0 b0 + k1 b1 + k2 b2 with
    // |k|^2 <= k_cutoff^2, keeping one member per conjugate pair:
    // k0 >= 0, and on the k0 = 0 plane k1 ranges freely while the
    // k0 = k1 = 0 axis starts at k2 = 1
    // The lexicographic generation order makes the valid indices of each
    // dimension a single contiguous interval, which is what the range
    // tables record
    pub fn make_waves(&mut self, boundary: &Boundary) {
        let b = [
            boundary.reciprocal_basis_vector(0),
            boundary.reciprocal_basis_vector(1),
            boundary.reciprocal_basis_vector(2),
        ];
        let kcut_sq = self.k_cutoff * self.k_cutoff;
        let prefactor = -0.25 / (self.alpha * self.alpha);

        // |k_j| can reach at most kCutoff |a_j| / 2 pi
        let mut max_k = [0i32; 3];
        for j in 0..3 {
            max_k[j] = (self.k_cutoff * boundary.bravais_basis_vector(j).norm()
                / (2.0 * PI))
                .ceil() as i32;
        }

        self.waves.clear();
        self.ksq.clear();
        self.g.clear();
        let capacity = (((2 * max_k[0] + 1) * (2 * max_k[1] + 1) * (2 * max_k[2] + 1) - 1)
            / 2) as usize;
        self.waves.reserve(capacity);
        self.ksq.reserve(capacity);
        self.g.reserve(capacity);

        self.base = [0, max_k[1], max_k[2]];
        self.upper = [-max_k[0], -max_k[1], -max_k[2]];

        for k0 in 0..=max_k[0] {
            let min_k1 = if k0 == 0 { 0 } else { -max_k[1] };
            for k1 in min_k1..=max_k[1] {
                let min_k2 = if k0 == 0 && k1 == 0 { 1 } else { -max_k[2] };
                for k2 in min_k2..=max_k[2] {
                    let q = b[0] * k0 as f64 + b[1] * k1 as f64 + b[2] * k2 as f64;
                    let ksq = q.norm_squared();
                    if ksq <= kcut_sq {
                        if k0 > self.upper[0] {
                            self.upper[0] = k0;
                        }
                        if k1 < self.base[1] {
                            self.base[1] = k1;
                        }
                        if k1 > self.upper[1] {
                            self.upper[1] = k1;
                        }
                        if k2 < self.base[2] {
                            self.base[2] = k2;
                        }
                        if k2 > self.upper[2] {
                            self.upper[2] = k2;
                        }
                        self.waves.push([k0, k1, k2]);
                        self.ksq.push(ksq);
                        self.g.push((prefactor * ksq).exp() / ksq);
                    }
                }
            }
        }

        // Phase factor scratch, one slot per index value in use
        let zero = Complex64::new(0.0, 0.0);
        let size = |j: usize, base: &[i32; 3], upper: &[i32; 3]| -> usize {
            (upper[j] - base[j] + 1).max(0) as usize
        };
        self.fexp0 = vec![zero; size(0, &self.base, &self.upper)];
        self.fexp1 = vec![zero; size(1, &self.base, &self.upper)];
        self.fexp2 = vec![zero; size(2, &self.base, &self.upper)];

        // Range tables: for each k0 the contiguous run of valid k1, and
        // for each (k0, k1) the contiguous run of valid k2. The scan
        // mirrors the generation order above
        self.range0 = (0, -1);
        self.range1.clear();
        self.range2.clear();
        for w in &self.waves {
            if w[0] > self.range0.1 {
                self.range0.1 = w[0];
                self.range1.push((w[1], w[1]));
                self.range2.push((w[2], w[2]));
            } else if w[1] > self.range1.last().expect("range1 nonempty").1 {
                self.range1.last_mut().expect("range1 nonempty").1 = w[1];
                self.range2.push((w[2], w[2]));
            } else {
                self.range2.last_mut().expect("range2 nonempty").1 = w[2];
            }
        }

        // Internal consistency: the ranges must reconstruct exactly the
        // stored wave count
        let n_items: i64 = self
            .range2
            .iter()
            .map(|r| (r.1 - r.0 + 1) as i64)
            .sum();
        if n_items != self.waves.len() as i64 {
            panic!(
                "Wave index ranges reconstruct {} waves but {} were stored",
                n_items,
                self.waves.len()
            );
        }

        self.rho = vec![zero; self.waves.len()];
        self.waves_built = true;
        self.energy = Cache::Unset;
        self.stress = Cache::Unset;
    }

    // Fourier modes of the charge density,
    // rho_k = sum_i q_i exp(2 pi i k . s_i), by direct evaluation
    fn compute_kspace_charge(&mut self, system: &System) {
        for r in self.rho.iter_mut() {
            *r = Complex64::new(0.0, 0.0);
        }
        for idx in 0..system.n_atom() {
            let charge = system.charge_of(idx);
            if charge.abs() <= CHARGE_EPS {
                continue;
            }
            let rg = system
                .boundary()
                .transform_cart_to_gen(system.atom(idx).pos);
            for (i, w) in self.waves.iter().enumerate() {
                let dotqr = 2.0
                    * PI
                    * (rg[0] * w[0] as f64 + rg[1] * w[1] as f64 + rg[2] * w[2] as f64);
                self.rho[i] += Complex64::new(charge * dotqr.cos(), charge * dotqr.sin());
            }
        }
    }

    // K-space Coulomb energy,
    // E = (1 / 2 eps V) sum_k g_k |rho_k|^2, doubled for the conjugate
    // half of the sphere
    pub fn kspace_energy(&mut self, system: &System) -> f64 {
        if let Cache::Valid(e) = self.energy {
            return e;
        }
        if !self.waves_built {
            self.make_waves(system.boundary());
        }
        self.compute_kspace_charge(system);
        let mut total = 0.0;
        for i in 0..self.waves.len() {
            total += self.rho[i].norm_sqr() * self.g[i];
        }
        total *= 0.5 / (self.epsilon * system.boundary().volume());
        let e = 2.0 * total;
        self.energy = Cache::Valid(e);
        e
    }

    // Add the k-space Coulomb force to every charged atom's accumulator.
    // Per atom, the phase factor of each index dimension is tabulated by
    // one exp() followed by repeated multiplication, then the range
    // tables drive the recombination over all stored waves
    pub fn add_kspace_forces(&mut self, system: &mut System) {
        if !self.waves_built {
            self.make_waves(system.boundary());
        }
        if self.waves.is_empty() {
            return;
        }
        self.compute_kspace_charge(system);

        let boundary = system.boundary().clone();
        let b = [
            boundary.reciprocal_basis_vector(0),
            boundary.reciprocal_basis_vector(1),
            boundary.reciprocal_basis_vector(2),
        ];
        let two_pi_im = Complex64::new(0.0, 2.0 * PI);
        let prefactor = -2.0 / (self.epsilon * boundary.volume());

        for idx in 0..system.n_atom() {
            let charge = system.charge_of(idx);
            if charge.abs() <= CHARGE_EPS {
                continue;
            }
            let rg = boundary.transform_cart_to_gen(system.atom(idx).pos);

            // Tabulate the exponential factors along each dimension
            self.fexp0[0] = (two_pi_im * rg[0] * self.base[0] as f64).exp();
            let de = (two_pi_im * rg[0]).exp();
            for i in 1..self.fexp0.len() {
                self.fexp0[i] = self.fexp0[i - 1] * de;
            }
            self.fexp1[0] = (two_pi_im * rg[1] * self.base[1] as f64).exp();
            let de = (two_pi_im * rg[1]).exp();
            for i in 1..self.fexp1.len() {
                self.fexp1[i] = self.fexp1[i - 1] * de;
            }
            self.fexp2[0] = (two_pi_im * rg[2] * self.base[2] as f64).exp();
            let de = (two_pi_im * rg[2]).exp();
            for i in 1..self.fexp2.len() {
                self.fexp2[i] = self.fexp2[i - 1] * de;
            }

            // Generalized force accumulated over all stored waves
            let mut r1 = 0usize;
            let mut r2 = 0usize;
            let mut i = 0usize;
            let mut fg = Vector3::zeros();
            for i0 in self.range0.0..=self.range0.1 {
                let e0 = self.fexp0[(i0 - self.base[0]) as usize];
                let (lo1, hi1) = self.range1[r1];
                r1 += 1;
                for i1 in lo1..=hi1 {
                    let e1 = e0 * self.fexp1[(i1 - self.base[1]) as usize];
                    let (lo2, hi2) = self.range2[r2];
                    r2 += 1;
                    for i2 in lo2..=hi2 {
                        let e2 = e1 * self.fexp2[(i2 - self.base[2]) as usize];
                        let w = self.g[i]
                            * (e2.re * self.rho[i].im - e2.im * self.rho[i].re);
                        fg[0] += w * i0 as f64;
                        fg[1] += w * i1 as f64;
                        fg[2] += w * i2 as f64;
                        i += 1;
                    }
                }
            }
            fg *= charge * prefactor;

            // Back to Cartesian coordinates, added not overwritten
            let force = b[0] * fg[0] + b[1] * fg[1] + b[2] * fg[2];
            system.atom_mut(idx).force += force;
        }
    }

    // K-space stress tensor, with the convention P = tr(sigma) / 3 =
    // -dE/dV at fixed generalized coordinates:
    // sigma_ab = (1 / eps V^2) sum'_k g_k |rho_k|^2
    //            [ delta_ab - 2 (1/(4 alpha^2) + 1/k^2) k_a k_b ]
    // The primed sum runs over the stored half sphere; its prefactor
    // already carries the conjugate doubling
    pub fn kspace_stress(&mut self, system: &System) -> Matrix3<f64> {
        if let Cache::Valid(s) = self.stress {
            return s;
        }
        if !self.waves_built {
            self.make_waves(system.boundary());
        }
        self.compute_kspace_charge(system);

        let b = [
            system.boundary().reciprocal_basis_vector(0),
            system.boundary().reciprocal_basis_vector(1),
            system.boundary().reciprocal_basis_vector(2),
        ];
        let vol = system.boundary().volume();
        let mut stress = Matrix3::zeros();
        for i in 0..self.waves.len() {
            let w = self.waves[i];
            let q = b[0] * w[0] as f64 + b[1] * w[1] as f64 + b[2] * w[2] as f64;
            let weight = self.g[i] * self.rho[i].norm_sqr();
            let c = 2.0 * (0.25 / (self.alpha * self.alpha) + 1.0 / self.ksq[i]);
            for a in 0..3 {
                for bb in 0..3 {
                    let mut term = -c * q[a] * q[bb];
                    if a == bb {
                        term += 1.0;
                    }
                    stress[(a, bb)] += weight * term;
                }
            }
        }
        stress *= 1.0 / (self.epsilon * vol * vol);
        self.stress = Cache::Valid(stress);
        stress
    }
}
