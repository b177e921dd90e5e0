// system.rs
// Atom storage for a periodic particle system: boundary, atom types with
// their charges, and the atoms themselves
// Also supplies the ghost-image halo consumed by the cell list and a
// brute-force O(N^2) pair reference used to validate it
use std::fmt;
use std::fmt::Display;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use itertools::{Itertools, Position};
use nalgebra::Vector3;
use rand_distr::{Distribution, Uniform};
use rand_xoshiro::Xoshiro256StarStar;
use rayon::prelude::*;

use crate::boundary::Boundary;
use crate::common_util::{apply_pbc, min_image_sq};
use crate::pair::PairPotential;

#[derive(Clone, Debug)]
pub struct AtomType {
    pub name: String,
    pub charge: f64,
}

#[derive(Clone, Debug)]
pub struct Atom {
    pub pos: Vector3<f64>,
    pub type_id: usize,
    pub force: Vector3<f64>,
}

impl Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.pos[0], self.pos[1], self.pos[2], self.type_id
        )
    }
}

// A periodic image of a local atom, expressed in generalized coordinates
// so the cell list can bin it without re-deriving the shift
#[derive(Clone, Copy, Debug)]
pub struct GhostImage {
    pub atom_id: usize,
    pub gen: Vector3<f64>,
}

#[derive(Clone, Debug)]
pub struct System {
    boundary: Boundary,
    types: Vec<AtomType>,
    atoms: Vec<Atom>,
}

impl System {
    pub fn new(boundary: Boundary, types: Vec<AtomType>, atoms: Vec<Atom>) -> System {
        assert!(!types.is_empty(), "System needs at least one atom type");
        for atom in &atoms {
            assert!(
                atom.type_id < types.len(),
                "Atom references type {} but only {} types exist",
                atom.type_id,
                types.len()
            );
        }
        System { boundary, types, atoms }
    }

    // Uniform random positions, alternating +q/-q charges so the box is
    // neutral. Same reproducible-rng convention as the rest of the code:
    // the caller seeds the generator
    pub fn random(
        n: usize,
        boundary: Boundary,
        charge: f64,
        rng: &mut Xoshiro256StarStar,
    ) -> System {
        let types = vec![
            AtomType { name: "plus".to_string(), charge },
            AtomType { name: "minus".to_string(), charge: -charge },
        ];
        let uni_dist = Uniform::new(0.0, 1.0);
        let mut atoms = Vec::with_capacity(n);
        for i in 0..n {
            let gen = Vector3::new(
                uni_dist.sample(rng),
                uni_dist.sample(rng),
                uni_dist.sample(rng),
            );
            atoms.push(Atom {
                pos: boundary.transform_gen_to_cart(gen),
                type_id: i % 2,
                force: Vector3::zeros(),
            });
        }
        System::new(boundary, types, atoms)
    }

    // File layout:
    //   natom ntype
    //   c00 c01 c02 c10 c11 c12 c20 c21 c22
    //   name charge          (ntype lines)
    //   x y z type_id        (natom lines)
    pub fn from_file(path: &Path) -> System {
        let mut infile = BufReader::new(File::open(path).expect("Input file must be valid"));
        let mut buf = String::new();
        infile.read_line(&mut buf).expect("Valid utf-8");
        let mut header = buf.split_whitespace();
        let n_atom: usize = header
            .next()
            .expect("Missing atom count")
            .parse()
            .expect("Valid atom count");
        let n_type: usize = header
            .next()
            .expect("Missing type count")
            .parse()
            .expect("Valid type count");
        buf.clear();
        infile.read_line(&mut buf).expect("Valid utf-8");
        let cell: Vec<f64> = buf
            .split_whitespace()
            .map(|x| x.parse().expect("Valid unit cell entry"))
            .collect();
        let boundary = Boundary::from_cell(&cell);
        let mut types = Vec::with_capacity(n_type);
        for _ in 0..n_type {
            buf.clear();
            infile.read_line(&mut buf).expect("Valid utf-8");
            let mut fields = buf.split_whitespace();
            types.push(AtomType {
                name: fields.next().expect("Missing type name").to_string(),
                charge: fields
                    .next()
                    .expect("Missing type charge")
                    .parse()
                    .expect("Valid charge"),
            });
        }
        let mut atoms = Vec::with_capacity(n_atom);
        for _ in 0..n_atom {
            buf.clear();
            infile.read_line(&mut buf).expect("Valid utf-8");
            let fields: Vec<&str> = buf.split_whitespace().collect();
            atoms.push(Atom {
                pos: Vector3::new(
                    fields[0].parse().expect("Valid x"),
                    fields[1].parse().expect("Valid y"),
                    fields[2].parse().expect("Valid z"),
                ),
                type_id: fields[3].parse().expect("Valid type id"),
                force: Vector3::zeros(),
            });
        }
        System::new(boundary, types, atoms)
    }

    // Saves the config in the same ascii format, panics on any error,
    // and tries to wait until the data hits disk
    // https://doc.rust-lang.org/std/io/struct.BufWriter.html
    pub fn save(&self, path: &Path, annotation: Option<&str>) {
        let mut file =
            BufWriter::new(File::create(path).expect("Must specify valid path to save to."));
        if let Some(annotation) = annotation {
            writeln!(&mut file, "{}", annotation).expect("Failed write during save.");
        }
        writeln!(&mut file, "{} {}", self.atoms.len(), self.types.len())
            .expect("Failed write during save.");
        for entry in self.boundary.cell().iter().with_position() {
            match entry {
                Position::Last(x) => writeln!(&mut file, "{}", x),
                Position::Middle(x) => write!(&mut file, "{} ", x),
                Position::First(x) => write!(&mut file, "{} ", x),
                Position::Only(x) => writeln!(&mut file, "{}", x),
            }
            .expect("Failed write during save.");
        }
        for t in &self.types {
            writeln!(&mut file, "{} {}", t.name, t.charge).expect("Failed write during save.");
        }
        for atom in &self.atoms {
            writeln!(&mut file, "{}", atom).expect("Failed write during save.");
        }
        let mut f = file.into_inner().expect("Failed to unwrap buffer during save");
        f.flush().expect("Failed to flush file writer during save");
        f.sync_all().expect("Failed to sync during save.");
    }

    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    pub fn n_atom(&self) -> usize {
        self.atoms.len()
    }

    pub fn n_type(&self) -> usize {
        self.types.len()
    }

    pub fn atom(&self, i: usize) -> &Atom {
        &self.atoms[i]
    }

    pub fn atom_mut(&mut self, i: usize) -> &mut Atom {
        &mut self.atoms[i]
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    // Type-indexed charge table lookup
    pub fn charge_of(&self, i: usize) -> f64 {
        self.types[self.atoms[i].type_id].charge
    }

    pub fn zero_forces(&mut self) {
        for atom in self.atoms.iter_mut() {
            atom.force = Vector3::zeros();
        }
    }

    // Wrapped generalized coordinates of atom i, in [0, 1)
    pub fn wrapped_gen(&self, i: usize) -> Vector3<f64> {
        apply_pbc(self.boundary.transform_cart_to_gen(self.atoms[i].pos))
    }

    // Periodic images of every atom within `cutoff` of a cell face,
    // including edge and corner combinations. This plays the role the
    // ghost-exchange communication layer plays in a domain-decomposed
    // run: the cell list consumes the images, it never invents them
    pub fn ghost_images(&self, cutoff: f64) -> Vec<GhostImage> {
        let frac_cut = [
            cutoff / self.boundary.perpendicular_width(0),
            cutoff / self.boundary.perpendicular_width(1),
            cutoff / self.boundary.perpendicular_width(2),
        ];
        let mut ghosts = Vec::new();
        for i in 0..self.atoms.len() {
            let gen = self.wrapped_gen(i);
            let mut shifts: [Vec<f64>; 3] = [vec![0.0], vec![0.0], vec![0.0]];
            for j in 0..3 {
                if gen[j] < frac_cut[j] {
                    shifts[j].push(1.0);
                }
                if gen[j] >= 1.0 - frac_cut[j] {
                    shifts[j].push(-1.0);
                }
            }
            for &sx in &shifts[0] {
                for &sy in &shifts[1] {
                    for &sz in &shifts[2] {
                        if sx == 0.0 && sy == 0.0 && sz == 0.0 {
                            continue;
                        }
                        ghosts.push(GhostImage {
                            atom_id: i,
                            gen: gen + Vector3::new(sx, sy, sz),
                        });
                    }
                }
            }
        }
        ghosts
    }

    // Brute-force minimum-image pair energy, the ground truth the cell
    // list is checked against. Exact for cutoff <= half the narrowest
    // cell width
    pub fn pair_energy_brute<P: PairPotential + Sync>(&self, potential: &P) -> f64 {
        let n = self.atoms.len();
        let rc_sq = potential.cutoff() * potential.cutoff();
        let gens: Vec<Vector3<f64>> = (0..n).map(|i| self.wrapped_gen(i)).collect();
        (0..n)
            .into_par_iter()
            .map(|i| {
                let mut energy = 0.0;
                for j in (i + 1)..n {
                    let rsq = min_image_sq(&self.boundary, gens[i], gens[j]);
                    if rsq <= rc_sq {
                        energy += potential.energy(rsq);
                    }
                }
                energy
            })
            .sum()
    }
}
