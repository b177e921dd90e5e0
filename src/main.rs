// main.rs
// Driver for the periodic pair-search / k-space toolkit: build a system
// (from a file or at random), bin it into the cell list, evaluate the
// short-range pair energy and the k-space Coulomb energy, forces, and
// stress, and optionally cross-check against the O(N^2) reference
use std::fs::File;
use std::path::PathBuf;

use chrono::Local;
use lazy_static::lazy_static;
use nalgebra::Vector3;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;
use serde::{Deserialize, Serialize};
use structopt::StructOpt;

mod boundary;
mod cell;
mod cell_list;
mod common_util;
mod ewald;
mod pair;
mod system;

use crate::boundary::Boundary;
use crate::cell_list::CellList;
use crate::ewald::Ewald;
use crate::pair::{add_cell_pair_forces, cell_pair_energy, LennardJones};
use crate::system::System;

pub const PI: f64 = std::f64::consts::PI;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "simpatico_core",
    about = "Cell-list pair search and Ewald k-space electrostatics \
             for periodic particle systems"
)]
pub struct Opt {
    /// Read the starting configuration from a file instead of generating one
    #[structopt(long, parse(from_os_str))]
    pub infile: Option<PathBuf>,

    /// Yaml file with the scalar physics parameters; overrides the
    /// individual options below
    #[structopt(long, parse(from_os_str))]
    pub params: Option<PathBuf>,

    /// Number of atoms for a generated configuration
    #[structopt(short = "n", long, default_value = "216")]
    pub n_atoms: usize,

    /// Cubic box side for a generated configuration
    #[structopt(long, default_value = "12.0")]
    pub side: f64,

    /// Charge magnitude for a generated (alternating, neutral) configuration
    #[structopt(long, default_value = "1.0")]
    pub charge: f64,

    /// Rng seed for a generated configuration
    #[structopt(long, default_value = "0")]
    pub seed: u64,

    /// Short-range pair cutoff
    #[structopt(long, default_value = "2.5")]
    pub cutoff: f64,

    /// Reciprocal-space cutoff
    #[structopt(long, default_value = "5.0")]
    pub k_cutoff: f64,

    /// Ewald splitting parameter
    #[structopt(long, default_value = "0.8")]
    pub alpha: f64,

    /// Dielectric permittivity
    #[structopt(long, default_value = "1.0")]
    pub epsilon: f64,

    /// Grid refinement: cells per cutoff length, at most 4
    #[structopt(long, default_value = "2")]
    pub cells_per_cutoff: usize,

    /// Cross-check the cell-list pair energy against the O(N^2) reference
    #[structopt(long)]
    pub validate: bool,

    /// Save the final configuration to this path
    #[structopt(long, parse(from_os_str))]
    pub savefile: Option<PathBuf>,
}

lazy_static! {
    pub static ref OPT: Opt = Opt::from_args();
}

// The scalar parameters read once at setup, either from the command
// line or from a small yaml file
#[derive(Debug, Serialize, Deserialize)]
pub struct SimParams {
    pub cutoff: f64,
    pub k_cutoff: f64,
    pub alpha: f64,
    pub epsilon: f64,
    pub cells_per_cutoff: usize,
}

impl SimParams {
    fn from_opt() -> SimParams {
        if let Some(path) = &OPT.params {
            let file = File::open(path).expect("Params file must be valid");
            serde_yaml::from_reader(file).expect("Params file must be valid yaml")
        } else {
            SimParams {
                cutoff: OPT.cutoff,
                k_cutoff: OPT.k_cutoff,
                alpha: OPT.alpha,
                epsilon: OPT.epsilon,
                cells_per_cutoff: OPT.cells_per_cutoff,
            }
        }
    }
}

fn main() {
    println!(
        "simpatico_core {} (built {}, clean working dir: {})",
        env!("VERGEN_SEMVER"),
        env!("VERGEN_BUILD_TIMESTAMP"),
        env!("WD_IS_CLEAN")
    );
    println!("Run started {}", Local::now().to_rfc2822());

    let params = SimParams::from_opt();
    let mut system = match &OPT.infile {
        Some(path) => {
            println!("Reading configuration from {:?}", path);
            System::from_file(path)
        }
        None => {
            println!(
                "Generating {} atoms in a cubic box of side {} (seed {})",
                OPT.n_atoms, OPT.side, OPT.seed
            );
            let mut rng = Xoshiro256StarStar::seed_from_u64(OPT.seed);
            System::random(OPT.n_atoms, Boundary::cubic(OPT.side), OPT.charge, &mut rng)
        }
    };
    println!(
        "{} atoms, {} types, volume {:.6}",
        system.n_atom(),
        system.n_type(),
        system.boundary().volume()
    );

    let mut cell_list = CellList::new();
    cell_list.make_grid(system.boundary(), params.cutoff, params.cells_per_cutoff);
    let dims = cell_list.grid_dims();
    let local = cell_list.local_dims();
    let ncc = cell_list.n_cell_cut();
    println!(
        "Grid: {}x{}x{} local cells, {}x{}x{} padded, cutoff {} over {} cells",
        local[0], local[1], local[2], dims[0], dims[1], dims[2],
        cell_list.cutoff(), ncc[0].max(ncc[1]).max(ncc[2])
    );
    cell_list.update(&system);

    let lj = LennardJones {
        sigma: 1.0,
        well: 1.0,
        cutoff: params.cutoff,
    };
    let pair_energy = cell_pair_energy(&cell_list, &lj);
    println!("Pair energy: {:.10}", pair_energy);

    let mut ewald = Ewald::new(params.alpha, params.epsilon, params.k_cutoff);
    let kspace_energy = ewald.kspace_energy(&system);
    println!(
        "K-space energy: {:.10} over {} waves",
        kspace_energy,
        ewald.n_wave()
    );
    let stress = ewald.kspace_stress(&system);
    let pressure = (stress[(0, 0)] + stress[(1, 1)] + stress[(2, 2)]) / 3.0;
    println!("K-space pressure: {:.6e}", pressure);

    system.zero_forces();
    add_cell_pair_forces(&mut system, &cell_list, &lj);
    ewald.add_kspace_forces(&mut system);
    let net: Vector3<f64> = system
        .atoms()
        .iter()
        .fold(Vector3::zeros(), |acc, a| acc + a.force);
    println!("Net force after accumulation: {:.3e}", net.norm());

    if OPT.validate {
        let brute = system.pair_energy_brute(&lj);
        let diff = (pair_energy - brute).abs() / brute.abs().max(1.0);
        if diff <= 1e-10 {
            println!("Pair validation passed: relative difference {:.3e}", diff);
        } else {
            eprintln!(
                "Pair validation FAILED: cell list {} vs brute force {}",
                pair_energy, brute
            );
            std::process::exit(1);
        }
    }

    if let Some(path) = &OPT.savefile {
        system.save(path, Some("final"));
        println!("Saved configuration to {:?}", path);
    }
}
