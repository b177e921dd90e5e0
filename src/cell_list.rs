// cell_list.rs
// Spatial partition of a periodic unit cell into a grid of sub-cells,
// used to enumerate candidate interacting pairs within a cutoff in O(N)
// The grid is padded by nCellCut ghost cells per side in each direction,
// so neighbor offsets are plain strides that never wrap an index; the
// periodic images living in the padding are supplied by the System
// References:
// https://scicomp.stackexchange.com/questions/3107/minimum-image-convention-for-triclinic-unit-cell
// https://hoomd-blue.readthedocs.io/en/stable/nlist.html
use nalgebra::Vector3;

use crate::boundary::Boundary;
use crate::cell::{Cell, CellAtom, OffsetArray, MAX_NEIGHBOR_ATOM, MAX_N_CELL_CUT};
use crate::system::System;

pub struct CellList {
    cutoff: f64,
    local_dims: [usize; 3],  // cells spanning the primary image
    n_cell_cut: [usize; 3],  // cells spanned by one cutoff length
    grid_dims: [usize; 3],   // local_dims + 2 * n_cell_cut
    cell_lengths: [f64; 3],  // perpendicular width of one cell
    cells: Vec<Cell>,
    slots: Vec<CellAtom>,    // shared slot array, segmented among cells
    offsets: OffsetArray,    // one stencil, shared by all local cells
    local_sequence: Vec<usize>, // non-empty local cells, traversal order
    scratch: Vec<(usize, CellAtom)>,
    is_built: bool,
}

impl CellList {
    pub fn new() -> CellList {
        CellList {
            cutoff: 0.0,
            local_dims: [0; 3],
            n_cell_cut: [0; 3],
            grid_dims: [0; 3],
            cell_lengths: [0.0; 3],
            cells: Vec::new(),
            slots: Vec::new(),
            offsets: OffsetArray::new(),
            local_sequence: Vec::new(),
            scratch: Vec::new(),
            is_built: false,
        }
    }

    // (Re)build the geometry-dependent structures: grid dimensions and
    // the shared neighbor-offset stencil. Called only when the cutoff or
    // the boundary shape changes, never per step
    // cells_per_cutoff requests the grid refinement: 1 gives classic
    // cutoff-sized cells, larger values give finer grids and tighter
    // stencils, bounded by MAX_N_CELL_CUT
    pub fn make_grid(&mut self, boundary: &Boundary, cutoff: f64, cells_per_cutoff: usize) {
        if cutoff <= 0.0 {
            panic!("Pair cutoff must be positive, got {}", cutoff);
        }
        if cells_per_cutoff == 0 || cells_per_cutoff > MAX_N_CELL_CUT {
            panic!(
                "cells_per_cutoff must lie in 1..={}, got {}",
                MAX_N_CELL_CUT, cells_per_cutoff
            );
        }
        for j in 0..3 {
            let width = boundary.perpendicular_width(j);
            if 2.0 * cutoff > width {
                panic!(
                    "Pair cutoff {} exceeds half the unit cell width {} \
                     along direction {}; minimum-image search is invalid",
                    cutoff, width, j
                );
            }
        }
        self.cutoff = cutoff;
        for j in 0..3 {
            let width = boundary.perpendicular_width(j);
            let n = ((width * cells_per_cutoff as f64 / cutoff).floor() as usize).max(1);
            self.local_dims[j] = n;
            self.cell_lengths[j] = width / n as f64;
            self.n_cell_cut[j] = (cutoff / self.cell_lengths[j]).ceil() as usize;
            if self.n_cell_cut[j] > MAX_N_CELL_CUT {
                panic!(
                    "Cutoff spans {} cells along direction {}, more than \
                     the maximum {}",
                    self.n_cell_cut[j], j, MAX_N_CELL_CUT
                );
            }
            self.grid_dims[j] = n + 2 * self.n_cell_cut[j];
        }

        // Cell arena; cells in the padding shell are ghost cells
        let n_cells = self.grid_dims[0] * self.grid_dims[1] * self.grid_dims[2];
        self.cells.clear();
        self.cells.reserve(n_cells);
        for iz in 0..self.grid_dims[2] {
            for iy in 0..self.grid_dims[1] {
                for ix in 0..self.grid_dims[0] {
                    let id = self.flatten(ix, iy, iz);
                    let ghost = !self.is_local(ix, iy, iz);
                    debug_assert_eq!(id, self.cells.len());
                    self.cells.push(Cell::new(id, ghost));
                }
            }
        }

        // Neighbor stencil, one strip per (dy, dz) column, contiguous in
        // the fastest (x) index. A cell pair is kept when the two cell
        // bricks can come within one cutoff; the gap between them is
        // bounded below with perpendicular cell widths, which is exact
        // for rectangular cells and conservative for oblique ones
        let rc_sq = cutoff * cutoff;
        let ncc = [
            self.n_cell_cut[0] as isize,
            self.n_cell_cut[1] as isize,
            self.n_cell_cut[2] as isize,
        ];
        let gap = |d: isize, len: f64| -> f64 {
            if d.abs() > 1 {
                (d.abs() - 1) as f64 * len
            } else {
                0.0
            }
        };
        self.offsets.clear();
        for dz in -ncc[2]..=ncc[2] {
            let gz = gap(dz, self.cell_lengths[2]);
            for dy in -ncc[1]..=ncc[1] {
                let gy = gap(dy, self.cell_lengths[1]);
                let mut first: Option<isize> = None;
                let mut last = 0isize;
                for dx in -ncc[0]..=ncc[0] {
                    let gx = gap(dx, self.cell_lengths[0]);
                    if gx * gx + gy * gy + gz * gz <= rc_sq {
                        if first.is_none() {
                            first = Some(dx);
                        }
                        last = dx;
                    }
                }
                if let Some(first) = first {
                    let stride_y = self.grid_dims[0] as isize;
                    let stride_z = (self.grid_dims[0] * self.grid_dims[1]) as isize;
                    let base = dy * stride_y + dz * stride_z;
                    self.offsets.append(base + first, base + last);
                }
            }
        }

        self.slots.clear();
        self.local_sequence.clear();
        self.is_built = true;
    }

    // Re-bin all atoms for the current step. Two passes over the same
    // entry list: the first tallies per-cell capacities, the second
    // fills each cell's contiguous slot segment, so no per-cell storage
    // ever grows mid-fill
    pub fn update(&mut self, system: &System) {
        assert!(self.is_built, "make_grid must run before update");
        let boundary = system.boundary();

        self.scratch.clear();
        for i in 0..system.n_atom() {
            let gen = system.wrapped_gen(i);
            let id = self.local_cell_id(gen);
            self.scratch.push((
                id,
                CellAtom {
                    atom_id: i,
                    pos: boundary.transform_gen_to_cart(gen),
                    ghost: false,
                },
            ));
        }
        for image in system.ghost_images(self.cutoff) {
            if let Some(id) = self.ghost_cell_id(image.gen) {
                self.scratch.push((
                    id,
                    CellAtom {
                        atom_id: image.atom_id,
                        pos: boundary.transform_gen_to_cart(image.gen),
                        ghost: true,
                    },
                ));
            }
        }

        // Pass 1: capacity counters, finalized before any segment is
        // associated
        for cell in self.cells.iter_mut() {
            cell.clear();
        }
        for &(id, _) in &self.scratch {
            self.cells[id].increment_capacity();
        }
        let mut begin = 0;
        for cell in self.cells.iter_mut() {
            begin = cell.initialize(begin);
        }

        // Pass 2: fill
        self.slots.clear();
        self.slots.resize(self.scratch.len(), CellAtom::default());
        for k in 0..self.scratch.len() {
            let (id, entry) = self.scratch[k];
            let slot = self.cells[id].next_slot();
            self.slots[slot] = entry;
        }

        // Traversal sequence over non-empty local cells only
        self.local_sequence.clear();
        for cell in &self.cells {
            if !cell.is_ghost() && cell.n_atom() > 0 {
                self.local_sequence.push(cell.id());
            }
        }
    }

    // Fill `out` with the atoms of this cell (listed first) and of every
    // stencil cell that passes the double-count rule: ghost cells are
    // always taken, local cells only when their id exceeds the primary's,
    // so iterating over all local cells yields each interior pair once
    // and each boundary-crossing pair once from either side
    pub fn get_neighbors(&self, cell_id: usize, out: &mut Vec<CellAtom>) {
        out.clear();
        let cell = &self.cells[cell_id];
        assert!(!cell.is_ghost(), "Ghost cells are never primary cells");
        for k in 0..cell.n_atom() {
            out.push(self.slots[cell.begin() + k]);
        }
        for &(first, last) in self.offsets.strips() {
            for rel in first..=last {
                if rel == 0 {
                    continue; // the primary cell itself, already listed
                }
                let nid = (cell_id as isize + rel) as usize;
                let neighbor = &self.cells[nid];
                if neighbor.is_ghost() || neighbor.id() > cell.id() {
                    for k in 0..neighbor.n_atom() {
                        out.push(self.slots[neighbor.begin() + k]);
                    }
                }
            }
        }
        if out.len() > MAX_NEIGHBOR_ATOM {
            panic!(
                "Neighbor list overflow: {} atoms exceeds MAX_NEIGHBOR_ATOM = {}; \
                 reduce the pair cutoff or coarsen the grid",
                out.len(),
                MAX_NEIGHBOR_ATOM
            );
        }
    }

    pub fn local_cells(&self) -> &[usize] {
        &self.local_sequence
    }

    pub fn cell(&self, id: usize) -> &Cell {
        &self.cells[id]
    }

    pub fn grid_dims(&self) -> [usize; 3] {
        self.grid_dims
    }

    pub fn local_dims(&self) -> [usize; 3] {
        self.local_dims
    }

    pub fn n_cell_cut(&self) -> [usize; 3] {
        self.n_cell_cut
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    fn flatten(&self, ix: usize, iy: usize, iz: usize) -> usize {
        ix + self.grid_dims[0] * (iy + self.grid_dims[1] * iz)
    }

    fn is_local(&self, ix: usize, iy: usize, iz: usize) -> bool {
        (0..3).all(|j| {
            let p = [ix, iy, iz][j];
            p >= self.n_cell_cut[j] && p < self.n_cell_cut[j] + self.local_dims[j]
        })
    }

    // Padded cell id of a wrapped local coordinate in [0, 1)
    fn local_cell_id(&self, gen: Vector3<f64>) -> usize {
        let mut idx = [0usize; 3];
        for j in 0..3 {
            let c = ((gen[j] * self.local_dims[j] as f64).floor() as usize)
                .min(self.local_dims[j] - 1);
            idx[j] = c + self.n_cell_cut[j];
        }
        self.flatten(idx[0], idx[1], idx[2])
    }

    // Padded cell id of a ghost image; None when the image lies beyond
    // the padding shell, where no local stencil can reach it
    fn ghost_cell_id(&self, gen: Vector3<f64>) -> Option<usize> {
        let mut idx = [0usize; 3];
        for j in 0..3 {
            let c = (gen[j] * self.local_dims[j] as f64).floor() as isize;
            let p = c + self.n_cell_cut[j] as isize;
            if p < 0 || p >= self.grid_dims[j] as isize {
                return None;
            }
            idx[j] = p as usize;
        }
        Some(self.flatten(idx[0], idx[1], idx[2]))
    }
}
