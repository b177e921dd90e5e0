// cell.rs
// One spatial bin of the cell-list grid, plus the shared table of
// neighbor-cell offset strips
// Cells live in a flat arena owned by the CellList and are identified
// by integer id; the "pointer to the next cell" of a classic linked
// list becomes a precomputed sequence of ids held by the parent
use nalgebra::Vector3;

// Maximum possible number of atoms in this and neighboring cells
pub const MAX_NEIGHBOR_ATOM: usize = 2000;

// Maximum number of cells per cutoff length
pub const MAX_N_CELL_CUT: usize = 4;

// Maximum allowed number of neighbor-cell strips
pub const OFFSET_ARRAY_CAPACITY: usize =
    (2 * MAX_N_CELL_CUT + 1) * (2 * MAX_N_CELL_CUT + 1) + 3;

// Sentinel for a cell whose slot segment has not been associated yet
const UNSET: usize = usize::MAX;

// Handle to one atom as seen by the cell list. Rebuilt from scratch on
// every rebinning pass. Ghost entries carry the periodic-image position,
// so plain Euclidean differences between any two handles are valid
// separations with no further image logic
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellAtom {
    pub atom_id: usize,
    pub pos: Vector3<f64>,
    pub ghost: bool,
}

impl Default for CellAtom {
    fn default() -> CellAtom {
        CellAtom {
            atom_id: UNSET,
            pos: Vector3::zeros(),
            ghost: false,
        }
    }
}

// Strips of relative cell ids identifying the neighborhood of a primary
// cell. Each (first, last) pair is a contiguous run of flattened-grid
// offsets that could hold an atom within one cutoff of some point in
// the primary cell. Built once per grid geometry, shared read-only by
// every local cell
#[derive(Clone, Debug, Default)]
pub struct OffsetArray {
    strips: Vec<(isize, isize)>,
}

impl OffsetArray {
    pub fn new() -> OffsetArray {
        OffsetArray {
            strips: Vec::with_capacity(OFFSET_ARRAY_CAPACITY),
        }
    }

    pub fn clear(&mut self) {
        self.strips.clear();
    }

    pub fn append(&mut self, first: isize, last: isize) {
        if self.strips.len() >= OFFSET_ARRAY_CAPACITY {
            panic!(
                "Neighbor offset table overflow: more than {} strips; \
                 the grid is too fine for the cutoff",
                OFFSET_ARRAY_CAPACITY
            );
        }
        self.strips.push((first, last));
    }

    pub fn strips(&self) -> &[(isize, isize)] {
        &self.strips
    }
}

// One cell of the grid. Owns a contiguous segment [begin, begin + capacity)
// of the parent's shared CellAtom slot array once initialize() has run
#[derive(Clone, Debug, PartialEq)]
pub struct Cell {
    id: usize,
    begin: usize,
    n_atom: usize,
    capacity: usize,
    is_ghost: bool,
}

impl Cell {
    pub fn new(id: usize, is_ghost: bool) -> Cell {
        Cell {
            id,
            begin: UNSET,
            n_atom: 0,
            capacity: 0,
            is_ghost,
        }
    }

    // Reset to empty before a new round of capacity counting
    // Keeps the id and the ghost flag
    pub fn clear(&mut self) {
        self.begin = UNSET;
        self.n_atom = 0;
        self.capacity = 0;
    }

    // Must be called once per atom destined for this cell, and the whole
    // counting loop must finish before any cell is initialized
    pub fn increment_capacity(&mut self) {
        assert!(
            self.begin == UNSET,
            "Capacity counting must finish before slot segments are associated"
        );
        self.capacity += 1;
    }

    // Associate this cell with the slot segment starting at begin.
    // Returns the index one past the end of the segment, i.e. the begin
    // of the next cell
    pub fn initialize(&mut self, begin: usize) -> usize {
        assert!(self.begin == UNSET, "Cell initialized twice");
        assert_eq!(self.n_atom, 0);
        self.begin = begin;
        begin + self.capacity
    }

    // Claim the next free slot of the segment; the caller writes the
    // CellAtom into the parent's slot array at the returned index
    pub fn next_slot(&mut self) -> usize {
        assert!(self.begin != UNSET, "Cell must be initialized before filling");
        assert!(
            self.n_atom < self.capacity,
            "More atoms appended to cell {} than were counted",
            self.id
        );
        let slot = self.begin + self.n_atom;
        self.n_atom += 1;
        slot
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn n_atom(&self) -> usize {
        self.n_atom
    }

    pub fn atom_capacity(&self) -> usize {
        self.capacity
    }

    pub fn begin(&self) -> usize {
        self.begin
    }

    pub fn is_ghost(&self) -> bool {
        self.is_ghost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_protocol() {
        let mut cell = Cell::new(7, false);
        cell.increment_capacity();
        cell.increment_capacity();
        let end = cell.initialize(10);
        assert_eq!(end, 12);
        assert_eq!(cell.next_slot(), 10);
        assert_eq!(cell.next_slot(), 11);
        assert_eq!(cell.n_atom(), 2);
        assert_eq!(cell.atom_capacity(), 2);
    }

    #[test]
    #[should_panic(expected = "Capacity counting must finish")]
    fn count_after_initialize_is_fatal() {
        let mut cell = Cell::new(0, false);
        cell.increment_capacity();
        cell.initialize(0);
        cell.increment_capacity();
    }

    #[test]
    #[should_panic(expected = "More atoms appended")]
    fn overfill_is_fatal() {
        let mut cell = Cell::new(0, false);
        cell.increment_capacity();
        cell.initialize(0);
        cell.next_slot();
        cell.next_slot();
    }

    #[test]
    fn clear_keeps_identity() {
        let mut cell = Cell::new(3, true);
        cell.increment_capacity();
        cell.initialize(5);
        cell.clear();
        assert_eq!(cell.id(), 3);
        assert!(cell.is_ghost());
        assert_eq!(cell.n_atom(), 0);
        assert_eq!(cell.atom_capacity(), 0);
    }

    #[test]
    #[should_panic(expected = "offset table overflow")]
    fn offset_overflow_is_fatal() {
        let mut offsets = OffsetArray::new();
        for i in 0..(OFFSET_ARRAY_CAPACITY + 1) {
            offsets.append(i as isize, i as isize + 1);
        }
    }
}
