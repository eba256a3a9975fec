use crate::error::PlanError;
use crate::types::Coord;

const WORD_BITS: usize = 64;

/// A set of cells keyed by row-major index, one bit per cell.
///
/// Two sets built for the same grid compare and hash equal exactly when they
/// hold the same cells, so a `CellSet` doubles as the canonical key of a
/// placement.
#[derive(Debug, Clone, Default)]
pub struct CellSet {
    words: Vec<u64>,
}

impl CellSet {
    // trailing zero words depend on how the set was built, not on its content
    fn significant(&self) -> &[u64] {
        let end = self.words.iter().rposition(|&w| w != 0).map_or(0, |i| i + 1);
        &self.words[..end]
    }
}

impl PartialEq for CellSet {
    fn eq(&self, other: &Self) -> bool {
        self.significant() == other.significant()
    }
}

impl Eq for CellSet {}

impl std::hash::Hash for CellSet {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.significant().hash(state);
    }
}

impl CellSet {
    pub fn with_capacity(cells: usize) -> Self {
        Self {
            words: vec![0; cells.div_ceil(WORD_BITS)],
        }
    }

    #[inline]
    pub fn contains(&self, idx: usize) -> bool {
        self.words
            .get(idx / WORD_BITS)
            .is_some_and(|w| w & (1u64 << (idx % WORD_BITS)) != 0)
    }

    /// Returns `true` if the cell was not already present.
    #[inline]
    pub fn insert(&mut self, idx: usize) -> bool {
        let word = idx / WORD_BITS;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        let bit = 1u64 << (idx % WORD_BITS);
        let fresh = self.words[word] & bit == 0;
        self.words[word] |= bit;
        fresh
    }

    #[inline]
    pub fn remove(&mut self, idx: usize) {
        if let Some(w) = self.words.get_mut(idx / WORD_BITS) {
            *w &= !(1u64 << (idx % WORD_BITS));
        }
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    pub fn union_with(&mut self, other: &CellSet) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= b;
        }
    }

    pub fn intersection_len(&self, other: &CellSet) -> usize {
        self.words
            .iter()
            .zip(&other.words)
            .map(|(a, b)| (a & b).count_ones() as usize)
            .sum()
    }

    pub fn is_disjoint(&self, other: &CellSet) -> bool {
        self.words.iter().zip(&other.words).all(|(a, b)| a & b == 0)
    }

    /// Smallest index in the set.
    pub fn first(&self) -> Option<usize> {
        self.words
            .iter()
            .enumerate()
            .find(|(_, w)| **w != 0)
            .map(|(i, w)| i * WORD_BITS + w.trailing_zeros() as usize)
    }

    /// Indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &w)| {
            let mut rest = w;
            std::iter::from_fn(move || {
                if rest == 0 {
                    return None;
                }
                let bit = rest.trailing_zeros() as usize;
                rest &= rest - 1;
                Some(i * WORD_BITS + bit)
            })
        })
    }
}

impl FromIterator<usize> for CellSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = CellSet::default();
        for idx in iter {
            set.insert(idx);
        }
        set
    }
}

/// The immutable board: dimensions, physical cell size and circulation.
///
/// Public queries take `Coord` and reject anything outside the grid; the
/// search works on row-major indices through the `pub(crate)` helpers.
#[derive(Debug, Clone)]
pub struct Grid {
    width: u32,
    height: u32,
    cell_size: (f64, f64),
    circulation: CellSet,
    circulation_adjacent: CellSet,
    boundary: CellSet,
}

impl Grid {
    pub fn new(
        width: u32,
        height: u32,
        cell_size: (f64, f64),
        circulation: &[Coord],
    ) -> Result<Self, PlanError> {
        if width == 0 {
            return Err(PlanError::invalid("width", "must be positive"));
        }
        if height == 0 {
            return Err(PlanError::invalid("height", "must be positive"));
        }
        let (cw, ch) = cell_size;
        if !(cw > 0.0 && ch > 0.0 && cw.is_finite() && ch.is_finite()) {
            return Err(PlanError::invalid(
                "cell_size",
                format!("must be two positive numbers, got {:?}", cell_size),
            ));
        }

        let cell_count = width as usize * height as usize;
        let mut circ = CellSet::with_capacity(cell_count);
        for (i, c) in circulation.iter().enumerate() {
            if c.x >= width || c.y >= height {
                return Err(PlanError::invalid(
                    format!("circulation[{i}]"),
                    format!("{c} is outside the {width}x{height} grid"),
                ));
            }
            if !circ.insert(linear_index(*c, width)) {
                return Err(PlanError::invalid(
                    format!("circulation[{i}]"),
                    format!("{c} is listed more than once"),
                ));
            }
        }

        let mut grid = Self {
            width,
            height,
            cell_size,
            circulation: circ,
            circulation_adjacent: CellSet::with_capacity(cell_count),
            boundary: CellSet::with_capacity(cell_count),
        };

        for idx in 0..cell_count {
            if grid.circulation.contains(idx) {
                continue;
            }
            if grid.neighbor_indices(idx).any(|n| grid.circulation.contains(n)) {
                grid.circulation_adjacent.insert(idx);
            }
            let c = grid.coord_of(idx);
            if c.x == 0 || c.y == 0 || c.x == width - 1 || c.y == height - 1 {
                grid.boundary.insert(idx);
            }
        }

        Ok(grid)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn cell_size(&self) -> (f64, f64) {
        self.cell_size
    }

    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn free_cell_count(&self) -> usize {
        self.cell_count() - self.circulation.len()
    }

    pub fn circulation_coords(&self) -> Vec<Coord> {
        self.circulation.iter().map(|i| self.coord_of(i)).collect()
    }

    fn check(&self, c: Coord) -> Result<usize, PlanError> {
        if c.x >= self.width || c.y >= self.height {
            return Err(PlanError::OutOfBounds {
                coord: c,
                width: self.width,
                height: self.height,
            });
        }
        Ok(self.index_of(c))
    }

    /// A free cell is any cell that is not circulation; occupancy by
    /// placements is tracked by the solver, not the grid.
    pub fn is_free(&self, c: Coord) -> Result<bool, PlanError> {
        self.check(c).map(|i| !self.circulation.contains(i))
    }

    pub fn is_circulation(&self, c: Coord) -> Result<bool, PlanError> {
        self.check(c).map(|i| self.circulation.contains(i))
    }

    pub fn is_on_boundary(&self, c: Coord) -> Result<bool, PlanError> {
        self.check(c)?;
        Ok(c.x == 0 || c.y == 0 || c.x == self.width - 1 || c.y == self.height - 1)
    }

    /// In-bounds 4-neighbours in the order up, left, right, down.
    pub fn neighbors4(&self, c: Coord) -> Result<Vec<Coord>, PlanError> {
        let idx = self.check(c)?;
        Ok(self.neighbor_indices(idx).map(|n| self.coord_of(n)).collect())
    }

    /// Converts a coordinate list into a cell set, rejecting anything outside the grid.
    pub fn cell_set(&self, cells: &[Coord]) -> Result<CellSet, PlanError> {
        let mut set = CellSet::with_capacity(self.cell_count());
        for &c in cells {
            set.insert(self.check(c)?);
        }
        Ok(set)
    }

    pub(crate) fn index_of(&self, c: Coord) -> usize {
        linear_index(c, self.width)
    }

    pub(crate) fn coord_of(&self, idx: usize) -> Coord {
        let w = self.width as usize;
        Coord::new((idx % w) as u32, (idx / w) as u32)
    }

    /// Neighbours in ascending index order (up, left, right, down).
    pub(crate) fn neighbor_indices(&self, idx: usize) -> impl Iterator<Item = usize> + use<> {
        let w = self.width as usize;
        let h = self.height as usize;
        let (x, y) = (idx % w, idx / w);
        let up = (y > 0).then(|| idx - w);
        let left = (x > 0).then(|| idx - 1);
        let right = (x + 1 < w).then(|| idx + 1);
        let down = (y + 1 < h).then(|| idx + w);
        [up, left, right, down].into_iter().flatten()
    }

    pub(crate) fn circulation(&self) -> &CellSet {
        &self.circulation
    }

    pub(crate) fn circulation_adjacent(&self) -> &CellSet {
        &self.circulation_adjacent
    }

    pub(crate) fn boundary(&self) -> &CellSet {
        &self.boundary
    }
}

fn linear_index(c: Coord, width: u32) -> usize {
    c.y as usize * width as usize + c.x as usize
}
