//! Placement legality and shape measures.
//!
//! Every predicate is total over any `CellSet` built for the grid it is
//! checked against.

use std::collections::{BTreeMap, VecDeque};

use crate::grid::{CellSet, Grid};
use crate::types::{ApartmentType, ShapeDescriptors};

/// Minimum number of boundary cells per apartment type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FacadeTable {
    minimums: BTreeMap<ApartmentType, u32>,
}

impl FacadeTable {
    /// An N-room apartment needs N facade cells.
    pub fn standard() -> Self {
        let mut table = Self::default();
        for kind in ApartmentType::ALL {
            table.set(kind, kind.rooms());
        }
        table
    }

    pub fn set(&mut self, kind: ApartmentType, minimum: u32) {
        self.minimums.insert(kind, minimum);
    }

    pub fn with(mut self, kind: ApartmentType, minimum: u32) -> Self {
        self.set(kind, minimum);
        self
    }

    pub fn minimum(&self, kind: ApartmentType) -> Option<u32> {
        self.minimums.get(&kind).copied()
    }
}

/// The rules a candidate cell set has to pass to become a placement.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementRules {
    pub facade: FacadeTable,
    /// Upper bound on corridor-like cells per apartment, see [`enfilade_count`].
    pub max_enfilade: Option<u32>,
}

impl Default for PlacementRules {
    fn default() -> Self {
        Self {
            facade: FacadeTable::standard(),
            max_enfilade: None,
        }
    }
}

impl PlacementRules {
    /// Full legality check: connected, clear of circulation, touching
    /// circulation, facade minimum met and enfilade limit respected.
    /// A type missing from the facade table is never legal.
    pub fn is_legal(&self, grid: &Grid, cells: &CellSet, kind: ApartmentType) -> bool {
        cells.is_disjoint(grid.circulation())
            && is_connected(grid, cells)
            && touches_circulation(cells, grid)
            && meets_facade_minimum(cells, grid, &self.facade, kind)
            && self
                .max_enfilade
                .is_none_or(|max| enfilade_count(grid, cells) <= max)
    }
}

/// Single 4-connected component. The empty set is not connected.
pub fn is_connected(grid: &Grid, cells: &CellSet) -> bool {
    let Some(start) = cells.first() else {
        return false;
    };
    let mut seen = CellSet::with_capacity(grid.cell_count());
    seen.insert(start);
    let mut queue = VecDeque::from([start]);
    let mut reached = 1;
    while let Some(idx) = queue.pop_front() {
        for n in grid.neighbor_indices(idx) {
            if cells.contains(n) && seen.insert(n) {
                reached += 1;
                queue.push_back(n);
            }
        }
    }
    reached == cells.len()
}

pub fn touches_circulation(cells: &CellSet, grid: &Grid) -> bool {
    !cells.is_disjoint(grid.circulation_adjacent())
}

pub fn facade_count(cells: &CellSet, grid: &Grid) -> u32 {
    cells.intersection_len(grid.boundary()) as u32
}

pub fn meets_facade_minimum(
    cells: &CellSet,
    grid: &Grid,
    table: &FacadeTable,
    kind: ApartmentType,
) -> bool {
    table
        .minimum(kind)
        .is_some_and(|min| facade_count(cells, grid) >= min)
}

/// Cells with exactly two neighbours in the set, both on the same axis:
/// the middle of a one-cell-wide run.
pub fn enfilade_count(grid: &Grid, cells: &CellSet) -> u32 {
    let w = grid.width() as usize;
    cells
        .iter()
        .filter(|&idx| {
            let inside: Vec<usize> = grid
                .neighbor_indices(idx)
                .filter(|&n| cells.contains(n))
                .collect();
            match inside.as_slice() {
                [a, b] => {
                    let same_row = a / w == b / w;
                    let same_col = a % w == b % w;
                    same_row || same_col
                }
                _ => false,
            }
        })
        .count() as u32
}

/// Number of internal edges shared by two cells of the set.
pub fn compactness(grid: &Grid, cells: &CellSet) -> f64 {
    let w = grid.width() as usize;
    let shared: usize = cells
        .iter()
        .map(|idx| {
            let right = idx % w + 1 < w && cells.contains(idx + 1);
            let down = cells.contains(idx + w);
            right as usize + down as usize
        })
        .sum();
    shared as f64
}

pub fn shape_descriptors(grid: &Grid, cells: &CellSet) -> ShapeDescriptors {
    let coords: Vec<(f64, f64)> = cells
        .iter()
        .map(|i| {
            let c = grid.coord_of(i);
            (c.x as f64, c.y as f64)
        })
        .collect();
    if coords.is_empty() {
        return ShapeDescriptors {
            aspect_ratio: 1.0,
            normalized_perimeter: 0.0,
            moment_ratio: 1.0,
        };
    }

    let (mut min_x, mut max_x) = (f64::MAX, f64::MIN);
    let (mut min_y, mut max_y) = (f64::MAX, f64::MIN);
    for &(x, y) in &coords {
        min_x = min_x.min(x);
        max_x = max_x.max(x);
        min_y = min_y.min(y);
        max_y = max_y.max(y);
    }
    let bw = max_x - min_x + 1.0;
    let bh = max_y - min_y + 1.0;
    let aspect_ratio = bw.max(bh) / bw.min(bh);

    let area = coords.len() as f64;
    // every cell has four sides; each shared edge hides two of them
    let perimeter = 4.0 * area - 2.0 * compactness(grid, cells);
    let normalized_perimeter = perimeter / area;

    let cx = coords.iter().map(|c| c.0).sum::<f64>() / area;
    let cy = coords.iter().map(|c| c.1).sum::<f64>() / area;
    let ixx: f64 = coords.iter().map(|c| (c.1 - cy).powi(2)).sum();
    let iyy: f64 = coords.iter().map(|c| (c.0 - cx).powi(2)).sum();
    let moment_ratio = if ixx.max(iyy) == 0.0 {
        1.0
    } else {
        ixx.max(iyy) / ixx.min(iyy).max(1e-6)
    };

    ShapeDescriptors {
        aspect_ratio,
        normalized_perimeter,
        moment_ratio,
    }
}

/// Mean of the population variances of the three descriptors. Zero when all
/// shapes are alike (or there is at most one).
pub fn shape_variance(shapes: &[ShapeDescriptors]) -> f64 {
    if shapes.len() <= 1 {
        return 0.0;
    }
    let n = shapes.len() as f64;
    let variance = |values: Vec<f64>| {
        let mean = values.iter().sum::<f64>() / n;
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
    };
    let aspect = variance(shapes.iter().map(|s| s.aspect_ratio).collect());
    let perimeter = variance(shapes.iter().map(|s| s.normalized_perimeter).collect());
    let moment = variance(shapes.iter().map(|s| s.moment_ratio).collect());
    (aspect + perimeter + moment) / 3.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Coord;

    fn grid(w: u32, h: u32, circ: &[(u32, u32)]) -> Grid {
        let circ: Vec<Coord> = circ.iter().map(|&c| c.into()).collect();
        Grid::new(w, h, (1.0, 1.0), &circ).unwrap()
    }

    fn cells(g: &Grid, coords: &[(u32, u32)]) -> CellSet {
        let coords: Vec<Coord> = coords.iter().map(|&c| c.into()).collect();
        g.cell_set(&coords).unwrap()
    }

    #[test]
    fn test_connectivity() {
        let g = grid(4, 4, &[]);
        assert!(is_connected(&g, &cells(&g, &[(0, 0), (1, 0), (1, 1)])));
        // diagonal contact does not count
        assert!(!is_connected(&g, &cells(&g, &[(0, 0), (1, 1)])));
        assert!(!is_connected(&g, &cells(&g, &[(0, 0), (3, 0)])));
        assert!(is_connected(&g, &cells(&g, &[(2, 2)])));
        assert!(!is_connected(&g, &CellSet::with_capacity(16)));
    }

    #[test]
    fn test_connectivity_does_not_wrap_rows() {
        // index 3 and 4 are consecutive but (3,0) and (0,1) are not adjacent
        let g = grid(4, 2, &[]);
        assert!(!is_connected(&g, &cells(&g, &[(3, 0), (0, 1)])));
    }

    #[test]
    fn test_circulation_contact() {
        let g = grid(4, 1, &[(2, 0)]);
        assert!(touches_circulation(&cells(&g, &[(3, 0)]), &g));
        assert!(touches_circulation(&cells(&g, &[(0, 0), (1, 0)]), &g));
        assert!(!touches_circulation(&cells(&g, &[(0, 0)]), &g));
    }

    #[test]
    fn test_facade_count() {
        let g = grid(4, 4, &[]);
        assert_eq!(facade_count(&cells(&g, &[(1, 1), (2, 1), (2, 2)]), &g), 0);
        assert_eq!(facade_count(&cells(&g, &[(0, 0), (1, 0), (1, 1)]), &g), 2);
        assert_eq!(facade_count(&cells(&g, &[(3, 3), (3, 2)]), &g), 2);
    }

    #[test]
    fn test_facade_minimum_uses_table() {
        let g = grid(4, 1, &[(2, 0)]);
        let pair = cells(&g, &[(0, 0), (1, 0)]);
        let table = FacadeTable::standard();
        assert!(meets_facade_minimum(&pair, &g, &table, ApartmentType::TwoRoom));
        assert!(!meets_facade_minimum(&pair, &g, &table, ApartmentType::ThreeRoom));
        let sparse = FacadeTable::default().with(ApartmentType::FourRoom, 0);
        assert!(!meets_facade_minimum(&pair, &g, &sparse, ApartmentType::TwoRoom));
        assert!(meets_facade_minimum(&pair, &g, &sparse, ApartmentType::FourRoom));
    }

    #[test]
    fn test_enfilade() {
        let g = grid(5, 5, &[]);
        let line = cells(&g, &[(0, 0), (1, 0), (2, 0), (3, 0)]);
        assert_eq!(enfilade_count(&g, &line), 2);
        let block = cells(&g, &[(0, 0), (1, 0), (0, 1), (1, 1)]);
        assert_eq!(enfilade_count(&g, &block), 0);
        let ell = cells(&g, &[(0, 0), (0, 1), (1, 1)]);
        assert_eq!(enfilade_count(&g, &ell), 0);
    }

    #[test]
    fn test_compactness_counts_shared_edges() {
        let g = grid(4, 4, &[]);
        assert_eq!(compactness(&g, &cells(&g, &[(0, 0), (1, 0), (0, 1), (1, 1)])), 4.0);
        assert_eq!(compactness(&g, &cells(&g, &[(0, 0), (1, 0), (2, 0)])), 2.0);
        // right edge of the grid does not link to the next row
        assert_eq!(compactness(&g, &cells(&g, &[(3, 0), (0, 1)])), 0.0);
    }

    #[test]
    fn test_shape_descriptors() {
        let g = grid(6, 6, &[]);
        let square = shape_descriptors(&g, &cells(&g, &[(0, 0), (1, 0), (0, 1), (1, 1)]));
        assert_eq!(square.aspect_ratio, 1.0);
        assert_eq!(square.normalized_perimeter, 2.0);
        assert_eq!(square.moment_ratio, 1.0);

        let bar = shape_descriptors(&g, &cells(&g, &[(0, 0), (1, 0), (2, 0), (3, 0)]));
        assert_eq!(bar.aspect_ratio, 4.0);
        assert_eq!(bar.normalized_perimeter, 2.5);
        assert!(bar.moment_ratio > 1e5);

        let single = shape_descriptors(&g, &cells(&g, &[(2, 2)]));
        assert_eq!(single.moment_ratio, 1.0);
    }

    #[test]
    fn test_shape_variance() {
        let g = grid(6, 6, &[]);
        let a = shape_descriptors(&g, &cells(&g, &[(0, 0), (1, 0), (0, 1), (1, 1)]));
        let b = shape_descriptors(&g, &cells(&g, &[(4, 4), (5, 4), (4, 5), (5, 5)]));
        let c = shape_descriptors(&g, &cells(&g, &[(0, 3), (1, 3), (2, 3), (3, 3)]));
        assert_eq!(shape_variance(&[a]), 0.0);
        assert_eq!(shape_variance(&[a, b]), 0.0);
        assert!(shape_variance(&[a, c]) > 0.0);
    }

    #[test]
    fn test_rules_reject_circulation_and_enfilade() {
        let g = grid(5, 2, &[(2, 1)]);
        let rules = PlacementRules {
            facade: FacadeTable::default().with(ApartmentType::OneRoom, 0),
            max_enfilade: Some(0),
        };
        let with_circ = cells(&g, &[(2, 0), (2, 1)]);
        assert!(!rules.is_legal(&g, &with_circ, ApartmentType::OneRoom));
        let corner = cells(&g, &[(1, 0), (1, 1), (0, 1)]);
        assert!(rules.is_legal(&g, &corner, ApartmentType::OneRoom));
        let run = cells(&g, &[(0, 0), (1, 0), (2, 0)]);
        assert!(!rules.is_legal(&g, &run, ApartmentType::OneRoom));
    }
}
