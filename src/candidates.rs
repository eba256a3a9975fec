//! Lazy enumeration of legal placements for one demand.
//!
//! Sets are grown from seeds (free cells next to circulation) with
//! Redelmeier's method: each growth frame keeps an "untried" stack of
//! frontier cells, and a cell that has been tried at a level stays marked for
//! its later siblings, so every connected set containing the seed is reached
//! exactly once. Earlier seeds stay marked while later seeds grow, which
//! removes sets already produced from an earlier seed. No set is yielded
//! twice and no seen-set is needed.

use crate::constraints::PlacementRules;
use crate::grid::{CellSet, Grid};
use crate::types::{ApartmentType, Demand};

struct Frame {
    untried: Vec<usize>,
    /// Neighbours marked when the cell taken from this frame was pushed onto
    /// the partial set; `None` while nothing from this frame is in it.
    chosen: Option<Vec<usize>>,
}

/// Candidate placements for one demand against an occupancy snapshot.
///
/// The snapshot is owned and frozen at construction; the iterator is single
/// pass. Order is deterministic: seeds by ascending cell index, then growth
/// order.
pub struct Candidates<'a> {
    grid: &'a Grid,
    rules: &'a PlacementRules,
    kind: ApartmentType,
    target: usize,
    min_facade: Option<u32>,
    blocked: CellSet,
    seeds: Vec<usize>,
    next_seed: usize,
    marked: CellSet,
    current: Vec<usize>,
    current_facade: u32,
    stack: Vec<Frame>,
}

impl<'a> Candidates<'a> {
    /// `occupied` must contain every cell unavailable to this demand,
    /// circulation included.
    pub fn new(grid: &'a Grid, occupied: CellSet, demand: &Demand, rules: &'a PlacementRules) -> Self {
        let mut candidates = Self {
            grid,
            rules,
            kind: demand.kind,
            target: demand.cells as usize,
            min_facade: rules.facade.minimum(demand.kind),
            blocked: occupied,
            seeds: Vec::new(),
            next_seed: 0,
            marked: CellSet::with_capacity(grid.cell_count()),
            current: Vec::with_capacity(demand.cells as usize),
            current_facade: 0,
            stack: Vec::new(),
        };
        candidates.reseed();
        candidates
    }

    /// Restricts output to sets whose cells all have an index above `floor`.
    pub fn above(mut self, floor: usize) -> Self {
        for idx in 0..=floor.min(self.grid.cell_count().saturating_sub(1)) {
            self.blocked.insert(idx);
        }
        self.reseed();
        self
    }

    fn reseed(&mut self) {
        self.seeds = self
            .grid
            .circulation_adjacent()
            .iter()
            .filter(|&i| !self.blocked.contains(i))
            .collect();
        self.next_seed = 0;
    }

    fn start_next_seed(&mut self) -> bool {
        if self.target == 0 || self.min_facade.is_none() {
            return false;
        }
        let Some(&seed) = self.seeds.get(self.next_seed) else {
            return false;
        };
        self.next_seed += 1;
        self.marked.insert(seed);
        self.stack.push(Frame {
            untried: vec![seed],
            chosen: None,
        });
        true
    }

    fn is_open(&self, idx: usize) -> bool {
        !self.blocked.contains(idx) && !self.grid.circulation().contains(idx)
    }

    fn pop_current(&mut self) {
        if let Some(cell) = self.current.pop()
            && self.grid.boundary().contains(cell)
        {
            self.current_facade -= 1;
        }
    }

    fn current_set(&self) -> CellSet {
        let mut set = CellSet::with_capacity(self.grid.cell_count());
        for &idx in &self.current {
            set.insert(idx);
        }
        set
    }
}

impl Iterator for Candidates<'_> {
    type Item = CellSet;

    fn next(&mut self) -> Option<CellSet> {
        let min_facade = self.min_facade?;
        loop {
            let Some(frame) = self.stack.last_mut() else {
                if !self.start_next_seed() {
                    return None;
                }
                continue;
            };

            if let Some(added) = frame.chosen.take() {
                for n in added {
                    self.marked.remove(n);
                }
                self.pop_current();
                continue;
            }

            let Some(cell) = frame.untried.pop() else {
                self.stack.pop();
                continue;
            };
            let mut untried = frame.untried.clone();
            frame.chosen = Some(Vec::new());

            self.current.push(cell);
            if self.grid.boundary().contains(cell) {
                self.current_facade += 1;
            }
            let remaining = self.target - self.current.len();

            // even an all-boundary completion cannot reach the facade minimum
            if self.current_facade + (remaining as u32) < min_facade {
                continue;
            }

            if remaining == 0 {
                let set = self.current_set();
                if self.rules.is_legal(self.grid, &set, self.kind) {
                    return Some(set);
                }
                continue;
            }

            let mut added = Vec::new();
            for n in self.grid.neighbor_indices(cell) {
                if self.is_open(n) && self.marked.insert(n) {
                    added.push(n);
                }
            }
            // popped from the back, so the lowest index is tried first
            untried.extend(added.iter().rev());
            if let Some(frame) = self.stack.last_mut() {
                frame.chosen = Some(added);
            }
            self.stack.push(Frame {
                untried,
                chosen: None,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{FacadeTable, is_connected, touches_circulation};
    use crate::types::Coord;
    use std::collections::HashSet;

    fn grid(w: u32, h: u32, circ: &[(u32, u32)]) -> Grid {
        let circ: Vec<Coord> = circ.iter().map(|&c| c.into()).collect();
        Grid::new(w, h, (1.0, 1.0), &circ).unwrap()
    }

    fn no_facade_rules() -> PlacementRules {
        let mut facade = FacadeTable::default();
        for kind in ApartmentType::ALL {
            facade.set(kind, 0);
        }
        PlacementRules {
            facade,
            max_enfilade: None,
        }
    }

    fn circulation_only(g: &Grid) -> CellSet {
        g.circulation().clone()
    }

    fn coords(g: &Grid, set: &CellSet) -> Vec<Coord> {
        set.iter().map(|i| g.coord_of(i)).collect()
    }

    #[test]
    fn test_single_row_pairs() {
        let g = grid(4, 1, &[(2, 0)]);
        let rules = PlacementRules::default();
        let demand = Demand::new("2-room", 2).unwrap();
        let found: Vec<Vec<Coord>> = Candidates::new(&g, circulation_only(&g), &demand, &rules)
            .map(|s| coords(&g, &s))
            .collect();
        assert_eq!(found, vec![vec![Coord::new(0, 0), Coord::new(1, 0)]]);
    }

    #[test]
    fn test_counts_match_fixed_polyominoes() {
        // an open 5x5 with circulation in the middle: every domino/tromino
        // touching the centre must appear exactly once
        let g = grid(5, 5, &[(2, 2)]);
        let rules = no_facade_rules();
        for (size, label) in [(1, "1-room"), (2, "2-room"), (3, "3-room"), (4, "4-room")] {
            let demand = Demand::new(label, size).unwrap();
            let all: Vec<CellSet> =
                Candidates::new(&g, circulation_only(&g), &demand, &rules).collect();
            let unique: HashSet<CellSet> = all.iter().cloned().collect();
            assert_eq!(all.len(), unique.len(), "duplicates for size {size}");
            for set in &all {
                assert_eq!(set.len(), size as usize);
                assert!(is_connected(&g, set));
                assert!(touches_circulation(set, &g));
                assert!(!set.contains(12));
            }
            let brute = brute_force(&g, size as usize);
            assert_eq!(unique, brute, "size {size}");
        }
    }

    /// All connected, circulation-touching subsets of the free cells of the given size.
    fn brute_force(g: &Grid, size: usize) -> HashSet<CellSet> {
        let free: Vec<usize> = (0..g.cell_count())
            .filter(|i| !g.circulation().contains(*i))
            .collect();
        let mut out = HashSet::new();
        let mut pick = Vec::new();
        fn rec(g: &Grid, free: &[usize], start: usize, size: usize, pick: &mut Vec<usize>, out: &mut HashSet<CellSet>) {
            if pick.len() == size {
                let mut set = CellSet::with_capacity(g.cell_count());
                for &i in pick.iter() {
                    set.insert(i);
                }
                if is_connected(g, &set) && touches_circulation(&set, g) {
                    out.insert(set);
                }
                return;
            }
            for k in start..free.len() {
                pick.push(free[k]);
                rec(g, free, k + 1, size, pick, out);
                pick.pop();
            }
        }
        rec(g, &free, 0, size, &mut pick, &mut out);
        out
    }

    #[test]
    fn test_respects_occupied_cells() {
        let g = grid(4, 2, &[(0, 0)]);
        let rules = no_facade_rules();
        let mut occupied = circulation_only(&g);
        occupied.insert(g.index_of(Coord::new(1, 0)));
        let demand = Demand::new("2-room", 2).unwrap();
        for set in Candidates::new(&g, occupied, &demand, &rules) {
            assert!(!set.contains(g.index_of(Coord::new(1, 0))));
        }
    }

    #[test]
    fn test_empty_without_circulation() {
        let g = grid(3, 3, &[]);
        let rules = no_facade_rules();
        let demand = Demand::new("2-room", 2).unwrap();
        assert_eq!(Candidates::new(&g, CellSet::default(), &demand, &rules).count(), 0);
    }

    #[test]
    fn test_too_large_for_free_area() {
        let g = grid(2, 2, &[(0, 0)]);
        let rules = no_facade_rules();
        let demand = Demand::new("2-room", 4).unwrap();
        assert_eq!(Candidates::new(&g, circulation_only(&g), &demand, &rules).count(), 0);
    }

    #[test]
    fn test_missing_facade_entry_yields_nothing() {
        let g = grid(4, 1, &[(2, 0)]);
        let rules = PlacementRules {
            facade: FacadeTable::default(),
            max_enfilade: None,
        };
        let demand = Demand::new("2-room", 2).unwrap();
        assert_eq!(Candidates::new(&g, circulation_only(&g), &demand, &rules).count(), 0);
    }

    #[test]
    fn test_facade_minimum_filters() {
        let g = grid(5, 5, &[(2, 2)]);
        let rules = PlacementRules::default();
        let demand = Demand::new("2-room", 3).unwrap();
        let all: Vec<CellSet> = Candidates::new(&g, circulation_only(&g), &demand, &rules).collect();
        assert!(!all.is_empty());
        for set in &all {
            assert!(set.intersection_len(g.boundary()) >= 2);
        }
    }

    #[test]
    fn test_deterministic_order() {
        let g = grid(6, 4, &[(2, 0), (2, 1), (2, 2), (2, 3)]);
        let rules = PlacementRules::default();
        let demand = Demand::new("3-room", 5).unwrap();
        let a: Vec<CellSet> = Candidates::new(&g, circulation_only(&g), &demand, &rules).collect();
        let b: Vec<CellSet> = Candidates::new(&g, circulation_only(&g), &demand, &rules).collect();
        assert!(!a.is_empty());
        assert_eq!(a, b);
    }

    #[test]
    fn test_above_floor() {
        let g = grid(5, 5, &[(2, 2)]);
        let rules = no_facade_rules();
        let demand = Demand::new("2-room", 2).unwrap();
        let all = Candidates::new(&g, circulation_only(&g), &demand, &rules).count();
        let floor = 7;
        let above: Vec<CellSet> = Candidates::new(&g, circulation_only(&g), &demand, &rules)
            .above(floor)
            .collect();
        assert!(above.len() < all);
        assert!(above.iter().all(|s| s.first().is_some_and(|f| f > floor)));
    }
}
