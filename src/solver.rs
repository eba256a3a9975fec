use std::cmp::Reverse;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::candidates::Candidates;
use crate::constraints::{self, PlacementRules};
use crate::error::PlanError;
use crate::grid::{CellSet, Grid};
use crate::ranking::{self, Ranking};
use crate::types::{CellLabel, Demand, Placement, Solution};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemandOrder {
    /// Place demands in the order given.
    #[default]
    Input,
    /// Stable sort by cell count, largest first.
    LargestFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateOrder {
    /// Generator order, consumed lazily.
    #[default]
    Discovery,
    /// All candidates collected first, most compact first (stable).
    Compactness,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    pub demand_order: DemandOrder,
    pub candidate_order: CandidateOrder,
    /// Skip relabelled copies of a layout when consecutive demands are
    /// interchangeable.
    pub break_symmetry: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            demand_order: DemandOrder::Input,
            candidate_order: CandidateOrder::Discovery,
            break_symmetry: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Limits {
    /// The search stops as soon as this many complete layouts were found.
    pub max_raw_solutions: usize,
    /// Size of the ranked output.
    pub max_solutions: usize,
    /// Candidates tried per demand in each branch.
    pub max_placement_tries: Option<usize>,
    /// Candidate attempts before the search is abandoned.
    pub max_steps: Option<u64>,
    pub time_limit: Option<Duration>,
}

impl Limits {
    pub fn new(max_solutions: usize) -> Self {
        Self {
            max_raw_solutions: max_solutions.saturating_mul(200),
            max_solutions,
            max_placement_tries: None,
            max_steps: None,
            time_limit: None,
        }
    }

    fn validate(&self) -> Result<(), PlanError> {
        if self.max_solutions == 0 {
            return Err(PlanError::invalid("limits.max_solutions", "must be positive"));
        }
        if self.max_raw_solutions == 0 {
            return Err(PlanError::invalid("limits.max_raw_solutions", "must be positive"));
        }
        if self.max_placement_tries == Some(0) {
            return Err(PlanError::invalid("limits.max_placement_tries", "must be positive"));
        }
        Ok(())
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::new(10)
    }
}

#[derive(Debug, Clone)]
pub enum Outcome {
    Solved(Vec<Solution>),
    /// The search space (or the raw cap) was exhausted without a complete layout.
    NoSolutionFound,
    /// The step or time budget ran out; carries whatever was ranked from the
    /// layouts found before that.
    SearchAborted(Vec<Solution>),
}

impl Outcome {
    pub fn solutions(&self) -> &[Solution] {
        match self {
            Outcome::Solved(s) | Outcome::SearchAborted(s) => s,
            Outcome::NoSolutionFound => &[],
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Outcome::Solved(_) => "solved",
            Outcome::NoSolutionFound => "no_solution",
            Outcome::SearchAborted(_) => "aborted",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    /// Candidate placements tried.
    pub steps: u64,
    /// Legal candidates produced by the generator, tried or not.
    pub candidates_generated: u64,
    pub raw_solutions: usize,
    pub elapsed_ms: u64,
    pub aborted: bool,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub outcome: Outcome,
    pub stats: SearchStats,
}

/// Complete layouts in discovery order, before ranking.
#[derive(Debug, Clone)]
pub struct RawSearch {
    pub solutions: Vec<Solution>,
    pub stats: SearchStats,
}

enum Pending<'a> {
    Lazy(Candidates<'a>),
    Ranked(std::vec::IntoIter<CellSet>),
}

impl Iterator for Pending<'_> {
    type Item = CellSet;

    fn next(&mut self) -> Option<CellSet> {
        match self {
            Pending::Lazy(c) => c.next(),
            Pending::Ranked(c) => c.next(),
        }
    }
}

/// One level of the explicit search stack: the occupancy every candidate at
/// this level is placed against, and the candidates still to try.
struct Level<'a> {
    occupied: CellSet,
    pending: Pending<'a>,
    tried: usize,
}

pub struct Solver<'a> {
    grid: &'a Grid,
    demands: Vec<Demand>,
    rules: PlacementRules,
    limits: Limits,
    options: SearchOptions,
    ranking: Ranking,
}

impl<'a> Solver<'a> {
    pub fn new(
        grid: &'a Grid,
        demands: Vec<Demand>,
        rules: PlacementRules,
        limits: Limits,
    ) -> Result<Self, PlanError> {
        limits.validate()?;
        for (i, d) in demands.iter().enumerate() {
            if d.cells == 0 {
                return Err(PlanError::invalid(
                    format!("apartments[{i}].cells"),
                    "must be positive",
                ));
            }
            if rules.facade.minimum(d.kind).is_none() {
                return Err(PlanError::invalid(
                    "min_facade",
                    format!("no facade minimum for '{}' ({})", d.label, d.kind),
                ));
            }
        }
        Ok(Self {
            grid,
            demands,
            rules,
            limits,
            options: SearchOptions::default(),
            ranking: Ranking::default(),
        })
    }

    pub fn with_options(mut self, options: SearchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_ranking(mut self, ranking: Ranking) -> Result<Self, PlanError> {
        ranking.validate()?;
        self.ranking = ranking;
        Ok(self)
    }

    /// Demands in the order they are placed; placement `k` (1-based id)
    /// satisfies `ordered_demands()[k - 1]`.
    pub fn ordered_demands(&self) -> Vec<Demand> {
        let mut ordered = self.demands.clone();
        if self.options.demand_order == DemandOrder::LargestFirst {
            ordered.sort_by_key(|d| Reverse(d.cells));
        }
        ordered
    }

    pub fn solve(&self) -> SearchResult {
        let raw = self.search();
        let ranked = ranking::select(raw.solutions, &self.ranking, self.limits.max_solutions);
        let outcome = if raw.stats.aborted {
            Outcome::SearchAborted(ranked)
        } else if ranked.is_empty() {
            Outcome::NoSolutionFound
        } else {
            Outcome::Solved(ranked)
        };
        SearchResult {
            outcome,
            stats: raw.stats,
        }
    }

    /// Depth-first search over the ordered demands. Each level owns the
    /// occupancy it was opened with, so backtracking is just popping levels.
    pub fn search(&self) -> RawSearch {
        let start = Instant::now();
        let demands = self.ordered_demands();
        let mut stats = SearchStats::default();
        let mut raw: Vec<Solution> = Vec::new();

        let demanded: usize = demands.iter().map(|d| d.cells as usize).sum();
        tracing::info!(
            demands = demands.len(),
            demanded_cells = demanded,
            free_cells = self.grid.free_cell_count(),
            "starting placement search"
        );

        if demanded > self.grid.free_cell_count() {
            tracing::info!("demanded area exceeds free area, nothing to search");
            stats.elapsed_ms = start.elapsed().as_millis() as u64;
            return RawSearch {
                solutions: raw,
                stats,
            };
        }

        let mut placed: Vec<Placement> = Vec::with_capacity(demands.len());
        let mut levels: Vec<Level> = Vec::with_capacity(demands.len());
        if demands.is_empty() {
            raw.push(self.complete(&placed, 0));
        } else {
            levels.push(self.open_level(
                &demands[0],
                self.grid.circulation().clone(),
                None,
                &mut stats,
            ));
        }

        while !levels.is_empty() {
            let depth = levels.len() - 1;
            placed.truncate(depth);
            let level = &mut levels[depth];

            if self
                .limits
                .max_placement_tries
                .is_some_and(|max| level.tried >= max)
            {
                levels.pop();
                continue;
            }
            let Some(cells) = level.pending.next() else {
                tracing::debug!(depth, tried = level.tried, "demand exhausted, backtracking");
                levels.pop();
                continue;
            };
            if matches!(level.pending, Pending::Lazy(_)) {
                stats.candidates_generated += 1;
            }
            // only a candidate that would actually be tried can exhaust the budget
            if self.budget_spent(&stats, start) {
                stats.aborted = true;
                tracing::warn!(steps = stats.steps, found = raw.len(), "search budget exhausted");
                break;
            }
            level.tried += 1;
            stats.steps += 1;

            let mut occupied = level.occupied.clone();
            occupied.union_with(&cells);
            let anchor = cells.first();
            placed.push(Placement::from_cells(self.grid, depth as u32 + 1, &demands[depth], cells));

            let next = depth + 1;
            if next == demands.len() {
                let solution = self.complete(&placed, raw.len());
                tracing::debug!(
                    index = solution.discovery_index,
                    score = solution.score,
                    "layout found"
                );
                raw.push(solution);
                if raw.len() >= self.limits.max_raw_solutions {
                    tracing::info!(cap = self.limits.max_raw_solutions, "raw solution cap reached");
                    break;
                }
            } else {
                let floor = if self.options.break_symmetry
                    && demands[next].interchangeable_with(&demands[depth])
                {
                    anchor
                } else {
                    None
                };
                let level = self.open_level(&demands[next], occupied, floor, &mut stats);
                levels.push(level);
            }
        }

        stats.raw_solutions = raw.len();
        stats.elapsed_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            raw = stats.raw_solutions,
            steps = stats.steps,
            candidates = stats.candidates_generated,
            elapsed_ms = stats.elapsed_ms,
            aborted = stats.aborted,
            "placement search finished"
        );
        RawSearch {
            solutions: raw,
            stats,
        }
    }

    fn open_level(
        &self,
        demand: &Demand,
        occupied: CellSet,
        floor: Option<usize>,
        stats: &mut SearchStats,
    ) -> Level<'_> {
        let mut candidates = Candidates::new(self.grid, occupied.clone(), demand, &self.rules);
        if let Some(floor) = floor {
            candidates = candidates.above(floor);
        }
        let pending = match self.options.candidate_order {
            CandidateOrder::Discovery => Pending::Lazy(candidates),
            CandidateOrder::Compactness => {
                let mut keyed: Vec<(f64, CellSet)> = candidates
                    .map(|c| (constraints::compactness(self.grid, &c), c))
                    .collect();
                keyed.sort_by(|a, b| b.0.total_cmp(&a.0));
                stats.candidates_generated += keyed.len() as u64;
                Pending::Ranked(
                    keyed
                        .into_iter()
                        .map(|(_, c)| c)
                        .collect::<Vec<_>>()
                        .into_iter(),
                )
            }
        };
        Level {
            occupied,
            pending,
            tried: 0,
        }
    }

    fn budget_spent(&self, stats: &SearchStats, start: Instant) -> bool {
        self.limits.max_steps.is_some_and(|max| stats.steps >= max)
            || self.limits.time_limit.is_some_and(|t| start.elapsed() >= t)
    }

    fn complete(&self, placed: &[Placement], discovery_index: usize) -> Solution {
        let score = self.ranking.score.score(placed, &self.rules.facade);
        Solution::assemble(self.grid, placed.to_vec(), discovery_index, score)
    }
}

impl Placement {
    pub(crate) fn from_cells(grid: &Grid, id: u32, demand: &Demand, cells: CellSet) -> Self {
        Self {
            id,
            label: demand.label.clone(),
            kind: demand.kind,
            cells: cells.iter().map(|i| grid.coord_of(i)).collect(),
            facade_count: constraints::facade_count(&cells, grid),
            compactness: constraints::compactness(grid, &cells),
            shape: constraints::shape_descriptors(grid, &cells),
            mask: cells,
        }
    }
}

impl Solution {
    pub(crate) fn assemble(
        grid: &Grid,
        placements: Vec<Placement>,
        discovery_index: usize,
        score: f64,
    ) -> Self {
        let (w, h) = (grid.width() as usize, grid.height() as usize);
        let mut assignment = vec![vec![CellLabel::Empty; w]; h];
        for idx in grid.circulation().iter() {
            assignment[idx / w][idx % w] = CellLabel::Circulation;
        }
        for p in &placements {
            for c in &p.cells {
                assignment[c.y as usize][c.x as usize] = CellLabel::Apartment(p.id);
            }
        }

        let shapes: Vec<_> = placements.iter().map(|p| p.shape).collect();
        let mean_compactness = if placements.is_empty() {
            0.0
        } else {
            placements.iter().map(|p| p.compactness).sum::<f64>() / placements.len() as f64
        };

        Solution {
            width: grid.width(),
            height: grid.height(),
            cell_size: grid.cell_size(),
            assignment,
            placements,
            circulation: grid.circulation_coords(),
            score,
            shape_variance: constraints::shape_variance(&shapes),
            mean_compactness,
            discovery_index,
        }
    }
}
