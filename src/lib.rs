pub mod candidates;
pub mod config;
pub mod constraints;
pub mod error;
pub mod grid;
pub mod ranking;
pub mod render;
pub mod solver;
pub mod types;

use constraints::PlacementRules;
use error::PlanError;
use grid::Grid;
use solver::{Limits, SearchResult, Solver};
use types::Demand;

/// Searches with default options and ranking.
pub fn solve(
    grid: &Grid,
    demands: Vec<Demand>,
    rules: PlacementRules,
    limits: Limits,
) -> Result<SearchResult, PlanError> {
    Ok(Solver::new(grid, demands, rules, limits)?.solve())
}
