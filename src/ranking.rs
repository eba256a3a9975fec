//! Scoring, similarity and greedy diversity selection of complete layouts.

use serde::{Deserialize, Serialize};

use crate::constraints::{FacadeTable, shape_variance};
use crate::error::PlanError;
use crate::types::{ApartmentType, CellLabel, Placement, Solution};

/// How a complete layout is scored. Lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoreStrategy {
    /// Every valid layout scores 0; order is discovery order.
    Uniform,
    /// Negated mean compactness.
    Compactness,
    /// Negated mean compactness plus weighted shape variance, favouring
    /// compact apartments that look alike.
    ShapeUniformity { variance_weight: f64 },
    /// Negated total facade cells above each apartment's minimum.
    FacadeExcess,
}

impl Default for ScoreStrategy {
    fn default() -> Self {
        ScoreStrategy::ShapeUniformity {
            variance_weight: 100.0,
        }
    }
}

impl ScoreStrategy {
    pub fn score(&self, placements: &[Placement], facade: &FacadeTable) -> f64 {
        if placements.is_empty() {
            return 0.0;
        }
        let mean_compactness =
            placements.iter().map(|p| p.compactness).sum::<f64>() / placements.len() as f64;
        match *self {
            ScoreStrategy::Uniform => 0.0,
            ScoreStrategy::Compactness => -mean_compactness,
            ScoreStrategy::ShapeUniformity { variance_weight } => {
                let shapes: Vec<_> = placements.iter().map(|p| p.shape).collect();
                -mean_compactness + shape_variance(&shapes) * variance_weight
            }
            ScoreStrategy::FacadeExcess => {
                let excess: u32 = placements
                    .iter()
                    .map(|p| {
                        let min = facade.minimum(p.kind).unwrap_or(0);
                        p.facade_count.saturating_sub(min)
                    })
                    .sum();
                -(excess as f64)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Share of free cells that keep the same apartment under a greedy
    /// best matching of apartment ids, or stay empty in both.
    #[default]
    MatchedOverlap,
    /// Share of free cells holding the same apartment type (or empty) in both.
    TypeOverlap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ranking {
    pub metric: SimilarityMetric,
    /// A layout is kept only if its similarity to every kept layout is below this.
    pub similarity_threshold: f64,
    pub score: ScoreStrategy,
    /// When set, layouts whose shape variance exceeds this multiple of the
    /// best layouts' mean variance are dropped before selection.
    pub variance_cutoff: Option<f64>,
}

impl Default for Ranking {
    fn default() -> Self {
        Self {
            metric: SimilarityMetric::MatchedOverlap,
            similarity_threshold: 0.9,
            score: ScoreStrategy::default(),
            variance_cutoff: None,
        }
    }
}

impl Ranking {
    pub fn validate(&self) -> Result<(), PlanError> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(PlanError::invalid(
                "ranking.similarity_threshold",
                format!("must be within [0, 1], got {}", self.similarity_threshold),
            ));
        }
        if let Some(cutoff) = self.variance_cutoff
            && !(cutoff.is_finite() && cutoff > 0.0)
        {
            return Err(PlanError::invalid(
                "ranking.variance_cutoff",
                format!("must be a positive number, got {cutoff}"),
            ));
        }
        if let ScoreStrategy::ShapeUniformity { variance_weight } = self.score
            && !variance_weight.is_finite()
        {
            return Err(PlanError::invalid(
                "ranking.score.variance_weight",
                "must be finite",
            ));
        }
        Ok(())
    }
}

/// Similarity in `[0, 1]` between two layouts of the same grid, measured over
/// non-circulation cells. Layouts of different grids have similarity 0.
pub fn similarity(a: &Solution, b: &Solution, metric: SimilarityMetric) -> f64 {
    if a.width != b.width || a.height != b.height {
        return 0.0;
    }
    let cells = a.assignment.iter().flatten().zip(b.assignment.iter().flatten());
    let free = a
        .assignment
        .iter()
        .flatten()
        .filter(|l| **l != CellLabel::Circulation)
        .count();
    if free == 0 {
        return 1.0;
    }

    let same = match metric {
        SimilarityMetric::MatchedOverlap => {
            let both_empty = cells
                .filter(|(x, y)| **x == CellLabel::Empty && **y == CellLabel::Empty)
                .count();
            both_empty + matched_overlap(&a.placements, &b.placements)
        }
        SimilarityMetric::TypeOverlap => {
            let kinds_a = kinds_by_id(&a.placements);
            let kinds_b = kinds_by_id(&b.placements);
            cells
                .filter(|(x, _)| **x != CellLabel::Circulation)
                .filter(|(x, y)| cell_kind(**x, &kinds_a) == cell_kind(**y, &kinds_b))
                .count()
        }
    };
    same as f64 / free as f64
}

/// Pairs apartments by descending shared cell count (ties by id), each
/// apartment used at most once, and sums the shared cells of the pairs.
fn matched_overlap(a: &[Placement], b: &[Placement]) -> usize {
    let mut pairs: Vec<(usize, usize, usize)> = Vec::new();
    for (i, pa) in a.iter().enumerate() {
        for (j, pb) in b.iter().enumerate() {
            let shared = pa.mask.intersection_len(&pb.mask);
            if shared > 0 {
                pairs.push((shared, i, j));
            }
        }
    }
    pairs.sort_by(|x, y| y.0.cmp(&x.0).then(x.1.cmp(&y.1)).then(x.2.cmp(&y.2)));

    let mut used_a = vec![false; a.len()];
    let mut used_b = vec![false; b.len()];
    let mut total = 0;
    for (shared, i, j) in pairs {
        if !used_a[i] && !used_b[j] {
            used_a[i] = true;
            used_b[j] = true;
            total += shared;
        }
    }
    total
}

fn kinds_by_id(placements: &[Placement]) -> Vec<Option<ApartmentType>> {
    let max_id = placements.iter().map(|p| p.id as usize).max().unwrap_or(0);
    let mut kinds = vec![None; max_id + 1];
    for p in placements {
        kinds[p.id as usize] = Some(p.kind);
    }
    kinds
}

fn cell_kind(label: CellLabel, kinds: &[Option<ApartmentType>]) -> Option<ApartmentType> {
    match label {
        CellLabel::Apartment(id) => kinds.get(id as usize).copied().flatten(),
        _ => None,
    }
}

/// Best first: ascending score, ties by discovery order.
pub fn sort_by_score(solutions: &mut [Solution]) {
    solutions.sort_by(|a, b| {
        a.score
            .total_cmp(&b.score)
            .then(a.discovery_index.cmp(&b.discovery_index))
    });
}

/// Drops layouts whose shape variance is far above that of the best ones.
/// Expects `sorted` in score order; only acts when there are more layouts
/// than will be returned, and never keeps fewer than three.
fn apply_variance_cutoff(sorted: Vec<Solution>, cutoff: f64, max_solutions: usize) -> Vec<Solution> {
    if sorted.len() <= max_solutions {
        return sorted;
    }
    let n_best = (sorted.len() / 5).max(3).min(sorted.len());
    let mean_best =
        sorted[..n_best].iter().map(|s| s.shape_variance).sum::<f64>() / n_best as f64;
    let limit = mean_best * cutoff;

    let floor = sorted.len().min(3);
    let kept: Vec<Solution> = sorted
        .iter()
        .filter(|s| s.shape_variance <= limit)
        .cloned()
        .collect();
    if kept.len() < floor {
        return sorted.into_iter().take(floor).collect();
    }
    kept
}

/// Orders raw layouts by score and greedily keeps each one that is not too
/// similar to any layout already kept, up to `max_solutions`.
pub fn select(raw: Vec<Solution>, ranking: &Ranking, max_solutions: usize) -> Vec<Solution> {
    let mut sorted = raw;
    sort_by_score(&mut sorted);
    if let Some(cutoff) = ranking.variance_cutoff {
        let before = sorted.len();
        sorted = apply_variance_cutoff(sorted, cutoff, max_solutions);
        tracing::debug!(before, after = sorted.len(), "variance cutoff applied");
    }

    let mut accepted: Vec<Solution> = Vec::with_capacity(max_solutions);
    for candidate in sorted {
        if accepted.len() >= max_solutions {
            break;
        }
        let distinct = accepted
            .iter()
            .all(|kept| similarity(kept, &candidate, ranking.metric) < ranking.similarity_threshold);
        if distinct {
            accepted.push(candidate);
        }
    }
    tracing::debug!(kept = accepted.len(), "diversity selection done");
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;
    use crate::types::{Coord, Demand};

    /// 4x3 with a corridor along the middle row: eight free cells, four above
    /// and four below.
    fn grid() -> Grid {
        let circ: Vec<Coord> = (0..4).map(|x| Coord::new(x, 1)).collect();
        Grid::new(4, 3, (1.0, 1.0), &circ).unwrap()
    }

    fn layout(g: &Grid, apartments: &[(&str, &[(u32, u32)])], index: usize, score: f64) -> Solution {
        let placements = apartments
            .iter()
            .enumerate()
            .map(|(k, (label, cells))| {
                let coords: Vec<Coord> = cells.iter().map(|&c| c.into()).collect();
                let demand = Demand::new(label, coords.len() as u32).unwrap();
                Placement::from_cells(g, k as u32 + 1, &demand, g.cell_set(&coords).unwrap())
            })
            .collect();
        Solution::assemble(g, placements, index, score)
    }

    const TOP: &[(u32, u32)] = &[(0, 0), (1, 0), (2, 0), (3, 0)];
    const BOTTOM: &[(u32, u32)] = &[(0, 2), (1, 2), (2, 2), (3, 2)];
    const TOP_SWAPPED: &[(u32, u32)] = &[(0, 0), (1, 0), (2, 0), (3, 2)];
    const BOTTOM_SWAPPED: &[(u32, u32)] = &[(0, 2), (1, 2), (2, 2), (3, 0)];
    const LEFT: &[(u32, u32)] = &[(0, 0), (1, 0), (0, 2), (1, 2)];
    const RIGHT: &[(u32, u32)] = &[(2, 0), (3, 0), (2, 2), (3, 2)];
    const TOP_LEFT_PAIR: &[(u32, u32)] = &[(0, 0), (1, 0)];
    const TOP_RIGHT_PAIR: &[(u32, u32)] = &[(2, 0), (3, 0)];

    #[test]
    fn test_identical_layouts_are_fully_similar() {
        let g = grid();
        let a = layout(&g, &[("2-room", TOP), ("3-room", BOTTOM)], 0, 0.0);
        let b = layout(&g, &[("2-room", TOP), ("3-room", BOTTOM)], 1, 0.0);
        assert_eq!(similarity(&a, &b, SimilarityMetric::MatchedOverlap), 1.0);
        assert_eq!(similarity(&a, &b, SimilarityMetric::TypeOverlap), 1.0);
    }

    #[test]
    fn test_matching_ignores_id_permutation() {
        let g = grid();
        let a = layout(&g, &[("2-room", TOP), ("2-room", BOTTOM)], 0, 0.0);
        let b = layout(&g, &[("2-room", BOTTOM), ("2-room", TOP)], 1, 0.0);
        assert_eq!(similarity(&a, &b, SimilarityMetric::MatchedOverlap), 1.0);
        assert_eq!(similarity(&a, &b, SimilarityMetric::TypeOverlap), 1.0);
    }

    #[test]
    fn test_type_overlap_sees_type_swap() {
        let g = grid();
        let a = layout(&g, &[("2-room", TOP), ("3-room", BOTTOM)], 0, 0.0);
        let b = layout(&g, &[("3-room", TOP), ("2-room", BOTTOM)], 1, 0.0);
        assert_eq!(similarity(&a, &b, SimilarityMetric::MatchedOverlap), 1.0);
        assert_eq!(similarity(&a, &b, SimilarityMetric::TypeOverlap), 0.0);
    }

    #[test]
    fn test_single_cell_swap_similarity() {
        let g = grid();
        let a = layout(&g, &[("2-room", TOP), ("2-room", BOTTOM)], 0, 0.0);
        let b = layout(&g, &[("2-room", TOP_SWAPPED), ("2-room", BOTTOM_SWAPPED)], 1, 0.0);
        assert_eq!(similarity(&a, &b, SimilarityMetric::MatchedOverlap), 0.75);
    }

    #[test]
    fn test_empty_cells_count_as_agreement() {
        let g = grid();
        let a = layout(&g, &[("2-room", TOP_LEFT_PAIR)], 0, 0.0);
        let b = layout(&g, &[("2-room", TOP_RIGHT_PAIR)], 1, 0.0);
        // four cells below the corridor are empty in both, nothing else matches
        assert_eq!(similarity(&a, &b, SimilarityMetric::MatchedOverlap), 0.5);
        // (0,0),(1,0) and (2,0),(3,0) each disagree between 2-room and empty
        assert_eq!(similarity(&a, &b, SimilarityMetric::TypeOverlap), 0.5);
    }

    #[test]
    fn test_near_duplicate_keeps_better_score() {
        let g = grid();
        let worse = layout(&g, &[("2-room", TOP), ("2-room", BOTTOM)], 0, 2.0);
        let better = layout(&g, &[("2-room", TOP_SWAPPED), ("2-room", BOTTOM_SWAPPED)], 1, -1.0);
        let other = layout(&g, &[("2-room", LEFT), ("2-room", RIGHT)], 2, 5.0);
        let ranking = Ranking {
            similarity_threshold: 0.7,
            ..Ranking::default()
        };
        let picked = select(vec![worse, better, other], &ranking, 10);
        let order: Vec<usize> = picked.iter().map(|s| s.discovery_index).collect();
        assert_eq!(order, vec![1, 2]);
        for (i, a) in picked.iter().enumerate() {
            for b in &picked[i + 1..] {
                assert!(similarity(a, b, ranking.metric) < ranking.similarity_threshold);
            }
        }
    }

    #[test]
    fn test_ties_keep_discovery_order() {
        let g = grid();
        let a = layout(&g, &[("2-room", LEFT), ("2-room", RIGHT)], 0, 1.0);
        let b = layout(&g, &[("2-room", TOP), ("2-room", BOTTOM)], 1, 1.0);
        let c = layout(&g, &[("2-room", TOP_SWAPPED), ("2-room", BOTTOM_SWAPPED)], 2, 0.5);
        let picked = select(vec![b, a, c], &Ranking::default(), 10);
        let order: Vec<usize> = picked.iter().map(|s| s.discovery_index).collect();
        assert_eq!(order, vec![2, 0, 1]);
    }

    #[test]
    fn test_select_truncates() {
        let g = grid();
        let raw = vec![
            layout(&g, &[("2-room", LEFT), ("2-room", RIGHT)], 0, 0.0),
            layout(&g, &[("2-room", TOP), ("2-room", BOTTOM)], 1, 0.0),
            layout(&g, &[("2-room", TOP_SWAPPED), ("2-room", BOTTOM_SWAPPED)], 2, 0.0),
        ];
        let ranking = Ranking {
            similarity_threshold: 1.0,
            ..Ranking::default()
        };
        assert_eq!(select(raw, &ranking, 2).len(), 2);
    }

    #[test]
    fn test_threshold_one_drops_exact_duplicates_only() {
        let g = grid();
        let raw = vec![
            layout(&g, &[("2-room", TOP), ("2-room", BOTTOM)], 0, 0.0),
            layout(&g, &[("2-room", BOTTOM), ("2-room", TOP)], 1, 0.0),
            layout(&g, &[("2-room", TOP_SWAPPED), ("2-room", BOTTOM_SWAPPED)], 2, 0.0),
        ];
        let ranking = Ranking {
            similarity_threshold: 1.0,
            ..Ranking::default()
        };
        let picked = select(raw, &ranking, 10);
        let order: Vec<usize> = picked.iter().map(|s| s.discovery_index).collect();
        assert_eq!(order, vec![0, 2]);
    }

    #[test]
    fn test_score_strategies() {
        let g = grid();
        let sol = layout(&g, &[("2-room", LEFT), ("3-room", TOP)], 0, 0.0);
        let facade = FacadeTable::standard();
        // LEFT is two separate dominoes (2 shared edges), TOP a bar (3 shared edges)
        assert_eq!(ScoreStrategy::Uniform.score(&sol.placements, &facade), 0.0);
        assert_eq!(ScoreStrategy::Compactness.score(&sol.placements, &facade), -2.5);
        // every free cell is on the boundary: excess (4-2) + (4-3)
        assert_eq!(ScoreStrategy::FacadeExcess.score(&sol.placements, &facade), -3.0);
        let uniform = ScoreStrategy::ShapeUniformity { variance_weight: 0.0 };
        assert_eq!(uniform.score(&sol.placements, &facade), -2.5);
        let weighted = ScoreStrategy::ShapeUniformity { variance_weight: 10.0 };
        assert!(weighted.score(&sol.placements, &facade) > -2.5);
    }

    #[test]
    fn test_variance_cutoff_keeps_at_least_three() {
        let g = grid();
        let mut raw = Vec::new();
        for i in 0..6 {
            let mut s = layout(&g, &[("2-room", TOP)], i, i as f64);
            s.shape_variance = if i < 3 { 0.0 } else { 10.0 };
            raw.push(s);
        }
        let kept = apply_variance_cutoff(raw.clone(), 1.5, 2);
        assert_eq!(kept.len(), 3);
        assert!(kept.iter().all(|s| s.shape_variance == 0.0));

        // fewer layouts than requested: untouched
        assert_eq!(apply_variance_cutoff(raw, 1.5, 10).len(), 6);
    }

    #[test]
    fn test_ranking_validation() {
        let bad = Ranking {
            similarity_threshold: 1.5,
            ..Ranking::default()
        };
        assert!(bad.validate().is_err());
        let bad = Ranking {
            variance_cutoff: Some(0.0),
            ..Ranking::default()
        };
        assert!(bad.validate().is_err());
        assert!(Ranking::default().validate().is_ok());
    }
}
