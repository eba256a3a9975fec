use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constraints::{FacadeTable, PlacementRules};
use crate::error::PlanError;
use crate::grid::Grid;
use crate::ranking::Ranking;
use crate::solver::{Limits, SearchOptions, Solver};
use crate::types::{ApartmentType, Coord, Demand};

/// An apartment entry, either `["3.5p", 7]` or `{"type": "3.5p", "cells": 7}`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DemandSpec {
    Pair(String, f64),
    Record {
        #[serde(rename = "type")]
        label: String,
        cells: f64,
    },
}

impl DemandSpec {
    fn parts(&self) -> (&str, f64) {
        match self {
            DemandSpec::Pair(label, cells) => (label.as_str(), *cells),
            DemandSpec::Record { label, cells } => (label.as_str(), *cells),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Defaults to 200 times `max_solutions`.
    pub max_raw_solutions: Option<usize>,
    pub max_solutions: usize,
    pub max_placement_tries: Option<usize>,
    pub max_steps: Option<u64>,
    pub time_limit_ms: Option<u64>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_raw_solutions: None,
            max_solutions: 10,
            max_placement_tries: None,
            max_steps: None,
            time_limit_ms: None,
        }
    }
}

fn default_cell_size() -> (f64, f64) {
    (1.0, 1.0)
}

/// The configuration document as written by the caller.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PlanConfig {
    #[serde(default = "default_cell_size")]
    pub cell_size: (f64, f64),
    pub width: i64,
    pub height: i64,
    #[serde(default)]
    pub circulation: Vec<Coord>,
    pub apartments: Vec<DemandSpec>,
    /// Facade minimum per type label; the standard table when absent.
    #[serde(default)]
    pub min_facade: Option<BTreeMap<String, u32>>,
    #[serde(default)]
    pub max_enfilade: Option<u32>,
    #[serde(default)]
    pub search: SearchOptions,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub ranking: Ranking,
}

/// A validated configuration, ready to search.
#[derive(Debug, Clone)]
pub struct Plan {
    pub grid: Grid,
    pub demands: Vec<Demand>,
    pub rules: PlacementRules,
    pub limits: Limits,
    pub options: SearchOptions,
    pub ranking: Ranking,
}

impl Plan {
    pub fn solver(&self) -> Result<Solver<'_>, PlanError> {
        Solver::new(
            &self.grid,
            self.demands.clone(),
            self.rules.clone(),
            self.limits.clone(),
        )?
        .with_options(self.options)
        .with_ranking(self.ranking.clone())
    }
}

impl PlanConfig {
    pub fn from_json(text: &str) -> Result<Self, PlanError> {
        serde_json::from_str(text).map_err(|e| PlanError::invalid("document", e.to_string()))
    }

    /// Checks every field and builds the grid, demands, rules and limits.
    /// The first problem found is reported with its field path.
    pub fn resolve(&self) -> Result<Plan, PlanError> {
        let width = dimension("width", self.width)?;
        let height = dimension("height", self.height)?;
        let grid = Grid::new(width, height, self.cell_size, &self.circulation)?;

        let demands = self
            .apartments
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let (label, cells) = entry.parts();
                let cells = cell_count(&format!("apartments[{i}].cells"), cells)?;
                Demand::new(label, cells).map_err(|e| match e {
                    PlanError::InvalidConfiguration { reason, .. } => {
                        PlanError::invalid(format!("apartments[{i}].type"), reason)
                    }
                    other => other,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let facade = match &self.min_facade {
            None => FacadeTable::standard(),
            Some(entries) => facade_table(entries)?,
        };
        for d in &demands {
            if facade.minimum(d.kind).is_none() {
                return Err(PlanError::invalid(
                    "min_facade",
                    format!("no entry covers apartment type '{}'", d.label),
                ));
            }
        }

        let limits = Limits {
            max_raw_solutions: self
                .limits
                .max_raw_solutions
                .unwrap_or_else(|| self.limits.max_solutions.saturating_mul(200)),
            max_solutions: self.limits.max_solutions,
            max_placement_tries: self.limits.max_placement_tries,
            max_steps: self.limits.max_steps,
            time_limit: self.limits.time_limit_ms.map(Duration::from_millis),
        };
        self.ranking.validate()?;

        Ok(Plan {
            grid,
            demands,
            rules: PlacementRules {
                facade,
                max_enfilade: self.max_enfilade,
            },
            limits,
            options: self.search,
            ranking: self.ranking.clone(),
        })
    }
}

fn dimension(field: &str, value: i64) -> Result<u32, PlanError> {
    if value <= 0 {
        return Err(PlanError::invalid(field, format!("must be positive, got {value}")));
    }
    u32::try_from(value).map_err(|_| PlanError::invalid(field, format!("{value} is too large")))
}

/// Cell counts arrive as JSON numbers; only whole, positive counts are accepted.
fn cell_count(field: &str, value: f64) -> Result<u32, PlanError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(PlanError::invalid(field, format!("must be positive, got {value}")));
    }
    if value.fract() != 0.0 {
        return Err(PlanError::invalid(
            field,
            format!("fractional cell counts are not supported, got {value}"),
        ));
    }
    if value > u32::MAX as f64 {
        return Err(PlanError::invalid(field, format!("{value} is too large")));
    }
    Ok(value as u32)
}

fn facade_table(entries: &BTreeMap<String, u32>) -> Result<FacadeTable, PlanError> {
    let mut table = FacadeTable::default();
    for (label, &min) in entries {
        let kind = ApartmentType::from_label(label).ok_or_else(|| {
            PlanError::invalid(
                format!("min_facade.{label}"),
                "unknown apartment type, expected N-room, Np or N.5p",
            )
        })?;
        if let Some(existing) = table.minimum(kind)
            && existing != min
        {
            return Err(PlanError::invalid(
                format!("min_facade.{label}"),
                format!("conflicts with another entry for {kind} ({existing})"),
            ));
        }
        table.set(kind, min);
    }
    Ok(table)
}
