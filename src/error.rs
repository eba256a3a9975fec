use std::fmt;

use crate::types::Coord;

#[derive(Debug, Clone, PartialEq)]
pub enum PlanError {
    /// Rejected before the search starts; `field` names the offending input.
    InvalidConfiguration { field: String, reason: String },
    /// A grid query outside `[0, width) x [0, height)`.
    OutOfBounds { coord: Coord, width: u32, height: u32 },
}

impl PlanError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        PlanError::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanError::InvalidConfiguration { field, reason } => {
                write!(f, "invalid configuration ({field}): {reason}")
            }
            PlanError::OutOfBounds {
                coord,
                width,
                height,
            } => write!(f, "cell {coord} is outside the {width}x{height} grid"),
        }
    }
}

impl std::error::Error for PlanError {}
