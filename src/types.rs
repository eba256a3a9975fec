use serde::{Deserialize, Serialize, Serializer};

use crate::error::PlanError;
use crate::grid::CellSet;

/// A cell position: `x` is the column, `y` the row, `(0, 0)` is the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "(u32, u32)", into = "(u32, u32)")]
pub struct Coord {
    pub x: u32,
    pub y: u32,
}

impl Coord {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl From<(u32, u32)> for Coord {
    fn from((x, y): (u32, u32)) -> Self {
        Self { x, y }
    }
}

impl From<Coord> for (u32, u32) {
    fn from(c: Coord) -> Self {
        (c.x, c.y)
    }
}

impl std::fmt::Display for Coord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Apartment size class. Labels such as `3-room`, `3p` and `3.5p` all map to
/// `ThreeRoom`; the half room is a naming convention, not extra area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ApartmentType {
    OneRoom,
    TwoRoom,
    ThreeRoom,
    FourRoom,
    FiveRoom,
    SixRoom,
}

impl ApartmentType {
    pub const ALL: [ApartmentType; 6] = [
        ApartmentType::OneRoom,
        ApartmentType::TwoRoom,
        ApartmentType::ThreeRoom,
        ApartmentType::FourRoom,
        ApartmentType::FiveRoom,
        ApartmentType::SixRoom,
    ];

    pub fn rooms(self) -> u32 {
        match self {
            ApartmentType::OneRoom => 1,
            ApartmentType::TwoRoom => 2,
            ApartmentType::ThreeRoom => 3,
            ApartmentType::FourRoom => 4,
            ApartmentType::FiveRoom => 5,
            ApartmentType::SixRoom => 6,
        }
    }

    fn from_rooms(rooms: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.rooms() == rooms)
    }

    /// Parses `N-room`, `Np` or `N.5p` (case-insensitive, surrounding spaces ignored).
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_ascii_lowercase();
        let digits = if let Some(n) = label.strip_suffix("-room") {
            n
        } else if let Some(n) = label.strip_suffix(".5p") {
            n
        } else {
            label.strip_suffix('p')?
        };
        let rooms = digits.parse::<u32>().ok()?;
        Self::from_rooms(rooms)
    }
}

impl std::fmt::Display for ApartmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-room", self.rooms())
    }
}

impl From<ApartmentType> for String {
    fn from(t: ApartmentType) -> Self {
        t.to_string()
    }
}

impl TryFrom<String> for ApartmentType {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        ApartmentType::from_label(&s).ok_or_else(|| format!("unknown apartment type '{s}'"))
    }
}

/// One apartment to place: the label as the caller wrote it, its parsed type
/// and the exact number of cells it must occupy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Demand {
    pub label: String,
    pub kind: ApartmentType,
    pub cells: u32,
}

impl Demand {
    pub fn new(label: &str, cells: u32) -> Result<Self, PlanError> {
        let kind = ApartmentType::from_label(label).ok_or_else(|| {
            PlanError::invalid(
                "apartments",
                format!("unknown apartment type '{label}', expected N-room, Np or N.5p"),
            )
        })?;
        if cells == 0 {
            return Err(PlanError::invalid(
                "apartments",
                format!("'{label}' must occupy at least one cell"),
            ));
        }
        Ok(Self {
            label: label.to_string(),
            kind,
            cells,
        })
    }

    /// Two demands are interchangeable when swapping their placements yields
    /// the same layout.
    pub fn interchangeable_with(&self, other: &Demand) -> bool {
        self.label == other.label && self.kind == other.kind && self.cells == other.cells
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ShapeDescriptors {
    /// Bounding box long side over short side, always >= 1.
    pub aspect_ratio: f64,
    /// Exposed edges per cell.
    pub normalized_perimeter: f64,
    /// Ratio of the principal second moments, always >= 1.
    pub moment_ratio: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Placement {
    pub id: u32,
    pub label: String,
    pub kind: ApartmentType,
    pub cells: Vec<Coord>,
    pub facade_count: u32,
    pub compactness: f64,
    pub shape: ShapeDescriptors,
    #[serde(skip)]
    pub(crate) mask: CellSet,
}

impl Placement {
    pub fn area(&self) -> usize {
        self.cells.len()
    }
}

/// Per-cell content of a finished layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellLabel {
    Circulation,
    Empty,
    Apartment(u32),
}

impl CellLabel {
    /// Integer code used in serialized grids: -1 circulation, 0 empty, otherwise the placement id.
    pub fn code(self) -> i64 {
        match self {
            CellLabel::Circulation => -1,
            CellLabel::Empty => 0,
            CellLabel::Apartment(id) => id as i64,
        }
    }
}

impl Serialize for CellLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.code())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Solution {
    pub width: u32,
    pub height: u32,
    pub cell_size: (f64, f64),
    /// Row-major: `assignment[y][x]`.
    pub assignment: Vec<Vec<CellLabel>>,
    pub placements: Vec<Placement>,
    pub circulation: Vec<Coord>,
    pub score: f64,
    pub shape_variance: f64,
    pub mean_compactness: f64,
    /// Position of this solution in the raw search order.
    pub discovery_index: usize,
}

impl Solution {
    pub fn label_at(&self, c: Coord) -> Option<CellLabel> {
        self.assignment
            .get(c.y as usize)
            .and_then(|row| row.get(c.x as usize))
            .copied()
    }

    pub fn empty_cell_count(&self) -> usize {
        self.assignment
            .iter()
            .flatten()
            .filter(|l| **l == CellLabel::Empty)
            .count()
    }

    pub fn occupied_cell_count(&self) -> usize {
        self.placements.iter().map(|p| p.area()).sum()
    }
}
