//! Analytic shelf geometry: boundary lines and the bands between them.
//!
//! A background template lists its shelf boundaries top to bottom. Each consecutive
//! pair of lines encloses one [`ShelfRegion`]; objects stand on the region's bottom line.
//! Lines may be slanted, so every height query takes the x position it is asked at.

use crate::error::{Result, SynthError};
use serde::{Deserialize, Serialize};

/// Immutable 2-D coordinate in background pixel space (y grows downwards).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// One boundary line as written in `backgrounds.json`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ShelfLineSpec {
    pub x_start: f64,
    pub y_start: f64,
    pub x_end: f64,
    pub y_end: f64,
    /// Caps the region above it; never a placement surface itself.
    #[serde(default)]
    pub is_dummy: bool,
}

/// Non-vertical line `y = m·x + c` between two points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    start: Point,
    end: Point,
    is_dummy: bool,
    slope: f64,
    intercept: f64,
}

impl Line {
    /// Builds a line through `start` and `end`.
    ///
    /// Fails with [`SynthError::InvalidGeometry`] when both points share an x coordinate
    /// or any coordinate is not finite.
    pub fn new(start: Point, end: Point, is_dummy: bool) -> Result<Self> {
        let finite = [start.x, start.y, end.x, end.y].iter().all(|v| v.is_finite());
        if !finite || start.x == end.x {
            return Err(SynthError::InvalidGeometry {
                start_x: start.x,
                end_x: end.x,
            });
        }
        let slope = (end.y - start.y) / (end.x - start.x);
        let intercept = start.y - slope * start.x;
        Ok(Self {
            start,
            end,
            is_dummy,
            slope,
            intercept,
        })
    }

    pub fn from_spec(spec: &ShelfLineSpec) -> Result<Self> {
        Self::new(
            Point::new(spec.x_start, spec.y_start),
            Point::new(spec.x_end, spec.y_end),
            spec.is_dummy,
        )
    }

    #[inline]
    pub fn y_at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    pub fn start(&self) -> Point {
        self.start
    }
    pub fn end(&self) -> Point {
        self.end
    }
    pub fn slope(&self) -> f64 {
        self.slope
    }
    pub fn intercept(&self) -> f64 {
        self.intercept
    }
    pub fn is_dummy(&self) -> bool {
        self.is_dummy
    }
}

/// Band between two consecutive boundary lines.
///
/// ```text
/// 0 ________________
/// 1 |______________|   lines 0 and 1 enclose region 0
/// 2 |______________|   lines 1 and 2 enclose region 1
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShelfRegion {
    top: Line,
    bottom: Line,
}

impl ShelfRegion {
    pub fn new(top: Line, bottom: Line) -> Self {
        Self { top, bottom }
    }

    pub fn top_line(&self) -> &Line {
        &self.top
    }
    pub fn bottom_line(&self) -> &Line {
        &self.bottom
    }

    /// Vertical distance between the two lines at `x`; never negative.
    pub fn height_at(&self, x: f64) -> f64 {
        (self.bottom.y_at(x) - self.top.y_at(x)).abs()
    }

    pub fn x_start(&self) -> f64 {
        self.top.start.x.max(self.bottom.start.x)
    }

    // max of both ends, not the intersection of the two x-ranges
    pub fn x_end(&self) -> f64 {
        self.top.end.x.max(self.bottom.end.x)
    }

    /// Topmost y of the band (smallest y on the top line).
    pub fn y_start(&self) -> f64 {
        self.top.start.y.min(self.top.end.y)
    }

    /// Lowest y of the band (largest y on the bottom line).
    pub fn y_end(&self) -> f64 {
        self.bottom.start.y.max(self.bottom.end.y)
    }

    pub fn is_dummy(&self) -> bool {
        self.bottom.is_dummy
    }
}

/// All regions of one background, ordered top to bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct Shelf {
    regions: Vec<ShelfRegion>,
}

impl Shelf {
    /// Parses boundary lines and pairs them into regions.
    pub fn from_lines(lines: &[ShelfLineSpec]) -> Result<Self> {
        let lines = lines
            .iter()
            .map(Line::from_spec)
            .collect::<Result<Vec<_>>>()?;
        let regions = lines
            .windows(2)
            .map(|pair| ShelfRegion::new(pair[0], pair[1]))
            .collect();
        Ok(Self { regions })
    }

    /// Placeable regions: those whose bottom line is not a dummy.
    pub fn regions(&self) -> Vec<&ShelfRegion> {
        self.regions.iter().filter(|r| !r.is_dummy()).collect()
    }

    /// Every region, including dummy-capped ones.
    pub fn all_regions(&self) -> &[ShelfRegion] {
        &self.regions
    }
}
