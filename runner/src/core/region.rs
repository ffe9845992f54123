//! Spatial membership predicates used to gate arrival and to pick among
//! otherwise identical scene objects.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A map coordinate on a given plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tile {
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub plane: u8,
}

impl Tile {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y, plane: 0 }
    }

    pub const fn on_plane(x: i32, y: i32, plane: u8) -> Self {
        Self { x, y, plane }
    }

    /// Euclidean distance; tiles on different planes are infinitely far apart.
    pub fn distance(&self, other: &Tile) -> f64 {
        if self.plane != other.plane {
            return f64::INFINITY;
        }
        let dx = f64::from(self.x - other.x);
        let dy = f64::from(self.y - other.y);
        (dx * dx + dy * dy).sqrt()
    }

    /// Chebyshev distance, the number of steps for eight-way movement.
    pub fn steps_to(&self, other: &Tile) -> Option<u32> {
        if self.plane != other.plane {
            return None;
        }
        Some((self.x - other.x).unsigned_abs().max((self.y - other.y).unsigned_abs()))
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.plane)
    }
}

/// Closed region on a single plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Region {
    /// Inclusive axis-aligned rectangle.
    Rect { min: Tile, max: Tile },
    /// Simple polygon; boundary points count as inside.
    Polygon { vertices: Vec<Tile> },
}

impl Region {
    /// Build a rectangle from any two opposite corners.
    pub fn rect(a: Tile, b: Tile) -> Self {
        Region::Rect {
            min: Tile::on_plane(a.x.min(b.x), a.y.min(b.y), a.plane),
            max: Tile::on_plane(a.x.max(b.x), a.y.max(b.y), a.plane),
        }
    }

    pub fn polygon(vertices: Vec<Tile>) -> Self {
        Region::Polygon { vertices }
    }

    pub fn plane(&self) -> u8 {
        match self {
            Region::Rect { min, .. } => min.plane,
            Region::Polygon { vertices } => vertices.first().map_or(0, |v| v.plane),
        }
    }

    pub fn contains(&self, point: &Tile) -> bool {
        if point.plane != self.plane() {
            return false;
        }
        match self {
            Region::Rect { min, max } => {
                (min.x..=max.x).contains(&point.x) && (min.y..=max.y).contains(&point.y)
            }
            Region::Polygon { vertices } => polygon_contains(vertices, point),
        }
    }

    /// Center tile, rounded toward the minimum corner.
    pub fn center(&self) -> Tile {
        match self {
            Region::Rect { min, max } => Tile::on_plane(
                min.x + (max.x - min.x) / 2,
                min.y + (max.y - min.y) / 2,
                min.plane,
            ),
            Region::Polygon { vertices } => {
                if vertices.is_empty() {
                    return Tile::new(0, 0);
                }
                let n = vertices.len() as i64;
                let sx: i64 = vertices.iter().map(|v| i64::from(v.x)).sum();
                let sy: i64 = vertices.iter().map(|v| i64::from(v.y)).sum();
                Tile::on_plane((sx / n) as i32, (sy / n) as i32, self.plane())
            }
        }
    }

    /// Rectangle grown by `by` tiles on every side. Polygons are returned as
    /// their grown bounding box.
    pub fn expanded(&self, by: i32) -> Region {
        let (min, max) = self.bounds();
        Region::rect(
            Tile::on_plane(min.x - by, min.y - by, min.plane),
            Tile::on_plane(max.x + by, max.y + by, max.plane),
        )
    }

    fn bounds(&self) -> (Tile, Tile) {
        match self {
            Region::Rect { min, max } => (*min, *max),
            Region::Polygon { vertices } => {
                let plane = self.plane();
                let min_x = vertices.iter().map(|v| v.x).min().unwrap_or(0);
                let min_y = vertices.iter().map(|v| v.y).min().unwrap_or(0);
                let max_x = vertices.iter().map(|v| v.x).max().unwrap_or(0);
                let max_y = vertices.iter().map(|v| v.y).max().unwrap_or(0);
                (
                    Tile::on_plane(min_x, min_y, plane),
                    Tile::on_plane(max_x, max_y, plane),
                )
            }
        }
    }
}

fn polygon_contains(vertices: &[Tile], point: &Tile) -> bool {
    if vertices.len() < 3 {
        return vertices.iter().any(|v| v.x == point.x && v.y == point.y);
    }
    let (px, py) = (i64::from(point.x), i64::from(point.y));
    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let (xi, yi) = (i64::from(vertices[i].x), i64::from(vertices[i].y));
        let (xj, yj) = (i64::from(vertices[j].x), i64::from(vertices[j].y));
        if on_segment((xi, yi), (xj, yj), (px, py)) {
            return true;
        }
        if (yi > py) != (yj > py) {
            // x coordinate of the edge at height py, compared without division.
            let lhs = (px - xi) * (yj - yi);
            let rhs = (xj - xi) * (py - yi);
            if (yj > yi && lhs < rhs) || (yj < yi && lhs > rhs) {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn on_segment(a: (i64, i64), b: (i64, i64), p: (i64, i64)) -> bool {
    let cross = (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0);
    cross == 0
        && p.0 >= a.0.min(b.0)
        && p.0 <= a.0.max(b.0)
        && p.1 >= a.1.min(b.1)
        && p.1 <= a.1.max(b.1)
}
