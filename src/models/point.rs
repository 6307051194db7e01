use serde::{Deserialize, Serialize};

/// A vertex of the transport graph. Carries the id of the post placed on
/// it, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub idx: u32,
    pub post_id: Option<u32>,
}

/// An undirected edge of integer length. Positions along the line run
/// from 0 at `point[0]` to `length` at `point[1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    pub idx: u32,
    pub length: u32,
    #[serde(rename = "point")]
    pub points: [u32; 2],
}

impl Line {
    pub fn new(idx: u32, length: u32, p0: u32, p1: u32) -> Self {
        Self {
            idx,
            length,
            points: [p0, p1],
        }
    }

    pub fn touches(&self, point_idx: u32) -> bool {
        self.points[0] == point_idx || self.points[1] == point_idx
    }

    /// Position value of the given endpoint, if the line touches it.
    pub fn position_of(&self, point_idx: u32) -> Option<u32> {
        if self.points[0] == point_idx {
            Some(0)
        } else if self.points[1] == point_idx {
            Some(self.length)
        } else {
            None
        }
    }
}

/// Render-hint coordinates for one point (Layer 10 only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinate {
    pub idx: u32,
    pub x: i32,
    pub y: i32,
}
