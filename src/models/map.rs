//! The game map: immutable topology plus the live per-game state placed
//! on it (posts mutate, trains come and go).
//!
//! Three serialization layers limit what goes over the wire:
//! layer 0 is static topology, layer 1 is dynamic state (built by the
//! game, which owns players and ratings), layer 10 is render hints.

use std::collections::BTreeMap;

use serde_json::{Value, json};

use crate::errors::ServerError;
use crate::models::point::{Coordinate, Line, Point};
use crate::models::post::{Post, PostType};
use crate::models::train::Train;

#[derive(Debug, Clone, Default)]
pub struct Map {
    pub idx: u32,
    pub name: String,
    pub size: (u32, u32),
    pub points: BTreeMap<u32, Point>,
    pub lines: BTreeMap<u32, Line>,
    pub posts: BTreeMap<u32, Post>,
    pub coordinates: BTreeMap<u32, Coordinate>,
    pub trains: BTreeMap<u32, Train>,
}

impl Map {
    /// Post ids of all towns, in id order.
    pub fn towns(&self) -> Vec<u32> {
        self.posts_of(PostType::Town)
    }

    pub fn markets(&self) -> Vec<u32> {
        self.posts_of(PostType::Market)
    }

    pub fn storages(&self) -> Vec<u32> {
        self.posts_of(PostType::Storage)
    }

    fn posts_of(&self, kind: PostType) -> Vec<u32> {
        self.posts
            .values()
            .filter(|p| p.post_type() == kind)
            .map(|p| p.idx)
            .collect()
    }

    pub fn add_train(&mut self, train: Train) {
        self.trains.insert(train.idx, train);
    }

    /// First line touching the given point. Every point on a legal map has
    /// at least one.
    pub fn line_at_point(&self, point_idx: u32) -> Option<&Line> {
        self.lines.values().find(|line| line.touches(point_idx))
    }

    /// Post placed on the given point, if any.
    pub fn post_at_point(&self, point_idx: u32) -> Option<&Post> {
        let post_id = self.points.get(&point_idx)?.post_id?;
        self.posts.get(&post_id)
    }

    /// Static topology: `{idx, name, line[], point[]}`.
    pub fn layer0(&self) -> Value {
        json!({
            "idx": self.idx,
            "name": self.name,
            "line": self.lines.values().collect::<Vec<_>>(),
            "point": self.points.values().collect::<Vec<_>>(),
        })
    }

    /// Render hints: `{idx, size, coordinate[]}`.
    pub fn layer10(&self) -> Value {
        json!({
            "idx": self.idx,
            "size": [self.size.0, self.size.1],
            "coordinate": self.coordinates.values().collect::<Vec<_>>(),
        })
    }

    /// Rebuilds topology from a layer 0 document. Dynamic state starts
    /// empty; used by tooling and round-trip tests.
    pub fn from_layer0(value: &Value) -> Result<Self, ServerError> {
        let mut map = Map {
            idx: value
                .get("idx")
                .and_then(Value::as_u64)
                .ok_or_else(|| ServerError::BadCommand("map document missing idx".into()))?
                as u32,
            name: value
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            ..Map::default()
        };
        if let Some(lines) = value.get("line").and_then(Value::as_array) {
            for line in lines {
                let line: Line = serde_json::from_value(line.clone())?;
                map.lines.insert(line.idx, line);
            }
        }
        if let Some(points) = value.get("point").and_then(Value::as_array) {
            for point in points {
                let point: Point = serde_json::from_value(point.clone())?;
                map.points.insert(point.idx, point);
            }
        }
        Ok(map)
    }
}
