use serde_json::{Value, json};
use uuid::Uuid;

use crate::config::{self, MAX_LEVEL};
use crate::models::event::Event;
use crate::models::post::PostType;

/// A train transporting goods along the lines of the map.
///
/// `post_type` names the kind of post the cargo was loaded at (market
/// product or storage armor); it is `None` exactly when `goods == 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct Train {
    pub idx: u32,
    pub line_idx: u32,
    pub position: u32,
    pub speed: i32,
    pub player_id: Uuid,
    pub level: u8,
    pub goods: u32,
    pub goods_capacity: u32,
    pub post_type: Option<PostType>,
    pub cooldown: u32,
    pub fuel: u32,
    pub fuel_capacity: u32,
    pub fuel_consumption: u32,
    pub next_level_price: Option<u32>,
    pub events: Vec<Event>,
}

impl Train {
    pub fn new(idx: u32, player_id: Uuid, line_idx: u32, position: u32) -> Self {
        let table = config::train_level(1);
        Self {
            idx,
            line_idx,
            position,
            speed: 0,
            player_id,
            level: 1,
            goods: 0,
            goods_capacity: table.goods_capacity,
            post_type: None,
            cooldown: 0,
            fuel: table.fuel_capacity,
            fuel_capacity: table.fuel_capacity,
            fuel_consumption: table.fuel_consumption,
            next_level_price: table.next_level_price,
            events: Vec::new(),
        }
    }

    /// Copies the attributes of the next level onto the train.
    pub fn level_up(&mut self) {
        if self.level < MAX_LEVEL {
            self.level += 1;
            let table = config::train_level(self.level);
            self.goods_capacity = table.goods_capacity;
            self.fuel_capacity = table.fuel_capacity;
            self.fuel_consumption = table.fuel_consumption;
            self.next_level_price = table.next_level_price;
        }
    }

    /// Drops all cargo, keeping the goods/post_type invariant.
    pub fn devastate(&mut self) {
        self.goods = 0;
        self.post_type = None;
    }

    /// Loads `amount` goods of the given kind. Keeps `post_type` in sync.
    pub fn load(&mut self, kind: PostType, amount: u32) {
        self.goods += amount;
        if self.goods > 0 {
            self.post_type = Some(kind);
        }
    }

    pub fn snapshot(&self, include_events: bool) -> Value {
        let events: Vec<&Event> = if include_events {
            self.events.iter().collect()
        } else {
            Vec::new()
        };
        json!({
            "idx": self.idx,
            "line_idx": self.line_idx,
            "position": self.position,
            "speed": self.speed,
            "player_id": self.player_id,
            "level": self.level,
            "goods": self.goods,
            "goods_capacity": self.goods_capacity,
            "post_type": self.post_type,
            "cooldown": self.cooldown,
            "fuel": self.fuel,
            "fuel_capacity": self.fuel_capacity,
            "events": events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn train() -> Train {
        Train::new(1, Uuid::new_v4(), 1, 0)
    }

    #[test]
    fn test_level_up_copies_table_fields() {
        let mut train = train();
        assert_eq!(train.goods_capacity, 40);
        train.level_up();
        assert_eq!(train.level, 2);
        assert_eq!(train.goods_capacity, 80);
        assert_eq!(train.next_level_price, Some(80));
        train.level_up();
        train.level_up();
        assert_eq!(train.level, 3);
        assert!(train.next_level_price.is_none());
    }

    #[test]
    fn test_cargo_invariant() {
        let mut train = train();
        train.load(PostType::Market, 5);
        assert_eq!(train.post_type, Some(PostType::Market));
        train.devastate();
        assert_eq!(train.goods, 0);
        assert!(train.post_type.is_none());
    }

    #[test]
    fn test_snapshot_fields() {
        let mut train = train();
        train.events.push(Event::train_collision(1, 2));
        let json = train.snapshot(true);
        assert_eq!(json["idx"], 1);
        assert_eq!(json["speed"], 0);
        assert_eq!(json["post_type"], Value::Null);
        assert_eq!(json["events"].as_array().unwrap().len(), 1);
        assert!(train.snapshot(false)["events"].as_array().unwrap().is_empty());
    }
}
