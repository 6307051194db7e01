use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::config::{self, MAX_LEVEL};
use crate::models::event::Event;

/// Kind of a post, numeric on the wire.
///
/// TOWN - population lives here, eats product, spends armor on defense and
/// upgrades. MARKET - supplies trains with product. STORAGE - supplies
/// trains with armor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PostType {
    Town = 1,
    Market = 2,
    Storage = 3,
}

impl PostType {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(PostType::Town),
            2 => Some(PostType::Market),
            3 => Some(PostType::Storage),
            _ => None,
        }
    }
}

impl Serialize for PostType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(*self as u32)
    }
}

impl<'de> Deserialize<'de> for PostType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u32::deserialize(deserializer)?;
        PostType::from_code(code)
            .ok_or_else(|| de::Error::custom(format!("unknown post type {code}")))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Town {
    pub level: u8,
    pub population: u32,
    pub product: u32,
    pub armor: u32,
    pub player_id: Option<Uuid>,
    pub population_capacity: u32,
    pub product_capacity: u32,
    pub armor_capacity: u32,
    pub train_cooldown: u32,
    pub next_level_price: Option<u32>,
}

impl Town {
    pub fn new(level: u8, population: u32, product: u32, armor: u32) -> Self {
        let table = config::town_level(level);
        Self {
            level,
            population: population.min(table.population_capacity),
            product: product.min(table.product_capacity),
            armor: armor.min(table.armor_capacity),
            player_id: None,
            population_capacity: table.population_capacity,
            product_capacity: table.product_capacity,
            armor_capacity: table.armor_capacity,
            train_cooldown: table.train_cooldown,
            next_level_price: table.next_level_price,
        }
    }

    /// Copies the attributes of the next level onto the town. Current
    /// resource amounts are kept, capacities widen.
    pub fn level_up(&mut self) {
        if self.level < MAX_LEVEL {
            self.level += 1;
            let table = config::town_level(self.level);
            self.population_capacity = table.population_capacity;
            self.product_capacity = table.product_capacity;
            self.armor_capacity = table.armor_capacity;
            self.train_cooldown = table.train_cooldown;
            self.next_level_price = table.next_level_price;
        }
    }

    /// Adds product up to capacity, returning (accepted, hit_capacity).
    pub fn add_product(&mut self, amount: u32) -> (u32, bool) {
        let accepted = amount.min(self.product_capacity - self.product);
        self.product += accepted;
        (accepted, accepted < amount || self.product == self.product_capacity)
    }

    /// Adds armor up to capacity, returning (accepted, hit_capacity).
    pub fn add_armor(&mut self, amount: u32) -> (u32, bool) {
        let accepted = amount.min(self.armor_capacity - self.armor);
        self.armor += accepted;
        (accepted, accepted < amount || self.armor == self.armor_capacity)
    }

    /// Adds population up to capacity, returning (accepted, hit_capacity).
    pub fn add_population(&mut self, amount: u32) -> (u32, bool) {
        let accepted = amount.min(self.population_capacity - self.population);
        self.population += accepted;
        (
            accepted,
            accepted < amount || self.population == self.population_capacity,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Market {
    pub product: u32,
    pub product_capacity: u32,
    pub replenishment: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Storage {
    pub armor: u32,
    pub armor_capacity: u32,
    pub replenishment: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PostKind {
    Town(Town),
    Market(Market),
    Storage(Storage),
}

/// A fixture placed on exactly one point of the map.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub idx: u32,
    pub name: String,
    pub point_id: u32,
    pub kind: PostKind,
    /// Events since the owner's last Layer 1 observation.
    pub events: Vec<Event>,
}

impl Post {
    pub fn town(idx: u32, name: &str, point_id: u32, town: Town) -> Self {
        Self {
            idx,
            name: name.to_string(),
            point_id,
            kind: PostKind::Town(town),
            events: Vec::new(),
        }
    }

    pub fn market(idx: u32, name: &str, point_id: u32, product: u32, replenishment: u32) -> Self {
        Self {
            idx,
            name: name.to_string(),
            point_id,
            kind: PostKind::Market(Market {
                product,
                product_capacity: product,
                replenishment,
            }),
            events: Vec::new(),
        }
    }

    pub fn storage(idx: u32, name: &str, point_id: u32, armor: u32, replenishment: u32) -> Self {
        Self {
            idx,
            name: name.to_string(),
            point_id,
            kind: PostKind::Storage(Storage {
                armor,
                armor_capacity: armor,
                replenishment,
            }),
            events: Vec::new(),
        }
    }

    pub fn post_type(&self) -> PostType {
        match self.kind {
            PostKind::Town(_) => PostType::Town,
            PostKind::Market(_) => PostType::Market,
            PostKind::Storage(_) => PostType::Storage,
        }
    }

    pub fn as_town(&self) -> Option<&Town> {
        match &self.kind {
            PostKind::Town(town) => Some(town),
            _ => None,
        }
    }

    pub fn as_town_mut(&mut self) -> Option<&mut Town> {
        match &mut self.kind {
            PostKind::Town(town) => Some(town),
            _ => None,
        }
    }

    /// Owner of the post, set once when the first player claims the town.
    pub fn owner(&self) -> Option<Uuid> {
        self.as_town().and_then(|t| t.player_id)
    }

    /// Wire snapshot of the post. Events are included only when the caller
    /// is entitled to see them.
    pub fn snapshot(&self, include_events: bool) -> Value {
        let events: Vec<&Event> = if include_events {
            self.events.iter().collect()
        } else {
            Vec::new()
        };
        let mut value = json!({
            "idx": self.idx,
            "name": self.name,
            "type": self.post_type(),
            "point_id": self.point_id,
            "events": events,
        });
        let fields = value.as_object_mut().unwrap();
        match &self.kind {
            PostKind::Town(town) => {
                fields.insert("level".into(), json!(town.level));
                fields.insert("population".into(), json!(town.population));
                fields.insert("product".into(), json!(town.product));
                fields.insert("armor".into(), json!(town.armor));
                fields.insert("player_id".into(), json!(town.player_id));
                fields.insert(
                    "population_capacity".into(),
                    json!(town.population_capacity),
                );
                fields.insert("product_capacity".into(), json!(town.product_capacity));
                fields.insert("armor_capacity".into(), json!(town.armor_capacity));
                fields.insert("train_cooldown".into(), json!(town.train_cooldown));
                fields.insert("next_level_price".into(), json!(town.next_level_price));
            }
            PostKind::Market(market) => {
                fields.insert("product".into(), json!(market.product));
                fields.insert("product_capacity".into(), json!(market.product_capacity));
                fields.insert("replenishment".into(), json!(market.replenishment));
            }
            PostKind::Storage(storage) => {
                fields.insert("armor".into(), json!(storage.armor));
                fields.insert("armor_capacity".into(), json!(storage.armor_capacity));
                fields.insert("replenishment".into(), json!(storage.replenishment));
            }
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_town_capacities_follow_level() {
        let mut town = Town::new(1, 3, 35, 0);
        assert_eq!(town.population_capacity, 10);
        assert_eq!(town.next_level_price, Some(100));
        town.level_up();
        assert_eq!(town.level, 2);
        assert_eq!(town.product_capacity, 400);
        assert_eq!(town.train_cooldown, 1);
        town.level_up();
        assert_eq!(town.level, 3);
        assert!(town.next_level_price.is_none());
        // Level 3 is terminal.
        town.level_up();
        assert_eq!(town.level, 3);
    }

    #[test]
    fn test_add_product_clamps_at_capacity() {
        let mut town = Town::new(1, 0, 195, 0);
        let (accepted, overflow) = town.add_product(10);
        assert_eq!(accepted, 5);
        assert!(overflow);
        assert_eq!(town.product, 200);
        let (accepted, overflow) = town.add_product(0);
        assert_eq!(accepted, 0);
        assert!(overflow);
    }

    #[test]
    fn test_market_snapshot_fields() {
        let post = Post::market(2, "market-small", 7, 5, 1);
        let json = post.snapshot(true);
        assert_eq!(json["type"], 2);
        assert_eq!(json["product"], 5);
        assert_eq!(json["product_capacity"], 5);
        assert!(json.get("population").is_none());
    }

    #[test]
    fn test_snapshot_hides_foreign_events() {
        let mut post = Post::town(1, "town-one", 1, Town::new(1, 3, 35, 0));
        post.events.push(Event::game_over(9));
        assert_eq!(post.snapshot(true)["events"].as_array().unwrap().len(), 1);
        assert!(post.snapshot(false)["events"].as_array().unwrap().is_empty());
    }
}
