use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::{Value, json};
use uuid::Uuid;

use crate::config;
use crate::errors::ServerError;
use crate::models::map::Map;

/// A player inside one game. Entity links are ids, resolved through the
/// map at use-site.
#[derive(Debug, Clone)]
pub struct Player {
    pub idx: Uuid,
    pub name: String,
    /// Point of the home town.
    pub home: u32,
    /// Post id of the home town.
    pub town: u32,
    /// Ids of the player's trains.
    pub trains: Vec<u32>,
    pub in_game: bool,
    pub turn_done: bool,
}

impl Player {
    pub fn new(idx: Uuid, name: &str, home: u32, town: u32) -> Self {
        Self {
            idx,
            name: name.to_string(),
            home,
            town,
            trains: Vec::new(),
            in_game: true,
            turn_done: false,
        }
    }

    /// Scoreboard value: population is weighted heavily, then stockpiles,
    /// then everything ever spent on levels.
    pub fn rating(&self, map: &Map) -> u64 {
        let mut rating = 0u64;
        if let Some(town) = map.posts.get(&self.town).and_then(|p| p.as_town()) {
            rating += town.population as u64 * 1000;
            rating += (town.product + town.armor) as u64;
            for level in 1..town.level {
                if let Some(price) = config::town_level(level).next_level_price {
                    rating += price as u64;
                }
            }
        }
        for train_id in &self.trains {
            if let Some(train) = map.trains.get(train_id) {
                for level in 1..train.level {
                    if let Some(price) = config::train_level(level).next_level_price {
                        rating += price as u64;
                    }
                }
            }
        }
        rating
    }

    /// Login response snapshot: the player with home point, town post and
    /// trains embedded.
    pub fn snapshot(&self, map: &Map) -> Value {
        let home = map.points.get(&self.home);
        let town = map.posts.get(&self.town).map(|p| p.snapshot(true));
        let trains: Vec<Value> = self
            .trains
            .iter()
            .filter_map(|idx| map.trains.get(idx))
            .map(|t| t.snapshot(true))
            .collect();
        json!({
            "idx": self.idx,
            "name": self.name,
            "home": home,
            "town": town,
            "train": trains,
            "rating": self.rating(map),
            "in_game": self.in_game,
        })
    }
}

/// Process-wide player records: a name claims a stable id and binds its
/// security key on first login.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    records: Mutex<HashMap<String, PlayerRecord>>,
}

#[derive(Debug, Clone)]
struct PlayerRecord {
    idx: Uuid,
    security_key: Option<String>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `name`, verifying the security key against the stored record.
    /// The first login for a name registers whatever key it presented.
    pub fn claim(&self, name: &str, security_key: Option<&str>) -> Result<Uuid, ServerError> {
        let mut records = self.records.lock().expect("player registry poisoned");
        match records.get(name) {
            Some(record) => {
                if record.security_key.as_deref() != security_key {
                    return Err(ServerError::AccessDenied("security key mismatch".into()));
                }
                Ok(record.idx)
            }
            None => {
                let idx = Uuid::new_v4();
                records.insert(
                    name.to_string(),
                    PlayerRecord {
                        idx,
                        security_key: security_key.map(str::to_string),
                    },
                );
                Ok(idx)
            }
        }
    }

    /// Resolves a name without key verification. Used by the observer when
    /// rebuilding recorded games.
    pub fn resolve(&self, name: &str) -> Uuid {
        let mut records = self.records.lock().expect("player registry poisoned");
        records
            .entry(name.to_string())
            .or_insert_with(|| PlayerRecord {
                idx: Uuid::new_v4(),
                security_key: None,
            })
            .idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_registers_first_key() {
        let registry = PlayerRegistry::new();
        let idx = registry.claim("Nika", Some("s3cret")).unwrap();
        assert_eq!(registry.claim("Nika", Some("s3cret")).unwrap(), idx);
        assert!(registry.claim("Nika", Some("wrong")).is_err());
        assert!(registry.claim("Nika", None).is_err());
    }

    #[test]
    fn test_claim_without_key() {
        let registry = PlayerRegistry::new();
        let idx = registry.claim("Boris", None).unwrap();
        assert_eq!(registry.claim("Boris", None).unwrap(), idx);
    }

    #[test]
    fn test_distinct_names_get_distinct_ids() {
        let registry = PlayerRegistry::new();
        let a = registry.claim("a", None).unwrap();
        let b = registry.claim("b", None).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_resolve_matches_claim() {
        let registry = PlayerRegistry::new();
        let idx = registry.claim("Vera", Some("key")).unwrap();
        assert_eq!(registry.resolve("Vera"), idx);
    }
}
