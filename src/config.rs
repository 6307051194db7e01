//! Server configuration.
//!
//! A `ServerConfig` is built once at startup from a named profile plus
//! environment overrides, then passed explicitly into `AppState` and every
//! `Game`; there is no global config. Level tables are sealed constants:
//! leveling up copies the explicit fields for the new level.

use std::env;
use std::time::Duration;

/// Per-level attributes of a town.
#[derive(Debug, Clone, Copy)]
pub struct TownLevel {
    pub population_capacity: u32,
    pub product_capacity: u32,
    pub armor_capacity: u32,
    /// Cooldown applied to a train sent home after a collision.
    pub train_cooldown: u32,
    pub next_level_price: Option<u32>,
}

/// Per-level attributes of a train.
#[derive(Debug, Clone, Copy)]
pub struct TrainLevel {
    pub goods_capacity: u32,
    pub fuel_capacity: u32,
    pub fuel_consumption: u32,
    pub next_level_price: Option<u32>,
}

pub const MAX_LEVEL: u8 = 3;

pub const TOWN_LEVELS: [TownLevel; 3] = [
    TownLevel {
        population_capacity: 10,
        product_capacity: 200,
        armor_capacity: 100,
        train_cooldown: 2,
        next_level_price: Some(100),
    },
    TownLevel {
        population_capacity: 20,
        product_capacity: 400,
        armor_capacity: 200,
        train_cooldown: 1,
        next_level_price: Some(200),
    },
    TownLevel {
        population_capacity: 40,
        product_capacity: 800,
        armor_capacity: 400,
        train_cooldown: 0,
        next_level_price: None,
    },
];

pub const TRAIN_LEVELS: [TrainLevel; 3] = [
    TrainLevel {
        goods_capacity: 40,
        fuel_capacity: 400,
        fuel_consumption: 1,
        next_level_price: Some(40),
    },
    TrainLevel {
        goods_capacity: 80,
        fuel_capacity: 800,
        fuel_consumption: 1,
        next_level_price: Some(80),
    },
    TrainLevel {
        goods_capacity: 160,
        fuel_capacity: 1600,
        fuel_consumption: 1,
        next_level_price: None,
    },
];

/// Looks up the town table for a 1-based level.
pub fn town_level(level: u8) -> &'static TownLevel {
    &TOWN_LEVELS[(level as usize).clamp(1, MAX_LEVEL as usize) - 1]
}

/// Looks up the train table for a 1-based level.
pub fn train_level(level: u8) -> &'static TrainLevel {
    &TRAIN_LEVELS[(level as usize).clamp(1, MAX_LEVEL as usize) - 1]
}

/// Odds and cooldown scaling for one random event class.
#[derive(Debug, Clone, Copy)]
pub struct EventOdds {
    /// Percent chance per eligible tick, 0 disables the event.
    pub probability: u32,
    pub power_range: (u32, u32),
    pub cooldown_coef: u32,
}

impl EventOdds {
    const fn disabled() -> Self {
        Self {
            probability: 0,
            power_range: (1, 3),
            cooldown_coef: 5,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EventsConfig {
    pub hijackers: EventOdds,
    pub parasites: EventOdds,
    pub refugees: EventOdds,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: String,
    pub port: u16,
    /// Map every new game is created on.
    pub map_name: String,
    pub tick_time: Duration,
    /// How long a TURN handler waits for the tick it requested.
    pub turn_timeout: Duration,
    pub trains_count: u32,
    pub collisions_enabled: bool,
    pub fuel_enabled: bool,
    /// When true an unload at the home town empties the train entirely,
    /// even if the town could not accept everything.
    pub full_unload: bool,
    pub events: EventsConfig,
    pub map_db_url: Option<String>,
    pub replay_db_url: Option<String>,
}

impl ServerConfig {
    pub fn production() -> Self {
        let tick_time = Duration::from_secs(10);
        Self {
            addr: "0.0.0.0".to_string(),
            port: 2000,
            map_name: "map03".to_string(),
            tick_time,
            turn_timeout: tick_time + Duration::from_secs(3),
            trains_count: 8,
            collisions_enabled: true,
            fuel_enabled: false,
            full_unload: true,
            events: EventsConfig {
                hijackers: EventOdds::disabled(),
                parasites: EventOdds::disabled(),
                refugees: EventOdds::disabled(),
            },
            map_db_url: None,
            replay_db_url: None,
        }
    }

    pub fn testing() -> Self {
        Self {
            addr: "127.0.0.1".to_string(),
            map_name: "map02".to_string(),
            trains_count: 2,
            ..Self::production()
        }
    }

    /// Testing profile with a deterministic event stream: refugees always
    /// arrive (power 1) so town counters stay assertable.
    pub fn testing_with_events() -> Self {
        let mut config = Self::testing();
        config.events.refugees = EventOdds {
            probability: 100,
            power_range: (1, 1),
            cooldown_coef: 5,
        };
        config
    }

    /// Builds the configuration from `RAIL_WARS_CONFIG` plus env overrides.
    pub fn from_env() -> Self {
        let profile = env::var("RAIL_WARS_CONFIG").unwrap_or_else(|_| "production".to_string());
        let mut config = match profile.as_str() {
            "testing" => Self::testing(),
            "testing_with_events" => Self::testing_with_events(),
            _ => Self::production(),
        };
        if let Ok(addr) = env::var("RAIL_WARS_ADDR") {
            config.addr = addr;
        }
        if let Ok(port) = env::var("RAIL_WARS_PORT") {
            if let Ok(port) = port.parse() {
                config.port = port;
            }
        }
        if let Ok(name) = env::var("RAIL_WARS_MAP") {
            config.map_name = name;
        }
        config.map_db_url = env::var("MAP_DB_URL").ok();
        config.replay_db_url = env::var("REPLAY_DB_URL").ok();
        config
    }
}
