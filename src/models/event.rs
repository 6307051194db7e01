use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Kinds of in-game events, numeric on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum EventType {
    TrainCollision = 1,
    HijackersAssault = 2,
    ParasitesAssault = 3,
    RefugeesArrival = 4,
    ResourceOverflow = 5,
    ResourceLack = 6,
    GameOver = 100,
}

impl EventType {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(EventType::TrainCollision),
            2 => Some(EventType::HijackersAssault),
            3 => Some(EventType::ParasitesAssault),
            4 => Some(EventType::RefugeesArrival),
            5 => Some(EventType::ResourceOverflow),
            6 => Some(EventType::ResourceLack),
            100 => Some(EventType::GameOver),
            _ => None,
        }
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(*self as u32)
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u32::deserialize(deserializer)?;
        EventType::from_code(code)
            .ok_or_else(|| de::Error::custom(format!("unknown event type {code}")))
    }
}

/// One event attached to a town or a train, delivered to the owner via a
/// Layer 1 read and cleared once observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventType,
    pub tick: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub train: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub hijackers_power: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parasites_power: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub refugees_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub population: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub product: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub armor: Option<u32>,
}

impl Event {
    fn base(kind: EventType, tick: u64) -> Self {
        Self {
            kind,
            tick,
            train: None,
            hijackers_power: None,
            parasites_power: None,
            refugees_number: None,
            population: None,
            product: None,
            armor: None,
        }
    }

    /// Collision with another train, naming the other party.
    pub fn train_collision(tick: u64, other_train: u32) -> Self {
        Self {
            train: Some(other_train),
            ..Self::base(EventType::TrainCollision, tick)
        }
    }

    pub fn hijackers_assault(tick: u64, power: u32) -> Self {
        Self {
            hijackers_power: Some(power),
            ..Self::base(EventType::HijackersAssault, tick)
        }
    }

    pub fn parasites_assault(tick: u64, power: u32) -> Self {
        Self {
            parasites_power: Some(power),
            ..Self::base(EventType::ParasitesAssault, tick)
        }
    }

    pub fn refugees_arrival(tick: u64, number: u32) -> Self {
        Self {
            refugees_number: Some(number),
            ..Self::base(EventType::RefugeesArrival, tick)
        }
    }

    pub fn population_overflow(tick: u64, population: u32) -> Self {
        Self {
            population: Some(population),
            ..Self::base(EventType::ResourceOverflow, tick)
        }
    }

    pub fn product_overflow(tick: u64, product: u32) -> Self {
        Self {
            product: Some(product),
            ..Self::base(EventType::ResourceOverflow, tick)
        }
    }

    pub fn armor_overflow(tick: u64, armor: u32) -> Self {
        Self {
            armor: Some(armor),
            ..Self::base(EventType::ResourceOverflow, tick)
        }
    }

    pub fn product_lack(tick: u64) -> Self {
        Self {
            product: Some(0),
            ..Self::base(EventType::ResourceLack, tick)
        }
    }

    pub fn armor_lack(tick: u64) -> Self {
        Self {
            armor: Some(0),
            ..Self::base(EventType::ResourceLack, tick)
        }
    }

    pub fn game_over(tick: u64) -> Self {
        Self {
            population: Some(0),
            ..Self::base(EventType::GameOver, tick)
        }
    }
}
