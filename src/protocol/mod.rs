//! Canonical wire protocol types.
//!
//! Keep action/result codes and request payload shapes centralized so the
//! session dispatcher, the observer, and the replay log all agree on one
//! set of serde shapes.

pub mod codec;

use serde::Deserialize;

/// Client command codes, little-endian u32 on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Action {
    Login = 1,
    Logout = 2,
    Move = 3,
    Upgrade = 4,
    Turn = 5,
    Map = 10,
    Observer = 100,
    Game = 101,
    /// Server-internal: random events recorded into the replay log.
    Event = 102,
}

impl Action {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Action::Login),
            2 => Some(Action::Logout),
            3 => Some(Action::Move),
            4 => Some(Action::Upgrade),
            5 => Some(Action::Turn),
            10 => Some(Action::Map),
            100 => Some(Action::Observer),
            101 => Some(Action::Game),
            102 => Some(Action::Event),
            _ => None,
        }
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    /// Commands documented as payload-free; the codec tolerates a missing
    /// length prefix for these.
    pub fn payload_optional(self) -> bool {
        matches!(self, Action::Logout | Action::Observer)
    }
}

/// Server response codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ResultCode {
    Okey = 0,
    BadCommand = 1,
    ResourceNotFound = 2,
    AccessDenied = 5,
    NotReady = 21,
    Timeout = 258,
    InternalServerError = 500,
}

impl ResultCode {
    pub fn code(self) -> u32 {
        self as u32
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub name: String,
    #[serde(default)]
    pub security_key: Option<String>,
    #[serde(default)]
    pub game: Option<String>,
    #[serde(default)]
    pub num_players: Option<u32>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MapRequest {
    pub layer: u32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MoveRequest {
    pub train_idx: u32,
    pub speed: i32,
    pub line_idx: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpgradeRequest {
    #[serde(default)]
    pub post: Vec<u32>,
    #[serde(default)]
    pub train: Vec<u32>,
}

/// Observer TURN / GAME payload: a single index.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct IdxRequest {
    pub idx: i64,
}
