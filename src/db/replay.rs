//! Append-only replay log.
//!
//! Every game records its LOGIN/MOVE/UPGRADE/TURN/EVENT actions so an
//! observer can replay it later. Actions buffer in memory per game and
//! are drained by the tick task; the buffer is flushed before a game is
//! reported finished.

use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::errors::ServerError;

/// One recorded game, as listed to observers.
#[derive(Debug, Clone, Serialize)]
pub struct GameRecord {
    pub idx: i64,
    pub name: String,
    pub date: String,
    pub map: String,
    /// Number of TURN actions, i.e. ticks the game ran.
    pub length: i64,
    pub num_players: u32,
}

/// One recorded action of a game.
#[derive(Debug, Clone, Serialize)]
pub struct ActionRecord {
    pub code: u32,
    pub message: Option<String>,
    pub date: String,
}

#[derive(Debug, Clone)]
pub struct ReplayRepository {
    pool: SqlitePool,
}

impl ReplayRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), ServerError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS game (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                date TEXT NOT NULL,
                map TEXT NOT NULL,
                num_players INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS action (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                game_id INTEGER NOT NULL,
                code INTEGER NOT NULL,
                message TEXT,
                date TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Registers a game and returns its replay id.
    pub async fn add_game(
        &self,
        name: &str,
        map_name: &str,
        num_players: u32,
    ) -> Result<i64, ServerError> {
        let result = sqlx::query(
            "INSERT INTO game (name, date, map, num_players) VALUES ($1, $2, $3, $4)",
        )
        .bind(name)
        .bind(Utc::now().to_rfc3339())
        .bind(map_name)
        .bind(num_players as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn insert_action(
        &self,
        game_id: i64,
        code: u32,
        message: Option<&str>,
        date: &str,
    ) -> Result<(), ServerError> {
        sqlx::query("INSERT INTO action (game_id, code, message, date) VALUES ($1, $2, $3, $4)")
            .bind(game_id)
            .bind(code as i64)
            .bind(message)
            .bind(date)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// All recorded games in insertion order, with their TURN counts.
    pub async fn get_all_games(&self) -> Result<Vec<GameRecord>, ServerError> {
        let rows = sqlx::query_as::<_, (i64, String, String, String, i64, i64)>(
            "SELECT g.id, g.name, g.date, g.map, g.num_players,
                    (SELECT COUNT(id) FROM action a WHERE a.game_id = g.id AND a.code = 5)
             FROM game g ORDER BY g.id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(idx, name, date, map, num_players, length)| GameRecord {
                idx,
                name,
                date,
                map,
                length,
                num_players: num_players as u32,
            })
            .collect())
    }

    /// All actions of one game in insertion order.
    pub async fn get_all_actions(&self, game_id: i64) -> Result<Vec<ActionRecord>, ServerError> {
        let rows = sqlx::query_as::<_, (i64, Option<String>, String)>(
            "SELECT code, message, date FROM action WHERE game_id = $1 ORDER BY id",
        )
        .bind(game_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(code, message, date)| ActionRecord {
                code: code as u32,
                message,
                date,
            })
            .collect())
    }
}

#[derive(Debug)]
struct PendingAction {
    code: u32,
    message: Option<String>,
    date: String,
}

/// Per-game write buffer over the repository. `add_action` is cheap and
/// synchronous so it can run under the game lock; `flush` does the actual
/// writes and is called off the hot path. Flushes are serialized so
/// concurrent callers cannot reorder actions in the store.
#[derive(Debug)]
pub struct ReplayLog {
    repo: ReplayRepository,
    game_id: i64,
    buf: Mutex<Vec<PendingAction>>,
    flushing: tokio::sync::Mutex<()>,
}

impl ReplayLog {
    /// Opens the log for a new game.
    pub async fn open(
        repo: ReplayRepository,
        name: &str,
        map_name: &str,
        num_players: u32,
    ) -> Result<Self, ServerError> {
        let game_id = repo.add_game(name, map_name, num_players).await?;
        Ok(Self {
            repo,
            game_id,
            buf: Mutex::new(Vec::new()),
            flushing: tokio::sync::Mutex::new(()),
        })
    }

    pub fn game_id(&self) -> i64 {
        self.game_id
    }

    pub fn add_action(&self, code: u32, message: Option<&str>) {
        let mut buf = self.buf.lock().expect("replay buffer poisoned");
        buf.push(PendingAction {
            code,
            message: message.map(str::to_string),
            date: Utc::now().to_rfc3339(),
        });
    }

    /// Persists all buffered actions in order.
    pub async fn flush(&self) -> Result<(), ServerError> {
        let _guard = self.flushing.lock().await;
        let pending: Vec<PendingAction> = {
            let mut buf = self.buf.lock().expect("replay buffer poisoned");
            buf.drain(..).collect()
        };
        for action in &pending {
            self.repo
                .insert_action(
                    self.game_id,
                    action.code,
                    action.message.as_deref(),
                    &action.date,
                )
                .await?;
        }
        Ok(())
    }
}
