//! Per-connection session: framing, command dispatch, teardown.
//!
//! A connection is served by one task. It is either a player session or
//! an observer session, never both. Every command runs inside a single
//! error envelope: known error kinds answer with their result code and a
//! `{"error": ...}` body, unknown faults answer 500 and keep the
//! connection alive. A dead socket tears the session down quietly.

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use uuid::Uuid;

use crate::errors::ServerError;
use crate::game::Game;
use crate::observer::Observer;
use crate::protocol::codec::{self, Frame, FrameDecoder};
use crate::protocol::{
    Action, LoginRequest, MapRequest, MoveRequest, ResultCode, UpgradeRequest,
};
use crate::state::AppState;

struct Reply {
    message: Option<String>,
    close: bool,
}

impl Reply {
    fn empty() -> Self {
        Self {
            message: None,
            close: false,
        }
    }

    fn message(message: String) -> Self {
        Self {
            message: Some(message),
            close: false,
        }
    }
}

pub struct Session {
    state: AppState,
    peer: SocketAddr,
    player: Option<Uuid>,
    game: Option<Arc<Game>>,
    observer: Option<Observer>,
}

/// Serves one accepted connection to completion.
pub async fn handle_connection(state: AppState, stream: TcpStream, peer: SocketAddr) {
    tracing::info!(%peer, "new connection");
    let (mut reader, mut writer) = stream.into_split();
    let mut decoder = FrameDecoder::new();
    let mut session = Session {
        state,
        peer,
        player: None,
        game: None,
        observer: None,
    };

    let mut chunk = [0u8; 4096];
    'serve: loop {
        let read = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                tracing::debug!(%peer, %err, "read failed");
                break;
            }
        };
        decoder.extend(&chunk[..read]);
        loop {
            match decoder.decode() {
                Ok(Some(frame)) => {
                    if session.serve_frame(&frame, &mut writer).await {
                        break 'serve;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(%peer, %err, "rejecting connection");
                    break 'serve;
                }
            }
        }
    }

    session.teardown().await;
    tracing::warn!(%peer, "connection closed");
}

impl Session {
    /// Handles one frame; returns true when the connection should close.
    async fn serve_frame(&mut self, frame: &Frame, writer: &mut OwnedWriteHalf) -> bool {
        match self.dispatch(frame).await {
            Ok(reply) => {
                let body = reply.message.unwrap_or_default();
                if self.respond(writer, ResultCode::Okey, &body).await.is_err() {
                    return true;
                }
                reply.close
            }
            Err(err) => {
                let (code, body) = if err.is_internal() {
                    tracing::error!(peer = %self.peer, %err, "command failed");
                    (ResultCode::InternalServerError, String::new())
                } else {
                    tracing::debug!(peer = %self.peer, %err, "command rejected");
                    (err.result_code(), json!({ "error": err.to_string() }).to_string())
                };
                self.respond(writer, code, &body).await.is_err()
            }
        }
    }

    async fn respond(
        &self,
        writer: &mut OwnedWriteHalf,
        result: ResultCode,
        body: &str,
    ) -> std::io::Result<()> {
        tracing::debug!(peer = %self.peer, result = result.code(), "response");
        writer.write_all(&codec::encode_response(result, body)).await
    }

    async fn dispatch(&mut self, frame: &Frame) -> Result<Reply, ServerError> {
        let payload: Value = serde_json::from_str(&frame.payload)?;
        if !payload.is_object() {
            return Err(ServerError::BadCommand(
                "the command payload is not an object".into(),
            ));
        }
        tracing::info!(
            peer = %self.peer,
            player = ?self.player,
            action = frame.code,
            "command"
        );

        if self.observer.is_some() {
            let action = Action::from_code(frame.code)
                .ok_or_else(|| ServerError::BadCommand("no such command".into()))?;
            let observer = self.observer.as_mut().expect("checked above");
            return Ok(match observer.handle(action, payload).await? {
                Some(message) => Reply::message(message),
                None => Reply::empty(),
            });
        }

        match Action::from_code(frame.code) {
            Some(Action::Login) => self.on_login(payload, &frame.payload).await,
            Some(Action::Logout) => self.on_logout().await,
            Some(Action::Map) => self.on_map(payload).await,
            Some(Action::Move) => self.on_move(payload, &frame.payload).await,
            Some(Action::Upgrade) => self.on_upgrade(payload, &frame.payload).await,
            Some(Action::Turn) => self.on_turn().await,
            Some(Action::Observer) => self.on_observer().await,
            _ => Err(ServerError::BadCommand("no such command".into())),
        }
    }

    fn require_login(&self) -> Result<(Uuid, Arc<Game>), ServerError> {
        match (self.player, &self.game) {
            (Some(player), Some(game)) => Ok((player, Arc::clone(game))),
            _ => Err(ServerError::AccessDenied("login required".into())),
        }
    }

    fn record(&self, action: Action, message: &str) {
        if let Some(replay) = self.game.as_ref().and_then(|g| g.replay.as_ref()) {
            replay.add_action(action.code(), Some(message));
        }
    }

    async fn on_login(&mut self, payload: Value, raw: &str) -> Result<Reply, ServerError> {
        if self.player.is_some() {
            return Err(ServerError::BadCommand("already logged in".into()));
        }
        let req: LoginRequest = serde_json::from_value(payload)?;
        let (game_name, num_players) = match &req.game {
            Some(game) => (
                game.clone(),
                req.num_players.ok_or_else(|| {
                    ServerError::BadCommand("num_players is required to join a named game".into())
                })?,
            ),
            None => (format!("Game of {}", req.name), 1),
        };

        let game = self
            .state
            .games
            .get_or_create(
                &game_name,
                num_players,
                &self.state.config,
                &self.state.maps,
                &self.state.replay,
            )
            .await?;
        if game.num_players != num_players {
            return Err(ServerError::BadCommand(format!(
                "incorrect players number requested, game: {game_name}, game players number: {}, \
                 requested players number: {num_players}",
                game.num_players
            )));
        }

        let idx = self.state.players.claim(&req.name, req.security_key.as_deref())?;
        let snapshot = game.add_player(idx, &req.name).await?;

        self.player = Some(idx);
        self.game = Some(game);
        self.record(Action::Login, raw);
        tracing::info!(player = %req.name, game = %game_name, "login");
        Ok(Reply::message(snapshot.to_string()))
    }

    async fn on_logout(&mut self) -> Result<Reply, ServerError> {
        let (player, game) = self.require_login()?;
        tracing::info!(player = %player, game = %game.name, "logout");
        self.leave(player, &game).await;
        self.player = None;
        self.game = None;
        Ok(Reply {
            message: None,
            close: true,
        })
    }

    async fn on_map(&mut self, payload: Value) -> Result<Reply, ServerError> {
        let (player, game) = self.require_login()?;
        let req: MapRequest = serde_json::from_value(payload)?;
        let layer = game.map_layer(Some(player), req.layer).await?;
        Ok(Reply::message(layer))
    }

    async fn on_move(&mut self, payload: Value, raw: &str) -> Result<Reply, ServerError> {
        let (player, game) = self.require_login()?;
        let req: MoveRequest = serde_json::from_value(payload)?;
        game.move_train(Some(player), req).await?;
        self.record(Action::Move, raw);
        Ok(Reply::empty())
    }

    async fn on_upgrade(&mut self, payload: Value, raw: &str) -> Result<Reply, ServerError> {
        let (player, game) = self.require_login()?;
        if payload.get("train").is_none() && payload.get("post").is_none() {
            return Err(ServerError::BadCommand(
                "either train or post ids are expected".into(),
            ));
        }
        let req: UpgradeRequest = serde_json::from_value(payload)?;
        game.upgrade(player, &req).await?;
        self.record(Action::Upgrade, raw);
        Ok(Reply::empty())
    }

    async fn on_turn(&mut self) -> Result<Reply, ServerError> {
        let (player, game) = self.require_login()?;
        game.turn(player).await?;
        Ok(Reply::empty())
    }

    async fn on_observer(&mut self) -> Result<Reply, ServerError> {
        if self.player.is_some() || self.game.is_some() {
            return Err(ServerError::BadCommand(
                "impossible to connect as observer".into(),
            ));
        }
        let observer = Observer::new(self.state.clone());
        let games = observer.games_list().await?;
        self.observer = Some(observer);
        tracing::info!(peer = %self.peer, "connection switched to observer");
        Ok(Reply::message(games))
    }

    /// Marks the player out of the game; the last one out stops it.
    async fn leave(&self, player: Uuid, game: &Arc<Game>) {
        let anyone_left = game.remove_player(player).await;
        if !anyone_left {
            game.stop().await;
            self.state.games.remove(&game.name).await;
        }
    }

    async fn teardown(&mut self) {
        if let (Some(player), Some(game)) = (self.player, self.game.clone()) {
            self.leave(player, &game).await;
        }
    }
}
