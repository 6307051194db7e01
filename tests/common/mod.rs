//! Test helpers: an in-process server and a client speaking the binary
//! protocol over a plain TCP stream.
#![allow(dead_code)]

use std::net::SocketAddr;

use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use rail_wars_be::config::ServerConfig;
use rail_wars_be::protocol::codec;
use rail_wars_be::server;
use rail_wars_be::state::AppState;

/// Boots a server on an ephemeral port and returns its address.
pub async fn spawn_server(config: ServerConfig) -> (SocketAddr, AppState) {
    let state = AppState::new(config)
        .await
        .expect("failed to build app state");
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test listener");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(state.clone(), listener));
    (addr, state)
}

pub struct GameClient {
    stream: TcpStream,
}

impl GameClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr)
            .await
            .expect("failed to connect to test server");
        Self { stream }
    }

    /// Sends one framed command and reads the framed response back.
    pub async fn send(&mut self, action: u32, payload: &str) -> (u32, Value) {
        self.stream
            .write_all(&codec::encode_request(action, payload))
            .await
            .expect("write failed");
        self.read_response().await
    }

    /// Sends a bare action word with no length prefix (LOGOUT/OBSERVER
    /// tolerate this).
    pub async fn send_bare(&mut self, action: u32) -> (u32, Value) {
        self.stream
            .write_all(&action.to_le_bytes())
            .await
            .expect("write failed");
        self.read_response().await
    }

    pub async fn read_response(&mut self) -> (u32, Value) {
        let mut header = [0u8; 8];
        self.stream
            .read_exact(&mut header)
            .await
            .expect("read failed");
        let result = u32::from_le_bytes(header[0..4].try_into().unwrap());
        let len = u32::from_le_bytes(header[4..8].try_into().unwrap()) as usize;
        let mut body = vec![0u8; len];
        self.stream
            .read_exact(&mut body)
            .await
            .expect("read failed");
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).expect("response body is not JSON")
        };
        (result, value)
    }

    pub async fn login(&mut self, name: &str) -> Value {
        let (result, body) = self.send(1, &json!({ "name": name }).to_string()).await;
        assert_eq!(result, 0, "login failed: {body}");
        body
    }

    pub async fn login_to(&mut self, name: &str, game: &str, num_players: u32) -> (u32, Value) {
        self.send(
            1,
            &json!({ "name": name, "game": game, "num_players": num_players }).to_string(),
        )
        .await
    }

    pub async fn turn(&mut self) -> (u32, Value) {
        self.send(5, "{}").await
    }

    pub async fn move_train(&mut self, train_idx: u32, speed: i32, line_idx: u32) -> (u32, Value) {
        self.send(
            3,
            &json!({ "train_idx": train_idx, "speed": speed, "line_idx": line_idx }).to_string(),
        )
        .await
    }

    pub async fn map(&mut self, layer: u32) -> Value {
        let (result, body) = self.send(10, &json!({ "layer": layer }).to_string()).await;
        assert_eq!(result, 0, "map layer {layer} failed: {body}");
        body
    }

    pub async fn logout(&mut self) -> (u32, Value) {
        self.send(2, "{}").await
    }
}

/// Pulls one train out of a layer 1 document by id.
pub fn train_in_layer(layer: &Value, idx: u32) -> Value {
    layer["train"]
        .as_array()
        .expect("layer 1 has trains")
        .iter()
        .find(|t| t["idx"] == idx)
        .cloned()
        .unwrap_or_else(|| panic!("train {idx} not in layer"))
}

/// Pulls one post out of a layer 1 document by id.
pub fn post_in_layer(layer: &Value, idx: u32) -> Value {
    layer["post"]
        .as_array()
        .expect("layer 1 has posts")
        .iter()
        .find(|p| p["idx"] == idx)
        .cloned()
        .unwrap_or_else(|| panic!("post {idx} not in layer"))
}
