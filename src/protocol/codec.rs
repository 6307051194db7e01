//! Length-prefixed binary framing.
//!
//! A request is `action:u32` optionally followed by `msg_len:u32` and
//! `msg_len` bytes of UTF-8 JSON; a response is always
//! `result:u32 msg_len:u32 bytes`. All integers are little-endian. The
//! decoder buffers partial reads so no byte is ever lost across read
//! boundaries; payload validation is the session's job.

use crate::protocol::{Action, ResultCode};

/// Upper bound on a single message body. Anything larger is treated as a
/// corrupt stream and the connection is rejected.
pub const MAX_MESSAGE_LEN: u32 = 1024 * 1024;

/// One parsed request frame. `code` is kept raw so the session can answer
/// unknown actions with BAD_COMMAND instead of dropping the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub code: u32,
    pub payload: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("message length {0} exceeds limit {MAX_MESSAGE_LEN}")]
    Oversized(u32),
    #[error("message body is not valid utf-8")]
    InvalidUtf8,
}

/// Incremental frame decoder for one connection.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    /// Action word of a partially received frame.
    pending_action: Option<u32>,
    /// Body length of a partially received frame, once known.
    pending_len: Option<u32>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends freshly received bytes to the internal buffer.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Attempts to pull the next complete frame out of the buffer.
    ///
    /// Returns `Ok(None)` when more bytes are needed. For LOGOUT and
    /// OBSERVER an empty buffer after the action word completes the frame
    /// with an empty `{}` payload; if more bytes are already buffered they
    /// are parsed as a regular length prefix.
    pub fn decode(&mut self) -> Result<Option<Frame>, CodecError> {
        let code = match self.pending_action {
            Some(code) => code,
            None => {
                if self.buf.len() < 4 {
                    return Ok(None);
                }
                let code = read_u32(&self.buf);
                self.buf.drain(..4);
                self.pending_action = Some(code);
                code
            }
        };

        if self.pending_len.is_none() {
            let optional = Action::from_code(code).is_some_and(Action::payload_optional);
            if optional && self.buf.is_empty() {
                self.pending_action = None;
                return Ok(Some(Frame {
                    code,
                    payload: "{}".to_string(),
                }));
            }
            if self.buf.len() < 4 {
                return Ok(None);
            }
            let len = read_u32(&self.buf);
            if len > MAX_MESSAGE_LEN {
                return Err(CodecError::Oversized(len));
            }
            self.buf.drain(..4);
            self.pending_len = Some(len);
        }

        let len = self.pending_len.unwrap() as usize;
        if self.buf.len() < len {
            return Ok(None);
        }
        let body: Vec<u8> = self.buf.drain(..len).collect();
        self.pending_action = None;
        self.pending_len = None;
        let payload = String::from_utf8(body).map_err(|_| CodecError::InvalidUtf8)?;
        Ok(Some(Frame {
            code,
            payload: if payload.is_empty() {
                "{}".to_string()
            } else {
                payload
            },
        }))
    }
}

/// Encodes a response frame.
pub fn encode_response(result: ResultCode, message: &str) -> Vec<u8> {
    let body = message.as_bytes();
    let mut out = Vec::with_capacity(8 + body.len());
    out.extend_from_slice(&result.code().to_le_bytes());
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
    out
}

/// Encodes a request frame (used by tests and tooling).
pub fn encode_request(action: u32, message: &str) -> Vec<u8> {
    let body = message.as_bytes();
    let mut out = Vec::with_capacity(8 + body.len());
    out.extend_from_slice(&action.to_le_bytes());
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
    out
}

fn read_u32(buf: &[u8]) -> u32 {
    u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
}
