use rand::Rng;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Sender name and payload used by keep-alive frames.
pub const PING: &str = "ping";

/// First frame of every authenticated websocket.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenFrame {
    pub token: String,
}

/// Chat text sent by a client.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ChatIn {
    #[serde(default)]
    pub message: String,
}

/// Chat line fanned out to every chat socket of a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub name: String,
    pub message: String,
    /// Unix seconds.
    pub time_stamp: i64,
}

impl ChatMessage {
    pub fn ping(time_stamp: i64) -> Self {
        Self {
            name: PING.into(),
            message: PING.into(),
            time_stamp,
        }
    }
}

/// Emoji reaction sent by a client.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReactionIn {
    #[serde(default)]
    pub reaction: String,
}

/// Reaction fanned out to every reactions socket of a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReactionMessage {
    pub name: String,
    pub reaction: String,
    pub time_stamp: i64,
    /// Horizontal offset picked at random so reactions do not stack.
    pub rand_pos: u32,
}

impl ReactionMessage {
    pub fn new<R: Rng + ?Sized>(name: String, reaction: String, time_stamp: i64, rng: &mut R) -> Self {
        Self {
            name,
            reaction,
            time_stamp,
            rand_pos: rng.random_range(10..150),
        }
    }

    pub fn ping(time_stamp: i64) -> Self {
        Self {
            name: PING.into(),
            reaction: PING.into(),
            time_stamp,
            rand_pos: 0,
        }
    }
}
