use tokio::sync::broadcast;

use crate::dto::side_channel::{ChatMessage, ReactionMessage};

/// Chat and reaction fan-outs of one game.
pub struct SideChannels {
    chat: Hub<ChatMessage>,
    reactions: Hub<ReactionMessage>,
}

impl SideChannels {
    pub fn new(capacity: usize) -> Self {
        Self {
            chat: Hub::new(capacity),
            reactions: Hub::new(capacity),
        }
    }

    pub fn chat(&self) -> &Hub<ChatMessage> {
        &self.chat
    }

    pub fn reactions(&self) -> &Hub<ReactionMessage> {
        &self.reactions
    }
}

/// Simple broadcast hub wrapper shared by every side-channel socket of a game.
pub struct Hub<T> {
    sender: broadcast::Sender<T>,
}

impl<T: Clone> Hub<T> {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent messages.
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }

    /// Send a message to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, message: T) {
        let _ = self.sender.send(message);
    }
}
