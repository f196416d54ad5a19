use std::{collections::BTreeSet, sync::Arc};

use axum::extract::ws::Message;
use tokio::sync::mpsc;

use crate::{
    dto::game::{GameSnapshot, PlayResponse, PlayerView},
    services::{bot::BotUpdate, websocket_service::send_message_to_websocket},
};

/// Writer half of a websocket connection.
pub type SocketSender = mpsc::UnboundedSender<Message>;

/// Side channels a player may attach besides the play socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideChannel {
    Chat,
    Reactions,
}

/// Act permissions recomputed on every phase change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Eligibility {
    pub pick: bool,
    pub buzz: bool,
    pub answer: bool,
    pub wager: bool,
    pub dispute: bool,
}

impl Eligibility {
    /// Number of flags currently raised.
    pub fn count(&self) -> usize {
        [self.pick, self.buzz, self.answer, self.wager, self.dispute]
            .into_iter()
            .filter(|flag| *flag)
            .count()
    }
}

enum Connection {
    Human {
        play: Option<SocketSender>,
        chat: Option<SocketSender>,
        reactions: Option<SocketSender>,
    },
    Bot(mpsc::UnboundedSender<BotUpdate>),
}

/// A seat at the table, human or bot.
pub struct Player {
    pub id: String,
    pub name: String,
    pub score: i64,
    pub can: Eligibility,
    pub final_wager: i64,
    pub final_answer: String,
    pub final_correct: bool,
    /// Players who contested this player's final result.
    pub final_protestors: BTreeSet<String>,
    pub play_again: bool,
    connection: Connection,
}

impl Player {
    pub fn human(id: String, name: String) -> Self {
        Self::with_connection(
            id,
            name,
            Connection::Human {
                play: None,
                chat: None,
                reactions: None,
            },
        )
    }

    pub fn bot(id: String, name: String, tx: mpsc::UnboundedSender<BotUpdate>) -> Self {
        Self::with_connection(id, name, Connection::Bot(tx))
    }

    fn with_connection(id: String, name: String, connection: Connection) -> Self {
        Self {
            id,
            name,
            score: 0,
            can: Eligibility::default(),
            final_wager: 0,
            final_answer: String::new(),
            final_correct: false,
            final_protestors: BTreeSet::new(),
            play_again: false,
            connection,
        }
    }

    pub fn is_bot(&self) -> bool {
        matches!(self.connection, Connection::Bot(_))
    }

    /// Bots always count as connected; humans once their play socket is attached.
    pub fn is_connected(&self) -> bool {
        match &self.connection {
            Connection::Human { play, .. } => play.is_some(),
            Connection::Bot(tx) => !tx.is_closed(),
        }
    }

    /// Attach a play socket, replacing (and closing) any previous one.
    pub fn attach_play(&mut self, tx: SocketSender) {
        if let Connection::Human { play, .. } = &mut self.connection {
            if let Some(previous) = play.replace(tx) {
                let _ = previous.send(Message::Close(None));
            }
        }
    }

    pub fn attach_side_channel(&mut self, channel: SideChannel, tx: SocketSender) {
        if let Connection::Human {
            chat, reactions, ..
        } = &mut self.connection
        {
            let slot = match channel {
                SideChannel::Chat => chat,
                SideChannel::Reactions => reactions,
            };
            if let Some(previous) = slot.replace(tx) {
                let _ = previous.send(Message::Close(None));
            }
        }
    }

    /// Forget the play socket `tx` without closing it (the reader already saw
    /// it go away). A newer socket attached since then is kept.
    pub fn detach_play(&mut self, tx: &SocketSender) -> bool {
        match &mut self.connection {
            Connection::Human { play, .. }
                if play.as_ref().is_some_and(|current| current.same_channel(tx)) =>
            {
                play.take();
                true
            }
            _ => false,
        }
    }

    pub fn update_score(&mut self, delta: i64) {
        self.score += delta;
    }

    pub fn update_eligibility(&mut self, can: Eligibility) {
        self.can = can;
    }

    /// Clear everything a new game must not inherit.
    pub fn reset(&mut self) {
        self.score = 0;
        self.can = Eligibility::default();
        self.final_wager = 0;
        self.final_answer.clear();
        self.final_correct = false;
        self.final_protestors.clear();
        self.play_again = false;
    }

    /// Close every socket of this player. Later sends become no-ops.
    pub fn end_connections(&mut self) {
        match &mut self.connection {
            Connection::Human {
                play,
                chat,
                reactions,
            } => {
                for tx in [play.take(), chat.take(), reactions.take()]
                    .into_iter()
                    .flatten()
                {
                    let _ = tx.send(Message::Close(None));
                }
            }
            Connection::Bot(tx) => {
                let (closed, _) = mpsc::unbounded_channel();
                *tx = closed;
            }
        }
    }

    pub fn view(&self) -> PlayerView {
        PlayerView {
            id: self.id.clone(),
            name: self.name.clone(),
            score: self.score,
            can_pick: self.can.pick,
            can_buzz: self.can.buzz,
            can_answer: self.can.answer,
            can_wager: self.can.wager,
            can_dispute: self.can.dispute,
            final_wager: self.final_wager,
            final_answer: self.final_answer.clone(),
            final_correct: self.final_correct,
            final_protestors: self.final_protestors.iter().cloned().collect(),
            play_again: self.play_again,
            bot: self.is_bot(),
            connected: self.is_connected(),
        }
    }

    /// Push `snapshot` to this player. `hint` carries the official answer to bots.
    pub fn send_snapshot(
        &self,
        code: u16,
        message: &str,
        snapshot: &Arc<GameSnapshot>,
        hint: Option<String>,
    ) {
        match &self.connection {
            Connection::Human { play: Some(tx), .. } => {
                let response = PlayResponse {
                    code,
                    message,
                    name: None,
                    game: Some(snapshot.as_ref()),
                    cur_player: Some(self.view()),
                };
                let _ = send_message_to_websocket(tx, &response);
            }
            Connection::Human { play: None, .. } => {}
            Connection::Bot(tx) => {
                let _ = tx.send(BotUpdate {
                    game: Arc::clone(snapshot),
                    me: self.view(),
                    answer: hint,
                });
            }
        }
    }

    /// Reply to this player only, without a snapshot.
    pub fn send_notice(&self, code: u16, message: &str) {
        if let Connection::Human { play: Some(tx), .. } = &self.connection {
            let response = PlayResponse {
                code,
                message,
                name: None,
                game: None,
                cur_player: Some(self.view()),
            };
            let _ = send_message_to_websocket(tx, &response);
        }
    }
}
