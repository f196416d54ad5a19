//! One task per game owning all of its mutation.
//!
//! Sockets, bots, REST handlers and countdowns never touch a [`Game`]
//! directly: they send a [`GameCommand`] through a [`GameHandle`] and the
//! dispatcher applies commands one at a time, then executes the effects the
//! game queued.

use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::{
    dao::{question_store::QuestionStore, storage::StorageResult},
    dto::game::{GameSnapshot, RoomSummary},
    error::ServiceError,
    services::{
        bot, room_service,
        timeout::{TimerFired, Timers},
    },
    state::{
        SharedState,
        game::{Action, Effect, Game, GameError},
        hub::SideChannels,
        player::{Player, SideChannel, SocketSender},
        state_machine::GamePhase,
    },
};

const COMMAND_BUFFER: usize = 256;
const SIDE_CHANNEL_CAPACITY: usize = 64;
const BAD_REQUEST: u16 = 400;
const SERVER_ERROR: u16 = 500;

type Reply<T> = oneshot::Sender<T>;

/// Everything a game can be asked to do.
pub enum GameCommand {
    AddPlayer {
        player: Player,
        reply: Reply<Result<(), GameError>>,
    },
    Connect {
        player_id: String,
        tx: SocketSender,
        reply: Reply<Result<(), GameError>>,
    },
    AttachSideChannel {
        player_id: String,
        channel: SideChannel,
        tx: SocketSender,
        reply: Reply<Result<String, GameError>>,
    },
    Disconnect {
        player_id: String,
        tx: SocketSender,
        reply: Reply<usize>,
    },
    Leave {
        player_id: String,
        reply: Reply<Result<usize, GameError>>,
    },
    Start {
        player_id: String,
        reply: Reply<Result<(), GameError>>,
    },
    PlayAgain {
        player_id: String,
        reply: Reply<Result<(), GameError>>,
    },
    /// A play frame from a socket or a bot; answered over the player's socket.
    Frame {
        player_id: String,
        tag: GamePhase,
        action: Action,
    },
    Snapshot {
        reply: Reply<GameSnapshot>,
    },
    Timeout(TimerFired),
    Shutdown,
}

impl From<TimerFired> for GameCommand {
    fn from(fired: TimerFired) -> Self {
        GameCommand::Timeout(fired)
    }
}

/// Cloneable address of a running game.
#[derive(Clone)]
pub struct GameHandle {
    name: Arc<str>,
    private: bool,
    tx: mpsc::Sender<GameCommand>,
    summary: watch::Receiver<RoomSummary>,
    side_channels: Arc<SideChannels>,
}

impl GameHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    /// Listing entry as of the last processed command.
    pub fn summary(&self) -> RoomSummary {
        self.summary.borrow().clone()
    }

    pub fn has_open_seat(&self) -> bool {
        let summary = self.summary.borrow();
        summary.state == GamePhase::PreGame && summary.players < summary.capacity
    }

    pub fn side_channels(&self) -> &SideChannels {
        &self.side_channels
    }

    /// Seat a bot and start its decision loop.
    pub async fn add_bot(
        &self,
        id: String,
        name: String,
        think: Duration,
    ) -> Result<(), ServiceError> {
        let (tx, rx) = mpsc::unbounded_channel();
        bot::spawn(id.clone(), rx, self.tx.downgrade(), think);
        self.add_player(Player::bot(id, name, tx)).await
    }

    pub async fn add_player(&self, player: Player) -> Result<(), ServiceError> {
        self.request(|reply| GameCommand::AddPlayer { player, reply })
            .await?
            .map_err(ServiceError::from)
    }

    pub async fn connect(&self, player_id: &str, tx: SocketSender) -> Result<(), ServiceError> {
        let player_id = player_id.to_string();
        self.request(|reply| GameCommand::Connect {
            player_id,
            tx,
            reply,
        })
        .await?
        .map_err(ServiceError::from)
    }

    /// Attach a chat or reactions socket; returns the player's name.
    pub async fn attach_side_channel(
        &self,
        player_id: &str,
        channel: SideChannel,
        tx: SocketSender,
    ) -> Result<String, ServiceError> {
        let player_id = player_id.to_string();
        self.request(|reply| GameCommand::AttachSideChannel {
            player_id,
            channel,
            tx,
            reply,
        })
        .await?
        .map_err(ServiceError::from)
    }

    /// Report the play socket `tx` as dropped; returns the humans keeping the game alive.
    pub async fn disconnect(&self, player_id: &str, tx: &SocketSender) -> Result<usize, ServiceError> {
        let player_id = player_id.to_string();
        let tx = tx.clone();
        self.request(|reply| GameCommand::Disconnect {
            player_id,
            tx,
            reply,
        })
        .await
    }

    pub async fn leave(&self, player_id: &str) -> Result<usize, ServiceError> {
        let player_id = player_id.to_string();
        self.request(|reply| GameCommand::Leave { player_id, reply })
            .await?
            .map_err(ServiceError::from)
    }

    pub async fn start(&self, player_id: &str) -> Result<(), ServiceError> {
        let player_id = player_id.to_string();
        self.request(|reply| GameCommand::Start { player_id, reply })
            .await?
            .map_err(ServiceError::from)
    }

    pub async fn play_again(&self, player_id: &str) -> Result<(), ServiceError> {
        let player_id = player_id.to_string();
        self.request(|reply| GameCommand::PlayAgain { player_id, reply })
            .await?
            .map_err(ServiceError::from)
    }

    pub async fn snapshot(&self) -> Result<GameSnapshot, ServiceError> {
        self.request(|reply| GameCommand::Snapshot { reply }).await
    }

    /// Queue a play frame. Outcomes are reported on the player's socket.
    pub async fn frame(
        &self,
        player_id: &str,
        tag: GamePhase,
        action: Action,
    ) -> Result<(), ServiceError> {
        self.tx
            .send(GameCommand::Frame {
                player_id: player_id.to_string(),
                tag,
                action,
            })
            .await
            .map_err(|_| self.ended())
    }

    /// Stop the dispatcher and close every connection of the game.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(GameCommand::Shutdown).await;
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> GameCommand,
    ) -> Result<T, ServiceError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| self.ended())?;
        response.await.map_err(|_| self.ended())
    }

    fn ended(&self) -> ServiceError {
        ServiceError::NotFound(format!("game `{}` has ended", self.name))
    }
}

/// Start the dispatcher of `game` and return its handle.
pub fn spawn(state: SharedState, game: Game, private: bool) -> GameHandle {
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let (summary_tx, summary_rx) = watch::channel(game.summary(private));
    let name: Arc<str> = game.name().into();

    let dispatcher = Dispatcher {
        state,
        timers: Timers::new(tx.downgrade()),
        game,
        rx,
        summary: summary_tx,
        private,
    };
    tokio::spawn(dispatcher.run());

    GameHandle {
        name,
        private,
        tx,
        summary: summary_rx,
        side_channels: Arc::new(SideChannels::new(SIDE_CHANNEL_CAPACITY)),
    }
}

struct Dispatcher {
    state: SharedState,
    timers: Timers<GameCommand>,
    game: Game,
    rx: mpsc::Receiver<GameCommand>,
    summary: watch::Sender<RoomSummary>,
    private: bool,
}

impl Dispatcher {
    async fn run(mut self) {
        info!(game = %self.game.name(), private = self.private, "game started");

        while let Some(command) = self.rx.recv().await {
            if !self.handle(command) {
                break;
            }
            self.apply_effects().await;
            self.publish_summary();
        }

        self.timers.cancel_all();
        self.game.close();
        info!(game = %self.game.name(), "game closed");
    }

    /// Apply one command; `false` stops the dispatcher.
    fn handle(&mut self, command: GameCommand) -> bool {
        match command {
            GameCommand::AddPlayer { player, reply } => {
                let _ = reply.send(self.game.add_player(player));
            }
            GameCommand::Connect {
                player_id,
                tx,
                reply,
            } => {
                let _ = reply.send(self.game.connect(&player_id, tx));
            }
            GameCommand::AttachSideChannel {
                player_id,
                channel,
                tx,
                reply,
            } => {
                let _ = reply.send(self.game.attach_side_channel(&player_id, channel, tx));
            }
            GameCommand::Disconnect {
                player_id,
                tx,
                reply,
            } => {
                let _ = reply.send(self.game.disconnect(&player_id, &tx));
            }
            GameCommand::Leave { player_id, reply } => {
                let _ = reply.send(self.game.leave(&player_id));
            }
            GameCommand::Start { player_id, reply } => {
                let _ = reply.send(self.game.start(&player_id));
            }
            GameCommand::PlayAgain { player_id, reply } => {
                let _ = reply.send(self.game.play_again(&player_id));
            }
            GameCommand::Frame {
                player_id,
                tag,
                action,
            } => self.frame(&player_id, tag, action),
            GameCommand::Snapshot { reply } => {
                let _ = reply.send(self.game.snapshot());
            }
            GameCommand::Timeout(fired) => {
                if !self.timers.take_if_current(&fired) {
                    debug!(game = %self.game.name(), slot = ?fired.slot, "stale timer");
                } else if let Err(err) = self.game.on_timeout(fired.slot) {
                    warn!(game = %self.game.name(), error = %err, "timeout default failed");
                }
            }
            GameCommand::Shutdown => return false,
        }
        true
    }

    fn frame(&mut self, player_id: &str, tag: GamePhase, action: Action) {
        match self.game.handle(player_id, tag, action) {
            Ok(()) => {}
            Err(err) if err.is_silent() => {
                debug!(game = %self.game.name(), player = %player_id, error = %err, "dropping event");
            }
            Err(err) => {
                debug!(game = %self.game.name(), player = %player_id, error = %err, "rejecting event");
                self.game.reply(player_id, BAD_REQUEST, &err.to_string());
            }
        }
    }

    async fn apply_effects(&mut self) {
        loop {
            let effects = self.game.take_effects();
            if effects.is_empty() {
                return;
            }
            for effect in effects {
                match effect {
                    Effect::ArmTimer { slot, after } => self.timers.arm(slot, after),
                    Effect::CancelTimer(slot) => self.timers.cancel(&slot),
                    Effect::CancelAllTimers => self.timers.cancel_all(),
                    Effect::AddAlternative {
                        answer,
                        alternative,
                    } => {
                        self.persist("add alternative", |store| {
                            store.add_alternative(answer, alternative)
                        })
                        .await
                    }
                    Effect::AddIncorrect { clue, incorrect } => {
                        self.persist("add incorrect answer", |store| {
                            store.add_incorrect(clue, incorrect)
                        })
                        .await
                    }
                    Effect::SaveAnalytics(analytics) => {
                        self.persist("save analytics", |store| store.save_analytics(analytics))
                            .await
                    }
                    Effect::Restart => self.restart().await,
                }
            }
        }
    }

    /// Fire a best-effort repository write in the background.
    async fn persist<F>(&self, what: &'static str, write: F)
    where
        F: FnOnce(&dyn QuestionStore) -> BoxFuture<'static, StorageResult<()>>,
    {
        let game = self.game.name().to_string();
        let Some(store) = self.state.question_store().await else {
            warn!(game = %game, what, "storage unavailable; dropping write");
            return;
        };
        let write = write(store.as_ref());
        tokio::spawn(async move {
            if let Err(err) = write.await {
                warn!(game = %game, what, error = %err, "storage write failed");
            }
        });
    }

    async fn restart(&mut self) {
        match room_service::load_board(&self.state).await {
            Ok(board) => {
                if let Err(err) = self.game.restart(board) {
                    warn!(game = %self.game.name(), error = %err, "restart failed");
                }
            }
            Err(err) => {
                warn!(game = %self.game.name(), error = %err, "could not load a new board");
                for player_id in self.game.player_ids() {
                    self.game.reply(
                        &player_id,
                        SERVER_ERROR,
                        "Could not load a new board, please try again",
                    );
                }
            }
        }
    }

    fn publish_summary(&self) {
        let next = self.game.summary(self.private);
        self.summary.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}
