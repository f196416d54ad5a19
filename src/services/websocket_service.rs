use std::{fmt::Debug, time::Duration};

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};
use tracing::{debug, info, warn};

use crate::{
    dto::{
        game::PlayResponse,
        join::JoinRequest,
        side_channel::{ChatIn, ChatMessage, ReactionIn, ReactionMessage, TokenFrame},
        ws::{PlayFrame, close_code},
    },
    error::ServiceError,
    services::{dispatcher::GameHandle, room_service},
    state::{
        SharedState,
        game::{Action, GameError},
        hub::{Hub, SideChannels},
        state_machine::GamePhase,
        player::{SideChannel, SocketSender},
    },
};

const IDENT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_PING_FAILURES: u32 = 3;
const MALFORMED: &str = "Uh oh, something went wrong: Malformed request";

/// Raised when the writer half of a socket is gone.
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("connection closed")]
    ConnectionClosed,
}

/// Serialize a payload and push it onto the provided WebSocket sender.
///
/// Returns `Ok(())` if the message was queued or if serialization failed
/// (permanent error, no point retrying).
/// Returns `Err(SocketError::ConnectionClosed)` if the writer channel is closed.
pub fn send_message_to_websocket<T>(tx: &SocketSender, value: &T) -> Result<(), SocketError>
where
    T: ?Sized + Serialize + Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{value:?}` (permanent error, not retrying)");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .map_err(|_| SocketError::ConnectionClosed)
}

/// One-shot join socket: read a join request, seat the player, reply with a
/// token and close.
pub async fn handle_join(state: SharedState, socket: WebSocket) {
    let mut conn = Connection::open(socket);

    let request = match conn.first_frame::<JoinRequest>().await {
        Ok(request) => request,
        Err(err) => {
            conn.reject(&err).await;
            return;
        }
    };

    match room_service::join(&state, request).await {
        Ok(response) => {
            info!(game = %response.game.name, "join accepted");
            let _ = send_message_to_websocket(&conn.tx, &response);
            conn.close(close_code::OK, "Authorized to join game").await;
        }
        Err(err) => {
            warn!(error = %err, "join refused");
            conn.reject(&err).await;
        }
    }
}

/// Long-lived play socket of one player.
pub async fn handle_play(state: SharedState, socket: WebSocket) {
    let mut conn = Connection::open(socket);

    let (player_id, game) = match conn.authenticate(&state).await {
        Ok(seat) => seat,
        Err(err) => {
            conn.reject(&err).await;
            return;
        }
    };
    if let Err(err) = game.connect(&player_id, conn.tx.clone()).await {
        warn!(game = %game.name(), player = %player_id, error = %err, "play connection refused");
        conn.reject(&err).await;
        return;
    }
    info!(game = %game.name(), player = %player_id, "play socket connected");

    let pinger = spawn_pinger(conn.tx.clone(), state.config().ping_interval(), |_| {
        PlayResponse::ping()
    });

    while let Some(text) = conn.next_text().await {
        match decode_play_frame(text.as_str()) {
            Ok((tag, action)) => {
                if game.frame(&player_id, tag, action).await.is_err() {
                    break;
                }
            }
            Err(err) if err.is_silent() => {
                debug!(game = %game.name(), player = %player_id, error = %err, "play frame dropped");
            }
            Err(err) => {
                debug!(game = %game.name(), player = %player_id, error = %err, "bad play frame");
                let message = err.to_string();
                let _ = send_message_to_websocket(
                    &conn.tx,
                    &PlayResponse {
                        code: 400,
                        message: &message,
                        name: None,
                        game: None,
                        cur_player: None,
                    },
                );
            }
        }
    }

    pinger.abort();
    room_service::disconnect(&state, &game, &player_id, &conn.tx).await;
    conn.finalize().await;
}

/// Chat side channel: `{message}` in, `{name, message, timeStamp}` out.
pub async fn handle_chat(state: SharedState, socket: WebSocket) {
    run_side_channel(
        state,
        socket,
        SideChannel::Chat,
        SideChannels::chat,
        |name, frame: ChatIn| {
            let message = frame.message.trim();
            (!message.is_empty()).then(|| ChatMessage {
                name: name.to_string(),
                message: message.to_string(),
                time_stamp: unix_now(),
            })
        },
    )
    .await
}

/// Reactions side channel: `{reaction}` in, `{name, reaction, timeStamp, randPos}` out.
pub async fn handle_reactions(state: SharedState, socket: WebSocket) {
    run_side_channel(
        state,
        socket,
        SideChannel::Reactions,
        SideChannels::reactions,
        |name, frame: ReactionIn| {
            (!frame.reaction.is_empty()).then(|| {
                ReactionMessage::new(
                    name.to_string(),
                    frame.reaction,
                    unix_now(),
                    &mut rand::rng(),
                )
            })
        },
    )
    .await
}

/// Messages fanned out on a side channel, including its keep-alive frame.
trait Fanout: Clone + Serialize + Debug + Send + 'static {
    fn ping(time_stamp: i64) -> Self;
}

impl Fanout for ChatMessage {
    fn ping(time_stamp: i64) -> Self {
        ChatMessage::ping(time_stamp)
    }
}

impl Fanout for ReactionMessage {
    fn ping(time_stamp: i64) -> Self {
        ReactionMessage::ping(time_stamp)
    }
}

async fn run_side_channel<In, Out, F>(
    state: SharedState,
    socket: WebSocket,
    channel: SideChannel,
    hub: fn(&SideChannels) -> &Hub<Out>,
    build: F,
) where
    In: DeserializeOwned,
    Out: Fanout,
    F: Fn(&str, In) -> Option<Out>,
{
    let mut conn = Connection::open(socket);

    let (player_id, game) = match conn.authenticate(&state).await {
        Ok(seat) => seat,
        Err(err) => {
            conn.reject(&err).await;
            return;
        }
    };
    let name = match game
        .attach_side_channel(&player_id, channel, conn.tx.clone())
        .await
    {
        Ok(name) => name,
        Err(err) => {
            conn.reject(&err).await;
            return;
        }
    };
    debug!(game = %game.name(), player = %player_id, ?channel, "side channel connected");

    let forwarder = spawn_forwarder(hub(game.side_channels()).subscribe(), conn.tx.clone());
    let pinger = spawn_pinger(conn.tx.clone(), state.config().ping_interval(), Out::ping);

    while let Some(text) = conn.next_text().await {
        match serde_json::from_str::<In>(text.as_str()) {
            Ok(frame) => {
                if let Some(message) = build(&name, frame) {
                    hub(game.side_channels()).broadcast(message);
                }
            }
            Err(err) => {
                debug!(game = %game.name(), player = %player_id, error = %err, "bad side channel frame");
            }
        }
    }

    forwarder.abort();
    pinger.abort();
    conn.finalize().await;
}

fn spawn_forwarder<T: Fanout>(messages: broadcast::Receiver<T>, tx: SocketSender) -> JoinHandle<()> {
    let mut stream = BroadcastStream::new(messages);
    tokio::spawn(async move {
        while let Some(next) = stream.next().await {
            match next {
                Ok(message) => {
                    if send_message_to_websocket(&tx, &message).is_err() {
                        break;
                    }
                }
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    debug!(skipped, "side channel subscriber lagged");
                }
            }
        }
    })
}

/// Push a keep-alive frame every `period`; give up after consecutive failures.
fn spawn_pinger<T, F>(tx: SocketSender, period: Duration, frame: F) -> JoinHandle<()>
where
    T: Serialize + Debug,
    F: Fn(i64) -> T + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures = 0;

        loop {
            ticker.tick().await;
            match send_message_to_websocket(&tx, &frame(unix_now())) {
                Ok(()) => failures = 0,
                Err(_) => {
                    failures += 1;
                    if failures >= MAX_PING_FAILURES {
                        let _ = tx.send(Message::Close(None));
                        break;
                    }
                }
            }
        }
    })
}

fn decode_play_frame(text: &str) -> Result<(GamePhase, Action), GameError> {
    serde_json::from_str::<PlayFrame>(text)
        .map_err(|_| GameError::InvalidInput(MALFORMED.into()))?
        .into_action()
}

fn unix_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Reader half plus the writer task of an upgraded socket.
struct Connection {
    receiver: SplitStream<WebSocket>,
    tx: SocketSender,
    writer: JoinHandle<()>,
}

impl Connection {
    fn open(socket: WebSocket) -> Self {
        let (sender, receiver) = socket.split();
        let (tx, rx) = mpsc::unbounded_channel::<Message>();
        // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
        let writer = tokio::spawn(write_loop(sender, rx));
        Self {
            receiver,
            tx,
            writer,
        }
    }

    /// Next text frame, answering pings and skipping binary noise. `None`
    /// once the peer is gone.
    async fn next_text(&mut self) -> Option<axum::extract::ws::Utf8Bytes> {
        while let Some(message) = self.receiver.next().await {
            match message {
                Ok(Message::Text(text)) => return Some(text),
                Ok(Message::Ping(payload)) => {
                    let _ = self.tx.send(Message::Pong(payload));
                }
                Ok(Message::Close(_)) => return None,
                Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
                Err(err) => {
                    debug!(error = %err, "websocket receive error");
                    return None;
                }
            }
        }
        None
    }

    /// First frame of the socket, which must arrive quickly and parse as `T`.
    async fn first_frame<T: DeserializeOwned>(&mut self) -> Result<T, ServiceError> {
        let text = tokio::time::timeout(IDENT_TIMEOUT, self.next_text())
            .await
            .ok()
            .flatten()
            .ok_or_else(|| ServiceError::InvalidInput("no frame received".into()))?;
        serde_json::from_str(text.as_str()).map_err(|_| ServiceError::InvalidInput(MALFORMED.into()))
    }

    /// Resolve the `{token}` first frame to a seated player and their game.
    async fn authenticate(&mut self, state: &SharedState) -> Result<(String, GameHandle), ServiceError> {
        let frame = self.first_frame::<TokenFrame>().await?;
        let player_id = state.tokens()?.verify(&frame.token)?;
        let game = room_service::player_game(state, &player_id).await?;
        Ok((player_id, game))
    }

    /// Report `err` with its close code and end the connection.
    async fn reject(self, err: &ServiceError) {
        let code = err.close_code();
        let message = err.to_string();
        let _ = send_message_to_websocket(
            &self.tx,
            &PlayResponse {
                code,
                message: &message,
                name: None,
                game: None,
                cur_player: None,
            },
        );
        self.close(code, &message).await;
    }

    async fn close(self, code: u16, reason: &str) {
        let _ = self.tx.send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_owned().into(),
        })));
        self.finalize().await;
    }

    /// Ensure the writer task winds down before we return from the socket handler.
    async fn finalize(self) {
        let _ = self.tx.send(Message::Close(None));
        drop(self.tx);
        let _ = self.writer.await;
    }
}

async fn write_loop(mut sender: SplitSink<WebSocket, Message>, mut rx: mpsc::UnboundedReceiver<Message>) {
    while let Some(message) = rx.recv().await {
        let closing = matches!(message, Message::Close(_));
        if sender.send(message).await.is_err() || closing {
            break;
        }
    }
}
