use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};

use crate::{services::websocket_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/jeopardy/join",
    tag = "sockets",
    responses((status = 101, description = "Switching protocols; send a JoinRequest, receive a JoinResponse"))
)]
/// Upgrade into a one-shot join socket.
pub async fn join_handler(
    State(state): State<SharedState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket_service::handle_join(state, socket))
}

#[utoipa::path(
    get,
    path = "/jeopardy/play",
    tag = "sockets",
    responses((status = 101, description = "Switching protocols; send a TokenFrame, then PlayFrames"))
)]
/// Upgrade into the play socket of a seated player.
pub async fn play_handler(
    State(state): State<SharedState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket_service::handle_play(state, socket))
}

#[utoipa::path(
    get,
    path = "/jeopardy/chat",
    tag = "sockets",
    responses((status = 101, description = "Switching protocols; send a TokenFrame, then ChatIn frames"))
)]
/// Upgrade into the chat socket of a seated player.
pub async fn chat_handler(
    State(state): State<SharedState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket_service::handle_chat(state, socket))
}

#[utoipa::path(
    get,
    path = "/jeopardy/reactions",
    tag = "sockets",
    responses((status = 101, description = "Switching protocols; send a TokenFrame, then ReactionIn frames"))
)]
/// Upgrade into the reactions socket of a seated player.
pub async fn reactions_handler(
    State(state): State<SharedState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket_service::handle_reactions(state, socket))
}

/// Configure the WebSocket endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/jeopardy/join", get(join_handler))
        .route("/jeopardy/play", get(play_handler))
        .route("/jeopardy/chat", get(chat_handler))
        .route("/jeopardy/reactions", get(reactions_handler))
}
