//! Game creation, seating and teardown on top of the room registry.

use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::AnalyticsSummaryEntity,
    dto::{
        game::RoomSummary,
        join::{JoinRequest, JoinResponse},
        validation::validate_player_name,
    },
    error::ServiceError,
    services::dispatcher::{self, GameHandle},
    state::{
        SharedState,
        board::{Board, CATEGORIES_PER_ROUND},
        game::Game,
        game_config::GameConfig,
        player::{Player, SocketSender},
    },
};

const JOIN_OK: u16 = 200;
const SEAT_ATTEMPTS: usize = 3;

/// Draw a fresh board from the question store.
pub async fn load_board(state: &SharedState) -> Result<Board, ServiceError> {
    let store = state.require_question_store().await?;
    let first = store.random_categories(1, CATEGORIES_PER_ROUND).await?;
    let second = store.random_categories(2, CATEGORIES_PER_ROUND).await?;
    let final_question = store.random_final().await?;

    let mut board = Board::from_entities(first, second, final_question);
    board.place_daily_doubles(&mut rand::rng());
    Ok(board)
}

/// Seat the requester: in a new private game, in the game named by
/// `gameName`, or in any public game with a free seat.
pub async fn join(state: &SharedState, request: JoinRequest) -> Result<JoinResponse, ServiceError> {
    request.validate()?;
    if request.private {
        return create_private(state, request).await;
    }
    match request.game_name.clone() {
        Some(code) => join_by_code(state, &code, request).await,
        None => join_public(state, request).await,
    }
}

pub async fn create_private(
    state: &SharedState,
    request: JoinRequest,
) -> Result<JoinResponse, ServiceError> {
    request.validate()?;
    create_and_seat(state, request, true).await
}

pub async fn join_public(
    state: &SharedState,
    request: JoinRequest,
) -> Result<JoinResponse, ServiceError> {
    request.validate()?;
    let mut tried = Vec::new();
    for _ in 0..SEAT_ATTEMPTS {
        let Some(handle) = state.registry().find_open_public(&tried).await else {
            break;
        };
        match seat(state, &handle, &request.player_name).await {
            // Seat taken in the meantime, or the name is already used at that table.
            Err(ServiceError::InvalidState(_) | ServiceError::InvalidInput(_)) => {
                tried.push(handle.name().to_string());
            }
            outcome => return outcome,
        }
    }
    create_and_seat(state, request, false).await
}

pub async fn join_by_code(
    state: &SharedState,
    code: &str,
    request: JoinRequest,
) -> Result<JoinResponse, ServiceError> {
    validate_player_name(&request.player_name)
        .map_err(|err| ServiceError::InvalidInput(err.to_string()))?;
    let handle = state
        .registry()
        .get(code.trim())
        .await
        .ok_or_else(|| ServiceError::NotFound(format!("game `{code}` does not exist")))?;
    seat(state, &handle, &request.player_name).await
}

/// The game `player_id` is seated at.
pub async fn player_game(state: &SharedState, player_id: &str) -> Result<GameHandle, ServiceError> {
    state
        .registry()
        .game_of(player_id)
        .await
        .ok_or_else(|| ServiceError::NotFound("player is not in a game".into()))
}

/// Seat a bot in the caller's game.
pub async fn add_bot(state: &SharedState, player_id: &str) -> Result<GameHandle, ServiceError> {
    let handle = player_game(state, player_id).await?;
    seat_bot(state, &handle).await?;
    Ok(handle)
}

pub async fn start(state: &SharedState, player_id: &str) -> Result<GameHandle, ServiceError> {
    let handle = player_game(state, player_id).await?;
    handle.start(player_id).await?;
    Ok(handle)
}

pub async fn play_again(state: &SharedState, player_id: &str) -> Result<GameHandle, ServiceError> {
    let handle = player_game(state, player_id).await?;
    handle.play_again(player_id).await?;
    Ok(handle)
}

/// Leave the caller's game; a game nobody is connected to any more is closed.
pub async fn leave(state: &SharedState, player_id: &str) -> Result<(), ServiceError> {
    let handle = player_game(state, player_id).await?;
    let remaining = handle.leave(player_id).await?;
    state.registry().unbind_player(player_id);
    info!(game = %handle.name(), player = %player_id, remaining, "player left");
    if remaining == 0 {
        close_game(state, &handle).await;
    }
    Ok(())
}

/// Report a dropped play socket.
pub async fn disconnect(
    state: &SharedState,
    handle: &GameHandle,
    player_id: &str,
    tx: &SocketSender,
) {
    match handle.disconnect(player_id, tx).await {
        Ok(0) => close_game(state, handle).await,
        Ok(remaining) => {
            info!(game = %handle.name(), player = %player_id, remaining, "player disconnected");
        }
        Err(err) => debug!(game = %handle.name(), error = %err, "disconnect after game end"),
    }
}

pub async fn list_games(state: &SharedState, private: bool) -> Vec<RoomSummary> {
    state.registry().summaries(private).await
}

pub async fn analytics(state: &SharedState) -> Result<AnalyticsSummaryEntity, ServiceError> {
    let store = state.require_question_store().await?;
    Ok(store.analytics_summary().await?)
}

async fn create_game(
    state: &SharedState,
    config: GameConfig,
    private: bool,
) -> Result<GameHandle, ServiceError> {
    config.validate()?;
    let board = load_board(state).await?;
    let name = state
        .registry()
        .fresh_name()
        .await
        .ok_or_else(|| ServiceError::InvalidState("no free game name".into()))?;
    let capacity = config.capacity(state.config().max_players);
    let bots = config.bots;

    let game = Game::new(
        name.clone(),
        config,
        capacity,
        board,
        state.config().board_intro(),
    );
    let handle = dispatcher::spawn(state.clone(), game, private);
    if !state.registry().insert(handle.clone()).await {
        handle.shutdown().await;
        return Err(ServiceError::InvalidState(format!(
            "game name `{name}` is already taken"
        )));
    }
    info!(game = %name, private, capacity, "game created");

    for _ in 0..bots {
        if let Err(err) = seat_bot(state, &handle).await {
            close_game(state, &handle).await;
            return Err(err);
        }
    }
    Ok(handle)
}

async fn create_and_seat(
    state: &SharedState,
    request: JoinRequest,
    private: bool,
) -> Result<JoinResponse, ServiceError> {
    let handle = create_game(state, request.config, private).await?;
    match seat(state, &handle, &request.player_name).await {
        Ok(response) => Ok(response),
        Err(err) => {
            close_game(state, &handle).await;
            Err(err)
        }
    }
}

async fn seat(
    state: &SharedState,
    handle: &GameHandle,
    name: &str,
) -> Result<JoinResponse, ServiceError> {
    let player_id = Uuid::new_v4().to_string();
    let token = state.tokens()?.issue(&player_id)?;
    handle
        .add_player(Player::human(player_id.clone(), name.trim().to_string()))
        .await?;
    state.registry().bind_player(&player_id, handle.name());
    info!(game = %handle.name(), player = %player_id, "player joined");

    Ok(JoinResponse {
        code: JOIN_OK,
        token,
        message: "Authorized to join game".into(),
        game: handle.snapshot().await?,
    })
}

async fn seat_bot(state: &SharedState, handle: &GameHandle) -> Result<(), ServiceError> {
    let mut outcome = Ok(());
    for _ in 0..SEAT_ATTEMPTS {
        let id = Uuid::new_v4().to_string();
        outcome = handle
            .add_bot(id, bot_name(), state.config().bot_think())
            .await;
        // Only a name clash is worth another try.
        if !matches!(outcome, Err(ServiceError::InvalidInput(_))) {
            break;
        }
    }
    outcome
}

async fn close_game(state: &SharedState, handle: &GameHandle) {
    state.registry().remove(handle.name()).await;
    handle.shutdown().await;
    info!(game = %handle.name(), "game removed");
}

fn bot_name() -> String {
    let base = petname::petname(1, "").unwrap_or_else(|| "robo".into());
    let mut chars = base.chars();
    let capitalized: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => base,
    };
    format!("{capitalized} (bot)")
}
