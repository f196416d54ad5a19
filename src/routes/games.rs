use axum::{
    Extension, Json, Router,
    body::Body,
    extract::{Path, State},
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
};
use axum_valid::Valid;

use crate::{
    dao::models::AnalyticsSummaryEntity,
    dto::{
        game::{GameSnapshot, RoomSummary},
        join::{ActionResponse, JoinRequest, JoinResponse},
    },
    error::{AppError, ServiceError},
    services::room_service,
    state::SharedState,
};

const ACCESS_TOKEN_HEADER: &str = "access-token";

/// Player id extracted from a verified `Access-Token` header.
#[derive(Debug, Clone)]
pub struct PlayerId(pub String);

/// Lobby endpoints. Seat management requires the token handed out on join.
pub fn router(state: SharedState) -> Router<SharedState> {
    let seated = Router::new()
        .route("/jeopardy/games/bot", put(add_bot))
        .route("/jeopardy/games/start", put(start_game))
        .route("/jeopardy/leave", post(leave_game))
        .route("/jeopardy/play-again", put(play_again))
        .route("/jeopardy/players/game", get(player_game))
        .route_layer(middleware::from_fn_with_state(state, require_access_token));

    Router::new()
        .route(
            "/jeopardy/games",
            get(private_games).post(create_private).put(join_public),
        )
        .route("/jeopardy/games/{code}", put(join_by_code))
        .route("/jeopardy/public", get(public_games))
        .route("/jeopardy/analytics", get(analytics))
        .merge(seated)
}

/// Create a private game and take its first seat.
#[utoipa::path(
    post,
    path = "/jeopardy/games",
    tag = "games",
    request_body = JoinRequest,
    responses(
        (status = 200, description = "Game created and seat taken", body = JoinResponse),
        (status = 400, description = "Invalid name or game options"),
        (status = 503, description = "Question store unavailable")
    )
)]
pub async fn create_private(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<JoinRequest>>,
) -> Result<Json<JoinResponse>, AppError> {
    Ok(Json(room_service::create_private(&state, payload).await?))
}

/// Join the first public game with a free seat, opening one if none is left.
#[utoipa::path(
    put,
    path = "/jeopardy/games",
    tag = "games",
    request_body = JoinRequest,
    responses(
        (status = 200, description = "Seat taken", body = JoinResponse),
        (status = 400, description = "Invalid name or game options"),
        (status = 503, description = "Question store unavailable")
    )
)]
pub async fn join_public(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<JoinRequest>>,
) -> Result<Json<JoinResponse>, AppError> {
    Ok(Json(room_service::join_public(&state, payload).await?))
}

/// Join a game by its code, public or private.
#[utoipa::path(
    put,
    path = "/jeopardy/games/{code}",
    tag = "games",
    params(("code" = String, Path, description = "Code of the game to join")),
    request_body = JoinRequest,
    responses(
        (status = 200, description = "Seat taken", body = JoinResponse),
        (status = 404, description = "No such game"),
        (status = 409, description = "Game is full or already started")
    )
)]
pub async fn join_by_code(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Json(payload): Json<JoinRequest>,
) -> Result<Json<JoinResponse>, AppError> {
    Ok(Json(room_service::join_by_code(&state, &code, payload).await?))
}

/// Seat a bot at the caller's game.
#[utoipa::path(
    put,
    path = "/jeopardy/games/bot",
    tag = "games",
    params(("Access-Token" = String, Header, description = "Token returned on join")),
    responses(
        (status = 200, description = "Bot seated", body = ActionResponse),
        (status = 409, description = "Game is full or already started")
    )
)]
pub async fn add_bot(
    State(state): State<SharedState>,
    Extension(PlayerId(player_id)): Extension<PlayerId>,
) -> Result<Json<ActionResponse>, AppError> {
    let game = room_service::add_bot(&state, &player_id).await?;
    let snapshot = game.snapshot().await?;
    Ok(Json(ActionResponse::ok("Added bot to game", Some(snapshot))))
}

/// Leave the lobby and show the board.
#[utoipa::path(
    put,
    path = "/jeopardy/games/start",
    tag = "games",
    params(("Access-Token" = String, Header, description = "Token returned on join")),
    responses(
        (status = 200, description = "Game started", body = ActionResponse),
        (status = 409, description = "Game already started")
    )
)]
pub async fn start_game(
    State(state): State<SharedState>,
    Extension(PlayerId(player_id)): Extension<PlayerId>,
) -> Result<Json<ActionResponse>, AppError> {
    room_service::start(&state, &player_id).await?;
    Ok(Json(ActionResponse::ok("Started game", None)))
}

/// Give up the caller's seat.
#[utoipa::path(
    post,
    path = "/jeopardy/leave",
    tag = "games",
    params(("Access-Token" = String, Header, description = "Token returned on join")),
    responses((status = 200, description = "Seat released", body = ActionResponse))
)]
pub async fn leave_game(
    State(state): State<SharedState>,
    Extension(PlayerId(player_id)): Extension<PlayerId>,
) -> Result<Json<ActionResponse>, AppError> {
    room_service::leave(&state, &player_id).await?;
    Ok(Json(ActionResponse::ok("Left game", None)))
}

/// Reset a finished game with a new board.
#[utoipa::path(
    put,
    path = "/jeopardy/play-again",
    tag = "games",
    params(("Access-Token" = String, Header, description = "Token returned on join")),
    responses(
        (status = 200, description = "New game ready", body = ActionResponse),
        (status = 409, description = "Game has not ended")
    )
)]
pub async fn play_again(
    State(state): State<SharedState>,
    Extension(PlayerId(player_id)): Extension<PlayerId>,
) -> Result<Json<ActionResponse>, AppError> {
    room_service::play_again(&state, &player_id).await?;
    Ok(Json(ActionResponse::ok("Playing again", None)))
}

/// The caller's game as seen right now.
#[utoipa::path(
    get,
    path = "/jeopardy/players/game",
    tag = "games",
    params(("Access-Token" = String, Header, description = "Token returned on join")),
    responses(
        (status = 200, description = "Current game", body = GameSnapshot),
        (status = 404, description = "Player is not in a game")
    )
)]
pub async fn player_game(
    State(state): State<SharedState>,
    Extension(PlayerId(player_id)): Extension<PlayerId>,
) -> Result<Json<GameSnapshot>, AppError> {
    let game = room_service::player_game(&state, &player_id).await?;
    Ok(Json(game.snapshot().await?))
}

/// Public games, with their seat counts.
#[utoipa::path(
    get,
    path = "/jeopardy/public",
    tag = "games",
    responses((status = 200, description = "Public games", body = [RoomSummary]))
)]
pub async fn public_games(State(state): State<SharedState>) -> Json<Vec<RoomSummary>> {
    Json(room_service::list_games(&state, false).await)
}

/// Private games, with their seat counts.
#[utoipa::path(
    get,
    path = "/jeopardy/games",
    tag = "games",
    responses((status = 200, description = "Private games", body = [RoomSummary]))
)]
pub async fn private_games(State(state): State<SharedState>) -> Json<Vec<RoomSummary>> {
    Json(room_service::list_games(&state, true).await)
}

/// Totals over every finished game.
#[utoipa::path(
    get,
    path = "/jeopardy/analytics",
    tag = "games",
    responses(
        (status = 200, description = "Aggregated analytics", body = AnalyticsSummaryEntity),
        (status = 503, description = "Question store unavailable")
    )
)]
pub async fn analytics(
    State(state): State<SharedState>,
) -> Result<Json<AnalyticsSummaryEntity>, AppError> {
    Ok(Json(room_service::analytics(&state).await?))
}

async fn require_access_token(
    State(state): State<SharedState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(ACCESS_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_owned())
        .ok_or_else(|| AppError::Unauthorized("missing header `Access-Token`".into()))?;

    let player_id = state
        .tokens()?
        .verify(&token)
        .map_err(ServiceError::from)?;
    req.extensions_mut().insert(PlayerId(player_id));
    Ok(next.run(req).await)
}
