use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Jeopardy Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::games::create_private,
        crate::routes::games::join_public,
        crate::routes::games::join_by_code,
        crate::routes::games::add_bot,
        crate::routes::games::start_game,
        crate::routes::games::leave_game,
        crate::routes::games::play_again,
        crate::routes::games::player_game,
        crate::routes::games::public_games,
        crate::routes::games::private_games,
        crate::routes::games::analytics,
        crate::routes::websocket::join_handler,
        crate::routes::websocket::play_handler,
        crate::routes::websocket::chat_handler,
        crate::routes::websocket::reactions_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::join::JoinRequest,
            crate::dto::join::JoinResponse,
            crate::dto::join::ActionResponse,
            crate::dto::game::GameSnapshot,
            crate::dto::game::RoomSummary,
            crate::dto::ws::PlayFrame,
            crate::dto::side_channel::TokenFrame,
            crate::dto::side_channel::ChatIn,
            crate::dto::side_channel::ChatMessage,
            crate::dto::side_channel::ReactionIn,
            crate::dto::side_channel::ReactionMessage,
            crate::dao::models::AnalyticsSummaryEntity,
            crate::state::game_config::GameConfig,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "games", description = "Lobby and seat management"),
        (name = "sockets", description = "WebSocket sessions for play, chat and reactions"),
    )
)]
pub struct ApiDoc;
