use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report whether trivia can be served, pinging the question store on the way.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_question_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "question store health check failed");
            }
        }
        Err(_) => warn!("question store unavailable (degraded mode)"),
    }

    let games = state.registry().game_count().await;
    if state.is_degraded().await {
        HealthResponse::degraded(games)
    } else {
        HealthResponse::ok(games)
    }
}
