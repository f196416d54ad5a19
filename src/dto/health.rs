use serde::Serialize;
use utoipa::ToSchema;

/// Body of `GET /jeopardy/health`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Games currently running, public and private.
    pub games: usize,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok(games: usize) -> Self {
        Self {
            status: "ok".to_string(),
            games,
        }
    }

    /// Create a health response indicating the question store is unreachable.
    pub fn degraded(games: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            games,
        }
    }
}
