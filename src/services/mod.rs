/// Automated players.
pub mod bot;
/// Per-game actor owning the state machine.
pub mod dispatcher;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Fuzzy answer matching.
pub mod matcher;
/// Game creation, seating and lookup.
pub mod room_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
/// Countdowns feeding the dispatchers.
pub mod timeout;
/// Signed player tokens.
pub mod token_service;
/// WebSocket connection and message handling service.
pub mod websocket_service;
