use axum::Router;

use crate::state::SharedState;

pub mod docs;
pub mod health;
pub mod rounds;

/// Full HTTP surface: round commands, health probe and API documentation.
pub fn router(state: SharedState) -> Router<()> {
    Router::new()
        .merge(rounds::router())
        .merge(health::router())
        .merge(docs::router())
        .with_state(state)
}
