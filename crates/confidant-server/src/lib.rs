//! HTTP surface for Confidant.
//!
//! Routes:
//!
//! | method | path | handler |
//! |---|---|---|
//! | GET | `/health` | liveness |
//! | GET, PUT | `/config` | chat configuration |
//! | GET, POST | `/personas` | list / create |
//! | PUT | `/personas/order` | display order |
//! | DELETE | `/personas/:id` | delete persona and its log |
//! | GET, PUT | `/conversation/:id/persona` | persona text |
//! | GET, PUT | `/conversation/:id/log` | turn log |
//! | POST | `/chat` | run one turn |
//! | POST | `/chat/cancel` | cancel the pending turn |

pub mod error;
pub mod handlers;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use handlers::{chat, config, conversation, personas};
use tower_http::trace::TraceLayer;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/config", get(config::get_config).put(config::put_config))
        .route(
            "/personas",
            get(personas::list_personas).post(personas::create_persona),
        )
        .route("/personas/order", put(personas::set_order))
        .route("/personas/:id", delete(personas::delete_persona))
        .route(
            "/conversation/:id/persona",
            get(conversation::get_persona).put(conversation::put_persona),
        )
        .route(
            "/conversation/:id/log",
            get(conversation::get_log).put(conversation::put_log),
        )
        .route("/chat", post(chat::send_message))
        .route("/chat/cancel", post(chat::cancel))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
