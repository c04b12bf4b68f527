pub mod auth;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

// Re-export the handlers to make them easily accessible
// to the binary that builds the web server.
pub use auth::logout_handler;
pub use middleware::resolve_session;
pub use rest::{chapter_count_handler, list_books_handler, list_verses_handler, list_versions_handler, ApiDoc};
pub use state::AppState;
pub use ws_handler::ws_handler;

/// Every route of the service, with the session middleware and Swagger UI.
pub fn router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/books", get(list_books_handler))
        .route("/books/{book_id}/chapters", get(chapter_count_handler))
        .route("/books/{book_id}/chapters/{chapter}/verses", get(list_verses_handler))
        .route("/versions", get(list_versions_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/ws", get(ws_handler))
        .layer(axum_middleware::from_fn_with_state(app_state.clone(), resolve_session))
        .with_state(app_state);

    Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
