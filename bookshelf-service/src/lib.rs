//! Personal bookshelf service: catalog search, reconciliation with the local
//! shelf, and session-gated book records.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use models::storage::Backend;
use routes::{
    books::{create_book, get_book, list_books, update_book},
    health::health_check,
    search::{lookup_isbn, search_books},
    session::{current_session, open_session},
};
use services::catalog::Catalog;
use services::session::SessionSigner;

/// Shared by all handlers. Everything in here is either immutable or does its
/// own synchronization.
#[derive(Clone)]
pub struct AppState {
    pub backend: Backend,
    pub catalog: Catalog,
    pub sessions: Arc<SessionSigner>,
}

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/books", get(list_books).post(create_book))
        .route("/api/books/:isbn", get(get_book).patch(update_book))
        .route("/api/search", post(search_books))
        .route("/api/search/isbn", post(lookup_isbn))
        .route("/api/session/current", get(current_session))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    let public = Router::new()
        .route("/status", get(health_check))
        .route("/api/session", post(open_session));

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
