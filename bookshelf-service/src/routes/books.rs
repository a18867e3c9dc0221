use crate::error::ApiError;
use crate::models::book::{Book, BookUpdate, NewBook};
use crate::models::requests::validate_isbn;
use crate::routes::ValidJson;
use crate::services::session::Session;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use tracing::info;

pub async fn list_books(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<Vec<Book>>, ApiError> {
    let books = state.backend.list_books().await?;
    info!("{} listed {} books", session.user, books.len());
    Ok(Json(books))
}

pub async fn create_book(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    ValidJson(book): ValidJson<NewBook>,
) -> Result<(StatusCode, Json<Book>), ApiError> {
    let created = state.backend.create_book(&book).await?;
    info!("{} added {} ({})", session.user, created.isbn, created.title);
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_book(
    State(state): State<AppState>,
    Path(isbn): Path<String>,
) -> Result<Json<Book>, ApiError> {
    let isbn = validate_isbn(&isbn)?;

    match state.backend.get_book(&isbn).await? {
        Some(book) => Ok(Json(book)),
        None => Err(ApiError::NotFound(isbn)),
    }
}

pub async fn update_book(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(isbn): Path<String>,
    ValidJson(changes): ValidJson<BookUpdate>,
) -> Result<Json<Book>, ApiError> {
    let isbn = validate_isbn(&isbn)?;

    match state.backend.update_book(&isbn, &changes).await? {
        Some(book) => {
            info!(
                "{} updated {}: rating={:?} read_year={:?}",
                session.user, book.isbn, book.rating, book.read_year
            );
            Ok(Json(book))
        }
        None => Err(ApiError::NotFound(isbn)),
    }
}
