use crate::error::ApiError;
use crate::models::book::{IsbnLookup, SearchResult};
use crate::models::requests::{IsbnLookupRequest, SearchRequest};
use crate::routes::ValidJson;
use crate::services::catalog::CatalogQuery;
use crate::services::reconcile;
use crate::AppState;
use axum::{extract::State, response::Json};
use tracing::info;

pub async fn search_books(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<SearchRequest>,
) -> Result<Json<Vec<SearchResult>>, ApiError> {
    info!("Search request: {:?}", request);

    let query = CatalogQuery::from(request);
    let results = reconcile::search(&query, &state.catalog, &state.backend).await?;

    Ok(Json(results))
}

pub async fn lookup_isbn(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<IsbnLookupRequest>,
) -> Result<Json<IsbnLookup>, ApiError> {
    let outcome = reconcile::lookup_isbn(&request.isbn, &state.catalog, &state.backend).await?;
    Ok(Json(outcome))
}
