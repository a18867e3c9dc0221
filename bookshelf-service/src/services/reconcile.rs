use crate::models::book::{Book, IsbnLookup, NewBook, SearchResult};
use crate::models::storage::{Backend, StorageError};
use crate::services::catalog::{Catalog, CatalogQuery};
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Keeps the first candidate for each ISBN.
pub fn dedupe_by_isbn(candidates: Vec<NewBook>) -> Vec<NewBook> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|candidate| seen.insert(candidate.isbn.clone()))
        .collect()
}

/// Tags every candidate with its source. Stored records replace the catalog
/// version so that rating and read year come back with the result.
pub fn partition(candidates: Vec<NewBook>, stored: Vec<Book>) -> Vec<SearchResult> {
    let mut stored: HashMap<String, Book> = stored
        .into_iter()
        .map(|book| (book.isbn.clone(), book))
        .collect();

    dedupe_by_isbn(candidates)
        .into_iter()
        .map(|candidate| match stored.remove(&candidate.isbn) {
            Some(book) => SearchResult::Database { book },
            None => SearchResult::ExternalApi { book: candidate },
        })
        .collect()
}

/// Cross-references candidates with the shelf using one batched lookup.
pub async fn reconcile(
    candidates: Vec<NewBook>,
    backend: &Backend,
) -> Result<Vec<SearchResult>, StorageError> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let isbns: Vec<String> = candidates.iter().map(|c| c.isbn.clone()).collect();
    let stored = backend.find_books(&isbns).await?;

    Ok(partition(candidates, stored))
}

pub async fn search(
    query: &CatalogQuery,
    catalog: &Catalog,
    backend: &Backend,
) -> Result<Vec<SearchResult>, StorageError> {
    let candidates = catalog.search(query).await;
    let results = reconcile(candidates, backend).await?;

    let on_shelf = results
        .iter()
        .filter(|r| matches!(r, SearchResult::Database { .. }))
        .count();
    info!(
        "Search '{}': {} results, {} already on the shelf",
        query.to_q(),
        results.len(),
        on_shelf
    );

    Ok(results)
}

/// Single-result lookup: exactly one catalog match is required.
pub async fn lookup_isbn(
    isbn: &str,
    catalog: &Catalog,
    backend: &Backend,
) -> Result<IsbnLookup, StorageError> {
    let candidates = dedupe_by_isbn(catalog.search(&CatalogQuery::Isbn(isbn.to_string())).await);

    match candidates.len() {
        0 => Ok(IsbnLookup::NotFound),
        1 => {
            let result = reconcile(candidates, backend).await?.into_iter().next();
            Ok(match result {
                Some(result) => IsbnLookup::Success { result },
                None => IsbnLookup::NotFound,
            })
        }
        count => {
            info!("ISBN lookup {} is ambiguous: {} matches", isbn, count);
            Ok(IsbnLookup::TooManyResults { count })
        }
    }
}
