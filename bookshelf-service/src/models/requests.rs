use crate::error::ApiError;
use crate::models::book::{BookUpdate, NewBook};
use crate::services::catalog::CatalogQuery;
use crate::utils::isbn::normalize_isbn;
use chrono::{Datelike, Utc};
use serde::Deserialize;

pub const MAX_RATING: u8 = 5;
pub const MIN_READ_YEAR: i32 = 1000;
/// Largest page count the stores can hold.
pub const MAX_PAGES: u32 = i32::MAX as u32;

/// Checks a decoded request and returns it in canonical form.
pub trait Validate: Sized {
    fn validate(self) -> Result<Self, ApiError>;
}

pub fn validate_isbn(raw: &str) -> Result<String, ApiError> {
    normalize_isbn(raw).ok_or_else(|| ApiError::Validation(format!("'{}' is not an ISBN", raw)))
}

fn current_year() -> i32 {
    Utc::now().year()
}

/// Latest publication year accepted for a new book.
pub fn latest_published_year() -> i32 {
    current_year() + 1
}

impl Validate for NewBook {
    fn validate(self) -> Result<Self, ApiError> {
        let isbn = validate_isbn(&self.isbn)?;

        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(ApiError::Validation("title must not be empty".into()));
        }

        let authors: Vec<String> = self.authors.iter().map(|a| a.trim().to_string()).collect();
        if authors.iter().any(|a| a.is_empty()) {
            return Err(ApiError::Validation("author names must not be empty".into()));
        }

        if let Some(pages) = self.pages {
            if pages == 0 || pages > MAX_PAGES {
                return Err(ApiError::Validation(format!(
                    "pages must be between 1 and {}",
                    MAX_PAGES
                )));
            }
        }

        if let Some(year) = self.published_year {
            if year > latest_published_year() {
                return Err(ApiError::Validation(format!(
                    "published year {} is in the future",
                    year
                )));
            }
        }

        let description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        Ok(NewBook {
            isbn,
            title,
            authors,
            description,
            pages: self.pages,
            published_year: self.published_year,
        })
    }
}

impl Validate for BookUpdate {
    fn validate(self) -> Result<Self, ApiError> {
        if let Some(Some(rating)) = self.rating {
            if rating > MAX_RATING {
                return Err(ApiError::Validation(format!(
                    "rating must be between 0 and {}",
                    MAX_RATING
                )));
            }
        }

        if let Some(Some(year)) = self.read_year {
            let now = current_year();
            if !(MIN_READ_YEAR..=now).contains(&year) {
                return Err(ApiError::Validation(format!(
                    "read year must be between {} and {}",
                    MIN_READ_YEAR, now
                )));
            }
        }

        Ok(self)
    }
}

/// Search input: an ISBN or free text.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SearchRequest {
    Isbn { isbn: String },
    Query { query: String },
}

impl Validate for SearchRequest {
    fn validate(self) -> Result<Self, ApiError> {
        match self {
            SearchRequest::Isbn { isbn } => Ok(SearchRequest::Isbn {
                isbn: validate_isbn(&isbn)?,
            }),
            SearchRequest::Query { query } => {
                let query = query.trim().to_string();
                if query.is_empty() {
                    return Err(ApiError::Validation("query must not be empty".into()));
                }
                Ok(SearchRequest::Query { query })
            }
        }
    }
}

impl From<SearchRequest> for CatalogQuery {
    fn from(request: SearchRequest) -> Self {
        match request {
            SearchRequest::Isbn { isbn } => CatalogQuery::Isbn(isbn),
            SearchRequest::Query { query } => CatalogQuery::Text(query),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IsbnLookupRequest {
    pub isbn: String,
}

impl Validate for IsbnLookupRequest {
    fn validate(self) -> Result<Self, ApiError> {
        Ok(Self {
            isbn: validate_isbn(&self.isbn)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub user: String,
    pub access_key: String,
}

impl Validate for SessionRequest {
    fn validate(self) -> Result<Self, ApiError> {
        let user = self.user.trim().to_string();
        let well_formed = !user.is_empty()
            && user.len() <= 64
            && user
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '@'));
        if !well_formed {
            return Err(ApiError::Validation(
                "user must be 1-64 characters of letters, digits, '_', '-', '.' or '@'".into(),
            ));
        }
        Ok(Self {
            user,
            access_key: self.access_key,
        })
    }
}
