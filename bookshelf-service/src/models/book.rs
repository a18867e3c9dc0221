use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A book on the shelf, together with the owner's reading state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub isbn: String,
    pub title: String,
    pub authors: Vec<String>,
    pub description: Option<String>,
    pub pages: Option<u32>,
    pub published_year: Option<i32>,
    pub rating: Option<u8>,
    pub read_year: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Catalog fields of a book, without reading state. This is both the `create`
/// input and the shape of a catalog candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBook {
    pub isbn: String,
    pub title: String,
    pub authors: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub pages: Option<u32>,
    #[serde(default)]
    pub published_year: Option<i32>,
}

/// Partial update of the reading state.
///
/// `None` leaves the stored value alone, `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookUpdate {
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub rating: Option<Option<u8>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub read_year: Option<Option<i32>>,
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl Book {
    pub fn from_new(new: NewBook, now: DateTime<Utc>) -> Self {
        Self {
            isbn: new.isbn,
            title: new.title,
            authors: new.authors,
            description: new.description,
            pages: new.pages,
            published_year: new.published_year,
            rating: None,
            read_year: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, changes: &BookUpdate, now: DateTime<Utc>) {
        if let Some(rating) = changes.rating {
            self.rating = rating;
        }
        if let Some(read_year) = changes.read_year {
            self.read_year = read_year;
        }
        self.updated_at = now;
    }
}

impl BookUpdate {
    pub fn is_empty(&self) -> bool {
        self.rating.is_none() && self.read_year.is_none()
    }
}

/// One search hit, tagged with where the book came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "camelCase")]
pub enum SearchResult {
    /// Already on the shelf; carries the stored record.
    Database { book: Book },
    /// Only known to the catalog; can be added.
    ExternalApi { book: NewBook },
}

impl SearchResult {
    pub fn isbn(&self) -> &str {
        match self {
            SearchResult::Database { book } => &book.isbn,
            SearchResult::ExternalApi { book } => &book.isbn,
        }
    }
}

/// Outcome of looking up a single ISBN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum IsbnLookup {
    Success { result: SearchResult },
    NotFound,
    TooManyResults { count: usize },
}
