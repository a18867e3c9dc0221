use crate::models::book::NewBook;
use crate::models::requests::{latest_published_year, Validate, MAX_PAGES};
use crate::utils::isbn::{normalize_isbn, published_year};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_CATALOG_URL: &str = "https://www.googleapis.com/books/v1/volumes";

/// Upper bound on candidates handed to reconciliation.
pub const MAX_CANDIDATES: usize = 10;

const VOLUME_FIELDS: &str =
    "items(volumeInfo(title,authors,description,industryIdentifiers,pageCount,publishedDate))";

pub type Catalog = Arc<dyn CatalogSource + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum CatalogQuery {
    Isbn(String),
    Text(String),
}

impl CatalogQuery {
    /// Value of the `q` parameter understood by the volumes API.
    pub fn to_q(&self) -> String {
        match self {
            CatalogQuery::Isbn(isbn) => format!("isbn:{}", isbn),
            CatalogQuery::Text(text) => text.clone(),
        }
    }
}

/// A source of book candidates. Implementations never fail: an unreachable
/// or misbehaving catalog yields no candidates.
#[async_trait]
pub trait CatalogSource {
    async fn search(&self, query: &CatalogQuery) -> Vec<NewBook>;
}

#[derive(Debug, Default, Deserialize)]
pub struct VolumesResponse {
    #[serde(default)]
    pub items: Option<Vec<Volume>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    #[serde(default)]
    pub volume_info: VolumeInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeInfo {
    pub title: Option<String>,
    pub authors: Option<Vec<String>>,
    pub description: Option<String>,
    #[serde(default)]
    pub industry_identifiers: Option<Vec<IndustryIdentifier>>,
    pub page_count: Option<i64>,
    pub published_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IndustryIdentifier {
    #[serde(rename = "type")]
    pub kind: String,
    pub identifier: String,
}

fn isbn13(info: &VolumeInfo) -> Option<String> {
    info.industry_identifiers
        .as_deref()?
        .iter()
        .find(|id| id.kind == "ISBN_13")
        .and_then(|id| normalize_isbn(&id.identifier))
        .filter(|isbn| isbn.len() == 13)
}

/// Turns one catalog record into a candidate, or drops it when it lacks an
/// ISBN-13 or would not pass `create` validation. Out-of-range optional
/// fields are discarded rather than failing the record.
pub fn normalize_volume(info: &VolumeInfo) -> Option<NewBook> {
    let candidate = NewBook {
        isbn: isbn13(info)?,
        title: info.title.clone()?,
        authors: info.authors.clone()?,
        description: info.description.clone(),
        pages: info
            .page_count
            .and_then(|p| u32::try_from(p).ok())
            .filter(|p| (1..=MAX_PAGES).contains(p)),
        published_year: info
            .published_date
            .as_deref()
            .and_then(published_year)
            .filter(|year| *year <= latest_published_year()),
    };

    candidate.validate().ok()
}

pub fn normalize_volumes(response: VolumesResponse) -> Vec<NewBook> {
    response
        .items
        .unwrap_or_default()
        .iter()
        .filter_map(|volume| normalize_volume(&volume.volume_info))
        .take(MAX_CANDIDATES)
        .collect()
}

/// Google Books volumes API client.
pub struct GoogleBooksClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    language: Option<String>,
}

impl GoogleBooksClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.to_string(),
            api_key: None,
            language: None,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Restricts results to one language (ISO 639-1 code).
    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }

    async fn fetch(&self, query: &CatalogQuery) -> Result<VolumesResponse, reqwest::Error> {
        let mut params = vec![("q", query.to_q()), ("fields", VOLUME_FIELDS.to_string())];
        if let Some(ref key) = self.api_key {
            params.push(("key", key.clone()));
        }
        if let Some(ref language) = self.language {
            params.push(("langRestrict", language.clone()));
        }

        self.client
            .get(&self.base_url)
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .json::<VolumesResponse>()
            .await
    }
}

#[async_trait]
impl CatalogSource for GoogleBooksClient {
    async fn search(&self, query: &CatalogQuery) -> Vec<NewBook> {
        match self.fetch(query).await {
            Ok(response) => {
                let candidates = normalize_volumes(response);
                info!(
                    "Catalog returned {} usable candidates for '{}'",
                    candidates.len(),
                    query.to_q()
                );
                candidates
            }
            Err(e) => {
                warn!("Catalog request for '{}' failed: {}", query.to_q(), e);
                Vec::new()
            }
        }
    }
}
