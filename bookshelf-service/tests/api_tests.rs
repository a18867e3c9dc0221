//! Integration tests for the bookshelf HTTP API
//!
//! The router runs against the in-memory backend and a fixed catalog, so the
//! tests cover routing, validation, authorization and reconciliation without
//! network access.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use bookshelf_service::models::book::NewBook;
use bookshelf_service::models::storage::{Backend, MemoryBackend, StorageBackend};
use bookshelf_service::services::catalog::{CatalogQuery, CatalogSource};
use bookshelf_service::services::session::SessionSigner;
use bookshelf_service::{build_router, AppState};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower::util::ServiceExt; // for `oneshot` method

const ACCESS_KEY: &str = "let-me-read";

/// Catalog answering from a fixed table keyed by the `q` parameter.
#[derive(Default)]
struct FixtureCatalog {
    answers: HashMap<String, Vec<NewBook>>,
}

impl FixtureCatalog {
    fn answer(mut self, q: &str, books: Vec<NewBook>) -> Self {
        self.answers.insert(q.to_string(), books);
        self
    }
}

#[async_trait]
impl CatalogSource for FixtureCatalog {
    async fn search(&self, query: &CatalogQuery) -> Vec<NewBook> {
        self.answers.get(&query.to_q()).cloned().unwrap_or_default()
    }
}

fn book(isbn: &str, title: &str, author: &str) -> NewBook {
    NewBook {
        isbn: isbn.to_string(),
        title: title.to_string(),
        authors: vec![author.to_string()],
        description: None,
        pages: Some(300),
        published_year: Some(1965),
    }
}

fn dune() -> NewBook {
    book("9780441172719", "Dune", "Frank Herbert")
}

fn messiah() -> NewBook {
    book("9780441013593", "Dune Messiah", "Frank Herbert")
}

fn children() -> NewBook {
    book("9780441104024", "Children of Dune", "Frank Herbert")
}

fn catalog() -> FixtureCatalog {
    FixtureCatalog::default()
        .answer("dune", vec![dune(), messiah(), children()])
        .answer("isbn:9780441172719", vec![dune()])
        .answer("isbn:9780441013593", vec![messiah(), children()])
}

struct TestApp {
    router: axum::Router,
    backend: Backend,
    signer: Arc<SessionSigner>,
}

impl TestApp {
    fn new() -> Self {
        Self::with_catalog(catalog())
    }

    fn with_catalog(catalog: FixtureCatalog) -> Self {
        let backend: Backend = Arc::new(MemoryBackend::new());
        let signer = Arc::new(SessionSigner::new(
            "test-secret".to_string(),
            ACCESS_KEY.to_string(),
            Duration::hours(1),
        ));
        let router = build_router(AppState {
            backend: backend.clone(),
            catalog: Arc::new(catalog),
            sessions: signer.clone(),
        });
        Self {
            router,
            backend,
            signer,
        }
    }

    fn token(&self) -> String {
        self.signer.issue("reader", Utc::now()).0
    }

    async fn call(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let token = self.token();
        self.call_with(method, uri, Some(&token), body).await
    }

    async fn call_with(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Should read body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn shelve(&self, book: NewBook) {
        self.backend.create_book(&book).await.unwrap();
    }
}

// =============================================================================
// Health and sessions
// =============================================================================

#[tokio::test]
async fn health_needs_no_session() {
    let app = TestApp::new();
    let (status, body) = app.call_with("GET", "/status", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "bookshelf-service");
    assert_eq!(body["status"], "running");
}

#[tokio::test]
async fn session_round_trip() {
    let app = TestApp::new();

    let (status, body) = app
        .call_with(
            "POST",
            "/api/session",
            None,
            Some(json!({ "user": "reader", "accessKey": ACCESS_KEY })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = app
        .call_with("GET", "/api/session/current", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"], "reader");
}

#[tokio::test]
async fn wrong_access_key_is_unauthorized() {
    let app = TestApp::new();
    let (status, body) = app
        .call_with(
            "POST",
            "/api/session",
            None,
            Some(json!({ "user": "reader", "accessKey": "guess" })),
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "unauthorized");
}

#[tokio::test]
async fn protected_routes_reject_missing_or_bad_sessions() {
    let app = TestApp::new();

    for (method, uri) in [
        ("GET", "/api/books"),
        ("GET", "/api/books/9780441172719"),
        ("GET", "/api/session/current"),
    ] {
        let (status, body) = app.call_with(method, uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{} {}", method, uri);
        assert_eq!(body["kind"], "unauthorized");
    }

    let (status, _) = app
        .call_with(
            "POST",
            "/api/search",
            Some("reader:1:deadbeef"),
            Some(json!({ "query": "dune" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let other = SessionSigner::new("other".into(), ACCESS_KEY.into(), Duration::hours(1));
    let (foreign, _) = other.issue("reader", Utc::now());
    let (status, _) = app.call_with("GET", "/api/books", Some(&foreign), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unauthorized_is_checked_before_not_found() {
    let app = TestApp::new();
    let (status, _) = app
        .call_with("GET", "/api/books/9780000000002", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.call("GET", "/api/books/9780000000002", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Books
// =============================================================================

#[tokio::test]
async fn get_book_present_and_absent() {
    let app = TestApp::new();
    app.shelve(dune()).await;

    let (status, body) = app.call("GET", "/api/books/978-0-441-17271-9", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isbn"], "9780441172719");
    assert_eq!(body["title"], "Dune");

    let (status, body) = app.call("GET", "/api/books/9780441013593", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "notFound");
}

#[tokio::test]
async fn create_then_list_newest_first() {
    let app = TestApp::new();

    for book in [dune(), messiah()] {
        let (status, body) = app
            .call("POST", "/api/books", Some(serde_json::to_value(&book).unwrap()))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["isbn"], book.isbn);
        assert_eq!(body["rating"], Value::Null);
    }

    let (status, body) = app.call("GET", "/api/books", None).await;
    assert_eq!(status, StatusCode::OK);
    let titles: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Dune Messiah", "Dune"]);
}

#[tokio::test]
async fn create_duplicate_is_conflict() {
    let app = TestApp::new();
    app.shelve(dune()).await;

    let mut again = dune();
    again.title = "Dune (reissue)".to_string();
    let (status, body) = app
        .call("POST", "/api/books", Some(serde_json::to_value(&again).unwrap()))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "conflict");

    let (_, stored) = app.call("GET", "/api/books/9780441172719", None).await;
    assert_eq!(stored["title"], "Dune");
}

#[tokio::test]
async fn create_rejects_invalid_input() {
    let app = TestApp::new();

    let cases = [
        json!({ "isbn": "12", "title": "Dune", "authors": ["Frank Herbert"] }),
        json!({ "isbn": "9780441172719", "title": "  ", "authors": [] }),
        json!({ "isbn": "9780441172719", "title": "Dune" }),
        json!({ "isbn": "9780441172719", "title": "Dune", "authors": [], "pages": -1 }),
        json!({ "isbn": "9780441172719", "title": "Dune", "authors": [], "pages": 3_000_000_000u64 }),
    ];
    for case in cases {
        let (status, body) = app.call("POST", "/api/books", Some(case.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "accepted {}", case);
        assert_eq!(body["kind"], "validation");
    }

    let (_, body) = app.call("GET", "/api/books", None).await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn update_then_get_reflects_changes() {
    let app = TestApp::new();
    app.shelve(dune()).await;

    let (status, body) = app
        .call(
            "PATCH",
            "/api/books/9780441172719",
            Some(json!({ "rating": 5, "readYear": 2024 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rating"], 5);

    let (status, body) = app.call("GET", "/api/books/9780441172719", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rating"], 5);
    assert_eq!(body["readYear"], 2024);
    assert_eq!(body["title"], "Dune");
    assert_eq!(body["authors"], json!(["Frank Herbert"]));
}

#[tokio::test]
async fn update_is_partial_and_null_clears() {
    let app = TestApp::new();
    app.shelve(dune()).await;
    app.call(
        "PATCH",
        "/api/books/9780441172719",
        Some(json!({ "rating": 4, "readYear": 2020 })),
    )
    .await;

    let (_, body) = app
        .call("PATCH", "/api/books/9780441172719", Some(json!({ "rating": null })))
        .await;
    assert_eq!(body["rating"], Value::Null);
    assert_eq!(body["readYear"], 2020);
}

#[tokio::test]
async fn update_validation_and_missing_book() {
    let app = TestApp::new();
    app.shelve(dune()).await;

    let (status, _) = app
        .call("PATCH", "/api/books/9780441172719", Some(json!({ "rating": 6 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let next_year = Utc::now().format("%Y").to_string().parse::<i32>().unwrap() + 1;
    let (status, _) = app
        .call(
            "PATCH",
            "/api/books/9780441172719",
            Some(json!({ "readYear": next_year })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call("PATCH", "/api/books/9780441013593", Some(json!({ "rating": 3 })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = app.call("GET", "/api/books/9780441172719", None).await;
    assert_eq!(body["rating"], Value::Null);
}

// =============================================================================
// Search and reconciliation
// =============================================================================

#[tokio::test]
async fn search_tags_stored_subset() {
    let app = TestApp::new();
    app.shelve(messiah()).await;
    app.backend
        .update_book(
            "9780441013593",
            &serde_json::from_value(json!({ "rating": 3, "readYear": 2019 })).unwrap(),
        )
        .await
        .unwrap();

    let (status, body) = app
        .call("POST", "/api/search", Some(json!({ "query": "dune" })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let results = body.as_array().unwrap();
    assert_eq!(results.len(), 3);
    let sources: Vec<(&str, &str)> = results
        .iter()
        .map(|r| (r["book"]["isbn"].as_str().unwrap(), r["source"].as_str().unwrap()))
        .collect();
    assert_eq!(
        sources,
        vec![
            ("9780441172719", "externalApi"),
            ("9780441013593", "database"),
            ("9780441104024", "externalApi"),
        ]
    );
    assert_eq!(results[1]["book"]["rating"], 3);
    assert_eq!(results[1]["book"]["readYear"], 2019);
}

#[tokio::test]
async fn search_by_isbn_uses_isbn_query() {
    let app = TestApp::new();
    let (status, body) = app
        .call("POST", "/api/search", Some(json!({ "isbn": "978-0441172719" })))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["source"], "externalApi");
    assert_eq!(body[0]["book"]["title"], "Dune");
}

#[tokio::test]
async fn search_without_catalog_hits_is_empty() {
    let app = TestApp::with_catalog(FixtureCatalog::default());
    let (status, body) = app
        .call("POST", "/api/search", Some(json!({ "query": "nothing at all" })))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn search_rejects_malformed_input() {
    let app = TestApp::new();

    for body in [json!({ "query": "   " }), json!({ "isbn": "abc" }), json!({ "title": "dune" })] {
        let (status, reply) = app.call("POST", "/api/search", Some(body.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "accepted {}", body);
        assert_eq!(reply["kind"], "validation");
    }
}

#[tokio::test]
async fn isbn_lookup_statuses() {
    let app = TestApp::new();

    let (status, body) = app
        .call("POST", "/api/search/isbn", Some(json!({ "isbn": "9780441172719" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["result"]["source"], "externalApi");

    let (_, body) = app
        .call("POST", "/api/search/isbn", Some(json!({ "isbn": "9780441013593" })))
        .await;
    assert_eq!(body["status"], "tooManyResults");
    assert!(body.get("result").is_none());

    let (_, body) = app
        .call("POST", "/api/search/isbn", Some(json!({ "isbn": "9780000000002" })))
        .await;
    assert_eq!(body, json!({ "status": "notFound" }));
}

#[tokio::test]
async fn add_from_search_then_search_again() {
    let app = TestApp::new();

    let (_, found) = app
        .call("POST", "/api/search/isbn", Some(json!({ "isbn": "9780441172719" })))
        .await;
    let candidate = found["result"]["book"].clone();

    let (status, _) = app.call("POST", "/api/books", Some(candidate)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, again) = app
        .call("POST", "/api/search/isbn", Some(json!({ "isbn": "9780441172719" })))
        .await;
    assert_eq!(again["status"], "success");
    assert_eq!(again["result"]["source"], "database");
    assert!(again["result"]["book"]["createdAt"].is_string());
}
