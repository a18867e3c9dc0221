use crate::models::book::{Book, BookUpdate, NewBook};
use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("ISBN {0} is already on the shelf")]
    Duplicate(String),
}

pub type Backend = Arc<dyn StorageBackend + Send + Sync>;

/// Key-based access to the shelf. Every method is a single record operation.
#[async_trait]
pub trait StorageBackend {
    /// Inserts a new book. Fails with `Duplicate` when the ISBN is taken.
    async fn create_book(&self, book: &NewBook) -> Result<Book, StorageError>;
    async fn get_book(&self, isbn: &str) -> Result<Option<Book>, StorageError>;
    /// All books, newest first.
    async fn list_books(&self) -> Result<Vec<Book>, StorageError>;
    /// Batched lookup. ISBNs with no stored record are skipped.
    async fn find_books(&self, isbns: &[String]) -> Result<Vec<Book>, StorageError>;
    async fn update_book(
        &self,
        isbn: &str,
        changes: &BookUpdate,
    ) -> Result<Option<Book>, StorageError>;
    async fn test_connection(&self) -> Result<(), StorageError>;
}

const CREATED_INDEX: &str = "books:by_created";
const CREATED_SEQUENCE: &str = "books:created_seq";

/// Stores the record only if the key is free and indexes it under the next
/// sequence number, in one step. Returns 1 when created, 0 on a duplicate.
const CREATE_BOOK_SCRIPT: &str = r#"
if not redis.call('SET', KEYS[1], ARGV[1], 'NX') then
    return 0
end
local seq = redis.call('INCR', KEYS[3])
redis.call('ZADD', KEYS[2], seq, ARGV[2])
return 1
"#;

fn book_key(isbn: &str) -> String {
    format!("book:{}", isbn)
}

pub struct RedisBackend {
    client: redis::Client,
    create_script: redis::Script,
}

impl RedisBackend {
    pub fn new(redis_url: &str) -> Result<Self, StorageError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            create_script: redis::Script::new(CREATE_BOOK_SCRIPT),
        })
    }

    pub async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, StorageError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    async fn fetch_many(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        isbns: &[String],
    ) -> Result<Vec<Book>, StorageError> {
        if isbns.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = isbns.iter().map(|isbn| book_key(isbn)).collect();
        let values: Vec<Option<String>> = redis::cmd("MGET").arg(&keys).query_async(conn).await?;

        values
            .into_iter()
            .flatten()
            .map(|json| serde_json::from_str(&json).map_err(StorageError::from))
            .collect()
    }
}

#[async_trait]
impl StorageBackend for RedisBackend {
    async fn create_book(&self, book: &NewBook) -> Result<Book, StorageError> {
        let mut conn = self.get_connection().await?;

        let stored = Book::from_new(book.clone(), Utc::now());
        let value = serde_json::to_string(&stored)?;

        let created: i32 = self
            .create_script
            .key(book_key(&stored.isbn))
            .key(CREATED_INDEX)
            .key(CREATED_SEQUENCE)
            .arg(&value)
            .arg(&stored.isbn)
            .invoke_async(&mut conn)
            .await?;
        if created == 0 {
            return Err(StorageError::Duplicate(stored.isbn));
        }

        Ok(stored)
    }

    async fn get_book(&self, isbn: &str) -> Result<Option<Book>, StorageError> {
        let mut conn = self.get_connection().await?;

        let value: Option<String> = conn.get(book_key(isbn)).await?;

        match value {
            Some(json_str) => Ok(Some(serde_json::from_str(&json_str)?)),
            None => Ok(None),
        }
    }

    async fn list_books(&self) -> Result<Vec<Book>, StorageError> {
        let mut conn = self.get_connection().await?;

        let isbns: Vec<String> = conn.zrevrange(CREATED_INDEX, 0, -1).await?;
        self.fetch_many(&mut conn, &isbns).await
    }

    async fn find_books(&self, isbns: &[String]) -> Result<Vec<Book>, StorageError> {
        let mut conn = self.get_connection().await?;
        self.fetch_many(&mut conn, isbns).await
    }

    async fn update_book(
        &self,
        isbn: &str,
        changes: &BookUpdate,
    ) -> Result<Option<Book>, StorageError> {
        let mut conn = self.get_connection().await?;

        let key = book_key(isbn);
        let value: Option<String> = conn.get(&key).await?;
        let mut book: Book = match value {
            Some(json_str) => serde_json::from_str(&json_str)?,
            None => return Ok(None),
        };

        book.apply(changes, Utc::now());
        conn.set::<_, _, ()>(&key, serde_json::to_string(&book)?).await?;

        Ok(Some(book))
    }

    async fn test_connection(&self) -> Result<(), StorageError> {
        let mut conn = self.get_connection().await?;
        let _: Option<String> = conn.get("__connection_test__").await?;
        Ok(())
    }
}

pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    pub async fn new(database_url: &str) -> Result<Self, StorageError> {
        let pool = PgPool::connect(database_url).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS books (
                isbn TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                authors TEXT[] NOT NULL DEFAULT '{}',
                description TEXT,
                pages INTEGER CHECK (pages > 0),
                published_year INTEGER,
                rating SMALLINT CHECK (rating BETWEEN 0 AND 5),
                read_year INTEGER,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_books_created_at ON books(created_at DESC)
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }
}

fn book_from_row(row: &PgRow) -> Result<Book, sqlx::Error> {
    Ok(Book {
        isbn: row.try_get("isbn")?,
        title: row.try_get("title")?,
        authors: row.try_get("authors")?,
        description: row.try_get("description")?,
        pages: row
            .try_get::<Option<i32>, _>("pages")?
            .and_then(|p| u32::try_from(p).ok()),
        published_year: row.try_get("published_year")?,
        rating: row
            .try_get::<Option<i16>, _>("rating")?
            .and_then(|r| u8::try_from(r).ok()),
        read_year: row.try_get("read_year")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl StorageBackend for PostgresBackend {
    async fn create_book(&self, book: &NewBook) -> Result<Book, StorageError> {
        let result = sqlx::query(
            r#"
            INSERT INTO books (isbn, title, authors, description, pages, published_year)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING isbn, title, authors, description, pages, published_year,
                      rating, read_year, created_at, updated_at
            "#,
        )
        .bind(&book.isbn)
        .bind(&book.title)
        .bind(&book.authors)
        .bind(&book.description)
        .bind(book.pages.and_then(|p| i32::try_from(p).ok()))
        .bind(book.published_year)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(book_from_row(&row)?),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StorageError::Duplicate(book.isbn.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_book(&self, isbn: &str) -> Result<Option<Book>, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT isbn, title, authors, description, pages, published_year,
                   rating, read_year, created_at, updated_at
            FROM books WHERE isbn = $1
            "#,
        )
        .bind(isbn)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(book_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_books(&self) -> Result<Vec<Book>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT isbn, title, authors, description, pages, published_year,
                   rating, read_year, created_at, updated_at
            FROM books ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(book_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn find_books(&self, isbns: &[String]) -> Result<Vec<Book>, StorageError> {
        if isbns.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT isbn, title, authors, description, pages, published_year,
                   rating, read_year, created_at, updated_at
            FROM books WHERE isbn = ANY($1)
            "#,
        )
        .bind(isbns)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(book_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn update_book(
        &self,
        isbn: &str,
        changes: &BookUpdate,
    ) -> Result<Option<Book>, StorageError> {
        let row = sqlx::query(
            r#"
            UPDATE books SET
                rating = CASE WHEN $2 THEN $3 ELSE rating END,
                read_year = CASE WHEN $4 THEN $5 ELSE read_year END,
                updated_at = now()
            WHERE isbn = $1
            RETURNING isbn, title, authors, description, pages, published_year,
                      rating, read_year, created_at, updated_at
            "#,
        )
        .bind(isbn)
        .bind(changes.rating.is_some())
        .bind(changes.rating.flatten().map(i16::from))
        .bind(changes.read_year.is_some())
        .bind(changes.read_year.flatten())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(book_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn test_connection(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

/// Process-local shelf. Used for development and tests.
#[derive(Default)]
pub struct MemoryBackend {
    books: RwLock<Vec<Book>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn create_book(&self, book: &NewBook) -> Result<Book, StorageError> {
        let mut books = self.books.write().await;

        if books.iter().any(|b| b.isbn == book.isbn) {
            return Err(StorageError::Duplicate(book.isbn.clone()));
        }

        let stored = Book::from_new(book.clone(), Utc::now());
        books.push(stored.clone());
        Ok(stored)
    }

    async fn get_book(&self, isbn: &str) -> Result<Option<Book>, StorageError> {
        let books = self.books.read().await;
        Ok(books.iter().find(|b| b.isbn == isbn).cloned())
    }

    async fn list_books(&self) -> Result<Vec<Book>, StorageError> {
        let books = self.books.read().await;
        Ok(books.iter().rev().cloned().collect())
    }

    async fn find_books(&self, isbns: &[String]) -> Result<Vec<Book>, StorageError> {
        let books = self.books.read().await;
        Ok(books
            .iter()
            .filter(|b| isbns.contains(&b.isbn))
            .cloned()
            .collect())
    }

    async fn update_book(
        &self,
        isbn: &str,
        changes: &BookUpdate,
    ) -> Result<Option<Book>, StorageError> {
        let mut books = self.books.write().await;

        match books.iter_mut().find(|b| b.isbn == isbn) {
            Some(book) => {
                book.apply(changes, Utc::now());
                Ok(Some(book.clone()))
            }
            None => Ok(None),
        }
    }

    async fn test_connection(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
