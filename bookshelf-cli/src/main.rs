use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Book {
    isbn: String,
    title: String,
    authors: Vec<String>,
    description: Option<String>,
    pages: Option<u32>,
    published_year: Option<i32>,
    #[serde(default)]
    rating: Option<u8>,
    #[serde(default)]
    read_year: Option<i32>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "source", rename_all = "camelCase")]
enum SearchResult {
    Database { book: Book },
    ExternalApi { book: Book },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
enum IsbnLookup {
    Success { result: SearchResult },
    NotFound,
    TooManyResults { count: usize },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    token: String,
    user: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    service: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Parser)]
#[command(name = "bookshelf", about = "Search, add and rate books on your shelf")]
struct Cli {
    /// Base URL of the bookshelf service
    #[arg(long, env = "BOOKSHELF_URL", default_value = "http://0.0.0.0:7000")]
    url: String,

    /// Session token from `bookshelf login`
    #[arg(long, env = "BOOKSHELF_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check that the service is up
    Status,
    /// Open a session and print its token
    Login {
        #[arg(long)]
        user: String,
        #[arg(long, env = "BOOKSHELF_ACCESS_KEY", hide_env_values = true)]
        access_key: String,
    },
    /// Search the catalog by ISBN or free text
    Search {
        /// Treat the term as an ISBN
        #[arg(long)]
        isbn: bool,
        #[arg(required = true)]
        terms: Vec<String>,
    },
    /// Add the book with this ISBN from the catalog
    Add { isbn: String },
    /// List the shelf, newest first
    List,
    /// Show one book
    Show { isbn: String },
    /// Record a rating and/or the year you read a book
    Rate(RateArgs),
}

#[derive(Args)]
struct RateArgs {
    isbn: String,
    /// Rating from 0 to 5
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=5), conflicts_with = "clear_rating")]
    rating: Option<u8>,
    #[arg(long, conflicts_with = "clear_read_year")]
    read_year: Option<i32>,
    #[arg(long)]
    clear_rating: bool,
    #[arg(long)]
    clear_read_year: bool,
}

impl RateArgs {
    fn changes(&self) -> Map<String, Value> {
        let mut changes = Map::new();
        if let Some(rating) = self.rating {
            changes.insert("rating".into(), json!(rating));
        } else if self.clear_rating {
            changes.insert("rating".into(), Value::Null);
        }
        if let Some(year) = self.read_year {
            changes.insert("readYear".into(), json!(year));
        } else if self.clear_read_year {
            changes.insert("readYear".into(), Value::Null);
        }
        changes
    }
}

struct BookshelfClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl BookshelfClient {
    fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self
            .token
            .as_ref()
            .ok_or_else(|| anyhow!("no session: run `bookshelf login` and set BOOKSHELF_TOKEN"))?;
        Ok(request.bearer_auth(token))
    }

    async fn read<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .context("unexpected response from the bookshelf service");
        }

        match response.json::<ErrorBody>().await {
            Ok(body) => bail!(body.error),
            Err(_) => bail!("bookshelf service answered {}", status),
        }
    }

    async fn status(&self) -> Result<HealthResponse> {
        let response = self.client.get(self.url("/status")).send().await?;
        Self::read(response).await
    }

    async fn login(&self, user: &str, access_key: &str) -> Result<SessionResponse> {
        let response = self
            .client
            .post(self.url("/api/session"))
            .json(&json!({ "user": user, "accessKey": access_key }))
            .send()
            .await?;
        Self::read(response).await
    }

    async fn search(&self, body: Value) -> Result<Vec<SearchResult>> {
        info!("Searching with {}", body);
        let request = self.client.post(self.url("/api/search")).json(&body);
        Self::read(self.authorized(request)?.send().await?).await
    }

    async fn lookup(&self, isbn: &str) -> Result<IsbnLookup> {
        let request = self
            .client
            .post(self.url("/api/search/isbn"))
            .json(&json!({ "isbn": isbn }));
        Self::read(self.authorized(request)?.send().await?).await
    }

    async fn create(&self, book: &Book) -> Result<Book> {
        let body = json!({
            "isbn": book.isbn,
            "title": book.title,
            "authors": book.authors,
            "description": book.description,
            "pages": book.pages,
            "publishedYear": book.published_year,
        });
        let request = self.client.post(self.url("/api/books")).json(&body);
        Self::read(self.authorized(request)?.send().await?).await
    }

    async fn list(&self) -> Result<Vec<Book>> {
        let request = self.client.get(self.url("/api/books"));
        Self::read(self.authorized(request)?.send().await?).await
    }

    async fn get(&self, isbn: &str) -> Result<Book> {
        let request = self.client.get(self.url(&format!("/api/books/{}", isbn)));
        Self::read(self.authorized(request)?.send().await?).await
    }

    async fn update(&self, isbn: &str, changes: &Map<String, Value>) -> Result<Book> {
        let request = self
            .client
            .patch(self.url(&format!("/api/books/{}", isbn)))
            .json(changes);
        Self::read(self.authorized(request)?.send().await?).await
    }
}

fn stars(rating: Option<u8>) -> String {
    match rating {
        Some(r) => format!(
            "{}{}",
            "★".repeat(r as usize),
            "☆".repeat(5usize.saturating_sub(r as usize))
        ),
        None => "-".to_string(),
    }
}

fn summary(book: &Book) -> String {
    let year = book
        .published_year
        .map(|y| format!(" ({})", y))
        .unwrap_or_default();
    format!("{}  {}{} by {}", book.isbn, book.title, year, book.authors.join(", "))
}

fn print_result(result: &SearchResult) {
    match result {
        SearchResult::Database { book } => {
            println!("[on shelf] {}  {}", summary(book), stars(book.rating))
        }
        SearchResult::ExternalApi { book } => println!("[add]      {}", summary(book)),
    }
}

fn print_details(book: &Book) {
    println!("{}", book.title);
    println!("  ISBN:       {}", book.isbn);
    println!("  Authors:    {}", book.authors.join(", "));
    if let Some(year) = book.published_year {
        println!("  Published:  {}", year);
    }
    if let Some(pages) = book.pages {
        println!("  Pages:      {}", pages);
    }
    println!("  Rating:     {}", stars(book.rating));
    println!(
        "  Read in:    {}",
        book.read_year.map(|y| y.to_string()).unwrap_or_else(|| "-".into())
    );
    if let Some(added) = book.created_at {
        println!("  Added:      {}", added.format("%Y-%m-%d"));
    }
    if let Some(ref description) = book.description {
        println!();
        println!("{}", description);
    }
}

fn looks_like_isbn(term: &str) -> bool {
    let digits: String = term.chars().filter(|c| !matches!(c, '-' | ' ')).collect();
    matches!(digits.len(), 10 | 13)
        && digits
            .chars()
            .enumerate()
            .all(|(i, c)| c.is_ascii_digit() || (i == 9 && digits.len() == 10 && c.eq_ignore_ascii_case(&'x')))
}

async fn run(cli: Cli) -> Result<()> {
    let client = BookshelfClient::new(&cli.url, cli.token);

    match cli.command {
        Command::Status => {
            let health = client.status().await?;
            println!("{} is {}", health.service, health.status);
        }
        Command::Login { user, access_key } => {
            let session = client.login(&user, &access_key).await?;
            println!("Logged in as {} until {}", session.user, session.expires_at);
            println!("export BOOKSHELF_TOKEN={}", session.token);
        }
        Command::Search { isbn, terms } => {
            let term = terms.join(" ");
            let body = if isbn || looks_like_isbn(&term) {
                json!({ "isbn": term })
            } else {
                json!({ "query": term })
            };
            let results = client.search(body).await?;
            if results.is_empty() {
                println!("No books found");
            }
            for result in &results {
                print_result(result);
            }
        }
        Command::Add { isbn } => match client.lookup(&isbn).await? {
            IsbnLookup::Success {
                result: SearchResult::ExternalApi { book },
            } => {
                let created = client.create(&book).await?;
                println!("Added {}", summary(&created));
            }
            IsbnLookup::Success {
                result: SearchResult::Database { book },
            } => println!("Already on the shelf: {}", summary(&book)),
            IsbnLookup::NotFound => bail!("Book not found"),
            IsbnLookup::TooManyResults { count } => {
                bail!("Too many results ({} matches), try a more specific ISBN", count)
            }
        },
        Command::List => {
            let books = client.list().await?;
            if books.is_empty() {
                println!("The shelf is empty");
            }
            for book in &books {
                println!("{}  {}", summary(book), stars(book.rating));
            }
        }
        Command::Show { isbn } => print_details(&client.get(&isbn).await?),
        Command::Rate(args) => {
            let changes = args.changes();
            if changes.is_empty() {
                bail!("nothing to change: pass --rating, --read-year or a --clear flag");
            }
            let book = client.update(&args.isbn, &changes).await?;
            print_details(&book);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bookshelf_cli=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}
