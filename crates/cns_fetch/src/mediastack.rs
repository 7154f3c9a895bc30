use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cns_core::retry::exhausted;
use cns_core::{with_retry, Article, Error, FetchWindow, NewsSource, Result, RetryConfig};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://api.mediastack.com/v1";

const MAX_ERROR_BODY: usize = 300;

/// The news API credential. Never printed.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    /// Returns `None` for a blank key.
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into().trim().to_string();
        if key.is_empty() {
            None
        } else {
            Some(Self(key))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

#[derive(Debug, Clone)]
pub struct NewsConfig {
    pub base_url: String,
    pub keywords: String,
    pub languages: String,
    pub sort: String,
    pub page_size: u32,
    pub max_pages: u32,
    pub timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            keywords: "crypto, bitcoin".to_string(),
            languages: "en".to_string(),
            sort: "popularity".to_string(),
            page_size: 10,
            max_pages: 1,
            timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct NewsResponse {
    #[serde(default)]
    pagination: Option<Pagination>,
    #[serde(default)]
    data: Vec<RawArticle>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    offset: u32,
    #[serde(default)]
    count: u32,
    #[serde(default)]
    total: u32,
}

#[derive(Debug, Deserialize)]
struct RawArticle {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

pub struct MediastackClient {
    client: Client,
    api_key: ApiKey,
    config: NewsConfig,
}

impl fmt::Debug for MediastackClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediastackClient")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &self.api_key)
            .field("config", &self.config)
            .finish()
    }
}

impl MediastackClient {
    pub fn new(api_key: ApiKey, config: NewsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout.min(Duration::from_secs(10)))
            .user_agent(concat!("cns/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, api_key, config })
    }

    pub fn config(&self) -> &NewsConfig {
        &self.config
    }

    fn page_url(&self, window: &FetchWindow, offset: u32) -> Result<Url> {
        let endpoint = format!("{}/news", self.config.base_url.trim_end_matches('/'));
        let date = format!(
            "{},{}",
            window.since.format("%Y-%m-%d"),
            window.until.format("%Y-%m-%d")
        );
        let limit = self.config.page_size.to_string();
        let offset = offset.to_string();

        Url::parse_with_params(
            &endpoint,
            &[
                ("access_key", self.api_key.expose()),
                ("keywords", self.config.keywords.as_str()),
                ("languages", self.config.languages.as_str()),
                ("sort", self.config.sort.as_str()),
                ("limit", limit.as_str()),
                ("offset", offset.as_str()),
                ("date", date.as_str()),
            ],
        )
        .map_err(|e| Error::Config(format!("Invalid news API URL {}: {}", endpoint, e)))
    }

    async fn fetch_page(&self, window: &FetchWindow, offset: u32) -> Result<NewsResponse> {
        let url = self.page_url(window, offset)?;
        // The query string carries the credential, so it is stripped from errors.
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Http(e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(Error::Upstream { status: status.as_u16(), body });
        }

        let page: NewsResponse = response
            .json()
            .await
            .map_err(|e| Error::Http(e.without_url()))?;

        if let Some(error) = page.error {
            return Err(Error::Fetch(format!(
                "news API rejected the request ({}): {}",
                error.code.as_deref().unwrap_or("unknown"),
                error.message.as_deref().unwrap_or("no message")
            )));
        }

        Ok(page)
    }

    /// Walks the result pages for the window and returns normalized,
    /// deduplicated articles published no earlier than `window.since`.
    pub async fn fetch_articles(&self, window: &FetchWindow) -> Result<Vec<Article>> {
        let fetched_at = Utc::now();
        let page_size = self.config.page_size.max(1);
        let mut articles = Vec::new();
        let mut seen = HashSet::new();

        for page_no in 0..self.config.max_pages.max(1) {
            let offset = page_no * page_size;
            let what = format!("news page {}", page_no + 1);

            let page = with_retry(&self.config.retry, &what, || self.fetch_page(window, offset))
                .await
                .map_err(|e| exhausted(&what, &self.config.retry, e))?;

            let count = page.data.len();
            info!("📡 Fetched {} with {} articles", what, count);

            for raw in page.data {
                let Some(article) = normalize(raw, fetched_at) else {
                    continue;
                };
                if !window.contains(&article.published_at) {
                    debug!("Skipping article older than window: {}", article.url);
                    continue;
                }
                if seen.insert(article.key()) {
                    articles.push(article);
                }
            }

            let last_page = match page.pagination {
                Some(p) => count == 0 || u64::from(p.offset) + u64::from(p.count) >= u64::from(p.total),
                None => count < page_size as usize,
            };
            if last_page {
                break;
            }
        }

        info!("📰 {} unique articles in window", articles.len());
        Ok(articles)
    }
}

fn normalize(raw: RawArticle, fetched_at: DateTime<Utc>) -> Option<Article> {
    let title = raw.title.unwrap_or_default();
    let url = raw.url.unwrap_or_default();
    if title.trim().is_empty() || url.trim().is_empty() {
        return None;
    }

    let published_at = match raw.published_at.as_deref().map(DateTime::parse_from_rfc3339) {
        Some(Ok(at)) => at.with_timezone(&Utc),
        None | Some(Err(_)) => {
            warn!(
                "⚠️ Unusable published_at {:?} for {}, using fetch time",
                raw.published_at,
                url.trim()
            );
            fetched_at
        }
    };

    Some(Article::new(
        title,
        raw.description.unwrap_or_default(),
        url,
        raw.source.unwrap_or_default(),
        published_at,
    ))
}

#[async_trait]
impl NewsSource for MediastackClient {
    fn source(&self) -> &str {
        "mediastack"
    }

    async fn fetch(&self, window: &FetchWindow) -> Result<Vec<Article>> {
        self.fetch_articles(window).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Query, State};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use chrono::TimeZone;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn spawn_server(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    fn test_config(base_url: String) -> NewsConfig {
        NewsConfig {
            base_url,
            retry: RetryConfig::new(3, Duration::from_millis(5)),
            timeout: Duration::from_secs(5),
            ..NewsConfig::default()
        }
    }

    fn window() -> FetchWindow {
        FetchWindow::new(
            Utc.with_ymd_and_hms(2024, 12, 19, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 12, 20, 12, 0, 0).unwrap(),
        )
    }

    fn raw(n: usize) -> Value {
        json!({
            "title": format!("Bitcoin story {}", n),
            "description": "Markets move",
            "url": format!("https://news.example/{}", n),
            "source": "Example Wire",
            "published_at": "2024-12-20T08:00:00+00:00"
        })
    }

    #[tokio::test]
    async fn test_paginates_until_total() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/v1/news",
                get(|State(hits): State<Arc<AtomicUsize>>, Query(q): Query<HashMap<String, String>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    let offset: usize = q["offset"].parse().unwrap();
                    let all: Vec<Value> = (0..3).map(raw).collect();
                    let data: Vec<Value> = all.into_iter().skip(offset).take(2).collect();
                    Json(json!({
                        "pagination": {"limit": 2, "offset": offset, "count": data.len(), "total": 3},
                        "data": data
                    }))
                }),
            )
            .with_state(hits.clone());
        let base = spawn_server(app).await;

        let config = NewsConfig { page_size: 2, max_pages: 5, ..test_config(base) };
        let client = MediastackClient::new(ApiKey::new("key").unwrap(), config).unwrap();
        let articles = client.fetch(&window()).await.unwrap();

        assert_eq!(articles.len(), 3);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_sends_credential_and_query() {
        let app = Router::new().route(
            "/v1/news",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                assert_eq!(q["access_key"], "secret");
                assert_eq!(q["keywords"], "crypto, bitcoin");
                assert_eq!(q["languages"], "en");
                assert_eq!(q["date"], "2024-12-19,2024-12-20");
                Json(json!({"pagination": {"offset": 0, "count": 1, "total": 1}, "data": [raw(1)]}))
            }),
        );
        let base = spawn_server(app).await;

        let client = MediastackClient::new(ApiKey::new("secret").unwrap(), test_config(base)).unwrap();
        let articles = client.fetch(&window()).await.unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].source.name, "Example Wire");
    }

    #[tokio::test]
    async fn test_filters_incomplete_duplicate_and_stale_records() {
        let app = Router::new().route(
            "/v1/news",
            get(|| async {
                Json(json!({
                    "pagination": {"offset": 0, "count": 6, "total": 6},
                    "data": [
                        raw(1),
                        {"title": "No link", "url": null, "published_at": "2024-12-20T08:00:00+00:00"},
                        {"title": "", "url": "https://news.example/empty", "published_at": "2024-12-20T08:00:00+00:00"},
                        {"title": "Same story", "url": "https://NEWS.example/1 ", "published_at": "2024-12-20T09:00:00+00:00"},
                        {"title": "Old", "url": "https://news.example/old", "published_at": "2024-12-01T08:00:00+00:00"},
                        raw(2)
                    ]
                }))
            }),
        );
        let base = spawn_server(app).await;

        let client = MediastackClient::new(ApiKey::new("key").unwrap(), test_config(base)).unwrap();
        let articles = client.fetch(&window()).await.unwrap();
        let urls: Vec<&str> = articles.iter().map(|a| a.url.as_str()).collect();

        assert_eq!(urls, vec!["https://news.example/1", "https://news.example/2"]);
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_retries() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/v1/news",
                get(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::INTERNAL_SERVER_ERROR, "upstream down").into_response()
                }),
            )
            .with_state(hits.clone());
        let base = spawn_server(app).await;

        let client = MediastackClient::new(ApiKey::new("key").unwrap(), test_config(base)).unwrap();
        let err = client.fetch(&window()).await.unwrap_err();

        assert!(matches!(err, Error::Fetch(_)));
        assert!(err.to_string().contains("after 3 attempts"));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/v1/news",
                get(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::UNAUTHORIZED, "invalid access key").into_response()
                }),
            )
            .with_state(hits.clone());
        let base = spawn_server(app).await;

        let client = MediastackClient::new(ApiKey::new("key").unwrap(), test_config(base)).unwrap();
        let err = client.fetch(&window()).await.unwrap_err();

        assert_eq!(err.kind(), cns_core::ErrorKind::Fetch);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_api_error_body_fails_fetch() {
        let app = Router::new().route(
            "/v1/news",
            get(|| async {
                Json(json!({"error": {"code": "usage_limit_reached", "message": "Monthly limit reached"}}))
            }),
        );
        let base = spawn_server(app).await;

        let client = MediastackClient::new(ApiKey::new("key").unwrap(), test_config(base)).unwrap();
        let err = client.fetch(&window()).await.unwrap_err();
        assert!(err.to_string().contains("usage_limit_reached"));
    }

    #[test]
    fn test_api_key_is_redacted() {
        let key = ApiKey::new("super-secret").unwrap();
        assert_eq!(format!("{:?}", key), "ApiKey(<redacted>)");
        assert!(ApiKey::new("   ").is_none());
    }

    #[test]
    fn test_normalize_falls_back_to_fetch_time() {
        let fetched_at = Utc.with_ymd_and_hms(2024, 12, 20, 12, 0, 0).unwrap();
        let article = normalize(
            RawArticle {
                title: Some(" Title ".into()),
                description: None,
                url: Some("https://news.example/x".into()),
                source: None,
                published_at: Some("yesterday".into()),
            },
            fetched_at,
        )
        .unwrap();

        assert_eq!(article.published_at, fetched_at);
        assert_eq!(article.title, "Title");
        assert_eq!(article.description, "");
    }
}
