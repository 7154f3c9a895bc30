use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleSource {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    pub source: ArticleSource,
    pub published_at: DateTime<Utc>,
}

impl Article {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        url: impl Into<String>,
        source: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        let url = url.into().trim().to_string();
        Self {
            id: article_id(&url),
            title: title.into().trim().to_string(),
            description: description.into().trim().to_string(),
            url,
            source: ArticleSource { name: source.into().trim().to_string() },
            published_at,
        }
    }

    /// Key used to recognise the same story across runs.
    pub fn key(&self) -> String {
        normalize_url(&self.url)
    }

    pub fn month(&self) -> MonthKey {
        MonthKey::from_datetime(&self.published_at)
    }
}

pub fn normalize_url(url: &str) -> String {
    url.trim().to_lowercase()
}

/// First 16 hex chars of the SHA-256 of the normalized URL.
pub fn article_id(url: &str) -> String {
    let digest = Sha256::digest(normalize_url(url).as_bytes());
    digest.iter().take(8).map(|b| format!("{:02x}", b)).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    /// Precedence used when two labels carry the same probability.
    pub const TIE_ORDER: [SentimentLabel; 3] = [
        SentimentLabel::Neutral,
        SentimentLabel::Positive,
        SentimentLabel::Negative,
    ];

    pub fn value(&self) -> f64 {
        match self {
            SentimentLabel::Positive => 1.0,
            SentimentLabel::Neutral => 0.0,
            SentimentLabel::Negative => -1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Negative => "negative",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw classifier output: one probability mass per label.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LabelDistribution {
    pub positive: f64,
    pub neutral: f64,
    pub negative: f64,
}

impl LabelDistribution {
    pub fn new(positive: f64, neutral: f64, negative: f64) -> Self {
        Self { positive, neutral, negative }
    }

    pub fn get(&self, label: SentimentLabel) -> f64 {
        match label {
            SentimentLabel::Positive => self.positive,
            SentimentLabel::Neutral => self.neutral,
            SentimentLabel::Negative => self.negative,
        }
    }

    pub fn add(&mut self, label: SentimentLabel, mass: f64) {
        match label {
            SentimentLabel::Positive => self.positive += mass,
            SentimentLabel::Neutral => self.neutral += mass,
            SentimentLabel::Negative => self.negative += mass,
        }
    }

    pub fn total(&self) -> f64 {
        self.positive + self.neutral + self.negative
    }

    /// False for empty, all-zero, negative or NaN output.
    pub fn is_usable(&self) -> bool {
        let values = [self.positive, self.neutral, self.negative];
        values.iter().all(|v| v.is_finite() && *v >= 0.0) && self.total() > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    pub article_id: String,
    pub label: SentimentLabel,
    pub confidence: f64,
}

impl SentimentResult {
    pub fn score(&self) -> f64 {
        self.label.value()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredArticle {
    #[serde(flatten)]
    pub article: Article,
    pub sentiment: SentimentResult,
}

impl ScoredArticle {
    pub fn new(article: Article, sentiment: SentimentResult) -> Self {
        Self { article, sentiment }
    }

    pub fn key(&self) -> String {
        self.article.key()
    }
}

/// Year and month an archive file covers, rendered like `2024Dec`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|_| Self { year, month })
    }

    pub fn from_datetime(at: &DateTime<Utc>) -> Self {
        Self { year: at.year(), month: at.month() }
    }

    /// Parses a file stem such as `2024Dec`.
    pub fn parse(stem: &str) -> Option<Self> {
        if stem.len() != 7 || !stem.is_ascii() || !stem[..4].chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let date = NaiveDate::parse_from_str(&format!("{}01", stem), "%Y%b%d").ok()?;
        Some(Self { year: date.year(), month: date.month() })
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match NaiveDate::from_ymd_opt(self.year, self.month, 1) {
            Some(date) => write!(f, "{}", date.format("%Y%b")),
            None => write!(f, "{:04}-{:02}", self.year, self.month),
        }
    }
}

/// Time range a fetch should cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl FetchWindow {
    pub fn new(since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self { since, until }
    }

    pub fn contains(&self, at: &DateTime<Utc>) -> bool {
        *at >= self.since
    }
}
