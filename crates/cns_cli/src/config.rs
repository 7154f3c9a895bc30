use clap::Parser;
use cns_core::{Error, Result, RetryConfig};
use cns_fetch::mediastack::DEFAULT_BASE_URL;
use cns_fetch::{ApiKey, NewsConfig};
use cns_inference::{ModelConfig, ModelKind, ScorerConfig};
use cns_storage::StoreConfig;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const API_KEY_VAR: &str = "MEDIASTACK_API_KEY";
pub const MODEL_TOKEN_VAR: &str = "SENTIMENT_API_TOKEN";

/// Mediastack rejects larger pages.
const MAX_PAGE_SIZE: u32 = 100;

/// Durations written like `90s`, `1h30m` or `250ms`. A bare number is
/// taken as seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HumanDuration(pub Duration);

impl FromStr for HumanDuration {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut total = Duration::ZERO;
        let mut chars = s.trim().chars().peekable();
        let mut parsed_any = false;

        while chars.peek().is_some() {
            let mut digits = String::new();
            while let Some(c) = chars.peek().copied().filter(char::is_ascii_digit) {
                digits.push(c);
                chars.next();
            }
            if digits.is_empty() {
                return Err(format!("Invalid duration '{}': expected a number", s));
            }
            let number: u64 = digits
                .parse()
                .map_err(|_| format!("Invalid number in duration '{}'", s))?;

            let mut unit = String::new();
            while let Some(c) = chars.peek().copied().filter(char::is_ascii_alphabetic) {
                unit.push(c);
                chars.next();
            }
            let step = match unit.as_str() {
                "" | "s" => Duration::from_secs(number),
                "ms" => Duration::from_millis(number),
                "m" => Duration::from_secs(number * 60),
                "h" => Duration::from_secs(number * 3600),
                "d" => Duration::from_secs(number * 86400),
                other => return Err(format!("Invalid duration unit: {}", other)),
            };
            total += step;
            parsed_any = true;

            while chars.peek().is_some_and(|c| c.is_whitespace()) {
                chars.next();
            }
        }

        if !parsed_any {
            return Err("Duration must include a number".to_string());
        }
        Ok(HumanDuration(total))
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "cns", author, version, about = "Fetch crypto news, score its sentiment and update the data store", long_about = None)]
pub struct Cli {
    #[arg(long, default_value = "data", help = "Directory holding the monthly archives and CSV logs")]
    pub data_dir: PathBuf,
    #[arg(long, help = "Run history CSV (default: <data-dir>/sentiment_history.csv)")]
    pub history_file: Option<PathBuf>,
    #[arg(long, help = "Per-article scores CSV (default: <data-dir>/sentiment_scores.csv)")]
    pub scores_file: Option<PathBuf>,
    #[arg(long, default_value = "crypto, bitcoin")]
    pub keywords: String,
    #[arg(long, default_value = "en")]
    pub languages: String,
    #[arg(long, default_value = "popularity")]
    pub sort: String,
    #[arg(long, default_value_t = 10)]
    pub page_size: u32,
    #[arg(long, default_value_t = 1)]
    pub max_pages: u32,
    #[arg(long, default_value_t = 5, help = "Most new articles processed per run")]
    pub max_articles: usize,
    #[arg(long, default_value = "24h", help = "How far behind the last run (or now) each fetch window starts")]
    pub lookback: HumanDuration,
    #[arg(long, default_value = "30s")]
    pub timeout: HumanDuration,
    #[arg(long, default_value_t = 3, help = "Attempts per request before giving up")]
    pub retries: u32,
    #[arg(long, default_value = "1s")]
    pub retry_delay: HumanDuration,
    #[arg(long, default_value = "30s", help = "How long to wait for another run to release the data dir")]
    pub lock_timeout: HumanDuration,
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,
    #[arg(long, default_value = "lexicon", help = "Sentiment model. Available models: lexicon (default), remote")]
    pub model: ModelKind,
    #[arg(long, help = "Classification endpoint for the remote model")]
    pub model_url: Option<String>,
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,
}

/// Everything one run needs, resolved from flags and environment.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub api_key: ApiKey,
    pub news: NewsConfig,
    pub model: ModelConfig,
    pub scorer: ScorerConfig,
    pub store: StoreConfig,
    pub max_articles: usize,
    pub lookback: Duration,
}

impl PipelineConfig {
    /// Validates the flags and reads credentials through `env`.
    pub fn from_cli<F>(cli: &Cli, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = env(API_KEY_VAR)
            .and_then(ApiKey::new)
            .ok_or_else(|| Error::Config(format!("{} is not set", API_KEY_VAR)))?;

        if cli.page_size == 0 || cli.page_size > MAX_PAGE_SIZE {
            return Err(Error::Config(format!(
                "--page-size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, cli.page_size
            )));
        }
        for (flag, value) in [
            ("--max-pages", cli.max_pages as usize),
            ("--max-articles", cli.max_articles),
            ("--retries", cli.retries as usize),
            ("--concurrency", cli.concurrency),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("{} must be at least 1", flag)));
            }
        }
        if cli.timeout.0.is_zero() {
            return Err(Error::Config("--timeout must be greater than zero".to_string()));
        }
        if cli.model == ModelKind::Remote && cli.model_url.is_none() {
            return Err(Error::Config("The remote model needs --model-url".to_string()));
        }

        let retry = RetryConfig::new(cli.retries, cli.retry_delay.0);

        let news = NewsConfig {
            base_url: cli.base_url.trim_end_matches('/').to_string(),
            keywords: cli.keywords.clone(),
            languages: cli.languages.clone(),
            sort: cli.sort.clone(),
            page_size: cli.page_size,
            max_pages: cli.max_pages,
            timeout: cli.timeout.0,
            retry: retry.clone(),
        };

        let model = ModelConfig {
            kind: cli.model,
            url: cli.model_url.clone(),
            token: env(MODEL_TOKEN_VAR),
            timeout: cli.timeout.0,
        };

        let mut store = StoreConfig::new(&cli.data_dir);
        if let Some(path) = &cli.history_file {
            store.history_file = path.clone();
        }
        if let Some(path) = &cli.scores_file {
            store.scores_file = path.clone();
        }
        store.lock_timeout = cli.lock_timeout.0;

        Ok(Self {
            api_key,
            news,
            model,
            scorer: ScorerConfig { retry, concurrency: cli.concurrency },
            store,
            max_articles: cli.max_articles,
            lookback: cli.lookback.0,
        })
    }
}
