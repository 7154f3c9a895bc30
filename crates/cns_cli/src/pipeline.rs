use crate::config::PipelineConfig;
use chrono::{DateTime, Utc};
use cns_core::{Article, Error, ErrorKind, FetchWindow, NewsSource, Result};
use cns_fetch::MediastackClient;
use cns_inference::{create_model, SentimentScorer};
use cns_storage::{DataStore, PersistOutcome};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Lifecycle of a single update run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Fetching,
    Scoring,
    Persisting,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (Idle, Fetching) => true,
            (Fetching, Scoring) | (Fetching, Done) => true,
            (Scoring, Persisting) => true,
            (Persisting, Done) => true,
            (current, Failed) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "Idle",
            RunState::Fetching => "Fetching",
            RunState::Scoring => "Scoring",
            RunState::Persisting => "Persisting",
            RunState::Done => "Done",
            RunState::Failed => "Failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub state: RunState,
    pub changed: bool,
    pub new_articles: usize,
    pub skipped_articles: usize,
    pub aggregate_score: Option<f64>,
}

impl RunReport {
    fn unchanged() -> Self {
        Self {
            state: RunState::Done,
            changed: false,
            new_articles: 0,
            skipped_articles: 0,
            aggregate_score: None,
        }
    }

    /// `key=value` lines for whatever commits the data dir afterwards.
    pub fn render(&self) -> String {
        let mut out = format!("changed={}\nnew_articles={}\n", self.changed, self.new_articles);
        if let Some(score) = self.aggregate_score {
            out.push_str(&format!("aggregate_score={:.4}\n", score));
        }
        out
    }
}

#[derive(Debug)]
pub struct RunFailure {
    pub failed_in: RunState,
    pub error: Error,
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} while {}: {}", self.error.kind(), self.failed_in, self.error)
    }
}

impl std::error::Error for RunFailure {}

/// Process exit code for a failed run.
pub fn exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::Config => 2,
        ErrorKind::Fetch => 3,
        ErrorKind::Scoring => 4,
        ErrorKind::Storage => 5,
    }
}

struct Tracker {
    state: RunState,
}

impl Tracker {
    fn advance(&mut self, next: RunState) {
        if !self.state.can_transition_to(next) {
            warn!("⚠️ Unexpected run transition {} -> {}", self.state, next);
        }
        info!("🔄 {} -> {}", self.state, next);
        self.state = next;
    }
}

/// Fetch, score and persist, one stage at a time.
pub struct Pipeline {
    source: Arc<dyn NewsSource>,
    scorer: SentimentScorer,
    store: DataStore,
    max_articles: usize,
    lookback: Duration,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn NewsSource>,
        scorer: SentimentScorer,
        store: DataStore,
        max_articles: usize,
        lookback: Duration,
    ) -> Self {
        Self { source, scorer, store, max_articles, lookback }
    }

    /// Builds the mediastack client, the configured model and the store.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let client = MediastackClient::new(config.api_key.clone(), config.news.clone())?;
        let model = create_model(&config.model)?;
        Ok(Self::new(
            Arc::new(client),
            SentimentScorer::new(model, config.scorer.clone()),
            DataStore::new(config.store.clone()),
            config.max_articles,
            config.lookback,
        ))
    }

    pub fn store(&self) -> &DataStore {
        &self.store
    }

    pub async fn run(&self, now: DateTime<Utc>) -> std::result::Result<RunReport, RunFailure> {
        let mut tracker = Tracker { state: RunState::Idle };
        match self.execute(now, &mut tracker).await {
            Ok(report) => Ok(report),
            Err(error) => {
                let failed_in = tracker.state;
                tracker.advance(RunState::Failed);
                error!("❌ Run failed while {}: {}", failed_in, error);
                Err(RunFailure { failed_in, error })
            }
        }
    }

    async fn execute(&self, now: DateTime<Utc>, tracker: &mut Tracker) -> Result<RunReport> {
        let _lock = self.store.lock().await?;
        let seen = self.store.seen_keys()?;
        let window = FetchWindow::new(self.window_start(now)?, now);

        tracker.advance(RunState::Fetching);
        info!(
            "📰 Fetching news from {} since {}",
            self.source.source(),
            window.since.to_rfc3339()
        );
        let fetched = self.source.fetch(&window).await?;
        let fresh = self.select_new(fetched, &seen);

        if fresh.is_empty() {
            info!("😴 No new articles, nothing to update");
            tracker.advance(RunState::Done);
            return Ok(RunReport::unchanged());
        }

        tracker.advance(RunState::Scoring);
        let batch = self.scorer.score_batch(fresh).await?;

        tracker.advance(RunState::Persisting);
        let PersistOutcome { added, aggregate_score, .. } = self.store.persist_run(now, &batch.scored)?;

        tracker.advance(RunState::Done);
        let report = RunReport {
            state: RunState::Done,
            changed: !added.is_empty(),
            new_articles: added.len(),
            skipped_articles: batch.skipped,
            aggregate_score,
        };
        match report.aggregate_score {
            Some(score) => info!("✅ Stored {} new articles, aggregate sentiment {:.4}", report.new_articles, score),
            None => info!("✅ Run complete, no changes"),
        }
        Ok(report)
    }

    /// The window always reaches `lookback` behind the last run (or behind
    /// `now` when there is none), so stories left over by the batch cap or
    /// indexed late are fetched again. Archived ones are dropped by key.
    fn window_start(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let lookback = chrono::Duration::from_std(self.lookback)
            .map_err(|e| Error::Config(format!("lookback out of range: {}", e)))?;
        let anchor = match self.store.last_run()? {
            Some(last) if last > now => {
                warn!("⚠️ Last run {} is in the future, anchoring on now", last.to_rfc3339());
                now
            }
            Some(last) => last,
            None => now,
        };
        Ok(anchor - lookback)
    }

    /// Drops archived articles and caps the batch.
    fn select_new(&self, fetched: Vec<Article>, seen: &std::collections::HashSet<String>) -> Vec<Article> {
        let total = fetched.len();
        let mut fresh: Vec<Article> = fetched.into_iter().filter(|a| !seen.contains(&a.key())).collect();
        let unseen = fresh.len();
        fresh.truncate(self.max_articles);
        info!(
            "🔎 {} fetched, {} not yet archived, processing {}",
            total,
            unseen,
            fresh.len()
        );
        fresh
    }
}
