//! File-backed persistence for scored articles: monthly JSON archives, a
//! CSV log of per-article scores, and a CSV history of run aggregates.

use chrono::{DateTime, Utc};
use cns_core::{MonthKey, Result, ScoredArticle};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub mod aggregate;
pub mod archive;
pub mod atomic;
pub mod history;
pub mod lock;

pub use aggregate::aggregate_score;
pub use archive::{list_months, MonthlyArchive};
pub use atomic::{commit_all, stage, write_atomic, StagedFile};
pub use history::{HistoryRow, ScoreRow, HISTORY_HEADER, SCORES_HEADER};
pub use lock::RunLock;

pub const HISTORY_FILE: &str = "sentiment_history.csv";
pub const SCORES_FILE: &str = "sentiment_scores.csv";

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub history_file: PathBuf,
    pub scores_file: PathBuf,
    pub lock_timeout: Duration,
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            history_file: data_dir.join(HISTORY_FILE),
            scores_file: data_dir.join(SCORES_FILE),
            data_dir,
            lock_timeout: Duration::from_secs(30),
        }
    }
}

/// What a successful [`DataStore::persist_run`] wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistOutcome {
    pub added: Vec<ScoredArticle>,
    pub months: Vec<MonthKey>,
    pub aggregate_score: Option<f64>,
}

impl PersistOutcome {
    pub fn changed(&self) -> bool {
        !self.added.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct DataStore {
    config: StoreConfig,
}

impl DataStore {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    pub async fn lock(&self) -> Result<RunLock> {
        RunLock::acquire(&self.config.data_dir, self.config.lock_timeout).await
    }

    /// Keys of every archived article across all months.
    pub fn seen_keys(&self) -> Result<HashSet<String>> {
        let mut keys = HashSet::new();
        for month in list_months(&self.config.data_dir)? {
            keys.extend(MonthlyArchive::load(&self.config.data_dir, month)?.keys());
        }
        Ok(keys)
    }

    /// Timestamp of the last completed run, if any.
    pub fn last_run(&self) -> Result<Option<DateTime<Utc>>> {
        let rows = history::read_history(&self.config.history_file)?;
        Ok(rows.into_iter().map(|row| row.timestamp).max())
    }

    pub fn history(&self) -> Result<Vec<HistoryRow>> {
        history::read_history(&self.config.history_file)
    }

    /// Merges `new` into the archive for `month` and returns how many were
    /// added. Nothing is written when every article is already archived.
    pub fn merge_articles(&self, month: MonthKey, new: &[ScoredArticle]) -> Result<usize> {
        Ok(self.merge_month(month, new)?.len())
    }

    fn merge_month(&self, month: MonthKey, new: &[ScoredArticle]) -> Result<Vec<ScoredArticle>> {
        let mut archive = MonthlyArchive::load(&self.config.data_dir, month)?;
        let added = archive.merge(new);
        if !added.is_empty() {
            archive.save()?;
            info!("💾 Archived {} new articles in {}", added.len(), archive.path().display());
        }
        Ok(added)
    }

    pub fn append_history_row(&self, timestamp: DateTime<Utc>, aggregate_score: f64) -> Result<()> {
        history::append_rows(&self.config.history_file, HISTORY_HEADER, &[history_row(timestamp, aggregate_score)])
    }

    pub fn append_article_scores(&self, articles: &[ScoredArticle]) -> Result<()> {
        let rows: Vec<ScoreRow> = articles.iter().map(ScoreRow::from).collect();
        history::append_rows(&self.config.scores_file, SCORES_HEADER, &rows)
    }

    /// Archives a scored batch grouped by publication month, logs the
    /// per-article scores, then records the run in the history. Every file
    /// is staged before any is replaced and the history row is renamed
    /// last; if a rename fails the files already replaced are restored.
    /// A batch with nothing new writes nothing.
    pub fn persist_run(&self, now: DateTime<Utc>, scored: &[ScoredArticle]) -> Result<PersistOutcome> {
        let mut by_month: BTreeMap<MonthKey, Vec<ScoredArticle>> = BTreeMap::new();
        for article in scored {
            by_month.entry(article.article.month()).or_default().push(article.clone());
        }

        let mut staged = Vec::new();
        let mut added = Vec::new();
        let mut months = Vec::new();
        for (month, batch) in by_month {
            let mut archive = MonthlyArchive::load(&self.config.data_dir, month)?;
            let merged = archive.merge(&batch);
            if !merged.is_empty() {
                staged.push(archive.stage()?);
                months.push(month);
                added.extend(merged);
            }
        }

        let aggregate = aggregate_score(&added);
        if let Some(score) = aggregate {
            let rows: Vec<ScoreRow> = added.iter().map(ScoreRow::from).collect();
            staged.extend(history::stage_rows(&self.config.scores_file, SCORES_HEADER, &rows)?);
            staged.extend(history::stage_rows(
                &self.config.history_file,
                HISTORY_HEADER,
                &[history_row(now, score)],
            )?);
            commit_all(staged)?;
            info!("💾 Archived {} new articles across {} month(s)", added.len(), months.len());
        }

        Ok(PersistOutcome { added, months, aggregate_score: aggregate })
    }
}

fn history_row(timestamp: DateTime<Utc>, aggregate_score: f64) -> HistoryRow {
    HistoryRow {
        timestamp,
        aggregate_score: history::round4(aggregate_score),
    }
}
