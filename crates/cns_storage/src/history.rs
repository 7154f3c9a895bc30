use crate::atomic::{read_optional, stage, StagedFile};
use chrono::{DateTime, Utc};
use cns_core::{Error, Result, ScoredArticle};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const HISTORY_HEADER: &[&str] = &["timestamp", "aggregate_score"];
pub const SCORES_HEADER: &[&str] = &["date", "title", "url", "sentiment", "confidence", "score"];

/// One line of the run history: when a run finished and its aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub timestamp: DateTime<Utc>,
    pub aggregate_score: f64,
}

/// One line of the per-article scores log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRow {
    pub date: String,
    pub title: String,
    pub url: String,
    pub sentiment: String,
    pub confidence: f64,
    pub score: f64,
}

impl From<&ScoredArticle> for ScoreRow {
    fn from(scored: &ScoredArticle) -> Self {
        Self {
            date: scored.article.published_at.format("%Y-%m-%d").to_string(),
            title: scored.article.title.clone(),
            url: scored.article.url.clone(),
            sentiment: scored.sentiment.label.to_string(),
            confidence: round4(scored.sentiment.confidence),
            score: scored.sentiment.score(),
        }
    }
}

pub(crate) fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Appends `rows` to a CSV log, writing `header` first when the file is
/// new or empty. The whole file is rewritten atomically.
pub fn append_rows<T: Serialize>(path: &Path, header: &[&str], rows: &[T]) -> Result<()> {
    match stage_rows(path, header, rows)? {
        Some(staged) => staged.commit(),
        None => Ok(()),
    }
}

/// Prepares the appended CSV in a temp file. `None` when there is
/// nothing to append.
pub fn stage_rows<T: Serialize>(path: &Path, header: &[&str], rows: &[T]) -> Result<Option<StagedFile>> {
    if rows.is_empty() {
        return Ok(None);
    }
    let existing = read_optional(path)?.unwrap_or_default();

    let staged = stage(path, |w| {
        let io = |e: std::io::Error| Error::storage(path, e);
        let csv_err = |e: csv::Error| Error::storage(path, e);

        if existing.trim().is_empty() {
            let mut writer = csv::Writer::from_writer(&mut *w);
            writer.write_record(header).map_err(csv_err)?;
            writer.flush().map_err(io)?;
        } else {
            w.write_all(existing.as_bytes()).map_err(io)?;
            if !existing.ends_with('\n') {
                w.write_all(b"\n").map_err(io)?;
            }
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(&mut *w);
        for row in rows {
            writer.serialize(row).map_err(csv_err)?;
        }
        writer.flush().map_err(io)
    })?;
    Ok(Some(staged))
}

pub fn read_history(path: &Path) -> Result<Vec<HistoryRow>> {
    let Some(content) = read_optional(path)? else {
        return Ok(Vec::new());
    };
    let mut reader = csv::Reader::from_reader(content.as_bytes());
    reader
        .deserialize()
        .collect::<std::result::Result<Vec<HistoryRow>, _>>()
        .map_err(|e| Error::storage(path, format!("unreadable history: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use cns_core::{Article, SentimentLabel, SentimentResult};
    use std::fs;

    fn row(hour: u32, score: f64) -> HistoryRow {
        HistoryRow {
            timestamp: Utc.with_ymd_and_hms(2024, 12, 20, hour, 0, 0).unwrap(),
            aggregate_score: score,
        }
    }

    #[test]
    fn test_header_written_once() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("sentiment_history.csv");

        append_rows(&path, HISTORY_HEADER, &[row(8, 0.5)]).unwrap();
        append_rows(&path, HISTORY_HEADER, &[row(9, -0.25)]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "timestamp,aggregate_score");
        assert_eq!(lines.len(), 3);
        assert_eq!(read_history(&path).unwrap(), vec![row(8, 0.5), row(9, -0.25)]);
    }

    #[test]
    fn test_appends_after_file_without_trailing_newline() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("sentiment_history.csv");
        fs::write(&path, "timestamp,aggregate_score\n2024-12-20T08:00:00Z,0.5").unwrap();

        append_rows(&path, HISTORY_HEADER, &[row(9, 0.0)]).unwrap();
        let history = read_history(&path).unwrap();
        assert_eq!(history, vec![row(8, 0.5), row(9, 0.0)]);
    }

    #[test]
    fn test_empty_rows_leave_file_alone() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("sentiment_scores.csv");
        append_rows::<ScoreRow>(&path, SCORES_HEADER, &[]).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_score_row_from_article() {
        let article = Article::new(
            "Bitcoin, ETFs and \"flows\"",
            "",
            "https://news.example/1",
            "Wire",
            Utc.with_ymd_and_hms(2024, 12, 20, 9, 0, 0).unwrap(),
        );
        let sentiment = SentimentResult {
            article_id: article.id.clone(),
            label: SentimentLabel::Negative,
            confidence: 0.666666,
        };
        let row = ScoreRow::from(&ScoredArticle::new(article, sentiment));
        assert_eq!(row.date, "2024-12-20");
        assert_eq!(row.sentiment, "negative");
        assert_eq!(row.confidence, 0.6667);
        assert_eq!(row.score, -1.0);

        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("sentiment_scores.csv");
        append_rows(&path, SCORES_HEADER, &[row]).unwrap();
        let mut reader = csv::Reader::from_path(&path).unwrap();
        let back: Vec<ScoreRow> = reader.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(back[0].title, "Bitcoin, ETFs and \"flows\"");
    }

    #[test]
    fn test_missing_history_is_empty() {
        let temp = tempfile::tempdir().unwrap();
        assert!(read_history(&temp.path().join("none.csv")).unwrap().is_empty());
    }
}
