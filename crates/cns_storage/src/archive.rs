use crate::atomic::{read_optional, stage, StagedFile};
use cns_core::{Error, MonthKey, Result, ScoredArticle};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// All scored articles published in one calendar month, stored as a JSON
/// array at `<data_dir>/<YYYYMon>.json`.
#[derive(Debug)]
pub struct MonthlyArchive {
    month: MonthKey,
    path: PathBuf,
    articles: Vec<ScoredArticle>,
}

impl MonthlyArchive {
    pub fn path_for(data_dir: &Path, month: MonthKey) -> PathBuf {
        data_dir.join(format!("{}.json", month))
    }

    /// Loads the archive, or an empty one if the file does not exist.
    /// A file that exists but does not parse is an error so it never gets
    /// overwritten with a partial view.
    pub fn load(data_dir: &Path, month: MonthKey) -> Result<Self> {
        let path = Self::path_for(data_dir, month);
        let articles = match read_optional(&path)? {
            Some(content) if !content.trim().is_empty() => serde_json::from_str(&content)
                .map_err(|e| Error::storage(&path, format!("unreadable archive: {}", e)))?,
            _ => Vec::new(),
        };
        Ok(Self { month, path, articles })
    }

    pub fn month(&self) -> MonthKey {
        self.month
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn articles(&self) -> &[ScoredArticle] {
        &self.articles
    }

    pub fn keys(&self) -> HashSet<String> {
        self.articles.iter().map(ScoredArticle::key).collect()
    }

    /// Appends the articles whose key is not archived yet (and not repeated
    /// earlier in `new`). Returns the ones that were added.
    pub fn merge(&mut self, new: &[ScoredArticle]) -> Vec<ScoredArticle> {
        let mut keys = self.keys();
        let added: Vec<ScoredArticle> = new
            .iter()
            .filter(|article| keys.insert(article.key()))
            .cloned()
            .collect();
        self.articles.extend(added.iter().cloned());
        added
    }

    /// Serializes the archive into a temp file next to it without
    /// replacing the current file.
    pub fn stage(&self) -> Result<StagedFile> {
        let path = &self.path;
        stage(path, |w| {
            serde_json::to_writer_pretty(&mut *w, &self.articles)
                .map_err(|e| Error::storage(path, e))?;
            w.write_all(b"\n").map_err(|e| Error::storage(path, e))
        })
    }

    pub fn save(&self) -> Result<()> {
        self.stage()?.commit()?;
        debug!("Saved {} articles to {}", self.articles.len(), self.path.display());
        Ok(())
    }
}

/// Months with an archive file in `data_dir`, oldest first. Files whose
/// stem is not a month key are ignored.
pub fn list_months(data_dir: &Path) -> Result<Vec<MonthKey>> {
    let entries = match fs::read_dir(data_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::storage(data_dir, e)),
    };

    let mut months = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| Error::storage(data_dir, e))?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        if let Some(month) = path.file_stem().and_then(|s| s.to_str()).and_then(MonthKey::parse) {
            months.push(month);
        }
    }
    months.sort();
    Ok(months)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use cns_core::{Article, SentimentLabel, SentimentResult};

    fn scored(url: &str, label: SentimentLabel) -> ScoredArticle {
        let article = Article::new(
            "Bitcoin headline",
            "",
            url,
            "Wire",
            Utc.with_ymd_and_hms(2024, 12, 20, 9, 0, 0).unwrap(),
        );
        let sentiment = SentimentResult { article_id: article.id.clone(), label, confidence: 0.8 };
        ScoredArticle::new(article, sentiment)
    }

    fn december() -> MonthKey {
        MonthKey::new(2024, 12).unwrap()
    }

    #[test]
    fn test_merge_skips_known_and_repeated_keys() {
        let temp = tempfile::tempdir().unwrap();
        let mut archive = MonthlyArchive::load(temp.path(), december()).unwrap();

        let first = archive.merge(&[scored("https://a.example/1", SentimentLabel::Positive)]);
        assert_eq!(first.len(), 1);

        let second = archive.merge(&[
            scored("HTTPS://A.EXAMPLE/1 ", SentimentLabel::Negative),
            scored("https://a.example/2", SentimentLabel::Neutral),
            scored("https://a.example/2", SentimentLabel::Neutral),
        ]);
        assert_eq!(second.len(), 1);
        assert_eq!(archive.articles().len(), 2);
        assert_eq!(archive.articles()[0].sentiment.label, SentimentLabel::Positive);
    }

    #[test]
    fn test_save_and_reload() {
        let temp = tempfile::tempdir().unwrap();
        let mut archive = MonthlyArchive::load(temp.path(), december()).unwrap();
        archive.merge(&[scored("https://a.example/1", SentimentLabel::Positive)]);
        archive.save().unwrap();

        assert!(temp.path().join("2024Dec.json").is_file());
        let reloaded = MonthlyArchive::load(temp.path(), december()).unwrap();
        assert_eq!(reloaded.articles(), archive.articles());
    }

    #[test]
    fn test_corrupt_archive_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("2024Dec.json"), "[{\"title\": ").unwrap();

        let err = MonthlyArchive::load(temp.path(), december()).unwrap_err();
        assert_eq!(err.kind(), cns_core::ErrorKind::Storage);
        assert!(err.to_string().contains("2024Dec.json"));
    }

    #[test]
    fn test_list_months_ignores_other_files() {
        let temp = tempfile::tempdir().unwrap();
        for name in ["2024Dec.json", "2025Jan.json", "notes.json", "2024Dec.csv", "sentiment_history.csv"] {
            fs::write(temp.path().join(name), "[]").unwrap();
        }

        let months = list_months(temp.path()).unwrap();
        assert_eq!(months, vec![december(), MonthKey::new(2025, 1).unwrap()]);
        assert!(list_months(&temp.path().join("missing")).unwrap().is_empty());
    }
}
