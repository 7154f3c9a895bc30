use cns_core::{
    with_retry, Article, Error, LabelDistribution, Result, RetryConfig, ScoredArticle,
    SentimentLabel, SentimentModel, SentimentResult,
};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Text shorter than this (after trimming) is not sent to the model.
pub const MIN_TEXT_CHARS: usize = 3;

/// Result used when there is nothing usable to classify.
pub fn default_result(article_id: &str) -> SentimentResult {
    SentimentResult {
        article_id: article_id.to_string(),
        label: SentimentLabel::Neutral,
        confidence: 0.0,
    }
}

pub fn is_scorable(text: &str) -> bool {
    let text = text.trim();
    text.chars().count() >= MIN_TEXT_CHARS && text.chars().any(char::is_alphabetic)
}

/// Maps a raw distribution onto a single label. The label with the highest
/// probability wins; exact ties go to the earliest label in
/// [`SentimentLabel::TIE_ORDER`]. Confidence is the winner's share of the
/// total mass.
pub fn resolve(article_id: &str, distribution: &LabelDistribution) -> SentimentResult {
    if !distribution.is_usable() {
        return default_result(article_id);
    }

    let mut best = SentimentLabel::TIE_ORDER[0];
    for label in SentimentLabel::TIE_ORDER.iter().skip(1) {
        if distribution.get(*label) > distribution.get(best) {
            best = *label;
        }
    }

    SentimentResult {
        article_id: article_id.to_string(),
        label: best,
        confidence: (distribution.get(best) / distribution.total()).clamp(0.0, 1.0),
    }
}

#[derive(Debug, Clone)]
pub struct ScorerConfig {
    pub retry: RetryConfig,
    pub concurrency: usize,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            concurrency: 4,
        }
    }
}

/// Scored articles in input order plus the number that had to be skipped.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub scored: Vec<ScoredArticle>,
    pub skipped: usize,
}

pub struct SentimentScorer {
    model: Arc<dyn SentimentModel>,
    config: ScorerConfig,
}

impl SentimentScorer {
    pub fn new(model: Arc<dyn SentimentModel>, config: ScorerConfig) -> Self {
        Self { model, config }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub async fn score_text(&self, article_id: &str, text: &str) -> Result<SentimentResult> {
        if !is_scorable(text) {
            return Ok(default_result(article_id));
        }

        let what = format!("scoring article {}", article_id);
        let distribution = with_retry(&self.config.retry, &what, || self.model.classify(text)).await?;
        Ok(resolve(article_id, &distribution))
    }

    /// Scores title and description separately and keeps the more
    /// confident result. Ties keep the title.
    pub async fn score_article(&self, article: &Article) -> Result<SentimentResult> {
        let context = || format!("article {} ({})", article.id, article.url);

        let title = self
            .score_text(&article.id, &article.title)
            .await
            .map_err(|e| Error::scoring(context(), e))?;

        if article.description.trim().is_empty() {
            return Ok(title);
        }

        let description = self
            .score_text(&article.id, &article.description)
            .await
            .map_err(|e| Error::scoring(context(), e))?;

        if description.confidence > title.confidence {
            Ok(description)
        } else {
            Ok(title)
        }
    }

    /// Scores a batch concurrently. Articles that fail are logged and
    /// skipped; the batch only fails when none of them could be scored.
    pub async fn score_batch(&self, articles: Vec<Article>) -> Result<BatchOutcome> {
        if articles.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let total = articles.len();
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));

        let tasks = articles.into_iter().map(|article| {
            let semaphore = semaphore.clone();
            async move {
                let result = match semaphore.acquire().await {
                    Ok(_permit) => self.score_article(&article).await,
                    Err(e) => Err(Error::scoring(format!("article {}", article.id), e)),
                };
                (article, result)
            }
        });

        let mut outcome = BatchOutcome::default();
        let mut last_error = None;
        for (article, result) in join_all(tasks).await {
            match result {
                Ok(sentiment) => outcome.scored.push(ScoredArticle::new(article, sentiment)),
                Err(e) => {
                    warn!("⚠️ Skipping unscorable article {}: {}", article.url, e);
                    outcome.skipped += 1;
                    last_error = Some(e);
                }
            }
        }

        if outcome.scored.is_empty() {
            let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
            return Err(Error::scoring(
                "batch",
                format!("all {} articles failed to score; last error: {}", total, reason),
            ));
        }

        info!(
            "✨ Scored {}/{} articles with {} model",
            outcome.scored.len(),
            total,
            self.model.name()
        );
        Ok(outcome)
    }
}
