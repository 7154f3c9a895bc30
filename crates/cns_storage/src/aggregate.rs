use cns_core::ScoredArticle;

/// Mean of the label values (+1, 0, -1) across `articles`, or `None` when
/// there is nothing to aggregate. Always within [-1, 1].
pub fn aggregate_score(articles: &[ScoredArticle]) -> Option<f64> {
    if articles.is_empty() {
        return None;
    }
    let sum: f64 = articles.iter().map(|a| a.sentiment.score()).sum();
    Some((sum / articles.len() as f64).clamp(-1.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cns_core::{Article, SentimentLabel, SentimentResult};

    fn scored(n: usize, label: SentimentLabel) -> ScoredArticle {
        let article = Article::new("t", "", format!("https://x.example/{}", n), "s", Utc::now());
        let sentiment = SentimentResult { article_id: article.id.clone(), label, confidence: 0.9 };
        ScoredArticle::new(article, sentiment)
    }

    #[test]
    fn test_empty_has_no_aggregate() {
        assert_eq!(aggregate_score(&[]), None);
    }

    #[test]
    fn test_mean_of_label_values() {
        use SentimentLabel::*;
        let batch = [scored(1, Positive), scored(2, Positive), scored(3, Negative), scored(4, Neutral)];
        assert_eq!(aggregate_score(&batch), Some(0.25));

        let all_negative = [scored(1, Negative), scored(2, Negative)];
        assert_eq!(aggregate_score(&all_negative), Some(-1.0));
    }

    #[test]
    fn test_every_mix_of_labels_stays_in_bounds() {
        let labels = [SentimentLabel::Positive, SentimentLabel::Neutral, SentimentLabel::Negative];
        for len in 1..=6u32 {
            for code in 0..3usize.pow(len) {
                let mut rest = code;
                let batch: Vec<ScoredArticle> = (0..len as usize)
                    .map(|n| {
                        let label = labels[rest % 3];
                        rest /= 3;
                        scored(n, label)
                    })
                    .collect();
                let positive = batch.iter().filter(|a| a.sentiment.label == SentimentLabel::Positive).count();
                let negative = batch.iter().filter(|a| a.sentiment.label == SentimentLabel::Negative).count();
                let expected = (positive as f64 - negative as f64) / batch.len() as f64;

                let score = aggregate_score(&batch).unwrap();
                assert!((-1.0..=1.0).contains(&score), "{} out of bounds", score);
                assert!((score - expected).abs() < 1e-12, "{} != {}", score, expected);
            }
        }
    }
}
