use async_trait::async_trait;
use cns_core::{LabelDistribution, Result, SentimentModel};
use std::collections::HashMap;
use std::fmt;

/// Normalization constant for the raw valence sum.
const ALPHA: f64 = 15.0;
const NEGATION_SCALAR: f64 = -0.74;
const INTENSIFIER_SCALAR: f64 = 1.3;
/// How many tokens a negation or intensifier reaches forward.
const MODIFIER_REACH: usize = 3;

const LEXICON: &[(&str, f64)] = &[
    // positive
    ("surge", 2.5), ("surges", 2.5), ("surged", 2.5), ("surging", 2.5),
    ("soar", 2.8), ("soars", 2.8), ("soared", 2.8), ("soaring", 2.8),
    ("rally", 2.2), ("rallies", 2.2), ("rallied", 2.2),
    ("gain", 1.5), ("gains", 1.5), ("gained", 1.5),
    ("rise", 1.3), ("rises", 1.3), ("rose", 1.3), ("rising", 1.3),
    ("jump", 1.8), ("jumps", 1.8), ("jumped", 1.8),
    ("climb", 1.5), ("climbs", 1.5), ("climbed", 1.5),
    ("record", 1.2), ("bullish", 2.5), ("boom", 2.2), ("breakthrough", 2.0),
    ("approve", 1.8), ("approves", 1.8), ("approved", 1.8), ("approval", 1.8),
    ("adoption", 1.5), ("optimistic", 2.0), ("optimism", 2.0), ("growth", 1.5),
    ("recover", 1.5), ("recovers", 1.5), ("recovery", 1.5),
    ("rebound", 1.8), ("rebounds", 1.8), ("strong", 1.5), ("stronger", 1.5),
    ("success", 2.0), ("successful", 2.0), ("win", 1.8), ("wins", 1.8),
    ("profit", 1.8), ("profits", 1.8), ("profitable", 1.8),
    ("upgrade", 1.5), ("upgraded", 1.5), ("support", 1.0), ("partnership", 1.2),
    ("milestone", 1.5), ("boost", 1.8), ("boosts", 1.8), ("boosted", 1.8),
    ("inflows", 1.5), ("best", 2.0), ("good", 1.9), ("great", 2.5), ("positive", 2.0),
    // negative
    ("crash", -3.0), ("crashes", -3.0), ("crashed", -3.0),
    ("plunge", -2.8), ("plunges", -2.8), ("plunged", -2.8),
    ("plummet", -3.0), ("plummets", -3.0), ("plummeted", -3.0),
    ("drop", -1.5), ("drops", -1.5), ("dropped", -1.5),
    ("fall", -1.5), ("falls", -1.5), ("fell", -1.5), ("falling", -1.5),
    ("decline", -1.5), ("declines", -1.5), ("declined", -1.5),
    ("slump", -2.2), ("slumps", -2.2), ("slide", -1.5), ("slides", -1.5),
    ("loss", -1.8), ("losses", -1.8), ("bearish", -2.5),
    ("hack", -2.8), ("hacked", -2.8), ("exploit", -2.5), ("exploited", -2.5),
    ("scam", -3.0), ("fraud", -3.2), ("theft", -2.8), ("stolen", -2.8),
    ("ban", -2.2), ("bans", -2.2), ("banned", -2.2), ("crackdown", -2.2),
    ("lawsuit", -1.8), ("sue", -1.8), ("sues", -1.8), ("sued", -1.8),
    ("investigation", -1.2), ("probe", -1.2),
    ("fear", -2.0), ("fears", -2.0), ("panic", -2.5), ("selloff", -2.2),
    ("liquidation", -2.0), ("liquidations", -2.0),
    ("bankrupt", -3.0), ("bankruptcy", -3.0),
    ("collapse", -3.0), ("collapses", -3.0), ("collapsed", -3.0),
    ("risk", -1.0), ("risks", -1.0), ("warning", -1.5), ("warns", -1.5),
    ("weak", -1.5), ("weaker", -1.5), ("worst", -2.5), ("bad", -2.5), ("negative", -2.0),
    ("volatile", -1.0), ("volatility", -0.8), ("outflows", -1.5),
    ("concern", -1.2), ("concerns", -1.2), ("uncertainty", -1.2),
];

const NEGATIONS: &[&str] = &[
    "not", "no", "never", "without", "nor", "isn't", "aren't", "wasn't", "weren't",
    "don't", "doesn't", "didn't", "won't", "can't", "cannot", "hardly",
];

const INTENSIFIERS: &[&str] = &[
    "very", "extremely", "highly", "hugely", "sharply", "massively", "deeply",
    "significantly", "strongly",
];

/// Word-lexicon classifier tuned for crypto headlines. Deterministic and
/// offline, which makes it the default model for scheduled runs.
pub struct LexiconModel {
    weights: HashMap<&'static str, f64>,
}

impl fmt::Debug for LexiconModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LexiconModel")
            .field("words", &self.weights.len())
            .finish()
    }
}

impl Default for LexiconModel {
    fn default() -> Self {
        Self::new()
    }
}

impl LexiconModel {
    pub fn new() -> Self {
        Self {
            weights: LEXICON.iter().copied().collect(),
        }
    }

    /// Polarity in (-1, 1), 0.0 when no scored word is present.
    pub fn polarity(&self, text: &str) -> f64 {
        let tokens = tokenize(text);
        let mut sum = 0.0;

        for (i, token) in tokens.iter().enumerate() {
            let Some(weight) = self.weights.get(token.as_str()) else {
                continue;
            };
            let mut valence = *weight;
            let window = &tokens[i.saturating_sub(MODIFIER_REACH)..i];
            if window.iter().any(|t| INTENSIFIERS.contains(&t.as_str())) {
                valence *= INTENSIFIER_SCALAR;
            }
            if window.iter().any(|t| NEGATIONS.contains(&t.as_str())) {
                valence *= NEGATION_SCALAR;
            }
            sum += valence;
        }

        if sum == 0.0 {
            return 0.0;
        }
        sum / (sum * sum + ALPHA).sqrt()
    }

    pub fn distribution(&self, text: &str) -> LabelDistribution {
        let p = self.polarity(text);
        LabelDistribution::new(p.max(0.0), 1.0 - p.abs(), (-p).max(0.0))
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .replace('\u{2019}', "'")
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|t| t.trim_matches('\''))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl SentimentModel for LexiconModel {
    fn name(&self) -> &str {
        "lexicon"
    }

    async fn classify(&self, text: &str) -> Result<LabelDistribution> {
        Ok(self.distribution(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headline_polarity() {
        let model = LexiconModel::new();
        assert!(model.polarity("Bitcoin surges to record high as ETF approval boosts optimism") > 0.5);
        assert!(model.polarity("Exchange hacked, users fear collapse as prices crash") < -0.5);
        assert_eq!(model.polarity("Bitcoin conference scheduled for Tuesday"), 0.0);
    }

    #[test]
    fn test_negation_flips_valence() {
        let model = LexiconModel::new();
        assert!(model.polarity("Regulators approve the fund") > 0.0);
        assert!(model.polarity("Regulators did not approve the fund") < 0.0);
        assert!(model.polarity("Analysts say it isn't a crash") > 0.0);
    }

    #[test]
    fn test_intensifier_strengthens() {
        let model = LexiconModel::new();
        let plain = model.polarity("prices drop");
        let sharp = model.polarity("prices sharply drop");
        assert!(sharp < plain);
    }

    #[test]
    fn test_polarity_is_bounded() {
        let model = LexiconModel::new();
        let euphoric = "surge soar rally bullish boom ".repeat(200);
        let p = model.polarity(&euphoric);
        assert!(p > 0.99 && p < 1.0);

        let dist = model.distribution(&euphoric);
        assert!((dist.total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_tokenize_handles_punctuation() {
        assert_eq!(tokenize("BTC's rally—doesn't stop!"), vec!["btc's", "rally", "doesn't", "stop"]);
        assert_eq!(tokenize("“Crash” isn’t coming"), vec!["crash", "isn't", "coming"]);
    }
}
