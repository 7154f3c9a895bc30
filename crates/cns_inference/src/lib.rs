use std::fmt;
use std::time::Duration;

pub mod models;
pub mod scorer;

pub use models::{create_model, ModelKind};
pub use scorer::{resolve, BatchOutcome, ScorerConfig, SentimentScorer};

#[derive(Clone)]
pub struct ModelConfig {
    pub kind: ModelKind,
    pub url: Option<String>,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            kind: ModelKind::default(),
            url: None,
            token: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("kind", &self.kind)
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

pub mod prelude {
    pub use super::{create_model, ModelConfig, ModelKind, ScorerConfig, SentimentScorer};
    pub use cns_core::{Article, Error, Result, SentimentLabel, SentimentResult};
}
