use std::str::FromStr;
use std::sync::Arc;
use cns_core::{Error, Result, SentimentModel};
use tracing::info;
use crate::ModelConfig;

pub mod lexicon;
pub mod remote;

pub use lexicon::LexiconModel;
pub use remote::RemoteModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelKind {
    #[default]
    Lexicon,
    Remote,
}

impl FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lexicon" => Ok(ModelKind::Lexicon),
            "remote" => Ok(ModelKind::Remote),
            other => Err(format!("Unknown model '{}'. Available models: lexicon, remote", other)),
        }
    }
}

pub fn create_model(config: &ModelConfig) -> Result<Arc<dyn SentimentModel>> {
    let model: Arc<dyn SentimentModel> = match config.kind {
        ModelKind::Lexicon => Arc::new(LexiconModel::new()),
        ModelKind::Remote => {
            let url = config.url.clone().ok_or_else(|| {
                Error::Config("The remote model needs --model-url".to_string())
            })?;
            Arc::new(RemoteModel::new(url, config.token.clone(), config.timeout)?)
        }
    };
    info!("🧠 Sentiment model ready (using {})", model.name());
    Ok(model)
}
