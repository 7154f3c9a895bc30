use async_trait::async_trait;
use crate::types::LabelDistribution;
use crate::Result;

#[async_trait]
pub trait SentimentModel: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Classify a piece of text into a distribution over sentiment labels
    async fn classify(&self, text: &str) -> Result<LabelDistribution>;
}
