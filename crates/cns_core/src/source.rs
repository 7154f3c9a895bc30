use async_trait::async_trait;
use crate::types::{Article, FetchWindow};
use crate::Result;

#[async_trait]
pub trait NewsSource: Send + Sync {
    /// Returns the name of the news source
    fn source(&self) -> &str;

    /// Fetches the articles published inside the window, deduplicated by URL
    async fn fetch(&self, window: &FetchWindow) -> Result<Vec<Article>>;
}
