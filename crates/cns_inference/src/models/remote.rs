use async_trait::async_trait;
use cns_core::{Error, LabelDistribution, Result, SentimentLabel, SentimentModel};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    inputs: &'a str,
}

#[derive(Debug, Deserialize)]
struct LabelScore {
    label: String,
    score: f64,
}

/// Text-classification services answer with either one list of label
/// scores or a list per input.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassifyResponse {
    Nested(Vec<Vec<LabelScore>>),
    Flat(Vec<LabelScore>),
}

/// Client for a hosted text-classification model.
pub struct RemoteModel {
    client: Client,
    url: String,
    token: Option<String>,
}

impl RemoteModel {
    pub fn new(url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }
}

impl fmt::Debug for RemoteModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteModel")
            .field("client", &"<reqwest::Client>")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("url", &self.url)
            .finish()
    }
}

pub fn map_label(label: &str) -> Option<SentimentLabel> {
    match label.trim().to_lowercase().as_str() {
        "positive" | "pos" | "bullish" | "label_2" => Some(SentimentLabel::Positive),
        "neutral" | "neu" | "label_1" => Some(SentimentLabel::Neutral),
        "negative" | "neg" | "bearish" | "label_0" => Some(SentimentLabel::Negative),
        _ => None,
    }
}

fn to_distribution(response: ClassifyResponse) -> LabelDistribution {
    let scores = match response {
        ClassifyResponse::Nested(mut rows) => {
            if rows.is_empty() {
                Vec::new()
            } else {
                rows.swap_remove(0)
            }
        }
        ClassifyResponse::Flat(scores) => scores,
    };

    let mut distribution = LabelDistribution::default();
    for LabelScore { label, score } in scores {
        match map_label(&label) {
            Some(mapped) => distribution.add(mapped, score),
            None => debug!("Ignoring unknown classifier label {}", label),
        }
    }
    distribution
}

#[async_trait]
impl SentimentModel for RemoteModel {
    fn name(&self) -> &str {
        "remote"
    }

    async fn classify(&self, text: &str) -> Result<LabelDistribution> {
        let mut request = self.client.post(&self.url).json(&ClassifyRequest { inputs: text });
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream { status: status.as_u16(), body });
        }

        let parsed = response.json::<ClassifyResponse>().await?;
        Ok(to_distribution(parsed))
    }
}
