//! HTTP client for the upstream pool statistics API
//!
//! The upstream exposes per-block submission observations. Requests carry a
//! bearer token when one is configured and always run under an explicit
//! timeout, so a stalled upstream can never wedge a collection batch.

use crate::collector::SubmissionSource;
use crate::models::SubmissionObservation;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

pub struct HttpSubmissionSource {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpSubmissionSource {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }
}

#[async_trait]
impl SubmissionSource for HttpSubmissionSource {
    async fn fetch_submissions(&self, block_height: u64) -> Result<Vec<SubmissionObservation>> {
        let url = format!("{}/blocks/{}/submissions", self.base_url, block_height);
        let mut request = self.client.get(&url);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            anyhow::bail!(
                "upstream returned {} for block {}",
                response.status(),
                block_height
            );
        }

        let observations: Vec<SubmissionObservation> = response.json().await?;
        Ok(observations)
    }
}
