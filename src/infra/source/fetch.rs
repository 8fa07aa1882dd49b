use std::time::Instant;

use async_trait::async_trait;
use reqwest::{Client, header::ACCEPT};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::{
    application::source::{ContentSource, SourceError, into_collection, into_record},
    domain::resources::ResourcePath,
    infra::error::InfraError,
};

/// Raw request transport: every URL is assembled by hand, the status is
/// checked explicitly and there is no client-side timeout.
pub struct FetchSource {
    http: Client,
    base: String,
}

impl FetchSource {
    pub fn new(base_url: &Url) -> Result<Self, InfraError> {
        let http = Client::builder().build().map_err(|err| {
            InfraError::configuration(format!("failed to build fetch transport: {err}"))
        })?;
        Ok(Self {
            http,
            base: base_url.as_str().trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, path: &ResourcePath) -> String {
        format!("{}{path}", self.base)
    }

    async fn get_json(&self, path: &ResourcePath) -> Result<Value, SourceError> {
        let started = Instant::now();
        let response = self
            .http
            .get(self.url_for(path))
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| SourceError::transport(path, err))?;

        let status = response.status();
        debug!(
            target = "freshline::source",
            transport = "fetch",
            path = %path,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "content request finished"
        );
        if !status.is_success() {
            return Err(SourceError::unavailable(path, status));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| SourceError::transport(path, err))?;
        serde_json::from_slice(&body).map_err(|err| SourceError::decode(path, err))
    }
}

#[async_trait]
impl ContentSource for FetchSource {
    fn name(&self) -> &'static str {
        "fetch"
    }

    async fn fetch_collection(&self, path: &ResourcePath) -> Result<Vec<Value>, SourceError> {
        into_collection(path, self.get_json(path).await?)
    }

    async fn fetch_one(&self, path: &ResourcePath) -> Result<Value, SourceError> {
        into_record(path, self.get_json(path).await?)
    }
}
