use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{
    Client, Response,
    header::{ACCEPT, HeaderMap, HeaderValue},
};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::{
    application::source::{ContentSource, SourceError, into_collection, into_record},
    domain::resources::ResourcePath,
    infra::error::InfraError,
};

use super::user_agent;

/// Preconfigured client transport: fixed base URL, request timeout and
/// default headers; status failures come from `error_for_status`.
pub struct ClientSource {
    client: Client,
    base: Url,
}

impl ClientSource {
    /// `base_url` must end with `/` so relative paths resolve beneath it.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, InfraError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .user_agent(user_agent())
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| {
                InfraError::configuration(format!("failed to build client transport: {err}"))
            })?;
        Ok(Self {
            client,
            base: base_url,
        })
    }

    fn url_for(&self, path: &ResourcePath) -> Result<Url, SourceError> {
        let relative = path.to_string();
        self.base
            .join(relative.trim_start_matches('/'))
            .map_err(|err| SourceError::transport(path, err))
    }

    async fn get_json(&self, path: &ResourcePath) -> Result<Value, SourceError> {
        let started = Instant::now();
        let result = self
            .client
            .get(self.url_for(path)?)
            .send()
            .await
            .and_then(Response::error_for_status);
        debug!(
            target = "freshline::source",
            transport = "client",
            path = %path,
            ok = result.is_ok(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "content request finished"
        );

        result
            .map_err(|err| classify(path, err))?
            .json::<Value>()
            .await
            .map_err(|err| classify(path, err))
    }
}

/// Re-wrap a library error into the transport-neutral error.
fn classify(path: &ResourcePath, err: reqwest::Error) -> SourceError {
    match err.status() {
        Some(status) => SourceError::unavailable(path, status),
        None if err.is_decode() => SourceError::decode(path, err),
        None => SourceError::transport(path, err),
    }
}

#[async_trait]
impl ContentSource for ClientSource {
    fn name(&self) -> &'static str {
        "client"
    }

    async fn fetch_collection(&self, path: &ResourcePath) -> Result<Vec<Value>, SourceError> {
        into_collection(path, self.get_json(path).await?)
    }

    async fn fetch_one(&self, path: &ResourcePath) -> Result<Value, SourceError> {
        into_record(path, self.get_json(path).await?)
    }
}
