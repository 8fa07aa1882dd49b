//! Transport trait describing the remote content service.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::domain::resources::ResourcePath;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("content source returned {status} for `{path}`")]
    Unavailable { path: String, status: StatusCode },
    #[error("transport failure for `{path}`: {message}")]
    Transport { path: String, message: String },
    #[error("malformed payload for `{path}`: {message}")]
    Decode { path: String, message: String },
}

impl SourceError {
    pub fn unavailable(path: &ResourcePath, status: StatusCode) -> Self {
        Self::Unavailable {
            path: path.to_string(),
            status,
        }
    }

    pub fn transport(path: &ResourcePath, err: impl std::fmt::Display) -> Self {
        Self::Transport {
            path: path.to_string(),
            message: err.to_string(),
        }
    }

    pub fn decode(path: &ResourcePath, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            path: path.to_string(),
            message: err.to_string(),
        }
    }

    /// Upstream answered 404 for the requested path.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SourceError::Unavailable { status, .. } if *status == StatusCode::NOT_FOUND)
    }
}

/// Read-only access to the remote content service.
///
/// Implementations differ only in transport details; the same path must
/// produce the same records through any of them.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Short transport name for logs.
    fn name(&self) -> &'static str;

    async fn fetch_collection(&self, path: &ResourcePath) -> Result<Vec<Value>, SourceError>;

    async fn fetch_one(&self, path: &ResourcePath) -> Result<Value, SourceError>;
}

/// Fetch a collection and decode every element into `T`.
pub async fn fetch_records<T: DeserializeOwned>(
    source: &dyn ContentSource,
    path: &ResourcePath,
) -> Result<Vec<T>, SourceError> {
    source
        .fetch_collection(path)
        .await?
        .into_iter()
        .map(|value| serde_json::from_value(value).map_err(|err| SourceError::decode(path, err)))
        .collect()
}

/// Fetch one record and decode it into `T`.
pub async fn fetch_record<T: DeserializeOwned>(
    source: &dyn ContentSource,
    path: &ResourcePath,
) -> Result<T, SourceError> {
    let value = source.fetch_one(path).await?;
    serde_json::from_value(value).map_err(|err| SourceError::decode(path, err))
}

/// Split a decoded body into collection elements, rejecting non-arrays.
pub fn into_collection(path: &ResourcePath, value: Value) -> Result<Vec<Value>, SourceError> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(SourceError::decode(
            path,
            format!("expected a JSON array, found {}", json_kind(&other)),
        )),
    }
}

/// Reject bodies that are not a single JSON object.
pub fn into_record(path: &ResourcePath, value: Value) -> Result<Value, SourceError> {
    match value {
        Value::Object(_) => Ok(value),
        other => Err(SourceError::decode(
            path,
            format!("expected a JSON object, found {}", json_kind(&other)),
        )),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
