mod middleware;
mod public;

use std::sync::Arc;

use axum::http::HeaderName;

use crate::application::freshness::FreshnessEngine;

pub use middleware::RequestContext;
pub use public::{ViewMeta, build_router, rfc3339};

/// How the response view was produced (`cached`, `regenerated`, ...).
pub const STATE_HEADER: HeaderName = HeaderName::from_static("x-freshline-state");
/// When the served view was generated, RFC 3339.
pub const GENERATED_AT_HEADER: HeaderName = HeaderName::from_static("x-freshline-generated-at");

#[derive(Clone)]
pub struct HttpState {
    pub engine: Arc<FreshnessEngine>,
}
