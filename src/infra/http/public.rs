use std::str::FromStr;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::{
    application::{
        error::HttpError,
        freshness::{Outcome, ServeRequest, ServeState, ServedView},
    },
    cache::ViewOrigin,
    domain::{
        entities::{AggregateView, Post},
        policy::{PolicyId, SourceKind},
    },
};

use super::{
    GENERATED_AT_HEADER, HttpState, STATE_HEADER,
    middleware::{log_responses, set_request_context},
};

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/posts/{label}", get(post_list))
        .route("/posts/{label}/{id}", get(post_detail))
        .route("/_health", get(health))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

#[derive(Debug, Serialize)]
struct ListResponse {
    policy: &'static str,
    posts: Vec<Post>,
}

#[derive(Debug, Serialize)]
struct ViewResponse<'a> {
    view: &'a AggregateView,
    meta: ViewMeta,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewMeta {
    pub policy: &'static str,
    pub state: ServeState,
    pub generated_at: String,
    pub source: SourceKind,
    pub origin: ViewOrigin,
}

impl ViewMeta {
    pub fn new(served: &ServedView, source: SourceKind) -> Self {
        Self {
            policy: served.policy.label(),
            state: served.state,
            generated_at: rfc3339(served.generated_at),
            source,
            origin: served.origin,
        }
    }
}

pub fn rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

fn parse_policy(label: &str) -> Result<PolicyId, HttpError> {
    PolicyId::from_str(label).map_err(|err| {
        HttpError::from_error(
            "infra::http::parse_policy",
            StatusCode::NOT_FOUND,
            "Unknown policy",
            &err,
        )
    })
}

async fn post_list(State(state): State<HttpState>, Path(label): Path<String>) -> Response {
    let policy = match parse_policy(&label) {
        Ok(policy) => policy,
        Err(err) => return err.into_response(),
    };

    match state.engine.list(policy).await {
        Ok(posts) => Json(ListResponse {
            policy: policy.label(),
            posts,
        })
        .into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn post_detail(
    State(state): State<HttpState>,
    Path((label, id)): Path<(String, String)>,
    jar: CookieJar,
) -> Response {
    let policy = match parse_policy(&label) {
        Ok(policy) => policy,
        Err(err) => return err.into_response(),
    };
    // Non-numeric ids address nothing.
    let Ok(post_id) = id.parse::<u32>() else {
        return HttpError::new(
            "infra::http::post_detail",
            StatusCode::NOT_FOUND,
            "Post not found",
            format!("`{id}` is not a post id"),
        )
        .into_response();
    };

    let request = jar
        .iter()
        .fold(ServeRequest::new(post_id), |request, cookie| {
            request.with_signal(cookie.name())
        });

    match state.engine.serve(policy, &request).await {
        Ok(Outcome::Served(served)) => {
            let meta = ViewMeta::new(&served, state.engine.policy(policy).source);
            let headers = [
                (STATE_HEADER, served.state.as_str().to_string()),
                (GENERATED_AT_HEADER, meta.generated_at.clone()),
            ];
            let body = Json(ViewResponse {
                view: served.view.as_ref(),
                meta,
            });
            (headers, body).into_response()
        }
        Ok(Outcome::Redirected { target_id, .. }) => (
            [(STATE_HEADER, "redirected")],
            Redirect::temporary(&format!("/posts/{}/{target_id}", policy.label())),
        )
            .into_response(),
        Ok(Outcome::Rejected {
            post_id, reason, ..
        }) => (
            [(STATE_HEADER, "rejected")],
            HttpError::rejected(post_id, reason),
        )
            .into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}
