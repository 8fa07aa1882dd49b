mod support;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use freshline::{
    domain::policy::PolicyId,
    infra::http::{GENERATED_AT_HEADER, HttpState, STATE_HEADER, build_router},
};
use serde_json::Value;
use support::{Failure, Harness};
use tower::ServiceExt;

fn router(harness: &Harness) -> Router {
    build_router(HttpState {
        engine: harness.engine.clone(),
    })
}

async fn get(app: &Router, uri: &str, cookie: Option<&str>) -> Response {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let request = builder.body(Body::empty()).expect("request should build");
    app.clone()
        .oneshot(request)
        .await
        .expect("router should respond")
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("collect body");
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

fn header_value<'a>(response: &'a Response, name: &header::HeaderName) -> &'a str {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

#[tokio::test]
async fn serves_view_with_freshness_headers() {
    let harness = Harness::new();
    let app = router(&harness);

    let response = get(&app, "/posts/v1/12", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_value(&response, &STATE_HEADER), "regenerated");
    assert_eq!(
        header_value(&response, &GENERATED_AT_HEADER),
        "2024-06-01T12:00:00Z"
    );

    let body = json_body(response).await;
    assert_eq!(body["view"]["post"]["id"], 12);
    assert_eq!(body["view"]["post"]["userId"], 2);
    assert_eq!(body["view"]["relatedPosts"].as_array().map(Vec::len), Some(3));
    assert_eq!(body["meta"]["policy"], "v1");
    assert_eq!(body["meta"]["state"], "regenerated");
    assert_eq!(body["meta"]["source"], "fetch");
    assert_eq!(body["meta"]["origin"], "on_demand");

    let cached = get(&app, "/posts/v1/12", None).await;
    assert_eq!(header_value(&cached, &STATE_HEADER), "cached");
}

#[tokio::test]
async fn policy_may_be_addressed_by_letter() {
    let harness = Harness::new();
    let app = router(&harness);

    let response = get(&app, "/posts/F/3", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["meta"]["policy"], "v6");
    assert_eq!(body["meta"]["source"], "client");
}

#[tokio::test]
async fn control_flow_redirect_is_temporary() {
    let harness = Harness::new();
    let app = router(&harness);

    let response = get(&app, "/posts/v4/999", None).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(header_value(&response, &header::LOCATION), "/posts/v4/1");
    assert_eq!(header_value(&response, &STATE_HEADER), "redirected");
    assert_eq!(harness.total_requests(), 0);
}

#[tokio::test]
async fn rejected_and_unknown_requests_are_not_found() {
    let harness = Harness::new();
    let app = router(&harness);

    let rejected = get(&app, "/posts/v4/9999", None).await;
    assert_eq!(rejected.status(), StatusCode::NOT_FOUND);
    assert_eq!(header_value(&rejected, &STATE_HEADER), "rejected");

    for uri in ["/posts/v9/1", "/posts/v1/abc", "/posts/v1/501"] {
        let response = get(&app, uri, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
    }
    assert_eq!(harness.total_requests(), 0);
}

#[tokio::test]
async fn session_cookie_bypasses_the_stored_view() {
    let harness = Harness::new();
    let app = router(&harness);

    let first = get(&app, "/posts/v3/8", None).await;
    assert_eq!(header_value(&first, &STATE_HEADER), "regenerated");

    let bypassed = get(&app, "/posts/v3/8", Some("session=abc123; theme=dark")).await;
    assert_eq!(bypassed.status(), StatusCode::OK);
    assert_eq!(header_value(&bypassed, &STATE_HEADER), "bypassed");

    let other_cookie = get(&app, "/posts/v3/8", Some("theme=dark")).await;
    assert_eq!(header_value(&other_cookie, &STATE_HEADER), "cached");
}

#[tokio::test]
async fn unavailable_source_is_service_unavailable() {
    let harness = Harness::new();
    harness
        .fetch
        .fail_with(Some(Failure::Status(StatusCode::INTERNAL_SERVER_ERROR)));
    let app = router(&harness);

    let detail = get(&app, "/posts/v1/5", None).await;
    assert_eq!(detail.status(), StatusCode::SERVICE_UNAVAILABLE);

    let listing = get(&app, "/posts/v2", None).await;
    assert_eq!(listing.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn lists_every_addressable_post() {
    let harness = Harness::new();
    let app = router(&harness);

    let response = get(&app, "/posts/v1", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["policy"], "v1");
    assert_eq!(body["posts"].as_array().map(Vec::len), Some(500));
}

#[tokio::test]
async fn partial_policy_lists_its_precomputed_posts() {
    let harness = Harness::new();
    harness
        .engine
        .precompute(PolicyId::PartialPrecompute, 4)
        .await
        .expect("precompute succeeds");
    let app = router(&harness);

    let body = json_body(get(&app, "/posts/v5", None).await).await;
    assert_eq!(body["policy"], "v5");
    let ids: Vec<u64> = body["posts"]
        .as_array()
        .expect("posts array")
        .iter()
        .filter_map(|post| post["id"].as_u64())
        .collect();
    assert_eq!(ids, (1..=10).collect::<Vec<_>>());

    let listed = json_body(get(&app, "/posts/v5/10", None).await).await;
    assert_eq!(listed["meta"]["state"], "cached");
    assert_eq!(listed["meta"]["origin"], "precomputed");
}

#[tokio::test]
async fn listing_fault_is_not_found() {
    let harness = Harness::new();
    harness.fetch.fail_path("/posts", Failure::Transport);
    let app = router(&harness);

    let listing = get(&app, "/posts/v1", None).await;
    assert_eq!(listing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_check_has_no_content() {
    let harness = Harness::new();
    let response = get(&router(&harness), "/_health", None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}
