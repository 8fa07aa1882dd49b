//! In-memory content source and engine wiring shared by the integration tests.
#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use freshline::{
    application::{
        clock::{Clock, ManualClock},
        content::ContentService,
        freshness::{FreshnessEngine, Sources},
        source::{ContentSource, SourceError},
    },
    cache::{StoreConfig, ViewStore},
    domain::{
        policy::{PolicyParams, PolicyTable},
        resources::ResourcePath,
    },
};
use reqwest::StatusCode;
use serde_json::{Value, json};
use time::macros::datetime;

#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Status(StatusCode),
    Transport,
    Decode,
}

/// Mirrors the shape of the public content service: 100 posts by 10 users,
/// 5 comments per post, 3 photos in album 1, 4 albums and 6 todos.
pub struct FakeSource {
    name: &'static str,
    requests: Mutex<Vec<String>>,
    missing_posts: Mutex<HashSet<u32>>,
    failure: Mutex<Option<Failure>>,
    path_failures: Mutex<HashMap<String, Failure>>,
}

impl FakeSource {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            requests: Mutex::new(Vec::new()),
            missing_posts: Mutex::new(HashSet::new()),
            failure: Mutex::new(None),
            path_failures: Mutex::new(HashMap::new()),
        })
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn hits(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|seen| seen.as_str() == path)
            .count()
    }

    pub fn remove_post(&self, id: u32) {
        self.missing_posts.lock().unwrap().insert(id);
    }

    pub fn fail_with(&self, failure: Option<Failure>) {
        *self.failure.lock().unwrap() = failure;
    }

    /// Fail every request for exactly `path`, e.g. `/todos`.
    pub fn fail_path(&self, path: &str, failure: Failure) {
        self.path_failures
            .lock()
            .unwrap()
            .insert(path.to_string(), failure);
    }

    pub fn post(id: u32) -> Value {
        json!({
            "userId": (id - 1) / 10 + 1,
            "id": id,
            "title": format!("post title {id}"),
            "body": format!("body of post {id}\nsecond line of text"),
        })
    }

    pub fn user(id: u32) -> Value {
        json!({
            "id": id,
            "name": format!("User {id}"),
            "username": format!("user{id}"),
            "email": format!("user{id}@example.com"),
            "address": {
                "street": "Kulas Light",
                "suite": "Apt. 556",
                "city": "Gwenborough",
                "zipcode": "92998-3874",
                "geo": {"lat": "-37.3159", "lng": "81.1496"}
            },
            "phone": "1-770-736-8031",
            "website": "hildegard.org",
            "company": {
                "name": "Romaguera-Crona",
                "catchPhrase": "Multi-layered client-server neural-net",
                "bs": "harness real-time e-markets"
            }
        })
    }

    fn comments(post_id: u32) -> Vec<Value> {
        let first = (post_id - 1) * 5 + 1;
        (first..first + 5)
            .map(|id| {
                json!({
                    "postId": post_id,
                    "id": id,
                    "name": format!("comment {id}"),
                    "email": format!("c{id}@example.com"),
                    "body": "nice post",
                })
            })
            .collect()
    }

    fn respond(&self, path: &ResourcePath) -> Result<Value, SourceError> {
        let rendered = path.to_string();
        self.requests.lock().unwrap().push(rendered.clone());

        let failure = self
            .path_failures
            .lock()
            .unwrap()
            .get(&rendered)
            .copied()
            .or(*self.failure.lock().unwrap());
        match failure {
            Some(Failure::Status(status)) => return Err(SourceError::unavailable(path, status)),
            Some(Failure::Transport) => {
                return Err(SourceError::transport(path, "connection reset by peer"));
            }
            Some(Failure::Decode) => {
                return Err(SourceError::decode(path, "expected value at line 1 column 1"));
            }
            None => {}
        }

        let segments: Vec<&str> = rendered.trim_start_matches('/').split('/').collect();
        let not_found = || SourceError::unavailable(path, StatusCode::NOT_FOUND);
        let parse_id = |raw: &str| raw.parse::<u32>().map_err(|_| not_found());

        match segments.as_slice() {
            ["posts"] => {
                let missing = self.missing_posts.lock().unwrap();
                Ok(Value::Array(
                    (1..=100)
                        .filter(|id| !missing.contains(id))
                        .map(Self::post)
                        .collect(),
                ))
            }
            ["posts", raw] => {
                let post_id = parse_id(raw)?;
                let missing = self.missing_posts.lock().unwrap().contains(&post_id);
                if !(1..=100).contains(&post_id) || missing {
                    return Err(not_found());
                }
                Ok(Self::post(post_id))
            }
            ["posts", raw, "comments"] => Ok(Value::Array(Self::comments(parse_id(raw)?))),
            ["users", raw] => {
                let user_id = parse_id(raw)?;
                if !(1..=10).contains(&user_id) {
                    return Err(not_found());
                }
                Ok(Self::user(user_id))
            }
            ["users", raw, "posts"] => {
                let user_id = parse_id(raw)?;
                Ok(Value::Array(
                    (user_id * 10 - 9..=user_id * 10).map(Self::post).collect(),
                ))
            }
            ["albums", "1", "photos"] => Ok(Value::Array(
                (1..=3)
                    .map(|id| {
                        json!({
                            "albumId": 1,
                            "id": id,
                            "title": format!("photo {id}"),
                            "url": format!("https://via.placeholder.com/600/{id}"),
                            "thumbnailUrl": format!("https://via.placeholder.com/150/{id}"),
                        })
                    })
                    .collect(),
            )),
            ["albums"] => Ok(Value::Array(
                (1..=4)
                    .map(|id| json!({"userId": 1, "id": id, "title": format!("album {id}")}))
                    .collect(),
            )),
            ["todos"] => Ok(Value::Array(
                (1..=6)
                    .map(|id| {
                        json!({
                            "userId": 1,
                            "id": id,
                            "title": format!("todo {id}"),
                            "completed": id % 2 == 0,
                        })
                    })
                    .collect(),
            )),
            _ => Err(not_found()),
        }
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch_collection(&self, path: &ResourcePath) -> Result<Vec<Value>, SourceError> {
        match self.respond(path)? {
            Value::Array(items) => Ok(items),
            other => Err(SourceError::decode(path, format!("not an array: {other}"))),
        }
    }

    async fn fetch_one(&self, path: &ResourcePath) -> Result<Value, SourceError> {
        self.respond(path)
    }
}

pub struct Harness {
    pub engine: Arc<FreshnessEngine>,
    pub fetch: Arc<FakeSource>,
    pub client: Arc<FakeSource>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_params(PolicyParams::default())
    }

    pub fn with_params(params: PolicyParams) -> Self {
        Self::with_config(params, StoreConfig::default())
    }

    pub fn with_config(params: PolicyParams, store_config: StoreConfig) -> Self {
        let fetch = FakeSource::new("fake-fetch");
        let client = FakeSource::new("fake-client");
        let clock = Arc::new(ManualClock::new(datetime!(2024-06-01 12:00 UTC)));
        let shared_clock: Arc<dyn Clock> = clock.clone();

        let sources = Sources {
            fetch: Arc::new(ContentService::new(
                fetch.clone(),
                store_config.canonical_revalidate,
                Arc::clone(&shared_clock),
            )),
            client: Arc::new(ContentService::new(
                client.clone(),
                store_config.canonical_revalidate,
                Arc::clone(&shared_clock),
            )),
        };
        let engine = Arc::new(FreshnessEngine::new(
            PolicyTable::new(&params),
            Arc::new(ViewStore::new(&store_config)),
            sources,
            shared_clock,
        ));

        Self {
            engine,
            fetch,
            client,
            clock,
        }
    }

    pub fn total_requests(&self) -> usize {
        self.fetch.request_count() + self.client.request_count()
    }
}
