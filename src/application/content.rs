//! Typed content lookups over one [`ContentSource`].
//!
//! Canonical records come from the source as-is. Posts 101..=500 and their
//! comments are derived from the canonical set, which is cached per service
//! for the configured revalidation window.

use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use time::Duration;
use tracing::debug;

use crate::{
    application::{
        clock::Clock,
        source::{ContentSource, SourceError, fetch_record, fetch_records},
    },
    cache::CanonicalSlot,
    domain::{
        entities::{Album, Comment, Photo, Post, PostStats, Todo, User},
        resources::{Resource, ResourcePath},
        synthesis::{self, comment_base_post_id, derive_post, expand_comments, expand_posts},
    },
};

/// Number of same-author posts shown next to a post.
pub const RELATED_POSTS_LIMIT: usize = 3;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("post {post_id} not found")]
    NotFound { post_id: u32 },
    #[error(transparent)]
    Source(#[from] SourceError),
}

impl ContentError {
    pub fn not_found(post_id: u32) -> Self {
        Self::NotFound { post_id }
    }
}

pub struct ContentService {
    source: Arc<dyn ContentSource>,
    canonical: CanonicalSlot,
    revalidate: Duration,
    clock: Arc<dyn Clock>,
}

impl ContentService {
    pub fn new(source: Arc<dyn ContentSource>, revalidate: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            canonical: CanonicalSlot::new(),
            revalidate,
            clock,
        }
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    /// The canonical post set, refetched once the revalidation window lapses.
    async fn canonical_posts(&self) -> Result<Arc<Vec<Post>>, SourceError> {
        if let Some((posts, fetched_at)) = self.canonical.get() {
            if self.clock.now() - fetched_at < self.revalidate {
                return Ok(posts);
            }
        }

        let path = ResourcePath::collection(Resource::Posts);
        let posts: Arc<Vec<Post>> = Arc::new(fetch_records(self.source.as_ref(), &path).await?);
        self.canonical.set(Arc::clone(&posts), self.clock.now());
        counter!("freshline_canonical_refresh_total", "source" => self.source.name()).increment(1);
        debug!(
            target = "freshline::content",
            source = self.source.name(),
            count = posts.len(),
            "canonical post set refreshed"
        );
        Ok(posts)
    }

    /// All 500 addressable posts: the canonical set followed by the derived ones.
    pub async fn resolve_posts(&self) -> Result<Vec<Post>, SourceError> {
        let base = self.canonical_posts().await?;
        Ok(expand_posts(base.as_ref().clone()))
    }

    pub async fn resolve_post(&self, post_id: u32) -> Result<Post, ContentError> {
        if synthesis::is_canonical(post_id) {
            let path = ResourcePath::item(Resource::Posts, post_id);
            return fetch_record(self.source.as_ref(), &path)
                .await
                .map_err(|err| not_found_or(err, post_id));
        }
        if !synthesis::is_synthetic(post_id) {
            return Err(ContentError::not_found(post_id));
        }

        let base = self.canonical_posts().await?;
        derive_post(&base, post_id).ok_or_else(|| ContentError::not_found(post_id))
    }

    pub async fn resolve_comments(&self, post_id: u32) -> Result<Vec<Comment>, ContentError> {
        if !synthesis::is_addressable(post_id) {
            return Err(ContentError::not_found(post_id));
        }

        let path = ResourcePath::scoped(
            Resource::Posts,
            comment_base_post_id(post_id),
            Resource::Comments,
        );
        let base: Vec<Comment> = fetch_records(self.source.as_ref(), &path).await?;
        Ok(expand_comments(post_id, base))
    }

    pub async fn user(&self, user_id: u32) -> Result<User, SourceError> {
        fetch_record(self.source.as_ref(), &ResourcePath::item(Resource::Users, user_id)).await
    }

    /// Canonical posts written by `user_id`, in source order.
    pub async fn user_posts(&self, user_id: u32) -> Result<Vec<Post>, SourceError> {
        let path = ResourcePath::scoped(Resource::Users, user_id, Resource::Posts);
        fetch_records(self.source.as_ref(), &path).await
    }

    pub async fn photos(&self, album_id: Option<u32>) -> Result<Vec<Photo>, SourceError> {
        let path = ResourcePath::maybe_scoped(Resource::Albums, album_id, Resource::Photos);
        fetch_records(self.source.as_ref(), &path).await
    }

    pub async fn albums(&self, user_id: Option<u32>) -> Result<Vec<Album>, SourceError> {
        let path = ResourcePath::maybe_scoped(Resource::Users, user_id, Resource::Albums);
        fetch_records(self.source.as_ref(), &path).await
    }

    pub async fn todos(&self, user_id: Option<u32>) -> Result<Vec<Todo>, SourceError> {
        let path = ResourcePath::maybe_scoped(Resource::Users, user_id, Resource::Todos);
        fetch_records(self.source.as_ref(), &path).await
    }

    pub async fn post_stats(&self, post_id: u32) -> Result<PostStats, ContentError> {
        let (post, comments) =
            tokio::try_join!(self.resolve_post(post_id), self.resolve_comments(post_id))?;
        Ok(PostStats::compute(&post, comments.len()))
    }

    pub async fn related_posts(&self, post_id: u32) -> Result<Vec<Post>, ContentError> {
        let (_, related) = self.author_and_related(post_id).await?;
        Ok(related)
    }

    /// The post's author together with up to three other posts by them.
    pub async fn author_and_related(&self, post_id: u32) -> Result<(User, Vec<Post>), ContentError> {
        let post = self.resolve_post(post_id).await?;
        let (author, authored) =
            tokio::try_join!(self.user(post.author_id), self.user_posts(post.author_id))?;

        let related = authored
            .into_iter()
            .filter(|candidate| candidate.id != post.id)
            .take(RELATED_POSTS_LIMIT)
            .collect();
        Ok((author, related))
    }
}

fn not_found_or(err: SourceError, post_id: u32) -> ContentError {
    if err.is_not_found() {
        ContentError::not_found(post_id)
    } else {
        ContentError::Source(err)
    }
}
