use std::{sync::Arc, time::Instant};

use metrics::histogram;
use tracing::debug;

use crate::{
    application::content::{ContentError, ContentService},
    domain::{
        entities::{AggregateView, AuxiliaryCounts, PostStats},
        synthesis,
    },
};

/// Album whose photos are shown next to every post.
pub const FEATURED_ALBUM_ID: u32 = 1;

/// Builds one [`AggregateView`] from concurrent lookups.
#[derive(Clone)]
pub struct Aggregator {
    content: Arc<ContentService>,
}

impl Aggregator {
    pub fn new(content: Arc<ContentService>) -> Self {
        Self { content }
    }

    pub fn content(&self) -> &Arc<ContentService> {
        &self.content
    }

    /// Fan out every lookup the view needs and join them.
    ///
    /// All lookups run inside one future, so the first failure (or dropping
    /// the returned future) abandons the rest. No partial view is produced.
    pub async fn build_view(&self, post_id: u32) -> Result<AggregateView, ContentError> {
        if !synthesis::is_addressable(post_id) {
            return Err(ContentError::not_found(post_id));
        }

        let content = self.content.as_ref();
        let started = Instant::now();
        let joined = tokio::try_join!(
            content.resolve_post(post_id),
            content.resolve_comments(post_id),
            async { content.photos(Some(FEATURED_ALBUM_ID)).await.map_err(ContentError::from) },
            async { content.albums(None).await.map_err(ContentError::from) },
            async { content.todos(None).await.map_err(ContentError::from) },
            content.author_and_related(post_id),
        );
        let elapsed = started.elapsed();
        histogram!("freshline_aggregate_ms", "source" => content.source_name())
            .record(elapsed.as_secs_f64() * 1000.0);

        let (post, comments, photos, albums, todos, (author, related_posts)) = joined?;
        debug!(
            target = "freshline::aggregate",
            post_id,
            source = content.source_name(),
            elapsed_ms = elapsed.as_millis() as u64,
            "aggregate view built"
        );

        Ok(AggregateView {
            stats: PostStats::compute(&post, comments.len()),
            post,
            author,
            comments,
            related_posts,
            auxiliary: AuxiliaryCounts {
                photos: photos.len(),
                albums: albums.len(),
                todos: todos.len(),
            },
        })
    }
}
