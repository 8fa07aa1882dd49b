//! Deterministic expansion of the canonical post set.
//!
//! The content service publishes 100 posts. Ids 101..=500 are derived from
//! them: each synthetic id maps onto one canonical post and decorates its
//! text with a marker naming the synthetic id. Derivation is a pure function
//! of the canonical set, so the same id always yields the same record.

use crate::domain::entities::{Comment, Post};

/// Number of posts published by the content service.
pub const CANONICAL_POST_COUNT: u32 = 100;
/// Highest addressable post id.
pub const MAX_POST_ID: u32 = 500;
/// Authors synthetic posts are spread across.
pub const AUTHOR_COUNT: u32 = 10;
/// Offset step keeping synthetic comment ids apart from every other post's.
pub const COMMENT_ID_STRIDE: u64 = 100;

pub fn is_canonical(id: u32) -> bool {
    (1..=CANONICAL_POST_COUNT).contains(&id)
}

pub fn is_synthetic(id: u32) -> bool {
    (CANONICAL_POST_COUNT + 1..=MAX_POST_ID).contains(&id)
}

pub fn is_addressable(id: u32) -> bool {
    (1..=MAX_POST_ID).contains(&id)
}

/// Author assigned to a synthetic post.
pub fn synthetic_author_id(id: u32) -> u32 {
    ((id - 1) % AUTHOR_COUNT) + 1
}

/// Canonical post whose comments seed the comments of `post_id`.
pub fn comment_base_post_id(post_id: u32) -> u32 {
    ((post_id - 1) % CANONICAL_POST_COUNT) + 1
}

fn decorate_title(title: &str, id: u32) -> String {
    format!("{title} (extended post {id})")
}

fn decorate_body(body: &str, id: u32) -> String {
    format!("{body}\n\n[extended post {id}] - derived from the canonical set to widen the addressable range.")
}

fn decorate_author_name(name: &str) -> String {
    format!("{name} (extended comment)")
}

fn decorate_comment_body(body: &str, post_id: u32) -> String {
    format!("{body} [comment on extended post {post_id}]")
}

/// Derive the synthetic post `id` from the canonical set.
///
/// Returns `None` when `id` is not in the synthetic range or the canonical
/// set is empty.
pub fn derive_post(base_posts: &[Post], id: u32) -> Option<Post> {
    if !is_synthetic(id) || base_posts.is_empty() {
        return None;
    }

    let index = (id - CANONICAL_POST_COUNT - 1) as usize % base_posts.len();
    let base = &base_posts[index];
    Some(Post {
        id,
        title: decorate_title(&base.title, id),
        body: decorate_body(&base.body, id),
        author_id: synthetic_author_id(id),
    })
}

/// Append the 400 synthetic posts to the canonical set.
pub fn expand_posts(base_posts: Vec<Post>) -> Vec<Post> {
    let derived: Vec<Post> = (CANONICAL_POST_COUNT + 1..=MAX_POST_ID)
        .filter_map(|id| derive_post(&base_posts, id))
        .collect();

    let mut posts = base_posts;
    posts.extend(derived);
    posts
}

/// Comments for `post_id` given the comments of its base post.
///
/// Canonical posts keep their fetched comments untouched.
pub fn expand_comments(post_id: u32, base_comments: Vec<Comment>) -> Vec<Comment> {
    if !is_synthetic(post_id) {
        return base_comments;
    }

    let offset = u64::from(post_id - 1) * COMMENT_ID_STRIDE;
    base_comments
        .into_iter()
        .map(|comment| Comment {
            id: comment.id + offset,
            post_id,
            author_name: decorate_author_name(&comment.author_name),
            author_email: comment.author_email,
            body: decorate_comment_body(&comment.body, post_id),
        })
        .collect()
}
