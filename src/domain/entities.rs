//! Content records mirrored from the remote content service.
//!
//! Field names follow Rust conventions; the serde renames keep the wire shape
//! of the upstream JSON (`userId`, `name`, `email`, ...).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: u32,
    pub title: String,
    pub body: String,
    #[serde(rename = "userId")]
    pub author_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: u64,
    pub post_id: u32,
    #[serde(rename = "name")]
    pub author_name: String,
    #[serde(rename = "email")]
    pub author_email: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u32,
    pub name: String,
    pub username: String,
    pub email: String,
    pub address: Address,
    pub phone: String,
    pub website: String,
    pub company: Company,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub suite: String,
    pub city: String,
    pub zipcode: String,
    pub geo: Geo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geo {
    pub lat: String,
    pub lng: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub name: String,
    pub catch_phrase: String,
    pub bs: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub album_id: u32,
    pub id: u32,
    pub title: String,
    pub url: String,
    pub thumbnail_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub user_id: u32,
    pub id: u32,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub user_id: u32,
    pub id: u32,
    pub title: String,
    pub completed: bool,
}

/// Reading statistics derived locally from a post and its comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostStats {
    pub post_id: u32,
    pub comments_count: usize,
    pub word_count: usize,
    pub estimated_read_time: usize,
}

const WORDS_PER_MINUTE: usize = 200;

impl PostStats {
    pub fn compute(post: &Post, comments_count: usize) -> Self {
        let word_count = post.body.split_whitespace().count();
        Self {
            post_id: post.id,
            comments_count,
            word_count,
            estimated_read_time: word_count.div_ceil(WORDS_PER_MINUTE),
        }
    }
}

/// Sizes of the auxiliary collections fetched alongside a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuxiliaryCounts {
    pub photos: usize,
    pub albums: usize,
    pub todos: usize,
}

/// Composite, read-only view of one post and everything rendered next to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateView {
    pub post: Post,
    pub author: User,
    pub comments: Vec<Comment>,
    pub stats: PostStats,
    pub related_posts: Vec<Post>,
    pub auxiliary: AuxiliaryCounts,
}
