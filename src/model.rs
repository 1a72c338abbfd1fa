//! Collected record types and collection targets.
//!
//! An [`Item`] is a single post or comment as fetched from the listing API.
//! Items are never mutated after decoding; the comment traversal wraps them in
//! [`Record`]s, which carry the nested reply tree handed to batch sinks.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::macros::format_description;

use crate::governor::Unavailable;

/// Author sentinel used when the upstream account was removed.
pub const DELETED_AUTHOR: &str = "[deleted]";

/// Anything that carries a globally unique id and can be deduplicated.
pub trait Keyed {
    /// Returns the unique id of the value.
    fn key(&self) -> &str;
}

/// Kind of collected item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// A submission (link or self post).
    Post,
    /// A reply to a post or to another comment.
    Comment,
}

/// A single post or comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Upstream id without the kind prefix (`abc123`, not `t3_abc123`).
    pub id: String,
    /// Post or comment.
    pub kind: ItemKind,
    /// Post title; absent for comments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Self text for posts, comment body for comments. Opaque payload.
    #[serde(default)]
    pub body: String,
    /// Subreddit the item was posted in.
    pub subreddit: String,
    /// Author name, or [`DELETED_AUTHOR`].
    pub author: String,
    /// Creation time in unix seconds.
    pub created_utc: i64,
    /// Creation time rendered as `YYYY-MM-DD HH:MM:SS UTC`.
    #[serde(default)]
    pub created_at: String,
    /// Net score.
    #[serde(default)]
    pub score: i64,
    /// Reply count reported upstream (posts only; zero for comments).
    #[serde(default)]
    pub num_comments: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upvote_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_flair_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_flair_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permalink: Option<String>,
    /// Id of the parent item (a post id for top-level comments).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Id of the post a comment belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_id: Option<String>,
    /// Nesting depth of a comment (0 for top-level).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
}

impl Item {
    /// Returns true if the author account no longer exists.
    #[must_use]
    pub fn is_deleted_author(&self) -> bool {
        self.author == DELETED_AUTHOR
    }

    /// Returns the upstream fullname (`t3_<id>` for posts, `t1_<id>` for comments).
    #[must_use]
    pub fn fullname(&self) -> String {
        match self.kind {
            ItemKind::Post => format!("t3_{}", self.id),
            ItemKind::Comment => format!("t1_{}", self.id),
        }
    }
}

impl Keyed for Item {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Emitted record: an item plus its materialized reply tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(flatten)]
    pub item: Item,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<Record>,
}

impl Record {
    /// Total number of comments in the tree below this record.
    #[must_use]
    pub fn comment_count(&self) -> usize {
        self.comments
            .iter()
            .map(|child| 1 + child.comment_count())
            .sum()
    }

    /// Returns every comment below this record in pre-order.
    #[must_use]
    pub fn flattened_comments(&self) -> Vec<&Item> {
        let mut out = Vec::with_capacity(self.comment_count());
        let mut stack: Vec<&Record> = self.comments.iter().rev().collect();
        while let Some(record) = stack.pop() {
            out.push(&record.item);
            stack.extend(record.comments.iter().rev());
        }
        out
    }
}

impl From<Item> for Record {
    fn from(item: Item) -> Self {
        Self {
            item,
            comments: Vec::new(),
        }
    }
}

impl Keyed for Record {
    fn key(&self) -> &str {
        &self.item.id
    }
}

/// A subreddit moderator as listed by `about/moderators`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Moderator {
    pub name: String,
    pub id: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl Keyed for Moderator {
    fn key(&self) -> &str {
        &self.name
    }
}

/// Opaque pagination continuation token returned by a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor(String);

impl Cursor {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named paginated listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Newest posts of a subreddit.
    Subreddit(String),
    /// Submissions made by a user.
    UserSubmissions(String),
    /// Comments made by a user.
    UserComments(String),
}

impl Collection {
    /// The subreddit or user name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Subreddit(name) | Self::UserSubmissions(name) | Self::UserComments(name) => name,
        }
    }

    /// Listing path relative to the API base.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Subreddit(name) => format!("/r/{name}/new"),
            Self::UserSubmissions(name) => format!("/user/{name}/submitted"),
            Self::UserComments(name) => format!("/user/{name}/comments"),
        }
    }

    /// Filesystem-safe stem used for batch file names.
    #[must_use]
    pub fn file_stem(&self) -> String {
        match self {
            Self::Subreddit(name) => name.clone(),
            Self::UserSubmissions(name) => format!("{name}_posts"),
            Self::UserComments(name) => format!("{name}_comments"),
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subreddit(name) => write!(f, "r/{name}"),
            Self::UserSubmissions(name) => write!(f, "u/{name}/submitted"),
            Self::UserComments(name) => write!(f, "u/{name}/comments"),
        }
    }
}

/// Why pagination of a collection stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum StopReason {
    /// The requested item count was collected.
    TargetReached,
    /// The upstream returned an empty page or no further cursor.
    Exhausted,
    /// The collection itself could not be read.
    Unavailable(Unavailable),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TargetReached => f.write_str("target reached"),
            Self::Exhausted => f.write_str("exhausted"),
            Self::Unavailable(reason) => write!(f, "unavailable ({reason})"),
        }
    }
}

/// Formats unix seconds as `YYYY-MM-DD HH:MM:SS UTC`.
///
/// Out-of-range timestamps render as an empty string.
#[must_use]
pub fn format_created(created_utc: i64) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC");
    OffsetDateTime::from_unix_timestamp(created_utc)
        .ok()
        .and_then(|at| at.format(&format).ok())
        .unwrap_or_default()
}
