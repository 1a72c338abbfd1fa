//! Decoding of upstream JSON into collected items.
//!
//! Listings are `{"kind": "Listing", "data": {"after": ..., "children": [...]}}`
//! where each child is a `{"kind", "data"}` thing: `t3` posts, `t1` comments
//! and `more` placeholders. Children of other kinds are skipped.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::model::{Cursor, DELETED_AUTHOR, Item, ItemKind, Moderator, format_created};

/// One decoded listing page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingPage {
    pub items: Vec<Item>,
    /// `None` means no further pages.
    pub after: Option<Cursor>,
}

/// A "load more" placeholder: reply ids not yet fetched under `parent_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoreToken {
    /// Id of the item the hidden replies belong to.
    pub parent_id: String,
    /// Ids of the hidden replies. Empty for "continue this thread" stubs.
    pub children: Vec<String>,
    /// Number of hidden replies reported upstream.
    pub count: u64,
}

/// A node of a fetched reply tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyNode {
    /// A real comment and the replies that came inline with it.
    Comment { item: Item, replies: Vec<ReplyNode> },
    /// A placeholder that must be resolved before emission.
    More(MoreToken),
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    after: Option<String>,
    #[serde(default)]
    children: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
struct Thing {
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct RawLink {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    subreddit: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    score: Option<i64>,
    #[serde(default)]
    num_comments: Option<u64>,
    #[serde(default)]
    upvote_ratio: Option<f64>,
    #[serde(default)]
    link_flair_text: Option<String>,
    #[serde(default)]
    author_flair_text: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    permalink: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawComment {
    id: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    subreddit: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    score: Option<i64>,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    link_id: Option<String>,
    #[serde(default)]
    depth: Option<u32>,
    #[serde(default)]
    author_flair_text: Option<String>,
    #[serde(default)]
    permalink: Option<String>,
    /// Either `""` or a nested listing.
    #[serde(default)]
    replies: Value,
}

#[derive(Debug, Deserialize)]
struct RawMore {
    #[serde(default)]
    count: u64,
    #[serde(default)]
    children: Vec<String>,
    #[serde(default)]
    parent_id: String,
}

#[derive(Debug, Deserialize)]
struct MoreChildrenResponse {
    json: MoreChildrenJson,
}

#[derive(Debug, Deserialize)]
struct MoreChildrenJson {
    #[serde(default)]
    errors: Vec<Value>,
    #[serde(default)]
    data: Option<MoreChildrenData>,
}

#[derive(Debug, Deserialize)]
struct MoreChildrenData {
    #[serde(default)]
    things: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
struct ModeratorList {
    data: ModeratorData,
}

#[derive(Debug, Deserialize)]
struct ModeratorData {
    #[serde(default)]
    children: Vec<RawModerator>,
}

#[derive(Debug, Deserialize)]
struct RawModerator {
    name: String,
    #[serde(default)]
    id: String,
    #[serde(default)]
    mod_permissions: Vec<String>,
}

/// Strips a `t1_`/`t3_`-style kind prefix from a fullname.
#[must_use]
pub fn strip_kind_prefix(fullname: &str) -> &str {
    match fullname.split_once('_') {
        Some((kind, id)) if kind.len() == 2 && kind.starts_with('t') => id,
        _ => fullname,
    }
}

fn author_or_deleted(author: Option<String>) -> String {
    author
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DELETED_AUTHOR.to_string())
}

#[allow(clippy::cast_possible_truncation)]
fn whole_seconds(created_utc: f64) -> i64 {
    created_utc.trunc() as i64
}

impl From<RawLink> for Item {
    fn from(raw: RawLink) -> Self {
        let created_utc = whole_seconds(raw.created_utc);
        Self {
            id: raw.id,
            kind: ItemKind::Post,
            title: Some(raw.title),
            body: raw.selftext,
            subreddit: raw.subreddit,
            author: author_or_deleted(raw.author),
            created_utc,
            created_at: format_created(created_utc),
            score: raw.score.unwrap_or_default(),
            num_comments: raw.num_comments.unwrap_or_default(),
            upvote_ratio: raw.upvote_ratio,
            link_flair_text: raw.link_flair_text,
            author_flair_text: raw.author_flair_text,
            url: raw.url,
            permalink: raw.permalink,
            parent_id: None,
            link_id: None,
            depth: None,
        }
    }
}

fn comment_item(raw: RawComment) -> (Item, Value) {
    let created_utc = whole_seconds(raw.created_utc);
    let item = Item {
        id: raw.id,
        kind: ItemKind::Comment,
        title: None,
        body: raw.body,
        subreddit: raw.subreddit,
        author: author_or_deleted(raw.author),
        created_utc,
        created_at: format_created(created_utc),
        score: raw.score.unwrap_or_default(),
        num_comments: 0,
        upvote_ratio: None,
        link_flair_text: None,
        author_flair_text: raw.author_flair_text,
        url: None,
        permalink: raw.permalink,
        parent_id: raw.parent_id.as_deref().map(|p| strip_kind_prefix(p).to_string()),
        link_id: raw.link_id.as_deref().map(|l| strip_kind_prefix(l).to_string()),
        depth: raw.depth,
    };
    (item, raw.replies)
}

fn from_value<T: DeserializeOwned>(value: Value) -> Result<T, String> {
    serde_json::from_value(value).map_err(|err| err.to_string())
}

/// Decodes a listing of posts and/or comments (subreddit or user listings).
///
/// # Errors
///
/// Returns a message describing the schema mismatch.
pub fn decode_listing(body: &str) -> Result<ListingPage, String> {
    let listing: Listing = serde_json::from_str(body).map_err(|err| err.to_string())?;
    let mut items = Vec::with_capacity(listing.data.children.len());
    for thing in listing.data.children {
        match thing.kind.as_str() {
            "t3" => items.push(Item::from(from_value::<RawLink>(thing.data)?)),
            "t1" => items.push(comment_item(from_value::<RawComment>(thing.data)?).0),
            other => debug!(kind = other, "skipping listing child"),
        }
    }
    Ok(ListingPage {
        items,
        after: listing.data.after.filter(|a| !a.is_empty()).map(Cursor::new),
    })
}

fn decode_reply_things(things: Vec<Thing>) -> Result<Vec<ReplyNode>, String> {
    let mut nodes = Vec::with_capacity(things.len());
    for thing in things {
        match thing.kind.as_str() {
            "t1" => {
                let (item, replies) = comment_item(from_value::<RawComment>(thing.data)?);
                let replies = match replies {
                    Value::Object(_) => {
                        let listing: Listing = from_value(replies)?;
                        decode_reply_things(listing.data.children)?
                    }
                    _ => Vec::new(),
                };
                nodes.push(ReplyNode::Comment { item, replies });
            }
            "more" => {
                let raw: RawMore = from_value(thing.data)?;
                nodes.push(ReplyNode::More(MoreToken {
                    parent_id: strip_kind_prefix(&raw.parent_id).to_string(),
                    children: raw.children,
                    count: raw.count,
                }));
            }
            other => debug!(kind = other, "skipping reply child"),
        }
    }
    Ok(nodes)
}

/// Decodes the `[post listing, comment listing]` pair returned for a post.
///
/// # Errors
///
/// Returns a message describing the schema mismatch.
pub fn decode_comment_tree(body: &str) -> Result<Vec<ReplyNode>, String> {
    let listings: Vec<Listing> = serde_json::from_str(body).map_err(|err| err.to_string())?;
    let Some(comments) = listings.into_iter().nth(1) else {
        return Err("expected a post listing followed by a comment listing".to_string());
    };
    decode_reply_things(comments.data.children)
}

/// Decodes a more-children response into a flat list of nodes.
///
/// # Errors
///
/// Returns a message describing the schema mismatch or upstream errors.
pub fn decode_more_children(body: &str) -> Result<Vec<ReplyNode>, String> {
    let response: MoreChildrenResponse =
        serde_json::from_str(body).map_err(|err| err.to_string())?;
    if !response.json.errors.is_empty() {
        return Err(format!("upstream errors: {:?}", response.json.errors));
    }
    let things = response.json.data.map(|d| d.things).unwrap_or_default();
    decode_reply_things(things)
}

/// Decodes a subreddit moderator list.
///
/// # Errors
///
/// Returns a message describing the schema mismatch.
pub fn decode_moderators(body: &str) -> Result<Vec<Moderator>, String> {
    let list: ModeratorList = serde_json::from_str(body).map_err(|err| err.to_string())?;
    Ok(list
        .data
        .children
        .into_iter()
        .map(|raw| Moderator {
            name: raw.name,
            id: raw.id,
            permissions: raw.mod_permissions,
        })
        .collect())
}
