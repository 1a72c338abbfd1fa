//! Reply tree expansion.
//!
//! A post's reply tree arrives partly materialized: some branches are
//! [`ReplyNode::More`] placeholders naming reply ids that still have to be
//! fetched. [`TreeExpander::expand_tree`] resolves them with a worklist until
//! it is empty (or the request cap is hit), then rebuilds a nested
//! [`Record`] tree from the parent links. Placeholders never reach the output.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::api::{MORE_CHILDREN_BATCH, MoreToken, RedditApi, ReplyNode};
use crate::config::ExpandLimit;
use crate::governor::{CollectError, Governor};
use crate::model::{Item, Record};

/// Comments gathered while resolving placeholders.
#[derive(Debug, Default)]
struct Expansion {
    comments: Vec<Item>,
    seen: HashSet<String>,
    /// Ids already sent in a more-children request, resolved or not.
    requested: HashSet<String>,
    pending: VecDeque<MoreToken>,
    /// "Continue this thread" stubs, which carry no ids.
    stubs: usize,
    /// Hidden replies left unresolved by the request cap or failures.
    unresolved: usize,
}

impl Expansion {
    fn absorb(&mut self, nodes: Vec<ReplyNode>, root: &Item) {
        let mut stack: Vec<ReplyNode> = nodes.into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            match node {
                ReplyNode::Comment { item, replies } => {
                    if self.seen.insert(item.id.clone()) {
                        self.comments.push(associate(item, root));
                    }
                    stack.extend(replies.into_iter().rev());
                }
                ReplyNode::More(token) if token.children.is_empty() => self.stubs += 1,
                ReplyNode::More(token) => self.pending.push_back(token),
            }
        }
    }
}

/// Fills the origin post and subreddit of a reply when the payload omits them.
fn associate(mut item: Item, root: &Item) -> Item {
    if item.subreddit.is_empty() {
        item.subreddit.clone_from(&root.subreddit);
    }
    if item.link_id.is_none() {
        item.link_id = Some(root.id.clone());
    }
    item
}

/// Expands reply trees through the governor.
#[derive(Clone)]
pub struct TreeExpander {
    api: Arc<dyn RedditApi>,
    governor: Arc<Governor>,
    limit: ExpandLimit,
    exclude_author: Option<String>,
}

impl TreeExpander {
    #[must_use]
    pub fn new(api: Arc<dyn RedditApi>, governor: Arc<Governor>, limit: ExpandLimit) -> Self {
        Self {
            api,
            governor,
            limit,
            exclude_author: None,
        }
    }

    /// Drops replies written by `author` (and everything below them).
    #[must_use]
    pub fn excluding_author(mut self, author: impl Into<String>) -> Self {
        self.exclude_author = Some(author.into());
        self
    }

    /// Returns `root` with its fully resolved reply tree.
    ///
    /// Failures are contained: if the tree cannot be fetched the post is
    /// returned without comments, and a failed placeholder only loses the
    /// replies it stood for.
    ///
    /// # Errors
    ///
    /// Only fatal errors ([`CollectError::is_fatal`]) are returned.
    #[instrument(skip(self, root), fields(post = %root.id))]
    pub async fn expand_tree(&self, root: &Item) -> Result<Record, CollectError> {
        let nodes = match self
            .governor
            .call("comments", &root.id, |credential| {
                self.api.fetch_comments(credential, &root.id)
            })
            .await
        {
            Ok(governed) => governed.into_value_or_default(),
            Err(error) if error.is_fatal() => return Err(error),
            Err(error) => {
                warn!(
                    post = %root.id,
                    error = %error,
                    "reply tree unavailable, keeping post without comments"
                );
                return Ok(Record::from(root.clone()));
            }
        };

        let mut expansion = Expansion::default();
        expansion.absorb(nodes, root);

        let mut requests = 0usize;
        while let Some(token) = expansion.pending.pop_front() {
            let ids: Vec<String> = token
                .children
                .into_iter()
                .filter(|id| {
                    !expansion.seen.contains(id) && expansion.requested.insert(id.clone())
                })
                .collect();
            for chunk in ids.chunks(MORE_CHILDREN_BATCH) {
                if let ExpandLimit::Requests(max) = self.limit
                    && requests >= max
                {
                    expansion.unresolved += chunk.len();
                    continue;
                }
                requests += 1;
                let result = self
                    .governor
                    .call("more_children", &root.id, |credential| {
                        self.api.fetch_more_children(credential, &root.id, chunk)
                    })
                    .await;
                match result {
                    Ok(governed) => expansion.absorb(governed.into_value_or_default(), root),
                    Err(error) if error.is_fatal() => return Err(error),
                    Err(error) => {
                        expansion.unresolved += chunk.len();
                        warn!(
                            post = %root.id,
                            parent = %token.parent_id,
                            error = %error,
                            "failed to expand subtree, continuing with siblings"
                        );
                    }
                }
            }
        }

        debug!(
            comments = expansion.comments.len(),
            requests,
            stubs = expansion.stubs,
            unresolved = expansion.unresolved,
            "reply tree expanded"
        );
        Ok(build_tree(
            root,
            expansion.comments,
            self.exclude_author.as_deref(),
        ))
    }
}

/// Nests `comments` under `root` by parent id.
///
/// Replies by `exclude_author` are removed together with their descendants.
/// Comments whose parent is not in the tree are dropped.
#[must_use]
pub fn build_tree(root: &Item, comments: Vec<Item>, exclude_author: Option<&str>) -> Record {
    let mut children: HashMap<String, Vec<Item>> = HashMap::new();
    for comment in comments {
        let parent = comment
            .parent_id
            .clone()
            .unwrap_or_else(|| root.id.clone());
        children.entry(parent).or_default().push(comment);
    }

    let mut excluded = 0;
    let replies = attach(&root.id, &mut children, exclude_author, &mut excluded);
    let orphans: usize = children.values().map(Vec::len).sum();
    if orphans > 0 || excluded > 0 {
        debug!(post = %root.id, orphans, excluded, "dropped comments outside the tree");
    }
    Record {
        item: root.clone(),
        comments: replies,
    }
}

fn attach(
    parent: &str,
    children: &mut HashMap<String, Vec<Item>>,
    exclude_author: Option<&str>,
    excluded: &mut usize,
) -> Vec<Record> {
    let Some(items) = children.remove(parent) else {
        return Vec::new();
    };
    let mut records = Vec::with_capacity(items.len());
    for item in items {
        if exclude_author.is_some_and(|author| item.author.eq_ignore_ascii_case(author)) {
            *excluded += 1 + discard(&item.id, children);
            continue;
        }
        let comments = attach(&item.id, children, exclude_author, excluded);
        records.push(Record { item, comments });
    }
    records
}

fn discard(parent: &str, children: &mut HashMap<String, Vec<Item>>) -> usize {
    let Some(items) = children.remove(parent) else {
        return 0;
    };
    items
        .iter()
        .map(|item| 1 + discard(&item.id, children))
        .sum()
}
