//! Shared fixtures for integration tests: a configuration pointed at a mock
//! server, a canned token endpoint and listing/comment JSON builders.

#![allow(dead_code)]

pub mod socket_guard;

use std::sync::Arc;
use std::time::Duration;

use harvester_core::{
    Credentials, Governor, GovernorPolicy, HarvestConfig, Harvester, RedditClient, RequestPacer,
    TokenProvider,
};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN: &str = "test-token";

/// Basic auth header for `client-id:client-secret`.
pub const BASIC_AUTH: &str = "Basic Y2xpZW50LWlkOmNsaWVudC1zZWNyZXQ=";

pub fn credentials() -> Credentials {
    Credentials {
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
        username: "labeler".to_string(),
        password: "hunter2".to_string(),
    }
}

/// Configuration with every delay removed, talking to `server`.
pub fn config_for(server: &MockServer) -> HarvestConfig {
    let mut config = HarvestConfig::new(credentials(), "harvester-tests/0.1 (by /u/labeler)");
    config.auth_base = server.uri();
    config.api_base = server.uri();
    config.page_delay = Duration::ZERO;
    config.entity_delay = Duration::ZERO;
    config.cooldown = Duration::from_millis(10);
    config.max_rate_limit_retries = 2;
    config.request_interval = Duration::ZERO;
    config.connect_timeout_secs = 5;
    config.request_timeout_secs = 5;
    config
}

/// Builds the governor and harvester a run would use.
pub fn harvester_for(config: &HarvestConfig) -> Harvester {
    let credentials = Arc::new(TokenProvider::new(config).expect("token provider"));
    let api = Arc::new(RedditClient::new(config).expect("client"));
    let governor = Arc::new(Governor::new(
        credentials,
        Arc::new(RequestPacer::disabled()),
        GovernorPolicy::from(config),
    ));
    Harvester::new(api, governor, config)
}

pub async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": TOKEN,
            "token_type": "bearer",
            "expires_in": 3600,
            "scope": "*"
        })))
        .mount(server)
        .await;
}

pub fn post(id: &str, subreddit: &str) -> Value {
    json!({
        "kind": "t3",
        "data": {
            "id": id,
            "title": format!("post {id}"),
            "selftext": "",
            "subreddit": subreddit,
            "author": "ferris",
            "created_utc": 1_700_000_000.0,
            "score": 1,
            "num_comments": 0,
            "permalink": format!("/r/{subreddit}/comments/{id}/")
        }
    })
}

pub fn comment(id: &str, parent: &str, post_id: &str, replies: Value) -> Value {
    json!({
        "kind": "t1",
        "data": {
            "id": id,
            "body": format!("comment {id}"),
            "subreddit": "rust",
            "author": "crab",
            "created_utc": 1_700_000_100.0,
            "score": 1,
            "parent_id": parent,
            "link_id": format!("t3_{post_id}"),
            "replies": replies
        }
    })
}

pub fn more(parent: &str, children: &[&str]) -> Value {
    json!({
        "kind": "more",
        "data": {
            "count": children.len(),
            "parent_id": parent,
            "children": children
        }
    })
}

pub fn listing(children: Vec<Value>, after: Option<&str>) -> Value {
    json!({
        "kind": "Listing",
        "data": { "after": after, "children": children }
    })
}

/// A listing of posts `{prefix}{start}..{prefix}{end}` in `subreddit`.
pub fn post_listing(
    subreddit: &str,
    prefix: &str,
    ids: std::ops::Range<usize>,
    after: Option<&str>,
) -> Value {
    let children = ids
        .map(|n| post(&format!("{prefix}{n:03}"), subreddit))
        .collect();
    listing(children, after)
}
