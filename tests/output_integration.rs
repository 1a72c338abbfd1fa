//! Batch files on disk: a collection run into a [`JsonDirSink`] followed by
//! combining the directory into one deduplicated file.

mod support;

use harvester_core::{Collection, CollectionJob, JsonDirSink, Record, combine};
use serde_json::Value;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, ResponseTemplate};

use support::socket_guard::start_mock_server_or_skip;
use support::{config_for, harvester_for, listing, mount_token, post, post_listing};

fn subreddit(name: &str, target: usize) -> CollectionJob {
    CollectionJob::new(Collection::Subreddit(name.to_string()), target)
}

fn file_names(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("read dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_run_writes_batches_and_manifest() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path("/r/rust/new"))
        .and(query_param_is_missing("after"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(post_listing("rust", "a", 0..2, Some("t3_a001"))),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/r/rust/new"))
        .and(query_param("after", "t3_a001"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(post_listing("rust", "b", 0..1, None)),
        )
        .mount(&server)
        .await;

    let out = TempDir::new().expect("temp dir");
    let harvester = harvester_for(&config_for(&server));
    let mut sink = JsonDirSink::create(out.path()).await.expect("sink");
    harvester
        .run(&[subreddit("rust", 10)], &mut sink)
        .await
        .expect("run");

    let names = file_names(out.path());
    assert_eq!(names.len(), 3, "{names:?}");
    assert!(names[0].starts_with("rust_1-2_"), "{names:?}");
    assert!(names[1].starts_with("rust_3-3_"), "{names:?}");
    assert_eq!(names[2], "rust_manifest.json");
    assert!(!names.iter().any(|name| name.ends_with(".tmp")));

    let first: Vec<Record> =
        serde_json::from_str(&std::fs::read_to_string(out.path().join(&names[0])).expect("read"))
            .expect("records");
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].item.id, "a000");
    assert_eq!(first[0].item.subreddit, "rust");

    let manifest: Value =
        serde_json::from_str(&std::fs::read_to_string(out.path().join(&names[2])).expect("read"))
            .expect("manifest");
    assert_eq!(manifest["entity"], "rust");
    assert_eq!(manifest["reason"], "exhausted");
    assert_eq!(manifest["total"], 3);
    assert_eq!(manifest["batches"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn test_unavailable_entity_writes_manifest_without_batches() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path("/r/private/new"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let out = TempDir::new().expect("temp dir");
    let harvester = harvester_for(&config_for(&server));
    let mut sink = JsonDirSink::create(out.path()).await.expect("sink");
    harvester
        .run(&[subreddit("private", 10)], &mut sink)
        .await
        .expect("run");

    assert_eq!(file_names(out.path()), ["private_manifest.json"]);
    let manifest: Value = serde_json::from_str(
        &std::fs::read_to_string(out.path().join("private_manifest.json")).expect("read"),
    )
    .expect("manifest");
    assert_eq!(manifest["reason"], "unavailable");
    assert_eq!(manifest["detail"], "forbidden");
    assert_eq!(manifest["total"], 0);
}

#[tokio::test]
async fn test_combine_merges_runs_and_drops_cross_entity_duplicates() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path("/r/rust/new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(
            vec![post("x1", "rust"), post("x2", "rust")],
            None,
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/r/learnrust/new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(
            vec![post("x2", "rust"), post("x3", "learnrust")],
            None,
        )))
        .mount(&server)
        .await;

    let raw = TempDir::new().expect("temp dir");
    let harvester = harvester_for(&config_for(&server));
    let mut sink = JsonDirSink::create(raw.path()).await.expect("sink");
    harvester
        .run(&[subreddit("rust", 10), subreddit("learnrust", 10)], &mut sink)
        .await
        .expect("run");

    let combined_dir = TempDir::new().expect("temp dir");
    let output = combined_dir.path().join("nested").join("combined.json");
    let report = combine(raw.path(), &output).await.expect("combine");

    assert_eq!(report.files_read, 2);
    assert!(report.skipped.is_empty());
    assert_eq!(report.records_in, 4);
    assert_eq!(report.records_out, 3);
    assert_eq!(report.duplicates_removed(), 1);

    let records: Vec<Record> =
        serde_json::from_str(&std::fs::read_to_string(&output).expect("read")).expect("records");
    let mut ids: Vec<&str> = records.iter().map(|r| r.item.id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, ["x1", "x2", "x3"]);
}
