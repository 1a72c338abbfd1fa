//! Guard for suites that talk to a local mock of the Reddit API.
//!
//! Some sandboxes refuse to bind localhost sockets. There the mock-backed
//! tests are skipped with a note on stderr, unless
//! `HARVESTER_REQUIRE_SOCKET_TESTS` is set, in which case they fail.

use std::net::TcpListener;

use wiremock::MockServer;

const REQUIRE_VAR: &str = "HARVESTER_REQUIRE_SOCKET_TESTS";

fn socket_tests_required() -> bool {
    std::env::var(REQUIRE_VAR)
        .is_ok_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

fn loopback_available() -> bool {
    TcpListener::bind(("127.0.0.1", 0)).is_ok()
}

/// Starts the mock API server, or returns `None` when this machine cannot
/// listen on 127.0.0.1.
pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    if loopback_available() {
        return Some(MockServer::start().await);
    }

    // libtest names each test thread after the test it runs.
    let current = std::thread::current();
    let test = current.name().unwrap_or("unnamed test");
    assert!(
        !socket_tests_required(),
        "{test}: the mock Reddit API needs a 127.0.0.1 listener and none could be bound \
         ({REQUIRE_VAR} is set, so this is a failure)"
    );
    eprintln!(
        "{test}: skipped, no 127.0.0.1 listener for the mock Reddit API \
         (set {REQUIRE_VAR}=1 to fail instead)"
    );
    None
}
