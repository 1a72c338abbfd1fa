//! Global request pacing shared by every collection target.
//!
//! The upstream enforces one rate limit per OAuth client, so unlike a
//! per-domain limiter there is a single slot: every request, whatever entity
//! it belongs to, waits until `min_interval` has passed since the previous one.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use harvester_core::governor::RequestPacer;
//!
//! # async fn example() {
//! let pacer = RequestPacer::new(Duration::from_millis(1000));
//! pacer.acquire().await; // first request proceeds immediately
//! pacer.acquire().await; // waits ~1s
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Warning threshold for cumulative pacing and cool-down delay (5 minutes).
const CUMULATIVE_DELAY_WARNING_THRESHOLD: Duration = Duration::from_secs(300);

/// Maximum Retry-After value (1 hour) to prevent excessive delays.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Serializes outbound requests to a minimum spacing.
///
/// `Send + Sync`; share it behind an `Arc` when targets run concurrently.
#[derive(Debug)]
pub struct RequestPacer {
    min_interval: Duration,
    disabled: bool,
    /// `None` until the first request.
    last_request: Mutex<Option<Instant>>,
    cumulative_delay_ms: AtomicU64,
}

impl RequestPacer {
    /// Creates a pacer; a zero interval disables pacing.
    #[must_use]
    #[instrument(skip_all, fields(interval_ms = min_interval.as_millis()))]
    pub fn new(min_interval: Duration) -> Self {
        if min_interval.is_zero() {
            return Self::disabled();
        }
        debug!("creating request pacer");
        Self {
            min_interval,
            disabled: false,
            last_request: Mutex::new(None),
            cumulative_delay_ms: AtomicU64::new(0),
        }
    }

    /// Creates a pacer that never waits.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            min_interval: Duration::ZERO,
            disabled: true,
            last_request: Mutex::new(None),
            cumulative_delay_ms: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    #[must_use]
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Total delay applied so far (pacing plus recorded cool-downs).
    #[must_use]
    pub fn cumulative_delay(&self) -> Duration {
        Duration::from_millis(self.cumulative_delay_ms.load(Ordering::SeqCst))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn add_cumulative_delay(&self, delay: Duration) -> Duration {
        let delay_ms = delay.as_millis() as u64;
        let total = self.cumulative_delay_ms.fetch_add(delay_ms, Ordering::SeqCst) + delay_ms;
        let total = Duration::from_millis(total);
        if total >= CUMULATIVE_DELAY_WARNING_THRESHOLD
            && total - delay < CUMULATIVE_DELAY_WARNING_THRESHOLD
        {
            warn!(
                cumulative_delay_secs = total.as_secs(),
                "excessive rate limiting - consider collecting fewer entities per run"
            );
        }
        total
    }

    /// Waits until the next request may be issued.
    pub async fn acquire(&self) {
        if self.disabled {
            return;
        }
        let mut last_request = self.last_request.lock().await;
        if let Some(previous) = *last_request {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let delay = self.min_interval - elapsed;
                let cumulative = self.add_cumulative_delay(delay);
                debug!(
                    delay_ms = delay.as_millis(),
                    cumulative_ms = cumulative.as_millis(),
                    "pacing request"
                );
                tokio::time::sleep(delay).await;
            }
        }
        *last_request = Some(Instant::now());
    }

    /// Records a cool-down imposed by a rate-limit response.
    pub fn record_rate_limit(&self, delay: Duration) {
        let cumulative = self.add_cumulative_delay(delay);
        debug!(
            delay_ms = delay.as_millis(),
            cumulative_ms = cumulative.as_millis(),
            "recorded rate-limit cool-down"
        );
    }
}

/// Parses a Retry-After header value into a Duration.
///
/// Supports integer seconds and HTTP-dates (RFC 7231). Returns `None` for
/// unparseable or negative values; caps at one hour.
///
/// ```
/// use std::time::Duration;
/// use harvester_core::governor::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("invalid"), None);
/// ```
#[must_use]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        let Ok(seconds) = u64::try_from(seconds) else {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        };
        return Some(Duration::from_secs(seconds).min(MAX_RETRY_AFTER));
    }

    match httpdate::parse_http_date(header_value) {
        Ok(at) => Some(
            at.duration_since(std::time::SystemTime::now())
                .unwrap_or(Duration::ZERO)
                .min(MAX_RETRY_AFTER),
        ),
        Err(_) => {
            debug!(header_value, "unparseable Retry-After value");
            None
        }
    }
}
