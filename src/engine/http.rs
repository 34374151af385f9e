// Daimon Engine — HTTP retry and circuit breaking
//
// Shared by the HTTP providers:
//   • Exponential backoff with ±25% jitter (base 1s, max 30s, 3 retries)
//   • Retry on 429, 500, 502, 503, 504, 529
//   • Honors an integer `Retry-After`
//   • Circuit breaker: N consecutive failures → fail fast for a cooldown
//   • `post_json` runs one JSON POST through all of the above and maps the
//     outcome onto ProviderError

use crate::atoms::error::ProviderError;
use log::{error, warn};
use reqwest::Client;
use serde_json::Value;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

// ── Constants ──────────────────────────────────────────────────────────────

pub const MAX_RETRIES: u32 = 3;
const INITIAL_RETRY_DELAY_MS: u64 = 1_000;
const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Characters of an error body kept in ProviderError messages.
const ERROR_BODY_CHARS: usize = 200;

pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504 | 529)
}

/// Backoff for `attempt` (0-based), before jitter.
fn backoff_ms(attempt: u32, retry_after_secs: Option<u64>) -> u64 {
    let capped = (INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt.min(10))).min(MAX_RETRY_DELAY_MS);
    match retry_after_secs {
        // Server hint wins when longer, capped at a minute.
        Some(secs) => (secs.min(60) * 1000).max(capped),
        None => capped,
    }
}

/// Sleep for the jittered backoff and return how long that was.
pub async fn retry_delay(attempt: u32, retry_after_secs: Option<u64>) -> Duration {
    let delay = Duration::from_millis(apply_jitter(backoff_ms(attempt, retry_after_secs)));
    tokio::time::sleep(delay).await;
    delay
}

fn apply_jitter(base_ms: u64) -> u64 {
    let range = (base_ms / 4) as i64;
    if range == 0 {
        return base_ms.max(100);
    }
    let offset = (clock_noise() % (2 * range + 1)) - range;
    (base_ms as i64 + offset).max(100) as u64
}

fn clock_noise() -> i64 {
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as i64
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Integer-seconds `Retry-After` only; HTTP-dates fall back to backoff.
pub fn parse_retry_after(header_value: &str) -> Option<u64> {
    header_value.trim().parse::<u64>().ok()
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

// ── Circuit breaker ────────────────────────────────────────────────────────

/// Trips after `threshold` consecutive failures and rejects calls until
/// `cooldown_secs` pass; then lets one trial request through (half-open).
#[derive(Debug)]
pub struct CircuitBreaker {
    consecutive_failures: AtomicU32,
    tripped_at: AtomicU64,
    threshold: u32,
    cooldown_secs: u64,
}

impl CircuitBreaker {
    pub const fn new(threshold: u32, cooldown_secs: u64) -> Self {
        Self {
            consecutive_failures: AtomicU32::new(0),
            tripped_at: AtomicU64::new(0),
            threshold,
            cooldown_secs,
        }
    }

    pub fn check(&self) -> Result<(), String> {
        let failures = self.consecutive_failures.load(Ordering::Relaxed);
        if failures < self.threshold {
            return Ok(());
        }
        let elapsed = epoch_secs().saturating_sub(self.tripped_at.load(Ordering::Relaxed));
        if elapsed < self.cooldown_secs {
            Err(format!(
                "circuit open after {} consecutive failures, {}s left",
                failures,
                self.cooldown_secs - elapsed
            ))
        } else {
            Ok(())
        }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.tripped_at.store(0, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        let prev = self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        if prev + 1 >= self.threshold {
            self.tripped_at.store(epoch_secs(), Ordering::Relaxed);
            warn!(
                "[circuit-breaker] Tripped after {} consecutive failures, cooling down {}s",
                prev + 1,
                self.cooldown_secs
            );
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        CircuitBreaker::new(5, 60)
    }
}

// ── Client ─────────────────────────────────────────────────────────────────

pub fn build_client(timeout_secs: u64) -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_default()
}

// ── JSON POST with retry ───────────────────────────────────────────────────

/// POST `body` to `url` with the given headers, retrying transient failures.
/// `label` prefixes log lines, e.g. "openai".
pub async fn post_json(
    client: &Client,
    breaker: &CircuitBreaker,
    label: &str,
    url: &str,
    headers: &[(&str, String)],
    body: &Value,
) -> Result<Value, ProviderError> {
    breaker.check().map_err(ProviderError::Unavailable)?;

    let mut last_error = String::new();
    let mut last_status: u16 = 0;
    let mut retry_after: Option<u64> = None;

    for attempt in 0..=MAX_RETRIES {
        if attempt > 0 {
            let delay = retry_delay(attempt - 1, retry_after.take()).await;
            warn!("[provider] {} retry {}/{} after {}ms", label, attempt, MAX_RETRIES, delay.as_millis());
        }

        let mut req = client.post(url).header("Content-Type", "application/json");
        for (k, v) in headers {
            req = req.header(*k, v);
        }

        let response = match req.json(body).send().await {
            Ok(r) => r,
            Err(e) => {
                breaker.record_failure();
                last_error = format!("request failed: {}", e);
                last_status = 0;
                if attempt < MAX_RETRIES {
                    continue;
                }
                return Err(ProviderError::Transport(last_error));
            }
        };

        let status = response.status().as_u16();
        if !response.status().is_success() {
            last_status = status;
            retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let text = response.text().await.unwrap_or_default();
            last_error = truncate_chars(&text, ERROR_BODY_CHARS);
            error!("[provider] {} error {}: {}", label, status, last_error);
            breaker.record_failure();

            if status == 401 || status == 403 {
                return Err(ProviderError::Auth(last_error));
            }
            if is_retryable_status(status) && attempt < MAX_RETRIES {
                continue;
            }
            break;
        }

        let value = response
            .json::<Value>()
            .await
            .map_err(|e| ProviderError::Malformed(format!("{} body: {}", label, e)))?;
        breaker.record_success();
        return Ok(value);
    }

    Err(classify(last_status, last_error, retry_after))
}

fn classify(status: u16, message: String, retry_after_secs: Option<u64>) -> ProviderError {
    match status {
        0 => ProviderError::Transport(message),
        429 => ProviderError::RateLimited { message, retry_after_secs },
        s => ProviderError::Api { status: s, message },
    }
}
