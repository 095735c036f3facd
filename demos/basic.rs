//! Basic example: one governor, a handful of URLs, a simulated fetch.
//!
//! The rate limit is 3 requests per 2 seconds, so the fourth distinct URL
//! waits. Repeated URLs are served from the cache.
//!
//! Run with `RUST_LOG=fetch_governor=debug cargo run --example basic` to see
//! every decision.

use fetch_governor::{FetchOutcome, GovernorDecision, RequestGovernor, RequestKey, Settlement};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

async fn simulated_fetch(url: &str) -> Result<String, String> {
    tokio::time::sleep(Duration::from_millis(100)).await;
    if url.ends_with("/flaky") {
        Err("connection reset by peer".to_string())
    } else if url.ends_with("/gone") {
        Err("404 Not Found".to_string())
    } else {
        Ok(format!("<html>{}</html>", url))
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let governor = RequestGovernor::<String>::builder()
        .with_rate_limit(3, Duration::from_secs(2))
        .with_cache(100, Duration::from_secs(60))
        .build()
        .expect("valid configuration");

    println!("=== Basic Governor Example ===\n");
    println!("Limit: 3 requests per 2 seconds, 60 second cache\n");

    let urls = [
        "https://example.com/live",
        "https://example.com/fixtures",
        "https://example.com/live",
        "https://example.com/results",
        "https://example.com/flaky",
        "https://example.com/gone",
        "https://example.com/fixtures",
    ];

    let start = Instant::now();
    for url in urls {
        let key = RequestKey::new(url);
        let decision = governor.decide(&key).await;
        let elapsed = start.elapsed().as_millis();

        match decision {
            GovernorDecision::ServeFromCache(body) => {
                println!("[{:>5} ms] {:<32} cache hit ({} bytes)", elapsed, url, body.len());
            }
            GovernorDecision::Proceed => {
                let outcome = FetchOutcome::from_result(simulated_fetch(url).await);
                let settled = governor.report_outcome(&key, outcome);
                let note = match settled {
                    Settlement::Cached => "fetched and cached",
                    Settlement::Retry => "transient failure, may retry",
                    Settlement::Abort => "permanent failure",
                };
                println!("[{:>5} ms] {:<32} {}", elapsed, url, note);
            }
            GovernorDecision::Throttled => {
                println!("[{:>5} ms] {:<32} throttled", elapsed, url);
            }
            GovernorDecision::Wait(d) => {
                println!("[{:>5} ms] {:<32} wait {:?}", elapsed, url, d);
            }
        }
    }

    let snapshot = governor.metrics().snapshot();
    println!("\n=== Metrics ===");
    println!("Proceeded:   {}", snapshot.requests_proceeded);
    println!("Cache hits:  {}", snapshot.cache_hits);
    println!("Hit rate:    {:.0}%", snapshot.hit_rate() * 100.0);
    println!("Wait rounds: {}", snapshot.wait_rounds);
    println!("Retries:     {}", snapshot.retries);
    println!("Aborts:      {}", snapshot.aborts);
}
