//! Driver example: concurrent fetches with retries handled by `FetchDriver`.
//!
//! Each page fails transiently a couple of times before succeeding. Several
//! tasks share one governor, so they also share its rate window and cache.

use fetch_governor::{
    Backoff, FetchDriver, Fetcher, RequestGovernor, RequestKey, RetryPolicy,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct SiteError(String);

impl fmt::Display for SiteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for SiteError {}

/// Pretend website: each path times out `flakiness` times before answering.
struct FlakySite {
    flakiness: usize,
    attempts: Mutex<HashMap<String, usize>>,
}

impl Fetcher<String> for FlakySite {
    type Error = SiteError;

    async fn fetch(&self, key: &RequestKey) -> Result<String, SiteError> {
        tokio::time::sleep(Duration::from_millis(150)).await;

        let attempt = {
            let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
            let n = attempts.entry(key.to_string()).or_insert(0);
            *n += 1;
            *n
        };

        if key.as_str().contains("missing") {
            Err(SiteError("404 Not Found".into()))
        } else if attempt <= self.flakiness {
            Err(SiteError(format!("operation timeout (attempt {})", attempt)))
        } else {
            Ok(format!("payload for {}", key))
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("fetch_governor=warn")),
        )
        .init();

    let governor = RequestGovernor::<String>::builder()
        .with_rate_limit(4, Duration::from_secs(1))
        .build()
        .expect("valid configuration");

    let policy = RetryPolicy::new(4)
        .expect("non-zero attempts")
        .with_backoff(Backoff::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_secs(1),
        });
    let driver = FetchDriver::new(Arc::new(governor), policy);
    let site = Arc::new(FlakySite {
        flakiness: 2,
        attempts: Mutex::new(HashMap::new()),
    });

    println!("=== Fetch Driver Example ===\n");

    let paths = ["/series/1", "/series/2", "/series/3", "/missing", "/series/1"];
    let mut handles = Vec::new();
    for path in paths {
        let driver = driver.clone();
        let site = Arc::clone(&site);
        handles.push(tokio::spawn(async move {
            let key = RequestKey::new(format!("https://example.com{}", path));
            (path, driver.get(&key, site.as_ref()).await)
        }));
    }

    for handle in handles {
        match handle.await {
            Ok((path, Ok(fetched))) => {
                let source = if fetched.is_cached() { "cache" } else { "network" };
                println!("{:<12} ok from {}: {}", path, source, fetched.into_inner());
            }
            Ok((path, Err(e))) => println!("{:<12} failed: {}", path, e),
            Err(e) => println!("task panicked: {}", e),
        }
    }

    let snapshot = driver.governor().metrics().snapshot();
    println!("\n=== Metrics ===");
    println!("Proceeded: {}", snapshot.requests_proceeded);
    println!("Retries:   {}", snapshot.retries);
    println!("Aborts:    {}", snapshot.aborts);
    println!("Waits:     {}", snapshot.wait_rounds);
}
