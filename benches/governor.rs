use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fetch_governor::{
    CacheConfig, ErrorClassifier, LimiterConfig, RateWindow, RequestGovernor, RequestKey,
    ResourceSampler, ResourceUsage, SampleError, TtlCache,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct FixedSampler;

impl ResourceSampler for FixedSampler {
    fn sample(&self) -> Result<ResourceUsage, SampleError> {
        Ok(ResourceUsage {
            memory_bytes: 64 * 1024 * 1024,
            cpu_percent: 12.5,
        })
    }
}

/// Benchmark the window admit/wait computation
fn bench_rate_window(c: &mut Criterion) {
    let mut group = c.benchmark_group("rate_window");

    for max in [10usize, 100, 1000] {
        let config = LimiterConfig::new(max, Duration::from_secs(60)).unwrap();
        group.bench_with_input(BenchmarkId::new("try_admit_full", max), &config, |b, config| {
            let mut window = RateWindow::new(config);
            let start = Instant::now();
            for _ in 0..max {
                window.try_admit(start);
            }
            b.iter(|| window.try_admit(black_box(start + Duration::from_secs(1))))
        });
    }

    group.finish();
}

/// Benchmark cache lookups and insertions
fn bench_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache");
    let config = CacheConfig::new(1000, Duration::from_secs(300)).unwrap();

    let cache: TtlCache<String, Vec<u8>> = TtlCache::new(config);
    for i in 0..1000 {
        cache.set(format!("https://example.com/{}", i), vec![0u8; 256]);
    }
    let hit = "https://example.com/500".to_string();
    let miss = "https://example.com/missing".to_string();

    group.bench_function("get_hit", |b| b.iter(|| cache.get(black_box(&hit))));
    group.bench_function("get_miss", |b| b.iter(|| cache.get(black_box(&miss))));

    // Every insert into the full cache scans for the oldest entry.
    group.bench_function("set_with_eviction", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            cache.set(format!("https://example.com/new/{}", i), vec![0u8; 256]);
        })
    });

    group.finish();
}

/// Benchmark concurrent cache reads
fn bench_concurrent_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_cache");

    for threads in [2usize, 4, 8] {
        group.throughput(Throughput::Elements((threads * 1000) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            let cache = Arc::new(TtlCache::<String, u64>::new(
                CacheConfig::new(10_000, Duration::from_secs(300)).unwrap(),
            ));
            for i in 0..1000u64 {
                cache.set(format!("key{}", i), i);
            }

            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let cache = Arc::clone(&cache);
                        thread::spawn(move || {
                            for i in 0..1000u64 {
                                black_box(cache.get(&format!("key{}", i)));
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            })
        });
    }

    group.finish();
}

/// Benchmark error classification
fn bench_classify(c: &mut Criterion) {
    let classifier = ErrorClassifier::new();

    c.bench_function("classify_retry", |b| {
        b.iter(|| classifier.classify(black_box("error sending request: Connection timed out")))
    });
    c.bench_function("classify_abort", |b| {
        b.iter(|| classifier.classify(black_box("HTTP status client error (404 Not Found)")))
    });
}

/// Benchmark the non-suspending decision path
fn bench_try_decide(c: &mut Criterion) {
    let governor: RequestGovernor<String> = RequestGovernor::builder()
        .with_rate_limit(1_000_000, Duration::from_millis(1))
        .with_sampler(Arc::new(FixedSampler))
        .build()
        .unwrap();
    let cached = RequestKey::new("https://example.com/cached");
    governor.report_success(&cached, "body".to_string());
    let fresh = RequestKey::new("https://example.com/fresh");

    c.bench_function("try_decide_cache_hit", |b| {
        b.iter(|| governor.try_decide(black_box(&cached)))
    });
    c.bench_function("try_decide_proceed", |b| {
        b.iter(|| governor.try_decide(black_box(&fresh)))
    });
}

criterion_group!(
    benches,
    bench_rate_window,
    bench_cache,
    bench_concurrent_cache,
    bench_classify,
    bench_try_decide
);
criterion_main!(benches);
