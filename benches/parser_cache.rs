//! 解析器缓存基准测试
//!
//! 测试缓存命中、未命中和完整加载流程的性能

use criterion::{criterion_group, criterion_main, Criterion};
use filter_config::config::{
    load_config, DocumentFormat, EvictionPolicy, LoadContext, ParserCache, ResourceResolver,
    SerdeParserFactory, SharedListener, StaticResolver, Subscription, UpdateListener,
};
use filter_config::error::UpdateFailed;
use filter_config::settings::DiagnosticsSettings;
use filter_config::status::ConfigurationInformation;
use serde::Deserialize;
use std::hint::black_box;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct RateLimitConfig {
    requests_per_second: u32,
    burst: u32,
}

struct NoopListener;

impl UpdateListener<RateLimitConfig> for NoopListener {
    fn on_update(&self, value: RateLimitConfig) -> Result<(), UpdateFailed> {
        black_box(value);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        true
    }
}

/// 解析器缓存基准测试
fn parser_cache_benchmark(c: &mut Criterion) {
    let weak_cache = ParserCache::new(SerdeParserFactory::new(), EvictionPolicy::Weak);
    // 持有强引用，保证弱引用缓存一直命中
    let _held = weak_cache.get_or_create::<RateLimitConfig>(None).unwrap();

    c.bench_function("parser_cache_hit_weak", |b| {
        b.iter(|| black_box(weak_cache.get_or_create::<RateLimitConfig>(None).unwrap()));
    });

    let lru_cache = ParserCache::new(SerdeParserFactory::new(), EvictionPolicy::Lru { capacity: 8 });
    c.bench_function("parser_cache_hit_lru", |b| {
        b.iter(|| black_box(lru_cache.get_or_create::<RateLimitConfig>(None).unwrap()));
    });

    c.bench_function("parser_cache_miss", |b| {
        b.iter(|| {
            let cache = ParserCache::new(SerdeParserFactory::new(), EvictionPolicy::Weak);
            black_box(cache.get_or_create::<RateLimitConfig>(None).unwrap())
        });
    });
}

/// 完整加载流程基准测试
fn load_config_benchmark(c: &mut Criterion) {
    let resolver = StaticResolver::new();
    resolver.insert(
        "rate-limit.cfg.json",
        r#"{"requests_per_second": 500, "burst": 50}"#,
    );
    let resource = resolver.resolve("rate-limit.cfg.json").unwrap();

    let cache = ParserCache::new(
        SerdeParserFactory::with_format(DocumentFormat::Json),
        EvictionPolicy::Weak,
    );
    let parser = cache.get_or_create::<RateLimitConfig>(None).unwrap();
    let listener: SharedListener<RateLimitConfig> = Arc::new(NoopListener);

    let subscription = Subscription::new(
        Some("rate-limit".to_string()),
        "rate-limit.cfg.json".to_string(),
        listener,
        parser,
        resource,
    );
    let context = LoadContext::new(
        Arc::new(ConfigurationInformation::new()),
        DiagnosticsSettings::default(),
    );

    c.bench_function("load_config_success", |b| {
        b.iter(|| load_config(black_box(&subscription), &context));
    });
}

criterion_group!(benches, parser_cache_benchmark, load_config_benchmark);
criterion_main!(benches);
