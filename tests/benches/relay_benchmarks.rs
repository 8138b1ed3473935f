//! # Andon Relay Benchmarks
//!
//! | Path | Claim |
//! |------|-------|
//! | Subscription lookup | Independent of total connection count |
//! | Fan-out to N subscribers | Linear in N, no per-publish allocation beyond the batch |
//! | Batch encoding | One frame per flush |
//! | Health scoring | Constant per connection |

use andon_relay::adapters::ChannelTransport;
use andon_relay::domain::{health_score, HealthConfig, HealthInputs};
use andon_relay::{encode_batch, FanoutApi, FloorRelay, OutboundMessage, RelayConfig, TopicKey, UserId};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn relay_with_viewers(count: usize, topics_per_viewer: usize) -> (FloorRelay, Vec<tokio::sync::mpsc::Receiver<String>>) {
    let mut config = RelayConfig::default();
    config.connections.max_connections = count + 1;
    config.rate_limit.enabled = false;
    let relay = FloorRelay::new(config);
    let mut receivers = Vec::with_capacity(count);
    for i in 0..count {
        let (transport, rx) = ChannelTransport::pair(16);
        let id = relay
            .connect(Arc::new(transport), UserId::new(format!("viewer-{i}")))
            .unwrap();
        for t in 0..topics_per_viewer {
            relay
                .subscribe(id, TopicKey::line(format!("L{}", (i + t) % 50)))
                .unwrap();
        }
        receivers.push(rx);
    }
    (relay, receivers)
}

fn bench_subscription_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("subscription-lookup");
    for connections in [100, 1_000, 10_000] {
        let (relay, _rx) = relay_with_viewers(connections, 3);
        let topic = TopicKey::line("L7");
        group.bench_with_input(
            BenchmarkId::from_parameter(connections),
            &connections,
            |b, _| b.iter(|| black_box(relay.index().subscribers_of(&topic).len())),
        );
    }
    group.finish();
}

fn bench_fanout(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let mut group = c.benchmark_group("fanout");
    group.measurement_time(Duration::from_secs(5));

    for subscribers in [10, 100, 1_000] {
        let (relay, _rx) = runtime.block_on(async { relay_with_viewers(subscribers, 1) });
        let topics: Vec<TopicKey> = (0..50).map(|l| TopicKey::line(format!("L{l}"))).collect();
        let relay = Arc::new(relay);

        group.throughput(Throughput::Elements(subscribers as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, _| {
                b.iter(|| {
                    let _guard = runtime.enter();
                    let report = relay.dispatch("production_count", json!({"count": 1}), &topics);
                    for id in relay.registry().ids() {
                        relay.batcher().discard(id);
                    }
                    black_box(report.queued)
                })
            },
        );
    }
    group.finish();
}

fn bench_encode_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode-batch");
    for size in [1, 10, 100] {
        let messages: Vec<_> = (0..size)
            .map(|i| OutboundMessage::new("oee_update", json!({"line": "L1", "oee": 0.8, "seq": i})))
            .collect();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &messages, |b, messages| {
            b.iter(|| black_box(encode_batch(messages).unwrap().len()))
        });
    }
    group.finish();
}

fn bench_health_score(c: &mut Criterion) {
    let config = HealthConfig::default();
    let inputs = HealthInputs {
        message_count: 12_000,
        error_count: 40,
        idle: Duration::from_secs(12),
        subscription_count: 6,
    };
    c.bench_function("health-score", |b| {
        b.iter(|| black_box(health_score(black_box(&inputs), &config)))
    });
}

criterion_group!(
    benches,
    bench_subscription_lookup,
    bench_fanout,
    bench_encode_batch,
    bench_health_score
);
criterion_main!(benches);
