//! # Health Scenarios
//!
//! Scoring, eviction of stale and unhealthy connections, and the background
//! loops that drive them.

#[cfg(test)]
mod tests {
    use crate::integration::support::Floor;
    use andon_relay::{FanoutApi, MaintenanceLoops, RelayConfig, TopicKey};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_connection_idle_past_timeout_is_evicted() {
        let floor = Floor::new();
        let line = TopicKey::line("L1");
        let idle = floor.viewer("idle", &[line.clone()]);
        let active = floor.viewer("active", &[line.clone()]);

        tokio::time::sleep(Duration::from_secs(200)).await;
        floor.relay.touch(active.id, 32).unwrap();
        tokio::time::sleep(Duration::from_secs(101)).await;

        let report = floor.relay.sweep_health();
        assert_eq!(report.evicted_stale, 1);
        assert_eq!(report.evicted_unhealthy, 0);

        assert!(!floor.relay.registry().contains(idle.id));
        assert!(floor.relay.registry().contains(active.id));
        assert_eq!(floor.relay.subscribers_of(&line), vec![active.id]);
        assert_eq!(floor.relay.index().subscription_count(idle.id), 0);
        assert_eq!(floor.relay.metrics_snapshot().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evicted_connection_receives_nothing() {
        let floor = Floor::new();
        let line = TopicKey::line("L1");
        let mut idle = floor.viewer("idle", &[line.clone()]);

        tokio::time::sleep(Duration::from_secs(301)).await;
        floor.relay.sweep_health();

        let report = floor
            .relay
            .publish("production_count", json!({"count": 1}), &[line])
            .await;
        assert_eq!(report.matched, 0);
        assert!(idle.receive(&floor.relay).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_transport_drops_below_threshold() {
        let mut config = RelayConfig::default();
        config.health.min_health_score = 0.7;
        let floor = Floor::with_config(config);
        let line = TopicKey::line("L1");
        let broken = floor.viewer("broken", &[line.clone()]);
        let broken_id = broken.id;
        drop(broken);

        // Every flush fails: stability 0 with fresh recency scores 2/3
        for _ in 0..5 {
            floor.relay.dispatch("heartbeat", json!({}), &[line.clone()]);
            floor.relay.flush(broken_id).await;
        }
        let report = floor.relay.sweep_health();
        assert_eq!(report.evicted_unhealthy, 1);
        assert!(!floor.relay.registry().contains(broken_id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_connection_scores_high() {
        let floor = Floor::new();
        let mut viewer = floor.viewer("viewer", &[TopicKey::line("L1")]);
        floor
            .relay
            .dispatch("oee_update", json!({"oee": 0.8}), &[TopicKey::line("L1")]);
        viewer.receive(&floor.relay).await;

        let report = floor.relay.sweep_health();
        assert_eq!(report.scored, 1);
        assert_eq!(report.evicted(), 0);
        let score = floor.relay.registry().get(viewer.id).unwrap().stats().health;
        assert!(score > 0.9, "score was {score}");
        assert!((floor.relay.metrics_snapshot().average_health_score - score).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_relay_reports_perfect_average() {
        let floor = Floor::new();
        let snapshot = floor.relay.metrics_snapshot();
        assert_eq!(snapshot.total_connections, 0);
        assert_eq!(snapshot.average_health_score, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_maintenance_loops_evict_and_flush() {
        let floor = Floor::new();
        let line = TopicKey::line("L1");
        let mut live = floor.viewer("live", &[line.clone()]);
        let idle = floor.viewer("idle", &[line.clone()]);

        let loops = MaintenanceLoops::new(Arc::clone(&floor.relay));
        loops.start();

        // The flush loop delivers aged batches without an explicit flush
        floor.relay.dispatch("job_update", json!({"job": "J-42"}), &[line.clone()]);
        let frame = tokio::time::timeout(Duration::from_secs(2), live.rx.recv())
            .await
            .expect("aged batch flushed")
            .unwrap();
        assert!(frame.contains("job_update"));

        // Keep one connection talking while the other goes quiet
        for _ in 0..11 {
            tokio::time::sleep(Duration::from_secs(30)).await;
            floor.relay.touch(live.id, 16).unwrap();
        }
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert!(floor.relay.registry().contains(live.id));
        assert!(!floor.relay.registry().contains(idle.id));
        assert_eq!(floor.relay.subscribers_of(&line), vec![live.id]);

        loops.stop().await;
        assert!(!loops.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_counter_decay_keeps_error_ratio() {
        let floor = Floor::new();
        let viewer = floor.viewer("viewer", &[]);
        let bound = floor.relay.config().maintenance.counter_bound;

        floor
            .relay
            .registry()
            .touch(viewer.id, bound * 2, 0, bound / 2)
            .unwrap();
        assert_eq!(floor.relay.decay_counters(), 1);

        let stats = floor.relay.registry().get(viewer.id).unwrap().stats();
        assert!(stats.message_count <= bound);
        let before = (bound / 2) as f64 / (bound * 2) as f64;
        let after = stats.error_count as f64 / stats.message_count as f64;
        assert!((before - after).abs() < 0.01, "ratio {before} became {after}");
    }
}
