//! # Fan-out Scenarios
//!
//! Subscribe, publish, batch and rate-limit across several live viewers.

#[cfg(test)]
mod tests {
    use crate::integration::support::{decode_frame, Floor};
    use andon_relay::{FanoutApi, OutboundMessage, RelayConfig, RelayError, TopicKey};
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    // =========================================================================
    // DELIVERY
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_each_subscriber_gets_exactly_one_copy() {
        let floor = Floor::new();
        let line = TopicKey::line("L1");
        let mut viewers: Vec<_> = (0..3)
            .map(|i| floor.viewer(&format!("viewer-{i}"), &[line.clone()]))
            .collect();

        let report = floor
            .relay
            .publish("production_count", json!({"count": 412}), &[line.clone()])
            .await;
        assert_eq!(report.matched, 3);
        assert_eq!(report.queued, 3);

        for viewer in &mut viewers {
            let messages = viewer.receive(&floor.relay).await;
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0]["type"], "production_count");
            assert_eq!(messages[0]["payload"]["count"], 412);
        }

        // One viewer leaves the topic
        let leaving = viewers.remove(0);
        assert!(floor.relay.unsubscribe(leaving.id, &line).unwrap());

        let report = floor
            .relay
            .publish("production_count", json!({"count": 413}), &[line])
            .await;
        assert_eq!(report.matched, 2);

        let mut leaving = leaving;
        assert!(leaving.receive(&floor.relay).await.is_empty());
        for viewer in &mut viewers {
            assert_eq!(viewer.receive(&floor.relay).await.len(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_topics_deliver_once() {
        let floor = Floor::new();
        let mut viewer = floor.viewer(
            "supervisor",
            &[
                TopicKey::line("L1"),
                TopicKey::equipment("press-4"),
                TopicKey::downtime("L1", "press-4"),
            ],
        );

        let report = floor
            .relay
            .publish(
                "downtime",
                json!({"reason": "tool change"}),
                &[
                    TopicKey::line("L1"),
                    TopicKey::equipment("press-4"),
                    TopicKey::downtime("L1", "press-4"),
                ],
            )
            .await;
        assert_eq!(report.matched, 1);
        assert_eq!(viewer.event_types(&floor.relay).await, vec!["downtime"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_to_unknown_topic_matches_nobody() {
        let floor = Floor::new();
        let mut viewer = floor.viewer("viewer", &[TopicKey::line("L1")]);
        let report = floor
            .relay
            .publish("job_update", json!({}), &[TopicKey::job("J-404")])
            .await;
        assert_eq!(report.matched, 0);
        assert!(viewer.receive(&floor.relay).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_orders_critical_first() {
        let floor = Floor::new();
        let line = TopicKey::line("L1");
        let mut viewer = floor.viewer("viewer", &[line.clone()]);

        for event in ["heartbeat", "oee_update", "emergency_stop", "quality_alert"] {
            floor.relay.dispatch(event, json!({}), &[line.clone()]);
        }

        assert_eq!(
            viewer.event_types(&floor.relay).await,
            vec!["emergency_stop", "quality_alert", "oee_update", "heartbeat"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_batch_flushes_without_waiting() {
        let mut config = RelayConfig::default();
        config.batching.max_batch_size = 5;
        let floor = Floor::with_config(config);
        let line = TopicKey::line("L1");
        let mut viewer = floor.viewer("viewer", &[line.clone()]);

        for i in 0..5 {
            floor
                .relay
                .dispatch("production_count", json!({"count": i}), &[line.clone()]);
        }

        let frame = tokio::time::timeout(Duration::from_millis(10), viewer.rx.recv())
            .await
            .expect("flush on size bound")
            .unwrap();
        assert_eq!(decode_frame(&frame).len(), 5);
        assert!(frame.starts_with('['));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_message_frame_is_an_object() {
        let floor = Floor::new();
        let mut viewer = floor.viewer("viewer", &[TopicKey::line("L1")]);
        floor
            .relay
            .dispatch("heartbeat", json!({}), &[TopicKey::line("L1")]);
        floor.relay.flush(viewer.id).await;

        let frame = viewer.rx.try_recv().unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert!(value.is_object());
        assert_eq!(value["priority"], 4);
        assert!(value["timestamp"].is_string());
    }

    // =========================================================================
    // RATE LIMITING
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_hundred_and_first_message_is_rate_limited() {
        let mut config = RelayConfig::default();
        config.rate_limit.max_messages = 100;
        config.rate_limit.window_secs = 60;
        let floor = Floor::with_config(config);
        let viewer = floor.viewer("viewer", &[]);

        for i in 0..100 {
            floor
                .relay
                .enqueue(viewer.id, OutboundMessage::new("production_count", json!({"i": i})))
                .unwrap();
        }
        let err = floor
            .relay
            .enqueue(viewer.id, OutboundMessage::new("production_count", json!({})))
            .unwrap_err();
        match err {
            RelayError::RateLimited {
                connection_id,
                retry_after,
            } => {
                assert_eq!(connection_id, viewer.id);
                assert!(retry_after <= Duration::from_secs(60));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }

        // Budget returns once the window slides past the first sends
        tokio::time::sleep(Duration::from_secs(61)).await;
        floor
            .relay
            .enqueue(viewer.id, OutboundMessage::new("production_count", json!({})))
            .unwrap();
        assert!(floor.relay.metrics_snapshot().rate_limited >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_subscriber_does_not_block_others() {
        let mut config = RelayConfig::default();
        config.rate_limit.max_messages = 1;
        let floor = Floor::with_config(config);
        let line = TopicKey::line("L1");
        let busy = floor.viewer("busy", &[line.clone()]);
        floor
            .relay
            .enqueue(busy.id, OutboundMessage::new("heartbeat", json!({})))
            .unwrap();
        let mut fresh = floor.viewer("fresh", &[line.clone()]);

        let report = floor
            .relay
            .publish("quality_alert", json!({"defect": "burr"}), &[line])
            .await;
        assert_eq!(report.matched, 2);
        assert_eq!(report.queued, 1);
        assert_eq!(report.rate_limited, vec![busy.id]);
        assert_eq!(fresh.event_types(&floor.relay).await, vec!["quality_alert"]);
    }

    // =========================================================================
    // TRANSPORT FAILURE ISOLATION
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_closed_transport_only_hurts_its_connection() {
        let floor = Floor::new();
        let line = TopicKey::line("L1");
        let broken = floor.viewer("broken", &[line.clone()]);
        let mut healthy = floor.viewer("healthy", &[line.clone()]);
        let broken_id = broken.id;
        drop(broken);

        floor
            .relay
            .publish("equipment_state", json!({"state": "running"}), &[line])
            .await;
        floor.relay.flush(broken_id).await;

        assert_eq!(healthy.event_types(&floor.relay).await, vec!["equipment_state"]);
        let broken_stats = floor.relay.registry().get(broken_id).unwrap().stats();
        assert_eq!(broken_stats.error_count, 1);
        let healthy_stats = floor.relay.registry().get(healthy.id).unwrap().stats();
        assert_eq!(healthy_stats.error_count, 0);
        assert_eq!(floor.relay.metrics_snapshot().total_errors, 1);
    }

    // =========================================================================
    // SUBSCRIPTION COUNT INVARIANT
    // =========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_subscription_counts_stay_consistent_under_churn() {
        let floor = Arc::new(Floor::new());
        let viewers: Vec<_> = (0..8)
            .map(|i| floor.viewer(&format!("viewer-{i}"), &[]).id)
            .collect();
        let topics: Vec<TopicKey> = (0..6).map(|i| TopicKey::line(format!("L{i}"))).collect();

        let mut tasks = Vec::new();
        for (n, id) in viewers.iter().copied().enumerate() {
            let floor = Arc::clone(&floor);
            let topics = topics.clone();
            tasks.push(tokio::spawn(async move {
                for round in 0..200 {
                    let topic = &topics[(n + round) % topics.len()];
                    if round % 3 == 0 {
                        let _ = floor.relay.unsubscribe(id, topic);
                    } else {
                        let _ = floor.relay.subscribe(id, topic.clone());
                    }
                    if round % 50 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            }));
        }
        // Disconnect half the viewers while the churn is running
        for id in viewers.iter().take(4).copied() {
            floor.relay.disconnect(id);
        }
        for task in tasks {
            task.await.unwrap();
        }

        let index = floor.relay.index();
        let mut pairs = 0;
        for id in &viewers {
            let held = index.topics_of(*id);
            assert_eq!(held.len(), index.subscription_count(*id));
            for topic in &held {
                assert!(index.subscribers_of(topic).contains(id));
            }
            pairs += held.len();
        }
        assert_eq!(index.total_subscriptions(), pairs);

        let disconnected: HashSet<_> = viewers.iter().take(4).copied().collect();
        for topic in &topics {
            assert!(index.subscribers_of(topic).is_disjoint(&disconnected));
        }
        let snapshot = floor.relay.metrics_snapshot();
        assert_eq!(snapshot.total_subscriptions, pairs);
        assert_eq!(snapshot.total_connections, 4);
    }
}
