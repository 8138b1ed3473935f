//! # Andon Escalation Scenarios
//!
//! Report → acknowledge → resolve, timeout escalation up the recipient
//! ladder, and the races between operators and timers.
//!
//! All tests run on paused time: `sleep` advances the clock instantly once
//! every task is idle.

#[cfg(test)]
mod tests {
    use crate::integration::support::{alarm, Floor};
    use andon_relay::{
        AlarmPriority, AlarmStatus, AndonApi, FanoutApi, RelayError, TopicKey, UserId,
    };
    use std::sync::Arc;
    use std::time::Duration;

    const CRITICAL_ACK: Duration = Duration::from_secs(120);

    fn supervisor() -> UserId {
        UserId::new("sup-7")
    }

    // =========================================================================
    // TIMER ESCALATION
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_unacknowledged_critical_escalates_after_two_minutes() {
        let floor = Floor::new();
        let mut managers = floor.viewer(
            "prod-mgr",
            &[TopicKey::recipient("production_manager")],
        );
        let mut maintenance = floor.viewer(
            "maint-mgr",
            &[TopicKey::recipient("maintenance_manager")],
        );
        let mut admin = floor.viewer("admin", &[TopicKey::recipient("admin")]);
        floor.andon.start();

        let reported = floor
            .andon
            .report(alarm("L1", "press-4", AlarmPriority::Critical))
            .await
            .unwrap();
        assert_eq!(reported.status, AlarmStatus::Open);
        assert_eq!(reported.escalation_level, 1);

        // Nothing before the deadline
        tokio::time::sleep(CRITICAL_ACK - Duration::from_secs(1)).await;
        assert_eq!(
            floor.andon.get(reported.id).await.unwrap().status,
            AlarmStatus::Open
        );
        assert!(managers.receive(&floor.relay).await.is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let escalated = floor.andon.get(reported.id).await.unwrap();
        assert_eq!(escalated.status, AlarmStatus::Escalated);
        assert_eq!(escalated.escalation_level, 2);
        assert!(escalated.escalated_at.is_some());

        // Level-2 recipients are notified, level-3 are not yet
        for viewer in [&mut managers, &mut maintenance] {
            let messages = viewer.receive(&floor.relay).await;
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0]["type"], "alarm_escalated");
            assert_eq!(messages[0]["priority"], 1);
            assert_eq!(messages[0]["payload"]["escalationLevel"], 2);
            assert_eq!(messages[0]["payload"]["alarmId"], reported.id.to_string());
        }
        assert!(admin.receive(&floor.relay).await.is_empty());

        let records = floor.notifier.records();
        let last = records.last().unwrap();
        assert_eq!(last.previous_status, AlarmStatus::Open);
        assert_eq!(last.new_status, AlarmStatus::Escalated);
        assert_eq!(last.actor, UserId::system());

        floor.andon.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_escalation_climbs_to_final_level_and_stops() {
        let floor = Floor::new();
        let mut admin = floor.viewer("admin", &[TopicKey::recipient("admin")]);
        floor.andon.start();

        let reported = floor
            .andon
            .report(alarm("L1", "press-4", AlarmPriority::Critical))
            .await
            .unwrap();

        tokio::time::sleep(CRITICAL_ACK * 2 + Duration::from_secs(1)).await;
        let alarm = floor.andon.get(reported.id).await.unwrap();
        assert_eq!(alarm.escalation_level, 3);
        assert_eq!(admin.event_types(&floor.relay).await, vec!["alarm_escalated"]);

        // Level 3 is the top of the critical ladder
        assert!(floor.andon.scheduler().get(reported.id).is_none());
        tokio::time::sleep(Duration::from_secs(3_600)).await;
        assert_eq!(floor.andon.get(reported.id).await.unwrap().escalation_level, 3);
        assert_eq!(floor.relay.metrics_snapshot().escalations_fired, 2);

        floor.andon.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_escalation_subscribers_follow_one_alarm() {
        let floor = Floor::new();
        floor.andon.start();
        let first = floor
            .andon
            .report(alarm("L1", "press-4", AlarmPriority::Critical))
            .await
            .unwrap();
        let second = floor
            .andon
            .report(alarm("L2", "welder-2", AlarmPriority::Low))
            .await
            .unwrap();
        let mut watcher = floor.viewer("watcher", &[TopicKey::Escalation(first.id)]);
        let mut critical_board = floor.viewer(
            "board",
            &[TopicKey::EscalationPriority(AlarmPriority::Critical)],
        );

        tokio::time::sleep(CRITICAL_ACK + Duration::from_secs(1)).await;

        assert_eq!(watcher.event_types(&floor.relay).await, vec!["alarm_escalated"]);
        assert_eq!(
            critical_board.event_types(&floor.relay).await,
            vec!["alarm_escalated"]
        );
        assert_eq!(
            floor.andon.get(second.id).await.unwrap().status,
            AlarmStatus::Open
        );
        floor.andon.stop().await;
    }

    // =========================================================================
    // OPERATOR ACTIONS VS TIMERS
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_acknowledge_cancels_ack_timer() {
        let floor = Floor::new();
        let mut managers = floor.viewer(
            "prod-mgr",
            &[TopicKey::recipient("production_manager")],
        );
        floor.andon.start();

        let reported = floor
            .andon
            .report(alarm("L1", "press-4", AlarmPriority::Critical))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        let acked = floor
            .andon
            .acknowledge(reported.id, supervisor())
            .await
            .unwrap();
        assert_eq!(acked.status, AlarmStatus::Acknowledged);
        assert_eq!(acked.acknowledged_by, Some(supervisor()));

        // Well past the acknowledge deadline, short of the 15 minute resolve deadline
        tokio::time::sleep(Duration::from_secs(600)).await;
        let alarm = floor.andon.get(reported.id).await.unwrap();
        assert_eq!(alarm.status, AlarmStatus::Acknowledged);
        assert_eq!(alarm.escalation_level, 1);
        assert!(managers.receive(&floor.relay).await.is_empty());

        floor.andon.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_deadline_escalates_acknowledged_alarm() {
        let floor = Floor::new();
        floor.andon.start();

        let reported = floor
            .andon
            .report(alarm("L1", "press-4", AlarmPriority::Critical))
            .await
            .unwrap();
        floor
            .andon
            .acknowledge(reported.id, supervisor())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(15 * 60 + 1)).await;
        let alarm = floor.andon.get(reported.id).await.unwrap();
        assert_eq!(alarm.status, AlarmStatus::Escalated);
        assert_eq!(alarm.escalation_level, 2);
        assert!(alarm.acknowledged_at.is_some());

        floor.andon.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_acknowledge_is_rejected() {
        let floor = Floor::new();
        let reported = floor
            .andon
            .report(alarm("L1", "press-4", AlarmPriority::High))
            .await
            .unwrap();

        floor
            .andon
            .acknowledge(reported.id, supervisor())
            .await
            .unwrap();
        let err = floor
            .andon
            .acknowledge(reported.id, UserId::new("sup-8"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RelayError::InvalidTransition {
                from: AlarmStatus::Acknowledged,
                ..
            }
        ));
        assert_eq!(err.http_status(), 409);

        // The first acknowledgement stands
        let alarm = floor.andon.get(reported.id).await.unwrap();
        assert_eq!(alarm.acknowledged_by, Some(supervisor()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acknowledge_has_one_winner() {
        let floor = Arc::new(Floor::new());
        let reported = floor
            .andon
            .report(alarm("L1", "press-4", AlarmPriority::Critical))
            .await
            .unwrap();

        let attempts: Vec<_> = (0..5)
            .map(|i| {
                let floor = Arc::clone(&floor);
                tokio::spawn(async move {
                    floor
                        .andon
                        .acknowledge(reported.id, UserId::new(format!("sup-{i}")))
                        .await
                })
            })
            .collect();

        let mut wins = 0;
        for attempt in attempts {
            if attempt.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
        let acknowledged = floor
            .notifier
            .records()
            .iter()
            .filter(|r| r.new_status == AlarmStatus::Acknowledged)
            .count();
        assert_eq!(acknowledged, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolved_alarm_never_escalates() {
        let floor = Floor::new();
        let mut board = floor.viewer(
            "board",
            &[TopicKey::EscalationPriority(AlarmPriority::Critical)],
        );
        floor.andon.start();

        let reported = floor
            .andon
            .report(alarm("L1", "press-4", AlarmPriority::Critical))
            .await
            .unwrap();
        let resolved = floor
            .andon
            .resolve(reported.id, supervisor(), "replaced sensor".to_string())
            .await
            .unwrap();
        assert_eq!(resolved.status, AlarmStatus::Resolved);
        assert_eq!(resolved.resolution_notes.as_deref(), Some("replaced sensor"));

        tokio::time::sleep(CRITICAL_ACK * 3).await;
        let alarm = floor.andon.get(reported.id).await.unwrap();
        assert_eq!(alarm.status, AlarmStatus::Resolved);
        assert_eq!(alarm.escalation_level, 1);
        assert_eq!(
            board.event_types(&floor.relay).await,
            vec!["andon_alarm", "alarm_resolved"]
        );

        // Terminal
        let err = floor
            .andon
            .escalate(reported.id, supervisor(), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::InvalidTransition { .. }));
        floor.andon.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_requires_notes() {
        let floor = Floor::new();
        let reported = floor
            .andon
            .report(alarm("L1", "press-4", AlarmPriority::Medium))
            .await
            .unwrap();
        let err = floor
            .andon
            .resolve(reported.id, supervisor(), "   ".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Validation(_)));
        assert!(floor.andon.get(reported.id).await.unwrap().is_active());
    }

    // =========================================================================
    // REPORTING
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_report_conflicts_until_resolved() {
        let floor = Floor::new();
        let first = floor
            .andon
            .report(alarm("L1", "press-4", AlarmPriority::High))
            .await
            .unwrap();

        let err = floor
            .andon
            .report(alarm("L1", "press-4", AlarmPriority::High))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Conflict(_)));

        // Same key after resolution is a new alarm
        floor
            .andon
            .resolve(first.id, supervisor(), "cleared".to_string())
            .await
            .unwrap();
        let second = floor
            .andon
            .report(alarm("L1", "press-4", AlarmPriority::High))
            .await
            .unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_reports_create_one_alarm() {
        let floor = Arc::new(Floor::new());
        let reports: Vec<_> = (0..4)
            .map(|_| {
                let floor = Arc::clone(&floor);
                tokio::spawn(async move {
                    floor
                        .andon
                        .report(alarm("L2", "robot-1", AlarmPriority::Critical))
                        .await
                })
            })
            .collect();

        let mut created = 0;
        let mut conflicts = 0;
        for report in reports {
            match report.await.unwrap() {
                Ok(_) => created += 1,
                Err(RelayError::Conflict(_)) => conflicts += 1,
                Err(other) => panic!("unexpected error {other:?}"),
            }
        }
        assert_eq!((created, conflicts), (1, 3));
        assert_eq!(floor.andon.list_active().await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_for_unknown_line_is_not_found() {
        let floor = Floor::new();
        let err = floor
            .andon
            .report(alarm("L99", "press-4", AlarmPriority::Low))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::NotFound { .. }));
        assert!(floor.andon.list_active().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_notifies_first_level_and_line() {
        let floor = Floor::new();
        let mut supervisor_view = floor.viewer(
            "sup",
            &[TopicKey::recipient("line_supervisor")],
        );
        let mut line_view = floor.viewer("line", &[TopicKey::line("L1")]);
        let mut other_line = floor.viewer("other", &[TopicKey::line("L2")]);

        floor
            .andon
            .report(alarm("L1", "press-4", AlarmPriority::High))
            .await
            .unwrap();

        assert_eq!(
            supervisor_view.event_types(&floor.relay).await,
            vec!["andon_alarm"]
        );
        assert_eq!(line_view.event_types(&floor.relay).await, vec!["andon_alarm"]);
        assert!(other_line.receive(&floor.relay).await.is_empty());
    }

    // =========================================================================
    // MANUAL ESCALATION
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_manual_escalation_to_target_level() {
        let floor = Floor::new();
        let mut admin = floor.viewer("admin", &[TopicKey::recipient("admin")]);
        let reported = floor
            .andon
            .report(alarm("L1", "press-4", AlarmPriority::Critical))
            .await
            .unwrap();

        let escalated = floor
            .andon
            .escalate(
                reported.id,
                supervisor(),
                Some(3),
                Some("line down, parts on hold".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(escalated.status, AlarmStatus::Escalated);
        assert_eq!(escalated.escalation_level, 3);
        assert_eq!(
            escalated.escalation_notes.as_deref(),
            Some("line down, parts on hold")
        );
        assert_eq!(admin.event_types(&floor.relay).await, vec!["alarm_escalated"]);

        // Cannot go down or past the ladder
        for target in [Some(2), Some(4)] {
            assert!(floor
                .andon
                .escalate(reported.id, supervisor(), target, None)
                .await
                .is_err());
        }

        // Escalated but never acknowledged: acknowledge is still allowed
        let acked = floor
            .andon
            .acknowledge(reported.id, supervisor())
            .await
            .unwrap();
        assert_eq!(acked.status, AlarmStatus::Acknowledged);
        assert_eq!(acked.escalation_level, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_alarm_is_not_found() {
        let floor = Floor::new();
        let id = andon_relay::AlarmId::new();
        assert!(matches!(
            floor.andon.acknowledge(id, supervisor()).await,
            Err(RelayError::NotFound { .. })
        ));
        assert!(matches!(
            floor.andon.get(id).await,
            Err(RelayError::NotFound { .. })
        ));
    }
}
