//! Windows sharing a session converge without exceeding their limits.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use waypoint_application::window::{CountingReset, SessionManager, SyncHub, SyncMessage};
use waypoint_core::checkpoint::{RecoveryPoint, SnapshotType, enforce_limit, merge_point};
use waypoint_core::clock::ManualClock;
use waypoint_core::config::AutoSaveConfig;
use waypoint_infrastructure::MemoryStore;

#[derive(Debug, Clone)]
enum Op {
    Create { window: usize, manual: bool },
    Deliver { window: usize },
}

fn arb_op(windows: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..windows, any::<bool>()).prop_map(|(window, manual)| Op::Create { window, manual }),
        (0..windows).prop_map(|window| Op::Deliver { window }),
    ]
}

struct Window {
    manager: SessionManager,
    inbox: broadcast::Receiver<SyncMessage>,
    /// The same merge and eviction rules applied to everything this window saw.
    model: Vec<RecoveryPoint>,
}

fn apply(model: &mut Vec<RecoveryPoint>, point: RecoveryPoint, max: usize) {
    if merge_point(model, point) {
        enforce_limit(model, max);
    }
}

fn check(window: &Window, max: usize) -> Result<(), TestCaseError> {
    let held = window.manager.recovery_points();
    prop_assert!(held.len() <= max, "{} points held, max {}", held.len(), max);
    let ids: HashSet<&str> = held.iter().map(|p| p.id.as_str()).collect();
    prop_assert_eq!(ids.len(), held.len());
    prop_assert_eq!(held, window.model.as_slice());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn windows_respect_limits_and_policy(
        max in 1usize..6,
        ops in proptest::collection::vec(arb_op(3), 1..60),
    ) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 4, 26, 17, 0, 0).unwrap()));
        let hub = SyncHub::new();
        let (_tap_tx, mut tap) = hub.join("shared");
        let config = AutoSaveConfig { max_recovery_points: max, ..Default::default() };

        let mut windows = Vec::new();
        for _ in 0..3 {
            let mut manager = SessionManager::new(
                Some("shared".to_string()),
                Arc::new(MemoryStore::new()),
                clock.clone(),
                Arc::new(CountingReset::new()),
                config.clone(),
            );
            let (sender, inbox) = hub.join("shared");
            manager.connect(sender);
            windows.push(Window { manager, inbox, model: Vec::new() });
        }

        for window in windows.iter_mut() {
            clock.advance(Duration::seconds(1));
            window.manager.mount();
            let started = tap.try_recv().unwrap();
            apply(&mut window.model, started.data, max);
        }

        for op in ops {
            clock.advance(Duration::seconds(1));
            match op {
                Op::Create { window, manual } => {
                    let kind = if manual { SnapshotType::Manual } else { SnapshotType::Auto };
                    let w = &mut windows[window];
                    w.manager.create_recovery_point("checkpoint", kind, None).unwrap();
                    let created = tap.try_recv().unwrap();
                    apply(&mut w.model, created.data, max);
                    check(w, max)?;
                }
                Op::Deliver { window } => {
                    let w = &mut windows[window];
                    while let Ok(message) = w.inbox.try_recv() {
                        let own = message.origin == w.manager.window_id();
                        let point = message.data.clone();
                        w.manager.receive(message);
                        if !own {
                            apply(&mut w.model, point, max);
                        }
                    }
                    check(w, max)?;
                }
            }
        }

        for window in &windows {
            check(window, max)?;
        }
    }
}
