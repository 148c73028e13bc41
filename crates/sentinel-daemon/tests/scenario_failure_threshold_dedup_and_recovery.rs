//! Spec §8 scenarios 2-4, chained: a critical dependency goes down, three
//! consecutive failing ticks cross the threshold and dispatch one alert; a
//! fourth failing tick within the dedup window is suppressed; recovery
//! auto-resolves the open alert and fires exactly one recovery message.

use std::sync::Arc;

use sentinel_alerts::AlertManager;
use sentinel_checks::checks::health::HealthProbeCheck;
use sentinel_checks::Check;
use sentinel_config::SentinelConfig;
use sentinel_daemon::scheduler::run_cycle;
use sentinel_daemon::state::AppState;
use sentinel_http::ProbeClient;
use sentinel_testkit::{migrated_pool, MockTarget, MockTelegram};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

fn cfg_for(base_url: String) -> SentinelConfig {
    let mut cfg = SentinelConfig::from_env();
    cfg.target_base_url = base_url;
    cfg.alert_threshold_failures = 3;
    cfg.dedup_window_minutes = 30;
    cfg
}

#[tokio::test]
async fn threshold_crossing_dedup_then_auto_resolve() {
    let target = MockTarget::start().await;
    target.healthy_liveness().await;
    // Qdrant (primary) reports down: every readiness probe fails until we
    // mount a healthy replacement below.
    Mock::given(method("GET"))
        .and(path("/health/ready"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "components": [{"name": "qdrant", "status": "down"}]
        })))
        .mount(&target.server)
        .await;

    let telegram = MockTelegram::start().await;
    let cfg = cfg_for(target.base_url());
    let pool = migrated_pool().await;
    let check: Arc<dyn Check> = Arc::new(HealthProbeCheck::new(&cfg, ProbeClient::new(None)));
    let sink = sentinel_alerts::NotificationSink::with_api_base(&telegram.server.uri(), "chat1", 30);
    let alert_manager = Arc::new(AlertManager::new(
        pool.clone(),
        cfg.alert_threshold_failures,
        cfg.dedup_window_minutes,
        Some(sink),
        None,
    ));
    let state = Arc::new(AppState::new(cfg, pool.clone(), vec![check], alert_manager, None));

    // Ticks 1-2: below threshold, no dispatch yet.
    run_cycle(&state).await;
    run_cycle(&state).await;
    assert_eq!(telegram.sent_message_count().await, 0);

    // Tick 3 crosses the threshold: exactly one alert dispatched.
    run_cycle(&state).await;
    assert_eq!(telegram.sent_message_count().await, 1);

    let open = sentinel_db::find_open_alert_for_check(&pool, "S1-probes").await.unwrap();
    assert!(open.is_some(), "alert_history row should be open after escalation");

    // Tick 4: still failing, same message -> suppressed by dedup.
    run_cycle(&state).await;
    assert_eq!(telegram.sent_message_count().await, 1, "dedup window suppresses the repeat");

    let stats = state.stats.lock().await;
    assert_eq!(stats.get("S1-probes").unwrap().fail_count, 4);
    drop(stats);

    // Target recovers: replace the readiness mock wholesale so there is no
    // ambiguity between the old "qdrant down" mock and the new healthy one.
    target.server.reset().await;
    target.healthy_liveness().await.healthy_readiness().await;
    run_cycle(&state).await;

    let stats = state.stats.lock().await;
    assert_eq!(stats.get("S1-probes").unwrap().pass_count, 1);
    drop(stats);

    let open_after = sentinel_db::find_open_alert_for_check(&pool, "S1-probes").await.unwrap();
    assert!(open_after.is_none(), "recovery should stamp resolved_at");
    assert_eq!(telegram.sent_message_count().await, 2, "exactly one recovery message sent");
}
