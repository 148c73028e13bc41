//! Spec §8 scenario 1: target serves healthy liveness/readiness. One tick
//! should produce a single `pass` result, persisted, with no alerts fired.

use std::sync::Arc;

use sentinel_alerts::AlertManager;
use sentinel_checks::checks::health::HealthProbeCheck;
use sentinel_checks::Check;
use sentinel_config::SentinelConfig;
use sentinel_daemon::scheduler::run_cycle;
use sentinel_daemon::state::AppState;
use sentinel_http::ProbeClient;
use sentinel_testkit::{migrated_pool, MockTarget};

fn cfg_for(base_url: String) -> SentinelConfig {
    let mut cfg = SentinelConfig::from_env();
    cfg.target_base_url = base_url;
    cfg.check_interval_seconds = 60;
    cfg
}

#[tokio::test]
async fn health_pass_path_persists_one_pass_result_with_no_alerts() {
    let target = MockTarget::start().await;
    target.healthy_liveness().await.healthy_readiness().await;

    let cfg = cfg_for(target.base_url());
    let pool = migrated_pool().await;
    let check: Arc<dyn Check> = Arc::new(HealthProbeCheck::new(&cfg, ProbeClient::new(None)));
    let alert_manager = Arc::new(AlertManager::new(pool.clone(), cfg.alert_threshold_failures, cfg.dedup_window_minutes, None, None));
    let state = Arc::new(AppState::new(cfg, pool.clone(), vec![check], alert_manager, None));

    run_cycle(&state).await;

    let stats = state.stats.lock().await;
    let s1 = stats.get("S1-probes").expect("S1-probes ran");
    assert_eq!(s1.total_runs, 1);
    assert_eq!(s1.pass_count, 1);
    assert!(s1.last_result.as_ref().unwrap().latency_ms > 0.0);
    drop(stats);

    let failures = state.failures.lock().await;
    assert_eq!(failures.len(), 0);
    drop(failures);

    let history = sentinel_db::query_history(&pool, "S1-probes", 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, sentinel_schemas::CheckStatus::Pass);
}
