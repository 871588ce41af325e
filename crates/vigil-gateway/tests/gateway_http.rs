use anyhow::Result;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::util::ServiceExt;
use vigil_core::config::{DispatchMode, VigilConfig};
use vigil_core::{now_ms, CheckEvent, EventSource};
use vigil_gateway::{build_router, Gateway};
use vigil_monitor::{Escalation, Health, RetryEscalation};

/// Local dispatch, no autostart, no watchdog, fresh database file.
fn test_gateway() -> Result<Gateway> {
    let mut config = VigilConfig::default();
    config.database.path = std::env::temp_dir()
        .join(format!("vigil-test-{}.db", uuid::Uuid::new_v4()))
        .to_string_lossy()
        .into_owned();
    config.cycle.dispatch = DispatchMode::Local;
    config.cycle.autostart = false;
    config.watchdog.enabled = false;
    Gateway::open(config)
}

async fn call(app: Router, method: &str, uri: &str, body: Option<Value>) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app.oneshot(builder.body(body)?).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, value))
}

async fn get(app: Router, uri: &str) -> Result<(StatusCode, Value)> {
    call(app, "GET", uri, None).await
}

#[tokio::test]
async fn health_reports_ok() -> Result<()> {
    let gateway = test_gateway()?;
    let (status, body) = get(build_router(gateway.state.clone()), "/health").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["dispatch"], "local");
    Ok(())
}

#[tokio::test]
async fn test_mode_touches_nothing() -> Result<()> {
    let gateway = test_gateway()?;
    let (status, body) = get(build_router(gateway.state.clone()), "/ping-cycle?mode=test").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "test");
    assert_eq!(gateway.state.history.count()?, 0);
    assert!(gateway.state.controller.cancel_signal().cancelled_at()?.is_none());
    Ok(())
}

#[tokio::test]
async fn cycle_mode_without_delay_is_rejected() -> Result<()> {
    let gateway = test_gateway()?;
    let (status, body) = get(
        build_router(gateway.state.clone()),
        "/ping-cycle?mode=cycle&cycleId=abc",
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_REQUEST");

    let (status, _) = get(build_router(gateway.state.clone()), "/ping-cycle?mode=sideways").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn initial_cycle_records_and_continues() -> Result<()> {
    let gateway = test_gateway()?;
    let (status, body) = get(build_router(gateway.state.clone()), "/ping-cycle").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["kind"], "initial");
    assert_eq!(body["nextPingIn"], 60_000);
    assert!(body["cycleId"].is_string());
    assert!(body["timestamp"].is_i64());

    let events = gateway.state.history.all()?;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].source, EventSource::SelfTrigger);
    assert_eq!(events[0].interval_seconds, 60);
    Ok(())
}

#[tokio::test]
async fn external_source_gets_a_single_check() -> Result<()> {
    let gateway = test_gateway()?;
    let (status, body) = get(
        build_router(gateway.state.clone()),
        "/ping-cycle?mode=initial&source=ci-scheduler",
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "checked");
    assert!(body["nextPingIn"].is_null());

    let events = gateway.state.history.all()?;
    assert_eq!(events[0].source, EventSource::CiScheduler);
    Ok(())
}

#[tokio::test]
async fn stale_continuation_is_cancelled() -> Result<()> {
    let gateway = test_gateway()?;
    let (status, body) = get(
        build_router(gateway.state.clone()),
        "/scheduler-control?action=cancel",
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");

    // kind=initial skips the sleep
    let (status, body) = get(
        build_router(gateway.state.clone()),
        "/ping-cycle?mode=cycle&cycleId=old&kind=initial&delay=0&lineageStart=1",
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");
    assert_eq!(gateway.state.history.count()?, 0);

    let (status, _) = get(
        build_router(gateway.state.clone()),
        "/scheduler-control?action=explode",
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn check_runner_reports_interval() -> Result<()> {
    let gateway = test_gateway()?;
    let (status, body) = get(
        build_router(gateway.state.clone()),
        "/check-runner?cycleId=c-1",
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["refreshInterval"], 60_000);
    assert_eq!(body["servicesChecked"], 0);
    assert_eq!(body["cycleId"], "c-1");
    Ok(())
}

#[tokio::test]
async fn ping_stats_shape() -> Result<()> {
    let gateway = test_gateway()?;
    get(build_router(gateway.state.clone()), "/ping-cycle").await?;

    let (status, body) = get(build_router(gateway.state.clone()), "/ping-stats").await?;
    assert_eq!(status, StatusCode::OK);
    let last = body["lastPing"].as_i64().unwrap();
    assert_eq!(body["nextPing"].as_i64().unwrap(), last + 60_000);
    assert_eq!(body["recentHistory"].as_array().unwrap().len(), 1);
    assert_eq!(body["lastIntervalReset"], 0);
    assert_eq!(body["githubAction"]["enabled"], false);
    assert_eq!(body["githubAction"]["schedule"], "*/5 * * * *");
    assert_eq!(body["intervalSeconds"], 60);
    Ok(())
}

#[tokio::test]
async fn interval_change_resets_and_restarts() -> Result<()> {
    let gateway = test_gateway()?;
    let new_config = json!({
        "refreshIntervalMs": 30_000,
        "ciSchedule": {"expression": "*/10 * * * *", "enabled": true},
        "localJobSchedule": {"expression": "*/5 * * * *", "enabled": false},
    });
    let (status, body) = call(
        build_router(gateway.state.clone()),
        "POST",
        "/scheduler-config",
        Some(new_config),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["intervalChanged"], true);
    assert!(gateway.state.history.last_interval_reset()? > 0);

    let (_, stored) = get(build_router(gateway.state.clone()), "/scheduler-config").await?;
    assert_eq!(stored["refreshIntervalMs"], 30_000);
    assert_eq!(stored["ciSchedule"]["enabled"], true);

    let (status, _) = call(
        build_router(gateway.state.clone()),
        "POST",
        "/scheduler-config",
        Some(json!({"refreshIntervalMs": 10})),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn unchanged_interval_does_not_reset() -> Result<()> {
    let gateway = test_gateway()?;
    let (_, body) = call(
        build_router(gateway.state.clone()),
        "POST",
        "/scheduler-config",
        Some(json!({"refreshIntervalMs": 60_000})),
    )
    .await?;
    assert_eq!(body["intervalChanged"], false);
    assert_eq!(gateway.state.history.last_interval_reset()?, 0);
    Ok(())
}

#[tokio::test]
async fn local_job_lifecycle() -> Result<()> {
    let gateway = test_gateway()?;
    let app = || build_router(gateway.state.clone());

    let (status, job) = call(
        app(),
        "POST",
        "/local-jobs",
        Some(json!({"name": "fast", "expression": "*/2 * * * *"})),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(job["status"], "running");
    let id = job["id"].as_str().unwrap().to_string();

    let (status, _) = call(
        app(),
        "POST",
        "/local-jobs",
        Some(json!({"name": "fast", "expression": "* * * * *"})),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(
        app(),
        "POST",
        "/local-jobs",
        Some(json!({"name": "hourly", "expression": "0 * * * *"})),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, monitor) = get(app(), "/monitor").await?;
    assert_eq!(monitor["activeSource"]["kind"], "local-job");
    assert_eq!(monitor["activeSource"]["intervalSeconds"], 120);

    let (status, stopped) = call(app(), "POST", &format!("/local-jobs/{id}/stop"), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stopped["status"], "stopped");

    let (_, monitor) = get(app(), "/monitor").await?;
    assert_eq!(monitor["activeSource"]["kind"], "self-trigger");

    let (status, _) = call(app(), "DELETE", &format!("/local-jobs/{id}"), None).await?;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = call(app(), "DELETE", &format!("/local-jobs/{id}"), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "JOB_NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn monitor_grades_sources() -> Result<()> {
    let gateway = test_gateway()?;
    get(build_router(gateway.state.clone()), "/ping-cycle").await?;

    let (status, body) = get(build_router(gateway.state.clone()), "/monitor").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["activeSource"]["color"], "green");
    let sources = body["sources"].as_array().unwrap();
    let own = sources
        .iter()
        .find(|s| s["source"] == "self-trigger")
        .unwrap();
    assert_eq!(own["health"], "healthy");
    assert!(body["intervalStats"].is_null());
    assert!(body["inFlight"].as_array().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn watchdog_spawns_recovery_when_overdue() -> Result<()> {
    let gateway = test_gateway()?;
    let state = gateway.state.clone();
    let mut escalation = RetryEscalation::new(1);

    let (health, step) = vigil_gateway::watchdog::poll(&state, &mut escalation).await?;
    assert_eq!(health, Health::Unknown);
    assert_eq!(step, Escalation::Idle);

    state.history.append(&CheckEvent {
        timestamp: now_ms() - 200_000,
        source: EventSource::SelfTrigger,
        cycle_id: "old".to_string(),
        lineage_id: "old".to_string(),
        interval_seconds: 60,
        services_checked: 0,
    })?;

    let (health, step) = vigil_gateway::watchdog::poll(&state, &mut escalation).await?;
    assert_eq!(health, Health::Critical);
    assert_eq!(step, Escalation::Retry { attempt: 1 });

    let (_, step) = vigil_gateway::watchdog::poll(&state, &mut escalation).await?;
    assert_eq!(step, Escalation::Exhausted);
    Ok(())
}

#[tokio::test]
async fn watchdog_leaves_a_cancelled_chain_stopped() -> Result<()> {
    let gateway = test_gateway()?;
    let state = gateway.state.clone();
    let mut escalation = RetryEscalation::new(3);

    state.history.append(&CheckEvent {
        timestamp: now_ms() - 200_000,
        source: EventSource::SelfTrigger,
        cycle_id: "old".to_string(),
        lineage_id: "old".to_string(),
        interval_seconds: 60,
        services_checked: 0,
    })?;
    let (status, _) = get(
        build_router(state.clone()),
        "/scheduler-control?action=cancel",
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (health, step) = vigil_gateway::watchdog::poll(&state, &mut escalation).await?;
    assert_eq!(health, Health::Critical);
    assert_eq!(step, Escalation::Idle);
    assert_eq!(escalation.attempts(), 0);
    assert!(state.controller.in_flight().is_empty());
    Ok(())
}

#[tokio::test]
async fn oversized_cron_step_is_rejected_without_breaking_jobs() -> Result<()> {
    let gateway = test_gateway()?;
    let app = || build_router(gateway.state.clone());

    let (status, _) = call(
        app(),
        "POST",
        "/local-jobs",
        Some(json!({"name": "huge", "expression": "*/200000000000000000 * * * *"})),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        app(),
        "POST",
        "/scheduler-config",
        Some(json!({
            "refreshIntervalMs": 30_000,
            "localJobSchedule": {"expression": "*/4611686018427387904 * * * *", "enabled": true},
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (_, stored) = get(app(), "/scheduler-config").await?;
    assert_eq!(stored["refreshIntervalMs"], 60_000);
    assert_eq!(gateway.state.history.last_interval_reset()?, 0);

    let (status, jobs) = get(app(), "/local-jobs").await?;
    assert_eq!(status, StatusCode::OK);
    assert!(jobs.as_array().unwrap().is_empty());
    let (status, _) = get(app(), "/ping-stats").await?;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = get(app(), "/monitor").await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}
