// Integration tests for scheduled API monitoring and its persisted state

use fine_report_printer::logging;
use fine_report_printer::monitor::config::{STATUS_FAILED, STATUS_SUCCESS};
use fine_report_printer::monitor::{MonitorConfig, Scheduler, TaskConfig};
use pretty_assertions::assert_eq;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn task(name: &str, curl: String) -> TaskConfig {
    logging::init_test();
    TaskConfig {
        name: name.to_string(),
        cron: "0 0 3 * * *".to_string(),
        curl,
        timeout_ms: 2000,
        enabled: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_manual_run_records_success_on_disk() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/health"))
        .and(header("Content-Type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"code":0}"#))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("monitor.json");
    let scheduler = Scheduler::new(MonitorConfig::default(), &config_path);

    let curl = format!(
        "curl '{}/api/health' -H 'Content-Type: application/json' --data-raw '{{\"ping\":1}}'",
        server.uri()
    );
    scheduler.add_task(task("his-health", curl)).await.unwrap();

    let result = scheduler.run_task("his-health").await.unwrap();
    assert!(result.success);
    assert_eq!(result.status_code, 200);
    assert_eq!(result.response_body, r#"{"code":0}"#);

    // Status survives a restart
    scheduler.stop();
    let reopened = MonitorConfig::load(&config_path).unwrap();
    let saved = reopened.get_task("his-health").unwrap();
    assert_eq!(saved.last_status, STATUS_SUCCESS);
    assert!(saved.last_error.is_empty());
    assert!(!saved.last_executed.is_empty());
}

#[tokio::test]
async fn test_failed_run_alerts_and_records_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/orders"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/send"))
        .and(query_param("token", "tok-123"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("monitor.json");
    let config = MonitorConfig {
        push_plus_token: "tok-123".to_string(),
        push_plus_url: format!("{}/send", server.uri()),
        tasks: vec![task("orders", format!("curl {}/api/orders", server.uri()))],
    };
    config.save(&config_path).unwrap();

    let scheduler = Scheduler::load(&config_path).unwrap();
    let result = scheduler.run_task("orders").await.unwrap();
    assert!(!result.success);
    assert_eq!(result.status_code, 503);

    let status = scheduler.status().await;
    assert_eq!(status["orders"].last_status, STATUS_FAILED);
    assert!(status["orders"].last_error.starts_with("HTTP 503"));

    let reopened = MonitorConfig::load(&config_path).unwrap();
    assert_eq!(reopened.get_task("orders").unwrap().last_status, STATUS_FAILED);
}

#[tokio::test]
async fn test_unknown_task_is_an_error() {
    let dir = TempDir::new().unwrap();
    let scheduler = Scheduler::new(MonitorConfig::default(), dir.path().join("monitor.json"));

    assert!(scheduler.run_task("missing").await.is_err());
    assert!(scheduler.remove_task("missing").await.is_err());
}

#[tokio::test]
async fn test_scheduled_task_fires() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut every_second = task("ping", format!("curl {}/ping", server.uri()));
    every_second.cron = "* * * * * *".to_string();
    let config = MonitorConfig {
        tasks: vec![every_second],
        ..Default::default()
    };
    let scheduler = Scheduler::new(config, dir.path().join("monitor.json"));

    assert_eq!(scheduler.start().await, 1);

    let mut waited = Duration::ZERO;
    while scheduler.status().await["ping"].last_status.is_empty() && waited < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        waited += Duration::from_millis(50);
    }
    scheduler.stop();

    assert_eq!(scheduler.status().await["ping"].last_status, STATUS_SUCCESS);
    assert_eq!(scheduler.scheduled_count(), 0);
}

#[tokio::test]
async fn test_task_removed_during_alert_stays_removed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/his"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/send"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("monitor.json");
    let config = MonitorConfig {
        push_plus_token: "tok".to_string(),
        push_plus_url: format!("{}/send", server.uri()),
        tasks: vec![task("his", format!("curl {}/api/his", server.uri()))],
    };
    config.save(&config_path).unwrap();
    let scheduler = Scheduler::load(&config_path).unwrap();

    let run = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run_task("his").await })
    };

    // Alert is still in flight
    tokio::time::sleep(Duration::from_millis(200)).await;
    scheduler.remove_task("his").await.unwrap();
    assert!(MonitorConfig::load(&config_path).unwrap().tasks.is_empty());

    let result = run.await.unwrap().unwrap();
    assert!(!result.success);

    assert!(scheduler.config().await.tasks.is_empty());
    assert!(MonitorConfig::load(&config_path).unwrap().tasks.is_empty());
}

#[tokio::test]
async fn test_alerts_follow_saved_pushplus_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/orders"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/relay/send"))
        .and(query_param("token", "tok"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = MonitorConfig {
        push_plus_token: "tok".to_string(),
        push_plus_url: "http://127.0.0.1:9/send".to_string(),
        tasks: vec![task("orders", format!("curl {}/api/orders", server.uri()))],
    };
    let scheduler = Scheduler::new(config, dir.path().join("monitor.json"));

    let mut updated = scheduler.config().await;
    updated.push_plus_url = format!("{}/relay/send", server.uri());
    scheduler.save_config(updated).await.unwrap();

    let result = scheduler.run_task("orders").await.unwrap();
    assert_eq!(result.status_code, 500);
}
