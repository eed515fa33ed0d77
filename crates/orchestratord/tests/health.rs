use std::{process::Command, thread, time::Duration};

#[test]
fn orchestratord_health_works() {
    let bin = std::env::var("CARGO_BIN_EXE_orchestratord").expect("CARGO_BIN_EXE_orchestratord not set");

    let port = pick_free_port();
    let mut child = Command::new(&bin)
        .env("ORCHESTRATORD_PORT", port.to_string())
        .spawn()
        .expect("failed to spawn orchestratord");

    thread::sleep(Duration::from_millis(500));

    let url = format!("http://127.0.0.1:{}/health", port);
    let resp = reqwest::blocking::get(url).expect("health request failed");
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().expect("health body should be json");
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());

    let _ = child.kill();
    let _ = child.wait();
}

#[test]
fn orchestratord_metrics_and_stats_work() {
    let bin = std::env::var("CARGO_BIN_EXE_orchestratord").expect("CARGO_BIN_EXE_orchestratord not set");

    let port = pick_free_port();
    let mut child = Command::new(&bin)
        .env("ORCHESTRATORD_PORT", port.to_string())
        .spawn()
        .expect("failed to spawn orchestratord");

    thread::sleep(Duration::from_millis(500));

    let stats_resp = reqwest::blocking::get(format!("http://127.0.0.1:{}/stats", port)).expect("stats request failed");
    assert!(stats_resp.status().is_success());

    let metrics_resp = reqwest::blocking::get(format!("http://127.0.0.1:{}/metrics", port)).expect("metrics request failed");
    assert!(metrics_resp.status().is_success());
    let body = metrics_resp.text().expect("metrics body should be text");
    assert!(body.contains("orchestrator_jobs_pending"));
    assert!(body.contains("orchestrator_sessions_fresh"));

    let _ = child.kill();
    let _ = child.wait();
}

fn pick_free_port() -> u16 {
    std::net::TcpListener::bind(("127.0.0.1", 0))
        .and_then(|sock| sock.local_addr())
        .map(|addr| addr.port())
        .expect("failed to bind ephemeral port")
}
