use std::net::TcpListener;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use chrono::Utc;
use serial_test::serial;
use testkit::sample_trace;

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_tracegraph")
}

fn spawn_server(temp: &Path) -> (Child, u16, u16) {
    let ingest_port = free_port();
    let query_port = free_port();

    let child = Command::new(bin())
        .env("TRACEGRAPH_CONFIG", temp.join("absent.toml"))
        .arg("run")
        .arg("--db-path")
        .arg(temp.join("tracegraph-stress.duckdb"))
        .arg("--ingest-http-addr")
        .arg(format!("127.0.0.1:{ingest_port}"))
        .arg("--query-tcp-addr")
        .arg(format!("127.0.0.1:{query_port}"))
        .arg("--query-http-addr")
        .arg(format!("127.0.0.1:{}", free_port()))
        .arg("--query-uds-path")
        .arg(temp.join("tracegraph-stress.sock"))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn tracegraph run");

    (child, ingest_port, query_port)
}

fn batch_body(batch: usize, per_batch: usize) -> serde_json::Value {
    let now = Utc::now();
    let traces = (0..per_batch)
        .map(|i| {
            let mut t = sample_trace(
                &format!("op{}", i % 9),
                ((batch * per_batch + i) % 5_000) as f64 * 1_000.0,
                now - chrono::Duration::seconds((i % 3_600) as i64),
            );
            t.has_errors = i % 17 == 0;
            t
        })
        .collect::<Vec<_>>();
    serde_json::json!({ "traces": traces })
}

async fn wait_http_ready(ingest_port: u16, child: &mut Child) {
    let client = reqwest::Client::new();
    let deadline = Instant::now() + Duration::from_secs(20);
    loop {
        assert!(
            child.try_wait().expect("try_wait").is_none(),
            "tracegraph run exited before ready"
        );
        if client
            .post(format!("http://127.0.0.1:{ingest_port}/v1/graphs/ready/traces"))
            .body(Vec::<u8>::new())
            .send()
            .await
            .is_ok()
        {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for ingest HTTP"
        );
        tokio::time::sleep(Duration::from_millis(150)).await;
    }
}

#[tokio::test]
#[serial]
#[ignore = "stress test; run manually"]
async fn stress_ingest_batches_and_query_operations() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (mut child, ingest_port, query_port) = spawn_server(temp.path());
    wait_http_ready(ingest_port, &mut child).await;

    const BATCHES: usize = 80;
    const PER_BATCH: usize = 150;
    let expected = BATCHES * PER_BATCH;

    let client = reqwest::Client::new();
    let mut tasks = tokio::task::JoinSet::new();
    let start = Instant::now();
    for batch in 0..BATCHES {
        let client = client.clone();
        tasks.spawn(async move {
            let resp = client
                .post(format!(
                    "http://127.0.0.1:{ingest_port}/v1/graphs/stress/traces"
                ))
                .json(&batch_body(batch, PER_BATCH))
                .send()
                .await
                .expect("post traces");
            assert!(resp.status().is_success(), "ingest request failed");
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.expect("join ingest task");
    }
    let ingest_elapsed = start.elapsed();

    let status_out = Command::new(bin())
        .env("TRACEGRAPH_CONFIG", temp.path().join("absent.toml"))
        .arg("--json")
        .arg("status")
        .arg("--addr")
        .arg(format!("127.0.0.1:{query_port}"))
        .output()
        .expect("status output");
    let value: serde_json::Value =
        serde_json::from_slice(&status_out.stdout).expect("status json parse");
    assert_eq!(
        value["Status"]["traces_count"].as_u64().unwrap_or(0) as usize,
        expected
    );

    let mut after = String::new();
    let mut total = 0;
    loop {
        let mut cmd = Command::new(bin());
        cmd.env("TRACEGRAPH_CONFIG", temp.path().join("absent.toml"))
            .arg("--json")
            .arg("operations")
            .arg("stress")
            .arg("--addr")
            .arg(format!("127.0.0.1:{query_port}"));
        if !after.is_empty() {
            cmd.arg("--after").arg(&after);
        }
        let out = cmd.output().expect("operations output");
        let page: serde_json::Value =
            serde_json::from_slice(&out.stdout).expect("operations json parse");
        for node in page["Operations"]["nodes"].as_array().expect("nodes") {
            total += node["stats"]["count"].as_u64().unwrap_or(0) as usize;
        }
        after = page["Operations"]["cursor"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        if after.is_empty() {
            break;
        }
    }
    assert_eq!(total, expected);

    let _ = child.kill();
    let _ = child.wait();

    eprintln!("stress complete: {expected} traces in {ingest_elapsed:?}");
}
