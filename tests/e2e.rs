mod common;

use std::io::Write;
use std::process::Command;

use common::*;
use serde_json::json;
use tempfile::NamedTempFile;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SNAPSHOT_HEADER: &str = "shop,cart_token,confirm_token,expires_at,amount_to_redeem,status,shopify_order_id,tid,accumulated_order,failed_attempts,needs_reconciliation,refund_ids";

fn run(transactions: &str, events: &str, config: &str) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_guper-cashback"))
        .arg(transactions)
        .arg(events)
        .env("GUPER_CONFIG", config)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run binary");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn temp_file(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn replayed_events_leave_settled_rows_untouched() {
    let (stdout, stderr, success) = run(
        "tests/fixtures/transactions.csv",
        "tests/fixtures/noop_events.csv",
        "tests/fixtures/missing.toml",
    );

    assert!(success, "{stderr}");
    assert!(stderr.contains("no merchants configured"));

    let expected = std::fs::read_to_string("tests/fixtures/transactions.csv").unwrap();
    assert_eq!(
        stdout.lines().collect::<Vec<_>>(),
        expected.lines().collect::<Vec<_>>()
    );
}

#[test]
fn errors_warn_but_do_not_block() {
    let (stdout, stderr, success) = run(
        "tests/fixtures/transactions.csv",
        "tests/fixtures/with_errors.csv",
        "tests/fixtures/missing.toml",
    );

    assert!(success);
    assert!(stderr.contains("unrecognized event type"));
    assert!(stderr.contains("missing items"));

    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines[0], SNAPSHOT_HEADER);
    assert_eq!(lines.len(), 3);
}

#[test]
fn missing_arguments_print_usage() {
    let output = Command::new(env!("CARGO_BIN_EXE_guper-cashback"))
        .arg("tests/fixtures/transactions.csv")
        .output()
        .expect("failed to run binary");

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("usage"));
}

#[test]
fn unreadable_snapshot_fails() {
    let (stdout, stderr, success) = run(
        "tests/fixtures/no-such-file.csv",
        "tests/fixtures/noop_events.csv",
        "tests/fixtures/missing.toml",
    );

    assert!(!success);
    assert!(stdout.is_empty());
    assert!(stderr.contains("no-such-file.csv"));
}

#[tokio::test(flavor = "multi_thread")]
async fn pending_cart_is_confirmed_then_cancelled() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/api/loyalty/confirmOrder/ct-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "TID": "t2",
            "cashback": { "accumulatedOrder": 40 }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/loyalty/cancelPartial/t2"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/loyalty/cancelOrderByTransaction/t2"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = temp_file(
        ".toml",
        &format!(
            "[[merchants]]\nshop = \"{SHOP}\"\nbase_url = \"{}\"\napi_key = \"{API_KEY}\"\napi_secret = \"{API_SECRET}\"\n",
            server.uri()
        ),
    );
    let events = temp_file(
        ".csv",
        &format!(
            "type,shop,order_id,cart_token,items,refund_id\n\
             paid,{SHOP},o2,c2,,\n\
             paid,{SHOP},o2,c2,,\n\
             partially_refunded,{SHOP},o2,,v1,r8\n\
             partially_refunded,{SHOP},o2,,v1,r8\n\
             cancelled,{SHOP},o2,,,\n"
        ),
    );

    let config_path = config.path().display().to_string();
    let events_path = events.path().display().to_string();
    let (stdout, stderr, success) = tokio::task::spawn_blocking(move || {
        run("tests/fixtures/transactions.csv", &events_path, &config_path)
    })
    .await
    .unwrap();

    assert!(success, "{stderr}");
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines[0], SNAPSHOT_HEADER);
    assert_eq!(
        lines[1],
        "acme.myshopify.com,c1,ct-1,2026-01-01T00:00:00Z,300,cancelled,o1,t1,75,0,false,r7"
    );
    assert_eq!(
        lines[2],
        "acme.myshopify.com,c2,ct-2,2099-01-01T00:00:00Z,0,cancelled,o2,t2,40,0,false,r8"
    );
}
