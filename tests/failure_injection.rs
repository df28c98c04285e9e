//! Failure injection tests for the forwarding proxy.

use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

mod common;

use common::{
    client, closed_port, start_echo_backend, start_truncating_backend, test_config, wait_until,
    TestProxy,
};

#[tokio::test]
async fn unreachable_target_is_bad_gateway() {
    let dead = closed_port().await;
    let proxy = TestProxy::start(test_config()).await;

    let res = client()
        .get(proxy.proxy_url(&format!("{}/anything", dead)))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["detail"], "Unable to connect to target server");
    assert_eq!(proxy.in_flight(), 0);

    proxy.stop().await;
}

#[tokio::test]
async fn slow_target_is_gateway_timeout() {
    let backend = start_echo_backend().await;
    let mut config = test_config();
    config.timeouts.read_secs = 0.5;
    let proxy = TestProxy::start(config).await;

    let res = client()
        .get(proxy.proxy_url(&format!("{}/slow", backend)))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["detail"], "Request timed out");
    assert_eq!(proxy.in_flight(), 0);

    proxy.stop().await;
}

#[tokio::test]
async fn exhausted_pool_times_out_then_recovers() {
    let backend = start_echo_backend().await;
    let mut config = test_config();
    config.pool.max_connections = 1;
    config.pool.max_keepalive_connections = 1;
    config.timeouts.pool_secs = 0.3;
    let proxy = TestProxy::start(config).await;

    // Hold the only slot with a body that never ends.
    let mut held = client()
        .get(proxy.proxy_url(&format!("{}/drip", backend)))
        .send()
        .await
        .unwrap();
    assert_eq!(held.status(), StatusCode::OK);
    assert!(held.chunk().await.unwrap().is_some());
    assert_eq!(proxy.in_flight(), 1);

    let res = client()
        .get(proxy.proxy_url(&format!("{}/echo", backend)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["detail"], "Connection pool exhausted");

    drop(held);
    assert!(wait_until(|| proxy.in_flight() == 0, Duration::from_secs(3)).await);

    let res = client()
        .get(proxy.proxy_url(&format!("{}/echo", backend)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    proxy.stop().await;
}

#[tokio::test]
async fn client_disconnect_releases_lease() {
    let backend = start_echo_backend().await;
    let proxy = TestProxy::start(test_config()).await;

    let mut res = client()
        .get(proxy.proxy_url(&format!("{}/drip", backend)))
        .send()
        .await
        .unwrap();
    assert!(res.chunk().await.unwrap().is_some());
    assert_eq!(proxy.in_flight(), 1);

    drop(res);
    assert!(wait_until(|| proxy.in_flight() == 0, Duration::from_secs(3)).await);

    proxy.stop().await;
}

#[tokio::test]
async fn truncated_target_body_ends_the_stream() {
    let backend = start_truncating_backend().await;
    let proxy = TestProxy::start(test_config()).await;

    let res = client()
        .get(proxy.proxy_url(&format!("{}/partial", backend)))
        .send()
        .await
        .unwrap();

    // The head was already relayed; the failure shows up in the body.
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.bytes().await.is_err());
    assert!(wait_until(|| proxy.in_flight() == 0, Duration::from_secs(3)).await);

    proxy.stop().await;
}

#[tokio::test]
async fn requests_after_failures_still_succeed() {
    let backend = start_echo_backend().await;
    let dead = closed_port().await;
    let proxy = TestProxy::start(test_config()).await;

    for _ in 0..5 {
        let res = client()
            .get(proxy.proxy_url(&format!("{}/x", dead)))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    }

    let res = client()
        .get(proxy.proxy_url(&format!("{}/echo", backend)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    res.bytes().await.unwrap();
    assert!(wait_until(|| proxy.in_flight() == 0, Duration::from_secs(2)).await);

    proxy.stop().await;
}
