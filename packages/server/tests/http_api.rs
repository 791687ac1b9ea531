//! HTTP API integration tests.
//!
//! Tests for the ops endpoints (health check, hub stats, connected users).

mod fixtures;
use fixtures::TestServer;

#[tokio::test]
async fn test_health_endpoint() {
    // テスト項目: /api/health エンドポイントが正常に動作する
    // given (前提条件):
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    // when (操作):
    let response = client
        .get(format!("{}/api/health", server.base_url()))
        .send()
        .await
        .expect("Failed to send request");

    // then (期待する結果):
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_stats_endpoint() {
    // テスト項目: /api/ws/stats が接続数とディスパッチ統計を返す
    // given (前提条件):
    let server = TestServer::start().await;
    let _alice = server.connect(5, 1).await;
    let _bob = server.connect(5, 2).await;
    let _carol = server.connect(6, 1).await;
    let client = reqwest::Client::new();

    // when (操作):
    let response = client
        .get(format!("{}/api/ws/stats", server.base_url()))
        .send()
        .await
        .expect("Failed to send request");

    // then (期待する結果):
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["connections"]["total_connections"], 3);
    assert_eq!(body["connections"]["tenant_count"], 2);
    assert_eq!(body["connections"]["per_tenant_counts"]["5"], 2);
    assert_eq!(body["connections"]["per_tenant_counts"]["6"], 1);
    assert!(body["dispatch"]["enqueued"].is_u64());
    assert!(body["dispatch"]["dropped"].is_u64());
}

#[tokio::test]
async fn test_connected_users_endpoint() {
    // テスト項目: /api/colleges/{college_id}/connected-users が接続中ユーザーを昇順で返す
    // given (前提条件):
    let server = TestServer::start().await;
    let _second = server.connect(5, 2).await;
    let _first = server.connect(5, 1).await;
    let client = reqwest::Client::new();

    // when (操作):
    let response = client
        .get(format!(
            "{}/api/colleges/5/connected-users",
            server.base_url()
        ))
        .send()
        .await
        .expect("Failed to send request");

    // then (期待する結果):
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["college_id"], 5);
    assert_eq!(body["user_ids"], serde_json::json!([1, 2]));
}

#[tokio::test]
async fn test_connected_users_unknown_and_invalid_college() {
    // テスト項目: 接続のないカレッジは空リスト、不正な college_id は 400 を返す
    // given (前提条件):
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    // when (操作):
    let unknown = client
        .get(format!(
            "{}/api/colleges/99/connected-users",
            server.base_url()
        ))
        .send()
        .await
        .expect("Failed to send request");
    let invalid = client
        .get(format!(
            "{}/api/colleges/abc/connected-users",
            server.base_url()
        ))
        .send()
        .await
        .expect("Failed to send request");

    // then (期待する結果):
    assert_eq!(unknown.status(), 200);
    let body: serde_json::Value = unknown.json().await.expect("Failed to parse JSON");
    assert_eq!(body["user_ids"], serde_json::json!([]));
    assert_eq!(invalid.status(), 400);
}
