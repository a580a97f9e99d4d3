//! Integration tests for the REST surface: sending, history, sidebar
//! summaries, read state, deletion, auth rejection, and rate limiting.

use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{EncodingKey, Header};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use parley_server::auth::jwt::{load_or_generate_jwt_secret, Claims, JwtVerifier};
use parley_server::auth::DynVerifier;
use parley_server::chat::router::ConversationRouter;
use parley_server::db::models::User;
use parley_server::db::sqlite::SqliteStore;
use parley_server::db::DynStore;
use parley_server::state::AppState;
use parley_server::ws::registry::SessionRegistry;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;
type WsWriter = futures_util::stream::SplitSink<WsStream, Message>;
type WsReader = futures_util::stream::SplitStream<WsStream>;

async fn start_test_server() -> (String, SocketAddr, SqliteStore, Vec<u8>) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let sqlite = SqliteStore::open(&data_dir).expect("Failed to init DB");
    let jwt_secret =
        load_or_generate_jwt_secret(&data_dir).expect("Failed to generate JWT secret");

    let store: DynStore = Arc::new(sqlite.clone());
    let verifier: DynVerifier = Arc::new(JwtVerifier::new(jwt_secret.clone(), store.clone()));

    let state = AppState {
        store,
        verifier,
        sessions: SessionRegistry::new(),
        conversations: ConversationRouter::new(),
    };

    let app = parley_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        let _keep = tmp_dir;
    });

    (format!("http://{}", addr), addr, sqlite, jwt_secret)
}

async fn seed_user(store: &SqliteStore, username: &str) -> User {
    store
        .create_user(username, &format!("{username}@example.com"))
        .await
        .expect("Failed to seed user")
}

fn mint_token(secret: &[u8], user_id: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user_id,
        iat: now,
        exp: now + 900,
    };
    jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(secret))
        .expect("Failed to mint token")
}

async fn connect_ws(addr: &SocketAddr, token: &str) -> (WsWriter, WsReader) {
    let ws_url = format!("ws://{}/ws?token={}", addr, token);
    let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .expect("Failed to connect to WebSocket");
    ws_stream.split()
}

async fn next_event(read: &mut WsReader, timeout_ms: u64) -> Option<Value> {
    loop {
        match tokio::time::timeout(Duration::from_millis(timeout_ms), read.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                return Some(serde_json::from_str(text.as_str()).expect("Invalid JSON frame"));
            }
            Ok(Some(Ok(Message::Ping(_)))) | Ok(Some(Ok(Message::Pong(_)))) => continue,
            _ => return None,
        }
    }
}

async fn drain_events(read: &mut WsReader) {
    while next_event(read, 200).await.is_some() {}
}

async fn send_ws_event(write: &mut WsWriter, event: &str, data: Value) {
    let frame = json!({ "event": event, "data": data }).to_string();
    write
        .send(Message::Text(frame.into()))
        .await
        .expect("Failed to send event");
}

async fn post_message(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
    receiver_id: i64,
    content: &str,
) -> reqwest::Response {
    client
        .post(format!("{base_url}/api/messages"))
        .bearer_auth(token)
        .json(&json!({ "receiver_id": receiver_id, "content": content }))
        .send()
        .await
        .expect("Request failed")
}

/// Send via REST and return the persisted message body, asserting 201.
async fn post_message_ok(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
    receiver_id: i64,
    content: &str,
) -> Value {
    let resp = post_message(client, base_url, token, receiver_id, content).await;
    assert_eq!(resp.status(), 201);
    resp.json().await.unwrap()
}

#[tokio::test]
async fn test_rest_send_returns_created_and_fans_out() {
    let (base_url, addr, store, secret) = start_test_server().await;
    let alice = seed_user(&store, "alice").await;
    let bob = seed_user(&store, "bob").await;

    // Bob is online with the conversation open; alice sends over REST only.
    let (mut b_write, mut b_read) = connect_ws(&addr, &mint_token(&secret, bob.id)).await;
    send_ws_event(&mut b_write, "join_conversation", json!({ "other_user_id": alice.id })).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    drain_events(&mut b_read).await;

    let client = reqwest::Client::new();
    let body =
        post_message_ok(&client, &base_url, &mint_token(&secret, alice.id), bob.id, "over http")
            .await;
    let message_id = body["id"].as_i64().unwrap();
    assert!(message_id > 0);
    assert_eq!(body["content"], "over http");
    assert_eq!(body["sender_username"], "alice");
    assert_eq!(body["message_type"], "text");
    assert_eq!(body["is_read"], false);

    // Subscribed connection gets the conversation event first, then the
    // device-level notification. No confirmation frame: the HTTP response
    // was the confirmation.
    let frame = next_event(&mut b_read, 2000).await.expect("Expected delivery");
    assert_eq!(frame["event"], "new_message");
    assert_eq!(frame["data"]["id"].as_i64().unwrap(), message_id);
    let frame = next_event(&mut b_read, 2000).await.expect("Expected notification");
    assert_eq!(frame["event"], "message_notification");
    assert_eq!(frame["data"]["sender"]["username"], "alice");
    assert!(next_event(&mut b_read, 400).await.is_none());
}

#[tokio::test]
async fn test_message_type_is_preserved_and_validated() {
    let (base_url, _addr, store, secret) = start_test_server().await;
    let alice = seed_user(&store, "alice").await;
    let bob = seed_user(&store, "bob").await;

    let client = reqwest::Client::new();
    let a_token = mint_token(&secret, alice.id);

    let resp = client
        .post(format!("{base_url}/api/messages"))
        .bearer_auth(&a_token)
        .json(&json!({
            "receiver_id": bob.id,
            "content": "cat.png",
            "message_type": "image"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message_type"], "image");

    // Unknown kinds are rejected at deserialization.
    let resp = client
        .post(format!("{base_url}/api/messages"))
        .bearer_auth(&a_token)
        .json(&json!({
            "receiver_id": bob.id,
            "content": "clip.mp4",
            "message_type": "video"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);
}

#[tokio::test]
async fn test_rest_rejects_missing_and_garbage_tokens() {
    let (base_url, _addr, store, secret) = start_test_server().await;
    let alice = seed_user(&store, "alice").await;

    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base_url}/api/messages/unread-count"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["message"], "invalid session token");

    let resp = client
        .get(format!("{base_url}/api/messages/unread-count"))
        .bearer_auth("garbage.token.here")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["message"], "invalid session token");

    // A real token for a real user goes through.
    let resp = client
        .get(format!("{base_url}/api/messages/unread-count"))
        .bearer_auth(mint_token(&secret, alice.id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_history_is_chronological_and_respects_limit() {
    let (base_url, _addr, store, secret) = start_test_server().await;
    let alice = seed_user(&store, "alice").await;
    let bob = seed_user(&store, "bob").await;

    let client = reqwest::Client::new();
    let a_token = mint_token(&secret, alice.id);
    let b_token = mint_token(&secret, bob.id);

    // Interleave directions so ordering cannot come from grouping.
    post_message_ok(&client, &base_url, &a_token, bob.id, "m1").await;
    post_message_ok(&client, &base_url, &b_token, alice.id, "m2").await;
    post_message_ok(&client, &base_url, &a_token, bob.id, "m3").await;
    post_message_ok(&client, &base_url, &b_token, alice.id, "m4").await;
    post_message_ok(&client, &base_url, &a_token, bob.id, "m5").await;

    let body: Value = client
        .get(format!("{base_url}/api/messages/conversation/{}", bob.id))
        .bearer_auth(&a_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["count"], 5);
    let contents: Vec<&str> = body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, vec!["m1", "m2", "m3", "m4", "m5"]);

    // Limit keeps the newest messages, still oldest-first.
    let body: Value = client
        .get(format!(
            "{base_url}/api/messages/conversation/{}?limit=2",
            bob.id
        ))
        .bearer_auth(&a_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["count"], 2);
    let contents: Vec<&str> = body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, vec!["m4", "m5"]);
}

#[tokio::test]
async fn test_conversation_summaries_and_read_state() {
    let (base_url, _addr, store, secret) = start_test_server().await;
    let alice = seed_user(&store, "alice").await;
    let bob = seed_user(&store, "bob").await;
    let carol = seed_user(&store, "carol").await;

    let client = reqwest::Client::new();
    let a_token = mint_token(&secret, alice.id);

    post_message_ok(&client, &base_url, &mint_token(&secret, carol.id), alice.id, "c1").await;
    post_message_ok(&client, &base_url, &mint_token(&secret, carol.id), alice.id, "c2").await;
    let bob_msg =
        post_message_ok(&client, &base_url, &mint_token(&secret, bob.id), alice.id, "b1").await;

    // Sidebar: one row per partner, most recent conversation first.
    let body: Value = client
        .get(format!("{base_url}/api/messages/conversations"))
        .bearer_auth(&a_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let rows = body["conversations"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["other_user_id"].as_i64().unwrap(), bob.id);
    assert_eq!(rows[0]["other_username"], "bob");
    assert_eq!(rows[0]["last_message"], "b1");
    assert_eq!(rows[0]["unread_count"], 1);
    assert_eq!(rows[1]["other_user_id"].as_i64().unwrap(), carol.id);
    assert_eq!(rows[1]["last_message"], "c2");
    assert_eq!(rows[1]["unread_count"], 2);

    let body: Value = client
        .get(format!("{base_url}/api/messages/unread-count"))
        .bearer_auth(&a_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["unread_count"], 3);

    // Batch receipt for carol's conversation.
    let resp = client
        .put(format!(
            "{base_url}/api/messages/conversation/{}/read",
            carol.id
        ))
        .bearer_auth(&a_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["marked_read"], 2);

    // Single receipt for bob's message.
    let resp = client
        .put(format!(
            "{base_url}/api/messages/read/{}",
            bob_msg["id"].as_i64().unwrap()
        ))
        .bearer_auth(&a_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let body: Value = client
        .get(format!("{base_url}/api/messages/unread-count"))
        .bearer_auth(&a_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["unread_count"], 0);
}

#[tokio::test]
async fn test_rest_error_status_mapping() {
    let (base_url, _addr, store, secret) = start_test_server().await;
    let alice = seed_user(&store, "alice").await;
    let bob = seed_user(&store, "bob").await;

    let client = reqwest::Client::new();
    let a_token = mint_token(&secret, alice.id);
    let b_token = mint_token(&secret, bob.id);

    // Unknown receiver.
    let resp = post_message(&client, &base_url, &a_token, 9999, "hello").await;
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["message"], "receiver 9999 not found");

    // Empty and oversized content.
    let resp = post_message(&client, &base_url, &a_token, bob.id, "").await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["message"], "message content is required");

    let resp = post_message(&client, &base_url, &a_token, bob.id, &"x".repeat(4001)).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["message"], "message content exceeds 4000 characters");

    // Self-addressed.
    let resp = post_message(&client, &base_url, &a_token, alice.id, "hi me").await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["message"], "cannot send a message to yourself");

    // Ownership checks.
    let bob_msg = post_message_ok(&client, &base_url, &b_token, alice.id, "mine").await;
    let bob_msg_id = bob_msg["id"].as_i64().unwrap();

    let resp = client
        .delete(format!("{base_url}/api/messages/{bob_msg_id}"))
        .bearer_auth(&a_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["message"], "only the sender can delete a message");

    let resp = client
        .put(format!("{base_url}/api/messages/read/{bob_msg_id}"))
        .bearer_auth(&b_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["error"]["message"],
        "only the receiver can mark a message as read"
    );

    // Missing message.
    let resp = client
        .delete(format!("{base_url}/api/messages/424242"))
        .bearer_auth(&b_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["message"], "message 424242 not found");
}

#[tokio::test]
async fn test_delete_endpoints_report_counts() {
    let (base_url, _addr, store, secret) = start_test_server().await;
    let alice = seed_user(&store, "alice").await;
    let bob = seed_user(&store, "bob").await;

    let client = reqwest::Client::new();
    let a_token = mint_token(&secret, alice.id);
    let b_token = mint_token(&secret, bob.id);

    post_message_ok(&client, &base_url, &a_token, bob.id, "one").await;
    post_message_ok(&client, &base_url, &a_token, bob.id, "two").await;
    post_message_ok(&client, &base_url, &b_token, alice.id, "three").await;

    // Whole conversation, both directions.
    let resp = client
        .delete(format!("{base_url}/api/messages/conversation/{}", bob.id))
        .bearer_auth(&a_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["deleted_count"], 3);

    // Idempotent on an already-empty conversation.
    let resp = client
        .delete(format!("{base_url}/api/messages/conversation/{}", bob.id))
        .bearer_auth(&a_token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["deleted_count"], 0);

    // Everything the caller ever sent, across conversations.
    post_message_ok(&client, &base_url, &a_token, bob.id, "again").await;
    post_message_ok(&client, &base_url, &b_token, alice.id, "kept").await;

    let resp = client
        .delete(format!("{base_url}/api/messages/user/all"))
        .bearer_auth(&a_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["deleted_count"], 1);

    // Bob's message to alice survives.
    let body: Value = client
        .get(format!("{base_url}/api/messages/conversation/{}", bob.id))
        .bearer_auth(&a_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["count"], 1);
    assert_eq!(body["messages"][0]["content"], "kept");
}

#[tokio::test]
async fn test_send_rate_limit_returns_429_under_burst() {
    let (base_url, _addr, store, secret) = start_test_server().await;
    let alice = seed_user(&store, "alice").await;
    let bob = seed_user(&store, "bob").await;

    let client = reqwest::Client::new();
    let a_token = mint_token(&secret, alice.id);

    let mut created = 0;
    let mut limited = 0;
    for i in 0..40 {
        let resp =
            post_message(&client, &base_url, &a_token, bob.id, &format!("burst {i}")).await;
        match resp.status().as_u16() {
            201 => created += 1,
            429 => limited += 1,
            other => panic!("Unexpected status {other}"),
        }
    }

    // The first requests fit the burst allowance; the tail is limited.
    assert!(created >= 30, "Expected the burst to be accepted, got {created}");
    assert!(limited > 0, "Expected the tail to be rate limited");

    // Reads are not subject to the send limiter.
    let resp = client
        .get(format!("{base_url}/api/messages/unread-count"))
        .bearer_auth(&a_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_health_and_user_directory() {
    let (base_url, _addr, store, secret) = start_test_server().await;
    let alice = seed_user(&store, "alice").await;
    let bob = seed_user(&store, "bob").await;

    let client = reqwest::Client::new();

    // Health is unauthenticated.
    let resp = client.get(format!("{base_url}/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "ok");

    // The listing excludes the caller.
    let a_token = mint_token(&secret, alice.id);
    let body: Value = client
        .get(format!("{base_url}/api/users"))
        .bearer_auth(&a_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let users = body["users"].as_array().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["id"].as_i64().unwrap(), bob.id);
    assert_eq!(users[0]["username"], "bob");

    // Single-user lookup.
    let resp = client
        .get(format!("{base_url}/api/users/{}", bob.id))
        .bearer_auth(&a_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["username"], "bob");

    let resp = client
        .get(format!("{base_url}/api/users/404404"))
        .bearer_auth(&a_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["message"], "user 404404 not found");
}
