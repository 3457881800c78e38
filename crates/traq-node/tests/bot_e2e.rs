//! End-to-end tests for bot registration and event delivery.

mod common;

use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use common::{Auth, TestNode};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A bot endpoint that answers pings by echoing the verification token and
/// fails every message event.
async fn flaky_endpoint() -> (String, Arc<AtomicUsize>) {
    let failures = Arc::new(AtomicUsize::new(0));
    let counter = failures.clone();
    let app = Router::new().route(
        "/bot",
        post(move |headers: HeaderMap| {
            let counter = counter.clone();
            async move {
                let mut reply = HeaderMap::new();
                match headers.get("x-traq-bot-event").and_then(|v| v.to_str().ok()) {
                    Some("MESSAGE_CREATED") => {
                        counter.fetch_add(1, Ordering::SeqCst);
                        (StatusCode::INTERNAL_SERVER_ERROR, reply)
                    }
                    _ => {
                        if let Some(token) = headers.get("x-traq-bot-token") {
                            reply.insert("x-traq-bot-token", token.clone());
                        }
                        (StatusCode::NO_CONTENT, reply)
                    }
                }
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/bot"), failures)
}

async fn create_bot(node: &TestNode, auth: &Auth, endpoint: &str) -> Value {
    let (status, body) = node
        .post(
            "/api/v3/bots",
            auth,
            json!({
                "name": "echo",
                "displayName": "Echo",
                "description": "repeats things",
                "endpoint": endpoint,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body
}

#[tokio::test]
async fn test_failing_bot_is_paused() {
    let node = TestNode::start();
    let (_, alice) = node.user("alice");
    let (url, failures) = flaky_endpoint().await;
    let id = node.channel("general").await;

    let bot = create_bot(&node, &alice, &url).await;
    assert_eq!(bot["state"], "paused");
    let bot_id = bot["id"].as_str().unwrap().to_string();
    let code = bot["tokens"]["botCode"].as_str().unwrap();
    assert!(!bot["tokens"]["verificationToken"].as_str().unwrap().is_empty());

    let (status, _) = node
        .post(&format!("/api/v3/channels/{}/bots", id), &alice, json!({ "code": code }))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = node
        .call(
            "PUT",
            &format!("/api/v3/bots/{}/events", bot_id),
            &alice,
            Some(json!({ "events": ["MESSAGE_CREATED"] })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = node
        .call(
            "PUT",
            &format!("/api/v3/bots/{}/state", bot_id),
            &alice,
            Some(json!({ "state": "active" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["state"], "active");

    for i in 0..3 {
        let (status, _) = node
            .post(
                &format!("/api/v3/channels/{}/messages", id),
                &alice,
                json!({ "content": format!("ping {}", i) }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let bot_uri = format!("/api/v3/bots/{}", bot_id);
    let (test, uri, auth) = (&node, bot_uri.as_str(), &alice);
    let paused = common::eventually(|| async move {
        let (_, body) = test.get(uri, auth).await;
        body["state"] == "paused"
    })
    .await;
    assert!(paused);
    assert_eq!(failures.load(Ordering::SeqCst), 3);

    let (_, logs) = node
        .get(&format!("/api/v3/bots/{}/events/logs", bot_id), &alice)
        .await;
    let failed: Vec<&Value> = logs
        .as_array()
        .unwrap()
        .iter()
        .filter(|log| log["event"] == "MESSAGE_CREATED")
        .collect();
    assert_eq!(failed.len(), 3);
    assert!(failed.iter().all(|log| log["result"] == "ng" && log["code"] == 500));
    assert!(logs
        .as_array()
        .unwrap()
        .iter()
        .any(|log| log["event"] == "PING" && log["result"] == "ok"));

    node.stop().await;
}

#[tokio::test]
async fn test_bot_settings() {
    let node = TestNode::start();
    let (_, alice) = node.user("alice");
    let (_, bob) = node.user("bob");
    let bot = create_bot(&node, &alice, "https://bot.example.com/events").await;
    let bot_id = bot["id"].as_str().unwrap().to_string();

    let (status, _) = node
        .call(
            "PUT",
            &format!("/api/v3/bots/{}/events", bot_id),
            &alice,
            Some(json!({ "events": ["MESSAGE_CREATED", "NOT_AN_EVENT"] })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Only the creator manages the bot.
    let (status, _) = node
        .get(&format!("/api/v3/bots/{}/tokens", bot_id), &bob)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = node
        .call(
            "PATCH",
            &format!("/api/v3/bots/{}", bot_id),
            &alice,
            Some(json!({ "privileged": true })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, tokens) = node
        .call("POST", &format!("/api/v3/bots/{}/reissue", bot_id), &alice, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(tokens["botCode"], bot["tokens"]["botCode"]);

    // The original access token was revoked by the reissue.
    let old = Auth::Bearer(bot["tokens"]["accessToken"].as_str().unwrap().to_string());
    let (status, _) = node.get("/api/v3/users/me", &old).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let fresh = Auth::Bearer(tokens["accessToken"].as_str().unwrap().to_string());
    let (status, me) = node.get("/api/v3/users/me", &fresh).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["name"], "BOT_echo");

    let (status, _) = node
        .call("DELETE", &format!("/api/v3/bots/{}", bot_id), &alice, None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = node.get(&format!("/api/v3/bots/{}", bot_id), &alice).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    node.stop().await;
}

#[tokio::test]
async fn test_bot_rejects_bad_registration() {
    let node = TestNode::start();
    let (_, alice) = node.user("alice");

    let (status, _) = node
        .post(
            "/api/v3/bots",
            &alice,
            json!({ "name": "x", "endpoint": "not a url" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let id = node.channel("general").await;
    let (status, _) = node
        .post(&format!("/api/v3/channels/{}/bots", id), &alice, json!({ "code": "nope" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    node.stop().await;
}
