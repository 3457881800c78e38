//! End-to-end tests for the event stream, heartbeats and WebRTC state.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{Auth, TestNode};
use futures::{Stream, StreamExt};
use serde_json::json;
use std::time::Duration;
use traq_repository::{MessageRepository, UserRepository};

fn stream_request(auth: &Auth) -> Request<Body> {
    let Auth::Bearer(token) = auth else {
        panic!("stream tests use bearer tokens");
    };
    Request::builder()
        .uri("/api/v3/notification")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

/// Read frames until one names `event`, returning it.
async fn next_event<S, E>(stream: &mut S, event: &str) -> String
where
    S: Stream<Item = Result<axum::body::Bytes, E>> + Unpin,
    E: std::fmt::Debug,
{
    let wanted = format!("event: {}\n", event);
    let read = async {
        let mut buffer = String::new();
        while let Some(chunk) = stream.next().await {
            buffer.push_str(&String::from_utf8_lossy(&chunk.unwrap()));
            while let Some(end) = buffer.find("\n\n") {
                let frame: String = buffer.drain(..end + 2).collect();
                if frame.starts_with(&wanted) {
                    return frame;
                }
            }
        }
        panic!("stream ended before {}", event);
    };
    tokio::time::timeout(Duration::from_secs(5), read)
        .await
        .expect("timed out waiting for event")
}

#[tokio::test]
async fn test_stamp_created_reaches_every_stream() {
    let node = TestNode::start();
    let (_, alice) = node.user("alice");
    let (_, bob) = node.user("bob");

    let first = node.send(stream_request(&alice)).await;
    assert_eq!(first.status(), StatusCode::OK);
    let headers = first.headers();
    assert_eq!(headers[header::CONTENT_TYPE], "text/event-stream");
    assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
    assert_eq!(headers[header::CONNECTION], "keep-alive");
    assert_eq!(headers["x-accel-buffering"], "no");
    let second = node.send(stream_request(&bob)).await;
    let mut first = first.into_body().into_data_stream();
    let mut second = second.into_body().into_data_stream();

    let (status, stamp) = node.post("/api/v3/stamps", &alice, json!({ "name": "wave" })).await;
    assert_eq!(status, StatusCode::CREATED);
    let expected = format!(
        "event: STAMP_CREATED\ndata: {}\n\n",
        json!({ "id": stamp["id"] })
    );

    assert_eq!(next_event(&mut first, "STAMP_CREATED").await, expected);
    assert_eq!(next_event(&mut second, "STAMP_CREATED").await, expected);

    drop(first);
    drop(second);
    node.stop().await;
}

#[tokio::test]
async fn test_message_created_reaches_notify_subscribers() {
    let node = TestNode::start();
    let (_, alice) = node.user("alice");
    let (_, bob) = node.user("bob");
    let id = node.channel("general").await;

    node.call(
        "PUT",
        &format!("/api/v3/users/me/subscriptions/{}", id),
        &bob,
        Some(json!({ "mark": true, "notify": true })),
    )
    .await;
    let response = node.send(stream_request(&bob)).await;
    let mut stream = response.into_body().into_data_stream();

    let (_, message) = node
        .post(
            &format!("/api/v3/channels/{}/messages", id),
            &alice,
            json!({ "content": "hello bob" }),
        )
        .await;

    let frame = next_event(&mut stream, "MESSAGE_CREATED").await;
    assert!(frame.contains(message["id"].as_str().unwrap()));

    drop(stream);
    node.stop().await;
}

#[tokio::test]
async fn test_stream_requires_login() {
    let node = TestNode::start();
    let (status, _) = node.get("/api/v3/notification", &Auth::None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    node.stop().await;
}

#[tokio::test]
async fn test_heartbeat() {
    let node = TestNode::start();
    let (alice_user, alice) = node.user("alice");
    let (_, bob) = node.user("bob");
    let id = node.channel("general").await;

    let (status, body) = node
        .post(
            "/api/v3/heartbeat",
            &alice,
            json!({ "channelId": id, "status": "viewing" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["channelId"], id.as_str());
    assert_eq!(body["userStatuses"][0]["userId"], alice_user.id.to_string());
    assert_eq!(body["userStatuses"][0]["status"], "viewing");

    let (status, _) = node
        .post(
            "/api/v3/heartbeat",
            &bob,
            json!({ "channelId": id, "status": "dancing" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = node
        .get(&format!("/api/v3/heartbeat?channelId={}", id), &bob)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["userStatuses"].as_array().unwrap().len(), 1);

    let (_, viewers) = node.get(&format!("/api/v3/channels/{}/viewers", id), &bob).await;
    assert_eq!(viewers[0]["state"], "viewing");

    node.stop().await;
}

#[tokio::test]
async fn test_viewing_user_gets_no_unread() {
    let node = TestNode::start();
    let (alice_user, alice) = node.user("alice");
    let (bob_user, bob) = node.user("bob");
    let (carol_user, carol) = node.user("carol");
    let id = node.channel("general").await;

    for auth in [&bob, &carol] {
        node.call(
            "PUT",
            &format!("/api/v3/users/me/subscriptions/{}", id),
            auth,
            Some(json!({ "mark": true, "notify": true })),
        )
        .await;
    }
    node.post(
        "/api/v3/heartbeat",
        &bob,
        json!({ "channelId": id, "status": "viewing" }),
    )
    .await;

    node.post(
        &format!("/api/v3/channels/{}/messages", id),
        &alice,
        json!({ "content": "hi all" }),
    )
    .await;

    let carol_id = carol_user.id;
    let repo = node.repo.clone();
    assert!(common::eventually(|| {
        let repo = repo.clone();
        async move { repo.get_unreads(carol_id).len() == 1 }
    })
    .await);
    assert!(node.repo.get_unreads(bob_user.id).is_empty());
    assert!(node.repo.get_unreads(alice_user.id).is_empty());

    node.stop().await;
}

#[tokio::test]
async fn test_webrtc_state() {
    let node = TestNode::start();
    let (alice_user, alice) = node.user("alice");
    let id = node.channel("voice").await;

    let response = node.send(stream_request(&alice)).await;
    let stream = response.into_body().into_data_stream();

    let uri = "/api/v3/webrtc/state";
    let (status, _) = node
        .call(
            "PUT",
            uri,
            &alice,
            Some(json!({ "channelId": id, "state": ["joined", "joined", "muted"] })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, states) = node.get(uri, &alice).await;
    assert_eq!(
        states,
        json!([{ "userId": alice_user.id, "channelId": id, "states": ["joined", "muted"] }])
    );

    let (status, _) = node
        .call(
            "PUT",
            uri,
            &alice,
            Some(json!({ "channelId": id, "state": [""] })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Closing the user's last stream clears their state.
    drop(stream);
    let webrtc = node.node.state().webrtc.clone();
    assert!(common::eventually(|| {
        let webrtc = webrtc.clone();
        async move { webrtc.all().is_empty() }
    })
    .await);

    node.stop().await;
}

#[tokio::test]
async fn test_register_device() {
    let node = TestNode::start();
    let (alice_user, alice) = node.user("alice");

    let (status, _) = node
        .post("/api/v3/notification/device", &alice, json!({ "token": "device-1" }))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert_eq!(node.repo.get_device_tokens(&[alice_user.id]), vec!["device-1".to_string()]);

    node.stop().await;
}
