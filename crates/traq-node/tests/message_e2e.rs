//! End-to-end tests for messages, pins, stamps and clips.

mod common;

use axum::http::StatusCode;
use common::TestNode;
use serde_json::json;
use traq_repository::{MessageRepository, UserRepository};
use traq_types::User;

#[tokio::test]
async fn test_forced_channel_marks_everyone_unread() {
    let node = TestNode::start();
    let mut humans = Vec::new();
    let mut bot = None;
    for i in 1..=100 {
        let name = format!("u{}", i);
        if i == 3 {
            bot = Some(node.repo.create_user(User::new_bot(format!("BOT_{}", name), &name)).unwrap());
        } else {
            humans.push(node.repo.create_user(User::new(&name, &name, String::new())).unwrap());
        }
    }
    let bot = bot.unwrap();
    let author = humans[0].clone();
    let author_auth = node.bearer(&author);

    let id = node.channel("general").await;
    let (status, _) = node
        .call(
            "PATCH",
            &format!("/api/v3/channels/{}", id),
            &node.admin_auth,
            Some(json!({ "force": true })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, message) = node
        .post(
            &format!("/api/v3/channels/{}/messages", id),
            &author_auth,
            json!({ "content": "everyone, please read" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let message_id = message["id"].as_str().unwrap().to_string();

    let mut expected: Vec<_> = humans.iter().skip(1).map(|u| u.id).collect();
    expected.push(node.admin.id);
    let repo = node.repo.clone();
    assert!(common::eventually(|| {
        let repo = repo.clone();
        let expected = expected.clone();
        async move { expected.iter().all(|id| repo.get_unreads(*id).len() == 1) }
    })
    .await);

    // 98 humans other than the author, plus the administrator.
    let mut marked = 0;
    for user in humans.iter().skip(1).chain(std::iter::once(&node.admin)) {
        let unreads = node.repo.get_unreads(user.id);
        assert_eq!(unreads.len(), 1, "user {} has no unread", user.name);
        assert_eq!(unreads[0].message_id.to_string(), message_id);
        marked += 1;
    }
    assert_eq!(marked, 99);
    assert!(node.repo.get_unreads(author.id).is_empty());
    assert!(node.repo.get_unreads(bot.id).is_empty());

    node.stop().await;
}

#[tokio::test]
async fn test_message_lifecycle() {
    let node = TestNode::start();
    let (_, alice) = node.user("alice");
    let (_, bob) = node.user("bob");
    let id = node.channel("general").await;

    let mut ids = Vec::new();
    for i in 0..3 {
        let (status, body) = node
            .post(
                &format!("/api/v3/channels/{}/messages", id),
                &alice,
                json!({ "content": format!("message {}", i) }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        ids.push(body["id"].as_str().unwrap().to_string());
    }

    let (_, body) = node
        .get(&format!("/api/v3/channels/{}/messages?limit=2", id), &bob)
        .await;
    let page = body.as_array().unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0]["text"], "message 2");

    let (status, _) = node
        .call(
            "PUT",
            &format!("/api/v3/messages/{}", ids[0]),
            &bob,
            Some(json!({ "content": "hijacked" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = node
        .call(
            "PUT",
            &format!("/api/v3/messages/{}", ids[0]),
            &alice,
            Some(json!({ "content": "edited" })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = node.get(&format!("/api/v3/messages/{}", ids[0]), &bob).await;
    assert_eq!(body["text"], "edited");

    let (status, _) = node
        .post(
            &format!("/api/v3/channels/{}/messages", id),
            &alice,
            json!({ "content": "   " }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = node
        .call("DELETE", &format!("/api/v3/messages/{}", ids[1]), &alice, None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = node.get(&format!("/api/v3/messages/{}", ids[1]), &alice).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    node.stop().await;
}

#[tokio::test]
async fn test_private_messages_are_hidden() {
    let node = TestNode::start();
    let (alice_user, alice) = node.user("alice");
    let (_, bob) = node.user("bob");

    let (_, channel) = node
        .post(
            "/api/v3/channels",
            &alice,
            json!({ "name": "secret", "private": true, "members": [alice_user.id] }),
        )
        .await;
    let id = channel["id"].as_str().unwrap();

    let (status, message) = node
        .post(
            &format!("/api/v3/channels/{}/messages", id),
            &alice,
            json!({ "content": "between us" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = node
        .get(&format!("/api/v3/messages/{}", message["id"].as_str().unwrap()), &bob)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = node
        .post(
            &format!("/api/v3/channels/{}/messages", id),
            &bob,
            json!({ "content": "let me in" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, latest) = node.get("/api/v3/activity/latest-messages", &bob).await;
    assert!(latest.as_array().unwrap().is_empty());

    node.stop().await;
}

#[tokio::test]
async fn test_pinning_twice_returns_same_pin() {
    let node = TestNode::start();
    let (_, alice) = node.user("alice");
    let id = node.channel("general").await;
    let (_, message) = node
        .post(
            &format!("/api/v3/channels/{}/messages", id),
            &alice,
            json!({ "content": "pin me" }),
        )
        .await;
    let message_id = message["id"].as_str().unwrap();

    let (status, first) = node
        .post("/api/v3/pins", &alice, json!({ "messageId": message_id }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, second) = node
        .post("/api/v3/pins", &node.admin_auth, json!({ "messageId": message_id }))
        .await;
    assert_eq!(first["id"], second["id"]);

    let (_, pins) = node.get(&format!("/api/v3/channels/{}/pins", id), &alice).await;
    assert_eq!(pins.as_array().unwrap().len(), 1);

    let pin_id = first["id"].as_str().unwrap();
    let (status, _) = node
        .call("DELETE", &format!("/api/v3/pins/{}", pin_id), &alice, None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = node.get(&format!("/api/v3/pins/{}", pin_id), &alice).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    node.stop().await;
}

#[tokio::test]
async fn test_stamps() {
    let node = TestNode::start();
    let (alice_user, alice) = node.user("alice");
    let (_, bob) = node.user("bob");
    let id = node.channel("general").await;
    let (_, message) = node
        .post(
            &format!("/api/v3/channels/{}/messages", id),
            &alice,
            json!({ "content": "nice" }),
        )
        .await;
    let message_id = message["id"].as_str().unwrap();

    let (status, _) = node
        .post("/api/v3/stamps", &alice, json!({ "name": "bad name" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, stamp) = node
        .post("/api/v3/stamps", &alice, json!({ "name": "good" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let stamp_id = stamp["id"].as_str().unwrap();
    let (status, _) = node
        .post("/api/v3/stamps", &bob, json!({ "name": "good" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let uri = format!("/api/v3/messages/{}/stamps/{}", message_id, stamp_id);
    let (status, _) = node.call("POST", &uri, &alice, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = node.post(&uri, &alice, json!({ "count": 4 })).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = node.post(&uri, &alice, json!({ "count": 0 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, stamps) = node
        .get(&format!("/api/v3/messages/{}/stamps", message_id), &bob)
        .await;
    let stamps = stamps.as_array().unwrap();
    assert_eq!(stamps.len(), 1);
    assert_eq!(stamps[0]["count"], 5);
    assert_eq!(stamps[0]["user_id"], alice_user.id.to_string());

    let (_, history) = node.get("/api/v3/users/me/stamp-history", &alice).await;
    assert_eq!(history[0]["stampId"], stamp_id);

    let (status, _) = node.call("DELETE", &uri, &alice, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, stamps) = node
        .get(&format!("/api/v3/messages/{}/stamps", message_id), &bob)
        .await;
    assert!(stamps.as_array().unwrap().is_empty());

    // Only the creator may rename or delete a stamp.
    let (status, _) = node
        .call(
            "PATCH",
            &format!("/api/v3/stamps/{}", stamp_id),
            &bob,
            Some(json!({ "name": "mine" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = node
        .call("DELETE", &format!("/api/v3/stamps/{}", stamp_id), &alice, None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    node.stop().await;
}

#[tokio::test]
async fn test_clip_folders() {
    let node = TestNode::start();
    let (_, alice) = node.user("alice");
    let (_, bob) = node.user("bob");
    let id = node.channel("general").await;
    let (_, message) = node
        .post(
            &format!("/api/v3/channels/{}/messages", id),
            &bob,
            json!({ "content": "worth keeping" }),
        )
        .await;
    let message_id = message["id"].as_str().unwrap();

    let (status, folder) = node
        .post(
            "/api/v3/clip-folders",
            &alice,
            json!({ "name": "favorites", "description": "good stuff" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let folder_id = folder["id"].as_str().unwrap();

    let (status, _) = node
        .post(
            &format!("/api/v3/clip-folders/{}/messages", folder_id),
            &alice,
            json!({ "messageId": message_id }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, clipped) = node
        .get(&format!("/api/v3/clip-folders/{}/messages", folder_id), &alice)
        .await;
    assert_eq!(clipped[0]["message_id"], message_id);

    // Folders are private to their owner.
    let (status, _) = node
        .get(&format!("/api/v3/clip-folders/{}", folder_id), &bob)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = node
        .call(
            "DELETE",
            &format!("/api/v3/clip-folders/{}/messages/{}", folder_id, message_id),
            &alice,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = node
        .call("DELETE", &format!("/api/v3/clip-folders/{}", folder_id), &alice, None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, folders) = node.get("/api/v3/clip-folders", &alice).await;
    assert!(folders.as_array().unwrap().is_empty());

    node.stop().await;
}
