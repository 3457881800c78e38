//! End-to-end tests for login, registration and account status.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{Auth, TestNode, ADMIN_PASSWORD};
use serde_json::json;
use traq_node::node::ADMIN_USER_NAME;

#[tokio::test]
async fn test_login_and_logout() {
    let node = TestNode::start();

    let session = node.login(ADMIN_USER_NAME, ADMIN_PASSWORD).await;
    let (status, me) = node.get("/api/v3/users/me", &session).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["name"], ADMIN_USER_NAME);
    assert_eq!(me["role"], "admin");
    assert!(me.get("password_hash").is_none());

    let Auth::Cookie(cookie) = &session else {
        unreachable!()
    };
    let request = Request::builder()
        .method("POST")
        .uri("/api/v3/logout")
        .header(header::COOKIE, cookie.as_str())
        .body(Body::empty())
        .unwrap();
    assert_eq!(node.send(request).await.status(), StatusCode::NO_CONTENT);

    let (status, _) = node.get("/api/v3/users/me", &session).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = node
        .post(
            "/api/v3/login",
            &Auth::None,
            json!({ "name": ADMIN_USER_NAME, "password": "wrong" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    node.stop().await;
}

#[tokio::test]
async fn test_admin_registers_users() {
    let node = TestNode::start();
    let (_, alice) = node.user("alice");

    let request = json!({ "name": "bob", "displayName": "Bob", "password": "hunter22" });
    let (status, _) = node.post("/api/v3/users", &alice, request.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, bob) = node.post("/api/v3/users", &node.admin_auth, request.clone()).await;
    assert_eq!(status, StatusCode::CREATED, "{bob}");
    assert_eq!(bob["display_name"], "Bob");
    assert_eq!(bob["status"], "active");

    let (status, _) = node.post("/api/v3/users", &node.admin_auth, request).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let session = node.login("bob", "hunter22").await;
    let (status, me) = node.get("/api/v3/users/me", &session).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], bob["id"]);

    node.stop().await;
}

#[tokio::test]
async fn test_registration_validation() {
    let node = TestNode::start();

    let (status, body) = node
        .post(
            "/api/v3/users",
            &node.admin_auth,
            json!({ "name": "all", "password": "ab" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
    let details = body["details"].as_array().unwrap();
    assert_eq!(details.len(), 2);
    assert_eq!(details[0]["field"], "name");
    assert_eq!(details[0]["code"], "reserved");
    assert_eq!(details[1]["field"], "password");
    assert_eq!(details[1]["code"], "length");

    let (status, body) = node
        .post(
            "/api/v3/users",
            &node.admin_auth,
            json!({ "name": "has space", "password": "long enough" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"][0]["code"], "pattern");

    node.stop().await;
}

#[tokio::test]
async fn test_deactivated_user_is_locked_out() {
    let node = TestNode::start();
    let (alice, alice_auth) = node.user("alice");
    let uri = format!("/api/v3/users/{}/status", alice.id);

    let (status, _) = node
        .call("PATCH", &uri, &alice_auth, Some(json!({ "status": "deactivated" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = node
        .call("PATCH", &uri, &node.admin_auth, Some(json!({ "status": "asleep" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = node
        .call("PATCH", &uri, &node.admin_auth, Some(json!({ "status": "deactivated" })))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = node.get("/api/v3/users/me", &alice_auth).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Deactivated users drop out of the default listing.
    let (_, users) = node.get("/api/v3/users", &node.admin_auth).await;
    assert!(!users.as_array().unwrap().iter().any(|u| u["name"] == "alice"));
    let (_, users) = node
        .get("/api/v3/users?include-suspended=true", &node.admin_auth)
        .await;
    assert!(users.as_array().unwrap().iter().any(|u| u["name"] == "alice"));

    // Administrators cannot lock themselves out.
    let (status, _) = node
        .call(
            "PATCH",
            &format!("/api/v3/users/{}/status", node.admin.id),
            &node.admin_auth,
            Some(json!({ "status": "suspended" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    node.stop().await;
}

#[tokio::test]
async fn test_tags_and_groups() {
    let node = TestNode::start();
    let (alice, alice_auth) = node.user("alice");
    let (bob, bob_auth) = node.user("bob");

    let (status, tag) = node
        .post(
            &format!("/api/v3/users/{}/tags", alice.id),
            &alice_auth,
            json!({ "tag": "rustacean" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(tag["tag"], "rustacean");
    let (_, tags) = node
        .get(&format!("/api/v3/users/{}/tags", alice.id), &bob_auth)
        .await;
    assert_eq!(tags[0]["tagId"], tag["tagId"]);

    let (status, group) = node
        .post("/api/v3/groups", &alice_auth, json!({ "name": "infra" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let group_id = group["id"].as_str().unwrap();

    let members = format!("/api/v3/groups/{}/members", group_id);
    let (status, _) = node.post(&members, &bob_auth, json!({ "id": bob.id })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = node.post(&members, &alice_auth, json!({ "id": bob.id })).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, detail) = node.get(&format!("/api/v3/users/{}", bob.id), &alice_auth).await;
    assert_eq!(detail["groups"], json!([group_id]));

    node.stop().await;
}
