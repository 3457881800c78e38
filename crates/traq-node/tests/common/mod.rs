//! Shared harness for the end-to-end tests.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use traq_node::config::Config;
use traq_node::node::{Node, ADMIN_USER_NAME};
use traq_repository::{MemoryRepository, Repository, UserRepository};
use traq_types::{AccessScopes, User};

/// Password of the bootstrap administrator in the default configuration.
pub const ADMIN_PASSWORD: &str = "traq";

/// How a request authenticates.
#[derive(Debug, Clone)]
pub enum Auth {
    None,
    Bearer(String),
    Cookie(String),
}

pub struct TestNode {
    pub node: Node,
    pub repo: Arc<MemoryRepository>,
    pub app: Router,
    pub admin: User,
    pub admin_auth: Auth,
}

impl TestNode {
    pub fn start() -> Self {
        Self::start_with(Config::default())
    }

    pub fn start_with(config: Config) -> Self {
        let repo = Arc::new(MemoryRepository::new());
        let shared: Arc<dyn Repository> = repo.clone();
        let node = Node::start(&config, shared, CancellationToken::new()).unwrap();
        let app = node.router();
        let admin = repo.get_user_by_name(ADMIN_USER_NAME).unwrap();
        let mut test = Self {
            node,
            repo,
            app,
            admin: admin.clone(),
            admin_auth: Auth::None,
        };
        test.admin_auth = test.bearer(&admin);
        test
    }

    /// A bearer token for `user`, issued without going through a client.
    pub fn bearer(&self, user: &User) -> Auth {
        let token = self
            .node
            .state()
            .oauth2
            .issue_internal_token(user.id, AccessScopes::new())
            .unwrap();
        Auth::Bearer(token.access_token)
    }

    /// A session cookie for `user`, as if they had logged in.
    pub fn session(&self, user: &User) -> Auth {
        let session = self.node.state().sessions.create(user.id);
        Auth::Cookie(format!("r_session={}", session.token))
    }

    /// Create an active user directly in the repository.
    pub fn user(&self, name: &str) -> (User, Auth) {
        let user = self
            .repo
            .create_user(User::new(name, name, String::new()))
            .unwrap();
        let auth = self.bearer(&user);
        (user, auth)
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn call(
        &self,
        method: &str,
        uri: &str,
        auth: &Auth,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        builder = with_auth(builder, auth);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.send(request).await;
        let status = response.status();
        (status, json_body(response).await)
    }

    pub async fn get(&self, uri: &str, auth: &Auth) -> (StatusCode, Value) {
        self.call("GET", uri, auth, None).await
    }

    pub async fn post(&self, uri: &str, auth: &Auth, body: Value) -> (StatusCode, Value) {
        self.call("POST", uri, auth, Some(body)).await
    }

    /// POST an `application/x-www-form-urlencoded` body.
    pub async fn post_form(&self, uri: &str, auth: &Auth, form: &[(&str, &str)]) -> Response {
        let body: String = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(form)
            .finish();
        let request = with_auth(Request::builder().method("POST").uri(uri), auth)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    /// Log in through the API and return the session cookie.
    pub async fn login(&self, name: &str, password: &str) -> Auth {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v3/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                serde_json::json!({ "name": name, "password": password }).to_string(),
            ))
            .unwrap();
        let response = self.send(request).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .unwrap()
            .to_string();
        Auth::Cookie(cookie)
    }

    /// Create a public top-level channel as the administrator.
    pub async fn channel(&self, name: &str) -> String {
        let (status, body) = self
            .post("/api/v3/channels", &self.admin_auth, serde_json::json!({ "name": name }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }

    pub async fn stop(self) {
        self.node.stop().await;
    }
}

fn with_auth(builder: axum::http::request::Builder, auth: &Auth) -> axum::http::request::Builder {
    match auth {
        Auth::None => builder,
        Auth::Bearer(token) => builder.header(header::AUTHORIZATION, format!("Bearer {}", token)),
        Auth::Cookie(cookie) => builder.header(header::COOKIE, cookie.as_str()),
    }
}

/// Decode a JSON response body. Empty bodies become `null`.
pub async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
}

/// Poll `check` until it holds or five seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
