//! Outbound HTTP delivery.

use crate::error::BotError;
use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, redirect, Client};
use std::time::Duration;
use traq_types::BotEventType;
use uuid::Uuid;

pub const HEADER_BOT_EVENT: &str = "X-TRAQ-BOT-EVENT";
pub const HEADER_BOT_REQUEST_ID: &str = "X-TRAQ-BOT-REQUEST-ID";
pub const HEADER_BOT_TOKEN: &str = "X-TRAQ-BOT-TOKEN";
pub const USER_AGENT: &str = "traQ_Bot_Processor/1.0";

/// One POST to a bot's endpoint.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub url: String,
    pub event: BotEventType,
    pub request_id: Uuid,
    pub verification_token: String,
    pub body: Bytes,
}

/// What came back from the bot's endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// An HTTP response. `token` is the `X-TRAQ-BOT-TOKEN` value the bot
    /// echoed back, if any.
    Response { status: u16, token: Option<String> },
    /// No response: connection failure, timeout or invalid URL.
    Failed(String),
}

impl SendOutcome {
    /// A response with `status` and no echoed token.
    pub fn status(status: u16) -> Self {
        SendOutcome::Response {
            status,
            token: None,
        }
    }
}

/// Transport used by the dispatcher.
#[async_trait]
pub trait EventSender: Send + Sync + 'static {
    async fn send(&self, request: DeliveryRequest) -> SendOutcome;
}

/// [`EventSender`] over HTTP. Redirects are not followed.
pub struct HttpSender {
    client: Client,
}

impl HttpSender {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| BotError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl EventSender for HttpSender {
    async fn send(&self, request: DeliveryRequest) -> SendOutcome {
        let result = self
            .client
            .post(&request.url)
            .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
            .header(HEADER_BOT_EVENT, request.event.as_str())
            .header(HEADER_BOT_REQUEST_ID, request.request_id.to_string())
            .header(HEADER_BOT_TOKEN, request.verification_token.as_str())
            .body(request.body)
            .send()
            .await;
        match result {
            Ok(response) => SendOutcome::Response {
                status: response.status().as_u16(),
                token: response
                    .headers()
                    .get(HEADER_BOT_TOKEN)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string),
            },
            Err(e) => SendOutcome::Failed(e.to_string()),
        }
    }
}
