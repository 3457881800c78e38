//! Single-delivery execution: send, log, and track consecutive failures.

use crate::metrics::BotMetrics;
use crate::sender::{DeliveryRequest, EventSender, SendOutcome};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};
use traq_repository::{BotRepository, Repository};
use traq_types::{Bot, BotDeliveryResult, BotEventLog, BotEventType, BotState, Timestamp};
use uuid::Uuid;

/// Longest body kept in a delivery log.
pub const MAX_LOG_BODY: usize = 2 * 1024;
/// Longest error message kept in a delivery log.
pub const MAX_LOG_ERROR: usize = 512;

/// Bot engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Number of delivery workers.
    pub workers: usize,
    /// Per-delivery timeout in seconds.
    pub timeout_secs: u64,
    /// Consecutive failures after which a bot is paused.
    pub pause_threshold: u32,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            timeout_secs: 10,
            pause_threshold: 3,
        }
    }
}

pub struct Dispatcher {
    repo: Arc<dyn Repository>,
    sender: Arc<dyn EventSender>,
    metrics: BotMetrics,
    pause_threshold: u32,
}

impl Dispatcher {
    pub fn new(
        repo: Arc<dyn Repository>,
        sender: Arc<dyn EventSender>,
        metrics: BotMetrics,
        pause_threshold: u32,
    ) -> Self {
        Self {
            repo,
            sender,
            metrics,
            pause_threshold: pause_threshold.max(1),
        }
    }

    /// POST `body` to the bot and record the attempt. Does not touch the
    /// bot's state. A `PING` only counts as delivered when the reply echoes
    /// the bot's verification token.
    pub async fn send(&self, bot: &Bot, event: BotEventType, body: Bytes) -> BotDeliveryResult {
        let request_id = Uuid::new_v4();
        let started = Instant::now();
        let outcome = self
            .sender
            .send(DeliveryRequest {
                url: bot.post_url.clone(),
                event,
                request_id,
                verification_token: bot.verification_token.clone(),
                body: body.clone(),
            })
            .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let (result, code, err) = match outcome {
            SendOutcome::Response { status: 204, token }
                if event != BotEventType::Ping
                    || token.as_deref() == Some(bot.verification_token.as_str()) =>
            {
                (BotDeliveryResult::Ok, 204, String::new())
            }
            SendOutcome::Response { status: 204, .. } => (
                BotDeliveryResult::Ng,
                204,
                "verification token was not echoed".to_string(),
            ),
            SendOutcome::Response { status, .. } => {
                (BotDeliveryResult::Ng, i32::from(status), String::new())
            }
            SendOutcome::Failed(e) => (BotDeliveryResult::Ne, -1, e),
        };
        self.metrics.record(result);
        debug!(
            bot_id = %bot.id,
            event = %event,
            request_id = %request_id,
            code,
            latency_ms,
            result = %result,
            "Bot event sent"
        );

        self.repo.record_bot_event_log(BotEventLog {
            request_id,
            bot_id: bot.id,
            event,
            body: truncate(&String::from_utf8_lossy(&body), MAX_LOG_BODY),
            error: truncate(&err, MAX_LOG_ERROR),
            code,
            latency_ms,
            result,
            date_time: Timestamp::now(),
        });
        result
    }

    /// Deliver an event to the bot's current record. Bots that are no
    /// longer active are skipped and yield `None`. The outcome feeds the
    /// consecutive-failure counter.
    pub async fn deliver(&self, bot_id: Uuid, event: BotEventType, body: Bytes) -> Option<BotDeliveryResult> {
        let bot = match self.repo.get_bot(bot_id) {
            Ok(bot) if bot.state == BotState::Active => bot,
            Ok(_) => return None,
            Err(e) => {
                debug!(bot_id = %bot_id, error = %e, "Dropping delivery for missing bot");
                return None;
            }
        };
        let result = self.send(&bot, event, body).await;
        self.track(bot_id, result);
        Some(result)
    }

    /// Reset the counter on success; pause the bot once the counter reaches
    /// the threshold.
    fn track(&self, bot_id: Uuid, result: BotDeliveryResult) {
        let threshold = self.pause_threshold;
        let mut paused = false;
        let updated = self.repo.modify_bot(bot_id, &mut |bot: &mut Bot| {
            if result == BotDeliveryResult::Ok {
                bot.consecutive_failures = 0;
                return;
            }
            bot.consecutive_failures += 1;
            if bot.consecutive_failures >= threshold && bot.state == BotState::Active {
                bot.state = BotState::Paused;
                bot.updated_at = Timestamp::now();
                paused = true;
            }
        });
        match updated {
            Ok(bot) if paused => warn!(
                bot_id = %bot_id,
                failures = bot.consecutive_failures,
                "Bot paused after consecutive delivery failures"
            ),
            Ok(_) => {}
            Err(e) => error!(bot_id = %bot_id, error = %e, "Failed to update bot delivery state"),
        }
    }
}

/// Cut `s` to at most `max` bytes on a character boundary.
pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::{BTreeSet, VecDeque};
    use traq_repository::{MemoryRepository, UserRepository};
    use traq_types::{BotMode, User};

    /// Replays scripted outcomes and records every request.
    #[derive(Default)]
    pub(crate) struct FakeSender {
        pub script: Mutex<VecDeque<SendOutcome>>,
        pub requests: Mutex<Vec<DeliveryRequest>>,
    }

    impl FakeSender {
        pub fn always(outcome: SendOutcome, times: usize) -> Self {
            let sender = Self::default();
            sender.script.lock().extend(std::iter::repeat(outcome).take(times));
            sender
        }
    }

    #[async_trait]
    impl EventSender for FakeSender {
        /// Unscripted requests get a 204 that echoes the token.
        async fn send(&self, request: DeliveryRequest) -> SendOutcome {
            let echo = SendOutcome::Response {
                status: 204,
                token: Some(request.verification_token.clone()),
            };
            self.requests.lock().push(request);
            self.script.lock().pop_front().unwrap_or(echo)
        }
    }

    pub(crate) fn active_bot(repo: &MemoryRepository, events: &[BotEventType]) -> Bot {
        let user = repo.create_user(User::new_bot(format!("BOT_{}", &Uuid::new_v4().simple().to_string()[..8]), "test")).unwrap();
        let now = Timestamp::now();
        repo.create_bot(Bot {
            id: Uuid::new_v4(),
            bot_user_id: user.id,
            creator_id: Uuid::new_v4(),
            description: String::new(),
            verification_token: "verification".into(),
            access_token_id: Uuid::new_v4(),
            post_url: "http://bot.invalid/events".into(),
            subscribe_events: events.iter().copied().collect::<BTreeSet<_>>(),
            mode: BotMode::Http,
            state: BotState::Active,
            privileged: false,
            bot_code: "code".into(),
            consecutive_failures: 0,
            created_at: now,
            updated_at: now,
        })
        .unwrap()
    }

    fn dispatcher(repo: Arc<MemoryRepository>, sender: Arc<FakeSender>) -> Dispatcher {
        Dispatcher::new(repo, sender, BotMetrics::new(), 3)
    }

    #[tokio::test]
    async fn test_three_failures_pause_bot() {
        let repo = Arc::new(MemoryRepository::new());
        let bot = active_bot(&repo, &[BotEventType::MessageCreated]);
        let sender = Arc::new(FakeSender::always(SendOutcome::status(500), 3));
        let dispatcher = dispatcher(repo.clone(), sender.clone());

        for _ in 0..3 {
            let result = dispatcher
                .deliver(bot.id, BotEventType::MessageCreated, Bytes::from_static(b"{}"))
                .await;
            assert_eq!(result, Some(BotDeliveryResult::Ng));
        }
        assert_eq!(repo.get_bot(bot.id).unwrap().state, BotState::Paused);

        // Paused bots receive nothing further.
        let result = dispatcher
            .deliver(bot.id, BotEventType::MessageCreated, Bytes::from_static(b"{}"))
            .await;
        assert_eq!(result, None);

        let logs = repo.get_bot_event_logs(bot.id, 10, 0);
        assert_eq!(logs.len(), 3);
        assert!(logs.iter().all(|l| l.result == BotDeliveryResult::Ng && l.code == 500));
    }

    #[tokio::test]
    async fn test_success_resets_failure_counter() {
        let repo = Arc::new(MemoryRepository::new());
        let bot = active_bot(&repo, &[BotEventType::MessageCreated]);
        let sender = Arc::new(FakeSender::default());
        {
            let mut script = sender.script.lock();
            script.push_back(SendOutcome::Failed("connection refused".into()));
            script.push_back(SendOutcome::status(500));
            script.push_back(SendOutcome::status(204));
            script.push_back(SendOutcome::status(500));
            script.push_back(SendOutcome::status(502));
        }
        let dispatcher = dispatcher(repo.clone(), sender.clone());

        for _ in 0..5 {
            dispatcher
                .deliver(bot.id, BotEventType::MessageCreated, Bytes::from_static(b"{}"))
                .await;
        }
        let stored = repo.get_bot(bot.id).unwrap();
        assert_eq!(stored.state, BotState::Active);
        assert_eq!(stored.consecutive_failures, 2);

        let logs = repo.get_bot_event_logs(bot.id, 10, 0);
        let first = logs.last().unwrap();
        assert_eq!(first.result, BotDeliveryResult::Ne);
        assert_eq!(first.code, -1);
        assert_eq!(first.error, "connection refused");
    }

    #[tokio::test]
    async fn test_request_carries_bot_credentials() {
        let repo = Arc::new(MemoryRepository::new());
        let bot = active_bot(&repo, &[BotEventType::Ping]);
        let sender = Arc::new(FakeSender::default());
        let dispatcher = dispatcher(repo.clone(), sender.clone());

        let body = Bytes::from("x".repeat(MAX_LOG_BODY + 100));
        let result = dispatcher.send(&bot, BotEventType::Ping, body).await;
        assert_eq!(result, BotDeliveryResult::Ok);

        let requests = sender.requests.lock();
        assert_eq!(requests[0].verification_token, "verification");
        assert_eq!(requests[0].event, BotEventType::Ping);
        assert_eq!(repo.get_bot_event_logs(bot.id, 1, 0)[0].body.len(), MAX_LOG_BODY);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdef", 3), "abc");
        assert_eq!(truncate("ああ", 4), "あ");
    }
}
