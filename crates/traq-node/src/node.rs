//! Node assembly: builds every service from a [`Config`], starts the
//! background tasks and hands out the HTTP router.

use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use traq_bot::{BotEngine, BotError, BotService, EventSender, HttpSender};
use traq_channel::ChannelService;
use traq_hub::{Hub, HubError};
use traq_message::{ClipService, MessageService, StampService};
use traq_notification::{NotificationError, NotificationService};
use traq_oauth2::{hash_password, OAuth2Error, OAuth2Service};
use traq_realtime::{HeartbeatTracker, Streamer, WebRtcManager};
use traq_repository::{Repository, RepositoryError};
use traq_types::{role, User};
use traq_webhook::{TemplateSet, WebhookError, WebhookService};

use crate::api::{create_router, ApiSettings, AppState};
use crate::config::Config;
use crate::observability::METRICS;
use crate::session::SessionStore;

/// Name of the administrator account created on first start.
pub const ADMIN_USER_NAME: &str = "traq";

/// Errors raised while starting a node.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("bot engine: {0}")]
    Bot(#[from] BotError),

    #[error("webhook templates: {0}")]
    Webhook(#[from] WebhookError),

    #[error("hub: {0}")]
    Hub(#[from] HubError),

    #[error("notification router: {0}")]
    Notification(#[from] NotificationError),

    #[error("administrator account: {0}")]
    OAuth2(#[from] OAuth2Error),

    #[error("repository: {0}")]
    Repository(#[from] RepositoryError),
}

/// A running node.
pub struct Node {
    state: AppState,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Node {
    /// Start a node that delivers bot events over HTTP. Must be called
    /// inside a Tokio runtime.
    pub fn start(
        config: &Config,
        repo: Arc<dyn Repository>,
        shutdown: CancellationToken,
    ) -> Result<Self, NodeError> {
        let sender = HttpSender::new(Duration::from_secs(config.bot.timeout_secs))?;
        Self::start_with_sender(config, repo, Arc::new(sender), shutdown)
    }

    /// Start a node with a custom bot transport.
    pub fn start_with_sender(
        config: &Config,
        repo: Arc<dyn Repository>,
        sender: Arc<dyn EventSender>,
        shutdown: CancellationToken,
    ) -> Result<Self, NodeError> {
        ensure_admin(repo.as_ref(), &config.admin_password)?;

        let hub = Arc::new(Hub::new());
        let webrtc = Arc::new(WebRtcManager::new(hub.clone()));
        let streamer = Streamer::new(
            config.realtime.sse_buffer,
            webrtc.clone(),
            shutdown.child_token(),
        );
        let heartbeat = Arc::new(HeartbeatTracker::new(
            repo.clone(),
            hub.clone(),
            Duration::from_secs(config.realtime.heartbeat_ttl_secs),
        ));
        let notifications = Arc::new(NotificationService::new(
            repo.clone(),
            streamer.clone(),
            heartbeat.clone(),
        ));

        let oauth2 = Arc::new(OAuth2Service::new(repo.clone(), config.oauth2));
        let engine = BotEngine::start(
            repo.clone(),
            sender,
            config.bot,
            METRICS.bot.clone(),
            shutdown.child_token(),
        );
        let bots = Arc::new(BotService::new(
            repo.clone(),
            hub.clone(),
            oauth2.clone(),
            engine.clone(),
        ));

        let messages = MessageService::new(repo.clone(), hub.clone());
        let templates = match &config.webhook.github_templates {
            Some(path) => TemplateSet::load(path)?,
            None => TemplateSet::builtin()?,
        };
        let webhooks = Arc::new(WebhookService::new(
            repo.clone(),
            messages.clone(),
            Arc::new(templates),
        ));

        let tasks = vec![
            tokio::spawn(heartbeat.clone().run(shutdown.child_token())),
            notifications.spawn(&hub, shutdown.child_token())?,
            engine.spawn(&hub, shutdown.child_token())?,
        ];

        let state = AppState {
            channels: ChannelService::new(repo.clone(), hub.clone()),
            stamps: StampService::new(repo.clone(), hub.clone()),
            clips: ClipService::new(repo.clone(), hub.clone()),
            messages,
            streamer,
            heartbeat,
            webrtc,
            oauth2,
            bots,
            webhooks,
            sessions: Arc::new(SessionStore::new()),
            settings: Arc::new(ApiSettings {
                origin: config.origin.clone(),
                keepalive: Duration::from_secs(config.realtime.keepalive_secs),
                secure_cookies: !config.dev_mode && config.origin.starts_with("https://"),
            }),
            repo,
            hub,
        };

        info!(
            bot_workers = config.bot.workers,
            sse_buffer = config.realtime.sse_buffer,
            "Node started"
        );
        Ok(Self {
            state,
            shutdown,
            tasks,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// Cancel background work, close every SSE connection and wait for the
    /// tasks to finish.
    pub async fn stop(self) {
        self.shutdown.cancel();
        self.state.streamer.stop();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Background task ended abnormally");
            }
        }
        info!("Node stopped");
    }
}

/// Create the administrator account unless it already exists.
fn ensure_admin(repo: &dyn Repository, password: &str) -> Result<User, NodeError> {
    match repo.get_user_by_name(ADMIN_USER_NAME) {
        Ok(user) => Ok(user),
        Err(RepositoryError::NotFound(_)) => {
            let mut user = User::new(ADMIN_USER_NAME, ADMIN_USER_NAME, hash_password(password)?);
            user.role = role::ADMIN.to_string();
            let user = repo.create_user(user)?;
            info!(user_id = %user.id, "Created administrator account");
            Ok(user)
        }
        Err(e) => Err(e.into()),
    }
}
