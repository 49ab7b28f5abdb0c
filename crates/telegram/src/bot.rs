use std::time::Duration;

use {
    courier_channels::InboundSender,
    courier_config::TelegramConfig,
    secrecy::ExposeSecret,
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{AllowedUpdate, UpdateKind},
    },
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    event::TelegramEvent,
    outbound::TelegramOutbound,
};

const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// A connected bot: credentials verified, webhook cleared.
#[derive(Clone)]
pub struct TelegramClient {
    bot: Bot,
    username: Option<String>,
}

impl TelegramClient {
    pub async fn connect(config: &TelegramConfig) -> Result<Self> {
        if !config.has_token() {
            return Err(Error::message("telegram token is not configured"));
        }
        // Client timeout must outlive the long-polling timeout so the HTTP
        // client doesn't abort the request before Telegram responds.
        let client = teloxide::net::default_reqwest_settings()
            .timeout(Duration::from_secs(u64::from(config.poll_timeout_secs) + 15))
            .build()?;
        let bot = Bot::with_client(config.token.expose_secret(), client);
        Self::start(bot, config.bot_username.clone()).await
    }

    /// Verify credentials with `getMe` and delete any webhook so long
    /// polling works. `username` overrides the name reported by Telegram.
    pub async fn start(bot: Bot, username: Option<String>) -> Result<Self> {
        let me = bot.get_me().await?;
        bot.delete_webhook().send().await?;

        let username = username.or_else(|| me.username.clone());
        info!(username = ?username, "telegram bot connected (webhook cleared)");
        Ok(Self { bot, username })
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    #[must_use]
    pub fn outbound(&self) -> TelegramOutbound {
        TelegramOutbound::new(self.bot.clone())
    }

    /// Long-poll for updates and push every message onto `inbound` until
    /// `cancel` fires or the receiving side is dropped.
    pub fn spawn_polling(
        &self,
        inbound: InboundSender,
        poll_timeout_secs: u32,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(poll_loop(
            self.bot.clone(),
            inbound,
            poll_timeout_secs,
            cancel,
        ))
    }
}

async fn poll_loop(
    bot: Bot,
    inbound: InboundSender,
    poll_timeout_secs: u32,
    cancel: CancellationToken,
) {
    info!("starting telegram polling loop");
    let mut offset: i32 = 0;

    loop {
        let request = bot
            .get_updates()
            .offset(offset)
            .timeout(poll_timeout_secs)
            .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::ChannelPost]);

        let result = tokio::select! {
            () = cancel.cancelled() => break,
            result = request.send() => result,
        };

        match result {
            Ok(updates) => {
                debug!(count = updates.len(), "got telegram updates");
                for update in updates {
                    offset = update.id.as_offset();
                    match update.kind {
                        UpdateKind::Message(msg) | UpdateKind::ChannelPost(msg) => {
                            debug!(chat_id = msg.chat.id.0, "received telegram message");
                            if inbound.send(Box::new(TelegramEvent::new(msg))).await.is_err() {
                                info!("inbound stream closed, telegram polling stopped");
                                return;
                            }
                        },
                        other => {
                            debug!("ignoring non-message update: {other:?}");
                        },
                    }
                }
            },
            Err(e) => {
                // Another process is polling with the same token.
                if matches!(&e, RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) {
                    warn!("another instance is already running with this token, polling stopped");
                    cancel.cancel();
                    break;
                }

                warn!(error = %e, "telegram getUpdates failed");
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(POLL_ERROR_BACKOFF) => {},
                }
            },
        }
    }
    info!("telegram polling stopped");
}
