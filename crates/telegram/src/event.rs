use {
    chrono::{DateTime, Utc},
    courier_channels::{ChatKind, Error, InboundEvent, Result},
    teloxide::types::{MediaKind, Message, MessageKind},
};

/// A Telegram message seen through the transport-neutral event interface.
#[derive(Debug, Clone)]
pub struct TelegramEvent {
    message: Message,
}

impl TelegramEvent {
    #[must_use]
    pub fn new(message: Message) -> Self {
        Self { message }
    }

    #[must_use]
    pub fn message(&self) -> &Message {
        &self.message
    }
}

impl From<Message> for TelegramEvent {
    fn from(message: Message) -> Self {
        Self::new(message)
    }
}

impl InboundEvent for TelegramEvent {
    fn chat_id(&self) -> i64 {
        self.message.chat.id.0
    }

    /// User ID, or the posting chat for anonymous admins and channel posts.
    fn sender_id(&self) -> Result<i64> {
        if let Some(user) = &self.message.from {
            return i64::try_from(user.id.0).map_err(|e| Error::external("sender id", e));
        }
        self.message
            .sender_chat
            .as_ref()
            .map(|chat| chat.id.0)
            .ok_or_else(|| Error::missing("sender_id"))
    }

    fn message_id(&self) -> Result<i64> {
        Ok(i64::from(self.message.id.0))
    }

    fn text(&self) -> Option<String> {
        match &self.message.kind {
            MessageKind::Common(common) => match &common.media_kind {
                MediaKind::Text(t) => Some(t.text.clone()),
                MediaKind::Photo(p) => p.caption.clone(),
                MediaKind::Document(d) => d.caption.clone(),
                MediaKind::Audio(a) => a.caption.clone(),
                MediaKind::Voice(v) => v.caption.clone(),
                MediaKind::Video(vid) => vid.caption.clone(),
                MediaKind::Animation(a) => a.caption.clone(),
                _ => None,
            },
            _ => None,
        }
    }

    fn timestamp(&self) -> Result<DateTime<Utc>> {
        Ok(self.message.date)
    }

    fn chat_kind(&self) -> Result<ChatKind> {
        let chat = &self.message.chat;
        if chat.is_private() {
            Ok(ChatKind::Private)
        } else if chat.is_channel() {
            Ok(ChatKind::Channel)
        } else if chat.is_group() || chat.is_supergroup() {
            Ok(ChatKind::Group)
        } else {
            Err(Error::invalid_input("unrecognised chat kind"))
        }
    }

    fn sender_display_name(&self) -> Result<Option<String>> {
        Ok(self.message.from.as_ref().and_then(|u| {
            let name = u.full_name();
            if name.trim().is_empty() {
                u.username.clone()
            } else {
                Some(name)
            }
        }))
    }

    fn chat_title(&self) -> Result<Option<String>> {
        Ok(self.message.chat.title().map(str::to_string))
    }

    fn has_media(&self) -> bool {
        match &self.message.kind {
            MessageKind::Common(common) => !matches!(common.media_kind, MediaKind::Text(_)),
            _ => false,
        }
    }

    fn reply_to_message_id(&self) -> Option<i64> {
        self.message
            .reply_to_message()
            .map(|reply| i64::from(reply.id.0))
    }
}
