use {
    anyhow::Result,
    clap::Args,
    courier_channels::{ChatKind, RawEvent},
    courier_config::CourierConfig,
    courier_routing::{Classifier, RoutingState, Tier, normalize},
};

#[derive(Args)]
pub struct ClassifyArgs {
    /// Message text.
    #[arg(long)]
    pub text: String,
    #[arg(long, allow_hyphen_values = true)]
    pub chat_id: i64,
    #[arg(long)]
    pub sender_id: i64,
    /// Treat the chat as a group.
    #[arg(long, conflicts_with = "channel")]
    pub group: bool,
    /// Treat the chat as a broadcast channel.
    #[arg(long)]
    pub channel: bool,
    /// Mark the message as a reply.
    #[arg(long)]
    pub reply_to: Option<i64>,
}

impl ClassifyArgs {
    fn chat_kind(&self) -> ChatKind {
        if self.group {
            ChatKind::Group
        } else if self.channel {
            ChatKind::Channel
        } else {
            ChatKind::Private
        }
    }
}

pub fn handle_classify(args: &ClassifyArgs, config: &CourierConfig) -> Result<()> {
    let tier = classify(args, config);
    println!("{}", serde_json::json!({ "tier": tier }));
    Ok(())
}

fn classify(args: &ClassifyArgs, config: &CourierConfig) -> Tier {
    let mut event = RawEvent::text(args.chat_id, args.sender_id, args.chat_kind(), &args.text);
    event.reply_to_message_id = args.reply_to;
    let message = normalize(&event);
    let classifier = Classifier::from_config(&config.routing);
    classifier.classify(&message, &RoutingState::from_config(&config.routing))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn args(text: &str, sender_id: i64, group: bool) -> ClassifyArgs {
        ClassifyArgs {
            text: text.into(),
            chat_id: if group { -100 } else { 100 },
            sender_id,
            group,
            channel: false,
            reply_to: None,
        }
    }

    #[test]
    fn privileged_sender_is_priority() {
        let mut config = CourierConfig::default();
        config.routing.privileged_sender_id = Some(1);
        assert_eq!(classify(&args("anything", 1, false), &config), Tier::Priority);
    }

    #[test]
    fn short_group_text_is_junk() {
        let config = CourierConfig::default();
        assert_eq!(classify(&args("ok", 2, true), &config), Tier::Junk);
    }

    #[test]
    fn ordinary_text_falls_to_background_log() {
        let config = CourierConfig::default();
        assert_eq!(
            classify(&args("see you at the meeting", 2, false), &config),
            Tier::BackgroundLog
        );
    }
}
