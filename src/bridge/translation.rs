use std::sync::Arc;

use tracing::warn;

use crate::parsers::{irc_to_slack, slack_to_irc};

use super::mentions::{MentionResolver, ShieldedMentions};

/// Formatting plus mention translation for both directions. Mention failures
/// degrade to the formatted text instead of dropping the message.
pub struct MessageTranslator {
    mentions: Arc<MentionResolver>,
}

impl MessageTranslator {
    pub fn new(mentions: Arc<MentionResolver>) -> Self {
        Self { mentions }
    }

    /// IRC text to Slack mrkdwn.
    pub async fn transform_outbound(&self, irc_text: &str) -> String {
        let formatted = irc_to_slack(irc_text);
        match self.mentions.irc_to_slack_mentions(&formatted).await {
            Ok(text) => text,
            Err(err) => {
                warn!("irc mention resolution failed, sending without: {}", err);
                formatted
            }
        }
    }

    /// Slack mrkdwn to IRC text. Mention tokens are lifted out before
    /// formatting so emphasis and entity stages never rewrite them.
    pub async fn transform_inbound(&self, slack_text: &str) -> String {
        let shielded = ShieldedMentions::new(slack_text);
        let formatted = slack_to_irc(shielded.text());
        match self.mentions.resolve_shielded(&shielded).await {
            Ok(labels) => shielded.restore(&formatted, &labels),
            Err(err) => {
                warn!("slack mention resolution failed, sending without: {}", err);
                shielded.restore(&formatted, shielded.tokens())
            }
        }
    }
}
