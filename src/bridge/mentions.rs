use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;

use crate::db::{DatabaseError, UserStore};

use super::user_cache::UserInfoCache;

// `@nick` or `nick:`; ASCII word characters only.
static IRC_MENTION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"@([A-Za-z0-9_]+)|([A-Za-z0-9_]+):").expect("valid irc mention regex")
});
static SLACK_MENTION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<@([UW][A-Z0-9]+)(?:\|([^>]+))?>").expect("valid slack mention regex")
});

// Private-use code points; no formatting stage matches them or ASCII digits.
const SHIELD_OPEN: char = '\u{E000}';
const SHIELD_CLOSE: char = '\u{E001}';
static SHIELD_MARKER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new("\u{E000}([0-9]+)\u{E001}").expect("valid shield marker regex"));

/// Translates user mentions between Slack ids and IRC nicks.
pub struct MentionResolver {
    users: Arc<dyn UserStore>,
    user_cache: Arc<UserInfoCache>,
}

impl MentionResolver {
    pub fn new(users: Arc<dyn UserStore>, user_cache: Arc<UserInfoCache>) -> Self {
        Self { users, user_cache }
    }

    /// Rewrites `@nick` and `nick:` into `<@SLACKID>` for linked nicks.
    /// Anything unlinked is left as typed.
    pub async fn irc_to_slack_mentions(&self, text: &str) -> Result<String, DatabaseError> {
        let mut resolved: HashMap<&str, Option<String>> = HashMap::new();
        for caps in IRC_MENTION_REGEX.captures_iter(text) {
            let nick = mention_nick(&caps);
            if resolved.contains_key(nick) {
                continue;
            }
            let slack_user = self
                .users
                .get_by_irc_nick(nick)
                .await?
                .map(|mapping| mapping.slack_user_id);
            resolved.insert(nick, slack_user);
        }

        Ok(rewrite_spans(text, &IRC_MENTION_REGEX, |caps| {
            let slack_user = resolved.get(mention_nick(caps))?.as_ref()?;
            let colon = if caps.get(2).is_some() { ":" } else { "" };
            Some(format!("<@{slack_user}>{colon}"))
        }))
    }

    /// Rewrites `<@ID>` / `<@ID|name>` into `@nick`. Resolution order is the
    /// linked IRC nick, then the inline name, then the user directory.
    pub async fn slack_to_irc_mentions(&self, text: &str) -> Result<String, DatabaseError> {
        let shielded = ShieldedMentions::new(text);
        let labels = self.resolve_shielded(&shielded).await?;
        Ok(shielded.restore(shielded.text(), &labels))
    }

    /// One IRC label per shielded token, in token order. Unresolved tokens
    /// keep their original Slack form.
    pub async fn resolve_shielded(
        &self,
        shielded: &ShieldedMentions,
    ) -> Result<Vec<String>, DatabaseError> {
        let mut resolved: HashMap<&str, Option<String>> = HashMap::new();
        for token in shielded.tokens() {
            let Some(caps) = SLACK_MENTION_REGEX.captures(token) else {
                continue;
            };
            let Some(user_id) = caps.get(1).map(|m| m.as_str()) else {
                continue;
            };
            if resolved.get(user_id).is_some_and(Option::is_some) {
                continue;
            }

            let mut name = self
                .users
                .get_by_slack_user(user_id)
                .await?
                .map(|mapping| mapping.irc_nick);
            if name.is_none() && caps.get(2).is_none() {
                name = self
                    .user_cache
                    .get_user_info(user_id, None)
                    .await
                    .map(|info| info.name);
            }
            if name.is_none() {
                debug!("slack mention unresolved user_id={}", user_id);
            }
            resolved.insert(user_id, name);
        }

        Ok(shielded
            .tokens()
            .iter()
            .map(|token| {
                SLACK_MENTION_REGEX
                    .captures(token)
                    .and_then(|caps| {
                        let user_id = caps.get(1)?.as_str();
                        resolved
                            .get(user_id)
                            .and_then(Option::as_deref)
                            .or_else(|| caps.get(2).map(|m| m.as_str().trim()))
                            .filter(|name| !name.is_empty())
                            .map(|name| format!("@{name}"))
                    })
                    .unwrap_or_else(|| token.clone())
            })
            .collect())
    }
}

/// A Slack message with every `<@ID>` token lifted out and replaced by an
/// opaque marker, so formatting stages never see mention text.
#[derive(Debug)]
pub struct ShieldedMentions {
    text: String,
    tokens: Vec<String>,
}

impl ShieldedMentions {
    pub fn new(text: &str) -> Self {
        // Marker characters already in the input would alias real tokens.
        let clean: String = text
            .chars()
            .filter(|&c| c != SHIELD_OPEN && c != SHIELD_CLOSE)
            .collect();
        let mut tokens = Vec::new();
        let shielded = SLACK_MENTION_REGEX
            .replace_all(&clean, |caps: &Captures<'_>| {
                tokens.push(caps[0].to_string());
                format!("{SHIELD_OPEN}{}{SHIELD_CLOSE}", tokens.len() - 1)
            })
            .into_owned();
        Self {
            text: shielded,
            tokens,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Replaces each marker in `formatted` with the label at its index.
    pub fn restore(&self, formatted: &str, labels: &[String]) -> String {
        SHIELD_MARKER_REGEX
            .replace_all(formatted, |caps: &Captures<'_>| {
                caps[1]
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| labels.get(index).or_else(|| self.tokens.get(index)))
                    .cloned()
                    .unwrap_or_default()
            })
            .into_owned()
    }
}

fn mention_nick<'t>(caps: &Captures<'t>) -> &'t str {
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str())
        .unwrap_or_default()
}

/// Rebuilds `text` from the original spans, substituting each match for
/// which `replace` returns `Some`.
fn rewrite_spans<F>(text: &str, pattern: &Regex, mut replace: F) -> String
where
    F: FnMut(&Captures<'_>) -> Option<String>,
{
    let mut output = String::with_capacity(text.len());
    let mut last = 0;
    for caps in pattern.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if let Some(replacement) = replace(&caps) {
            output.push_str(&text[last..whole.start()]);
            output.push_str(&replacement);
            last = whole.end();
        }
    }
    output.push_str(&text[last..]);
    output
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::Result;
    use async_trait::async_trait;
    use tempfile::NamedTempFile;

    use super::{MentionResolver, ShieldedMentions};
    use crate::bridge::user_cache::{DisplayNameSource, UserInfo, UserInfoCache};
    use crate::config::DatabaseConfig;
    use crate::db::DatabaseManager;

    struct Directory;

    #[async_trait]
    impl DisplayNameSource for Directory {
        fn source_name(&self) -> &'static str {
            "directory"
        }

        async fn lookup(&self, user_id: &str) -> Result<Option<UserInfo>> {
            Ok((user_id == "U999").then(|| UserInfo::from_display_name("dir_user")))
        }
    }

    async fn resolver(file: &NamedTempFile) -> MentionResolver {
        let config = DatabaseConfig {
            filename: file.path().to_string_lossy().to_string(),
        };
        let manager = DatabaseManager::new(&config).await.expect("db manager");
        manager.migrate().await.expect("migrate");
        let users = manager.user_store();
        users.create("U123", "alice").await.expect("alice");
        users.create("U456", "bob").await.expect("bob");

        let cache = Arc::new(
            UserInfoCache::new(Duration::from_secs(3600)).with_source(Arc::new(Directory)),
        );
        MentionResolver::new(users, cache)
    }

    #[tokio::test]
    async fn irc_mentions_become_slack_ids() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let mentions = resolver(&file).await;

        let cases = [
            ("Hey @alice how are you?", "Hey <@U123> how are you?"),
            ("Hey @unknownuser", "Hey @unknownuser"),
            ("bob: hello", "<@U456>: hello"),
            ("carol: hello", "carol: hello"),
            ("@alice and bob: hello!", "<@U123> and <@U456>: hello!"),
            ("@alice: hi @alice", "<@U123>: hi <@U123>"),
            ("no mentions here", "no mentions here"),
        ];
        for (input, expected) in cases {
            assert_eq!(
                mentions.irc_to_slack_mentions(input).await.expect("resolve"),
                expected,
                "input {input:?}"
            );
        }
    }

    #[tokio::test]
    async fn slack_mentions_become_nicks() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let mentions = resolver(&file).await;

        let cases = [
            ("hi <@U123>", "hi @alice"),
            ("hi <@U123|Alice Smith>", "hi @alice"),
            ("hi <@U777|casey>", "hi @casey"),
            ("hi <@U999>", "hi @dir_user"),
            ("hi <@U000>", "hi <@U000>"),
            ("<@U456> and <@U123> and <@U456>", "@bob and @alice and @bob"),
        ];
        for (input, expected) in cases {
            assert_eq!(
                mentions.slack_to_irc_mentions(input).await.expect("resolve"),
                expected,
                "input {input:?}"
            );
        }
    }

    #[test]
    fn shielding_lifts_tokens_and_restores_by_index() {
        let shielded = ShieldedMentions::new("a <@U1|x_y> b <@W2> c \u{E000}9\u{E001}");
        assert_eq!(shielded.tokens(), ["<@U1|x_y>", "<@W2>"]);
        assert!(!shielded.text().contains("x_y"));
        assert!(!shielded.text().contains('<'));

        let labels = vec!["@xy".to_string()];
        assert_eq!(
            shielded.restore(shielded.text(), &labels),
            "a @xy b <@W2> c 9"
        );
    }
}
