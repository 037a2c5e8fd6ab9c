use once_cell::sync::Lazy;
use regex::Regex;

use super::message_flow::{SlackImageAttachment, SlackInboundMessage};

static IMAGE_URL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)https?://[^\s<>]+\.(?:png|jpe?g|gif|webp)(?:\?[^\s<>]*)?")
        .expect("valid image url regex")
});
static THREAD_REFERENCE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^@([0-9a-z]{1,5})(?:\s+|$)").expect("valid thread reference regex")
});

pub(crate) const IRC_SERVICE_NICK: &str = "****";
const THREAD_QUOTE_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlackSkipReason {
    Subtype,
    Bot,
    OwnMessage,
    NoUser,
}

/// Slack messages the bridge must not relay. `file_share` is the only
/// subtype that carries user content.
pub(crate) fn slack_skip_reason(
    message: &SlackInboundMessage,
    bot_user_id: Option<&str>,
) -> Option<SlackSkipReason> {
    if message
        .subtype
        .as_deref()
        .is_some_and(|subtype| subtype != "file_share")
    {
        return Some(SlackSkipReason::Subtype);
    }
    if message.bot_id.is_some() {
        return Some(SlackSkipReason::Bot);
    }
    let Some(user) = message.user.as_deref() else {
        return Some(SlackSkipReason::NoUser);
    };
    if bot_user_id == Some(user) {
        return Some(SlackSkipReason::OwnMessage);
    }
    None
}

pub(crate) fn should_ignore_irc_nick(nick: &str, own_nick: &str) -> bool {
    nick == IRC_SERVICE_NICK || nick.eq_ignore_ascii_case(own_nick)
}

pub(crate) fn irc_sender_display(nick: &str) -> String {
    format!("{nick} <irc>")
}

/// One IRC line per non-empty text line: `<sender> [@thread ]line`.
pub(crate) fn format_irc_lines(sender: &str, thread_id: Option<&str>, text: &str) -> Vec<String> {
    let thread_prefix = thread_id.map(|id| format!("@{id} ")).unwrap_or_default();
    text.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(|line| format!("<{sender}> {thread_prefix}{line}"))
        .collect()
}

/// Context line sent before the first IRC copy of a thread reply.
pub(crate) fn format_thread_quote(thread_id: &str, root_author: &str, root_text: &str) -> String {
    let first_line = root_text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();
    let mut chars = first_line.chars();
    let mut preview: String = chars.by_ref().take(THREAD_QUOTE_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        preview.push_str("...");
    }
    format!("@{thread_id} > <{root_author}> {preview}")
}

/// Splits a leading `@abcde` thread token from an IRC message.
pub(crate) fn parse_thread_reference(text: &str) -> Option<(&str, &str)> {
    let caps = THREAD_REFERENCE_REGEX.captures(text)?;
    let id = caps.get(1)?.as_str();
    let rest = &text[caps.get(0)?.end()..];
    Some((id, rest))
}

pub(crate) fn extract_image_attachments(text: &str) -> Vec<SlackImageAttachment> {
    let mut seen = Vec::new();
    for found in IMAGE_URL_REGEX.find_iter(text) {
        let url = found.as_str();
        if !seen.iter().any(|existing: &SlackImageAttachment| existing.image_url == url) {
            seen.push(SlackImageAttachment {
                image_url: url.to_string(),
                fallback: url.to_string(),
            });
        }
    }
    seen
}

pub(crate) fn preview_text(value: &str) -> String {
    const MAX_PREVIEW_CHARS: usize = 120;
    let mut chars = value.chars();
    let preview: String = chars.by_ref().take(MAX_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{preview}…")
    } else {
        preview
    }
}
