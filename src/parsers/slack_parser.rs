use once_cell::sync::Lazy;

use super::common::RewritePipeline;

// Angle-bracket constructs (links, mentions) are rewritten before emphasis so
// that `|`, `<` and `>` inside them are never read as markup.
static SLACK_TO_IRC: Lazy<RewritePipeline> = Lazy::new(|| {
    RewritePipeline::new()
        .stage("channel_named", r"<#[A-Z0-9]+\|([^>]+)>", "#${1}")
        .stage("channel_bare", r"<#[A-Z0-9]+>", "#channel")
        .stage("link_labeled", r"<(https?://[^|>]+)\|([^>]+)>", "${2} (${1})")
        .stage("link_bare", r"<(https?://[^>]+)>", "${1}")
        .stage("mailto_labeled", r"<mailto:([^|>]+)\|([^>]+)>", "${2} <${1}>")
        .stage("mailto_bare", r"<mailto:([^>]+)>", "${1}")
        .stage(
            "special_mention",
            r"<!(here|channel|everyone)(?:\|[^>]*)?>",
            "@${1}",
        )
        .stage("subteam_named", r"<!subteam\^[A-Z0-9]+\|@?([^>]+)>", "@${1}")
        .stage("subteam_bare", r"<!subteam\^[A-Z0-9]+>", "@group")
        .stage("date", r"<!date\^[0-9]+\^[^|>]+\|([^>]+)>", "${1}")
        .stage("bold", r"\*((?:[^*]|\\\*)+)\*", "\x02${1}\x02")
        .stage("italic", r"_((?:[^_]|\\_)+)_", "\x1D${1}\x1D")
        .stage("strikethrough", r"~((?:[^~]|\\~)+)~", "${1}")
        .stage("code_block", r"```([^`]+)```", "${1}")
        .stage("inline_code", r"`([^`]+)`", "${1}")
        .stage("unescape_lt", "&lt;", "<")
        .stage("unescape_gt", "&gt;", ">")
        .stage("unescape_amp", "&amp;", "&")
});

/// Converts Slack mrkdwn into IRC text with control-byte formatting.
pub fn slack_to_irc(text: &str) -> String {
    SLACK_TO_IRC.apply(text)
}
