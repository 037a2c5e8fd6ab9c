use once_cell::sync::Lazy;

use super::common::RewritePipeline;

// Entity escaping must stay last: earlier stages emit `*` and `_` only, and a
// literal `<` in the IRC text has to reach Slack as `&lt;` exactly once.
static IRC_TO_SLACK: Lazy<RewritePipeline> = Lazy::new(|| {
    RewritePipeline::new()
        .stage("mirc_color", r"\x03(?:[0-9]{1,2}(?:,[0-9]{1,2})?)?", "")
        .stage(
            "hex_color",
            r"\x04(?:[0-9A-Fa-f]{6}(?:,[0-9A-Fa-f]{6})?)?",
            "",
        )
        .stage("bold", r"\x02([^\x02]*)\x02", "*${1}*")
        .stage("italic", r"\x1D([^\x1D]*)\x1D", "_${1}_")
        .stage("underline", r"\x1F([^\x1F]*)\x1F", "_${1}_")
        .stage("strip_unsupported", r"[\x16\x1E\x11\x0F]", "")
        .stage("strip_unpaired", r"[\x02\x1D\x1F]", "")
        .stage("escape_amp", "&", "&amp;")
        .stage("escape_lt", "<", "&lt;")
        .stage("escape_gt", ">", "&gt;")
});

/// Converts IRC control-byte formatting into Slack mrkdwn.
pub fn irc_to_slack(text: &str) -> String {
    IRC_TO_SLACK.apply(text)
}
