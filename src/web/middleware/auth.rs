use hmac::{Hmac, Mac};
use salvo::prelude::*;
use sha2::Sha256;
use thiserror::Error;

use crate::web::handlers::{
    health::{health_check, index},
    slack::slack_events,
};

type HmacSha256 = Hmac<Sha256>;

/// Requests older (or newer) than this are treated as replays.
const MAX_REQUEST_AGE_SECS: i64 = 60 * 5;

pub fn create_router() -> Router {
    Router::new()
        .get(index)
        .push(Router::with_path("health").get(health_check))
        .push(Router::with_path("slack").post(slack_events))
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing signature headers")]
    MissingHeaders,
    #[error("request timestamp is not a number")]
    BadTimestamp,
    #[error("request timestamp outside replay window")]
    Stale,
    #[error("signature does not match")]
    Mismatch,
}

/// Checks `X-Slack-Signature` against `v0:{timestamp}:{body}` signed with the
/// app's signing secret.
pub fn verify_slack_signature(
    signing_secret: &str,
    timestamp: Option<&str>,
    signature: Option<&str>,
    body: &[u8],
    now_secs: i64,
) -> Result<(), SignatureError> {
    let (Some(timestamp), Some(signature)) = (timestamp, signature) else {
        return Err(SignatureError::MissingHeaders);
    };
    let sent_at: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| SignatureError::BadTimestamp)?;
    if (now_secs - sent_at).abs() > MAX_REQUEST_AGE_SECS {
        return Err(SignatureError::Stale);
    }

    let expected = signature
        .trim()
        .strip_prefix("v0=")
        .and_then(|hex_sig| hex::decode(hex_sig).ok())
        .ok_or(SignatureError::Mismatch)?;

    let mut mac = HmacSha256::new_from_slice(signing_secret.as_bytes())
        .map_err(|_| SignatureError::Mismatch)?;
    mac.update(b"v0:");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}
