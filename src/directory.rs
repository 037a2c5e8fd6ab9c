use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::bridge::user_cache::{DisplayNameSource, UserInfo};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectoryUser {
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    image_url: Option<String>,
}

/// Redirecting avatar endpoint for a Slack user id.
pub fn avatar_url(base_url: &str, slack_user_id: &str) -> String {
    format!("{}/users/{}/r", base_url.trim_end_matches('/'), slack_user_id)
}

/// Cachet-compatible user directory (`GET {base}/users/{id}`).
pub struct CachetDirectory {
    client: Client,
    base_url: String,
}

impl CachetDirectory {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl DisplayNameSource for CachetDirectory {
    fn source_name(&self) -> &'static str {
        "directory"
    }

    async fn lookup(&self, user_id: &str) -> Result<Option<UserInfo>> {
        let url = format!("{}/users/{}", self.base_url, user_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("directory request failed for {user_id}"))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(anyhow!("directory lookup for {} failed: {}", user_id, status));
        }

        let user: DirectoryUser = response
            .json()
            .await
            .context("failed to parse directory user")?;
        debug!(
            "directory user resolved user_id={} has_image={}",
            user_id,
            user.image_url.is_some()
        );
        Ok(user_info(user))
    }
}

fn user_info(user: DirectoryUser) -> Option<UserInfo> {
    let name = user.display_name.trim();
    (!name.is_empty()).then(|| UserInfo::from_display_name(name))
}

#[cfg(test)]
mod tests {
    use super::{DirectoryUser, avatar_url, user_info};

    #[test]
    fn avatar_urls_ignore_trailing_slash() {
        assert_eq!(
            avatar_url("https://dir.test/", "U123"),
            "https://dir.test/users/U123/r"
        );
        assert_eq!(
            avatar_url("https://dir.test", "U9"),
            "https://dir.test/users/U9/r"
        );
    }

    #[test]
    fn directory_payload_maps_to_user_info() {
        let user: DirectoryUser = serde_json::from_str(
            r#"{"type":"user","id":"U1","userId":"U1","displayName":"Ada L","pronouns":"she/her","imageUrl":"https://img.test/a.png"}"#,
        )
        .expect("directory user");
        let info = user_info(user).expect("user info");
        assert_eq!(info.name, "Ada L");
        assert_eq!(info.real_name, "Ada L");

        let blank: DirectoryUser = serde_json::from_str(r#"{"displayName":"  "}"#).expect("blank");
        assert!(user_info(blank).is_none());
    }
}
