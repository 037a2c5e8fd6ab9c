use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

/// Re-hosts Slack private file URLs somewhere IRC users can open them.
#[async_trait]
pub trait FileUploader: Send + Sync {
    /// Returns one public URL per uploaded file, in input order.
    async fn rehost(&self, private_urls: &[String]) -> Result<Vec<String>>;
}

#[derive(Debug, Deserialize)]
struct CdnUploadResponse {
    #[serde(default)]
    files: Vec<CdnFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CdnFile {
    deployed_url: String,
}

/// Client for the Hack Club CDN `new` endpoint. The CDN downloads each
/// Slack file itself using the bot token passed in `X-Download-Authorization`.
pub struct CdnUploader {
    client: Client,
    endpoint: String,
    cdn_token: SecretString,
    slack_bot_token: SecretString,
}

impl CdnUploader {
    pub fn new(endpoint: &str, cdn_token: SecretString, slack_bot_token: SecretString) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.to_string(),
            cdn_token,
            slack_bot_token,
        }
    }
}

#[async_trait]
impl FileUploader for CdnUploader {
    async fn rehost(&self, private_urls: &[String]) -> Result<Vec<String>> {
        if private_urls.is_empty() {
            return Ok(Vec::new());
        }
        debug!(
            "uploading files to cdn count={} endpoint={}",
            private_urls.len(),
            self.endpoint
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.cdn_token.expose_secret())
            .header(
                "X-Download-Authorization",
                format!("Bearer {}", self.slack_bot_token.expose_secret()),
            )
            .json(private_urls)
            .send()
            .await
            .context("cdn upload request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("cdn upload failed: {} - {}", status, body));
        }

        let body: CdnUploadResponse = response
            .json()
            .await
            .context("failed to parse cdn upload response")?;
        let urls = deployed_urls(body);
        debug!("cdn upload finished deployed={}", urls.len());
        Ok(urls)
    }
}

fn deployed_urls(body: CdnUploadResponse) -> Vec<String> {
    body.files
        .into_iter()
        .map(|file| file.deployed_url)
        .filter(|url| !url.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{CdnUploadResponse, deployed_urls};

    #[test]
    fn deployed_urls_are_read_in_order() {
        let body: CdnUploadResponse = serde_json::from_str(
            r#"{"files":[{"deployedUrl":"https://cdn.test/a.png","sha":"1"},{"deployedUrl":""},{"deployedUrl":"https://cdn.test/b.txt"}],"cdnBase":"https://cdn.test"}"#,
        )
        .expect("cdn response");

        assert_eq!(
            deployed_urls(body),
            vec!["https://cdn.test/a.png", "https://cdn.test/b.txt"]
        );
    }

    #[test]
    fn missing_files_field_yields_nothing() {
        let body: CdnUploadResponse = serde_json::from_str("{}").expect("cdn response");
        assert!(deployed_urls(body).is_empty());
    }
}
