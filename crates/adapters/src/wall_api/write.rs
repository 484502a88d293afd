//! Wall API write adapter for publishing posts

use super::{AccountTokens, DEFAULT_API_VERSION};
use async_trait::async_trait;
use reposter_domain::{DestinationWriter, PublishError, PublishReceipt, RenderedPost};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use std::time::Duration;

/// Publisher over the platform's `wall.post` method
pub struct WallPublisher {
    client: Client,
    tokens: AccountTokens,
    base_url: String,
    api_version: String,
    max_chars: usize,
    enabled: bool,
}

impl WallPublisher {
    pub fn new(tokens: AccountTokens, max_chars: usize) -> Self {
        Self::with_base_url(
            tokens,
            "https://api.vk.com".to_string(),
            DEFAULT_API_VERSION.to_string(),
            max_chars,
            true,
        )
    }

    pub fn with_base_url(
        tokens: AccountTokens,
        base_url: String,
        api_version: String,
        max_chars: usize,
        enabled: bool,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            tokens,
            base_url,
            api_version,
            max_chars,
            enabled,
        }
    }

    /// Create a disabled publisher (for dry runs)
    pub fn disabled() -> Self {
        Self {
            client: Client::new(),
            tokens: AccountTokens::new(),
            base_url: String::new(),
            api_version: DEFAULT_API_VERSION.to_string(),
            max_chars: 4096,
            enabled: false,
        }
    }
}

#[derive(Deserialize)]
struct PostEnvelope {
    response: Option<PostResponse>,
    error: Option<PostApiError>,
}

#[derive(Deserialize)]
struct PostResponse {
    post_id: i64,
}

#[derive(Deserialize)]
struct PostApiError {
    error_code: i64,
    #[serde(default)]
    error_msg: String,
}

impl PostApiError {
    fn into_publish_error(self) -> PublishError {
        match self.error_code {
            5 => PublishError::Auth(self.error_msg),
            6 | 9 | 29 => PublishError::RateLimited,
            code => PublishError::Api(format!("error {}: {}", code, self.error_msg)),
        }
    }
}

#[async_trait]
impl DestinationWriter for WallPublisher {
    async fn publish(
        &self,
        account: &str,
        channel_id: i64,
        post: &RenderedPost,
    ) -> Result<PublishReceipt, PublishError> {
        if !self.enabled {
            return Err(PublishError::Api("Publisher is disabled".to_string()));
        }

        let len = post.text.chars().count();
        if len > self.max_chars {
            return Err(PublishError::ContentTooLong {
                len,
                max: self.max_chars,
            });
        }

        let token = self.tokens.write_token(account)?;
        let attachments = post
            .attachments
            .iter()
            .map(|a| a.0.as_str())
            .collect::<Vec<_>>()
            .join(",");

        let mut form = vec![
            ("owner_id", channel_id.to_string()),
            ("message", post.text.clone()),
            ("v", self.api_version.clone()),
        ];
        if channel_id < 0 {
            form.push(("from_group", "1".to_string()));
        }
        if !attachments.is_empty() {
            form.push(("attachments", attachments));
        }

        let url = format!("{}/method/wall.post", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", token.expose_secret()))
            .form(&form)
            .send()
            .await
            .map_err(|e| PublishError::Network(e.to_string()))?;

        if response.status() == 401 {
            return Err(PublishError::Auth("Invalid access token".to_string()));
        }

        if response.status() == 429 {
            return Err(PublishError::RateLimited);
        }

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Api(format!("wall.post failed: {}", body)));
        }

        let envelope: PostEnvelope = response
            .json()
            .await
            .map_err(|e| PublishError::Api(e.to_string()))?;

        if let Some(error) = envelope.error {
            return Err(error.into_publish_error());
        }
        let created = envelope
            .response
            .ok_or_else(|| PublishError::Api("wall.post returned no post id".to_string()))?;

        tracing::info!(
            channel_id,
            post_id = created.post_id,
            source = %post.source_post_key,
            "Published post"
        );

        Ok(PublishReceipt {
            id: created.post_id.to_string(),
            url: Some(format!("https://vk.com/wall{}_{}", channel_id, created.post_id)),
        })
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn platform(&self) -> &'static str {
        "wall"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reposter_domain::AttachmentRef;
    use secrecy::SecretString;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_post() -> RenderedPost {
        RenderedPost {
            text: "Bridge reopened".to_string(),
            attachments: vec![
                AttachmentRef("photo-100_7".to_string()),
                AttachmentRef("video-100_9".to_string()),
            ],
            source_post_key: "-100_11".to_string(),
            source_url: "https://vk.com/wall-100_11".to_string(),
        }
    }

    fn publisher(base_url: String, max_chars: usize) -> WallPublisher {
        WallPublisher::with_base_url(
            AccountTokens::new().with("writer", SecretString::new("write-token".into())),
            base_url,
            "5.131".to_string(),
            max_chars,
            true,
        )
    }

    #[tokio::test]
    async fn test_publish_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/method/wall.post"))
            .and(header("Authorization", "Bearer write-token"))
            .and(body_string_contains("owner_id=-900"))
            .and(body_string_contains("from_group=1"))
            .and(body_string_contains("attachments=photo-100_7%2Cvideo-100_9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": {"post_id": 321}
            })))
            .mount(&mock_server)
            .await;

        let receipt = publisher(mock_server.uri(), 4096)
            .publish("writer", -900, &sample_post())
            .await
            .unwrap();

        assert_eq!(receipt.id, "321");
        assert_eq!(receipt.url.as_deref(), Some("https://vk.com/wall-900_321"));
    }

    #[tokio::test]
    async fn test_publish_api_error_maps_to_auth() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/method/wall.post"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": {"error_code": 5, "error_msg": "User authorization failed"}
            })))
            .mount(&mock_server)
            .await;

        let result = publisher(mock_server.uri(), 4096)
            .publish("writer", -900, &sample_post())
            .await;

        assert!(matches!(result, Err(PublishError::Auth(_))));
    }

    #[tokio::test]
    async fn test_publish_content_too_long() {
        let result = publisher("http://127.0.0.1:9".to_string(), 5)
            .publish("writer", -900, &sample_post())
            .await;

        assert!(matches!(
            result,
            Err(PublishError::ContentTooLong { len: 15, max: 5 })
        ));
    }

    #[tokio::test]
    async fn test_publish_rate_limited() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/method/wall.post"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&mock_server)
            .await;

        let result = publisher(mock_server.uri(), 4096)
            .publish("writer", -900, &sample_post())
            .await;

        assert!(matches!(result, Err(PublishError::RateLimited)));
    }

    #[tokio::test]
    async fn test_unknown_write_account() {
        let result = publisher("http://127.0.0.1:9".to_string(), 4096)
            .publish("someone", -900, &sample_post())
            .await;

        assert!(matches!(result, Err(PublishError::Auth(_))));
    }

    #[tokio::test]
    async fn test_disabled_publisher() {
        let publisher = WallPublisher::disabled();

        assert!(!publisher.is_enabled());

        let result = publisher.publish("writer", -900, &sample_post()).await;
        assert!(result.is_err());
    }
}
