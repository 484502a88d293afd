//! Wall API read adapter for fetching community posts

use super::{AccountTokens, DEFAULT_API_VERSION};
use async_trait::async_trait;
use reposter_domain::{Attachment, AttachmentKind, PhotoSize, Post, SourceError, SourceReader};
use reqwest::{Client, Response};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use time::OffsetDateTime;

/// Platform error codes
const ERROR_AUTH: i64 = 5;
const ERROR_TOO_MANY_REQUESTS: i64 = 6;
const ERROR_FLOOD: i64 = 9;
const ERROR_RATE_LIMIT: i64 = 29;
const ERROR_ACCESS_DENIED: i64 = 15;
const ERROR_DELETED: i64 = 18;
const ERROR_PRIVATE: i64 = 30;

/// Source reader over the platform's `wall.get` / `wall.getById` methods
pub struct WallSource {
    client: Client,
    tokens: AccountTokens,
    base_url: String,
    api_version: String,
}

impl WallSource {
    pub fn new(tokens: AccountTokens) -> Self {
        Self::with_base_url(
            tokens,
            "https://api.vk.com".to_string(),
            DEFAULT_API_VERSION.to_string(),
        )
    }

    pub fn with_base_url(tokens: AccountTokens, base_url: String, api_version: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            tokens,
            base_url,
            api_version,
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        account: &str,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<ApiResult<T>, SourceError> {
        let token = self.tokens.read_token(account)?;
        let url = format!("{}/method/{}", self.base_url, method);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", token.expose_secret()))
            .query(params)
            .query(&[("v", self.api_version.as_str())])
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        let response = check_status(response, method).await?;

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| SourceError::Api(e.to_string()))?;

        match (envelope.response, envelope.error) {
            (_, Some(error)) => Ok(ApiResult::Failed(error)),
            (Some(value), None) => Ok(ApiResult::Ok(value)),
            (None, None) => Err(SourceError::Api(format!(
                "{} returned neither response nor error",
                method
            ))),
        }
    }
}

async fn check_status(response: Response, method: &str) -> Result<Response, SourceError> {
    if response.status() == 401 {
        return Err(SourceError::Auth("Invalid access token".to_string()));
    }

    if response.status() == 429 {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(SourceError::RateLimited(retry_after));
    }

    if !response.status().is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SourceError::Api(format!("{} failed: {}", method, body)));
    }

    Ok(response)
}

enum ApiResult<T> {
    Ok(T),
    Failed(ApiError),
}

#[derive(Deserialize)]
struct Envelope<T> {
    response: Option<T>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error_code: i64,
    #[serde(default)]
    error_msg: String,
}

impl ApiError {
    fn is_not_visible(&self) -> bool {
        matches!(
            self.error_code,
            ERROR_ACCESS_DENIED | ERROR_DELETED | ERROR_PRIVATE
        )
    }

    fn into_source_error(self) -> SourceError {
        match self.error_code {
            ERROR_AUTH => SourceError::Auth(self.error_msg),
            ERROR_TOO_MANY_REQUESTS | ERROR_FLOOD | ERROR_RATE_LIMIT => {
                SourceError::RateLimited(None)
            }
            code => SourceError::Api(format!("error {}: {}", code, self.error_msg)),
        }
    }
}

#[derive(Deserialize)]
struct WallPage {
    #[serde(default)]
    items: Vec<WallItem>,
}

/// `wall.getById` answers with a bare list in older API versions
#[derive(Deserialize)]
#[serde(untagged)]
enum ByIdResponse {
    Page(WallPage),
    List(Vec<WallItem>),
}

impl ByIdResponse {
    fn into_items(self) -> Vec<WallItem> {
        match self {
            ByIdResponse::Page(page) => page.items,
            ByIdResponse::List(items) => items,
        }
    }
}

#[derive(Deserialize)]
struct WallItem {
    id: i64,
    owner_id: i64,
    #[serde(default)]
    from_id: Option<i64>,
    date: i64,
    #[serde(default)]
    text: String,
    #[serde(default)]
    views: Option<Views>,
    #[serde(default)]
    attachments: Vec<RawAttachment>,
    #[serde(default)]
    copy_history: Vec<WallItem>,
}

#[derive(Deserialize)]
struct Views {
    count: u64,
}

#[derive(Deserialize)]
struct RawAttachment {
    r#type: String,
    #[serde(default)]
    photo: Option<RawMedia>,
    #[serde(default)]
    video: Option<RawMedia>,
    #[serde(default)]
    audio: Option<RawMedia>,
}

#[derive(Deserialize)]
struct RawMedia {
    id: i64,
    owner_id: i64,
    /// Photo size variants
    #[serde(default)]
    sizes: Vec<RawSize>,
    /// Video preview frames
    #[serde(default)]
    image: Vec<RawSize>,
}

#[derive(Deserialize)]
struct RawSize {
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    url: String,
}

impl RawAttachment {
    fn into_attachment(self) -> Option<Attachment> {
        let (kind, media) = match self.r#type.as_str() {
            "photo" => (AttachmentKind::Photo, self.photo?),
            "video" => (AttachmentKind::Video, self.video?),
            "audio" => (AttachmentKind::Audio, self.audio?),
            _ => {
                return Some(Attachment {
                    kind: AttachmentKind::Other,
                    owner_id: 0,
                    id: 0,
                    sizes: vec![],
                });
            }
        };

        let sizes = media
            .sizes
            .into_iter()
            .chain(media.image)
            .map(|s| PhotoSize {
                width: s.width,
                height: s.height,
                url: s.url,
            })
            .collect();

        Some(Attachment {
            kind,
            owner_id: media.owner_id,
            id: media.id,
            sizes,
        })
    }
}

impl WallItem {
    fn into_post(self) -> Result<Post, SourceError> {
        let published_at = OffsetDateTime::from_unix_timestamp(self.date)
            .map_err(|e| SourceError::Api(format!("Bad date on post {}: {}", self.id, e)))?;

        // copy_history lists the chain outermost first; fold it into nested reshares
        let mut reshared_from: Option<Box<Post>> = None;
        for item in self.copy_history.into_iter().rev() {
            let mut inner = item.into_post()?;
            inner.reshared_from = reshared_from.take();
            reshared_from = Some(Box::new(inner));
        }

        Ok(Post {
            id: self.id,
            owner_id: self.owner_id,
            author_id: self.from_id.unwrap_or(self.owner_id),
            text: self.text,
            published_at,
            popularity: self.views.map(|v| v.count),
            attachments: self
                .attachments
                .into_iter()
                .filter_map(RawAttachment::into_attachment)
                .collect(),
            reshared_from,
        })
    }
}

#[async_trait]
impl SourceReader for WallSource {
    async fn fetch_posts(
        &self,
        account: &str,
        group_id: i64,
        offset: u32,
        count: u32,
    ) -> Result<Vec<Post>, SourceError> {
        tracing::debug!(account = %account, group_id, offset, count, "Fetching wall");

        let page: WallPage = match self
            .call(
                account,
                "wall.get",
                &[
                    ("owner_id", group_id.to_string()),
                    ("offset", offset.to_string()),
                    ("count", count.to_string()),
                ],
            )
            .await?
        {
            ApiResult::Ok(page) => page,
            ApiResult::Failed(error) => return Err(error.into_source_error()),
        };

        let posts = page
            .items
            .into_iter()
            .map(WallItem::into_post)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(group_id, count = posts.len(), "Fetched wall");

        Ok(posts)
    }

    async fn fetch_post(
        &self,
        account: &str,
        owner_id: i64,
        post_id: i64,
    ) -> Result<Option<Post>, SourceError> {
        let response: ByIdResponse = match self
            .call(
                account,
                "wall.getById",
                &[("posts", format!("{}_{}", owner_id, post_id))],
            )
            .await?
        {
            ApiResult::Ok(response) => response,
            ApiResult::Failed(error) if error.is_not_visible() => return Ok(None),
            ApiResult::Failed(error) => return Err(error.into_source_error()),
        };

        response
            .into_items()
            .into_iter()
            .next()
            .map(WallItem::into_post)
            .transpose()
    }
}
