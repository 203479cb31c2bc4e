use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::config::Credentials;
use crate::oauth::Signer;

const TWEETS_URL: &str = "https://api.x.com/2/tweets";
const MEDIA_UPLOAD_URL: &str = "https://upload.twitter.com/1.1/media/upload.json";
const ME_URL: &str = "https://api.x.com/2/users/me";

const MAX_IMAGE_SIZE: usize = 5 * 1024 * 1024; // 5MB
const MAX_VIDEO_SIZE: usize = 512 * 1024 * 1024; // 512MB
const CHUNK_SIZE: usize = 4 * 1024 * 1024;
const MAX_STATUS_CHECKS: u32 = 60;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("X API error ({status}): {body}")]
    Status { status: StatusCode, body: String },

    #[error("Rate limited (429). {reset}Try again later.")]
    RateLimited { reset: String },

    #[error("Failed to parse {what} response: {message}")]
    Parse { what: &'static str, message: String },

    #[error("Media too large: {size} bytes (max {max} bytes for {mime_type})")]
    MediaTooLarge {
        size: usize,
        max: usize,
        mime_type: String,
    },

    #[error("Media processing failed: {0}")]
    Processing(String),
}

/// Opaque identifier of an uploaded media blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(pub String);

/// Opaque identifier of a created post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub String);

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub username: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub text: String,
    pub media_ids: Vec<MediaId>,
    pub reply_to: Option<PostId>,
}

/// The three operations the orchestrator needs from the posting service.
#[async_trait]
pub trait PostingService: Send + Sync {
    /// Checks that the configured credential is accepted.
    async fn verify_credentials(&self) -> Result<Account, ApiError>;

    async fn upload_media(&self, bytes: Vec<u8>, mime_type: &str) -> Result<MediaId, ApiError>;

    async fn create_post(&self, post: NewPost) -> Result<PostId, ApiError>;
}

#[derive(Serialize)]
struct TweetBody {
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    media: Option<TweetMedia>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<TweetReply>,
}

#[derive(Serialize)]
struct TweetMedia {
    media_ids: Vec<MediaId>,
}

#[derive(Serialize)]
struct TweetReply {
    in_reply_to_tweet_id: PostId,
}

impl From<NewPost> for TweetBody {
    fn from(post: NewPost) -> Self {
        Self {
            text: post.text,
            media: (!post.media_ids.is_empty()).then(|| TweetMedia {
                media_ids: post.media_ids,
            }),
            reply: post.reply_to.map(|id| TweetReply {
                in_reply_to_tweet_id: id,
            }),
        }
    }
}

#[derive(Deserialize)]
struct TweetResponse {
    data: TweetData,
}

#[derive(Deserialize)]
struct TweetData {
    id: String,
}

#[derive(Deserialize)]
struct MeResponse {
    data: Account,
}

#[derive(Deserialize)]
struct MediaResponse {
    media_id_string: String,
    #[serde(default)]
    processing_info: Option<ProcessingInfo>,
}

#[derive(Deserialize)]
struct StatusResponse {
    #[serde(default)]
    processing_info: Option<ProcessingInfo>,
}

#[derive(Debug, Deserialize)]
struct ProcessingInfo {
    state: String,
    #[serde(default)]
    check_after_secs: Option<u64>,
    #[serde(default)]
    error: Option<ProcessingError>,
}

#[derive(Debug, Deserialize)]
struct ProcessingError {
    #[serde(default)]
    message: Option<String>,
}

pub struct XClient {
    signer: Signer,
    http: Client,
}

impl XClient {
    pub fn new(credentials: Credentials) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            signer: Signer::new(credentials),
            http,
        })
    }

    async fn upload_simple(&self, bytes: Vec<u8>, mime_type: &str) -> Result<MediaId, ApiError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name("media")
            .mime_str(mime_type)?;
        let form = reqwest::multipart::Form::new().part("media", part);

        // Multipart bodies contribute no parameters to the signature.
        let auth = self.signer.header("POST", MEDIA_UPLOAD_URL, &BTreeMap::new());
        let resp = self
            .http
            .post(MEDIA_UPLOAD_URL)
            .header("Authorization", auth)
            .multipart(form)
            .send()
            .await?;

        let media: MediaResponse = parse(check(resp).await?, "media upload").await?;
        Ok(MediaId(media.media_id_string))
    }

    async fn upload_chunked(&self, bytes: Vec<u8>, mime_type: &str) -> Result<MediaId, ApiError> {
        let init = form_params(&[
            ("command", "INIT"),
            ("total_bytes", &bytes.len().to_string()),
            ("media_type", mime_type),
            ("media_category", "tweet_video"),
        ]);
        let media: MediaResponse = self.post_form(&init, "media INIT").await?;
        let media_id = media.media_id_string;

        for (index, chunk) in bytes.chunks(CHUNK_SIZE).enumerate() {
            let form = reqwest::multipart::Form::new()
                .text("command", "APPEND")
                .text("media_id", media_id.clone())
                .text("segment_index", index.to_string())
                .part(
                    "media",
                    reqwest::multipart::Part::bytes(chunk.to_vec()).file_name("media"),
                );

            let auth = self.signer.header("POST", MEDIA_UPLOAD_URL, &BTreeMap::new());
            let resp = self
                .http
                .post(MEDIA_UPLOAD_URL)
                .header("Authorization", auth)
                .multipart(form)
                .send()
                .await?;
            check(resp).await?;
            tracing::debug!(media_id = %media_id, segment = index, "appended media segment");
        }

        let finalize = form_params(&[("command", "FINALIZE"), ("media_id", &media_id)]);
        let media: MediaResponse = self.post_form(&finalize, "media FINALIZE").await?;
        self.await_processing(&media_id, media.processing_info).await?;

        Ok(MediaId(media_id))
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        params: &BTreeMap<String, String>,
        what: &'static str,
    ) -> Result<T, ApiError> {
        let auth = self.signer.header("POST", MEDIA_UPLOAD_URL, params);
        let resp = self
            .http
            .post(MEDIA_UPLOAD_URL)
            .header("Authorization", auth)
            .form(params)
            .send()
            .await?;
        parse(check(resp).await?, what).await
    }

    async fn await_processing(
        &self,
        media_id: &str,
        info: Option<ProcessingInfo>,
    ) -> Result<(), ApiError> {
        poll_processing(media_id, info, MAX_STATUS_CHECKS, move || async move {
            let params = form_params(&[("command", "STATUS"), ("media_id", media_id)]);
            let auth = self.signer.header("GET", MEDIA_UPLOAD_URL, &params);
            let resp = self
                .http
                .get(MEDIA_UPLOAD_URL)
                .header("Authorization", auth)
                .query(&params)
                .send()
                .await?;
            let status: StatusResponse = parse(check(resp).await?, "media STATUS").await?;
            Ok(status.processing_info)
        })
        .await
    }
}

/// Waits on `info` until processing settles, fetching a fresh status at most
/// `max_checks` times. The last fetched status is judged before giving up.
async fn poll_processing<F, Fut>(
    media_id: &str,
    mut info: Option<ProcessingInfo>,
    max_checks: u32,
    mut fetch: F,
) -> Result<(), ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<ProcessingInfo>, ApiError>>,
{
    let mut checks = 0;
    loop {
        let Some(current) = info.take() else {
            return Ok(());
        };
        match current.state.as_str() {
            "succeeded" => return Ok(()),
            "failed" => {
                let message = current
                    .error
                    .and_then(|e| e.message)
                    .unwrap_or_else(|| "unknown error".into());
                return Err(ApiError::Processing(message));
            }
            state => {
                if checks == max_checks {
                    return Err(ApiError::Processing(format!(
                        "media {media_id} still processing after {max_checks} checks"
                    )));
                }
                let wait = current.check_after_secs.unwrap_or(1);
                tracing::debug!(media_id, state, wait, "waiting for media processing");
                tokio::time::sleep(Duration::from_secs(wait)).await;
            }
        }

        info = fetch().await?;
        checks += 1;
    }
}

#[async_trait]
impl PostingService for XClient {
    async fn verify_credentials(&self) -> Result<Account, ApiError> {
        let auth = self.signer.header("GET", ME_URL, &BTreeMap::new());
        let resp = self
            .http
            .get(ME_URL)
            .header("Authorization", auth)
            .send()
            .await?;

        let me: MeResponse = parse(check(resp).await?, "user").await?;
        Ok(me.data)
    }

    async fn upload_media(&self, bytes: Vec<u8>, mime_type: &str) -> Result<MediaId, ApiError> {
        let max = max_media_size(mime_type);
        if bytes.len() > max {
            return Err(ApiError::MediaTooLarge {
                size: bytes.len(),
                max,
                mime_type: mime_type.to_string(),
            });
        }

        if is_video(mime_type) {
            self.upload_chunked(bytes, mime_type).await
        } else {
            self.upload_simple(bytes, mime_type).await
        }
    }

    async fn create_post(&self, post: NewPost) -> Result<PostId, ApiError> {
        let body = TweetBody::from(post);

        let auth = self.signer.header("POST", TWEETS_URL, &BTreeMap::new());
        let resp = self
            .http
            .post(TWEETS_URL)
            .header("Authorization", auth)
            .json(&body)
            .send()
            .await?;

        let tweet: TweetResponse = parse(check(resp).await?, "tweet").await?;
        Ok(PostId(tweet.data.id))
    }
}

fn is_video(mime_type: &str) -> bool {
    mime_type.starts_with("video/")
}

fn max_media_size(mime_type: &str) -> usize {
    if is_video(mime_type) {
        MAX_VIDEO_SIZE
    } else {
        MAX_IMAGE_SIZE
    }
}

fn form_params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

async fn check(resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED {
        tracing::error!(
            "Received 401 Unauthorized from X API. \
             Your OAuth credentials may be revoked or invalid. \
             Regenerate them at https://developer.x.com/"
        );
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        let reset = resp
            .headers()
            .get("x-rate-limit-reset")
            .and_then(|v| v.to_str().ok())
            .map(|v| format!("Rate limit resets at timestamp {v}. "))
            .unwrap_or_default();
        return Err(ApiError::RateLimited { reset });
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ApiError::Status { status, body });
    }
    Ok(resp)
}

async fn parse<T: DeserializeOwned>(
    resp: Response,
    what: &'static str,
) -> Result<T, ApiError> {
    resp.json().await.map_err(|e| ApiError::Parse {
        what,
        message: e.to_string(),
    })
}
