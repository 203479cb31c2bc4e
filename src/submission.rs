//! Request and response shapes exchanged between the composer and the
//! submission endpoint.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

pub const CONFIG_ERROR: &str = "Twitter API credentials are not configured";
pub const POST_ERROR: &str = "Failed to post tweet";
pub const SUCCESS_MESSAGE: &str = "Tweet posted successfully";

/// One submission: the post text, its media, and the optional auto-reply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
    #[serde(default)]
    pub text: String,
    #[serde(rename = "files", default)]
    pub media: Vec<MediaItem>,
    #[serde(default)]
    pub reply_text: Option<String>,
}

/// A media file carried inline, either as a `data:` URI or as bare base64.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("data URI has no payload")]
    MissingPayload,

    #[error("payload is empty")]
    Empty,

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl MediaItem {
    pub fn from_bytes(name: Option<String>, mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            name,
            mime_type: mime_type.to_string(),
            data: format!("data:{mime_type};base64,{}", BASE64.encode(bytes)),
        }
    }

    pub fn decode(&self) -> Result<Vec<u8>, PayloadError> {
        let payload = match self.data.strip_prefix("data:") {
            Some(uri) => {
                uri.split_once(',')
                    .ok_or(PayloadError::MissingPayload)?
                    .1
            }
            None => self.data.as_str(),
        };

        let bytes = BASE64.decode(payload.trim())?;
        if bytes.is_empty() {
            return Err(PayloadError::Empty);
        }
        Ok(bytes)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessBody {
    pub success: bool,
    pub tweet_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default)]
    pub details: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Configuration,
    Posting,
    Transport,
    InvalidResponse,
}

/// Outcome of one submission as seen by the composer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitResponse {
    Posted {
        tweet_id: String,
        message: String,
    },
    Failed {
        kind: FailureKind,
        error: String,
        details: String,
    },
}

impl SubmitResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, SubmitResponse::Posted { .. })
    }
}

impl From<ErrorBody> for SubmitResponse {
    fn from(body: ErrorBody) -> Self {
        let kind = if body.error == CONFIG_ERROR {
            FailureKind::Configuration
        } else {
            FailureKind::Posting
        };
        SubmitResponse::Failed {
            kind,
            error: body.error,
            details: body.details,
        }
    }
}
