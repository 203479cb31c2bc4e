//! Turns one [`SubmissionRequest`] into a primary post and, when asked for,
//! a reply chained beneath it.
//!
//! Only a missing credential or a failed primary post fail the request.
//! Media uploads and the reply are best effort: failures are logged and the
//! rest of the submission carries on.

use crate::api::{ApiError, MediaId, NewPost, PostId, PostingService, XClient};
use crate::config::{ConfigError, Credentials};
use crate::submission::{MediaItem, PayloadError, SubmissionRequest};

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error("{0}")]
    Post(String),
}

#[derive(Debug, thiserror::Error)]
pub enum MediaUploadError {
    #[error("could not decode media payload: {0}")]
    Decode(#[from] PayloadError),

    #[error("upload failed: {0}")]
    Upload(#[from] ApiError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostResult {
    pub primary_post_id: PostId,
    pub reply_posted: bool,
}

pub struct Orchestrator<S> {
    service: Result<S, ConfigError>,
}

impl Orchestrator<XClient> {
    /// Reads the credential from the environment. Missing credentials do not
    /// stop the process; every submission reports them instead.
    pub fn from_env() -> Result<Self, ApiError> {
        match Credentials::from_env() {
            Ok(credentials) => Ok(Self::new(XClient::new(credentials)?)),
            Err(e) => {
                tracing::warn!(error = %e, "starting without posting credentials");
                Ok(Self::unconfigured(e))
            }
        }
    }
}

impl<S: PostingService> Orchestrator<S> {
    pub fn new(service: S) -> Self {
        Self {
            service: Ok(service),
        }
    }

    pub fn unconfigured(error: ConfigError) -> Self {
        Self { service: Err(error) }
    }

    pub fn service(&self) -> Result<&S, ConfigError> {
        self.service.as_ref().map_err(Clone::clone)
    }

    pub async fn submit(&self, request: SubmissionRequest) -> Result<PostResult, SubmitError> {
        let service = self.service()?;

        let outcomes = upload_all(service, &request.media).await;
        let media_ids: Vec<MediaId> = outcomes.into_iter().filter_map(Result::ok).collect();
        tracing::info!(
            submitted = request.media.len(),
            uploaded = media_ids.len(),
            "media upload phase finished"
        );

        if request.text.trim().is_empty() && media_ids.is_empty() {
            return Err(SubmitError::Post(
                "post has no text and none of its media could be uploaded".into(),
            ));
        }

        let primary_post_id = service
            .create_post(NewPost {
                text: request.text,
                media_ids,
                reply_to: None,
            })
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "primary post failed");
                SubmitError::Post(e.to_string())
            })?;
        tracing::info!(post_id = %primary_post_id, "primary post created");

        let reply_posted = match request.reply_text.filter(|text| !text.is_empty()) {
            Some(text) => post_reply(service, text, &primary_post_id).await,
            None => false,
        };

        Ok(PostResult {
            primary_post_id,
            reply_posted,
        })
    }
}

/// Uploads each item in order, one at a time. Every item yields exactly one
/// outcome; a failed item never stops the ones after it.
async fn upload_all<S: PostingService>(
    service: &S,
    items: &[MediaItem],
) -> Vec<Result<MediaId, MediaUploadError>> {
    let mut outcomes = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let outcome = upload_one(service, item).await;
        match &outcome {
            Ok(id) => tracing::debug!(index, media_id = %id, "media uploaded"),
            Err(e) => tracing::warn!(
                index,
                mime_type = %item.mime_type,
                error = %e,
                "skipping media item"
            ),
        }
        outcomes.push(outcome);
    }
    outcomes
}

async fn upload_one<S: PostingService>(
    service: &S,
    item: &MediaItem,
) -> Result<MediaId, MediaUploadError> {
    let bytes = item.decode()?;
    Ok(service.upload_media(bytes, &item.mime_type).await?)
}

async fn post_reply<S: PostingService>(service: &S, text: String, parent: &PostId) -> bool {
    let reply = NewPost {
        text,
        media_ids: Vec::new(),
        reply_to: Some(parent.clone()),
    };
    match service.create_post(reply).await {
        Ok(id) => {
            tracing::info!(post_id = %id, parent = %parent, "reply posted");
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, parent = %parent, "reply failed, primary post stands");
            false
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::api::Account;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Upload(Vec<u8>, String),
        Post(String, Vec<MediaId>, Option<PostId>),
    }

    /// Scripted posting service. Upload calls are numbered from 1 in the
    /// order they arrive.
    #[derive(Default)]
    pub struct FakeService {
        pub calls: Mutex<Vec<Call>>,
        pub failing_uploads: Vec<usize>,
        pub fail_primary: bool,
        pub fail_reply: bool,
    }

    fn rejected() -> ApiError {
        ApiError::Status {
            status: StatusCode::FORBIDDEN,
            body: "forbidden".into(),
        }
    }

    #[async_trait]
    impl PostingService for FakeService {
        async fn verify_credentials(&self) -> Result<Account, ApiError> {
            Ok(Account {
                id: "1".into(),
                name: "Tester".into(),
                username: "tester".into(),
            })
        }

        async fn upload_media(&self, bytes: Vec<u8>, mime_type: &str) -> Result<MediaId, ApiError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call::Upload(bytes, mime_type.to_string()));
            let n = calls
                .iter()
                .filter(|c| matches!(c, Call::Upload(..)))
                .count();
            if self.failing_uploads.contains(&n) {
                return Err(rejected());
            }
            Ok(MediaId(format!("media-{n}")))
        }

        async fn create_post(&self, post: NewPost) -> Result<PostId, ApiError> {
            let is_reply = post.reply_to.is_some();
            self.calls
                .lock()
                .unwrap()
                .push(Call::Post(post.text, post.media_ids, post.reply_to));
            match (is_reply, self.fail_primary, self.fail_reply) {
                (false, true, _) | (true, _, true) => Err(rejected()),
                (false, ..) => Ok(PostId("100".into())),
                (true, ..) => Ok(PostId("101".into())),
            }
        }
    }

    fn item(bytes: &[u8]) -> MediaItem {
        MediaItem::from_bytes(None, "image/png", bytes)
    }

    fn posts(service: &FakeService) -> Vec<Call> {
        service
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, Call::Post(..)))
            .cloned()
            .collect()
    }

    #[tokio::test]
    async fn failed_upload_is_dropped_and_order_kept() {
        let orchestrator = Orchestrator::new(FakeService {
            failing_uploads: vec![2],
            ..Default::default()
        });

        let result = orchestrator
            .submit(SubmissionRequest {
                text: "three pictures".into(),
                media: vec![item(b"one"), item(b"two"), item(b"three")],
                reply_text: None,
            })
            .await
            .unwrap();

        assert_eq!(result.primary_post_id, PostId("100".into()));
        let service = orchestrator.service().unwrap();
        assert_eq!(service.calls.lock().unwrap().len(), 4);
        assert_eq!(
            posts(service),
            vec![Call::Post(
                "three pictures".into(),
                vec![MediaId("media-1".into()), MediaId("media-3".into())],
                None,
            )]
        );
    }

    #[tokio::test]
    async fn uploads_decoded_bytes_in_submission_order() {
        let orchestrator = Orchestrator::new(FakeService::default());
        orchestrator
            .submit(SubmissionRequest {
                text: "".into(),
                media: vec![item(b"first"), item(b"second")],
                reply_text: None,
            })
            .await
            .unwrap();

        let calls = orchestrator.service().unwrap().calls.lock().unwrap().clone();
        assert_eq!(calls[0], Call::Upload(b"first".to_vec(), "image/png".into()));
        assert_eq!(calls[1], Call::Upload(b"second".to_vec(), "image/png".into()));
    }

    #[tokio::test]
    async fn undecodable_item_is_skipped_without_upload() {
        let orchestrator = Orchestrator::new(FakeService::default());
        let broken = MediaItem {
            name: Some("broken.png".into()),
            mime_type: "image/png".into(),
            data: "data:image/png;base64,%%%".into(),
        };

        orchestrator
            .submit(SubmissionRequest {
                text: "".into(),
                media: vec![broken, item(b"ok")],
                reply_text: None,
            })
            .await
            .unwrap();

        let service = orchestrator.service().unwrap();
        assert_eq!(
            posts(service),
            vec![Call::Post("".into(), vec![MediaId("media-1".into())], None)]
        );
    }

    #[tokio::test]
    async fn reply_failure_keeps_overall_success() {
        let orchestrator = Orchestrator::new(FakeService {
            fail_reply: true,
            ..Default::default()
        });

        let result = orchestrator
            .submit(SubmissionRequest {
                text: "hello".into(),
                media: vec![],
                reply_text: Some("auto-note".into()),
            })
            .await
            .unwrap();

        assert_eq!(result.primary_post_id, PostId("100".into()));
        assert!(!result.reply_posted);
        assert_eq!(
            posts(orchestrator.service().unwrap())[1],
            Call::Post("auto-note".into(), vec![], Some(PostId("100".into())))
        );
    }

    #[tokio::test]
    async fn reply_is_chained_to_primary() {
        let orchestrator = Orchestrator::new(FakeService::default());
        let result = orchestrator
            .submit(SubmissionRequest {
                text: "hello".into(),
                media: vec![],
                reply_text: Some("auto-note".into()),
            })
            .await
            .unwrap();

        assert!(result.reply_posted);
        assert_eq!(posts(orchestrator.service().unwrap()).len(), 2);
    }

    #[tokio::test]
    async fn empty_reply_text_posts_no_reply() {
        let orchestrator = Orchestrator::new(FakeService::default());
        let result = orchestrator
            .submit(SubmissionRequest {
                text: "hello".into(),
                media: vec![],
                reply_text: Some(String::new()),
            })
            .await
            .unwrap();

        assert!(!result.reply_posted);
        assert_eq!(posts(orchestrator.service().unwrap()).len(), 1);
    }

    #[tokio::test]
    async fn primary_failure_fails_request_and_skips_reply() {
        let orchestrator = Orchestrator::new(FakeService {
            fail_primary: true,
            ..Default::default()
        });

        let err = orchestrator
            .submit(SubmissionRequest {
                text: "hello".into(),
                media: vec![],
                reply_text: Some("auto-note".into()),
            })
            .await
            .unwrap_err();

        match err {
            SubmitError::Post(detail) => assert!(detail.contains("403")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(posts(orchestrator.service().unwrap()).len(), 1);
    }

    #[tokio::test]
    async fn blank_post_with_no_surviving_media_is_rejected() {
        let orchestrator = Orchestrator::new(FakeService {
            failing_uploads: vec![1],
            ..Default::default()
        });

        let err = orchestrator
            .submit(SubmissionRequest {
                text: "  ".into(),
                media: vec![item(b"bad")],
                reply_text: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SubmitError::Post(_)));
        assert!(posts(orchestrator.service().unwrap()).is_empty());
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_any_call() {
        let orchestrator: Orchestrator<FakeService> =
            Orchestrator::unconfigured(ConfigError::MissingCredential("TWITTER_API_KEY"));

        let err = orchestrator
            .submit(SubmissionRequest {
                text: "hello".into(),
                media: vec![item(b"one")],
                reply_text: Some("auto-note".into()),
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SubmitError::Configuration(ConfigError::MissingCredential("TWITTER_API_KEY"))
        ));
    }
}
