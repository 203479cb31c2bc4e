//! Client-side composition state: the text, the attached media, the
//! auto-reply preferences, and the local checks made before anything is
//! sent to the submission endpoint.

use std::path::Path;

use crate::client::Submitter;
use crate::config::ConfigError;
use crate::prefs::{PreferenceStore, Preferences};
use crate::submission::{MediaItem, SubmissionRequest, SubmitResponse};

pub const MAX_POST_LENGTH: usize = 280;
pub const MAX_ATTACHMENTS: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("add some text or media before posting")]
    Empty,

    #[error("post is {over} characters over the {MAX_POST_LENGTH} character limit")]
    OverLimit { over: usize },

    #[error("at most {MAX_ATTACHMENTS} media files can be attached")]
    TooManyAttachments,

    #[error("cannot read {path}: {source}")]
    Unreadable {
        path: String,
        source: std::io::Error,
    },

    #[error("unsupported media format '.{extension}'. Allowed: jpeg, png, gif, webp, mp4, mov, webm")]
    Unsupported { extension: String },

    #[error(transparent)]
    Preferences(#[from] ConfigError),
}

/// Which picker a batch of files came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    fn accepts(self, mime_type: &str) -> bool {
        match self {
            MediaKind::Image => mime_type.starts_with("image/"),
            MediaKind::Video => mime_type.starts_with("video/"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ComposeError> {
        let mime_type = mime_from_path(path)?;
        let bytes = std::fs::read(path).map_err(|source| ComposeError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;
        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        Ok(Self::new(name, mime_type, bytes))
    }

    pub fn to_media_item(&self) -> MediaItem {
        MediaItem::from_bytes(Some(self.name.clone()), &self.mime_type, &self.bytes)
    }
}

fn mime_from_path(path: &Path) -> Result<&'static str, ComposeError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        _ => return Err(ComposeError::Unsupported { extension: ext }),
    };
    Ok(mime)
}

pub struct Composer<P> {
    text: String,
    attachments: Vec<Attachment>,
    preferences: Preferences,
    store: P,
}

impl<P: PreferenceStore> Composer<P> {
    /// Loads preferences once; later changes are written back through `store`.
    pub fn load(store: P) -> Result<Self, ComposeError> {
        let preferences = store.load()?;
        Ok(Self {
            text: String::new(),
            attachments: Vec::new(),
            preferences,
            store,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    /// Characters left before the limit; negative once over it.
    pub fn remaining_chars(&self) -> i64 {
        MAX_POST_LENGTH as i64 - self.text.chars().count() as i64
    }

    pub fn is_over_limit(&self) -> bool {
        self.remaining_chars() < 0
    }

    fn is_blank(&self) -> bool {
        self.text.trim().is_empty() && self.attachments.is_empty()
    }

    pub fn can_submit(&self) -> bool {
        !self.is_over_limit() && !self.is_blank()
    }

    /// Adds one picker selection. A batch that would push the total past
    /// [`MAX_ATTACHMENTS`] is refused whole. Files that don't match `kind`
    /// are dropped. Returns how many were added.
    pub fn attach(&mut self, kind: MediaKind, batch: Vec<Attachment>) -> Result<usize, ComposeError> {
        if self.attachments.len() + batch.len() > MAX_ATTACHMENTS {
            return Err(ComposeError::TooManyAttachments);
        }

        let before = self.attachments.len();
        for attachment in batch {
            if kind.accepts(&attachment.mime_type) {
                self.attachments.push(attachment);
            } else {
                tracing::debug!(
                    name = %attachment.name,
                    mime_type = %attachment.mime_type,
                    ?kind,
                    "dropping file of the wrong kind"
                );
            }
        }
        Ok(self.attachments.len() - before)
    }

    pub fn remove_attachment(&mut self, index: usize) -> Option<Attachment> {
        (index < self.attachments.len()).then(|| self.attachments.remove(index))
    }

    pub fn set_reply_text(&mut self, reply_text: impl Into<String>) -> Result<(), ComposeError> {
        self.preferences.reply_text = reply_text.into();
        self.store.save(&self.preferences)?;
        Ok(())
    }

    pub fn set_auto_reply(&mut self, enabled: bool) -> Result<(), ComposeError> {
        self.preferences.auto_reply_enabled = enabled;
        self.store.save(&self.preferences)?;
        Ok(())
    }

    fn build_request(&self) -> SubmissionRequest {
        SubmissionRequest {
            text: self.text.clone(),
            media: self.attachments.iter().map(Attachment::to_media_item).collect(),
            reply_text: self.preferences.reply_for_submission(),
        }
    }

    /// Sends the current draft once. The draft is cleared only when the post
    /// went through; on failure it is kept so the user can try again. The
    /// `&mut self` borrow rules out a second submission while one is in
    /// flight.
    pub async fn submit<S>(&mut self, submitter: &S) -> Result<SubmitResponse, ComposeError>
    where
        S: Submitter + ?Sized,
    {
        if self.is_blank() {
            return Err(ComposeError::Empty);
        }
        if self.is_over_limit() {
            return Err(ComposeError::OverLimit {
                over: self.remaining_chars().unsigned_abs() as usize,
            });
        }

        let request = self.build_request();
        let response = submitter.submit(&request).await;

        match &response {
            SubmitResponse::Posted { tweet_id, .. } => {
                tracing::info!(tweet_id = %tweet_id, "posted");
                self.text.clear();
                self.attachments.clear();
            }
            SubmitResponse::Failed { kind, error, details } => {
                tracing::warn!(?kind, error = %error, details = %details, "submission failed");
            }
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::{DEFAULT_REPLY_TEXT, MemoryPreferenceStore};
    use crate::submission::FailureKind;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSubmitter {
        requests: Mutex<Vec<SubmissionRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl Submitter for RecordingSubmitter {
        async fn submit(&self, request: &SubmissionRequest) -> SubmitResponse {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                SubmitResponse::Failed {
                    kind: FailureKind::Posting,
                    error: "Failed to post tweet".into(),
                    details: "boom".into(),
                }
            } else {
                SubmitResponse::Posted {
                    tweet_id: "1".into(),
                    message: "ok".into(),
                }
            }
        }
    }

    fn composer() -> Composer<MemoryPreferenceStore> {
        Composer::load(MemoryPreferenceStore::default()).unwrap()
    }

    fn image(name: &str) -> Attachment {
        Attachment::new(name, "image/png", vec![1, 2, 3])
    }

    #[tokio::test]
    async fn blank_draft_is_never_sent() {
        let mut composer = composer();
        composer.set_text("   \n");
        let submitter = RecordingSubmitter::default();

        assert!(!composer.can_submit());
        assert!(matches!(composer.submit(&submitter).await, Err(ComposeError::Empty)));
        assert!(submitter.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn limit_is_counted_in_characters() {
        let mut composer = composer();
        composer.set_text("あ".repeat(280));
        assert_eq!(composer.remaining_chars(), 0);
        assert!(composer.can_submit());

        composer.set_text("a".repeat(283));
        assert_eq!(composer.remaining_chars(), -3);
        assert!(composer.is_over_limit());
        assert!(!composer.can_submit());
    }

    #[tokio::test]
    async fn over_limit_draft_is_refused() {
        let mut composer = composer();
        composer.set_text("a".repeat(281));
        let submitter = RecordingSubmitter::default();

        let err = composer.submit(&submitter).await.unwrap_err();
        assert!(matches!(err, ComposeError::OverLimit { over: 1 }));
        assert!(submitter.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn batch_past_the_limit_leaves_selection_unchanged() {
        let mut composer = composer();
        assert_eq!(composer.attach(MediaKind::Image, vec![image("a"), image("b"), image("c")]).unwrap(), 3);

        let err = composer.attach(MediaKind::Image, vec![image("d"), image("e")]).unwrap_err();
        assert!(matches!(err, ComposeError::TooManyAttachments));
        let names: Vec<_> = composer.attachments().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);

        assert_eq!(composer.attach(MediaKind::Image, vec![image("d")]).unwrap(), 1);
        assert_eq!(composer.attachments().len(), MAX_ATTACHMENTS);
    }

    #[test]
    fn wrong_kind_is_dropped_silently() {
        let mut composer = composer();
        let clip = Attachment::new("clip.mp4", "video/mp4", vec![0]);

        assert_eq!(composer.attach(MediaKind::Image, vec![image("a"), clip.clone()]).unwrap(), 1);
        assert_eq!(composer.attach(MediaKind::Video, vec![clip, image("b")]).unwrap(), 1);
        assert_eq!(composer.attachments()[1].mime_type, "video/mp4");
    }

    #[test]
    fn remove_out_of_range_is_a_no_op() {
        let mut composer = composer();
        composer.attach(MediaKind::Image, vec![image("a")]).unwrap();
        assert!(composer.remove_attachment(3).is_none());
        assert_eq!(composer.remove_attachment(0).unwrap().name, "a");
        assert!(composer.attachments().is_empty());
    }

    #[tokio::test]
    async fn success_clears_the_draft() {
        let mut composer = composer();
        composer.set_text("hello");
        composer.attach(MediaKind::Image, vec![image("a")]).unwrap();
        let submitter = RecordingSubmitter::default();

        let response = composer.submit(&submitter).await.unwrap();
        assert!(response.is_success());
        assert!(composer.text().is_empty());
        assert!(composer.attachments().is_empty());

        let sent = submitter.requests.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].media[0].decode().unwrap(), vec![1, 2, 3]);
        assert_eq!(sent[0].reply_text.as_deref(), Some(DEFAULT_REPLY_TEXT));
    }

    #[tokio::test]
    async fn failure_keeps_the_draft_and_reenables_posting() {
        let mut composer = composer();
        composer.set_text("hello");
        let submitter = RecordingSubmitter {
            fail: true,
            ..Default::default()
        };

        let response = composer.submit(&submitter).await.unwrap();
        assert!(!response.is_success());
        assert_eq!(composer.text(), "hello");
        assert!(composer.can_submit());
    }

    struct StalledSubmitter;

    #[async_trait]
    impl Submitter for StalledSubmitter {
        async fn submit(&self, _request: &SubmissionRequest) -> SubmitResponse {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn abandoned_submission_does_not_block_the_next() {
        let mut composer = composer();
        composer.set_text("hello");

        let abandoned = tokio::time::timeout(
            std::time::Duration::from_millis(10),
            composer.submit(&StalledSubmitter),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(composer.text(), "hello");
        assert!(composer.can_submit());

        let submitter = RecordingSubmitter::default();
        let response = composer.submit(&submitter).await.unwrap();
        assert!(response.is_success());
        assert_eq!(submitter.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn disabled_auto_reply_sends_no_reply() {
        let mut composer = composer();
        composer.set_auto_reply(false).unwrap();
        composer.set_text("hello");
        let submitter = RecordingSubmitter::default();

        composer.submit(&submitter).await.unwrap();
        assert_eq!(submitter.requests.lock().unwrap()[0].reply_text, None);
    }

    #[test]
    fn preference_changes_are_written_back() {
        let mut composer = composer();
        composer.set_reply_text("sent from a terminal").unwrap();
        composer.set_auto_reply(false).unwrap();

        assert_eq!(
            composer.store.saved(),
            Some(Preferences {
                reply_text: "sent from a terminal".into(),
                auto_reply_enabled: false,
            })
        );
    }

    #[test]
    fn preferences_are_loaded_at_startup() {
        let store = MemoryPreferenceStore::with(Preferences {
            reply_text: "custom".into(),
            auto_reply_enabled: true,
        });
        let composer = Composer::load(store).unwrap();
        assert_eq!(composer.preferences().reply_text, "custom");
    }

    #[test]
    fn mime_type_follows_extension() {
        assert_eq!(mime_from_path(Path::new("a.JPG")).unwrap(), "image/jpeg");
        assert_eq!(mime_from_path(Path::new("clip.mov")).unwrap(), "video/quicktime");
        assert!(matches!(
            mime_from_path(Path::new("notes.txt")),
            Err(ComposeError::Unsupported { .. })
        ));
    }
}
