use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::submission::{ErrorBody, FailureKind, SubmissionRequest, SubmitResponse, SuccessBody};

/// Delivers a submission to the orchestrator and reports how it went.
#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(&self, request: &SubmissionRequest) -> SubmitResponse;
}

pub struct HttpSubmitter {
    http: Client,
    endpoint: String,
}

impl HttpSubmitter {
    /// `server` is the base URL of a running `oretter serve`.
    pub fn new(server: &str) -> Result<Self, reqwest::Error> {
        // Video uploads can take a while server-side.
        let http = Client::builder().timeout(Duration::from_secs(300)).build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/api/tweet", server.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl Submitter for HttpSubmitter {
    async fn submit(&self, request: &SubmissionRequest) -> SubmitResponse {
        let resp = match self.http.post(&self.endpoint).json(request).send().await {
            Ok(resp) => resp,
            Err(e) => {
                return SubmitResponse::Failed {
                    kind: FailureKind::Transport,
                    error: format!("Could not reach {}", self.endpoint),
                    details: e.to_string(),
                };
            }
        };

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        interpret(status, &body)
    }
}

fn interpret(status: StatusCode, body: &str) -> SubmitResponse {
    if status.is_success() {
        return match serde_json::from_str::<SuccessBody>(body) {
            Ok(ok) if ok.success => SubmitResponse::Posted {
                tweet_id: ok.tweet_id,
                message: ok.message,
            },
            _ => invalid(status, body),
        };
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(err) => err.into(),
        Err(_) => invalid(status, body),
    }
}

fn invalid(status: StatusCode, body: &str) -> SubmitResponse {
    SubmitResponse::Failed {
        kind: FailureKind::InvalidResponse,
        error: format!("Unexpected response ({status})"),
        details: body.chars().take(200).collect(),
    }
}
