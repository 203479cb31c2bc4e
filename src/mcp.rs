use crate::api::{PostingService, XClient};
use crate::composer::{Attachment, MAX_ATTACHMENTS};
use crate::orchestrator::Orchestrator;
use crate::params::SubmitPostParams;
use crate::submission::SubmissionRequest;
use rmcp::{
    ErrorData as McpError, ServerHandler, handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters, model::*, tool, tool_handler, tool_router,
};
use std::path::Path;
use std::sync::Arc;

#[derive(Clone)]
pub struct PostServer {
    orchestrator: Arc<Orchestrator<XClient>>,
    tool_router: ToolRouter<Self>,
}

impl PostServer {
    fn build_request(params: SubmitPostParams) -> Result<SubmissionRequest, McpError> {
        if params.media.len() > MAX_ATTACHMENTS {
            return Err(McpError::invalid_params(
                format!("At most {MAX_ATTACHMENTS} media files can be attached"),
                None,
            ));
        }

        let media = params
            .media
            .iter()
            .map(|path| {
                Attachment::from_path(Path::new(path))
                    .map(|a| a.to_media_item())
                    .map_err(|e| McpError::invalid_params(e.to_string(), None))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SubmissionRequest {
            text: params.text,
            media,
            reply_text: params.reply_text,
        })
    }
}

#[tool_router]
impl PostServer {
    pub fn new(orchestrator: Arc<Orchestrator<XClient>>) -> Self {
        Self {
            orchestrator,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "Post to X (Twitter) with up to 4 images or videos, optionally followed by a reply beneath it. Media that fails to upload is skipped; a failed reply does not fail the post."
    )]
    async fn submit_post(
        &self,
        Parameters(params): Parameters<SubmitPostParams>,
    ) -> Result<CallToolResult, McpError> {
        if let Err(e) = self.orchestrator.service() {
            return Ok(CallToolResult::error(vec![Content::text(e.to_string())]));
        }

        let request = Self::build_request(params)?;
        if request.text.trim().is_empty() && request.media.is_empty() {
            return Err(McpError::invalid_params(
                "Add some text or media before posting",
                None,
            ));
        }

        match self.orchestrator.submit(request).await {
            Ok(result) => {
                let mut text = format!(
                    "Tweet posted!\nID: {id}\nURL: https://x.com/i/status/{id}",
                    id = result.primary_post_id
                );
                if result.reply_posted {
                    text.push_str("\nReply posted beneath it.");
                }
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }

    #[tool(description = "Get the authenticated X (Twitter) user's profile (id, name, username). Useful for verifying credentials.")]
    async fn get_me(&self) -> Result<CallToolResult, McpError> {
        let service = match self.orchestrator.service() {
            Ok(s) => s,
            Err(e) => return Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        };

        match service.verify_credentials().await {
            Ok(me) => {
                let text = format!(
                    "Authenticated as:\n  Name: {}\n  Username: @{}\n  ID: {}",
                    me.name, me.username, me.id
                );
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }
}

#[tool_handler]
impl ServerHandler for PostServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "oretter".to_string(),
                title: None,
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "X (Twitter) posting server. Use submit_post to post text with media and an \
                 optional reply, or get_me to verify credentials."
                    .to_string(),
            ),
        }
    }
}
