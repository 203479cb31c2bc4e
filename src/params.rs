use schemars::JsonSchema;
use serde::Deserialize;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SubmitPostParams {
    #[schemars(description = "The post text (max 280 characters). May be empty when media is attached.")]
    #[serde(default)]
    pub text: String,
    #[schemars(description = "Optional local file paths of up to 4 images or videos to attach (jpeg, png, gif, webp, mp4, mov)")]
    #[serde(default)]
    pub media: Vec<String>,
    #[schemars(description = "Optional text of a reply to post beneath the new post. Omit to post no reply.")]
    pub reply_text: Option<String>,
}
