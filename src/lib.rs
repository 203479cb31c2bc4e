//! Compose posts with up to four media items and an optional auto-reply, and
//! submit them to X (Twitter).
//!
//! The [`orchestrator`] is the server side: it uploads media, creates the
//! post and chains the reply. The [`composer`] is the client side: it holds
//! the draft and preferences and sends one [`submission::SubmissionRequest`]
//! through a [`client::Submitter`].

pub mod api;
pub mod client;
pub mod composer;
pub mod config;
pub mod http;
pub mod mcp;
pub mod oauth;
pub mod orchestrator;
pub mod params;
pub mod prefs;
pub mod submission;
