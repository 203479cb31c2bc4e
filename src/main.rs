use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use oretter::api::PostingService;
use oretter::client::HttpSubmitter;
use oretter::composer::{Attachment, Composer, MediaKind};
use oretter::config::ServerConfig;
use oretter::mcp::PostServer;
use oretter::orchestrator::Orchestrator;
use oretter::prefs::TomlPreferenceStore;
use oretter::submission::SubmitResponse;
use rmcp::{ServiceExt, transport::stdio};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "oretter", version, about = "Post to X with media and an automatic reply")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP submission endpoint (POST /api/tweet)
    Serve,
    /// Run as an MCP server on stdio
    Mcp,
    /// Compose a post and send it to a running submission endpoint
    Post {
        /// Post text (max 280 characters)
        #[arg(default_value = "")]
        text: String,
        /// Image file to attach (repeatable)
        #[arg(long = "image")]
        images: Vec<PathBuf>,
        /// Video file to attach (repeatable)
        #[arg(long = "video")]
        videos: Vec<PathBuf>,
        /// Base URL of the submission endpoint
        #[arg(long, env = "ORETTER_SERVER", default_value = "http://127.0.0.1:3000")]
        server: String,
    },
    /// Show or change the auto-reply preferences
    Prefs {
        /// New reply text
        #[arg(long)]
        reply_text: Option<String>,
        /// Turn the automatic reply on or off
        #[arg(long, value_enum)]
        auto_reply: Option<Toggle>,
    },
    /// Check the configured credentials against the X API
    Whoami,
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

fn load_composer() -> anyhow::Result<Composer<TomlPreferenceStore>> {
    let store = TomlPreferenceStore::new(TomlPreferenceStore::default_path());
    let path = store.path().display().to_string();
    Composer::load(store).with_context(|| format!("Failed to load preferences from {path}"))
}

fn read_batch(paths: &[PathBuf]) -> anyhow::Result<Vec<Attachment>> {
    paths
        .iter()
        .map(|p| Attachment::from_path(p).map_err(anyhow::Error::from))
        .collect()
}

async fn post(text: String, images: &[PathBuf], videos: &[PathBuf], server: &str) -> anyhow::Result<()> {
    let mut composer = load_composer()?;
    composer.set_text(text);
    if !images.is_empty() {
        composer.attach(MediaKind::Image, read_batch(images)?)?;
    }
    if !videos.is_empty() {
        composer.attach(MediaKind::Video, read_batch(videos)?)?;
    }

    if composer.is_over_limit() {
        bail!("Post is too long: {} characters remaining", composer.remaining_chars());
    }

    let submitter = HttpSubmitter::new(server)?;
    match composer.submit(&submitter).await? {
        SubmitResponse::Posted { tweet_id, message } => {
            println!("{message}\nID: {tweet_id}\nURL: https://x.com/i/status/{tweet_id}");
            Ok(())
        }
        SubmitResponse::Failed { error, details, .. } => bail!("{error}: {details}"),
    }
}

fn prefs(reply_text: Option<String>, auto_reply: Option<Toggle>) -> anyhow::Result<()> {
    let mut composer = load_composer()?;
    if let Some(text) = reply_text {
        composer.set_reply_text(text)?;
    }
    if let Some(toggle) = auto_reply {
        composer.set_auto_reply(matches!(toggle, Toggle::On))?;
    }

    let current = composer.preferences();
    println!(
        "Auto-reply: {}\nReply text: {}",
        if current.auto_reply_enabled { "on" } else { "off" },
        current.reply_text
    );
    Ok(())
}

async fn serve() -> anyhow::Result<()> {
    let orchestrator = Arc::new(Orchestrator::from_env()?);
    let addr = ServerConfig::from_env()?.socket_addr()?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Submission endpoint listening on {addr}");
    axum::serve(listener, oretter::http::router(orchestrator)).await?;
    Ok(())
}

async fn whoami() -> anyhow::Result<()> {
    let orchestrator = Orchestrator::from_env()?;
    let me = orchestrator.service()?.verify_credentials().await?;
    println!("Authenticated as:\n  Name: {}\n  Username: @{}\n  ID: {}", me.name, me.username, me.id);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oretter=info,tower_http=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Serve => serve().await,
        Command::Mcp => {
            let orchestrator = Arc::new(Orchestrator::from_env()?);
            let service = PostServer::new(orchestrator).serve(stdio()).await?;
            service.waiting().await?;
            Ok(())
        }
        Command::Post {
            text,
            images,
            videos,
            server,
        } => post(text, &images, &videos, &server).await,
        Command::Prefs {
            reply_text,
            auto_reply,
        } => prefs(reply_text, auto_reply),
        Command::Whoami => whoami().await,
    }
}
