mod config;
mod server;

use chrono::Utc;
use clap::{Parser, Subcommand};
use config::{build_coordinator, ChatArgs, DynCoordinator, ProviderArgs};
use pdf_chat_core::{load_documents, ChatError, Conversation, RegistryLimits, SessionRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-chat", version, about = "Ask questions about a batch of PDFs")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    providers: ProviderArgs,

    #[command(flatten)]
    chat: ChatArgs,
}

#[derive(Subcommand)]
enum Command {
    /// Load every PDF in a folder and chat about them interactively.
    Chat {
        /// Folder holding the PDFs (not searched recursively).
        #[arg(long)]
        folder: PathBuf,
    },
    /// Load a folder of PDFs and answer a single question.
    Ask {
        #[arg(long)]
        folder: PathBuf,
        #[arg(long)]
        question: String,
    },
    /// Serve the upload/ask HTTP API.
    Serve {
        #[arg(long, env = "PDF_CHAT_BIND", default_value = "127.0.0.1:8000")]
        bind: String,
        /// Maximum live sessions; the least recently used is evicted beyond it.
        #[arg(long, env = "PDF_CHAT_MAX_SESSIONS")]
        max_sessions: Option<usize>,
        /// Seconds an idle session is kept.
        #[arg(long, env = "PDF_CHAT_SESSION_TTL_SECS")]
        session_ttl_secs: Option<u64>,
        /// Largest accepted upload request, in megabytes.
        #[arg(long, env = "PDF_CHAT_MAX_UPLOAD_MB", default_value_t = server::DEFAULT_MAX_UPLOAD_MB)]
        max_upload_mb: usize,
    },
    /// Send a tiny request to confirm the configured API key works.
    CheckCredentials,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "pdf-chat boot"
    );

    let coordinator = build_coordinator(&cli.providers, &cli.chat)?;

    match cli.command {
        Command::Chat { folder } => run_chat(&coordinator, &folder).await?,
        Command::Ask { folder, question } => {
            let mut conversation = Conversation::new();
            load_folder(&coordinator, &mut conversation, &folder).await?;
            let answer = conversation.ask(&coordinator, &question).await?;
            println!("{answer}");
        }
        Command::Serve {
            bind,
            max_sessions,
            session_ttl_secs,
            max_upload_mb,
        } => {
            let limits = RegistryLimits {
                max_sessions,
                idle_ttl: session_ttl_secs.map(Duration::from_secs),
            };
            let registry = SessionRegistry::new(coordinator, limits)?;
            let max_upload_bytes = max_upload_mb.saturating_mul(1024 * 1024);
            server::serve(Arc::new(registry), &bind, max_upload_bytes).await?;
        }
        Command::CheckCredentials => {
            let reply = coordinator
                .check_generation("Reply with the single word: ready")
                .await?;
            println!(
                "credentials ok: {} replied {:?}",
                coordinator.settings().model,
                reply.trim()
            );
        }
    }

    Ok(())
}

async fn load_folder(
    coordinator: &DynCoordinator,
    conversation: &mut Conversation,
    folder: &Path,
) -> Result<(), ChatError> {
    let documents = load_documents(folder)?;
    let document_count = documents.len();
    let chunks = conversation.ingest(coordinator, documents).await?;

    info!(folder = %folder.display(), documents = document_count, chunks, "folder loaded");
    println!("Loaded {document_count} PDF(s) into {chunks} chunks.");
    Ok(())
}

async fn run_chat(coordinator: &DynCoordinator, folder: &Path) -> anyhow::Result<()> {
    let mut conversation = Conversation::new();
    load_folder(coordinator, &mut conversation, folder).await?;
    println!("Ask a question about your PDFs. Type 'exit' to quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"You: ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();

        if question.eq_ignore_ascii_case("exit") {
            break;
        }
        if question.is_empty() {
            continue;
        }

        match conversation.ask(coordinator, question).await {
            Ok(answer) => println!("Bot: {answer}\n"),
            Err(error) => {
                warn!(kind = error.kind(), %error, "question failed");
                eprintln!("error: {error}");
            }
        }
    }

    Ok(())
}
