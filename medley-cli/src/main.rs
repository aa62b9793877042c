#![warn(clippy::all)]
#![allow(clippy::pedantic)]

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use medley_cli::pdf;
use medley_cli::session::{Modality, SessionManager};
use medley_common::prelude::*;
use medley_gemini::GeminiClient;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Medley - chat with text, PDFs, images, audio, and video.
#[derive(Parser, Debug)]
#[command(name = "medley")]
#[command(version = "0.1.0")]
#[command(about = "Multimodal chat sessions over the Gemini API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start a chat session
    Chat {
        /// Input modality
        #[arg(long, value_enum, default_value_t = ModalityArg::Text)]
        modality: ModalityArg,

        /// File to attach; repeat the flag for the multi-pdf modality
        #[arg(long = "file")]
        files: Vec<PathBuf>,

        /// Single message mode (don't enter interactive mode)
        #[arg(short, long)]
        message: Option<String>,

        /// Transcript policy override (defaults to MEDLEY_TRANSCRIPT_POLICY)
        #[arg(long, value_enum)]
        policy: Option<PolicyArg>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModalityArg {
    Text,
    Pdf,
    MultiPdf,
    Image,
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PolicyArg {
    /// Resend the full transcript with every turn
    Full,
    /// Send only the newest turn with every request
    Latest,
}

impl From<PolicyArg> for TranscriptPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Full => TranscriptPolicy::Full,
            PolicyArg::Latest => TranscriptPolicy::Latest,
        }
    }
}

/// Fold command-line overrides into the env-derived configuration.
fn apply_overrides(mut config: Config, policy: Option<PolicyArg>) -> Config {
    if let Some(policy) = policy {
        config.transcript_policy = policy.into();
    }
    config
}

impl From<ModalityArg> for Modality {
    fn from(arg: ModalityArg) -> Self {
        match arg {
            ModalityArg::Text => Modality::Text,
            ModalityArg::Pdf => Modality::SinglePdf,
            ModalityArg::MultiPdf => Modality::MultiPdf,
            ModalityArg::Image => Modality::Image,
            ModalityArg::Audio => Modality::Audio,
            ModalityArg::Video => Modality::Video,
        }
    }
}

fn mime_for_path(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .as_deref()
    {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("mp3") => "audio/mp3",
        Some("wav") => "audio/wav",
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        _ => "application/octet-stream",
    }
}

/// Bytes prepared for attachment, kept so `/reset` can re-attach.
#[derive(Debug)]
struct PreparedMedia {
    bytes: Vec<u8>,
    mime_type: String,
    display_name: String,
}

fn prepare_media(modality: Modality, files: &[PathBuf]) -> Result<Option<PreparedMedia>> {
    match modality {
        Modality::Text => {
            if !files.is_empty() {
                bail!("the text modality takes no --file");
            }
            Ok(None)
        }
        Modality::MultiPdf => {
            if files.is_empty() {
                bail!("the multi-pdf modality needs at least one --file");
            }
            let docs = files
                .iter()
                .map(std::fs::read)
                .collect::<std::io::Result<Vec<_>>>()?;
            let merged = pdf::merge_documents(&docs)?;
            Ok(Some(PreparedMedia {
                bytes: merged,
                mime_type: "application/pdf".into(),
                display_name: "merged.pdf".into(),
            }))
        }
        _ => {
            let [path] = files else {
                bail!(
                    "the {} modality needs exactly one --file",
                    modality.as_str()
                );
            };
            Ok(Some(PreparedMedia {
                bytes: std::fs::read(path)?,
                mime_type: mime_for_path(path).into(),
                display_name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "upload".into()),
            }))
        }
    }
}

async fn attach(
    manager: &mut SessionManager,
    modality: Modality,
    media: &PreparedMedia,
    cancel: &CancellationToken,
) -> medley_common::Result<()> {
    manager
        .attach_media(
            modality,
            media.bytes.clone(),
            &media.mime_type,
            &media.display_name,
            cancel,
        )
        .await?;
    Ok(())
}

/// Start a fresh session for `modality`, re-attaching any prepared media.
///
/// A failed re-attach leaves the manager with an empty handle; the caller
/// decides whether that is fatal.
async fn reset_session(
    manager: &mut SessionManager,
    modality: Modality,
    media: Option<&PreparedMedia>,
    cancel: &CancellationToken,
) -> medley_common::Result<()> {
    manager.get_or_create(modality, true);
    if let Some(media) = media {
        attach(manager, modality, media, cancel).await?;
    }
    Ok(())
}

async fn run_chat(
    config: Config,
    modality: Modality,
    files: Vec<PathBuf>,
    message: Option<String>,
) -> Result<()> {
    let client = Arc::new(GeminiClient::new(&config));
    let mut manager = SessionManager::new(client, &config);

    // Ctrl-C aborts a pending video readiness poll instead of the process.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let media = prepare_media(modality, &files)?;
    if let Some(media) = &media {
        attach(&mut manager, modality, media, &cancel).await?;
    }

    if let Some(message) = message {
        let reply = manager.submit_turn(modality, &message).await?;
        println!("{reply}");
        return Ok(());
    }

    println!(
        "Chatting in {} mode. '/reset' starts a new session, 'exit' quits.",
        modality.as_str()
    );
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }
        if line == "/reset" {
            // A failed re-attach stays inside this turn, like any other error.
            match reset_session(&mut manager, modality, media.as_ref(), &cancel).await {
                Ok(()) => println!("Session cleared."),
                Err(e) => eprintln!("error: {e}"),
            }
            continue;
        }
        // Errors surface inline and never outlive the turn.
        match manager.submit_turn(modality, line).await {
            Ok(reply) => println!("{reply}\n"),
            Err(e) => eprintln!("error: {e}"),
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A missing API key is fatal before anything else runs.
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    init_logging(&config.log_level, &config.log_format);

    match cli.command {
        Commands::Chat {
            modality,
            files,
            message,
            policy,
        } => {
            let config = apply_overrides(config, policy);
            run_chat(config, modality.into(), files, message).await
        }
    }
}
