//! CLI binary for lectern.

use clap::{Parser, Subcommand};
use lectern::audio::playback::{AudioPlaybackQueue, CpalSink};
use lectern::backend::BackendLocator;
use lectern::session::context::ConversationContext;
use lectern::{AskCallbacks, AskOptions, AskSession, ClientConfig};
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Lectern: study-assistant client with streamed answers and voice output.
#[derive(Parser)]
#[command(name = "lectern", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Ask questions about a notes file interactively.
    Chat {
        /// Plain-text notes file to study from.
        #[arg(short, long)]
        notes: Option<PathBuf>,

        /// Topic title shown to the assistant.
        #[arg(short, long, default_value = "my notes")]
        title: String,

        /// Disable synthesized speech output.
        #[arg(long)]
        no_voice: bool,
    },

    /// Probe the backend candidates and report their status.
    Probe,

    /// List available audio output devices.
    Devices,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lectern=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = if let Some(ref path) = cli.config {
        ClientConfig::from_file(path)?
    } else {
        let default_path = ClientConfig::default_config_path();
        if default_path.exists() {
            ClientConfig::from_file(&default_path)?
        } else {
            ClientConfig::default()
        }
    };

    match cli.command.unwrap_or(Command::Probe) {
        Command::Chat {
            notes,
            title,
            no_voice,
        } => run_chat(config, notes, title, no_voice).await,
        Command::Probe => run_probe(config).await,
        Command::Devices => list_devices(),
    }
}

async fn run_chat(
    config: ClientConfig,
    notes: Option<PathBuf>,
    title: String,
    no_voice: bool,
) -> anyhow::Result<()> {
    println!("Lectern v{}", env!("CARGO_PKG_VERSION"));

    let mut context = ConversationContext::new(config.session.max_history_turns);
    if let Some(ref path) = notes {
        let note_text = std::fs::read_to_string(path)?;
        context.set_system_prompt(lectern::notes::build_study_prompt(&title, &note_text));
        println!("Studying {} ({} chars of notes)", path.display(), note_text.len());
    }

    let voice = config.session.voice && !no_voice;
    let audio = if voice {
        match CpalSink::new(&config.audio) {
            Ok(sink) => Arc::new(AudioPlaybackQueue::new(Arc::new(sink))),
            Err(e) => {
                eprintln!("voice output unavailable ({e}); continuing text-only");
                Arc::new(AudioPlaybackQueue::new(Arc::new(NoopSink)))
            }
        }
    } else {
        Arc::new(AudioPlaybackQueue::new(Arc::new(NoopSink)))
    };

    let session = AskSession::new(
        Arc::new(BackendLocator::new(&config.backend)),
        Arc::new(Mutex::new(context)),
        audio,
        config.session.clone(),
    );

    println!("Type a question (blank line or Ctrl-D to quit):");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(question) = lines.next_line().await? else {
            break;
        };
        if question.trim().is_empty() {
            break;
        }

        // Completion signal so the prompt comes back after the answer.
        let (done_tx, mut done_rx) = tokio::sync::mpsc::unbounded_channel::<()>();
        let done_for_ok = done_tx.clone();

        let callbacks = AskCallbacks {
            on_text: Arc::new(|fragment: &str| {
                print!("{fragment}");
                std::io::stdout().flush().ok();
            }),
            on_done: Arc::new(move |_full: &str| {
                println!();
                done_for_ok.send(()).ok();
            }),
            on_error: Arc::new(move |e| {
                eprintln!("\nerror: {e}");
                done_tx.send(()).ok();
            }),
        };

        match session
            .ask(&question, AskOptions { stream_audio: voice }, callbacks)
            .await
        {
            Ok(_handle) => {
                done_rx.recv().await;
            }
            Err(e) => eprintln!("error: {e}"),
        }
    }

    Ok(())
}

async fn run_probe(config: ClientConfig) -> anyhow::Result<()> {
    let locator = BackendLocator::new(&config.backend);
    for candidate in locator.candidates() {
        let status = locator.probe_candidate(candidate).await;
        println!("{candidate}: {status}");
    }
    Ok(())
}

fn list_devices() -> anyhow::Result<()> {
    println!("Output devices:");
    for name in CpalSink::list_output_devices()? {
        println!("  {name}");
    }
    Ok(())
}

/// Silent sink for text-only sessions.
struct NoopSink;

#[async_trait::async_trait]
impl lectern::audio::playback::PlaybackSink for NoopSink {
    async fn play(
        &self,
        _segment: &lectern::audio::decode::DecodedSegment,
    ) -> lectern::Result<()> {
        Ok(())
    }

    fn halt(&self) {}
}
