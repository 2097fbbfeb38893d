//! Transcribe an interview recording, or re-parse stored transcript text.
//! Usage:
//!   transcribe run interview.m4a --speakers 2 --interviewer "Kim"
//!   transcribe parse notes.txt --title "Onboarding interview"

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use interview_transcript::media::guess_mime_type;
use interview_transcript::{
    parse_transcript, CanonicalTranscript, MediaReference, Orchestrator, PipelineConfig,
    TranscriptionRequest,
};

#[derive(Parser)]
#[command(name = "transcribe")]
#[command(about = "Speaker-attributed transcripts from interview recordings")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transcribe a recording and print the canonical transcript as JSON
    Run {
        /// Local audio/video file, or an http(s):// / gs:// URI
        media: String,

        /// Number of distinct speakers in the recording
        #[arg(long, default_value = "2")]
        speakers: u32,

        /// Name of the interviewer, used to label their turns
        #[arg(long, default_value = "")]
        interviewer: String,

        /// MIME type; guessed from the extension when omitted
        #[arg(long)]
        mime: Option<String>,

        #[arg(long)]
        title: Option<String>,
    },

    /// Parse stored transcript text (a file, or - for stdin) and print it as JSON
    Parse {
        input: String,

        #[arg(long)]
        title: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let transcript = match cli.command {
        Commands::Run { media, speakers, interviewer, mime, title } => {
            run(&media, speakers, &interviewer, mime, title.as_deref()).await?
        }
        Commands::Parse { input, title } => {
            let raw = read_input(&input)?;
            parse_transcript(&raw, title.as_deref())
        }
    };

    let json = serde_json::to_string_pretty(&transcript).context("Failed to serialize transcript")?;
    println!("{}", json);
    Ok(())
}

async fn run(
    media: &str,
    speakers: u32,
    interviewer: &str,
    mime: Option<String>,
    title: Option<&str>,
) -> Result<CanonicalTranscript> {
    let config = PipelineConfig::from_env().context("Failed to read configuration")?;
    let orchestrator = Orchestrator::from_config(&config)?;

    let mime_type = mime.unwrap_or_else(|| guess_mime_type(Path::new(media)).to_string());
    let reference = MediaReference::from_arg(media, mime_type);
    let default_title = reference.display_name();
    let request = TranscriptionRequest::new(reference, speakers, interviewer)?;

    let start = std::time::Instant::now();
    let result = orchestrator
        .transcribe(&request)
        .await
        .with_context(|| format!("Transcription of {} failed", media))?;
    info!("Transcribed in {:.1}s ({:?} output)", start.elapsed().as_secs_f64(), result.mode);

    let transcript = result.into_transcript(Some(title.unwrap_or(&default_title)));
    info!(
        "{} segments from {} speaker(s)",
        transcript.segments.len(),
        transcript.speakers().len()
    );
    Ok(transcript)
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("Failed to read transcript from stdin")?;
        return Ok(raw);
    }
    let path = PathBuf::from(input);
    std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))
}
