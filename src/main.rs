use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use mediaforge::app::{App, CredentialObserver, ToolState};
use mediaforge::models::{AspectRatio, Config, GenerationResult, Tool, Voice};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "mediaforge")]
#[command(about = "Generate images, ideas, speech and video with Gemini")]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a square image from a prompt.
    Image { prompt: String },
    /// Edit or combine one or more images.
    Edit {
        prompt: String,
        #[arg(required = true, value_name = "IMAGE")]
        images: Vec<PathBuf>,
    },
    /// Find web-grounded prompt ideas about a topic.
    Ideas { topic: String },
    /// Turn text into speech (written as a WAV file).
    Speak {
        text: String,
        #[arg(long, value_enum, default_value_t = VoiceArg::Kore)]
        voice: VoiceArg,
    },
    /// Generate a short video, optionally starting from an image.
    Video {
        prompt: String,
        #[arg(long, value_enum, default_value_t = AspectArg::Landscape)]
        aspect: AspectArg,
        #[arg(long, value_name = "IMAGE")]
        image: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum VoiceArg {
    Kore,
    Puck,
    Charon,
    Fenrir,
    Zephyr,
}

impl From<VoiceArg> for Voice {
    fn from(arg: VoiceArg) -> Self {
        match arg {
            VoiceArg::Kore => Voice::Kore,
            VoiceArg::Puck => Voice::Puck,
            VoiceArg::Charon => Voice::Charon,
            VoiceArg::Fenrir => Voice::Fenrir,
            VoiceArg::Zephyr => Voice::Zephyr,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AspectArg {
    #[value(name = "16:9")]
    Landscape,
    #[value(name = "9:16")]
    Portrait,
}

impl From<AspectArg> for AspectRatio {
    fn from(arg: AspectArg) -> Self {
        match arg {
            AspectArg::Landscape => AspectRatio::Landscape,
            AspectArg::Portrait => AspectRatio::Portrait,
        }
    }
}

/// Logs a hint when the service rejects the configured key.
struct EnvKeyObserver;

impl CredentialObserver for EnvKeyObserver {
    fn recheck(&self) {
        warn!("The API key was rejected or is missing. Check GEMINI_API_KEY in your environment or .env file.");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mediaforge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let app = App::new(&config, Arc::new(EnvKeyObserver));

    match run(&app, &config, args.command).await {
        Ok(path) => {
            info!("Saved output to {}", path.display());
            Ok(())
        }
        Err(e) => {
            error!("{:#}", e);
            app.shutdown();
            std::process::exit(1);
        }
    }
}

async fn run(app: &App, config: &Config, command: Command) -> Result<PathBuf> {
    let (tool, state) = match command {
        Command::Image { prompt } => (Tool::ImageCreate, app.create_image(&prompt).await),
        Command::Edit { prompt, images } => (Tool::ImageEdit, app.edit_image(&prompt, images).await),
        Command::Ideas { topic } => (Tool::IdeaSearch, app.search_ideas(&topic).await),
        Command::Speak { text, voice } => (
            Tool::SpeechSynthesis,
            app.synthesize_speech(&text, voice.into()).await,
        ),
        Command::Video {
            prompt,
            aspect,
            image,
        } => {
            let state = app.create_video(&prompt, aspect.into(), image).await;
            let state = if state.is_loading() {
                wait_for_video(app).await?
            } else {
                state
            };
            (Tool::VideoCreate, state)
        }
    };

    match state {
        ToolState::Ready(result) => {
            let output_dir = create_output_dir(&config.output_dir)?;
            write_result(&output_dir, tool, &result)
        }
        ToolState::Failed(err) => bail!(err.message),
        other => bail!("{} finished in unexpected state {:?}", tool, other),
    }
}

/// Follows the video tool until it leaves `Loading`, cancelling on Ctrl-C.
async fn wait_for_video(app: &App) -> Result<ToolState> {
    let mut states = app.subscribe(Tool::VideoCreate);
    info!("Video generation can take a few minutes; press Ctrl-C to cancel");

    tokio::select! {
        changed = states.wait_for(|state| !state.is_loading()) => {
            let state = changed.context("video state channel closed")?.clone();
            Ok(state)
        }
        _ = tokio::signal::ctrl_c() => {
            app.cancel_video();
            bail!("Video generation cancelled");
        }
    }
}

fn create_output_dir(root: &Path) -> Result<PathBuf> {
    let date = Local::now().format("%Y-%m-%d").to_string();
    let session_id = Uuid::new_v4();
    let output_dir = root.join(format!("{}_{}", date, session_id));

    fs::create_dir_all(&output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;
    info!("Created output directory: {}", output_dir.display());
    Ok(output_dir)
}

fn write_result(dir: &Path, tool: Tool, result: &GenerationResult) -> Result<PathBuf> {
    let (path, bytes) = match result {
        GenerationResult::Image(image) => {
            info!("Image is {}x{} ({})", image.width, image.height, image.mime_type);
            (
                dir.join(format!("{}.{}", tool, image_extension(&image.mime_type))),
                image.bytes.clone(),
            )
        }
        GenerationResult::Ideas(ideas) => {
            println!("{}", ideas.text);
            (dir.join("ideas.txt"), render_ideas(ideas).into_bytes())
        }
        GenerationResult::Speech(samples) => {
            info!("Speech is {:.1}s long", samples.duration().as_secs_f64());
            (dir.join("speech.wav"), samples.to_wav_bytes())
        }
        GenerationResult::Video(video) => (dir.join("video.mp4"), video.bytes.clone()),
    };

    fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

fn image_extension(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

fn render_ideas(ideas: &mediaforge::models::IdeaResult) -> String {
    let mut out = ideas.text.trim_end().to_string();
    let sources = ideas.web_sources();
    if !sources.is_empty() {
        out.push_str("\n\nSources:\n");
        for source in sources {
            out.push_str(&format!("- {} <{}>\n", source.label, source.uri));
        }
    }
    out
}
