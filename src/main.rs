use std::path::PathBuf;

use anyhow::{Context, anyhow};
use clap::Parser;
use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::info;
use tracing_subscriber::EnvFilter;

use waav_edge_tts::{BoundaryMode, ClientConfig, EdgeTtsClient, SubMaker, TtsEvent, Voice};

/// WaaV Edge TTS - Text-to-speech through the Edge read-aloud service
#[derive(Parser, Debug)]
#[command(name = "waav-edge-tts")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Text to speak
    #[arg(short = 't', long = "text", conflicts_with = "file")]
    text: Option<String>,

    /// Read the text from a file ("-" for stdin)
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    file: Option<PathBuf>,

    /// Voice short name, e.g. en-US-AriaNeural
    #[arg(short = 'v', long = "voice")]
    voice: Option<String>,

    /// Speaking rate, e.g. +10% or -20%
    #[arg(long = "rate", allow_hyphen_values = true)]
    rate: Option<String>,

    /// Volume, e.g. +0% or -50%
    #[arg(long = "volume", allow_hyphen_values = true)]
    volume: Option<String>,

    /// Pitch, e.g. +0Hz or -10Hz
    #[arg(long = "pitch", allow_hyphen_values = true)]
    pitch: Option<String>,

    /// Boundary events to request (word or sentence)
    #[arg(long = "boundary")]
    boundary: Option<BoundaryMode>,

    /// Write the MP3 audio to this file (defaults to stdout)
    #[arg(long = "write-media", value_name = "FILE")]
    write_media: Option<PathBuf>,

    /// Write SRT subtitles to this file ("-" for stderr)
    #[arg(long = "write-subtitles", value_name = "FILE")]
    write_subtitles: Option<PathBuf>,

    /// HTTP proxy, e.g. http://127.0.0.1:8080
    #[arg(long = "proxy")]
    proxy: Option<String>,

    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// List available voices and exit
    #[arg(short = 'l', long = "list-voices")]
    list_voices: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Logs go to stderr so audio on stdout stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    // Load configuration from file or environment
    let mut config = if let Some(config_path) = &cli.config {
        info!("Loading configuration from {}", config_path.display());
        ClientConfig::from_file(config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        ClientConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };
    apply_overrides(&mut config, &cli);

    let client = config.build_client()?;

    if cli.list_voices {
        return print_voices(&client).await;
    }

    let text = read_text(&cli).await?;
    let synthesis = config.synthesis_config()?;
    let mut communicate = client.communicate(&text, synthesis)?;

    let mut media: Box<dyn AsyncWrite + Unpin> = match &cli.write_media {
        Some(path) => Box::new(
            tokio::fs::File::create(path)
                .await
                .with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };
    let mut submaker = SubMaker::new();

    {
        let stream = communicate.stream()?;
        futures::pin_mut!(stream);
        while let Some(event) = stream.next().await {
            match event? {
                TtsEvent::Audio(data) => media.write_all(&data).await?,
                boundary => {
                    if cli.write_subtitles.is_some() {
                        submaker.feed(&boundary)?;
                    }
                }
            }
        }
    }
    media.flush().await?;

    if let Some(path) = &cli.write_subtitles {
        let srt = submaker.get_srt();
        if path.as_os_str() == "-" {
            let mut stderr = tokio::io::stderr();
            stderr.write_all(srt.as_bytes()).await?;
            stderr.flush().await?;
        } else {
            tokio::fs::write(path, srt)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
    }

    Ok(())
}

/// CLI flags win over the resolved configuration.
fn apply_overrides(config: &mut ClientConfig, cli: &Cli) {
    if let Some(voice) = &cli.voice {
        config.voice = voice.clone();
    }
    if let Some(rate) = &cli.rate {
        config.rate = rate.clone();
    }
    if let Some(volume) = &cli.volume {
        config.volume = volume.clone();
    }
    if let Some(pitch) = &cli.pitch {
        config.pitch = pitch.clone();
    }
    if let Some(boundary) = cli.boundary {
        config.boundary = boundary;
    }
    if let Some(proxy) = &cli.proxy {
        config.proxy = Some(proxy.clone());
    }
}

async fn read_text(cli: &Cli) -> anyhow::Result<String> {
    if let Some(text) = &cli.text {
        return Ok(text.clone());
    }
    match &cli.file {
        Some(path) if path.as_os_str() == "-" => {
            let mut text = String::new();
            tokio::io::stdin().read_to_string(&mut text).await?;
            Ok(text)
        }
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display())),
        None => anyhow::bail!("Either --text or --file is required"),
    }
}

async fn print_voices(client: &EdgeTtsClient) -> anyhow::Result<()> {
    let mut voices = client.list_voices().await?;
    voices.sort_by(|a, b| a.short_name.cmp(&b.short_name));

    let rows: Vec<[String; 4]> = voices.iter().map(voice_row).collect();
    let headers = ["Name", "Gender", "ContentCategories", "VoicePersonalities"];

    let mut widths = headers.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    print_row(&headers.map(str::to_string), &widths);
    print_row(&widths.map(|width| "-".repeat(width)), &widths);
    for row in &rows {
        print_row(row, &widths);
    }
    Ok(())
}

fn voice_row(voice: &Voice) -> [String; 4] {
    [
        voice.short_name.clone(),
        voice.gender.clone(),
        voice.voice_tag.content_categories.join(", "),
        voice.voice_tag.voice_personalities.join(", "),
    ]
}

fn print_row(cells: &[String; 4], widths: &[usize; 4]) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    println!("{}", line.trim_end());
}
