use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gatewatch_core::overlay::load_font;
use gatewatch_core::{
    plan_overlay, FaceDetector, FaceVerdicts, OverlaySurface, PixelFrame, RecognitionEvent,
};
use gatewatch_dashboard::{
    channel, AddPersonRequest, ChannelSignal, Config, HttpRegistrar, Registrar,
};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "gatewatch", about = "Gatewatch access-control dashboard tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the face detector on a still image and print the faces as JSON
    Detect {
        /// Image file (PNG, JPEG, ...)
        image: PathBuf,
        /// Save the image with the overlay composited onto it
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// TTF/OTF font for label text
        #[arg(long)]
        font: Option<PathBuf>,
    },
    /// Print events from the recognition feed
    Listen {
        /// Event feed URL (defaults to the configured event_url)
        #[arg(long)]
        url: Option<String>,
        /// Exit after this many events
        #[arg(short = 'n', long)]
        count: Option<usize>,
        /// Write unknown-face previews as JPEG files into this directory
        #[arg(long)]
        previews: Option<PathBuf>,
    },
    /// Register a face from a feature vector file (JSON array of numbers)
    AddPerson {
        #[arg(long)]
        vector: PathBuf,
        /// Also send a display name
        #[arg(long)]
        name: Option<String>,
        /// Backend base URL (defaults to the configured api_base)
        #[arg(long)]
        api_base: Option<String>,
    },
    /// List V4L2 capture devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Detect { image, out, font } => detect(&image, out.as_deref(), font.as_deref())?,
        Commands::Listen {
            url,
            count,
            previews,
        } => {
            let config = Config::load()?;
            let url = url.unwrap_or(config.event_url.clone());
            listen(url, &config, count, previews.as_deref()).await?;
        }
        Commands::AddPerson {
            vector,
            name,
            api_base,
        } => {
            let mut config = Config::load()?;
            if let Some(api_base) = api_base {
                config.api_base = api_base;
            }
            add_person(&config, &vector, name).await?;
        }
        Commands::Devices => devices(),
    }

    Ok(())
}

fn detect(path: &Path, out: Option<&Path>, font: Option<&Path>) -> Result<()> {
    let image = image::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let frame = PixelFrame::from_image(image.to_rgba8());

    let faces = FaceDetector::default().detect_frame(&frame);
    println!("{}", serde_json::to_string_pretty(&faces)?);

    if let Some(out) = out {
        let mut surface = OverlaySurface::new(frame.width(), frame.height());
        if let Some(font) = font {
            surface = surface.with_font(load_font(font)?);
        }
        surface.render(&plan_overlay(&faces, &FaceVerdicts::new()));
        surface.save_composite(&frame, out)?;
        eprintln!("overlay written to {}", out.display());
    }
    Ok(())
}

async fn listen(
    url: String,
    config: &Config,
    count: Option<usize>,
    previews: Option<&Path>,
) -> Result<()> {
    if let Some(dir) = previews {
        std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let (tx, mut rx) = mpsc::channel(64);
    let task = tokio::spawn(channel::run(url, config.backoff(), tx));

    let mut received = 0usize;
    while let Some(signal) = rx.recv().await {
        let text = match signal {
            ChannelSignal::Message(text) => text,
            ChannelSignal::Opened => {
                eprintln!("connected");
                continue;
            }
            ChannelSignal::Closed(_) | ChannelSignal::Error(_) => {
                eprintln!("disconnected, retrying");
                continue;
            }
            ChannelSignal::Connecting => continue,
        };

        let event = match RecognitionEvent::parse(&text) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed event");
                continue;
            }
        };
        received += 1;
        println!("{}", event.to_json());

        if let Some(dir) = previews {
            save_preview(dir, &event, received);
        }
        if count.is_some_and(|n| received >= n) {
            break;
        }
    }

    task.abort();
    Ok(())
}

fn save_preview(dir: &Path, event: &RecognitionEvent, n: usize) {
    match event.preview_jpeg() {
        Ok(Some(jpeg)) => {
            let path = preview_path(dir, event, n);
            match std::fs::write(&path, jpeg) {
                Ok(()) => eprintln!("preview saved to {}", path.display()),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to save preview"),
            }
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "undecodable preview image"),
    }
}

fn preview_path(dir: &Path, event: &RecognitionEvent, n: usize) -> PathBuf {
    dir.join(format!("{}-{n:04}.jpg", event.timestamp.format("%Y%m%dT%H%M%S")))
}

async fn add_person(config: &Config, vector_file: &Path, name: Option<String>) -> Result<()> {
    let text = std::fs::read_to_string(vector_file)
        .with_context(|| format!("failed to read {}", vector_file.display()))?;
    let vector = parse_vector(&text)
        .with_context(|| format!("{} is not a JSON array of numbers", vector_file.display()))?;

    let registrar = HttpRegistrar::new(config.add_person_url(), config.registration_timeout())?;
    let request = AddPersonRequest::new(vector).with_name(name);
    registrar.add_person(&request).await?;
    println!("person added ({} dimensions)", request.vector.len());
    Ok(())
}

fn parse_vector(text: &str) -> Result<Vec<f32>> {
    let vector: Vec<f32> = serde_json::from_str(text)?;
    anyhow::ensure!(!vector.is_empty(), "vector is empty");
    Ok(vector)
}

#[cfg(feature = "v4l")]
fn devices() {
    let devices = gatewatch_hw::Camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found");
        return;
    }
    for d in devices {
        println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
    }
}

#[cfg(not(feature = "v4l"))]
fn devices() {
    println!("built without V4L2 support; rebuild with `--features v4l`");
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNKNOWN: &str = r#"{"event_type":"recognition","timestamp":"2024-05-01T09:31:02Z",
        "data":{"recognized":false,"preview_image":"aGVsbG8="}}"#;

    #[test]
    fn test_parse_vector() {
        assert_eq!(parse_vector("[0.5, 1, -2]").unwrap(), vec![0.5, 1.0, -2.0]);
        assert!(parse_vector("[]").is_err());
        assert!(parse_vector("{\"vector\": [1]}").is_err());
    }

    #[test]
    fn test_preview_path_uses_event_time() {
        let event = RecognitionEvent::parse(UNKNOWN).unwrap();
        let path = preview_path(Path::new("/tmp/previews"), &event, 7);
        assert_eq!(path, PathBuf::from("/tmp/previews/20240501T093102-0007.jpg"));
    }

    #[test]
    fn test_save_preview_writes_decoded_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let event = RecognitionEvent::parse(UNKNOWN).unwrap();
        save_preview(tmp.path(), &event, 1);
        let written = std::fs::read(preview_path(tmp.path(), &event, 1)).unwrap();
        assert_eq!(written, b"hello");
    }

    #[test]
    fn test_detect_writes_overlay() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("in.png");
        let output = tmp.path().join("out.png");
        image::RgbaImage::from_pixel(40, 30, image::Rgba([10, 10, 10, 255]))
            .save(&input)
            .unwrap();
        detect(&input, Some(&output), None).unwrap();
        assert!(output.exists());
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["gatewatch", "listen", "-n", "3"]).unwrap();
        assert!(matches!(cli.command, Commands::Listen { count: Some(3), .. }));
        let cli = Cli::try_parse_from(["gatewatch", "add-person", "--vector", "v.json"]).unwrap();
        assert!(matches!(cli.command, Commands::AddPerson { name: None, .. }));
        assert!(Cli::try_parse_from(["gatewatch", "add-person"]).is_err());
    }
}
