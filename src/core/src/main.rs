use capture_sync::annotation::data_uri;
use capture_sync::annotation::{AnnotationLayer, CanvasId, Stroke};
use capture_sync::capture_registry::RecordingCapture;
use capture_sync::configuration::Config;
use capture_sync::persistence::{FormMetadata, HttpPersistence, PersistenceApi};
use capture_sync::{InspectionSession, SaveClassification, ScreenshotPayload};
use chrono::{DateTime, Local};
use clap::Parser;
use log::{error, info, warn};
use std::collections::HashMap;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "capture-sync")]
#[command(version = "0.0.2")]
#[command(about = "Uploads captured inspection media and reconciles backend ids")]
struct Args {
    config_file: String,

    /// Recording to upload (repeatable)
    #[arg(long = "recording")]
    recordings: Vec<PathBuf>,

    /// Screenshot to upload (repeatable); its file stem is its canvas id
    #[arg(long = "screenshot")]
    screenshots: Vec<PathBuf>,

    /// JSON object mapping canvas ids to stroke lists
    #[arg(long)]
    strokes: Option<PathBuf>,

    /// JSON object sent verbatim as the form metadata
    #[arg(long)]
    form: Option<PathBuf>,

    /// Ask the backend to close the remote session and end it locally
    #[arg(long, action = clap::ArgAction::SetTrue)]
    disconnect: bool,
}

fn mime_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

fn load_recording(path: &Path) -> Result<RecordingCapture, Box<dyn Error>> {
    let bytes = std::fs::read(path)?;
    let modified: DateTime<Local> = std::fs::metadata(path)?.modified()?.into();
    Ok(RecordingCapture {
        bytes,
        mime_type: mime_for(path),
        timestamp_label: modified.format("%H:%M:%S").to_string(),
        duration_seconds: 0.0,
    })
}

fn load_screenshot(path: &Path) -> Result<ScreenshotPayload, Box<dyn Error>> {
    let bytes = std::fs::read(path)?;
    let canvas_id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or("screenshot path has no file name")?
        .to_string();
    Ok(ScreenshotPayload::Annotated {
        data: data_uri::encode(&mime_for(path), &bytes),
        id: canvas_id,
        backend_id: None,
        is_saved: false,
    })
}

fn load_strokes(path: &Path) -> Result<Vec<AnnotationLayer>, Box<dyn Error>> {
    let raw = std::fs::read_to_string(path)?;
    let layers: HashMap<CanvasId, Vec<Stroke>> = serde_json::from_str(&raw)?;
    Ok(layers
        .into_iter()
        .map(|(canvas_id, strokes)| AnnotationLayer::new(canvas_id, strokes))
        .collect())
}

fn load_form(path: &Path) -> Result<FormMetadata, Box<dyn Error>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn populate(session: &InspectionSession, args: &Args) -> Result<(), Box<dyn Error>> {
    for path in &args.recordings {
        session.capture_recording(load_recording(path)?)?;
    }
    for path in &args.screenshots {
        session.capture_screenshot(load_screenshot(path)?)?;
    }
    if let Some(path) = &args.strokes {
        for layer in load_strokes(path)? {
            session.annotations().set(layer);
        }
    }
    if let Some(path) = &args.form {
        session.set_form(load_form(path)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    info!("Importing configuration");

    let args = Args::parse();

    if args.config_file.is_empty() {
        error!("No configuration file found");
        std::process::exit(1);
    }

    let config = Config::from_file(Path::new(args.config_file.as_str())).unwrap_or_else(|e| {
        error!("Unable to import configuration from file: {}", e);
        std::process::exit(1);
    });

    info!("Configuration imported successfully");

    let persistence = HttpPersistence::new(&config.persistence.base_url, config.request_timeout())
        .unwrap_or_else(|e| {
            error!("Unable to create the persistence client: {}", e);
            std::process::exit(1);
        });
    let persistence: Arc<dyn PersistenceApi> = Arc::new(persistence);
    let session = InspectionSession::from_config(&config, persistence);

    if let Err(e) = populate(&session, &args) {
        error!("Unable to load captures: {}", e);
        std::process::exit(1);
    }

    let result = if args.disconnect {
        session.disconnect_and_save().await
    } else {
        session.save().await
    };

    match result {
        Ok(Some(report)) => {
            let summary = report.summary;
            println!(
                "{:?}: recordings {}/{}, screenshots {}/{}",
                report.classification,
                summary.recordings_uploaded,
                summary.recordings_attempted,
                summary.screenshots_uploaded,
                summary.screenshots_attempted
            );
            if !report.unreconciled.is_empty() {
                warn!(
                    "{} item(s) saved without a backend id",
                    report.unreconciled.len()
                );
            }
            if report.classification == SaveClassification::AllFailed {
                std::process::exit(1);
            }
        }
        Ok(None) => warn!("Save refused: another save is in flight"),
        Err(e) => {
            error!("Save failed: {}", e);
            std::process::exit(1);
        }
    }
}
