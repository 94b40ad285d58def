use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use roomkey_core::{
    classify_digit, verify_faces, DeviceState, Embedding, FaceMatcher, FeatureExtractor,
    HandObservation, Pipeline, PipelineError, Registry,
};
use std::path::{Path, PathBuf};

mod capture;
mod config;
mod store;

use capture::CaptureFileExtractor;
use config::Config;

#[derive(Parser)]
#[command(name = "roomkey", about = "Face and gesture presets for a smart room")]
struct Cli {
    /// TOML config file overriding ROOMKEY_* environment variables
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Registry file (overrides config)
    #[arg(long, global = true)]
    registry: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a new identity from a face capture
    Enroll {
        /// Display name for the identity
        #[arg(short, long)]
        name: String,
        /// Capture file with a face section
        capture: PathBuf,
    },
    /// Add a device preset bound to a hand gesture
    AddPreset {
        /// Preset name, unique per identity (e.g., "work", "movie night")
        #[arg(short, long)]
        name: String,
        /// Owner identity ID; identified from the capture's face when omitted
        #[arg(long)]
        owner: Option<String>,
        /// JSON file with the device states to apply
        #[arg(long)]
        devices: PathBuf,
        /// Capture file with a hand section (and a face section if no owner is given)
        capture: PathBuf,
    },
    /// Identify the face in a capture and record the login
    Login {
        capture: PathBuf,
    },
    /// Identify the face, then match the gesture against that identity's presets
    Recognize {
        /// Capture file with the face
        face: PathBuf,
        /// Capture file with the gesture (defaults to the face capture)
        gesture: Option<PathBuf>,
    },
    /// Compare the faces in two captures one-to-one
    Verify {
        a: PathBuf,
        b: PathBuf,
    },
    /// Count extended fingers in a capture's hand
    Classify {
        capture: PathBuf,
    },
    /// List enrolled identities and presets
    List,
    /// Remove an identity (with its presets) or a single preset by ID
    Remove {
        id: String,
    },
    /// Show effective configuration
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(path) = &cli.config {
        config = config.with_file(path)?;
    }
    if let Some(path) = cli.registry {
        config.registry_path = path;
    }

    match cli.command {
        Commands::Enroll { name, capture } => enroll(&config, &name, &capture),
        Commands::AddPreset {
            name,
            owner,
            devices,
            capture,
        } => add_preset(&config, &name, owner, &devices, &capture),
        Commands::Login { capture } => login(&config, &capture),
        Commands::Recognize { face, gesture } => {
            let gesture = gesture.unwrap_or_else(|| face.clone());
            recognize(&config, &face, &gesture)
        }
        Commands::Verify { a, b } => verify(&config, &a, &b),
        Commands::Classify { capture } => classify(&capture),
        Commands::List => list(&config),
        Commands::Remove { id } => remove(&config, &id),
        Commands::Status => {
            print_json(&serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "metric": config.metric,
                "face_threshold": config.face_threshold,
                "gesture_threshold": config.gesture_threshold,
                "registry_path": config.registry_path,
            }))
        }
    }
}

fn read_capture(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading capture {}", path.display()))
}

fn face_from(path: &Path) -> Result<Embedding> {
    let capture = read_capture(path)?;
    match CaptureFileExtractor.extract_face(&capture)?.into_features() {
        Some(embedding) => Ok(embedding),
        None => bail!("no face detected in {}", path.display()),
    }
}

fn hand_from(path: &Path) -> Result<HandObservation> {
    let capture = read_capture(path)?;
    match CaptureFileExtractor.extract_hand(&capture)?.into_features() {
        Some(hand) => Ok(hand),
        None => bail!("no hand detected in {}", path.display()),
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Confidence as reported to users: two decimal places.
fn rounded(confidence: f64) -> f64 {
    (confidence * 100.0).round() / 100.0
}

fn enroll(config: &Config, name: &str, capture: &Path) -> Result<()> {
    let embedding = face_from(capture)?;
    let mut registry = store::load(&config.registry_path)?;
    let identity = registry.enroll_identity(name, embedding)?;
    let response = serde_json::json!({
        "id": identity.id,
        "name": identity.name,
        "registered_at": identity.registered_at,
    });
    store::save(&config.registry_path, &registry)?;
    print_json(&response)
}

fn add_preset(
    config: &Config,
    name: &str,
    owner: Option<String>,
    devices: &Path,
    capture: &Path,
) -> Result<()> {
    let device_states: Vec<DeviceState> = serde_json::from_str(
        &std::fs::read_to_string(devices)
            .with_context(|| format!("reading device states {}", devices.display()))?,
    )
    .with_context(|| format!("parsing device states {}", devices.display()))?;

    let mut registry = store::load(&config.registry_path)?;

    let owner_id = match owner {
        Some(id) => id,
        None => {
            let embedding = face_from(capture)?;
            let matcher = FaceMatcher::new(config.metric, config.face_threshold);
            let result = matcher
                .find_best(&embedding, registry.identities())
                .context("identifying preset owner")?;
            result.key
        }
    };

    let hand = hand_from(capture)?;
    let preset = registry.enroll_preset(&owner_id, name, hand.landmarks, device_states)?;
    let response = serde_json::json!({
        "id": preset.id,
        "name": preset.name,
        "user_id": preset.owner_id,
        "gesture_digit": preset.digit,
        "created_at": preset.created_at,
    });
    store::save(&config.registry_path, &registry)?;
    print_json(&response)
}

fn login(config: &Config, capture: &Path) -> Result<()> {
    let embedding = face_from(capture)?;
    let mut registry = store::load(&config.registry_path)?;
    if registry.identities().is_empty() {
        bail!("no identities enrolled; run `roomkey enroll` first");
    }

    let matcher = FaceMatcher::new(config.metric, config.face_threshold);
    let (identity, result) = match matcher.find_best_entry(&embedding, registry.identities()) {
        Ok((identity, result)) => (identity.clone(), result),
        Err(e) if e.is_not_found() => {
            tracing::warn!(reason = %e, "login: face not recognized");
            bail!("user not recognized");
        }
        Err(e) => return Err(e.into()),
    };

    registry.record_login(&identity.id, chrono::Utc::now())?;
    store::save(&config.registry_path, &registry)?;

    print_json(&serde_json::json!({
        "id": identity.id,
        "name": identity.name,
        "confidence": rounded(result.confidence),
    }))
}

fn recognize(config: &Config, face: &Path, gesture: &Path) -> Result<()> {
    let face_capture = read_capture(face)?;
    let gesture_capture = read_capture(gesture)?;
    let mut registry = store::load(&config.registry_path)?;

    let pipeline = Pipeline::new(config.match_config());
    let dispatch = match pipeline.recognize(
        &CaptureFileExtractor,
        &face_capture,
        &gesture_capture,
        registry.identities(),
        registry.presets(),
    ) {
        Ok(dispatch) => dispatch,
        Err(e) if e.is_not_recognized() => {
            tracing::warn!(reason = %e, "recognize: no preset selected");
            let message = match e {
                PipelineError::IdentityNotFound(_) | PipelineError::NoFaceDetected => {
                    "user not recognized".to_string()
                }
                PipelineError::NoPresetsForIdentity { .. } => "user has no presets".to_string(),
                other => format!("preset not recognized ({other})"),
            };
            bail!(message);
        }
        Err(e) => return Err(e.into()),
    };

    registry.record_preset_used(&dispatch.preset.key, chrono::Utc::now())?;
    store::save(&config.registry_path, &registry)?;

    print_json(&serde_json::json!({
        "id": dispatch.preset.key,
        "name": dispatch.preset_name,
        "user_id": dispatch.identity.key,
        "user_name": dispatch.identity_name,
        "device_states": dispatch.device_states,
        "confidence": rounded(dispatch.confidence),
    }))
}

fn verify(config: &Config, a: &Path, b: &Path) -> Result<()> {
    let verification = verify_faces(
        &face_from(a)?,
        &face_from(b)?,
        config.metric,
        config.face_threshold,
    )?;
    print_json(&serde_json::to_value(&verification)?)
}

fn classify(capture: &Path) -> Result<()> {
    let hand = hand_from(capture)?;
    print_json(&serde_json::json!({
        "digit": classify_digit(&hand.landmarks),
        "handedness": hand.handedness,
    }))
}

fn list(config: &Config) -> Result<()> {
    let registry: Registry = store::load(&config.registry_path)?;
    let identities: Vec<_> = registry
        .identities()
        .iter()
        .map(|i| {
            serde_json::json!({
                "id": i.id,
                "name": i.name,
                "registered_at": i.registered_at,
                "last_login": i.last_login,
                "presets": registry.presets_for(&i.id).map(|p| serde_json::json!({
                    "id": p.id,
                    "name": p.name,
                    "gesture_digit": p.digit,
                    "devices": p.device_states.len(),
                    "last_used": p.last_used,
                })).collect::<Vec<_>>(),
            })
        })
        .collect();
    print_json(&serde_json::Value::from(identities))
}

fn remove(config: &Config, id: &str) -> Result<()> {
    let mut registry = store::load(&config.registry_path)?;
    if registry.identity(id).is_some() {
        let identity = registry.remove_identity(id)?;
        println!("Removed identity {} ({})", identity.name, identity.id);
    } else {
        let preset = registry.remove_preset(id)?;
        println!("Removed preset {} ({})", preset.name, preset.id);
    }
    store::save(&config.registry_path, &registry)
}
