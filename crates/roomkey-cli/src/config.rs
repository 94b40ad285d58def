use roomkey_core::{MatchConfig, MetricKind};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI configuration, loaded from environment variables and an optional TOML file.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Distance metric for face embeddings (default: cosine).
    pub metric: MetricKind,
    /// Maximum face distance for a positive identity match.
    pub face_threshold: f64,
    /// Maximum mean landmark distance for a positive gesture match.
    pub gesture_threshold: f64,
    /// Path to the registry JSON file.
    pub registry_path: PathBuf,
}

/// Overrides read from a `--config` TOML file. Every key is optional.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    metric: Option<MetricKind>,
    face_threshold: Option<f64>,
    gesture_threshold: Option<f64>,
    registry_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `ROOMKEY_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("roomkey");

        let registry_path = std::env::var("ROOMKEY_REGISTRY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("registry.json"));

        let metric = match std::env::var("ROOMKEY_METRIC") {
            Ok(v) => v.parse::<MetricKind>().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "ignoring ROOMKEY_METRIC; using cosine");
                MetricKind::Cosine
            }),
            Err(_) => MetricKind::Cosine,
        };

        Self {
            metric,
            face_threshold: env_f64("ROOMKEY_FACE_THRESHOLD", 0.40),
            gesture_threshold: env_f64("ROOMKEY_GESTURE_THRESHOLD", 0.15),
            registry_path,
        }
    }

    /// Apply overrides from a TOML config file.
    pub fn with_file(self, path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let src = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        self.with_toml(&src)
            .with_context(|| format!("parsing config {}", path.display()))
    }

    fn with_toml(mut self, src: &str) -> Result<Self, toml::de::Error> {
        let file: FileConfig = toml::from_str(src)?;
        if let Some(metric) = file.metric {
            self.metric = metric;
        }
        if let Some(t) = file.face_threshold {
            self.face_threshold = t;
        }
        if let Some(t) = file.gesture_threshold {
            self.gesture_threshold = t;
        }
        if let Some(path) = file.registry_path {
            self.registry_path = path;
        }
        Ok(self)
    }

    pub fn match_config(&self) -> MatchConfig {
        MatchConfig::new(self.metric, self.face_threshold, self.gesture_threshold)
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
