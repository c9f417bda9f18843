//! Service configuration.
//!
//! Project-level settings come from the environment (optionally via `.env`).
//! Processor profiles are JSON files in a `configs/` directory, one per
//! Document AI processor the service may call.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// What a processor returns and therefore which report it feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorKind {
    /// Document OCR: text, pages and layout elements.
    Ocr,
    /// Specialized parsers (W-9, invoices, ...): entities.
    Specialized,
}

/// A Document AI processor the service can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorProfile {
    pub name: String,
    pub processor_id: String,
    pub kind: ProcessorKind,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
}

fn default_mime_type() -> String {
    "application/pdf".to_string()
}

/// In-memory store for all loaded processor profiles.
#[derive(Debug)]
pub struct ConfigStore {
    profiles: HashMap<String, ProcessorProfile>,
}

impl ConfigStore {
    /// Load all profiles from the specified directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        if !dir.exists() {
            anyhow::bail!("Config directory does not exist: {:?}", dir);
        }

        let mut profiles = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read processor profile: {:?}", path))?;

                let profile: ProcessorProfile = serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse processor profile: {:?}", path))?;

                info!("Loaded processor profile: {} from {:?}", profile.name, path);
                profiles.push(profile);
            }
        }

        Self::from_profiles(profiles).with_context(|| format!("No processor profiles in {:?}", dir))
    }

    pub fn from_profiles(profiles: Vec<ProcessorProfile>) -> Result<Self> {
        if profiles.is_empty() {
            anyhow::bail!("No processor profiles provided");
        }

        Ok(Self {
            profiles: profiles.into_iter().map(|p| (p.name.clone(), p)).collect(),
        })
    }

    pub fn get(&self, name: &str) -> Option<&ProcessorProfile> {
        self.profiles.get(name)
    }

    /// First profile of the given kind, by name, used when a request names none.
    pub fn default_for(&self, kind: ProcessorKind) -> Option<&ProcessorProfile> {
        self.profiles
            .values()
            .filter(|p| p.kind == kind)
            .min_by(|a, b| a.name.cmp(&b.name))
    }

    /// List all available profile names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Environment-level settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub project_id: String,
    pub location: String,
    /// `gs://bucket` batch results are written to.
    pub output_bucket: Option<String>,
    pub output_prefix: String,
    pub batch_timeout: Duration,
    pub poll_interval: Duration,
    /// When set, raw `Document` JSON from online calls is written here.
    pub dump_dir: Option<PathBuf>,
    pub bind_addr: String,
    pub config_dir: PathBuf,
    /// Overrides the regional Document AI endpoint.
    pub endpoint: Option<String>,
    /// Overrides the Cloud Storage JSON API base URL (e.g. a local emulator).
    pub storage_url: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let secs = |key: &str, default: u64| -> Result<Duration> {
            match var(key) {
                Some(v) => v
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .with_context(|| format!("{} must be a number of seconds, got '{}'", key, v)),
                None => Ok(Duration::from_secs(default)),
            }
        };

        Ok(Self {
            project_id: var("DOCAI_PROJECT_ID").context("DOCAI_PROJECT_ID environment variable not set")?,
            location: var("DOCAI_LOCATION").unwrap_or_else(|| "us".to_string()),
            output_bucket: var("DOCAI_OUTPUT_BUCKET"),
            output_prefix: var("DOCAI_OUTPUT_PREFIX").unwrap_or_else(|| "results".to_string()),
            batch_timeout: secs("DOCAI_BATCH_TIMEOUT_SECS", 300)?,
            poll_interval: secs("DOCAI_POLL_INTERVAL_SECS", 5)?,
            dump_dir: var("DOCAI_DUMP_DIR").map(PathBuf::from),
            bind_addr: var("DOCAI_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            config_dir: var("DOCAI_CONFIG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("configs")),
            endpoint: var("DOCAI_ENDPOINT"),
            storage_url: var("DOCAI_STORAGE_URL"),
        })
    }
}
