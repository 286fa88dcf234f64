//! Core-relevant subset of the settings JSON document — `spec.md` §6.
//!
//! Loading/saving the *full* settings document is the external settings
//! loader's job (out of scope, §1). The core only deserializes the fields it
//! consumes and validates them, the same "validate, don't trust literally"
//! posture as the teacher's `DdmConfig::load_or_init`, generalized from TOML
//! to JSON because §6 is explicit that settings are a JSON document.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

pub const MIN_CONCURRENCY: usize = 1;
pub const MAX_CONCURRENCY: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSettings {
    pub output_dir: PathBuf,
    pub quality: String,
    pub concurrent_downloads: usize,
    pub embed_artwork: bool,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            quality: "mp3_320".to_string(),
            concurrent_downloads: 4,
            embed_artwork: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LyricsSettings {
    pub enabled: bool,
    pub embed_in_file: bool,
    pub save_separate_file: bool,
}

/// Typed subset of the settings document the core actually reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreSettings {
    #[serde(rename = "download")]
    pub download: DownloadSettings,
    #[serde(rename = "lyrics")]
    pub lyrics: LyricsSettings,
    /// Opaque secret token forwarded to `MetadataProvider` implementations;
    /// the core never inspects its contents.
    pub secret_token: Option<String>,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            download: DownloadSettings::default(),
            lyrics: LyricsSettings::default(),
            secret_token: None,
        }
    }
}

impl CoreSettings {
    /// Clamp `concurrent_downloads` into `[1, 32]`, logging a warning if the
    /// stored value was out of range rather than rejecting the document.
    pub fn validate(&mut self) {
        let clamped = self
            .download
            .concurrent_downloads
            .clamp(MIN_CONCURRENCY, MAX_CONCURRENCY);
        if clamped != self.download.concurrent_downloads {
            tracing::warn!(
                requested = self.download.concurrent_downloads,
                clamped,
                "concurrent_downloads out of range, clamping"
            );
            self.download.concurrent_downloads = clamped;
        }
    }
}

pub fn settings_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("melodex")?;
    Ok(xdg_dirs.place_config_file("settings.json")?)
}

/// Load settings from disk, creating a default document if none exists.
pub fn load_or_init() -> Result<CoreSettings> {
    let path = settings_path()?;
    if !path.exists() {
        let default_settings = CoreSettings::default();
        let json = serde_json::to_string_pretty(&default_settings)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, json)?;
        tracing::info!("created default settings at {}", path.display());
        return Ok(default_settings);
    }

    let data = fs::read_to_string(&path)?;
    let mut settings: CoreSettings = serde_json::from_str(&data)?;
    settings.validate();
    Ok(settings)
}
