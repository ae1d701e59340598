use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    composition::segmenter::SelectionStrategy,
    error::{ConfigError, Result},
    render::job::{AudioMix, OutputSpec},
    sync::SyncPolicy,
};

/// Main configuration for beatcut
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cut scheduling and transition settings
    pub sync: SyncPolicy,

    /// Target encoding parameters
    pub output: OutputSpec,

    /// Soundtrack treatment
    pub audio: AudioConfig,

    /// How source clips are assigned to segments
    pub selection: SelectionStrategy,

    /// Executor supervision settings
    pub render: RenderConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        let path = path.as_ref();
        std::fs::write(path, content).map_err(|e| ConfigError::WriteFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.sync.validate().map_err(|e| ConfigError::InvalidValue {
            key: "sync".to_string(),
            value: e.to_string(),
        })?;

        self.output.validate().map_err(|e| ConfigError::InvalidValue {
            key: "output".to_string(),
            value: e.to_string(),
        })?;

        self.audio.validate()?;
        self.render.validate()?;
        Ok(())
    }
}

/// Soundtrack mixing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Fade-in length at the start of the track (seconds)
    pub fade_in: f64,

    /// Fade-out length at the end of the video (seconds)
    pub fade_out: f64,

    /// Apply loudness normalization
    pub normalize: bool,

    /// Linear gain, 1.0 leaves the track untouched
    pub volume: f64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            fade_in: 0.5,
            fade_out: 1.0,
            normalize: true,
            volume: 1.0,
        }
    }
}

impl AudioConfig {
    pub fn mix_for<S: Into<String>>(&self, track_url: S) -> AudioMix {
        AudioMix {
            track_url: track_url.into(),
            fade_in: self.fade_in,
            fade_out: self.fade_out,
            normalize: self.normalize,
            volume: self.volume,
        }
    }

    fn validate(&self) -> Result<()> {
        for (key, value) in [("audio.fade_in", self.fade_in), ("audio.fade_out", self.fade_out), ("audio.volume", self.volume)] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string()
                }.into());
            }
        }

        Ok(())
    }
}

/// Upper bound on `render.max_retries`
pub const MAX_RETRIES: u32 = 2;

/// Render supervision configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Ceiling on a single render attempt (seconds)
    pub timeout_secs: f64,

    /// Extra attempts after a transient failure
    pub max_retries: u32,

    /// First retry delay; doubles on every further retry
    pub backoff_base_ms: u64,

    /// How often the executor is polled for status
    pub poll_interval_ms: u64,

    /// FFmpeg binary used by the local executor
    pub ffmpeg_path: PathBuf,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 600.0,
            max_retries: MAX_RETRIES,
            backoff_base_ms: 500,
            poll_interval_ms: 250,
            ffmpeg_path: PathBuf::from("ffmpeg"),
        }
    }
}

impl RenderConfig {
    /// Per-attempt deadline; out-of-range values fall back to the default
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_secs)
            .ok()
            .filter(|limit| !limit.is_zero())
            .unwrap_or_else(|| Duration::from_secs_f64(Self::default().timeout_secs))
    }

    /// Delay before retry number `retry` (zero-based)
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.timeout_secs.is_finite() && self.timeout_secs > 0.0) {
            return Err(ConfigError::InvalidValue {
                key: "render.timeout_secs".to_string(),
                value: self.timeout_secs.to_string()
            }.into());
        }

        if self.max_retries > MAX_RETRIES {
            return Err(ConfigError::InvalidValue {
                key: "render.max_retries".to_string(),
                value: self.max_retries.to_string()
            }.into());
        }

        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "render.poll_interval_ms".to_string(),
                value: self.poll_interval_ms.to_string()
            }.into());
        }

        Ok(())
    }
}
