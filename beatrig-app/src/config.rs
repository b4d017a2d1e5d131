//! Show configuration
//!
//! A key=value text file; every key is optional.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use beatrig_analysis::{DetectorConfig, SongStateConfig, TuningStore};
use beatrig_dmx::DEFAULT_FPS;
use beatrig_show::DirectorConfig;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("line {line}: invalid value '{value}' for {key}")]
    InvalidValue {
        line: usize,
        key: String,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShowConfig {
    pub serial_port: String,
    pub fps: u32,
    pub sample_rate: u32,
    pub block_size: usize,
    pub amplitude_threshold: f32,
    pub start_duration: f64,
    pub end_duration: f64,
    /// Rig description; the built-in venue rig when unset
    pub rig_file: Option<PathBuf>,
    /// Tuning file; the per-user default when unset
    pub tuning_file: Option<PathBuf>,
    /// Input device name; the system default when unset
    pub input_device: Option<String>,
}

impl Default for ShowConfig {
    fn default() -> Self {
        let song = SongStateConfig::default();
        Self {
            serial_port: "/dev/ttyUSB0".to_string(),
            fps: DEFAULT_FPS,
            sample_rate: 44100,
            block_size: 512,
            amplitude_threshold: song.amplitude_threshold,
            start_duration: song.start_duration,
            end_duration: song.end_duration,
            rig_file: None,
            tuning_file: None,
            input_device: None,
        }
    }
}

impl ShowConfig {
    /// Load from the default location; defaults if there is no file
    pub fn load() -> Result<Self, ConfigError> {
        match Self::load_from(&Self::config_path()) {
            Err(ConfigError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            other => other,
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.serialize())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("beatrig")
            .join("config.txt")
    }

    fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            let invalid = || ConfigError::InvalidValue {
                line: index + 1,
                key: key.to_string(),
                value: value.to_string(),
            };

            match key {
                "serial_port" => config.serial_port = value.to_string(),
                "fps" => config.fps = value.parse().ok().filter(|&v| v > 0).ok_or_else(invalid)?,
                "sample_rate" => {
                    config.sample_rate = value.parse().ok().filter(|&v| v > 0).ok_or_else(invalid)?
                }
                "block_size" => {
                    config.block_size = value.parse().ok().filter(|&v| v >= 512).ok_or_else(invalid)?
                }
                "amplitude_threshold" => {
                    config.amplitude_threshold = value.parse().map_err(|_| invalid())?
                }
                "start_duration" => config.start_duration = value.parse().map_err(|_| invalid())?,
                "end_duration" => config.end_duration = value.parse().map_err(|_| invalid())?,
                "rig_file" => config.rig_file = non_empty(value).map(PathBuf::from),
                "tuning_file" => config.tuning_file = non_empty(value).map(PathBuf::from),
                "input_device" => config.input_device = non_empty(value).map(str::to_string),
                _ => tracing::debug!(key, "ignoring unknown config key"),
            }
        }

        Ok(config)
    }

    fn serialize(&self) -> String {
        let mut lines = vec![
            "# beatrig configuration".to_string(),
            format!("serial_port={}", self.serial_port),
            format!("fps={}", self.fps),
            format!("sample_rate={}", self.sample_rate),
            format!("block_size={}", self.block_size),
            format!("amplitude_threshold={}", self.amplitude_threshold),
            format!("start_duration={}", self.start_duration),
            format!("end_duration={}", self.end_duration),
        ];
        if let Some(ref rig) = self.rig_file {
            lines.push(format!("rig_file={}", rig.display()));
        }
        if let Some(ref tuning) = self.tuning_file {
            lines.push(format!("tuning_file={}", tuning.display()));
        }
        if let Some(ref device) = self.input_device {
            lines.push(format!("input_device={device}"));
        }
        lines.join("\n")
    }

    /// Detector settings for audio arriving at `sample_rate`
    pub fn detector_config(&self, sample_rate: u32) -> DetectorConfig {
        DetectorConfig {
            sample_rate,
            block_size: self.block_size,
            song: SongStateConfig {
                amplitude_threshold: self.amplitude_threshold,
                start_duration: self.start_duration,
                end_duration: self.end_duration,
            },
            ..DetectorConfig::default()
        }
    }

    pub fn director_config(&self, sample_rate: u32) -> DirectorConfig {
        DirectorConfig {
            sample_rate,
            ..DirectorConfig::default()
        }
    }

    pub fn tuning_store(&self) -> TuningStore {
        match &self.tuning_file {
            Some(path) => TuningStore::at(path),
            None => TuningStore::default_location(),
        }
    }
}

fn non_empty(value: &str) -> Option<&str> {
    Some(value).filter(|v| !v.is_empty())
}
