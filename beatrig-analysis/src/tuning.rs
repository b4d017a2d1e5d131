//! Detector thresholds and their persistence
//!
//! Thresholds are stored in a simple key=value text file so a restart keeps
//! the calibration learned during the previous show.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Thresholds used by the feature extractor's section and hit detectors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Minimum RMS for a chorus
    pub chorus_rms: f32,
    /// Maximum spectral flatness for a chorus
    pub chorus_flatness: f32,
    /// Percussive/harmonic energy ratio above which a block is a drum solo
    pub drum_ratio: f32,
    /// RMS growth factor between consecutive blocks for a crescendo
    pub crescendo_mult: f32,
    /// Spectral centroid (Hz) above which an onset counts as a snare
    pub snare_centroid: f32,
    /// Spectral centroid (Hz) below which an onset counts as a kick
    pub kick_centroid: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            chorus_rms: 0.1,
            chorus_flatness: 0.2,
            drum_ratio: 3.0,
            crescendo_mult: 1.1,
            snare_centroid: 4000.0,
            kick_centroid: 500.0,
        }
    }
}

impl Thresholds {
    /// Parse thresholds from key=value lines.
    ///
    /// Missing or malformed keys keep their default value.
    pub fn parse(content: &str) -> Self {
        let mut thresholds = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let Ok(value) = value.trim().parse::<f32>() else {
                continue;
            };
            if !value.is_finite() {
                continue;
            }

            match key.trim() {
                "chorus_rms" => thresholds.chorus_rms = value,
                "chorus_flatness" => thresholds.chorus_flatness = value,
                "drum_ratio" => thresholds.drum_ratio = value,
                "crescendo_mult" => thresholds.crescendo_mult = value,
                "snare_centroid" => thresholds.snare_centroid = value,
                "kick_centroid" => thresholds.kick_centroid = value,
                _ => {} // Ignore unknown keys
            }
        }

        thresholds
    }

    /// Serialize thresholds to key=value lines
    pub fn serialize(&self) -> String {
        [
            "# beatrig detector tuning".to_string(),
            format!("chorus_rms={}", self.chorus_rms),
            format!("chorus_flatness={}", self.chorus_flatness),
            format!("drum_ratio={}", self.drum_ratio),
            format!("crescendo_mult={}", self.crescendo_mult),
            format!("snare_centroid={}", self.snare_centroid),
            format!("kick_centroid={}", self.kick_centroid),
        ]
        .join("\n")
    }
}

/// Where tuned thresholds are read from and written to.
///
/// A store without a path keeps everything in memory.
#[derive(Debug, Clone, Default)]
pub struct TuningStore {
    path: Option<PathBuf>,
}

impl TuningStore {
    /// Store backed by the given file
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Store backed by the default per-user location
    pub fn default_location() -> Self {
        Self::at(Self::default_path())
    }

    /// In-memory store, nothing is persisted
    pub fn in_memory() -> Self {
        Self { path: None }
    }

    /// Default tuning file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("beatrig")
            .join("tuning.txt")
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Load thresholds, falling back to defaults if the file is missing or unreadable
    pub fn load(&self) -> Thresholds {
        match &self.path {
            Some(path) => Self::load_from(path).unwrap_or_default(),
            None => Thresholds::default(),
        }
    }

    /// Persist thresholds. In-memory stores accept and discard them.
    pub fn save(&self, thresholds: &Thresholds) -> io::Result<()> {
        match &self.path {
            Some(path) => Self::save_to(path, thresholds),
            None => Ok(()),
        }
    }

    fn load_from(path: &Path) -> io::Result<Thresholds> {
        let content = fs::read_to_string(path)?;
        Ok(Thresholds::parse(&content))
    }

    fn save_to(path: &Path, thresholds: &Thresholds) -> io::Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, thresholds.serialize())
    }
}
