//! Show error types

use thiserror::Error;

use crate::scenario::ScenarioKind;

/// Errors raised by the show controller
#[derive(Error, Debug)]
pub enum ShowError {
    #[error("illegal scenario transition {from} -> {to}")]
    IllegalTransition { from: ScenarioKind, to: ScenarioKind },

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while classifying a song's genre
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("classifier failed: {0}")]
    Failed(String),

    #[error("resampling failed: {0}")]
    Resample(String),

    #[error("no audio to classify")]
    NoAudio,
}
