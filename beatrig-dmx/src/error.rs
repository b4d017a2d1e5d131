//! DMX error types

use thiserror::Error;

use crate::channel::Channel;

/// Errors raised by fixtures, rigs and DMX ports
#[derive(Error, Debug)]
pub enum DmxError {
    #[error("fixture has no '{0}' channel")]
    UnknownChannel(Channel),

    #[error("unknown channel name: {0}")]
    UnknownChannelName(String),

    #[error("unknown fixture kind: {0}")]
    UnknownFixture(String),

    #[error("fixture {kind} at address {address} does not fit in the universe")]
    InvalidAddress { kind: String, address: u16 },

    #[error("rig line {line}: {message}")]
    RigSyntax { line: usize, message: String },

    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DmxError>;
