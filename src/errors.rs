use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RfeError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serial error: {0}")]
    Serial(#[from] serialport::Error),
    #[error("port unavailable: {0}")]
    PortUnavailable(String),
    #[error("handshake timed out after {attempts} resync attempts")]
    HandshakeTimeout { attempts: u32 },
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("control frame received while sweep data was expected: {0}")]
    ControlFault(String),
    #[error("invalid sweep parameter: {0}")]
    Validation(String),
    #[error("device confirmed {actual} sweep steps, expected {expected}")]
    ConfigMismatch { expected: usize, actual: usize },
    #[error("command write failed: {0}")]
    Write(String),
}

pub type Result<T> = std::result::Result<T, RfeError>;
