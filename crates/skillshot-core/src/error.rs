use thiserror::Error;

use crate::devices::HardwareAddress;
use crate::mode::ModeId;

/// Configuration-time faults. All of these are raised synchronously from the
/// registration or lookup call that caused them.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no switch named `{0}`")]
    UnknownSwitch(String),
    #[error("no coil named `{0}`")]
    UnknownCoil(String),
    #[error("no LED named `{0}`")]
    UnknownLed(String),
    #[error("duplicate device name `{0}`")]
    DuplicateName(String),
    #[error("duplicate hardware address {0}")]
    DuplicateAddress(HardwareAddress),
    #[error("machine is already configured")]
    AlreadyConfigured,
}

/// Mode-queue lifecycle misuse.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModeError {
    #[error("mode {0:?} is already in the queue")]
    AlreadyQueued(ModeId),
    #[error("no registered mode with id {0:?}")]
    Unregistered(ModeId),
}

/// Faults crossing the hardware platform seam. Only connect/disconnect
/// surface here; individual coil/LED write failures are the backend's to
/// swallow or report.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("platform is not connected")]
    NotConnected,
    #[error("platform is already connected")]
    AlreadyConnected,
    #[error("connect failed: {0}")]
    ConnectFailed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Top-level error for game-controller startup and shutdown.
#[derive(Debug, Error)]
pub enum GameError {
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Mode(#[from] ModeError),
}
