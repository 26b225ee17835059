use derive_more::From;
use thiserror::Error;

use crate::protocol::ServiceEndpoint;
use crate::wire::{CommandError, FrameCipherError, FrameCodecError};

/// Errors returned by connection management and BLE adapters.
#[derive(Debug, Error)]
pub enum InteractionError {
    #[error("BLE operation failed")]
    Ble(#[from] btleplug::Error),
    #[error("no BLE adapters were found")]
    NoAdapters,
    #[error("a device name is required to connect")]
    MissingDeviceName,
    #[error("at least one connection attempt is required")]
    NoConnectionAttempts,
    #[error("no device named `{name}` was found after {attempts} scan attempt(s)")]
    DeviceNotFound { name: String, attempts: u32 },
    #[error("device `{device_id}` was not seen in the latest scan")]
    UnknownDevice { device_id: String },
    #[error("not connected to a device")]
    NotConnected,
    #[error("the BLE link to the device was lost")]
    LinkLost,
    #[error("endpoint `{endpoint}` was not found on the connected device")]
    MissingEndpoint { endpoint: ServiceEndpoint },
    #[error("BLE transport failed: {message}")]
    Transport { message: String },
    #[error("failed while waiting for Ctrl+C")]
    CtrlC { source: std::io::Error },
    #[error(transparent)]
    Fixture(#[from] FixtureError),
}

/// Errors returned when parsing fake adapter fixtures.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum FixtureError {
    #[error("the fake discovery fixture is empty")]
    EmptyFixture,
    #[error("fixture records must contain four pipe-delimited fields")]
    InvalidRecordFieldCount,
    #[error("fixture records cannot contain empty mandatory fields")]
    EmptyRecordField,
    #[error("failed to parse RSSI value")]
    InvalidRssi(#[from] std::num::ParseIntError),
    #[error("hex payload `{value}` is not valid hexadecimal")]
    InvalidHex { value: String },
}

/// Errors returned when validating command-line configuration.
#[derive(Debug, Error)]
pub(crate) enum CliConfigError {
    #[error("missing fake scan fixture while fake mode is enabled")]
    MissingFakeScanFixture,
    #[error("an AES key is required; pass --key, set GLASSES_AES_KEY, or use --plaintext")]
    MissingCipherKey,
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Coarse classification of [`ProtocolError`] values.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display)]
pub enum ErrorKind {
    /// Arguments failed validation. Nothing was sent.
    #[display("invalid_argument")]
    InvalidArgument,
    /// The operation needs a connected device.
    #[display("not_connected")]
    NotConnected,
    /// Every connection attempt finished without finding the device.
    #[display("device_not_found")]
    DeviceNotFound,
    /// Framing or encryption invariants were violated.
    #[display("encoding")]
    Encoding,
    /// The BLE adapter failed.
    #[display("transport")]
    Transport,
}

/// Top-level protocol errors wrapping module-specific error types.
#[derive(Debug, Error, From)]
pub enum ProtocolError {
    #[error(transparent)]
    #[from(CommandError, Box<CommandError>)]
    Command(Box<CommandError>),
    #[error(transparent)]
    #[from(FrameCodecError, Box<FrameCodecError>)]
    FrameCodec(Box<FrameCodecError>),
    #[error(transparent)]
    #[from(FrameCipherError, Box<FrameCipherError>)]
    FrameCipher(Box<FrameCipherError>),
    #[error(transparent)]
    #[from(InteractionError, Box<InteractionError>)]
    Interaction(Box<InteractionError>),
}

impl ProtocolError {
    /// Classifies the error.
    ///
    /// ```
    /// use shining_glasses::{Brightness, ErrorKind, ProtocolError};
    ///
    /// let error = ProtocolError::from(Brightness::new(101).unwrap_err());
    /// assert_eq!(ErrorKind::InvalidArgument, error.kind());
    /// ```
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Command(_) => ErrorKind::InvalidArgument,
            Self::FrameCodec(_) => ErrorKind::Encoding,
            Self::FrameCipher(error) => match error.as_ref() {
                FrameCipherError::InvalidKey { .. } => ErrorKind::InvalidArgument,
                _ => ErrorKind::Encoding,
            },
            Self::Interaction(error) => match error.as_ref() {
                InteractionError::MissingDeviceName
                | InteractionError::NoConnectionAttempts
                | InteractionError::Fixture(_) => ErrorKind::InvalidArgument,
                InteractionError::NotConnected | InteractionError::LinkLost => {
                    ErrorKind::NotConnected
                }
                InteractionError::DeviceNotFound { .. } => ErrorKind::DeviceNotFound,
                InteractionError::Ble(_)
                | InteractionError::NoAdapters
                | InteractionError::UnknownDevice { .. }
                | InteractionError::MissingEndpoint { .. }
                | InteractionError::Transport { .. }
                | InteractionError::CtrlC { .. } => ErrorKind::Transport,
            },
        }
    }
}
