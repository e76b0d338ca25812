//! Error types shared by the daemon components.
//!
//! Every failure the control loop can observe is expressed as an [`RgbError`].
//! The loop never inspects messages; it asks [`RgbError::class`] how the
//! failure should be handled.

use std::time::Duration;

use thiserror::Error;

/// How a failure is handled by the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Logged, the loop carries on next tick without state corruption.
    Transient,
    /// The lighting server could not be started or reached in time.
    /// Fatal on first boot only.
    ServerLifecycle,
    /// Anything the loop did not expect. Logged with context and followed by
    /// a cooldown before the next tick.
    Unexpected,
}

/// Main error type for thermal_rgbd operations.
#[derive(Error, Debug)]
pub enum RgbError {
    /// Sensor command failed or its output held no usable reading.
    #[error("temperature unavailable: {0}")]
    Sensor(String),

    /// The lighting server refused or dropped the connection.
    #[error("connection to lighting server failed: {0}")]
    Connection(#[source] std::io::Error),

    /// A write to the lighting server did not complete.
    #[error("device write failed: {0}")]
    DeviceWrite(#[source] std::io::Error),

    /// A network or subprocess call exceeded its deadline.
    #[error("{what} timed out after {after:?}")]
    Timeout { what: &'static str, after: Duration },

    /// The lighting server process could not be launched or never became
    /// reachable.
    #[error("lighting server unavailable: {0}")]
    ServerLifecycle(String),

    /// The lighting server sent something that does not follow the protocol.
    #[error("protocol violation: {0}")]
    Protocol(String),
}

impl RgbError {
    /// Classifies the error for the control loop.
    pub fn class(&self) -> ErrorClass {
        match self {
            RgbError::Sensor(_)
            | RgbError::Connection(_)
            | RgbError::DeviceWrite(_)
            | RgbError::Timeout { .. } => ErrorClass::Transient,
            RgbError::ServerLifecycle(_) => ErrorClass::ServerLifecycle,
            RgbError::Protocol(_) => ErrorClass::Unexpected,
        }
    }

    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        RgbError::Protocol(msg.into())
    }
}

pub type Result<T, E = RgbError> = std::result::Result<T, E>;
