/// Error taxonomy for the panel/session bridge.

use crate::services::platform::{BuildChannel, PlatformKey};

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Host OS is not one F18 is distributed for.
    #[error("Unsupported platform: {os} ({arch})")]
    UnsupportedPlatform { os: String, arch: String },

    /// Neither the channel's revision nor its fallback has a build for this platform.
    #[error("No F18 build available for channel {channel} on {platform}")]
    NoBuildAvailable {
        channel: BuildChannel,
        platform: PlatformKey,
    },

    #[error("Failed to spawn terminal: {0}")]
    Spawn(String),

    #[error("Malformed terminal geometry: {0}")]
    MalformedGeometry(String),

    #[error("Terminal process was not created: {0}")]
    ProcessNotCreated(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Panel dispatcher is not running")]
    DispatcherStopped,

    #[error("Rendering surface error: {0}")]
    Surface(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
