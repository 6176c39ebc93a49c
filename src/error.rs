use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChesscamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Board error: {0}")]
    Board(#[from] BoardError),

    #[error("Detection error: {0}")]
    Detection(#[from] DetectionError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl ChesscamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<C: Into<String>, M: Into<String>>(component: C, message: M) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Failures creating, resetting or looking up boards
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoardError {
    #[error("Invalid board configuration: {details}")]
    InvalidConfiguration { details: String },

    #[error("Camera unavailable: requested {requested} capture devices, {available} available")]
    CameraUnavailable { requested: usize, available: usize },

    #[error("Board {board_id} not found")]
    NotFound { board_id: u32 },
}

/// Per-frame detection failures. None of these are fatal to a board.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectionError {
    #[error("Malformed frame: {details}")]
    MalformedFrame { details: String },

    #[error("Scorer failed: {details}")]
    ScorerFailed { details: String },

    #[error("Scorer timed out after {timeout_ms}ms")]
    ScorerTimeout { timeout_ms: u64 },

    #[error("Malformed scorer output: {details}")]
    MalformedOutput { details: String },

    #[error("Invalid calibration: {details}")]
    InvalidCalibration { details: String },

    #[error("Frame source failed: {details}")]
    FrameSource { details: String },
}

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Failed to bind {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server startup failed: {details}")]
    StartupFailed { details: String },
}

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },
}

pub type Result<T> = std::result::Result<T, ChesscamError>;
