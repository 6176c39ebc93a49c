use crate::chess::{Position, STARTING_FEN};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChesscamConfig {
    pub server: ServerConfig,
    pub detection: DetectionConfig,
    pub reconciler: ReconcilerConfig,
    pub session: SessionConfig,
    #[serde(default)]
    pub calibration: Vec<CalibrationConfig>,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// IP address to bind to
    #[serde(default = "default_server_ip")]
    pub ip: String,

    /// Port to listen on
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Interval between websocket pings
    #[serde(default = "default_keepalive_seconds")]
    pub keepalive_seconds: u64,

    /// Outbound messages buffered per client before it is dropped as too slow
    #[serde(default = "default_client_queue_capacity")]
    pub client_queue_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DetectionConfig {
    /// Model input width in pixels
    #[serde(default = "default_input_width")]
    pub input_width: u32,

    /// Model input height in pixels
    #[serde(default = "default_input_height")]
    pub input_height: u32,

    /// Minimum class score for a box to be considered
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// Overlap above which the lower-scoring box is suppressed
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,

    /// Upper bound on a single scorer call
    #[serde(default = "default_inference_timeout_ms")]
    pub inference_timeout_ms: u64,

    /// Frames analysed per second, per board
    #[serde(default = "default_max_fps")]
    pub max_fps: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ReconcilerConfig {
    /// Consecutive frames a single-move difference must be seen before it is emitted
    #[serde(default = "default_confirmation_frames")]
    pub confirmation_frames: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    /// Boards created at startup; zero waits for an operator reset
    #[serde(default)]
    pub board_count: usize,

    /// Starting position for every board
    #[serde(default = "default_initial_fen")]
    pub initial_fen: String,

    /// Directory of recorded scorer output (`board-<id>.jsonl`) used in place of cameras
    #[serde(default)]
    pub replay_dir: Option<String>,
}

/// Frame-pixel board corners for one board, ordered a8, h8, h1, a1
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CalibrationConfig {
    pub board_id: u32,
    pub corners: [[f32; 2]; 4],
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl ChesscamConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("chesscam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("server.ip", default_server_ip())?
            .set_default("server.port", default_server_port())?
            .set_default("server.keepalive_seconds", default_keepalive_seconds())?
            .set_default(
                "server.client_queue_capacity",
                default_client_queue_capacity() as i64,
            )?
            .set_default("detection.input_width", default_input_width())?
            .set_default("detection.input_height", default_input_height())?
            .set_default(
                "detection.confidence_threshold",
                default_confidence_threshold() as f64,
            )?
            .set_default("detection.iou_threshold", default_iou_threshold() as f64)?
            .set_default(
                "detection.inference_timeout_ms",
                default_inference_timeout_ms(),
            )?
            .set_default("detection.max_fps", default_max_fps())?
            .set_default(
                "reconciler.confirmation_frames",
                default_confirmation_frames(),
            )?
            .set_default("session.board_count", 0i64)?
            .set_default("session.initial_fen", default_initial_fen())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .add_source(File::with_name(&path_str).required(false))
            .add_source(
                Environment::with_prefix("CHESSCAM")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: ChesscamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.keepalive_seconds == 0 {
            return Err(ConfigError::Message(
                "Server keepalive_seconds must be greater than 0".to_string(),
            ));
        }

        if self.server.client_queue_capacity == 0 {
            return Err(ConfigError::Message(
                "Server client_queue_capacity must be greater than 0".to_string(),
            ));
        }

        if self.detection.input_width == 0 || self.detection.input_height == 0 {
            return Err(ConfigError::Message(
                "Detection input size must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.detection.confidence_threshold) {
            return Err(ConfigError::Message(
                "Detection confidence_threshold must be within [0, 1]".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.detection.iou_threshold) {
            return Err(ConfigError::Message(
                "Detection iou_threshold must be within [0, 1]".to_string(),
            ));
        }

        if self.detection.inference_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Detection inference_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.detection.max_fps == 0 {
            return Err(ConfigError::Message(
                "Detection max_fps must be greater than 0".to_string(),
            ));
        }

        if self.reconciler.confirmation_frames == 0 {
            return Err(ConfigError::Message(
                "Reconciler confirmation_frames must be greater than 0".to_string(),
            ));
        }

        if let Err(e) = Position::parse(&self.session.initial_fen) {
            return Err(ConfigError::Message(format!("Session initial_fen: {}", e)));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Calibrated corners for `board_id`, if any were configured
    pub fn calibration_for(&self, board_id: u32) -> Option<&CalibrationConfig> {
        self.calibration.iter().find(|c| c.board_id == board_id)
    }
}

impl Default for ChesscamConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                ip: default_server_ip(),
                port: default_server_port(),
                keepalive_seconds: default_keepalive_seconds(),
                client_queue_capacity: default_client_queue_capacity(),
            },
            detection: DetectionConfig {
                input_width: default_input_width(),
                input_height: default_input_height(),
                confidence_threshold: default_confidence_threshold(),
                iou_threshold: default_iou_threshold(),
                inference_timeout_ms: default_inference_timeout_ms(),
                max_fps: default_max_fps(),
            },
            reconciler: ReconcilerConfig {
                confirmation_frames: default_confirmation_frames(),
            },
            session: SessionConfig {
                board_count: 0,
                initial_fen: default_initial_fen(),
                replay_dir: None,
            },
            calibration: Vec::new(),
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

// Default value functions
fn default_server_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_server_port() -> u16 {
    8000
}
fn default_keepalive_seconds() -> u64 {
    20
}
fn default_client_queue_capacity() -> usize {
    64
}

fn default_input_width() -> u32 {
    480
}
fn default_input_height() -> u32 {
    288
}
fn default_confidence_threshold() -> f32 {
    0.5
}
fn default_iou_threshold() -> f32 {
    0.45
}
fn default_inference_timeout_ms() -> u64 {
    2000
}
fn default_max_fps() -> u32 {
    5
}

fn default_confirmation_frames() -> u32 {
    1
}

fn default_initial_fen() -> String {
    STARTING_FEN.to_string()
}

fn default_event_bus_capacity() -> usize {
    100
}
