use serde::{Deserialize, Serialize};

use spoutcap_capture::capture::CaptureMode;
use spoutcap_capture::config;
use spoutcap_capture::controller::{ChannelNames, ControllerConfig};
use spoutcap_capture::picker::MouseButton;
use spoutcap_capture::window_filter::TargetFilterSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Capture
    #[serde(default)]
    pub initial_mode: CaptureMode,
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,
    #[serde(default = "default_duplication_timeout_ms")]
    pub duplication_timeout_ms: u32,

    // Window picking
    #[serde(default)]
    pub pick_button: MouseButton,
    #[serde(default)]
    pub target_filter: TargetFilterSettings,

    // Output
    #[serde(default)]
    pub channels: ChannelNames,
    /// Ask receivers to flip published textures vertically
    #[serde(default)]
    pub flip_texture_output: bool,

    // Logging
    #[serde(default = "default_log_level")]
    pub log_level: String, // "Off", "Error", "Warn", "Info", "Debug", "Trace"
    #[serde(default = "default_log_to_file")]
    pub log_to_file: bool,
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u32,
}

// Default functions for serde
fn default_target_fps() -> u32 {
    config::capture::DEFAULT_TARGET_FPS
}

fn default_duplication_timeout_ms() -> u32 {
    config::capture::DEFAULT_DUPLICATION_TIMEOUT_MS
}

fn default_log_level() -> String {
    "Info".to_string()
}

fn default_log_to_file() -> bool {
    true // Enable file logging by default
}

fn default_log_retention_days() -> u32 {
    config::capture::LOG_RETENTION_DAYS as u32
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            initial_mode: CaptureMode::default(),
            target_fps: default_target_fps(),
            duplication_timeout_ms: default_duplication_timeout_ms(),
            pick_button: MouseButton::default(),
            target_filter: TargetFilterSettings::default(),
            channels: ChannelNames::default(),
            flip_texture_output: false,
            log_level: default_log_level(),
            log_to_file: default_log_to_file(),
            log_retention_days: default_log_retention_days(),
        }
    }
}

impl Settings {
    /// Frame loop period; a zero FPS setting falls back to the default
    pub fn frame_interval(&self) -> std::time::Duration {
        let fps = if self.target_fps == 0 {
            config::capture::DEFAULT_TARGET_FPS
        } else {
            self.target_fps
        };
        std::time::Duration::from_micros(1_000_000 / fps as u64)
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            channels: self.channels.clone(),
            flip_vertical: self.flip_texture_output,
            pick_button: self.pick_button,
            duplication_timeout_ms: self.duplication_timeout_ms,
            target_filter: self.target_filter.clone(),
        }
    }
}
