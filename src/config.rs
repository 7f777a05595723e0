//! Application Configuration Constants
//!
//! Centralized configuration for magic numbers, timings, names and defaults.

/// Host Window Configuration
pub mod window {
    /// Default client size of the host window (width, height)
    pub const DEFAULT_CLIENT_SIZE: (i32, i32) = (640, 360);

    /// Window class registered for the host window
    pub const HOST_CLASS_NAME: &str = "SpoutCapHostWindow";

    /// Base title; the status line is appended to it
    pub const HOST_TITLE: &str = "SpoutCap";

    /// Region mode background color (BGR format) - used as transparency key
    /// Magenta: RGB(255, 0, 255) = BGR(0xFF00FF)
    pub const REGION_COLOR_KEY: u32 = 0xFF00FF;

    /// Normal mode background color (BGR format)
    /// Dark gray: RGB(32, 32, 32) = BGR(0x202020)
    pub const NORMAL_BG_COLOR: u32 = 0x202020;

    /// Title refresh interval for the status line (milliseconds)
    pub const STATUS_REFRESH_MS: u64 = 500;
}

/// Capture Engine Configuration
pub mod capture {
    /// Default target FPS for the frame loop
    pub const DEFAULT_TARGET_FPS: u32 = 60;

    /// Upper bound for a single duplication wait (milliseconds)
    pub const DEFAULT_DUPLICATION_TIMEOUT_MS: u32 = 200;

    /// Window classes that are never capture targets
    pub const CONSOLE_WINDOW_CLASSES: &[&str] = &["ConsoleWindowClass"];

    /// Log retention period in days
    pub const LOG_RETENTION_DAYS: u64 = 30;
}

/// Output Channel Configuration
pub mod channel {
    /// Default channel names, one per capture mode
    pub const DESKTOP_NAME: &str = "Desktop";
    pub const REGION_NAME: &str = "Region";
    pub const WINDOW_NAME: &str = "Window";

    /// Prefix of the named file mapping backing a channel
    pub const MAPPING_PREFIX: &str = "SpoutCap.";

    /// Name suffixes tried when another process already owns a channel
    pub const MAX_NAME_SUFFIX: u32 = 16;
}

/// Window Picker Configuration
pub mod picker {
    /// Pack a screen point into one atomic word: x in the high half
    pub fn pack_point(x: i32, y: i32) -> u64 {
        ((x as u32 as u64) << 32) | (y as u32 as u64)
    }

    pub fn unpack_point(packed: u64) -> (i32, i32) {
        ((packed >> 32) as u32 as i32, packed as u32 as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::picker::*;

    #[test]
    fn test_point_packing_keeps_sign() {
        for (x, y) in [(0, 0), (-1, 1), (i32::MIN, i32::MAX), (-1920, -1080)] {
            assert_eq!(unpack_point(pack_point(x, y)), (x, y));
        }
    }

    #[test]
    fn test_default_channel_names_are_distinct() {
        use super::channel::*;
        assert_ne!(DESKTOP_NAME, REGION_NAME);
        assert_ne!(REGION_NAME, WINDOW_NAME);
    }
}
