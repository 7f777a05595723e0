//! Window target filtering
//!
//! Decides whether a window may be captured. Applied both when the picker
//! resolves a click and on every capture call, since a valid target can turn
//! into a stale handle between ticks.

use serde::{Deserialize, Serialize};

use crate::capture::{WindowHandle, WindowSystem};
use crate::config;

/// Why a window was refused as a capture target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// No window selected
    NoTarget,
    /// The host window itself (would mirror into its own output)
    OwnWindow,
    /// Window class on the exclusion list (console windows by default)
    ExcludedClass(String),
    /// Handle no longer identifies a live window
    NotAlive,
}

/// Settings for target filtering
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetFilterSettings {
    /// Window class names that can never be captured
    #[serde(default = "default_excluded_classes")]
    pub excluded_classes: Vec<String>,
}

fn default_excluded_classes() -> Vec<String> {
    config::capture::CONSOLE_WINDOW_CLASSES
        .iter()
        .map(|c| c.to_string())
        .collect()
}

impl Default for TargetFilterSettings {
    fn default() -> Self {
        Self {
            excluded_classes: default_excluded_classes(),
        }
    }
}

impl TargetFilterSettings {
    /// Class comparison is case-insensitive, like Win32 class atoms
    pub fn is_excluded_class(&self, class_name: &str) -> bool {
        self.excluded_classes
            .iter()
            .any(|c| c.eq_ignore_ascii_case(class_name))
    }

    pub fn exclude_class(&mut self, class_name: &str) {
        if !self.is_excluded_class(class_name) {
            self.excluded_classes.push(class_name.to_string());
        }
    }
}

/// Filter bound to the running process (knows its own host window)
#[derive(Debug, Clone, Default)]
pub struct TargetFilter {
    settings: TargetFilterSettings,
    own_window: Option<WindowHandle>,
}

impl TargetFilter {
    pub fn new(settings: TargetFilterSettings, own_window: Option<WindowHandle>) -> Self {
        Self {
            settings,
            own_window,
        }
    }

    pub fn own_window(&self) -> Option<WindowHandle> {
        self.own_window
    }

    pub fn set_own_window(&mut self, own_window: Option<WindowHandle>) {
        self.own_window = own_window;
    }

    pub fn settings(&self) -> &TargetFilterSettings {
        &self.settings
    }

    /// Check a candidate target. Liveness is queried first so a closed
    /// window is reported as such rather than by its (now unknown) class.
    pub fn check<W: WindowSystem + ?Sized>(
        &self,
        handle: Option<WindowHandle>,
        windows: &W,
    ) -> Result<WindowHandle, Rejection> {
        let handle = handle.ok_or(Rejection::NoTarget)?;

        if !windows.is_window(handle) {
            return Err(Rejection::NotAlive);
        }

        if self.own_window == Some(handle) {
            return Err(Rejection::OwnWindow);
        }

        if let Some(class_name) = windows.class_name(handle) {
            if self.settings.is_excluded_class(&class_name) {
                return Err(Rejection::ExcludedClass(class_name));
            }
        }

        Ok(handle)
    }
}
