//! Host window collaborator
//!
//! The capture engine never creates or styles windows itself. It asks the
//! host for geometry and hands back presentation and status changes.

use crate::capture::{CaptureMode, WindowHandle};

/// Host window client area in screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostGeometry {
    pub client_left: i32,
    pub client_top: i32,
    pub client_width: u32,
    pub client_height: u32,
    pub minimized: bool,
}

/// Presentation style requested per capture mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presentation {
    /// Layered, see-through client area so the desktop underneath is captured
    pub transparent: bool,
    pub topmost: bool,
}

impl Presentation {
    pub fn for_mode(mode: CaptureMode) -> Self {
        match mode {
            CaptureMode::Region => Self {
                transparent: true,
                topmost: true,
            },
            CaptureMode::Desktop | CaptureMode::Window => Self {
                transparent: false,
                topmost: false,
            },
        }
    }
}

/// Values the on-screen hint consumes
#[derive(Debug, Clone, PartialEq)]
pub struct StatusLine {
    pub mode: CaptureMode,
    pub channel: Option<String>,
    pub width: u32,
    pub height: u32,
    pub fps: f32,
    /// Window mode without a target: prompt the user to click one
    pub awaiting_target: bool,
}

impl StatusLine {
    pub fn render(&self) -> String {
        if self.awaiting_target {
            return format!("SpoutCap - {} - click a window to capture", self.mode);
        }
        match &self.channel {
            Some(channel) => format!(
                "SpoutCap - {} - {} {}x{} - {:.0} fps",
                self.mode, channel, self.width, self.height, self.fps
            ),
            None => format!("SpoutCap - {} - idle", self.mode),
        }
    }
}

pub trait HostWindow {
    fn handle(&self) -> Option<WindowHandle>;

    fn geometry(&self) -> HostGeometry;

    fn is_minimized(&self) -> bool {
        self.geometry().minimized
    }

    fn apply_presentation(&mut self, presentation: Presentation);

    /// Shown once per failure; startup problems only. The message has
    /// already been logged by the caller.
    fn notify_fatal(&mut self, message: &str);

    fn set_status(&mut self, status: &StatusLine);
}
