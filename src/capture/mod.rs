// capture/mod.rs - Capture Engine Module
//
// Platform-neutral capture sources and the shared types they exchange.
// The OS-specific halves (DXGI duplication, GDI blits, D3D11 crops) live in
// `crate::platform::windows` and plug in through the backend traits below.

pub mod duplication;
pub mod frame_buffer;
pub mod region;
pub mod rotation;
pub mod window_capture;

use std::fmt;
use std::num::NonZeroIsize;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use duplication::{
    AcquireOutcome, DuplicationBackend, DuplicationHandle, DuplicationSource, FrameStatus,
    MonitorGeometry,
};
pub use frame_buffer::{FrameBuffer, FrameBufferError};
pub use region::{CropBackend, CropOrigin, RegionCropper};
pub use rotation::OutputRotation;
pub use window_capture::{WindowCaptureSource, WindowSystem, WindowTarget};

/// Which source feeds the output channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CaptureMode {
    /// Full primary-monitor desktop via frame duplication
    #[default]
    Desktop,
    /// The part of the desktop underneath the host window's client area
    Region,
    /// One externally selected top-level window
    Window,
}

impl CaptureMode {
    pub const ALL: [CaptureMode; 3] = [CaptureMode::Desktop, CaptureMode::Region, CaptureMode::Window];

    /// Whether this mode reads the duplication output
    pub fn uses_duplication(self) -> bool {
        matches!(self, CaptureMode::Desktop | CaptureMode::Region)
    }
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            CaptureMode::Desktop => "Desktop",
            CaptureMode::Region => "Region",
            CaptureMode::Window => "Window",
        };
        write!(f, "{}", value)
    }
}

impl FromStr for CaptureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "desktop" => Ok(CaptureMode::Desktop),
            "region" => Ok(CaptureMode::Region),
            "window" => Ok(CaptureMode::Window),
            _ => Err(format!("Invalid capture mode: {}", s)),
        }
    }
}

/// The live capture session, one per process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSession {
    pub mode: CaptureMode,
    pub width: u32,
    pub height: u32,
    pub output_channel_name: String,
}

/// Opaque OS window identifier. `None` at use sites means "no window".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(NonZeroIsize);

impl WindowHandle {
    pub fn from_raw(raw: isize) -> Option<Self> {
        NonZeroIsize::new(raw).map(Self)
    }

    pub fn raw(self) -> isize {
        self.0.get()
    }
}

/// Reference to a GPU texture owned by a capture backend.
///
/// On Windows `raw` is an `ID3D11Texture2D*` that is NOT AddRef'd: it stays
/// valid while the owning source keeps its texture, which holds for the tick
/// in which the handle was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureHandle {
    pub raw: usize,
    pub width: u32,
    pub height: u32,
}

impl TextureHandle {
    pub fn new(raw: usize, width: u32, height: u32) -> Self {
        Self { raw, width, height }
    }
}
