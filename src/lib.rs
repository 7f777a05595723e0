//! SpoutCap - Capture Engine Library
//!
//! Desktop, region and window capture republished through shared-frame
//! output channels. The state machines are platform-neutral; the Windows
//! backends live in [`platform`].

// Configuration constants
pub mod config;

// Window target filtering (own window, excluded classes, liveness)
pub mod window_filter;

pub mod capture;
pub mod capture_deps;
pub mod controller;
pub mod host;
pub mod picker;
pub mod platform;
pub mod sender;
pub mod shared_frame;

// Re-export commonly used types
pub use capture::{CaptureMode, FrameBuffer, WindowHandle, WindowTarget};
pub use controller::{CaptureModeController, ControllerConfig, SwitchError, TickReport};
pub use sender::{FrameSender, OutputChannel, Representation};

#[cfg(windows)]
pub use platform::windows::WindowsPlatform;
