//! Platform seam of the capture controller
//!
//! Everything the controller needs from the OS comes through the associated
//! types of [`CapturePlatform`], so the whole tick logic runs against mocks in
//! tests.

use crate::capture::{CropBackend, DuplicationBackend, WindowSystem};
use crate::picker::PointerHook;
use crate::sender::OutputChannel;

pub trait CapturePlatform {
    type Duplication: DuplicationBackend;
    type Crop: CropBackend;
    type Channel: OutputChannel;
    type Hook: PointerHook;
    type Windows: WindowSystem;
}

/// Parts that need the shared graphics device
pub struct GpuParts<P: CapturePlatform> {
    pub duplication: P::Duplication,
    pub crop: P::Crop,
}

/// Concrete collaborators handed to the controller at startup
pub struct PlatformParts<P: CapturePlatform> {
    /// `Err` carries the device creation failure so it can be reported once
    pub gpu: Result<GpuParts<P>, anyhow::Error>,
    pub channel: P::Channel,
    pub hook: P::Hook,
    pub windows: P::Windows,
}
