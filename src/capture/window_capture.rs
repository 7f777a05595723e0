//! Single-window capture via blit into a CPU buffer

use std::sync::atomic::{AtomicU32, Ordering};

use log::{debug, info, warn};

use super::{FrameBuffer, FrameBufferError, WindowHandle};
use crate::window_filter::{Rejection, TargetFilter};

/// OS window queries needed to pick and capture windows
pub trait WindowSystem {
    /// Liveness check: the handle still identifies an existing window
    fn is_window(&self, handle: WindowHandle) -> bool;

    fn class_name(&self, handle: WindowHandle) -> Option<String>;

    /// Client area size in pixels
    fn client_size(&self, handle: WindowHandle) -> Option<(u32, u32)>;

    /// Top-level window under a screen coordinate
    fn top_level_at(&self, x: i32, y: i32) -> Option<WindowHandle>;

    /// Exact title lookup
    fn find_by_title(&self, title: &str) -> Option<WindowHandle>;

    /// Copy the visible pixels of the window's client area (occluding
    /// windows flattened in) into `dest` as top-down BGRA.
    ///
    /// `dest.len()` is `width * height * 4`. Every temporary OS resource is
    /// released before returning, on success and failure alike.
    fn blit(
        &self,
        handle: WindowHandle,
        width: u32,
        height: u32,
        dest: &mut [u8],
    ) -> anyhow::Result<()>;
}

/// Window chosen for capture plus the size the buffers were sized for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowTarget {
    pub handle: Option<WindowHandle>,
    pub last_known_width: u32,
    pub last_known_height: u32,
}

impl WindowTarget {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(handle: WindowHandle, width: u32, height: u32) -> Self {
        Self {
            handle: Some(handle),
            last_known_width: width,
            last_known_height: height,
        }
    }

    pub fn is_selected(&self) -> bool {
        self.handle.is_some()
    }

    pub fn clear(&mut self) {
        *self = Self::none();
    }
}

pub struct WindowCaptureSource {
    buffer: FrameBuffer,
    filter: TargetFilter,
}

impl WindowCaptureSource {
    pub fn new(filter: TargetFilter) -> Self {
        Self {
            buffer: FrameBuffer::new(),
            filter,
        }
    }

    pub fn filter(&self) -> &TargetFilter {
        &self.filter
    }

    pub fn filter_mut(&mut self) -> &mut TargetFilter {
        &mut self.filter
    }

    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    pub fn release(&mut self) {
        self.buffer.release();
    }

    /// Compare the target's current client size with the recorded one and
    /// reallocate the buffer when they differ (or nothing is allocated yet).
    ///
    /// Returns the new size when the buffer changed, so the caller can resize
    /// the output channel before the next publish.
    pub fn refresh_size<W: WindowSystem + ?Sized>(
        &mut self,
        target: &mut WindowTarget,
        windows: &W,
    ) -> Result<Option<(u32, u32)>, FrameBufferError> {
        let Some(handle) = target.handle else {
            return Ok(None);
        };
        if !windows.is_window(handle) {
            return Ok(None);
        }
        let Some((width, height)) = windows.client_size(handle) else {
            return Ok(None);
        };
        if width == 0 || height == 0 {
            // Minimized target: keep the old size until it comes back
            return Ok(None);
        }

        let unchanged = width == target.last_known_width
            && height == target.last_known_height
            && self.buffer.size() == (width, height);
        if unchanged {
            return Ok(None);
        }

        if (width, height) != (target.last_known_width, target.last_known_height) {
            info!(
                "Capture target resized {}x{} -> {}x{}",
                target.last_known_width, target.last_known_height, width, height
            );
        }
        target.last_known_width = width;
        target.last_known_height = height;
        self.buffer.reallocate(width, height)?;
        Ok(Some((width, height)))
    }

    /// Capture the target into the buffer. Returns false, leaving the buffer
    /// untouched, for a missing, own, excluded or dead window, and when the
    /// buffer has not been sized for the window's current client area.
    pub fn capture<W: WindowSystem + ?Sized>(&mut self, target: &WindowTarget, windows: &W) -> bool {
        let handle = match self.filter.check(target.handle, windows) {
            Ok(handle) => handle,
            Err(Rejection::NoTarget) => return false,
            Err(rejection) => {
                debug!("Window capture skipped: {:?}", rejection);
                return false;
            }
        };

        let size = (target.last_known_width, target.last_known_height);
        if !self.buffer.is_allocated() || self.buffer.size() != size {
            debug!("Window capture skipped: buffer not sized for {}x{}", size.0, size.1);
            return false;
        }
        if windows.client_size(handle) != Some(size) {
            debug!("Window capture skipped: resize pending");
            return false;
        }

        let (width, height) = self.buffer.size();
        match windows.blit(handle, width, height, self.buffer.pixels_mut()) {
            Ok(()) => true,
            Err(e) => {
                static FAILURES: AtomicU32 = AtomicU32::new(0);
                let count = FAILURES.fetch_add(1, Ordering::Relaxed);
                if count % 60 == 0 {
                    warn!("Window blit failed (#{}): {:#}", count, e);
                }
                false
            }
        }
    }
}
