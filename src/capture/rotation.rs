//! Display rotation of a duplicated output
//!
//! Duplicated frames arrive in the output's scan-out orientation, while
//! monitor geometry is in desktop orientation. For a rotated output the
//! readback is turned back into desktop orientation before anything else
//! sees it.

use super::frame_buffer::BYTES_PER_PIXEL;
use super::FrameBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputRotation {
    #[default]
    Identity,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl OutputRotation {
    pub fn swaps_axes(self) -> bool {
        matches!(self, OutputRotation::Rotate90 | OutputRotation::Rotate270)
    }

    /// Size of the duplicated surface for a desktop of `desktop` size
    pub fn surface_size(self, desktop: (u32, u32)) -> (u32, u32) {
        if self.swaps_axes() {
            (desktop.1, desktop.0)
        } else {
            desktop
        }
    }

    /// Surface pixel that shows desktop pixel `(x, y)`
    fn surface_pixel(self, x: usize, y: usize, surface: (usize, usize)) -> (usize, usize) {
        let (sw, sh) = surface;
        match self {
            OutputRotation::Identity => (x, y),
            OutputRotation::Rotate90 => (y, sh - 1 - x),
            OutputRotation::Rotate180 => (sw - 1 - x, sh - 1 - y),
            OutputRotation::Rotate270 => (sw - 1 - y, x),
        }
    }
}

/// Copy a mapped surface (`pitch` bytes per row) into `dest`, which must be
/// sized for the desktop orientation. Returns false when the sizes disagree.
pub fn copy_to_desktop(
    surface: &[u8],
    pitch: usize,
    surface_size: (u32, u32),
    rotation: OutputRotation,
    dest: &mut FrameBuffer,
) -> bool {
    let (sw, sh) = (surface_size.0 as usize, surface_size.1 as usize);
    let row_bytes = sw * BYTES_PER_PIXEL;
    // The axis swap is its own inverse
    let desktop = rotation.surface_size(surface_size);
    if dest.size() != desktop || pitch < row_bytes {
        return false;
    }
    if sh == 0 || surface.len() < pitch * (sh - 1) + row_bytes {
        return false;
    }

    let (dw, dh) = (dest.width() as usize, dest.height() as usize);
    let stride = dest.stride();
    let pixels = dest.pixels_mut();

    if rotation == OutputRotation::Identity {
        for (row, out) in pixels.chunks_exact_mut(stride).enumerate() {
            out.copy_from_slice(&surface[row * pitch..row * pitch + row_bytes]);
        }
        return true;
    }

    for y in 0..dh {
        for x in 0..dw {
            let (sx, sy) = rotation.surface_pixel(x, y, (sw, sh));
            let from = sy * pitch + sx * BYTES_PER_PIXEL;
            let to = y * stride + x * BYTES_PER_PIXEL;
            pixels[to..to + BYTES_PER_PIXEL].copy_from_slice(&surface[from..from + BYTES_PER_PIXEL]);
        }
    }
    true
}
