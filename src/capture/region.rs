//! Region crop of the duplication output under the host window
//!
//! The crop rectangle follows the host window's client area in screen space.
//! While the host is minimized its geometry is meaningless, so the last
//! origin and size are held instead of being recomputed.

use log::{debug, warn};

use super::frame_buffer::BYTES_PER_PIXEL;
use super::{FrameBuffer, MonitorGeometry, TextureHandle};
use crate::host::HostGeometry;

/// Screen-space top-left corner of the crop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CropOrigin {
    pub left: i32,
    pub top: i32,
}

/// GPU side of the crop: draws a sub-rectangle of `source` into an offscreen
/// render target of `dest_width x dest_height`, recreating the target when
/// that size changes.
pub trait CropBackend {
    /// `crop_left`/`crop_top` are in source-texture pixels and may place the
    /// rectangle partly outside the source; uncovered pixels are black.
    fn crop(
        &mut self,
        source: &TextureHandle,
        dest_width: u32,
        dest_height: u32,
        crop_left: i32,
        crop_top: i32,
    ) -> anyhow::Result<TextureHandle>;

    /// Drop the render target (mode teardown)
    fn release(&mut self);
}

pub struct RegionCropper<B: CropBackend> {
    backend: B,
    origin: Option<CropOrigin>,
    size: (u32, u32),
    buffer: FrameBuffer,
}

impl<B: CropBackend> RegionCropper<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            origin: None,
            size: (0, 0),
            buffer: FrameBuffer::new(),
        }
    }

    /// Follow the host window. Returns true when origin or size moved.
    pub fn track_host(&mut self, host: &HostGeometry) -> bool {
        if host.minimized || host.client_width == 0 || host.client_height == 0 {
            return false;
        }

        let origin = CropOrigin {
            left: host.client_left,
            top: host.client_top,
        };
        let size = (host.client_width, host.client_height);
        let changed = self.origin != Some(origin) || self.size != size;
        if changed {
            debug!(
                "Region crop now {}x{} at ({}, {})",
                size.0, size.1, origin.left, origin.top
            );
        }
        self.origin = Some(origin);
        self.size = size;
        changed
    }

    pub fn origin(&self) -> Option<CropOrigin> {
        self.origin
    }

    pub fn dest_size(&self) -> (u32, u32) {
        self.size
    }

    /// Draw a sub-rectangle of `source` into the render target
    pub fn crop(
        &mut self,
        source: &TextureHandle,
        dest_width: u32,
        dest_height: u32,
        crop_left: i32,
        crop_top: i32,
    ) -> Option<TextureHandle> {
        match self
            .backend
            .crop(source, dest_width, dest_height, crop_left, crop_top)
        {
            Ok(target) => Some(target),
            Err(e) => {
                warn!("Region crop failed: {:#}", e);
                None
            }
        }
    }

    /// Crop the tracked rectangle out of the duplication texture
    pub fn crop_tracked(
        &mut self,
        source: &TextureHandle,
        monitor: MonitorGeometry,
    ) -> Option<TextureHandle> {
        let origin = self.origin?;
        let (width, height) = self.size;
        self.crop(
            source,
            width,
            height,
            origin.left - monitor.left,
            origin.top - monitor.top,
        )
    }

    /// CPU counterpart of [`crop_tracked`](Self::crop_tracked), for the
    /// pixel-buffer publish path.
    pub fn crop_pixels(
        &mut self,
        source: &FrameBuffer,
        monitor: MonitorGeometry,
    ) -> Option<&FrameBuffer> {
        let origin = self.origin?;
        let (width, height) = self.size;
        if let Err(e) = self.buffer.ensure_size(width, height) {
            warn!("Region buffer allocation failed: {}", e);
            return None;
        }
        copy_region(
            source,
            &mut self.buffer,
            origin.left - monitor.left,
            origin.top - monitor.top,
        );
        Some(&self.buffer)
    }

    pub fn release(&mut self) {
        self.backend.release();
        self.buffer.release();
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

/// Copy the `dest`-sized rectangle at (`left`, `top`) of `source` into
/// `dest`. Pixels outside `source` become opaque black.
pub fn copy_region(source: &FrameBuffer, dest: &mut FrameBuffer, left: i32, top: i32) {
    for pixel in dest.pixels_mut().chunks_exact_mut(BYTES_PER_PIXEL) {
        pixel.copy_from_slice(&[0, 0, 0, 255]);
    }

    let (src_w, src_h) = (source.width() as i64, source.height() as i64);
    let (dst_w, dst_h) = (dest.width() as i64, dest.height() as i64);
    let (left, top) = (left as i64, top as i64);

    let x0 = left.max(0);
    let y0 = top.max(0);
    let x1 = (left + dst_w).min(src_w);
    let y1 = (top + dst_h).min(src_h);
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    let row_bytes = ((x1 - x0) as usize) * BYTES_PER_PIXEL;
    let src_stride = source.stride();
    let dst_stride = dest.stride();
    let src = source.pixels();
    let dst = dest.pixels_mut();

    for y in y0..y1 {
        let src_start = y as usize * src_stride + x0 as usize * BYTES_PER_PIXEL;
        let dst_start =
            (y - top) as usize * dst_stride + (x0 - left) as usize * BYTES_PER_PIXEL;
        dst[dst_start..dst_start + row_bytes]
            .copy_from_slice(&src[src_start..src_start + row_bytes]);
    }
}
