//! Owning BGRA pixel buffer shared by every capture source

use thiserror::Error;

use super::TextureHandle;

/// Bytes per BGRA pixel
pub const BYTES_PER_PIXEL: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameBufferError {
    #[error("invalid frame size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
    #[error("failed to allocate {bytes} bytes for {width}x{height} frame")]
    Allocation { width: u32, height: u32, bytes: usize },
}

/// CPU pixel buffer plus an optional GPU texture of the same size.
///
/// `pixels.len() == width * height * 4` whenever the buffer is allocated.
/// A size change replaces the allocation; the old one is dropped in the swap.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    texture: Option<TextureHandle>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(width: u32, height: u32) -> Result<Self, FrameBufferError> {
        let mut buffer = Self::new();
        buffer.reallocate(width, height)?;
        Ok(buffer)
    }

    /// Byte length of a BGRA frame, `None` on zero size or overflow
    pub fn byte_len(width: u32, height: u32) -> Option<usize> {
        if width == 0 || height == 0 {
            return None;
        }
        (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(BYTES_PER_PIXEL)
    }

    /// Replace the pixel storage with a zeroed `width x height` allocation.
    ///
    /// On failure the buffer is left released (0x0), never half-sized.
    pub fn reallocate(&mut self, width: u32, height: u32) -> Result<(), FrameBufferError> {
        // Drop the old allocation before asking for the new one
        self.release();

        let bytes = Self::byte_len(width, height)
            .ok_or(FrameBufferError::InvalidSize { width, height })?;

        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(bytes)
            .map_err(|_| FrameBufferError::Allocation { width, height, bytes })?;
        pixels.resize(bytes, 0);

        self.pixels = pixels;
        self.width = width;
        self.height = height;
        Ok(())
    }

    /// Reallocate only when the size differs. Returns true if it changed.
    pub fn ensure_size(&mut self, width: u32, height: u32) -> Result<bool, FrameBufferError> {
        if self.is_allocated() && self.width == width && self.height == height {
            return Ok(false);
        }
        self.reallocate(width, height)?;
        Ok(true)
    }

    pub fn release(&mut self) {
        self.pixels = Vec::new();
        self.width = 0;
        self.height = 0;
        self.texture = None;
    }

    pub fn is_allocated(&self) -> bool {
        !self.pixels.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Bytes per row (no padding)
    pub fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn texture(&self) -> Option<TextureHandle> {
        self.texture
    }

    pub fn set_texture(&mut self, texture: Option<TextureHandle>) {
        self.texture = texture;
    }
}
