//! Frame publishing to the shared-frame output channel

use std::sync::atomic::{AtomicU32, Ordering};

use log::{debug, info, warn};
use thiserror::Error;

use crate::capture::frame_buffer::BYTES_PER_PIXEL;
use crate::capture::{FrameBuffer, TextureHandle};

/// Shared-frame transport. One channel per active mode name.
pub trait OutputChannel {
    fn create(&mut self, name: &str, width: u32, height: u32) -> anyhow::Result<()>;

    fn resize(&mut self, name: &str, width: u32, height: u32) -> anyhow::Result<()>;

    fn publish_texture(
        &mut self,
        name: &str,
        texture: &TextureHandle,
        flip_vertical: bool,
    ) -> anyhow::Result<()>;

    fn publish_buffer(&mut self, name: &str, pixels: &[u8], width: u32, height: u32) -> anyhow::Result<()>;

    fn release(&mut self, name: &str);
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("no output channel is active")]
    NoActiveChannel,
    #[error("pixel buffer is {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },
    #[error("frame has neither a texture nor a pixel buffer")]
    EmptyFrame,
    #[error("output channel error: {0:#}")]
    Channel(#[from] anyhow::Error),
}

/// What a tick produced: a texture, a pixel buffer, or both
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameRef<'a> {
    pub texture: Option<TextureHandle>,
    pub pixels: Option<&'a FrameBuffer>,
}

impl<'a> FrameRef<'a> {
    pub fn from_buffer(buffer: &'a FrameBuffer) -> Self {
        Self {
            texture: buffer.texture(),
            pixels: Some(buffer),
        }
    }

    pub fn texture(texture: TextureHandle) -> Self {
        Self {
            texture: Some(texture),
            pixels: None,
        }
    }

    pub fn pixels(buffer: &'a FrameBuffer) -> Self {
        Self {
            texture: None,
            pixels: Some(buffer),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    Texture,
    Buffer,
}

impl Representation {
    /// A minimized host has no GPU presentation, so prefer the buffer there
    pub fn choose(host_minimized: bool, has_buffer: bool, has_texture: bool) -> Option<Self> {
        if host_minimized && has_buffer {
            Some(Representation::Buffer)
        } else if has_texture {
            Some(Representation::Texture)
        } else if has_buffer {
            Some(Representation::Buffer)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ActiveChannel {
    name: String,
    width: u32,
    height: u32,
}

pub struct FrameSender<C: OutputChannel> {
    channel: C,
    active: Option<ActiveChannel>,
    flip_vertical: bool,
    published: u64,
}

impl<C: OutputChannel> FrameSender<C> {
    pub fn new(channel: C, flip_vertical: bool) -> Self {
        Self {
            channel,
            active: None,
            flip_vertical,
            published: 0,
        }
    }

    /// Declare `name` at `width x height`, releasing whatever was active
    pub fn activate(&mut self, name: &str, width: u32, height: u32) -> Result<(), SendError> {
        self.deactivate();
        self.channel.create(name, width, height)?;
        info!("Output channel '{}' created at {}x{}", name, width, height);
        self.active = Some(ActiveChannel {
            name: name.to_string(),
            width,
            height,
        });
        Ok(())
    }

    pub fn deactivate(&mut self) {
        if let Some(active) = self.active.take() {
            self.channel.release(&active.name);
            info!("Output channel '{}' released", active.name);
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), SendError> {
        let active = self.active.as_mut().ok_or(SendError::NoActiveChannel)?;
        if (active.width, active.height) == (width, height) {
            return Ok(());
        }
        self.channel.resize(&active.name, width, height)?;
        debug!(
            "Output channel '{}' resized {}x{} -> {}x{}",
            active.name, active.width, active.height, width, height
        );
        active.width = width;
        active.height = height;
        Ok(())
    }

    /// Publish one frame in the representation the host state calls for.
    /// A frame whose size differs from the declared channel size resizes the
    /// channel first.
    pub fn publish(&mut self, frame: FrameRef<'_>, host_minimized: bool) -> Result<Representation, SendError> {
        if self.active.is_none() {
            return Err(SendError::NoActiveChannel);
        }
        let representation =
            Representation::choose(host_minimized, frame.pixels.is_some(), frame.texture.is_some())
                .ok_or(SendError::EmptyFrame)?;

        match representation {
            Representation::Texture => {
                let texture = frame.texture.ok_or(SendError::EmptyFrame)?;
                self.resize(texture.width, texture.height)?;
                let name = &self.active.as_ref().ok_or(SendError::NoActiveChannel)?.name;
                self.channel.publish_texture(name, &texture, self.flip_vertical)?;
            }
            Representation::Buffer => {
                let buffer = frame.pixels.ok_or(SendError::EmptyFrame)?;
                let (width, height) = buffer.size();
                let expected = width as usize * height as usize * BYTES_PER_PIXEL;
                if buffer.pixels().len() != expected || expected == 0 {
                    return Err(SendError::BufferSize {
                        expected,
                        actual: buffer.pixels().len(),
                    });
                }
                self.resize(width, height)?;
                let name = &self.active.as_ref().ok_or(SendError::NoActiveChannel)?.name;
                self.channel.publish_buffer(name, buffer.pixels(), width, height)?;
            }
        }

        self.published += 1;
        Ok(representation)
    }

    /// [`publish`](Self::publish) for the tick loop: failures are logged
    pub fn publish_logged(&mut self, frame: FrameRef<'_>, host_minimized: bool) -> Option<Representation> {
        match self.publish(frame, host_minimized) {
            Ok(representation) => Some(representation),
            Err(e) => {
                static FAILURES: AtomicU32 = AtomicU32::new(0);
                let count = FAILURES.fetch_add(1, Ordering::Relaxed);
                if count % 60 == 0 {
                    warn!("Frame publish failed (#{}): {}", count, e);
                }
                None
            }
        }
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.name.as_str())
    }

    pub fn active_size(&self) -> Option<(u32, u32)> {
        self.active.as_ref().map(|a| (a.width, a.height))
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn flip_vertical(&self) -> bool {
        self.flip_vertical
    }

    pub fn published_frames(&self) -> u64 {
        self.published
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }
}
