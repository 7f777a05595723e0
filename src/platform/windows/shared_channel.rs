// platform/windows/shared_channel.rs - Named shared-memory output channels
//
// Each channel is a pagefile-backed file mapping laid out as described in
// `crate::shared_frame`. Texture publishes copy into a D3D11 texture created
// with D3D11_RESOURCE_MISC_SHARED and record its handle in the header.
// Mappings are sized to the virtual screen so a resize keeps the name.

use std::collections::HashMap;
use std::ffi::c_void;

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use windows::core::{Interface, HSTRING};
use windows::Win32::Foundation::{CloseHandle, GetLastError, ERROR_ALREADY_EXISTS, HANDLE, INVALID_HANDLE_VALUE};
use windows::Win32::Graphics::Direct3D11::{
    ID3D11Texture2D, D3D11_BIND_RENDER_TARGET, D3D11_BIND_SHADER_RESOURCE, D3D11_RESOURCE_MISC_SHARED,
    D3D11_TEXTURE2D_DESC,
};
use windows::Win32::Graphics::Dxgi::IDXGIResource;
use windows::Win32::System::Memory::{
    CreateFileMappingW, MapViewOfFile, UnmapViewOfFile, FILE_MAP_ALL_ACCESS,
    MEMORY_MAPPED_VIEW_ADDRESS, PAGE_READWRITE,
};

use super::GraphicsDevice;
use crate::capture::TextureHandle;
use crate::config;
use crate::sender::OutputChannel;
use crate::shared_frame::{self, ResizePlan};

struct Mapping {
    handle: HANDLE,
    view: MEMORY_MAPPED_VIEW_ADDRESS,
    len: usize,
    name: String,
}

enum Opened {
    Created(Mapping),
    /// The name belongs to a live mapping someone else still holds
    InUse(HANDLE),
}

fn create_named(name: &str, len: usize) -> Result<HANDLE> {
    unsafe {
        CreateFileMappingW(
            INVALID_HANDLE_VALUE,
            None,
            PAGE_READWRITE,
            (len as u64 >> 32) as u32,
            len as u32,
            &HSTRING::from(name),
        )
    }
    .with_context(|| format!("CreateFileMappingW failed for {}", name))
}

fn close(handle: HANDLE) {
    unsafe {
        let _ = CloseHandle(handle);
    }
}

impl Mapping {
    /// Create `name` with `len` bytes unless a live mapping already owns it
    fn open(name: String, len: usize) -> Result<Opened> {
        let handle = create_named(&name, len)?;
        if unsafe { GetLastError() } == ERROR_ALREADY_EXISTS {
            return Ok(Opened::InUse(handle));
        }

        let view = unsafe { MapViewOfFile(handle, FILE_MAP_ALL_ACCESS, 0, 0, len) };
        if view.Value.is_null() {
            close(handle);
            return Err(anyhow!("MapViewOfFile failed for {}", name));
        }
        Ok(Opened::Created(Self {
            handle,
            view,
            len,
            name,
        }))
    }

    /// First free name from `first_suffix` on, initialised for `width x height`
    fn create(
        channel: &str,
        capacity: usize,
        (width, height): (u32, u32),
        first_suffix: u32,
        frame_counter: u64,
    ) -> Result<(Self, u32)> {
        for suffix in first_suffix..=config::channel::MAX_NAME_SUFFIX {
            let name = shared_frame::mapping_name(channel, suffix);
            match Self::open(name, capacity)? {
                Opened::Created(mut mapping) => {
                    shared_frame::init_mapping(mapping.bytes_mut(), width, height, frame_counter)?;
                    return Ok((mapping, suffix));
                }
                Opened::InUse(handle) => {
                    debug!(
                        "Mapping {} is in use, trying next name",
                        shared_frame::mapping_name(channel, suffix)
                    );
                    close(handle);
                }
            }
        }
        Err(anyhow!("No free mapping name for channel '{}'", channel))
    }

    fn bytes(&self) -> &[u8] {
        // SAFETY: the view is `len` bytes and lives as long as `self`
        unsafe { std::slice::from_raw_parts(self.view.Value as *const u8, self.len) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: the view is `len` bytes and lives as long as `self`
        unsafe { std::slice::from_raw_parts_mut(self.view.Value as *mut u8, self.len) }
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        unsafe {
            let _ = UnmapViewOfFile(self.view);
        }
        close(self.handle);
    }
}

/// Write a relocation pointer into a mapping a reader still holds, then let go of it
fn abandon(handle: HANDLE, next_suffix: u32) -> Result<()> {
    let view = unsafe { MapViewOfFile(handle, FILE_MAP_ALL_ACCESS, 0, 0, shared_frame::HEADER_SIZE) };
    if view.Value.is_null() {
        close(handle);
        return Err(anyhow!("MapViewOfFile failed for abandoned mapping"));
    }
    // SAFETY: the view covers the header
    let header =
        unsafe { std::slice::from_raw_parts_mut(view.Value as *mut u8, shared_frame::HEADER_SIZE) };
    let marked = shared_frame::mark_relocated(header, next_suffix);
    unsafe {
        let _ = UnmapViewOfFile(view);
    }
    close(handle);
    marked.map_err(Into::into)
}

struct SharedTexture {
    texture: ID3D11Texture2D,
    shared_handle: u64,
    size: (u32, u32),
}

struct Channel {
    mapping: Mapping,
    suffix: u32,
    texture: Option<SharedTexture>,
    size: (u32, u32),
}

pub struct SharedMemoryChannel {
    device: Option<GraphicsDevice>,
    /// Largest frame a mapping is sized for up front
    ceiling: (u32, u32),
    channels: HashMap<String, Channel>,
}

impl SharedMemoryChannel {
    pub fn new(device: Option<GraphicsDevice>, ceiling: (u32, u32)) -> Self {
        Self {
            device,
            ceiling,
            channels: HashMap::new(),
        }
    }

    fn channel_mut(&mut self, name: &str) -> Result<&mut Channel> {
        self.channels
            .get_mut(name)
            .ok_or_else(|| anyhow!("Output channel '{}' was not created", name))
    }
}

fn create_shared_texture(device: &GraphicsDevice, width: u32, height: u32) -> Result<SharedTexture> {
    let desc = D3D11_TEXTURE2D_DESC {
        Width: width,
        Height: height,
        MipLevels: 1,
        ArraySize: 1,
        Format: windows::Win32::Graphics::Dxgi::Common::DXGI_FORMAT_B8G8R8A8_UNORM,
        SampleDesc: windows::Win32::Graphics::Dxgi::Common::DXGI_SAMPLE_DESC {
            Count: 1,
            Quality: 0,
        },
        Usage: windows::Win32::Graphics::Direct3D11::D3D11_USAGE_DEFAULT,
        BindFlags: (D3D11_BIND_SHADER_RESOURCE.0 | D3D11_BIND_RENDER_TARGET.0) as u32,
        CPUAccessFlags: 0,
        MiscFlags: D3D11_RESOURCE_MISC_SHARED.0 as u32,
    };

    let mut texture = None;
    unsafe {
        device
            .device()
            .CreateTexture2D(&desc, None, Some(&mut texture))
            .context("Failed to create shared texture")?;
    }
    let texture: ID3D11Texture2D = texture.ok_or_else(|| anyhow!("Shared texture is null"))?;
    let resource: IDXGIResource = texture.cast().context("Shared texture is not a DXGI resource")?;
    let handle = unsafe { resource.GetSharedHandle() }.context("GetSharedHandle failed")?;

    Ok(SharedTexture {
        texture,
        shared_handle: handle.0 as u64,
        size: (width, height),
    })
}

impl OutputChannel for SharedMemoryChannel {
    fn create(&mut self, name: &str, width: u32, height: u32) -> Result<()> {
        self.release(name);
        let capacity = shared_frame::channel_capacity(width, height, self.ceiling);
        let (mapping, suffix) = Mapping::create(name, capacity, (width, height), 0, 0)?;
        if suffix != 0 {
            warn!("Channel '{}' is taken, publishing as {}", name, mapping.name);
        }
        info!("Shared mapping {} ready ({} bytes)", mapping.name, mapping.len);
        self.channels.insert(
            name.to_string(),
            Channel {
                mapping,
                suffix,
                texture: None,
                size: (width, height),
            },
        );
        Ok(())
    }

    fn resize(&mut self, name: &str, width: u32, height: u32) -> Result<()> {
        let ceiling = self.ceiling;
        let channel = self.channel_mut(name)?;
        channel.texture = None;
        channel.size = (width, height);

        let capacity = match shared_frame::plan_resize(channel.mapping.len, width, height, ceiling) {
            ResizePlan::InPlace => {
                shared_frame::resize_in_place(channel.mapping.bytes_mut(), width, height)?;
                return Ok(());
            }
            ResizePlan::Grow { capacity } => capacity,
        };

        // Close ours first: with no reader left the same name can be recreated larger
        let Some(old) = self.channels.remove(name) else {
            return Err(anyhow!("Output channel '{}' was not created", name));
        };
        let suffix = old.suffix;
        let counter = shared_frame::frame_counter(old.mapping.bytes());
        let old_name = old.mapping.name.clone();
        drop(old);

        let (mapping, suffix) = match Mapping::open(old_name.clone(), capacity)? {
            Opened::Created(mut mapping) => {
                shared_frame::init_mapping(mapping.bytes_mut(), width, height, counter)?;
                (mapping, suffix)
            }
            Opened::InUse(stale) => {
                let grown = Mapping::create(name, capacity, (width, height), suffix + 1, counter);
                let (mapping, next) = match grown {
                    Ok(created) => created,
                    Err(e) => {
                        close(stale);
                        return Err(e);
                    }
                };
                if let Err(e) = abandon(stale, next) {
                    warn!("Could not mark {} as relocated: {:#}", old_name, e);
                }
                warn!(
                    "A reader still holds {}; channel '{}' continues as {}",
                    old_name, name, mapping.name
                );
                (mapping, next)
            }
        };

        debug!("Mapping {} grown to {} bytes", mapping.name, mapping.len);
        self.channels.insert(
            name.to_string(),
            Channel {
                mapping,
                suffix,
                texture: None,
                size: (width, height),
            },
        );
        Ok(())
    }

    fn publish_texture(&mut self, name: &str, texture: &TextureHandle, flip_vertical: bool) -> Result<()> {
        let device = self
            .device
            .clone()
            .ok_or_else(|| anyhow!("No graphics device for texture publish"))?;
        let channel = self.channel_mut(name)?;
        let size = (texture.width, texture.height);
        if size != channel.size {
            return Err(anyhow!(
                "Texture is {}x{}, channel '{}' is {}x{}",
                size.0,
                size.1,
                name,
                channel.size.0,
                channel.size.1
            ));
        }

        if channel.texture.as_ref().map(|t| t.size) != Some(size) {
            channel.texture = Some(create_shared_texture(&device, size.0, size.1)?);
        }
        let Some(shared) = channel.texture.as_ref() else {
            return Err(anyhow!("Shared texture missing"));
        };

        let raw = texture.raw as *mut c_void;
        // SAFETY: the source texture belongs to a capture backend and is alive
        // for the tick that produced this handle.
        let source = unsafe { ID3D11Texture2D::from_raw_borrowed(&raw) }
            .ok_or_else(|| anyhow!("Null texture handle"))?;
        unsafe {
            device.context().CopyResource(&shared.texture, source);
            device.context().Flush();
        }

        let handle = shared.shared_handle;
        shared_frame::write_texture(channel.mapping.bytes_mut(), handle, size.0, size.1, flip_vertical)?;
        Ok(())
    }

    fn publish_buffer(&mut self, name: &str, pixels: &[u8], width: u32, height: u32) -> Result<()> {
        let channel = self.channel_mut(name)?;
        shared_frame::write_buffer(channel.mapping.bytes_mut(), pixels, width, height)?;
        Ok(())
    }

    fn release(&mut self, name: &str) {
        if let Some(channel) = self.channels.remove(name) {
            debug!("Shared mapping {} closed", channel.mapping.name);
        }
    }
}
