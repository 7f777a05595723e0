// platform/windows/duplication.rs - DXGI Desktop Duplication backend
//
// Frames are copied into a default-usage texture owned here (the "shared"
// texture the sender and cropper read) and then into a staging texture for
// the CPU readback. The acquired frame is released before returning.
// Rotated outputs deliver frames in scan-out orientation: those are turned
// upright during readback and uploaded into the shared texture.

use anyhow::{anyhow, Context, Result};
use windows::core::Interface;
use windows::Win32::Graphics::Direct3D11::{
    ID3D11Texture2D, D3D11_BIND_SHADER_RESOURCE, D3D11_CPU_ACCESS_READ, D3D11_MAPPED_SUBRESOURCE,
    D3D11_MAP_READ, D3D11_TEXTURE2D_DESC, D3D11_USAGE_DEFAULT, D3D11_USAGE_STAGING,
};
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_MODE_ROTATION, DXGI_MODE_ROTATION_ROTATE180,
    DXGI_MODE_ROTATION_ROTATE270, DXGI_MODE_ROTATION_ROTATE90, DXGI_SAMPLE_DESC,
};
use windows::Win32::Graphics::Dxgi::{
    IDXGIOutput1, IDXGIOutputDuplication, IDXGIResource, DXGI_ERROR_ACCESS_LOST,
    DXGI_ERROR_WAIT_TIMEOUT, DXGI_OUTDUPL_FRAME_INFO,
};

use log::info;
use std::ffi::c_void;

use super::{find_primary_output, GraphicsDevice};
use crate::capture::frame_buffer::BYTES_PER_PIXEL;
use crate::capture::rotation::{self, OutputRotation};
use crate::capture::{DuplicationBackend, FrameBuffer, FrameStatus, MonitorGeometry, TextureHandle};

pub struct DxgiDuplication {
    device: GraphicsDevice,
    shared: Option<ID3D11Texture2D>,
    staging: Option<ID3D11Texture2D>,
    /// Desktop orientation; the shared texture and readback use this size
    size: (u32, u32),
    /// Scan-out orientation; acquired frames and the staging texture use this size
    surface: (u32, u32),
    rotation: OutputRotation,
}

pub(super) fn texture_desc(width: u32, height: u32) -> D3D11_TEXTURE2D_DESC {
    D3D11_TEXTURE2D_DESC {
        Width: width,
        Height: height,
        MipLevels: 1,
        ArraySize: 1,
        Format: DXGI_FORMAT_B8G8R8A8_UNORM,
        SampleDesc: DXGI_SAMPLE_DESC {
            Count: 1,
            Quality: 0,
        },
        Usage: D3D11_USAGE_DEFAULT,
        BindFlags: D3D11_BIND_SHADER_RESOURCE.0 as u32,
        CPUAccessFlags: 0,
        MiscFlags: 0,
    }
}

fn output_rotation(rotation: DXGI_MODE_ROTATION) -> OutputRotation {
    match rotation {
        DXGI_MODE_ROTATION_ROTATE90 => OutputRotation::Rotate90,
        DXGI_MODE_ROTATION_ROTATE180 => OutputRotation::Rotate180,
        DXGI_MODE_ROTATION_ROTATE270 => OutputRotation::Rotate270,
        _ => OutputRotation::Identity,
    }
}

impl DxgiDuplication {
    pub fn new(device: GraphicsDevice) -> Self {
        Self {
            device,
            shared: None,
            staging: None,
            size: (0, 0),
            surface: (0, 0),
            rotation: OutputRotation::Identity,
        }
    }

    fn ensure_textures(&mut self, desktop: (u32, u32), rotation: OutputRotation) -> Result<()> {
        let surface = rotation.surface_size(desktop);
        if self.size == desktop
            && self.surface == surface
            && self.shared.is_some()
            && self.staging.is_some()
        {
            self.rotation = rotation;
            return Ok(());
        }
        self.shared = None;
        self.staging = None;

        let shared_desc = texture_desc(desktop.0, desktop.1);
        let staging_desc = D3D11_TEXTURE2D_DESC {
            Usage: D3D11_USAGE_STAGING,
            BindFlags: 0,
            CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
            ..texture_desc(surface.0, surface.1)
        };

        let mut shared = None;
        let mut staging = None;
        unsafe {
            self.device
                .device()
                .CreateTexture2D(&shared_desc, None, Some(&mut shared))
                .context("Failed to create duplication texture")?;
            self.device
                .device()
                .CreateTexture2D(&staging_desc, None, Some(&mut staging))
                .context("Failed to create duplication staging texture")?;
        }

        self.shared = Some(shared.ok_or_else(|| anyhow!("Duplication texture is null"))?);
        self.staging = Some(staging.ok_or_else(|| anyhow!("Staging texture is null"))?);
        self.size = desktop;
        self.surface = surface;
        self.rotation = rotation;
        Ok(())
    }

    fn copy_frame(&self, resource: Option<IDXGIResource>, readback: &mut FrameBuffer) -> Result<()> {
        let (Some(shared), Some(staging)) = (self.shared.as_ref(), self.staging.as_ref()) else {
            return Err(anyhow!("Duplication textures not created"));
        };
        let texture: ID3D11Texture2D = resource
            .ok_or_else(|| anyhow!("AcquireNextFrame returned no resource"))?
            .cast()
            .context("Desktop resource is not a texture")?;

        let mut desc = D3D11_TEXTURE2D_DESC::default();
        unsafe { texture.GetDesc(&mut desc) };
        if (desc.Width, desc.Height) != self.surface {
            return Err(anyhow!(
                "Desktop frame is {}x{}, duplication was created for {}x{}",
                desc.Width,
                desc.Height,
                self.surface.0,
                self.surface.1
            ));
        }
        if readback.size() != self.size {
            return Err(anyhow!("Readback buffer not sized for the output"));
        }

        let context = self.device.context();
        let upright = self.rotation == OutputRotation::Identity;
        unsafe {
            if upright {
                context.CopyResource(shared, &texture);
                context.CopyResource(staging, shared);
            } else {
                context.CopyResource(staging, &texture);
            }
        }

        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        unsafe {
            context
                .Map(staging, 0, D3D11_MAP_READ, 0, Some(&mut mapped))
                .context("Failed to map staging texture")?;
        }

        let pitch = mapped.RowPitch as usize;
        let rows = self.surface.1.max(1) as usize;
        let mapped_len = pitch * (rows - 1) + self.surface.0 as usize * BYTES_PER_PIXEL;
        let copied = unsafe {
            let src = std::slice::from_raw_parts(mapped.pData as *const u8, mapped_len);
            let copied = rotation::copy_to_desktop(src, pitch, self.surface, self.rotation, readback);
            context.Unmap(staging, 0);
            copied
        };
        if !copied {
            return Err(anyhow!("Mapped staging texture does not match the output"));
        }

        if !upright {
            // Downstream consumers read the shared texture in desktop orientation
            unsafe {
                context.UpdateSubresource(
                    shared,
                    0,
                    None,
                    readback.pixels().as_ptr() as *const c_void,
                    readback.stride() as u32,
                    0,
                );
            }
        }
        Ok(())
    }
}

impl DuplicationBackend for DxgiDuplication {
    type Interface = IDXGIOutputDuplication;

    fn create_interface(&mut self) -> Result<(IDXGIOutputDuplication, MonitorGeometry)> {
        let primary = find_primary_output()?;
        let output1: IDXGIOutput1 = primary
            .output
            .cast()
            .context("Failed to query IDXGIOutput1")?;
        let duplication = unsafe { output1.DuplicateOutput(self.device.device()) }
            .context("DuplicateOutput failed")?;

        let geometry = primary.geometry;
        let rotation = output_rotation(unsafe { duplication.GetDesc() }.Rotation);
        if rotation != OutputRotation::Identity {
            info!("Primary output is rotated ({:?}), frames are turned upright on readback", rotation);
        }
        self.ensure_textures((geometry.width, geometry.height), rotation)?;
        Ok((duplication, geometry))
    }

    fn acquire_next_frame(
        &mut self,
        interface: &mut IDXGIOutputDuplication,
        timeout_ms: u32,
        readback: &mut FrameBuffer,
    ) -> FrameStatus {
        let mut info = DXGI_OUTDUPL_FRAME_INFO::default();
        let mut resource: Option<IDXGIResource> = None;
        if let Err(e) = unsafe { interface.AcquireNextFrame(timeout_ms, &mut info, &mut resource) } {
            if e.code() == DXGI_ERROR_WAIT_TIMEOUT {
                return FrameStatus::Timeout;
            }
            if e.code() == DXGI_ERROR_ACCESS_LOST {
                return FrameStatus::AccessLost;
            }
            return FrameStatus::Failed(anyhow::Error::from(e).context("AcquireNextFrame failed"));
        }

        let copied = self.copy_frame(resource, readback);
        let released = unsafe { interface.ReleaseFrame() };

        match (copied, released) {
            (_, Err(e)) if e.code() == DXGI_ERROR_ACCESS_LOST => FrameStatus::AccessLost,
            (Ok(()), _) => FrameStatus::Frame,
            (Err(e), _) => FrameStatus::Failed(e),
        }
    }

    fn shared_texture(&self) -> Option<TextureHandle> {
        self.shared
            .as_ref()
            .map(|texture| TextureHandle::new(texture.as_raw() as usize, self.size.0, self.size.1))
    }
}
