// platform/windows/crop.rs - GPU region crop into an offscreen render target

use std::ffi::c_void;

use anyhow::{anyhow, Context, Result};
use log::debug;
use windows::core::Interface;
use windows::Win32::Graphics::Direct3D11::{
    ID3D11RenderTargetView, ID3D11Texture2D, D3D11_BIND_RENDER_TARGET, D3D11_BIND_SHADER_RESOURCE,
    D3D11_BOX,
};

use super::duplication::texture_desc;
use super::GraphicsDevice;
use crate::capture::{CropBackend, TextureHandle};

pub struct D3D11Cropper {
    device: GraphicsDevice,
    target: Option<(ID3D11Texture2D, ID3D11RenderTargetView)>,
    size: (u32, u32),
}

impl D3D11Cropper {
    pub fn new(device: GraphicsDevice) -> Self {
        Self {
            device,
            target: None,
            size: (0, 0),
        }
    }

    fn ensure_target(&mut self, width: u32, height: u32) -> Result<()> {
        if self.target.is_some() && self.size == (width, height) {
            return Ok(());
        }
        self.target = None;

        let desc = windows::Win32::Graphics::Direct3D11::D3D11_TEXTURE2D_DESC {
            BindFlags: (D3D11_BIND_RENDER_TARGET.0 | D3D11_BIND_SHADER_RESOURCE.0) as u32,
            ..texture_desc(width, height)
        };

        let mut texture = None;
        unsafe {
            self.device
                .device()
                .CreateTexture2D(&desc, None, Some(&mut texture))
                .context("Failed to create crop render target")?;
        }
        let texture: ID3D11Texture2D = texture.ok_or_else(|| anyhow!("Crop render target is null"))?;

        let mut view = None;
        unsafe {
            self.device
                .device()
                .CreateRenderTargetView(&texture, None, Some(&mut view))
                .context("Failed to create crop render target view")?;
        }
        let view = view.ok_or_else(|| anyhow!("Crop render target view is null"))?;

        debug!("Crop render target created at {}x{}", width, height);
        self.target = Some((texture, view));
        self.size = (width, height);
        Ok(())
    }
}

impl CropBackend for D3D11Cropper {
    fn crop(
        &mut self,
        source: &TextureHandle,
        dest_width: u32,
        dest_height: u32,
        crop_left: i32,
        crop_top: i32,
    ) -> Result<TextureHandle> {
        if dest_width == 0 || dest_height == 0 {
            return Err(anyhow!("Empty crop rectangle"));
        }
        self.ensure_target(dest_width, dest_height)?;
        let Some((target, view)) = self.target.as_ref() else {
            return Err(anyhow!("Crop render target missing"));
        };

        let raw = source.raw as *mut c_void;
        // SAFETY: the handle was produced this tick by the duplication backend,
        // which still owns the texture.
        let source_texture = unsafe { ID3D11Texture2D::from_raw_borrowed(&raw) }
            .ok_or_else(|| anyhow!("Null source texture"))?;

        let context = self.device.context();
        unsafe {
            context.ClearRenderTargetView(view, &[0.0, 0.0, 0.0, 1.0]);
        }

        // Intersection of the crop rectangle with the source texture
        let left = crop_left.max(0) as i64;
        let top = crop_top.max(0) as i64;
        let right = (crop_left as i64 + dest_width as i64).min(source.width as i64);
        let bottom = (crop_top as i64 + dest_height as i64).min(source.height as i64);
        if left < right && top < bottom {
            let src_box = D3D11_BOX {
                left: left as u32,
                top: top as u32,
                front: 0,
                right: right as u32,
                bottom: bottom as u32,
                back: 1,
            };
            unsafe {
                context.CopySubresourceRegion(
                    target,
                    0,
                    (left - crop_left as i64) as u32,
                    (top - crop_top as i64) as u32,
                    0,
                    source_texture,
                    0,
                    Some(&src_box),
                );
            }
        }

        Ok(TextureHandle::new(target.as_raw() as usize, dest_width, dest_height))
    }

    fn release(&mut self) {
        if self.target.take().is_some() {
            debug!("Crop render target released");
        }
        self.size = (0, 0);
    }
}
