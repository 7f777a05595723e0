// platform/windows - Win32 / DXGI / D3D11 backends
//
// One D3D11 device is created at startup on the adapter that drives the
// primary output and shared by duplication, crop and the output channel.

mod crop;
mod duplication;
mod gdi;
mod hook;
mod shared_channel;

pub use crop::D3D11Cropper;
pub use duplication::DxgiDuplication;
pub use gdi::GdiWindowSystem;
pub use hook::LowLevelMouseHook;
pub use shared_channel::SharedMemoryChannel;

use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use windows::core::Interface;
use windows::Win32::Foundation::HMODULE;
use windows::Win32::Graphics::Direct3D::{D3D_DRIVER_TYPE_HARDWARE, D3D_DRIVER_TYPE_UNKNOWN};
use windows::Win32::Graphics::Direct3D11::{
    D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext, D3D11_CREATE_DEVICE_BGRA_SUPPORT,
    D3D11_SDK_VERSION,
};
use windows::Win32::Graphics::Dxgi::{
    CreateDXGIFactory1, IDXGIAdapter, IDXGIAdapter1, IDXGIFactory1, IDXGIOutput,
};
use windows::Win32::UI::WindowsAndMessaging::{GetSystemMetrics, SM_CXVIRTUALSCREEN, SM_CYVIRTUALSCREEN};

use crate::capture::MonitorGeometry;
use crate::capture_deps::{CapturePlatform, GpuParts, PlatformParts};

/// Process-wide D3D11 device and immediate context
#[derive(Clone)]
pub struct GraphicsDevice {
    device: ID3D11Device,
    context: ID3D11DeviceContext,
}

impl GraphicsDevice {
    /// Create the device on the primary output's adapter, falling back to the
    /// default hardware adapter when no primary output is found.
    pub fn create() -> Result<Self> {
        let adapter = match find_primary_output() {
            Ok(primary) => Some(primary.adapter.cast::<IDXGIAdapter>()?),
            Err(e) => {
                warn!("Primary output lookup failed, using default adapter: {:#}", e);
                None
            }
        };

        let driver_type = if adapter.is_some() {
            D3D_DRIVER_TYPE_UNKNOWN
        } else {
            D3D_DRIVER_TYPE_HARDWARE
        };

        let mut device = None;
        let mut context = None;
        unsafe {
            D3D11CreateDevice(
                adapter.as_ref(),
                driver_type,
                HMODULE::default(),
                D3D11_CREATE_DEVICE_BGRA_SUPPORT,
                None,
                D3D11_SDK_VERSION,
                Some(&mut device),
                None,
                Some(&mut context),
            )
            .context("D3D11CreateDevice failed")?;
        }

        info!("D3D11 device created");
        Ok(Self {
            device: device.ok_or_else(|| anyhow!("Device creation returned null"))?,
            context: context.ok_or_else(|| anyhow!("Context creation returned null"))?,
        })
    }

    pub fn device(&self) -> &ID3D11Device {
        &self.device
    }

    pub fn context(&self) -> &ID3D11DeviceContext {
        &self.context
    }
}

pub(crate) struct PrimaryOutput {
    pub adapter: IDXGIAdapter1,
    pub output: IDXGIOutput,
    pub geometry: MonitorGeometry,
}

/// Walk adapters and their outputs for the desktop-attached output whose
/// desktop rectangle starts at the virtual-screen origin.
pub(crate) fn find_primary_output() -> Result<PrimaryOutput> {
    let factory: IDXGIFactory1 = unsafe { CreateDXGIFactory1() }.context("CreateDXGIFactory1 failed")?;

    for adapter_index in 0.. {
        let adapter = match unsafe { factory.EnumAdapters1(adapter_index) } {
            Ok(adapter) => adapter,
            Err(_) => break,
        };

        for output_index in 0.. {
            let output = match unsafe { adapter.EnumOutputs(output_index) } {
                Ok(output) => output,
                Err(_) => break,
            };
            let desc = unsafe { output.GetDesc() }.context("IDXGIOutput::GetDesc failed")?;
            let rect = desc.DesktopCoordinates;
            if desc.AttachedToDesktop.as_bool() && rect.left == 0 && rect.top == 0 {
                let geometry = MonitorGeometry::new(
                    rect.left,
                    rect.top,
                    (rect.right - rect.left) as u32,
                    (rect.bottom - rect.top) as u32,
                );
                return Ok(PrimaryOutput {
                    adapter,
                    output,
                    geometry,
                });
            }
        }
    }

    Err(anyhow!("No primary output attached to the desktop"))
}

/// Bounding box of every monitor, the largest frame a channel expects
pub(crate) fn virtual_screen_size() -> (u32, u32) {
    let (width, height) = unsafe {
        (
            GetSystemMetrics(SM_CXVIRTUALSCREEN),
            GetSystemMetrics(SM_CYVIRTUALSCREEN),
        )
    };
    (width.max(1) as u32, height.max(1) as u32)
}

/// Marker type wiring the Windows backends into the controller
pub struct WindowsPlatform;

impl CapturePlatform for WindowsPlatform {
    type Duplication = DxgiDuplication;
    type Crop = D3D11Cropper;
    type Channel = SharedMemoryChannel;
    type Hook = LowLevelMouseHook;
    type Windows = GdiWindowSystem;
}

impl WindowsPlatform {
    /// Create the shared device and every backend. A device failure is
    /// carried in `gpu` so the controller can report it.
    pub fn build_parts() -> PlatformParts<WindowsPlatform> {
        let device = GraphicsDevice::create();
        let channel = SharedMemoryChannel::new(device.as_ref().ok().cloned(), virtual_screen_size());
        let gpu = device.map(|device| GpuParts {
            duplication: DxgiDuplication::new(device.clone()),
            crop: D3D11Cropper::new(device),
        });

        PlatformParts {
            gpu,
            channel,
            hook: LowLevelMouseHook::new(),
            windows: GdiWindowSystem::new(),
        }
    }
}
