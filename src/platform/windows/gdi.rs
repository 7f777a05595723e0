// platform/windows/gdi.rs - Window queries and GDI window blits
//
// Every GDI object created for a blit is owned by a guard, so each exit path
// releases it.

use std::ffi::c_void;

use anyhow::{anyhow, Context, Result};
use windows::core::{HSTRING, PCWSTR};
use windows::Win32::Foundation::{HWND, POINT, RECT};
use windows::Win32::Graphics::Gdi::{
    BitBlt, CreateCompatibleDC, CreateDIBSection, DeleteDC, DeleteObject, GetDC, ReleaseDC,
    SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, CAPTUREBLT, DIB_RGB_COLORS, HBITMAP, HDC,
    HGDIOBJ, ROP_CODE, SRCCOPY,
};
use windows::Win32::UI::WindowsAndMessaging::{
    FindWindowW, GetAncestor, GetClassNameW, GetClientRect, IsWindow, WindowFromPoint, GA_ROOT,
};

use crate::capture::frame_buffer::BYTES_PER_PIXEL;
use crate::capture::{WindowHandle, WindowSystem};

pub(crate) fn to_hwnd(handle: WindowHandle) -> HWND {
    HWND(handle.raw() as *mut c_void)
}

pub(crate) fn from_hwnd(hwnd: HWND) -> Option<WindowHandle> {
    WindowHandle::from_raw(hwnd.0 as isize)
}

struct WindowDc {
    hwnd: HWND,
    hdc: HDC,
}

impl Drop for WindowDc {
    fn drop(&mut self) {
        unsafe {
            let _ = ReleaseDC(Some(self.hwnd), self.hdc);
        }
    }
}

struct MemoryDc(HDC);

impl Drop for MemoryDc {
    fn drop(&mut self) {
        unsafe {
            let _ = DeleteDC(self.0);
        }
    }
}

/// DIB selected into a memory DC; restores the previous object on drop
struct SelectedBitmap {
    dc: HDC,
    bitmap: HBITMAP,
    previous: HGDIOBJ,
}

impl Drop for SelectedBitmap {
    fn drop(&mut self) {
        unsafe {
            SelectObject(self.dc, self.previous);
            let _ = DeleteObject(self.bitmap.into());
        }
    }
}

#[derive(Debug, Default)]
pub struct GdiWindowSystem;

impl GdiWindowSystem {
    pub fn new() -> Self {
        Self
    }
}

impl WindowSystem for GdiWindowSystem {
    fn is_window(&self, handle: WindowHandle) -> bool {
        unsafe { IsWindow(Some(to_hwnd(handle))).as_bool() }
    }

    fn class_name(&self, handle: WindowHandle) -> Option<String> {
        let mut buffer = [0u16; 256];
        let len = unsafe { GetClassNameW(to_hwnd(handle), &mut buffer) };
        (len > 0).then(|| String::from_utf16_lossy(&buffer[..len as usize]))
    }

    fn client_size(&self, handle: WindowHandle) -> Option<(u32, u32)> {
        let mut rect = RECT::default();
        unsafe { GetClientRect(to_hwnd(handle), &mut rect) }.ok()?;
        Some((
            (rect.right - rect.left).max(0) as u32,
            (rect.bottom - rect.top).max(0) as u32,
        ))
    }

    fn top_level_at(&self, x: i32, y: i32) -> Option<WindowHandle> {
        let hit = unsafe { WindowFromPoint(POINT { x, y }) };
        if hit.is_invalid() {
            return None;
        }
        let root = unsafe { GetAncestor(hit, GA_ROOT) };
        from_hwnd(if root.is_invalid() { hit } else { root })
    }

    fn find_by_title(&self, title: &str) -> Option<WindowHandle> {
        let hwnd = unsafe { FindWindowW(PCWSTR::null(), &HSTRING::from(title)) }.ok()?;
        from_hwnd(hwnd)
    }

    fn blit(&self, handle: WindowHandle, width: u32, height: u32, dest: &mut [u8]) -> Result<()> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if dest.len() != expected {
            return Err(anyhow!("Destination is {} bytes, expected {}", dest.len(), expected));
        }

        let hwnd = to_hwnd(handle);
        unsafe {
            let hdc = GetDC(Some(hwnd));
            if hdc.is_invalid() {
                return Err(anyhow!("GetDC failed"));
            }
            let window_dc = WindowDc { hwnd, hdc };

            let mem = CreateCompatibleDC(Some(window_dc.hdc));
            if mem.is_invalid() {
                return Err(anyhow!("CreateCompatibleDC failed"));
            }
            let mem_dc = MemoryDc(mem);

            let bmi = BITMAPINFO {
                bmiHeader: BITMAPINFOHEADER {
                    biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: width as i32,
                    biHeight: -(height as i32), // top-down
                    biPlanes: 1,
                    biBitCount: 32,
                    biCompression: BI_RGB.0,
                    ..Default::default()
                },
                ..Default::default()
            };

            let mut bits: *mut c_void = std::ptr::null_mut();
            let bitmap = CreateDIBSection(Some(mem_dc.0), &bmi, DIB_RGB_COLORS, &mut bits, None, 0)
                .context("CreateDIBSection failed")?;
            let selected = SelectedBitmap {
                dc: mem_dc.0,
                bitmap,
                previous: SelectObject(mem_dc.0, bitmap.into()),
            };

            BitBlt(
                mem_dc.0,
                0,
                0,
                width as i32,
                height as i32,
                Some(window_dc.hdc),
                0,
                0,
                ROP_CODE(SRCCOPY.0 | CAPTUREBLT.0),
            )
            .context("BitBlt failed")?;

            if bits.is_null() {
                return Err(anyhow!("DIB section has no bits"));
            }
            std::ptr::copy_nonoverlapping(bits as *const u8, dest.as_mut_ptr(), expected);
            drop(selected);
        }

        // GDI leaves alpha undefined
        for pixel in dest.chunks_exact_mut(BYTES_PER_PIXEL) {
            pixel[3] = 0xFF;
        }
        Ok(())
    }
}
