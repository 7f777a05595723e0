//! Host application window
//!
//! Key presses stand in for the mode menu: D, R and W switch mode, P drops
//! the window target so it can be picked again, Esc quits. The window
//! procedure only queues events; the frame loop drains them.

use spoutcap_capture::CaptureMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    SwitchMode(CaptureMode),
    RepickTarget,
    Quit,
}

pub const VK_ESCAPE_CODE: u16 = 0x1B;

pub fn event_for_key(virtual_key: u16) -> Option<HostEvent> {
    match virtual_key {
        0x44 => Some(HostEvent::SwitchMode(CaptureMode::Desktop)), // D
        0x52 => Some(HostEvent::SwitchMode(CaptureMode::Region)),  // R
        0x57 => Some(HostEvent::SwitchMode(CaptureMode::Window)),  // W
        0x50 => Some(HostEvent::RepickTarget),                     // P
        VK_ESCAPE_CODE => Some(HostEvent::Quit),
        _ => None,
    }
}

#[cfg(windows)]
pub use win32::Win32HostWindow;

#[cfg(windows)]
mod win32 {
    use std::collections::VecDeque;
    use std::ffi::c_void;
    use std::mem;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;

    use anyhow::{anyhow, Context, Result};
    use lazy_static::lazy_static;
    use log::{debug, warn};
    use windows::core::{w, HSTRING, PCWSTR};
    use windows::Win32::Foundation::{COLORREF, HWND, LPARAM, LRESULT, POINT, RECT, WPARAM};
    use windows::Win32::Graphics::Gdi::{
        ClientToScreen, CreateSolidBrush, DeleteObject, FillRect, InvalidateRect, HDC,
    };
    use windows::Win32::System::LibraryLoader::GetModuleHandleW;
    use windows::Win32::UI::WindowsAndMessaging::{
        AdjustWindowRectEx, CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW,
        GetClientRect, GetWindowLongPtrW, IsIconic, LoadCursorW, MessageBoxW, PeekMessageW,
        PostQuitMessage, RegisterClassExW, SetLayeredWindowAttributes, SetWindowLongPtrW,
        SetWindowPos, SetWindowTextW, ShowWindow, TranslateMessage, CW_USEDEFAULT, GWL_EXSTYLE,
        HWND_NOTOPMOST, HWND_TOPMOST, IDC_ARROW, LWA_COLORKEY, MB_ICONERROR, MB_OK, MSG,
        PM_REMOVE, SWP_FRAMECHANGED, SWP_NOACTIVATE, SWP_NOMOVE, SWP_NOSIZE, SW_MINIMIZE,
        WINDOW_EX_STYLE, WM_CLOSE, WM_DESTROY, WM_ERASEBKGND, WM_KEYDOWN, WM_QUIT, WNDCLASSEXW,
        WS_EX_LAYERED, WS_OVERLAPPEDWINDOW, WS_VISIBLE,
    };

    use super::{event_for_key, HostEvent};
    use spoutcap_capture::config;
    use spoutcap_capture::host::{HostGeometry, HostWindow, Presentation, StatusLine};
    use spoutcap_capture::WindowHandle;

    lazy_static! {
        static ref HOST_EVENTS: Mutex<VecDeque<HostEvent>> = Mutex::new(VecDeque::new());
    }

    // Client fill color; the region color key while presentation is transparent
    static BACKGROUND_COLOR: AtomicU32 = AtomicU32::new(config::window::NORMAL_BG_COLOR);

    fn push_event(event: HostEvent) {
        if let Ok(mut queue) = HOST_EVENTS.lock() {
            queue.push_back(event);
        }
    }

    unsafe extern "system" fn window_proc(
        hwnd: HWND,
        msg: u32,
        wparam: WPARAM,
        lparam: LPARAM,
    ) -> LRESULT {
        match msg {
            WM_KEYDOWN => {
                if let Some(event) = event_for_key(wparam.0 as u16) {
                    push_event(event);
                }
                LRESULT(0)
            }
            WM_ERASEBKGND => {
                let hdc = HDC(wparam.0 as *mut c_void);
                let mut rect = RECT::default();
                unsafe {
                    if GetClientRect(hwnd, &mut rect).is_ok() {
                        let brush = CreateSolidBrush(COLORREF(BACKGROUND_COLOR.load(Ordering::Relaxed)));
                        FillRect(hdc, &rect, brush);
                        let _ = DeleteObject(brush.into());
                    }
                }
                LRESULT(1)
            }
            WM_CLOSE => {
                push_event(HostEvent::Quit);
                LRESULT(0)
            }
            WM_DESTROY => {
                unsafe { PostQuitMessage(0) };
                LRESULT(0)
            }
            _ => unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) },
        }
    }

    pub struct Win32HostWindow {
        hwnd: HWND,
        last_title: String,
        presentation: Option<Presentation>,
    }

    impl Win32HostWindow {
        pub fn create() -> Result<Self> {
            static CLASS_REGISTERED: AtomicBool = AtomicBool::new(false);

            let hinstance = unsafe { GetModuleHandleW(None) }.context("Failed to get module handle")?;
            let class_name = HSTRING::from(config::window::HOST_CLASS_NAME);

            if !CLASS_REGISTERED.swap(true, Ordering::SeqCst) {
                let wc = WNDCLASSEXW {
                    cbSize: mem::size_of::<WNDCLASSEXW>() as u32,
                    lpfnWndProc: Some(window_proc),
                    hInstance: hinstance.into(),
                    hCursor: unsafe { LoadCursorW(None, IDC_ARROW) }.unwrap_or_default(),
                    lpszClassName: PCWSTR(class_name.as_ptr()),
                    ..Default::default()
                };
                if unsafe { RegisterClassExW(&wc) } == 0 {
                    CLASS_REGISTERED.store(false, Ordering::SeqCst);
                    return Err(anyhow!("Failed to register host window class"));
                }
            }

            let style = WS_OVERLAPPEDWINDOW | WS_VISIBLE;
            let (width, height) = config::window::DEFAULT_CLIENT_SIZE;
            let mut rect = RECT {
                left: 0,
                top: 0,
                right: width,
                bottom: height,
            };
            unsafe {
                let _ = AdjustWindowRectEx(&mut rect, style, false, WINDOW_EX_STYLE::default());
            }

            let hwnd = unsafe {
                CreateWindowExW(
                    WINDOW_EX_STYLE::default(),
                    &class_name,
                    &HSTRING::from(config::window::HOST_TITLE),
                    style,
                    CW_USEDEFAULT,
                    CW_USEDEFAULT,
                    rect.right - rect.left,
                    rect.bottom - rect.top,
                    None,
                    None,
                    Some(hinstance.into()),
                    None,
                )
            }
            .context("Failed to create host window")?;

            debug!("Host window created: {:?}", hwnd);
            Ok(Self {
                hwnd,
                last_title: config::window::HOST_TITLE.to_string(),
                presentation: None,
            })
        }

        /// Dispatch pending messages; false once WM_QUIT arrives
        pub fn pump(&mut self) -> bool {
            let mut msg = MSG::default();
            unsafe {
                while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
                    if msg.message == WM_QUIT {
                        return false;
                    }
                    let _ = TranslateMessage(&msg);
                    DispatchMessageW(&msg);
                }
            }
            true
        }

        pub fn drain_events(&mut self) -> Vec<HostEvent> {
            match HOST_EVENTS.lock() {
                Ok(mut queue) => queue.drain(..).collect(),
                Err(_) => Vec::new(),
            }
        }

        pub fn minimize(&mut self) {
            unsafe {
                let _ = ShowWindow(self.hwnd, SW_MINIMIZE);
            }
        }
    }

    impl HostWindow for Win32HostWindow {
        fn handle(&self) -> Option<WindowHandle> {
            WindowHandle::from_raw(self.hwnd.0 as isize)
        }

        fn geometry(&self) -> HostGeometry {
            let minimized = unsafe { IsIconic(self.hwnd) }.as_bool();
            let mut rect = RECT::default();
            if unsafe { GetClientRect(self.hwnd, &mut rect) }.is_err() {
                return HostGeometry {
                    minimized,
                    ..HostGeometry::default()
                };
            }
            let mut origin = POINT { x: 0, y: 0 };
            let _ = unsafe { ClientToScreen(self.hwnd, &mut origin) };

            HostGeometry {
                client_left: origin.x,
                client_top: origin.y,
                client_width: (rect.right - rect.left).max(0) as u32,
                client_height: (rect.bottom - rect.top).max(0) as u32,
                minimized,
            }
        }

        fn apply_presentation(&mut self, presentation: Presentation) {
            if self.presentation == Some(presentation) {
                return;
            }

            unsafe {
                let ex_style = GetWindowLongPtrW(self.hwnd, GWL_EXSTYLE);
                let layered = WS_EX_LAYERED.0 as isize;
                if presentation.transparent {
                    SetWindowLongPtrW(self.hwnd, GWL_EXSTYLE, ex_style | layered);
                    if let Err(e) = SetLayeredWindowAttributes(
                        self.hwnd,
                        COLORREF(config::window::REGION_COLOR_KEY),
                        0,
                        LWA_COLORKEY,
                    ) {
                        warn!("Failed to set region color key: {}", e);
                    }
                    BACKGROUND_COLOR.store(config::window::REGION_COLOR_KEY, Ordering::Relaxed);
                } else {
                    SetWindowLongPtrW(self.hwnd, GWL_EXSTYLE, ex_style & !layered);
                    BACKGROUND_COLOR.store(config::window::NORMAL_BG_COLOR, Ordering::Relaxed);
                }

                let insert_after = if presentation.topmost {
                    HWND_TOPMOST
                } else {
                    HWND_NOTOPMOST
                };
                if let Err(e) = SetWindowPos(
                    self.hwnd,
                    Some(insert_after),
                    0,
                    0,
                    0,
                    0,
                    SWP_NOMOVE | SWP_NOSIZE | SWP_NOACTIVATE | SWP_FRAMECHANGED,
                ) {
                    warn!("Failed to update host z-order: {}", e);
                }
                let _ = InvalidateRect(Some(self.hwnd), None, true);
            }

            debug!(
                "Host presentation: transparent={} topmost={}",
                presentation.transparent, presentation.topmost
            );
            self.presentation = Some(presentation);
        }

        fn notify_fatal(&mut self, message: &str) {
            unsafe {
                MessageBoxW(
                    Some(self.hwnd),
                    &HSTRING::from(message),
                    w!("SpoutCap"),
                    MB_OK | MB_ICONERROR,
                );
            }
        }

        fn set_status(&mut self, status: &StatusLine) {
            let title = status.render();
            if title == self.last_title {
                return;
            }
            if unsafe { SetWindowTextW(self.hwnd, &HSTRING::from(title.as_str())) }.is_ok() {
                self.last_title = title;
            }
        }
    }

    impl Drop for Win32HostWindow {
        fn drop(&mut self) {
            unsafe {
                let _ = DestroyWindow(self.hwnd);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_keys_map_to_switches() {
        assert_eq!(
            event_for_key(b'R' as u16),
            Some(HostEvent::SwitchMode(CaptureMode::Region))
        );
        assert_eq!(event_for_key(b'P' as u16), Some(HostEvent::RepickTarget));
        assert_eq!(event_for_key(VK_ESCAPE_CODE), Some(HostEvent::Quit));
        assert_eq!(event_for_key(b'X' as u16), None);
    }
}
