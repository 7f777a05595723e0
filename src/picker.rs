//! Click-to-select window picker
//!
//! A low-level pointer hook records the screen point of one qualifying click
//! into [`PendingSelection`]. The main loop turns that point into a window
//! target on its next tick; the hook never touches window state itself.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::capture::{CaptureMode, WindowSystem, WindowTarget};
use crate::config;
use crate::window_filter::TargetFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MouseButton {
    Left,
    #[default]
    Right,
    Middle,
}

impl std::str::FromStr for MouseButton {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "left" => Ok(MouseButton::Left),
            "right" => Ok(MouseButton::Right),
            "middle" => Ok(MouseButton::Middle),
            _ => Err(format!("Invalid mouse button: {}", s)),
        }
    }
}

/// Single-producer / single-consumer handoff from the hook thread.
///
/// The producer publishes coordinates with a `Release` store of `ready`; the
/// consumer observes `ready` with `Acquire` before reading them. A pending
/// selection is never overwritten.
#[derive(Debug, Default)]
pub struct PendingSelection {
    coords: AtomicU64,
    ready: AtomicBool,
}

impl PendingSelection {
    pub const fn new() -> Self {
        Self {
            coords: AtomicU64::new(0),
            ready: AtomicBool::new(false),
        }
    }

    /// Producer side. Returns false if an earlier click is still pending.
    pub fn offer(&self, screen_x: i32, screen_y: i32) -> bool {
        if self.ready.load(Ordering::Acquire) {
            return false;
        }
        self.coords
            .store(config::picker::pack_point(screen_x, screen_y), Ordering::Relaxed);
        self.ready.store(true, Ordering::Release);
        true
    }

    /// Consumer side: take the selection once
    pub fn take(&self) -> Option<(i32, i32)> {
        if !self.ready.load(Ordering::Acquire) {
            return None;
        }
        let point = config::picker::unpack_point(self.coords.load(Ordering::Relaxed));
        self.ready.store(false, Ordering::Release);
        Some(point)
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn clear(&self) {
        self.ready.store(false, Ordering::Release);
    }
}

/// Process-wide pointer intercept
pub trait PointerHook {
    /// Start forwarding `button` presses into `selection`. Installing an
    /// already installed hook is a no-op.
    fn install(&mut self, selection: Arc<PendingSelection>, button: MouseButton) -> anyhow::Result<()>;

    fn uninstall(&mut self);

    fn is_installed(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerState {
    Idle,
    AwaitingClick,
    Resolved,
}

pub struct WindowPicker<H: PointerHook> {
    hook: H,
    selection: Arc<PendingSelection>,
    state: PickerState,
    button: MouseButton,
    install_count: u64,
}

impl<H: PointerHook> WindowPicker<H> {
    pub fn new(hook: H, button: MouseButton) -> Self {
        Self {
            hook,
            selection: Arc::new(PendingSelection::new()),
            state: PickerState::Idle,
            button,
            install_count: 0,
        }
    }

    pub fn state(&self) -> PickerState {
        self.state
    }

    pub fn selection(&self) -> &Arc<PendingSelection> {
        &self.selection
    }

    pub fn hook(&self) -> &H {
        &self.hook
    }

    /// Times the hook was (re)installed
    pub fn install_count(&self) -> u64 {
        self.install_count
    }

    /// One picker step, run at the start of a tick. May replace `target`.
    pub fn update<W: WindowSystem + ?Sized>(
        &mut self,
        mode: CaptureMode,
        target: &mut WindowTarget,
        filter: &TargetFilter,
        windows: &W,
    ) -> PickerState {
        if self.state == PickerState::Resolved {
            self.state = PickerState::Idle;
            return self.state;
        }

        if mode != CaptureMode::Window || target.is_selected() {
            self.disarm();
            return self.state;
        }

        match self.state {
            PickerState::Idle => self.arm(),
            PickerState::AwaitingClick => {
                if let Some((x, y)) = self.selection.take() {
                    if self.resolve(x, y, target, filter, windows) {
                        self.hook.uninstall();
                        self.state = PickerState::Resolved;
                    }
                }
            }
            PickerState::Resolved => {}
        }
        self.state
    }

    fn arm(&mut self) {
        self.selection.clear();
        if !self.hook.is_installed() {
            if let Err(e) = self.hook.install(Arc::clone(&self.selection), self.button) {
                warn!("Failed to install pointer hook: {:#}", e);
                return;
            }
            self.install_count += 1;
        }
        info!("Waiting for a {:?} click on the window to capture", self.button);
        self.state = PickerState::AwaitingClick;
    }

    fn resolve<W: WindowSystem + ?Sized>(
        &self,
        x: i32,
        y: i32,
        target: &mut WindowTarget,
        filter: &TargetFilter,
        windows: &W,
    ) -> bool {
        let handle = match filter.check(windows.top_level_at(x, y), windows) {
            Ok(handle) => handle,
            Err(rejection) => {
                info!("Click at ({}, {}) ignored: {:?}", x, y, rejection);
                return false;
            }
        };
        let Some((width, height)) = windows.client_size(handle) else {
            debug!("Click at ({}, {}) ignored: no client area", x, y);
            return false;
        };

        info!(
            "Selected window {:#x} ({}x{}) for capture",
            handle.raw(),
            width,
            height
        );
        *target = WindowTarget::new(handle, width, height);
        true
    }

    /// Leave selection: uninstall the hook and drop any pending click
    pub fn disarm(&mut self) {
        if self.hook.is_installed() {
            self.hook.uninstall();
        }
        self.selection.clear();
        self.state = PickerState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_selection_is_consumed_once() {
        let pending = PendingSelection::new();
        assert!(pending.offer(-120, 300));
        assert_eq!(pending.take(), Some((-120, 300)));
        assert_eq!(pending.take(), None);
    }

    #[test]
    fn pending_selection_is_not_overwritten() {
        let pending = PendingSelection::new();
        assert!(pending.offer(1, 2));
        assert!(!pending.offer(3, 4));
        assert_eq!(pending.take(), Some((1, 2)));
    }

    #[test]
    fn selection_crosses_threads() {
        let pending = Arc::new(PendingSelection::new());
        let producer = Arc::clone(&pending);
        std::thread::spawn(move || {
            producer.offer(640, -480);
        })
        .join()
        .unwrap();
        assert_eq!(pending.take(), Some((640, -480)));
    }

    #[test]
    fn mouse_button_parses() {
        assert_eq!("LEFT".parse::<MouseButton>(), Ok(MouseButton::Left));
        assert!("back".parse::<MouseButton>().is_err());
        assert_eq!(MouseButton::default(), MouseButton::Right);
    }
}
