// platform/windows/hook.rs - Low-level mouse hook for the window picker
//
// WH_MOUSE_LL callbacks are delivered on the installing thread's message
// loop, so the hook gets a dedicated thread. The callback only writes the
// click point into the PendingSelection; events are always passed on.
//
// The hook thread's loop also wakes on a thread timer and exits once the
// stop flag is set, so uninstall can always join it even when WM_QUIT
// cannot be posted.

use std::cell::OnceCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{anyhow, Result};
use log::{error, info, warn};
use windows::Win32::Foundation::{LPARAM, LRESULT, WPARAM};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, GetMessageW, KillTimer, PeekMessageW, PostThreadMessageW,
    SetTimer, SetWindowsHookExW, TranslateMessage, UnhookWindowsHookEx, MSG, MSLLHOOKSTRUCT,
    PM_NOREMOVE, WH_MOUSE_LL, WM_LBUTTONDOWN, WM_MBUTTONDOWN, WM_QUIT, WM_RBUTTONDOWN,
};

use crate::picker::{MouseButton, PendingSelection, PointerHook};

/// How often the hook thread rechecks its stop flag
const STOP_POLL_MS: u32 = 100;

struct HookTarget {
    selection: Arc<PendingSelection>,
    button: MouseButton,
}

thread_local! {
    // Set once on the hook thread before the hook is installed
    static HOOK_TARGET: OnceCell<HookTarget> = const { OnceCell::new() };
}

fn pressed_button(message: u32) -> Option<MouseButton> {
    match message {
        WM_LBUTTONDOWN => Some(MouseButton::Left),
        WM_RBUTTONDOWN => Some(MouseButton::Right),
        WM_MBUTTONDOWN => Some(MouseButton::Middle),
        _ => None,
    }
}

/// Offer a press to this thread's selection; false when it was not taken
fn deliver_press(button: MouseButton, x: i32, y: i32) -> bool {
    HOOK_TARGET.with(|cell| match cell.get() {
        Some(target) if target.button == button => target.selection.offer(x, y),
        _ => false,
    })
}

unsafe extern "system" fn mouse_hook_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code >= 0 {
        if let Some(button) = pressed_button(wparam.0 as u32) {
            let hook_struct = unsafe { &*(lparam.0 as *const MSLLHOOKSTRUCT) };
            deliver_press(button, hook_struct.pt.x, hook_struct.pt.y);
        }
    }

    unsafe { CallNextHookEx(None, code, wparam, lparam) }
}

/// Pump messages until WM_QUIT or until `stop` is seen after a wakeup
fn run_message_loop(stop: &AtomicBool) {
    let timer = unsafe { SetTimer(None, 0, STOP_POLL_MS, None) };
    if timer == 0 {
        warn!("Mouse hook thread has no stop timer, relying on WM_QUIT");
    }

    let mut msg = MSG::default();
    while !stop.load(Ordering::Acquire) {
        // 0 is WM_QUIT, -1 is an error
        if unsafe { GetMessageW(&mut msg, None, 0, 0) }.0 <= 0 {
            break;
        }
        unsafe {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }

    if timer != 0 {
        let _ = unsafe { KillTimer(None, timer) };
    }
}

/// Make sure this thread has a message queue before its id is handed out
fn ensure_message_queue() {
    let mut msg = MSG::default();
    let _ = unsafe { PeekMessageW(&mut msg, None, 0, 0, PM_NOREMOVE) };
}

fn hook_thread_main(target: HookTarget, stop: Arc<AtomicBool>, ready: mpsc::Sender<Result<u32, String>>) {
    HOOK_TARGET.with(|cell| {
        let _ = cell.set(target);
    });
    ensure_message_queue();

    let hook = match unsafe { SetWindowsHookExW(WH_MOUSE_LL, Some(mouse_hook_proc), None, 0) } {
        Ok(hook) => hook,
        Err(e) => {
            let _ = ready.send(Err(e.to_string()));
            return;
        }
    };
    let _ = ready.send(Ok(unsafe { GetCurrentThreadId() }));

    run_message_loop(&stop);

    if let Err(e) = unsafe { UnhookWindowsHookEx(hook) } {
        warn!("UnhookWindowsHookEx failed: {}", e);
    }
}

struct HookThread {
    thread_id: u32,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl HookThread {
    /// Signal the thread and wait for it. A failed WM_QUIT post only delays
    /// the exit until the next timer tick.
    fn stop(self, post_quit: bool) {
        self.stop.store(true, Ordering::Release);
        if post_quit {
            let posted = unsafe { PostThreadMessageW(self.thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) };
            if let Err(e) = posted {
                warn!("Failed to post WM_QUIT to mouse hook thread: {}", e);
            }
        }
        if self.handle.join().is_err() {
            error!("Mouse hook thread panicked");
        }
    }
}

/// Process-wide WH_MOUSE_LL hook, at most one installed at a time
#[derive(Default)]
pub struct LowLevelMouseHook {
    thread: Option<HookThread>,
}

impl LowLevelMouseHook {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PointerHook for LowLevelMouseHook {
    fn install(&mut self, selection: Arc<PendingSelection>, button: MouseButton) -> Result<()> {
        if self.thread.is_some() {
            return Ok(());
        }

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let target = HookTarget { selection, button };
        let (ready_tx, ready_rx) = mpsc::channel::<Result<u32, String>>();
        let handle = std::thread::Builder::new()
            .name("spoutcap-mouse-hook".to_string())
            .spawn(move || hook_thread_main(target, thread_stop, ready_tx))
            .map_err(|e| anyhow!("Failed to spawn mouse hook thread: {}", e))?;

        match ready_rx.recv() {
            Ok(Ok(thread_id)) => {
                info!("Mouse hook installed on thread {}", thread_id);
                self.thread = Some(HookThread {
                    thread_id,
                    stop,
                    handle,
                });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(anyhow!("SetWindowsHookExW failed: {}", e))
            }
            Err(_) => {
                let _ = handle.join();
                Err(anyhow!("Mouse hook thread exited during startup"))
            }
        }
    }

    fn uninstall(&mut self) {
        if let Some(thread) = self.thread.take() {
            thread.stop(true);
            info!("Mouse hook uninstalled");
        }
    }

    fn is_installed(&self) -> bool {
        self.thread.is_some()
    }
}

impl Drop for LowLevelMouseHook {
    fn drop(&mut self) {
        self.uninstall();
    }
}
