// Prevents additional console window on Windows in release
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod app_bootstrap;
mod host_window;
mod logging;
mod settings;
mod settings_io;

use settings::Settings;

// ============================================================================
// Main
// ============================================================================

fn main() {
    let settings = app_bootstrap::load_initial_settings();
    app_bootstrap::init_logging(&settings);
    app_bootstrap::install_panic_hook();
    app_bootstrap::log_active_settings(&settings);

    let code = run(settings);
    log::info!("Application exiting with code {}", code);
    std::process::exit(code);
}

#[cfg(windows)]
fn run(settings: Settings) -> i32 {
    match frame_loop::run(settings) {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "SpoutCap stopped");
            1
        }
    }
}

#[cfg(not(windows))]
fn run(_settings: Settings) -> i32 {
    tracing::error!(
        platform = std::env::consts::OS,
        "SpoutCap needs DXGI desktop duplication and only runs on Windows"
    );
    1
}

#[cfg(windows)]
mod frame_loop {
    use std::time::{Duration, Instant};

    use anyhow::Result;
    use log::{info, warn};
    use spoutcap_capture::config;
    use spoutcap_capture::host::HostWindow;
    use spoutcap_capture::{CaptureMode, CaptureModeController, WindowsPlatform};

    use crate::app_bootstrap;
    use crate::host_window::{HostEvent, Win32HostWindow};
    use crate::settings::Settings;

    /// Frames published over the last status interval
    struct FpsCounter {
        window_start: Instant,
        frames: u32,
        fps: f32,
    }

    impl FpsCounter {
        fn new() -> Self {
            Self {
                window_start: Instant::now(),
                frames: 0,
                fps: 0.0,
            }
        }

        /// Returns true when a new rate is available
        fn record(&mut self, published: bool) -> bool {
            if published {
                self.frames += 1;
            }
            let elapsed = self.window_start.elapsed();
            if elapsed < Duration::from_millis(config::window::STATUS_REFRESH_MS) {
                return false;
            }
            self.fps = self.frames as f32 / elapsed.as_secs_f32();
            self.frames = 0;
            self.window_start = Instant::now();
            true
        }
    }

    pub(crate) fn run(settings: Settings) -> Result<()> {
        let title = app_bootstrap::title_from_args();
        let mut host = Win32HostWindow::create()?;

        let parts = WindowsPlatform::build_parts();
        let mut controller =
            CaptureModeController::<WindowsPlatform>::new(parts, settings.controller_config());
        controller.attach_host(&host);

        let mut initial_mode = settings.initial_mode;
        if let Some(title) = title {
            if controller.select_window_by_title(&title) {
                initial_mode = CaptureMode::Window;
                host.minimize();
            } else {
                warn!("Window \"{}\" not found, starting in {} mode", title, initial_mode);
            }
        }
        controller.setup(&mut host, initial_mode);

        let interval = settings.frame_interval();
        let mut fps = FpsCounter::new();
        host.set_status(&controller.status(0.0));

        'frames: loop {
            let frame_start = Instant::now();

            if !host.pump() {
                break;
            }
            for event in host.drain_events() {
                match event {
                    HostEvent::SwitchMode(mode) => {
                        if let Err(e) = controller.switch_mode(&mut host, mode) {
                            warn!("{}", e);
                        }
                    }
                    HostEvent::RepickTarget => {
                        info!("Window target cleared, click a window to capture");
                        controller.clear_target();
                    }
                    HostEvent::Quit => break 'frames,
                }
            }

            let report = controller.tick(&mut host);
            if fps.record(report.published.is_some()) {
                host.set_status(&controller.status(fps.fps));
            }

            if let Some(remaining) = interval.checked_sub(frame_start.elapsed()) {
                std::thread::sleep(remaining);
            }
        }

        controller.teardown();
        Ok(())
    }
}
