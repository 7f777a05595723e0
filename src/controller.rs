//! Capture mode state machine and per-frame tick
//!
//! The controller owns every capture source plus the sender, and runs them
//! once per frame in the order the mode calls for. It is driven from a single
//! thread; the only cross-thread input is the picker's pending selection.

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capture::{
    AcquireOutcome, CaptureMode, CaptureSession, DuplicationSource, FrameBuffer, RegionCropper,
    WindowCaptureSource, WindowSystem, WindowTarget,
};
use crate::capture_deps::{CapturePlatform, PlatformParts};
use crate::config;
use crate::host::{HostWindow, Presentation, StatusLine};
use crate::picker::{MouseButton, PickerState, WindowPicker};
use crate::sender::{FrameRef, FrameSender, OutputChannel, Representation};
use crate::window_filter::{TargetFilter, TargetFilterSettings};

/// Output channel names, one per mode
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelNames {
    #[serde(default = "default_desktop_name")]
    pub desktop: String,
    #[serde(default = "default_region_name")]
    pub region: String,
    #[serde(default = "default_window_name")]
    pub window: String,
}

fn default_desktop_name() -> String {
    config::channel::DESKTOP_NAME.to_string()
}

fn default_region_name() -> String {
    config::channel::REGION_NAME.to_string()
}

fn default_window_name() -> String {
    config::channel::WINDOW_NAME.to_string()
}

impl Default for ChannelNames {
    fn default() -> Self {
        Self {
            desktop: default_desktop_name(),
            region: default_region_name(),
            window: default_window_name(),
        }
    }
}

impl ChannelNames {
    pub fn for_mode(&self, mode: CaptureMode) -> &str {
        match mode {
            CaptureMode::Desktop => &self.desktop,
            CaptureMode::Region => &self.region,
            CaptureMode::Window => &self.window,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub channels: ChannelNames,
    pub flip_vertical: bool,
    pub pick_button: MouseButton,
    pub duplication_timeout_ms: u32,
    pub target_filter: TargetFilterSettings,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            channels: ChannelNames::default(),
            flip_vertical: false,
            pick_button: MouseButton::default(),
            duplication_timeout_ms: config::capture::DEFAULT_DUPLICATION_TIMEOUT_MS,
            target_filter: TargetFilterSettings::default(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SwitchError {
    #[error("{0} capture is unavailable because desktop duplication could not be set up")]
    Unavailable(CaptureMode),
}

/// What one tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub mode: CaptureMode,
    /// `None` when duplication is unavailable
    pub acquire: Option<AcquireOutcome>,
    pub published: Option<Representation>,
    pub picker: PickerState,
}

/// Strip double quotes from a command-line window title
pub fn parse_title_argument(arg: &str) -> Option<String> {
    let title: String = arg.chars().filter(|c| *c != '"').collect();
    let title = title.trim();
    (!title.is_empty()).then(|| title.to_string())
}

pub struct CaptureModeController<P: CapturePlatform> {
    mode: CaptureMode,
    config: ControllerConfig,
    duplication: Option<DuplicationSource<P::Duplication>>,
    cropper: Option<RegionCropper<P::Crop>>,
    window_source: WindowCaptureSource,
    picker: WindowPicker<P::Hook>,
    sender: FrameSender<P::Channel>,
    windows: P::Windows,
    target: WindowTarget,
    setup_error: Option<String>,
    fatal_reported: bool,
}

impl<P: CapturePlatform> CaptureModeController<P> {
    pub fn new(parts: PlatformParts<P>, config: ControllerConfig) -> Self {
        let (duplication, cropper, setup_error) = match parts.gpu {
            Ok(gpu) => (
                Some(DuplicationSource::new(gpu.duplication, config.duplication_timeout_ms)),
                Some(RegionCropper::new(gpu.crop)),
                None,
            ),
            Err(e) => (None, None, Some(format!("Graphics device unavailable: {:#}", e))),
        };

        Self {
            mode: CaptureMode::default(),
            window_source: WindowCaptureSource::new(TargetFilter::new(
                config.target_filter.clone(),
                None,
            )),
            picker: WindowPicker::new(parts.hook, config.pick_button),
            sender: FrameSender::new(parts.channel, config.flip_vertical),
            windows: parts.windows,
            config,
            duplication,
            cropper,
            target: WindowTarget::none(),
            setup_error,
            fatal_reported: false,
        }
    }

    /// Open duplication, enter `initial_mode` and declare its channel.
    /// Setup failures are reported to the host once; Window mode stays usable.
    pub fn setup<H: HostWindow + ?Sized>(&mut self, host: &mut H, initial_mode: CaptureMode) {
        self.attach_host(host);

        if let Some(source) = self.duplication.as_mut() {
            match source.open_at_startup() {
                Ok(monitor) => info!(
                    "Desktop duplication ready: {}x{} at ({}, {})",
                    monitor.width, monitor.height, monitor.left, monitor.top
                ),
                Err(e) => {
                    self.duplication = None;
                    self.cropper = None;
                    self.setup_error = Some(format!("Desktop duplication could not be started: {:#}", e));
                }
            }
        }
        if let Some(message) = self.setup_error.clone() {
            self.report_fatal(host, &message);
        }

        let mode = if initial_mode.uses_duplication() && !self.duplication_available() {
            warn!("{} capture unavailable at startup, falling back to Window", initial_mode);
            CaptureMode::Window
        } else {
            initial_mode
        };
        self.enter_mode(host, mode);
        info!("Capture started in {} mode", mode);
    }

    /// Exclude the host window from window capture
    pub fn attach_host<H: HostWindow + ?Sized>(&mut self, host: &H) {
        self.window_source.filter_mut().set_own_window(host.handle());
    }

    fn report_fatal<H: HostWindow + ?Sized>(&mut self, host: &mut H, message: &str) {
        if self.fatal_reported {
            return;
        }
        error!("{}", message);
        host.notify_fatal(message);
        self.fatal_reported = true;
    }

    /// Switch to `mode`. Switching to the active mode is a no-op.
    pub fn switch_mode<H: HostWindow + ?Sized>(
        &mut self,
        host: &mut H,
        mode: CaptureMode,
    ) -> Result<(), SwitchError> {
        if mode == self.mode {
            return Ok(());
        }
        if mode.uses_duplication() && !self.duplication_available() {
            warn!("Refusing switch to {}: desktop duplication unavailable", mode);
            return Err(SwitchError::Unavailable(mode));
        }

        info!("Switching capture mode {} -> {}", self.mode, mode);
        self.teardown_mode();
        self.enter_mode(host, mode);
        Ok(())
    }

    fn enter_mode<H: HostWindow + ?Sized>(&mut self, host: &mut H, mode: CaptureMode) {
        self.mode = mode;
        host.apply_presentation(Presentation::for_mode(mode));

        let size = match mode {
            CaptureMode::Desktop => self
                .duplication
                .as_ref()
                .and_then(|d| d.monitor())
                .map(|m| (m.width, m.height)),
            CaptureMode::Region => self.cropper.as_mut().and_then(|cropper| {
                cropper.track_host(&host.geometry());
                let (width, height) = cropper.dest_size();
                (width > 0 && height > 0).then_some((width, height))
            }),
            // Declared once a target has been sized
            CaptureMode::Window => None,
        };

        if let Some((width, height)) = size {
            ensure_channel(&mut self.sender, self.config.channels.for_mode(mode), width, height);
        }
    }

    /// Release what the current mode holds: crop target, window buffer and
    /// picker hook, plus the channel. The window target itself is kept.
    fn teardown_mode(&mut self) {
        match self.mode {
            CaptureMode::Desktop => {}
            CaptureMode::Region => {
                if let Some(cropper) = self.cropper.as_mut() {
                    cropper.release();
                }
            }
            CaptureMode::Window => {
                self.picker.disarm();
                self.window_source.release();
            }
        }
        self.sender.deactivate();
    }

    /// Run one frame
    pub fn tick<H: HostWindow + ?Sized>(&mut self, host: &mut H) -> TickReport {
        let acquire = self.duplication.as_mut().map(|d| d.acquire_frame());

        let published = match self.mode {
            CaptureMode::Desktop => self.tick_desktop(host, acquire),
            CaptureMode::Region => self.tick_region(host, acquire),
            CaptureMode::Window => self.tick_window(host),
        };

        TickReport {
            mode: self.mode,
            acquire,
            published,
            picker: self.picker.state(),
        }
    }

    fn tick_desktop<H: HostWindow + ?Sized>(
        &mut self,
        host: &mut H,
        acquire: Option<AcquireOutcome>,
    ) -> Option<Representation> {
        if acquire != Some(AcquireOutcome::Success) {
            return None;
        }
        let source = self.duplication.as_ref()?;
        let monitor = source.monitor()?;
        let name = self.config.channels.for_mode(CaptureMode::Desktop);
        if !ensure_channel(&mut self.sender, name, monitor.width, monitor.height) {
            return None;
        }
        let frame = source.frame()?;
        self.sender
            .publish_logged(FrameRef::from_buffer(frame), host.is_minimized())
    }

    fn tick_region<H: HostWindow + ?Sized>(
        &mut self,
        host: &mut H,
        acquire: Option<AcquireOutcome>,
    ) -> Option<Representation> {
        let minimized = host.is_minimized();
        let cropper = self.cropper.as_mut()?;
        let moved = cropper.track_host(&host.geometry());
        let source = self.duplication.as_ref()?;

        let fresh = acquire == Some(AcquireOutcome::Success);
        if !fresh && !(moved && source.has_frame()) {
            return None;
        }

        let frame = source.frame()?;
        let monitor = source.monitor()?;
        let (width, height) = cropper.dest_size();
        if width == 0 || height == 0 {
            return None;
        }
        let name = self.config.channels.for_mode(CaptureMode::Region);
        if !ensure_channel(&mut self.sender, name, width, height) {
            return None;
        }

        if Representation::choose(minimized, true, frame.texture().is_some())
            == Some(Representation::Texture)
        {
            if let Some(cropped) = frame
                .texture()
                .and_then(|texture| cropper.crop_tracked(&texture, monitor))
            {
                return self.sender.publish_logged(FrameRef::texture(cropped), minimized);
            }
            debug!("GPU crop unavailable this tick, publishing pixel buffer");
        }

        let pixels = cropper.crop_pixels(frame, monitor)?;
        self.sender.publish_logged(FrameRef::pixels(pixels), minimized)
    }

    fn tick_window<H: HostWindow + ?Sized>(&mut self, host: &mut H) -> Option<Representation> {
        self.picker.update(
            self.mode,
            &mut self.target,
            self.window_source.filter(),
            &self.windows,
        );

        let handle = self.target.handle?;
        if !self.windows.is_window(handle) {
            info!(
                "Capture target {:#x} closed, waiting for a new selection",
                handle.raw()
            );
            self.clear_target();
            return None;
        }

        match self.window_source.refresh_size(&mut self.target, &self.windows) {
            Ok(Some((width, height))) => {
                if self.sender.is_active() {
                    if let Err(e) = self.sender.resize(width, height) {
                        warn!("Failed to resize window channel: {}", e);
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Skipping window capture tick: {}", e);
                return None;
            }
        }

        let buffer = self.window_source.buffer();
        if !buffer.is_allocated() {
            return None;
        }
        let (width, height) = buffer.size();
        let name = self.config.channels.for_mode(CaptureMode::Window);
        if !ensure_channel(&mut self.sender, name, width, height) {
            return None;
        }

        if !self.window_source.capture(&self.target, &self.windows) {
            return None;
        }
        self.sender.publish_logged(
            FrameRef::pixels(self.window_source.buffer()),
            host.is_minimized(),
        )
    }

    /// Forget the window target so the picker rearms
    pub fn clear_target(&mut self) {
        self.target.clear();
        self.window_source.release();
        if self.mode == CaptureMode::Window {
            self.sender.deactivate();
        }
    }

    /// Pre-seed the window target, bypassing the picker
    pub fn set_target(&mut self, target: WindowTarget) {
        self.window_source.release();
        self.target = target;
    }

    /// Exact-title lookup for the command line. The found window must pass
    /// the same filter as a picked one.
    pub fn select_window_by_title(&mut self, title: &str) -> bool {
        let Some(found) = self.windows.find_by_title(title) else {
            info!("No window titled \"{}\"", title);
            return false;
        };
        let handle = match self.window_source.filter().check(Some(found), &self.windows) {
            Ok(handle) => handle,
            Err(rejection) => {
                info!("Window \"{}\" cannot be captured: {:?}", title, rejection);
                return false;
            }
        };
        let (width, height) = self.windows.client_size(handle).unwrap_or((0, 0));
        info!("Found window \"{}\" ({}x{})", title, width, height);
        self.set_target(WindowTarget::new(handle, width, height));
        true
    }

    /// Drop every resource: hook, buffers, render target and channel
    pub fn teardown(&mut self) {
        self.picker.disarm();
        if let Some(cropper) = self.cropper.as_mut() {
            cropper.release();
        }
        self.window_source.release();
        self.sender.deactivate();
        info!("Capture stopped");
    }

    pub fn status(&self, fps: f32) -> StatusLine {
        let (width, height) = self.sender.active_size().unwrap_or((0, 0));
        StatusLine {
            mode: self.mode,
            channel: self.sender.active_name().map(str::to_string),
            width,
            height,
            fps,
            awaiting_target: self.mode == CaptureMode::Window && !self.target.is_selected(),
        }
    }

    pub fn session(&self) -> Option<CaptureSession> {
        let name = self.sender.active_name()?;
        let (width, height) = self.sender.active_size()?;
        Some(CaptureSession {
            mode: self.mode,
            width,
            height,
            output_channel_name: name.to_string(),
        })
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn duplication_available(&self) -> bool {
        self.duplication.is_some()
    }

    pub fn duplication(&self) -> Option<&DuplicationSource<P::Duplication>> {
        self.duplication.as_ref()
    }

    pub fn cropper(&self) -> Option<&RegionCropper<P::Crop>> {
        self.cropper.as_ref()
    }

    pub fn target(&self) -> &WindowTarget {
        &self.target
    }

    pub fn window_buffer(&self) -> &FrameBuffer {
        self.window_source.buffer()
    }

    pub fn picker(&self) -> &WindowPicker<P::Hook> {
        &self.picker
    }

    pub fn sender(&self) -> &FrameSender<P::Channel> {
        &self.sender
    }

    pub fn windows(&self) -> &P::Windows {
        &self.windows
    }

    pub fn windows_mut(&mut self) -> &mut P::Windows {
        &mut self.windows
    }
}

fn ensure_channel<C: OutputChannel>(
    sender: &mut FrameSender<C>,
    name: &str,
    width: u32,
    height: u32,
) -> bool {
    if sender.is_active() {
        return true;
    }
    match sender.activate(name, width, height) {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to create output channel '{}': {}", name, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_argument_strips_quotes() {
        assert_eq!(parse_title_argument("\"Untitled - Notepad\""), Some("Untitled - Notepad".to_string()));
        assert_eq!(parse_title_argument("Calculator"), Some("Calculator".to_string()));
        assert_eq!(parse_title_argument("\"\""), None);
    }

    #[test]
    fn channel_names_follow_mode() {
        let names = ChannelNames::default();
        assert_eq!(names.for_mode(CaptureMode::Desktop), "Desktop");
        assert_eq!(names.for_mode(CaptureMode::Region), "Region");
        assert_eq!(names.for_mode(CaptureMode::Window), "Window");
    }

    #[test]
    fn partial_channel_names_deserialize_with_defaults() {
        let names: ChannelNames = serde_json::from_str(r#"{"window":"Game"}"#).unwrap();
        assert_eq!(names.window, "Game");
        assert_eq!(names.desktop, "Desktop");
    }
}
