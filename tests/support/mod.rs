#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use spoutcap_capture::capture::{
    CropBackend, DuplicationBackend, FrameBuffer, FrameStatus, MonitorGeometry, TextureHandle,
    WindowHandle, WindowSystem,
};
use spoutcap_capture::capture_deps::{CapturePlatform, GpuParts, PlatformParts};
use spoutcap_capture::host::{HostGeometry, HostWindow, Presentation, StatusLine};
use spoutcap_capture::picker::{MouseButton, PendingSelection, PointerHook};
use spoutcap_capture::sender::OutputChannel;

pub const DESKTOP_TEXTURE: usize = 0xD0;
pub const CROP_TEXTURE: usize = 0xC0;

pub fn handle(raw: isize) -> WindowHandle {
    WindowHandle::from_raw(raw).unwrap()
}

// ---------------------------------------------------------------------------
// Duplication
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct DuplicationScript {
    pub creates: VecDeque<Result<MonitorGeometry, &'static str>>,
    pub frames: VecDeque<FrameStatus>,
    pub create_calls: usize,
    /// Geometry of the last successful create
    pub geometry: Option<MonitorGeometry>,
}

#[derive(Clone, Default)]
pub struct MockDuplication {
    pub script: Arc<Mutex<DuplicationScript>>,
}

impl MockDuplication {
    pub fn with_output(geometry: MonitorGeometry) -> Self {
        let mock = Self::default();
        mock.push_create(Ok(geometry));
        mock
    }

    pub fn push_create(&self, result: Result<MonitorGeometry, &'static str>) {
        self.script.lock().unwrap().creates.push_back(result);
    }

    pub fn push_frame(&self, status: FrameStatus) {
        self.script.lock().unwrap().frames.push_back(status);
    }

    pub fn create_calls(&self) -> usize {
        self.script.lock().unwrap().create_calls
    }
}

impl DuplicationBackend for MockDuplication {
    type Interface = usize;

    fn create_interface(&mut self) -> anyhow::Result<(usize, MonitorGeometry)> {
        let mut script = self.script.lock().unwrap();
        script.create_calls += 1;
        match script.creates.pop_front() {
            Some(Ok(geometry)) => {
                script.geometry = Some(geometry);
                Ok((script.create_calls, geometry))
            }
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Err(anyhow::anyhow!("no output attached")),
        }
    }

    fn acquire_next_frame(
        &mut self,
        _interface: &mut usize,
        _timeout_ms: u32,
        readback: &mut FrameBuffer,
    ) -> FrameStatus {
        let status = self
            .script
            .lock()
            .unwrap()
            .frames
            .pop_front()
            .unwrap_or(FrameStatus::Timeout);
        if matches!(status, FrameStatus::Frame) {
            readback.pixels_mut().fill(0x7F);
        }
        status
    }

    fn shared_texture(&self) -> Option<TextureHandle> {
        let geometry = self.script.lock().unwrap().geometry?;
        Some(TextureHandle::new(DESKTOP_TEXTURE, geometry.width, geometry.height))
    }
}

// ---------------------------------------------------------------------------
// Crop
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropCall {
    pub width: u32,
    pub height: u32,
    pub left: i32,
    pub top: i32,
}

#[derive(Clone, Default)]
pub struct MockCrop {
    pub calls: Arc<Mutex<Vec<CropCall>>>,
    pub releases: Arc<AtomicUsize>,
}

impl CropBackend for MockCrop {
    fn crop(
        &mut self,
        _source: &TextureHandle,
        dest_width: u32,
        dest_height: u32,
        crop_left: i32,
        crop_top: i32,
    ) -> anyhow::Result<TextureHandle> {
        self.calls.lock().unwrap().push(CropCall {
            width: dest_width,
            height: dest_height,
            left: crop_left,
            top: crop_top,
        });
        Ok(TextureHandle::new(CROP_TEXTURE, dest_width, dest_height))
    }

    fn release(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Output channel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelCall {
    Create(String, u32, u32),
    Resize(String, u32, u32),
    Texture(String, u32, u32, bool),
    Buffer(String, u32, u32),
    Release(String),
}

#[derive(Clone, Default)]
pub struct MockChannel {
    pub calls: Arc<Mutex<Vec<ChannelCall>>>,
    /// Declared size per live channel
    pub declared: Arc<Mutex<HashMap<String, (u32, u32)>>>,
}

impl MockChannel {
    pub fn calls(&self) -> Vec<ChannelCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn declared(&self, name: &str) -> Option<(u32, u32)> {
        self.declared.lock().unwrap().get(name).copied()
    }

    pub fn texture_publishes(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, ChannelCall::Texture(..)))
            .count()
    }

    pub fn buffer_publishes(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, ChannelCall::Buffer(..)))
            .count()
    }

    fn record(&self, call: ChannelCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl OutputChannel for MockChannel {
    fn create(&mut self, name: &str, width: u32, height: u32) -> anyhow::Result<()> {
        self.record(ChannelCall::Create(name.to_string(), width, height));
        self.declared
            .lock()
            .unwrap()
            .insert(name.to_string(), (width, height));
        Ok(())
    }

    fn resize(&mut self, name: &str, width: u32, height: u32) -> anyhow::Result<()> {
        self.record(ChannelCall::Resize(name.to_string(), width, height));
        self.declared
            .lock()
            .unwrap()
            .insert(name.to_string(), (width, height));
        Ok(())
    }

    fn publish_texture(
        &mut self,
        name: &str,
        texture: &TextureHandle,
        flip_vertical: bool,
    ) -> anyhow::Result<()> {
        if self.declared(name) != Some((texture.width, texture.height)) {
            anyhow::bail!("texture size does not match declared channel size");
        }
        self.record(ChannelCall::Texture(
            name.to_string(),
            texture.width,
            texture.height,
            flip_vertical,
        ));
        Ok(())
    }

    fn publish_buffer(&mut self, name: &str, pixels: &[u8], width: u32, height: u32) -> anyhow::Result<()> {
        if self.declared(name) != Some((width, height)) {
            anyhow::bail!("buffer size does not match declared channel size");
        }
        assert_eq!(pixels.len(), width as usize * height as usize * 4);
        self.record(ChannelCall::Buffer(name.to_string(), width, height));
        Ok(())
    }

    fn release(&mut self, name: &str) {
        self.record(ChannelCall::Release(name.to_string()));
        self.declared.lock().unwrap().remove(name);
    }
}

// ---------------------------------------------------------------------------
// Pointer hook
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct HookState {
    pub selection: Option<Arc<PendingSelection>>,
    pub button: Option<MouseButton>,
    pub installs: usize,
    pub uninstalls: usize,
}

#[derive(Clone, Default)]
pub struct MockHook {
    pub state: Arc<Mutex<HookState>>,
}

impl MockHook {
    /// Simulate a click arriving on the hook thread
    pub fn click(&self, x: i32, y: i32) -> bool {
        let state = self.state.lock().unwrap();
        match state.selection.as_ref() {
            Some(selection) => selection.offer(x, y),
            None => false,
        }
    }

    pub fn installs(&self) -> usize {
        self.state.lock().unwrap().installs
    }

    pub fn uninstalls(&self) -> usize {
        self.state.lock().unwrap().uninstalls
    }
}

impl PointerHook for MockHook {
    fn install(&mut self, selection: Arc<PendingSelection>, button: MouseButton) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.selection.is_some() {
            return Ok(());
        }
        state.selection = Some(selection);
        state.button = Some(button);
        state.installs += 1;
        Ok(())
    }

    fn uninstall(&mut self) {
        let mut state = self.state.lock().unwrap();
        if state.selection.take().is_some() {
            state.uninstalls += 1;
        }
    }

    fn is_installed(&self) -> bool {
        self.state.lock().unwrap().selection.is_some()
    }
}

// ---------------------------------------------------------------------------
// Window system
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MockWindow {
    pub class_name: String,
    pub title: String,
    pub size: (u32, u32),
    /// Screen rectangle used by `top_level_at`
    pub left: i32,
    pub top: i32,
}

#[derive(Default)]
pub struct WindowsState {
    pub windows: HashMap<isize, MockWindow>,
    pub blits: Vec<(isize, u32, u32)>,
}

#[derive(Clone, Default)]
pub struct MockWindows {
    pub state: Arc<Mutex<WindowsState>>,
}

impl MockWindows {
    pub fn add(&self, raw: isize, class_name: &str, title: &str, size: (u32, u32)) {
        self.add_at(raw, class_name, title, size, 0, 0);
    }

    pub fn add_at(&self, raw: isize, class_name: &str, title: &str, size: (u32, u32), left: i32, top: i32) {
        self.state.lock().unwrap().windows.insert(
            raw,
            MockWindow {
                class_name: class_name.to_string(),
                title: title.to_string(),
                size,
                left,
                top,
            },
        );
    }

    pub fn resize(&self, raw: isize, size: (u32, u32)) {
        if let Some(window) = self.state.lock().unwrap().windows.get_mut(&raw) {
            window.size = size;
        }
    }

    pub fn close(&self, raw: isize) {
        self.state.lock().unwrap().windows.remove(&raw);
    }

    pub fn blits(&self) -> Vec<(isize, u32, u32)> {
        self.state.lock().unwrap().blits.clone()
    }
}

impl WindowSystem for MockWindows {
    fn is_window(&self, handle: WindowHandle) -> bool {
        self.state.lock().unwrap().windows.contains_key(&handle.raw())
    }

    fn class_name(&self, handle: WindowHandle) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .windows
            .get(&handle.raw())
            .map(|w| w.class_name.clone())
    }

    fn client_size(&self, handle: WindowHandle) -> Option<(u32, u32)> {
        self.state
            .lock()
            .unwrap()
            .windows
            .get(&handle.raw())
            .map(|w| w.size)
    }

    fn top_level_at(&self, x: i32, y: i32) -> Option<WindowHandle> {
        let state = self.state.lock().unwrap();
        let mut hits: Vec<_> = state
            .windows
            .iter()
            .filter(|(_, w)| {
                x >= w.left
                    && y >= w.top
                    && x < w.left + w.size.0 as i32
                    && y < w.top + w.size.1 as i32
            })
            .map(|(raw, _)| *raw)
            .collect();
        hits.sort();
        hits.first().and_then(|raw| WindowHandle::from_raw(*raw))
    }

    fn find_by_title(&self, title: &str) -> Option<WindowHandle> {
        let state = self.state.lock().unwrap();
        state
            .windows
            .iter()
            .find(|(_, w)| w.title == title)
            .and_then(|(raw, _)| WindowHandle::from_raw(*raw))
    }

    fn blit(&self, handle: WindowHandle, width: u32, height: u32, dest: &mut [u8]) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.windows.contains_key(&handle.raw()) {
            anyhow::bail!("window is gone");
        }
        dest.fill(0x42);
        state.blits.push((handle.raw(), width, height));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Host window
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockHost {
    pub own: Option<WindowHandle>,
    pub geometry: HostGeometry,
    pub presentations: Vec<Presentation>,
    pub fatal_messages: Vec<String>,
    pub statuses: Vec<StatusLine>,
}

impl MockHost {
    pub fn new(own: isize, geometry: HostGeometry) -> Self {
        Self {
            own: WindowHandle::from_raw(own),
            geometry,
            ..Self::default()
        }
    }
}

impl HostWindow for MockHost {
    fn handle(&self) -> Option<WindowHandle> {
        self.own
    }

    fn geometry(&self) -> HostGeometry {
        self.geometry
    }

    fn apply_presentation(&mut self, presentation: Presentation) {
        self.presentations.push(presentation);
    }

    fn notify_fatal(&mut self, message: &str) {
        self.fatal_messages.push(message.to_string());
    }

    fn set_status(&mut self, status: &StatusLine) {
        self.statuses.push(status.clone());
    }
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

pub struct MockPlatform;

impl CapturePlatform for MockPlatform {
    type Duplication = MockDuplication;
    type Crop = MockCrop;
    type Channel = MockChannel;
    type Hook = MockHook;
    type Windows = MockWindows;
}

/// Shared views into every mock the controller owns
#[derive(Clone, Default)]
pub struct Mocks {
    pub duplication: MockDuplication,
    pub crop: MockCrop,
    pub channel: MockChannel,
    pub hook: MockHook,
    pub windows: MockWindows,
}

impl Mocks {
    pub fn with_output(geometry: MonitorGeometry) -> Self {
        Self {
            duplication: MockDuplication::with_output(geometry),
            ..Self::default()
        }
    }

    pub fn parts(&self) -> PlatformParts<MockPlatform> {
        PlatformParts {
            gpu: Ok(GpuParts {
                duplication: self.duplication.clone(),
                crop: self.crop.clone(),
            }),
            channel: self.channel.clone(),
            hook: self.hook.clone(),
            windows: self.windows.clone(),
        }
    }

    /// Parts as they look when the graphics device could not be created
    pub fn parts_without_gpu(&self) -> PlatformParts<MockPlatform> {
        PlatformParts {
            gpu: Err(anyhow::anyhow!("no adapter")),
            channel: self.channel.clone(),
            hook: self.hook.clone(),
            windows: self.windows.clone(),
        }
    }
}

pub fn full_hd() -> MonitorGeometry {
    MonitorGeometry::new(0, 0, 1920, 1080)
}

pub fn host_geometry(left: i32, top: i32, width: u32, height: u32) -> HostGeometry {
    HostGeometry {
        client_left: left,
        client_top: top,
        client_width: width,
        client_height: height,
        minimized: false,
    }
}
