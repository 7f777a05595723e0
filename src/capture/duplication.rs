//! Full-desktop frame duplication source
//!
//! Owns the lifecycle of the OS duplication interface: lazy creation,
//! invalidation on access loss, and recreation on a later tick. The actual
//! DXGI calls sit behind [`DuplicationBackend`].

use std::sync::atomic::{AtomicU32, Ordering};

use log::{debug, info, warn};

use super::{FrameBuffer, TextureHandle};

/// Primary output placement in virtual-screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MonitorGeometry {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl MonitorGeometry {
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

/// Result of one `acquire_frame` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Shared texture and readback buffer hold the latest desktop image
    Success,
    /// No usable interface this tick; recreation is attempted next tick
    SkippedRetrying,
    /// Desktop unchanged within the wait bound; keep showing the last frame
    TransientTimeout,
}

/// What the backend saw when asking for the next frame
#[derive(Debug)]
pub enum FrameStatus {
    Frame,
    Timeout,
    AccessLost,
    Failed(anyhow::Error),
}

/// OS side of frame duplication
pub trait DuplicationBackend {
    /// The exclusively owned duplication interface
    type Interface;

    /// Find the primary output and duplicate it. Also (re)sizes the shared
    /// texture to the returned geometry.
    fn create_interface(&mut self) -> anyhow::Result<(Self::Interface, MonitorGeometry)>;

    /// Wait up to `timeout_ms` for a new frame, copy it into the shared
    /// texture and read it back into `readback`, then release the frame.
    fn acquire_next_frame(
        &mut self,
        interface: &mut Self::Interface,
        timeout_ms: u32,
        readback: &mut FrameBuffer,
    ) -> FrameStatus;

    /// The shared texture frames are copied into, once created
    fn shared_texture(&self) -> Option<TextureHandle>;
}

/// Duplication interface plus the monitor geometry it was created for
#[derive(Debug)]
pub struct DuplicationHandle<I> {
    interface: Option<I>,
    monitor: Option<MonitorGeometry>,
}

impl<I> Default for DuplicationHandle<I> {
    fn default() -> Self {
        Self {
            interface: None,
            monitor: None,
        }
    }
}

impl<I> DuplicationHandle<I> {
    pub fn is_open(&self) -> bool {
        self.interface.is_some()
    }

    pub fn monitor(&self) -> Option<MonitorGeometry> {
        self.monitor
    }

    /// Drop the interface; the last geometry is kept for comparison
    pub fn invalidate(&mut self) {
        self.interface = None;
    }
}

pub struct DuplicationSource<B: DuplicationBackend> {
    backend: B,
    handle: DuplicationHandle<B::Interface>,
    buffer: FrameBuffer,
    timeout_ms: u32,
    has_frame: bool,
    creation_attempts: u64,
}

impl<B: DuplicationBackend> DuplicationSource<B> {
    pub fn new(backend: B, timeout_ms: u32) -> Self {
        Self {
            backend,
            handle: DuplicationHandle::default(),
            buffer: FrameBuffer::new(),
            timeout_ms,
            has_frame: false,
            creation_attempts: 0,
        }
    }

    /// Create the interface at startup. Unlike the per-tick path, a failure
    /// here is returned so the caller can report it.
    pub fn open_at_startup(&mut self) -> anyhow::Result<MonitorGeometry> {
        self.creation_attempts += 1;
        let (interface, geometry) = self.backend.create_interface()?;
        self.install(interface, geometry)?;
        Ok(geometry)
    }

    /// Refresh the shared texture and readback buffer
    pub fn acquire_frame(&mut self) -> AcquireOutcome {
        if !self.handle.is_open() && !self.try_recreate() {
            return AcquireOutcome::SkippedRetrying;
        }

        let Some(interface) = self.handle.interface.as_mut() else {
            return AcquireOutcome::SkippedRetrying;
        };

        match self
            .backend
            .acquire_next_frame(interface, self.timeout_ms, &mut self.buffer)
        {
            FrameStatus::Frame => {
                self.buffer.set_texture(self.backend.shared_texture());
                self.has_frame = true;
                AcquireOutcome::Success
            }
            FrameStatus::Timeout => {
                static TIMEOUTS: AtomicU32 = AtomicU32::new(0);
                let count = TIMEOUTS.fetch_add(1, Ordering::Relaxed);
                if count % 300 == 0 {
                    debug!("Desktop unchanged, duplication wait timed out (#{})", count);
                }
                AcquireOutcome::TransientTimeout
            }
            FrameStatus::AccessLost => {
                warn!("Duplication access lost, interface will be recreated");
                self.handle.invalidate();
                AcquireOutcome::SkippedRetrying
            }
            FrameStatus::Failed(e) => {
                warn!("Duplication acquire failed, dropping interface: {:#}", e);
                self.handle.invalidate();
                AcquireOutcome::SkippedRetrying
            }
        }
    }

    fn try_recreate(&mut self) -> bool {
        self.creation_attempts += 1;
        match self.backend.create_interface() {
            Ok((interface, geometry)) => match self.install(interface, geometry) {
                Ok(()) => {
                    info!(
                        "Duplication interface created for {}x{} output at ({}, {})",
                        geometry.width, geometry.height, geometry.left, geometry.top
                    );
                    true
                }
                Err(e) => {
                    warn!("Skipping duplication tick: {:#}", e);
                    false
                }
            },
            Err(e) => {
                static FAILURES: AtomicU32 = AtomicU32::new(0);
                let count = FAILURES.fetch_add(1, Ordering::Relaxed);
                if count % 60 == 0 {
                    warn!("Duplication interface recreation failed (attempt {}): {:#}", count, e);
                }
                false
            }
        }
    }

    fn install(
        &mut self,
        interface: B::Interface,
        geometry: MonitorGeometry,
    ) -> anyhow::Result<()> {
        if self.handle.monitor != Some(geometry) {
            if let Some(previous) = self.handle.monitor {
                info!(
                    "Primary output changed from {}x{} to {}x{}",
                    previous.width, previous.height, geometry.width, geometry.height
                );
            }
            // The held image no longer matches the output
            self.has_frame = false;
        }
        self.handle.monitor = Some(geometry);
        self.buffer.ensure_size(geometry.width, geometry.height)?;
        self.handle.interface = Some(interface);
        Ok(())
    }

    pub fn handle(&self) -> &DuplicationHandle<B::Interface> {
        &self.handle
    }

    pub fn monitor(&self) -> Option<MonitorGeometry> {
        self.handle.monitor
    }

    /// Last good desktop frame (texture + readback)
    pub fn frame(&self) -> Option<&FrameBuffer> {
        self.has_frame.then_some(&self.buffer)
    }

    pub fn has_frame(&self) -> bool {
        self.has_frame
    }

    pub fn creation_attempts(&self) -> u64 {
        self.creation_attempts
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct ScriptedBackend {
        creates: VecDeque<Result<MonitorGeometry, &'static str>>,
        frames: VecDeque<FrameStatus>,
        create_calls: usize,
    }

    impl DuplicationBackend for ScriptedBackend {
        type Interface = u32;

        fn create_interface(&mut self) -> anyhow::Result<(u32, MonitorGeometry)> {
            self.create_calls += 1;
            match self.creates.pop_front() {
                Some(Ok(geometry)) => Ok((self.create_calls as u32, geometry)),
                Some(Err(msg)) => Err(anyhow::anyhow!(msg)),
                None => Err(anyhow::anyhow!("no output")),
            }
        }

        fn acquire_next_frame(
            &mut self,
            _interface: &mut u32,
            _timeout_ms: u32,
            readback: &mut FrameBuffer,
        ) -> FrameStatus {
            let status = self.frames.pop_front().unwrap_or(FrameStatus::Timeout);
            if matches!(status, FrameStatus::Frame) {
                readback.pixels_mut().fill(0xAB);
            }
            status
        }

        fn shared_texture(&self) -> Option<TextureHandle> {
            Some(TextureHandle::new(0x10, 1920, 1080))
        }
    }

    fn full_hd() -> MonitorGeometry {
        MonitorGeometry::new(0, 0, 1920, 1080)
    }

    #[test]
    fn missing_output_skips_without_failing() {
        let mut source = DuplicationSource::new(ScriptedBackend::default(), 200);
        assert_eq!(source.acquire_frame(), AcquireOutcome::SkippedRetrying);
        assert_eq!(source.acquire_frame(), AcquireOutcome::SkippedRetrying);
        assert_eq!(source.creation_attempts(), 2);
        assert!(source.frame().is_none());
    }

    #[test]
    fn first_successful_frame_fills_readback_and_texture() {
        let mut backend = ScriptedBackend::default();
        backend.creates.push_back(Ok(full_hd()));
        backend.frames.push_back(FrameStatus::Frame);
        let mut source = DuplicationSource::new(backend, 200);

        assert_eq!(source.acquire_frame(), AcquireOutcome::Success);
        let frame = source.frame().unwrap();
        assert_eq!(frame.size(), (1920, 1080));
        assert_eq!(frame.pixels().len(), 1920 * 1080 * 4);
        assert_eq!(frame.pixels()[0], 0xAB);
        assert!(frame.texture().is_some());
    }

    #[test]
    fn timeout_keeps_last_frame() {
        let mut backend = ScriptedBackend::default();
        backend.creates.push_back(Ok(full_hd()));
        backend.frames.push_back(FrameStatus::Frame);
        backend.frames.push_back(FrameStatus::Timeout);
        let mut source = DuplicationSource::new(backend, 200);

        source.acquire_frame();
        assert_eq!(source.acquire_frame(), AcquireOutcome::TransientTimeout);
        assert!(source.handle().is_open());
        assert_eq!(source.frame().unwrap().pixels()[0], 0xAB);
    }

    #[test]
    fn access_lost_recreates_exactly_once_before_next_frame() {
        let mut backend = ScriptedBackend::default();
        backend.creates.push_back(Ok(full_hd()));
        backend.creates.push_back(Ok(MonitorGeometry::new(0, 0, 2560, 1440)));
        backend.frames.push_back(FrameStatus::Frame);
        backend.frames.push_back(FrameStatus::AccessLost);
        backend.frames.push_back(FrameStatus::Frame);
        let mut source = DuplicationSource::new(backend, 200);

        assert_eq!(source.acquire_frame(), AcquireOutcome::Success);
        assert_eq!(source.acquire_frame(), AcquireOutcome::SkippedRetrying);
        assert!(!source.handle().is_open());

        let before = source.backend().create_calls;
        assert_eq!(source.acquire_frame(), AcquireOutcome::Success);
        assert_eq!(source.backend().create_calls, before + 1);
        assert_eq!(source.monitor().map(|m| (m.width, m.height)), Some((2560, 1440)));
        assert_eq!(source.frame().unwrap().size(), (2560, 1440));
    }

    #[test]
    fn unexpected_acquire_error_invalidates_interface() {
        let mut backend = ScriptedBackend::default();
        backend.creates.push_back(Ok(full_hd()));
        backend
            .frames
            .push_back(FrameStatus::Failed(anyhow::anyhow!("E_INVALIDARG")));
        let mut source = DuplicationSource::new(backend, 200);

        assert_eq!(source.acquire_frame(), AcquireOutcome::SkippedRetrying);
        assert!(!source.handle().is_open());
    }

    #[test]
    fn startup_failure_is_reported() {
        let mut backend = ScriptedBackend::default();
        backend.creates.push_back(Err("DuplicateOutput failed"));
        let mut source = DuplicationSource::new(backend, 200);
        let err = source.open_at_startup().unwrap_err();
        assert!(err.to_string().contains("DuplicateOutput"));
    }
}
