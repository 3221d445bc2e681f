//! In-memory GPU backend for tests and offscreen hosts.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use super::gpu::{DeviceHandle, GpuBackend, GpuDevice, PresentationSurface};
use crate::error::{EmbedError, Result};
use crate::frame::FrameBuffer;

static NEXT_DEVICE_ID: AtomicU64 = AtomicU64::new(1);

/// Presentation surface that records what was presented to it.
#[derive(Debug)]
pub struct HeadlessSurface {
    size: Mutex<(u32, u32)>,
    valid: AtomicBool,
    presented: Mutex<Vec<PresentedFrame>>,
}

/// Summary of one presented frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentedFrame {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
}

impl HeadlessSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: Mutex::new((width, height)),
            valid: AtomicBool::new(true),
            presented: Mutex::new(Vec::new()),
        }
    }

    /// Simulate the host resizing its layer.
    pub fn set_size(&self, width: u32, height: u32) {
        *self.size.lock() = (width, height);
    }

    /// Simulate the host destroying the surface while still holding it.
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }

    pub fn presented(&self) -> Vec<PresentedFrame> {
        self.presented.lock().clone()
    }

    pub fn last_presented(&self) -> Option<PresentedFrame> {
        self.presented.lock().last().copied()
    }
}

impl PresentationSurface for HeadlessSurface {
    fn size(&self) -> (u32, u32) {
        *self.size.lock()
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }
}

/// Backend producing [`HeadlessDevice`]s.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    unavailable: bool,
    acquired: u32,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that behaves like a machine without a usable adapter.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            acquired: 0,
        }
    }

    /// Number of devices handed out so far.
    pub fn acquired(&self) -> u32 {
        self.acquired
    }
}

impl GpuBackend for HeadlessBackend {
    type Surface = HeadlessSurface;
    type Device = HeadlessDevice;

    fn acquire(&mut self, surface: &HeadlessSurface) -> Result<HeadlessDevice> {
        if self.unavailable {
            return Err(EmbedError::NoAdapter);
        }
        if !surface.is_valid() {
            return Err(EmbedError::Surface("surface already destroyed".into()));
        }
        self.acquired += 1;
        Ok(HeadlessDevice {
            id: NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed),
            configured: (0, 0),
        })
    }
}

/// Device that copies frames into its surface's presentation log.
#[derive(Debug)]
pub struct HeadlessDevice {
    id: u64,
    configured: (u32, u32),
}

impl GpuDevice for HeadlessDevice {
    type Surface = HeadlessSurface;

    fn handle(&self) -> DeviceHandle {
        DeviceHandle {
            backend: "headless",
            name: "headless".to_string(),
            id: self.id,
        }
    }

    fn configure(&mut self, surface: &HeadlessSurface, width: u32, height: u32) -> Result<()> {
        if !surface.is_valid() {
            return Err(EmbedError::Surface("surface destroyed".into()));
        }
        self.configured = (width, height);
        Ok(())
    }

    fn present(&mut self, surface: &HeadlessSurface, frame: &FrameBuffer) -> Result<()> {
        if !surface.is_valid() {
            return Err(EmbedError::Surface("surface destroyed".into()));
        }
        if frame.dimensions() != self.configured {
            return Err(EmbedError::Gpu(format!(
                "frame {}x{} does not match swapchain {}x{}",
                frame.width, frame.height, self.configured.0, self.configured.1
            )));
        }
        surface.presented.lock().push(PresentedFrame {
            sequence: frame.sequence,
            width: frame.width,
            height: frame.height,
        });
        Ok(())
    }
}
