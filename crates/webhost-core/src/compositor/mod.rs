//! Frame pipeline from the engine's compositor onto a host presentation surface.
//!
//! The bridge publishes every painted frame into a [`CompositorOutput`]
//! mailbox. A [`CompositorSurface`] attached to that mailbox through a
//! [`CompositorHandle`] presents the newest frame when the host asks it to.
//! Submission and resize share one lock, and every resize or teardown bumps a
//! generation counter so two-phase submissions prepared before it are dropped.

mod gpu;
pub mod headless;
pub mod wgpu_backend;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

pub use gpu::{DeviceHandle, GpuBackend, GpuDevice, PresentationSurface};

use crate::error::{EmbedError, Result};
use crate::frame::FrameBuffer;

/// Latest-frame mailbox written by the engine client, read by the compositor.
#[derive(Debug, Default)]
pub(crate) struct CompositorOutput {
    inner: Mutex<OutputInner>,
    next_sequence: AtomicU64,
}

#[derive(Debug, Default)]
struct OutputInner {
    latest: Option<FrameBuffer>,
    expected: Option<(u32, u32)>,
}

impl CompositorOutput {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Store a frame, replacing any unconsumed one. Frames painted for a size
    /// other than the last applied one are discarded.
    pub(crate) fn publish(&self, mut frame: FrameBuffer) -> bool {
        let mut inner = self.inner.lock();
        if let Some(expected) = inner.expected {
            if frame.dimensions() != expected {
                log::debug!(
                    "discarding {}x{} frame, viewport is {}x{}",
                    frame.width,
                    frame.height,
                    expected.0,
                    expected.1
                );
                return false;
            }
        }
        frame.sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed) + 1;
        inner.latest = Some(frame);
        true
    }

    /// Record the viewport size in device pixels; drops a pending frame of another size.
    pub(crate) fn set_expected_size(&self, width: u32, height: u32) {
        let mut inner = self.inner.lock();
        inner.expected = Some((width, height));
        if inner
            .latest
            .as_ref()
            .is_some_and(|f| f.dimensions() != (width, height))
        {
            inner.latest = None;
        }
    }

    pub(crate) fn take(&self) -> Option<FrameBuffer> {
        self.inner.lock().latest.take()
    }

    pub(crate) fn published(&self) -> u64 {
        self.next_sequence.load(Ordering::Relaxed)
    }
}

/// Opaque handle to a bridge's compositor output.
///
/// Holds no strong reference: once the bridge is gone the handle yields no
/// frames and [`is_live`](Self::is_live) turns false.
#[derive(Debug, Clone, Default)]
pub struct CompositorHandle {
    output: Weak<CompositorOutput>,
}

impl CompositorHandle {
    pub(crate) fn new(output: &Arc<CompositorOutput>) -> Self {
        Self {
            output: Arc::downgrade(output),
        }
    }

    pub fn is_live(&self) -> bool {
        self.output.strong_count() > 0
    }

    /// Take the newest unconsumed frame, if any.
    pub fn take_frame(&self) -> Option<FrameBuffer> {
        self.output.upgrade().and_then(|output| output.take())
    }

    /// Number of frames published so far.
    pub fn frames_published(&self) -> u64 {
        self.output.upgrade().map_or(0, |output| output.published())
    }
}

/// Lifecycle of a [`CompositorSurface`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfacePhase {
    Uninitialized,
    Ready,
    /// The host destroyed the surface; submits are no-ops until re-initialized.
    Lost,
    /// No usable GPU device; submits are no-ops until re-initialized.
    Failed,
}

/// Why a frame was not presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    NotInitialized,
    StaleGeneration,
    SizeMismatch,
    SurfaceLost,
    /// Swapchain was reconfigured; the next frame presents normally.
    SwapchainOutdated,
    DeviceError,
}

/// Result of a frame submission. Drops are expected under resize churn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Presented,
    NoNewFrame,
    Dropped(DropReason),
}

/// Presentation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub presented: u64,
    pub dropped: u64,
    pub last_presented_size: Option<(u32, u32)>,
    pub last_drop: Option<DropReason>,
}

/// A frame taken for presentation, stamped with the surface generation.
#[derive(Debug)]
pub struct FrameTicket {
    frame: FrameBuffer,
    generation: u64,
}

impl FrameTicket {
    pub fn frame(&self) -> &FrameBuffer {
        &self.frame
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

struct SurfaceInner<B: GpuBackend> {
    phase: SurfacePhase,
    device: Option<B::Device>,
    surface: Option<Weak<B::Surface>>,
    size: (u32, u32),
    pending_size: Option<(u32, u32)>,
}

/// GPU device + queue + borrowed presentation surface.
pub struct CompositorSurface<B: GpuBackend> {
    backend: Mutex<B>,
    inner: Mutex<SurfaceInner<B>>,
    generation: AtomicU64,
    source: Mutex<Option<CompositorHandle>>,
    stats: Mutex<FrameStats>,
}

impl<B: GpuBackend> CompositorSurface<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Mutex::new(backend),
            inner: Mutex::new(SurfaceInner {
                phase: SurfacePhase::Uninitialized,
                device: None,
                surface: None,
                size: (0, 0),
                pending_size: None,
            }),
            generation: AtomicU64::new(0),
            source: Mutex::new(None),
            stats: Mutex::new(FrameStats::default()),
        }
    }

    /// Acquire a device for `surface` and bind it.
    ///
    /// Uses the size of the last resize requested before initialization if
    /// there was one, the surface's own size otherwise. The surface is only
    /// borrowed; the host keeps ownership.
    pub fn initialize(&self, surface: &Arc<B::Surface>) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.phase == SurfacePhase::Ready {
            return Err(EmbedError::AlreadyInitialized);
        }
        if !surface.is_valid() {
            return Err(EmbedError::Surface("surface is not valid".into()));
        }

        let (width, height) = inner.pending_size.unwrap_or_else(|| surface.size());
        if width == 0 || height == 0 {
            return Err(EmbedError::InvalidSize { width, height });
        }

        let acquired = self.backend.lock().acquire(surface);
        let mut device = match acquired {
            Ok(device) => device,
            Err(e) => {
                log::warn!("compositor: no GPU device: {}", e);
                inner.phase = SurfacePhase::Failed;
                return Err(e);
            }
        };
        if let Err(e) = device.configure(surface, width, height) {
            log::warn!("compositor: surface configuration failed: {}", e);
            inner.phase = SurfacePhase::Failed;
            return Err(e);
        }

        log::info!(
            "compositor initialized {}x{} on {:?}",
            width,
            height,
            device.handle()
        );
        inner.device = Some(device);
        inner.surface = Some(Arc::downgrade(surface));
        inner.size = (width, height);
        inner.pending_size = None;
        inner.phase = SurfacePhase::Ready;
        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Consume frames from a bridge's compositor output.
    pub fn attach(&self, handle: CompositorHandle) {
        *self.source.lock() = Some(handle);
    }

    pub fn detach(&self) {
        *self.source.lock() = None;
    }

    /// Reconfigure the swapchain for a new size in device pixels.
    ///
    /// Before initialization the size is queued. Any ticket taken before the
    /// resize is dropped when presented.
    pub fn resize(&self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            log::debug!("compositor: ignoring degenerate resize {}x{}", width, height);
            return;
        }

        let mut inner = self.inner.lock();
        if inner.phase != SurfacePhase::Ready {
            inner.pending_size = Some((width, height));
            return;
        }
        let Some(surface) = self.live_surface(&mut inner) else {
            return;
        };

        let configured = match inner.device.as_mut() {
            Some(device) => device.configure(&surface, width, height),
            None => Ok(()),
        };
        // The old size is invalid either way.
        self.generation.fetch_add(1, Ordering::AcqRel);
        match configured {
            Ok(()) => {
                log::debug!("compositor resized to {}x{}", width, height);
                inner.size = (width, height);
            }
            Err(EmbedError::SwapchainOutdated) => {
                log::debug!("compositor: swapchain outdated during resize to {}x{}", width, height);
                inner.size = (width, height);
            }
            Err(EmbedError::Surface(msg)) => {
                log::warn!("compositor: surface lost during resize: {}", msg);
                self.teardown_locked(&mut inner, SurfacePhase::Lost);
            }
            Err(e) => {
                log::warn!("compositor: resize to {}x{} failed: {}", width, height, e);
            }
        }
    }

    /// Present the newest unseen frame from the attached output.
    pub fn submit_frame(&self) -> SubmitOutcome {
        let mut inner = self.inner.lock();
        let surface = match self.check_ready(&mut inner) {
            Ok(surface) => surface,
            Err(reason) => return self.dropped(reason),
        };
        let Some(frame) = self.take_frame() else {
            return SubmitOutcome::NoNewFrame;
        };
        let generation = self.generation.load(Ordering::Acquire);
        self.present_locked(&mut inner, &surface, frame, generation)
    }

    /// First half of a two-phase submission: take the newest frame and stamp
    /// it with the current generation. `None` when not ready or nothing new.
    pub fn begin_frame(&self) -> Option<FrameTicket> {
        if self.inner.lock().phase != SurfacePhase::Ready {
            return None;
        }
        let generation = self.generation.load(Ordering::Acquire);
        let frame = self.take_frame()?;
        Some(FrameTicket { frame, generation })
    }

    /// Second half of a two-phase submission.
    pub fn present(&self, ticket: FrameTicket) -> SubmitOutcome {
        let mut inner = self.inner.lock();
        let surface = match self.check_ready(&mut inner) {
            Ok(surface) => surface,
            Err(reason) => return self.dropped(reason),
        };
        self.present_locked(&mut inner, &surface, ticket.frame, ticket.generation)
    }

    /// Release the device and forget the surface. `initialize` may follow.
    pub fn teardown(&self) {
        let mut inner = self.inner.lock();
        self.teardown_locked(&mut inner, SurfacePhase::Uninitialized);
    }

    pub fn device(&self) -> Option<DeviceHandle> {
        self.inner.lock().device.as_ref().map(|d| d.handle())
    }

    /// Run `f` against the GPU device, if one is bound.
    pub fn with_device<R>(&self, f: impl FnOnce(&B::Device) -> R) -> Option<R> {
        self.inner.lock().device.as_ref().map(f)
    }

    pub fn with_backend<R>(&self, f: impl FnOnce(&B) -> R) -> R {
        f(&self.backend.lock())
    }

    pub fn phase(&self) -> SurfacePhase {
        self.inner.lock().phase
    }

    /// Configured size in device pixels; (0, 0) before initialization.
    pub fn size(&self) -> (u32, u32) {
        self.inner.lock().size
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> FrameStats {
        *self.stats.lock()
    }

    fn take_frame(&self) -> Option<FrameBuffer> {
        self.source.lock().as_ref().and_then(|h| h.take_frame())
    }

    fn check_ready(&self, inner: &mut SurfaceInner<B>) -> std::result::Result<Arc<B::Surface>, DropReason> {
        match inner.phase {
            SurfacePhase::Ready => self.live_surface(inner).ok_or(DropReason::SurfaceLost),
            SurfacePhase::Lost => Err(DropReason::SurfaceLost),
            SurfacePhase::Uninitialized | SurfacePhase::Failed => Err(DropReason::NotInitialized),
        }
    }

    /// Upgrade the borrowed surface, tearing down if the host destroyed it.
    fn live_surface(&self, inner: &mut SurfaceInner<B>) -> Option<Arc<B::Surface>> {
        let surface = inner
            .surface
            .as_ref()
            .and_then(Weak::upgrade)
            .filter(|s| s.is_valid());
        if surface.is_none() {
            log::info!("compositor: presentation surface destroyed by host");
            self.teardown_locked(inner, SurfacePhase::Lost);
        }
        surface
    }

    fn present_locked(
        &self,
        inner: &mut SurfaceInner<B>,
        surface: &Arc<B::Surface>,
        frame: FrameBuffer,
        generation: u64,
    ) -> SubmitOutcome {
        if generation != self.generation.load(Ordering::Acquire) {
            return self.dropped(DropReason::StaleGeneration);
        }
        if frame.dimensions() != inner.size {
            log::debug!(
                "compositor: frame {}x{} does not match surface {}x{}",
                frame.width,
                frame.height,
                inner.size.0,
                inner.size.1
            );
            return self.dropped(DropReason::SizeMismatch);
        }
        let Some(device) = inner.device.as_mut() else {
            return self.dropped(DropReason::NotInitialized);
        };

        match device.present(surface, &frame) {
            Ok(()) => {
                let mut stats = self.stats.lock();
                stats.presented += 1;
                stats.last_presented_size = Some(frame.dimensions());
                SubmitOutcome::Presented
            }
            Err(EmbedError::SwapchainOutdated) => {
                log::debug!("compositor: swapchain outdated, frame skipped");
                self.dropped(DropReason::SwapchainOutdated)
            }
            Err(EmbedError::Surface(msg)) => {
                log::warn!("compositor: surface lost while presenting: {}", msg);
                self.teardown_locked(inner, SurfacePhase::Lost);
                self.dropped(DropReason::SurfaceLost)
            }
            Err(e) => {
                log::warn!("compositor: present failed: {}", e);
                self.dropped(DropReason::DeviceError)
            }
        }
    }

    fn teardown_locked(&self, inner: &mut SurfaceInner<B>, phase: SurfacePhase) {
        if inner.device.take().is_some() {
            log::info!("compositor torn down ({:?})", phase);
        }
        inner.surface = None;
        inner.phase = phase;
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    fn dropped(&self, reason: DropReason) -> SubmitOutcome {
        log::debug!("compositor: frame dropped ({:?})", reason);
        let mut stats = self.stats.lock();
        stats.dropped += 1;
        stats.last_drop = Some(reason);
        SubmitOutcome::Dropped(reason)
    }
}
