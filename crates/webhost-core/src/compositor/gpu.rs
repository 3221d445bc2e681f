//! GPU capability traits the compositor presents through.

use crate::error::Result;
use crate::frame::FrameBuffer;

/// A host-owned presentation target (window layer, swapchain surface).
///
/// The compositor only borrows it; the host may destroy it at any time and
/// the compositor notices through a dead weak reference or `is_valid`.
pub trait PresentationSurface: Send + Sync {
    /// Current drawable size in device pixels.
    fn size(&self) -> (u32, u32);

    /// False once the host has torn the underlying surface down.
    fn is_valid(&self) -> bool;
}

/// Opaque description of the GPU device, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    pub backend: &'static str,
    pub name: String,
    pub id: u64,
}

/// A device + command queue bound to one surface.
pub trait GpuDevice: Send {
    type Surface: PresentationSurface;

    fn handle(&self) -> DeviceHandle;

    /// (Re)configure the surface's swapchain for the given pixel size.
    fn configure(&mut self, surface: &Self::Surface, width: u32, height: u32) -> Result<()>;

    /// Upload and present one frame; the frame matches the configured size.
    fn present(&mut self, surface: &Self::Surface, frame: &FrameBuffer) -> Result<()>;
}

/// Factory for GPU devices compatible with a given surface.
pub trait GpuBackend: Send {
    type Surface: PresentationSurface;
    type Device: GpuDevice<Surface = Self::Surface>;

    /// Acquire a device and queue able to present to `surface`.
    fn acquire(&mut self, surface: &Self::Surface) -> Result<Self::Device>;
}
