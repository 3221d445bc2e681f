//! Frame buffers produced by the engine compositor.

use std::borrow::Cow;

/// A dirty rectangle region that needs updating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirtyRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl DirtyRect {
    /// Check if this rect is valid (non-zero size).
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Pixel format of the frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// BGRA 8-bit per channel (engine native, little-endian: B, G, R, A).
    #[default]
    Bgra8,
    /// RGBA 8-bit per channel.
    Rgba8,
}

/// A frame rendered by the engine's compositor.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    /// Raw pixel data.
    pub data: Vec<u8>,
    /// Width in physical pixels.
    pub width: u32,
    /// Height in physical pixels.
    pub height: u32,
    /// Bytes per row (may include padding).
    pub stride: u32,
    /// Pixel format.
    pub format: PixelFormat,
    /// Dirty rectangles that were updated (empty = full frame).
    pub dirty_rects: Vec<DirtyRect>,
    /// Sequence number assigned when the frame is published; 0 until then.
    pub sequence: u64,
}

impl FrameBuffer {
    /// Create a frame buffer with existing data.
    pub fn from_raw(data: Vec<u8>, width: u32, height: u32, stride: u32, format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            stride,
            format,
            dirty_rects: Vec::new(),
            sequence: 0,
        }
    }

    /// Create a frame filled with a single BGRA color.
    ///
    /// Dimensions whose byte size overflows yield an empty 0x0 frame.
    pub fn solid(width: u32, height: u32, bgra: [u8; 4]) -> Self {
        let layout = width.checked_mul(4).and_then(|stride| {
            (width as usize)
                .checked_mul(height as usize)
                .and_then(|pixels| pixels.checked_mul(4).map(|bytes| (stride, pixels, bytes)))
        });
        let Some((stride, pixels, bytes)) = layout else {
            return Self::from_raw(Vec::new(), 0, 0, 0, PixelFormat::Bgra8);
        };
        let mut data = Vec::with_capacity(bytes);
        for _ in 0..pixels {
            data.extend_from_slice(&bgra);
        }
        Self::from_raw(data, width, height, stride, PixelFormat::Bgra8)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Get the size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Check if the frame is empty (no data or zero-sized).
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() || self.width == 0 || self.height == 0
    }

    /// Whether this frame replaces the whole surface.
    pub fn is_full_frame(&self) -> bool {
        match self.dirty_rects.as_slice() {
            [] => true,
            [rect] => rect.x == 0 && rect.y == 0 && rect.width == self.width && rect.height == self.height,
            _ => false,
        }
    }

    /// Tightly packed RGBA rows, converting and removing row padding when needed.
    /// Rows missing from `data` are left out.
    pub fn to_rgba(&self) -> Cow<'_, [u8]> {
        let Some(row_len) = (self.width as usize).checked_mul(4) else {
            return Cow::Owned(Vec::new());
        };
        if self.format == PixelFormat::Rgba8 && self.stride as usize == row_len {
            return Cow::Borrowed(&self.data);
        }

        let capacity = row_len.saturating_mul(self.height as usize).min(self.data.len());
        let mut rgba = Vec::with_capacity(capacity);
        for row in 0..self.height as usize {
            let src = row
                .checked_mul(self.stride as usize)
                .and_then(|start| Some(start..start.checked_add(row_len)?))
                .and_then(|range| self.data.get(range));
            let Some(src) = src else {
                break;
            };
            rgba.extend_from_slice(src);
        }
        if self.format == PixelFormat::Bgra8 {
            for px in rgba.chunks_exact_mut(4) {
                // Swap B and R
                px.swap(0, 2);
            }
        }
        Cow::Owned(rgba)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solid_frame_is_tightly_packed() {
        let frame = FrameBuffer::solid(3, 2, [1, 2, 3, 255]);
        assert_eq!(frame.size_bytes(), 3 * 2 * 4);
        assert_eq!(frame.stride, 12);
        assert!(frame.is_full_frame());
        assert!(!frame.is_empty());
    }

    #[test]
    fn bgra_converts_to_rgba_and_drops_padding() {
        // 1x2 image with 8 bytes of stride: 4 bytes of pixel + 4 of padding per row.
        let data = vec![10, 20, 30, 40, 0, 0, 0, 0, 50, 60, 70, 80, 0, 0, 0, 0];
        let frame = FrameBuffer::from_raw(data, 1, 2, 8, PixelFormat::Bgra8);
        assert_eq!(frame.to_rgba().as_ref(), &[30, 20, 10, 40, 70, 60, 50, 80]);
    }

    #[test]
    fn packed_rgba_is_borrowed() {
        let frame = FrameBuffer::from_raw(vec![1, 2, 3, 4], 1, 1, 4, PixelFormat::Rgba8);
        assert!(matches!(frame.to_rgba(), Cow::Borrowed(_)));
    }

    #[test]
    fn partial_dirty_rect_is_not_full_frame() {
        let mut frame = FrameBuffer::solid(4, 4, [0; 4]);
        frame.dirty_rects = vec![DirtyRect { x: 0, y: 0, width: 2, height: 2 }];
        assert!(!frame.is_full_frame());
        frame.dirty_rects = vec![DirtyRect { x: 0, y: 0, width: 4, height: 4 }];
        assert!(frame.is_full_frame());
    }

    #[test]
    fn overflowing_dimensions_yield_empty_frame() {
        let frame = FrameBuffer::solid(u32::MAX, u32::MAX, [0; 4]);
        assert!(frame.is_empty());
        assert_eq!(frame.dimensions(), (0, 0));
    }

    #[test]
    fn short_data_converts_without_panicking() {
        let frame = FrameBuffer::from_raw(vec![1, 2, 3, 4], u32::MAX, 3, u32::MAX, PixelFormat::Bgra8);
        assert!(frame.to_rgba().is_empty());
    }
}
