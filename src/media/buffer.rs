use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::time::Timestamp;

/// Pixel layout of a raw video frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 8-bit alpha, red, green, blue
    Argb32,
    /// 8-bit blue, green, red, alpha
    Bgra32,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        4
    }
}

/// A raw video frame owned by the capture side
///
/// Pixel memory is only reachable through a lock guard, mirroring how capture
/// frameworks require the base address to be locked while it is read.
/// Clones share the same pixel memory.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    bytes_per_row: usize,
    data: Arc<RwLock<Vec<u8>>>,
}

impl PixelBuffer {
    /// Allocate a zeroed, tightly packed buffer
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let bytes_per_row = width as usize * format.bytes_per_pixel();
        let data = vec![0u8; bytes_per_row * height as usize];
        Self::from_vec(width, height, format, bytes_per_row, data)
    }

    pub fn from_vec(
        width: u32,
        height: u32,
        format: PixelFormat,
        bytes_per_row: usize,
        data: Vec<u8>,
    ) -> Self {
        Self {
            width,
            height,
            format,
            bytes_per_row,
            data: Arc::new(RwLock::new(data)),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn bytes_per_row(&self) -> usize {
        self.bytes_per_row
    }

    /// Lock the pixel memory for reading. Released when the guard drops.
    pub fn lock_read(&self) -> PixelReadGuard<'_> {
        PixelReadGuard {
            buffer: self,
            data: self.data.read(),
        }
    }

    /// Lock the pixel memory for writing (used by producers filling frames)
    pub fn lock_write(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.data.write()
    }

    /// Whether a reader or writer currently holds the pixel lock
    pub fn is_locked(&self) -> bool {
        self.data.is_locked()
    }
}

/// Read-only view of a locked [`PixelBuffer`]
pub struct PixelReadGuard<'a> {
    buffer: &'a PixelBuffer,
    data: RwLockReadGuard<'a, Vec<u8>>,
}

impl PixelReadGuard<'_> {
    pub fn width(&self) -> u32 {
        self.buffer.width
    }

    pub fn height(&self) -> u32 {
        self.buffer.height
    }

    pub fn format(&self) -> PixelFormat {
        self.buffer.format
    }

    pub fn bytes_per_row(&self) -> usize {
        self.buffer.bytes_per_row
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

/// A buffer of interleaved 16-bit PCM with its embedded presentation time
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Presentation time of the first sample
    pub presentation_time: Timestamp,
}

impl AudioBuffer {
    /// Number of sample frames (samples per channel)
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }
}

/// A captured video sample carrying its own presentation time
///
/// Capture callbacks may deliver samples without an image (status-only
/// samples); those carry `image: None`.
#[derive(Debug, Clone)]
pub struct VideoSample {
    pub presentation_time: Timestamp,
    pub image: Option<PixelBuffer>,
}

impl VideoSample {
    pub fn new(image: PixelBuffer, presentation_time: Timestamp) -> Self {
        Self {
            presentation_time,
            image: Some(image),
        }
    }
}
