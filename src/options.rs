//! Capture configuration.
//!
//! [`CaptureOptions`] is a small builder for the per-request knobs of a
//! [`ThumbnailCapture`](crate::ThumbnailCapture). Encoder settings are not
//! part of it: the still-image encoder is always MJPEG at the decoder's
//! geometry.
//!
//! # Example
//!
//! ```
//! use stillframe::CaptureOptions;
//!
//! let options = CaptureOptions::new()
//!     .with_input_padding(32)
//!     .with_frame_time_limit(90_000);
//! assert_eq!(options.input_padding(), 32);
//! ```

use crate::ffmpeg::INPUT_PADDING;

/// Per-request capture settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureOptions {
    pub(crate) input_padding: usize,
    pub(crate) frame_time_limit: u64,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureOptions {
    /// Create options with default settings.
    ///
    /// Defaults: FFmpeg's input padding (64 bytes) and no frame time limit.
    pub fn new() -> Self {
        Self {
            input_padding: INPUT_PADDING,
            frame_time_limit: u64::MAX,
        }
    }

    /// Set how many zeroed bytes follow each frame assembled from chunks.
    #[must_use]
    pub fn with_input_padding(mut self, bytes: usize) -> Self {
        self.input_padding = bytes;
        self
    }

    /// Set the read-ahead limit passed to
    /// [`FrameSource::start_frame`](crate::FrameSource::start_frame).
    #[must_use]
    pub fn with_frame_time_limit(mut self, limit: u64) -> Self {
        self.frame_time_limit = limit;
        self
    }

    /// Zeroed bytes reserved after each assembled frame.
    pub fn input_padding(&self) -> usize {
        self.input_padding
    }

    /// Read-ahead limit passed to the frame source.
    pub fn frame_time_limit(&self) -> u64 {
        self.frame_time_limit
    }
}
