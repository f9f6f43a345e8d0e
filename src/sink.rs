//! Output sink for the encoded still image.

use crate::error::StillFrameError;

/// Receives the encoded thumbnail.
///
/// [`write`](ThumbnailSink::write) is called exactly once per successful
/// capture, with the whole image as one contiguous buffer. Whatever it
/// returns is what the capture returns.
pub trait ThumbnailSink {
    /// Consume the encoded image.
    fn write(&mut self, image: &[u8]) -> Result<(), StillFrameError>;
}

impl ThumbnailSink for Vec<u8> {
    fn write(&mut self, image: &[u8]) -> Result<(), StillFrameError> {
        self.extend_from_slice(image);
        Ok(())
    }
}

impl<F> ThumbnailSink for F
where
    F: FnMut(&[u8]) -> Result<(), StillFrameError>,
{
    fn write(&mut self, image: &[u8]) -> Result<(), StillFrameError> {
        self(image)
    }
}
