//! Still-image encoding of the target picture.

use crate::codec::StillEncoder;
use crate::error::StillFrameError;
use crate::sink::ThumbnailSink;

/// Encodes the decoded target picture and hands the image to the sink.
#[derive(Debug)]
pub struct ThumbnailEmitter<W> {
    sink: W,
}

impl<W: ThumbnailSink> ThumbnailEmitter<W> {
    /// Wrap the caller's output sink.
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    /// Encode `picture` and write the result to the sink once.
    ///
    /// A single still-image encode is expected to be synchronous, so an
    /// encoder that swallows the picture is a failure, not a reason to wait.
    ///
    /// # Errors
    ///
    /// - [`StillFrameError::EncodeError`] if the encoder rejects the picture.
    /// - [`StillFrameError::EncodeProducedNothing`] if it yields no packet.
    /// - Whatever the sink returns.
    pub fn emit<P, E>(&mut self, encoder: &mut E, picture: &P) -> Result<usize, StillFrameError>
    where
        E: StillEncoder<P>,
    {
        let image = match encoder.encode(picture) {
            Ok(Some(image)) => image,
            Ok(None) => {
                log::error!("Encoder did not return a packet");
                return Err(StillFrameError::EncodeProducedNothing);
            }
            Err(error) => {
                log::error!("Failed to encode thumbnail: {}", error);
                return Err(StillFrameError::EncodeError(error.to_string()));
            }
        };

        let size = image.len();
        self.sink.write(image)?;
        log::debug!("Wrote {} byte thumbnail", size);
        Ok(size)
    }

    /// The wrapped sink.
    pub fn sink(&self) -> &W {
        &self.sink
    }

    /// Unwrap the sink.
    pub fn into_sink(self) -> W {
        self.sink
    }
}
