//! Error types for the `stillframe` crate.
//!
//! [`StillFrameError`] is the single error type returned by every fallible
//! operation. A capture that merely has to wait for more frame bytes is *not*
//! an error: see [`CaptureStatus::Suspended`](crate::CaptureStatus::Suspended).

use thiserror::Error;

use crate::codec::CodecId;

/// The unified error type for all `stillframe` operations.
///
/// No variant is retried internally. A failed capture is a best-effort single
/// attempt; retry policy belongs to whoever issues a fresh request.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StillFrameError {
    /// No decode capability was registered for the track's codec.
    #[error("No decoder available for codec {0}")]
    UnsupportedCodec(CodecId),

    /// Thumbnail capture is disabled process-wide because the still-image
    /// encoder could not be found during registry initialisation.
    #[error("Thumbnail capture is disabled: no still-image encoder available")]
    CaptureDisabled,

    /// The frame index is empty or contains no key frame to anchor a seek.
    #[error("Did not find any frames to seek to")]
    NoFramesFound,

    /// A buffer or codec object could not be allocated.
    #[error("Allocation failed: {0}")]
    ResourceExhausted(String),

    /// A decode or encode session could not be opened.
    #[error("Failed to open {kind} session: {reason}")]
    CodecInitFailed {
        /// Which session failed: `"decoder"` or `"encoder"`.
        kind: &'static str,
        /// Underlying reason reported by the codec library.
        reason: String,
    },

    /// The frame source ran dry before any data was processed, which points
    /// at truncated storage.
    #[error("No data was handled, probably a truncated file (frame {frame_index})")]
    MalformedInput {
        /// Index of the frame being read, relative to the seek key frame.
        frame_index: usize,
    },

    /// The decoder rejected a packet.
    #[error("Failed to decode frame {frame_index}: {reason}")]
    DecodeError {
        /// Index of the frame being decoded, relative to the seek key frame.
        frame_index: usize,
        /// Underlying reason reported by the decoder.
        reason: String,
    },

    /// A flush submission produced no picture although the decoder still
    /// held buffered input.
    #[error("Decoder did not return a frame while flushing ({outstanding} outstanding)")]
    DecodeStalled {
        /// Number of submissions still expected to surface a picture.
        outstanding: u32,
    },

    /// The still-image encoder rejected the picture.
    #[error("Failed to encode thumbnail: {0}")]
    EncodeError(String),

    /// The still-image encoder accepted the picture but produced no packet.
    #[error("Encoder did not return a packet")]
    EncodeProducedNothing,

    /// The frame source failed outright (as opposed to suspending).
    #[error("Frame source error: {0}")]
    FrameSource(String),

    /// The output sink rejected the encoded image.
    #[error("Thumbnail sink error: {0}")]
    Sink(String),

    /// The capture already completed or failed; the state object cannot be
    /// driven any further.
    #[error("Capture already finished")]
    CaptureFinished,
}

impl StillFrameError {
    /// Returns `true` for errors caused by the request itself rather than by
    /// the media, the codecs or the host.
    ///
    /// These map to a "bad request" class in a serving layer and must not be
    /// retried with the same parameters.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            StillFrameError::UnsupportedCodec(_) | StillFrameError::NoFramesFound
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_classified() {
        assert!(StillFrameError::UnsupportedCodec(CodecId::Vp8).is_client_error());
        assert!(StillFrameError::NoFramesFound.is_client_error());
        assert!(!StillFrameError::EncodeProducedNothing.is_client_error());
        assert!(!StillFrameError::MalformedInput { frame_index: 0 }.is_client_error());
    }

    #[test]
    fn messages_carry_context() {
        let error = StillFrameError::DecodeStalled { outstanding: 2 };
        assert!(error.to_string().contains("2 outstanding"));

        let error = StillFrameError::UnsupportedCodec(CodecId::Hevc);
        assert!(error.to_string().contains("h265"), "{error}");
    }
}
