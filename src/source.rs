//! Incremental frame byte delivery.
//!
//! A [`FrameSource`] hands out the encoded bytes of one frame at a time, in
//! chunks of whatever size storage produced them. When no more bytes are
//! available *right now* it answers [`ReadResult::Suspend`]; the capture
//! reports [`CaptureStatus::Suspended`](crate::CaptureStatus::Suspended) and
//! is re-invoked once the source has more.

use std::ops::Range;

use crate::error::StillFrameError;
use crate::track::Frame;

/// Outcome of one [`FrameSource::read`] call.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadResult<'a> {
    /// A chunk of the current frame.
    Data {
        /// Bytes delivered by this call.
        chunk: &'a [u8],
        /// `true` if this chunk completes the frame.
        frame_done: bool,
    },
    /// No bytes are available yet; try again later.
    Suspend,
}

/// Supplies encoded frame bytes incrementally.
pub trait FrameSource {
    /// Begin delivering the bytes of `frame`.
    ///
    /// `time_limit` bounds how far in the track time base the source may read
    /// ahead; `u64::MAX` means no limit.
    fn start_frame(&mut self, frame: &Frame, time_limit: u64) -> Result<(), StillFrameError>;

    /// Deliver the next chunk of the started frame.
    fn read(&mut self) -> Result<ReadResult<'_>, StillFrameError>;
}

impl<S: FrameSource + ?Sized> FrameSource for &mut S {
    fn start_frame(&mut self, frame: &Frame, time_limit: u64) -> Result<(), StillFrameError> {
        (**self).start_frame(frame, time_limit)
    }

    fn read(&mut self) -> Result<ReadResult<'_>, StillFrameError> {
        (**self).read()
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn start_frame(&mut self, frame: &Frame, time_limit: u64) -> Result<(), StillFrameError> {
        (**self).start_frame(frame, time_limit)
    }

    fn read(&mut self) -> Result<ReadResult<'_>, StillFrameError> {
        (**self).read()
    }
}

/// A frame source over bytes held in memory.
///
/// Frames are located by [`Frame::offset`] and [`Frame::size`]. Delivery can
/// be shaped to exercise a capture the way slow storage would:
///
/// - [`with_chunk_size`](MemoryFrameSource::with_chunk_size) splits frames
///   into chunks of at most that many bytes.
/// - [`with_available_bytes`](MemoryFrameSource::with_available_bytes) sets a
///   watermark; bytes past it suspend until
///   [`make_available`](MemoryFrameSource::make_available) raises it.
/// - [`with_suspend_every`](MemoryFrameSource::with_suspend_every) forces a
///   suspension after every N chunks.
///
/// # Example
///
/// ```
/// use stillframe::{Frame, FrameSource, MemoryFrameSource, ReadResult};
///
/// let mut source = MemoryFrameSource::new(b"abcdef".to_vec()).with_chunk_size(4);
/// source.start_frame(&Frame::new(0, 6, 1, 0, true), u64::MAX)?;
/// assert_eq!(source.read()?, ReadResult::Data { chunk: b"abcd", frame_done: false });
/// assert_eq!(source.read()?, ReadResult::Data { chunk: b"ef", frame_done: true });
/// # Ok::<(), stillframe::StillFrameError>(())
/// ```
#[derive(Debug, Clone)]
pub struct MemoryFrameSource {
    storage: Vec<u8>,
    chunk_size: usize,
    available: Option<usize>,
    suspend_every: Option<usize>,
    chunks_since_suspend: usize,
    current: Option<Range<usize>>,
}

impl MemoryFrameSource {
    /// Create a source over `storage`, delivering each frame in one chunk.
    pub fn new(storage: Vec<u8>) -> Self {
        Self {
            storage,
            chunk_size: usize::MAX,
            available: None,
            suspend_every: None,
            chunks_since_suspend: 0,
            current: None,
        }
    }

    /// Limit chunks to `chunk_size` bytes (at least 1).
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Only the first `bytes` bytes of storage are readable until
    /// [`make_available`](MemoryFrameSource::make_available) is called.
    #[must_use]
    pub fn with_available_bytes(mut self, bytes: usize) -> Self {
        self.available = Some(bytes);
        self
    }

    /// Suspend once after every `chunks` delivered chunks.
    #[must_use]
    pub fn with_suspend_every(mut self, chunks: usize) -> Self {
        self.suspend_every = Some(chunks.max(1));
        self
    }

    /// Append a frame payload to storage and return its offset.
    pub fn append(&mut self, payload: &[u8]) -> u64 {
        let offset = self.storage.len() as u64;
        self.storage.extend_from_slice(payload);
        offset
    }

    /// Raise the availability watermark to `bytes`.
    pub fn make_available(&mut self, bytes: usize) {
        self.available = Some(self.available.map_or(bytes, |current| current.max(bytes)));
    }

    /// Make all of storage readable.
    pub fn make_all_available(&mut self) {
        self.available = None;
    }

    /// Total bytes held in storage.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Returns `true` if storage is empty.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    fn readable_end(&self) -> usize {
        self.available
            .map_or(self.storage.len(), |available| available.min(self.storage.len()))
    }
}

impl FrameSource for MemoryFrameSource {
    fn start_frame(&mut self, frame: &Frame, _time_limit: u64) -> Result<(), StillFrameError> {
        let start = usize::try_from(frame.offset)
            .map_err(|_| StillFrameError::FrameSource(format!("offset {} too large", frame.offset)))?;
        let end = start + frame.size as usize;
        if end > self.storage.len() {
            return Err(StillFrameError::FrameSource(format!(
                "frame at {}..{} is past the end of storage ({} bytes)",
                start,
                end,
                self.storage.len()
            )));
        }
        self.current = Some(start..end);
        Ok(())
    }

    fn read(&mut self) -> Result<ReadResult<'_>, StillFrameError> {
        let readable_end = self.readable_end();
        let Some(range) = self.current.as_mut() else {
            return Err(StillFrameError::FrameSource(
                "read before start_frame".to_string(),
            ));
        };

        if range.is_empty() {
            return Ok(ReadResult::Data {
                chunk: &[],
                frame_done: true,
            });
        }

        if let Some(every) = self.suspend_every {
            if self.chunks_since_suspend >= every {
                self.chunks_since_suspend = 0;
                return Ok(ReadResult::Suspend);
            }
        }

        let end = range.end.min(readable_end);
        if range.start >= end {
            return Ok(ReadResult::Suspend);
        }

        let take = self.chunk_size.min(end - range.start);
        let chunk = range.start..range.start + take;
        range.start += take;
        let frame_done = range.is_empty();
        self.chunks_since_suspend += 1;

        log::trace!("Delivering {} bytes (frame_done={})", take, frame_done);
        Ok(ReadResult::Data {
            chunk: &self.storage[chunk],
            frame_done,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(offset: u64, size: u32) -> Frame {
        Frame::new(offset, size, 1, 0, true)
    }

    #[test]
    fn delivers_whole_frames_by_default() {
        let mut source = MemoryFrameSource::new(b"xxhello".to_vec());
        source.start_frame(&frame(2, 5), u64::MAX).unwrap();
        assert_eq!(
            source.read().unwrap(),
            ReadResult::Data {
                chunk: b"hello",
                frame_done: true
            }
        );
    }

    #[test]
    fn watermark_suspends_until_raised() {
        let mut source = MemoryFrameSource::new(b"0123456789".to_vec())
            .with_chunk_size(3)
            .with_available_bytes(4);
        source.start_frame(&frame(0, 10), u64::MAX).unwrap();

        assert_eq!(
            source.read().unwrap(),
            ReadResult::Data {
                chunk: b"012",
                frame_done: false
            }
        );
        assert_eq!(
            source.read().unwrap(),
            ReadResult::Data {
                chunk: b"3",
                frame_done: false
            }
        );
        assert_eq!(source.read().unwrap(), ReadResult::Suspend);

        source.make_all_available();
        assert_eq!(
            source.read().unwrap(),
            ReadResult::Data {
                chunk: b"456",
                frame_done: false
            }
        );
    }

    #[test]
    fn forced_suspension_every_n_chunks() {
        let mut source = MemoryFrameSource::new(b"abcd".to_vec())
            .with_chunk_size(1)
            .with_suspend_every(2);
        source.start_frame(&frame(0, 4), u64::MAX).unwrap();

        assert!(matches!(source.read().unwrap(), ReadResult::Data { .. }));
        assert!(matches!(source.read().unwrap(), ReadResult::Data { .. }));
        assert_eq!(source.read().unwrap(), ReadResult::Suspend);
        assert!(matches!(source.read().unwrap(), ReadResult::Data { .. }));
    }

    #[test]
    fn frame_past_storage_is_rejected() {
        let mut source = MemoryFrameSource::new(vec![0; 4]);
        assert!(matches!(
            source.start_frame(&frame(2, 8), u64::MAX),
            Err(StillFrameError::FrameSource(_))
        ));
    }

    #[test]
    fn read_without_start_is_an_error() {
        let mut source = MemoryFrameSource::new(vec![0; 4]);
        assert!(source.read().is_err());
    }

    #[test]
    fn append_returns_offsets() {
        let mut source = MemoryFrameSource::new(Vec::new());
        assert_eq!(source.append(b"abc"), 0);
        assert_eq!(source.append(b"de"), 3);
        assert_eq!(source.len(), 5);
    }
}
