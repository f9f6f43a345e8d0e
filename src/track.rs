//! Frame index data model.
//!
//! A [`Track`] describes one already-demuxed video stream: its codec
//! parameters ([`MediaInfo`]), its clip timing, and an ordered
//! [`FrameIndex`] of [`Frame`] records in decode order. The frame bytes
//! themselves live elsewhere and are delivered by a
//! [`FrameSource`](crate::FrameSource).

use crate::codec::CodecId;

/// One encoded video frame, in decode order.
///
/// All times are in the track's time base (`1 / MediaInfo::timescale`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Frame {
    /// Byte position of the frame's data in storage.
    pub offset: u64,
    /// Encoded size in bytes.
    pub size: u32,
    /// Decode duration.
    pub duration: u32,
    /// Presentation delay relative to the decode timestamp.
    pub pts_delay: u32,
    /// Whether the decoder can start from this frame.
    pub key_frame: bool,
}

impl Frame {
    /// Create a frame record.
    pub fn new(offset: u64, size: u32, duration: u32, pts_delay: u32, key_frame: bool) -> Self {
        Self {
            offset,
            size,
            duration,
            pts_delay,
            key_frame,
        }
    }
}

/// An owned, append-only sequence of frames with a logical start.
///
/// Truncation never removes records. It moves the logical start forward and
/// remembers how much decode time the hidden prefix covered, so presentation
/// times of the remaining frames are unchanged and the full index stays
/// available through [`all`](FrameIndex::all).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameIndex {
    frames: Vec<Frame>,
    start: usize,
    skipped_duration: u64,
}

impl FrameIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame at the end of the index.
    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    /// Frames from the logical start onward.
    pub fn frames(&self) -> &[Frame] {
        &self.frames[self.start..]
    }

    /// Every frame ever pushed, including the truncated prefix.
    pub fn all(&self) -> &[Frame] {
        &self.frames
    }

    /// Number of frames from the logical start onward.
    pub fn len(&self) -> usize {
        self.frames.len() - self.start
    }

    /// Returns `true` if no frames remain after the logical start.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Absolute position of the logical start within [`all`](FrameIndex::all).
    pub fn start(&self) -> usize {
        self.start
    }

    /// Total decode duration of the frames hidden by truncation.
    pub fn skipped_duration(&self) -> u64 {
        self.skipped_duration
    }

    /// Drop the first `count` visible frames.
    ///
    /// `count` is relative to the current logical start and is clamped to
    /// the number of visible frames.
    pub fn truncate_front(&mut self, count: usize) {
        let count = count.min(self.len());
        let dropped = &self.frames[self.start..self.start + count];
        self.skipped_duration += dropped
            .iter()
            .map(|frame| u64::from(frame.duration))
            .sum::<u64>();
        self.start += count;
    }

    /// Largest frame size among the first `limit` visible frames.
    pub fn max_frame_size(&self, limit: usize) -> u32 {
        self.frames()
            .iter()
            .take(limit)
            .map(|frame| frame.size)
            .max()
            .unwrap_or(0)
    }
}

impl FromIterator<Frame> for FrameIndex {
    fn from_iter<I: IntoIterator<Item = Frame>>(iter: I) -> Self {
        Self {
            frames: iter.into_iter().collect(),
            start: 0,
            skipped_duration: 0,
        }
    }
}

/// Codec and geometry parameters of a video track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaInfo {
    /// Codec of the encoded frames.
    pub codec_id: CodecId,
    /// Container-level codec tag (fourcc), passed to the decoder verbatim.
    pub codec_tag: u32,
    /// Nominal picture width in pixels.
    pub width: u32,
    /// Nominal picture height in pixels.
    pub height: u32,
    /// Ticks per second of the frame timestamps.
    pub timescale: u32,
    /// Codec-specific configuration record (avcC, hvcC, ...).
    pub extra_data: Vec<u8>,
}

/// A demuxed video track ready for thumbnail capture.
#[derive(Debug, Clone)]
pub struct Track {
    /// Codec and geometry parameters.
    pub media_info: MediaInfo,
    /// Start of the served clip, in the track time base.
    pub clip_start_time: u64,
    /// Decode time of the first frame relative to the clip start.
    pub first_frame_time_offset: u64,
    /// Frames in decode order.
    pub frames: FrameIndex,
}

impl Track {
    /// Create a track with no clip offsets.
    pub fn new(media_info: MediaInfo, frames: FrameIndex) -> Self {
        Self {
            media_info,
            clip_start_time: 0,
            first_frame_time_offset: 0,
            frames,
        }
    }

    /// Convert a millisecond position to the track time base.
    pub fn time_from_millis(&self, millis: u64) -> u64 {
        let scaled = u128::from(millis) * u128::from(self.media_info.timescale) / 1000;
        u64::try_from(scaled).unwrap_or(u64::MAX)
    }
}
