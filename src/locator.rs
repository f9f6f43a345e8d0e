//! Nearest-frame location.
//!
//! Maps a requested presentation time onto the frame closest to it, anchored
//! to the key frame the decoder has to start from. Pure computation over the
//! in-memory [`FrameIndex`](crate::FrameIndex); no I/O.

use crate::error::StillFrameError;
use crate::track::Track;

/// Where decoding has to start and how far it has to go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekTarget {
    /// Frames to feed to the decoder before the target, counted from the
    /// anchoring key frame. Zero means the key frame itself is the target.
    pub skip_count: usize,
    /// Largest frame size in the seek window (`skip_count + 1` frames from the
    /// key frame), used to size the frame assembly buffer.
    pub max_frame_size: u32,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: u64,
    key_frame: usize,
    frame: usize,
}

/// Find the frame closest to `requested_time` and truncate the track's frame
/// index so that it starts at the key frame that frame depends on.
///
/// `requested_time` is in the track time base. It is shifted by the first
/// frame's presentation delay so it lines up with the track's own
/// presentation origin.
///
/// Frames before the first key frame are never candidates. When two frames
/// are equally close, the one met first in decode order wins.
///
/// Truncation only moves the index's logical start, and the dropped prefix's
/// duration is carried along, so running this again with the same time on the
/// truncated track yields the same target.
///
/// # Errors
///
/// Returns [`StillFrameError::NoFramesFound`] if the index is empty or holds
/// no key frame.
pub fn locate(track: &mut Track, requested_time: u64) -> Result<SeekTarget, StillFrameError> {
    let origin_delay = track
        .frames
        .all()
        .first()
        .map(|frame| u64::from(frame.pts_delay))
        .ok_or(StillFrameError::NoFramesFound)?;
    let requested_time = requested_time.saturating_add(origin_delay);

    let mut dts = track.clip_start_time
        + track.first_frame_time_offset
        + track.frames.skipped_duration();
    let mut last_key_frame: Option<usize> = None;
    let mut best: Option<Candidate> = None;

    for (index, frame) in track.frames.frames().iter().enumerate() {
        if frame.key_frame {
            last_key_frame = Some(index);
        }

        let pts = dts + u64::from(frame.pts_delay);
        let distance = pts.abs_diff(requested_time);
        if let Some(key_frame) = last_key_frame {
            if best.is_none_or(|candidate| distance < candidate.distance) {
                best = Some(Candidate {
                    distance,
                    key_frame,
                    frame: index,
                });
            }
        }

        dts += u64::from(frame.duration);
    }

    let Some(best) = best else {
        log::error!("Did not find any frames to seek to");
        return Err(StillFrameError::NoFramesFound);
    };

    track.frames.truncate_front(best.key_frame);
    let skip_count = best.frame - best.key_frame;
    let max_frame_size = track.frames.max_frame_size(skip_count + 1);

    log::debug!(
        "Seek target: key frame {} + {} frames (distance={}, max_frame_size={})",
        track.frames.start(),
        skip_count,
        best.distance,
        max_frame_size
    );

    Ok(SeekTarget {
        skip_count,
        max_frame_size,
    })
}
