//! Nearest-frame locator tests through the public API.

mod common;

use common::media_info;
use stillframe::{CodecId, Frame, FrameIndex, SeekTarget, StillFrameError, Track, locate};

/// Frames with the given durations and key flags; sizes grow with the index.
fn track(durations: &[u32], keys: &[bool]) -> Track {
    let frames: FrameIndex = durations
        .iter()
        .zip(keys)
        .enumerate()
        .map(|(index, (&duration, &key_frame))| {
            Frame::new(0, 100 + index as u32, duration, 0, key_frame)
        })
        .collect();
    Track::new(media_info(CodecId::Hevc), frames)
}

/// Presentation times of every frame in the untruncated index.
fn presentation_times(track: &Track) -> Vec<u64> {
    let mut dts = track.clip_start_time + track.first_frame_time_offset;
    track
        .frames
        .all()
        .iter()
        .map(|frame| {
            let pts = dts + u64::from(frame.pts_delay);
            dts += u64::from(frame.duration);
            pts
        })
        .collect()
}

#[test]
fn equidistant_frames_keep_the_earlier_one() {
    let mut track = track(&[40; 4], &[true, false, true, false]);
    let target = locate(&mut track, 100).expect("locate");

    assert_eq!(
        target,
        SeekTarget {
            skip_count: 0,
            max_frame_size: 102
        }
    );
    assert_eq!(track.frames.start(), 2);
    assert_eq!(track.frames.len(), 2);
    assert_eq!(track.frames.all().len(), 4);
}

#[test]
fn requests_before_the_first_key_frame_pick_it() {
    for requested_time in [0, 1, 19] {
        let mut track = track(&[40; 6], &[false, true, false, false, true, false]);
        // Frame 1 starts at 40; frame 0 is not decodable on its own.
        let target = locate(&mut track, requested_time).expect("locate");
        assert_eq!(target.skip_count, 0);
        assert_eq!(track.frames.start(), 1);
    }
}

#[test]
fn requests_past_the_end_pick_the_last_frame() {
    let mut track = track(&[40; 5], &[true, false, false, true, false]);
    let target = locate(&mut track, 1_000_000).expect("locate");

    assert_eq!(track.frames.start(), 3);
    assert_eq!(target.skip_count, 1);
    assert_eq!(target.max_frame_size, 104);
}

#[test]
fn variable_durations_are_accumulated() {
    let mut track = track(&[10, 10, 100, 10, 10], &[true, false, false, false, false]);
    // Presentation times: 0, 10, 20, 120, 130.
    let target = locate(&mut track, 118).expect("locate");
    assert_eq!(target.skip_count, 3);
}

#[test]
fn clip_offsets_shift_the_timeline() {
    let mut track = track(&[40; 4], &[true, false, false, false]);
    track.clip_start_time = 1_000;
    track.first_frame_time_offset = 20;

    let target = locate(&mut track, 1_100).expect("locate");
    // Presentation times: 1020, 1060, 1100, 1140.
    assert_eq!(target.skip_count, 2);
}

#[test]
fn selected_frame_is_nearest_among_reachable_frames() {
    let keys = [false, true, false, false, true, false, false, false, true, false];
    let durations = [33, 33, 34, 33, 33, 34, 33, 33, 34, 33];

    for requested_time in (0..400).step_by(7) {
        let mut track = track(&durations, &keys);
        let times = presentation_times(&track);
        let first_key = keys.iter().position(|&key| key).unwrap_or(0);

        let target = locate(&mut track, requested_time).expect("locate");
        let selected = track.frames.start() + target.skip_count;
        let distance = times[selected].abs_diff(requested_time);

        for (index, time) in times.iter().enumerate().skip(first_key) {
            assert!(
                distance <= time.abs_diff(requested_time),
                "request {requested_time}: frame {selected} loses to frame {index}"
            );
        }
        assert!(keys[track.frames.start()]);
        assert!(keys[track.frames.start() + 1..=selected].iter().all(|&key| !key));
    }
}

#[test]
fn truncated_index_yields_the_same_target() {
    let keys = [true, false, false, true, false, false, true];
    for requested_time in [0, 45, 130, 150, 260, 500] {
        let mut track = track(&[40; 7], &keys);
        let first = locate(&mut track, requested_time).expect("first");
        let start = track.frames.start();

        let second = locate(&mut track, requested_time).expect("second");
        assert_eq!(first, second);
        assert_eq!(track.frames.start(), start);
    }
}

#[test]
fn empty_and_keyless_indexes_fail() {
    let mut empty = track(&[], &[]);
    assert!(matches!(
        locate(&mut empty, 0),
        Err(StillFrameError::NoFramesFound)
    ));

    let mut keyless = track(&[40; 3], &[false; 3]);
    let error = locate(&mut keyless, 40).expect_err("no key frame");
    assert!(error.is_client_error());
    assert_eq!(keyless.frames.start(), 0);
}
