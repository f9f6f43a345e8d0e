//! # stillframe
//!
//! Grab one still-image thumbnail from an already-demuxed video track at a
//! requested time.
//!
//! The caller owns the frame index ([`Track`]) and the storage the frame bytes
//! come from ([`FrameSource`]). `stillframe` picks the frame closest to the
//! requested time, decodes forward from the key frame it depends on while the
//! bytes trickle in, and hands one MJPEG image to a [`ThumbnailSink`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use stillframe::{
//!     CaptureOptions, CaptureStatus, CodecId, CodecRegistry, Frame, FrameIndex,
//!     MediaInfo, MemoryFrameSource, RegistryOptions, ThumbnailCapture, Track,
//! };
//!
//! let registry = CodecRegistry::initialize(&RegistryOptions::default())?;
//!
//! let mut source = MemoryFrameSource::new(Vec::new());
//! let mut frames = FrameIndex::new();
//! # let encoded_frames: Vec<Vec<u8>> = Vec::new();
//! for (index, payload) in encoded_frames.iter().enumerate() {
//!     let offset = source.append(payload);
//!     frames.push(Frame::new(offset, payload.len() as u32, 3000, 0, index % 30 == 0));
//! }
//!
//! let media_info = MediaInfo {
//!     codec_id: CodecId::Avc,
//!     codec_tag: 0,
//!     width: 1280,
//!     height: 720,
//!     timescale: 90_000,
//!     extra_data: Vec::new(),
//! };
//! let mut track = Track::new(media_info, frames);
//! let requested_time = track.time_from_millis(10_000);
//!
//! let mut capture = ThumbnailCapture::new(
//!     registry,
//!     &mut track,
//!     requested_time,
//!     source,
//!     Vec::new(),
//!     CaptureOptions::default(),
//! )?;
//! while capture.process()? == CaptureStatus::Suspended {
//!     // Wait for the frame source to receive more bytes.
//! }
//! std::fs::write("thumb.jpg", capture.into_sink())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Process-wide set-up
//!
//! [`CodecRegistry::initialize`] must run once before any capture. It probes
//! which decoders exist and whether the MJPEG encoder exists. Check
//! [`CapabilitySet::is_capture_enabled`] before accepting thumbnail requests.
//!
//! ## Custom codecs
//!
//! The pipeline depends on the [`VideoDecoder`] and [`StillEncoder`] traits
//! and opens sessions through a [`SessionFactory`]. The FFmpeg-backed
//! implementation lives in [`ffmpeg`].

pub mod codec;
pub mod emitter;
pub mod error;
pub mod ffmpeg;
pub mod locator;
pub mod options;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod track;

pub use codec::{
    CapabilitySet, CodecId, CodecRegistry, CodecSessions, DecodePacket, RegistryOptions,
    SessionFactory, StillEncoder, VideoDecoder,
};
pub use emitter::ThumbnailEmitter;
pub use error::StillFrameError;
pub use ffmpeg::{FfmpegDecoder, FfmpegStillEncoder};
pub use locator::{SeekTarget, locate};
pub use options::CaptureOptions;
pub use pipeline::{CaptureStatus, ThumbnailCapture};
pub use sink::ThumbnailSink;
pub use source::{FrameSource, MemoryFrameSource, ReadResult};
pub use track::{Frame, FrameIndex, MediaInfo, Track};
