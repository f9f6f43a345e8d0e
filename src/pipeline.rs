//! The resumable decode/re-encode state machine.
//!
//! A [`ThumbnailCapture`] is created per request. It locates the target frame,
//! opens the codec sessions, and is then driven by repeated calls to
//! [`process`](ThumbnailCapture::process). Each call runs until the frame
//! source has no more bytes for now ([`CaptureStatus::Suspended`]), the target
//! frame has been decoded, encoded and written ([`CaptureStatus::Complete`]),
//! or an error ends the capture.
//!
//! ```text
//! NeedFrameStart -> Reading -> (chunk, frame incomplete) -> Reading
//!                           -> (frame complete) -> decode
//!                                -> skip_count > 0: NeedFrameStart
//!                                -> skip_count == 0: flush, encode, Done
//! ```
//!
//! All progress lives in the capture object, so resuming is a plain call to
//! `process` with nothing replayed.

use crate::codec::{
    CodecSessions, DecodePacket, SessionFactory, StillEncoder, VideoDecoder, ensure_supported,
};
use crate::emitter::ThumbnailEmitter;
use crate::error::StillFrameError;
use crate::locator::locate;
use crate::options::CaptureOptions;
use crate::sink::ThumbnailSink;
use crate::source::{FrameSource, ReadResult};
use crate::track::{Frame, Track};

/// Result of one [`ThumbnailCapture::process`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    /// The frame source ran out of bytes for now. Call `process` again once
    /// it has more.
    Suspended,
    /// The thumbnail was written to the sink.
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    NeedFrameStart,
    Reading,
    Done,
}

/// Position of the capture within the seek window.
#[derive(Debug, Clone, Copy, Default)]
struct Cursor {
    /// Index of the current frame, relative to the seek key frame.
    position: usize,
    /// Decode timestamp of the next frame submitted to the decoder.
    dts: u64,
    /// Frames left to decode before the target.
    skip_count: usize,
    /// Frames submitted whose picture has not come out yet.
    missing_frames: u32,
}

/// Frame staging space with room for the padding, allocated on first use.
#[derive(Debug, Default)]
struct AssemblyBuffer {
    data: Vec<u8>,
    position: usize,
    padding_backup: Vec<u8>,
}

impl AssemblyBuffer {
    fn append(
        &mut self,
        chunk: &[u8],
        max_frame_size: usize,
        padding: usize,
    ) -> Result<(), StillFrameError> {
        if self.data.is_empty() {
            let capacity = max_frame_size + padding;
            self.data.try_reserve_exact(capacity).map_err(|_| {
                StillFrameError::ResourceExhausted(format!("{capacity} byte frame buffer"))
            })?;
            self.data.resize(capacity, 0);
            log::debug!("Allocated {} byte frame buffer", capacity);
        }

        let end = self.position + chunk.len();
        if end > max_frame_size {
            return Err(StillFrameError::FrameSource(format!(
                "frame data exceeds the indexed maximum of {max_frame_size} bytes"
            )));
        }
        self.data[self.position..end].copy_from_slice(chunk);
        self.position = end;
        Ok(())
    }

    /// Hand the assembled frame to `decode` with zeroed padding after it,
    /// restoring the padding bytes afterwards.
    fn with_padded_frame<T>(&mut self, padding: usize, decode: impl FnOnce(&[u8], usize) -> T) -> T {
        let size = self.position;
        let padding_range = size..size + padding;

        self.padding_backup.clear();
        self.padding_backup
            .extend_from_slice(&self.data[padding_range.clone()]);
        self.data[padding_range.clone()].fill(0);

        let result = decode(&self.data[..padding_range.end], size);

        self.data[padding_range].copy_from_slice(&self.padding_backup);
        self.position = 0;
        result
    }
}

/// A single thumbnail capture request.
///
/// Type parameters are the frame source `S`, the decode session `D`, the
/// still-image encode session `E`, and the output sink `W`.
pub struct ThumbnailCapture<S, D, E, W> {
    sessions: CodecSessions<D, E>,
    emitter: ThumbnailEmitter<W>,
    source: S,
    options: CaptureOptions,
    window: Vec<Frame>,
    key_frame_index: usize,
    max_frame_size: usize,
    cursor: Cursor,
    phase: Phase,
    resumed: bool,
    buffer: AssemblyBuffer,
}

impl<S, D, E, W> ThumbnailCapture<S, D, E, W>
where
    S: FrameSource,
    D: VideoDecoder,
    E: StillEncoder<D::Picture>,
    W: ThumbnailSink,
{
    /// Prepare a capture of the frame closest to `requested_time`.
    ///
    /// `requested_time` is in the track time base. The track's frame index
    /// is truncated to start at the key frame the target depends on.
    ///
    /// # Errors
    ///
    /// - [`StillFrameError::CaptureDisabled`] or
    ///   [`StillFrameError::UnsupportedCodec`] if `factory` cannot handle the
    ///   track; checked before the index is touched.
    /// - [`StillFrameError::NoFramesFound`] if there is no key frame.
    /// - [`StillFrameError::CodecInitFailed`] or
    ///   [`StillFrameError::ResourceExhausted`] if a session cannot be opened.
    pub fn new<F>(
        factory: &F,
        track: &mut Track,
        requested_time: u64,
        source: S,
        sink: W,
        options: CaptureOptions,
    ) -> Result<Self, StillFrameError>
    where
        F: SessionFactory<Decoder = D, Encoder = E>,
    {
        ensure_supported(factory, &track.media_info)?;

        let target = locate(track, requested_time)?;
        log::debug!("Frame index is {}", target.skip_count);

        let sessions = CodecSessions::open(factory, &track.media_info)?;
        let window = track.frames.frames()[..=target.skip_count].to_vec();

        Ok(Self {
            sessions,
            emitter: ThumbnailEmitter::new(sink),
            source,
            options,
            window,
            key_frame_index: track.frames.start(),
            max_frame_size: target.max_frame_size as usize,
            cursor: Cursor {
                skip_count: target.skip_count,
                ..Cursor::default()
            },
            phase: Phase::NeedFrameStart,
            resumed: false,
            buffer: AssemblyBuffer::default(),
        })
    }

    /// Drive the capture as far as the frame source allows.
    ///
    /// # Errors
    ///
    /// - [`StillFrameError::MalformedInput`] if the very first call finds no
    ///   data at all.
    /// - [`StillFrameError::DecodeError`] / [`StillFrameError::DecodeStalled`]
    ///   on decoder failure.
    /// - [`StillFrameError::EncodeError`] /
    ///   [`StillFrameError::EncodeProducedNothing`] on encoder failure.
    /// - [`StillFrameError::CaptureFinished`] if called again after the
    ///   capture completed or failed.
    /// - [`StillFrameError::FrameSource`] if a frame's delivered length does
    ///   not match its indexed size.
    /// - Errors from the frame source and the sink, unchanged.
    pub fn process(&mut self) -> Result<CaptureStatus, StillFrameError> {
        if self.phase == Phase::Done {
            return Err(StillFrameError::CaptureFinished);
        }

        let result = self.run();
        if !matches!(result, Ok(CaptureStatus::Suspended)) {
            self.phase = Phase::Done;
        }
        result
    }

    fn run(&mut self) -> Result<CaptureStatus, StillFrameError> {
        let mut processed_data = false;

        loop {
            let frame = self.window[self.cursor.position];

            if self.phase == Phase::NeedFrameStart {
                self.source
                    .start_frame(&frame, self.options.frame_time_limit)?;
                self.phase = Phase::Reading;
            }

            let (chunk, frame_done) = match self.source.read()? {
                ReadResult::Data { chunk, frame_done } => (chunk, frame_done),
                ReadResult::Suspend => return self.suspend(processed_data),
            };
            processed_data = true;

            if !frame_done {
                self.buffer.append(
                    chunk,
                    self.max_frame_size,
                    self.options.input_padding,
                )?;
                continue;
            }

            // Borrowed chunks cannot carry padding, so they are staged unless
            // none is wanted.
            if self.buffer.position != 0 || self.options.input_padding > 0 {
                self.buffer.append(
                    chunk,
                    self.max_frame_size,
                    self.options.input_padding,
                )?;
                check_frame_size(&frame, self.buffer.position)?;
                let decoder = &mut self.sessions.decoder;
                let cursor = &mut self.cursor;
                self.buffer
                    .with_padded_frame(self.options.input_padding, |buffer, size| {
                        decode_frame(decoder, cursor, &frame, buffer, size)
                    })?;
            } else {
                check_frame_size(&frame, chunk.len())?;
                decode_frame(
                    &mut self.sessions.decoder,
                    &mut self.cursor,
                    &frame,
                    chunk,
                    chunk.len(),
                )?;
            }

            if self.cursor.skip_count == 0 {
                return self.write_frame();
            }

            self.cursor.skip_count -= 1;
            self.cursor.position += 1;
            self.phase = Phase::NeedFrameStart;
        }
    }

    fn suspend(&mut self, processed_data: bool) -> Result<CaptureStatus, StillFrameError> {
        if !processed_data && !self.resumed {
            log::error!("No data was handled, probably a truncated file");
            return Err(StillFrameError::MalformedInput {
                frame_index: self.cursor.position,
            });
        }

        self.resumed = true;
        log::trace!("Suspending at frame {}", self.cursor.position);
        Ok(CaptureStatus::Suspended)
    }

    /// Surface every buffered picture, then encode the last one.
    fn write_frame(&mut self) -> Result<CaptureStatus, StillFrameError> {
        if self.cursor.missing_frames > 0 {
            log::debug!("Flushing {} buffered frames", self.cursor.missing_frames);
        }

        while self.cursor.missing_frames > 0 {
            match self.sessions.decoder.flush() {
                Ok(true) => self.cursor.missing_frames -= 1,
                Ok(false) => {
                    log::error!("Decoder did not return a frame while flushing");
                    return Err(StillFrameError::DecodeStalled {
                        outstanding: self.cursor.missing_frames,
                    });
                }
                Err(error) => {
                    log::error!("Flushing the decoder failed: {}", error);
                    return Err(StillFrameError::DecodeError {
                        frame_index: self.cursor.position,
                        reason: error.to_string(),
                    });
                }
            }
        }

        self.emitter
            .emit(&mut self.sessions.encoder, self.sessions.decoder.picture())?;
        Ok(CaptureStatus::Complete)
    }

    /// Absolute index (in the untruncated frame index) of the target frame.
    pub fn target_frame(&self) -> usize {
        self.key_frame_index + self.window.len() - 1
    }

    /// Frames still to be decoded before the target.
    pub fn remaining_skip(&self) -> usize {
        self.cursor.skip_count
    }

    /// Decoder submissions whose picture has not come out yet.
    pub fn missing_frames(&self) -> u32 {
        self.cursor.missing_frames
    }

    /// Returns `true` once the capture has completed or failed.
    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Done
    }

    /// The codec sessions bound to this capture.
    pub fn sessions(&self) -> &CodecSessions<D, E> {
        &self.sessions
    }

    /// The frame source, e.g. to hand it more bytes between suspensions.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// The output sink.
    pub fn sink(&self) -> &W {
        self.emitter.sink()
    }

    /// Release the codec sessions and return the output sink.
    pub fn into_sink(self) -> W {
        self.emitter.into_sink()
    }
}

/// Reject a frame whose delivered length differs from its indexed size.
fn check_frame_size(frame: &Frame, delivered: usize) -> Result<(), StillFrameError> {
    if delivered != frame.size as usize {
        log::error!(
            "Frame source delivered {} bytes for a {} byte frame",
            delivered,
            frame.size
        );
        return Err(StillFrameError::FrameSource(format!(
            "delivered {delivered} bytes for a {} byte frame",
            frame.size
        )));
    }
    Ok(())
}

/// Submit one frame to the decoder and advance the decode clock.
fn decode_frame<D: VideoDecoder>(
    decoder: &mut D,
    cursor: &mut Cursor,
    frame: &Frame,
    buffer: &[u8],
    size: usize,
) -> Result<(), StillFrameError> {
    let dts = i64::try_from(cursor.dts).unwrap_or(i64::MAX);
    let packet = DecodePacket::with_padding(
        buffer,
        size,
        dts,
        dts.saturating_add(i64::from(frame.pts_delay)),
        i64::from(frame.duration),
        frame.key_frame,
    );
    cursor.dts += u64::from(frame.duration);

    match decoder.decode(&packet) {
        Ok(produced) => {
            // Each submission owes one picture; extra ones settle older debts.
            cursor.missing_frames = (cursor.missing_frames + 1).saturating_sub(produced);
            Ok(())
        }
        Err(error) => {
            log::error!("Failed to decode frame {}: {}", cursor.position, error);
            Err(StillFrameError::DecodeError {
                frame_index: cursor.position,
                reason: error.to_string(),
            })
        }
    }
}
