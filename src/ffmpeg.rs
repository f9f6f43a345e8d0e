//! FFmpeg-backed codec sessions.
//!
//! [`FfmpegDecoder`] and [`FfmpegStillEncoder`] adapt FFmpeg's
//! send/receive API to the picture-counting contracts of
//! [`VideoDecoder`] and [`StillEncoder`]. [`CodecRegistry`] hands them out as
//! its [`SessionFactory`] implementation.
//!
//! The still image is always MJPEG in `YUVJ420P`. Decoded pictures in any
//! other pixel format or geometry go through a software scaler first.

use std::fmt::Display;
use std::{mem, ptr};

use ffmpeg_next::codec::context::Context as CodecContext;
use ffmpeg_next::codec::{Id, packet::Flags as PacketFlags};
use ffmpeg_next::decoder::Video as OpenedDecoder;
use ffmpeg_next::encoder::video::Encoder as OpenedEncoder;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::frame::Video as VideoFrame;
use ffmpeg_next::software::scaling::{Context as ScalingContext, Flags as ScalingFlags};
use ffmpeg_next::util::error::EAGAIN;
use ffmpeg_next::{Error as FfmpegError, Packet, Rational};
use ffmpeg_sys_next as ffi;

use crate::codec::{
    CodecId, CodecRegistry, DecodePacket, SessionFactory, StillEncoder, VideoDecoder,
};
use crate::error::StillFrameError;
use crate::track::MediaInfo;

/// Pixel format the still-image encoder is opened with.
pub const STILL_PIXEL_FORMAT: Pixel = Pixel::YUVJ420P;

/// Padding FFmpeg requires after every input buffer.
pub const INPUT_PADDING: usize = ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize;

fn invalid_parameter(name: &str, value: impl Display) -> StillFrameError {
    StillFrameError::CodecInitFailed {
        kind: "decoder",
        reason: format!("invalid {name} {value}"),
    }
}

fn init_failed(kind: &'static str) -> impl Fn(FfmpegError) -> StillFrameError {
    move |error| StillFrameError::CodecInitFailed {
        kind,
        reason: error.to_string(),
    }
}

/// Returns `true` for FFmpeg's "try again" status.
fn is_again(error: &FfmpegError) -> bool {
    matches!(error, FfmpegError::Other { errno } if *errno == EAGAIN)
}

/// An FFmpeg video decoder bound to one track.
pub struct FfmpegDecoder {
    decoder: OpenedDecoder,
    picture: VideoFrame,
    scratch: VideoFrame,
    draining: bool,
}

impl FfmpegDecoder {
    /// Open a decoder for `media_info`.
    ///
    /// The context gets the track's codec tag, a `1/timescale` time base
    /// (also used as packet time base), a padded copy of the extra data, and
    /// the nominal picture size.
    ///
    /// # Errors
    ///
    /// - [`StillFrameError::CodecInitFailed`] if the parameters do not fit
    ///   FFmpeg's fields or the decoder fails to open.
    /// - [`StillFrameError::UnsupportedCodec`] if FFmpeg has no decoder.
    /// - [`StillFrameError::ResourceExhausted`] if the extra data cannot be
    ///   copied.
    pub fn open(media_info: &MediaInfo) -> Result<Self, StillFrameError> {
        let timescale = i32::try_from(media_info.timescale)
            .ok()
            .filter(|timescale| *timescale > 0)
            .ok_or_else(|| invalid_parameter("timescale", media_info.timescale))?;
        let width = i32::try_from(media_info.width)
            .map_err(|_| invalid_parameter("width", media_info.width))?;
        let height = i32::try_from(media_info.height)
            .map_err(|_| invalid_parameter("height", media_info.height))?;
        let extra_data_size = i32::try_from(media_info.extra_data.len())
            .map_err(|_| invalid_parameter("extra data size", media_info.extra_data.len()))?;
        let time_base = Rational::new(1, timescale);

        let codec = ffmpeg_next::decoder::find(media_info.codec_id.to_ffmpeg_id())
            .ok_or(StillFrameError::UnsupportedCodec(media_info.codec_id))?;

        let mut context = CodecContext::new_with_codec(codec);
        // SAFETY: the context is exclusively owned here and not yet opened.
        // Extra data is handed over in an av_malloc'd buffer, which the
        // context frees together with itself.
        unsafe {
            let raw = context.as_mut_ptr();
            (*raw).codec_tag = media_info.codec_tag;
            (*raw).time_base = time_base.into();
            (*raw).pkt_timebase = time_base.into();
            (*raw).width = width;
            (*raw).height = height;

            if !media_info.extra_data.is_empty() {
                let size = media_info.extra_data.len();
                let extra_data = ffi::av_mallocz(size + INPUT_PADDING) as *mut u8;
                if extra_data.is_null() {
                    return Err(StillFrameError::ResourceExhausted(
                        "decoder extra data".to_string(),
                    ));
                }
                ptr::copy_nonoverlapping(media_info.extra_data.as_ptr(), extra_data, size);
                (*raw).extradata = extra_data;
                (*raw).extradata_size = extra_data_size;
            }
        }

        let decoder = context
            .decoder()
            .open_as(codec)
            .and_then(|opened| opened.video())
            .map_err(|error| {
                log::error!("Failed to open {} decoder: {}", media_info.codec_id, error);
                init_failed("decoder")(error)
            })?;

        Ok(Self {
            decoder,
            picture: VideoFrame::empty(),
            scratch: VideoFrame::empty(),
            draining: false,
        })
    }

    /// Pull one picture if the decoder has one ready.
    ///
    /// FFmpeg unrefs the output frame before reporting "nothing ready", so
    /// pictures land in a scratch frame and only replace the current one on
    /// success.
    fn receive(&mut self) -> Result<bool, FfmpegError> {
        match self.decoder.receive_frame(&mut self.scratch) {
            Ok(()) => {
                mem::swap(&mut self.picture, &mut self.scratch);
                Ok(true)
            }
            Err(FfmpegError::Eof) => Ok(false),
            Err(error) if is_again(&error) => Ok(false),
            Err(error) => Err(error),
        }
    }
}

impl VideoDecoder for FfmpegDecoder {
    type Picture = VideoFrame;
    type Error = FfmpegError;

    fn decode(&mut self, input: &DecodePacket<'_>) -> Result<u32, FfmpegError> {
        let mut packet = Packet::copy(input.padded());
        packet.shrink(input.data().len());
        packet.set_dts(Some(input.dts));
        packet.set_pts(Some(input.pts));
        packet.set_duration(input.duration);
        if input.key_frame {
            packet.set_flags(PacketFlags::KEY);
        }

        let mut produced = 0;
        loop {
            match self.decoder.send_packet(&packet) {
                Ok(()) => break,
                // Output is pending; take it before resubmitting.
                Err(error) if is_again(&error) => {
                    if !self.receive()? {
                        return Err(error);
                    }
                    produced += 1;
                }
                Err(error) => return Err(error),
            }
        }

        while self.receive()? {
            produced += 1;
        }
        Ok(produced)
    }

    fn flush(&mut self) -> Result<bool, FfmpegError> {
        if !self.draining {
            self.decoder.send_eof()?;
            self.draining = true;
        }
        self.receive()
    }

    fn picture(&self) -> &VideoFrame {
        &self.picture
    }
}

/// The fixed MJPEG still-image encoder.
pub struct FfmpegStillEncoder {
    encoder: OpenedEncoder,
    width: u32,
    height: u32,
    scaler: Option<ScalingContext>,
    converted: VideoFrame,
    packet: Packet,
}

impl FfmpegStillEncoder {
    /// Open the encoder at `width` x `height`, `YUVJ420P`, 1:1 time base.
    ///
    /// # Errors
    ///
    /// - [`StillFrameError::CaptureDisabled`] if FFmpeg has no MJPEG encoder.
    /// - [`StillFrameError::CodecInitFailed`] if the encoder fails to open.
    pub fn open(width: u32, height: u32) -> Result<Self, StillFrameError> {
        let codec = ffmpeg_next::encoder::find(Id::MJPEG).ok_or(StillFrameError::CaptureDisabled)?;

        let mut encoder = CodecContext::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(init_failed("encoder"))?;
        encoder.set_width(width);
        encoder.set_height(height);
        encoder.set_format(STILL_PIXEL_FORMAT);
        encoder.set_time_base(Rational::new(1, 1));

        let encoder = encoder.open_as(codec).map_err(|error| {
            log::error!("Failed to open jpeg encoder: {}", error);
            init_failed("encoder")(error)
        })?;

        Ok(Self {
            encoder,
            width,
            height,
            scaler: None,
            converted: VideoFrame::empty(),
            packet: Packet::empty(),
        })
    }

    fn needs_conversion(&self, picture: &VideoFrame) -> bool {
        picture.format() != STILL_PIXEL_FORMAT
            || picture.width() != self.width
            || picture.height() != self.height
    }
}

impl StillEncoder<VideoFrame> for FfmpegStillEncoder {
    type Error = FfmpegError;

    fn encode(&mut self, picture: &VideoFrame) -> Result<Option<&[u8]>, FfmpegError> {
        let frame = if self.needs_conversion(picture) {
            if self.scaler.is_none() {
                self.scaler = Some(ScalingContext::get(
                    picture.format(),
                    picture.width(),
                    picture.height(),
                    STILL_PIXEL_FORMAT,
                    self.width,
                    self.height,
                    ScalingFlags::BILINEAR,
                )?);
            }
            if let Some(scaler) = self.scaler.as_mut() {
                scaler.run(picture, &mut self.converted)?;
            }
            self.converted.set_pts(Some(0));
            &self.converted
        } else {
            picture
        };

        self.encoder.send_frame(frame)?;
        match self.encoder.receive_packet(&mut self.packet) {
            Ok(()) => Ok(Some(self.packet.data().unwrap_or(&[]))),
            Err(error) if is_again(&error) => Ok(None),
            Err(FfmpegError::Eof) => Ok(None),
            Err(error) => Err(error),
        }
    }
}

impl SessionFactory for CodecRegistry {
    type Decoder = FfmpegDecoder;
    type Encoder = FfmpegStillEncoder;

    fn supports(&self, codec_id: CodecId) -> bool {
        self.capabilities().supports(codec_id)
    }

    fn capture_enabled(&self) -> bool {
        self.capabilities().still_encoder_available()
    }

    fn open_decoder(&self, media_info: &MediaInfo) -> Result<FfmpegDecoder, StillFrameError> {
        FfmpegDecoder::open(media_info)
    }

    fn open_encoder(&self, media_info: &MediaInfo) -> Result<FfmpegStillEncoder, StillFrameError> {
        FfmpegStillEncoder::open(media_info.width, media_info.height)
    }
}
