//! Codec capabilities and per-request codec sessions.
//!
//! Two halves live here:
//!
//! - **Process scope.** [`CodecRegistry::initialize`] runs once at start-up,
//!   probes which decoders exist for every [`CodecId`] and whether the
//!   still-image encoder exists, and caches the answer as a read-only
//!   [`CapabilitySet`]. When the still-image encoder is missing, thumbnail
//!   capture is disabled for the whole process.
//! - **Request scope.** A [`SessionFactory`] opens one decoder and one
//!   still-image encoder for a track. [`CodecSessions`] owns both and
//!   releases them when dropped, on every exit path.
//!
//! The capture pipeline only relies on the [`VideoDecoder`] and
//! [`StillEncoder`] contracts: submit one unit, get zero or one unit back.

use std::fmt::{self, Display, Formatter};
use std::sync::OnceLock;

use ffmpeg_next::codec::Id;
use ffmpeg_next::util::log::Level;

use crate::error::StillFrameError;
use crate::track::MediaInfo;

/// Codecs a thumbnail can be captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    /// H.264 / AVC.
    Avc,
    /// H.265 / HEVC.
    Hevc,
    /// VP8.
    Vp8,
    /// VP9.
    Vp9,
}

impl CodecId {
    /// Every codec the registry probes for.
    pub const ALL: [CodecId; 4] = [CodecId::Avc, CodecId::Hevc, CodecId::Vp8, CodecId::Vp9];

    /// Short lowercase name, as used in logs and the CLI.
    pub fn name(self) -> &'static str {
        match self {
            CodecId::Avc => "h264",
            CodecId::Hevc => "h265",
            CodecId::Vp8 => "vp8",
            CodecId::Vp9 => "vp9",
        }
    }

    /// Parse a codec name. Accepts the [`name`](CodecId::name) spellings and
    /// the common aliases `avc` and `hevc`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "h264" | "avc" => Some(CodecId::Avc),
            "h265" | "hevc" => Some(CodecId::Hevc),
            "vp8" => Some(CodecId::Vp8),
            "vp9" => Some(CodecId::Vp9),
            _ => None,
        }
    }

    pub(crate) fn to_ffmpeg_id(self) -> Id {
        match self {
            CodecId::Avc => Id::H264,
            CodecId::Hevc => Id::HEVC,
            CodecId::Vp8 => Id::VP8,
            CodecId::Vp9 => Id::VP9,
        }
    }
}

impl Display for CodecId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which decoders and which still-image encoder are available.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    decoders: Vec<CodecId>,
    still_encoder: bool,
}

impl CapabilitySet {
    /// Build a capability set from known decoders and encoder availability.
    pub fn new(decoders: impl IntoIterator<Item = CodecId>, still_encoder: bool) -> Self {
        let mut set = Self {
            decoders: Vec::new(),
            still_encoder,
        };
        for codec_id in decoders {
            if !set.decoders.contains(&codec_id) {
                set.decoders.push(codec_id);
            }
        }
        set
    }

    /// Returns `true` if a decoder was registered for `codec_id`.
    pub fn supports(&self, codec_id: CodecId) -> bool {
        self.decoders.contains(&codec_id)
    }

    /// Returns `true` if the still-image encoder was found.
    pub fn still_encoder_available(&self) -> bool {
        self.still_encoder
    }

    /// Returns `true` if thumbnails can be captured for at least one codec.
    pub fn is_capture_enabled(&self) -> bool {
        self.still_encoder && !self.decoders.is_empty()
    }

    /// Codecs with a registered decoder, in probe order.
    pub fn decoders(&self) -> &[CodecId] {
        &self.decoders
    }
}

/// Options for process-wide codec initialisation.
#[derive(Debug, Clone, Copy)]
pub struct RegistryOptions {
    /// FFmpeg's own console log level. Defaults to [`Level::Error`].
    pub ffmpeg_log_level: Level,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            ffmpeg_log_level: Level::Error,
        }
    }
}

static REGISTRY: OnceLock<CodecRegistry> = OnceLock::new();

/// The process-wide codec capability table.
///
/// Populated once by [`initialize`](CodecRegistry::initialize) and read-only
/// afterwards. The registry is also the FFmpeg-backed [`SessionFactory`].
#[derive(Debug)]
pub struct CodecRegistry {
    capabilities: CapabilitySet,
}

impl CodecRegistry {
    /// Initialise FFmpeg and probe codec capabilities.
    ///
    /// Only the first call probes; later calls return the cached registry
    /// and ignore `options`.
    ///
    /// # Errors
    ///
    /// Returns [`StillFrameError::CodecInitFailed`] if FFmpeg itself cannot
    /// be initialised. A missing decoder or encoder is not an error; it is
    /// reflected in [`capabilities`](CodecRegistry::capabilities).
    pub fn initialize(options: &RegistryOptions) -> Result<&'static CodecRegistry, StillFrameError> {
        if let Some(registry) = REGISTRY.get() {
            return Ok(registry);
        }

        ffmpeg_next::init().map_err(|error| StillFrameError::CodecInitFailed {
            kind: "library",
            reason: error.to_string(),
        })?;
        ffmpeg_next::util::log::set_level(options.ffmpeg_log_level);

        Ok(REGISTRY.get_or_init(|| CodecRegistry {
            capabilities: probe_capabilities(),
        }))
    }

    /// The registry, if [`initialize`](CodecRegistry::initialize) has run.
    pub fn global() -> Option<&'static CodecRegistry> {
        REGISTRY.get()
    }

    /// The probed capability set.
    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }
}

fn probe_capabilities() -> CapabilitySet {
    if ffmpeg_next::encoder::find(Id::MJPEG).is_none() {
        log::warn!("Failed to get jpeg encoder, thumbnail capture is disabled");
        return CapabilitySet::default();
    }

    let decoders = CodecId::ALL.into_iter().filter(|codec_id| {
        let found = ffmpeg_next::decoder::find(codec_id.to_ffmpeg_id()).is_some();
        if !found {
            log::warn!(
                "Failed to get {} decoder, thumbnail capture is disabled for this codec",
                codec_id
            );
        }
        found
    });
    let capabilities = CapabilitySet::new(decoders, true);

    log::debug!(
        "Thumbnail capture enabled for {:?}",
        capabilities.decoders()
    );
    capabilities
}

/// One encoded frame submitted to a decoder.
///
/// [`data`](DecodePacket::data) is the frame payload.
/// [`padded`](DecodePacket::padded) is the payload followed by zeroed bytes
/// for bitstream readers that over-read. The capture pipeline always passes
/// exactly [`CaptureOptions::input_padding`](crate::CaptureOptions::input_padding)
/// zeroed bytes there.
#[derive(Debug, Clone, Copy)]
pub struct DecodePacket<'a> {
    buffer: &'a [u8],
    size: usize,
    /// Decode timestamp, in the track time base.
    pub dts: i64,
    /// Presentation timestamp, in the track time base.
    pub pts: i64,
    /// Frame duration, in the track time base.
    pub duration: i64,
    /// Whether this is a key frame.
    pub key_frame: bool,
}

impl<'a> DecodePacket<'a> {
    /// Build a packet from a payload with no trailing padding.
    pub fn new(data: &'a [u8], dts: i64, pts: i64, duration: i64, key_frame: bool) -> Self {
        Self::with_padding(data, data.len(), dts, pts, duration, key_frame)
    }

    /// Build a packet whose first `size` bytes of `buffer` are the payload
    /// and whose remaining bytes are zeroed padding.
    pub fn with_padding(
        buffer: &'a [u8],
        size: usize,
        dts: i64,
        pts: i64,
        duration: i64,
        key_frame: bool,
    ) -> Self {
        let size = size.min(buffer.len());
        Self {
            buffer,
            size,
            dts,
            pts,
            duration,
            key_frame,
        }
    }

    /// The frame payload.
    pub fn data(&self) -> &'a [u8] {
        &self.buffer[..self.size]
    }

    /// The payload followed by any zeroed padding.
    pub fn padded(&self) -> &'a [u8] {
        self.buffer
    }
}

/// A decode session: submit packets, count the pictures that come out.
pub trait VideoDecoder {
    /// Decoded picture type.
    type Picture;
    /// Failure reported by the codec library.
    type Error: Display;

    /// Submit one packet and return how many pictures came out.
    ///
    /// The most recent one is available from
    /// [`picture`](VideoDecoder::picture). Zero means the decoder buffered
    /// the input and will surface its picture later; more than one means
    /// pictures buffered by earlier submissions came out too.
    ///
    /// `packet.padded()` holds the payload followed by zeroed padding, so
    /// decoders may read past `packet.data()` into it.
    fn decode(&mut self, packet: &DecodePacket<'_>) -> Result<u32, Self::Error>;

    /// Submit one flush (empty) packet. Returns `true` if a buffered picture
    /// came out.
    fn flush(&mut self) -> Result<bool, Self::Error>;

    /// The most recently produced picture.
    fn picture(&self) -> &Self::Picture;
}

/// A still-image encode session: submit one picture, maybe get one image.
pub trait StillEncoder<P> {
    /// Failure reported by the codec library.
    type Error: Display;

    /// Encode one picture. Returns the encoded image bytes, or `None` if the
    /// encoder accepted the picture but produced nothing.
    fn encode(&mut self, picture: &P) -> Result<Option<&[u8]>, Self::Error>;
}

/// Opens the codec sessions for one capture request.
pub trait SessionFactory {
    /// Decoder session type.
    type Decoder: VideoDecoder;
    /// Still-image encoder session type.
    type Encoder: StillEncoder<<Self::Decoder as VideoDecoder>::Picture>;

    /// Returns `true` if a decoder exists for `codec_id`.
    fn supports(&self, codec_id: CodecId) -> bool;

    /// Returns `true` if captures can run at all.
    fn capture_enabled(&self) -> bool {
        true
    }

    /// Open a decoder configured from the track's parameters.
    fn open_decoder(&self, media_info: &MediaInfo) -> Result<Self::Decoder, StillFrameError>;

    /// Open the fixed still-image encoder at the track's geometry.
    fn open_encoder(&self, media_info: &MediaInfo) -> Result<Self::Encoder, StillFrameError>;
}

/// The decoder/encoder pair bound to one capture request.
///
/// Dropping the pair releases both sessions exactly once, encoder first. If
/// opening the encoder fails, the already opened decoder is released as the
/// error propagates.
pub struct CodecSessions<D, E> {
    pub(crate) encoder: E,
    pub(crate) decoder: D,
}

impl<D, E> CodecSessions<D, E> {
    /// Open both sessions for `media_info`.
    ///
    /// Capability checks are the caller's job; the factory is asked to open
    /// whatever it is given.
    ///
    /// # Errors
    ///
    /// Whatever [`SessionFactory::open_decoder`] or
    /// [`SessionFactory::open_encoder`] returns, typically
    /// [`StillFrameError::CodecInitFailed`] or
    /// [`StillFrameError::ResourceExhausted`].
    pub fn open<F>(factory: &F, media_info: &MediaInfo) -> Result<Self, StillFrameError>
    where
        F: SessionFactory<Decoder = D, Encoder = E>,
    {
        let decoder = factory.open_decoder(media_info)?;
        let encoder = factory.open_encoder(media_info)?;
        log::debug!(
            "Opened {} decoder and still encoder ({}x{})",
            media_info.codec_id,
            media_info.width,
            media_info.height
        );
        Ok(Self { encoder, decoder })
    }

    /// The decode session.
    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    /// The encode session.
    pub fn encoder(&self) -> &E {
        &self.encoder
    }
}

impl<D, E> Drop for CodecSessions<D, E> {
    fn drop(&mut self) {
        log::debug!("Releasing codec sessions");
    }
}

/// Check that `factory` can capture from `media_info`'s codec.
pub(crate) fn ensure_supported<F: SessionFactory>(
    factory: &F,
    media_info: &MediaInfo,
) -> Result<(), StillFrameError> {
    if !factory.capture_enabled() {
        return Err(StillFrameError::CaptureDisabled);
    }
    if !factory.supports(media_info.codec_id) {
        log::debug!("No decoder was initialized for codec {}", media_info.codec_id);
        return Err(StillFrameError::UnsupportedCodec(media_info.codec_id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_names_round_trip() {
        for codec_id in CodecId::ALL {
            assert_eq!(CodecId::from_name(codec_id.name()), Some(codec_id));
        }
        assert_eq!(CodecId::from_name("HEVC"), Some(CodecId::Hevc));
        assert_eq!(CodecId::from_name("avc"), Some(CodecId::Avc));
        assert_eq!(CodecId::from_name("av1"), None);
    }

    #[test]
    fn capability_set_queries() {
        let set = CapabilitySet::new([CodecId::Avc, CodecId::Vp9, CodecId::Avc], true);
        assert!(set.supports(CodecId::Avc));
        assert!(!set.supports(CodecId::Hevc));
        assert_eq!(set.decoders(), &[CodecId::Avc, CodecId::Vp9]);
        assert!(set.is_capture_enabled());

        let disabled = CapabilitySet::new([CodecId::Avc], false);
        assert!(!disabled.is_capture_enabled());
        assert!(!CapabilitySet::default().is_capture_enabled());
    }

    #[test]
    fn padded_packet_exposes_payload_and_padding() {
        let buffer = [1u8, 2, 3, 0, 0];
        let packet = DecodePacket::with_padding(&buffer, 3, 0, 0, 1, true);
        assert_eq!(packet.data(), &[1, 2, 3]);
        assert_eq!(packet.padded().len(), 5);

        let plain = DecodePacket::new(&buffer[..2], 0, 0, 1, false);
        assert_eq!(plain.padded(), plain.data());
    }
}
