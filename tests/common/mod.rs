//! Scripted codec sessions and track builders shared by the integration
//! tests.
//!
//! The scripted decoder's "picture" is simply the payload of the packet that
//! produced it, so the emitted image tells exactly which frame was captured
//! and with which bytes.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use stillframe::{
    CodecId, DecodePacket, Frame, FrameIndex, MediaInfo, MemoryFrameSource, SessionFactory,
    StillEncoder, StillFrameError, Track, VideoDecoder,
};

/// Prefix the scripted encoder puts in front of the picture bytes.
pub const IMAGE_PREFIX: &[u8] = b"JPEG:";

/// One packet as seen by the scripted decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedPacket {
    pub data: Vec<u8>,
    /// Bytes the decoder may over-read after `data`.
    pub padding: Vec<u8>,
    pub dts: i64,
    pub pts: i64,
    pub key_frame: bool,
}

/// Everything the scripted sessions observed.
#[derive(Debug, Default)]
pub struct Events {
    pub submitted: Vec<SubmittedPacket>,
    pub flushes: usize,
    pub encodes: usize,
    pub released: Vec<&'static str>,
}

pub type SharedEvents = Rc<RefCell<Events>>;

pub struct ScriptedDecoder {
    latency: usize,
    burst: bool,
    fail_at: Option<usize>,
    stall_on_flush: bool,
    queue: VecDeque<Vec<u8>>,
    picture: Vec<u8>,
    events: SharedEvents,
}

impl VideoDecoder for ScriptedDecoder {
    type Picture = Vec<u8>;
    type Error = String;

    fn decode(&mut self, packet: &DecodePacket<'_>) -> Result<u32, String> {
        let mut events = self.events.borrow_mut();
        if self.fail_at == Some(events.submitted.len()) {
            return Err("corrupt bitstream".to_string());
        }
        let data = packet.data();
        let padding = packet.padded()[data.len()..].to_vec();
        assert!(
            padding.iter().all(|&byte| byte == 0),
            "padding after frame {} is not zeroed",
            events.submitted.len()
        );
        events.submitted.push(SubmittedPacket {
            data: data.to_vec(),
            padding,
            dts: packet.dts,
            pts: packet.pts,
            key_frame: packet.key_frame,
        });

        self.queue.push_back(data.to_vec());
        if self.queue.len() <= self.latency {
            return Ok(0);
        }
        // A bursty decoder hands out everything it was holding at once.
        let release = if self.burst { self.queue.len() } else { 1 };
        for _ in 0..release {
            self.picture = self.queue.pop_front().unwrap_or_default();
        }
        Ok(release as u32)
    }

    fn flush(&mut self) -> Result<bool, String> {
        self.events.borrow_mut().flushes += 1;
        if self.stall_on_flush {
            return Ok(false);
        }
        match self.queue.pop_front() {
            Some(picture) => {
                self.picture = picture;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn picture(&self) -> &Vec<u8> {
        &self.picture
    }
}

impl Drop for ScriptedDecoder {
    fn drop(&mut self) {
        self.events.borrow_mut().released.push("decoder");
    }
}

pub struct ScriptedEncoder {
    silent: bool,
    output: Vec<u8>,
    events: SharedEvents,
}

impl StillEncoder<Vec<u8>> for ScriptedEncoder {
    type Error = String;

    fn encode(&mut self, picture: &Vec<u8>) -> Result<Option<&[u8]>, String> {
        self.events.borrow_mut().encodes += 1;
        if self.silent {
            return Ok(None);
        }
        self.output.clear();
        self.output.extend_from_slice(IMAGE_PREFIX);
        self.output.extend_from_slice(picture);
        Ok(Some(&self.output))
    }
}

impl Drop for ScriptedEncoder {
    fn drop(&mut self) {
        self.events.borrow_mut().released.push("encoder");
    }
}

/// Opens scripted sessions and records what they see.
pub struct ScriptedFactory {
    pub supported: Vec<CodecId>,
    pub capture_enabled: bool,
    pub latency: usize,
    pub burst: bool,
    pub fail_decode_at: Option<usize>,
    pub stall_on_flush: bool,
    pub silent_encoder: bool,
    pub fail_encoder_open: bool,
    pub events: SharedEvents,
}

impl Default for ScriptedFactory {
    fn default() -> Self {
        Self {
            supported: CodecId::ALL.to_vec(),
            capture_enabled: true,
            latency: 0,
            burst: false,
            fail_decode_at: None,
            stall_on_flush: false,
            silent_encoder: false,
            fail_encoder_open: false,
            events: SharedEvents::default(),
        }
    }
}

impl ScriptedFactory {
    pub fn with_latency(latency: usize) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }
}

impl SessionFactory for ScriptedFactory {
    type Decoder = ScriptedDecoder;
    type Encoder = ScriptedEncoder;

    fn supports(&self, codec_id: CodecId) -> bool {
        self.supported.contains(&codec_id)
    }

    fn capture_enabled(&self) -> bool {
        self.capture_enabled
    }

    fn open_decoder(&self, _media_info: &MediaInfo) -> Result<ScriptedDecoder, StillFrameError> {
        Ok(ScriptedDecoder {
            latency: self.latency,
            burst: self.burst,
            fail_at: self.fail_decode_at,
            stall_on_flush: self.stall_on_flush,
            queue: VecDeque::new(),
            picture: Vec::new(),
            events: Rc::clone(&self.events),
        })
    }

    fn open_encoder(&self, _media_info: &MediaInfo) -> Result<ScriptedEncoder, StillFrameError> {
        if self.fail_encoder_open {
            return Err(StillFrameError::CodecInitFailed {
                kind: "encoder",
                reason: "scripted failure".to_string(),
            });
        }
        Ok(ScriptedEncoder {
            silent: self.silent_encoder,
            output: Vec::new(),
            events: Rc::clone(&self.events),
        })
    }
}

/// Distinct, variable-length payload for frame `index`.
pub fn payload(index: usize) -> Vec<u8> {
    let mut bytes = format!("frame-{index}:").into_bytes();
    bytes.extend((0..(7 + index * 5)).map(|byte| (byte * 31 + index) as u8));
    bytes
}

pub fn media_info(codec_id: CodecId) -> MediaInfo {
    MediaInfo {
        codec_id,
        codec_tag: 0,
        width: 64,
        height: 36,
        timescale: 1000,
        extra_data: Vec::new(),
    }
}

/// Build a track of 40-tick frames with the given key-frame flags, and a
/// memory source holding their payloads.
pub fn track_with_keys(keys: &[bool]) -> (Track, MemoryFrameSource) {
    let mut source = MemoryFrameSource::new(Vec::new());
    let mut frames = FrameIndex::new();
    for (index, &key_frame) in keys.iter().enumerate() {
        let bytes = payload(index);
        let offset = source.append(&bytes);
        frames.push(Frame::new(offset, bytes.len() as u32, 40, 0, key_frame));
    }
    (Track::new(media_info(CodecId::Avc), frames), source)
}

/// The image the scripted encoder produces for frame `index`.
pub fn expected_image(index: usize) -> Vec<u8> {
    let mut image = IMAGE_PREFIX.to_vec();
    image.extend(payload(index));
    image
}
