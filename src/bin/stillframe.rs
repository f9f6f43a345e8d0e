use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use ffmpeg_next::util::log::Level as FfmpegLogLevel;
use serde::Deserialize;
use serde_json::json;
use stillframe::{
    CaptureOptions, CaptureStatus, CodecId, CodecRegistry, Frame, FrameIndex, MediaInfo,
    MemoryFrameSource, RegistryOptions, ThumbnailCapture, Track,
};

const CLI_AFTER_HELP: &str = "Examples:\n  stillframe capabilities --json\n  stillframe grab --index track.json --data frames.bin --time 00:00:10 --out thumb.jpg\n  stillframe completions zsh > _stillframe";

#[derive(Debug, Parser)]
#[command(
    name = "stillframe",
    version,
    about = "Grab a still-image thumbnail from a demuxed video track",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show FFmpeg's own diagnostics (same as --log-level info).
    #[arg(long)]
    verbose: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print which codecs thumbnails can be captured from.
    #[command(
        about = "Print codec capabilities",
        after_help = "Examples:\n  stillframe capabilities\n  stillframe capabilities --json"
    )]
    Capabilities {
        /// Output capabilities as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Capture one thumbnail from a frame index and its frame data.
    #[command(
        about = "Capture a thumbnail",
        after_help = "Examples:\n  stillframe grab --index track.json --data frames.bin --time 12.5 --out thumb.jpg\n  stillframe grab --index track.json --data frames.bin --time 01:02:03 --out thumb.jpg --chunk-size 4096 --overwrite"
    )]
    Grab {
        /// JSON frame index describing the track.
        #[arg(long)]
        index: PathBuf,
        /// Raw encoded frame data the index points into.
        #[arg(long)]
        data: PathBuf,
        /// Requested time in seconds or [hh:]mm:ss.
        #[arg(long)]
        time: String,
        /// Output image path.
        #[arg(long)]
        out: PathBuf,
        /// Deliver frame data in chunks of at most this many bytes.
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Allow overwriting an existing output file.
        #[arg(long)]
        overwrite: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// On-disk description of a demuxed track.
#[derive(Debug, Deserialize)]
struct TrackManifest {
    codec: String,
    #[serde(default)]
    codec_tag: u32,
    width: u32,
    height: u32,
    timescale: u32,
    #[serde(default)]
    extra_data: Vec<u8>,
    #[serde(default)]
    clip_start_time: u64,
    #[serde(default)]
    first_frame_time_offset: u64,
    frames: Vec<FrameManifest>,
}

#[derive(Debug, Deserialize)]
struct FrameManifest {
    /// Byte offset into the data file; frames without one follow the
    /// previous frame.
    offset: Option<u64>,
    size: u32,
    duration: u32,
    #[serde(default)]
    pts_delay: u32,
    #[serde(default)]
    key_frame: bool,
}

impl TrackManifest {
    fn into_track(self) -> Result<Track, Box<dyn std::error::Error>> {
        let codec_id = CodecId::from_name(&self.codec)
            .ok_or(format!("unsupported codec in index: {}", self.codec))?;
        if self.timescale == 0 {
            return Err("timescale must be greater than 0".into());
        }

        let mut next_offset = 0_u64;
        let frames: FrameIndex = self
            .frames
            .into_iter()
            .map(|frame| {
                let offset = frame.offset.unwrap_or(next_offset);
                next_offset = offset + u64::from(frame.size);
                Frame::new(
                    offset,
                    frame.size,
                    frame.duration,
                    frame.pts_delay,
                    frame.key_frame,
                )
            })
            .collect();

        let media_info = MediaInfo {
            codec_id,
            codec_tag: self.codec_tag,
            width: self.width,
            height: self.height,
            timescale: self.timescale,
            extra_data: self.extra_data,
        };
        let mut track = Track::new(media_info, frames);
        track.clip_start_time = self.clip_start_time;
        track.first_frame_time_offset = self.first_frame_time_offset;
        Ok(track)
    }
}

fn load_track(path: &Path) -> Result<Track, Box<dyn std::error::Error>> {
    let contents = fs::read_to_string(path)
        .map_err(|error| format!("cannot read index {}: {error}", path.display()))?;
    let manifest: TrackManifest = serde_json::from_str(&contents)
        .map_err(|error| format!("invalid index {}: {error}", path.display()))?;
    manifest.into_track()
}

fn parse_timecode(value: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("time value cannot be empty".into());
    }

    if let Ok(seconds) = trimmed.parse::<f64>() {
        return seconds_to_duration(seconds, trimmed);
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [minutes, seconds] => (0_u64, minutes.parse::<u64>()?, seconds),
        [hours, minutes, seconds] => (hours.parse::<u64>()?, minutes.parse::<u64>()?, seconds),
        _ => return Err(format!("invalid time format: {trimmed}").into()),
    };

    let seconds = seconds.parse::<f64>()?;
    let total_seconds = (hours as f64 * 3600.0) + (minutes as f64 * 60.0) + seconds;
    seconds_to_duration(total_seconds, trimmed)
}

fn seconds_to_duration(seconds: f64, text: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    Duration::try_from_secs_f64(seconds.max(0.0))
        .map_err(|error| format!("invalid time {text}: {error}").into())
}

fn parse_log_level(value: &str) -> Option<FfmpegLogLevel> {
    match value.to_ascii_lowercase().as_str() {
        "quiet" => Some(FfmpegLogLevel::Quiet),
        "panic" => Some(FfmpegLogLevel::Panic),
        "fatal" => Some(FfmpegLogLevel::Fatal),
        "error" => Some(FfmpegLogLevel::Error),
        "warning" | "warn" => Some(FfmpegLogLevel::Warning),
        "info" => Some(FfmpegLogLevel::Info),
        "verbose" => Some(FfmpegLogLevel::Verbose),
        "debug" => Some(FfmpegLogLevel::Debug),
        "trace" => Some(FfmpegLogLevel::Trace),
        _ => None,
    }
}

fn registry_options(global: &GlobalOptions) -> Result<RegistryOptions, Box<dyn std::error::Error>> {
    let mut options = RegistryOptions::default();
    if global.verbose {
        options.ffmpeg_log_level = FfmpegLogLevel::Info;
    }
    if let Some(level) = &global.log_level {
        options.ffmpeg_log_level =
            parse_log_level(level).ok_or(format!("unsupported --log-level: {level}"))?;
    }
    Ok(options)
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Capabilities { json } => {
            let registry = CodecRegistry::initialize(&registry_options(&cli.global)?)?;
            let capabilities = registry.capabilities();
            if json {
                let payload = json!({
                    "capture_enabled": capabilities.is_capture_enabled(),
                    "still_encoder": capabilities.still_encoder_available(),
                    "decoders": capabilities
                        .decoders()
                        .iter()
                        .map(|codec_id| codec_id.name())
                        .collect::<Vec<_>>(),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                let encoder = if capabilities.still_encoder_available() {
                    "available".green()
                } else {
                    "missing".red()
                };
                println!("Still encoder (mjpeg): {encoder}");
                for codec_id in CodecId::ALL {
                    let status = if capabilities.supports(codec_id) {
                        "yes".green()
                    } else {
                        "no".red()
                    };
                    println!("Decoder {codec_id}: {status}");
                }
            }
        }
        Commands::Grab {
            index,
            data,
            time,
            out,
            chunk_size,
            overwrite,
        } => {
            ensure_writable_path(&out, overwrite)?;

            let mut track = load_track(&index)?;
            let storage = fs::read(&data)
                .map_err(|error| format!("cannot read frame data {}: {error}", data.display()))?;
            let mut source = MemoryFrameSource::new(storage);
            if let Some(chunk_size) = chunk_size {
                if chunk_size == 0 {
                    return Err("--chunk-size must be greater than 0".into());
                }
                source = source.with_chunk_size(chunk_size);
            }

            let registry = CodecRegistry::initialize(&registry_options(&cli.global)?)?;
            let requested = parse_timecode(&time)?;
            let millis = u64::try_from(requested.as_millis()).unwrap_or(u64::MAX);
            let requested_time = track.time_from_millis(millis);

            let mut capture = ThumbnailCapture::new(
                registry,
                &mut track,
                requested_time,
                source,
                Vec::new(),
                CaptureOptions::default(),
            )?;
            let target = capture.target_frame();
            if capture.process()? == CaptureStatus::Suspended {
                return Err("frame data ended before the thumbnail was decoded".into());
            }

            let image = capture.into_sink();
            fs::write(&out, &image)?;
            eprintln!(
                "{} frame {} -> {} ({} bytes)",
                "captured".green().bold(),
                target,
                out.display(),
                image.len()
            );
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "stillframe", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}
