//! # unspool
//!
//! Play video files: demux, decode, pace and present, powered by FFmpeg via
//! the [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate.
//!
//! `unspool` is organised as a small pipeline of replaceable stages:
//!
//! ```text
//! Demuxer ─▶ Decoder (video) ─▶ PacingClock ─▶ PresentationSink
//!        └─▶ Decoder (audio) ───────────────▶ AudioSink
//! ```
//!
//! [`PlaybackPipeline`] drives the stages from a single thread through the
//! `Idle → Opening → Playing → Draining → Stopped` lifecycle (or `Failed`),
//! and releases every resource exactly once however the run ends.
//!
//! ## Quick Start
//!
//! ### Play a File Headless
//!
//! ```no_run
//! use unspool::{HeadlessSink, PlaybackOptions, PlaybackPipeline};
//!
//! let mut pipeline = PlaybackPipeline::for_file(
//!     "input.mp4",
//!     Box::new(HeadlessSink::new()),
//!     None,
//!     PlaybackOptions::new(),
//! );
//! let report = pipeline.run().unwrap();
//! println!("{} frames, {} late", report.video_frames_presented, report.late_frames);
//! ```
//!
//! ### Stop From Another Thread
//!
//! ```no_run
//! use std::{thread, time::Duration};
//!
//! use unspool::{CancellationToken, HeadlessSink, PlaybackOptions, PlaybackPipeline};
//!
//! let token = CancellationToken::new();
//! let stopper = token.clone();
//! thread::spawn(move || {
//!     thread::sleep(Duration::from_secs(2));
//!     stopper.cancel();
//! });
//!
//! let options = PlaybackOptions::new().with_cancellation(token);
//! let mut pipeline =
//!     PlaybackPipeline::for_file("input.mp4", Box::new(HeadlessSink::new()), None, options);
//! let report = pipeline.run().unwrap();
//! assert!(report.cancelled);
//! ```
//!
//! ### Inspect Streams
//!
//! ```no_run
//! use unspool::{Demuxer, FfmpegDemuxer};
//!
//! let demuxer = FfmpegDemuxer::open("input.mkv").unwrap();
//! for stream in demuxer.streams() {
//!     println!("#{} {} {}", stream.index, stream.kind, stream.codec);
//! }
//! ```
//!
//! ## Features
//!
//! - **Wall-clock pacing**: frames are shown at their presentation time;
//!   late frames are shown immediately and counted
//! - **Backpressure-aware audio**: frames refused by a full device buffer
//!   are retried without blocking video
//! - **Graceful degradation**: a missing or broken audio path falls back to
//!   video-only playback
//! - **Resilient reading**: malformed packets are skipped and counted
//! - **Cooperative stop**: a [`CancellationToken`] unwinds playback within
//!   one wait quantum
//! - **Replaceable stages**: every stage sits behind a trait, so sources,
//!   sinks and the clock can be swapped out
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `window` | `WindowSink`, a native desktop window via `minifb` |
//! | `audio-output` | `DeviceAudioSink`, the default output device via `cpal` |
//! | `full` | Enables all of the above |
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system.

#[cfg(feature = "audio-output")]
pub mod audio_output;
pub mod clock;
pub mod configuration;
mod conversion;
pub mod decoder;
pub mod demuxer;
pub mod error;
pub mod ffmpeg;
pub mod frame;
pub mod packet;
pub mod pipeline;
pub mod progress;
pub mod sink;
pub mod source;
pub mod state;
#[cfg(feature = "window")]
pub mod window;

#[cfg(feature = "audio-output")]
pub use audio_output::DeviceAudioSink;
pub use clock::{PacingClock, SystemTimeSource, TimeSource, WaitOutcome};
pub use configuration::PlaybackOptions;
pub use decoder::{Decoder, FfmpegAudioDecoder, FfmpegVideoDecoder};
pub use demuxer::{Demuxer, FfmpegDemuxer};
pub use error::{CodecError, DecodeError, OpenError, PlaybackError, ReadError, SinkError};
pub use ffmpeg::{FfmpegLogLevel, set_ffmpeg_log_level};
pub use frame::{AudioFrame, Frame, PixelFormat, Plane, SampleFormat, VideoFrame};
pub use packet::{MediaKind, Packet, StreamDescriptor, StreamLayout, TimeBase};
pub use pipeline::{PlaybackPipeline, PlaybackReport};
pub use progress::{CancellationToken, ProgressCallback, ProgressInfo};
pub use sink::{AudioSink, AudioSpec, HeadlessSink, PresentationSink};
pub use source::{FfmpegSource, MediaSource};
pub use state::PlaybackState;
#[cfg(feature = "window")]
pub use window::WindowSink;
