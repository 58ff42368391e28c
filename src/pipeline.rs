//! The playback loop.
//!
//! [`PlaybackPipeline`] owns every resource of one playback run and drives
//! them from a single thread:
//!
//! 1. **Opening**: open the demuxer, the video decoder, the presentation
//!    surface, then (best effort) the audio device and audio decoder.
//! 2. **Playing**: read a packet, route it to its stream's decoder, drain
//!    the frames it produced, wait for each video frame's deadline and
//!    present it, hand audio frames to the device.
//! 3. **Draining**: at end of input, flush every decoder, present what
//!    comes out, wait for the audio device to play out.
//! 4. **Stopped** / **Failed**: release everything, in reverse order of
//!    acquisition, exactly once.
//!
//! Malformed packets are skipped. Audio trouble of any kind short of a
//! device failure mid-stream degrades to video-only playback. Everything
//! else ends the run with a [`PlaybackError`] naming the failed stage.
//!
//! # Example
//!
//! ```no_run
//! use unspool::{HeadlessSink, PlaybackOptions, PlaybackPipeline, PlaybackError};
//!
//! let mut pipeline = PlaybackPipeline::for_file(
//!     "input.mp4",
//!     Box::new(HeadlessSink::new()),
//!     None,
//!     PlaybackOptions::new(),
//! );
//! let report = pipeline.run()?;
//! println!("presented {} frames", report.video_frames_presented);
//! # Ok::<(), PlaybackError>(())
//! ```

use std::{
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    path::Path,
    time::Duration,
};

use crate::clock::{PacingClock, WaitOutcome};
use crate::configuration::PlaybackOptions;
use crate::decoder::Decoder;
use crate::demuxer::Demuxer;
use crate::error::{CodecError, OpenError, PlaybackError, SinkError};
use crate::frame::{AudioFrame, Frame, VideoFrame};
use crate::packet::{MediaKind, Packet, StreamDescriptor};
use crate::progress::ProgressInfo;
use crate::sink::{AudioSink, AudioSpec, PresentationSink};
use crate::source::{FfmpegSource, MediaSource};
use crate::state::PlaybackState;

/// Undecodable frames in a row after which a stream's output is abandoned
/// until its next packet.
const MAX_CONSECUTIVE_UNDECODABLE_FRAMES: u32 = 16;

/// Counters describing a playback run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackReport {
    /// State the pipeline ended in.
    pub state: PlaybackState,
    /// Packets read from the demuxer.
    pub packets_read: u64,
    /// Packets that could not be read or decoded and were skipped.
    pub packets_skipped: u64,
    /// Video frames handed to the presentation sink.
    pub video_frames_presented: u64,
    /// Audio frames accepted by the audio sink.
    pub audio_frames_enqueued: u64,
    /// Times the audio sink refused a frame with backpressure.
    pub backpressure_retries: u64,
    /// Video frames whose deadline had already passed when reached.
    pub late_frames: u64,
    /// Frames discarded for arriving with a timestamp earlier than their
    /// predecessor on the same stream.
    pub out_of_order_discards: u64,
    /// Decoded frames dropped because they could not be converted.
    pub undecodable_frames: u64,
    /// Whether audio was unavailable or dropped during the run.
    pub audio_degraded: bool,
    /// Whether the run ended because a stop was requested.
    pub cancelled: bool,
    /// Timestamp of the last presented video frame.
    pub last_video_pts: Option<Duration>,
}

/// One stream being decoded.
struct ActiveStream {
    descriptor: StreamDescriptor,
    decoder: Box<dyn Decoder>,
    last_pts: Option<Duration>,
}

impl ActiveStream {
    fn new(descriptor: StreamDescriptor, decoder: Box<dyn Decoder>) -> Self {
        Self {
            descriptor,
            decoder,
            last_pts: None,
        }
    }

    /// Record `pts` as the latest emitted timestamp, refusing it if it runs
    /// backwards.
    fn accept(&mut self, pts: Duration) -> bool {
        if self.last_pts.is_some_and(|last| pts < last) {
            return false;
        }
        self.last_pts = Some(pts);
        true
    }
}

/// Demux, decode, pace and present one input.
pub struct PlaybackPipeline {
    source: Box<dyn MediaSource>,
    options: PlaybackOptions,
    state: PlaybackState,
    clock: PacingClock,
    report: PlaybackReport,
    duration: Option<Duration>,
    demuxer: Option<Box<dyn Demuxer>>,
    video: Option<ActiveStream>,
    presentation: Option<Box<dyn PresentationSink>>,
    audio_sink: Option<Box<dyn AudioSink>>,
    audio_sink_configured: bool,
    audio: Option<ActiveStream>,
    torn_down: bool,
}

impl Debug for PlaybackPipeline {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("PlaybackPipeline")
            .field("state", &self.state)
            .field("options", &self.options)
            .field("report", &self.report)
            .field("video_stream", &self.video.as_ref().map(|s| s.descriptor.index))
            .field("audio_stream", &self.audio.as_ref().map(|s| s.descriptor.index))
            .field("torn_down", &self.torn_down)
            .finish_non_exhaustive()
    }
}

impl PlaybackPipeline {
    /// Create a pipeline. Nothing is opened until [`run`](Self::run).
    ///
    /// Pass `None` for `audio` to play video only.
    pub fn new(
        source: Box<dyn MediaSource>,
        presentation: Box<dyn PresentationSink>,
        audio: Option<Box<dyn AudioSink>>,
        options: PlaybackOptions,
    ) -> Self {
        let clock = PacingClock::new(options.time_source.clone());
        Self {
            source,
            options,
            state: PlaybackState::Idle,
            clock,
            report: PlaybackReport::default(),
            duration: None,
            demuxer: None,
            video: None,
            presentation: Some(presentation),
            audio_sink: audio,
            audio_sink_configured: false,
            audio: None,
            torn_down: false,
        }
    }

    /// Create a pipeline that plays a local file through FFmpeg.
    pub fn for_file<P: AsRef<Path>>(
        path: P,
        presentation: Box<dyn PresentationSink>,
        audio: Option<Box<dyn AudioSink>>,
        options: PlaybackOptions,
    ) -> Self {
        Self::new(Box::new(FfmpegSource::new(path)), presentation, audio, options)
    }

    /// Current state.
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Counters collected so far.
    pub fn report(&self) -> &PlaybackReport {
        &self.report
    }

    /// Play the input to the end, or until a stop is requested.
    ///
    /// Every resource is released before this returns, whatever the
    /// outcome.
    ///
    /// # Errors
    ///
    /// [`PlaybackError::AlreadyStarted`] if the pipeline has already run or
    /// been torn down; otherwise the error that moved the pipeline to
    /// [`PlaybackState::Failed`].
    pub fn run(&mut self) -> Result<PlaybackReport, PlaybackError> {
        if self.state != PlaybackState::Idle || self.torn_down {
            return Err(PlaybackError::AlreadyStarted);
        }

        let outcome = self.execute();
        match outcome {
            Ok(()) => {
                self.transition(PlaybackState::Stopped);
                self.teardown();
                log::info!(
                    "Playback stopped: {} video frames, {} audio frames{}",
                    self.report.video_frames_presented,
                    self.report.audio_frames_enqueued,
                    if self.report.cancelled { " (stop requested)" } else { "" },
                );
                Ok(self.report.clone())
            }
            Err(error) => {
                log::error!("Playback failed while {}: {error}", self.state);
                self.transition(PlaybackState::Failed);
                self.teardown();
                Err(error)
            }
        }
    }

    /// Release every resource acquired so far, in reverse order of
    /// acquisition. Calling it again is a no-op.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        log::debug!("Releasing playback resources ({} state)", self.state);

        drop(self.audio.take());
        drop(self.audio_sink.take());
        drop(self.presentation.take());
        drop(self.video.take());
        drop(self.demuxer.take());
    }

    fn execute(&mut self) -> Result<(), PlaybackError> {
        self.transition(PlaybackState::Opening);
        self.open()?;

        self.transition(PlaybackState::Playing);
        self.play()?;

        self.transition(PlaybackState::Draining);
        self.drain()
    }

    fn transition(&mut self, target: PlaybackState) {
        assert!(
            self.state.can_transition_to(target),
            "invalid playback transition {} -> {target}",
            self.state,
        );
        if self.state != target {
            log::debug!("Playback {} -> {target}", self.state);
        }
        self.state = target;
        self.report.state = target;
    }

    fn is_cancelled(&self) -> bool {
        self.options.cancellation.is_cancelled()
    }

    // ── Opening ─────────────────────────────────────────────────────

    fn open(&mut self) -> Result<(), PlaybackError> {
        let demuxer = self.demuxer.insert(self.source.open_demuxer()?);
        self.duration = demuxer.duration();
        let video_stream = demuxer
            .best_stream(MediaKind::Video)
            .cloned()
            .ok_or(OpenError::NoVideoStream)?;
        let audio_stream = demuxer.best_stream(MediaKind::Audio).cloned();

        self.open_video(video_stream)?;

        match audio_stream {
            Some(stream) => self.open_audio(stream),
            None => {
                log::info!("No audio stream; playing video only");
                self.report.audio_degraded = true;
            }
        }

        Ok(())
    }

    fn open_video(&mut self, stream: StreamDescriptor) -> Result<(), PlaybackError> {
        let codec_error = |source| PlaybackError::Codec {
            kind: MediaKind::Video,
            source,
        };

        let (width, height) = stream
            .dimensions()
            .filter(|&(width, height)| width > 0 && height > 0)
            .ok_or_else(|| {
                codec_error(CodecError::InitFailed {
                    stream_index: stream.index,
                    reason: "stream reports no picture size".to_string(),
                })
            })?;

        let Some(presentation) = self.presentation.as_mut() else {
            return Err(PlaybackError::Presentation(SinkError::NotConfigured));
        };
        let pixel_format = self
            .options
            .pixel_format
            .unwrap_or_else(|| presentation.preferred_format());

        let decoder = self
            .source
            .open_video_decoder(&stream, pixel_format)
            .map_err(codec_error)?;
        log::info!(
            "Video stream {} [{}] {width}x{height} -> {pixel_format:?}",
            stream.index,
            stream.codec,
        );
        self.video = Some(ActiveStream::new(stream, decoder));

        presentation
            .configure(width, height, pixel_format)
            .map_err(PlaybackError::Presentation)
    }

    fn open_audio(&mut self, stream: StreamDescriptor) {
        let Some(sink) = self.audio_sink.as_mut() else {
            log::info!("Audio output disabled; playing video only");
            self.report.audio_degraded = true;
            return;
        };

        let Some((sample_rate, channels)) = stream
            .sample_layout()
            .filter(|&(sample_rate, channels)| sample_rate > 0 && channels > 0)
        else {
            log::warn!(
                "Audio stream {} reports no sample layout; playing video only",
                stream.index
            );
            self.report.audio_degraded = true;
            return;
        };

        let requested = AudioSpec {
            sample_rate,
            channels,
            sample_format: self.options.sample_format,
        };
        let obtained = match sink.configure(requested) {
            Ok(obtained) => obtained,
            Err(error) => {
                log::warn!("Audio output unavailable ({error}); playing video only");
                self.report.audio_degraded = true;
                return;
            }
        };
        self.audio_sink_configured = true;
        if obtained != requested {
            log::info!("Audio device obtained {obtained:?} (requested {requested:?})");
        }

        match self.source.open_audio_decoder(&stream, obtained) {
            Ok(decoder) => {
                log::info!("Audio stream {} [{}] -> {obtained:?}", stream.index, stream.codec);
                self.audio = Some(ActiveStream::new(stream, decoder));
            }
            Err(error) => {
                log::warn!("Audio decoder unavailable ({error}); playing video only");
                self.report.audio_degraded = true;
            }
        }
    }

    // ── Playing ─────────────────────────────────────────────────────

    fn play(&mut self) -> Result<(), PlaybackError> {
        let mut consecutive_read_errors = 0;

        loop {
            if self.is_cancelled() {
                log::info!("Stop requested");
                self.report.cancelled = true;
                return Ok(());
            }

            let Some(demuxer) = self.demuxer.as_mut() else {
                return Ok(());
            };
            let packet = match demuxer.read_packet() {
                Ok(Some(packet)) => {
                    consecutive_read_errors = 0;
                    packet
                }
                Ok(None) => {
                    log::debug!("End of input after {} packets", self.report.packets_read);
                    return Ok(());
                }
                Err(error) if error.is_recoverable() => {
                    consecutive_read_errors += 1;
                    self.report.packets_skipped += 1;
                    log::warn!("Skipping unreadable packet: {error}");
                    if consecutive_read_errors >= self.options.max_consecutive_read_errors {
                        return Err(PlaybackError::TooManyReadErrors(consecutive_read_errors));
                    }
                    continue;
                }
                Err(error) => return Err(PlaybackError::Read(error)),
            };

            self.report.packets_read += 1;
            self.route(packet)?;
        }
    }

    fn route(&mut self, packet: Packet) -> Result<(), PlaybackError> {
        let index = packet.stream_index;
        if self.video.as_ref().is_some_and(|s| s.descriptor.index == index) {
            self.submit_video(Some(packet))?;
            self.drain_video()
        } else if self.audio.as_ref().is_some_and(|s| s.descriptor.index == index) {
            self.submit_audio(Some(packet));
            self.drain_audio()
        } else {
            Ok(())
        }
    }

    fn submit_video(&mut self, packet: Option<Packet>) -> Result<(), PlaybackError> {
        let Some(stream) = self.video.as_mut() else {
            return Ok(());
        };
        match stream.decoder.submit(packet) {
            Ok(()) => Ok(()),
            Err(error) if error.is_recoverable() => {
                self.report.packets_skipped += 1;
                log::warn!(
                    "Skipping malformed packet on video stream {}: {error}",
                    stream.descriptor.index
                );
                Ok(())
            }
            Err(source) => Err(PlaybackError::Decode {
                kind: MediaKind::Video,
                stream_index: stream.descriptor.index,
                source,
            }),
        }
    }

    fn drain_video(&mut self) -> Result<(), PlaybackError> {
        let mut undecodable = 0;
        loop {
            if self.is_cancelled() {
                return Ok(());
            }
            let Some(stream) = self.video.as_mut() else {
                return Ok(());
            };

            let frame = match stream.decoder.receive_frame() {
                Ok(Some(Frame::Video(frame))) => frame,
                Ok(Some(Frame::Audio(_))) => continue,
                Ok(None) => return Ok(()),
                Err(error) if error.is_recoverable() => {
                    self.report.undecodable_frames += 1;
                    undecodable += 1;
                    log::warn!(
                        "Dropping undecodable output on video stream {}: {error}",
                        stream.descriptor.index
                    );
                    if undecodable >= MAX_CONSECUTIVE_UNDECODABLE_FRAMES {
                        log::warn!(
                            "Video stream {} produced {undecodable} undecodable frames in a row",
                            stream.descriptor.index
                        );
                        return Ok(());
                    }
                    continue;
                }
                Err(source) => {
                    return Err(PlaybackError::Decode {
                        kind: MediaKind::Video,
                        stream_index: stream.descriptor.index,
                        source,
                    });
                }
            };
            undecodable = 0;

            if !stream.accept(frame.pts) {
                self.report.out_of_order_discards += 1;
                log::warn!(
                    "Discarding out-of-order video frame at {:?} (previous {:?})",
                    frame.pts,
                    stream.last_pts
                );
                continue;
            }

            self.present(frame)?;
        }
    }

    fn present(&mut self, frame: VideoFrame) -> Result<(), PlaybackError> {
        if self.clock.is_started() {
            let deadline = self.clock.deadline_for(frame.pts);
            match self
                .clock
                .wait_until(deadline, &self.options.cancellation, self.options.wait_quantum)
            {
                WaitOutcome::Cancelled => return Ok(()),
                WaitOutcome::Late(by) => {
                    self.report.late_frames += 1;
                    log::trace!("Frame at {:?} is {by:?} late", frame.pts);
                }
                WaitOutcome::Reached => {}
            }
        } else {
            // The anchoring frame defines "now" and is due immediately.
            self.clock.start(frame.pts);
        }

        let Some(presentation) = self.presentation.as_mut() else {
            return Ok(());
        };
        presentation
            .present(&frame)
            .map_err(PlaybackError::Presentation)?;

        self.report.video_frames_presented += 1;
        self.report.last_video_pts = Some(frame.pts);
        if self.report.video_frames_presented % self.options.progress_interval == 0 {
            self.options.progress.on_progress(&ProgressInfo::new(
                self.report.video_frames_presented,
                frame.pts,
                self.duration,
            ));
        }
        Ok(())
    }

    fn submit_audio(&mut self, packet: Option<Packet>) {
        let Some(stream) = self.audio.as_mut() else {
            return;
        };
        match stream.decoder.submit(packet) {
            Ok(()) => {}
            Err(error) if error.is_recoverable() => {
                self.report.packets_skipped += 1;
                log::warn!(
                    "Skipping malformed packet on audio stream {}: {error}",
                    stream.descriptor.index
                );
            }
            Err(error) => self.disable_audio(error),
        }
    }

    fn drain_audio(&mut self) -> Result<(), PlaybackError> {
        let mut undecodable = 0;
        loop {
            if self.is_cancelled() {
                return Ok(());
            }
            let Some(stream) = self.audio.as_mut() else {
                return Ok(());
            };

            let frame = match stream.decoder.receive_frame() {
                Ok(Some(Frame::Audio(frame))) => frame,
                Ok(Some(Frame::Video(_))) => continue,
                Ok(None) => return Ok(()),
                Err(error) if error.is_recoverable() => {
                    self.report.undecodable_frames += 1;
                    undecodable += 1;
                    log::warn!(
                        "Dropping undecodable output on audio stream {}: {error}",
                        stream.descriptor.index
                    );
                    if undecodable >= MAX_CONSECUTIVE_UNDECODABLE_FRAMES {
                        log::warn!(
                            "Audio stream {} produced {undecodable} undecodable frames in a row",
                            stream.descriptor.index
                        );
                        return Ok(());
                    }
                    continue;
                }
                Err(error) => {
                    self.disable_audio(error);
                    return Ok(());
                }
            };
            undecodable = 0;

            if !stream.accept(frame.pts) {
                self.report.out_of_order_discards += 1;
                log::warn!("Discarding out-of-order audio frame at {:?}", frame.pts);
                continue;
            }

            self.enqueue_audio(&frame)?;
        }
    }

    /// Offer a frame to the audio device until it is accepted or a stop is
    /// requested.
    fn enqueue_audio(&mut self, frame: &AudioFrame) -> Result<(), PlaybackError> {
        loop {
            let Some(sink) = self.audio_sink.as_mut() else {
                return Ok(());
            };
            match sink.enqueue(frame) {
                Ok(()) => {
                    self.report.audio_frames_enqueued += 1;
                    return Ok(());
                }
                Err(SinkError::Backpressure) => {
                    self.report.backpressure_retries += 1;
                    let resumed = self.clock.pause(
                        self.options.backpressure_retry_delay,
                        &self.options.cancellation,
                        self.options.wait_quantum,
                    );
                    if !resumed {
                        return Ok(());
                    }
                }
                Err(error) => return Err(PlaybackError::Audio(error)),
            }
        }
    }

    /// Stop decoding audio for the rest of the run.
    fn disable_audio(&mut self, reason: impl Display) {
        log::warn!("Audio stream disabled ({reason}); continuing video only");
        self.audio = None;
        self.report.audio_degraded = true;
    }

    // ── Draining ────────────────────────────────────────────────────

    fn drain(&mut self) -> Result<(), PlaybackError> {
        if self.report.cancelled {
            return Ok(());
        }

        log::debug!("Flushing decoders");
        self.submit_video(None)?;
        self.drain_video()?;
        self.submit_audio(None);
        self.drain_audio()?;

        if self.is_cancelled() {
            self.report.cancelled = true;
            return Ok(());
        }

        self.wait_for_audio_idle();
        Ok(())
    }

    fn wait_for_audio_idle(&mut self) {
        if !self.audio_sink_configured {
            return;
        }
        let Some(sink) = self.audio_sink.as_ref() else {
            return;
        };

        let deadline = self.clock.now() + self.options.drain_timeout;
        while !sink.is_idle() {
            if self.clock.now() >= deadline {
                log::warn!(
                    "Audio device still busy after {:?}; stopping anyway",
                    self.options.drain_timeout
                );
                return;
            }
            let resumed = self.clock.pause(
                self.options.wait_quantum,
                &self.options.cancellation,
                self.options.wait_quantum,
            );
            if !resumed {
                self.report.cancelled = true;
                return;
            }
        }
    }
}

impl Drop for PlaybackPipeline {
    fn drop(&mut self) {
        self.teardown();
    }
}
