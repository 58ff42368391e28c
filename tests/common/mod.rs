//! Scripted stand-ins for the media library and output devices.
//!
//! Every fake records what happened to it in a shared [`Ledger`], so tests
//! can assert on call order, presented timestamps and open/close balance.

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use unspool::{
    AudioFrame, AudioSink, AudioSpec, CancellationToken, CodecError, DecodeError, Decoder,
    Demuxer, Frame, MediaKind, MediaSource, OpenError, Packet, PixelFormat, PresentationSink,
    ReadError, SampleFormat, SinkError, StreamDescriptor, StreamLayout, TimeBase, TimeSource,
    VideoFrame,
};

pub const VIDEO_STREAM: usize = 0;
pub const AUDIO_STREAM: usize = 1;

/// Payload that makes a [`FakeDecoder`] reject the packet as malformed.
pub const MALFORMED: &[u8] = b"malformed";
/// Payload that puts a [`FakeDecoder`] into an unrecoverable state.
pub const FATAL: &[u8] = b"fatal";

/// Shared record of everything the fakes saw.
#[derive(Debug, Default)]
pub struct Ledger {
    /// Resource lifecycle events, in order ("open demuxer", "close audio sink", ...).
    pub events: Vec<String>,
    pub opened: usize,
    pub closed: usize,
    pub presented: Vec<Duration>,
    pub enqueued: Vec<Duration>,
    pub audio_configure_calls: usize,
    pub audio_requests: Vec<AudioSpec>,
    pub enqueue_attempts: usize,
    pub submitted_flush: Vec<MediaKind>,
    pub idle_polls: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SharedLedger(Arc<Mutex<Ledger>>);

impl SharedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.0.lock().unwrap()
    }

    fn open(&self, what: &str) {
        let mut ledger = self.lock();
        ledger.opened += 1;
        ledger.events.push(format!("open {what}"));
    }

    fn close(&self, what: &str) {
        let mut ledger = self.lock();
        ledger.closed += 1;
        ledger.events.push(format!("close {what}"));
    }

    pub fn events(&self) -> Vec<String> {
        self.lock().events.clone()
    }

    pub fn presented(&self) -> Vec<Duration> {
        self.lock().presented.clone()
    }

    pub fn enqueued(&self) -> Vec<Duration> {
        self.lock().enqueued.clone()
    }

    pub fn assert_balanced(&self) {
        let ledger = self.lock();
        assert_eq!(
            ledger.opened, ledger.closed,
            "unbalanced resources: {:?}",
            ledger.events
        );
    }
}

pub fn millis(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn millisecond_time_base() -> TimeBase {
    TimeBase::new(1, 1000)
}

pub fn video_stream() -> StreamDescriptor {
    StreamDescriptor {
        index: VIDEO_STREAM,
        kind: MediaKind::Video,
        codec: "fakevideo".to_string(),
        time_base: millisecond_time_base(),
        layout: StreamLayout::Video {
            width: 64,
            height: 48,
            pixel_format: Some("yuv420p".to_string()),
        },
    }
}

pub fn audio_stream() -> StreamDescriptor {
    StreamDescriptor {
        index: AUDIO_STREAM,
        kind: MediaKind::Audio,
        codec: "fakeaudio".to_string(),
        time_base: millisecond_time_base(),
        layout: StreamLayout::Audio {
            sample_rate: 48_000,
            channels: 2,
        },
    }
}

fn packet(stream_index: usize, pts_millis: i64, payload: &[u8]) -> Result<Packet, ReadError> {
    Ok(Packet {
        stream_index,
        pts: Some(pts_millis),
        dts: Some(pts_millis),
        duration: 0,
        time_base: millisecond_time_base(),
        is_keyframe: true,
        payload: payload.to_vec(),
    })
}

pub fn video_packet(pts_millis: i64) -> Result<Packet, ReadError> {
    packet(VIDEO_STREAM, pts_millis, b"video")
}

pub fn audio_packet(pts_millis: i64) -> Result<Packet, ReadError> {
    packet(AUDIO_STREAM, pts_millis, b"audio")
}

pub fn packet_with_payload(
    stream_index: usize,
    pts_millis: i64,
    payload: &[u8],
) -> Result<Packet, ReadError> {
    packet(stream_index, pts_millis, payload)
}

/// Video packets every `interval` ms starting at zero.
pub fn video_packets(count: i64, interval: i64) -> Vec<Result<Packet, ReadError>> {
    (0..count).map(|index| video_packet(index * interval)).collect()
}

// ── Source and demuxer ──────────────────────────────────────────────

pub struct FakeSource {
    pub ledger: SharedLedger,
    pub streams: Vec<StreamDescriptor>,
    pub script: Vec<Result<Packet, ReadError>>,
    pub fail_open: bool,
    pub fail_video_codec: bool,
    pub fail_audio_codec: bool,
    /// Frames each decoder holds back until flushed.
    pub decoder_delay: usize,
    /// Frames each decoder fails to convert once flushing has begun.
    pub flush_receive_errors: usize,
}

impl FakeSource {
    pub fn new(ledger: &SharedLedger, streams: Vec<StreamDescriptor>) -> Self {
        Self {
            ledger: ledger.clone(),
            streams,
            script: Vec::new(),
            fail_open: false,
            fail_video_codec: false,
            fail_audio_codec: false,
            decoder_delay: 0,
            flush_receive_errors: 0,
        }
    }

    pub fn with_script(mut self, script: Vec<Result<Packet, ReadError>>) -> Self {
        self.script = script;
        self
    }
}

impl MediaSource for FakeSource {
    fn open_demuxer(&mut self) -> Result<Box<dyn Demuxer>, OpenError> {
        if self.fail_open {
            return Err(OpenError::CorruptHeader {
                path: "fake.mp4".into(),
                reason: "scripted failure".to_string(),
            });
        }
        self.ledger.open("demuxer");
        Ok(Box::new(FakeDemuxer {
            ledger: self.ledger.clone(),
            streams: self.streams.clone(),
            script: std::mem::take(&mut self.script).into(),
        }))
    }

    fn open_video_decoder(
        &mut self,
        stream: &StreamDescriptor,
        output: PixelFormat,
    ) -> Result<Box<dyn Decoder>, CodecError> {
        if self.fail_video_codec {
            return Err(CodecError::UnsupportedCodec {
                stream_index: stream.index,
                codec: stream.codec.clone(),
            });
        }
        self.ledger.open("video decoder");
        Ok(Box::new(FakeDecoder::new(
            &self.ledger,
            MediaKind::Video,
            self.decoder_delay,
            Output::Video(output),
        )
        .with_flush_receive_errors(self.flush_receive_errors)))
    }

    fn open_audio_decoder(
        &mut self,
        stream: &StreamDescriptor,
        output: AudioSpec,
    ) -> Result<Box<dyn Decoder>, CodecError> {
        if self.fail_audio_codec {
            return Err(CodecError::UnsupportedCodec {
                stream_index: stream.index,
                codec: stream.codec.clone(),
            });
        }
        self.ledger.open("audio decoder");
        Ok(Box::new(FakeDecoder::new(
            &self.ledger,
            MediaKind::Audio,
            self.decoder_delay,
            Output::Audio(output),
        )
        .with_flush_receive_errors(self.flush_receive_errors)))
    }
}

pub struct FakeDemuxer {
    ledger: SharedLedger,
    streams: Vec<StreamDescriptor>,
    script: VecDeque<Result<Packet, ReadError>>,
}

impl Demuxer for FakeDemuxer {
    fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    fn read_packet(&mut self) -> Result<Option<Packet>, ReadError> {
        self.script.pop_front().transpose()
    }
}

impl Drop for FakeDemuxer {
    fn drop(&mut self) {
        self.ledger.close("demuxer");
    }
}

// ── Decoder ─────────────────────────────────────────────────────────

enum Output {
    Video(PixelFormat),
    Audio(AudioSpec),
}

/// Turns each packet into one frame stamped with the packet's PTS.
pub struct FakeDecoder {
    ledger: SharedLedger,
    kind: MediaKind,
    delay: usize,
    output: Output,
    pending: VecDeque<Duration>,
    flushing: bool,
    flush_receive_errors: usize,
}

impl FakeDecoder {
    fn new(ledger: &SharedLedger, kind: MediaKind, delay: usize, output: Output) -> Self {
        Self {
            ledger: ledger.clone(),
            kind,
            delay,
            output,
            pending: VecDeque::new(),
            flushing: false,
            flush_receive_errors: 0,
        }
    }

    fn with_flush_receive_errors(mut self, errors: usize) -> Self {
        self.flush_receive_errors = errors;
        self
    }

    fn frame(&self, pts: Duration) -> Frame {
        match self.output {
            Output::Video(pixel_format) => Frame::Video(VideoFrame {
                width: 64,
                height: 48,
                pixel_format,
                planes: Vec::new(),
                pts,
            }),
            Output::Audio(spec) => Frame::Audio(AudioFrame {
                sample_rate: spec.sample_rate,
                channels: spec.channels,
                sample_format: spec.sample_format,
                samples: vec![
                    0;
                    16 * usize::from(spec.channels) * spec.sample_format.bytes_per_sample()
                ],
                pts,
            }),
        }
    }
}

impl Decoder for FakeDecoder {
    fn submit(&mut self, packet: Option<Packet>) -> Result<(), DecodeError> {
        let Some(packet) = packet else {
            self.flushing = true;
            self.ledger.lock().submitted_flush.push(self.kind);
            return Ok(());
        };
        match packet.payload.as_slice() {
            MALFORMED => Err(DecodeError::InvalidData("scripted malformed packet".to_string())),
            FATAL => Err(DecodeError::FatalState("scripted decoder failure".to_string())),
            _ => {
                self.pending
                    .push_back(packet.presentation_time().unwrap_or_default());
                Ok(())
            }
        }
    }

    fn receive_frame(&mut self) -> Result<Option<Frame>, DecodeError> {
        if self.pending.len() <= self.delay && !self.flushing {
            return Ok(None);
        }
        // A frame that fails conversion is consumed, as with a real codec.
        if self.flushing && self.flush_receive_errors > 0 && !self.pending.is_empty() {
            self.flush_receive_errors -= 1;
            self.pending.pop_front();
            return Err(DecodeError::InvalidData("scripted conversion failure".to_string()));
        }
        Ok(self.pending.pop_front().map(|pts| self.frame(pts)))
    }
}

impl Drop for FakeDecoder {
    fn drop(&mut self) {
        let what = match self.kind {
            MediaKind::Video => "video decoder",
            _ => "audio decoder",
        };
        self.ledger.close(what);
    }
}

// ── Sinks ───────────────────────────────────────────────────────────

pub struct RecordingPresentation {
    ledger: SharedLedger,
    pub preferred: PixelFormat,
    pub fail_configure: bool,
    pub fail_present_at: Option<usize>,
    /// Virtual time each `present` call takes.
    pub present_cost: Option<(Arc<ManualTimeSource>, Duration)>,
    configured: Option<PixelFormat>,
    presented: usize,
}

impl RecordingPresentation {
    pub fn new(ledger: &SharedLedger) -> Self {
        Self {
            ledger: ledger.clone(),
            preferred: PixelFormat::Rgb24,
            fail_configure: false,
            fail_present_at: None,
            present_cost: None,
            configured: None,
            presented: 0,
        }
    }
}

impl PresentationSink for RecordingPresentation {
    fn preferred_format(&self) -> PixelFormat {
        self.preferred
    }

    fn configure(
        &mut self,
        _width: u32,
        _height: u32,
        pixel_format: PixelFormat,
    ) -> Result<(), SinkError> {
        if self.fail_configure {
            return Err(SinkError::DeviceInit("scripted surface failure".to_string()));
        }
        self.ledger.open("presentation");
        self.configured = Some(pixel_format);
        Ok(())
    }

    fn present(&mut self, frame: &VideoFrame) -> Result<(), SinkError> {
        let pixel_format = self.configured.ok_or(SinkError::NotConfigured)?;
        assert_eq!(frame.pixel_format, pixel_format);
        if self.fail_present_at == Some(self.presented) {
            return Err(SinkError::Device("scripted surface loss".to_string()));
        }
        if let Some((time, cost)) = &self.present_cost {
            time.advance(*cost);
        }
        self.presented += 1;
        self.ledger.lock().presented.push(frame.pts);
        Ok(())
    }
}

impl Drop for RecordingPresentation {
    fn drop(&mut self) {
        if self.configured.is_some() {
            self.ledger.close("presentation");
        }
    }
}

pub struct RecordingAudio {
    ledger: SharedLedger,
    pub fail_configure: bool,
    /// Overrides the spec returned from `configure`.
    pub obtained: Option<AudioSpec>,
    /// Number of upcoming `enqueue` calls refused with backpressure.
    pub backpressure: usize,
    /// Refuse every other `enqueue` call, starting with the first.
    pub alternate_backpressure: bool,
    /// Number of `is_idle` polls answering "busy" at end of stream.
    pub busy_polls: usize,
    pub fail_enqueue: bool,
    configured: bool,
}

impl RecordingAudio {
    pub fn new(ledger: &SharedLedger) -> Self {
        Self {
            ledger: ledger.clone(),
            fail_configure: false,
            obtained: None,
            backpressure: 0,
            alternate_backpressure: false,
            busy_polls: 0,
            fail_enqueue: false,
            configured: false,
        }
    }
}

impl AudioSink for RecordingAudio {
    fn configure(&mut self, requested: AudioSpec) -> Result<AudioSpec, SinkError> {
        {
            let mut ledger = self.ledger.lock();
            ledger.audio_configure_calls += 1;
            ledger.audio_requests.push(requested);
        }
        if self.fail_configure {
            return Err(SinkError::DeviceInit("scripted device failure".to_string()));
        }
        self.ledger.open("audio sink");
        self.configured = true;
        Ok(self.obtained.unwrap_or(requested))
    }

    fn enqueue(&mut self, frame: &AudioFrame) -> Result<(), SinkError> {
        let mut ledger = self.ledger.lock();
        ledger.enqueue_attempts += 1;
        if self.fail_enqueue {
            return Err(SinkError::Device("scripted device loss".to_string()));
        }
        if self.backpressure > 0 {
            self.backpressure -= 1;
            return Err(SinkError::Backpressure);
        }
        if self.alternate_backpressure && ledger.enqueue_attempts % 2 == 1 {
            return Err(SinkError::Backpressure);
        }
        ledger.enqueued.push(frame.pts);
        Ok(())
    }

    fn is_idle(&self) -> bool {
        let mut ledger = self.ledger.lock();
        ledger.idle_polls += 1;
        ledger.idle_polls > self.busy_polls
    }
}

impl Drop for RecordingAudio {
    fn drop(&mut self) {
        if self.configured {
            self.ledger.close("audio sink");
        }
    }
}

pub fn default_audio_spec() -> AudioSpec {
    AudioSpec {
        sample_rate: 48_000,
        channels: 2,
        sample_format: SampleFormat::F32,
    }
}

// ── Time ────────────────────────────────────────────────────────────

/// A virtual clock that moves when slept on, and optionally on every read.
pub struct ManualTimeSource {
    origin: Instant,
    inner: Mutex<ManualTime>,
}

struct ManualTime {
    elapsed: Duration,
    sleeps: usize,
    tick_per_read: Duration,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl ManualTimeSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            origin: Instant::now(),
            inner: Mutex::new(ManualTime {
                elapsed: Duration::ZERO,
                sleeps: 0,
                tick_per_read: Duration::ZERO,
                cancel_after: None,
            }),
        })
    }

    /// Cancel `token` once `sleeps` sleeps have happened.
    pub fn cancel_after(&self, sleeps: usize, token: CancellationToken) {
        self.inner.lock().unwrap().cancel_after = Some((sleeps, token));
    }

    /// Let `tick` pass on every `now()` call, the way a real clock moves
    /// between reads.
    pub fn tick_on_read(&self, tick: Duration) {
        self.inner.lock().unwrap().tick_per_read = tick;
    }

    pub fn advance(&self, duration: Duration) {
        self.inner.lock().unwrap().elapsed += duration;
    }

    pub fn elapsed(&self) -> Duration {
        self.inner.lock().unwrap().elapsed
    }

    pub fn sleeps(&self) -> usize {
        self.inner.lock().unwrap().sleeps
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Instant {
        let mut inner = self.inner.lock().unwrap();
        let tick = inner.tick_per_read;
        inner.elapsed += tick;
        self.origin + inner.elapsed
    }

    fn sleep(&self, duration: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.elapsed += duration;
        inner.sleeps += 1;
        if let Some((after, token)) = &inner.cancel_after {
            if inner.sleeps >= *after {
                token.cancel();
            }
        }
    }
}
