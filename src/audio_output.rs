//! Audio device output (requires the `audio-output` feature).
//!
//! [`DeviceAudioSink`] plays decoded samples on the default output device.
//! The device callback pulls from a bounded ring buffer; when the buffer is
//! too full for a frame, [`enqueue`](AudioSink::enqueue) returns
//! [`SinkError::Backpressure`] and the pipeline retries later. A frame
//! larger than the whole buffer is fed in over several retries.

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::{Arc, Mutex},
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::error::SinkError;
use crate::frame::{AudioFrame, SampleFormat};
use crate::sink::{AudioSink, AudioSpec};

/// The ring buffer holds one second of audio divided by this.
const BUFFER_SECONDS_DIVISOR: usize = 2;

/// Bounded FIFO of interleaved `f32` samples shared with the device callback.
struct SampleRing {
    buffer: Vec<f32>,
    write_pos: usize,
    read_pos: usize,
    len: usize,
}

impl SampleRing {
    fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity.max(1)],
            write_pos: 0,
            read_pos: 0,
            len: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.buffer.len()
    }

    fn free(&self) -> usize {
        self.capacity() - self.len
    }

    /// Append as many samples as fit; returns how many were written.
    fn push(&mut self, samples: &[f32]) -> usize {
        let count = samples.len().min(self.free());
        for &sample in &samples[..count] {
            self.buffer[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % self.capacity();
        }
        self.len += count;
        count
    }

    /// Fill `output`, padding with silence once the buffer runs dry.
    fn pull(&mut self, output: &mut [f32]) {
        for sample in output.iter_mut() {
            if self.len > 0 {
                *sample = self.buffer[self.read_pos];
                self.read_pos = (self.read_pos + 1) % self.capacity();
                self.len -= 1;
            } else {
                *sample = 0.0;
            }
        }
    }
}

/// How far an oversized frame has got into the ring.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PartialWrite {
    pts: Duration,
    total: usize,
    written: usize,
}

/// Write `samples` into `ring`, returning whether the whole frame is in.
///
/// Frames that fit the ring go in whole or not at all. Larger frames go in
/// as far as there is room, and `partial` remembers where to resume when
/// the same frame is offered again.
fn write_frame(
    ring: &mut SampleRing,
    partial: &mut Option<PartialWrite>,
    pts: Duration,
    samples: &[f32],
) -> bool {
    if samples.len() <= ring.capacity() {
        *partial = None;
        if samples.len() > ring.free() {
            return false;
        }
        ring.push(samples);
        return true;
    }

    let offset = match *partial {
        Some(progress) if progress.pts == pts && progress.total == samples.len() => {
            progress.written
        }
        _ => 0,
    };
    let written = offset + ring.push(&samples[offset..]);
    if written == samples.len() {
        *partial = None;
        return true;
    }
    *partial = Some(PartialWrite {
        pts,
        total: samples.len(),
        written,
    });
    false
}

/// An [`AudioSink`] playing through the system's default output device.
///
/// Always obtains `f32` output; the decoder converts to it.
#[derive(Default)]
pub struct DeviceAudioSink {
    ring: Option<Arc<Mutex<SampleRing>>>,
    stream: Option<cpal::Stream>,
    spec: Option<AudioSpec>,
    partial: Option<PartialWrite>,
}

impl Debug for DeviceAudioSink {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("DeviceAudioSink")
            .field("spec", &self.spec)
            .field("open", &self.stream.is_some())
            .finish()
    }
}

impl DeviceAudioSink {
    /// Create a sink. The device is opened by
    /// [`configure`](AudioSink::configure).
    pub fn new() -> Self {
        Self::default()
    }
}

/// Pick the output configuration closest to `requested` among those the
/// device supports, falling back to the device default.
fn negotiate(
    device: &cpal::Device,
    requested: AudioSpec,
) -> Result<cpal::SupportedStreamConfig, SinkError> {
    let ranges: Vec<_> = device
        .supported_output_configs()
        .map_err(|error| SinkError::DeviceInit(error.to_string()))?
        .filter(|range| range.sample_format() == cpal::SampleFormat::F32)
        .collect();

    let fits_rate = |range: &&cpal::SupportedStreamConfigRange| {
        range.min_sample_rate() <= requested.sample_rate
            && requested.sample_rate <= range.max_sample_rate()
    };
    let exact = ranges
        .iter()
        .filter(fits_rate)
        .find(|range| range.channels() == requested.channels);
    let same_rate = ranges.iter().filter(fits_rate).min_by_key(|range| {
        (i32::from(range.channels()) - i32::from(requested.channels)).unsigned_abs()
    });

    if let Some(range) = exact.or(same_rate) {
        return Ok(range.with_sample_rate(requested.sample_rate));
    }

    let fallback = device
        .default_output_config()
        .map_err(|error| SinkError::DeviceInit(error.to_string()))?;
    if fallback.sample_format() != cpal::SampleFormat::F32 {
        return Err(SinkError::UnsupportedFormat(format!(
            "device only offers {:?} output",
            fallback.sample_format()
        )));
    }
    Ok(fallback)
}

impl AudioSink for DeviceAudioSink {
    fn configure(&mut self, requested: AudioSpec) -> Result<AudioSpec, SinkError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| SinkError::DeviceInit("no output audio device".to_string()))?;

        let supported = negotiate(&device, requested)?;
        let config: cpal::StreamConfig = supported.into();
        let obtained = AudioSpec {
            sample_rate: config.sample_rate,
            channels: config.channels,
            sample_format: SampleFormat::F32,
        };

        let capacity =
            obtained.sample_rate as usize * usize::from(obtained.channels) / BUFFER_SECONDS_DIVISOR;
        let ring = Arc::new(Mutex::new(SampleRing::new(capacity)));
        let callback_ring = Arc::clone(&ring);

        let stream = device
            .build_output_stream(
                &config,
                move |output: &mut [f32], _| match callback_ring.lock() {
                    Ok(mut ring) => ring.pull(output),
                    Err(_) => output.fill(0.0),
                },
                |error| log::error!("Audio output error: {error}"),
                None,
            )
            .map_err(|error| SinkError::DeviceInit(error.to_string()))?;
        stream
            .play()
            .map_err(|error| SinkError::DeviceInit(error.to_string()))?;

        log::debug!(
            "Opened audio device: {} Hz, {} channels, {capacity} sample buffer",
            obtained.sample_rate,
            obtained.channels,
        );
        self.ring = Some(ring);
        self.stream = Some(stream);
        self.spec = Some(obtained);
        Ok(obtained)
    }

    fn enqueue(&mut self, frame: &AudioFrame) -> Result<(), SinkError> {
        let (Some(ring), Some(spec)) = (self.ring.as_ref(), self.spec) else {
            return Err(SinkError::NotConfigured);
        };
        if frame.channels != spec.channels || frame.sample_rate != spec.sample_rate {
            return Err(SinkError::UnsupportedFormat(format!(
                "frame is {} Hz x{}, device is {} Hz x{}",
                frame.sample_rate, frame.channels, spec.sample_rate, spec.channels
            )));
        }

        let samples = frame.to_f32_samples();
        let mut ring = ring
            .lock()
            .map_err(|_| SinkError::Device("audio buffer lock poisoned".to_string()))?;

        if write_frame(&mut ring, &mut self.partial, frame.pts, &samples) {
            Ok(())
        } else {
            Err(SinkError::Backpressure)
        }
    }

    fn is_idle(&self) -> bool {
        self.ring
            .as_ref()
            .and_then(|ring| ring.lock().ok().map(|ring| ring.len == 0))
            .unwrap_or(true)
    }
}

impl Drop for DeviceAudioSink {
    fn drop(&mut self) {
        if self.stream.take().is_some() {
            log::debug!("Closed audio device");
        }
    }
}
