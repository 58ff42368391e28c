//! Internal conversion helpers.
//!
//! Copying strided FFmpeg frame data into tightly packed buffers, and moving
//! packets and timestamps between FFmpeg's representation and the crate's.

use ffmpeg_next::{
    Packet as FfmpegPacket, Rational,
    frame::{Audio as FfmpegAudioFrame, Video as FfmpegVideoFrame},
    packet::Flags as PacketFlags,
};

use crate::frame::{PixelFormat, Plane};
use crate::packet::{Packet, TimeBase};

impl From<Rational> for TimeBase {
    fn from(rational: Rational) -> Self {
        TimeBase::new(rational.numerator(), rational.denominator())
    }
}

/// Copy every plane of an FFmpeg video frame into tightly packed [`Plane`]s.
///
/// FFmpeg pads rows to an alignment boundary, so `stride` is frequently
/// larger than the visible row. Rows are copied one by one in that case.
pub(crate) fn copy_planes(
    video_frame: &FfmpegVideoFrame,
    pixel_format: PixelFormat,
    width: u32,
    height: u32,
) -> Vec<Plane> {
    (0..pixel_format.plane_count())
        .map(|index| {
            let (row_bytes, rows) = pixel_format.plane_geometry(index, width, height);
            let stride = video_frame.stride(index);
            let data = video_frame.data(index);
            Plane {
                data: pack_rows(data, stride, row_bytes, rows),
                stride: row_bytes,
            }
        })
        .collect()
}

/// Pack `rows` rows of `row_bytes` each out of a buffer with row pitch
/// `stride`.
pub(crate) fn pack_rows(data: &[u8], stride: usize, row_bytes: usize, rows: usize) -> Vec<u8> {
    if stride == row_bytes {
        return data[..row_bytes * rows].to_vec();
    }

    let mut buffer = Vec::with_capacity(row_bytes * rows);
    for row in 0..rows {
        let row_start = row * stride;
        buffer.extend_from_slice(&data[row_start..row_start + row_bytes]);
    }
    buffer
}

/// Copy the interleaved sample bytes out of a packed FFmpeg audio frame.
pub(crate) fn copy_samples(audio_frame: &FfmpegAudioFrame, bytes_per_frame: usize) -> Vec<u8> {
    let length = audio_frame.samples() * bytes_per_frame;
    audio_frame.data(0)[..length].to_vec()
}

/// Build the crate's [`Packet`] from a freshly demuxed FFmpeg packet.
pub(crate) fn packet_from_ffmpeg(packet: &FfmpegPacket, time_base: TimeBase) -> Packet {
    Packet {
        stream_index: packet.stream(),
        pts: packet.pts(),
        dts: packet.dts(),
        duration: packet.duration(),
        time_base,
        is_keyframe: packet.is_key(),
        payload: packet.data().map(<[u8]>::to_vec).unwrap_or_default(),
    }
}

/// Rebuild an FFmpeg packet from the crate's [`Packet`] for submission to a
/// decoder.
pub(crate) fn packet_to_ffmpeg(packet: &Packet) -> FfmpegPacket {
    let mut ffmpeg_packet = FfmpegPacket::copy(&packet.payload);
    ffmpeg_packet.set_stream(packet.stream_index);
    ffmpeg_packet.set_pts(packet.pts);
    ffmpeg_packet.set_dts(packet.dts);
    ffmpeg_packet.set_duration(packet.duration);
    if packet.is_keyframe {
        ffmpeg_packet.set_flags(PacketFlags::KEY);
    }
    ffmpeg_packet
}
