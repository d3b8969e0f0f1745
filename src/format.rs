//! PCM stream format description and validation.
//!
//! A [`StreamFormat`] is supplied once when a client is opened and never
//! mutated afterwards. It mirrors a standard PCM wave-format descriptor:
//! sample kind, channel count, bits per sample, block alignment (bytes per
//! interleaved frame), and frame rate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{AudioOutputError, AudioOutputResult};

/// On-wire format tag for integer PCM samples.
const FORMAT_TAG_PCM: u16 = 1;
/// On-wire format tag for IEEE float samples.
const FORMAT_TAG_FLOAT: u16 = 3;

/// The sample encoding carried by a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleKind {
    /// Signed 16-bit integer PCM, little endian.
    Int16,
    /// 32-bit IEEE float, little endian.
    Float32,
}

impl SampleKind {
    /// Bits per sample implied by this encoding.
    pub const fn bits_per_sample(self) -> u16 {
        match self {
            Self::Int16 => 16,
            Self::Float32 => 32,
        }
    }

    /// Wave-format descriptor tag (1 = integer PCM, 3 = IEEE float).
    pub const fn format_tag(self) -> u16 {
        match self {
            Self::Int16 => FORMAT_TAG_PCM,
            Self::Float32 => FORMAT_TAG_FLOAT,
        }
    }

    /// Map a wave-format descriptor tag to a sample kind.
    ///
    /// Tag 1 selects integer PCM; any other value selects float, matching
    /// the descriptor convention used across the export boundary.
    pub const fn from_format_tag(tag: u16) -> Self {
        if tag == FORMAT_TAG_PCM {
            Self::Int16
        } else {
            Self::Float32
        }
    }
}

/// Immutable description of a PCM output stream.
///
/// Invariant: `frame_size == bits_per_sample / 8 * channels`. Construction
/// rejects any combination that breaks it, so a value of this type is always
/// internally consistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFormat {
    /// Sample encoding.
    pub sample_kind: SampleKind,
    /// Number of interleaved channels per frame.
    pub channels: u16,
    /// Bits per single sample.
    pub bits_per_sample: u16,
    /// Bytes per interleaved frame (block alignment).
    pub frame_size: u16,
    /// Frames per second.
    pub frames_per_sec: u32,
}

impl StreamFormat {
    /// Build a format from explicit descriptor fields, validating the
    /// frame-size invariant.
    pub fn new(
        sample_kind: SampleKind,
        channels: u16,
        bits_per_sample: u16,
        frame_size: u16,
        frames_per_sec: u32,
    ) -> AudioOutputResult<Self> {
        if channels == 0 {
            return Err(AudioOutputError::invalid_format("channel count must be at least 1"));
        }
        if frames_per_sec == 0 {
            return Err(AudioOutputError::invalid_format("frame rate must be at least 1"));
        }
        if bits_per_sample != sample_kind.bits_per_sample() {
            return Err(AudioOutputError::invalid_format(format!(
                "{bits_per_sample}-bit samples not supported for {sample_kind:?}"
            )));
        }
        let expected_frame_size = u32::from(bits_per_sample / 8) * u32::from(channels);
        if u32::from(frame_size) != expected_frame_size {
            return Err(AudioOutputError::invalid_format(format!(
                "frame size {frame_size} does not match {bits_per_sample}-bit x {channels}ch \
                 (expected {expected_frame_size})"
            )));
        }
        Ok(Self {
            sample_kind,
            channels,
            bits_per_sample,
            frame_size,
            frames_per_sec,
        })
    }

    /// Signed 16-bit integer PCM with the frame size derived from the
    /// channel count.
    pub fn int16(channels: u16, frames_per_sec: u32) -> Self {
        Self {
            sample_kind: SampleKind::Int16,
            channels,
            bits_per_sample: 16,
            frame_size: 2 * channels,
            frames_per_sec,
        }
    }

    /// 32-bit float PCM with the frame size derived from the channel count.
    pub fn float32(channels: u16, frames_per_sec: u32) -> Self {
        Self {
            sample_kind: SampleKind::Float32,
            channels,
            bits_per_sample: 32,
            frame_size: 4 * channels,
            frames_per_sec,
        }
    }

    /// Average bytes consumed per second of playback.
    pub const fn bytes_per_second(&self) -> u32 {
        self.frames_per_sec * self.frame_size as u32
    }

    /// Byte length of a region holding `frames` interleaved frames.
    pub const fn frames_to_bytes(&self, frames: u32) -> usize {
        frames as usize * self.frame_size as usize
    }

    /// Wall-clock playback duration of `frames` frames.
    pub fn frames_to_duration(&self, frames: u32) -> Duration {
        Duration::from_secs_f64(f64::from(frames) / f64::from(self.frames_per_sec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_constructors_satisfy_invariant() {
        let f = StreamFormat::float32(2, 48_000);
        assert_eq!(f.bits_per_sample, 32);
        assert_eq!(f.frame_size, 8);
        assert_eq!(f.bytes_per_second(), 384_000);

        let i = StreamFormat::int16(1, 44_100);
        assert_eq!(i.frame_size, 2);
        assert_eq!(i.bytes_per_second(), 88_200);
    }

    #[test]
    fn new_validates_descriptor_fields() {
        assert!(StreamFormat::new(SampleKind::Float32, 2, 32, 8, 48_000).is_ok());

        // Unsupported bit depth for the sample kind
        assert!(StreamFormat::new(SampleKind::Int16, 2, 3, 1, 48_000).is_err());
        // Broken frame-size invariant
        assert!(StreamFormat::new(SampleKind::Int16, 2, 16, 6, 48_000).is_err());
        // Degenerate channel count / rate
        assert!(StreamFormat::new(SampleKind::Int16, 0, 16, 0, 48_000).is_err());
        assert!(StreamFormat::new(SampleKind::Int16, 2, 16, 4, 0).is_err());
    }

    #[test]
    fn format_tag_round_trip() {
        assert_eq!(SampleKind::Int16.format_tag(), 1);
        assert_eq!(SampleKind::Float32.format_tag(), 3);
        assert_eq!(SampleKind::from_format_tag(1), SampleKind::Int16);
        // Any non-PCM tag is treated as float
        assert_eq!(SampleKind::from_format_tag(3), SampleKind::Float32);
        assert_eq!(SampleKind::from_format_tag(0xFFFE), SampleKind::Float32);
    }

    #[test]
    fn frame_math() {
        let f = StreamFormat::float32(2, 48_000);
        assert_eq!(f.frames_to_bytes(240), 1920);
        assert_eq!(f.frames_to_duration(48_000), Duration::from_secs(1));
        assert_eq!(f.frames_to_duration(240), Duration::from_millis(5));
    }
}
