// Correctness and logic
#![warn(clippy::unit_cmp)]
#![warn(clippy::match_same_arms)]
// Performance-focused
#![warn(clippy::inefficient_to_string)]
#![warn(clippy::map_clone)]
#![warn(clippy::unnecessary_to_owned)]
// Style and idiomatic Rust
#![warn(clippy::redundant_clone)]
#![warn(clippy::needless_return)]
#![warn(clippy::manual_map)]
#![warn(clippy::unwrap_used)]
// Maintainability
#![warn(clippy::missing_panics_doc)]
#![warn(clippy::missing_safety_doc)]
#![deny(missing_docs)] // Documentation is a must for release

//! # audio-output
//!
//! Low-latency shared-mode audio output for Windows (WASAPI) and Linux
//! (ALSA), behind one uniform client contract, with a flat C ABI for
//! embedding in managed runtimes.
//!
//! ## Overview
//!
//! The crate wraps the operating system's audio pipeline and nothing else:
//! acquire the default render device, negotiate a shared-mode stream for an
//! immutable [`StreamFormat`], then exchange buffers with the hardware ring
//! — lease a writable region, fill it with interleaved PCM, commit it. The
//! ring itself (sizing, double buffering) is OS-managed; the client only
//! holds transient write leases into it.
//!
//! Exactly one platform backend is compiled per target. Both implement
//! [`OutputClient`]; [`open`] selects the right one.
//!
//! ## Features
//!
//! - `device-native` (default): the WASAPI and ALSA backends.
//! - `device-mock`: an in-memory device implementing the same contract,
//!   for testing without audio hardware.
//!
//! ## Quick Start
//!
//! ### Pull-style: drive the buffer exchange yourself
//!
//! ```rust,no_run
//! use audio_output::{open, StreamFormat};
//!
//! # fn main() -> audio_output::AudioOutputResult<()> {
//! let mut client = open(StreamFormat::float32(2, 48_000))?;
//! client.start()?;
//!
//! let frames = client.buffer_frames() - client.padding_frames();
//! let region = client.acquire_buffer(frames)?;
//! region.fill(0); // silence
//! client.release_buffer(frames)?;
//!
//! client.stop()?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Push-style: supply a render callback
//!
//! ```rust,no_run
//! use audio_output::{PlaybackContext, StreamFormat};
//!
//! # fn main() -> audio_output::AudioOutputResult<()> {
//! let context = PlaybackContext::open(StreamFormat::int16(2, 44_100))?;
//! context.play(|frames, region| {
//!     // fill `frames` frames of interleaved PCM into `region`
//!     region.fill(0);
//! })?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Formats
//!
//! ```rust
//! use audio_output::{SampleKind, StreamFormat};
//!
//! let format = StreamFormat::float32(2, 48_000);
//! assert_eq!(format.frame_size, 8);
//! assert_eq!(format.bytes_per_second(), 384_000);
//!
//! // Descriptor-field construction validates the frame-size invariant.
//! assert!(StreamFormat::new(SampleKind::Int16, 2, 3, 1, 48_000).is_err());
//! ```
//!
//! ## Error Handling
//!
//! Fallible operations return [`AudioOutputResult`]. The latency-sensitive
//! queries (`buffer_frames`, `padding_frames`) instead return 0 on failure
//! and record the platform status code, retrievable through
//! [`OutputClient::last_error_code`] — the WASAPI backend reports some
//! asynchronous configuration failures only through that code.
//!
//! ## C ABI
//!
//! Building the `cdylib` exports the flat `audio_output_*` function table
//! (see [`ffi`]) for P/Invoke-style consumption from a managed runtime.

pub mod backend;
pub mod client;
pub mod context;
pub mod error;
pub mod ffi;
pub mod format;

pub use backend::open;
pub use client::{ClientState, OutputClient};
pub use context::PlaybackContext;
pub use error::{AudioOutputError, AudioOutputResult};
pub use format::{SampleKind, StreamFormat};

#[cfg(test)]
mod tests {
    //! End-to-end exercises of the public surface (unit-test builds
    //! resolve [`open`] to the mock backend).

    use super::*;

    #[test]
    fn silence_scenario_sets_no_error() {
        // Open {float32, 2ch, 32-bit, frame size 8, 48 kHz} and walk the
        // whole lifecycle; no step may leave an error code behind.
        let format = StreamFormat::new(SampleKind::Float32, 2, 32, 8, 48_000).unwrap();
        let mut client = open(format).unwrap();
        assert_eq!(client.last_error_code(), 0);
        assert_eq!(client.state(), ClientState::Open);

        client.start().unwrap();
        assert_eq!(client.last_error_code(), 0);

        let region = client.acquire_buffer(240).unwrap();
        assert_eq!(region.len(), 240 * 8);
        region.fill(0);
        client.release_buffer(240).unwrap();
        assert_eq!(client.last_error_code(), 0);

        client.stop().unwrap();
        assert_eq!(client.last_error_code(), 0);

        client.close();
        assert_eq!(client.state(), ClientState::Closed);
        client.close(); // terminal state: second close is a no-op
    }

    #[test]
    fn capacity_query_precedes_any_lease() {
        let mut client = open(StreamFormat::int16(1, 8_000)).unwrap();
        assert!(client.buffer_frames() >= 1);
    }

    #[test]
    fn open_rejects_invalid_descriptor() {
        let err = StreamFormat::new(SampleKind::Int16, 2, 3, 1, 48_000).unwrap_err();
        assert!(err.is_format_error());
    }
}
