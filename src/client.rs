//! The uniform output-client contract implemented by every backend.
//!
//! A client moves through `Open -> {Started <-> Stopped} -> Closed`.
//! `Closed` is terminal: after [`OutputClient::close`] the only valid
//! operation is another `close` (a no-op). The buffer-exchange cycle is
//! `acquire_buffer` -> fill -> `release_buffer`, repeated while the stream
//! runs.
//!
//! # Ownership and threading
//!
//! A client has a single logical owner. The acquire/fill/release sequence is
//! serialized by `&mut self`, typically driven from one dedicated thread.
//! `start`/`stop` may be issued from a controlling thread, but must not race
//! a lease in progress; the client performs no internal locking. For a
//! locked, callback-driven alternative see
//! [`PlaybackContext`](crate::context::PlaybackContext).

use crate::error::AudioOutputResult;
use crate::format::StreamFormat;

/// Lifecycle state of an output client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Device acquired and stream negotiated; not yet consuming frames.
    Open,
    /// The stream is actively consuming queued frames.
    Started,
    /// Halted (or drained); may be started again where the backend allows.
    Stopped,
    /// All handles released. Terminal.
    Closed,
}

impl ClientState {
    /// Static name for error reporting.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Started => "started",
            Self::Stopped => "stopped",
            Self::Closed => "closed",
        }
    }
}

/// Uniform start/stop/buffer-exchange contract over the platform backends.
///
/// Exactly one backend is compiled into a given binary; use
/// [`open`](crate::backend::open) to construct the one for the current
/// platform.
pub trait OutputClient: Send {
    /// The immutable format this client was opened with.
    fn format(&self) -> &StreamFormat;

    /// Current lifecycle state.
    fn state(&self) -> ClientState;

    /// Transition the stream to actively consuming queued frames.
    ///
    /// Calling `start` on an already-started stream is platform-dependent;
    /// each backend documents the behavior it inherits from the OS.
    fn start(&mut self) -> AudioOutputResult<()>;

    /// Drain (where supported) or halt the stream. Safe to call repeatedly.
    fn stop(&mut self) -> AudioOutputResult<()>;

    /// Total ring capacity in frames.
    ///
    /// Returns 0 and records the platform status code on query failure
    /// instead of erroring; this is polled in a latency-sensitive loop.
    fn buffer_frames(&mut self) -> u32;

    /// Frames already queued for playback but not yet consumed by hardware.
    ///
    /// Returns 0 on query failure and on backends that cannot report
    /// padding (the ALSA backend, which treats the ring as always drained).
    fn padding_frames(&mut self) -> u32;

    /// Lease a contiguous writable region of exactly `frames` frames.
    ///
    /// The region is a scoped loan into the hardware ring (or its staging
    /// buffer): the mutable borrow ends at the matching
    /// [`release_buffer`](Self::release_buffer) call and must never be
    /// retained past it. One lease may be outstanding at a time. Never
    /// blocks waiting for space.
    fn acquire_buffer(&mut self, frames: u32) -> AudioOutputResult<&mut [u8]>;

    /// Commit `written` frames (at most the leased amount) of caller-written
    /// PCM back to the OS for playback.
    ///
    /// On a transient underrun the backend resets the stream pointer and
    /// retries the commit instead of propagating the error. This is the one
    /// retry policy in the system; every other failure is terminal for the
    /// call.
    fn release_buffer(&mut self, written: u32) -> AudioOutputResult<()>;

    /// Most recent platform status code, 0 meaning success.
    ///
    /// Only the WASAPI backend populates this (it reports some asynchronous
    /// configuration failures by status rather than by return value); the
    /// ALSA backend has no status-code concept and always reports 0.
    fn last_error_code(&self) -> i32;

    /// Release all handles in reverse-acquisition order.
    ///
    /// Safe on a partially initialized client and idempotent: a second
    /// close is a no-op. After close, every other operation fails or
    /// returns its sentinel value.
    fn close(&mut self);
}
