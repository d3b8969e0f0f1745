//! In-memory output client for testing without audio hardware.
//!
//! Implements the full [`OutputClient`] contract over a simulated ring:
//! capacity is sized like the ALSA backend (1/200th of a second), padding
//! drains in real time once the stream is started, and underruns can be
//! scripted to exercise the recovery path in `release_buffer`. Commit and
//! stream-reset counts are recorded so tests can assert on the exact
//! retry behavior, and an optional shared counter tracks open handles for
//! leak assertions.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use tracing::warn;

use crate::client::{ClientState, OutputClient};
use crate::error::{AudioOutputError, AudioOutputResult};
use crate::format::StreamFormat;

/// Ring capacity target, matching the buffering backend: 1/200 s of audio.
const BUFFER_DIVISOR: u32 = 200;

/// Simulated platform status code recorded for a scripted underrun.
const MOCK_UNDERRUN_CODE: i32 = -32;

/// Mock implementation of [`OutputClient`].
pub struct MockClient {
    format: StreamFormat,
    capacity_frames: u32,
    staging: Vec<u8>,
    lease_frames: Option<u32>,
    state: ClientState,

    /// Frames committed but not yet "played"; drains in real time from
    /// `started_at` while the stream runs.
    queued_frames: u64,
    started_at: Option<Instant>,

    /// Scripted number of commits that will fail with a simulated underrun
    /// before succeeding.
    underruns_remaining: u32,

    /// Every successfully committed frame count, in order.
    pub committed: Vec<u32>,
    /// Number of stream-pointer resets performed by underrun recovery.
    pub prepare_calls: u32,

    last_error: i32,
    open_counter: Option<Arc<AtomicUsize>>,
}

impl MockClient {
    /// Open a mock client for `format`.
    pub fn open(format: StreamFormat) -> AudioOutputResult<Self> {
        let capacity_frames = (format.frames_per_sec / BUFFER_DIVISOR).max(1);
        Ok(Self {
            format,
            capacity_frames,
            staging: vec![0; format.frames_to_bytes(capacity_frames)],
            lease_frames: None,
            state: ClientState::Open,
            queued_frames: 0,
            started_at: None,
            underruns_remaining: 0,
            committed: Vec::new(),
            prepare_calls: 0,
            last_error: 0,
            open_counter: None,
        })
    }

    /// Open a mock client that participates in handle-leak accounting:
    /// `counter` is incremented now and decremented exactly once at close.
    pub fn open_with_counter(
        format: StreamFormat,
        counter: Arc<AtomicUsize>,
    ) -> AudioOutputResult<Self> {
        let mut client = Self::open(format)?;
        counter.fetch_add(1, Ordering::SeqCst);
        client.open_counter = Some(counter);
        Ok(client)
    }

    /// Script the next `count` commits to fail with a simulated underrun
    /// before the commit goes through.
    pub fn fail_next_commits(&mut self, count: u32) {
        self.underruns_remaining = count;
    }

    /// Frames currently queued ahead of the simulated playback position.
    fn drained_queue(&self) -> u64 {
        let Some(started_at) = self.started_at else {
            return self.queued_frames;
        };
        let consumed =
            (started_at.elapsed().as_secs_f64() * f64::from(self.format.frames_per_sec)) as u64;
        self.queued_frames.saturating_sub(consumed)
    }
}

impl OutputClient for MockClient {
    fn format(&self) -> &StreamFormat {
        &self.format
    }

    fn state(&self) -> ClientState {
        self.state
    }

    fn start(&mut self) -> AudioOutputResult<()> {
        if self.state == ClientState::Closed {
            return Err(AudioOutputError::invalid_state(self.state.as_str(), "start"));
        }
        self.started_at = Some(Instant::now());
        self.state = ClientState::Started;
        Ok(())
    }

    fn stop(&mut self) -> AudioOutputResult<()> {
        if self.state == ClientState::Closed {
            return Err(AudioOutputError::invalid_state(self.state.as_str(), "stop"));
        }
        self.queued_frames = 0;
        self.started_at = None;
        self.state = ClientState::Stopped;
        Ok(())
    }

    fn buffer_frames(&mut self) -> u32 {
        if self.state == ClientState::Closed {
            return 0;
        }
        self.capacity_frames
    }

    fn padding_frames(&mut self) -> u32 {
        if self.state == ClientState::Closed {
            return 0;
        }
        self.drained_queue().min(u64::from(self.capacity_frames)) as u32
    }

    fn acquire_buffer(&mut self, frames: u32) -> AudioOutputResult<&mut [u8]> {
        if self.state == ClientState::Closed {
            return Err(AudioOutputError::invalid_state(self.state.as_str(), "acquire_buffer"));
        }
        let available = self.capacity_frames - self.padding_frames();
        if frames == 0 || frames > available {
            self.last_error = -1;
            return Err(AudioOutputError::buffer_unavailable(frames, available));
        }
        self.lease_frames = Some(frames);
        let bytes = self.format.frames_to_bytes(frames);
        Ok(&mut self.staging[..bytes])
    }

    fn release_buffer(&mut self, written: u32) -> AudioOutputResult<()> {
        if self.state == ClientState::Closed {
            return Err(AudioOutputError::invalid_state(self.state.as_str(), "release_buffer"));
        }
        let leased = self
            .lease_frames
            .take()
            .ok_or_else(|| AudioOutputError::invalid_state(self.state.as_str(), "release without lease"))?;
        let written = written.min(leased);

        loop {
            if self.underruns_remaining > 0 {
                // Simulated pipeline-empty signal: reset the stream pointer
                // and retry the commit, as the real backends do.
                self.underruns_remaining -= 1;
                self.prepare_calls += 1;
                self.last_error = MOCK_UNDERRUN_CODE;
                warn!("simulated underrun during commit, retrying");
                continue;
            }
            self.queued_frames += u64::from(written);
            self.committed.push(written);
            self.last_error = 0;
            return Ok(());
        }
    }

    fn last_error_code(&self) -> i32 {
        self.last_error
    }

    fn close(&mut self) {
        if self.state == ClientState::Closed {
            return;
        }
        if let Some(counter) = self.open_counter.take() {
            counter.fetch_sub(1, Ordering::SeqCst);
        }
        self.state = ClientState::Closed;
    }
}

impl Drop for MockClient {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SampleKind;

    fn stereo_float() -> StreamFormat {
        StreamFormat::float32(2, 48_000)
    }

    #[test]
    fn open_then_close_releases_every_handle() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut client =
            MockClient::open_with_counter(stereo_float(), Arc::clone(&counter)).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        client.close();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn drop_without_close_releases_handles() {
        let counter = Arc::new(AtomicUsize::new(0));
        let client = MockClient::open_with_counter(stereo_float(), Arc::clone(&counter)).unwrap();
        drop(client);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn double_close_does_not_double_release() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut client =
            MockClient::open_with_counter(stereo_float(), Arc::clone(&counter)).unwrap();
        client.close();
        client.close();
        drop(client);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn capacity_is_at_least_one_frame() {
        let mut client = MockClient::open(stereo_float()).unwrap();
        assert!(client.buffer_frames() >= 1);

        // Even a degenerate rate below the divisor yields a usable ring.
        let mut tiny = MockClient::open(StreamFormat::int16(1, 100)).unwrap();
        assert!(tiny.buffer_frames() >= 1);
    }

    #[test]
    fn acquire_up_to_available_never_fails_after_start() {
        // Fresh client per request size: the property holds for any
        // n <= capacity - padding immediately after start.
        for divisor in [1u32, 2, 4] {
            let mut client = MockClient::open(stereo_float()).unwrap();
            client.start().unwrap();
            let available = client.buffer_frames() - client.padding_frames();
            let frames = (available / divisor).max(1);
            let region = client.acquire_buffer(frames).unwrap();
            assert_eq!(region.len(), frames as usize * 8);
            client.release_buffer(frames).unwrap();
        }
    }

    #[test]
    fn acquire_beyond_capacity_is_refused() {
        let mut client = MockClient::open(stereo_float()).unwrap();
        client.start().unwrap();
        let capacity = client.buffer_frames();
        let err = client.acquire_buffer(capacity + 1).unwrap_err();
        assert!(matches!(err, AudioOutputError::BufferUnavailable { .. }));
    }

    #[test]
    fn underrun_recovery_retries_exactly_once() {
        let mut client = MockClient::open(stereo_float()).unwrap();
        client.start().unwrap();
        client.fail_next_commits(1);

        let frames = 64;
        client.acquire_buffer(frames).unwrap();
        client.release_buffer(frames).unwrap();

        // One pointer reset, then a single successful commit: nothing
        // duplicated, nothing dropped.
        assert_eq!(client.prepare_calls, 1);
        assert_eq!(client.committed, vec![frames]);
    }

    #[test]
    fn operations_after_close_are_rejected() {
        let mut client = MockClient::open(stereo_float()).unwrap();
        client.close();
        assert_eq!(client.buffer_frames(), 0);
        assert_eq!(client.padding_frames(), 0);
        assert!(client.start().is_err());
        assert!(client.stop().is_err());
        assert!(client.acquire_buffer(1).is_err());
    }

    #[test]
    fn release_without_lease_is_rejected() {
        let mut client = MockClient::open(stereo_float()).unwrap();
        client.start().unwrap();
        assert!(client.release_buffer(16).is_err());
    }
}
