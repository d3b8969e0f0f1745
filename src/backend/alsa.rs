//! ALSA output client for Linux.
//!
//! Opens the `default` playback PCM in shared (dmix-routed) mode and
//! negotiates interleaved read/write access with a buffer of roughly 5 ms
//! (1/200th of a second of audio). ALSA has no zero-copy render lease in
//! this access mode, so the client owns a staging buffer: `acquire_buffer`
//! hands out a slice of it and `release_buffer` performs the actual
//! interleaved write.
//!
//! Error idiom: silent degrade. There is no stored status code
//! ([`last_error_code`](crate::client::OutputClient::last_error_code) is
//! always 0); failures either surface as `Err` from the fallible
//! operations or are absorbed by the underrun recovery in
//! `release_buffer`. Padding is not reported by this access mode, so
//! `padding_frames` is defined as always 0 — the ring is treated as fully
//! drained, a documented simplification callers must accept.

use alsa::pcm::{Access, Format, HwParams, PCM};
use alsa::{Direction, ValueOr};
use tracing::{debug, warn};

use crate::client::{ClientState, OutputClient};
use crate::error::{AudioOutputError, AudioOutputResult};
use crate::format::{SampleKind, StreamFormat};

/// Denominator of the buffer-duration target: 1/200th of a second (~5 ms).
const BUFFER_DIVISOR: u32 = 200;

/// ALSA implementation of [`OutputClient`].
pub struct AlsaClient {
    pcm: Option<PCM>,
    format: StreamFormat,
    /// Caller-visible staging area handed out by `acquire_buffer`.
    staging: Vec<u8>,
    /// Frames of the outstanding lease, if any.
    lease_frames: Option<u32>,
    capacity_frames: u32,
    state: ClientState,
}

impl AlsaClient {
    /// Open the default playback PCM and negotiate hardware parameters
    /// for `format`.
    pub fn open(format: StreamFormat) -> AudioOutputResult<Self> {
        let pcm = PCM::new("default", Direction::Playback, false)
            .map_err(|e| AudioOutputError::device_unavailable(e.to_string()))?;

        let sample_format = match format.sample_kind {
            SampleKind::Int16 => Format::S16LE,
            SampleKind::Float32 => Format::FloatLE,
        };

        let target_frames = (format.frames_per_sec / BUFFER_DIVISOR).max(1);

        // Scoped so the hw-params borrow of `pcm` ends before we move it.
        let capacity_frames = {
            let hwp = HwParams::any(&pcm)?;
            hwp.set_access(Access::RWInterleaved)?;
            hwp.set_format(sample_format)
                .map_err(|e| AudioOutputError::format_unsupported(e.to_string()))?;
            hwp.set_channels(u32::from(format.channels))
                .map_err(|e| AudioOutputError::format_unsupported(e.to_string()))?;
            hwp.set_rate(format.frames_per_sec, ValueOr::Nearest)
                .map_err(|e| AudioOutputError::format_unsupported(e.to_string()))?;
            hwp.set_periods(2, ValueOr::Nearest)?;
            hwp.set_buffer_size_near(i64::from(target_frames))?;
            pcm.hw_params(&hwp)
                .map_err(|e| AudioOutputError::activation_failed(e.to_string()))?;
            hwp.get_buffer_size()? as u32
        };

        debug!(
            rate = format.frames_per_sec,
            channels = format.channels,
            capacity_frames,
            "opened ALSA playback stream"
        );

        Ok(Self {
            pcm: Some(pcm),
            format,
            staging: vec![0; format.frames_to_bytes(capacity_frames)],
            lease_frames: None,
            capacity_frames,
            state: ClientState::Open,
        })
    }

    fn pcm(&self) -> AudioOutputResult<&PCM> {
        self.pcm
            .as_ref()
            .ok_or_else(|| AudioOutputError::invalid_state(self.state.as_str(), "stream access"))
    }
}

impl OutputClient for AlsaClient {
    fn format(&self) -> &StreamFormat {
        &self.format
    }

    fn state(&self) -> ClientState {
        self.state
    }

    /// No-op: with interleaved read/write access the stream starts on the
    /// first committed write.
    fn start(&mut self) -> AudioOutputResult<()> {
        if self.state == ClientState::Closed {
            return Err(AudioOutputError::invalid_state(self.state.as_str(), "start"));
        }
        self.state = ClientState::Started;
        Ok(())
    }

    /// Drains queued frames, then halts. Safe to call repeatedly; a drain
    /// on an already-drained stream is ignored.
    fn stop(&mut self) -> AudioOutputResult<()> {
        if self.state == ClientState::Closed {
            return Err(AudioOutputError::invalid_state(self.state.as_str(), "stop"));
        }
        if let Some(pcm) = self.pcm.as_ref() {
            let _ = pcm.drain();
        }
        self.state = ClientState::Stopped;
        Ok(())
    }

    fn buffer_frames(&mut self) -> u32 {
        if self.state == ClientState::Closed {
            return 0;
        }
        self.capacity_frames
    }

    /// Always 0: this access mode does not report hardware queue depth, so
    /// the ring is treated as fully drained.
    fn padding_frames(&mut self) -> u32 {
        0
    }

    fn acquire_buffer(&mut self, frames: u32) -> AudioOutputResult<&mut [u8]> {
        if self.state == ClientState::Closed {
            return Err(AudioOutputError::invalid_state(self.state.as_str(), "acquire_buffer"));
        }
        if frames == 0 || frames > self.capacity_frames {
            return Err(AudioOutputError::buffer_unavailable(frames, self.capacity_frames));
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
        if written == 0 {
            return Ok(());
        }

        let bytes = self.format.frames_to_bytes(written);
        let pcm = self.pcm()?;
        let io = pcm.io_bytes();
        loop {
            match io.writei(&self.staging[..bytes]) {
                Ok(_) => return Ok(()),
                Err(e) if e.errno() == libc::EPIPE => {
                    // Underrun: reset the stream pointer and retry the
                    // commit rather than propagating.
                    warn!("underrun during commit, preparing stream for retry");
                    pcm.prepare()?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn last_error_code(&self) -> i32 {
        0
    }

    fn close(&mut self) {
        if self.state == ClientState::Closed {
            return;
        }
        if let Some(pcm) = self.pcm.take() {
            let _ = pcm.drain();
        }
        self.state = ClientState::Closed;
    }
}

impl Drop for AlsaClient {
    fn drop(&mut self) {
        self.close();
    }
}
