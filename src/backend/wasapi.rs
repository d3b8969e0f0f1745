//! WASAPI output client for Windows.
//!
//! Device acquisition and stream negotiation follow the standard COM
//! sequence: device enumerator, default render endpoint, `IAudioClient`
//! activation, shared-mode `Initialize` with a ~1 ms buffer-duration hint
//! (auto-convert PCM + default-quality resampling, so the mixer accepts
//! formats the endpoint does not natively run at), then the
//! `IAudioRenderClient` render service. Each handle is an owned COM
//! interface released by drop, so a failure at any step unwinds the
//! partially acquired handles automatically.
//!
//! Error idiom: capture and query. Queries polled from the render loop
//! (`buffer_frames`, `padding_frames`, `acquire_buffer`) record the failing
//! HRESULT and return a 0/null sentinel; the caller reads the stored code
//! via [`last_error_code`](crate::client::OutputClient::last_error_code).

use tracing::debug;
use windows::Win32::Foundation::RPC_E_CHANGED_MODE;
use windows::Win32::Media::Audio::{
    AUDCLNT_E_UNSUPPORTED_FORMAT, AUDCLNT_SHAREMODE_SHARED, AUDCLNT_STREAMFLAGS_AUTOCONVERTPCM,
    AUDCLNT_STREAMFLAGS_SRC_DEFAULT_QUALITY, IAudioClient, IAudioRenderClient, IMMDevice,
    IMMDeviceEnumerator, MMDeviceEnumerator, WAVEFORMATEX, eConsole, eRender,
};
use windows::Win32::System::Com::{CLSCTX_ALL, COINIT_MULTITHREADED, CoCreateInstance, CoInitializeEx};

use crate::client::{ClientState, OutputClient};
use crate::error::{AudioOutputError, AudioOutputResult};
use crate::format::StreamFormat;

/// Shared-mode buffer-duration hint: 1 ms in 100 ns REFERENCE_TIME units.
/// The engine rounds this up to its own period; the hint just asks for the
/// smallest ring it will grant.
const BUFFER_DURATION_HINT: i64 = 10_000;

/// WASAPI implementation of [`OutputClient`].
pub struct WasapiClient {
    // Held in acquisition order; `close` releases them in reverse.
    enumerator: Option<IMMDeviceEnumerator>,
    device: Option<IMMDevice>,
    audio_client: Option<IAudioClient>,
    render_client: Option<IAudioRenderClient>,
    format: StreamFormat,
    lease_frames: Option<u32>,
    last_error: i32,
    state: ClientState,
}

// The COM interfaces are only touched through `&mut self`; the single
// logical owner contract makes cross-thread moves sound.
unsafe impl Send for WasapiClient {}

impl WasapiClient {
    /// Acquire the default render endpoint and negotiate a shared-mode
    /// stream for `format`.
    pub fn open(format: StreamFormat) -> AudioOutputResult<Self> {
        // The host may already have initialized COM on this thread with a
        // different threading model; that is fine for our use.
        let hr = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };
        if hr.is_err() && hr != RPC_E_CHANGED_MODE {
            return Err(AudioOutputError::activation_failed(format!(
                "CoInitializeEx failed: {:#010x}",
                hr.0
            )));
        }

        let wave_format = WAVEFORMATEX {
            wFormatTag: format.sample_kind.format_tag(),
            nChannels: format.channels,
            nSamplesPerSec: format.frames_per_sec,
            nAvgBytesPerSec: format.bytes_per_second(),
            nBlockAlign: format.frame_size,
            wBitsPerSample: format.bits_per_sample,
            cbSize: 0,
        };

        // Owned COM handles: an early `?` releases everything acquired so
        // far, no failure path returns with a live handle.
        let enumerator: IMMDeviceEnumerator =
            unsafe { CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL) }
                .map_err(|e| AudioOutputError::activation_failed(e.to_string()))?;

        let device = unsafe { enumerator.GetDefaultAudioEndpoint(eRender, eConsole) }
            .map_err(|e| AudioOutputError::device_unavailable(e.to_string()))?;

        let audio_client: IAudioClient = unsafe { device.Activate(CLSCTX_ALL, None) }
            .map_err(|e| AudioOutputError::activation_failed(e.to_string()))?;

        unsafe {
            audio_client.Initialize(
                AUDCLNT_SHAREMODE_SHARED,
                AUDCLNT_STREAMFLAGS_AUTOCONVERTPCM | AUDCLNT_STREAMFLAGS_SRC_DEFAULT_QUALITY,
                BUFFER_DURATION_HINT,
                0, // must be 0 in shared mode
                &wave_format,
                None,
            )
        }
        .map_err(|e| {
            if e.code() == AUDCLNT_E_UNSUPPORTED_FORMAT {
                AudioOutputError::format_unsupported(e.to_string())
            } else {
                AudioOutputError::activation_failed(e.to_string())
            }
        })?;

        let render_client: IAudioRenderClient = unsafe { audio_client.GetService() }
            .map_err(|e| AudioOutputError::activation_failed(e.to_string()))?;

        debug!(
            rate = format.frames_per_sec,
            channels = format.channels,
            bits = format.bits_per_sample,
            "opened WASAPI shared-mode stream"
        );

        Ok(Self {
            enumerator: Some(enumerator),
            device: Some(device),
            audio_client: Some(audio_client),
            render_client: Some(render_client),
            format,
            lease_frames: None,
            last_error: 0,
            state: ClientState::Open,
        })
    }

    fn audio_client(&self) -> AudioOutputResult<&IAudioClient> {
        self.audio_client
            .as_ref()
            .ok_or_else(|| AudioOutputError::invalid_state(self.state.as_str(), "stream access"))
    }

    fn render_client(&self) -> AudioOutputResult<&IAudioRenderClient> {
        self.render_client
            .as_ref()
            .ok_or_else(|| AudioOutputError::invalid_state(self.state.as_str(), "render access"))
    }

    fn record(&mut self, err: &windows::core::Error) {
        self.last_error = err.code().0;
    }
}

impl OutputClient for WasapiClient {
    fn format(&self) -> &StreamFormat {
        &self.format
    }

    fn state(&self) -> ClientState {
        self.state
    }

    /// Starting an already-started stream surfaces the OS error
    /// (`AUDCLNT_E_NOT_STOPPED`) unchanged.
    fn start(&mut self) -> AudioOutputResult<()> {
        if self.state == ClientState::Closed {
            return Err(AudioOutputError::invalid_state(self.state.as_str(), "start"));
        }
        match unsafe { self.audio_client()?.Start() } {
            Ok(()) => {
                self.state = ClientState::Started;
                Ok(())
            }
            Err(e) => {
                self.record(&e);
                Err(e.into())
            }
        }
    }

    fn stop(&mut self) -> AudioOutputResult<()> {
        if self.state == ClientState::Closed {
            return Err(AudioOutputError::invalid_state(self.state.as_str(), "stop"));
        }
        match unsafe { self.audio_client()?.Stop() } {
            Ok(()) => {
                self.state = ClientState::Stopped;
                Ok(())
            }
            Err(e) => {
                self.record(&e);
                Err(e.into())
            }
        }
    }

    fn buffer_frames(&mut self) -> u32 {
        let Ok(client) = self.audio_client() else {
            return 0;
        };
        match unsafe { client.GetBufferSize() } {
            Ok(frames) => frames,
            Err(e) => {
                self.record(&e);
                0
            }
        }
    }

    fn padding_frames(&mut self) -> u32 {
        let Ok(client) = self.audio_client() else {
            return 0;
        };
        match unsafe { client.GetCurrentPadding() } {
            Ok(frames) => frames,
            Err(e) => {
                self.record(&e);
                0
            }
        }
    }

    fn acquire_buffer(&mut self, frames: u32) -> AudioOutputResult<&mut [u8]> {
        if self.state == ClientState::Closed {
            return Err(AudioOutputError::invalid_state(self.state.as_str(), "acquire_buffer"));
        }
        let render = self.render_client()?.clone();
        match unsafe { render.GetBuffer(frames) } {
            Ok(data) => {
                self.lease_frames = Some(frames);
                let bytes = self.format.frames_to_bytes(frames);
                // Valid for `frames` frames until the matching ReleaseBuffer;
                // the `&mut self` borrow scopes the loan accordingly.
                Ok(unsafe { std::slice::from_raw_parts_mut(data, bytes) })
            }
            Err(e) => {
                self.record(&e);
                let capacity = self.buffer_frames();
                let padding = self.padding_frames();
                Err(AudioOutputError::buffer_unavailable(
                    frames,
                    capacity.saturating_sub(padding),
                ))
            }
        }
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
        match unsafe { self.render_client()?.ReleaseBuffer(written, 0) } {
            Ok(()) => Ok(()),
            Err(e) => {
                self.record(&e);
                Err(e.into())
            }
        }
    }

    fn last_error_code(&self) -> i32 {
        self.last_error
    }

    fn close(&mut self) {
        if self.state == ClientState::Closed {
            return;
        }
        // Reverse acquisition order; each take is a no-op when the handle
        // was never acquired.
        self.render_client.take();
        self.audio_client.take();
        self.device.take();
        self.enumerator.take();
        self.state = ClientState::Closed;
    }
}

impl Drop for WasapiClient {
    fn drop(&mut self) {
        self.close();
    }
}
