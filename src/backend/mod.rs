//! Platform device backends.
//!
//! Exactly one platform backend is compiled per target: WASAPI on Windows,
//! ALSA on Linux. Test builds and the `device-mock` feature add the
//! in-memory mock device. Platform-specific imports stay inside the
//! backend files; everything above this module speaks only
//! [`OutputClient`].

use crate::client::OutputClient;
use crate::error::AudioOutputResult;
use crate::format::StreamFormat;

#[cfg(all(target_os = "windows", feature = "device-native"))]
pub mod wasapi;

#[cfg(all(target_os = "linux", feature = "device-native"))]
pub mod alsa;

#[cfg(any(test, feature = "device-mock"))]
pub mod mock;

/// Open an output client on the default render device for the current
/// platform.
///
/// Acquires the device, negotiates a shared-mode stream for `format`, and
/// obtains the render service. On any failure every partially acquired
/// platform handle is released before returning.
///
/// Unit-test builds always resolve to the mock backend so the contract can
/// be exercised without audio hardware.
pub fn open(format: StreamFormat) -> AudioOutputResult<Box<dyn OutputClient>> {
    #[cfg(test)]
    {
        return Ok(Box::new(mock::MockClient::open(format)?));
    }

    #[cfg(all(target_os = "windows", feature = "device-native", not(test)))]
    {
        return Ok(Box::new(wasapi::WasapiClient::open(format)?));
    }

    #[cfg(all(target_os = "linux", feature = "device-native", not(test)))]
    {
        return Ok(Box::new(alsa::AlsaClient::open(format)?));
    }

    #[cfg(all(
        not(test),
        any(
            not(feature = "device-native"),
            not(any(target_os = "windows", target_os = "linux"))
        )
    ))]
    {
        let _ = format;
        Err(crate::error::AudioOutputError::NotSupported)
    }
}
