//! Flat C ABI export surface.
//!
//! Exposes the output client and the push-style playback context as a
//! C-style function table (`audio_output_*`) for P/Invoke-style callers in
//! a managed runtime. The conventions are fixed by the boundary:
//!
//! - construction failure returns a null handle, never an unwound panic
//!   (every export is panic-guarded);
//! - queries return 0 on failure, with the platform status code
//!   retrievable through [`audio_output_last_error`];
//! - `audio_output_acquire` hands out a scoped lease: the pointer is valid
//!   only until the matching `audio_output_release` (or destruction of the
//!   client) and must not be retained;
//! - all functions tolerate null handles.
//!
//! The caller is the single logical owner of a handle and serializes the
//! acquire/fill/release cycle; only the context's `play`/`stop` pair is
//! safe to split across threads.

use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use tracing::error;

use crate::backend;
use crate::client::OutputClient;
use crate::context::PlaybackContext;
use crate::format::{SampleKind, StreamFormat};

/// Opaque client handle passed across the export boundary.
pub struct AudioOutputClientHandle {
    client: Box<dyn OutputClient>,
}

/// Opaque playback-context handle passed across the export boundary.
pub struct AudioOutputContextHandle {
    context: PlaybackContext,
}

/// Render callback for the push-style context: invoked synchronously once
/// per buffer cycle to fill `frame_count` frames of interleaved PCM into
/// `buffer`.
pub type AudioOutputRenderCallback = unsafe extern "C" fn(frame_count: u32, buffer: *mut u8);

/// Run `f`, converting any panic into `fallback` so no unwind crosses the
/// C ABI.
fn guarded<T>(fallback: T, f: impl FnOnce() -> T) -> T {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or(fallback)
}

fn parse_format(
    tag: u16,
    channels: u16,
    bits_per_sample: u16,
    frame_size: u16,
    frames_per_sec: u32,
) -> Option<StreamFormat> {
    let kind = SampleKind::from_format_tag(tag);
    StreamFormat::new(kind, channels, bits_per_sample, frame_size, frames_per_sec).ok()
}

/// Open an output client on the default render device.
///
/// `tag` follows the PCM wave-format convention: 1 = integer PCM, any
/// other value = float. Returns null if the format is invalid or the
/// device cannot be opened; no partially constructed client is ever
/// returned.
#[unsafe(no_mangle)]
pub extern "C" fn audio_output_create(
    tag: u16,
    channels: u16,
    bits_per_sample: u16,
    frame_size: u16,
    frames_per_sec: u32,
) -> *mut AudioOutputClientHandle {
    guarded(ptr::null_mut(), || {
        let Some(format) = parse_format(tag, channels, bits_per_sample, frame_size, frames_per_sec)
        else {
            return ptr::null_mut();
        };
        match backend::open(format) {
            Ok(client) => Box::into_raw(Box::new(AudioOutputClientHandle { client })),
            Err(e) => {
                error!("audio_output_create failed: {e}");
                ptr::null_mut()
            }
        }
    })
}

/// Close the client and free the handle. Null is a no-op.
///
/// # Safety
///
/// `handle` must be null or a pointer returned by [`audio_output_create`]
/// that has not been destroyed yet; any outstanding lease is invalidated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn audio_output_destroy(handle: *mut AudioOutputClientHandle) {
    guarded((), || {
        if !handle.is_null() {
            drop(unsafe { Box::from_raw(handle) });
        }
    });
}

/// Start consuming queued frames.
///
/// # Safety
///
/// `handle` must be null or a live pointer from [`audio_output_create`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn audio_output_start(handle: *mut AudioOutputClientHandle) {
    guarded((), || {
        if let Some(h) = unsafe { handle.as_mut() } {
            let _ = h.client.start();
        }
    });
}

/// Drain or halt the stream. Safe to call repeatedly.
///
/// # Safety
///
/// `handle` must be null or a live pointer from [`audio_output_create`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn audio_output_stop(handle: *mut AudioOutputClientHandle) {
    guarded((), || {
        if let Some(h) = unsafe { handle.as_mut() } {
            let _ = h.client.stop();
        }
    });
}

/// Total ring capacity in frames; 0 on failure or null handle.
///
/// # Safety
///
/// `handle` must be null or a live pointer from [`audio_output_create`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn audio_output_buffer_frames(handle: *mut AudioOutputClientHandle) -> u32 {
    guarded(0, || {
        unsafe { handle.as_mut() }.map_or(0, |h| h.client.buffer_frames())
    })
}

/// Frames queued but not yet played; 0 on failure, on null handle, and on
/// backends that cannot report padding.
///
/// # Safety
///
/// `handle` must be null or a live pointer from [`audio_output_create`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn audio_output_padding_frames(handle: *mut AudioOutputClientHandle) -> u32 {
    guarded(0, || {
        unsafe { handle.as_mut() }.map_or(0, |h| h.client.padding_frames())
    })
}

/// Lease a writable region of exactly `request_frames` frames.
///
/// Returns null if the ring cannot satisfy the request. The pointer is a
/// scoped loan, valid only until the matching [`audio_output_release`].
///
/// # Safety
///
/// `handle` must be null or a live pointer from [`audio_output_create`];
/// the returned pointer must not be retained past the release call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn audio_output_acquire(
    handle: *mut AudioOutputClientHandle,
    request_frames: u32,
) -> *mut u8 {
    guarded(ptr::null_mut(), || {
        let Some(h) = (unsafe { handle.as_mut() }) else {
            return ptr::null_mut();
        };
        match h.client.acquire_buffer(request_frames) {
            Ok(region) => region.as_mut_ptr(),
            Err(_) => ptr::null_mut(),
        }
    })
}

/// Commit `written_frames` frames (at most the leased amount) for
/// playback, ending the lease.
///
/// # Safety
///
/// `handle` must be null or a live pointer from [`audio_output_create`]
/// with an outstanding lease from [`audio_output_acquire`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn audio_output_release(
    handle: *mut AudioOutputClientHandle,
    written_frames: u32,
) {
    guarded((), || {
        if let Some(h) = unsafe { handle.as_mut() } {
            let _ = h.client.release_buffer(written_frames);
        }
    });
}

/// Most recent platform status code for this client, 0 meaning success
/// (also returned for a null handle).
///
/// # Safety
///
/// `handle` must be null or a live pointer from [`audio_output_create`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn audio_output_last_error(handle: *mut AudioOutputClientHandle) -> i32 {
    guarded(0, || {
        unsafe { handle.as_ref() }.map_or(0, |h| h.client.last_error_code())
    })
}

/// Open a push-style playback context on the default render device.
///
/// Format arguments follow [`audio_output_create`]. Returns null on
/// failure.
#[unsafe(no_mangle)]
pub extern "C" fn audio_output_context_create(
    tag: u16,
    channels: u16,
    bits_per_sample: u16,
    frame_size: u16,
    frames_per_sec: u32,
) -> *mut AudioOutputContextHandle {
    guarded(ptr::null_mut(), || {
        let Some(format) = parse_format(tag, channels, bits_per_sample, frame_size, frames_per_sec)
        else {
            return ptr::null_mut();
        };
        match PlaybackContext::open(format) {
            Ok(context) => Box::into_raw(Box::new(AudioOutputContextHandle { context })),
            Err(e) => {
                error!("audio_output_context_create failed: {e}");
                ptr::null_mut()
            }
        }
    })
}

/// Stop the context (if playing) and free the handle. Null is a no-op.
///
/// # Safety
///
/// `handle` must be null or a pointer returned by
/// [`audio_output_context_create`] that has not been destroyed yet, with
/// no render loop currently running on it.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn audio_output_context_destroy(handle: *mut AudioOutputContextHandle) {
    guarded((), || {
        if !handle.is_null() {
            drop(unsafe { Box::from_raw(handle) });
        }
    });
}

/// Run the render loop on the calling thread until
/// [`audio_output_context_stop`] is called from another thread.
///
/// `callback` is invoked synchronously once per buffer cycle. A null
/// handle or null callback is a no-op. Returns immediately if the context
/// is already playing.
///
/// # Safety
///
/// `handle` must be null or a live pointer from
/// [`audio_output_context_create`]; `callback` must fill exactly
/// `frame_count` frames each invocation and must not unwind.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn audio_output_context_play(
    handle: *mut AudioOutputContextHandle,
    callback: Option<AudioOutputRenderCallback>,
) {
    guarded((), || {
        let (Some(h), Some(callback)) = (unsafe { handle.as_ref() }, callback) else {
            return;
        };
        let result = h.context.play(|frames, region| {
            // The contract above makes this call sound: the callback writes
            // `frames` frames into the leased region.
            unsafe { callback(frames, region.as_mut_ptr()) };
        });
        if let Err(e) = result {
            error!("render loop exited with error: {e}");
        }
    });
}

/// Request the context's render loop to exit; takes effect within one
/// buffer period. Null is a no-op.
///
/// # Safety
///
/// `handle` must be null or a live pointer from
/// [`audio_output_context_create`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn audio_output_context_stop(handle: *mut AudioOutputContextHandle) {
    guarded((), || {
        if let Some(h) = unsafe { handle.as_ref() } {
            h.context.stop();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;
    use std::time::Duration;

    // Descriptor for {float32, 2ch, 32-bit, frame size 8, 48 kHz}.
    const FLOAT_STEREO: (u16, u16, u16, u16, u32) = (3, 2, 32, 8, 48_000);

    fn create_float_stereo() -> *mut AudioOutputClientHandle {
        let (tag, ch, bits, fsize, rate) = FLOAT_STEREO;
        audio_output_create(tag, ch, bits, fsize, rate)
    }

    #[test]
    fn create_rejects_unsupported_bit_depth() {
        // 3-bit samples: no partially constructed client, just null.
        let handle = audio_output_create(1, 2, 3, 1, 48_000);
        assert!(handle.is_null());
    }

    #[test]
    fn create_rejects_broken_frame_size() {
        let handle = audio_output_create(3, 2, 32, 6, 48_000);
        assert!(handle.is_null());
    }

    #[test]
    fn full_exchange_cycle_reports_no_error() {
        unsafe {
            let handle = create_float_stereo();
            assert!(!handle.is_null());
            assert_eq!(audio_output_last_error(handle), 0);

            audio_output_start(handle);
            assert_eq!(audio_output_last_error(handle), 0);

            let capacity = audio_output_buffer_frames(handle);
            assert!(capacity >= 240);
            let padding = audio_output_padding_frames(handle);

            let frames = (capacity - padding).min(240);
            let region = audio_output_acquire(handle, frames);
            assert!(!region.is_null());
            std::slice::from_raw_parts_mut(region, frames as usize * 8).fill(0);
            audio_output_release(handle, frames);
            assert_eq!(audio_output_last_error(handle), 0);

            audio_output_stop(handle);
            assert_eq!(audio_output_last_error(handle), 0);
            audio_output_destroy(handle);
        }
    }

    #[test]
    fn acquire_beyond_capacity_returns_null() {
        unsafe {
            let handle = create_float_stereo();
            assert!(!handle.is_null());
            audio_output_start(handle);

            let capacity = audio_output_buffer_frames(handle);
            assert!(audio_output_acquire(handle, capacity + 1).is_null());

            audio_output_destroy(handle);
        }
    }

    #[test]
    fn null_handles_are_tolerated() {
        unsafe {
            audio_output_destroy(ptr::null_mut());
            audio_output_start(ptr::null_mut());
            audio_output_stop(ptr::null_mut());
            assert_eq!(audio_output_buffer_frames(ptr::null_mut()), 0);
            assert_eq!(audio_output_padding_frames(ptr::null_mut()), 0);
            assert!(audio_output_acquire(ptr::null_mut(), 64).is_null());
            audio_output_release(ptr::null_mut(), 64);
            assert_eq!(audio_output_last_error(ptr::null_mut()), 0);

            audio_output_context_destroy(ptr::null_mut());
            audio_output_context_play(ptr::null_mut(), None);
            audio_output_context_stop(ptr::null_mut());
        }
    }

    static CONTEXT_CYCLES: AtomicU32 = AtomicU32::new(0);

    unsafe extern "C" fn count_cycles(frame_count: u32, buffer: *mut u8) {
        unsafe {
            std::slice::from_raw_parts_mut(buffer, frame_count as usize * 8).fill(0);
        }
        CONTEXT_CYCLES.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn context_play_runs_until_stopped() {
        let (tag, ch, bits, fsize, rate) = FLOAT_STEREO;
        let handle = audio_output_context_create(tag, ch, bits, fsize, rate);
        assert!(!handle.is_null());

        let addr = handle as usize;
        let loop_thread = thread::spawn(move || unsafe {
            audio_output_context_play(addr as *mut AudioOutputContextHandle, Some(count_cycles));
        });

        thread::sleep(Duration::from_millis(30));
        unsafe {
            audio_output_context_stop(handle);
        }
        loop_thread.join().unwrap();
        assert!(CONTEXT_CYCLES.load(Ordering::SeqCst) >= 1);

        unsafe {
            audio_output_context_destroy(handle);
        }
    }

    #[test]
    fn context_create_rejects_invalid_format() {
        let handle = audio_output_context_create(1, 0, 16, 0, 48_000);
        assert!(handle.is_null());
    }
}
