//! Push-style playback: a caller-supplied render callback driven by a
//! cooperative, single-threaded buffer loop.
//!
//! [`PlaybackContext::play`] runs on the calling thread. Each cycle leases
//! every currently available frame, hands the region to the callback,
//! commits it, then sleeps three quarters of one buffer's playback
//! duration before recomputing availability from the ring's padding. The
//! sleep fraction is a fixed pacing policy, not adaptive. [`stop`] flips an
//! atomic flag checked once per cycle, so cancellation latency is bounded
//! by one buffer period rather than immediate.
//!
//! [`stop`]: PlaybackContext::stop

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use parking_lot::Mutex;
use tracing::debug;

use crate::backend;
use crate::client::OutputClient;
use crate::error::AudioOutputResult;
use crate::format::StreamFormat;

/// A render loop over any [`OutputClient`].
///
/// The client sits behind a mutex so `play` and `stop` can be called from
/// different threads (`play` from the render thread, `stop` from a
/// controlling thread) without the caller adding its own locking.
pub struct PlaybackContext {
    client: Mutex<Box<dyn OutputClient>>,
    playing: AtomicBool,
}

impl PlaybackContext {
    /// Wrap an already-open client.
    pub fn new(client: Box<dyn OutputClient>) -> Self {
        Self {
            client: Mutex::new(client),
            playing: AtomicBool::new(false),
        }
    }

    /// Open the default output device for `format` and wrap it.
    pub fn open(format: StreamFormat) -> AudioOutputResult<Self> {
        Ok(Self::new(backend::open(format)?))
    }

    /// Run the render loop on the calling thread until [`stop`] is called.
    ///
    /// `render(frames, region)` is invoked synchronously once per buffer
    /// cycle and must fill `frames` frames of interleaved PCM into
    /// `region`. Returns immediately if the context is already playing.
    /// On a loop error the stream is stopped before the error propagates.
    ///
    /// [`stop`]: Self::stop
    pub fn play<F>(&self, render: F) -> AudioOutputResult<()>
    where
        F: FnMut(u32, &mut [u8]),
    {
        if self.playing.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut client = self.client.lock();
        let result = Self::run(&self.playing, client.as_mut(), render);
        self.playing.store(false, Ordering::SeqCst);
        result
    }

    fn run<F>(
        playing: &AtomicBool,
        client: &mut dyn OutputClient,
        mut render: F,
    ) -> AudioOutputResult<()>
    where
        F: FnMut(u32, &mut [u8]),
    {
        let capacity = client.buffer_frames();
        if capacity == 0 {
            return Err(crate::error::AudioOutputError::activation_failed(
                "hardware ring reports zero capacity",
            ));
        }
        let pace = client.format().frames_to_duration(capacity) * 3 / 4;
        client.start()?;
        debug!(capacity, ?pace, "entering render loop");

        let mut available = capacity;
        while playing.load(Ordering::SeqCst) {
            if available > 0 {
                let step = (|| {
                    let region = client.acquire_buffer(available)?;
                    render(available, region);
                    client.release_buffer(available)
                })();
                if let Err(e) = step {
                    let _ = client.stop();
                    return Err(e);
                }
            }

            // Pace submission against playback consumption.
            thread::sleep(pace);
            available = capacity.saturating_sub(client.padding_frames());
        }

        client.stop()
    }

    /// Request the render loop to exit; takes effect within one buffer
    /// period. Callable from any thread, and a no-op when not playing.
    pub fn stop(&self) {
        self.playing.store(false, Ordering::SeqCst);
    }

    /// Whether the render loop is currently running.
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    fn context() -> Arc<PlaybackContext> {
        Arc::new(PlaybackContext::open(StreamFormat::float32(2, 48_000)).unwrap())
    }

    #[test]
    fn stop_from_another_thread_ends_the_loop() {
        let ctx = context();
        let cycles = Arc::new(AtomicU32::new(0));

        let render_ctx = Arc::clone(&ctx);
        let render_cycles = Arc::clone(&cycles);
        let loop_thread = thread::spawn(move || {
            render_ctx.play(move |_frames, region| {
                region.fill(0);
                render_cycles.fetch_add(1, Ordering::SeqCst);
            })
        });

        // Let the loop run a few cycles (buffer is 5 ms, pace 3.75 ms).
        thread::sleep(Duration::from_millis(30));
        ctx.stop();
        let result = loop_thread.join().unwrap();

        assert!(result.is_ok());
        assert!(cycles.load(Ordering::SeqCst) >= 1);
        assert!(!ctx.is_playing());
    }

    #[test]
    fn play_while_playing_returns_immediately() {
        let ctx = context();
        let render_ctx = Arc::clone(&ctx);
        let loop_thread = thread::spawn(move || render_ctx.play(|_, region| region.fill(0)));

        // Wait for the loop to take the playing flag, then re-enter.
        while !ctx.is_playing() {
            thread::sleep(Duration::from_millis(1));
        }
        ctx.play(|_, _| panic!("second render loop must not run")).unwrap();

        ctx.stop();
        loop_thread.join().unwrap().unwrap();
    }

    #[test]
    fn callback_sees_whole_available_region() {
        let ctx = context();
        let seen = Arc::new(AtomicU32::new(0));

        let render_ctx = Arc::clone(&ctx);
        let seen_render = Arc::clone(&seen);
        let loop_thread = thread::spawn(move || {
            render_ctx.play(move |frames, region| {
                // Interleaved stereo float frames: 8 bytes per frame.
                assert_eq!(region.len(), frames as usize * 8);
                seen_render.fetch_max(frames, Ordering::SeqCst);
                region.fill(0);
            })
        });

        thread::sleep(Duration::from_millis(20));
        ctx.stop();
        loop_thread.join().unwrap().unwrap();

        // First cycle fills the whole ring: 48000 / 200 frames.
        assert_eq!(seen.load(Ordering::SeqCst), 240);
    }
}
