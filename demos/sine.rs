//! Play two seconds of a 440 Hz tone through the default output device.

use std::f32::consts::TAU;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use audio_output::{PlaybackContext, StreamFormat};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let context = Arc::new(PlaybackContext::open(StreamFormat::float32(2, 48_000))?);

    let stopper = Arc::clone(&context);
    thread::spawn(move || {
        thread::sleep(Duration::from_secs(2));
        stopper.stop();
    });

    let mut phase = 0.0f32;
    let step = TAU * 440.0 / 48_000.0;
    context.play(move |_frames, region| {
        // Interleaved stereo f32: 8 bytes per frame, same sample per channel.
        for frame in region.chunks_exact_mut(8) {
            let sample = (phase.sin() * 0.2).to_le_bytes();
            frame[..4].copy_from_slice(&sample);
            frame[4..].copy_from_slice(&sample);
            phase = (phase + step) % TAU;
        }
    })?;

    Ok(())
}
