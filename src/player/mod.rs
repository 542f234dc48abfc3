pub mod audio;
pub mod controller;
pub mod error;
pub mod loader;
pub mod net_task;
pub mod timer;
pub mod wav;

pub use controller::{NullObserver, PlaybackController, PlaybackObserver};
pub use error::{AudioError, DecodeError, FetchError, LoadError, ScheduleError};

/// Seconds taken by the fade-in on start and the fade-out on stop.
pub const FADE_TIME: f64 = 2.5;
/// Seconds taken to glide to a new volume while playing.
pub const VOLUME_RAMP_TIME: f64 = 0.1;
pub const DEFAULT_VOLUME: f32 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Loading,
    Playing,
    /// Fading out; the session is released once the fade has elapsed.
    Stopping,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Loading => "loading",
            PlaybackState::Playing => "playing",
            PlaybackState::Stopping => "stopping",
        }
    }
}

/// Clamps a user-facing volume into 0..=1. NaN counts as silence.
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

/// Maps the linear slider value onto the gain actually applied. The square
/// law tracks perceived loudness better than a straight line.
pub fn volume_to_gain(volume: f32) -> f32 {
    let volume = clamp_volume(volume);
    volume * volume
}
