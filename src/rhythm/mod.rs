mod beat;
mod error;
mod poly;
mod sequence;

pub use beat::{Amplitude, Beat, Timing, AFTER_DELAY, START_DELAY};
pub use error::RhythmError;
pub use poly::{build_polyrhythm, build_polyrhythm_within, Limits, DEFAULT_MAX_TICKS};
pub use sequence::{Rhythm, Slot, Times};
