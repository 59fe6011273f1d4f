extern crate derive_more;
use std::cmp::max;
use std::fmt;

use num_rational::Rational64;

use super::error::RhythmError;

/// Silence before a note, as a fraction of the note's duration.
pub const START_DELAY: Rational64 = Rational64::new_raw(3, 10);

/// Silence after a note, as a fraction of the note's duration.
pub const AFTER_DELAY: Rational64 = Rational64::new_raw(3, 10);

/// Normalized loudness. Zero is an audible rest, not the absence of an event.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    PartialOrd,
    Default,
    derive_more::Add,
    derive_more::Display,
)]
#[repr(transparent)]
pub struct Amplitude(pub f64);

impl Amplitude {
    pub const REST: Amplitude = Amplitude(0.0);
    pub const FULL: Amplitude = Amplitude(1.0);

    pub fn is_attack(&self) -> bool {
        self.0 > 0.0
    }

    pub fn is_rest(&self) -> bool {
        self.0 == 0.0
    }
}

#[test]
fn test_add_amplitude() {
    assert_eq!(Amplitude(1.0) + Amplitude(1.0), Amplitude(2.0));
    assert!(Amplitude::FULL.is_attack());
    assert!(Amplitude::REST.is_rest());
}

/// How early or late a beat sits within its time slice.
/// -1 is as early as possible, +1 as late as possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Timing(Rational64);

impl Timing {
    pub const EARLY: Timing = Timing(Rational64::new_raw(-1, 1));
    pub const ON_TIME: Timing = Timing(Rational64::new_raw(0, 1));
    pub const LATE: Timing = Timing(Rational64::new_raw(1, 1));

    pub fn new(value: Rational64) -> Result<Self, RhythmError> {
        if value < Self::EARLY.0 || value > Self::LATE.0 {
            Err(RhythmError::TimingOutOfRange(value))
        } else {
            Ok(Timing(value))
        }
    }

    /// Approximates a float with the simplest rational that rounds to it.
    pub fn from_f64(value: f64) -> Result<Self, RhythmError> {
        Rational64::approximate_float(value)
            .ok_or(RhythmError::UnrepresentableTiming(value))
            .and_then(Timing::new)
    }

    pub fn value(&self) -> Rational64 {
        self.0
    }
}

impl Default for Timing {
    fn default() -> Self {
        Timing::ON_TIME
    }
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 > Rational64::from_integer(0) {
            write!(f, "+{}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[test]
fn test_timing_range() {
    assert_eq!(Timing::new(Rational64::new(1, 2)).map(|t| t.value()), Ok(Rational64::new(1, 2)));
    assert_eq!(
        Timing::new(Rational64::new(3, 2)),
        Err(RhythmError::TimingOutOfRange(Rational64::new(3, 2)))
    );
    assert_eq!(Timing::from_f64(-1.0), Ok(Timing::EARLY));
    assert_eq!(Timing::from_f64(0.25).map(|t| t.value()), Ok(Rational64::new(1, 4)));
    assert!(Timing::from_f64(f64::NAN).is_err());
}

/// A single timed event: how loud, how long (in beat units) and how early or late.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Beat {
    amplitude: Amplitude,
    duration: Rational64,
    timing: Timing,
}

impl Beat {
    /// Full amplitude, one beat unit long, on time.
    pub const UNIT: Beat = Beat {
        amplitude: Amplitude::FULL,
        duration: Rational64::new_raw(1, 1),
        timing: Timing::ON_TIME,
    };

    pub fn new(amplitude: Amplitude, duration: Rational64, timing: Timing) -> Result<Self, RhythmError> {
        if !amplitude.0.is_finite() || amplitude.0 < 0.0 {
            return Err(RhythmError::AmplitudeOutOfRange(amplitude.0));
        }
        if duration <= Rational64::from_integer(0) {
            return Err(RhythmError::NonPositiveDuration(duration));
        }
        Ok(Beat {
            amplitude,
            duration,
            timing,
        })
    }

    /// A beat of whole-number length played on time.
    pub fn plain(amplitude: Amplitude, duration: i64) -> Result<Self, RhythmError> {
        Beat::new(amplitude, Rational64::from_integer(duration), Timing::ON_TIME)
    }

    pub fn amplitude(&self) -> Amplitude {
        self.amplitude
    }

    pub fn duration(&self) -> Rational64 {
        self.duration
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    /// How much silence precedes the note within its time slice.
    pub fn start_delay(&self) -> Rational64 {
        self.delay_fractions().0 * self.duration
    }

    /// How much silence follows the note before the next slice begins.
    pub fn after_delay(&self) -> Rational64 {
        self.delay_fractions().1 * self.duration
    }

    pub fn sounding_time(&self) -> Rational64 {
        self.duration - self.start_delay() - self.after_delay()
    }

    /// How much later (positive) or earlier (negative) than an on-time beat
    /// of the same duration this one starts sounding.
    pub fn start_offset(&self) -> Rational64 {
        self.start_delay() - START_DELAY * self.duration
    }

    /// Redistributes the standard delays according to timing. Late beats move
    /// the trailing silence in front of the note, early beats the reverse.
    fn delay_fractions(&self) -> (Rational64, Rational64) {
        let zero = Rational64::from_integer(0);
        let one = Rational64::from_integer(1);
        let start_bias = max(zero, -self.timing.0);
        let end_bias = max(zero, self.timing.0);
        (
            (one - start_bias) * START_DELAY + end_bias * AFTER_DELAY,
            start_bias * START_DELAY + (one - end_bias) * AFTER_DELAY,
        )
    }
}

impl fmt::Display for Beat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} for {}", self.amplitude, self.duration)?;
        if self.timing != Timing::ON_TIME {
            write!(f, " ({})", self.timing)?;
        }
        Ok(())
    }
}

#[cfg(test)]
fn two_beat_long(timing: Timing) -> Beat {
    Beat::new(Amplitude::FULL, Rational64::from_integer(2), timing).unwrap()
}

#[test]
fn test_beat_delays_on_time() {
    let beat = two_beat_long(Timing::ON_TIME);
    assert_eq!(beat.start_delay(), Rational64::new(3, 5));
    assert_eq!(beat.after_delay(), Rational64::new(3, 5));
    assert_eq!(beat.sounding_time(), Rational64::new(4, 5));
    assert_eq!(beat.duration(), Rational64::from_integer(2));
    assert_eq!(beat.start_offset(), Rational64::from_integer(0));
}

#[test]
fn test_beat_delays_early() {
    let beat = two_beat_long(Timing::EARLY);
    let total_delay = START_DELAY + AFTER_DELAY;
    assert_eq!(beat.start_delay(), Rational64::from_integer(0));
    assert_eq!(beat.after_delay(), total_delay * 2);
    assert_eq!(beat.sounding_time(), Rational64::from_integer(2) - total_delay * 2);
    assert_eq!(beat.duration(), Rational64::from_integer(2));
    assert_eq!(beat.start_offset(), Rational64::new(-3, 5));
}

#[test]
fn test_beat_delays_late() {
    let beat = two_beat_long(Timing::LATE);
    let total_delay = START_DELAY + AFTER_DELAY;
    assert_eq!(beat.start_delay(), total_delay * 2);
    assert_eq!(beat.after_delay(), Rational64::from_integer(0));
    assert_eq!(beat.sounding_time(), Rational64::from_integer(2) - total_delay * 2);
    assert_eq!(beat.start_offset(), Rational64::new(3, 5));
}

#[test]
fn test_beat_delays_add_up() {
    let timings = [
        Rational64::from_integer(-1),
        Rational64::new(-1, 3),
        Rational64::from_integer(0),
        Rational64::new(1, 5),
        Rational64::from_integer(1),
    ];
    for timing in timings {
        for duration in [Rational64::new(1, 3), Rational64::from_integer(1), Rational64::new(7, 4)] {
            let beat = Beat::new(Amplitude(0.5), duration, Timing::new(timing).unwrap()).unwrap();
            assert_eq!(beat.start_delay() + beat.after_delay() + beat.sounding_time(), duration);
        }
    }
}

#[test]
fn test_beat_rejects_bad_fields() {
    assert_eq!(
        Beat::plain(Amplitude(-0.5), 1),
        Err(RhythmError::AmplitudeOutOfRange(-0.5))
    );
    assert_eq!(
        Beat::plain(Amplitude::FULL, 0),
        Err(RhythmError::NonPositiveDuration(Rational64::from_integer(0)))
    );
    assert!(Beat::plain(Amplitude(f64::INFINITY), 1).is_err());
}

#[test]
fn test_beat_display() {
    assert_eq!(two_beat_long(Timing::LATE).to_string(), "1 for 2 (+1)");
    assert_eq!(Beat::plain(Amplitude(0.5), 1).unwrap().to_string(), "0.5 for 1");
}
