extern crate derive_more;
use midly::num::u24;
use num_rational::Rational64;

/// One beat unit of a rhythm is played as a quarter note.
pub static TICKS_PER_QUARTER_NOTE: u16 = 480;

static MICROSECONDS_PER_MINUTE: u32 = 60_000_000;

// Typically used as number of ticks since the beginning of the track.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Default,
    derive_more::Add,
    derive_more::Sub,
    derive_more::Display,
)]
#[repr(transparent)]
pub struct Tick(pub u64);

impl Tick {
    /// The tick nearest to `time` beat units after the start.
    pub fn from_beats(time: Rational64) -> Tick {
        let ticks = (time * TICKS_PER_QUARTER_NOTE as i64).round().to_integer();
        Tick(ticks.max(0) as u64)
    }
}

#[test]
fn test_tick_from_beats() {
    assert_eq!(Tick::from_beats(Rational64::from_integer(2)), Tick(960));
    assert_eq!(Tick::from_beats(Rational64::new(3, 10)), Tick(144));
    assert_eq!(Tick::from_beats(Rational64::new(1, 3)), Tick(160));
    assert_eq!(Tick::from_beats(Rational64::new(1, 7)), Tick(69));
    assert_eq!(Tick(2) + Tick(2), Tick(4));
}

// Delta in time since the last MIDI event, measured in Ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, derive_more::Add, derive_more::Display)]
#[repr(transparent)]
pub struct Delta(pub u32);

/// Beats per minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, derive_more::Display)]
pub struct Tempo(pub u16);

impl Default for Tempo {
    fn default() -> Self {
        Tempo(120)
    }
}

impl Tempo {
    /// Microseconds per quarter note, clamped to what a tempo event can hold.
    pub fn to_midi(&self) -> u24 {
        let micros = MICROSECONDS_PER_MINUTE / self.0.max(1) as u32;
        u24::new(micros.min(0xFF_FFFF))
    }
}

#[test]
fn test_tempo_to_midi() {
    assert_eq!(Tempo::default().to_midi(), u24::new(500_000));
    assert_eq!(Tempo(60).to_midi(), u24::new(1_000_000));
    assert_eq!(Tempo(1).to_midi(), u24::new(0xFF_FFFF));
}
