use num_rational::Rational64;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RhythmError {
    #[error("amplitude must be finite and non-negative, got {0}")]
    AmplitudeOutOfRange(f64),

    #[error("beat duration must be positive, got {0}")]
    NonPositiveDuration(Rational64),

    #[error("timing must lie between -1 and 1, got {0}")]
    TimingOutOfRange(Rational64),

    #[error("timing {0} has no rational approximation")]
    UnrepresentableTiming(f64),

    #[error("cannot yet canonicalise rhythms with non-integer length {0}")]
    NonIntegerDuration(Rational64),

    #[error("beat {index} starts at tick {tick}, outside a grid of {length} ticks")]
    BeatOutsideGrid { index: usize, tick: i64, length: usize },

    #[error("polyrhythm component {index} has an empty canonical form")]
    EmptyComponent { index: usize },

    /// Stretching a canonical grid to the common length did not divide evenly.
    #[error("cannot stretch a grid of {length} ticks to {common} ticks")]
    Misaligned { length: usize, common: usize },

    #[error("tick grid size overflowed")]
    GridOverflow,

    #[error("grid of {ticks} ticks exceeds the limit of {limit} ticks")]
    TickCeiling { ticks: u128, limit: u64 },
}
