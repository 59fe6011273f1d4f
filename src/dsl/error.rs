use thiserror::Error;

use crate::rhythm::RhythmError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("unknown beat symbol {symbol:?} at position {position}")]
    UnknownBeatSymbol { symbol: char, position: usize },

    #[error("unknown timing symbol {symbol:?} at position {position}")]
    UnknownTimingSymbol { symbol: String, position: usize },

    #[error("no beats found in rhythm score")]
    EmptyScore,

    #[error("malformed polyrhythm ratio {0:?}, expected numbers like 7:11")]
    MalformedRatio(String),

    #[error(transparent)]
    Rhythm(#[from] RhythmError),
}
