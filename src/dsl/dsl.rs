use std::str;
use std::vec::Vec;

use nom::bytes::complete::take_while;
pub use nom::character::complete::{anychar, char, digit1};
use nom::combinator::{all_consuming, map, map_opt, map_res, opt};
use nom::multi::{many0, separated_list1};
use nom::sequence::{preceded, terminated, tuple};
use nom::IResult;
use num_rational::Rational64;

use crate::rhythm::{Amplitude, Beat, Rhythm, Timing, Times};

use super::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Accent {
    Rest,
    Regular,
    Accented,
    Primary,
}

impl Accent {
    /// Loudness on an arbitrary scale; scores are normalized by their loudest symbol.
    pub fn weight(&self) -> u8 {
        match self {
            Accent::Rest => 0,
            Accent::Regular => 4,
            Accent::Accented => 6,
            Accent::Primary => 9,
        }
    }

    fn from_symbol(symbol: char) -> Option<Accent> {
        match symbol {
            '-' => Some(Accent::Rest),
            'x' => Some(Accent::Regular),
            'X' => Some(Accent::Accented),
            '!' => Some(Accent::Primary),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Normal,
    Early,
    Late,
}

impl Mark {
    pub fn timing(&self) -> Timing {
        match self {
            Mark::Normal => Timing::ON_TIME,
            Mark::Early => Timing::EARLY,
            Mark::Late => Timing::LATE,
        }
    }
}

/// A beat as written, before amplitudes are normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
    pub accent: Accent,
    pub mark: Mark,
}

const EARLY_MARK: char = '`';
const LATE_MARK: char = '\'';
const BAR_LINE: char = '|';

#[allow(dead_code)]
static REGULAR: Symbol = Symbol { accent: Accent::Regular, mark: Mark::Normal };
#[allow(dead_code)]
static REST: Symbol = Symbol { accent: Accent::Rest, mark: Mark::Normal };

fn accent(input: &str) -> IResult<&str, Accent> {
    map_opt(anychar, Accent::from_symbol)(input)
}

/// An accent, optionally preceded by the early mark or followed by the late mark.
/// Both marks at once are rejected by `score`.
fn symbol(input: &str) -> IResult<&str, (Option<char>, Accent, Option<char>)> {
    tuple((opt(char(EARLY_MARK)), accent, opt(char(LATE_MARK))))(input)
}

fn filler(input: &str) -> IResult<&str, &str> {
    take_while(|c: char| c == BAR_LINE || c.is_whitespace())(input)
}

fn symbols(input: &str) -> IResult<&str, Vec<(Option<char>, Accent, Option<char>)>> {
    terminated(many0(preceded(filler, symbol)), filler)(input)
}

/// Parses a rhythm written like `| x x'X - |` into its symbols.
pub fn score(input: &str) -> Result<Vec<Symbol>, ParseError> {
    let (rest, raw) = symbols(input).map_err(|_| ParseError::EmptyScore)?;
    if !rest.is_empty() {
        return Err(unexpected(input, rest));
    }
    if raw.is_empty() {
        return Err(ParseError::EmptyScore);
    }

    let mut position = 0;
    raw.into_iter()
        .map(|(early, accent, late)| {
            let found = input[position..]
                .find(|c: char| c != BAR_LINE && !c.is_whitespace())
                .map_or(position, |offset| position + offset);
            let width = early.map_or(0, |_| 1) + 1 + late.map_or(0, |_| 1);
            position = found + width;
            match (early, late) {
                (Some(_), Some(_)) => Err(ParseError::UnknownTimingSymbol {
                    symbol: format!("{}{}", EARLY_MARK, LATE_MARK),
                    position: found,
                }),
                (Some(_), None) => Ok(Symbol { accent, mark: Mark::Early }),
                (None, Some(_)) => Ok(Symbol { accent, mark: Mark::Late }),
                (None, None) => Ok(Symbol { accent, mark: Mark::Normal }),
            }
        })
        .collect()
}

/// Explains why parsing stopped at `rest`: stray timing marks, or an unknown beat.
fn unexpected(input: &str, rest: &str) -> ParseError {
    let position = input.len() - rest.len();
    let marks: String = rest
        .chars()
        .take_while(|c| *c == EARLY_MARK || *c == LATE_MARK)
        .collect();
    let after = rest[marks.len()..].chars().next();
    match after {
        Some(c) if Accent::from_symbol(c).is_none() && !c.is_whitespace() && c != BAR_LINE => {
            ParseError::UnknownBeatSymbol {
                symbol: c,
                position: position + marks.len(),
            }
        }
        _ => ParseError::UnknownTimingSymbol {
            symbol: marks,
            position,
        },
    }
}

/// Parses a score into a rhythm of unit-length beats, with amplitudes divided
/// by the loudest symbol used in that score.
pub fn rhythm(input: &str) -> Result<Rhythm, ParseError> {
    let symbols = score(input)?;
    let loudest = symbols.iter().map(|s| s.accent.weight()).max().unwrap_or(0);
    let beats = symbols
        .iter()
        .map(|s| {
            let amplitude = if loudest == 0 {
                Amplitude::REST
            } else {
                Amplitude(s.accent.weight() as f64 / loudest as f64)
            };
            Beat::new(amplitude, Rational64::from_integer(1), s.mark.timing())
        })
        .collect::<Result<Vec<_>, _>>()?;
    tracing::trace!(beats = beats.len(), loudest, "parsed rhythm score");
    Ok(Rhythm::new(beats))
}

fn count(input: &str) -> IResult<&str, Times> {
    map(map_res(digit1, str::parse), Times)(input)
}

fn counts(input: &str) -> IResult<&str, Vec<Times>> {
    all_consuming(separated_list1(char(':'), count))(input.trim())
}

/// Parses a ratio such as `7:11` or `2:3:4` into even rhythms, the first of
/// which is the primary.
pub fn ratio(input: &str) -> Result<(Rhythm, Vec<Rhythm>), ParseError> {
    let malformed = || ParseError::MalformedRatio(input.to_string());
    let (_, times) = counts(input).map_err(|_| malformed())?;
    if times.iter().any(|t| t.0 == 0) {
        return Err(malformed());
    }
    let mut rhythms = times.into_iter().map(Rhythm::even);
    let primary = rhythms.next().ok_or_else(malformed)?;
    Ok((primary, rhythms.collect()))
}

#[test]
fn parse_accent() {
    assert_eq!(accent("x"), Ok(("", Accent::Regular)));
    assert_eq!(accent("X-"), Ok(("-", Accent::Accented)));
    assert_eq!(accent("!"), Ok(("", Accent::Primary)));
    assert!(accent("y").is_err());
}

#[test]
fn parse_symbol() {
    assert_eq!(symbol("x"), Ok(("", (None, Accent::Regular, None))));
    assert_eq!(symbol("`x"), Ok(("", (Some('`'), Accent::Regular, None))));
    assert_eq!(symbol("X'x"), Ok(("x", (None, Accent::Accented, Some('\'')))));
}

#[test]
fn parse_score() {
    assert_eq!(score("| x - |"), Ok(vec![REGULAR, REST]));
    assert_eq!(
        score("| x`x x |"),
        Ok(vec![REGULAR, Symbol { accent: Accent::Regular, mark: Mark::Early }, REGULAR])
    );
    assert_eq!(
        score("| x x'x |"),
        Ok(vec![REGULAR, Symbol { accent: Accent::Regular, mark: Mark::Late }, REGULAR])
    );
    assert_eq!(
        score("x'`x").map(|s| s.iter().map(|s| s.mark).collect::<Vec<_>>()),
        Ok(vec![Mark::Late, Mark::Early])
    );
}

#[test]
fn parse_score_errors() {
    assert_eq!(score("| |"), Err(ParseError::EmptyScore));
    assert_eq!(score(""), Err(ParseError::EmptyScore));
    assert_eq!(
        score("| x y |"),
        Err(ParseError::UnknownBeatSymbol { symbol: 'y', position: 4 })
    );
    assert_eq!(
        score("| x'' |"),
        Err(ParseError::UnknownTimingSymbol { symbol: "'".to_string(), position: 4 })
    );
    assert_eq!(
        score("| x `x' |"),
        Err(ParseError::UnknownTimingSymbol { symbol: "`'".to_string(), position: 4 })
    );
    assert_eq!(
        score("x `y"),
        Err(ParseError::UnknownBeatSymbol { symbol: 'y', position: 3 })
    );
}

#[test]
fn parse_rhythm_amplitudes() {
    let cases: Vec<(&str, Vec<f64>)> = vec![
        ("| x |", vec![1.0]),
        ("| x X |", vec![2.0 / 3.0, 1.0]),
        ("| x X x ! |", vec![4.0 / 9.0, 2.0 / 3.0, 4.0 / 9.0, 1.0]),
        ("| x - x X |", vec![2.0 / 3.0, 0.0, 2.0 / 3.0, 1.0]),
        ("| x x x |", vec![1.0, 1.0, 1.0]),
        ("| x X | x ! x |", vec![4.0 / 9.0, 2.0 / 3.0, 4.0 / 9.0, 1.0, 4.0 / 9.0]),
        ("| x - - x |", vec![1.0, 0.0, 0.0, 1.0]),
        ("| - - |", vec![0.0, 0.0]),
    ];
    for (input, expected) in cases {
        let amplitudes: Vec<f64> = rhythm(input).unwrap().iter().map(|b| b.amplitude().0).collect();
        assert_eq!(amplitudes, expected, "{}", input);
    }
}

#[test]
fn parse_rhythm_timings() {
    let timings = |input: &str| -> Vec<Timing> { rhythm(input).unwrap().iter().map(|b| b.timing()).collect() };
    assert_eq!(timings("| x - X !"), vec![Timing::ON_TIME; 4]);
    assert_eq!(timings("| x`x x |"), vec![Timing::ON_TIME, Timing::EARLY, Timing::ON_TIME]);
    assert_eq!(timings("| x x'x |"), vec![Timing::ON_TIME, Timing::LATE, Timing::ON_TIME]);
    assert!(rhythm("| x x |").unwrap().iter().all(|b| b.duration() == Rational64::from_integer(1)));
}

#[test]
fn parse_ratio() {
    let (primary, secondaries) = ratio("7:11").unwrap();
    assert_eq!(primary, Rhythm::even(Times(7)));
    assert_eq!(secondaries, vec![Rhythm::even(Times(11))]);

    let (primary, secondaries) = ratio("2:3:4").unwrap();
    assert_eq!(primary.len(), 2);
    assert_eq!(secondaries.iter().map(|r| r.len()).collect::<Vec<_>>(), vec![3, 4]);

    assert_eq!(ratio("5").map(|(p, s)| (p.len(), s.len())), Ok((5, 0)));
}

#[test]
fn parse_ratio_errors() {
    for input in ["", "7:", ":3", "3:0", "a:b", "3::4", "3:4x"] {
        assert_eq!(ratio(input), Err(ParseError::MalformedRatio(input.to_string())));
    }
}
