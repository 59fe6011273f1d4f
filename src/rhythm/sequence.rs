extern crate derive_more;
use std::fmt;

use num_integer::Integer;
use num_rational::Rational64;

use super::beat::{Amplitude, Beat};
use super::error::RhythmError;
use super::poly::{build_polyrhythm, Limits};

/// One tick of a canonical grid: the amplitude of the beat starting there, if any.
pub type Slot = Option<Amplitude>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, derive_more::Display)]
pub struct Times(pub u16);

/// Components a polyrhythm was combined from, kept for introspection,
/// together with the merged grid its beats were derived from.
#[derive(Debug, Clone)]
pub(super) struct Layers {
    pub(super) primary: Rhythm,
    pub(super) secondaries: Vec<Rhythm>,
    pub(super) grid: Vec<Slot>,
}

/// An ordered, immutable sequence of beats.
#[derive(Debug, Clone)]
pub struct Rhythm {
    beats: Vec<Beat>,
    layers: Option<Box<Layers>>,
}

impl Rhythm {
    pub fn new(beats: Vec<Beat>) -> Self {
        Rhythm { beats, layers: None }
    }

    pub(super) fn layered(beats: Vec<Beat>, layers: Layers) -> Self {
        Rhythm {
            beats,
            layers: Some(Box::new(layers)),
        }
    }

    /// `times` beats of full amplitude and unit length, played on time.
    pub fn even(times: Times) -> Self {
        Rhythm::new(vec![Beat::UNIT; times.0 as usize])
    }

    /// Combines `primary` with `secondaries`; see [`build_polyrhythm`].
    pub fn poly(primary: Rhythm, secondaries: Vec<Rhythm>) -> Result<Rhythm, RhythmError> {
        build_polyrhythm(primary, secondaries)
    }

    pub fn beats(&self) -> &[Beat] {
        &self.beats
    }

    /// Total duration of all beats.
    pub fn duration(&self) -> Rational64 {
        self.beats.iter().map(Beat::duration).sum()
    }

    pub fn is_polyrhythm(&self) -> bool {
        self.layers.is_some()
    }

    /// The rhythm whose duration a polyrhythm was scaled to.
    pub fn primary(&self) -> Option<&Rhythm> {
        self.layers.as_ref().map(|layers| &layers.primary)
    }

    pub fn secondaries(&self) -> &[Rhythm] {
        self.layers
            .as_ref()
            .map(|layers| layers.secondaries.as_slice())
            .unwrap_or(&[])
    }

    /// The primary followed by every secondary. Empty for plain rhythms.
    pub fn components(&self) -> Vec<&Rhythm> {
        self.primary()
            .into_iter()
            .chain(self.secondaries().iter())
            .collect()
    }

    /// Exact discretization of this rhythm on an integer tick grid, using the
    /// default tick ceiling.
    pub fn canonical(&self) -> Result<Vec<Slot>, RhythmError> {
        self.canonical_within(&Limits::default())
    }

    /// `grid[i]` holds the amplitude of the beat starting exactly at tick `i`
    /// (rests are `Some(0)`), or `None` if nothing starts there. The grid is
    /// spaced finely enough to place every early and late beat exactly.
    ///
    /// Polyrhythms return the merged grid of their components.
    pub fn canonical_within(&self, limits: &Limits) -> Result<Vec<Slot>, RhythmError> {
        if let Some(layers) = &self.layers {
            return Ok(layers.grid.clone());
        }

        let duration = self.duration();
        if !duration.is_integer() {
            return Err(RhythmError::NonIntegerDuration(duration));
        }

        let denominator = self
            .beats
            .iter()
            .map(|beat| *beat.start_offset().denom() as u64)
            .try_fold(1u64, checked_lcm)
            .ok_or(RhythmError::GridOverflow)?;
        let length = limits.check(duration.to_integer() as u128 * denominator as u128)?;
        tracing::trace!(%duration, denominator, length, "canonicalising rhythm");

        let mut grid = vec![None; length];
        let scale = denominator as i64;
        for (index, beat) in self.beats.iter().enumerate() {
            let start = (Rational64::from_integer(index as i64) + beat.start_offset()) * scale;
            let tick = start.to_integer();
            // An early first beat belongs to the end of the previous cycle.
            let slot = if (-(length as i64)..0).contains(&tick) {
                tick + length as i64
            } else {
                tick
            };
            match grid.get_mut(slot as usize) {
                Some(cell) if slot >= 0 => *cell = Some(beat.amplitude()),
                _ => return Err(RhythmError::BeatOutsideGrid { index, tick, length }),
            }
        }
        Ok(grid)
    }

    /// This rhythm re-scaled to last `new_duration` beat units in total.
    pub fn stretch(&self, new_duration: Rational64) -> Result<Rhythm, RhythmError> {
        let duration = self.duration();
        if self.beats.is_empty() || duration == new_duration {
            return Ok(self.clone());
        }
        let scale = new_duration / duration;
        let beats = self
            .beats
            .iter()
            .map(|beat| Beat::new(beat.amplitude(), beat.duration() * scale, beat.timing()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Rhythm::new(beats))
    }

    /// Plays the beats `times` times over.
    pub fn cycle(&self, times: Times) -> Rhythm {
        let beats = (0..times.0).flat_map(|_| self.beats.iter().copied()).collect();
        Rhythm::new(beats)
    }
}

pub(super) fn checked_lcm(acc: u64, value: u64) -> Option<u64> {
    (acc / acc.gcd(&value)).checked_mul(value)
}

impl PartialEq for Rhythm {
    fn eq(&self, other: &Self) -> bool {
        self.beats == other.beats
    }
}

impl std::ops::Deref for Rhythm {
    type Target = [Beat];

    fn deref(&self) -> &Self::Target {
        &self.beats
    }
}

impl<'a> IntoIterator for &'a Rhythm {
    type Item = &'a Beat;
    type IntoIter = std::slice::Iter<'a, Beat>;

    fn into_iter(self) -> Self::IntoIter {
        self.beats.iter()
    }
}

impl fmt::Display for Rhythm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Rhythm duration={} [", self.duration())?;
        for (index, beat) in self.beats.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", beat)?;
        }
        write!(f, "]>")
    }
}

#[cfg(test)]
use super::beat::Timing;

#[cfg(test)]
fn unit(amplitude: f64, timing: i64) -> Beat {
    Beat::new(
        Amplitude(amplitude),
        Rational64::from_integer(1),
        Timing::new(Rational64::from_integer(timing)).unwrap(),
    )
    .unwrap()
}

#[cfg(test)]
fn attacks(grid: &[Slot]) -> Vec<usize> {
    grid.iter()
        .enumerate()
        .filter(|(_, slot)| slot.is_some())
        .map(|(tick, _)| tick)
        .collect()
}

#[test]
fn test_duration_sums_beats() {
    let rhythm = Rhythm::new(vec![
        Beat::new(Amplitude::FULL, Rational64::new(1, 3), Timing::ON_TIME).unwrap(),
        Beat::new(Amplitude::REST, Rational64::new(2, 3), Timing::LATE).unwrap(),
        Beat::plain(Amplitude(0.5), 2).unwrap(),
    ]);
    assert_eq!(rhythm.duration(), Rational64::from_integer(3));
    assert_eq!(Rhythm::new(vec![]).duration(), Rational64::from_integer(0));
}

#[test]
fn test_canonical_on_time() {
    let rhythm = Rhythm::new(vec![unit(1.0, 0), unit(0.0, 0), unit(0.5, 0)]);
    assert_eq!(
        rhythm.canonical(),
        Ok(vec![Some(Amplitude(1.0)), Some(Amplitude(0.0)), Some(Amplitude(0.5))])
    );
}

#[test]
fn test_canonical_with_timing_marks() {
    let rhythm = Rhythm::new(vec![
        unit(1.0, 0),
        unit(1.0, 1),
        unit(1.0, 0),
        unit(1.0, 1),
        unit(1.0, -1),
        unit(1.0, 1),
    ]);
    let grid = rhythm.canonical().unwrap();
    assert_eq!(grid.len(), 60);
    assert_eq!(attacks(&grid), vec![0, 13, 20, 33, 37, 53]);
}

#[test]
fn test_canonical_wraps_early_downbeat() {
    let rhythm = Rhythm::new(vec![unit(1.0, -1), unit(0.5, 0)]);
    let grid = rhythm.canonical().unwrap();
    assert_eq!(grid.len(), 20);
    assert_eq!(grid[17], Some(Amplitude(1.0)));
    assert_eq!(grid[10], Some(Amplitude(0.5)));
    assert_eq!(attacks(&grid), vec![10, 17]);
}

#[test]
fn test_canonical_rejects_fractional_length() {
    let rhythm = Rhythm::new(vec![
        unit(1.0, 0),
        Beat::new(Amplitude::FULL, Rational64::new(1, 2), Timing::ON_TIME).unwrap(),
    ]);
    assert_eq!(
        rhythm.canonical(),
        Err(RhythmError::NonIntegerDuration(Rational64::new(3, 2)))
    );
}

#[test]
fn test_canonical_rejects_beats_past_the_grid() {
    let half = |amplitude| Beat::new(Amplitude(amplitude), Rational64::new(1, 2), Timing::ON_TIME).unwrap();
    let rhythm = Rhythm::new(vec![half(1.0), half(0.5), half(0.25), half(0.75)]);
    assert_eq!(
        rhythm.canonical(),
        Err(RhythmError::BeatOutsideGrid { index: 2, tick: 2, length: 2 })
    );
    assert_eq!(
        Rhythm::even(Times(4)).stretch(Rational64::from_integer(2)).unwrap().canonical(),
        Err(RhythmError::BeatOutsideGrid { index: 2, tick: 2, length: 2 })
    );
}

#[test]
fn test_canonical_reports_denominator_overflow() {
    let rhythm = Rhythm::new(
        [1_000_003, 1_000_033, 1_000_037, 1_000_039]
            .iter()
            .map(|p| {
                let timing = Timing::new(Rational64::new(1, *p)).unwrap();
                Beat::new(Amplitude::FULL, Rational64::from_integer(1), timing).unwrap()
            })
            .collect(),
    );
    assert_eq!(
        rhythm.canonical_within(&Limits { max_ticks: u64::MAX }),
        Err(RhythmError::GridOverflow)
    );
}

#[test]
fn test_canonical_respects_ceiling() {
    let rhythm = Rhythm::even(Times(8));
    assert_eq!(
        rhythm.canonical_within(&Limits { max_ticks: 4 }),
        Err(RhythmError::TickCeiling { ticks: 8, limit: 4 })
    );
}

#[test]
fn test_rhythm_equality_is_structural() {
    assert_eq!(Rhythm::even(Times(3)), Rhythm::new(vec![unit(1.0, 0); 3]));
    assert_ne!(Rhythm::even(Times(3)), Rhythm::even(Times(4)));
    assert_ne!(
        Rhythm::new(vec![unit(1.0, 0), unit(0.5, 0)]),
        Rhythm::new(vec![unit(0.5, 0), unit(1.0, 0)])
    );
}

#[test]
fn test_stretch() {
    let stretched = Rhythm::even(Times(3)).stretch(Rational64::from_integer(4)).unwrap();
    assert_eq!(stretched.duration(), Rational64::from_integer(4));
    assert!(stretched.iter().all(|beat| beat.duration() == Rational64::new(4, 3)));
    assert!(Rhythm::even(Times(3)).stretch(Rational64::from_integer(0)).is_err());
}

#[test]
fn test_cycle() {
    let rhythm = Rhythm::new(vec![unit(1.0, 0), unit(0.0, 1)]);
    let cycled = rhythm.cycle(Times(3));
    assert_eq!(cycled.len(), 6);
    assert_eq!(cycled.duration(), Rational64::from_integer(6));
    assert_eq!(cycled[4], rhythm[0]);
    assert_eq!(rhythm.cycle(Times(0)), Rhythm::new(vec![]));
}

#[test]
fn test_plain_rhythm_has_no_components() {
    let rhythm = Rhythm::even(Times(2));
    assert!(!rhythm.is_polyrhythm());
    assert_eq!(rhythm.primary(), None);
    assert!(rhythm.components().is_empty());
}

#[test]
fn test_display_rhythm() {
    let rhythm = Rhythm::new(vec![unit(1.0, 0), unit(0.5, -1)]);
    assert_eq!(rhythm.to_string(), "<Rhythm duration=2 [1 for 1, 0.5 for 1 (-1)]>");
}
