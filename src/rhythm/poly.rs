use std::collections::BTreeSet;

use super::beat::{Amplitude, Beat};
use super::error::RhythmError;
use super::sequence::{checked_lcm, Layers, Rhythm, Slot};

/// Grids larger than this many ticks are rejected unless configured otherwise.
pub const DEFAULT_MAX_TICKS: u64 = 1 << 20;

/// Resource ceiling for canonical grids. The common length of a polyrhythm is
/// the LCM of its components' grid lengths and grows quickly with coprime parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_ticks: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_ticks: DEFAULT_MAX_TICKS,
        }
    }
}

impl Limits {
    pub(super) fn check(&self, ticks: u128) -> Result<usize, RhythmError> {
        if ticks > self.max_ticks as u128 {
            Err(RhythmError::TickCeiling {
                ticks,
                limit: self.max_ticks,
            })
        } else {
            usize::try_from(ticks).map_err(|_| RhythmError::GridOverflow)
        }
    }
}

/// Combines `primary` with every secondary into one rhythm lasting as long as
/// `primary`, using the default [`Limits`].
pub fn build_polyrhythm(primary: Rhythm, secondaries: Vec<Rhythm>) -> Result<Rhythm, RhythmError> {
    build_polyrhythm_within(primary, secondaries, &Limits::default())
}

/// Layers the canonical forms of all components on a common tick grid, merges
/// them tick by tick and turns the merged grid back into beats, scaled to the
/// primary's duration.
///
/// A new attack in any component interrupts whatever was sounding, and
/// simultaneous values are summed. Rests only silence the merged rhythm once
/// every component that was sounding has stopped.
pub fn build_polyrhythm_within(
    primary: Rhythm,
    secondaries: Vec<Rhythm>,
    limits: &Limits,
) -> Result<Rhythm, RhythmError> {
    let canonicals = std::iter::once(&primary)
        .chain(secondaries.iter())
        .map(|component| component.canonical_within(limits))
        .collect::<Result<Vec<_>, _>>()?;

    let aligned = align(&canonicals, limits)?;
    let grid = merge(&aligned);
    let unscaled = Rhythm::new(beats_from_canonical(&grid)?);
    let beats = unscaled.stretch(primary.duration())?.beats().to_vec();
    tracing::debug!(
        components = canonicals.len(),
        ticks = grid.len(),
        beats = beats.len(),
        "combined polyrhythm"
    );

    Ok(Rhythm::layered(
        beats,
        Layers {
            primary,
            secondaries,
            grid,
        },
    ))
}

/// Stretches every canonical grid to the LCM of their lengths so that ticks
/// at the same index happen at the same time.
fn align(canonicals: &[Vec<Slot>], limits: &Limits) -> Result<Vec<Vec<Slot>>, RhythmError> {
    if let Some(index) = canonicals.iter().position(Vec::is_empty) {
        return Err(RhythmError::EmptyComponent { index });
    }
    let common = canonicals
        .iter()
        .map(|grid| grid.len() as u64)
        .try_fold(1u64, checked_lcm)
        .ok_or(RhythmError::GridOverflow)?;
    let common = limits.check(common as u128)?;
    tracing::trace!(
        lengths = ?canonicals.iter().map(Vec::len).collect::<Vec<_>>(),
        common,
        "aligning components"
    );

    canonicals
        .iter()
        .map(|grid| stretch_grid(grid, common))
        .collect()
}

/// Spreads `grid` over `common` ticks by padding empty slots after each tick.
fn stretch_grid(grid: &[Slot], common: usize) -> Result<Vec<Slot>, RhythmError> {
    if grid.is_empty() || common % grid.len() != 0 {
        return Err(RhythmError::Misaligned {
            length: grid.len(),
            common,
        });
    }
    let gap = common / grid.len() - 1;
    Ok(grid
        .iter()
        .flat_map(|slot| std::iter::once(*slot).chain(std::iter::repeat(None).take(gap)))
        .collect())
}

/// Components still sounding at the current tick.
type Sounding = BTreeSet<usize>;

fn channels_where(column: &[Slot], pred: impl Fn(Amplitude) -> bool) -> Sounding {
    column
        .iter()
        .enumerate()
        .filter(|(_, slot)| slot.map_or(false, &pred))
        .map(|(channel, _)| channel)
        .collect()
}

/// One step of the merge walk: the components sounding after this tick and
/// the merged slot for it.
fn merge_tick(sounding: Sounding, column: &[Slot]) -> (Sounding, Slot) {
    let new_beats = channels_where(column, |amplitude| amplitude.is_attack());
    if !new_beats.is_empty() {
        let total = column
            .iter()
            .flatten()
            .fold(Amplitude::REST, |acc, amplitude| acc + *amplitude);
        return (new_beats, Some(total));
    }

    let finished = channels_where(column, |amplitude| amplitude.is_rest());
    if finished.is_empty() {
        return (sounding, None);
    }
    let still_sounding: Sounding = sounding.difference(&finished).copied().collect();
    if still_sounding.is_empty() {
        (still_sounding, Some(Amplitude::REST))
    } else {
        (still_sounding, None)
    }
}

fn merge(aligned: &[Vec<Slot>]) -> Vec<Slot> {
    let ticks = aligned.first().map_or(0, Vec::len);
    let (_, merged) = (0..ticks).fold(
        (Sounding::new(), Vec::with_capacity(ticks)),
        |(sounding, mut merged), tick| {
            let column: Vec<Slot> = aligned.iter().map(|grid| grid[tick]).collect();
            let (sounding, slot) = merge_tick(sounding, &column);
            merged.push(slot);
            (sounding, merged)
        },
    );
    merged
}

/// Each filled slot starts a beat lasting until the next filled slot, in ticks.
/// The first tick always starts a beat, silent if nothing is there.
fn beats_from_canonical(grid: &[Slot]) -> Result<Vec<Beat>, RhythmError> {
    let mut spans: Vec<(Amplitude, i64)> = Vec::new();
    for (tick, slot) in grid.iter().enumerate() {
        match (tick, slot) {
            (0, _) | (_, Some(_)) => spans.push((slot.unwrap_or(Amplitude::REST), 1)),
            (_, None) => {
                if let Some((_, ticks)) = spans.last_mut() {
                    *ticks += 1;
                }
            }
        }
    }
    spans
        .into_iter()
        .map(|(amplitude, ticks)| Beat::plain(amplitude, ticks))
        .collect()
}

#[cfg(test)]
use super::beat::Timing;
#[cfg(test)]
use super::sequence::Times;
#[cfg(test)]
use num_rational::Rational64;

#[cfg(test)]
fn rhythm_of(beats: &[(f64, i64)]) -> Rhythm {
    Rhythm::new(
        beats
            .iter()
            .map(|&(amplitude, timing)| {
                Beat::new(
                    Amplitude(amplitude),
                    Rational64::from_integer(1),
                    Timing::new(Rational64::from_integer(timing)).unwrap(),
                )
                .unwrap()
            })
            .collect(),
    )
}

#[cfg(test)]
fn durations(rhythm: &Rhythm) -> Vec<Rational64> {
    rhythm.iter().map(Beat::duration).collect()
}

#[cfg(test)]
fn amplitudes(rhythm: &Rhythm) -> Vec<f64> {
    rhythm.iter().map(|beat| beat.amplitude().0).collect()
}

#[cfg(test)]
fn filled(grid: &[Slot]) -> Vec<usize> {
    grid.iter()
        .enumerate()
        .filter_map(|(tick, slot)| slot.map(|_| tick))
        .collect()
}

#[cfg(test)]
fn ratio(n: i64, d: i64) -> Rational64 {
    Rational64::new(n, d)
}

#[test]
fn test_four_over_three() {
    let primary = Rhythm::even(Times(4));
    let secondary = Rhythm::even(Times(3));
    let poly = build_polyrhythm(primary.clone(), vec![secondary.clone()]).unwrap();

    assert!(poly.is_polyrhythm());
    assert_eq!(poly.primary(), Some(&primary));
    assert_eq!(poly.secondaries(), &[secondary.clone()]);
    assert_eq!(poly.components(), vec![&primary, &secondary]);

    assert_eq!(
        durations(&poly),
        vec![ratio(1, 1), ratio(1, 3), ratio(2, 3), ratio(2, 3), ratio(1, 3), ratio(1, 1)]
    );
    assert_eq!(amplitudes(&poly), vec![2.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
    assert_eq!(poly.duration(), Rational64::from_integer(4));

    let grid = poly.canonical().unwrap();
    assert_eq!(grid.len(), 12);
    assert_eq!(filled(&grid), vec![0, 3, 4, 6, 8, 9]);
}

#[test]
fn test_beats_sustain_through_other_rests() {
    let primary = rhythm_of(&[(1.0, 0), (0.0, 0), (1.0, 0)]);
    let secondary = rhythm_of(&[(1.0, 0), (0.0, 0), (1.0, 0), (0.0, 0)]);
    let poly = build_polyrhythm(primary, vec![secondary]).unwrap();

    let a = |value: f64| Some(Amplitude(value));
    assert_eq!(
        poly.canonical().unwrap(),
        vec![
            a(2.0),
            None,
            None,
            // the secondary rests, but the primary's first beat still sounds
            None,
            // both have stopped
            a(0.0),
            None,
            a(1.0),
            None,
            a(1.0),
            None,
            None,
            None,
        ]
    );
    assert_eq!(durations(&poly), vec![ratio(1, 1), ratio(1, 2), ratio(1, 2), ratio(1, 1)]);
    assert_eq!(amplitudes(&poly), vec![2.0, 0.0, 1.0, 1.0]);
    assert_eq!(poly.duration(), Rational64::from_integer(3));
}

#[test]
fn test_polyrhythm_with_timing_marks() {
    let primary = rhythm_of(&[(1.0, 0), (1.0, 1), (1.0, 0), (1.0, 1), (1.0, -1), (1.0, 1)]);
    let secondary = rhythm_of(&[(1.0, 1), (1.0, -1), (1.0, 1)]);
    let poly = build_polyrhythm(primary, vec![secondary]).unwrap();

    let grid = poly.canonical().unwrap();
    assert_eq!(grid.len(), 60);
    assert_eq!(filled(&grid), vec![0, 6, 13, 14, 20, 33, 37, 46, 53]);
    assert!(grid.iter().flatten().all(|amplitude| *amplitude == Amplitude(1.0)));

    assert_eq!(poly.duration(), Rational64::from_integer(6));
    assert_eq!(
        durations(&poly),
        vec![
            ratio(3, 5),
            ratio(7, 10),
            ratio(1, 10),
            ratio(3, 5),
            ratio(13, 10),
            ratio(2, 5),
            ratio(9, 10),
            ratio(7, 10),
            ratio(7, 10),
        ]
    );
    assert!(poly.iter().all(|beat| beat.timing() == Timing::ON_TIME));
    assert_eq!(amplitudes(&poly), vec![1.0; 9]);
}

#[test]
fn test_without_secondaries() {
    let primary = rhythm_of(&[(1.0, 0), (0.5, 1)]);
    let poly = build_polyrhythm(primary.clone(), vec![]).unwrap();
    assert_eq!(poly.canonical(), primary.canonical());
    assert_eq!(durations(&poly), vec![ratio(13, 10), ratio(7, 10)]);
    assert_eq!(amplitudes(&poly), vec![1.0, 0.5]);
    assert_eq!(poly.components(), vec![&primary]);
}

#[test]
fn test_leading_hold_becomes_rest() {
    let primary = rhythm_of(&[(1.0, -1), (1.0, 0)]);
    let poly = build_polyrhythm(primary, vec![]).unwrap();
    // the early downbeat wraps to tick 17 of 20
    assert_eq!(amplitudes(&poly), vec![0.0, 1.0, 1.0]);
    assert_eq!(durations(&poly), vec![ratio(1, 1), ratio(7, 10), ratio(3, 10)]);
}

#[test]
fn test_polyrhythm_is_deterministic() {
    let build = || {
        build_polyrhythm(
            rhythm_of(&[(1.0, 0), (0.5, 1), (0.0, 0), (1.0, -1), (0.5, 0)]),
            vec![Rhythm::even(Times(3)), rhythm_of(&[(0.25, 1), (1.0, 0)])],
        )
        .unwrap()
    };
    let first = build();
    let second = build();
    assert_eq!(first, second);
    assert_eq!(first.canonical(), second.canonical());
}

#[test]
fn test_nested_polyrhythm() {
    let inner = build_polyrhythm(Rhythm::even(Times(4)), vec![Rhythm::even(Times(3))]).unwrap();
    let outer = build_polyrhythm(inner.clone(), vec![Rhythm::even(Times(2))]).unwrap();

    assert_eq!(outer.primary(), Some(&inner));
    assert_eq!(outer.duration(), Rational64::from_integer(4));
    assert_eq!(filled(&outer.canonical().unwrap()), vec![0, 3, 4, 6, 8, 9]);
    assert_eq!(amplitudes(&outer), vec![3.0, 1.0, 1.0, 2.0, 1.0, 1.0]);
    assert_eq!(durations(&outer), durations(&inner));
}

#[test]
fn test_tick_ceiling() {
    let limits = Limits { max_ticks: 50 };
    assert_eq!(
        build_polyrhythm_within(Rhythm::even(Times(7)), vec![Rhythm::even(Times(11))], &limits),
        Err(RhythmError::TickCeiling { ticks: 77, limit: 50 })
    );
    assert!(build_polyrhythm(Rhythm::even(Times(7)), vec![Rhythm::even(Times(11))]).is_ok());
}

#[test]
fn test_grid_overflow() {
    let primes = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53];
    let mut rhythms = primes.iter().map(|p| Rhythm::even(Times(*p)));
    let primary = rhythms.next().unwrap();
    let limits = Limits { max_ticks: u64::MAX };
    assert_eq!(
        build_polyrhythm_within(primary, rhythms.collect(), &limits),
        Err(RhythmError::GridOverflow)
    );
}

#[test]
fn test_rejects_bad_components() {
    assert_eq!(
        build_polyrhythm(Rhythm::even(Times(3)), vec![Rhythm::new(vec![])]),
        Err(RhythmError::EmptyComponent { index: 1 })
    );
    let half = Beat::new(Amplitude::FULL, ratio(1, 2), Timing::ON_TIME).unwrap();
    assert_eq!(
        build_polyrhythm(Rhythm::even(Times(3)), vec![Rhythm::new(vec![half])]),
        Err(RhythmError::NonIntegerDuration(ratio(1, 2)))
    );
}

#[test]
fn test_stretch_grid() {
    let grid = vec![Some(Amplitude(1.0)), Some(Amplitude(0.0))];
    assert_eq!(
        stretch_grid(&grid, 6),
        Ok(vec![Some(Amplitude(1.0)), None, None, Some(Amplitude(0.0)), None, None])
    );
    assert_eq!(
        stretch_grid(&grid, 5),
        Err(RhythmError::Misaligned { length: 2, common: 5 })
    );
}

#[test]
fn test_merge_tick() {
    let sounding = Sounding::from([0, 1]);
    let rest = Some(Amplitude::REST);

    // one part stops, the other holds
    let (sounding, slot) = merge_tick(sounding, &[rest, None]);
    assert_eq!(slot, None);
    assert_eq!(sounding, Sounding::from([1]));

    // silence once nothing sounds
    let (sounding, slot) = merge_tick(sounding, &[None, rest]);
    assert_eq!(slot, Some(Amplitude::REST));
    assert!(sounding.is_empty());

    // an attack takes over and sums everything present
    let (sounding, slot) = merge_tick(sounding, &[Some(Amplitude(0.5)), rest]);
    assert_eq!(slot, Some(Amplitude(0.5)));
    assert_eq!(sounding, Sounding::from([0]));

    let (sounding, slot) = merge_tick(sounding, &[None, None]);
    assert_eq!(slot, None);
    assert_eq!(sounding, Sounding::from([0]));
}
